//! Method registry mapping method ids to handler configurations.
//!
//! The registry is filled while the server is being built and frozen once
//! routes are created; lookups during serving never take a lock.
//!
//! # Example
//!
//! ```
//! use xrpc_server::handler::{HandlerOutput, MethodConfig, MethodRegistry};
//!
//! let mut registry = MethodRegistry::new();
//! registry.register("io.example.ping", MethodConfig::new(|_ctx| async {
//!     Ok(HandlerOutput::json(serde_json::json!({ "pong": true })))
//! }));
//!
//! assert!(registry.resolve("io.example.ping").is_some());
//! ```

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{HandlerContext, HandlerOutput};
use crate::auth::{AuthContext, AuthResult, AuthVerifier};
use crate::config::PayloadLimits;
use crate::error::{HandlerError, XrpcError};

/// Result type for handler functions.
pub type HandlerResult = Result<HandlerOutput, HandlerError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Namespaced method id, e.g. `io.example.ping`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(Arc<str>);

impl MethodId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for MethodId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for MethodId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MethodId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MethodId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Trait for method handlers.
pub trait Handler: Send + Sync + 'static {
    /// Handle one request.
    fn call(&self, ctx: HandlerContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: HandlerContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(ctx))
    }
}

/// Wrapper that deserializes params and input before calling the handler.
///
/// Params come from the query string; input comes from the decoded body
/// (`null` when the request had none, so `Option<T>` and `()` work).
pub struct TypedHandler<F, P, I, Fut>
where
    F: Fn(P, I, HandlerContext) -> Fut + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    I: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(P, I) -> Fut>,
}

impl<F, P, I, Fut> TypedHandler<F, P, I, Fut>
where
    F: Fn(P, I, HandlerContext) -> Fut + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    I: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, P, I, Fut> Handler for TypedHandler<F, P, I, Fut>
where
    F: Fn(P, I, HandlerContext) -> Fut + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    I: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: HandlerContext) -> BoxFuture<'static, HandlerResult> {
        let params: P = match ctx.params().deserialize() {
            Ok(p) => p,
            Err(e) => {
                let err = XrpcError::invalid_request(format!("Invalid parameters: {e}"));
                return Box::pin(async move { Err(err.into()) });
            }
        };

        let body = ctx
            .input()
            .map(|input| input.body.clone())
            .unwrap_or(Value::Null);
        let input: I = match serde_json::from_value(body) {
            Ok(i) => i,
            Err(e) => {
                let err = XrpcError::invalid_request(format!("Invalid input: {e}"));
                return Box::pin(async move { Err(err.into()) });
            }
        };

        Box::pin((self.handler)(params, input, ctx))
    }
}

/// Handler plus its optional auth verifier and payload limits.
#[derive(Clone)]
pub struct MethodConfig {
    handler: Arc<dyn Handler>,
    auth: Option<Arc<dyn AuthVerifier>>,
    limits: Option<PayloadLimits>,
}

impl MethodConfig {
    /// Wrap a handler function.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::from_handler(handler)
    }

    /// Wrap any [`Handler`] implementation.
    pub fn from_handler(handler: impl Handler) -> Self {
        Self {
            handler: Arc::new(handler),
            auth: None,
            limits: None,
        }
    }

    /// Wrap a typed handler.
    pub fn typed<F, P, I, Fut>(handler: F) -> Self
    where
        F: Fn(P, I, HandlerContext) -> Fut + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        I: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::from_handler(TypedHandler::new(handler))
    }

    /// Gate the method behind an auth function.
    pub fn with_auth<F, Fut>(self, verifier: F) -> Self
    where
        F: Fn(AuthContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AuthResult, HandlerError>> + Send + 'static,
    {
        self.with_verifier(verifier)
    }

    /// Gate the method behind any [`AuthVerifier`].
    pub fn with_verifier(mut self, verifier: impl AuthVerifier) -> Self {
        self.auth = Some(Arc::new(verifier));
        self
    }

    /// Override the server-wide payload limits for this method.
    pub fn with_limits(mut self, limits: PayloadLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    pub fn auth(&self) -> Option<&dyn AuthVerifier> {
        self.auth.as_deref()
    }

    pub fn limits(&self) -> Option<PayloadLimits> {
        self.limits
    }
}

impl fmt::Debug for MethodConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodConfig")
            .field("auth", &self.auth.is_some())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// Registry mapping method ids to their configuration.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<MethodId, MethodConfig>,
}

impl MethodRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method, replacing any previous configuration for the id.
    ///
    /// The id is not checked against the schema registry; an id unknown to
    /// it is simply unreachable.
    pub fn register(
        &mut self,
        id: impl Into<MethodId>,
        config: MethodConfig,
    ) -> Option<MethodConfig> {
        let id = id.into();
        let previous = self.methods.insert(id.clone(), config);
        if previous.is_some() {
            tracing::debug!("Replaced handler for method {}", id);
        }
        previous
    }

    /// Get the configuration for a method id.
    pub fn resolve(&self, id: &str) -> Option<&MethodConfig> {
        self.methods.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.methods.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&MethodId> {
        let mut ids: Vec<&MethodId> = self.methods.keys().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
