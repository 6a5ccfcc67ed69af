//! Auth gate - per-method verifiers run before the handler.
//!
//! A verifier sees the request metadata and either returns an opaque
//! [`AuthResult`] (stored in the request locals and handed to the handler) or
//! fails, in which case the handler is never invoked.
//!
//! # Example
//!
//! ```
//! use xrpc_server::auth::{AuthContext, AuthResult};
//! use xrpc_server::error::{ErrorResult, HandlerError};
//!
//! async fn bearer(ctx: AuthContext) -> Result<AuthResult, HandlerError> {
//!     match ctx.bearer_token() {
//!         Some("letmein") => Ok(AuthResult::new("did:example:alice".to_string())),
//!         _ => Err(ErrorResult::new(401).with_message("bad token").into()),
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::http::{header, HeaderMap, Method, Uri};
use futures::FutureExt;

use crate::error::{panic_message, HandlerError, XrpcError};
use crate::handler::{BoxFuture, MethodId, Params, RequestLocals};

/// Opaque credentials produced by a verifier.
///
/// The dispatcher never looks inside; handlers downcast to the type their
/// verifier stored.
#[derive(Clone)]
pub struct AuthResult {
    credentials: Arc<dyn Any + Send + Sync>,
    artifacts: Option<Arc<dyn Any + Send + Sync>>,
}

impl AuthResult {
    pub fn new<C: Any + Send + Sync>(credentials: C) -> Self {
        Self {
            credentials: Arc::new(credentials),
            artifacts: None,
        }
    }

    pub fn with_artifacts<A: Any + Send + Sync>(mut self, artifacts: A) -> Self {
        self.artifacts = Some(Arc::new(artifacts));
        self
    }

    /// Credentials, if they are of type `C`.
    pub fn credentials<C: Any>(&self) -> Option<&C> {
        self.credentials.downcast_ref()
    }

    /// Artifacts, if present and of type `A`.
    pub fn artifacts<A: Any>(&self) -> Option<&A> {
        self.artifacts.as_ref()?.downcast_ref()
    }
}

impl fmt::Debug for AuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResult")
            .field("artifacts", &self.artifacts.is_some())
            .finish_non_exhaustive()
    }
}

/// Request metadata available to verifiers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub method_id: MethodId,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Parsed but not yet schema-validated.
    pub params: Params,
}

impl AuthContext {
    /// Token from an `Authorization: Bearer ...` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.split_once(' ')?;
        scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
    }
}

/// Trait for auth verifiers.
pub trait AuthVerifier: Send + Sync + 'static {
    fn verify(&self, ctx: AuthContext) -> BoxFuture<'static, Result<AuthResult, HandlerError>>;
}

impl<F, Fut> AuthVerifier for F
where
    F: Fn(AuthContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AuthResult, HandlerError>> + Send + 'static,
{
    fn verify(&self, ctx: AuthContext) -> BoxFuture<'static, Result<AuthResult, HandlerError>> {
        Box::pin(self(ctx))
    }
}

/// Run the gate for one request.
///
/// With no verifier the gate is skipped and `locals.auth` stays empty.
/// Failures, including a panicking verifier, come back normalized through
/// `parse_error`.
pub(crate) async fn authenticate(
    verifier: Option<&dyn AuthVerifier>,
    ctx: AuthContext,
    locals: &mut RequestLocals,
    parse_error: impl FnOnce(HandlerError) -> XrpcError,
) -> Result<(), XrpcError> {
    let Some(verifier) = verifier else {
        return Ok(());
    };

    let verified = AssertUnwindSafe(async move { verifier.verify(ctx).await })
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(HandlerError::Unknown(panic_message("auth verifier", panic.as_ref())))
        });

    match verified {
        Ok(result) => {
            locals.auth = Some(result);
            Ok(())
        }
        Err(err) => Err(parse_error(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{normalize, ErrorResult, ResponseType};
    use axum::http::HeaderValue;

    fn auth_ctx(authorization: Option<&str>) -> AuthContext {
        let mut headers = HeaderMap::new();
        if let Some(value) = authorization {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        AuthContext {
            method_id: MethodId::new("io.example.secret"),
            method: Method::GET,
            uri: Uri::from_static("/xrpc/io.example.secret"),
            headers,
            params: Params::default(),
        }
    }

    #[derive(Debug, PartialEq)]
    struct Did(String);

    #[test]
    fn test_auth_result_downcast() {
        let result = AuthResult::new(Did("did:example:alice".into())).with_artifacts(42u32);

        assert_eq!(result.credentials::<Did>(), Some(&Did("did:example:alice".into())));
        assert_eq!(result.credentials::<String>(), None);
        assert_eq!(result.artifacts::<u32>(), Some(&42));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(auth_ctx(Some("Bearer abc")).bearer_token(), Some("abc"));
        assert_eq!(auth_ctx(Some("bearer  abc ")).bearer_token(), Some("abc"));
        assert_eq!(auth_ctx(Some("Basic abc")).bearer_token(), None);
        assert_eq!(auth_ctx(None).bearer_token(), None);
    }

    #[tokio::test]
    async fn test_gate_skipped_without_verifier() {
        let mut locals = RequestLocals::new(MethodId::new("io.example.secret"));

        authenticate(None, auth_ctx(None), &mut locals, normalize)
            .await
            .unwrap();

        assert!(locals.auth.is_none());
    }

    #[tokio::test]
    async fn test_gate_stores_result() {
        let verifier = |ctx: AuthContext| async move {
            Ok::<_, HandlerError>(AuthResult::new(Did(
                ctx.bearer_token().unwrap_or_default().to_string(),
            )))
        };
        let mut locals = RequestLocals::new(MethodId::new("io.example.secret"));

        authenticate(Some(&verifier), auth_ctx(Some("Bearer t1")), &mut locals, normalize)
            .await
            .unwrap();

        let auth = locals.auth.unwrap();
        assert_eq!(auth.credentials::<Did>(), Some(&Did("t1".into())));
    }

    #[tokio::test]
    async fn test_gate_maps_error_result() {
        let verifier = |_ctx: AuthContext| async move {
            Err::<AuthResult, HandlerError>(
                ErrorResult::new(403)
                    .with_error("AccountTakedown")
                    .with_message("suspended")
                    .into(),
            )
        };
        let mut locals = RequestLocals::new(MethodId::new("io.example.secret"));

        let err = authenticate(Some(&verifier), auth_ctx(None), &mut locals, normalize)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ResponseType::Forbidden));
        assert_eq!(err.error_name(), Some("AccountTakedown"));
        assert!(locals.auth.is_none());
    }

    #[tokio::test]
    async fn test_gate_catches_panicking_verifier() {
        let verifier = |_ctx: AuthContext| async move {
            if true {
                panic!("verifier blew up");
            }
            Ok::<_, HandlerError>(AuthResult::new(()))
        };
        let mut locals = RequestLocals::new(MethodId::new("io.example.secret"));

        let err = authenticate(Some(&verifier), auth_ctx(None), &mut locals, normalize)
            .await
            .unwrap_err();

        assert!(err.is_internal());
        assert_eq!(
            err.cause().map(|c| c.to_string()).as_deref(),
            Some("auth verifier panicked: verifier blew up")
        );
        assert!(locals.auth.is_none());
    }
}
