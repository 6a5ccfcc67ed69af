//! Server builder and request dispatcher.
//!
//! The [`XrpcServerBuilder`] collects lexicon documents, method handlers and
//! configuration. [`XrpcServerBuilder::build`] freezes them into an
//! [`XrpcServer`], which serves every request through the same pipeline:
//!
//! 1. Routing - resolve the method id, check the HTTP verb
//! 2. Validating - parse the query string and request headers
//! 3. Authenticating - run the method's verifier, if any
//! 4. Decoding - decode and validate the body, validate the params
//! 5. Handling - invoke the handler
//! 6. Encoding - write the handler output
//!
//! A failure at any stage short-circuits to an error response.
//!
//! # Example
//!
//! ```no_run
//! use xrpc_server::{HandlerOutput, LexiconDoc, XrpcServerBuilder};
//!
//! # async fn run(docs: Vec<LexiconDoc>) -> Result<(), Box<dyn std::error::Error>> {
//! let server = XrpcServerBuilder::new(docs)?
//!     .handler("io.example.ping", |_ctx| async {
//!         Ok(HandlerOutput::json(serde_json::json!({ "pong": true })))
//!     })
//!     .build();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:2583").await?;
//! axum::serve(listener, server.router()).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use tracing::Instrument;

use crate::auth::{self, AuthContext};
use crate::config::ServerConfig;
use crate::encoder::encode_output;
use crate::error::{panic_message, HandlerError, XrpcError};
use crate::handler::{
    Handler, HandlerContext, HandlerOutput, HandlerResult, MethodConfig, MethodId,
    MethodRegistry, RequestLocals,
};
use crate::lexicon::{LexiconDoc, Lexicons, SchemaError, SchemaRegistry};
use crate::request;

/// Builder for configuring and creating an [`XrpcServer`].
pub struct XrpcServerBuilder<S = Lexicons> {
    schemas: S,
    methods: MethodRegistry,
    config: ServerConfig,
}

impl XrpcServerBuilder<Lexicons> {
    /// Create a builder backed by the built-in [`Lexicons`] store.
    ///
    /// Fails if two documents share an id.
    pub fn new(docs: impl IntoIterator<Item = LexiconDoc>) -> Result<Self, SchemaError> {
        Ok(Self::with_registry(Lexicons::new(docs)?))
    }
}

impl<S: SchemaRegistry> XrpcServerBuilder<S> {
    /// Create a builder backed by a custom schema registry.
    pub fn with_registry(schemas: S) -> Self {
        Self {
            schemas,
            methods: MethodRegistry::new(),
            config: ServerConfig::default(),
        }
    }

    /// Replace the server configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Load one more lexicon document.
    pub fn add_schema(&mut self, doc: LexiconDoc) -> Result<(), SchemaError> {
        self.schemas.add_schema(doc)
    }

    /// Load several lexicon documents, stopping at the first failure.
    pub fn add_schemas(
        &mut self,
        docs: impl IntoIterator<Item = LexiconDoc>,
    ) -> Result<(), SchemaError> {
        docs.into_iter().try_for_each(|doc| self.add_schema(doc))
    }

    /// Register a method, replacing any earlier registration for the id.
    pub fn register(&mut self, id: impl Into<MethodId>, config: MethodConfig) -> &mut Self {
        self.methods.register(id, config);
        self
    }

    /// Register a method (chaining form of [`register`](Self::register)).
    pub fn method(mut self, id: impl Into<MethodId>, config: MethodConfig) -> Self {
        self.register(id, config);
        self
    }

    /// Register a bare handler function with no auth and default limits.
    pub fn handler<F, Fut>(self, id: impl Into<MethodId>, handler: F) -> Self
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.method(id, MethodConfig::new(handler))
    }

    /// Register a handler taking deserialized params and input.
    pub fn typed_handler<F, P, I, Fut>(self, id: impl Into<MethodId>, handler: F) -> Self
    where
        F: Fn(P, I, HandlerContext) -> Fut + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        I: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.method(id, MethodConfig::typed(handler))
    }

    /// Freeze the configuration into a server.
    pub fn build(self) -> XrpcServer<S> {
        for id in self.methods.ids() {
            if self.schemas.get_def(id.as_str()).is_none() {
                tracing::warn!("Method {} has a handler but no lexicon definition", id);
            }
        }
        XrpcServer {
            inner: Arc::new(Shared {
                schemas: self.schemas,
                methods: self.methods,
                config: self.config,
            }),
        }
    }
}

impl<S> fmt::Debug for XrpcServerBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XrpcServerBuilder")
            .field("methods", &self.methods.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct Shared<S> {
    schemas: S,
    methods: MethodRegistry,
    config: ServerConfig,
}

/// A built XRPC server.
///
/// Cheap to clone; clones share the frozen method table and schemas.
pub struct XrpcServer<S = Lexicons> {
    inner: Arc<Shared<S>>,
}

impl<S> Clone for XrpcServer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for XrpcServer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XrpcServer")
            .field("methods", &self.inner.methods.ids())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<S: SchemaRegistry> XrpcServer<S> {
    /// Routes for every method, mounted at `{prefix}/{method_id}`.
    pub fn router(&self) -> Router {
        let path = format!("{}/{{method_id}}", self.inner.config.prefix());
        Router::new()
            .route(&path, any(serve::<S>))
            .with_state(self.clone())
    }

    /// Registered method ids, sorted.
    pub fn methods(&self) -> Vec<&MethodId> {
        self.inner.methods.ids()
    }

    pub fn schemas(&self) -> &S {
        &self.inner.schemas
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Serve one request for `method_id`.
    ///
    /// Always produces a response; failures are rendered as XRPC errors.
    pub async fn dispatch(&self, method_id: &str, request: Request) -> Response {
        let method_id = MethodId::new(method_id);
        let span = tracing::debug_span!("xrpc", method = %method_id, verb = %request.method());

        async {
            match self.process(&method_id, request).await {
                Ok(response) => response,
                Err(failure) => failure.render(&method_id),
            }
        }
        .instrument(span)
        .await
    }

    async fn process(&self, method_id: &MethodId, request: Request) -> Result<Response, Failure> {
        let shared = &*self.inner;

        let route = request::check_route(
            &shared.schemas,
            &shared.methods,
            method_id.as_str(),
            request.method(),
        )
        .at(Stage::Routing)?;

        let (parts, body) = request.into_parts();
        let params = request::parse_params(parts.uri.query()).at(Stage::Validating)?;
        let content_type = request::content_type(&parts.headers).at(Stage::Validating)?;

        let mut locals = RequestLocals::new(method_id.clone());
        if let Some(verifier) = route.config.auth() {
            let ctx = AuthContext {
                method_id: method_id.clone(),
                method: parts.method.clone(),
                uri: parts.uri.clone(),
                headers: parts.headers.clone(),
                params: params.clone(),
            };
            auth::authenticate(Some(verifier), ctx, &mut locals, |e| {
                shared.config.parse_error(e)
            })
            .await
            .at(Stage::Authenticating)?;
        }

        let limits = route.config.limits().unwrap_or(shared.config.limits());
        let input = request::decode_input(
            &shared.schemas,
            method_id,
            route.kind,
            content_type.as_deref(),
            body,
            limits,
        )
        .await
        .at(Stage::Decoding)?;
        request::validate_params(&shared.schemas, method_id, &params).at(Stage::Decoding)?;

        let ctx = HandlerContext::new(locals, params, input, parts.headers);
        let output = call_handler(route.config.handler(), ctx)
            .await
            .map_err(|e| shared.config.parse_error(e))
            .at(Stage::Handling)?;
        tracing::debug!(output = output.variant(), "handler returned");

        if let HandlerOutput::Error(result) = output {
            return Err(Failure::new(Stage::Handling, XrpcError::from(result)));
        }

        encode_output(&shared.schemas, method_id, output).at(Stage::Encoding)
    }
}

async fn serve<S: SchemaRegistry>(
    State(server): State<XrpcServer<S>>,
    Path(method_id): Path<String>,
    request: Request,
) -> Response {
    server.dispatch(&method_id, request).await
}

/// Invoke a handler, turning a panic into an unknown failure.
async fn call_handler(handler: &dyn Handler, ctx: HandlerContext) -> HandlerResult {
    match AssertUnwindSafe(async move { handler.call(ctx).await })
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Unknown(panic_message("handler", panic.as_ref()))),
    }
}

/// Pipeline stage a request failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Routing,
    Validating,
    Authenticating,
    Decoding,
    Handling,
    Encoding,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::Validating => "validating",
            Self::Authenticating => "authenticating",
            Self::Decoding => "decoding",
            Self::Handling => "handling",
            Self::Encoding => "encoding",
        }
    }
}

struct Failure {
    stage: Stage,
    error: XrpcError,
}

impl Failure {
    fn new(stage: Stage, error: XrpcError) -> Self {
        Self { stage, error }
    }

    fn render(self, method_id: &MethodId) -> Response {
        let error = self.error;
        if error.is_internal() {
            match error.cause() {
                Some(cause) => tracing::error!(
                    stage = self.stage.as_str(),
                    "unhandled exception in xrpc method {}: {}: {}",
                    method_id,
                    error,
                    cause
                ),
                None => tracing::error!(
                    stage = self.stage.as_str(),
                    "unhandled exception in xrpc method {}: {}",
                    method_id,
                    error
                ),
            }
        } else {
            tracing::debug!(
                stage = self.stage.as_str(),
                status = error.status_code().as_u16(),
                "error in xrpc method {}: {}",
                method_id,
                error
            );
        }
        error.into_response()
    }
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, Failure>;
}

impl<T> AtStage<T> for Result<T, XrpcError> {
    fn at(self, stage: Stage) -> Result<T, Failure> {
        self.map_err(|error| Failure::new(stage, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResponseType;
    use axum::body::Body;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};

    fn docs() -> Vec<LexiconDoc> {
        serde_json::from_value(json!([
            {
                "lexicon": 1,
                "id": "io.example.ping",
                "defs": { "main": { "type": "query" } }
            },
            {
                "lexicon": 1,
                "id": "io.example.boom",
                "defs": { "main": { "type": "procedure" } }
            }
        ]))
        .unwrap()
    }

    async fn error_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_builder_registers_methods() {
        let mut builder = XrpcServerBuilder::new(docs()).unwrap();
        builder.register(
            "io.example.boom",
            MethodConfig::new(|_ctx| async { Ok(HandlerOutput::Empty) }),
        );
        let server = builder
            .handler("io.example.ping", |_ctx| async { Ok(HandlerOutput::Empty) })
            .build();

        let ids: Vec<&str> = server.methods().into_iter().map(MethodId::as_str).collect();
        assert_eq!(ids, vec!["io.example.boom", "io.example.ping"]);
    }

    #[test]
    fn test_builder_rejects_duplicate_schema() {
        let mut builder = XrpcServerBuilder::new(docs()).unwrap();
        let err = builder.add_schemas(docs()).unwrap_err();
        assert_eq!(err, SchemaError::Duplicate("io.example.ping".into()));
    }

    #[test]
    fn test_server_is_clone() {
        let server = XrpcServerBuilder::new(docs()).unwrap().build();
        let server2 = server.clone();
        assert!(Arc::ptr_eq(&server.inner, &server2.inner));
    }

    #[tokio::test]
    async fn test_dispatch_panicking_handler() {
        let server = XrpcServerBuilder::new(docs())
            .unwrap()
            .handler("io.example.boom", |_ctx| async {
                if true {
                    panic!("kaboom");
                }
                Ok(HandlerOutput::Empty)
            })
            .build();

        let request = axum::http::Request::post("/xrpc/io.example.boom")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = server.dispatch("io.example.boom", request).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            error_body(response).await,
            json!({ "error": "InternalServerError", "message": "Internal Server Error" })
        );
    }

    #[tokio::test]
    async fn test_dispatch_panicking_verifier() {
        let verifier = |_ctx: AuthContext| async move {
            if true {
                panic!("verifier blew up");
            }
            Ok::<_, HandlerError>(crate::auth::AuthResult::new(()))
        };
        let server = XrpcServerBuilder::new(docs())
            .unwrap()
            .method(
                "io.example.ping",
                MethodConfig::new(|_ctx| async { Ok(HandlerOutput::Empty) }).with_auth(verifier),
            )
            .build();

        let request = axum::http::Request::get("/xrpc/io.example.ping")
            .body(Body::empty())
            .unwrap();
        let response = server.dispatch("io.example.ping", request).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            error_body(response).await,
            json!({ "error": "InternalServerError", "message": "Internal Server Error" })
        );
    }

    #[tokio::test]
    async fn test_dispatch_returned_error_result() {
        let server = XrpcServerBuilder::new(docs())
            .unwrap()
            .handler("io.example.ping", |_ctx| async {
                Ok(HandlerOutput::error(
                    crate::error::ErrorResult::new(400)
                        .with_error("RecordNotFound")
                        .with_message("no such record"),
                ))
            })
            .build();

        let request = axum::http::Request::get("/xrpc/io.example.ping")
            .body(Body::empty())
            .unwrap();
        let response = server.dispatch("io.example.ping", request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_body(response).await,
            json!({ "error": "RecordNotFound", "message": "no such record" })
        );
    }

    #[test]
    fn test_stage_tagging() {
        let failure = Err::<(), _>(XrpcError::forbidden("no"))
            .at(Stage::Authenticating)
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Authenticating);
        assert_eq!(failure.error.kind(), Some(ResponseType::Forbidden));
    }
}
