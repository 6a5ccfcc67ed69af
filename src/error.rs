//! XRPC error taxonomy.
//!
//! Every failure the server produces is normalized into an [`XrpcError`]
//! before it reaches the wire. The set of kinds is closed ([`ResponseType`]);
//! each one is bound to a fixed HTTP status.
//!
//! # Example
//!
//! ```
//! use xrpc_server::error::{normalize, ErrorResult, HandlerError, ResponseType};
//!
//! let err = normalize(HandlerError::from(ErrorResult::new(404)
//!     .with_error("NotFound")
//!     .with_message("no such record")));
//!
//! assert_eq!(err.status_code().as_u16(), 404);
//! assert_eq!(err.payload().error.as_deref(), Some("NotFound"));
//! assert_eq!(err.kind(), Some(ResponseType::XrpcNotSupported));
//! ```

use std::any::Any;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error used for opaque failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias using [`XrpcError`].
pub type Result<T> = std::result::Result<T, XrpcError>;

/// Wire error kinds and their HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseType {
    InvalidRequest = 400,
    AuthenticationRequired = 401,
    Forbidden = 403,
    XrpcNotSupported = 404,
    NotAcceptable = 406,
    PayloadTooLarge = 413,
    UnsupportedMediaType = 415,
    RateLimitExceeded = 429,
    InternalServerError = 500,
    MethodNotImplemented = 501,
    UpstreamFailure = 502,
    NotEnoughResources = 503,
    UpstreamTimeout = 504,
}

impl ResponseType {
    /// Look up the kind bound to an HTTP status, if any.
    pub fn from_status(status: u16) -> Option<Self> {
        let kind = match status {
            400 => Self::InvalidRequest,
            401 => Self::AuthenticationRequired,
            403 => Self::Forbidden,
            404 => Self::XrpcNotSupported,
            406 => Self::NotAcceptable,
            413 => Self::PayloadTooLarge,
            415 => Self::UnsupportedMediaType,
            429 => Self::RateLimitExceeded,
            500 => Self::InternalServerError,
            501 => Self::MethodNotImplemented,
            502 => Self::UpstreamFailure,
            503 => Self::NotEnoughResources,
            504 => Self::UpstreamTimeout,
            _ => return None,
        };
        Some(kind)
    }

    /// Numeric HTTP status.
    #[inline]
    pub fn status(self) -> u16 {
        self as u16
    }

    /// Canonical error name, used as the default `error` field.
    pub fn name(self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::AuthenticationRequired => "AuthenticationRequired",
            Self::Forbidden => "Forbidden",
            Self::XrpcNotSupported => "XRPCNotSupported",
            Self::NotAcceptable => "NotAcceptable",
            Self::PayloadTooLarge => "PayloadTooLarge",
            Self::UnsupportedMediaType => "UnsupportedMediaType",
            Self::RateLimitExceeded => "RateLimitExceeded",
            Self::InternalServerError => "InternalServerError",
            Self::MethodNotImplemented => "MethodNotImplemented",
            Self::UpstreamFailure => "UpstreamFailure",
            Self::NotEnoughResources => "NotEnoughResources",
            Self::UpstreamTimeout => "UpstreamTimeout",
        }
    }

    /// Generic human-readable string for the kind.
    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid Request",
            Self::AuthenticationRequired => "Authentication Required",
            Self::Forbidden => "Forbidden",
            Self::XrpcNotSupported => "XRPC Not Supported",
            Self::NotAcceptable => "Not Acceptable",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::UnsupportedMediaType => "Unsupported Media Type",
            Self::RateLimitExceeded => "Rate Limit Exceeded",
            Self::InternalServerError => "Internal Server Error",
            Self::MethodNotImplemented => "Method Not Implemented",
            Self::UpstreamFailure => "Upstream Failure",
            Self::NotEnoughResources => "Not Enough Resources",
            Self::UpstreamTimeout => "Upstream Timeout",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured error value: `{ status, error?, message? }`.
///
/// Handlers return this (directly or inside [`HandlerOutput::Error`]) to
/// signal a declared failure. Auth verifiers use it the same way.
///
/// [`HandlerOutput::Error`]: crate::handler::HandlerOutput::Error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResult {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            error: None,
            message: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Split a value that may carry a declared error into a `Result`.
pub fn exclude_error_result<T>(value: std::result::Result<T, ErrorResult>) -> Result<T> {
    value.map_err(XrpcError::from)
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Canonical wire error.
///
/// The status is always within `400..=599`; anything else is coerced to
/// [`ResponseType::InternalServerError`] on construction.
#[derive(Debug, Error)]
#[error("{}", self.display_message())]
pub struct XrpcError {
    status: u16,
    message: Option<String>,
    error_name: Option<String>,
    #[source]
    cause: Option<BoxError>,
}

impl XrpcError {
    /// Create an error of the given kind.
    pub fn new(kind: ResponseType, message: Option<String>) -> Self {
        Self {
            status: kind.status(),
            message,
            error_name: None,
            cause: None,
        }
    }

    /// Create an error from a raw status code.
    ///
    /// A status outside `400..=599` is sent as 500. The error name is kept
    /// either way, so the client still sees the declared error.
    pub fn from_status(status: u16, message: Option<String>, error_name: Option<String>) -> Self {
        if !(400..600).contains(&status) {
            return Self {
                status: ResponseType::InternalServerError.status(),
                message,
                error_name,
                cause: None,
            };
        }
        Self {
            status,
            message,
            error_name,
            cause: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ResponseType::InvalidRequest, Some(message.into()))
    }

    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(ResponseType::AuthenticationRequired, Some(message.into()))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ResponseType::Forbidden, Some(message.into()))
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(ResponseType::PayloadTooLarge, Some(message.into()))
    }

    /// Internal failure. The message is kept for logs only.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ResponseType::InternalServerError, Some(message.into()))
    }

    pub fn method_not_implemented() -> Self {
        Self::new(ResponseType::MethodNotImplemented, None)
    }

    pub fn upstream_failure(message: impl Into<String>) -> Self {
        Self::new(ResponseType::UpstreamFailure, Some(message.into()))
    }

    pub fn upstream_timeout(message: impl Into<String>) -> Self {
        Self::new(ResponseType::UpstreamTimeout, Some(message.into()))
    }

    pub fn not_enough_resources(message: impl Into<String>) -> Self {
        Self::new(ResponseType::NotEnoughResources, Some(message.into()))
    }

    /// Override the `error` field of the payload.
    pub fn with_error_name(mut self, name: impl Into<String>) -> Self {
        self.error_name = Some(name.into());
        self
    }

    /// Attach the underlying cause (logged, never rendered).
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// The taxonomy kind, when the status has one.
    pub fn kind(&self) -> Option<ResponseType> {
        ResponseType::from_status(self.status)
    }

    pub fn is_internal(&self) -> bool {
        self.status == ResponseType::InternalServerError.status()
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Caller-supplied message, if any. Not necessarily what is rendered.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error_name(&self) -> Option<&str> {
        self.error_name.as_deref()
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Wire payload.
    ///
    /// 500s always carry the generic description, never the original text.
    pub fn payload(&self) -> ErrorPayload {
        let kind = self.kind();
        let error = self
            .error_name
            .clone()
            .or_else(|| kind.map(|k| k.name().to_string()));
        let generic = kind.map(|k| k.description().to_string());
        let message = if self.is_internal() {
            generic
        } else {
            self.message.clone().filter(|m| !m.is_empty()).or(generic)
        };
        ErrorPayload { error, message }
    }

    fn display_message(&self) -> String {
        let name = self
            .error_name
            .as_deref()
            .or_else(|| self.kind().map(ResponseType::name))
            .unwrap_or("XRPCError");
        match &self.message {
            Some(message) => format!("{} ({}): {}", name, self.status, message),
            None => format!("{} ({})", name, self.status),
        }
    }
}

impl From<ErrorResult> for XrpcError {
    fn from(err: ErrorResult) -> Self {
        Self::from_status(err.status, err.message, err.error)
    }
}

impl IntoResponse for XrpcError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.payload())).into_response()
    }
}

/// Status reported by an upstream XRPC client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStatus {
    /// Network failure or unknown host.
    Unknown,
    /// The upstream answered with a response that does not fit its schema.
    InvalidResponse,
    /// A regular HTTP status.
    Http(u16),
}

/// Error raised by a client calling another XRPC service.
#[derive(Debug, Clone, Error)]
#[error("upstream error {status:?}: {message}")]
pub struct UpstreamError {
    pub status: UpstreamStatus,
    pub error: Option<String>,
    pub message: String,
}

impl UpstreamError {
    pub fn new(status: UpstreamStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            error: None,
            message: message.into(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Everything a handler or auth verifier can fail with.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Already a wire error.
    #[error(transparent)]
    Xrpc(#[from] XrpcError),

    /// Declared error value.
    #[error("error result: status {}", .0.status)]
    Result(ErrorResult),

    /// Failure of an upstream XRPC call.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Any other failure. Its message is never sent to the client.
    #[error("{0}")]
    Internal(#[source] BoxError),

    /// Failure with no error value at all (e.g. a panic payload).
    #[error("unexpected failure: {0}")]
    Unknown(String),
}

impl HandlerError {
    pub fn internal(err: impl Into<BoxError>) -> Self {
        Self::Internal(err.into())
    }
}

impl From<ErrorResult> for HandlerError {
    fn from(err: ErrorResult) -> Self {
        Self::Result(err)
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(Box::new(err))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(Box::new(err))
    }
}

/// Normalize any failure into the wire taxonomy.
pub fn normalize(cause: HandlerError) -> XrpcError {
    match cause {
        HandlerError::Xrpc(err) => err,
        HandlerError::Result(result) => XrpcError::from(result),
        HandlerError::Upstream(err) => from_upstream(err),
        HandlerError::Internal(err) => {
            XrpcError::new(ResponseType::InternalServerError, Some(err.to_string()))
                .with_cause(err)
        }
        HandlerError::Unknown(detail) => XrpcError::internal("Unexpected internal server error")
            .with_cause(detail),
    }
}

fn from_upstream(err: UpstreamError) -> XrpcError {
    match err.status {
        // Never reveal that the fault was upstream wiring.
        UpstreamStatus::Unknown | UpstreamStatus::InvalidResponse => {
            let kind = ResponseType::InternalServerError;
            XrpcError::new(kind, Some(kind.description().to_string()))
                .with_error_name(kind.name())
                .with_cause(err)
        }
        UpstreamStatus::Http(status) => {
            let message = Some(err.message.clone());
            let name = err.error.clone();
            XrpcError::from_status(status, message, name).with_cause(err)
        }
    }
}

impl From<HandlerError> for XrpcError {
    fn from(cause: HandlerError) -> Self {
        normalize(cause)
    }
}

/// Describe a caught panic payload.
pub(crate) fn panic_message(source: &str, panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("{source} panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("{source} panicked: {s}")
    } else {
        format!("{source} panicked")
    }
}
