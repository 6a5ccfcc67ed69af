//! Server configuration.

use std::fmt;
use std::sync::Arc;

use crate::error::{normalize, HandlerError, XrpcError};

/// Default maximum size of a JSON request body.
pub const DEFAULT_JSON_LIMIT: usize = 100 * 1024;

/// Default maximum size of a text or form request body.
pub const DEFAULT_TEXT_LIMIT: usize = 100 * 1024;

/// Default path prefix of the route set.
pub const DEFAULT_ROUTE_PREFIX: &str = "/xrpc";

/// Custom conversion of handler failures into wire errors.
pub type ErrorParser = Arc<dyn Fn(HandlerError) -> XrpcError + Send + Sync>;

/// Maximum decoded request body sizes, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    pub json: usize,
    pub text: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            json: DEFAULT_JSON_LIMIT,
            text: DEFAULT_TEXT_LIMIT,
        }
    }
}

/// Configuration for an [`XrpcServer`](crate::XrpcServer).
#[derive(Clone)]
pub struct ServerConfig {
    pub(crate) limits: PayloadLimits,
    pub(crate) route_prefix: String,
    pub(crate) error_parser: Option<ErrorParser>,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            limits: PayloadLimits::default(),
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            error_parser: None,
        }
    }

    /// Set both payload limits.
    ///
    /// Default: 100 KiB each
    pub fn payload_limits(mut self, limits: PayloadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn json_limit(mut self, bytes: usize) -> Self {
        self.limits.json = bytes;
        self
    }

    pub fn text_limit(mut self, bytes: usize) -> Self {
        self.limits.text = bytes;
        self
    }

    /// Set the path prefix routes are mounted under.
    ///
    /// Default: `/xrpc`
    pub fn route_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_end_matches('/');
        self.route_prefix = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    /// Convert handler and verifier failures with a custom function.
    ///
    /// The function typically falls back to [`normalize`] for errors it
    /// does not recognize.
    pub fn error_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(HandlerError) -> XrpcError + Send + Sync + 'static,
    {
        self.error_parser = Some(Arc::new(parser));
        self
    }

    pub fn limits(&self) -> PayloadLimits {
        self.limits
    }

    pub fn prefix(&self) -> &str {
        &self.route_prefix
    }

    pub(crate) fn parse_error(&self, err: HandlerError) -> XrpcError {
        match &self.error_parser {
            Some(parser) => parser(err),
            None => normalize(err),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("limits", &self.limits)
            .field("route_prefix", &self.route_prefix)
            .field("error_parser", &self.error_parser.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResponseType;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.limits(), PayloadLimits::default());
        assert_eq!(config.limits().json, 100 * 1024);
        assert_eq!(config.prefix(), "/xrpc");
    }

    #[test]
    fn test_configuration() {
        let config = ServerConfig::new()
            .json_limit(10)
            .text_limit(20)
            .route_prefix("api/xrpc/");

        assert_eq!(config.limits(), PayloadLimits { json: 10, text: 20 });
        assert_eq!(config.prefix(), "/api/xrpc");
    }

    #[test]
    fn test_error_parser() {
        let config = ServerConfig::new().error_parser(|err| match err {
            HandlerError::Unknown(_) => XrpcError::not_enough_resources("try later"),
            other => normalize(other),
        });

        let err = config.parse_error(HandlerError::Unknown("oom".into()));
        assert_eq!(err.kind(), Some(ResponseType::NotEnoughResources));

        let err = config.parse_error(XrpcError::forbidden("no").into());
        assert_eq!(err.kind(), Some(ResponseType::Forbidden));
    }
}
