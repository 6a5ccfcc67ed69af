//! Per-request context passed to handlers.
//!
//! A [`HandlerContext`] is created fresh for every request and dropped when
//! the response has been produced. It carries the [`RequestLocals`] (method id
//! and auth result), the query parameters, the decoded input and the request
//! headers.
//!
//! # Example
//!
//! ```
//! use xrpc_server::handler::{HandlerContext, HandlerOutput, HandlerResult};
//!
//! async fn ping(ctx: HandlerContext) -> HandlerResult {
//!     let message = ctx.params().get("message").unwrap_or("pong");
//!     Ok(HandlerOutput::json(serde_json::json!({ "message": message })))
//! }
//! ```

use axum::http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::MethodId;
use crate::auth::AuthResult;

/// Per-request scratch state threaded from the auth gate to the handler.
#[derive(Debug, Clone)]
pub struct RequestLocals {
    /// Method being served.
    pub method_id: MethodId,
    /// Result of the auth gate, absent when no verifier is configured.
    pub auth: Option<AuthResult>,
}

impl RequestLocals {
    pub fn new(method_id: MethodId) -> Self {
        Self {
            method_id,
            auth: None,
        }
    }
}

/// Decoded request body with the encoding it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerInput {
    pub encoding: String,
    pub body: Value,
}

impl HandlerInput {
    pub fn new(encoding: impl Into<String>, body: Value) -> Self {
        Self {
            encoding: encoding.into(),
            body,
        }
    }
}

/// Query-string parameters, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    raw: String,
    pairs: Vec<(String, String)>,
}

impl Params {
    /// Parse a raw query string (without the leading `?`).
    pub fn from_query(query: &str) -> Result<Self, serde_urlencoded::de::Error> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)?;
        Ok(Self {
            raw: query.to_string(),
            pairs,
        })
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All values for `name`.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The query string as received.
    pub fn as_query_str(&self) -> &str {
        &self.raw
    }

    /// Deserialize into a typed parameter struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_urlencoded::de::Error> {
        serde_urlencoded::from_str(&self.raw)
    }
}

/// Context passed to method handlers.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    locals: RequestLocals,
    params: Params,
    input: Option<HandlerInput>,
    headers: HeaderMap,
}

impl HandlerContext {
    /// Create a context. The dispatcher does this for every request; tests
    /// can call it directly to drive a handler.
    pub fn new(
        locals: RequestLocals,
        params: Params,
        input: Option<HandlerInput>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            locals,
            params,
            input,
            headers,
        }
    }

    #[inline]
    pub fn method_id(&self) -> &MethodId {
        &self.locals.method_id
    }

    /// Auth result from the method's verifier, if one is configured.
    #[inline]
    pub fn auth(&self) -> Option<&AuthResult> {
        self.locals.auth.as_ref()
    }

    #[inline]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Decoded body, absent for requests without a `Content-Type`.
    #[inline]
    pub fn input(&self) -> Option<&HandlerInput> {
        self.input.as_ref()
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn locals(&self) -> &RequestLocals {
        &self.locals
    }

    /// Take the input out of the context.
    pub fn take_input(&mut self) -> Option<HandlerInput> {
        self.input.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_params_lookup() {
        let params = Params::from_query("uri=at%3A%2F%2Fx&tag=a&tag=b").unwrap();

        assert_eq!(params.get("uri"), Some("at://x"));
        assert_eq!(params.get("tag"), Some("a"));
        assert_eq!(params.get_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.len(), 3);
        assert_eq!(params.as_query_str(), "uri=at%3A%2F%2Fx&tag=a&tag=b");
    }

    #[test]
    fn test_params_empty() {
        let params = Params::from_query("").unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn test_params_deserialize() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct ListParams {
            limit: u32,
            cursor: Option<String>,
        }

        let params = Params::from_query("limit=25").unwrap();
        let typed: ListParams = params.deserialize().unwrap();
        assert_eq!(
            typed,
            ListParams {
                limit: 25,
                cursor: None
            }
        );

        let bad = Params::from_query("limit=lots").unwrap();
        assert!(bad.deserialize::<ListParams>().is_err());
    }

    #[test]
    fn test_context_accessors() {
        let locals = RequestLocals::new(MethodId::new("io.example.ping"));
        let input = HandlerInput::new("application/json", json!({ "a": 1 }));
        let mut ctx = HandlerContext::new(
            locals,
            Params::default(),
            Some(input.clone()),
            HeaderMap::new(),
        );

        assert_eq!(ctx.method_id().as_str(), "io.example.ping");
        assert!(ctx.auth().is_none());
        assert_eq!(ctx.input(), Some(&input));
        assert_eq!(ctx.take_input(), Some(input));
        assert!(ctx.input().is_none());
    }

    #[test]
    fn test_context_is_clone() {
        let ctx = HandlerContext::new(
            RequestLocals::new(MethodId::new("io.example.ping")),
            Params::default(),
            None,
            HeaderMap::new(),
        );
        let ctx2 = ctx.clone();
        assert_eq!(ctx.method_id(), ctx2.method_id());
    }
}
