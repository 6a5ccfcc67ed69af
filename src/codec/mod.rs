//! Codec module - request body decoding and encoding names.
//!
//! Request bodies are decoded by `Content-Type`, checked in this order:
//!
//! - `application/json*` - parsed as JSON
//! - `application/x-www-form-urlencoded*` - parsed as form fields
//! - `text/*` - read as UTF-8 text
//!
//! Anything else is rejected as an unsupported encoding.

mod body;

pub use body::decode_body;

/// Request body encodings the server can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEncoding {
    Json,
    Form,
    Text,
}

impl RequestEncoding {
    /// Classify a `Content-Type` value.
    pub fn classify(content_type: &str) -> Option<Self> {
        if content_type.starts_with("application/json") {
            Some(Self::Json)
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            Some(Self::Form)
        } else if content_type.starts_with("text/") {
            Some(Self::Text)
        } else {
            None
        }
    }
}

/// Whether an output encoding is rendered as canonical JSON.
#[inline]
pub fn is_json_encoding(encoding: &str) -> bool {
    encoding == "application/json" || encoding == "json"
}
