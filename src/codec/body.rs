//! Request body decoding with size limits.

use axum::body::Body;
use bytes::Bytes;
use http_body_util::LengthLimitError;
use serde_json::{Map, Value};

use super::RequestEncoding;
use crate::config::PayloadLimits;
use crate::error::XrpcError;
use crate::handler::HandlerInput;

/// Decode a request body according to its `Content-Type`.
///
/// Returns `InvalidRequest` for unsupported encodings and malformed bodies,
/// `PayloadTooLarge` when the body exceeds the limit for its encoding.
pub async fn decode_body(
    content_type: &str,
    body: Body,
    limits: PayloadLimits,
) -> Result<HandlerInput, XrpcError> {
    let encoding = RequestEncoding::classify(content_type).ok_or_else(|| {
        XrpcError::invalid_request(format!("Unsupported encoding: {content_type}"))
    })?;

    let limit = match encoding {
        RequestEncoding::Json => limits.json,
        RequestEncoding::Form | RequestEncoding::Text => limits.text,
    };
    let bytes = read_limited(body, limit).await?;

    let value = match encoding {
        RequestEncoding::Json => parse_json(&bytes)?,
        RequestEncoding::Form => parse_form(&bytes)?,
        RequestEncoding::Text => parse_text(bytes)?,
    };

    Ok(HandlerInput::new(content_type, value))
}

async fn read_limited(body: Body, limit: usize) -> Result<Bytes, XrpcError> {
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if is_length_limit(&e) => Err(XrpcError::payload_too_large(format!(
            "request entity too large (limit {limit} bytes)"
        ))),
        Err(e) => Err(XrpcError::invalid_request(format!(
            "Failed to read request body: {e}"
        ))),
    }
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return true;
        }
        source = cause.source();
    }
    false
}

fn parse_json(bytes: &[u8]) -> Result<Value, XrpcError> {
    serde_json::from_slice(bytes).map_err(|e| XrpcError::invalid_request(e.to_string()))
}

/// Form fields become a JSON object; repeated keys become arrays.
fn parse_form(bytes: &[u8]) -> Result<Value, XrpcError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
        .map_err(|e| XrpcError::invalid_request(e.to_string()))?;

    let mut fields = Map::new();
    for (key, value) in pairs {
        match fields.get_mut(&key) {
            None => {
                fields.insert(key, Value::String(value));
            }
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
        }
    }
    Ok(Value::Object(fields))
}

fn parse_text(bytes: Bytes) -> Result<Value, XrpcError> {
    String::from_utf8(bytes.to_vec())
        .map(Value::String)
        .map_err(|_| XrpcError::invalid_request("Request body is not valid UTF-8"))
}
