//! Output encoder - turns a [`HandlerOutput`] into an HTTP response.
//!
//! Schema validation and header construction happen before the response
//! value exists, so a failure at either step still yields a clean error
//! response instead of a truncated success.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::TryStreamExt;
use serde_json::Value;

use crate::codec::is_json_encoding;
use crate::error::XrpcError;
use crate::handler::{ByteStream, HandlerOutput, Headers, MethodId, OutputBody};
use crate::lexicon::SchemaRegistry;

const APPLICATION_JSON: &str = "application/json";

/// Encode a handler result for `method_id`.
pub fn encode_output<S>(
    schemas: &S,
    method_id: &MethodId,
    output: HandlerOutput,
) -> Result<Response, XrpcError>
where
    S: SchemaRegistry + ?Sized,
{
    match output {
        HandlerOutput::Empty => {
            assert_output(schemas, method_id, None)?;
            Ok(respond(HeaderMap::new(), Body::empty()))
        }
        HandlerOutput::PipeThroughStream {
            encoding,
            stream,
            headers,
        } => {
            let headers = build_headers(&headers, &encoding)?;
            Ok(respond(headers, stream_body(method_id, stream)))
        }
        HandlerOutput::PipeThroughBuffer {
            encoding,
            buffer,
            headers,
        } => {
            let headers = build_headers(&headers, &encoding)?;
            Ok(respond(headers, Body::from(buffer)))
        }
        HandlerOutput::Error(result) => Err(XrpcError::from(result)),
        HandlerOutput::Success {
            encoding,
            body,
            headers,
        } => {
            assert_output(schemas, method_id, body.as_value())?;
            encode_success(schemas, method_id, &encoding, body, &headers)
        }
    }
}

fn encode_success<S>(
    schemas: &S,
    method_id: &MethodId,
    encoding: &str,
    body: OutputBody,
    headers: &Headers,
) -> Result<Response, XrpcError>
where
    S: SchemaRegistry + ?Sized,
{
    match body {
        OutputBody::Value(value) if is_json_encoding(encoding) => {
            let json = serde_json::to_vec(&schemas.to_canonical_json(value)).map_err(|e| {
                XrpcError::internal("failed to serialize output").with_cause(e)
            })?;
            let headers = build_headers(headers, APPLICATION_JSON)?;
            Ok(respond(headers, Body::from(json)))
        }
        OutputBody::Stream(stream) => {
            let headers = build_headers(headers, encoding)?;
            Ok(respond(headers, stream_body(method_id, stream)))
        }
        OutputBody::Bytes(bytes) => {
            let headers = build_headers(headers, encoding)?;
            Ok(respond(headers, Body::from(bytes)))
        }
        OutputBody::Value(value) => {
            let headers = build_headers(headers, encoding)?;
            Ok(respond(headers, Body::from(coerce_bytes(value)?)))
        }
    }
}

/// Raw bytes for a structured value under a non-JSON encoding.
fn coerce_bytes(value: Value) -> Result<Bytes, XrpcError> {
    match value {
        Value::String(text) => Ok(Bytes::from(text)),
        other => serde_json::to_vec(&other)
            .map(Bytes::from)
            .map_err(|e| XrpcError::internal("failed to serialize output").with_cause(e)),
    }
}

fn assert_output<S>(schemas: &S, method_id: &MethodId, body: Option<&Value>) -> Result<(), XrpcError>
where
    S: SchemaRegistry + ?Sized,
{
    schemas
        .assert_valid_output(method_id.as_str(), body)
        .map_err(|e| XrpcError::internal(format!("Invalid output: {e}")).with_cause(e))
}

/// Handler headers first, then the content type (which wins).
fn build_headers(extra: &Headers, content_type: &str) -> Result<HeaderMap, XrpcError> {
    let mut headers = HeaderMap::with_capacity(extra.len() + 1);
    for (name, value) in extra {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|e| XrpcError::internal(format!("invalid header name {name}")).with_cause(e))?;
        let value = HeaderValue::try_from(value.as_str())
            .map_err(|e| XrpcError::internal(format!("invalid value for {name}")).with_cause(e))?;
        headers.insert(name, value);
    }
    let content_type = HeaderValue::try_from(content_type)
        .map_err(|e| XrpcError::internal("invalid output encoding").with_cause(e))?;
    headers.insert(header::CONTENT_TYPE, content_type);
    Ok(headers)
}

fn respond(headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    *response.headers_mut() = headers;
    response
}

/// Forward a byte stream chunk for chunk. A failing stream aborts the
/// response; dropping the body (client went away) drops the stream.
fn stream_body(method_id: &MethodId, stream: ByteStream) -> Body {
    let method_id = method_id.clone();
    Body::from_stream(stream.inspect_err(move |e| {
        tracing::warn!("Stream error in xrpc method {}: {}", method_id, e);
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorResult, ResponseType};
    use crate::handler::chunk_stream;
    use crate::lexicon::{LexiconDoc, Lexicons};
    use http_body_util::BodyExt;
    use serde_json::json;

    fn lexicons() -> Lexicons {
        let docs: Vec<LexiconDoc> = serde_json::from_value(json!([
            {
                "lexicon": 1,
                "id": "io.example.getProfile",
                "defs": {
                    "main": {
                        "type": "query",
                        "output": {
                            "encoding": "application/json",
                            "schema": {
                                "type": "object",
                                "required": ["handle"],
                                "properties": { "handle": { "type": "string" } }
                            }
                        }
                    }
                }
            },
            {
                "lexicon": 1,
                "id": "io.example.getBlob",
                "defs": { "main": { "type": "query", "output": { "encoding": "*/*" } } }
            }
        ]))
        .unwrap();
        Lexicons::new(docs).unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_json_success() {
        let id = MethodId::new("io.example.getProfile");
        let output = HandlerOutput::json(json!({ "handle": "alice.test" }))
            .with_header("cache-control", "max-age=60")
            .with_header("content-type", "text/html");

        let response = encode_output(&lexicons(), &id, output).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()["cache-control"], "max-age=60");
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body, json!({ "handle": "alice.test" }));
    }

    #[tokio::test]
    async fn test_bare_json_token() {
        let id = MethodId::new("io.example.getBlob");
        let output = HandlerOutput::success("json", json!([1, 2]));

        let response = encode_output(&lexicons(), &id, output).unwrap();

        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_bytes(response).await, "[1,2]");
    }

    #[test]
    fn test_output_schema_violation_is_internal() {
        let id = MethodId::new("io.example.getProfile");
        let output = HandlerOutput::json(json!({ "name": "alice" }));

        let err = encode_output(&lexicons(), &id, output).unwrap_err();

        assert!(err.is_internal());
        assert!(err.message().unwrap().contains("handle"));
    }

    #[test]
    fn test_empty_checked_against_schema() {
        let err = encode_output(
            &lexicons(),
            &MethodId::new("io.example.getProfile"),
            HandlerOutput::Empty,
        )
        .unwrap_err();
        assert!(err.is_internal());
    }

    #[tokio::test]
    async fn test_empty_without_output_schema() {
        let response = encode_output(
            &lexicons(),
            &MethodId::new("io.example.getBlob"),
            HandlerOutput::Empty,
        )
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_pipe_through_buffer_skips_schema() {
        // The output schema requires an object; pass-through is exempt.
        let id = MethodId::new("io.example.getProfile");
        let output = HandlerOutput::buffer("application/octet-stream", &b"\x00\x01"[..])
            .with_header("x-trace", "1");

        let response = encode_output(&lexicons(), &id, output).unwrap();

        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(response.headers()["x-trace"], "1");
        assert_eq!(body_bytes(response).await, &b"\x00\x01"[..]);
    }

    #[tokio::test]
    async fn test_pipe_through_stream() {
        let id = MethodId::new("io.example.getBlob");
        let output = HandlerOutput::stream("text/plain", chunk_stream(vec!["one ", "two ", "three"]));

        let response = encode_output(&lexicons(), &id, output).unwrap();

        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(body_bytes(response).await, "one two three");
    }

    #[tokio::test]
    async fn test_success_with_bytes_and_text() {
        let id = MethodId::new("io.example.getBlob");

        let response = encode_output(
            &lexicons(),
            &id,
            HandlerOutput::success("image/png", vec![0x89u8, 0x50]),
        )
        .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(body_bytes(response).await, &[0x89u8, 0x50][..]);

        let response = encode_output(
            &lexicons(),
            &id,
            HandlerOutput::success("text/plain", json!("plain words")),
        )
        .unwrap();
        assert_eq!(body_bytes(response).await, "plain words");
    }

    #[test]
    fn test_error_result_raised() {
        let err = encode_output(
            &lexicons(),
            &MethodId::new("io.example.getBlob"),
            HandlerOutput::Error(ErrorResult::new(404).with_error("NotFound")),
        )
        .unwrap_err();

        assert_eq!(err.kind(), Some(ResponseType::XrpcNotSupported));
        assert_eq!(err.error_name(), Some("NotFound"));
    }

    #[test]
    fn test_invalid_header_is_internal() {
        let err = encode_output(
            &lexicons(),
            &MethodId::new("io.example.getBlob"),
            HandlerOutput::buffer("text/plain", "x").with_header("bad header", "v"),
        )
        .unwrap_err();
        assert!(err.is_internal());
    }
}
