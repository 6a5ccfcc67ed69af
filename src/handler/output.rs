//! Handler results.
//!
//! A handler produces exactly one [`HandlerOutput`] variant per request:
//! - `Empty` - no body
//! - `Success` - body validated against the output schema, then encoded
//! - `PipeThroughBuffer` - pre-encoded bytes, sent as-is
//! - `PipeThroughStream` - live byte stream, forwarded chunk by chunk
//! - `Error` - declared failure, rendered through the error taxonomy

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;

use crate::error::{BoxError, ErrorResult};

/// Response headers set by a handler.
pub type Headers = BTreeMap<String, String>;

/// Live byte stream. Dropping it cancels the producer.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send + 'static>>;

/// Box any fallible byte stream.
pub fn byte_stream<S, B, E>(stream: S) -> ByteStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: Into<Bytes> + 'static,
    E: Into<BoxError> + 'static,
{
    Box::pin(
        stream
            .map_ok(Into::<Bytes>::into)
            .map_err(Into::<BoxError>::into),
    )
}

/// Stream over chunks that are already in memory.
pub fn chunk_stream<I, B>(chunks: I) -> ByteStream
where
    I: IntoIterator<Item = B>,
    I::IntoIter: Send + 'static,
    B: Into<Bytes> + 'static,
{
    Box::pin(stream::iter(
        chunks.into_iter().map(|chunk| Ok::<Bytes, BoxError>(chunk.into())),
    ))
}

/// Body of a [`HandlerOutput::Success`].
pub enum OutputBody {
    /// Structured value, canonicalized for JSON encodings.
    Value(Value),
    /// Raw bytes.
    Bytes(Bytes),
    /// Live byte stream.
    Stream(ByteStream),
}

impl OutputBody {
    /// Value to hand to output validation, if the body is structured.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Bytes(_) | Self::Stream(_) => None,
        }
    }
}

impl fmt::Debug for OutputBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Value> for OutputBody {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Bytes> for OutputBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for OutputBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for OutputBody {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

impl From<ByteStream> for OutputBody {
    fn from(stream: ByteStream) -> Self {
        Self::Stream(stream)
    }
}

/// Result of a successful handler call.
pub enum HandlerOutput {
    Empty,
    Success {
        encoding: String,
        body: OutputBody,
        headers: Headers,
    },
    PipeThroughBuffer {
        encoding: String,
        buffer: Bytes,
        headers: Headers,
    },
    PipeThroughStream {
        encoding: String,
        stream: ByteStream,
        headers: Headers,
    },
    Error(ErrorResult),
}

impl HandlerOutput {
    /// `application/json` success.
    pub fn json(body: Value) -> Self {
        Self::success("application/json", body)
    }

    pub fn success(encoding: impl Into<String>, body: impl Into<OutputBody>) -> Self {
        Self::Success {
            encoding: encoding.into(),
            body: body.into(),
            headers: Headers::new(),
        }
    }

    pub fn buffer(encoding: impl Into<String>, buffer: impl Into<Bytes>) -> Self {
        Self::PipeThroughBuffer {
            encoding: encoding.into(),
            buffer: buffer.into(),
            headers: Headers::new(),
        }
    }

    pub fn stream(encoding: impl Into<String>, stream: ByteStream) -> Self {
        Self::PipeThroughStream {
            encoding: encoding.into(),
            stream,
            headers: Headers::new(),
        }
    }

    pub fn error(result: ErrorResult) -> Self {
        Self::Error(result)
    }

    /// Add a response header. Ignored for `Empty` and `Error`.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(headers) = self.headers_mut() {
            headers.insert(name.into(), value.into());
        }
        self
    }

    fn headers_mut(&mut self) -> Option<&mut Headers> {
        match self {
            Self::Success { headers, .. }
            | Self::PipeThroughBuffer { headers, .. }
            | Self::PipeThroughStream { headers, .. } => Some(headers),
            Self::Empty | Self::Error(_) => None,
        }
    }

    /// Variant name, as logged once the handler returns.
    pub fn variant(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Success { .. } => "success",
            Self::PipeThroughBuffer { .. } => "pipe-through-buffer",
            Self::PipeThroughStream { .. } => "pipe-through-stream",
            Self::Error(_) => "error",
        }
    }
}

impl fmt::Debug for HandlerOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Success {
                encoding,
                body,
                headers,
            } => f
                .debug_struct("Success")
                .field("encoding", encoding)
                .field("body", body)
                .field("headers", headers)
                .finish(),
            Self::PipeThroughBuffer {
                encoding,
                buffer,
                headers,
            } => f
                .debug_struct("PipeThroughBuffer")
                .field("encoding", encoding)
                .field("len", &buffer.len())
                .field("headers", headers)
                .finish(),
            Self::PipeThroughStream {
                encoding, headers, ..
            } => f
                .debug_struct("PipeThroughStream")
                .field("encoding", encoding)
                .field("headers", headers)
                .finish_non_exhaustive(),
            Self::Error(result) => f.debug_tuple("Error").field(result).finish(),
        }
    }
}

impl From<ErrorResult> for HandlerOutput {
    fn from(result: ErrorResult) -> Self {
        Self::Error(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[test]
    fn test_with_header_on_success() {
        let output = HandlerOutput::json(json!({})).with_header("cache-control", "no-store");

        let HandlerOutput::Success { headers, .. } = output else {
            panic!("expected success");
        };
        assert_eq!(headers.get("cache-control").map(String::as_str), Some("no-store"));
    }

    #[test]
    fn test_with_header_ignored_on_error() {
        let output = HandlerOutput::error(ErrorResult::new(400)).with_header("x", "y");
        assert_eq!(output.variant(), "error");
    }

    #[test]
    fn test_variant_names() {
        let stream = HandlerOutput::stream("text/plain", chunk_stream(vec!["a"]));

        assert_eq!(HandlerOutput::Empty.variant(), "empty");
        assert_eq!(HandlerOutput::json(json!({})).variant(), "success");
        assert_eq!(HandlerOutput::buffer("text/plain", "x").variant(), "pipe-through-buffer");
        assert_eq!(stream.variant(), "pipe-through-stream");
    }

    #[test]
    fn test_body_conversions() {
        assert!(OutputBody::from(json!(1)).as_value().is_some());
        assert!(OutputBody::from(vec![1u8, 2]).as_value().is_none());
        assert!(matches!(OutputBody::from("hi".to_string()), OutputBody::Bytes(b) if b == "hi"));
    }

    #[tokio::test]
    async fn test_chunk_stream_order() {
        let stream = chunk_stream(vec!["a", "b", "c"]);
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_byte_stream_maps_errors() {
        let items: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"ok".to_vec()),
            Err(std::io::Error::other("broken pipe")),
        ];
        let mut stream = byte_stream(futures::stream::iter(items));

        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"ok"));
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "broken pipe");
    }
}
