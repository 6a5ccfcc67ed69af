//! Handler module - method handlers, their context and their output.
//!
//! Provides:
//! - [`MethodRegistry`] - maps method ids to [`MethodConfig`]s
//! - [`HandlerContext`] - params, decoded input, headers and auth for one request
//! - [`HandlerOutput`] - the polymorphic result a handler returns
//!
//! # Example
//!
//! ```
//! use serde::Deserialize;
//! use xrpc_server::handler::{HandlerContext, HandlerOutput, MethodConfig, MethodRegistry};
//!
//! #[derive(Deserialize)]
//! struct EchoParams {
//!     text: String,
//! }
//!
//! let mut registry = MethodRegistry::new();
//!
//! // Untyped: read everything from the context
//! registry.register("io.example.ping", MethodConfig::new(|_ctx| async {
//!     Ok(HandlerOutput::json(serde_json::json!({ "pong": true })))
//! }));
//!
//! // Typed: params and input are deserialized before the call
//! registry.register(
//!     "io.example.echo",
//!     MethodConfig::typed(|params: EchoParams, _input: (), _ctx: HandlerContext| async move {
//!         Ok(HandlerOutput::success("text/plain", params.text))
//!     }),
//! );
//!
//! assert_eq!(registry.len(), 2);
//! ```

mod context;
mod output;
mod registry;

pub use context::{HandlerContext, HandlerInput, Params, RequestLocals};
pub use output::{byte_stream, chunk_stream, ByteStream, HandlerOutput, Headers, OutputBody};
pub use registry::{
    BoxFuture, Handler, HandlerResult, MethodConfig, MethodId, MethodRegistry, TypedHandler,
};
