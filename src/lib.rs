//! # xrpc-server
//!
//! Schema-described XRPC method dispatch over HTTP.
//!
//! Each remote method is identified by a namespaced id (`io.example.ping`)
//! and described by a lexicon document giving its kind (query or
//! procedure), parameters, input and output. The server validates every
//! request against that description, runs an optional per-method auth gate,
//! invokes the handler and encodes its result, or any failure along the way,
//! using the fixed XRPC error taxonomy.
//!
//! ## Architecture
//!
//! - **Schemas** ([`lexicon`]): lexicon documents behind the [`SchemaRegistry`] trait
//! - **Handlers** ([`handler`]): per-method functions returning a [`HandlerOutput`]
//! - **Auth** ([`auth`]): optional verifiers run before the handler
//! - **Server** ([`XrpcServer`]): routing, decoding, dispatch and encoding on `axum`
//!
//! ## Example
//!
//! ```no_run
//! use xrpc_server::{HandlerOutput, LexiconDoc, XrpcServerBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let doc: LexiconDoc = serde_json::from_str(r#"{
//!         "lexicon": 1,
//!         "id": "io.example.ping",
//!         "defs": { "main": { "type": "query" } }
//!     }"#)?;
//!
//!     let server = XrpcServerBuilder::new(vec![doc])?
//!         .handler("io.example.ping", |_ctx| async {
//!             Ok(HandlerOutput::json(serde_json::json!({ "pong": true })))
//!         })
//!         .build();
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:2583").await?;
//!     axum::serve(listener, server.router()).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod lexicon;

mod encoder;
mod request;
mod server;

pub use auth::{AuthContext, AuthResult, AuthVerifier};
pub use config::{PayloadLimits, ServerConfig};
pub use error::{ErrorResult, HandlerError, ResponseType, XrpcError};
pub use handler::{HandlerContext, HandlerOutput, HandlerResult, MethodConfig, MethodId};
pub use lexicon::{LexiconDoc, Lexicons, SchemaError, SchemaRegistry};
pub use server::{XrpcServer, XrpcServerBuilder};
