//! Schema registry - lexicon documents and validation.
//!
//! The dispatcher only talks to schemas through [`SchemaRegistry`]. The
//! built-in [`Lexicons`] store covers the common cases; plug in another
//! implementation for full lexicon semantics.
//!
//! # Example
//!
//! ```
//! use xrpc_server::lexicon::{Lexicons, LexiconDoc, MethodKind, SchemaRegistry};
//!
//! let doc: LexiconDoc = serde_json::from_str(r#"{
//!     "lexicon": 1,
//!     "id": "io.example.ping",
//!     "defs": { "main": { "type": "query" } }
//! }"#).unwrap();
//!
//! let lexicons = Lexicons::new(vec![doc]).unwrap();
//! let def = lexicons.get_def("io.example.ping").unwrap();
//! assert_eq!(def.method_kind(), Some(MethodKind::Query));
//! ```

mod doc;
mod registry;
mod validate;

pub use doc::{
    LexArray, LexInteger, LexMeta, LexObject, LexRef, LexString, LexUnion, LexUserType,
    LexValueType, LexXrpcBody, LexXrpcError, LexXrpcParameters, LexXrpcProcedure, LexXrpcQuery,
    LexXrpcSubscription, LexiconDoc, MethodKind,
};
pub use registry::{Lexicons, SchemaRegistry};
pub use validate::{validate_body, validate_params};

use thiserror::Error;

/// Failure reported by a schema registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// No definition for the id.
    #[error("Lexicon not found: {0}")]
    NotFound(String),

    /// A document with the same id is already loaded.
    #[error("{0} has already been registered")]
    Duplicate(String),

    /// The definition exists but is not of the expected kind.
    #[error("{id} is not a {expected}")]
    WrongKind { id: String, expected: &'static str },

    /// The value does not conform to the schema.
    #[error("{0}")]
    Validation(String),
}
