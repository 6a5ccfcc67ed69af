//! Schema registry trait and the built-in lexicon store.

use std::collections::HashMap;

use serde_json::Value;

use super::doc::{LexUserType, LexiconDoc, MethodKind};
use super::validate::{validate_body, validate_params};
use super::SchemaError;
use crate::handler::{HandlerInput, Params};

/// Source of method definitions and validation.
///
/// Registries are mutated only while the server is being built and are
/// read-only once requests are served.
pub trait SchemaRegistry: Send + Sync + 'static {
    /// Load a schema document.
    fn add_schema(&mut self, doc: LexiconDoc) -> Result<(), SchemaError>;

    /// Look up a definition by method id (`nsid` or `nsid#name`).
    fn get_def(&self, id: &str) -> Option<&LexUserType>;

    /// Validate query-string parameters.
    fn assert_valid_params(&self, id: &str, params: &Params) -> Result<(), SchemaError>;

    /// Validate a decoded request body.
    fn assert_valid_input(&self, id: &str, input: &HandlerInput) -> Result<(), SchemaError>;

    /// Validate a response body. `None` means the handler produced no value.
    fn assert_valid_output(&self, id: &str, body: Option<&Value>) -> Result<(), SchemaError>;

    /// Convert a value into its canonical JSON form.
    fn to_canonical_json(&self, value: Value) -> Value {
        value
    }
}

/// In-memory lexicon store keyed by document id.
#[derive(Debug, Clone, Default)]
pub struct Lexicons {
    docs: HashMap<String, LexiconDoc>,
}

impl Lexicons {
    /// Create a store preloaded with documents.
    pub fn new(docs: impl IntoIterator<Item = LexiconDoc>) -> Result<Self, SchemaError> {
        let mut lexicons = Self::default();
        for doc in docs {
            lexicons.add_schema(doc)?;
        }
        Ok(lexicons)
    }

    /// Number of loaded documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn get_method(&self, id: &str) -> Result<(&LexUserType, MethodKind), SchemaError> {
        let def = self
            .get_def(id)
            .ok_or_else(|| SchemaError::NotFound(id.to_string()))?;
        let kind = def.method_kind().ok_or_else(|| SchemaError::WrongKind {
            id: id.to_string(),
            expected: "query, procedure or subscription",
        })?;
        Ok((def, kind))
    }
}

impl SchemaRegistry for Lexicons {
    fn add_schema(&mut self, doc: LexiconDoc) -> Result<(), SchemaError> {
        if self.docs.contains_key(&doc.id) {
            return Err(SchemaError::Duplicate(doc.id));
        }
        tracing::debug!("Loaded lexicon {}", doc.id);
        self.docs.insert(doc.id.clone(), doc);
        Ok(())
    }

    fn get_def(&self, id: &str) -> Option<&LexUserType> {
        let id = id.strip_prefix("lex:").unwrap_or(id);
        let (nsid, name) = id.split_once('#').unwrap_or((id, "main"));
        self.docs.get(nsid)?.defs.get(name)
    }

    fn assert_valid_params(&self, id: &str, params: &Params) -> Result<(), SchemaError> {
        let (def, _) = self.get_method(id)?;
        match def.parameters() {
            Some(parameters) => validate_params(parameters, params),
            None => Ok(()),
        }
    }

    fn assert_valid_input(&self, id: &str, input: &HandlerInput) -> Result<(), SchemaError> {
        let (def, kind) = self.get_method(id)?;
        if kind != MethodKind::Procedure {
            return Err(SchemaError::WrongKind {
                id: id.to_string(),
                expected: "procedure",
            });
        }
        match def.input().and_then(|body| body.schema.as_ref()) {
            Some(schema) => validate_body("Input", schema, &input.body),
            None => Ok(()),
        }
    }

    fn assert_valid_output(&self, id: &str, body: Option<&Value>) -> Result<(), SchemaError> {
        let (def, _) = self.get_method(id)?;
        let Some(schema) = def.output().and_then(|output| output.schema.as_ref()) else {
            return Ok(());
        };
        match body {
            Some(value) => validate_body("Output", schema, value),
            None => Err(SchemaError::Validation("Output must be an object".into())),
        }
    }
}
