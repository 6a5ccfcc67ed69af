//! Lexicon document model.
//!
//! Only the parts the dispatcher and the built-in validator need are typed;
//! unrecognized definition kinds deserialize as `Other`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A versioned schema document describing one namespace id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexiconDoc {
    pub lexicon: u32,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub defs: BTreeMap<String, LexUserType>,
}

impl LexiconDoc {
    /// The `main` definition, which is what an XRPC route binds to.
    pub fn main(&self) -> Option<&LexUserType> {
        self.defs.get("main")
    }
}

/// Top-level definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LexUserType {
    Query(LexXrpcQuery),
    Procedure(LexXrpcProcedure),
    Subscription(LexXrpcSubscription),
    Object(LexObject),
    #[serde(other)]
    Other,
}

/// Kind of an XRPC method definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Query,
    Procedure,
    Subscription,
}

impl MethodKind {
    /// HTTP verb a route of this kind is bound to.
    pub fn http_method(self) -> axum::http::Method {
        match self {
            Self::Procedure => axum::http::Method::POST,
            Self::Query | Self::Subscription => axum::http::Method::GET,
        }
    }
}

impl LexUserType {
    /// Method kind, if the definition is an XRPC method.
    pub fn method_kind(&self) -> Option<MethodKind> {
        match self {
            Self::Query(_) => Some(MethodKind::Query),
            Self::Procedure(_) => Some(MethodKind::Procedure),
            Self::Subscription(_) => Some(MethodKind::Subscription),
            Self::Object(_) | Self::Other => None,
        }
    }

    pub fn parameters(&self) -> Option<&LexXrpcParameters> {
        match self {
            Self::Query(q) => q.parameters.as_ref(),
            Self::Procedure(p) => p.parameters.as_ref(),
            Self::Subscription(s) => s.parameters.as_ref(),
            Self::Object(_) | Self::Other => None,
        }
    }

    pub fn input(&self) -> Option<&LexXrpcBody> {
        match self {
            Self::Procedure(p) => p.input.as_ref(),
            _ => None,
        }
    }

    pub fn output(&self) -> Option<&LexXrpcBody> {
        match self {
            Self::Query(q) => q.output.as_ref(),
            Self::Procedure(p) => p.output.as_ref(),
            _ => None,
        }
    }

    /// Declared error names.
    pub fn errors(&self) -> &[LexXrpcError] {
        match self {
            Self::Query(q) => &q.errors,
            Self::Procedure(p) => &p.errors,
            Self::Subscription(s) => &s.errors,
            Self::Object(_) | Self::Other => &[],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexXrpcQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<LexXrpcParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<LexXrpcBody>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LexXrpcError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexXrpcProcedure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<LexXrpcParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<LexXrpcBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<LexXrpcBody>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LexXrpcError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexXrpcSubscription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<LexXrpcParameters>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LexXrpcError>,
}

/// Query-string parameters of a method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexXrpcParameters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, LexValueType>,
}

/// Input or output body declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexXrpcBody {
    pub encoding: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<LexValueType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexXrpcError {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Field-level type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LexValueType {
    Object(LexObject),
    Array(LexArray),
    String(LexString),
    Integer(LexInteger),
    Boolean(LexMeta),
    Unknown(LexMeta),
    Bytes(LexMeta),
    CidLink(LexMeta),
    Blob(LexMeta),
    Null(LexMeta),
    Ref(LexRef),
    Union(LexUnion),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexObject {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nullable: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, LexValueType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexArray {
    pub items: Box<LexValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexString {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexInteger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<i64>>,
}

/// Types whose only interesting attribute is a description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexRef {
    #[serde(rename = "ref")]
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexUnion {
    #[serde(default)]
    pub refs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_query_doc() {
        let doc: LexiconDoc = serde_json::from_value(json!({
            "lexicon": 1,
            "id": "io.example.ping",
            "defs": {
                "main": {
                    "type": "query",
                    "parameters": {
                        "type": "params",
                        "properties": { "message": { "type": "string" } }
                    },
                    "output": { "encoding": "application/json" },
                    "errors": [{ "name": "Busy" }]
                }
            }
        }))
        .unwrap();

        let main = doc.main().unwrap();
        assert_eq!(main.method_kind(), Some(MethodKind::Query));
        assert_eq!(main.output().unwrap().encoding, "application/json");
        assert!(main.parameters().unwrap().properties.contains_key("message"));
        assert_eq!(main.errors()[0].name, "Busy");
    }

    #[test]
    fn test_parse_procedure_with_schema() {
        let doc: LexiconDoc = serde_json::from_value(json!({
            "lexicon": 1,
            "id": "io.example.createPost",
            "defs": {
                "main": {
                    "type": "procedure",
                    "input": {
                        "encoding": "application/json",
                        "schema": {
                            "type": "object",
                            "required": ["text"],
                            "properties": {
                                "text": { "type": "string", "maxLength": 300 },
                                "tags": { "type": "array", "items": { "type": "string" } },
                                "embed": { "type": "union", "refs": ["#image"] },
                                "draft": { "type": "boolean", "default": false }
                            }
                        }
                    }
                },
                "image": { "type": "object", "properties": {} },
                "token": { "type": "token" }
            }
        }))
        .unwrap();

        let main = doc.main().unwrap();
        assert_eq!(main.method_kind(), Some(MethodKind::Procedure));
        let Some(LexValueType::Object(schema)) = &main.input().unwrap().schema else {
            panic!("expected object schema");
        };
        assert_eq!(schema.required, vec!["text".to_string()]);
        assert!(matches!(
            schema.properties.get("text"),
            Some(LexValueType::String(LexString { max_length: Some(300), .. }))
        ));
        assert_eq!(doc.defs.get("token"), Some(&LexUserType::Other));
    }

    #[test]
    fn test_http_method_for_kind() {
        assert_eq!(MethodKind::Query.http_method(), axum::http::Method::GET);
        assert_eq!(MethodKind::Procedure.http_method(), axum::http::Method::POST);
    }
}
