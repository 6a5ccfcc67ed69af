//! Structural validation of values against lexicon types.
//!
//! Covers required properties, primitive types, integer bounds, string and
//! array lengths. References and unions are accepted as-is.

use serde_json::Value;

use super::doc::{LexArray, LexInteger, LexObject, LexString, LexValueType, LexXrpcParameters};
use super::SchemaError;
use crate::handler::Params;

/// Validate a JSON value against a body schema.
pub fn validate_body(path: &str, schema: &LexValueType, value: &Value) -> Result<(), SchemaError> {
    validate_value(path, schema, value)
}

/// Validate query-string parameters. Values arrive as strings and are
/// coerced to the declared primitive type.
pub fn validate_params(def: &LexXrpcParameters, params: &Params) -> Result<(), SchemaError> {
    for name in &def.required {
        if params.get(name).is_none() {
            return Err(invalid(format!(
                "Params must have the property \"{name}\""
            )));
        }
    }

    for (name, property) in &def.properties {
        let values: Vec<&str> = params.get_all(name).collect();
        if values.is_empty() {
            continue;
        }
        let path = format!("Params/{name}");
        match property {
            LexValueType::Array(array) => {
                check_length(&path, values.len(), array.min_length, array.max_length)?;
                for raw in values {
                    validate_param(&path, &array.items, raw)?;
                }
            }
            other => {
                if values.len() > 1 {
                    return Err(invalid(format!("{path} must not be repeated")));
                }
                validate_param(&path, other, values[0])?;
            }
        }
    }
    Ok(())
}

fn validate_param(path: &str, def: &LexValueType, raw: &str) -> Result<(), SchemaError> {
    match def {
        LexValueType::Integer(int) => {
            let n: i64 = raw
                .parse()
                .map_err(|_| invalid(format!("{path} must be an integer")))?;
            check_integer(path, int, n)
        }
        LexValueType::Boolean(_) => match raw {
            "true" | "false" => Ok(()),
            _ => Err(invalid(format!("{path} must be a boolean"))),
        },
        LexValueType::String(string) => check_string(path, string, raw),
        LexValueType::Unknown(_) | LexValueType::Other => Ok(()),
        _ => Err(invalid(format!("{path} has an unsupported parameter type"))),
    }
}

fn validate_value(path: &str, def: &LexValueType, value: &Value) -> Result<(), SchemaError> {
    match def {
        LexValueType::Object(object) => validate_object(path, object, value),
        LexValueType::Array(array) => validate_array(path, array, value),
        LexValueType::String(string) => match value {
            Value::String(s) => check_string(path, string, s),
            _ => Err(invalid(format!("{path} must be a string"))),
        },
        LexValueType::Integer(int) => match value.as_i64() {
            Some(n) => check_integer(path, int, n),
            None => Err(invalid(format!("{path} must be an integer"))),
        },
        LexValueType::Boolean(_) => match value {
            Value::Bool(_) => Ok(()),
            _ => Err(invalid(format!("{path} must be a boolean"))),
        },
        LexValueType::Null(_) => match value {
            Value::Null => Ok(()),
            _ => Err(invalid(format!("{path} must be null"))),
        },
        LexValueType::Unknown(_) => match value {
            Value::Object(_) => Ok(()),
            _ => Err(invalid(format!("{path} must be an object"))),
        },
        LexValueType::Bytes(_)
        | LexValueType::CidLink(_)
        | LexValueType::Blob(_)
        | LexValueType::Ref(_)
        | LexValueType::Union(_)
        | LexValueType::Other => Ok(()),
    }
}

fn validate_object(path: &str, def: &LexObject, value: &Value) -> Result<(), SchemaError> {
    let Value::Object(map) = value else {
        return Err(invalid(format!("{path} must be an object")));
    };

    for name in &def.required {
        let present = match map.get(name) {
            None => false,
            Some(Value::Null) => def.nullable.contains(name),
            Some(_) => true,
        };
        if !present {
            return Err(invalid(format!(
                "{path} must have the property \"{name}\""
            )));
        }
    }

    for (name, property) in &def.properties {
        match map.get(name) {
            None => {}
            Some(Value::Null) if def.nullable.contains(name) => {}
            Some(field) => validate_value(&format!("{path}/{name}"), property, field)?,
        }
    }
    Ok(())
}

fn validate_array(path: &str, def: &LexArray, value: &Value) -> Result<(), SchemaError> {
    let Value::Array(items) = value else {
        return Err(invalid(format!("{path} must be an array")));
    };
    check_length(path, items.len(), def.min_length, def.max_length)?;
    for (i, item) in items.iter().enumerate() {
        validate_value(&format!("{path}/{i}"), &def.items, item)?;
    }
    Ok(())
}

fn check_string(path: &str, def: &LexString, s: &str) -> Result<(), SchemaError> {
    // Lexicon lengths are measured in UTF-8 bytes.
    check_length(path, s.len(), def.min_length, def.max_length)?;
    if let Some(allowed) = &def.enum_values {
        if !allowed.iter().any(|v| v == s) {
            return Err(invalid(format!(
                "{path} must be one of ({})",
                allowed.join("|")
            )));
        }
    }
    Ok(())
}

fn check_integer(path: &str, def: &LexInteger, n: i64) -> Result<(), SchemaError> {
    if let Some(min) = def.minimum {
        if n < min {
            return Err(invalid(format!("{path} can not be less than {min}")));
        }
    }
    if let Some(max) = def.maximum {
        if n > max {
            return Err(invalid(format!("{path} can not be greater than {max}")));
        }
    }
    if let Some(allowed) = &def.enum_values {
        if !allowed.contains(&n) {
            return Err(invalid(format!("{path} must be one of the allowed values")));
        }
    }
    Ok(())
}

fn check_length(
    path: &str,
    len: usize,
    min: Option<usize>,
    max: Option<usize>,
) -> Result<(), SchemaError> {
    if let Some(min) = min {
        if len < min {
            return Err(invalid(format!("{path} must not be shorter than {min}")));
        }
    }
    if let Some(max) = max {
        if len > max {
            return Err(invalid(format!("{path} must not be longer than {max}")));
        }
    }
    Ok(())
}

fn invalid(message: String) -> SchemaError {
    SchemaError::Validation(message)
}
