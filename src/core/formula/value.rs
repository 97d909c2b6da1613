//! Runtime values and their JSON mapping

use std::fmt;

use serde_json::Value as JsonValue;

use super::evaluator::EvalError;

/// Value type produced by evaluation and used for formula inputs
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

/// The kind of a [`Value`], used in type errors and comparison reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Text,
    Bool,
    Null,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Number => "Number",
            ValueKind::Text => "Text",
            ValueKind::Bool => "Bool",
            ValueKind::Null => "Null",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Text(_) => ValueKind::Text,
            Value::Bool(_) => ValueKind::Bool,
            Value::Null => ValueKind::Null,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Coerce a JSON input into a value.
    ///
    /// Arrays and objects have no formula representation; `name` is the input key reported
    /// in the resulting [`EvalError::UnsupportedInputType`].
    pub fn from_json(name: &str, json: &JsonValue) -> Result<Self, EvalError> {
        match json {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::String(s) => Ok(Value::Text(s.clone())),
            JsonValue::Number(n) => n.as_f64().map(Value::Number).ok_or_else(|| {
                EvalError::UnsupportedInputType {
                    name: name.to_string(),
                    found: "number outside f64 range".to_string(),
                }
            }),
            JsonValue::Array(_) => Err(EvalError::UnsupportedInputType {
                name: name.to_string(),
                found: "array".to_string(),
            }),
            JsonValue::Object(_) => Err(EvalError::UnsupportedInputType {
                name: name.to_string(),
                found: "object".to_string(),
            }),
        }
    }

    /// Convert to JSON for storage as an `actual_result`.
    ///
    /// Integral numbers are stored as JSON integers so `150` round-trips as `150`.
    /// Non-finite numbers never reach here: the evaluator rejects them.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    JsonValue::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(JsonValue::Number)
                        .unwrap_or(JsonValue::Null)
                }
            }
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Null => JsonValue::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Text(s) => write!(f, "\"{}\"", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => f.write_str("null"),
        }
    }
}
