//! Expected-vs-actual comparison with relative numeric tolerance

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::formula::Value;

/// Default relative tolerance for numeric comparison
pub const DEFAULT_EPSILON: f64 = 1e-9;

pub const REASON_NO_EXPECTATION: &str = "no expectation";
pub const REASON_WITHIN_TOLERANCE: &str = "numeric within tolerance";
pub const REASON_MATCH: &str = "values match";
pub const REASON_DIFFER: &str = "values differ";
pub const REASON_TYPE_MISMATCH: &str = "type mismatch";
pub const REASON_UNSUPPORTED: &str = "unsupported expected type";

/// Outcome of comparing an expected result with an actual value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub matched: bool,
    pub reason: String,
    /// Signed `actual - expected`, only for numbers that differ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<f64>,
}

impl Comparison {
    fn new(matched: bool, reason: &str) -> Self {
        Self {
            matched,
            reason: reason.to_string(),
            difference: None,
        }
    }
}

/// True when `a` and `b` are within `epsilon` relative to the larger magnitude (floor 1)
pub fn numbers_match(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() <= epsilon * 1f64.max(a.abs()).max(b.abs())
}

/// Compare an optional expected JSON value against an evaluated value.
///
/// `None` means the test case has no expectation and always matches. An expected JSON
/// `null` is an expectation of [`Value::Null`].
pub fn compare(expected: Option<&JsonValue>, actual: &Value, epsilon: f64) -> Comparison {
    let Some(expected) = expected else {
        return Comparison::new(true, REASON_NO_EXPECTATION);
    };

    match (expected, actual) {
        (JsonValue::Array(_) | JsonValue::Object(_), _) => {
            Comparison::new(false, REASON_UNSUPPORTED)
        }

        (JsonValue::Number(e), Value::Number(a)) => {
            let Some(e) = e.as_f64() else {
                return Comparison::new(false, REASON_UNSUPPORTED);
            };
            if numbers_match(*a, e, epsilon) {
                Comparison::new(true, REASON_WITHIN_TOLERANCE)
            } else {
                Comparison {
                    difference: Some(a - e),
                    ..Comparison::new(false, REASON_DIFFER)
                }
            }
        }

        (JsonValue::String(e), Value::Text(a)) => exact(e == a),
        (JsonValue::Bool(e), Value::Bool(a)) => exact(e == a),
        (JsonValue::Null, Value::Null) => exact(true),

        _ => Comparison::new(false, REASON_TYPE_MISMATCH),
    }
}

fn exact(equal: bool) -> Comparison {
    if equal {
        Comparison::new(true, REASON_MATCH)
    } else {
        Comparison::new(false, REASON_DIFFER)
    }
}
