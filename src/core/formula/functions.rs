//! Whitelisted built-in functions: ROUND, MIN, MAX, ABS, IF
//!
//! The set is closed. Names are resolved at parse time, so a formula can only ever call
//! one of these.

use std::fmt;

/// A built-in function a formula may call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Round,
    Min,
    Max,
    Abs,
    If,
}

impl Builtin {
    pub const ALL: [Builtin; 5] = [
        Builtin::Round,
        Builtin::Min,
        Builtin::Max,
        Builtin::Abs,
        Builtin::If,
    ];

    /// Resolve a function name, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ROUND" => Some(Builtin::Round),
            "MIN" => Some(Builtin::Min),
            "MAX" => Some(Builtin::Max),
            "ABS" => Some(Builtin::Abs),
            "IF" => Some(Builtin::If),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Round => "ROUND",
            Builtin::Min => "MIN",
            Builtin::Max => "MAX",
            Builtin::Abs => "ABS",
            Builtin::If => "IF",
        }
    }

    /// Exact number of arguments
    pub fn arity(self) -> usize {
        match self {
            Builtin::Abs => 1,
            Builtin::Round | Builtin::Min | Builtin::Max => 2,
            Builtin::If => 3,
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// ROUND(number, digits), half away from zero. Negative digits round to tens, hundreds, ...
pub(super) fn round(value: f64, digits: f64) -> f64 {
    let digits = digits.trunc().clamp(-308.0, 308.0) as i32;
    if digits < 0 {
        let step = 10_f64.powi(-digits);
        return (value / step).round() * step;
    }
    let multiplier = 10_f64.powi(digits);
    let scaled = value * multiplier;
    if !scaled.is_finite() {
        // Already more precise than f64 can express at this many digits
        return value;
    }
    scaled.round() / multiplier
}

pub(super) fn min(a: f64, b: f64) -> f64 {
    a.min(b)
}

pub(super) fn max(a: f64, b: f64) -> f64 {
    a.max(b)
}

pub(super) fn abs(value: f64) -> f64 {
    value.abs()
}
