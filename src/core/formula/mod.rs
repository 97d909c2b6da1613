//! Formula engine: tokenizer, parser and evaluator for the pricing expression language
//!
//! Formulas are untrusted text. The engine never executes host code: names resolve to
//! inputs or to a closed set of built-ins, the AST depth is capped at parse time, and
//! evaluation counts every node visit against a budget.
//!
//! ```
//! use pricing_forge::core::formula::FormulaEngine;
//! use serde_json::json;
//!
//! let engine = FormulaEngine::default();
//! let expr = engine.compile("base_price + 50").unwrap();
//! let input = json!({"base_price": 100}).as_object().cloned().unwrap();
//! assert_eq!(engine.evaluate(&expr, &input).unwrap().to_json(), json!(150));
//! ```

pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod tokenizer;
pub mod value;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

pub use evaluator::{Environment, EvalError, Evaluator, DEFAULT_MAX_VISITS};
pub use functions::Builtin;
pub use parser::{BinaryOp, Expr, ParseError, Parser, UnaryOp, DEFAULT_MAX_DEPTH};
pub use tokenizer::{Token, TokenKind, TokenizeError, Tokenizer};
pub use value::{Value, ValueKind};

/// Any failure between formula text and a value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl FormulaError {
    /// Stable name of the underlying error kind, e.g. `DivisionByZero`
    pub fn code(&self) -> &'static str {
        match self {
            FormulaError::Tokenize(_) => "TokenizeError",
            FormulaError::Parse(err) => match err {
                ParseError::Syntax { .. } => "ParseError",
                ParseError::UnknownFunction { .. } => "UnknownFunction",
                ParseError::ArityMismatch { .. } => "ArityMismatch",
                ParseError::MaxDepthExceeded { .. } => "MaxDepthExceeded",
            },
            FormulaError::Eval(err) => match err {
                EvalError::UndefinedVariable(_) => "UndefinedVariable",
                EvalError::TypeError { .. } => "TypeError",
                EvalError::DivisionByZero => "DivisionByZero",
                EvalError::UnsupportedInputType { .. } => "UnsupportedInputType",
                EvalError::ExecutionBudgetExceeded { .. } => "ExecutionBudgetExceeded",
                EvalError::NonFiniteResult { .. } => "NonFiniteResult",
                EvalError::ArityMismatch { .. } => "ArityMismatch",
            },
        }
    }

    /// Message stored on a test case that errored: `"<code>: <description>"`
    pub fn to_message(&self) -> String {
        format!("{}: {}", self.code(), self)
    }

    /// True for errors raised before evaluation starts
    pub fn is_compile_error(&self) -> bool {
        !matches!(self, FormulaError::Eval(_))
    }
}

/// Resource limits applied to every compile and evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLimits {
    pub max_depth: usize,
    pub max_visits: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_visits: DEFAULT_MAX_VISITS,
        }
    }
}

/// Compiles and evaluates formulas under a fixed set of limits.
///
/// The engine holds no state between calls; each evaluation gets a fresh environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormulaEngine {
    limits: EngineLimits,
}

impl FormulaEngine {
    /// `max_depth` above [`DEFAULT_MAX_DEPTH`] is clamped to it
    pub fn new(limits: EngineLimits) -> Self {
        Self {
            limits: EngineLimits {
                max_depth: limits.max_depth.min(DEFAULT_MAX_DEPTH),
                ..limits
            },
        }
    }

    pub fn limits(&self) -> EngineLimits {
        self.limits
    }

    /// Tokenize and parse `source` into an AST
    pub fn compile(&self, source: &str) -> Result<Expr, FormulaError> {
        let tokens = tokenizer::tokenize(source)?;
        let expr = Parser::with_max_depth(tokens, self.limits.max_depth).parse()?;
        Ok(expr)
    }

    /// Evaluate a compiled formula against JSON inputs
    ///
    /// Trees deeper than the depth cap are refused before the recursive walk, which
    /// matters only for ASTs that were built by hand rather than compiled.
    pub fn evaluate(
        &self,
        expr: &Expr,
        input: &Map<String, JsonValue>,
    ) -> Result<Value, FormulaError> {
        if expr.depth() > self.limits.max_depth {
            return Err(ParseError::MaxDepthExceeded {
                limit: self.limits.max_depth,
            }
            .into());
        }
        let env = Environment::from_json(input)?;
        let value = Evaluator::new(&env, self.limits.max_visits).evaluate(expr)?;
        Ok(value)
    }

    /// Compile and evaluate in one step
    pub fn run(
        &self,
        source: &str,
        input: &Map<String, JsonValue>,
    ) -> Result<Value, FormulaError> {
        let expr = self.compile(source)?;
        self.evaluate(&expr, input)
    }
}
