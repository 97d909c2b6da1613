//! Formula evaluator
//!
//! Walks an AST against an environment of named inputs. Every operator is strictly typed:
//! there is no implicit coercion between numbers, text and booleans. Each node visit is
//! counted against a budget, so evaluation always terminates.

use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use super::functions::{self, Builtin};
use super::parser::{BinaryOp, Expr, UnaryOp};
use super::value::{Value, ValueKind};

/// Default node-visit budget per evaluation
pub const DEFAULT_MAX_VISITS: usize = 100_000;

/// Error during evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("Type error: '{op}' cannot be applied to {}", operand_kinds(.left, .right))]
    TypeError {
        op: String,
        left: ValueKind,
        right: Option<ValueKind>,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error(
        "Unsupported input type for '{name}': {found} \
         (inputs must be numbers, strings, booleans or null)"
    )]
    UnsupportedInputType { name: String, found: String },

    #[error("Execution budget of {limit} node visits exceeded")]
    ExecutionBudgetExceeded { limit: usize },

    #[error("'{op}' produced a non-finite number")]
    NonFiniteResult { op: String },

    /// Only reachable for hand-built ASTs; the parser rejects wrong argument counts
    #[error("{function} expects {expected} argument(s), found {found}")]
    ArityMismatch {
        function: Builtin,
        expected: usize,
        found: usize,
    },
}

fn operand_kinds(left: &ValueKind, right: &Option<ValueKind>) -> String {
    match right {
        Some(right) => format!("{} and {}", left, right),
        None => left.to_string(),
    }
}

fn type_error(op: impl ToString, left: &Value, right: Option<&Value>) -> EvalError {
    EvalError::TypeError {
        op: op.to_string(),
        left: left.kind(),
        right: right.map(Value::kind),
    }
}

/// Named inputs visible to a formula
#[derive(Debug, Clone, Default)]
pub struct Environment {
    variables: HashMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an environment from a test case's `input_data`
    pub fn from_json(input: &Map<String, JsonValue>) -> Result<Self, EvalError> {
        let variables = input
            .iter()
            .map(|(name, json)| Ok((name.clone(), Value::from_json(name, json)?)))
            .collect::<Result<HashMap<_, _>, EvalError>>()?;
        Ok(Self { variables })
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }
}

/// Single-use evaluator holding the visit counter
pub struct Evaluator<'a> {
    env: &'a Environment,
    visits: usize,
    max_visits: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(env: &'a Environment, max_visits: usize) -> Self {
        Self {
            env,
            visits: 0,
            max_visits,
        }
    }

    /// Number of nodes visited so far
    pub fn visits(&self) -> usize {
        self.visits
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        self.visits += 1;
        if self.visits > self.max_visits {
            return Err(EvalError::ExecutionBudgetExceeded {
                limit: self.max_visits,
            });
        }

        match expr {
            Expr::Literal(value) => Ok(value.clone()),

            Expr::VarRef(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),

            Expr::UnaryOp { op, operand } => {
                let value = self.evaluate(operand)?;
                evaluate_unary_op(*op, &value)
            }

            // && and || short-circuit; the right side is only checked when evaluated
            Expr::BinaryOp {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
            } => {
                let left_val = self.evaluate(left)?;
                let Value::Bool(l) = left_val else {
                    return Err(type_error(op, &left_val, None));
                };
                if (*op == BinaryOp::And && !l) || (*op == BinaryOp::Or && l) {
                    return Ok(Value::Bool(l));
                }
                let right_val = self.evaluate(right)?;
                match right_val {
                    Value::Bool(r) => Ok(Value::Bool(r)),
                    _ => Err(type_error(op, &left_val, Some(&right_val))),
                }
            }

            Expr::BinaryOp { op, left, right } => {
                let left_val = self.evaluate(left)?;
                let right_val = self.evaluate(right)?;
                evaluate_binary_op(*op, &left_val, &right_val)
            }

            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.condition(cond, "?:")? {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }

            Expr::Call { function, args } => self.evaluate_function(*function, args),
        }
    }

    /// Evaluate a condition that must produce a boolean
    fn condition(&mut self, expr: &Expr, op: &str) -> Result<bool, EvalError> {
        let value = self.evaluate(expr)?;
        value.as_bool().ok_or_else(|| type_error(op, &value, None))
    }

    fn evaluate_function(&mut self, function: Builtin, args: &[Expr]) -> Result<Value, EvalError> {
        match (function, args) {
            (Builtin::If, [cond, then_branch, else_branch]) => {
                if self.condition(cond, "IF")? {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }
            (Builtin::Abs, [arg]) => match self.evaluate(arg)? {
                Value::Number(n) => Ok(Value::Number(functions::abs(n))),
                other => Err(type_error(function, &other, None)),
            },
            (Builtin::Round | Builtin::Min | Builtin::Max, [first, second]) => {
                let a = self.evaluate(first)?;
                let b = self.evaluate(second)?;
                let (Value::Number(x), Value::Number(y)) = (&a, &b) else {
                    return Err(type_error(function, &a, Some(&b)));
                };
                let result = match function {
                    Builtin::Round => functions::round(*x, *y),
                    Builtin::Min => functions::min(*x, *y),
                    _ => functions::max(*x, *y),
                };
                finite(function, result)
            }
            _ => Err(EvalError::ArityMismatch {
                function,
                expected: function.arity(),
                found: args.len(),
            }),
        }
    }
}

fn finite(op: impl ToString, n: f64) -> Result<Value, EvalError> {
    if n.is_finite() {
        Ok(Value::Number(n))
    } else {
        Err(EvalError::NonFiniteResult { op: op.to_string() })
    }
}

/// Evaluate a unary operation
fn evaluate_unary_op(op: UnaryOp, operand: &Value) -> Result<Value, EvalError> {
    match (op, operand) {
        (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        _ => Err(type_error(op, operand, None)),
    }
}

/// Evaluate a binary operation (everything except the short-circuiting && and ||)
fn evaluate_binary_op(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),

        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::Number(l), Value::Number(r)) => l.partial_cmp(r),
                (Value::Text(l), Value::Text(r)) => Some(l.cmp(r)),
                _ => None,
            }
            .ok_or_else(|| type_error(op, left, Some(right)))?;

            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }

        BinaryOp::Add
        | BinaryOp::Sub
        | BinaryOp::Mul
        | BinaryOp::Div
        | BinaryOp::Mod
        | BinaryOp::Pow => {
            let (Value::Number(l), Value::Number(r)) = (left, right) else {
                return Err(type_error(op, left, Some(right)));
            };
            let (l, r) = (*l, *r);
            let result = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div | BinaryOp::Mod if r == 0.0 => {
                    return Err(EvalError::DivisionByZero)
                }
                BinaryOp::Div => l / r,
                BinaryOp::Mod => l % r,
                _ => l.powf(r),
            };
            finite(op, result)
        }

        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (Value::Bool(l), Value::Bool(r)) => Ok(Value::Bool(if op == BinaryOp::And {
                *l && *r
            } else {
                *l || *r
            })),
            _ => Err(type_error(op, left, Some(right))),
        },
    }
}

/// Evaluate an expression with the default visit budget
pub fn evaluate(expr: &Expr, env: &Environment) -> Result<Value, EvalError> {
    Evaluator::new(env, DEFAULT_MAX_VISITS).evaluate(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formula::parser::parse;
    use crate::core::formula::tokenizer::tokenize;

    fn eval_with(source: &str, vars: &[(&str, Value)]) -> Result<Value, EvalError> {
        let ast = parse(tokenize(source).unwrap()).unwrap();
        let mut env = Environment::new();
        for (name, value) in vars {
            env.set(*name, value.clone());
        }
        evaluate(&ast, &env)
    }

    fn eval(source: &str) -> Result<Value, EvalError> {
        eval_with(source, &[])
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Number(7.0));
        assert_eq!(eval("(1 + 2) * 3").unwrap(), Value::Number(9.0));
        assert_eq!(eval("10 - 4 - 3").unwrap(), Value::Number(3.0));
        assert_eq!(eval("7 % 4").unwrap(), Value::Number(3.0));
        assert_eq!(eval("2 ^ 3 ^ 2").unwrap(), Value::Number(512.0));
        assert_eq!(eval("-2 ^ 2").unwrap(), Value::Number(-4.0));
        assert_eq!(eval("2 ^ -1").unwrap(), Value::Number(0.5));
    }

    #[test]
    fn test_division_and_modulo_by_zero() {
        assert_eq!(eval("1 / 0").unwrap_err(), EvalError::DivisionByZero);
        assert_eq!(eval("1 % 0").unwrap_err(), EvalError::DivisionByZero);
    }

    #[test]
    fn test_non_finite_result() {
        assert!(matches!(
            eval("10 ^ 400").unwrap_err(),
            EvalError::NonFiniteResult { .. }
        ));
        assert!(matches!(
            eval("(0 - 8) ^ 0.5").unwrap_err(),
            EvalError::NonFiniteResult { .. }
        ));
    }

    #[test]
    fn test_arithmetic_type_errors() {
        assert_eq!(
            eval("'5' + 5").unwrap_err(),
            EvalError::TypeError {
                op: "+".to_string(),
                left: ValueKind::Text,
                right: Some(ValueKind::Number),
            }
        );
        assert!(eval("true * 2").is_err());
        assert!(eval("-'a'").is_err());
        assert!(eval("null + 1").is_err());
    }

    #[test]
    fn test_equality_is_strict() {
        assert_eq!(eval("'5' == 5").unwrap(), Value::Bool(false));
        assert_eq!(eval("'5' != 5").unwrap(), Value::Bool(true));
        assert_eq!(eval("null == null").unwrap(), Value::Bool(true));
        assert_eq!(eval("0 == false").unwrap(), Value::Bool(false));
        assert_eq!(eval("'oak' == \"oak\"").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_relational() {
        assert_eq!(eval("3 < 4").unwrap(), Value::Bool(true));
        assert_eq!(eval("4 <= 4").unwrap(), Value::Bool(true));
        assert_eq!(eval("'b' > 'a'").unwrap(), Value::Bool(true));
        assert!(matches!(
            eval("'b' > 1").unwrap_err(),
            EvalError::TypeError { .. }
        ));
    }

    #[test]
    fn test_logical_operators() {
        assert_eq!(eval("true && !false").unwrap(), Value::Bool(true));
        assert_eq!(eval("false || false").unwrap(), Value::Bool(false));
        assert!(eval("1 && true").is_err());
        assert!(eval("true && 1").is_err());
        assert!(eval("!0").is_err());
    }

    #[test]
    fn test_logical_short_circuit() {
        // the right side is never evaluated, so the missing variable is not an error
        assert_eq!(eval("false && missing").unwrap(), Value::Bool(false));
        assert_eq!(eval("true || missing").unwrap(), Value::Bool(true));
        assert!(eval("true && missing").is_err());
    }

    #[test]
    fn test_ternary() {
        let vars = [("qty", Value::Number(12.0))];
        assert_eq!(
            eval_with("qty > 10 ? 'bulk' : 'single'", &vars).unwrap(),
            Value::Text("bulk".to_string())
        );
        assert!(matches!(
            eval("1 ? 2 : 3").unwrap_err(),
            EvalError::TypeError { .. }
        ));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval("ROUND(2.567, 1)").unwrap(), Value::Number(2.6));
        assert_eq!(eval("MIN(3, 9)").unwrap(), Value::Number(3.0));
        assert_eq!(eval("MAX(3, 9)").unwrap(), Value::Number(9.0));
        assert_eq!(eval("ABS(-3)").unwrap(), Value::Number(3.0));
        assert_eq!(eval("IF(1 < 2, 'y', 'n')").unwrap(), Value::Text("y".to_string()));
        assert!(eval("ABS('x')").is_err());
        assert!(eval("IF(1, 2, 3)").is_err());
    }

    #[test]
    fn test_if_is_lazy() {
        assert_eq!(eval("IF(true, 1, 1 / 0)").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_undefined_variable() {
        assert_eq!(
            eval("base_price + material_surcharge").unwrap_err(),
            EvalError::UndefinedVariable("base_price".to_string())
        );
    }

    #[test]
    fn test_environment_from_json() {
        let input = serde_json::json!({"width": 600, "finish": "matte", "rush": false});
        let env = Environment::from_json(input.as_object().unwrap()).unwrap();
        assert_eq!(env.get("width"), Some(&Value::Number(600.0)));
        assert!(env.contains("rush"));

        let bad = serde_json::json!({"sizes": [1, 2]});
        assert!(matches!(
            Environment::from_json(bad.as_object().unwrap()).unwrap_err(),
            EvalError::UnsupportedInputType { .. }
        ));
    }

    #[test]
    fn test_visit_budget() {
        let ast = parse(tokenize("1 + 2 + 3").unwrap()).unwrap();
        let env = Environment::new();

        let mut evaluator = Evaluator::new(&env, 5);
        assert_eq!(evaluator.evaluate(&ast).unwrap(), Value::Number(6.0));
        assert_eq!(evaluator.visits(), 5);

        let mut evaluator = Evaluator::new(&env, 4);
        assert_eq!(
            evaluator.evaluate(&ast).unwrap_err(),
            EvalError::ExecutionBudgetExceeded { limit: 4 }
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            EvalError::UndefinedVariable("x".to_string()).to_string(),
            "Undefined variable 'x'"
        );
        assert_eq!(
            EvalError::TypeError {
                op: "!".to_string(),
                left: ValueKind::Number,
                right: None,
            }
            .to_string(),
            "Type error: '!' cannot be applied to Number"
        );
    }
}
