//! Formula parser
//!
//! Converts a sequence of tokens into an Abstract Syntax Tree (AST).
//! Recursive descent for `?:`, parentheses and calls; precedence climbing over an explicit
//! operator stack for everything in between. Precedence, lowest first: `?:`, `||`, `&&`,
//! equality, relational, additive, multiplicative, prefix `-`/`!`, `^` (right-associative).

use std::fmt;

use thiserror::Error;

use super::functions::Builtin;
use super::tokenizer::{Token, TokenKind};
use super::value::Value;

/// Default cap on AST depth and syntactic nesting. Also the ceiling: larger limits are
/// clamped to it, since each nesting level costs a few stack frames.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        })
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "^" => BinaryOp::Pow,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        })
    }

    /// Binding strength, higher binds tighter
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
            BinaryOp::Pow => 8,
        }
    }

    fn is_right_associative(self) -> bool {
        self == BinaryOp::Pow
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Abstract Syntax Tree node for formula expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// A named input from the test case / line item
    VarRef(String),
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// cond ? then_branch : else_branch
    Ternary {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// Call to a whitelisted built-in
    Call { function: Builtin, args: Vec<Expr> },
}

impl Expr {
    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Direct children, left to right
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal(_) | Expr::VarRef(_) => Vec::new(),
            Expr::UnaryOp { operand, .. } => vec![operand.as_ref()],
            Expr::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            } => vec![cond.as_ref(), then_branch.as_ref(), else_branch.as_ref()],
            Expr::Call { args, .. } => args.iter().collect(),
        }
    }

    /// Depth of the tree (a leaf has depth 1). Iterative, so safe on any tree.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((expr, depth)) = stack.pop() {
            max = max.max(depth);
            for child in expr.children() {
                stack.push((child, depth + 1));
            }
        }
        max
    }

    /// Distinct variable names in order of first appearance
    pub fn referenced_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            if let Expr::VarRef(name) = expr {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            // reversed so the leftmost child is visited first
            stack.extend(expr.children().into_iter().rev());
        }
        names
    }
}

/// Error during parsing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error at position {position}: expected {expected}, found {found}")]
    Syntax {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("Unknown function '{name}' at position {position}")]
    UnknownFunction { name: String, position: usize },

    #[error("{function} expects {expected} argument(s), found {found} at position {position}")]
    ArityMismatch {
        function: Builtin,
        expected: usize,
        found: usize,
        position: usize,
    },

    #[error("Expression exceeds maximum nesting depth of {limit}")]
    MaxDepthExceeded { limit: usize },
}

/// Operator waiting on the operator stack for its right operand
#[derive(Debug, Clone, Copy)]
enum Pending {
    Prefix(UnaryOp),
    Infix(BinaryOp),
}

/// Prefix `-`/`!` bind tighter than `*` but looser than `^`, so `-2^2` is `-(2^2)`
const PREFIX_PRECEDENCE: u8 = 7;

impl Pending {
    fn precedence(self) -> u8 {
        match self {
            Pending::Prefix(_) => PREFIX_PRECEDENCE,
            Pending::Infix(op) => op.precedence(),
        }
    }
}

/// Parser for formula tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    /// Character offset just past the last token, reported for "end of input" errors
    end_offset: usize,
    nesting: usize,
    max_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_max_depth(tokens, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(tokens: Vec<Token>, max_depth: usize) -> Self {
        let end_offset = tokens
            .last()
            .map_or(0, |t| t.position + t.lexeme.chars().count());
        Self {
            tokens,
            position: 0,
            end_offset,
            nesting: 0,
            max_depth: max_depth.min(DEFAULT_MAX_DEPTH),
        }
    }

    /// Parse the tokens into an AST
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(self.error_here("an expression"));
        }

        let expr = self.expression()?;

        if !self.is_at_end() {
            return Err(self.error_here("an operator or end of input"));
        }
        if expr.depth() > self.max_depth {
            return Err(ParseError::MaxDepthExceeded {
                limit: self.max_depth,
            });
        }

        Ok(expr)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().is_some_and(|t| &t.kind == kind)
    }

    /// Check if current token matches and consume it
    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<(), ParseError> {
        if self.match_token(kind) {
            Ok(())
        } else {
            Err(self.error_here(expected))
        }
    }

    /// Consume the current token if it is one of the given operators
    fn match_any_operator(&mut self, ops: &[&str]) -> Option<String> {
        if let Some(Token {
            kind: TokenKind::Operator(s),
            ..
        }) = self.peek()
        {
            if ops.contains(&s.as_str()) {
                let op = s.clone();
                self.advance();
                return Some(op);
            }
        }
        None
    }

    fn error_here(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::Syntax {
                position: token.position,
                expected: expected.to_string(),
                found: token.kind.describe(),
            },
            None => ParseError::Syntax {
                position: self.end_offset,
                expected: expected.to_string(),
                found: "end of input".to_string(),
            },
        }
    }

    /// Track syntactic nesting so pathological input cannot exhaust the stack
    fn enter(&mut self) -> Result<(), ParseError> {
        self.nesting += 1;
        if self.nesting > self.max_depth {
            return Err(ParseError::MaxDepthExceeded {
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn check_depth(&self, depth: usize) -> Result<(), ParseError> {
        if depth > self.max_depth {
            Err(ParseError::MaxDepthExceeded {
                limit: self.max_depth,
            })
        } else {
            Ok(())
        }
    }

    /// Expression: operators ( "?" expression ":" expression )?
    ///
    /// The only recursive entry point besides calls; parentheses, arguments and ternary
    /// branches all come through here, so `nesting` bounds the parser's stack use.
    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let expr = self.ternary();
        self.leave();
        expr
    }

    fn ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.operators()?;

        if !self.match_token(&TokenKind::Question) {
            return Ok(cond);
        }
        let then_branch = self.expression()?;
        self.expect(&TokenKind::Colon, "':' in conditional expression")?;
        let else_branch = self.expression()?;

        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn peek_binary_operator(&self) -> Option<BinaryOp> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Operator(symbol),
                ..
            }) => BinaryOp::from_symbol(symbol),
            _ => None,
        }
    }

    /// Prefix and binary operators: ( ( "-" | "!" )* primary ) ( op ( "-" | "!" )* primary )*
    ///
    /// Operator precedence is resolved with an explicit operator stack, so long chains
    /// (`a + b + ...`, `2 ^ 2 ^ ...`, `- - - x`) use heap rather than call frames. Each node
    /// is depth-checked as it is built.
    fn operators(&mut self) -> Result<Expr, ParseError> {
        let mut operands: Vec<(Expr, usize)> = Vec::new();
        let mut pending: Vec<Pending> = Vec::new();

        loop {
            while let Some(symbol) = self.match_any_operator(&["-", "!"]) {
                pending.push(Pending::Prefix(if symbol == "-" {
                    UnaryOp::Neg
                } else {
                    UnaryOp::Not
                }));
            }

            let operand = self.primary()?;
            let depth = operand.depth();
            operands.push((operand, depth));

            let Some(op) = self.peek_binary_operator() else {
                break;
            };
            self.advance();

            while let Some(top) = pending.last() {
                let binds_tighter = if op.is_right_associative() {
                    top.precedence() > op.precedence()
                } else {
                    top.precedence() >= op.precedence()
                };
                if !binds_tighter {
                    break;
                }
                self.reduce(&mut operands, &mut pending)?;
            }
            pending.push(Pending::Infix(op));
        }

        while !pending.is_empty() {
            self.reduce(&mut operands, &mut pending)?;
        }

        match operands.pop() {
            Some((expr, _)) if operands.is_empty() => Ok(expr),
            _ => Err(self.error_here("an expression")),
        }
    }

    /// Pop the top pending operator and combine it with its operands
    fn reduce(
        &self,
        operands: &mut Vec<(Expr, usize)>,
        pending: &mut Vec<Pending>,
    ) -> Result<(), ParseError> {
        let Some(operator) = pending.pop() else {
            return Ok(());
        };

        let (expr, depth) = match operator {
            Pending::Prefix(op) => {
                let (operand, depth) = self.pop_operand(operands)?;
                let expr = Expr::UnaryOp {
                    op,
                    operand: Box::new(operand),
                };
                (expr, depth + 1)
            }
            Pending::Infix(op) => {
                let (right, right_depth) = self.pop_operand(operands)?;
                let (left, left_depth) = self.pop_operand(operands)?;
                (Expr::binary(op, left, right), 1 + left_depth.max(right_depth))
            }
        };

        self.check_depth(depth)?;
        operands.push((expr, depth));
        Ok(())
    }

    fn pop_operand(
        &self,
        operands: &mut Vec<(Expr, usize)>,
    ) -> Result<(Expr, usize), ParseError> {
        operands.pop().ok_or_else(|| self.error_here("an expression"))
    }

    /// Primary: NUMBER | STRING | BOOL | NULL | IDENT | IDENT "(" args? ")" | "(" expr ")"
    fn primary(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error_here("an expression"));
        };

        match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Value::Number(n)))
            }
            TokenKind::Text(s) => {
                self.advance();
                Ok(Expr::Literal(Value::Text(s)))
            }
            TokenKind::Bool(b) => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(b)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::OpenParen) {
                    self.call(name, token.position)
                } else {
                    Ok(Expr::VarRef(name))
                }
            }
            TokenKind::OpenParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(&TokenKind::CloseParen, "')' after expression")?;
                Ok(expr)
            }
            _ => Err(self.error_here("an expression")),
        }
    }

    /// Call: IDENT "(" ( expression ( "," expression )* )? ")"
    fn call(&mut self, name: String, position: usize) -> Result<Expr, ParseError> {
        let function =
            Builtin::from_name(&name).ok_or(ParseError::UnknownFunction { name, position })?;

        self.expect(&TokenKind::OpenParen, "'('")?;

        let mut args = Vec::new();
        if !self.check(&TokenKind::CloseParen) {
            args.push(self.expression()?);
            while self.match_token(&TokenKind::Comma) {
                args.push(self.expression()?);
            }
        }
        self.expect(&TokenKind::CloseParen, "',' or ')' after function argument")?;

        if args.len() != function.arity() {
            return Err(ParseError::ArityMismatch {
                function,
                expected: function.arity(),
                found: args.len(),
                position,
            });
        }

        Ok(Expr::Call { function, args })
    }
}

/// Convenience function to parse tokens into an AST with the default depth cap
pub fn parse(tokens: Vec<Token>) -> Result<Expr, ParseError> {
    Parser::new(tokens).parse()
}
