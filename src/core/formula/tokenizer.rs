//! Formula tokenizer
//!
//! Converts formula source like `IF(width > 500, base_price * 1.5, base_price)` into a
//! sequence of positioned tokens that the parser turns into an AST.

use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

/// The kind of a token, carrying its decoded value where it has one
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A numeric literal (e.g., 123, 45.67, 1.5e10)
    Number(f64),
    /// A string literal with escapes resolved
    Text(String),
    /// A variable or function name
    Identifier(String),
    /// `true` / `false`
    Bool(bool),
    /// `null`
    Null,
    /// Arithmetic, comparison and logical operators: + - * / % ^ == != < <= > >= && || !
    Operator(String),
    /// `?` of the ternary operator
    Question,
    /// `:` of the ternary operator
    Colon,
    OpenParen,
    CloseParen,
    Comma,
}

impl TokenKind {
    /// Short human-readable description used in parse diagnostics
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::Text(s) => format!("string \"{}\"", s),
            TokenKind::Identifier(name) => format!("identifier '{}'", name),
            TokenKind::Bool(b) => format!("boolean {}", b),
            TokenKind::Null => "null".to_string(),
            TokenKind::Operator(op) => format!("'{}'", op),
            TokenKind::Question => "'?'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::OpenParen => "'('".to_string(),
            TokenKind::CloseParen => "')'".to_string(),
            TokenKind::Comma => "','".to_string(),
        }
    }
}

/// A token with the exact source text it was read from and its character offset
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: usize,
}

/// Error during tokenization
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Tokenize error at position {position}: {reason}")]
pub struct TokenizeError {
    pub position: usize,
    pub reason: String,
}

impl TokenizeError {
    fn new(reason: impl Into<String>, position: usize) -> Self {
        Self {
            position,
            reason: reason.into(),
        }
    }
}

/// Tokenizer for formula expressions
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            position: 0,
        }
    }

    /// Tokenize the entire source into a vector of tokens
    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizeError> {
        let mut tokens = Vec::new();

        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    /// Get the next token, or None if at end of input
    fn next_token(&mut self) -> Result<Option<Token>, TokenizeError> {
        self.skip_whitespace();

        let start = self.position;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let (kind, lexeme) = match c {
            '"' | '\'' => self.read_string(c)?,

            '(' => self.single(TokenKind::OpenParen),
            ')' => self.single(TokenKind::CloseParen),
            ',' => self.single(TokenKind::Comma),
            '?' => self.single(TokenKind::Question),
            ':' => self.single(TokenKind::Colon),

            '+' | '-' | '*' | '/' | '%' | '^' => {
                self.single(TokenKind::Operator(c.to_string()))
            }

            '<' | '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    let op = format!("{}=", c);
                    (TokenKind::Operator(op.clone()), op)
                } else {
                    (TokenKind::Operator(c.to_string()), c.to_string())
                }
            }

            '!' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    (TokenKind::Operator("!=".to_string()), "!=".to_string())
                } else {
                    (TokenKind::Operator("!".to_string()), "!".to_string())
                }
            }

            '=' => self.read_doubled('=', "'==' (single '=' is not an operator)")?,
            '&' => self.read_doubled('&', "'&&'")?,
            '|' => self.read_doubled('|', "'||'")?,

            c if c.is_ascii_digit() => self.read_number()?,

            c if c.is_ascii_alphabetic() || c == '_' => self.read_word(),

            c => {
                return Err(TokenizeError::new(
                    format!("Unexpected character: '{}'", c),
                    start,
                ));
            }
        };

        Ok(Some(Token {
            kind,
            lexeme,
            position: start,
        }))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Consume one character and produce a fixed token
    fn single(&mut self, kind: TokenKind) -> (TokenKind, String) {
        let lexeme = self.advance().map(String::from).unwrap_or_default();
        (kind, lexeme)
    }

    /// Read a two-character operator made of the same character twice (`==`, `&&`, `||`)
    fn read_doubled(
        &mut self,
        c: char,
        expected: &str,
    ) -> Result<(TokenKind, String), TokenizeError> {
        let start = self.position;
        self.advance();
        if self.peek() == Some(c) {
            self.advance();
            let op = format!("{}{}", c, c);
            Ok((TokenKind::Operator(op.clone()), op))
        } else {
            Err(TokenizeError::new(
                format!("Unexpected character: '{}', expected {}", c, expected),
                start,
            ))
        }
    }

    /// Read a string literal (double or single quoted) with backslash escapes
    fn read_string(&mut self, quote: char) -> Result<(TokenKind, String), TokenizeError> {
        let start_pos = self.position;
        let mut lexeme = String::new();
        let mut value = String::new();

        if let Some(open) = self.advance() {
            lexeme.push(open);
        }

        loop {
            match self.advance() {
                None => {
                    return Err(TokenizeError::new("Unterminated string literal", start_pos));
                }
                Some('\\') => {
                    lexeme.push('\\');
                    match self.advance() {
                        None => {
                            return Err(TokenizeError::new(
                                "Unterminated string literal",
                                start_pos,
                            ));
                        }
                        Some(escaped @ ('"' | '\'' | '\\')) => {
                            lexeme.push(escaped);
                            value.push(escaped);
                        }
                        // Unknown escapes are kept verbatim
                        Some(other) => {
                            lexeme.push(other);
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                Some(c) if c == quote => {
                    lexeme.push(c);
                    break;
                }
                Some(c) => {
                    lexeme.push(c);
                    value.push(c);
                }
            }
        }

        Ok((TokenKind::Text(value), lexeme))
    }

    /// Read a number (integer, decimal, or scientific notation)
    fn read_number(&mut self) -> Result<(TokenKind, String), TokenizeError> {
        let start_pos = self.position;
        let mut num_str = String::new();

        self.read_digits(&mut num_str);

        if self.peek() == Some('.') {
            num_str.push('.');
            self.advance();
            if !self.read_digits(&mut num_str) {
                return Err(TokenizeError::new(
                    format!("Invalid number: {} (expected digits after '.')", num_str),
                    start_pos,
                ));
            }
        }

        if let Some(e @ ('e' | 'E')) = self.peek() {
            num_str.push(e);
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                num_str.push(sign);
                self.advance();
            }
            if !self.read_digits(&mut num_str) {
                return Err(TokenizeError::new(
                    format!("Invalid number: {} (expected exponent digits)", num_str),
                    start_pos,
                ));
            }
        }

        // 12abc is a malformed number, not a number followed by a name
        if let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() || c == '_' {
                return Err(TokenizeError::new(
                    format!("Invalid number: {}{}", num_str, c),
                    start_pos,
                ));
            }
        }

        num_str
            .parse::<f64>()
            .map(|n| (TokenKind::Number(n), num_str.clone()))
            .map_err(|_| TokenizeError::new(format!("Invalid number: {}", num_str), start_pos))
    }

    /// Append consecutive ASCII digits; returns whether any were read
    fn read_digits(&mut self, out: &mut String) -> bool {
        let mut any = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.advance();
                any = true;
            } else {
                break;
            }
        }
        any
    }

    /// Read an identifier or keyword (true, false, null)
    fn read_word(&mut self) -> (TokenKind, String) {
        let mut word = String::new();

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let kind = match word.to_ascii_lowercase().as_str() {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            "null" => TokenKind::Null,
            _ => TokenKind::Identifier(word.clone()),
        };
        (kind, word)
    }
}

/// Convenience function to tokenize formula source
pub fn tokenize(source: &str) -> Result<Vec<Token>, TokenizeError> {
    Tokenizer::new(source).tokenize()
}
