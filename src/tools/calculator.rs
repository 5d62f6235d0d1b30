//! Arithmetic calculator tool.
//!
//! Expressions are evaluated by a small recursive-descent parser; nothing is
//! ever handed to an interpreter. Grammar, loosest binding first:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := number | ident | ident '(' expr (',' expr)* ')' | '(' expr ')'
//! ```

use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use super::{required_str, single_string_schema, Tool};

/// Longest accepted expression, in characters.
const MAX_EXPRESSION_CHARS: usize = 2048;

/// Deepest accepted nesting of parentheses, function calls and unary signs.
const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("Empty expression provided.")]
    Empty,

    #[error("Expression '{0}' contains invalid characters.")]
    InvalidCharacters(String),

    #[error("Cannot divide by zero.")]
    DivisionByZero,

    #[error("Invalid syntax in expression: {0}")]
    Syntax(String),

    #[error("Unknown function or variable '{0}'.")]
    UnknownIdentifier(String),

    #[error("Function '{name}' expects {expected} argument(s), got {got}.")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Result is not a finite number.")]
    NotFinite,

    #[error("Expression is too long (limit is {0} characters).")]
    TooLong(usize),
}

/// Evaluates arithmetic expressions.
pub struct Calculator;

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Performs basic arithmetic calculations. Input should be a single string expression like '5 + 3' or '10 * 2 / (4 - 2)'. Supports ^ for powers, % for remainder, constants pi and e, and functions such as sqrt, abs, sin, cos, tan, ln, log10, floor, ceil, round, pow, min and max."
    }

    fn parameters_schema(&self) -> Value {
        single_string_schema(
            "expression",
            "The mathematical expression to evaluate (e.g., '5 + 3', '10 * 2 / 4').",
        )
    }

    async fn execute(&self, args: Value, _workspace: &Path) -> anyhow::Result<String> {
        let expression = required_str(&args, "expression")?;
        let value = evaluate(expression)?;
        tracing::debug!(expression, value, "Evaluated expression");
        Ok(format_number(value))
    }
}

fn allowed_chars() -> &'static Regex {
    static ALLOWED: OnceLock<Regex> = OnceLock::new();
    ALLOWED.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9\s_.+\-*/()^%,]*$").expect("calculator character class is valid")
    })
}

/// Evaluate an expression to a finite `f64`.
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    if expression.trim().is_empty() {
        return Err(CalcError::Empty);
    }
    if expression.chars().count() > MAX_EXPRESSION_CHARS {
        return Err(CalcError::TooLong(MAX_EXPRESSION_CHARS));
    }
    if !allowed_chars().is_match(expression) {
        return Err(CalcError::InvalidCharacters(expression.to_string()));
    }

    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(CalcError::Syntax(format!("unexpected {}", token)));
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

/// Render a result, dropping the fractional part of integral values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        // Avoid printing "-0".
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Num(n) => write!(f, "number {}", n),
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::Percent => f.write_str("'%'"),
            Token::Caret => f.write_str("'^'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Scientific notation: 1e3, 2.5E-4
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| CalcError::Syntax(format!("bad number '{}'", literal)))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Caret);
                i += 2;
            }
            _ => {
                let token = match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '^' => Token::Caret,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    other => return Err(CalcError::InvalidCharacters(other.to_string())),
                };
                tokens.push(token);
                i += 1;
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), CalcError> {
        match self.next() {
            Some(ref token) if *token == expected => Ok(()),
            Some(token) => Err(CalcError::Syntax(format!("expected {}, found {}", expected, token))),
            None => Err(CalcError::Syntax(format!("expected {}, found end of input", expected))),
        }
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                value += self.term()?;
            } else if self.eat(&Token::Minus) {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                value *= self.unary()?;
            } else if self.eat(&Token::Slash) {
                let rhs = self.unary()?;
                if rhs == 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                value /= rhs;
            } else if self.eat(&Token::Percent) {
                let rhs = self.unary()?;
                if rhs == 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                // Sign follows the divisor, as in most calculators.
                value = value - rhs * (value / rhs).floor();
            } else {
                return Ok(value);
            }
        }
    }

    // Every recursive path (parentheses, call arguments, signs, exponents)
    // goes through here, so this is where nesting is bounded.
    fn unary(&mut self) -> Result<f64, CalcError> {
        if self.depth >= MAX_NESTING {
            return Err(CalcError::Syntax("expression nested too deeply".to_string()));
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64, CalcError> {
        if self.eat(&Token::Minus) {
            return Ok(-self.unary()?);
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.primary()?;
        if self.eat(&Token::Caret) {
            // Right-associative, and binds tighter than a unary minus on its left: -2^2 == -4.
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, CalcError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let mut args = vec![self.expr()?];
                    while self.eat(&Token::Comma) {
                        args.push(self.expr()?);
                    }
                    self.expect(Token::RParen)?;
                    call_function(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(token) => Err(CalcError::Syntax(format!("unexpected {}", token))),
            None => Err(CalcError::Syntax("unexpected end of input".to_string())),
        }
    }
}

fn constant(name: &str) -> Result<f64, CalcError> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        "tau" => Ok(std::f64::consts::TAU),
        _ => Err(CalcError::UnknownIdentifier(name.to_string())),
    }
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, CalcError> {
    let unary: Option<fn(f64) -> f64> = match name {
        "sqrt" => Some(f64::sqrt),
        "abs" | "fabs" => Some(f64::abs),
        "sin" => Some(f64::sin),
        "cos" => Some(f64::cos),
        "tan" => Some(f64::tan),
        "asin" => Some(f64::asin),
        "acos" => Some(f64::acos),
        "atan" => Some(f64::atan),
        "exp" => Some(f64::exp),
        "ln" | "log" => Some(f64::ln),
        "log10" => Some(f64::log10),
        "log2" => Some(f64::log2),
        "floor" => Some(f64::floor),
        "ceil" => Some(f64::ceil),
        "round" => Some(f64::round),
        _ => None,
    };
    if let Some(f) = unary {
        return match args {
            [x] => Ok(f(*x)),
            _ => Err(CalcError::Arity {
                name: name.to_string(),
                expected: 1,
                got: args.len(),
            }),
        };
    }

    let binary: Option<fn(f64, f64) -> f64> = match name {
        "pow" => Some(f64::powf),
        "min" => Some(f64::min),
        "max" => Some(f64::max),
        "atan2" => Some(f64::atan2),
        _ => None,
    };
    match (binary, args) {
        (Some(f), [x, y]) => Ok(f(*x, *y)),
        (Some(_), _) => Err(CalcError::Arity {
            name: name.to_string(),
            expected: 2,
            got: args.len(),
        }),
        (None, _) => Err(CalcError::UnknownIdentifier(name.to_string())),
    }
}
