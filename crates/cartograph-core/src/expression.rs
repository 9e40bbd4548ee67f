//! Filter and label expressions.
//!
//! The grammar follows the Mapnik filter language:
//!
//! ```text
//! [NAME] = 'Oslo' and ([POP] >= 100000 or not [capital])
//! [mapnik::geometry_type] = polygon
//! [name] + ' (' + [ref] + ')'
//! ```
//!
//! Attribute names go in square brackets; strings use single or double
//! quotes. `and`/`&&`, `or`/`||`, `not`/`!`, the comparison operators
//! `= == != <> < <= > >=` (and their `eq ne lt le gt ge` spellings) and
//! arithmetic `+ - * / %` are supported. `+` concatenates when either side
//! is a string.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::feature::{Feature, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Attribute(String),
    GeometryType,
    FeatureId,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn evaluate(&self, feature: &Feature) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Attribute(name) => feature.get(name).cloned().unwrap_or(Value::Null),
            Expr::GeometryType => feature
                .geometry
                .as_ref()
                .map(|g| Value::Integer(g.geometry_type() as i64))
                .unwrap_or(Value::Null),
            Expr::FeatureId => Value::Integer(feature.id as i64),
            Expr::Unary(UnaryOp::Not, e) => Value::Bool(!e.evaluate(feature).is_truthy()),
            Expr::Unary(UnaryOp::Neg, e) => match e.evaluate(feature) {
                Value::Integer(i) => Value::Integer(i.wrapping_neg()),
                v => v.as_f64().map(|f| Value::Float(-f)).unwrap_or(Value::Null),
            },
            Expr::Binary(BinaryOp::And, l, r) => {
                Value::Bool(l.evaluate(feature).is_truthy() && r.evaluate(feature).is_truthy())
            }
            Expr::Binary(BinaryOp::Or, l, r) => {
                Value::Bool(l.evaluate(feature).is_truthy() || r.evaluate(feature).is_truthy())
            }
            Expr::Binary(op, l, r) => binary(*op, l.evaluate(feature), r.evaluate(feature)),
        }
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Value {
    let ord = l.compare(&r);
    match op {
        BinaryOp::Eq => Value::Bool(ord == Some(Ordering::Equal)),
        BinaryOp::Ne => Value::Bool(ord != Some(Ordering::Equal)),
        BinaryOp::Lt => Value::Bool(ord == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(ord, Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::Gt => Value::Bool(ord == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(ord, Some(Ordering::Greater | Ordering::Equal))),
        BinaryOp::Add => match (&l, &r) {
            (Value::String(_), _) | (_, Value::String(_)) => Value::String(format!("{}{}", l, r)),
            _ => arithmetic(op, &l, &r),
        },
        _ => arithmetic(op, &l, &r),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Value {
    if let (Value::Integer(a), Value::Integer(b)) = (l, r) {
        return match op {
            BinaryOp::Add => Value::Integer(a.wrapping_add(*b)),
            BinaryOp::Sub => Value::Integer(a.wrapping_sub(*b)),
            BinaryOp::Mul => Value::Integer(a.wrapping_mul(*b)),
            BinaryOp::Div if *b != 0 => Value::Integer(a.wrapping_div(*b)),
            BinaryOp::Mod if *b != 0 => Value::Integer(a.wrapping_rem(*b)),
            _ => Value::Null,
        };
    }
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Value::Null;
    };
    match op {
        BinaryOp::Add => Value::Float(a + b),
        BinaryOp::Sub => Value::Float(a - b),
        BinaryOp::Mul => Value::Float(a * b),
        BinaryOp::Div if b != 0.0 => Value::Float(a / b),
        BinaryOp::Mod if b != 0.0 => Value::Float(a % b),
        _ => Value::Null,
    }
}

/// A parsed expression together with its source text.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, Error> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let root = parser.expression()?;
        if let Some((tok, offset)) = parser.tokens.get(parser.pos) {
            return Err(parser.error(*offset, format!("unexpected {:?}", tok)));
        }
        Ok(Self {
            source: source.trim().to_string(),
            root,
        })
    }

    /// An expression that always evaluates to `true`.
    pub fn always() -> Self {
        Self {
            source: "true".to_string(),
            root: Expr::Literal(Value::Bool(true)),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn evaluate(&self, feature: &Feature) -> Value {
        self.root.evaluate(feature)
    }

    pub fn matches(&self, feature: &Feature) -> bool {
        self.evaluate(feature).is_truthy()
    }

    /// Attribute names referenced by the expression.
    pub fn attributes(&self) -> Vec<&str> {
        fn walk<'a>(e: &'a Expr, out: &mut Vec<&'a str>) {
            match e {
                Expr::Attribute(name) => {
                    if !out.contains(&name.as_str()) {
                        out.push(name);
                    }
                }
                Expr::Unary(_, inner) => walk(inner, out),
                Expr::Binary(_, l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                _ => {}
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl FromStr for Expression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expression::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Expression::parse(&source).map_err(serde::de::Error::custom)
    }
}

// ── Tokenizer ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Value),
    Str(String),
    Attr(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, Error> {
    let err = |offset: usize, message: &str| Error::Expression {
        expr: src.to_string(),
        offset,
        message: message.to_string(),
    };
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        match c {
            '(' => {
                tokens.push((Token::LParen, start));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, start));
                i += 1;
            }
            '[' => {
                let end = src[i + 1..]
                    .find(']')
                    .ok_or_else(|| err(start, "unterminated attribute"))?;
                let name = src[i + 1..i + 1 + end].trim().to_string();
                if name.is_empty() {
                    return Err(err(start, "empty attribute name"));
                }
                tokens.push((Token::Attr(name), start));
                i += end + 2;
            }
            '\'' | '"' => {
                let end = src[i + 1..]
                    .find(c)
                    .ok_or_else(|| err(start, "unterminated string"))?;
                tokens.push((Token::Str(src[i + 1..i + 1 + end].to_string()), start));
                i += end + 2;
            }
            '0'..='9' | '.' => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    i += 1;
                    if i < bytes.len() && (bytes[i] == b'-' || bytes[i] == b'+') {
                        i += 1;
                    }
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text = &src[start..i];
                let value = if let Ok(v) = text.parse::<i64>() {
                    Value::Integer(v)
                } else {
                    Value::Float(text.parse::<f64>().map_err(|_| err(start, "invalid number"))?)
                };
                tokens.push((Token::Number(value), start));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push((Token::Ident(src[start..i].to_ascii_lowercase()), start));
            }
            _ => {
                const OPS: [&str; 15] = [
                    "&&", "||", "==", "!=", "<>", "<=", ">=", "=", "<", ">", "!", "+", "-", "*", "/",
                ];
                let rest = &src[i..];
                if let Some(op) = OPS.iter().find(|op| rest.starts_with(**op)) {
                    tokens.push((Token::Op(*op), start));
                    i += op.len();
                } else if rest.starts_with('%') {
                    tokens.push((Token::Op("%"), start));
                    i += 1;
                } else {
                    return Err(err(start, "unexpected character"));
                }
            }
        }
    }
    Ok(tokens)
}

// ── Parser ───────────────────────────────────────────────────────────

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, offset: usize, message: String) -> Error {
        Error::Expression {
            expr: self.source.to_string(),
            offset,
            message,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, o)| *o)
            .unwrap_or(self.source.len())
    }

    /// Consume the next token if it is one of the given operator spellings.
    fn eat_op(&mut self, ops: &[&str]) -> bool {
        let hit = match self.peek() {
            Some(Token::Op(op)) => ops.contains(op),
            Some(Token::Ident(word)) => ops.contains(&word.as_str()),
            _ => false,
        };
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn expression(&mut self) -> Result<Expr, Error> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, Error> {
        let mut left = self.and()?;
        while self.eat_op(&["or", "||"]) {
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, Error> {
        let mut left = self.not()?;
        while self.eat_op(&["and", "&&"]) {
            let right = self.not()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, Error> {
        if self.eat_op(&["not", "!"]) {
            let inner = self.not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, Error> {
        let left = self.additive()?;
        let table: [(&[&str], BinaryOp); 6] = [
            (&["=", "==", "eq"], BinaryOp::Eq),
            (&["!=", "<>", "neq", "ne"], BinaryOp::Ne),
            (&["<=", "le"], BinaryOp::Le),
            (&[">=", "ge"], BinaryOp::Ge),
            (&["<", "lt"], BinaryOp::Lt),
            (&[">", "gt"], BinaryOp::Gt),
        ];
        for (ops, op) in table {
            if self.eat_op(ops) {
                let right = self.additive()?;
                return Ok(Expr::Binary(op, Box::new(left), Box::new(right)));
            }
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, Error> {
        let mut left = self.multiplicative()?;
        loop {
            let op = if self.eat_op(&["+"]) {
                BinaryOp::Add
            } else if self.eat_op(&["-"]) {
                BinaryOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, Error> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat_op(&["*"]) {
                BinaryOp::Mul
            } else if self.eat_op(&["/"]) {
                BinaryOp::Div
            } else if self.eat_op(&["%"]) {
                BinaryOp::Mod
            } else {
                return Ok(left);
            };
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, Error> {
        if self.eat_op(&["-"]) {
            let inner = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, Error> {
        let offset = self.offset();
        let token = self
            .tokens
            .get(self.pos)
            .map(|(t, _)| t.clone())
            .ok_or_else(|| self.error(offset, "unexpected end of expression".to_string()))?;
        self.pos += 1;
        match token {
            Token::Number(v) => Ok(Expr::Literal(v)),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Attr(name) => Ok(match name.as_str() {
                "mapnik::geometry_type" => Expr::GeometryType,
                "mapnik::feature_id" => Expr::FeatureId,
                _ => Expr::Attribute(name),
            }),
            Token::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "point" => Ok(Expr::Literal(Value::Integer(1))),
                "linestring" => Ok(Expr::Literal(Value::Integer(2))),
                "polygon" => Ok(Expr::Literal(Value::Integer(3))),
                "collection" => Ok(Expr::Literal(Value::Integer(4))),
                other => Err(self.error(offset, format!("unknown identifier '{}'", other))),
            },
            Token::LParen => {
                let inner = self.expression()?;
                if self.peek() != Some(&Token::RParen) {
                    let at = self.offset();
                    return Err(self.error(at, "expected ')'".to_string()));
                }
                self.pos += 1;
                Ok(inner)
            }
            other => Err(self.error(offset, format!("unexpected {:?}", other))),
        }
    }
}
