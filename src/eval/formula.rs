//! Formula expressions over record fields.
//!
//! Grammar (nothing else is accepted):
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := NUMBER | STRING | '{' field-id '}' | '(' expr ')' | ('-' | '+') factor
//! ```
//!
//! Strings are quoted with `"` or `'`. `+` concatenates when either side is text; the other
//! operators coerce to numbers. Missing fields are empty, which counts as zero or `""`.

use crate::config::ColumnRegistry;
use crate::eval::{lookup, parse_number, value_texts, Record};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unterminated field reference at {0}")]
    UnterminatedReference(usize),
    #[error("empty field reference at {0}")]
    EmptyReference(usize),
    #[error("unterminated string at {0}")]
    UnterminatedString(usize),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected {found} at {pos}")]
    UnexpectedToken { found: String, pos: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("circular reference through '{0}'")]
    CircularReference(String),
    #[error("expression nests deeper than {} levels", MAX_DEPTH)]
    TooDeep,
}

/// Bound on parenthesis nesting and on the depth of the parsed tree.
pub const MAX_DEPTH: usize = 128;

fn within_depth(depth: usize) -> Result<usize, FormulaError> {
    if depth > MAX_DEPTH {
        return Err(FormulaError::TooDeep);
    }
    Ok(depth)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Field(String),
    Op(BinaryOp),
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Text(s) => format!("string \"{}\"", s),
            Token::Field(id) => format!("field {{{}}}", id),
            Token::Op(op) => format!("operator {:?}", op),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Number(f64),
    Text(String),
    Field(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '{' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|(_, ch)| *ch == '}' || *ch == '{')
                    .map(|offset| i + 1 + offset)
                    .filter(|j| chars[*j].1 == '}')
                    .ok_or(FormulaError::UnterminatedReference(pos))?;
                let id: String = chars[i + 1..close].iter().map(|(_, ch)| *ch).collect();
                let id = id.trim();
                if id.is_empty() {
                    return Err(FormulaError::EmptyReference(pos));
                }
                tokens.push((Token::Field(id.to_string()), pos));
                i = close + 1;
            }
            '"' | '\'' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|(_, ch)| *ch == c)
                    .map(|offset| i + 1 + offset)
                    .ok_or(FormulaError::UnterminatedString(pos))?;
                let text: String = chars[i + 1..close].iter().map(|(_, ch)| *ch).collect();
                tokens.push((Token::Text(text), pos));
                i = close + 1;
            }
            '0'..='9' | '.' => {
                let end = chars[i..]
                    .iter()
                    .position(|(_, ch)| !(ch.is_ascii_digit() || *ch == '.'))
                    .map(|offset| i + offset)
                    .unwrap_or(chars.len());
                let literal: String = chars[i..end].iter().map(|(_, ch)| *ch).collect();
                let n = literal
                    .parse::<f64>()
                    .map_err(|_| FormulaError::InvalidNumber(literal.clone()))?;
                tokens.push((Token::Number(n), pos));
                i = end;
            }
            '+' | '-' | '*' | '/' => {
                let op = match c {
                    '+' => BinaryOp::Add,
                    '-' => BinaryOp::Sub,
                    '*' => BinaryOp::Mul,
                    _ => BinaryOp::Div,
                };
                tokens.push((Token::Op(op), pos));
                i += 1;
            }
            '(' => {
                tokens.push((Token::LParen, pos));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, pos));
                i += 1;
            }
            other => return Err(FormulaError::UnexpectedChar { ch: other, pos }),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    next: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.next).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.next).cloned();
        if token.is_some() {
            self.next += 1;
        }
        token
    }

    // Each parser returns the expression with its tree depth.
    fn expr(&mut self) -> Result<(Expr, usize), FormulaError> {
        let (mut lhs, mut depth) = self.term()?;
        while let Some(Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) = self.peek() {
            let op = *op;
            self.next += 1;
            let (rhs, rhs_depth) = self.term()?;
            depth = within_depth(depth.max(rhs_depth) + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok((lhs, depth))
    }

    fn term(&mut self) -> Result<(Expr, usize), FormulaError> {
        let (mut lhs, mut depth) = self.factor()?;
        while let Some(Token::Op(op @ (BinaryOp::Mul | BinaryOp::Div))) = self.peek() {
            let op = *op;
            self.next += 1;
            let (rhs, rhs_depth) = self.factor()?;
            depth = within_depth(depth.max(rhs_depth) + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok((lhs, depth))
    }

    fn factor(&mut self) -> Result<(Expr, usize), FormulaError> {
        let (token, pos) = self.advance().ok_or(FormulaError::UnexpectedEnd)?;
        match token {
            Token::Number(n) => Ok((Expr::Number(n), 1)),
            Token::Text(s) => Ok((Expr::Text(s), 1)),
            Token::Field(id) => Ok((Expr::Field(id), 1)),
            Token::Op(op @ (BinaryOp::Sub | BinaryOp::Add)) => {
                let (inner, depth) = self.nested(Self::factor)?;
                if op == BinaryOp::Add {
                    return Ok((inner, depth));
                }
                Ok((Expr::Neg(Box::new(inner)), within_depth(depth + 1)?))
            }
            Token::LParen => {
                let inner = self.nested(Self::expr)?;
                match self.advance() {
                    Some((Token::RParen, _)) => Ok(inner),
                    Some((other, pos)) => Err(FormulaError::UnexpectedToken {
                        found: other.describe(),
                        pos,
                    }),
                    None => Err(FormulaError::UnexpectedEnd),
                }
            }
            other => Err(FormulaError::UnexpectedToken {
                found: other.describe(),
                pos,
            }),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<(Expr, usize), FormulaError>,
    ) -> Result<(Expr, usize), FormulaError> {
        self.nesting = within_depth(self.nesting + 1)?;
        let out = parse(self);
        self.nesting -= 1;
        out
    }
}

/// A parsed expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(FormulaError::Empty);
        }
        let mut parser = Parser {
            tokens,
            next: 0,
            nesting: 0,
        };
        let (expr, _) = parser.expr()?;
        if let Some((token, pos)) = parser.advance() {
            return Err(FormulaError::UnexpectedToken {
                found: token.describe(),
                pos,
            });
        }
        Ok(Formula {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Referenced field ids in order of first appearance.
    pub fn references(&self) -> Vec<&str> {
        fn walk<'e>(expr: &'e Expr, out: &mut Vec<&'e str>) {
            match expr {
                Expr::Field(id) => {
                    if !out.contains(&id.as_str()) {
                        out.push(id);
                    }
                }
                Expr::Neg(inner) => walk(inner, out),
                Expr::Binary { lhs, rhs, .. } => {
                    walk(lhs, out);
                    walk(rhs, out);
                }
                Expr::Number(_) | Expr::Text(_) => {}
            }
        }
        let mut out = Vec::new();
        walk(&self.expr, &mut out);
        out
    }
}

/// Result of evaluating a formula for one record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum FormulaValue {
    Empty,
    Number(f64),
    Text(String),
    /// Sentinel for a zero divisor; rendered as `#DIV/0!`.
    DivisionByZero,
    /// Malformed expression or circular reference; rendered as `#ERROR`.
    Error(String),
}

impl FormulaValue {
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaValue::Empty => Ok(()),
            FormulaValue::Number(n) => f.write_str(&format_number(*n)),
            FormulaValue::Text(s) => f.write_str(s),
            FormulaValue::DivisionByZero => f.write_str("#DIV/0!"),
            FormulaValue::Error(_) => f.write_str("#ERROR"),
        }
    }
}

/// Integers without a fraction, everything else rounded to two places.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let fixed = format!("{:.2}", n);
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[derive(Clone, Debug, PartialEq)]
enum Operand {
    Empty,
    Number(f64),
    Text(String),
}

impl Operand {
    fn number(&self) -> f64 {
        match self {
            Operand::Empty => 0.0,
            Operand::Number(n) => *n,
            Operand::Text(s) => parse_number(s).unwrap_or(0.0),
        }
    }

    fn text(&self) -> String {
        match self {
            Operand::Empty => String::new(),
            Operand::Number(n) => format_number(*n),
            Operand::Text(s) => s.clone(),
        }
    }

    fn from_record_value(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Operand::Empty;
        };
        match value {
            Value::Number(n) => n.as_f64().map(Operand::Number).unwrap_or(Operand::Empty),
            Value::String(s) if s.trim().is_empty() => Operand::Empty,
            Value::String(s) => parse_number(s)
                .map(Operand::Number)
                .unwrap_or_else(|| Operand::Text(s.clone())),
            other => {
                let texts = value_texts(other);
                if texts.is_empty() {
                    Operand::Empty
                } else {
                    Operand::Text(texts.join(", "))
                }
            }
        }
    }

    fn into_value(self) -> FormulaValue {
        match self {
            Operand::Empty => FormulaValue::Empty,
            Operand::Number(n) if n.is_finite() => FormulaValue::Number(n),
            Operand::Number(_) => FormulaValue::Error("result is not a finite number".into()),
            Operand::Text(s) => FormulaValue::Text(s),
        }
    }
}

enum Fault {
    DivisionByZero,
    Invalid(FormulaError),
}

impl Fault {
    fn into_value(self) -> FormulaValue {
        match self {
            Fault::DivisionByZero => FormulaValue::DivisionByZero,
            Fault::Invalid(e) => FormulaValue::Error(e.to_string()),
        }
    }
}

/// Evaluates formulas against records. With a registry, references to other formula
/// fields are recomputed instead of read from the record.
#[derive(Clone, Copy, Debug, Default)]
pub struct FormulaEvaluator<'a> {
    columns: Option<&'a ColumnRegistry>,
}

impl<'a> FormulaEvaluator<'a> {
    pub fn new(columns: &'a ColumnRegistry) -> Self {
        FormulaEvaluator {
            columns: Some(columns),
        }
    }

    pub fn evaluate(&self, expression: &str, record: &Record) -> FormulaValue {
        match Formula::parse(expression) {
            Ok(formula) => self.evaluate_formula(&formula, record),
            Err(e) => FormulaValue::Error(e.to_string()),
        }
    }

    pub fn evaluate_formula(&self, formula: &Formula, record: &Record) -> FormulaValue {
        let mut stack = Vec::new();
        self.run(&formula.expr, record, &mut stack)
            .map(Operand::into_value)
            .unwrap_or_else(Fault::into_value)
    }

    /// Value of a field for display: formula fields are recomputed, others read from the record.
    pub fn evaluate_field(&self, field_id: &str, record: &Record) -> FormulaValue {
        let mut stack = Vec::new();
        self.resolve(field_id, record, &mut stack)
            .map(Operand::into_value)
            .unwrap_or_else(Fault::into_value)
    }

    fn resolve(&self, id: &str, record: &Record, stack: &mut Vec<String>) -> Result<Operand, Fault> {
        let expression = self
            .columns
            .and_then(|c| c.get(id))
            .and_then(|d| d.field_type.expression());
        let Some(expression) = expression else {
            return Ok(Operand::from_record_value(lookup(record, id)));
        };
        if stack.iter().any(|s| s == id) {
            return Err(Fault::Invalid(FormulaError::CircularReference(id.to_string())));
        }
        let formula = Formula::parse(expression).map_err(Fault::Invalid)?;
        stack.push(id.to_string());
        let result = self.run(&formula.expr, record, stack);
        stack.pop();
        result
    }

    fn run(&self, expr: &Expr, record: &Record, stack: &mut Vec<String>) -> Result<Operand, Fault> {
        match expr {
            Expr::Number(n) => Ok(Operand::Number(*n)),
            Expr::Text(s) => Ok(Operand::Text(s.clone())),
            Expr::Field(id) => self.resolve(id, record, stack),
            Expr::Neg(inner) => Ok(Operand::Number(-self.run(inner, record, stack)?.number())),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.run(lhs, record, stack)?;
                let r = self.run(rhs, record, stack)?;
                match op {
                    BinaryOp::Add => match (&l, &r) {
                        (Operand::Text(_), _) | (_, Operand::Text(_)) => Ok(Operand::Text(l.text() + &r.text())),
                        _ => Ok(Operand::Number(l.number() + r.number())),
                    },
                    BinaryOp::Sub => Ok(Operand::Number(l.number() - r.number())),
                    BinaryOp::Mul => Ok(Operand::Number(l.number() * r.number())),
                    BinaryOp::Div => {
                        let divisor = r.number();
                        if divisor == 0.0 {
                            Err(Fault::DivisionByZero)
                        } else {
                            Ok(Operand::Number(l.number() / divisor))
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldType, NewField};
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn eval(expression: &str, v: Value) -> FormulaValue {
        FormulaEvaluator::default().evaluate(expression, &record(v))
    }

    #[test]
    fn divides_two_fields() {
        let value = eval("{a} / {b}", json!({ "a": 10, "b": 3 }));
        let n = value.as_number().unwrap();
        assert!((n - 3.3333).abs() < 1e-3);
        assert_eq!(value.to_string(), "3.33");
    }

    #[test]
    fn division_by_zero_is_a_sentinel() {
        let value = eval("{a} / {b}", json!({ "a": 10, "b": 0 }));
        assert_eq!(value, FormulaValue::DivisionByZero);
        assert!(!value.is_error());
        assert_eq!(value.to_string(), "#DIV/0!");
    }

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(eval("2 + 3 * 4", json!({})), FormulaValue::Number(14.0));
        assert_eq!(eval("(2 + 3) * 4", json!({})), FormulaValue::Number(20.0));
        assert_eq!(eval("-{a} + 5", json!({ "a": 2 })), FormulaValue::Number(3.0));
        assert_eq!(eval("10 - 4 - 3", json!({})), FormulaValue::Number(3.0));
    }

    #[test]
    fn missing_references_are_empty_or_zero() {
        assert_eq!(eval("{missing}", json!({})), FormulaValue::Empty);
        assert_eq!(eval("{missing} + 1", json!({})), FormulaValue::Number(1.0));
        assert_eq!(eval("{missing} * 4", json!({ "missing": null })), FormulaValue::Number(0.0));
    }

    #[test]
    fn text_concatenates_and_numeric_strings_coerce() {
        assert_eq!(
            eval("{first} + ' ' + {last}", json!({ "first": "Ada", "last": "Lovelace" })),
            FormulaValue::Text("Ada Lovelace".into())
        );
        assert_eq!(eval("{price} * 2", json!({ "price": "1,250" })), FormulaValue::Number(2500.0));
        assert_eq!(
            eval("{n} + \" units\"", json!({ "n": 2.5 })),
            FormulaValue::Text("2.5 units".into())
        );
    }

    #[test]
    fn malformed_expressions_are_flagged() {
        for bad in ["{a} +", "{a", "{}", "alert(1)", "(1 + 2", "1 2", "'open", ""] {
            let value = eval(bad, json!({ "a": 1 }));
            assert!(value.is_error(), "{} should be an error, got {:?}", bad, value);
            assert_eq!(value.to_string(), "#ERROR");
        }
    }

    #[test]
    fn deep_nesting_is_rejected_without_recursing() {
        let parens = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        assert_eq!(Formula::parse(&parens), Err(FormulaError::TooDeep));
        assert!(eval(&parens, json!({})).is_error());

        let negations = format!("{}{{a}}", "-".repeat(5000));
        assert_eq!(Formula::parse(&negations), Err(FormulaError::TooDeep));

        let long_sum = vec!["1"; MAX_DEPTH + 2].join(" + ");
        assert_eq!(Formula::parse(&long_sum), Err(FormulaError::TooDeep));

        let shallow = format!("{}2{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&shallow, json!({})), FormulaValue::Number(2.0));
    }

    #[test]
    fn references_are_listed_once() {
        let formula = Formula::parse("{a} * {b} + {a}").unwrap();
        assert_eq!(formula.references(), vec!["a", "b"]);
        assert_eq!(formula.source(), "{a} * {b} + {a}");
    }

    #[test]
    fn formula_fields_are_recomputed_not_read() {
        let mut columns = ColumnRegistry::new();
        columns
            .add_field(NewField::new("Total", FieldType::Formula { expression: "{a} + {b}".into() }).with_id("total"))
            .unwrap();
        columns
            .add_field(NewField::new("Double", FieldType::Formula { expression: "{total} * 2".into() }).with_id("double"))
            .unwrap();
        let r = record(json!({ "a": 1, "b": 2, "total": 999, "double": "stale" }));
        let evaluator = FormulaEvaluator::new(&columns);
        assert_eq!(evaluator.evaluate_field("total", &r), FormulaValue::Number(3.0));
        assert_eq!(evaluator.evaluate_field("double", &r), FormulaValue::Number(6.0));
        assert_eq!(evaluator.evaluate_field("a", &r), FormulaValue::Number(1.0));
    }

    #[test]
    fn circular_formulas_are_errors() {
        let mut columns = ColumnRegistry::new();
        columns
            .add_field(NewField::new("X", FieldType::Formula { expression: "{y} + 1".into() }).with_id("x"))
            .unwrap();
        columns
            .add_field(NewField::new("Y", FieldType::Formula { expression: "{x} + 1".into() }).with_id("y"))
            .unwrap();
        let value = FormulaEvaluator::new(&columns).evaluate_field("x", &Record::new());
        assert!(value.is_error());
    }

    #[test]
    fn format_number_trims_fraction() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(2.5), "2.5");
    }
}
