//! Guard conditions for implementation steps.
//!
//! A step may carry a small boolean expression that decides whether it runs:
//!
//! ```text
//! current_quality > 100 && mode != "eco"
//! !(fan_started) || speed == "high"
//! ```
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | compare
//! compare := operand (("==" | "!=" | "<" | "<=" | ">" | ">=") operand)?
//! operand := number | string | true | false | null | ident | "(" or ")"
//! ```
//!
//! Identifiers resolve against the result accumulated so far, then against the
//! call parameters. Dotted identifiers (`profile.theme`) walk nested objects. An
//! unknown identifier is `null`.

use crate::model::Params;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("Unexpected end of condition")]
    UnexpectedEof,
    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    Op(&'static str),
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed guard expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Literal(Value),
    Var(String),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Compare(Box<Condition>, CmpOp, Box<Condition>),
}

impl Condition {
    pub fn parse(input: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.next() {
            None => Ok(expr),
            Some(tok) => Err(ConditionError::UnexpectedToken(format!("{tok:?}"))),
        }
    }

    /// Evaluates against `result` first, then `params`.
    pub fn evaluate(&self, params: &Params, result: &Params) -> bool {
        truthy(&self.value(params, result))
    }

    fn value(&self, params: &Params, result: &Params) -> Value {
        match self {
            Condition::Literal(v) => v.clone(),
            Condition::Var(name) => lookup(name, result)
                .or_else(|| lookup(name, params))
                .cloned()
                .unwrap_or(Value::Null),
            Condition::Not(inner) => Value::Bool(!inner.evaluate(params, result)),
            Condition::And(l, r) => {
                Value::Bool(l.evaluate(params, result) && r.evaluate(params, result))
            }
            Condition::Or(l, r) => {
                Value::Bool(l.evaluate(params, result) || r.evaluate(params, result))
            }
            Condition::Compare(l, op, r) => {
                let (l, r) = (l.value(params, result), r.value(params, result));
                Value::Bool(compare(&l, *op, &r))
            }
        }
    }
}

/// Parses and evaluates in one go. An empty or blank condition is always true.
pub fn evaluate(condition: &str, params: &Params, result: &Params) -> Result<bool, ConditionError> {
    if condition.trim().is_empty() {
        return Ok(true);
    }
    Ok(Condition::parse(condition)?.evaluate(params, result))
}

fn lookup<'a>(path: &str, scope: &'a Params) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = scope.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare(l: &Value, op: CmpOp, r: &Value) -> bool {
    if let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) {
        return match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        };
    }
    if let (Some(a), Some(b)) = (l.as_str(), r.as_str()) {
        return match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        };
    }
    match op {
        CmpOp::Eq => l == r,
        CmpOp::Ne => l != r,
        // Ordering across mismatched types never holds.
        _ => false,
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.peek().copied() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '\'' || ch == '"' {
            let quote = ch;
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some(c) if c == quote => break,
                    Some('\\') => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => return Err(ConditionError::UnexpectedEof),
                    },
                    Some(c) => value.push(c),
                    None => return Err(ConditionError::UnexpectedEof),
                }
            }
            tokens.push(Token::Str(value));
            continue;
        }

        if ch.is_ascii_digit() || (ch == '-' && tokens_expect_operand(&tokens)) {
            let mut value = String::new();
            value.push(ch);
            chars.next();
            while let Some(c) = chars.peek().copied() {
                if c.is_ascii_digit() || c == '.' {
                    value.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let number = value
                .parse::<f64>()
                .map_err(|_| ConditionError::InvalidNumber(value.clone()))?;
            tokens.push(Token::Number(number));
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut value = String::new();
            while let Some(c) = chars.peek().copied() {
                if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                    value.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(value));
            continue;
        }

        chars.next();
        let next = chars.peek().copied();
        let token = match (ch, next) {
            ('(', _) => Token::LParen,
            (')', _) => Token::RParen,
            ('=', Some('=')) => two(&mut chars, "=="),
            ('!', Some('=')) => two(&mut chars, "!="),
            ('<', Some('=')) => two(&mut chars, "<="),
            ('>', Some('=')) => two(&mut chars, ">="),
            ('&', Some('&')) => two(&mut chars, "&&"),
            ('|', Some('|')) => two(&mut chars, "||"),
            ('<', _) => Token::Op("<"),
            ('>', _) => Token::Op(">"),
            ('!', _) => Token::Op("!"),
            _ => return Err(ConditionError::UnexpectedToken(ch.to_string())),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn two(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, op: &'static str) -> Token {
    chars.next();
    Token::Op(op)
}

/// A leading `-` is a sign only where an operand is expected.
fn tokens_expect_operand(tokens: &[Token]) -> bool {
    matches!(tokens.last(), None | Some(Token::Op(_)) | Some(Token::LParen))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Condition, ConditionError> {
        let mut left = self.parse_and()?;
        while self.eat_op("||") {
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition, ConditionError> {
        let mut left = self.parse_unary()?;
        while self.eat_op("&&") {
            let right = self.parse_unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Condition, ConditionError> {
        if self.eat_op("!") {
            return Ok(Condition::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Condition, ConditionError> {
        let left = self.parse_operand()?;
        let op = match self.peek() {
            Some(Token::Op("==")) => CmpOp::Eq,
            Some(Token::Op("!=")) => CmpOp::Ne,
            Some(Token::Op("<")) => CmpOp::Lt,
            Some(Token::Op("<=")) => CmpOp::Le,
            Some(Token::Op(">")) => CmpOp::Gt,
            Some(Token::Op(">=")) => CmpOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_operand()?;
        Ok(Condition::Compare(Box::new(left), op, Box::new(right)))
    }

    fn parse_operand(&mut self) -> Result<Condition, ConditionError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Condition::Literal(Value::from(n))),
            Some(Token::Str(s)) => Ok(Condition::Literal(Value::String(s))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Condition::Literal(Value::Bool(true)),
                "false" => Condition::Literal(Value::Bool(false)),
                "null" => Condition::Literal(Value::Null),
                _ => Condition::Var(name),
            }),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(tok) => Err(ConditionError::UnexpectedToken(format!("{tok:?}"))),
                    None => Err(ConditionError::UnexpectedEof),
                }
            }
            Some(tok) => Err(ConditionError::UnexpectedToken(format!("{tok:?}"))),
            None => Err(ConditionError::UnexpectedEof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => Params::new(),
        }
    }

    #[test]
    fn test_numeric_comparisons() {
        let params = scope(json!({"air_quality": 150.0}));
        let result = Params::new();
        assert!(evaluate("air_quality > 100", &params, &result).unwrap());
        assert!(!evaluate("air_quality <= 100", &params, &result).unwrap());
        assert!(evaluate("air_quality == 150", &params, &result).unwrap());
        assert!(evaluate("air_quality >= -1", &params, &result).unwrap());
    }

    #[test]
    fn test_result_shadows_params() {
        let params = scope(json!({"status": "bad"}));
        let result = scope(json!({"status": "good"}));
        assert!(evaluate("status == 'good'", &params, &result).unwrap());
    }

    #[test]
    fn test_boolean_logic_and_nesting() {
        let params = scope(json!({"speed": "high", "profile": {"theme": "dark"}}));
        let result = scope(json!({"fan_started": true}));
        assert!(evaluate("fan_started && speed == \"high\"", &params, &result).unwrap());
        assert!(evaluate("!(fan_started) || profile.theme == 'dark'", &params, &result).unwrap());
        assert!(!evaluate("missing", &params, &result).unwrap());
        assert!(evaluate("missing == null", &params, &result).unwrap());
    }

    #[test]
    fn test_blank_condition_always_runs() {
        assert!(evaluate("  ", &Params::new(), &Params::new()).unwrap());
    }

    #[test]
    fn test_malformed_conditions_are_rejected() {
        assert!(matches!(
            Condition::parse("a >"),
            Err(ConditionError::UnexpectedEof)
        ));
        assert!(matches!(
            Condition::parse("a = 1"),
            Err(ConditionError::UnexpectedToken(_))
        ));
        assert!(Condition::parse("(a > 1").is_err());
    }

    #[test]
    fn test_mismatched_types_never_order() {
        let params = scope(json!({"level": "high"}));
        assert!(!evaluate("level > 3", &params, &Params::new()).unwrap());
        assert!(evaluate("level != 3", &params, &Params::new()).unwrap());
    }
}
