//! Embedded query language for parenthesized JSON path segments
//!
//! `items.(price > 10 && tags.0 = 'new')` keeps the array elements for which
//! the where-clause holds. Applied to an object the clause either keeps the
//! object or yields null. Hosts may plug in their own [`QueryLanguage`].
//!
//! Grammar:
//!
//! ```text
//! expr    := and ( ("||" | "or") and )*
//! and     := unary ( ("&&" | "and") unary )*
//! unary   := ("!" | "not") unary | "(" expr ")" | test
//! test    := operand "is" ["not"] "null" | operand op operand
//! op      := "=" | "==" | "!=" | ">" | "<" | ">=" | "<=" | "=~" | "!=~"
//! operand := field.path | 'text' | "text" | number | true | false | null
//! ```

use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;

use crate::capture::compile;
use crate::error::ExtractError;

/// Query capability used by `(QUERY)` path segments
pub trait QueryLanguage: Send + Sync {
    fn query(&self, value: &Value, query: &str) -> Result<Value, ExtractError>;
}

/// Default where-clause filter
#[derive(Debug, Clone, Copy, Default)]
pub struct WhereQuery;

impl QueryLanguage for WhereQuery {
    fn query(&self, value: &Value, query: &str) -> Result<Value, ExtractError> {
        let expr = parse(query)?;
        match value {
            Value::Array(items) => {
                let mut kept = Vec::new();
                for item in items {
                    if expr.eval(item) {
                        kept.push(item.clone());
                    }
                }
                Ok(Value::Array(kept))
            }
            Value::Object(_) => Ok(if expr.eval(value) {
                value.clone()
            } else {
                Value::Null
            }),
            _ => Err(query_error(query, "target must be an array or an object")),
        }
    }
}

fn query_error(query: &str, reason: impl Into<String>) -> ExtractError {
    ExtractError::Query {
        query: query.to_string(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Match,
    NotMatch,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Field(String),
    Literal(Value),
    Op(Op),
    And,
    Or,
    Not,
    Is,
    Open,
    Close,
}

#[derive(Debug)]
enum Operand {
    Field(Vec<String>),
    Literal(Value),
}

#[derive(Debug)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull { operand: Operand, negated: bool },
    Compare { left: Operand, op: Op, right: Operand },
    Matches { left: Operand, regex: Regex, negated: bool },
}

fn parse(query: &str) -> Result<Expr, ExtractError> {
    let tokens = tokenize(query)?;
    let mut parser = Parser {
        query,
        tokens,
        pos: 0,
    };
    let expr = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(query_error(query, "unexpected trailing input"));
    }
    Ok(expr)
}

fn tokenize(query: &str) -> Result<Vec<Token>, ExtractError> {
    let chars: Vec<char> = query.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '!' if next == Some('=') && chars.get(i + 2) == Some(&'~') => {
                tokens.push(Token::Op(Op::NotMatch));
                i += 3;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(Op::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' if next == Some('~') => {
                tokens.push(Token::Op(Op::Match));
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op(Op::Eq));
                i += 2;
            }
            '=' => {
                tokens.push(Token::Op(Op::Eq));
                i += 1;
            }
            '>' | '<' => {
                let op = match (c, next) {
                    ('>', Some('=')) => Op::Ge,
                    ('<', Some('=')) => Op::Le,
                    ('>', _) => Op::Gt,
                    _ => Op::Lt,
                };
                tokens.push(Token::Op(op));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\\') if chars.get(i + 1).is_some() => {
                            text.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                        None => return Err(query_error(query, "unterminated string")),
                    }
                }
                tokens.push(Token::Literal(Value::String(text)));
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || matches!(chars[i], '.' | 'e' | 'E')) {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .ok_or_else(|| query_error(query, format!("bad number '{text}'")))?;
                tokens.push(Token::Literal(Value::Number(number)));
            }
            c if is_field_char(c) => {
                let start = i;
                while i < chars.len() && is_field_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "is" => Token::Is,
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    _ => Token::Field(word),
                });
            }
            other => return Err(query_error(query, format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

fn is_field_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '$' | '@')
}

struct Parser<'q> {
    query: &'q str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Expr, ExtractError> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExtractError> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExtractError> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.unary()?)))
            }
            Some(Token::Open) => {
                self.pos += 1;
                let inner = self.expr()?;
                match self.advance() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(query_error(self.query, "missing ')'")),
                }
            }
            _ => self.test(),
        }
    }

    fn test(&mut self) -> Result<Expr, ExtractError> {
        let left = self.operand()?;
        match self.advance() {
            Some(Token::Is) => {
                let negated = self.peek() == Some(&Token::Not);
                if negated {
                    self.pos += 1;
                }
                match self.advance() {
                    Some(Token::Literal(Value::Null)) => Ok(Expr::IsNull {
                        operand: left,
                        negated,
                    }),
                    _ => Err(query_error(self.query, "expected null after 'is'")),
                }
            }
            Some(Token::Op(op @ (Op::Match | Op::NotMatch))) => {
                let pattern = match self.advance() {
                    Some(Token::Literal(Value::String(pattern))) => pattern,
                    _ => return Err(query_error(self.query, "regex must be a quoted string")),
                };
                Ok(Expr::Matches {
                    left,
                    regex: compile(&pattern)?,
                    negated: op == Op::NotMatch,
                })
            }
            Some(Token::Op(op)) => {
                let right = self.operand()?;
                Ok(Expr::Compare { left, op, right })
            }
            _ => Err(query_error(self.query, "expected a comparison")),
        }
    }

    fn operand(&mut self) -> Result<Operand, ExtractError> {
        match self.advance() {
            Some(Token::Field(path)) => Ok(Operand::Field(
                path.split('.').map(str::to_string).collect(),
            )),
            Some(Token::Literal(value)) => Ok(Operand::Literal(value)),
            _ => Err(query_error(self.query, "expected a field or a literal")),
        }
    }
}

impl Operand {
    fn resolve<'v>(&'v self, item: &'v Value) -> Option<&'v Value> {
        match self {
            Operand::Literal(value) => Some(value),
            Operand::Field(path) => path.iter().try_fold(item, |current, key| match current {
                Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => current.get(key),
            }),
        }
    }
}

impl Expr {
    fn eval(&self, item: &Value) -> bool {
        match self {
            Expr::Or(a, b) => a.eval(item) || b.eval(item),
            Expr::And(a, b) => a.eval(item) && b.eval(item),
            Expr::Not(inner) => !inner.eval(item),
            Expr::IsNull { operand, negated } => {
                let is_null = operand.resolve(item).map_or(true, Value::is_null);
                is_null != *negated
            }
            Expr::Matches {
                left,
                regex,
                negated,
            } => {
                let hit = left
                    .resolve(item)
                    .and_then(as_text)
                    .is_some_and(|text| regex.is_match(&text));
                hit != *negated
            }
            Expr::Compare { left, op, right } => {
                let left = left.resolve(item).unwrap_or(&Value::Null);
                let right = right.resolve(item).unwrap_or(&Value::Null);
                match op {
                    Op::Eq => loose_eq(left, right),
                    Op::Ne => !loose_eq(left, right),
                    Op::Gt => compare(left, right) == Some(Ordering::Greater),
                    Op::Lt => compare(left, right) == Some(Ordering::Less),
                    Op::Ge => matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal)),
                    Op::Le => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
                    Op::Match | Op::NotMatch => false,
                }
            }
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => as_text(left) == as_text(right),
        },
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (left, right) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn books() -> Value {
        json!([
            {"title": "Dune", "price": 9.5, "tags": ["scifi"], "author": {"name": "Herbert"}},
            {"title": "Emma", "price": "12", "tags": [], "author": {"name": "Austen"}},
            {"title": "Ulysses", "price": 20, "author": null}
        ])
    }

    fn titles(result: &Value) -> Vec<&str> {
        result
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["title"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_numeric_comparison_coerces_strings() {
        let result = WhereQuery.query(&books(), "price >= 10").unwrap();
        assert_eq!(titles(&result), vec!["Emma", "Ulysses"]);
    }

    #[test]
    fn test_boolean_combinators() {
        let result = WhereQuery
            .query(&books(), "price < 15 && (title = 'Dune' || author.name == \"Austen\")")
            .unwrap();
        assert_eq!(titles(&result), vec!["Dune", "Emma"]);

        let result = WhereQuery.query(&books(), "not title = 'Dune'").unwrap();
        assert_eq!(titles(&result), vec!["Emma", "Ulysses"]);
    }

    #[test]
    fn test_null_checks_and_indexes() {
        let result = WhereQuery.query(&books(), "author is null").unwrap();
        assert_eq!(titles(&result), vec!["Ulysses"]);

        let result = WhereQuery.query(&books(), "tags.0 is not null").unwrap();
        assert_eq!(titles(&result), vec!["Dune"]);
    }

    #[test]
    fn test_regex_match() {
        let result = WhereQuery.query(&books(), "title =~ '^[DE]'").unwrap();
        assert_eq!(titles(&result), vec!["Dune", "Emma"]);

        let result = WhereQuery.query(&books(), "title !=~ 'e'").unwrap();
        assert_eq!(titles(&result), vec!["Emma"]);
    }

    #[test]
    fn test_object_target() {
        let object = json!({"kind": "a"});
        assert_eq!(WhereQuery.query(&object, "kind = 'a'").unwrap(), object);
        assert_eq!(WhereQuery.query(&object, "kind = 'b'").unwrap(), Value::Null);
    }

    #[test]
    fn test_errors() {
        assert!(WhereQuery.query(&books(), "price >").is_err());
        assert!(WhereQuery.query(&books(), "title = 'open").is_err());
        assert!(WhereQuery.query(&books(), "(price > 1").is_err());
        assert!(WhereQuery.query(&json!("text"), "a = 1").is_err());
    }
}
