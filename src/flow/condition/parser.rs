// SPDX-License-Identifier: MIT

//! Recursive-descent parser for condition expressions
//!
//! Precedence, lowest first:
//! - `or`
//! - `and`
//! - `not`
//! - predicates: comparisons, `between`, `exists`, `is null`, `empty`,
//!   `contains`, `starts with`, `ends with`
//! - `+ -`
//! - `* /`
//! - unary minus, literals, paths, function calls, parentheses

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashSet;

use super::ast::{ArithmeticOp, CompareOp, Expression, Field};
use super::functions;
use super::lexer::{tokenize, Spanned, Token};
use crate::flow::dot::DotPath;
use crate::flow::error::ExpressionError;

static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "and", "or", "not", "between", "exists", "is", "null", "none", "empty", "contains",
        "starts", "ends", "with", "true", "false",
    ])
});

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, ExpressionError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let expr = parser.parse_or()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(ExpressionError::syntax(
            extra.position,
            format!("unexpected token {:?}", extra.token),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|s| s.position)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn is_keyword_at(&self, offset: usize, keyword: &str) -> bool {
        matches!(self.peek_at(offset), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword_at(0, keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ExpressionError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else if self.peek().is_none() {
            Err(ExpressionError::UnexpectedEnd)
        } else {
            Err(ExpressionError::syntax(
                self.position(),
                format!("expected '{}'", keyword),
            ))
        }
    }

    fn parse_or(&mut self) -> Result<Expression, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("and") {
            let right = self.parse_not()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, ExpressionError> {
        if self.eat_keyword("not") {
            let inner = self.parse_not()?;
            return Ok(Expression::Not(Box::new(inner)));
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expression, ExpressionError> {
        let left = self.parse_sum()?;

        if let Some(Token::Op(op)) = self.peek() {
            let op = match *op {
                "==" => CompareOp::Eq,
                "!=" => CompareOp::NotEq,
                ">" => CompareOp::Gt,
                ">=" => CompareOp::Gte,
                "<" => CompareOp::Lt,
                _ => CompareOp::Lte,
            };
            self.pos += 1;
            let right = self.parse_sum()?;
            return Ok(compare(left, op, right));
        }

        if self.eat_keyword("between") {
            let low = self.parse_sum()?;
            self.expect_keyword("and")?;
            let high = self.parse_sum()?;
            return Ok(Expression::Between {
                value: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
            });
        }

        if self.eat_keyword("exists") {
            return Ok(Expression::Exists {
                operand: Box::new(left),
                negated: false,
            });
        }

        if self.eat_keyword("empty") {
            return Ok(Expression::Empty {
                operand: Box::new(left),
                negated: false,
            });
        }

        if self.is_keyword_at(0, "not")
            && (self.is_keyword_at(1, "exists") || self.is_keyword_at(1, "empty"))
        {
            self.pos += 1;
            let operand = Box::new(left);
            return Ok(if self.eat_keyword("exists") {
                Expression::Exists {
                    operand,
                    negated: true,
                }
            } else {
                self.pos += 1;
                Expression::Empty {
                    operand,
                    negated: true,
                }
            });
        }

        if self.eat_keyword("is") {
            let negated = self.eat_keyword("not");
            if self.eat_keyword("null") || self.eat_keyword("none") {
                return Ok(Expression::IsNull {
                    operand: Box::new(left),
                    negated,
                });
            }
            if self.eat_keyword("empty") {
                return Ok(Expression::Empty {
                    operand: Box::new(left),
                    negated,
                });
            }
            return Err(ExpressionError::syntax(
                self.position(),
                "expected 'null' or 'empty' after 'is'",
            ));
        }

        if self.eat_keyword("contains") {
            let right = self.parse_sum()?;
            return Ok(compare(left, CompareOp::Contains, right));
        }

        if self.is_keyword_at(0, "starts") || self.is_keyword_at(0, "ends") {
            let op = if self.eat_keyword("starts") {
                CompareOp::StartsWith
            } else {
                self.pos += 1;
                CompareOp::EndsWith
            };
            self.expect_keyword("with")?;
            let right = self.parse_sum()?;
            return Ok(compare(left, op, right));
        }

        Ok(left)
    }

    fn parse_sum(&mut self) -> Result<Expression, ExpressionError> {
        let mut left = self.parse_product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithmeticOp::Add,
                Some(Token::Minus) => ArithmeticOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_product()?;
            left = Expression::Arithmetic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn parse_product(&mut self) -> Result<Expression, ExpressionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithmeticOp::Mul,
                Some(Token::Slash) => ArithmeticOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expression::Arithmetic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expression, ExpressionError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            return match self.parse_unary()? {
                Expression::Literal(Value::Number(n)) => Ok(Expression::Literal(negate(&n))),
                operand => Ok(Expression::Arithmetic {
                    left: Box::new(Expression::Literal(Value::from(0))),
                    op: ArithmeticOp::Sub,
                    right: Box::new(operand),
                }),
            };
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expression, ExpressionError> {
        let position = self.position();
        let token = self.advance().ok_or(ExpressionError::UnexpectedEnd)?;

        match token {
            Token::Str(s) => Ok(Expression::Literal(Value::String(s))),
            Token::Number(n) => Ok(Expression::Literal(n)),
            Token::Path(raw) => {
                let path = DotPath::parse(&raw).ok_or_else(|| {
                    ExpressionError::syntax(position, format!("invalid field reference '{}'", raw))
                })?;
                Ok(Expression::Field(Field { raw, path }))
            }
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    Some(_) => Err(ExpressionError::syntax(self.position(), "expected ')'")),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            Token::Word(word) => self.parse_word(word, position),
            other => Err(ExpressionError::syntax(
                position,
                format!("unexpected token {:?}", other),
            )),
        }
    }

    fn parse_word(&mut self, word: String, position: usize) -> Result<Expression, ExpressionError> {
        let lower = word.to_lowercase();
        match lower.as_str() {
            "true" => return Ok(Expression::Literal(Value::Bool(true))),
            "false" => return Ok(Expression::Literal(Value::Bool(false))),
            "null" | "none" => return Ok(Expression::Literal(Value::Null)),
            _ => {}
        }

        if !matches!(self.peek(), Some(Token::LParen)) {
            let message = if KEYWORDS.contains(lower.as_str()) {
                format!("unexpected keyword '{}'", word)
            } else {
                format!("unknown identifier '{}'", word)
            };
            return Err(ExpressionError::syntax(position, message));
        }
        self.pos += 1;

        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.parse_or()?);
                match self.advance() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    Some(_) => {
                        return Err(ExpressionError::syntax(
                            self.position(),
                            "expected ',' or ')'",
                        ))
                    }
                    None => return Err(ExpressionError::UnexpectedEnd),
                }
            }
        }

        functions::check_arity(&lower, args.len())?;
        Ok(Expression::Function { name: lower, args })
    }
}

fn compare(left: Expression, op: CompareOp, right: Expression) -> Expression {
    Expression::Compare {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn negate(n: &serde_json::Number) -> Value {
    match n.as_i64().and_then(i64::checked_neg) {
        Some(i) => Value::from(i),
        None => Value::from(-n.as_f64().unwrap_or(0.0)),
    }
}
