// SPDX-License-Identifier: MIT

//! Tokenizer for condition expressions

use serde_json::Value;

use crate::flow::error::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare word: keyword or function name (may contain dots)
    Word(String),
    /// Dot-path reference, backticks preserved
    Path(String),
    /// Quoted string literal
    Str(String),
    /// Numeric literal
    Number(Value),
    /// Comparison operator, normalised (`=<` becomes `<=` and so on)
    Op(&'static str),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

/// A token and its byte offset in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

// Longest first, so `<=` wins over `<`. Reversed and negated spellings are
// accepted and mapped onto the canonical operator.
const OPERATORS: [(&str, &str); 11] = [
    ("==", "=="),
    ("!=", "!="),
    ("<>", "!="),
    ("=!", "!="),
    ("<=", "<="),
    ("=<", "<="),
    (">=", ">="),
    ("=>", ">="),
    ("<", "<"),
    (">", ">"),
    ("=", "=="),
];

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let single = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(Spanned { token, position });
            i += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            let (text, next) = read_string(&chars, i, c)?;
            tokens.push(Spanned {
                token: Token::Str(text),
                position,
            });
            i = next;
            continue;
        }

        if c == '`' {
            let end = chars[i + 1..]
                .iter()
                .position(|(_, ch)| *ch == '`')
                .map(|offset| i + 1 + offset)
                .ok_or_else(|| ExpressionError::syntax(position, "unterminated backtick path"))?;
            let text: String = chars[i..=end].iter().map(|(_, ch)| ch).collect();
            tokens.push(Spanned {
                token: Token::Path(text),
                position,
            });
            i = end + 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|(_, ch)| ch).collect();
            tokens.push(Spanned {
                token: Token::Number(parse_number(&text, position)?),
                position,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            let mut in_path = false;
            while i < chars.len() {
                let ch = chars[i].1;
                if ch == '@' {
                    in_path = true;
                } else if !(ch.is_alphanumeric()
                    || ch == '_'
                    || ch == '.'
                    || (in_path && (ch == '-' || ch == '$')))
                {
                    break;
                }
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|(_, ch)| ch).collect();
            let token = if in_path {
                Token::Path(text)
            } else {
                Token::Word(text)
            };
            tokens.push(Spanned { token, position });
            continue;
        }

        let rest: String = chars[i..].iter().take(2).map(|(_, ch)| ch).collect();
        match OPERATORS.iter().find(|(spelling, _)| rest.starts_with(spelling)) {
            Some((spelling, canonical)) => {
                tokens.push(Spanned {
                    token: Token::Op(*canonical),
                    position,
                });
                i += spelling.chars().count();
            }
            None => {
                return Err(ExpressionError::syntax(
                    position,
                    format!("unexpected character '{}'", c),
                ))
            }
        }
    }

    Ok(tokens)
}

fn read_string(
    chars: &[(usize, char)],
    start: usize,
    quote: char,
) -> Result<(String, usize), ExpressionError> {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i].1;
        if c == '\\' && i + 1 < chars.len() {
            text.push(chars[i + 1].1);
            i += 2;
            continue;
        }
        if c == quote {
            return Ok((text, i + 1));
        }
        text.push(c);
        i += 1;
    }
    Err(ExpressionError::syntax(chars[start].0, "unterminated string"))
}

fn parse_number(text: &str, position: usize) -> Result<Value, ExpressionError> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::from(i));
    }
    text.parse::<f64>()
        .map(Value::from)
        .map_err(|_| ExpressionError::syntax(position, format!("invalid number '{}'", text)))
}
