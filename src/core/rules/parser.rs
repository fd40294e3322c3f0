// src/core/rules/parser.rs

//! Parses the textual rule form into a `RuleSpec`.
//!
//! ```text
//! expr  := conj ("or" conj)*
//! conj  := unary (["and"] unary)*
//! unary := "not" unary | "(" expr ")" | term
//! term  := key=value | key="quoted value" | key=* | word | "quoted word"
//! ```
//!
//! An unquoted value containing `*` or `?` becomes a wildcard match, `key=*`
//! only requires the key to be present, and a bare word matches that value
//! under any key. Keywords are case-insensitive.

use super::RuleSpec;
use crate::core::RoomGraphError;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Term {
        key: Option<String>,
        value: String,
        quoted: bool,
    },
}

impl FromStr for RuleSpec {
    type Err = RoomGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = tokenize(s)?;
        if tokens.is_empty() {
            return Err(RoomGraphError::InvalidRule("empty rule".to_string()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let spec = parser.parse_expr()?;
        if let Some(token) = parser.peek() {
            return Err(RoomGraphError::InvalidRule(format!(
                "unexpected {token:?} at position {}",
                parser.pos
            )));
        }
        Ok(spec)
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, RoomGraphError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        match c {
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' => {
                chars.next();
                let value = read_quoted(&mut chars)?;
                tokens.push(Token::Term {
                    key: None,
                    value,
                    quoted: true,
                });
            }
            _ => {
                let mut word = String::new();
                let mut key = None;
                let mut quoted = false;
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' {
                        break;
                    }
                    chars.next();
                    if c == '=' && key.is_none() {
                        key = Some(std::mem::take(&mut word));
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            word = read_quoted(&mut chars)?;
                            quoted = true;
                            break;
                        }
                        continue;
                    }
                    word.push(c);
                }

                let token = match (&key, word.to_ascii_lowercase().as_str()) {
                    (None, "and") => Token::And,
                    (None, "or") => Token::Or,
                    (None, "not") => Token::Not,
                    _ => Token::Term {
                        key,
                        value: word,
                        quoted,
                    },
                };
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

fn read_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String, RoomGraphError> {
    let mut value = String::new();
    for c in chars.by_ref() {
        if c == '"' {
            return Ok(value);
        }
        value.push(c);
    }
    Err(RoomGraphError::InvalidRule(
        "unterminated quoted value".to_string(),
    ))
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
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expr(&mut self) -> Result<RuleSpec, RoomGraphError> {
        let mut branches = vec![self.parse_conj()?];
        while self.peek() == Some(&Token::Or) {
            self.next();
            branches.push(self.parse_conj()?);
        }
        Ok(collapse(branches, RuleSpec::Or))
    }

    fn parse_conj(&mut self) -> Result<RuleSpec, RoomGraphError> {
        let mut parts = vec![self.parse_unary()?];
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.next();
                    parts.push(self.parse_unary()?);
                }
                Some(Token::Not | Token::LParen | Token::Term { .. }) => {
                    parts.push(self.parse_unary()?);
                }
                _ => break,
            }
        }
        Ok(collapse(parts, RuleSpec::And))
    }

    fn parse_unary(&mut self) -> Result<RuleSpec, RoomGraphError> {
        match self.next() {
            Some(Token::Not) => Ok(RuleSpec::Not(Box::new(self.parse_unary()?))),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(RoomGraphError::InvalidRule(
                        "missing closing parenthesis".to_string(),
                    )),
                }
            }
            Some(Token::Term { key, value, quoted }) => term(key, value, quoted),
            Some(other) => Err(RoomGraphError::InvalidRule(format!(
                "unexpected {other:?}"
            ))),
            None => Err(RoomGraphError::InvalidRule(
                "rule ends where a term was expected".to_string(),
            )),
        }
    }
}

fn term(key: Option<String>, value: String, quoted: bool) -> Result<RuleSpec, RoomGraphError> {
    let Some(key) = key else {
        return Ok(RuleSpec::Contains(value));
    };
    if key.is_empty() {
        return Err(RoomGraphError::InvalidRule(format!(
            "missing key before '={value}'"
        )));
    }
    if value.is_empty() && !quoted {
        return Err(RoomGraphError::InvalidRule(format!(
            "missing value after '{key}='"
        )));
    }
    if quoted {
        return Ok(RuleSpec::Equals { key, value });
    }
    if value == "*" {
        return Ok(RuleSpec::HasKey(key));
    }
    if value.contains(['*', '?']) {
        return Ok(RuleSpec::Glob {
            key,
            pattern: value,
        });
    }
    Ok(RuleSpec::Equals { key, value })
}

fn collapse(mut specs: Vec<RuleSpec>, combine: fn(Vec<RuleSpec>) -> RuleSpec) -> RuleSpec {
    if specs.len() == 1 {
        specs.remove(0)
    } else {
        combine(specs)
    }
}
