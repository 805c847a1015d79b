//! Token stream for the condition/value mini-language
//!
//! This is not the main grammar parser; it is a small, line-tracking
//! lexer feeding the recursive-descent layer in `condition.rs`.

use crate::error::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare identifier or keyword (keywords are matched case-insensitively
    /// by the parser, not the lexer).
    Ident(String),
    /// Unparsed numeric literal.
    Number(String),
    /// Single-quoted string literal, quotes stripped.
    Str(String),
    /// Relational or arithmetic operator.
    Operator(String),
    /// Single punctuation character: `(`, `)`, `,`, `.`
    Symbol(char),
    /// Positional substitution marker `%N`.
    Substitution(usize),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::Str(s) => write!(f, "'{}'", s),
            TokenKind::Operator(op) => write!(f, "{}", op),
            TokenKind::Symbol(c) => write!(f, "{}", c),
            TokenKind::Substitution(n) => write!(f, "%{}", n),
        }
    }
}

/// A token plus the 1-based source line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

/// Tokenizes mini-language source, tracking line numbers.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1usize;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | ',' | '.' => {
                tokens.push(Token {
                    kind: TokenKind::Symbol(c),
                    line,
                });
                chars.next();
            }
            '\'' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => {
                            // Doubled quote is an escaped quote
                            if chars.peek() == Some(&'\'') {
                                chars.next();
                                s.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some('\n') => {
                            line += 1;
                            s.push('\n');
                        }
                        Some(ch) => s.push(ch),
                        None => return Err(Error::parse_at("unterminated string literal", line)),
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Str(s),
                    line,
                });
            }
            '%' => {
                chars.next();
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if digits.is_empty() {
                    return Err(Error::parse_at("expected digits after '%'", line));
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| Error::parse_at(format!("invalid substitution index %{}", digits), line))?;
                tokens.push(Token {
                    kind: TokenKind::Substitution(index),
                    line,
                });
            }
            '>' | '<' | '=' | '!' => {
                chars.next();
                let mut op = c.to_string();
                if let Some(&next) = chars.peek() {
                    let two = format!("{}{}", c, next);
                    if matches!(two.as_str(), ">=" | "<=" | "==" | "!=" | "<>") {
                        op = two;
                        chars.next();
                    }
                }
                if op == "!" {
                    return Err(Error::parse_at("'!' is not an operator; use != or <>", line));
                }
                tokens.push(Token {
                    kind: TokenKind::Operator(op),
                    line,
                });
            }
            '+' | '-' | '*' | '/' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Operator(c.to_string()),
                    line,
                });
            }
            c if c.is_ascii_digit() => {
                let mut n = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' {
                        n.push(d);
                        chars.next();
                        // Exponent sign
                        if d == 'e' || d == 'E' {
                            if let Some(&sign @ ('+' | '-')) = chars.peek() {
                                n.push(sign);
                                chars.next();
                            }
                        }
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Number(n),
                    line,
                });
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(ident),
                    line,
                });
            }
            other => {
                return Err(Error::parse_at(format!("unexpected character '{}'", other), line));
            }
        }
    }
    Ok(tokens)
}

/// A cursor over a token vector with line-aware errors.
#[derive(Debug)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        TokenStream { tokens, pos: 0 }
    }

    pub fn from_source(source: &str) -> Result<Self> {
        Ok(TokenStream::new(tokenize(source)?))
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    /// Line of the next token, or of the last one when exhausted.
    pub fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Consumes the next token if it is the given symbol.
    pub fn eat_symbol(&mut self, symbol: char) -> bool {
        if matches!(self.peek(), Some(Token { kind: TokenKind::Symbol(c), .. }) if *c == symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Requires the next token to be the given symbol.
    pub fn expect_symbol(&mut self, symbol: char, context: &str) -> Result<()> {
        let line = self.line();
        match self.next() {
            Some(Token {
                kind: TokenKind::Symbol(c),
                ..
            }) if c == symbol => Ok(()),
            Some(t) => Err(Error::parse_at(
                format!("expected '{}' in {}, found '{}'", symbol, context, t.kind),
                t.line,
            )),
            None => Err(Error::parse_at(
                format!("expected '{}' in {}, found end of input", symbol, context),
                line,
            )),
        }
    }

    /// Consumes the next token if it is the given keyword (case-insensitive).
    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token { kind: TokenKind::Ident(s), .. }) if s.eq_ignore_ascii_case(keyword))
        {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Requires an identifier next and returns it.
    pub fn expect_ident(&mut self, context: &str) -> Result<String> {
        let line = self.line();
        match self.next() {
            Some(Token {
                kind: TokenKind::Ident(s),
                ..
            }) => Ok(s),
            Some(t) => Err(Error::parse_at(
                format!("expected identifier in {}, found '{}'", context, t.kind),
                t.line,
            )),
            None => Err(Error::parse_at(
                format!("expected identifier in {}, found end of input", context),
                line,
            )),
        }
    }
}
