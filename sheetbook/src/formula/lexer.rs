//! Formula tokenizer
//!
//! Tokens keep their byte span in the source so that reference rewriting can
//! splice new text into a formula without touching anything else.

use super::ast::{CellRef, Coord, RefTarget, Reference};
use crate::address::{MAX_COLS, MAX_ROWS, column_index};
use crate::model::ErrorValue;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Text(String),
    Bool(bool),
    Error(ErrorValue),
    /// `prefix_len` is the byte length of the `Sheet!` qualifier, 0 if none
    Reference {
        reference: Reference,
        prefix_len: usize,
    },
    /// Identifier directly followed by `(`
    Function(String),
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Ampersand,
    Percent,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub position: usize,
    pub message: String,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.message, self.position)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '\\'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '\\'
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    Lexer { src, pos: 0 }.run()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            position: self.pos,
            message: message.into(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
                continue;
            }
            let start = self.pos;
            let kind = self.next_kind(c)?;
            tokens.push(Token {
                kind,
                span: start..self.pos,
            });
        }
        Ok(tokens)
    }

    fn next_kind(&mut self, c: char) -> Result<TokenKind, LexError> {
        let single = |lexer: &mut Self, kind: TokenKind| -> Result<TokenKind, LexError> {
            lexer.pos += 1;
            Ok(kind)
        };
        match c {
            '+' => single(self, TokenKind::Plus),
            '-' => single(self, TokenKind::Minus),
            '*' => single(self, TokenKind::Star),
            '/' => single(self, TokenKind::Slash),
            '^' => single(self, TokenKind::Caret),
            '&' => single(self, TokenKind::Ampersand),
            '%' => single(self, TokenKind::Percent),
            '(' => single(self, TokenKind::LParen),
            ')' => single(self, TokenKind::RParen),
            ',' => single(self, TokenKind::Comma),
            '=' => single(self, TokenKind::Eq),
            '<' => {
                if self.rest().starts_with("<=") {
                    self.pos += 2;
                    Ok(TokenKind::Le)
                } else if self.rest().starts_with("<>") {
                    self.pos += 2;
                    Ok(TokenKind::Ne)
                } else {
                    single(self, TokenKind::Lt)
                }
            }
            '>' => {
                if self.rest().starts_with(">=") {
                    self.pos += 2;
                    Ok(TokenKind::Ge)
                } else {
                    single(self, TokenKind::Gt)
                }
            }
            '"' => self.string(),
            '#' => self.error_literal(),
            _ => {
                if let Some((kind, len)) = scan_reference(self.rest()) {
                    self.pos += len;
                    return Ok(kind);
                }
                if c.is_ascii_digit() || c == '.' {
                    return self.number();
                }
                if is_ident_start(c) {
                    return Ok(self.identifier());
                }
                Err(self.error(format!("unexpected character '{}'", c)))
            }
        }
    }

    fn string(&mut self) -> Result<TokenKind, LexError> {
        let mut text = String::new();
        let mut chars = self.rest().char_indices().skip(1).peekable();
        while let Some((i, c)) = chars.next() {
            if c == '"' {
                if let Some((_, '"')) = chars.peek() {
                    text.push('"');
                    chars.next();
                    continue;
                }
                self.pos += i + 1;
                return Ok(TokenKind::Text(text));
            }
            text.push(c);
        }
        Err(self.error("unterminated string literal"))
    }

    fn error_literal(&mut self) -> Result<TokenKind, LexError> {
        const LITERALS: [&str; 8] = [
            "#NULL!", "#DIV/0!", "#VALUE!", "#REF!", "#NAME?", "#NUM!", "#N/A", "#CIRC!",
        ];
        let rest = self.rest();
        for literal in LITERALS {
            if rest.len() >= literal.len()
                && rest.is_char_boundary(literal.len())
                && rest[..literal.len()].eq_ignore_ascii_case(literal)
            {
                self.pos += literal.len();
                let value = ErrorValue::parse(literal).unwrap_or(ErrorValue::Name);
                return Ok(TokenKind::Error(value));
            }
        }
        Err(self.error("unknown error literal"))
    }

    fn number(&mut self) -> Result<TokenKind, LexError> {
        let rest = self.rest().as_bytes();
        let mut end = 0;
        while end < rest.len() && (rest[end].is_ascii_digit() || rest[end] == b'.') {
            end += 1;
        }
        if end < rest.len() && (rest[end] == b'e' || rest[end] == b'E') {
            let mut exp = end + 1;
            if exp < rest.len() && (rest[exp] == b'+' || rest[exp] == b'-') {
                exp += 1;
            }
            if exp < rest.len() && rest[exp].is_ascii_digit() {
                while exp < rest.len() && rest[exp].is_ascii_digit() {
                    exp += 1;
                }
                end = exp;
            }
        }
        let text = &self.rest()[..end];
        let value = text
            .parse::<f64>()
            .map_err(|_| self.error(format!("malformed number '{}'", text)))?;
        self.pos += end;
        Ok(TokenKind::Number(value))
    }

    fn identifier(&mut self) -> TokenKind {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, c)| !is_ident_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let name = &rest[..end];
        self.pos += end;
        if self.peek() == Some('(') {
            return TokenKind::Function(name.to_ascii_uppercase());
        }
        if name.eq_ignore_ascii_case("TRUE") {
            TokenKind::Bool(true)
        } else if name.eq_ignore_ascii_case("FALSE") {
            TokenKind::Bool(false)
        } else {
            TokenKind::Name(name.to_string())
        }
    }
}

/// Sheet qualifier at the start of `s`: returns (sheet name, bytes consumed
/// including `!`)
fn scan_sheet_prefix(s: &str) -> Option<(String, usize)> {
    if let Some(quoted) = s.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = quoted.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if let Some((_, '\'')) = chars.peek() {
                    name.push('\'');
                    chars.next();
                    continue;
                }
                let after = 1 + i + 1;
                return s[after..].starts_with('!').then(|| (name, after + 1));
            }
            name.push(c);
        }
        return None;
    }
    let first = s.chars().next()?;
    if !(first.is_alphanumeric() || first == '_') {
        return None;
    }
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '.'))
        .map(|(i, _)| i)?;
    s[end..]
        .starts_with('!')
        .then(|| (s[..end].to_string(), end + 1))
}

/// `$?letters` or `$?digits` component
fn scan_coord(s: &str, letters: bool) -> Option<(Coord, usize)> {
    let absolute = s.starts_with('$');
    let offset = usize::from(absolute);
    let body = &s[offset..];
    let len = body
        .char_indices()
        .find(|(_, c)| {
            if letters {
                !c.is_ascii_alphabetic()
            } else {
                !c.is_ascii_digit()
            }
        })
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    if len == 0 {
        return None;
    }
    let text = &body[..len];
    let index = if letters {
        column_index(text)?
    } else {
        let row = text.parse::<u32>().ok()?;
        if row == 0 || row > MAX_ROWS {
            return None;
        }
        row - 1
    };
    Some((Coord::new(index, absolute), offset + len))
}

fn scan_cell(s: &str) -> Option<(CellRef, usize)> {
    let (col, a) = scan_coord(s, true)?;
    let (row, b) = scan_coord(&s[a..], false)?;
    Some((CellRef { row, col }, a + b))
}

fn ends_cleanly(s: &str) -> bool {
    match s.chars().next() {
        None => true,
        Some(c) => !(is_ident_char(c) || c == '(' || c == '$' || c == '!' || c == ':'),
    }
}

fn scan_target(s: &str) -> Option<(RefTarget, usize)> {
    if let Some((first, a)) = scan_cell(s) {
        if let Some(rest) = s[a..].strip_prefix(':')
            && let Some((second, b)) = scan_cell(rest)
            && ends_cleanly(&rest[b..])
        {
            return Some((RefTarget::Area(first, second), a + 1 + b));
        }
        if ends_cleanly(&s[a..]) {
            return Some((RefTarget::Cell(first), a));
        }
        return None;
    }
    for letters in [true, false] {
        if let Some((first, a)) = scan_coord(s, letters)
            && let Some(rest) = s[a..].strip_prefix(':')
            && let Some((second, b)) = scan_coord(rest, letters)
            && ends_cleanly(&rest[b..])
        {
            let target = if letters {
                if first.index >= MAX_COLS || second.index >= MAX_COLS {
                    return None;
                }
                RefTarget::Columns(first, second)
            } else {
                RefTarget::Rows(first, second)
            };
            return Some((target, a + 1 + b));
        }
    }
    None
}

/// Try to read a reference at the start of `s`
fn scan_reference(s: &str) -> Option<(TokenKind, usize)> {
    let (sheet, prefix_len) = match scan_sheet_prefix(s) {
        Some((name, len)) => (Some(name), len),
        None => (None, 0),
    };
    let body = &s[prefix_len..];
    if sheet.is_some() && body.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("#REF!")) {
        return Some((TokenKind::Error(ErrorValue::Ref), prefix_len + 5));
    }
    let (target, len) = scan_target(body)?;
    Some((
        TokenKind::Reference {
            reference: Reference { sheet, target },
            prefix_len,
        },
        prefix_len + len,
    ))
}
