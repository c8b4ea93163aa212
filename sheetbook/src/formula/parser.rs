//! Precedence-climbing parser over the token stream

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::lexer::{LexError, Token, TokenKind, tokenize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.position)
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        Self {
            position: e.position,
            message: e.message,
        }
    }
}

/// Parse formula text, with or without the leading `=`
pub fn parse_formula(text: &str) -> Result<Expr, ParseError> {
    let body = text.trim_start();
    let body = body.strip_prefix('=').unwrap_or(body);
    let tokens = tokenize(body)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        len: body.len(),
    };
    let expr = parser.comparison()?;
    if let Some(token) = parser.tokens.get(parser.pos) {
        return Err(parser.error_at(token, "unexpected token"));
    }
    Ok(expr)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    len: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, token: &Token, message: &str) -> ParseError {
        ParseError {
            position: token.span.start,
            message: message.to_string(),
        }
    }

    fn error_here(&self, message: &str) -> ParseError {
        match self.tokens.get(self.pos) {
            Some(token) => self.error_at(token, message),
            None => ParseError {
                position: self.len,
                message: message.to_string(),
            },
        }
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ParseError>,
        op_of: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> Result<Expr, ParseError> {
        let mut lhs = next(self)?;
        while let Some(op) = self.peek().and_then(op_of) {
            self.pos += 1;
            let rhs = next(self)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(Self::concat, |kind| match kind {
            TokenKind::Eq => Some(BinaryOp::Eq),
            TokenKind::Ne => Some(BinaryOp::Ne),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::Le => Some(BinaryOp::Le),
            TokenKind::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn concat(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(Self::additive, |kind| {
            matches!(kind, TokenKind::Ampersand).then_some(BinaryOp::Concat)
        })
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(Self::multiplicative, |kind| match kind {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(Self::power, |kind| match kind {
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            _ => None,
        })
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(Self::postfix, |kind| {
            matches!(kind, TokenKind::Caret).then_some(BinaryOp::Pow)
        })
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;
        while matches!(self.peek(), Some(TokenKind::Percent)) {
            self.pos += 1;
            expr = Expr::Percent(Box::new(expr));
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(TokenKind::Minus) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Minus, Box::new(self.unary()?)))
            }
            Some(TokenKind::Plus) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Plus, Box::new(self.unary()?)))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.advance() else {
            return Err(self.error_here("unexpected end of formula"));
        };
        match &token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(*n)),
            TokenKind::Text(s) => Ok(Expr::Text(s.clone())),
            TokenKind::Bool(b) => Ok(Expr::Bool(*b)),
            TokenKind::Error(e) => Ok(Expr::Error(*e)),
            TokenKind::Reference { reference, .. } => Ok(Expr::Reference(reference.clone())),
            TokenKind::Name(name) => Ok(Expr::Name(name.clone())),
            TokenKind::Function(name) => self.call(name.clone()),
            TokenKind::LParen => {
                let inner = self.comparison()?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    _ => Err(self.error_here("expected ')'")),
                }
            }
            _ => Err(self.error_at(token, "unexpected token")),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, ParseError> {
        if !matches!(self.advance().map(|t| &t.kind), Some(TokenKind::LParen)) {
            return Err(self.error_here("expected '('"));
        }
        let mut args = Vec::new();
        if matches!(self.peek(), Some(TokenKind::RParen)) {
            self.pos += 1;
            return Ok(Expr::Call(name, args));
        }
        loop {
            let arg = match self.peek() {
                Some(TokenKind::Comma) | Some(TokenKind::RParen) => Expr::Missing,
                _ => self.comparison()?,
            };
            args.push(arg);
            match self.advance().map(|t| &t.kind) {
                Some(TokenKind::Comma) => continue,
                Some(TokenKind::RParen) => break,
                _ => return Err(self.error_here("expected ',' or ')'")),
            }
        }
        Ok(Expr::Call(name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ast::RefTarget;

    fn parse(text: &str) -> Expr {
        parse_formula(text).unwrap()
    }

    #[test]
    fn test_precedence() {
        // unary minus binds tighter than ^
        assert_eq!(
            parse("=-2^2"),
            Expr::Binary(
                BinaryOp::Pow,
                Box::new(Expr::Unary(UnaryOp::Minus, Box::new(Expr::Number(2.0)))),
                Box::new(Expr::Number(2.0)),
            )
        );
        // * before +, & after +
        match parse("1+2*3&\"x\"") {
            Expr::Binary(BinaryOp::Concat, lhs, _) => match *lhs {
                Expr::Binary(BinaryOp::Add, _, rhs) => {
                    assert!(matches!(*rhs, Expr::Binary(BinaryOp::Mul, _, _)))
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        // comparison is the loosest
        assert!(matches!(parse("A1+1>=B1&\"\""), Expr::Binary(BinaryOp::Ge, _, _)));
    }

    #[test]
    fn test_left_associativity() {
        match parse("10-4-3") {
            Expr::Binary(BinaryOp::Sub, lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Binary(BinaryOp::Sub, _, _)));
                assert_eq!(*rhs, Expr::Number(3.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_calls_and_missing_arguments() {
        match parse("=IF(A1,,SUM(B1:B3))") {
            Expr::Call(name, args) => {
                assert_eq!(name, "IF");
                assert_eq!(args.len(), 3);
                assert_eq!(args[1], Expr::Missing);
                assert!(matches!(&args[2], Expr::Call(n, a) if n == "SUM" && a.len() == 1));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(parse("PI()"), Expr::Call("PI".to_string(), vec![]));
    }

    #[test]
    fn test_references_collected() {
        let expr = parse("AVERAGE(B6:B9)+Sheet2!A1*50%");
        let refs = expr.references();
        assert_eq!(refs.len(), 2);
        assert!(matches!(refs[0].target, RefTarget::Area(..)));
        assert_eq!(refs[1].sheet.as_deref(), Some("Sheet2"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_formula("=1+").is_err());
        assert!(parse_formula("=(1+2").is_err());
        assert!(parse_formula("=SUM(1 2)").is_err());
        assert!(parse_formula("=1)").is_err());
    }
}
