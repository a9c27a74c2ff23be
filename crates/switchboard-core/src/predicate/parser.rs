//! Recursive-descent parser.
//!
//! ```text
//! expr       := and_expr ( ("," | "||") and_expr )*
//! and_expr   := unary ( (";" | "&&") unary )*
//! unary      := "!" unary | primary
//! primary    := "(" expr ")" | comparison | "true" | "false"
//! comparison := operand op argument
//! operand    := IDENT | STRING | NUMBER | "true" | "false"
//! argument   := literal | "(" literal ( "," literal )* ")"
//! literal    := IDENT | STRING | NUMBER | "true" | "false"
//! ```
//!
//! A bare identifier on the right-hand side is a string literal (`language==en`).

use super::PredicateError;
use super::ast::{Argument, Comparison, Expr, Literal, Operand};
use super::lexer::{Token, TokenKind};

/// Maximum combined depth of `(` groups and `!` prefixes.
pub const MAX_DEPTH: usize = 128;

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub fn parse(mut self) -> Result<Expr, PredicateError> {
        if self.peek().kind == TokenKind::Eof {
            return Err(self.error_here("empty expression"));
        }
        let expr = self.parse_or()?;
        if self.peek().kind != TokenKind::Eof {
            return Err(self.error_here("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn peek(&self) -> &Token {
        // tokenize() always ends with Eof and we never advance past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, reason: impl Into<String>) -> PredicateError {
        PredicateError::new(self.source, self.peek().offset, reason)
    }

    fn descend(&mut self) -> Result<(), PredicateError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error_here("expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, PredicateError> {
        let mut items = vec![self.parse_and()?];
        while matches!(self.peek().kind, TokenKind::Comma | TokenKind::OrOr) {
            self.advance();
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Or(items)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, PredicateError> {
        let mut items = vec![self.parse_unary()?];
        while matches!(self.peek().kind, TokenKind::Semicolon | TokenKind::AndAnd) {
            self.advance();
            items.push(self.parse_unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::And(items)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, PredicateError> {
        if self.peek().kind == TokenKind::Bang {
            self.descend()?;
            self.advance();
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, PredicateError> {
        match self.peek().kind.clone() {
            TokenKind::LParen => {
                self.descend()?;
                self.advance();
                let inner = self.parse_or()?;
                if self.peek().kind != TokenKind::RParen {
                    return Err(self.error_here("expected `)`"));
                }
                self.advance();
                self.depth -= 1;
                Ok(inner)
            }
            TokenKind::True | TokenKind::False if !matches!(self.peek_at(1), TokenKind::Op(_)) => {
                let value = self.advance().kind == TokenKind::True;
                Ok(Expr::Constant(value))
            }
            TokenKind::Ident(_)
            | TokenKind::Str(_)
            | TokenKind::Number(_)
            | TokenKind::True
            | TokenKind::False => self.parse_comparison(),
            TokenKind::Eof => Err(self.error_here("unexpected end of expression")),
            _ => Err(self.error_here("expected a comparison")),
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, PredicateError> {
        let left = match self.advance().kind {
            TokenKind::Ident(name) => Operand::Attribute(name),
            other => match literal_of(other) {
                Some(lit) => Operand::Literal(lit),
                None => return Err(self.error_here("expected an attribute name")),
            },
        };

        let op = match self.peek().kind {
            TokenKind::Op(op) => op,
            _ => return Err(self.error_here("expected a comparison operator")),
        };
        self.advance();

        let right = if op.takes_list() && self.peek().kind == TokenKind::LParen {
            self.advance();
            Argument::List(self.parse_literal_list()?)
        } else {
            Argument::Single(self.parse_literal()?)
        };

        Ok(Expr::Compare(Comparison { left, op, right }))
    }

    fn parse_literal_list(&mut self) -> Result<Vec<Literal>, PredicateError> {
        let mut items = vec![self.parse_literal()?];
        loop {
            match self.peek().kind {
                TokenKind::Comma => {
                    self.advance();
                    items.push(self.parse_literal()?);
                }
                TokenKind::RParen => {
                    self.advance();
                    return Ok(items);
                }
                _ => return Err(self.error_here("expected `,` or `)` in value list")),
            }
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, PredicateError> {
        match literal_of(self.peek().kind.clone()) {
            Some(lit) => {
                self.advance();
                Ok(lit)
            }
            None => Err(self.error_here("expected a value")),
        }
    }
}

fn literal_of(kind: TokenKind) -> Option<Literal> {
    match kind {
        TokenKind::Ident(s) | TokenKind::Str(s) => Some(Literal::String(s)),
        TokenKind::Number(n) => Some(Literal::Number(n)),
        TokenKind::True => Some(Literal::Boolean(true)),
        TokenKind::False => Some(Literal::Boolean(false)),
        _ => None,
    }
}
