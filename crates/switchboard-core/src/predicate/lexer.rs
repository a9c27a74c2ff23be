//! Lexer for predicate expressions.

use std::iter::Peekable;
use std::str::CharIndices;

use super::PredicateError;
use super::ast::CompareOp;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    /// `,`: logical OR at expression level, separator inside `=in=` lists.
    Comma,
    /// `;`: logical AND.
    Semicolon,
    AndAnd,
    OrOr,
    Bang,
    Op(CompareOp),
    Ident(String),
    Str(String),
    Number(f64),
    True,
    False,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub offset: usize,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    /// Tokenize the entire source. The last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, PredicateError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    fn error(&self, offset: usize, reason: impl Into<String>) -> PredicateError {
        PredicateError::new(self.source, offset, reason)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn next_token(&mut self) -> Result<Token, PredicateError> {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.chars.next();
        }

        let Some((offset, c)) = self.chars.next() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset: self.source.len(),
            });
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '&' => {
                if self.peek_char() != Some('&') {
                    return Err(self.error(offset, "expected `&&`"));
                }
                self.chars.next();
                TokenKind::AndAnd
            }
            '|' => {
                if self.peek_char() != Some('|') {
                    return Err(self.error(offset, "expected `||`"));
                }
                self.chars.next();
                TokenKind::OrOr
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.chars.next();
                    TokenKind::Op(CompareOp::Ne)
                } else {
                    TokenKind::Bang
                }
            }
            '<' | '>' => {
                let inclusive = self.peek_char() == Some('=');
                if inclusive {
                    self.chars.next();
                }
                TokenKind::Op(match (c, inclusive) {
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    (_, false) => CompareOp::Gt,
                    (_, true) => CompareOp::Ge,
                })
            }
            '=' => self.lex_equals_operator(offset)?,
            '"' | '\'' => self.lex_string(offset, c)?,
            c if c.is_ascii_digit() => self.lex_number(offset)?,
            '-' if self.peek_char().is_some_and(|n| n.is_ascii_digit()) => {
                self.lex_number(offset)?
            }
            c if c.is_alphabetic() || c == '_' => {
                let word = self.lex_word(offset, c);
                match word {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    _ => TokenKind::Ident(word.to_string()),
                }
            }
            other => return Err(self.error(offset, format!("unexpected character `{other}`"))),
        };

        Ok(Token { kind, offset })
    }

    /// `==` or one of the RSQL named operators `=gt=`, `=ge=`, `=lt=`, `=le=`, `=in=`, `=out=`.
    fn lex_equals_operator(&mut self, offset: usize) -> Result<TokenKind, PredicateError> {
        if self.peek_char() == Some('=') {
            self.chars.next();
            return Ok(TokenKind::Op(CompareOp::Eq));
        }

        let mut name = String::new();
        while let Some(c) = self.peek_char() {
            if !c.is_ascii_alphabetic() {
                break;
            }
            name.push(c);
            self.chars.next();
        }
        if self.peek_char() != Some('=') {
            return Err(self.error(offset, "unterminated operator, expected `==` or `=name=`"));
        }
        self.chars.next();

        let op = match name.as_str() {
            "gt" => CompareOp::Gt,
            "ge" => CompareOp::Ge,
            "lt" => CompareOp::Lt,
            "le" => CompareOp::Le,
            "in" => CompareOp::In,
            "out" => CompareOp::Out,
            _ => return Err(self.error(offset, format!("unknown operator `={name}=`"))),
        };
        Ok(TokenKind::Op(op))
    }

    fn lex_string(&mut self, offset: usize, quote: char) -> Result<TokenKind, PredicateError> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                None => return Err(self.error(offset, "unterminated string literal")),
                Some((_, c)) if c == quote => return Ok(TokenKind::Str(value)),
                Some((pos, '\\')) => match self.chars.next() {
                    Some((_, escaped)) => value.push(escaped),
                    None => return Err(self.error(pos, "dangling escape")),
                },
                Some((_, c)) => value.push(c),
            }
        }
    }

    fn lex_number(&mut self, offset: usize) -> Result<TokenKind, PredicateError> {
        let mut end = offset + 1;
        while let Some(&(pos, c)) = self.chars.peek() {
            if !(c.is_ascii_digit() || c == '.') {
                break;
            }
            end = pos + c.len_utf8();
            self.chars.next();
        }
        if self
            .peek_char()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
        {
            return Err(self.error(offset, "invalid numeric literal"));
        }

        let text = &self.source[offset..end];
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(offset, format!("invalid numeric literal `{text}`")))
    }

    fn lex_word(&mut self, offset: usize, first: char) -> &'a str {
        let mut end = offset + first.len_utf8();
        while let Some(&(pos, c)) = self.chars.peek() {
            if !(c.is_alphanumeric() || matches!(c, '_' | '.' | '-')) {
                break;
            }
            end = pos + c.len_utf8();
            self.chars.next();
        }
        let source = self.source;
        &source[offset..end]
    }
}
