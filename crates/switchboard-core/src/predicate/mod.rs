//! Predicate - 属性に対するブール式
//!
//! Used for queue admission (over task attributes), plan route selection (over
//! task attributes) and capability matching (task requirements over agent
//! capabilities).
//!
//! # 設計原則
//! - parse once at definition time, evaluate many times
//! - malformed input fails at parse time with `PredicateError`, never at evaluation
//! - `Predicate` is immutable and `Send + Sync`; clones share one tree

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::AttributeGroup;

pub use self::ast::{CompareOp, Expr};

/// Parse failure with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed predicate `{expression}` at offset {offset}: {reason}")]
pub struct PredicateError {
    pub expression: String,
    pub offset: usize,
    pub reason: String,
}

impl PredicateError {
    pub fn new(expression: &str, offset: usize, reason: impl Into<String>) -> Self {
        Self {
            expression: expression.to_string(),
            offset,
            reason: reason.into(),
        }
    }
}

/// A parsed boolean expression together with its source text.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Predicate {
    source: String,
    expr: Arc<Expr>,
}

impl Predicate {
    pub fn parse(source: &str) -> Result<Self, PredicateError> {
        let tokens = lexer::Lexer::new(source).tokenize()?;
        let expr = parser::Parser::new(source, tokens).parse()?;
        Ok(Self {
            source: source.to_string(),
            expr: Arc::new(expr),
        })
    }

    /// Predicate that accepts everything.
    pub fn always() -> Self {
        Self {
            source: "true".to_string(),
            expr: Arc::new(Expr::Constant(true)),
        }
    }

    pub fn evaluate(&self, attributes: &AttributeGroup) -> bool {
        eval::evaluate(&self.expr, attributes)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.source).finish()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl TryFrom<String> for Predicate {
    type Error = PredicateError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Predicate::parse(&source)
    }
}

impl From<Predicate> for String {
    fn from(predicate: Predicate) -> Self {
        predicate.source
    }
}
