//! Expression tree produced by the parser.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    Out,
}

impl CompareOp {
    /// `=in=` / `=out=` take a parenthesised value list.
    pub fn takes_list(self) -> bool {
        matches!(self, CompareOp::In | CompareOp::Out)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => "=gt=",
            CompareOp::Ge => "=ge=",
            CompareOp::Lt => "=lt=",
            CompareOp::Le => "=le=",
            CompareOp::In => "=in=",
            CompareOp::Out => "=out=",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
}

/// Left-hand side of a comparison: an attribute reference or a literal
/// (`1==1` compares two literals).
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Attribute(String),
    Literal(Literal),
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Single(Literal),
    List(Vec<Literal>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left: Operand,
    pub op: CompareOp,
    pub right: Argument,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(bool),
    Compare(Comparison),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}
