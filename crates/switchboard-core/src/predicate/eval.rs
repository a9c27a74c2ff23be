//! Evaluation of a parsed expression against an `AttributeGroup`.
//!
//! Pure function over `&Expr` and `&AttributeGroup`; no shared state, so one
//! parsed tree may be evaluated from many threads at once.
//!
//! Semantics:
//! - a comparison naming an attribute the group lacks is false (`!=` and `=out=` included)
//! - `==` against a list attribute is membership, `=in=` is intersection
//! - numeric strings compare equal to numbers (`"3" == 3`)
//! - ordering operators compare numbers with numbers or numeric strings, and strings with strings

use std::cmp::Ordering;

use super::ast::{Argument, CompareOp, Comparison, Expr, Literal, Operand};
use crate::domain::{AttributeGroup, AttributeValue};

pub fn evaluate(expr: &Expr, attributes: &AttributeGroup) -> bool {
    match expr {
        Expr::Constant(value) => *value,
        Expr::Compare(cmp) => compare(cmp, attributes),
        Expr::Not(inner) => !evaluate(inner, attributes),
        Expr::And(items) => items.iter().all(|item| evaluate(item, attributes)),
        Expr::Or(items) => items.iter().any(|item| evaluate(item, attributes)),
    }
}

/// Borrowed view over either side of a comparison.
#[derive(Debug, Clone, Copy)]
enum Scalar<'a> {
    Str(&'a str),
    Num(f64),
    Bool(bool),
}

enum Subject<'a> {
    Scalar(Scalar<'a>),
    Strings(&'a [String]),
    Numbers(&'a [f64]),
}

impl<'a> Subject<'a> {
    fn any(&self, mut f: impl FnMut(Scalar<'a>) -> bool) -> bool {
        match self {
            Subject::Scalar(s) => f(*s),
            Subject::Strings(items) => items.iter().any(|s| f(Scalar::Str(s))),
            Subject::Numbers(items) => items.iter().any(|n| f(Scalar::Num(*n))),
        }
    }
}

fn scalar_of(lit: &Literal) -> Scalar<'_> {
    match lit {
        Literal::String(s) => Scalar::Str(s),
        Literal::Number(n) => Scalar::Num(*n),
        Literal::Boolean(b) => Scalar::Bool(*b),
    }
}

fn subject_of<'a>(operand: &'a Operand, attributes: &'a AttributeGroup) -> Option<Subject<'a>> {
    match operand {
        Operand::Literal(lit) => Some(Subject::Scalar(scalar_of(lit))),
        Operand::Attribute(name) => Some(match attributes.get(name)? {
            AttributeValue::Boolean(b) => Subject::Scalar(Scalar::Bool(*b)),
            AttributeValue::Number(n) => Subject::Scalar(Scalar::Num(*n)),
            AttributeValue::String(s) => Subject::Scalar(Scalar::Str(s)),
            AttributeValue::StringList(items) => Subject::Strings(items),
            AttributeValue::NumberList(items) => Subject::Numbers(items),
        }),
    }
}

fn compare(cmp: &Comparison, attributes: &AttributeGroup) -> bool {
    let Some(subject) = subject_of(&cmp.left, attributes) else {
        return false;
    };

    let values: Vec<Scalar<'_>> = match &cmp.right {
        Argument::Single(lit) => vec![scalar_of(lit)],
        Argument::List(items) => items.iter().map(scalar_of).collect(),
    };

    let is_member = || subject.any(|s| values.iter().any(|v| scalar_eq(s, *v)));

    match cmp.op {
        CompareOp::Eq | CompareOp::In => is_member(),
        CompareOp::Ne | CompareOp::Out => !is_member(),
        CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le => {
            let Subject::Scalar(left) = &subject else {
                return false;
            };
            let Some(ordering) = scalar_cmp(*left, values[0]) else {
                return false;
            };
            match cmp.op {
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Ge => ordering != Ordering::Less,
                CompareOp::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }
        }
    }
}

fn scalar_eq(left: Scalar<'_>, right: Scalar<'_>) -> bool {
    match (left, right) {
        (Scalar::Str(a), Scalar::Str(b)) => a == b,
        (Scalar::Num(a), Scalar::Num(b)) => a == b,
        (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
        (Scalar::Str(s), Scalar::Num(n)) | (Scalar::Num(n), Scalar::Str(s)) => {
            s.trim().parse::<f64>().is_ok_and(|parsed| parsed == n)
        }
        _ => false,
    }
}

fn scalar_cmp(left: Scalar<'_>, right: Scalar<'_>) -> Option<Ordering> {
    match (left, right) {
        (Scalar::Num(a), Scalar::Num(b)) => a.partial_cmp(&b),
        (Scalar::Str(a), Scalar::Str(b)) => Some(a.cmp(b)),
        (Scalar::Str(s), Scalar::Num(n)) => s.trim().parse::<f64>().ok()?.partial_cmp(&n),
        (Scalar::Num(n), Scalar::Str(s)) => n.partial_cmp(&s.trim().parse::<f64>().ok()?),
        _ => None,
    }
}
