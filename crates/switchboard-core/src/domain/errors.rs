//! Errors - エラー型と分類
//!
//! Every failed operation leaves the router untouched: records are checked
//! before anything is mutated, so an `Err` means "nothing happened".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ids::{Id, IdMarker};
use crate::predicate::PredicateError;

/// ErrorKind は transport 層向けの分類
///
/// - NotFound: 404 相当
/// - Conflict: 409 相当（状態が操作を許さない）
/// - Validation: 400 相当（入力が不正）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    MalformedPredicate(#[from] PredicateError),

    #[error("plan {plan_id} routes to queue {queue_id}, which does not exist")]
    RouteResolution { plan_id: String, queue_id: String },

    #[error("illegal {entity} state transition: {from} -> {to}")]
    IllegalStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl RouterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RouterError::NotFound { .. } => ErrorKind::NotFound,
            RouterError::IllegalStateTransition { .. } | RouterError::Conflict(_) => {
                ErrorKind::Conflict
            }
            RouterError::MalformedPredicate(_)
            | RouterError::RouteResolution { .. }
            | RouterError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// The entity name comes from the id's marker type.
    pub fn not_found<T: IdMarker>(id: &Id<T>) -> Self {
        Self::NotFound {
            entity: Id::<T>::entity(),
            id: id.to_string(),
        }
    }

    pub fn illegal_transition(
        entity: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::IllegalStateTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

pub type RouterResult<T> = Result<T, RouterError>;
