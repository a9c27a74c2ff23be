//! CallbackDelivery port - 外部通知の抽象化
//!
//! Tells the outside world that a task changed hands or state. Delivery is
//! best-effort and asynchronous: failures are absorbed by the publisher loop
//! (retry, then the cancellation path for assignments) and never reach the
//! caller that caused the transition.

use serde::{Deserialize, Serialize};

use crate::domain::{AgentId, TaskId, TaskState};

/// What is delivered to a task's callback target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackNotification {
    pub url: String,
    pub task_id: TaskId,
    pub state: TaskState,
    pub agent_id: Option<AgentId>,
    pub agent_address: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    /// Worth another attempt (timeouts, 5xx, connection refused).
    #[error("callback to {url} failed: {reason}")]
    Transient { url: String, reason: String },

    /// Retrying will not help (malformed target, rejected by receiver).
    #[error("callback to {url} rejected: {reason}")]
    Rejected { url: String, reason: String },
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transient { .. })
    }
}

#[async_trait::async_trait]
pub trait CallbackDelivery: Send + Sync {
    async fn deliver(&self, notification: &CallbackNotification) -> Result<(), DeliveryError>;
}
