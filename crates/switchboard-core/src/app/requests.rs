//! Requests - ルーター操作の入力
//!
//! What a transport layer (or a scenario file) hands to `Router`. Predicates
//! travel as source text and are parsed by the router, so a malformed
//! expression surfaces as `RouterError::MalformedPredicate`.
//!
//! `*Spec` types are full definitions (create / replace). `*Update` types are
//! partial: `None` keeps the current value.

use serde::{Deserialize, Serialize};

use crate::domain::{AgentState, AttributeGroup, PlanId, QueueId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSpec {
    #[serde(default)]
    pub description: Option<String>,
    /// Admission predicate over task attributes. Required.
    #[serde(default)]
    pub predicate: Option<String>,
}

impl QueueSpec {
    pub fn new(predicate: impl Into<String>) -> Self {
        Self {
            description: None,
            predicate: Some(predicate.into()),
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueUpdate {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub predicate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub queue_id: QueueId,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub predicate: Option<String>,
}

impl RouteSpec {
    pub fn new(queue_id: impl Into<QueueId>, priority: i64) -> Self {
        Self {
            queue_id: queue_id.into(),
            priority,
            predicate: None,
        }
    }

    pub fn when(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSpec {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    /// Required.
    #[serde(default)]
    pub default_route: Option<RouteSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanUpdate {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub routes: Option<Vec<RouteSpec>>,
    #[serde(default)]
    pub default_route: Option<RouteSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub capabilities: AttributeGroup,
    /// Initial state; `offline` when absent.
    #[serde(default)]
    pub state: Option<AgentState>,
}

impl AgentSpec {
    pub fn new(capabilities: AttributeGroup) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub capabilities: Option<AttributeGroup>,
    #[serde(default)]
    pub state: Option<AgentState>,
}

/// Exactly one of `queue_id` / `plan_id` must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(default)]
    pub queue_id: Option<QueueId>,
    #[serde(default)]
    pub plan_id: Option<PlanId>,
    /// Predicate over agent capabilities; absent means any agent.
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub attributes: AttributeGroup,
    #[serde(default)]
    pub user_context: AttributeGroup,
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl TaskSpec {
    pub fn to_queue(queue_id: impl Into<QueueId>) -> Self {
        Self {
            queue_id: Some(queue_id.into()),
            ..Self::default()
        }
    }

    pub fn to_plan(plan_id: impl Into<PlanId>) -> Self {
        Self {
            plan_id: Some(plan_id.into()),
            ..Self::default()
        }
    }

    pub fn requiring(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = Some(requirements.into());
        self
    }

    pub fn with_attributes(mut self, attributes: AttributeGroup) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }
}
