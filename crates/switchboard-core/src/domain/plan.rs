//! Plan - ルーティング規則
//!
//! A plan picks the queue a new task enters and the priority it carries.
//! Routes are tried in declared order; the default route always matches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attributes::AttributeGroup;
use super::ids::{PlanId, QueueId};
use crate::predicate::Predicate;

/// One routing rule: target queue, priority to stamp, optional selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub queue_id: QueueId,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Predicate>,
}

impl Route {
    pub fn new(queue_id: QueueId, priority: i64) -> Self {
        Self {
            queue_id,
            priority,
            predicate: None,
        }
    }

    pub fn when(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// A route without a predicate matches every task.
    pub fn matches(&self, task_attributes: &AttributeGroup) -> bool {
        self.predicate
            .as_ref()
            .is_none_or(|p| p.evaluate(task_attributes))
    }
}

/// Outcome of plan resolution, stamped onto the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub queue_id: QueueId,
    pub priority: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
    pub default_route: Route,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(
        id: PlanId,
        description: Option<String>,
        routes: Vec<Route>,
        default_route: Route,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            description,
            routes,
            default_route,
            created_at: now,
            updated_at: now,
        }
    }

    /// First matching route in declared order, else the default route.
    ///
    /// Queue existence is checked by the caller, which owns the queue table.
    pub fn resolve(&self, task_attributes: &AttributeGroup) -> Resolution {
        let route = self
            .routes
            .iter()
            .find(|route| route.matches(task_attributes))
            .unwrap_or(&self.default_route);
        Resolution {
            queue_id: route.queue_id.clone(),
            priority: route.priority,
        }
    }

    /// Every queue this plan can route to, default route last.
    pub fn queue_ids(&self) -> impl Iterator<Item = &QueueId> {
        self.routes
            .iter()
            .chain(std::iter::once(&self.default_route))
            .map(|route| &route.queue_id)
    }
}
