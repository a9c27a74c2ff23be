//! Task record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attributes::AttributeGroup;
use super::errors::{RouterError, RouterResult};
use super::ids::{AgentId, PlanId, QueueId, TaskId};
use super::queue::ServiceOrder;
use super::state::TaskState;
use crate::predicate::Predicate;

/// Unit of work waiting for, or held by, an agent.
///
/// Design:
/// - This is the single source of truth for task state. Queues hold TaskIds only.
/// - `queue_id` and `order` are stamped at creation and never change; a
///   cancelled task re-enters the same queue at its original position.
/// - `agent_id` is `Some` exactly when `state == Assigned`.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub queue_id: QueueId,
    pub plan_id: Option<PlanId>,
    pub requirements: Option<Predicate>,
    pub attributes: AttributeGroup,
    pub user_context: AttributeGroup,
    pub callback_url: Option<String>,
    order: ServiceOrder,
    state: TaskState,
    agent_id: Option<AgentId>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a task is created with, before routing.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub requirements: Option<Predicate>,
    pub attributes: AttributeGroup,
    pub user_context: AttributeGroup,
    pub callback_url: Option<String>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        draft: TaskDraft,
        queue_id: QueueId,
        plan_id: Option<PlanId>,
        order: ServiceOrder,
    ) -> Self {
        Self {
            id,
            queue_id,
            plan_id,
            requirements: draft.requirements,
            attributes: draft.attributes,
            user_context: draft.user_context,
            callback_url: draft.callback_url,
            order,
            state: TaskState::Waiting,
            agent_id: None,
            updated_at: order.created_at,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn agent_id(&self) -> Option<&AgentId> {
        self.agent_id.as_ref()
    }

    pub fn order(&self) -> ServiceOrder {
        self.order
    }

    pub fn priority(&self) -> i64 {
        self.order.priority
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.order.created_at
    }

    /// Are the requirements satisfied by these capabilities?
    /// A task without requirements accepts any agent.
    pub fn accepts(&self, capabilities: &AttributeGroup) -> bool {
        self.requirements
            .as_ref()
            .is_none_or(|requirements| requirements.evaluate(capabilities))
    }

    /// waiting -> assigned.
    pub fn assign(&mut self, agent_id: AgentId, now: DateTime<Utc>) -> RouterResult<()> {
        if self.state != TaskState::Waiting {
            return Err(RouterError::illegal_transition(
                "task",
                self.state,
                TaskState::Assigned,
            ));
        }
        self.state = TaskState::Assigned;
        self.agent_id = Some(agent_id);
        self.updated_at = now;
        Ok(())
    }

    /// assigned -> completed. Returns the agent to release.
    pub fn complete(&mut self, now: DateTime<Utc>) -> RouterResult<AgentId> {
        self.leave_assigned(TaskState::Completed, now)
    }

    /// assigned -> waiting. Returns the agent to suspend.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> RouterResult<AgentId> {
        self.leave_assigned(TaskState::Waiting, now)
    }

    fn leave_assigned(&mut self, to: TaskState, now: DateTime<Utc>) -> RouterResult<AgentId> {
        if !self.state.can_request(to) {
            return Err(RouterError::illegal_transition("task", self.state, to));
        }
        let agent_id = self
            .agent_id
            .take()
            .ok_or_else(|| RouterError::illegal_transition("task", self.state, to))?;
        self.state = to;
        self.updated_at = now;
        Ok(agent_id)
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            queue_id: self.queue_id.clone(),
            plan_id: self.plan_id.clone(),
            requirements: self.requirements.as_ref().map(|p| p.source().to_string()),
            attributes: self.attributes.clone(),
            user_context: self.user_context.clone(),
            callback_url: self.callback_url.clone(),
            priority: self.priority(),
            state: self.state,
            agent_id: self.agent_id.clone(),
            created_at: self.created_at(),
        }
    }
}

/// Serializable view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub queue_id: QueueId,
    pub plan_id: Option<PlanId>,
    pub requirements: Option<String>,
    pub attributes: AttributeGroup,
    pub user_context: AttributeGroup,
    pub callback_url: Option<String>,
    pub priority: i64,
    pub state: TaskState,
    pub agent_id: Option<AgentId>,
    pub created_at: DateTime<Utc>,
}
