//! Events - ドメインイベント
//!
//! Emitted by the router after a mutation is committed and the router lock is
//! released. Consumers (logging, callback publisher, tests) never observe an
//! event for a mutation that was rolled back.

use serde::{Deserialize, Serialize};

use super::ids::{AgentId, PlanId, QueueId, TaskId};
use super::state::{AgentState, TaskState};

/// DomainEvent はルーターで発生したイベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    QueueDefined {
        queue_id: QueueId,
    },
    QueueDeleted {
        queue_id: QueueId,
    },
    PlanDefined {
        plan_id: PlanId,
    },
    PlanDeleted {
        plan_id: PlanId,
    },
    AgentDefined {
        agent_id: AgentId,
    },
    AgentDeleted {
        agent_id: AgentId,
    },
    AgentStateChanged {
        agent_id: AgentId,
        from: AgentState,
        to: AgentState,
    },
    TaskCreated {
        task_id: TaskId,
        queue_id: QueueId,
        priority: i64,
    },
    /// A matching pass paired a task with an agent.
    TaskAssigned {
        task_id: TaskId,
        agent_id: AgentId,
        callback_url: Option<String>,
        agent_address: Option<String>,
    },
    TaskStateChanged {
        task_id: TaskId,
        from: TaskState,
        to: TaskState,
        callback_url: Option<String>,
    },
    TaskDeleted {
        task_id: TaskId,
    },
}

impl DomainEvent {
    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::QueueDefined { .. } => "queue_defined",
            DomainEvent::QueueDeleted { .. } => "queue_deleted",
            DomainEvent::PlanDefined { .. } => "plan_defined",
            DomainEvent::PlanDeleted { .. } => "plan_deleted",
            DomainEvent::AgentDefined { .. } => "agent_defined",
            DomainEvent::AgentDeleted { .. } => "agent_deleted",
            DomainEvent::AgentStateChanged { .. } => "agent_state_changed",
            DomainEvent::TaskCreated { .. } => "task_created",
            DomainEvent::TaskAssigned { .. } => "task_assigned",
            DomainEvent::TaskStateChanged { .. } => "task_state_changed",
            DomainEvent::TaskDeleted { .. } => "task_deleted",
        }
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            DomainEvent::TaskCreated { task_id, .. }
            | DomainEvent::TaskAssigned { task_id, .. }
            | DomainEvent::TaskStateChanged { task_id, .. }
            | DomainEvent::TaskDeleted { task_id } => Some(task_id),
            _ => None,
        }
    }

    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            DomainEvent::AgentDefined { agent_id }
            | DomainEvent::AgentDeleted { agent_id }
            | DomainEvent::AgentStateChanged { agent_id, .. }
            | DomainEvent::TaskAssigned { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let event = DomainEvent::AgentStateChanged {
            agent_id: AgentId::new("a1"),
            from: AgentState::Ready,
            to: AgentState::Busy,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "agent_state_changed");
        assert_eq!(json["agent_id"], "a1");
        assert_eq!(json["to"], "busy");
        assert_eq!(event.name(), "agent_state_changed");
    }

    #[test]
    fn assignment_names_both_sides() {
        let event = DomainEvent::TaskAssigned {
            task_id: TaskId::new("t1"),
            agent_id: AgentId::new("a1"),
            callback_url: None,
            agent_address: None,
        };
        assert_eq!(event.task_id(), Some(&TaskId::new("t1")));
        assert_eq!(event.agent_id(), Some(&AgentId::new("a1")));
    }
}
