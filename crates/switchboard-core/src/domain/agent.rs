//! Agent record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attributes::AttributeGroup;
use super::errors::{RouterError, RouterResult};
use super::ids::{AgentId, TaskId};
use super::state::AgentState;

/// Worker that handles one task at a time.
///
/// Design:
/// - `task_id` is a back-reference resolved through the router's task table,
///   never an owning pointer. It is `Some` exactly when `state == Busy`.
/// - `ready_seq` orders ready agents (lowest = ready longest). It is stamped on
///   every transition into `ready` from another state.
/// - Caller transitions go through `request_state`; `assign`, `release` and
///   `suspend` are the scheduler's.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub id: AgentId,
    pub address: Option<String>,
    pub capabilities: AttributeGroup,
    state: AgentState,
    task_id: Option<TaskId>,
    ready_seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(
        id: AgentId,
        address: Option<String>,
        capabilities: AttributeGroup,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            address,
            capabilities,
            state: AgentState::Offline,
            task_id: None,
            ready_seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        self.task_id.as_ref()
    }

    pub fn ready_seq(&self) -> u64 {
        self.ready_seq
    }

    pub fn is_available(&self) -> bool {
        self.state.is_available()
    }

    /// Caller-requested transition. Returns the previous state.
    ///
    /// `ready -> ready` keeps the original stamp so a re-announce does not
    /// push the agent behind agents that became ready later.
    pub fn request_state(
        &mut self,
        to: AgentState,
        ready_seq: u64,
        now: DateTime<Utc>,
    ) -> RouterResult<AgentState> {
        if !self.state.can_request(to) {
            return Err(RouterError::illegal_transition("agent", self.state, to));
        }
        let previous = self.state;
        if to == AgentState::Ready && previous != AgentState::Ready {
            self.ready_seq = ready_seq;
        }
        self.state = to;
        self.updated_at = now;
        Ok(previous)
    }

    /// ready -> busy, linked to `task_id`.
    pub fn assign(&mut self, task_id: TaskId, now: DateTime<Utc>) -> RouterResult<()> {
        if self.state != AgentState::Ready {
            return Err(RouterError::illegal_transition(
                "agent",
                self.state,
                AgentState::Busy,
            ));
        }
        self.state = AgentState::Busy;
        self.task_id = Some(task_id);
        self.updated_at = now;
        Ok(())
    }

    /// busy -> ready after the task completed.
    pub fn release(&mut self, ready_seq: u64, now: DateTime<Utc>) -> RouterResult<TaskId> {
        let task_id = self.unlink(AgentState::Ready)?;
        self.state = AgentState::Ready;
        self.ready_seq = ready_seq;
        self.updated_at = now;
        Ok(task_id)
    }

    /// busy -> unavailable after the task was cancelled.
    pub fn suspend(&mut self, now: DateTime<Utc>) -> RouterResult<TaskId> {
        let task_id = self.unlink(AgentState::Unavailable)?;
        self.state = AgentState::Unavailable;
        self.updated_at = now;
        Ok(task_id)
    }

    fn unlink(&mut self, to: AgentState) -> RouterResult<TaskId> {
        match (self.state, self.task_id.take()) {
            (AgentState::Busy, Some(task_id)) => Ok(task_id),
            (state, previous) => {
                self.task_id = previous;
                Err(RouterError::illegal_transition("agent", state, to))
            }
        }
    }

    pub fn view(&self) -> AgentView {
        AgentView {
            id: self.id.clone(),
            address: self.address.clone(),
            capabilities: self.capabilities.clone(),
            state: self.state,
            task_id: self.task_id.clone(),
        }
    }
}

/// Serializable view of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: AgentId,
    pub address: Option<String>,
    pub capabilities: AttributeGroup,
    pub state: AgentState,
    pub task_id: Option<TaskId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> AgentRecord {
        AgentRecord::new(
            AgentId::new("a1"),
            Some("sip:a1@example.com".into()),
            AttributeGroup::new().with("language", "en"),
            Utc::now(),
        )
    }

    #[test]
    fn starts_offline_without_task() {
        let agent = agent();
        assert_eq!(agent.state(), AgentState::Offline);
        assert!(agent.task_id().is_none());
    }

    #[test]
    fn busy_only_through_assign() {
        let mut agent = agent();
        let err = agent
            .request_state(AgentState::Busy, 1, Utc::now())
            .unwrap_err();
        assert!(matches!(err, RouterError::IllegalStateTransition { .. }));

        // offline agents are not assignable either
        assert!(agent.assign(TaskId::new("t1"), Utc::now()).is_err());

        agent.request_state(AgentState::Ready, 1, Utc::now()).unwrap();
        agent.assign(TaskId::new("t1"), Utc::now()).unwrap();
        assert_eq!(agent.state(), AgentState::Busy);
        assert_eq!(agent.task_id(), Some(&TaskId::new("t1")));
    }

    #[test]
    fn release_restamps_and_suspend_does_not() {
        let mut agent = agent();
        agent.request_state(AgentState::Ready, 1, Utc::now()).unwrap();
        agent.assign(TaskId::new("t1"), Utc::now()).unwrap();

        assert_eq!(agent.release(7, Utc::now()).unwrap(), TaskId::new("t1"));
        assert_eq!(agent.state(), AgentState::Ready);
        assert_eq!(agent.ready_seq(), 7);
        assert!(agent.task_id().is_none());

        agent.assign(TaskId::new("t2"), Utc::now()).unwrap();
        assert_eq!(agent.suspend(Utc::now()).unwrap(), TaskId::new("t2"));
        assert_eq!(agent.state(), AgentState::Unavailable);
        assert!(agent.task_id().is_none());
        assert_eq!(agent.ready_seq(), 7);
    }

    #[test]
    fn release_of_idle_agent_is_rejected_without_side_effects() {
        let mut agent = agent();
        agent.request_state(AgentState::Ready, 3, Utc::now()).unwrap();
        assert!(agent.release(4, Utc::now()).is_err());
        assert!(agent.suspend(Utc::now()).is_err());
        assert_eq!(agent.state(), AgentState::Ready);
        assert_eq!(agent.ready_seq(), 3);
    }

    #[test]
    fn ready_again_keeps_original_stamp() {
        let mut agent = agent();
        agent.request_state(AgentState::Ready, 2, Utc::now()).unwrap();
        let previous = agent
            .request_state(AgentState::Ready, 9, Utc::now())
            .unwrap();
        assert_eq!(previous, AgentState::Ready);
        assert_eq!(agent.ready_seq(), 2);
    }

    #[test]
    fn busy_agent_rejects_caller_transitions() {
        let mut agent = agent();
        agent.request_state(AgentState::Ready, 1, Utc::now()).unwrap();
        agent.assign(TaskId::new("t1"), Utc::now()).unwrap();
        for to in [AgentState::Ready, AgentState::Offline, AgentState::Unavailable] {
            assert!(agent.request_state(to, 2, Utc::now()).is_err());
        }
        assert_eq!(agent.state(), AgentState::Busy);
    }
}
