//! MatchingScheduler - エージェントとタスクの割り当て
//!
//! A matching pass runs under the router lock, so passes are serialized and
//! every pass sees a consistent snapshot of queues, agents and tasks.
//!
//! # 設計原則
//! - purely event-triggered: agent -> ready, task -> waiting (creation or
//!   cancellation), task -> completed (through the released agent)
//! - after every committed operation no ready agent is eligible for any
//!   waiting task, so each trigger only has to look at the pair it introduces
//! - the assign step validates both records before touching either one
//!
//! # 選択規則
//! - tasks: highest stamped priority, then oldest creation, then creation sequence
//! - agents: lowest ready sequence (ready longest), then id

use chrono::{DateTime, Utc};
use tracing::debug;

use super::state::RouterState;
use crate::domain::{
    AgentId, AgentState, DomainEvent, QueueId, RouterError, RouterResult, ServiceOrder, TaskId,
    TaskState,
};

/// One committed pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub queue_id: QueueId,
    pub callback_url: Option<String>,
    pub agent_address: Option<String>,
}

impl Assignment {
    pub fn events(&self) -> [DomainEvent; 2] {
        [
            DomainEvent::AgentStateChanged {
                agent_id: self.agent_id.clone(),
                from: AgentState::Ready,
                to: AgentState::Busy,
            },
            DomainEvent::TaskAssigned {
                task_id: self.task_id.clone(),
                agent_id: self.agent_id.clone(),
                callback_url: self.callback_url.clone(),
                agent_address: self.agent_address.clone(),
            },
        ]
    }
}

pub struct MatchingScheduler;

impl MatchingScheduler {
    /// An agent became ready: give it the best waiting task it can serve, from any queue.
    pub fn on_agent_ready(
        state: &mut RouterState,
        agent_id: &AgentId,
        now: DateTime<Utc>,
    ) -> RouterResult<Option<Assignment>> {
        let agent = state.agent(agent_id)?;
        if !agent.is_available() {
            return Ok(None);
        }

        let mut best: Option<(ServiceOrder, TaskId)> = None;
        for queue in state.queues.values() {
            let candidate = queue.peek_highest_priority(|task_id| {
                state
                    .tasks
                    .get(task_id)
                    .is_some_and(|task| task.accepts(&agent.capabilities))
            });
            if let Some((order, task_id)) = candidate
                && best.as_ref().is_none_or(|(current, _)| order < *current)
            {
                best = Some((order, task_id.clone()));
            }
        }

        match best {
            Some((_, task_id)) => Self::assign(state, &task_id, agent_id, now).map(Some),
            None => {
                debug!(%agent_id, "no eligible waiting task");
                Ok(None)
            }
        }
    }

    /// A task became waiting: hand it to the eligible agent that has been ready longest.
    pub fn on_task_waiting(
        state: &mut RouterState,
        task_id: &TaskId,
        now: DateTime<Utc>,
    ) -> RouterResult<Option<Assignment>> {
        let task = state.task(task_id)?;
        if task.state() != TaskState::Waiting {
            return Ok(None);
        }

        let agent_id = state
            .agents
            .values()
            .filter(|agent| agent.is_available() && task.accepts(&agent.capabilities))
            .min_by(|a, b| a.ready_seq().cmp(&b.ready_seq()).then_with(|| a.id.cmp(&b.id)))
            .map(|agent| agent.id.clone());

        match agent_id {
            Some(agent_id) => Self::assign(state, task_id, &agent_id, now).map(Some),
            None => {
                debug!(%task_id, "no eligible ready agent");
                Ok(None)
            }
        }
    }

    /// The atomic step: dequeue, task -> assigned, agent -> busy.
    ///
    /// Preconditions are checked first so a failure leaves every table untouched.
    pub fn assign(
        state: &mut RouterState,
        task_id: &TaskId,
        agent_id: &AgentId,
        now: DateTime<Utc>,
    ) -> RouterResult<Assignment> {
        let task = state.task(task_id)?;
        let agent = state.agent(agent_id)?;
        if task.state() != TaskState::Waiting {
            return Err(RouterError::illegal_transition(
                "task",
                task.state(),
                TaskState::Assigned,
            ));
        }
        if !agent.is_available() {
            return Err(RouterError::illegal_transition(
                "agent",
                agent.state(),
                AgentState::Busy,
            ));
        }
        if !task.accepts(&agent.capabilities) {
            return Err(RouterError::conflict(format!(
                "agent {agent_id} does not satisfy the requirements of task {task_id}"
            )));
        }
        let queue_id = task.queue_id.clone();
        if !state.queue(&queue_id)?.contains(task_id) {
            return Err(RouterError::conflict(format!(
                "task {task_id} is not waiting in queue {queue_id}"
            )));
        }

        state.queue_mut(&queue_id)?.remove(task_id);
        let task = state.task_mut(task_id)?;
        task.assign(agent_id.clone(), now)?;
        let callback_url = task.callback_url.clone();
        let agent = state.agent_mut(agent_id)?;
        agent.assign(task_id.clone(), now)?;
        let agent_address = agent.address.clone();

        debug!(%task_id, %agent_id, %queue_id, "matching pass paired task with agent");
        Ok(Assignment {
            task_id: task_id.clone(),
            agent_id: agent_id.clone(),
            queue_id,
            callback_url,
            agent_address,
        })
    }
}
