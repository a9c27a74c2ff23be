//! Status - ステータスクエリ
//!
//! `RouterStatus` is a point-in-time snapshot taken under the router lock.
//! `audit` re-derives the structural invariants from the tables and reports
//! every violation it finds; tests and the CLI use it as a health check.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::state::RouterState;
use crate::domain::{AgentState, QueueId, TaskState};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCounts {
    pub offline: usize,
    pub ready: usize,
    pub busy: usize,
    pub unavailable: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub waiting: usize,
    pub assigned: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStatus {
    pub router: String,
    pub plans: usize,
    pub agents: AgentCounts,
    pub tasks: TaskCounts,
    /// Waiting tasks per queue.
    pub queues: BTreeMap<QueueId, usize>,
}

impl RouterStatus {
    pub fn capture(router: String, state: &RouterState) -> Self {
        let mut agents = AgentCounts::default();
        for agent in state.agents.values() {
            match agent.state() {
                AgentState::Offline => agents.offline += 1,
                AgentState::Ready => agents.ready += 1,
                AgentState::Busy => agents.busy += 1,
                AgentState::Unavailable => agents.unavailable += 1,
            }
        }

        let mut tasks = TaskCounts::default();
        for task in state.tasks.values() {
            match task.state() {
                TaskState::Waiting => tasks.waiting += 1,
                TaskState::Assigned => tasks.assigned += 1,
                TaskState::Completed => tasks.completed += 1,
            }
        }

        Self {
            router,
            plans: state.plans.len(),
            agents,
            tasks,
            queues: state
                .queues
                .iter()
                .map(|(id, queue)| (id.clone(), queue.size()))
                .collect(),
        }
    }
}

/// Every structural invariant violation, described in one line each.
pub fn audit(state: &RouterState) -> Vec<String> {
    let mut violations = Vec::new();

    for (task_id, task) in &state.tasks {
        let holders: Vec<_> = state
            .queues
            .values()
            .filter(|queue| queue.contains(task_id))
            .map(|queue| queue.id().clone())
            .collect();

        match task.state() {
            TaskState::Waiting => {
                if holders != [task.queue_id.clone()] {
                    violations.push(format!(
                        "waiting task {task_id} is held by queues {holders:?}, expected [{}]",
                        task.queue_id
                    ));
                }
                if task.agent_id().is_some() {
                    violations.push(format!("waiting task {task_id} references an agent"));
                }
            }
            TaskState::Assigned => {
                if !holders.is_empty() {
                    violations.push(format!("assigned task {task_id} is still queued"));
                }
                let holder = task.agent_id().and_then(|id| state.agents.get(id));
                match holder {
                    Some(agent)
                        if agent.state() == AgentState::Busy
                            && agent.task_id() == Some(task_id) => {}
                    _ => violations.push(format!(
                        "assigned task {task_id} is not held by a busy agent"
                    )),
                }
            }
            TaskState::Completed => {
                if !holders.is_empty() || task.agent_id().is_some() {
                    violations.push(format!("completed task {task_id} is still attached"));
                }
            }
        }
    }

    for (agent_id, agent) in &state.agents {
        let busy = agent.state() == AgentState::Busy;
        match (busy, agent.task_id()) {
            (true, Some(task_id)) => {
                let task = state.tasks.get(task_id);
                if !task.is_some_and(|t| {
                    t.state() == TaskState::Assigned && t.agent_id() == Some(agent_id)
                }) {
                    violations.push(format!(
                        "busy agent {agent_id} holds {task_id}, which is not assigned to it"
                    ));
                }
            }
            (false, None) => {}
            (true, None) => violations.push(format!("busy agent {agent_id} holds no task")),
            (false, Some(task_id)) => violations.push(format!(
                "{} agent {agent_id} still holds {task_id}",
                agent.state()
            )),
        }
    }

    for queue in state.queues.values() {
        for task_id in queue.task_ids() {
            if !state.tasks.contains_key(task_id) {
                violations.push(format!("queue {} holds unknown task {task_id}", queue.id()));
            }
        }
    }

    // Matching is event-driven; after every commit no eligible pair is left over.
    for agent in state.agents.values().filter(|a| a.is_available()) {
        for task in state.tasks.values().filter(|t| t.state().is_waiting()) {
            if task.accepts(&agent.capabilities) {
                violations.push(format!(
                    "ready agent {} could serve waiting task {}",
                    agent.id, task.id
                ));
            }
        }
    }

    violations
}
