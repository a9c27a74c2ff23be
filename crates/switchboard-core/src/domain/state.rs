//! State - エージェントとタスクの状態
//!
//! Transition tables live here so that records and the scheduler agree on a
//! single definition of "legal". Two kinds of transitions exist:
//! - requested: issued by an API caller (`set_agent_state`, `set_task_state`)
//! - system: issued by the scheduler (assignment, release, cancellation)

use serde::{Deserialize, Serialize};
use std::fmt;

/// AgentState はエージェントの状態
///
/// # 状態遷移
/// - offline -> ready -> busy -> ready -> ...
/// - busy -> unavailable (assigned task cancelled) -> ready
/// - ready -> offline
///
/// There is no terminal state; agents cycle until deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Offline,
    Ready,
    Busy,
    Unavailable,
}

impl AgentState {
    /// May an API caller move an agent from `self` to `to`?
    ///
    /// `busy` is never reachable this way, and a busy agent cannot be moved by
    /// a caller at all: only completion or cancellation of its task releases it.
    pub fn can_request(self, to: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, to),
            (Offline | Ready | Unavailable, Ready) | (Ready | Offline, Offline)
        )
    }

    /// Only ready agents take part in matching.
    pub fn is_available(self) -> bool {
        matches!(self, AgentState::Ready)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Offline => "offline",
            AgentState::Ready => "ready",
            AgentState::Busy => "busy",
            AgentState::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// TaskState はタスクの状態
///
/// # 状態遷移
/// - waiting -> assigned -> completed (terminal)
/// - assigned -> waiting (cancellation; the task re-enters its queue)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Waiting,
    Assigned,
    Completed,
}

impl TaskState {
    /// May an API caller move a task from `self` to `to`?
    ///
    /// Completion and cancellation are only legal from `assigned`; `assigned`
    /// itself is scheduler-only.
    pub fn can_request(self, to: TaskState) -> bool {
        matches!(
            (self, to),
            (TaskState::Assigned, TaskState::Completed) | (TaskState::Assigned, TaskState::Waiting)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed)
    }

    pub fn is_waiting(self) -> bool {
        matches!(self, TaskState::Waiting)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Waiting => "waiting",
            TaskState::Assigned => "assigned",
            TaskState::Completed => "completed",
        };
        f.write_str(s)
    }
}
