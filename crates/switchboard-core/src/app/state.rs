//! RouterState - ルーター配下のテーブル
//!
//! Plain data guarded by the router's single lock. Nothing in here is async
//! and nothing in here emits events; the router publishes what an operation
//! collected before releasing the lock.

use std::collections::HashMap;

use crate::domain::{
    AgentId, AgentRecord, Plan, PlanId, Queue, QueueId, RouterError, RouterResult, TaskId,
    TaskRecord,
};

#[derive(Debug, Default)]
pub struct RouterState {
    pub queues: HashMap<QueueId, Queue>,
    pub plans: HashMap<PlanId, Plan>,
    pub agents: HashMap<AgentId, AgentRecord>,
    pub tasks: HashMap<TaskId, TaskRecord>,

    /// Creation sequence for tasks (FIFO tie-break below timestamp resolution).
    next_task_seq: u64,

    /// Ready sequence for agents (earliest-ready-first).
    next_ready_seq: u64,
}

impl RouterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_task_seq(&mut self) -> u64 {
        self.next_task_seq += 1;
        self.next_task_seq
    }

    pub fn allocate_ready_seq(&mut self) -> u64 {
        self.next_ready_seq += 1;
        self.next_ready_seq
    }

    pub fn queue(&self, id: &QueueId) -> RouterResult<&Queue> {
        self.queues
            .get(id)
            .ok_or_else(|| RouterError::not_found(id))
    }

    pub fn queue_mut(&mut self, id: &QueueId) -> RouterResult<&mut Queue> {
        self.queues
            .get_mut(id)
            .ok_or_else(|| RouterError::not_found(id))
    }

    pub fn plan(&self, id: &PlanId) -> RouterResult<&Plan> {
        self.plans
            .get(id)
            .ok_or_else(|| RouterError::not_found(id))
    }

    pub fn agent(&self, id: &AgentId) -> RouterResult<&AgentRecord> {
        self.agents
            .get(id)
            .ok_or_else(|| RouterError::not_found(id))
    }

    pub fn agent_mut(&mut self, id: &AgentId) -> RouterResult<&mut AgentRecord> {
        self.agents
            .get_mut(id)
            .ok_or_else(|| RouterError::not_found(id))
    }

    pub fn task(&self, id: &TaskId) -> RouterResult<&TaskRecord> {
        self.tasks
            .get(id)
            .ok_or_else(|| RouterError::not_found(id))
    }

    pub fn task_mut(&mut self, id: &TaskId) -> RouterResult<&mut TaskRecord> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| RouterError::not_found(id))
    }

    /// Is any task that has not completed still bound to this queue?
    pub fn queue_in_use(&self, id: &QueueId) -> bool {
        self.tasks
            .values()
            .any(|task| &task.queue_id == id && !task.state().is_terminal())
    }
}
