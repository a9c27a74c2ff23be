//! IdGenerator port - ID 生成の抽象化
//!
//! IdGenerator はルーター内のエンティティ ID を生成するためのインターフェースです。
//! テスト容易性のために、trait として抽象化しています。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{AgentId, PlanId, QueueId, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

/// Ids for entities created without a caller-chosen id.
///
/// Generated ids carry the entity prefix (`task-01HV...`), so they never
/// collide across entity kinds even when a caller reuses the same string.
pub trait IdGenerator: Send + Sync {
    fn generate_queue_id(&self) -> QueueId;

    fn generate_plan_id(&self) -> PlanId;

    fn generate_agent_id(&self) -> AgentId;

    fn generate_task_id(&self) -> TaskId;
}

/// ULID ベースの ID 生成器。タイムスタンプ部分はルーターと同じ Clock から取る。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_queue_id(&self) -> QueueId {
        QueueId::from(self.next_ulid())
    }

    fn generate_plan_id(&self) -> PlanId {
        PlanId::from(self.next_ulid())
    }

    fn generate_agent_id(&self) -> AgentId {
        AgentId::from(self.next_ulid())
    }

    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }
}
