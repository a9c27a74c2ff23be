//! Domain identifiers (strongly-typed IDs).
//!
//! # Phantom Type パターン
//! `Id<T>` で共通実装を提供し、`T` はマーカー型としてコンパイル時の型安全性だけを担います。
//! `QueueId` と `TaskId` は同じ文字列表現を持ちますが、混同できません。
//!
//! ## 生成 ID と指定 ID
//! - 生成 ID: `{prefix}{ULID}`（例: `task-01HV...`）。時刻でソート可能。
//! - 指定 ID: PUT 相当の操作で呼び出し側が渡した文字列をそのまま使う。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// 生成 ID のプレフィックス（"queue-", "task-" など）と、エラーメッセージ用の
/// エンティティ名を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;

    fn entity() -> &'static str;
}

/// ジェネリック ID 型
///
/// # 例
/// ```ignore
/// let queue_id: QueueId = Id::new("sales-en");
/// let task_id: TaskId = Id::from_ulid(Ulid::new());
/// // queue_id と task_id は異なる型なので、混同できない
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// Caller-supplied id, used verbatim.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// ULID から生成 ID を作成（プレフィックス付き）
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self::new(format!("{}{}", T::prefix(), ulid))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn entity() -> &'static str {
        T::entity()
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Queue {}

impl IdMarker for Queue {
    fn prefix() -> &'static str {
        "queue-"
    }

    fn entity() -> &'static str {
        "queue"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plan {}

impl IdMarker for Plan {
    fn prefix() -> &'static str {
        "plan-"
    }

    fn entity() -> &'static str {
        "plan"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Agent {}

impl IdMarker for Agent {
    fn prefix() -> &'static str {
        "agent-"
    }

    fn entity() -> &'static str {
        "agent"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }

    fn entity() -> &'static str {
        "task"
    }
}

// ========================================
// Type Alias
// ========================================

/// Identifier of a Queue (admission-gated holding area).
pub type QueueId = Id<Queue>;

/// Identifier of a Plan (ordered route set).
pub type PlanId = Id<Plan>;

/// Identifier of an Agent (worker).
pub type AgentId = Id<Agent>;

/// Identifier of a Task (unit of work).
pub type TaskId = Id<Task>;
