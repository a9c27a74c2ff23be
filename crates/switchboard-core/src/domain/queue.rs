//! Queue record: admission predicate + priority-ordered waiting set.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attributes::AttributeGroup;
use super::ids::{QueueId, TaskId};
use crate::predicate::Predicate;

/// Position of a task in service order.
///
/// Higher priority first, then earliest creation time, then creation sequence.
/// The sequence is unique per router, so this is a total order and two
/// tasks never share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}

impl Ord for ServiceOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for ServiceOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Admission-gated holding area for waiting tasks.
///
/// Design:
/// - The queue holds TaskIds only; `TaskRecord` is the source of truth for task state.
/// - `waiting` is kept in service order, `positions` gives O(log n) removal by id.
/// - Mutation happens only under the router lock, so a matching pass sees a stable set.
#[derive(Debug, Clone)]
pub struct Queue {
    id: QueueId,
    description: Option<String>,
    predicate: Predicate,
    waiting: BTreeMap<ServiceOrder, TaskId>,
    positions: HashMap<TaskId, ServiceOrder>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Queue {
    pub fn new(
        id: QueueId,
        description: Option<String>,
        predicate: Predicate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            description,
            predicate,
            waiting: BTreeMap::new(),
            positions: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &QueueId {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Replace description and predicate; waiting tasks stay where they are.
    pub fn redefine(
        &mut self,
        description: Option<String>,
        predicate: Predicate,
        now: DateTime<Utc>,
    ) {
        self.description = description;
        self.predicate = predicate;
        self.updated_at = now;
    }

    /// Does the admission predicate accept a task with these attributes?
    pub fn admit(&self, task_attributes: &AttributeGroup) -> bool {
        self.predicate.evaluate(task_attributes)
    }

    /// Returns false if the task is already waiting here.
    pub fn enqueue(&mut self, task_id: TaskId, order: ServiceOrder) -> bool {
        if self.positions.contains_key(&task_id) {
            return false;
        }
        self.waiting.insert(order, task_id.clone());
        self.positions.insert(task_id, order);
        true
    }

    /// Best waiting task satisfying `eligible`, without removing it.
    pub fn peek_highest_priority(
        &self,
        mut eligible: impl FnMut(&TaskId) -> bool,
    ) -> Option<(ServiceOrder, &TaskId)> {
        self.waiting
            .iter()
            .find(|(_, task_id)| eligible(task_id))
            .map(|(order, task_id)| (*order, task_id))
    }

    /// Remove and return the best waiting task satisfying `eligible`.
    pub fn dequeue_highest_priority(
        &mut self,
        eligible: impl FnMut(&TaskId) -> bool,
    ) -> Option<TaskId> {
        let task_id = self.peek_highest_priority(eligible)?.1.clone();
        self.remove(&task_id);
        Some(task_id)
    }

    /// Explicit removal (cancellation outside the matching path, deletion).
    pub fn remove(&mut self, task_id: &TaskId) -> bool {
        match self.positions.remove(task_id) {
            Some(order) => {
                self.waiting.remove(&order);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.positions.contains_key(task_id)
    }

    pub fn size(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Waiting tasks in service order.
    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.waiting.values()
    }

    pub fn view(&self) -> QueueView {
        QueueView {
            id: self.id.clone(),
            description: self.description.clone(),
            predicate: self.predicate.source().to_string(),
            size: self.size(),
        }
    }
}

/// Serializable view of a Queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueView {
    pub id: QueueId,
    pub description: Option<String>,
    pub predicate: String,
    pub size: usize,
}
