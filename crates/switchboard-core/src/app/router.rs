//! Router - テナント単位のコンテキスト
//!
//! Owns every queue, plan, agent and task of one tenant behind a single
//! `tokio::sync::Mutex`. Each public operation takes the lock once, validates,
//! mutates, runs whatever matching pass the mutation triggers, and releases
//! the lock before any event is published.
//!
//! # 設計原則
//! - one lock per router: matching passes are serialized, so no task or agent
//!   is ever paired twice
//! - all-or-nothing: operations validate before mutating; an `Err` means the
//!   tables are unchanged and no event was emitted
//! - callers observe the post-match state: `set_agent_state(ready)` returns
//!   `busy` if a task was waiting for it

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use super::requests::{
    AgentSpec, AgentUpdate, PlanSpec, PlanUpdate, QueueSpec, QueueUpdate, RouteSpec, TaskSpec,
};
use super::scheduler::{Assignment, MatchingScheduler};
use super::state::RouterState;
use super::status::{self, RouterStatus};
use crate::domain::{
    AgentId, AgentRecord, AgentState, AgentView, AttributeGroup, DomainEvent, Plan, PlanId,
    Queue, QueueId, QueueView, Route, RouterError, RouterResult, ServiceOrder, TaskDraft,
    TaskId, TaskRecord, TaskState, TaskView,
};
use crate::ports::{Clock, EventSink, IdGenerator};
use crate::predicate::Predicate;

/// Response metadata name under which a transport reports `CreatedTask::queue_size`.
pub const X_QUEUE_SIZE: &str = "X-Queue-Size";

/// Result of task creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedTask {
    pub id: TaskId,
    /// Depth of the task's queue once creation (and its matching pass) committed.
    pub queue_size: usize,
}

type Events = Vec<DomainEvent>;

struct RouterInner {
    name: String,
    state: Mutex<RouterState>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    events: Arc<dyn EventSink>,
}

/// Cheap to clone; clones share the same tables.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl Router {
    pub(crate) fn from_parts(
        name: String,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                name,
                state: Mutex::new(RouterState::new()),
                clock,
                ids,
                events,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Run `op` under the lock and publish its events before releasing it,
    /// so sinks observe events in commit order.
    async fn write<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut RouterState, DateTime<Utc>, &mut Events) -> RouterResult<T>,
    ) -> RouterResult<T> {
        let mut state = self.inner.state.lock().await;
        let now = self.inner.clock.now();
        let mut events = Events::new();
        let result = op(&mut *state, now, &mut events);

        match &result {
            Ok(_) => {
                for event in &events {
                    self.inner.events.emit(event);
                }
            }
            Err(error) => {
                warn!(router = %self.inner.name, operation, %error, "operation rejected");
            }
        }
        drop(state);
        result
    }

    async fn read<T>(&self, op: impl FnOnce(&RouterState) -> T) -> T {
        let state = self.inner.state.lock().await;
        op(&*state)
    }

    // ========================================
    // Queues
    // ========================================

    pub async fn create_queue(&self, spec: QueueSpec) -> RouterResult<QueueView> {
        let id = self.inner.ids.generate_queue_id();
        self.put_queue(id, spec).await
    }

    /// Create or replace. Replacing keeps the waiting tasks in place.
    pub async fn put_queue(&self, id: QueueId, spec: QueueSpec) -> RouterResult<QueueView> {
        self.write("put_queue", |state, now, events| {
            let (description, predicate) = queue_definition(spec)?;
            let view = match state.queues.get_mut(&id) {
                Some(queue) => {
                    queue.redefine(description, predicate, now);
                    queue.view()
                }
                None => {
                    let queue = Queue::new(id.clone(), description, predicate, now);
                    let view = queue.view();
                    state.queues.insert(id.clone(), queue);
                    view
                }
            };
            events.push(DomainEvent::QueueDefined { queue_id: id });
            Ok(view)
        })
        .await
    }

    pub async fn update_queue(&self, id: &QueueId, update: QueueUpdate) -> RouterResult<QueueView> {
        self.write("update_queue", |state, now, events| {
            let queue = state.queue_mut(id)?;
            let predicate = match update.predicate {
                Some(source) => parse_required(&source, "queue predicate")?,
                None => queue.predicate().clone(),
            };
            let description = update
                .description
                .or_else(|| queue.description().map(str::to_string));
            queue.redefine(description, predicate, now);
            events.push(DomainEvent::QueueDefined {
                queue_id: id.clone(),
            });
            Ok(queue.view())
        })
        .await
    }

    pub async fn get_queue(&self, id: &QueueId) -> RouterResult<QueueView> {
        self.read(|state| state.queue(id).map(Queue::view)).await
    }

    pub async fn list_queues(&self) -> Vec<QueueView> {
        self.read(|state| {
            let mut views: Vec<_> = state.queues.values().map(Queue::view).collect();
            views.sort_by(|a, b| a.id.cmp(&b.id));
            views
        })
        .await
    }

    /// Rejected while tasks wait in the queue or assigned tasks still belong to it.
    pub async fn delete_queue(&self, id: &QueueId) -> RouterResult<()> {
        self.write("delete_queue", |state, _now, events| {
            let queue = state.queue(id)?;
            if !queue.is_empty() {
                return Err(RouterError::conflict(format!(
                    "queue {id} still holds {} waiting task(s)",
                    queue.size()
                )));
            }
            if state.queue_in_use(id) {
                return Err(RouterError::conflict(format!(
                    "queue {id} still owns assigned tasks"
                )));
            }
            state.queues.remove(id);
            events.push(DomainEvent::QueueDeleted {
                queue_id: id.clone(),
            });
            Ok(())
        })
        .await
    }

    pub async fn queue_size(&self, id: &QueueId) -> RouterResult<usize> {
        self.read(|state| state.queue(id).map(Queue::size)).await
    }

    /// Waiting tasks in service order.
    pub async fn queue_tasks(&self, id: &QueueId) -> RouterResult<Vec<TaskView>> {
        self.read(|state| {
            let queue = state.queue(id)?;
            queue
                .task_ids()
                .map(|task_id| state.task(task_id).map(TaskRecord::view))
                .collect()
        })
        .await
    }

    // ========================================
    // Plans
    // ========================================

    pub async fn create_plan(&self, spec: PlanSpec) -> RouterResult<Plan> {
        let id = self.inner.ids.generate_plan_id();
        self.put_plan(id, spec).await
    }

    /// Create or replace. Every referenced queue must exist.
    pub async fn put_plan(&self, id: PlanId, spec: PlanSpec) -> RouterResult<Plan> {
        self.write("put_plan", |state, now, events| {
            let plan = build_plan(state, id.clone(), spec, now)?;
            store_plan(state, plan, events)
        })
        .await
    }

    pub async fn update_plan(&self, id: &PlanId, update: PlanUpdate) -> RouterResult<Plan> {
        self.write("update_plan", |state, now, events| {
            let current = state.plan(id)?;
            let spec = PlanSpec {
                description: update.description.or_else(|| current.description.clone()),
                routes: match update.routes {
                    Some(routes) => routes,
                    None => current.routes.iter().map(route_spec).collect(),
                },
                default_route: Some(
                    update
                        .default_route
                        .unwrap_or_else(|| route_spec(&current.default_route)),
                ),
            };
            let plan = build_plan(state, id.clone(), spec, now)?;
            store_plan(state, plan, events)
        })
        .await
    }

    pub async fn get_plan(&self, id: &PlanId) -> RouterResult<Plan> {
        self.read(|state| state.plan(id).cloned()).await
    }

    pub async fn list_plans(&self) -> Vec<Plan> {
        self.read(|state| {
            let mut plans: Vec<_> = state.plans.values().cloned().collect();
            plans.sort_by(|a, b| a.id.cmp(&b.id));
            plans
        })
        .await
    }

    /// Tasks already routed by the plan are unaffected.
    pub async fn delete_plan(&self, id: &PlanId) -> RouterResult<()> {
        self.write("delete_plan", |state, _now, events| {
            state
                .plans
                .remove(id)
                .ok_or_else(|| RouterError::not_found(id))?;
            events.push(DomainEvent::PlanDeleted {
                plan_id: id.clone(),
            });
            Ok(())
        })
        .await
    }

    // ========================================
    // Agents
    // ========================================

    pub async fn create_agent(&self, spec: AgentSpec) -> RouterResult<AgentView> {
        let id = self.inner.ids.generate_agent_id();
        self.put_agent(id, spec).await
    }

    /// Create or replace address and capabilities. A replaced agent keeps its
    /// state (and task) unless `spec.state` requests a transition.
    pub async fn put_agent(&self, id: AgentId, spec: AgentSpec) -> RouterResult<AgentView> {
        self.write("put_agent", |state, now, events| {
            let current = state.agents.get(&id).map(AgentRecord::state);
            if let Some(to) = spec.state {
                let from = current.unwrap_or(AgentState::Offline);
                if !from.can_request(to) {
                    return Err(RouterError::illegal_transition("agent", from, to));
                }
            }

            match state.agents.get_mut(&id) {
                Some(agent) => {
                    agent.address = spec.address;
                    agent.capabilities = spec.capabilities;
                    agent.updated_at = now;
                }
                None => {
                    let agent = AgentRecord::new(id.clone(), spec.address, spec.capabilities, now);
                    state.agents.insert(id.clone(), agent);
                }
            }
            events.push(DomainEvent::AgentDefined {
                agent_id: id.clone(),
            });

            apply_agent_change(state, &id, spec.state, now, events)
        })
        .await
    }

    pub async fn update_agent(&self, id: &AgentId, update: AgentUpdate) -> RouterResult<AgentView> {
        self.write("update_agent", |state, now, events| {
            let agent = state.agent(id)?;
            if let Some(to) = update.state
                && !agent.state().can_request(to)
            {
                return Err(RouterError::illegal_transition("agent", agent.state(), to));
            }

            let agent = state.agent_mut(id)?;
            if let Some(address) = update.address {
                agent.address = Some(address);
            }
            if let Some(capabilities) = update.capabilities {
                agent.capabilities = capabilities;
            }
            agent.updated_at = now;
            events.push(DomainEvent::AgentDefined {
                agent_id: id.clone(),
            });

            apply_agent_change(state, id, update.state, now, events)
        })
        .await
    }

    /// Caller-requested transition. `ready` runs a matching pass before
    /// returning, so the returned view may already be `busy`.
    pub async fn set_agent_state(&self, id: &AgentId, to: AgentState) -> RouterResult<AgentView> {
        self.write("set_agent_state", |state, now, events| {
            let agent = state.agent(id)?;
            if !agent.state().can_request(to) {
                return Err(RouterError::illegal_transition("agent", agent.state(), to));
            }
            apply_agent_change(state, id, Some(to), now, events)
        })
        .await
    }

    pub async fn get_agent(&self, id: &AgentId) -> RouterResult<AgentView> {
        self.read(|state| state.agent(id).map(AgentRecord::view))
            .await
    }

    pub async fn list_agents(&self) -> Vec<AgentView> {
        self.read(|state| {
            let mut views: Vec<_> = state.agents.values().map(AgentRecord::view).collect();
            views.sort_by(|a, b| a.id.cmp(&b.id));
            views
        })
        .await
    }

    /// Rejected while the agent is busy.
    pub async fn delete_agent(&self, id: &AgentId) -> RouterResult<()> {
        self.write("delete_agent", |state, _now, events| {
            let agent = state.agent(id)?;
            if let Some(task_id) = agent.task_id() {
                return Err(RouterError::conflict(format!(
                    "agent {id} is busy with task {task_id}"
                )));
            }
            state.agents.remove(id);
            events.push(DomainEvent::AgentDeleted {
                agent_id: id.clone(),
            });
            Ok(())
        })
        .await
    }

    // ========================================
    // Tasks
    // ========================================

    /// Route, admit, enqueue and try to match a new task.
    pub async fn create_task(&self, spec: TaskSpec) -> RouterResult<CreatedTask> {
        let id = self.inner.ids.generate_task_id();
        self.write("create_task", |state, now, events| {
            let prepared = prepare_task(state, spec)?;
            insert_task(state, id, prepared, now, events)
        })
        .await
    }

    /// Create with a caller-chosen id, replacing a waiting or completed task of
    /// the same id. An assigned task cannot be replaced.
    pub async fn put_task(&self, id: TaskId, spec: TaskSpec) -> RouterResult<CreatedTask> {
        self.write("put_task", |state, now, events| {
            if let Some(existing) = state.tasks.get(&id)
                && existing.state() == TaskState::Assigned
            {
                return Err(RouterError::conflict(format!(
                    "task {id} is assigned and cannot be replaced"
                )));
            }
            let prepared = prepare_task(state, spec)?;
            if let Some(old) = state.tasks.remove(&id)
                && let Some(queue) = state.queues.get_mut(&old.queue_id)
            {
                queue.remove(&id);
            }
            insert_task(state, id, prepared, now, events)
        })
        .await
    }

    /// Caller-requested transition: `completed` or `waiting` (cancel), both
    /// only from `assigned`.
    pub async fn set_task_state(&self, id: &TaskId, to: TaskState) -> RouterResult<TaskView> {
        self.write("set_task_state", |state, now, events| {
            let from = state.task(id)?.state();
            if !from.can_request(to) {
                return Err(RouterError::illegal_transition("task", from, to));
            }
            match to {
                TaskState::Completed => complete_task(state, id, now, events)?,
                TaskState::Waiting => cancel_task(state, id, now, events)?,
                TaskState::Assigned => {
                    return Err(RouterError::illegal_transition("task", from, to));
                }
            }
            state.task(id).map(TaskRecord::view)
        })
        .await
    }

    /// Cancellation issued by the system after a failed assignment delivery.
    ///
    /// Only acts if the task is still assigned to `agent_id`; returns whether it did.
    pub async fn cancel_assignment(&self, task_id: &TaskId, agent_id: &AgentId) -> RouterResult<bool> {
        self.write("cancel_assignment", |state, now, events| {
            let task = state.task(task_id)?;
            if task.state() != TaskState::Assigned || task.agent_id() != Some(agent_id) {
                return Ok(false);
            }
            cancel_task(state, task_id, now, events)?;
            Ok(true)
        })
        .await
    }

    /// Replace the task's user context. Routing is unaffected.
    pub async fn update_task_context(
        &self,
        id: &TaskId,
        context: AttributeGroup,
    ) -> RouterResult<TaskView> {
        self.write("update_task_context", |state, now, _events| {
            let task = state.task_mut(id)?;
            task.user_context = context;
            task.updated_at = now;
            Ok(task.view())
        })
        .await
    }

    pub async fn get_task(&self, id: &TaskId) -> RouterResult<TaskView> {
        self.read(|state| state.task(id).map(TaskRecord::view)).await
    }

    /// All tasks in creation order.
    pub async fn list_tasks(&self) -> Vec<TaskView> {
        self.read(|state| {
            let mut tasks: Vec<_> = state.tasks.values().collect();
            tasks.sort_by_key(|task| task.order().sequence);
            tasks.into_iter().map(TaskRecord::view).collect()
        })
        .await
    }

    /// Rejected while the task is assigned.
    pub async fn delete_task(&self, id: &TaskId) -> RouterResult<()> {
        self.write("delete_task", |state, _now, events| {
            let task = state.task(id)?;
            if task.state() == TaskState::Assigned {
                return Err(RouterError::conflict(format!(
                    "task {id} is assigned and cannot be deleted"
                )));
            }
            if let Some(task) = state.tasks.remove(id)
                && let Some(queue) = state.queues.get_mut(&task.queue_id)
            {
                queue.remove(id);
            }
            events.push(DomainEvent::TaskDeleted { task_id: id.clone() });
            Ok(())
        })
        .await
    }

    // ========================================
    // Observability
    // ========================================

    pub async fn status(&self) -> RouterStatus {
        let name = self.inner.name.clone();
        self.read(|state| RouterStatus::capture(name, state)).await
    }

    /// Consistency violations; empty when every structural invariant holds.
    pub async fn audit(&self) -> Vec<String> {
        self.read(status::audit).await
    }
}

// ========================================
// Operation bodies (run under the lock)
// ========================================

fn parse_required(source: &str, what: &str) -> RouterResult<Predicate> {
    if source.trim().is_empty() {
        return Err(RouterError::validation(format!("{what} is required")));
    }
    Ok(Predicate::parse(source)?)
}

fn queue_definition(spec: QueueSpec) -> RouterResult<(Option<String>, Predicate)> {
    let source = spec.predicate.unwrap_or_default();
    let predicate = parse_required(&source, "queue predicate")?;
    Ok((spec.description, predicate))
}

fn route_spec(route: &Route) -> RouteSpec {
    RouteSpec {
        queue_id: route.queue_id.clone(),
        priority: route.priority,
        predicate: route.predicate.as_ref().map(|p| p.source().to_string()),
    }
}

fn build_route(spec: RouteSpec) -> RouterResult<Route> {
    let mut route = Route::new(spec.queue_id, spec.priority);
    if let Some(source) = spec.predicate {
        route = route.when(parse_required(&source, "route predicate")?);
    }
    Ok(route)
}

fn build_plan(
    state: &RouterState,
    id: PlanId,
    spec: PlanSpec,
    now: DateTime<Utc>,
) -> RouterResult<Plan> {
    let default_route = spec
        .default_route
        .ok_or_else(|| RouterError::validation("plan default route is required"))?;
    let routes = spec
        .routes
        .into_iter()
        .map(build_route)
        .collect::<RouterResult<Vec<_>>>()?;
    let default_route = build_route(default_route)?;

    let mut plan = Plan::new(id, spec.description, routes, default_route, now);
    if let Some(missing) = plan.queue_ids().find(|q| !state.queues.contains_key(*q)) {
        return Err(RouterError::RouteResolution {
            plan_id: plan.id.to_string(),
            queue_id: missing.to_string(),
        });
    }
    if let Some(existing) = state.plans.get(&plan.id) {
        plan.created_at = existing.created_at;
    }
    Ok(plan)
}

fn store_plan(state: &mut RouterState, plan: Plan, events: &mut Events) -> RouterResult<Plan> {
    events.push(DomainEvent::PlanDefined {
        plan_id: plan.id.clone(),
    });
    state.plans.insert(plan.id.clone(), plan.clone());
    Ok(plan)
}

/// Apply an already-validated requested state (if any), then match if ready.
fn apply_agent_change(
    state: &mut RouterState,
    id: &AgentId,
    requested: Option<AgentState>,
    now: DateTime<Utc>,
    events: &mut Events,
) -> RouterResult<AgentView> {
    if let Some(to) = requested {
        let seq = state.allocate_ready_seq();
        let from = state.agent_mut(id)?.request_state(to, seq, now)?;
        if from != to {
            events.push(DomainEvent::AgentStateChanged {
                agent_id: id.clone(),
                from,
                to,
            });
        }
    }
    run_pass(MatchingScheduler::on_agent_ready(state, id, now)?, events);
    state.agent(id).map(AgentRecord::view)
}

fn run_pass(assignment: Option<Assignment>, events: &mut Events) {
    if let Some(assignment) = assignment {
        events.extend(assignment.events());
    }
}

/// Task input after routing, parsing and admission; nothing mutated yet.
struct PreparedTask {
    queue_id: QueueId,
    plan_id: Option<PlanId>,
    priority: i64,
    draft: TaskDraft,
}

fn prepare_task(state: &RouterState, spec: TaskSpec) -> RouterResult<PreparedTask> {
    let (queue_id, plan_id, priority) = match (spec.queue_id, spec.plan_id) {
        (Some(queue_id), None) => {
            state.queue(&queue_id)?;
            (queue_id, None, 0)
        }
        (None, Some(plan_id)) => {
            let resolution = state.plan(&plan_id)?.resolve(&spec.attributes);
            if !state.queues.contains_key(&resolution.queue_id) {
                return Err(RouterError::RouteResolution {
                    plan_id: plan_id.to_string(),
                    queue_id: resolution.queue_id.to_string(),
                });
            }
            (resolution.queue_id, Some(plan_id), resolution.priority)
        }
        (Some(_), Some(_)) => {
            return Err(RouterError::validation(
                "task must target either a queue or a plan, not both",
            ));
        }
        (None, None) => {
            return Err(RouterError::validation(
                "task must target a queue or a plan",
            ));
        }
    };

    let requirements = spec
        .requirements
        .filter(|source| !source.trim().is_empty())
        .map(|source| Predicate::parse(&source))
        .transpose()?;

    if !state.queue(&queue_id)?.admit(&spec.attributes) {
        return Err(RouterError::validation(format!(
            "queue {queue_id} does not admit the task"
        )));
    }

    Ok(PreparedTask {
        queue_id,
        plan_id,
        priority,
        draft: TaskDraft {
            requirements,
            attributes: spec.attributes,
            user_context: spec.user_context,
            callback_url: spec.callback_url,
        },
    })
}

fn insert_task(
    state: &mut RouterState,
    id: TaskId,
    prepared: PreparedTask,
    now: DateTime<Utc>,
    events: &mut Events,
) -> RouterResult<CreatedTask> {
    let order = ServiceOrder {
        priority: prepared.priority,
        created_at: now,
        sequence: state.allocate_task_seq(),
    };
    let queue_id = prepared.queue_id.clone();
    let task = TaskRecord::new(
        id.clone(),
        prepared.draft,
        prepared.queue_id,
        prepared.plan_id,
        order,
    );
    state.queue_mut(&queue_id)?.enqueue(id.clone(), order);
    state.tasks.insert(id.clone(), task);
    events.push(DomainEvent::TaskCreated {
        task_id: id.clone(),
        queue_id: queue_id.clone(),
        priority: order.priority,
    });

    run_pass(MatchingScheduler::on_task_waiting(state, &id, now)?, events);
    Ok(CreatedTask {
        id,
        queue_size: state.queue(&queue_id)?.size(),
    })
}

/// assigned -> completed; the agent goes busy -> ready and looks for its next task.
fn complete_task(
    state: &mut RouterState,
    id: &TaskId,
    now: DateTime<Utc>,
    events: &mut Events,
) -> RouterResult<()> {
    let agent_id = assigned_agent(state, id)?;
    let task = state.task_mut(id)?;
    task.complete(now)?;
    let callback_url = task.callback_url.clone();
    let seq = state.allocate_ready_seq();
    state.agent_mut(&agent_id)?.release(seq, now)?;

    events.push(DomainEvent::TaskStateChanged {
        task_id: id.clone(),
        from: TaskState::Assigned,
        to: TaskState::Completed,
        callback_url,
    });
    events.push(DomainEvent::AgentStateChanged {
        agent_id: agent_id.clone(),
        from: AgentState::Busy,
        to: AgentState::Ready,
    });
    run_pass(
        MatchingScheduler::on_agent_ready(state, &agent_id, now)?,
        events,
    );
    Ok(())
}

/// assigned -> waiting; the agent goes busy -> unavailable and the task
/// re-enters its queue at its original position.
fn cancel_task(
    state: &mut RouterState,
    id: &TaskId,
    now: DateTime<Utc>,
    events: &mut Events,
) -> RouterResult<()> {
    let agent_id = assigned_agent(state, id)?;
    let queue_id = state.task(id)?.queue_id.clone();
    state.queue(&queue_id)?;

    let task = state.task_mut(id)?;
    task.cancel(now)?;
    let order = task.order();
    let callback_url = task.callback_url.clone();
    state.agent_mut(&agent_id)?.suspend(now)?;
    state.queue_mut(&queue_id)?.enqueue(id.clone(), order);

    events.push(DomainEvent::TaskStateChanged {
        task_id: id.clone(),
        from: TaskState::Assigned,
        to: TaskState::Waiting,
        callback_url,
    });
    events.push(DomainEvent::AgentStateChanged {
        agent_id,
        from: AgentState::Busy,
        to: AgentState::Unavailable,
    });
    run_pass(MatchingScheduler::on_task_waiting(state, id, now)?, events);
    Ok(())
}

/// The agent holding an assigned task, checked to hold it back.
fn assigned_agent(state: &RouterState, id: &TaskId) -> RouterResult<AgentId> {
    let task = state.task(id)?;
    let agent_id = task
        .agent_id()
        .cloned()
        .ok_or_else(|| RouterError::conflict(format!("task {id} has no assigned agent")))?;
    let agent = state.agent(&agent_id)?;
    if agent.task_id() != Some(id) {
        return Err(RouterError::conflict(format!(
            "agent {agent_id} is not holding task {id}"
        )));
    }
    Ok(agent_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RouterBuilder;
    use crate::domain::ErrorKind;
    use crate::impls::RecordingEventSink;

    fn router() -> (Router, RecordingEventSink) {
        let sink = RecordingEventSink::new();
        let app = RouterBuilder::new("test")
            .event_sink(sink.clone())
            .build()
            .unwrap();
        (app.router, sink)
    }

    async fn queue(router: &Router, id: &str, predicate: &str) -> QueueId {
        router
            .put_queue(QueueId::new(id), QueueSpec::new(predicate))
            .await
            .unwrap()
            .id
    }

    async fn ready_agent(router: &Router, id: &str, capabilities: AttributeGroup) -> AgentId {
        router
            .put_agent(
                AgentId::new(id),
                AgentSpec {
                    capabilities,
                    state: Some(AgentState::Ready),
                    ..AgentSpec::default()
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn queue_requires_a_valid_predicate() {
        let (router, sink) = router();
        let missing = router.create_queue(QueueSpec::default()).await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::Validation);

        let malformed = router
            .create_queue(QueueSpec::new("language=="))
            .await
            .unwrap_err();
        assert!(matches!(malformed, RouterError::MalformedPredicate(_)));
        assert!(router.list_queues().await.is_empty());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn replacing_a_queue_keeps_its_tasks() {
        let (router, _) = router();
        let q = queue(&router, "q1", "1==1").await;
        router.create_task(TaskSpec::to_queue(q.clone())).await.unwrap();

        let view = router
            .put_queue(q.clone(), QueueSpec::new("true").described("renamed"))
            .await
            .unwrap();
        assert_eq!(view.size, 1);
        assert_eq!(view.description.as_deref(), Some("renamed"));
    }

    #[tokio::test]
    async fn update_queue_keeps_unset_fields() {
        let (router, _) = router();
        router
            .put_queue(QueueId::new("q1"), QueueSpec::new("1==1").described("sales"))
            .await
            .unwrap();
        let view = router
            .update_queue(
                &QueueId::new("q1"),
                QueueUpdate {
                    predicate: Some("language==en".into()),
                    ..QueueUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(view.predicate, "language==en");
        assert_eq!(view.description.as_deref(), Some("sales"));
    }

    #[tokio::test]
    async fn admission_rejects_without_enqueueing() {
        let (router, _) = router();
        let q = queue(&router, "en", "language==en").await;
        let err = router
            .create_task(
                TaskSpec::to_queue(q.clone())
                    .with_attributes(AttributeGroup::new().with("language", "de")),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(router.queue_size(&q).await.unwrap(), 0);
        assert!(router.list_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn task_target_must_be_exactly_one() {
        let (router, _) = router();
        queue(&router, "q1", "true").await;
        let neither = router.create_task(TaskSpec::default()).await.unwrap_err();
        assert_eq!(neither.kind(), ErrorKind::Validation);

        let both = TaskSpec {
            queue_id: Some(QueueId::new("q1")),
            plan_id: Some(PlanId::new("p1")),
            ..TaskSpec::default()
        };
        assert!(router.create_task(both).await.is_err());

        let unknown = router
            .create_task(TaskSpec::to_queue("nope"))
            .await
            .unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn plan_routes_and_stamps_priority() {
        let (router, _) = router();
        queue(&router, "vip", "true").await;
        queue(&router, "general", "true").await;
        router
            .put_plan(
                PlanId::new("p1"),
                PlanSpec {
                    description: None,
                    routes: vec![RouteSpec::new("vip", 5).when("tier==gold")],
                    default_route: Some(RouteSpec::new("general", 1)),
                },
            )
            .await
            .unwrap();

        let gold = router
            .create_task(
                TaskSpec::to_plan("p1").with_attributes(AttributeGroup::new().with("tier", "gold")),
            )
            .await
            .unwrap();
        let plain = router.create_task(TaskSpec::to_plan("p1")).await.unwrap();

        let gold = router.get_task(&gold.id).await.unwrap();
        assert_eq!(gold.queue_id, QueueId::new("vip"));
        assert_eq!(gold.priority, 5);
        assert_eq!(gold.plan_id, Some(PlanId::new("p1")));
        let plain = router.get_task(&plain.id).await.unwrap();
        assert_eq!(plain.queue_id, QueueId::new("general"));
        assert_eq!(plain.priority, 1);
    }

    #[tokio::test]
    async fn plan_requires_default_route_and_known_queues() {
        let (router, _) = router();
        queue(&router, "q1", "true").await;

        let no_default = router
            .create_plan(PlanSpec::default())
            .await
            .unwrap_err();
        assert_eq!(no_default.kind(), ErrorKind::Validation);

        let unknown = router
            .create_plan(PlanSpec {
                routes: vec![RouteSpec::new("ghost", 1)],
                default_route: Some(RouteSpec::new("q1", 0)),
                ..PlanSpec::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(unknown, RouterError::RouteResolution { .. }));
        assert!(router.list_plans().await.is_empty());
    }

    #[tokio::test]
    async fn plan_to_deleted_queue_fails_route_resolution() {
        let (router, _) = router();
        queue(&router, "gone", "true").await;
        router
            .put_plan(
                PlanId::new("p1"),
                PlanSpec {
                    default_route: Some(RouteSpec::new("gone", 0)),
                    ..PlanSpec::default()
                },
            )
            .await
            .unwrap();
        router.delete_queue(&QueueId::new("gone")).await.unwrap();

        let err = router.create_task(TaskSpec::to_plan("p1")).await.unwrap_err();
        assert!(matches!(err, RouterError::RouteResolution { .. }));
    }

    #[tokio::test]
    async fn update_plan_merges_fields() {
        let (router, _) = router();
        queue(&router, "a", "true").await;
        queue(&router, "b", "true").await;
        router
            .put_plan(
                PlanId::new("p1"),
                PlanSpec {
                    description: Some("first".into()),
                    routes: vec![RouteSpec::new("a", 2).when("x==1")],
                    default_route: Some(RouteSpec::new("a", 0)),
                },
            )
            .await
            .unwrap();

        let plan = router
            .update_plan(
                &PlanId::new("p1"),
                PlanUpdate {
                    default_route: Some(RouteSpec::new("b", 0)),
                    ..PlanUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(plan.description.as_deref(), Some("first"));
        assert_eq!(plan.routes.len(), 1);
        assert_eq!(plan.default_route.queue_id, QueueId::new("b"));
    }

    #[tokio::test]
    async fn created_task_reports_queue_depth() {
        let (router, _) = router();
        let q = queue(&router, "q1", "true").await;
        let first = router.create_task(TaskSpec::to_queue(q.clone())).await.unwrap();
        let second = router.create_task(TaskSpec::to_queue(q.clone())).await.unwrap();
        assert_eq!(first.queue_size, 1);
        assert_eq!(second.queue_size, 2);

        let waiting: Vec<_> = router
            .queue_tasks(&q)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(waiting, vec![first.id, second.id]);
        assert_eq!(X_QUEUE_SIZE, "X-Queue-Size");
    }

    #[tokio::test]
    async fn ready_agent_returns_post_match_state() {
        let (router, sink) = router();
        let q = queue(&router, "q1", "true").await;
        let task = router
            .create_task(TaskSpec::to_queue(q).with_callback("http://crm/t"))
            .await
            .unwrap();

        let agent = router
            .put_agent(AgentId::new("a1"), AgentSpec::default())
            .await
            .unwrap();
        assert_eq!(agent.state, AgentState::Offline);

        let agent = router
            .set_agent_state(&agent.id, AgentState::Ready)
            .await
            .unwrap();
        assert_eq!(agent.state, AgentState::Busy);
        assert_eq!(agent.task_id, Some(task.id.clone()));

        let events = sink.events();
        assert!(events.iter().any(|e| matches!(
            e,
            DomainEvent::TaskAssigned { task_id, callback_url: Some(_), .. } if *task_id == task.id
        )));
    }

    #[tokio::test]
    async fn caller_cannot_force_busy_or_assigned() {
        let (router, _) = router();
        let q = queue(&router, "q1", "true").await;
        let agent = ready_agent(&router, "a1", AttributeGroup::new()).await;
        let err = router
            .set_agent_state(&agent, AgentState::Busy)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::IllegalStateTransition { .. }));

        router.set_agent_state(&agent, AgentState::Offline).await.unwrap();
        let task = router.create_task(TaskSpec::to_queue(q)).await.unwrap();
        let err = router
            .set_task_state(&task.id, TaskState::Assigned)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = router
            .set_task_state(&task.id, TaskState::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn deletes_are_guarded() {
        let (router, _) = router();
        let q = queue(&router, "q1", "true").await;
        let task = router.create_task(TaskSpec::to_queue(q.clone())).await.unwrap();

        assert_eq!(
            router.delete_queue(&q).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );

        let agent = ready_agent(&router, "a1", AttributeGroup::new()).await;
        assert_eq!(
            router.delete_agent(&agent).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            router.delete_task(&task.id).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );
        // the assigned task still belongs to the queue
        assert_eq!(
            router.delete_queue(&q).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );

        router
            .set_task_state(&task.id, TaskState::Completed)
            .await
            .unwrap();
        router.delete_task(&task.id).await.unwrap();
        router.delete_agent(&agent).await.unwrap();
        router.delete_queue(&q).await.unwrap();
        assert!(router.audit().await.is_empty());
    }

    #[tokio::test]
    async fn deleting_waiting_task_removes_it_from_queue() {
        let (router, _) = router();
        let q = queue(&router, "q1", "true").await;
        let task = router.create_task(TaskSpec::to_queue(q.clone())).await.unwrap();
        router.delete_task(&task.id).await.unwrap();
        assert_eq!(router.queue_size(&q).await.unwrap(), 0);
        assert_eq!(
            router.get_task(&task.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn put_task_replaces_waiting_but_not_assigned() {
        let (router, _) = router();
        queue(&router, "q1", "true").await;
        queue(&router, "q2", "true").await;
        let id = TaskId::new("t1");

        router.put_task(id.clone(), TaskSpec::to_queue("q1")).await.unwrap();
        let replaced = router.put_task(id.clone(), TaskSpec::to_queue("q2")).await.unwrap();
        assert_eq!(replaced.queue_size, 1);
        assert_eq!(router.queue_size(&QueueId::new("q1")).await.unwrap(), 0);

        ready_agent(&router, "a1", AttributeGroup::new()).await;
        let err = router
            .put_task(id.clone(), TaskSpec::to_queue("q1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(router.audit().await.is_empty());
    }

    #[tokio::test]
    async fn user_context_is_replaced_without_rerouting() {
        let (router, _) = router();
        let q = queue(&router, "q1", "true").await;
        let task = router.create_task(TaskSpec::to_queue(q)).await.unwrap();

        let view = router
            .update_task_context(&task.id, AttributeGroup::new().with("ticket", 42i64))
            .await
            .unwrap();
        assert!(view.user_context.contains("ticket"));
        assert_eq!(view.state, TaskState::Waiting);
    }

    #[tokio::test]
    async fn capability_update_of_ready_agent_triggers_matching() {
        let (router, _) = router();
        let q = queue(&router, "q1", "true").await;
        let agent = ready_agent(&router, "a1", AttributeGroup::new()).await;
        let task = router
            .create_task(TaskSpec::to_queue(q).requiring("language==en"))
            .await
            .unwrap();
        assert_eq!(router.get_agent(&agent).await.unwrap().state, AgentState::Ready);

        let view = router
            .update_agent(
                &agent,
                AgentUpdate {
                    capabilities: Some(AttributeGroup::new().with("language", "en")),
                    ..AgentUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(view.task_id, Some(task.id));
    }

    #[tokio::test]
    async fn cancel_assignment_is_guarded_by_agent() {
        let (router, _) = router();
        let q = queue(&router, "q1", "true").await;
        let agent = ready_agent(&router, "a1", AttributeGroup::new()).await;
        let task = router.create_task(TaskSpec::to_queue(q)).await.unwrap();

        let other = AgentId::new("someone-else");
        assert!(!router.cancel_assignment(&task.id, &other).await.unwrap());
        assert!(router.cancel_assignment(&task.id, &agent).await.unwrap());
        assert!(!router.cancel_assignment(&task.id, &agent).await.unwrap());

        assert_eq!(
            router.get_agent(&agent).await.unwrap().state,
            AgentState::Unavailable
        );
        assert_eq!(
            router.get_task(&task.id).await.unwrap().state,
            TaskState::Waiting
        );
    }

    #[tokio::test]
    async fn events_follow_commit_order() {
        let (router, sink) = router();
        let q = queue(&router, "q1", "true").await;
        let agent = ready_agent(&router, "a1", AttributeGroup::new()).await;
        sink.take();

        let task = router.create_task(TaskSpec::to_queue(q)).await.unwrap();
        let names: Vec<_> = sink.take().iter().map(DomainEvent::name).collect();
        assert_eq!(
            names,
            vec!["task_created", "agent_state_changed", "task_assigned"]
        );

        router
            .set_task_state(&task.id, TaskState::Completed)
            .await
            .unwrap();
        let events = sink.take();
        assert_eq!(
            events[1],
            DomainEvent::AgentStateChanged {
                agent_id: agent,
                from: AgentState::Busy,
                to: AgentState::Ready,
            }
        );
    }
}
