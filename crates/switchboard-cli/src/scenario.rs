//! Scenario - TOML で書かれた操作列をルーターに流す
//!
//! ```toml
//! name = "support desk"
//!
//! [[steps]]
//! op = "put_queue"
//! id = "general"
//! predicate = "true"
//!
//! [[steps]]
//! op = "expect_failure"
//! kind = "conflict"
//! step = { op = "delete_agent", id = "alice" }
//! ```
//!
//! Ids are taken verbatim, so later steps can refer to earlier entities by
//! name. After every step the callback publisher (if any) is drained, which
//! keeps a run deterministic.

use std::path::Path;

use serde::Deserialize;
use switchboard_core::app::{
    AgentSpec, CallbackPublisher, PlanSpec, QueueSpec, RouteSpec, TaskSpec,
};
use switchboard_core::domain::{
    AgentId, AgentState, AttributeGroup, ErrorKind, PlanId, QueueId, TaskId, TaskState,
};
use switchboard_core::{Router, RouterError, RouterResult};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_toml_str(content: &str) -> Result<Self, ScenarioError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    PutQueue {
        id: QueueId,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        predicate: Option<String>,
    },
    DeleteQueue {
        id: QueueId,
    },
    PutPlan {
        id: PlanId,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        routes: Vec<RouteSpec>,
        #[serde(default)]
        default_route: Option<RouteSpec>,
    },
    DeletePlan {
        id: PlanId,
    },
    PutAgent {
        id: AgentId,
        #[serde(default)]
        address: Option<String>,
        #[serde(default)]
        capabilities: AttributeGroup,
        #[serde(default)]
        state: Option<AgentState>,
    },
    SetAgentState {
        id: AgentId,
        state: AgentState,
    },
    DeleteAgent {
        id: AgentId,
    },
    PutTask {
        id: TaskId,
        #[serde(default)]
        queue_id: Option<QueueId>,
        #[serde(default)]
        plan_id: Option<PlanId>,
        #[serde(default)]
        requirements: Option<String>,
        #[serde(default)]
        attributes: AttributeGroup,
        #[serde(default)]
        user_context: AttributeGroup,
        #[serde(default)]
        callback_url: Option<String>,
    },
    SetTaskState {
        id: TaskId,
        state: TaskState,
    },
    UpdateTaskContext {
        id: TaskId,
        context: AttributeGroup,
    },
    DeleteTask {
        id: TaskId,
    },
    ExpectTask {
        id: TaskId,
        state: TaskState,
        #[serde(default)]
        agent_id: Option<AgentId>,
    },
    ExpectAgent {
        id: AgentId,
        state: AgentState,
    },
    ExpectQueueSize {
        id: QueueId,
        size: usize,
    },
    /// Run `step` and require it to fail with `kind`.
    ExpectFailure {
        kind: ErrorKind,
        step: Box<Step>,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::PutQueue { .. } => "put_queue",
            Step::DeleteQueue { .. } => "delete_queue",
            Step::PutPlan { .. } => "put_plan",
            Step::DeletePlan { .. } => "delete_plan",
            Step::PutAgent { .. } => "put_agent",
            Step::SetAgentState { .. } => "set_agent_state",
            Step::DeleteAgent { .. } => "delete_agent",
            Step::PutTask { .. } => "put_task",
            Step::SetTaskState { .. } => "set_task_state",
            Step::UpdateTaskContext { .. } => "update_task_context",
            Step::DeleteTask { .. } => "delete_task",
            Step::ExpectTask { .. } => "expect_task",
            Step::ExpectAgent { .. } => "expect_agent",
            Step::ExpectQueueSize { .. } => "expect_queue_size",
            Step::ExpectFailure { .. } => "expect_failure",
        }
    }
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("step {step} ({op}) failed: {source}")]
    Step {
        step: usize,
        op: &'static str,
        #[source]
        source: StepError,
    },
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("expectation not met: {0}")]
    Expectation(String),
}

pub struct ScenarioRunner {
    router: Router,
    publisher: Option<CallbackPublisher>,
}

impl ScenarioRunner {
    pub fn new(router: Router, publisher: Option<CallbackPublisher>) -> Self {
        Self { router, publisher }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Run every step in order; stops at the first failing one.
    pub async fn run(&mut self, scenario: &Scenario) -> Result<usize, ScenarioError> {
        info!(
            scenario = scenario.name.as_deref().unwrap_or("unnamed"),
            steps = scenario.steps.len(),
            "running scenario"
        );
        for (index, step) in scenario.steps.iter().enumerate() {
            let number = index + 1;
            debug!(step = number, op = step.name(), "step");
            self.apply(step).await.map_err(|source| ScenarioError::Step {
                step: number,
                op: step.name(),
                source,
            })?;
            if let Some(publisher) = self.publisher.as_mut() {
                publisher.drain().await;
            }
        }
        Ok(scenario.steps.len())
    }

    async fn apply(&self, step: &Step) -> Result<(), StepError> {
        match step {
            Step::ExpectTask {
                id,
                state,
                agent_id,
            } => {
                let task = self.router.get_task(id).await?;
                if task.state != *state {
                    return Err(StepError::Expectation(format!(
                        "task {id} is {}, expected {state}",
                        task.state
                    )));
                }
                if agent_id.is_some() && task.agent_id != *agent_id {
                    return Err(StepError::Expectation(format!(
                        "task {id} is held by {:?}, expected {:?}",
                        task.agent_id, agent_id
                    )));
                }
                Ok(())
            }
            Step::ExpectAgent { id, state } => {
                let agent = self.router.get_agent(id).await?;
                if agent.state != *state {
                    return Err(StepError::Expectation(format!(
                        "agent {id} is {}, expected {state}",
                        agent.state
                    )));
                }
                Ok(())
            }
            Step::ExpectQueueSize { id, size } => {
                let actual = self.router.queue_size(id).await?;
                if actual != *size {
                    return Err(StepError::Expectation(format!(
                        "queue {id} holds {actual} tasks, expected {size}"
                    )));
                }
                Ok(())
            }
            Step::ExpectFailure { kind, step } => match execute(&self.router, step).await {
                Ok(()) => Err(StepError::Expectation(format!(
                    "{} succeeded, expected {kind:?}",
                    step.name()
                ))),
                Err(error) if error.kind() == *kind => {
                    debug!(op = step.name(), %error, "failed as expected");
                    Ok(())
                }
                Err(error) => Err(StepError::Expectation(format!(
                    "{} failed with {:?} ({error}), expected {kind:?}",
                    step.name(),
                    error.kind()
                ))),
            },
            other => Ok(execute(&self.router, other).await?),
        }
    }
}

/// Mutating steps only; expectations cannot be nested.
async fn execute(router: &Router, step: &Step) -> RouterResult<()> {
    match step.clone() {
        Step::PutQueue {
            id,
            description,
            predicate,
        } => {
            router
                .put_queue(
                    id,
                    QueueSpec {
                        description,
                        predicate,
                    },
                )
                .await?;
        }
        Step::DeleteQueue { id } => router.delete_queue(&id).await?,
        Step::PutPlan {
            id,
            description,
            routes,
            default_route,
        } => {
            router
                .put_plan(
                    id,
                    PlanSpec {
                        description,
                        routes,
                        default_route,
                    },
                )
                .await?;
        }
        Step::DeletePlan { id } => router.delete_plan(&id).await?,
        Step::PutAgent {
            id,
            address,
            capabilities,
            state,
        } => {
            router
                .put_agent(
                    id,
                    AgentSpec {
                        address,
                        capabilities,
                        state,
                    },
                )
                .await?;
        }
        Step::SetAgentState { id, state } => {
            router.set_agent_state(&id, state).await?;
        }
        Step::DeleteAgent { id } => router.delete_agent(&id).await?,
        Step::PutTask {
            id,
            queue_id,
            plan_id,
            requirements,
            attributes,
            user_context,
            callback_url,
        } => {
            let created = router
                .put_task(
                    id,
                    TaskSpec {
                        queue_id,
                        plan_id,
                        requirements,
                        attributes,
                        user_context,
                        callback_url,
                    },
                )
                .await?;
            debug!(task_id = %created.id, queue_size = created.queue_size, "task created");
        }
        Step::SetTaskState { id, state } => {
            router.set_task_state(&id, state).await?;
        }
        Step::UpdateTaskContext { id, context } => {
            router.update_task_context(&id, context).await?;
        }
        Step::DeleteTask { id } => router.delete_task(&id).await?,
        nested => {
            return Err(RouterError::validation(format!(
                "{} cannot be used inside expect_failure",
                nested.name()
            )));
        }
    }
    Ok(())
}
