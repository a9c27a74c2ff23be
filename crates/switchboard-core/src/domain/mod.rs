//! Domain model (IDs, attributes, records, state machines, events).
//!
//! Records own their own transition rules; the router owns the tables that
//! hold them and the lock that makes a matching pass atomic.

pub mod agent;
pub mod attributes;
pub mod errors;
pub mod events;
pub mod ids;
pub mod plan;
pub mod queue;
pub mod state;
pub mod task;

pub use agent::{AgentRecord, AgentView};
pub use attributes::{AttributeGroup, AttributeValue};
pub use errors::{ErrorKind, RouterError, RouterResult};
pub use events::DomainEvent;
pub use ids::{AgentId, Id, IdMarker, PlanId, QueueId, TaskId};
pub use plan::{Plan, Resolution, Route};
pub use queue::{Queue, QueueView, ServiceOrder};
pub use state::{AgentState, TaskState};
pub use task::{TaskDraft, TaskRecord, TaskView};
