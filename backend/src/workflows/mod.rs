// Workflow Automation Engine
//
// Matches workflow definitions to event types and fans each match out into
// tasks and design items for the event, guarded by execution records.

pub mod definition;
pub mod matcher;
pub mod scheduling;
pub mod executor;
pub mod engine;

use uuid::Uuid;

use crate::store::StoreError;

pub use definition::{build_definition, WorkflowInput};
pub use engine::{ApplyOptions, ApplyReport, WorkflowEngine};
pub use executor::WorkflowRun;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Workflow {0} not found")]
    WorkflowNotFound(Uuid),
    #[error("Event {0} not found")]
    EventNotFound(Uuid),
    #[error("Workflow {0} is inactive")]
    WorkflowInactive(Uuid),
    #[error("{kind} {id} referenced by action {position} no longer exists")]
    MissingTemplate {
        kind: &'static str,
        id: Uuid,
        position: i32,
    },
    #[error("Action {position} is misconfigured: {reason}")]
    InvalidAction { position: i32, reason: String },
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
