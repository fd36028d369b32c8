// Storage seam for the workflow engine and the HTTP handlers.
//
// Every method is tenant-scoped: a row owned by another tenant behaves
// exactly like a missing row.

use async_trait::async_trait;
use chrono::NaiveDate;
use keystone_shared::{
    DesignItem, DesignItemType, Event, EventType, ExecutionStatus, Task, TaskTemplate,
    WorkflowDefinition, WorkflowExecution,
};
use uuid::Uuid;

pub mod postgres;
#[cfg(test)]
pub mod memory;

pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Limit/offset window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn first(limit: i64) -> Self {
        Self { limit, offset: 0 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type_ids: Option<Vec<Uuid>>,
    pub event_ids: Option<Vec<Uuid>>,
    /// Only events whose start date is on or after this day
    pub starting_on_or_after: Option<NaiveDate>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(types) = &self.event_type_ids {
            if !types.contains(&event.event_type_id) {
                return false;
            }
        }
        if let Some(ids) = &self.event_ids {
            if !ids.contains(&event.id) {
                return false;
            }
        }
        if let Some(from) = self.starting_on_or_after {
            if event.start_date < from {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub workflow_id: Option<Uuid>,
    pub trigger_entity_id: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
}

impl ExecutionFilter {
    pub fn matches(&self, execution: &WorkflowExecution) -> bool {
        self.workflow_id.is_none_or(|id| execution.workflow_id == id)
            && self.trigger_entity_id.is_none_or(|id| execution.trigger_entity_id == id)
            && self.status.is_none_or(|s| execution.status == s)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap liveness probe for health checks
    async fn ping(&self) -> bool;

    // ===== Event types & templates =====

    async fn list_event_types(&self, tenant_id: Uuid) -> StoreResult<Vec<EventType>>;
    async fn insert_event_type(&self, event_type: &EventType) -> StoreResult<()>;
    /// Subset of `ids` that exist for the tenant
    async fn existing_event_type_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> StoreResult<Vec<Uuid>>;

    async fn list_task_templates(&self, tenant_id: Uuid) -> StoreResult<Vec<TaskTemplate>>;
    async fn get_task_template(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<TaskTemplate>>;
    async fn insert_task_template(&self, template: &TaskTemplate) -> StoreResult<()>;

    async fn list_design_item_types(&self, tenant_id: Uuid) -> StoreResult<Vec<DesignItemType>>;
    async fn get_design_item_type(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<DesignItemType>>;
    async fn insert_design_item_type(&self, item_type: &DesignItemType) -> StoreResult<()>;

    // ===== Workflow definitions =====

    async fn list_workflows(&self, tenant_id: Uuid, active_only: bool) -> StoreResult<Vec<WorkflowDefinition>>;
    async fn get_workflow(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<WorkflowDefinition>>;
    /// Insert or fully replace a definition, including its event types and actions
    async fn save_workflow(&self, definition: &WorkflowDefinition) -> StoreResult<()>;
    async fn delete_workflow(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<bool>;

    // ===== Events =====

    async fn insert_event(&self, event: &Event) -> StoreResult<()>;
    async fn get_event(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Event>>;
    /// Events ordered by start date, plus the total matching count
    async fn list_events(&self, tenant_id: Uuid, filter: &EventFilter, page: Page) -> StoreResult<(Vec<Event>, i64)>;

    // ===== Generated records =====

    async fn insert_task(&self, task: &Task) -> StoreResult<()>;
    async fn delete_task(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<bool>;
    async fn list_tasks_for_event(&self, tenant_id: Uuid, event_id: Uuid) -> StoreResult<Vec<Task>>;

    async fn insert_design_item(&self, item: &DesignItem) -> StoreResult<()>;
    async fn delete_design_item(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<bool>;
    async fn list_design_items_for_event(&self, tenant_id: Uuid, event_id: Uuid) -> StoreResult<Vec<DesignItem>>;

    // ===== Executions =====

    async fn find_completed_execution(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<WorkflowExecution>>;
    /// Fails with `Conflict` if a second completed run is recorded for the same pair
    async fn insert_execution(&self, execution: &WorkflowExecution) -> StoreResult<()>;
    /// Atomically mark the pair's completed runs superseded and record `execution`.
    /// On error nothing changes. Returns how many runs were superseded.
    async fn replace_completed_execution(&self, execution: &WorkflowExecution) -> StoreResult<u64>;
    async fn list_executions(
        &self,
        tenant_id: Uuid,
        filter: &ExecutionFilter,
        page: Page,
    ) -> StoreResult<(Vec<WorkflowExecution>, i64)>;
}
