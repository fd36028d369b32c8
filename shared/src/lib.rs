use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ===== Events =====

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventType {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub event_type_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub account_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub status: String, // planned, confirmed, cancelled, completed
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ===== Templates =====

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskTemplate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub priority: String, // low, medium, high, urgent
    pub default_assignee_id: Option<Uuid>,
    pub default_days_before_event: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// A kind of deliverable (banner, printed program, signage) with lead-time defaults.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesignItemType {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub default_production_days: i32,
    pub default_shipping_days: i32,
    pub created_at: DateTime<Utc>,
}

// ===== Workflows =====

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub execution_order: i32,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "workflow_action_kind", rename_all = "snake_case")
)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowActionKind {
    CreateTask,
    CreateDesignItem,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowAction {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub position: i32,
    pub kind: WorkflowActionKind,
    pub task_template_id: Option<Uuid>,
    pub design_item_type_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub days_before_event: Option<i32>,
    pub production_days: Option<i32>,
    pub shipping_days: Option<i32>,
}

/// A workflow together with the event types it applies to and its ordered actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub event_type_ids: Vec<Uuid>,
    pub actions: Vec<WorkflowAction>,
}

impl WorkflowDefinition {
    pub fn id(&self) -> Uuid {
        self.workflow.id
    }

    pub fn applies_to(&self, event_type_id: Uuid) -> bool {
        self.event_type_ids.contains(&event_type_id)
    }
}

// ===== Executions =====

#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "workflow_execution_status", rename_all = "snake_case")
)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Partial,
    Failed,
    Superseded,
}

#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "workflow_trigger_source", rename_all = "snake_case")
)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    EventCreated,
    Backfill,
    Manual,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workflow_id: Uuid,
    pub trigger_entity_id: Uuid,
    pub trigger_source: TriggerSource,
    pub status: ExecutionStatus,
    pub forced: bool,
    pub created_task_ids: Vec<Uuid>,
    pub created_design_item_ids: Vec<Uuid>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ===== Generated records =====

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub event_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub task_template_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub status: String, // todo, in_progress, done
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesignItem {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub event_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub design_item_type_id: Uuid,
    pub name: String,
    pub status: String, // not_started, in_design, in_production, shipped, delivered
    pub assigned_to: Option<Uuid>,
    pub production_due_date: NaiveDate,
    pub ship_date: NaiveDate,
    pub in_hand_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}
