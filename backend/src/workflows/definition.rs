// Workflow definitions: request payloads and their validation into a
// storable `WorkflowDefinition`.

use chrono::Utc;
use keystone_shared::{Workflow, WorkflowAction, WorkflowActionKind, WorkflowDefinition};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::TenantContext;
use crate::error::ApiResult;
use crate::store::Store;
use crate::validation::{string, Validator};

pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_DAY_OFFSET: i32 = 365;

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowInput {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub execution_order: i32,
    #[serde(default)]
    pub event_type_ids: Vec<Uuid>,
    #[serde(default)]
    pub actions: Vec<ActionInput>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionInput {
    pub kind: WorkflowActionKind,
    pub task_template_id: Option<Uuid>,
    pub design_item_type_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub days_before_event: Option<i32>,
    pub production_days: Option<i32>,
    pub shipping_days: Option<i32>,
}

fn check_action_shape(mut v: Validator, index: usize, action: &ActionInput) -> Validator {
    let field = |name: &str| format!("actions[{}].{}", index, name);

    match action.kind {
        WorkflowActionKind::CreateTask => {
            v = v
                .error_if(
                    action.task_template_id.is_none(),
                    &field("task_template_id"),
                    "create_task requires a task template",
                )
                .error_if(
                    action.design_item_type_id.is_some(),
                    &field("design_item_type_id"),
                    "create_task cannot reference a design item type",
                )
                .error_if(
                    action.production_days.is_some() || action.shipping_days.is_some(),
                    &field("production_days"),
                    "lead times only apply to design items",
                );
        }
        WorkflowActionKind::CreateDesignItem => {
            v = v
                .error_if(
                    action.design_item_type_id.is_none(),
                    &field("design_item_type_id"),
                    "create_design_item requires a design item type",
                )
                .error_if(
                    action.task_template_id.is_some(),
                    &field("task_template_id"),
                    "create_design_item cannot reference a task template",
                );
        }
    }

    v.in_range(action.days_before_event, &field("days_before_event"), 0, MAX_DAY_OFFSET)
        .in_range(action.production_days, &field("production_days"), 0, MAX_DAY_OFFSET)
        .in_range(action.shipping_days, &field("shipping_days"), 0, MAX_DAY_OFFSET)
}

/// Validate `input` against the tenant's catalogue and produce the definition
/// to persist. `existing` keeps identity and creation metadata on replace.
pub async fn build_definition(
    store: &dyn Store,
    ctx: &TenantContext,
    input: WorkflowInput,
    existing: Option<Workflow>,
) -> ApiResult<WorkflowDefinition> {
    let mut v = Validator::new()
        .required_string(&input.name, "name")
        .max_length(&input.name, "name", MAX_NAME_LENGTH);
    for (index, action) in input.actions.iter().enumerate() {
        v = check_action_shape(v, index, action);
    }
    v.finish()?;

    let mut event_type_ids = input.event_type_ids.clone();
    event_type_ids.sort();
    event_type_ids.dedup();

    // References must resolve inside the caller's tenant
    let mut v = Validator::new();
    let known = store.existing_event_type_ids(ctx.tenant_id, &event_type_ids).await?;
    if let Some(missing) = event_type_ids.iter().find(|id| !known.contains(id)) {
        v = v.error("event_type_ids", &format!("Unknown event type {}", missing));
    }
    for (index, action) in input.actions.iter().enumerate() {
        if let Some(id) = action.task_template_id {
            if store.get_task_template(ctx.tenant_id, id).await?.is_none() {
                v = v.error(
                    &format!("actions[{}].task_template_id", index),
                    &format!("Unknown task template {}", id),
                );
            }
        }
        if let Some(id) = action.design_item_type_id {
            if store.get_design_item_type(ctx.tenant_id, id).await?.is_none() {
                v = v.error(
                    &format!("actions[{}].design_item_type_id", index),
                    &format!("Unknown design item type {}", id),
                );
            }
        }
    }
    v.finish()?;

    let name = string::required(&input.name, "name")?;
    let now = Utc::now();
    let workflow = match existing {
        Some(current) => Workflow {
            name,
            description: string::optional(input.description),
            is_active: input.is_active,
            execution_order: input.execution_order,
            updated_at: Some(now),
            ..current
        },
        None => Workflow {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            name,
            description: string::optional(input.description),
            is_active: input.is_active,
            execution_order: input.execution_order,
            created_by: Some(ctx.user_id),
            created_at: now,
            updated_at: None,
        },
    };

    let actions = input
        .actions
        .into_iter()
        .enumerate()
        .map(|(position, action)| WorkflowAction {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            position: position as i32,
            kind: action.kind,
            task_template_id: action.task_template_id,
            design_item_type_id: action.design_item_type_id,
            assignee_id: action.assignee_id,
            days_before_event: action.days_before_event,
            production_days: action.production_days,
            shipping_days: action.shipping_days,
        })
        .collect();

    Ok(WorkflowDefinition {
        workflow,
        event_type_ids,
        actions,
    })
}
