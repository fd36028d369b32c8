// Workflow Executor - applies one workflow to one event

use chrono::Utc;
use keystone_shared::{
    DesignItem, Event, ExecutionStatus, Task, TriggerSource, WorkflowAction, WorkflowActionKind,
    WorkflowDefinition, WorkflowExecution,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::scheduling::{plan_design_item, plan_task};
use super::{WorkflowError, WorkflowResult};
use crate::store::{Store, StoreError};

pub const TASK_STATUS_TODO: &str = "todo";
pub const DESIGN_ITEM_STATUS_NOT_STARTED: &str = "not_started";

/// What to run and how
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub tenant_id: Uuid,
    pub workflow: &'a WorkflowDefinition,
    pub event: &'a Event,
    pub source: TriggerSource,
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Actions ran and an execution record was written (any status)
    Executed { execution: WorkflowExecution },
    /// A completed run already exists for the pair
    Skipped { existing_execution_id: Uuid },
    WouldApply { task_count: usize, design_item_count: usize },
    /// The run could not be attempted at all
    Error { message: String },
}

/// Outcome of one (workflow, event) pair, as reported to API callers
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkflowRun {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub event_id: Uuid,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

impl WorkflowRun {
    pub fn status(&self) -> Option<ExecutionStatus> {
        match &self.outcome {
            RunOutcome::Executed { execution } => Some(execution.status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Created {
    Task(Uuid),
    DesignItem(Uuid),
}

pub struct WorkflowExecutor {
    store: Arc<dyn Store>,
}

impl WorkflowExecutor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Run one workflow against one event.
    ///
    /// Only bookkeeping failures (tenant mismatch, store errors while
    /// checking or recording) come back as `Err`; a failing action produces
    /// an `Executed` outcome carrying a failed or partial record.
    pub async fn execute(&self, request: ExecutionRequest<'_>) -> WorkflowResult<WorkflowRun> {
        let ExecutionRequest { tenant_id, workflow, event, .. } = request;

        if workflow.workflow.tenant_id != tenant_id {
            return Err(WorkflowError::WorkflowNotFound(workflow.id()));
        }
        if event.tenant_id != tenant_id {
            return Err(WorkflowError::EventNotFound(event.id));
        }

        let run = |outcome: RunOutcome| WorkflowRun {
            workflow_id: workflow.id(),
            workflow_name: workflow.workflow.name.clone(),
            event_id: event.id,
            outcome,
        };

        if !request.force {
            if let Some(existing) = self
                .store
                .find_completed_execution(tenant_id, workflow.id(), event.id)
                .await?
            {
                info!(
                    "Workflow {} already completed for event {}, skipping",
                    workflow.id(),
                    event.id
                );
                return Ok(run(RunOutcome::Skipped {
                    existing_execution_id: existing.id,
                }));
            }
        }

        if request.dry_run {
            let task_count = workflow
                .actions
                .iter()
                .filter(|a| a.kind == WorkflowActionKind::CreateTask)
                .count();
            return Ok(run(RunOutcome::WouldApply {
                task_count,
                design_item_count: workflow.actions.len() - task_count,
            }));
        }

        let started_at = Utc::now();
        let mut created = Vec::with_capacity(workflow.actions.len());
        let mut failure = None;

        for action in &workflow.actions {
            match self.apply_action(tenant_id, workflow, event, action).await {
                Ok(record) => created.push(record),
                Err(e) => {
                    error!(
                        "Workflow {} action {} failed for event {}: {}",
                        workflow.id(),
                        action.position,
                        event.id,
                        e
                    );
                    failure = Some(e);
                    break;
                }
            }
        }

        let mut execution = WorkflowExecution {
            id: Uuid::new_v4(),
            tenant_id,
            workflow_id: workflow.id(),
            trigger_entity_id: event.id,
            trigger_source: request.source,
            status: ExecutionStatus::Completed,
            forced: request.force,
            created_task_ids: Vec::new(),
            created_design_item_ids: Vec::new(),
            error_message: None,
            started_at,
            completed_at: None,
        };

        if let Some(e) = failure {
            let residual = self.rollback(tenant_id, &created).await;
            execution.status = if residual.is_empty() {
                ExecutionStatus::Failed
            } else {
                ExecutionStatus::Partial
            };
            fill_ids(&mut execution, &residual);
            execution.error_message = Some(e.to_string());
            execution.completed_at = Some(Utc::now());
            if let Err(record_error) = self.store.insert_execution(&execution).await {
                report_untracked(&execution, &residual);
                return Err(record_error.into());
            }
            return Ok(run(RunOutcome::Executed { execution }));
        }

        fill_ids(&mut execution, &created);
        execution.completed_at = Some(Utc::now());

        let recorded = if request.force {
            self.store.replace_completed_execution(&execution).await
        } else {
            self.store.insert_execution(&execution).await.map(|()| 0)
        };

        match recorded {
            Ok(superseded) => {
                if superseded > 0 {
                    info!(
                        "Superseded {} completed execution(s) of workflow {} for event {}",
                        superseded,
                        workflow.id(),
                        event.id
                    );
                }
                info!(
                    "Workflow {} completed for event {}: {} task(s), {} design item(s)",
                    workflow.id(),
                    event.id,
                    execution.created_task_ids.len(),
                    execution.created_design_item_ids.len()
                );
                Ok(run(RunOutcome::Executed { execution }))
            }
            Err(StoreError::Conflict(_)) => {
                // Lost a race with a concurrent run of the same pair
                warn!(
                    "Concurrent completion of workflow {} for event {}, discarding this run",
                    workflow.id(),
                    event.id
                );
                let residual = self.rollback(tenant_id, &created).await;
                report_untracked(&execution, &residual);
                let existing = self
                    .store
                    .find_completed_execution(tenant_id, workflow.id(), event.id)
                    .await?;
                match existing {
                    Some(existing) => Ok(run(RunOutcome::Skipped {
                        existing_execution_id: existing.id,
                    })),
                    None => Err(StoreError::Conflict(format!(
                        "workflow {} completion for event {} could not be recorded",
                        workflow.id(),
                        event.id
                    ))
                    .into()),
                }
            }
            Err(e) => {
                error!(
                    "Could not record run of workflow {} for event {}: {}",
                    workflow.id(),
                    event.id,
                    e
                );
                let residual = self.rollback(tenant_id, &created).await;
                report_untracked(&execution, &residual);
                Err(e.into())
            }
        }
    }

    async fn apply_action(
        &self,
        tenant_id: Uuid,
        workflow: &WorkflowDefinition,
        event: &Event,
        action: &WorkflowAction,
    ) -> WorkflowResult<Created> {
        match action.kind {
            WorkflowActionKind::CreateTask => {
                let template_id = action.task_template_id.ok_or_else(|| WorkflowError::InvalidAction {
                    position: action.position,
                    reason: "no task template configured".to_string(),
                })?;
                let template = self
                    .store
                    .get_task_template(tenant_id, template_id)
                    .await?
                    .ok_or(WorkflowError::MissingTemplate {
                        kind: "Task template",
                        id: template_id,
                        position: action.position,
                    })?;

                let plan = plan_task(event, action, &template);
                let task = Task {
                    id: Uuid::new_v4(),
                    tenant_id,
                    event_id: event.id,
                    workflow_id: Some(workflow.id()),
                    task_template_id: Some(template.id),
                    title: template.name.clone(),
                    description: template.description.clone(),
                    priority: template.priority.clone(),
                    status: TASK_STATUS_TODO.to_string(),
                    assigned_to: plan.assigned_to,
                    due_date: plan.due_date,
                    created_at: Utc::now(),
                };
                self.store.insert_task(&task).await?;
                Ok(Created::Task(task.id))
            }
            WorkflowActionKind::CreateDesignItem => {
                let type_id = action.design_item_type_id.ok_or_else(|| WorkflowError::InvalidAction {
                    position: action.position,
                    reason: "no design item type configured".to_string(),
                })?;
                let item_type = self
                    .store
                    .get_design_item_type(tenant_id, type_id)
                    .await?
                    .ok_or(WorkflowError::MissingTemplate {
                        kind: "Design item type",
                        id: type_id,
                        position: action.position,
                    })?;

                let plan = plan_design_item(event, action, &item_type);
                let item = DesignItem {
                    id: Uuid::new_v4(),
                    tenant_id,
                    event_id: event.id,
                    workflow_id: Some(workflow.id()),
                    design_item_type_id: item_type.id,
                    name: format!("{} - {}", item_type.name, event.name),
                    status: DESIGN_ITEM_STATUS_NOT_STARTED.to_string(),
                    assigned_to: plan.assigned_to,
                    production_due_date: plan.production_due_date,
                    ship_date: plan.ship_date,
                    in_hand_date: plan.in_hand_date,
                    created_at: Utc::now(),
                };
                self.store.insert_design_item(&item).await?;
                Ok(Created::DesignItem(item.id))
            }
        }
    }

    /// Best-effort removal in reverse creation order; returns what could not be removed
    async fn rollback(&self, tenant_id: Uuid, created: &[Created]) -> Vec<Created> {
        let mut residual = Vec::new();
        for record in created.iter().rev() {
            let result = match record {
                Created::Task(id) => self.store.delete_task(tenant_id, *id).await,
                Created::DesignItem(id) => self.store.delete_design_item(tenant_id, *id).await,
            };
            if let Err(e) = result {
                warn!("Rollback could not remove {:?}: {}", record, e);
                residual.push(*record);
            }
        }
        residual.reverse();
        residual
    }
}

/// Records that survived rollback with no execution record pointing at them
fn report_untracked(execution: &WorkflowExecution, residual: &[Created]) {
    if !residual.is_empty() {
        warn!(
            "{} record(s) of workflow {} for event {} left behind untracked: {:?}",
            residual.len(),
            execution.workflow_id,
            execution.trigger_entity_id,
            residual
        );
    }
}

fn fill_ids(execution: &mut WorkflowExecution, records: &[Created]) {
    for record in records {
        match record {
            Created::Task(id) => execution.created_task_ids.push(*id),
            Created::DesignItem(id) => execution.created_design_item_ids.push(*id),
        }
    }
}
