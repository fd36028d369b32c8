// Workflow Engine - trigger entry points: event creation, manual re-runs
// and applying workflows to events that already exist.

use chrono::{NaiveDate, Utc};
use keystone_shared::{Event, ExecutionStatus, TriggerSource, WorkflowDefinition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::executor::{ExecutionRequest, RunOutcome, WorkflowExecutor, WorkflowRun};
use super::matcher::matching_workflows;
use super::{WorkflowError, WorkflowResult};
use crate::config::WorkflowConfig;
use crate::store::{EventFilter, Page, Store};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplyOptions {
    /// Re-run even where a completed execution exists
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub include_past_events: bool,
    #[serde(default)]
    pub dry_run: bool,
    /// Restrict to these events
    pub event_ids: Option<Vec<Uuid>>,
    /// Cut-off for "past" events, today (UTC) when absent
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub events_considered: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub would_apply: usize,
    /// More events matched than a single call may examine
    pub truncated: bool,
    pub runs: Vec<WorkflowRun>,
}

impl ApplyReport {
    fn record(&mut self, run: WorkflowRun) {
        match &run.outcome {
            RunOutcome::Executed { execution } if execution.status == ExecutionStatus::Completed => {
                self.applied += 1
            }
            RunOutcome::Executed { .. } | RunOutcome::Error { .. } => self.failed += 1,
            RunOutcome::Skipped { .. } => self.skipped += 1,
            RunOutcome::WouldApply { .. } => self.would_apply += 1,
        }
        self.runs.push(run);
    }
}

pub struct WorkflowEngine {
    store: Arc<dyn Store>,
    executor: WorkflowExecutor,
    config: WorkflowConfig,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn Store>, config: WorkflowConfig) -> Self {
        Self {
            executor: WorkflowExecutor::new(store.clone()),
            store,
            config,
        }
    }

    /// Run every matching active workflow for a freshly created event.
    ///
    /// Never fails: problems are reported per workflow so event creation
    /// itself is unaffected.
    pub async fn on_event_created(&self, tenant_id: Uuid, event: &Event) -> Vec<WorkflowRun> {
        let definitions = match self.store.list_workflows(tenant_id, true).await {
            Ok(definitions) => definitions,
            Err(e) => {
                error!("Failed to load workflows for event {}: {}", event.id, e);
                return Vec::new();
            }
        };

        let matched = matching_workflows(&definitions, event.event_type_id);
        if matched.is_empty() {
            return Vec::new();
        }
        info!("Event {} matched {} workflow(s)", event.id, matched.len());

        self.run_all(tenant_id, &matched, event, TriggerSource::EventCreated, false)
            .await
    }

    /// Manually re-run the matching workflows for one event
    pub async fn run_for_event(&self, tenant_id: Uuid, event_id: Uuid, force: bool) -> WorkflowResult<Vec<WorkflowRun>> {
        let event = self
            .store
            .get_event(tenant_id, event_id)
            .await?
            .ok_or(WorkflowError::EventNotFound(event_id))?;

        let definitions = self.store.list_workflows(tenant_id, true).await?;
        let matched = matching_workflows(&definitions, event.event_type_id);

        Ok(self
            .run_all(tenant_id, &matched, &event, TriggerSource::Manual, force)
            .await)
    }

    async fn run_all(
        &self,
        tenant_id: Uuid,
        workflows: &[&WorkflowDefinition],
        event: &Event,
        source: TriggerSource,
        force: bool,
    ) -> Vec<WorkflowRun> {
        let mut runs = Vec::with_capacity(workflows.len());
        for &workflow in workflows {
            let request = ExecutionRequest {
                tenant_id,
                workflow,
                event,
                source,
                force,
                dry_run: false,
            };
            runs.push(self.execute_reporting_errors(request).await);
        }
        runs
    }

    async fn execute_reporting_errors(&self, request: ExecutionRequest<'_>) -> WorkflowRun {
        match self.executor.execute(request).await {
            Ok(run) => run,
            Err(e) => {
                error!(
                    "Workflow {} could not run for event {}: {}",
                    request.workflow.id(),
                    request.event.id,
                    e
                );
                WorkflowRun {
                    workflow_id: request.workflow.id(),
                    workflow_name: request.workflow.workflow.name.clone(),
                    event_id: request.event.id,
                    outcome: RunOutcome::Error { message: e.to_string() },
                }
            }
        }
    }

    /// Apply one workflow to events that already exist
    pub async fn apply_to_existing_events(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
        options: &ApplyOptions,
    ) -> WorkflowResult<ApplyReport> {
        let workflow = self
            .store
            .get_workflow(tenant_id, workflow_id)
            .await?
            .ok_or(WorkflowError::WorkflowNotFound(workflow_id))?;
        if !workflow.workflow.is_active {
            return Err(WorkflowError::WorkflowInactive(workflow_id));
        }

        self.backfill(tenant_id, &workflow, options).await
    }

    /// Apply every active workflow to existing events, one report each
    pub async fn apply_all_to_existing_events(
        &self,
        tenant_id: Uuid,
        options: &ApplyOptions,
    ) -> WorkflowResult<Vec<ApplyReport>> {
        let definitions = self.store.list_workflows(tenant_id, true).await?;
        let mut reports = Vec::with_capacity(definitions.len());
        for workflow in &definitions {
            reports.push(self.backfill(tenant_id, workflow, options).await?);
        }
        Ok(reports)
    }

    async fn backfill(
        &self,
        tenant_id: Uuid,
        workflow: &WorkflowDefinition,
        options: &ApplyOptions,
    ) -> WorkflowResult<ApplyReport> {
        let mut report = ApplyReport {
            workflow_id: workflow.id(),
            workflow_name: workflow.workflow.name.clone(),
            ..ApplyReport::default()
        };
        if workflow.event_type_ids.is_empty() {
            return Ok(report);
        }

        let filter = EventFilter {
            event_type_ids: Some(workflow.event_type_ids.clone()),
            event_ids: options.event_ids.clone(),
            starting_on_or_after: if options.include_past_events {
                None
            } else {
                Some(options.as_of.unwrap_or_else(|| Utc::now().date_naive()))
            },
        };
        let (events, total) = self
            .store
            .list_events(tenant_id, &filter, Page::first(self.config.backfill_max_events))
            .await?;

        report.events_considered = events.len();
        report.truncated = total > events.len() as i64;

        info!(
            "Applying workflow {} to {} existing event(s){}",
            workflow.id(),
            events.len(),
            if options.dry_run { " (dry run)" } else { "" }
        );

        for event in &events {
            let request = ExecutionRequest {
                tenant_id,
                workflow,
                event,
                source: TriggerSource::Backfill,
                force: options.force,
                dry_run: options.dry_run,
            };
            report.record(self.execute_reporting_errors(request).await);
        }

        info!(
            "Workflow {} backfill done: {} applied, {} skipped, {} failed",
            workflow.id(),
            report.applied,
            report.skipped,
            report.failed
        );
        Ok(report)
    }
}
