// In-memory store backing the test suite, with switchable write failures
// for exercising rollback paths.

use async_trait::async_trait;
use keystone_shared::{
    DesignItem, DesignItemType, Event, EventType, ExecutionStatus, Task, TaskTemplate,
    WorkflowDefinition, WorkflowExecution,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{EventFilter, ExecutionFilter, Page, Store, StoreError, StoreResult};

/// Writes that should fail on the next attempts
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Fail task inserts once this many tasks have been written successfully
    pub fail_task_insert_after: Option<usize>,
    pub fail_design_item_inserts: bool,
    pub fail_deletes: bool,
    pub fail_execution_inserts: bool,
    /// Another run completes the same pair just before the next completed
    /// record is written, as if it won a race past the skip check
    pub concurrent_completion: bool,
}

#[derive(Default)]
struct State {
    event_types: Vec<EventType>,
    task_templates: Vec<TaskTemplate>,
    design_item_types: Vec<DesignItemType>,
    workflows: Vec<WorkflowDefinition>,
    events: Vec<Event>,
    tasks: Vec<Task>,
    design_items: Vec<DesignItem>,
    executions: Vec<WorkflowExecution>,
    faults: Faults,
    tasks_written: usize,
}

/// `existing` is a completed run of the same (workflow, event) pair as `execution`
fn completes_same_pair(existing: &WorkflowExecution, execution: &WorkflowExecution) -> bool {
    existing.tenant_id == execution.tenant_id
        && existing.workflow_id == execution.workflow_id
        && existing.trigger_entity_id == execution.trigger_entity_id
        && existing.status == ExecutionStatus::Completed
}

impl State {
    fn record_execution(&mut self, execution: &WorkflowExecution) -> StoreResult<()> {
        if self.faults.fail_execution_inserts {
            return Err(injected("insert execution"));
        }
        if execution.status != ExecutionStatus::Completed {
            self.executions.push(execution.clone());
            return Ok(());
        }
        if std::mem::take(&mut self.faults.concurrent_completion) {
            self.executions.push(WorkflowExecution {
                id: Uuid::new_v4(),
                created_task_ids: Vec::new(),
                created_design_item_ids: Vec::new(),
                ..execution.clone()
            });
        }
        if self.executions.iter().any(|e| completes_same_pair(e, execution)) {
            return Err(StoreError::Conflict(format!(
                "workflow {} already completed for event {}",
                execution.workflow_id, execution.trigger_entity_id
            )));
        }
        self.executions.push(execution.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

fn injected(what: &str) -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(format!("injected failure: {}", what)))
}

fn paginate<T>(rows: Vec<T>, page: Page) -> (Vec<T>, i64) {
    let total = rows.len() as i64;
    let data = rows
        .into_iter()
        .skip(page.offset.max(0) as usize)
        .take(page.limit.max(0) as usize)
        .collect();
    (data, total)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn inject_faults(&self, faults: Faults) {
        let mut state = self.state.write().await;
        state.faults = faults;
        state.tasks_written = 0;
    }

    pub async fn task_count(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    pub async fn design_item_count(&self) -> usize {
        self.state.read().await.design_items.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> bool {
        true
    }

    async fn list_event_types(&self, tenant_id: Uuid) -> StoreResult<Vec<EventType>> {
        let state = self.state.read().await;
        let mut rows: Vec<EventType> = state
            .event_types
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn insert_event_type(&self, event_type: &EventType) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state
            .event_types
            .iter()
            .any(|t| t.tenant_id == event_type.tenant_id && t.name == event_type.name)
        {
            return Err(StoreError::Conflict(format!(
                "event type '{}' already exists",
                event_type.name
            )));
        }
        state.event_types.push(event_type.clone());
        Ok(())
    }

    async fn existing_event_type_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> StoreResult<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .event_types
            .iter()
            .filter(|t| t.tenant_id == tenant_id && ids.contains(&t.id))
            .map(|t| t.id)
            .collect())
    }

    async fn list_task_templates(&self, tenant_id: Uuid) -> StoreResult<Vec<TaskTemplate>> {
        let state = self.state.read().await;
        Ok(state
            .task_templates
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn get_task_template(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<TaskTemplate>> {
        let state = self.state.read().await;
        Ok(state
            .task_templates
            .iter()
            .find(|t| t.tenant_id == tenant_id && t.id == id)
            .cloned())
    }

    async fn insert_task_template(&self, template: &TaskTemplate) -> StoreResult<()> {
        self.state.write().await.task_templates.push(template.clone());
        Ok(())
    }

    async fn list_design_item_types(&self, tenant_id: Uuid) -> StoreResult<Vec<DesignItemType>> {
        let state = self.state.read().await;
        Ok(state
            .design_item_types
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn get_design_item_type(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<DesignItemType>> {
        let state = self.state.read().await;
        Ok(state
            .design_item_types
            .iter()
            .find(|t| t.tenant_id == tenant_id && t.id == id)
            .cloned())
    }

    async fn insert_design_item_type(&self, item_type: &DesignItemType) -> StoreResult<()> {
        self.state.write().await.design_item_types.push(item_type.clone());
        Ok(())
    }

    async fn list_workflows(&self, tenant_id: Uuid, active_only: bool) -> StoreResult<Vec<WorkflowDefinition>> {
        let state = self.state.read().await;
        let mut rows: Vec<WorkflowDefinition> = state
            .workflows
            .iter()
            .filter(|d| d.workflow.tenant_id == tenant_id)
            .filter(|d| !active_only || d.workflow.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.workflow.execution_order, &a.workflow.name)
                .cmp(&(b.workflow.execution_order, &b.workflow.name))
        });
        Ok(rows)
    }

    async fn get_workflow(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<WorkflowDefinition>> {
        let state = self.state.read().await;
        Ok(state
            .workflows
            .iter()
            .find(|d| d.workflow.tenant_id == tenant_id && d.workflow.id == id)
            .cloned())
    }

    async fn save_workflow(&self, definition: &WorkflowDefinition) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let position = state
            .workflows
            .iter()
            .position(|d| d.workflow.id == definition.workflow.id);
        match position {
            Some(i) if state.workflows[i].workflow.tenant_id != definition.workflow.tenant_id => {
                Err(StoreError::NotFound("Workflow".to_string()))
            }
            Some(i) => {
                state.workflows[i] = definition.clone();
                Ok(())
            }
            None => {
                state.workflows.push(definition.clone());
                Ok(())
            }
        }
    }

    async fn delete_workflow(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let before = state.workflows.len();
        state
            .workflows
            .retain(|d| !(d.workflow.tenant_id == tenant_id && d.workflow.id == id));
        let removed = state.workflows.len() < before;
        if removed {
            state.executions.retain(|e| e.workflow_id != id);
        }
        Ok(removed)
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        self.state.write().await.events.push(event.clone());
        Ok(())
    }

    async fn get_event(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Event>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .find(|e| e.tenant_id == tenant_id && e.id == id)
            .cloned())
    }

    async fn list_events(&self, tenant_id: Uuid, filter: &EventFilter, page: Page) -> StoreResult<(Vec<Event>, i64)> {
        let state = self.state.read().await;
        let mut rows: Vec<Event> = state
            .events
            .iter()
            .filter(|e| e.tenant_id == tenant_id && filter.matches(e))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.start_date, a.created_at).cmp(&(b.start_date, b.created_at)));
        Ok(paginate(rows, page))
    }

    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(limit) = state.faults.fail_task_insert_after {
            if state.tasks_written >= limit {
                return Err(injected("insert task"));
            }
        }
        state.tasks_written += 1;
        state.tasks.push(task.clone());
        Ok(())
    }

    async fn delete_task(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.faults.fail_deletes {
            return Err(injected("delete task"));
        }
        let before = state.tasks.len();
        state.tasks.retain(|t| !(t.tenant_id == tenant_id && t.id == id));
        Ok(state.tasks.len() < before)
    }

    async fn list_tasks_for_event(&self, tenant_id: Uuid, event_id: Uuid) -> StoreResult<Vec<Task>> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.tenant_id == tenant_id && t.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn insert_design_item(&self, item: &DesignItem) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.faults.fail_design_item_inserts {
            return Err(injected("insert design item"));
        }
        state.design_items.push(item.clone());
        Ok(())
    }

    async fn delete_design_item(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.faults.fail_deletes {
            return Err(injected("delete design item"));
        }
        let before = state.design_items.len();
        state
            .design_items
            .retain(|d| !(d.tenant_id == tenant_id && d.id == id));
        Ok(state.design_items.len() < before)
    }

    async fn list_design_items_for_event(&self, tenant_id: Uuid, event_id: Uuid) -> StoreResult<Vec<DesignItem>> {
        let state = self.state.read().await;
        Ok(state
            .design_items
            .iter()
            .filter(|d| d.tenant_id == tenant_id && d.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn find_completed_execution(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<WorkflowExecution>> {
        let state = self.state.read().await;
        Ok(state
            .executions
            .iter()
            .find(|e| {
                e.tenant_id == tenant_id
                    && e.workflow_id == workflow_id
                    && e.trigger_entity_id == event_id
                    && e.status == ExecutionStatus::Completed
            })
            .cloned())
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.record_execution(execution)
    }

    async fn replace_completed_execution(&self, execution: &WorkflowExecution) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let previous: Vec<usize> = state
            .executions
            .iter()
            .enumerate()
            .filter(|(_, e)| completes_same_pair(e, execution))
            .map(|(i, _)| i)
            .collect();
        for &i in &previous {
            state.executions[i].status = ExecutionStatus::Superseded;
        }

        match state.record_execution(execution) {
            Ok(()) => Ok(previous.len() as u64),
            Err(e) => {
                for &i in &previous {
                    state.executions[i].status = ExecutionStatus::Completed;
                }
                Err(e)
            }
        }
    }

    async fn list_executions(
        &self,
        tenant_id: Uuid,
        filter: &ExecutionFilter,
        page: Page,
    ) -> StoreResult<(Vec<WorkflowExecution>, i64)> {
        let state = self.state.read().await;
        let mut rows: Vec<WorkflowExecution> = state
            .executions
            .iter()
            .filter(|e| e.tenant_id == tenant_id && filter.matches(e))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(paginate(rows, page))
    }
}
