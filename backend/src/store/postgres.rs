use std::collections::HashMap;

use async_trait::async_trait;
use keystone_shared::{
    DesignItem, DesignItemType, Event, EventType, Task, TaskTemplate, Workflow, WorkflowAction,
    WorkflowDefinition, WorkflowExecution,
};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::{EventFilter, ExecutionFilter, Page, Store, StoreError, StoreResult};
use crate::pagination::FilterClause;

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach event-type links and ordered actions to bare workflow rows
    async fn load_definitions(&self, workflows: Vec<Workflow>) -> StoreResult<Vec<WorkflowDefinition>> {
        if workflows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = workflows.iter().map(|w| w.id).collect();

        let links = sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT workflow_id, event_type_id FROM workflow_event_types WHERE workflow_id = ANY($1)"
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let actions = sqlx::query_as::<_, WorkflowAction>(
            r#"
            SELECT id, workflow_id, position, kind, task_template_id, design_item_type_id,
                   assignee_id, days_before_event, production_days, shipping_days
            FROM workflow_actions
            WHERE workflow_id = ANY($1)
            ORDER BY workflow_id, position ASC
            "#
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut types_by_workflow: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (workflow_id, event_type_id) in links {
            types_by_workflow.entry(workflow_id).or_default().push(event_type_id);
        }

        let mut actions_by_workflow: HashMap<Uuid, Vec<WorkflowAction>> = HashMap::new();
        for action in actions {
            actions_by_workflow.entry(action.workflow_id).or_default().push(action);
        }

        Ok(workflows
            .into_iter()
            .map(|workflow| {
                let mut event_type_ids = types_by_workflow.remove(&workflow.id).unwrap_or_default();
                event_type_ids.sort();
                WorkflowDefinition {
                    actions: actions_by_workflow.remove(&workflow.id).unwrap_or_default(),
                    event_type_ids,
                    workflow,
                }
            })
            .collect())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// A second completed record for the pair trips the partial unique index
async fn write_execution<'e, E>(executor: E, execution: &WorkflowExecution) -> StoreResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workflow_executions
        (id, tenant_id, workflow_id, trigger_entity_id, trigger_source, status, forced,
         created_task_ids, created_design_item_ids, error_message, started_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#
    )
    .bind(execution.id)
    .bind(execution.tenant_id)
    .bind(execution.workflow_id)
    .bind(execution.trigger_entity_id)
    .bind(execution.trigger_source)
    .bind(execution.status)
    .bind(execution.forced)
    .bind(&execution.created_task_ids)
    .bind(&execution.created_design_item_ids)
    .bind(&execution.error_message)
    .bind(execution.started_at)
    .bind(execution.completed_at)
    .execute(executor)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::Conflict(format!(
                "workflow {} already completed for event {}",
                execution.workflow_id, execution.trigger_entity_id
            ))
        } else {
            e.into()
        }
    })?;

    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }

    // ===== Event types & templates =====

    async fn list_event_types(&self, tenant_id: Uuid) -> StoreResult<Vec<EventType>> {
        let rows = sqlx::query_as::<_, EventType>(
            "SELECT * FROM event_types WHERE tenant_id = $1 ORDER BY name ASC"
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn insert_event_type(&self, event_type: &EventType) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO event_types (id, tenant_id, name, description, created_at) VALUES ($1, $2, $3, $4, $5)"
        )
        .bind(event_type.id)
        .bind(event_type.tenant_id)
        .bind(&event_type.name)
        .bind(&event_type.description)
        .bind(event_type.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("event type '{}' already exists", event_type.name))
            } else {
                e.into()
            }
        })?;

        Ok(())
    }

    async fn existing_event_type_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> StoreResult<Vec<Uuid>> {
        let found = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM event_types WHERE tenant_id = $1 AND id = ANY($2)"
        )
        .bind(tenant_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(found)
    }

    async fn list_task_templates(&self, tenant_id: Uuid) -> StoreResult<Vec<TaskTemplate>> {
        let rows = sqlx::query_as::<_, TaskTemplate>(
            "SELECT * FROM task_templates WHERE tenant_id = $1 ORDER BY name ASC"
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn get_task_template(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<TaskTemplate>> {
        let row = sqlx::query_as::<_, TaskTemplate>(
            "SELECT * FROM task_templates WHERE tenant_id = $1 AND id = $2"
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert_task_template(&self, template: &TaskTemplate) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO task_templates
            (id, tenant_id, name, description, priority, default_assignee_id, default_days_before_event, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#
        )
        .bind(template.id)
        .bind(template.tenant_id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.priority)
        .bind(template.default_assignee_id)
        .bind(template.default_days_before_event)
        .bind(template.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_design_item_types(&self, tenant_id: Uuid) -> StoreResult<Vec<DesignItemType>> {
        let rows = sqlx::query_as::<_, DesignItemType>(
            "SELECT * FROM design_item_types WHERE tenant_id = $1 ORDER BY name ASC"
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn get_design_item_type(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<DesignItemType>> {
        let row = sqlx::query_as::<_, DesignItemType>(
            "SELECT * FROM design_item_types WHERE tenant_id = $1 AND id = $2"
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert_design_item_type(&self, item_type: &DesignItemType) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO design_item_types
            (id, tenant_id, name, description, default_production_days, default_shipping_days, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#
        )
        .bind(item_type.id)
        .bind(item_type.tenant_id)
        .bind(&item_type.name)
        .bind(&item_type.description)
        .bind(item_type.default_production_days)
        .bind(item_type.default_shipping_days)
        .bind(item_type.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ===== Workflow definitions =====

    async fn list_workflows(&self, tenant_id: Uuid, active_only: bool) -> StoreResult<Vec<WorkflowDefinition>> {
        let workflows = sqlx::query_as::<_, Workflow>(
            r#"
            SELECT id, tenant_id, name, description, is_active, execution_order,
                   created_by, created_at, updated_at
            FROM workflows
            WHERE tenant_id = $1 AND ($2 = false OR is_active = true)
            ORDER BY execution_order ASC, name ASC
            "#
        )
        .bind(tenant_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        self.load_definitions(workflows).await
    }

    async fn get_workflow(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<WorkflowDefinition>> {
        let workflow = sqlx::query_as::<_, Workflow>(
            r#"
            SELECT id, tenant_id, name, description, is_active, execution_order,
                   created_by, created_at, updated_at
            FROM workflows
            WHERE tenant_id = $1 AND id = $2
            "#
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match workflow {
            Some(w) => Ok(self.load_definitions(vec![w]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn save_workflow(&self, definition: &WorkflowDefinition) -> StoreResult<()> {
        let workflow = &definition.workflow;
        let mut tx = self.pool.begin().await?;

        let written = sqlx::query(
            r#"
            INSERT INTO workflows
            (id, tenant_id, name, description, is_active, execution_order, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                is_active = EXCLUDED.is_active,
                execution_order = EXCLUDED.execution_order,
                updated_at = EXCLUDED.updated_at
            WHERE workflows.tenant_id = EXCLUDED.tenant_id
            "#
        )
        .bind(workflow.id)
        .bind(workflow.tenant_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.is_active)
        .bind(workflow.execution_order)
        .bind(workflow.created_by)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&mut *tx)
        .await?;

        if written.rows_affected() == 0 {
            return Err(StoreError::NotFound("Workflow".to_string()));
        }

        sqlx::query("DELETE FROM workflow_event_types WHERE workflow_id = $1")
            .bind(workflow.id)
            .execute(&mut *tx)
            .await?;

        for event_type_id in &definition.event_type_ids {
            sqlx::query(
                "INSERT INTO workflow_event_types (workflow_id, event_type_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            )
            .bind(workflow.id)
            .bind(event_type_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM workflow_actions WHERE workflow_id = $1")
            .bind(workflow.id)
            .execute(&mut *tx)
            .await?;

        for action in &definition.actions {
            sqlx::query(
                r#"
                INSERT INTO workflow_actions
                (id, workflow_id, position, kind, task_template_id, design_item_type_id,
                 assignee_id, days_before_event, production_days, shipping_days)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#
            )
            .bind(action.id)
            .bind(workflow.id)
            .bind(action.position)
            .bind(action.kind)
            .bind(action.task_template_id)
            .bind(action.design_item_type_id)
            .bind(action.assignee_id)
            .bind(action.days_before_event)
            .bind(action.production_days)
            .bind(action.shipping_days)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_workflow(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ===== Events =====

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO events
            (id, tenant_id, name, event_type_id, start_date, end_date, account_id, contact_id,
             status, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#
        )
        .bind(event.id)
        .bind(event.tenant_id)
        .bind(&event.name)
        .bind(event.event_type_id)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.account_id)
        .bind(event.contact_id)
        .bind(&event.status)
        .bind(event.created_by)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_event(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Event>> {
        let row = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list_events(&self, tenant_id: Uuid, filter: &EventFilter, page: Page) -> StoreResult<(Vec<Event>, i64)> {
        let mut clause = FilterClause::after(1);
        clause
            .push_if("event_type_id = ANY({})", &filter.event_type_ids)
            .push_if("id = ANY({})", &filter.event_ids)
            .push_if("start_date >= {}", &filter.starting_on_or_after);

        let where_sql = format!("WHERE tenant_id = $1{}", clause.sql());
        let (limit, offset) = clause.limit_offset();
        let list_sql = format!(
            "SELECT * FROM events {} ORDER BY start_date ASC, created_at ASC LIMIT ${} OFFSET ${}",
            where_sql, limit, offset
        );
        let count_sql = format!("SELECT COUNT(*) FROM events {}", where_sql);

        let mut list = sqlx::query_as::<_, Event>(&list_sql).bind(tenant_id);
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(tenant_id);
        if let Some(types) = &filter.event_type_ids {
            list = list.bind(types);
            count = count.bind(types);
        }
        if let Some(ids) = &filter.event_ids {
            list = list.bind(ids);
            count = count.bind(ids);
        }
        if let Some(from) = filter.starting_on_or_after {
            list = list.bind(from);
            count = count.bind(from);
        }

        let events = list
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        let total = count.fetch_one(&self.pool).await?;

        Ok((events, total))
    }

    // ===== Generated records =====

    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks
            (id, tenant_id, event_id, workflow_id, task_template_id, title, description,
             priority, status, assigned_to, due_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#
        )
        .bind(task.id)
        .bind(task.tenant_id)
        .bind(task.event_id)
        .bind(task.workflow_id)
        .bind(task.task_template_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.priority)
        .bind(&task.status)
        .bind(task.assigned_to)
        .bind(task.due_date)
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_task(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_tasks_for_event(&self, tenant_id: Uuid, event_id: Uuid) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE tenant_id = $1 AND event_id = $2 ORDER BY due_date ASC NULLS LAST, created_at ASC"
        )
        .bind(tenant_id)
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn insert_design_item(&self, item: &DesignItem) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO design_items
            (id, tenant_id, event_id, workflow_id, design_item_type_id, name, status, assigned_to,
             production_due_date, ship_date, in_hand_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#
        )
        .bind(item.id)
        .bind(item.tenant_id)
        .bind(item.event_id)
        .bind(item.workflow_id)
        .bind(item.design_item_type_id)
        .bind(&item.name)
        .bind(&item.status)
        .bind(item.assigned_to)
        .bind(item.production_due_date)
        .bind(item.ship_date)
        .bind(item.in_hand_date)
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_design_item(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM design_items WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_design_items_for_event(&self, tenant_id: Uuid, event_id: Uuid) -> StoreResult<Vec<DesignItem>> {
        let rows = sqlx::query_as::<_, DesignItem>(
            "SELECT * FROM design_items WHERE tenant_id = $1 AND event_id = $2 ORDER BY production_due_date ASC"
        )
        .bind(tenant_id)
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ===== Executions =====

    async fn find_completed_execution(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<WorkflowExecution>> {
        let row = sqlx::query_as::<_, WorkflowExecution>(
            r#"
            SELECT * FROM workflow_executions
            WHERE tenant_id = $1 AND workflow_id = $2 AND trigger_entity_id = $3 AND status = 'completed'
            LIMIT 1
            "#
        )
        .bind(tenant_id)
        .bind(workflow_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        write_execution(&self.pool, execution).await
    }

    async fn replace_completed_execution(&self, execution: &WorkflowExecution) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let superseded = sqlx::query(
            r#"
            UPDATE workflow_executions SET status = 'superseded'
            WHERE tenant_id = $1 AND workflow_id = $2 AND trigger_entity_id = $3 AND status = 'completed'
            "#
        )
        .bind(execution.tenant_id)
        .bind(execution.workflow_id)
        .bind(execution.trigger_entity_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // Dropping the transaction on error restores the superseded rows
        write_execution(&mut *tx, execution).await?;
        tx.commit().await?;

        Ok(superseded)
    }

    async fn list_executions(
        &self,
        tenant_id: Uuid,
        filter: &ExecutionFilter,
        page: Page,
    ) -> StoreResult<(Vec<WorkflowExecution>, i64)> {
        let mut clause = FilterClause::after(1);
        clause
            .push_if("workflow_id = {}", &filter.workflow_id)
            .push_if("trigger_entity_id = {}", &filter.trigger_entity_id)
            .push_if("status = {}", &filter.status);

        let where_sql = format!("WHERE tenant_id = $1{}", clause.sql());
        let (limit, offset) = clause.limit_offset();
        let list_sql = format!(
            "SELECT * FROM workflow_executions {} ORDER BY started_at DESC LIMIT ${} OFFSET ${}",
            where_sql, limit, offset
        );
        let count_sql = format!("SELECT COUNT(*) FROM workflow_executions {}", where_sql);

        let mut list = sqlx::query_as::<_, WorkflowExecution>(&list_sql).bind(tenant_id);
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(tenant_id);
        if let Some(workflow_id) = filter.workflow_id {
            list = list.bind(workflow_id);
            count = count.bind(workflow_id);
        }
        if let Some(event_id) = filter.trigger_entity_id {
            list = list.bind(event_id);
            count = count.bind(event_id);
        }
        if let Some(status) = filter.status {
            list = list.bind(status);
            count = count.bind(status);
        }

        let executions = list
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        let total = count.fetch_one(&self.pool).await?;

        Ok((executions, total))
    }
}
