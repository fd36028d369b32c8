//! Workflow Automation Handlers
//!
//! Definition CRUD, apply-to-existing-events and execution history.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use keystone_shared::{ExecutionStatus, WorkflowDefinition, WorkflowExecution};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::optional_json;
use crate::auth::TenantContext;
use crate::error::{ApiResult, AppError};
use crate::pagination::{default_page, default_per_page, PaginatedResponse, PaginationParams};
use crate::store::ExecutionFilter;
use crate::workflows::{build_definition, ApplyOptions, ApplyReport, WorkflowInput};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecutionQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
    pub workflow_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
}

impl ExecutionQuery {
    fn pagination(&self) -> PaginationParams {
        PaginationParams::new(self.page, self.per_page)
    }
}

// ==================== Routes ====================

pub fn workflow_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_workflows).post(create_workflow))
        .route("/apply-existing", post(apply_all_workflows))
        .route("/:id", get(get_workflow).put(update_workflow).delete(delete_workflow))
        .route("/:id/apply", post(apply_workflow))
        .route("/:id/executions", get(list_workflow_executions))
}

pub fn execution_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_executions))
}

// ==================== Handlers ====================

async fn list_workflows(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
) -> ApiResult<Json<Vec<WorkflowDefinition>>> {
    Ok(Json(state.store.list_workflows(ctx.tenant_id, false).await?))
}

async fn get_workflow(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowDefinition>> {
    state
        .store
        .get_workflow(ctx.tenant_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Workflow".to_string()))
}

async fn create_workflow(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Json(payload): Json<WorkflowInput>,
) -> ApiResult<(StatusCode, Json<WorkflowDefinition>)> {
    ctx.require_manager()?;
    let definition = build_definition(state.store.as_ref(), &ctx, payload, None).await?;
    state.store.save_workflow(&definition).await?;

    info!(
        "Workflow {} '{}' created by {} with {} action(s)",
        definition.id(),
        definition.workflow.name,
        ctx.user_id,
        definition.actions.len()
    );
    Ok((StatusCode::CREATED, Json(definition)))
}

async fn update_workflow(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<WorkflowInput>,
) -> ApiResult<Json<WorkflowDefinition>> {
    ctx.require_manager()?;
    let existing = state
        .store
        .get_workflow(ctx.tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Workflow".to_string()))?;

    let definition = build_definition(state.store.as_ref(), &ctx, payload, Some(existing.workflow)).await?;
    state.store.save_workflow(&definition).await?;

    info!("Workflow {} replaced by {}", id, ctx.user_id);
    Ok(Json(definition))
}

async fn delete_workflow(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    ctx.require_manager()?;
    if !state.store.delete_workflow(ctx.tenant_id, id).await? {
        return Err(AppError::NotFound("Workflow".to_string()));
    }

    info!("Workflow {} deleted by {}", id, ctx.user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn apply_workflow(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<ApplyReport>> {
    ctx.require_manager()?;
    let options = optional_json::<ApplyOptions>(&body)?;
    let report = state
        .engine
        .apply_to_existing_events(ctx.tenant_id, id, &options)
        .await?;
    Ok(Json(report))
}

async fn apply_all_workflows(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    body: Bytes,
) -> ApiResult<Json<Vec<ApplyReport>>> {
    ctx.require_manager()?;
    let options = optional_json::<ApplyOptions>(&body)?;
    let reports = state
        .engine
        .apply_all_to_existing_events(ctx.tenant_id, &options)
        .await?;
    Ok(Json(reports))
}

async fn list_workflow_executions(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Query(query): Query<ExecutionQuery>,
) -> ApiResult<Json<PaginatedResponse<WorkflowExecution>>> {
    if state.store.get_workflow(ctx.tenant_id, id).await?.is_none() {
        return Err(AppError::NotFound("Workflow".to_string()));
    }
    let filter = ExecutionFilter {
        workflow_id: Some(id),
        trigger_entity_id: query.event_id,
        status: query.status,
    };
    paginated_executions(&state, &ctx, filter, query.pagination()).await
}

async fn list_executions(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Query(query): Query<ExecutionQuery>,
) -> ApiResult<Json<PaginatedResponse<WorkflowExecution>>> {
    let filter = ExecutionFilter {
        workflow_id: query.workflow_id,
        trigger_entity_id: query.event_id,
        status: query.status,
    };
    paginated_executions(&state, &ctx, filter, query.pagination()).await
}

async fn paginated_executions(
    state: &AppState,
    ctx: &TenantContext,
    filter: ExecutionFilter,
    params: PaginationParams,
) -> ApiResult<Json<PaginatedResponse<WorkflowExecution>>> {
    let (executions, total) = state
        .store
        .list_executions(ctx.tenant_id, &filter, params.page())
        .await?;
    Ok(Json(PaginatedResponse::new(executions, &params, total)))
}
