//! Event handlers. Creating an event runs every matching workflow.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use keystone_shared::{DesignItem, Event, Task};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::optional_json;
use crate::auth::TenantContext;
use crate::error::{ApiResult, AppError};
use crate::pagination::{default_page, default_per_page, PaginatedResponse, PaginationParams};
use crate::store::EventFilter;
use crate::validation::{string, Validator, EVENT_STATUSES};
use crate::workflows::definition::MAX_NAME_LENGTH;
use crate::workflows::WorkflowRun;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
    pub event_type_id: Option<Uuid>,
    /// Only events starting on or after this date
    pub from: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub name: Option<String>,
    pub event_type_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub account_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunWorkflowsRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatedEvent {
    pub event: Event,
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    pub event: Event,
    pub tasks: Vec<Task>,
    pub design_items: Vec<DesignItem>,
}

pub fn event_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_events).post(create_event))
        .route("/:id", get(get_event))
        .route("/:id/run-workflows", post(run_workflows))
}

async fn list_events(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Query(query): Query<EventQuery>,
) -> ApiResult<Json<PaginatedResponse<Event>>> {
    let params = PaginationParams::new(query.page, query.per_page);
    let filter = EventFilter {
        event_type_ids: query.event_type_id.map(|id| vec![id]),
        event_ids: None,
        starting_on_or_after: query.from,
    };
    let (events, total) = state
        .store
        .list_events(ctx.tenant_id, &filter, params.page())
        .await?;
    Ok(Json(PaginatedResponse::new(events, &params, total)))
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Json(payload): Json<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<CreatedEvent>)> {
    let status = payload.status.clone().unwrap_or_else(|| "planned".to_string());
    let mut v = Validator::new()
        .required_string(&payload.name, "name")
        .max_length(&payload.name, "name", MAX_NAME_LENGTH)
        .error_if(payload.event_type_id.is_none(), "event_type_id", "event_type_id is required")
        .error_if(payload.start_date.is_none(), "start_date", "start_date is required")
        .error_if(
            !EVENT_STATUSES.contains(&status.as_str()),
            "status",
            "status must be one of planned, confirmed, cancelled, completed",
        );
    if let (Some(start), Some(end)) = (payload.start_date, payload.end_date) {
        v = v.error_if(end < start, "end_date", "end_date cannot be before start_date");
    }
    if let Some(type_id) = payload.event_type_id {
        let known = state.store.existing_event_type_ids(ctx.tenant_id, &[type_id]).await?;
        v = v.error_if(known.is_empty(), "event_type_id", "Unknown event type");
    }
    v.finish()?;

    let (Some(event_type_id), Some(start_date)) = (payload.event_type_id, payload.start_date) else {
        return Err(AppError::BadRequest("event_type_id and start_date are required".to_string()));
    };

    let event = Event {
        id: Uuid::new_v4(),
        tenant_id: ctx.tenant_id,
        name: string::required(&payload.name, "name")?,
        event_type_id,
        start_date,
        end_date: payload.end_date,
        account_id: payload.account_id,
        contact_id: payload.contact_id,
        status,
        created_by: Some(ctx.user_id),
        created_at: Utc::now(),
        updated_at: None,
    };
    state.store.insert_event(&event).await?;
    info!("Event {} created by {}", event.id, ctx.user_id);

    let workflow_runs = state.engine.on_event_created(ctx.tenant_id, &event).await;

    Ok((StatusCode::CREATED, Json(CreatedEvent { event, workflow_runs })))
}

async fn get_event(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EventDetail>> {
    let event = state
        .store
        .get_event(ctx.tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event".to_string()))?;
    let tasks = state.store.list_tasks_for_event(ctx.tenant_id, id).await?;
    let design_items = state.store.list_design_items_for_event(ctx.tenant_id, id).await?;

    Ok(Json(EventDetail {
        event,
        tasks,
        design_items,
    }))
}

async fn run_workflows(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<Vec<WorkflowRun>>> {
    ctx.require_manager()?;
    let request = optional_json::<RunWorkflowsRequest>(&body)?;
    let runs = state.engine.run_for_event(ctx.tenant_id, id, request.force).await?;
    Ok(Json(runs))
}
