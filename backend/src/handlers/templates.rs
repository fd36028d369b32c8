//! Catalogue handlers: event types, task templates and design item types.
//!
//! These are the building blocks workflow actions refer to. Anyone in the
//! tenant may read them; creating them requires a manager.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use keystone_shared::{DesignItemType, EventType, TaskTemplate};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::TenantContext;
use crate::error::ApiResult;
use crate::validation::{string, Validator, TASK_PRIORITIES};
use crate::workflows::definition::{MAX_DAY_OFFSET, MAX_NAME_LENGTH};
use crate::AppState;

// ==================== Requests ====================

#[derive(Debug, Deserialize)]
pub struct CreateEventTypeRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskTemplateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub default_assignee_id: Option<Uuid>,
    pub default_days_before_event: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDesignItemTypeRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub default_production_days: i32,
    #[serde(default)]
    pub default_shipping_days: i32,
}

// ==================== Routes ====================

pub fn event_type_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_event_types).post(create_event_type))
}

pub fn task_template_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_task_templates).post(create_task_template))
}

pub fn design_item_type_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_design_item_types).post(create_design_item_type))
}

// ==================== Handlers ====================

async fn list_event_types(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
) -> ApiResult<Json<Vec<EventType>>> {
    Ok(Json(state.store.list_event_types(ctx.tenant_id).await?))
}

async fn create_event_type(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Json(payload): Json<CreateEventTypeRequest>,
) -> ApiResult<(StatusCode, Json<EventType>)> {
    ctx.require_manager()?;
    Validator::new()
        .required_string(&payload.name, "name")
        .max_length(&payload.name, "name", MAX_NAME_LENGTH)
        .finish()?;

    let event_type = EventType {
        id: Uuid::new_v4(),
        tenant_id: ctx.tenant_id,
        name: string::required(&payload.name, "name")?,
        description: string::optional(payload.description),
        created_at: Utc::now(),
    };
    state.store.insert_event_type(&event_type).await?;

    Ok((StatusCode::CREATED, Json(event_type)))
}

async fn list_task_templates(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
) -> ApiResult<Json<Vec<TaskTemplate>>> {
    Ok(Json(state.store.list_task_templates(ctx.tenant_id).await?))
}

async fn create_task_template(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Json(payload): Json<CreateTaskTemplateRequest>,
) -> ApiResult<(StatusCode, Json<TaskTemplate>)> {
    ctx.require_manager()?;
    let priority = payload.priority.unwrap_or_else(|| "medium".to_string());
    Validator::new()
        .required_string(&payload.name, "name")
        .max_length(&payload.name, "name", MAX_NAME_LENGTH)
        .error_if(
            !TASK_PRIORITIES.contains(&priority.as_str()),
            "priority",
            "priority must be one of low, medium, high, urgent",
        )
        .in_range(payload.default_days_before_event, "default_days_before_event", 0, MAX_DAY_OFFSET)
        .finish()?;

    let template = TaskTemplate {
        id: Uuid::new_v4(),
        tenant_id: ctx.tenant_id,
        name: string::required(&payload.name, "name")?,
        description: string::optional(payload.description),
        priority,
        default_assignee_id: payload.default_assignee_id,
        default_days_before_event: payload.default_days_before_event,
        created_at: Utc::now(),
    };
    state.store.insert_task_template(&template).await?;

    Ok((StatusCode::CREATED, Json(template)))
}

async fn list_design_item_types(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
) -> ApiResult<Json<Vec<DesignItemType>>> {
    Ok(Json(state.store.list_design_item_types(ctx.tenant_id).await?))
}

async fn create_design_item_type(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Json(payload): Json<CreateDesignItemTypeRequest>,
) -> ApiResult<(StatusCode, Json<DesignItemType>)> {
    ctx.require_manager()?;
    Validator::new()
        .required_string(&payload.name, "name")
        .max_length(&payload.name, "name", MAX_NAME_LENGTH)
        .in_range(Some(payload.default_production_days), "default_production_days", 0, MAX_DAY_OFFSET)
        .in_range(Some(payload.default_shipping_days), "default_shipping_days", 0, MAX_DAY_OFFSET)
        .finish()?;

    let item_type = DesignItemType {
        id: Uuid::new_v4(),
        tenant_id: ctx.tenant_id,
        name: string::required(&payload.name, "name")?,
        description: string::optional(payload.description),
        default_production_days: payload.default_production_days,
        default_shipping_days: payload.default_shipping_days,
        created_at: Utc::now(),
    };
    state.store.insert_design_item_type(&item_type).await?;

    Ok((StatusCode::CREATED, Json(item_type)))
}
