use axum::{extract::State, http::StatusCode, response::Json};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;

use crate::error::{ApiResult, AppError};
use crate::AppState;

pub mod events;
pub mod templates;
pub mod workflows;

pub use events::event_routes;
pub use templates::{design_item_type_routes, event_type_routes, task_template_routes};
pub use workflows::{execution_routes, workflow_routes};

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    if state.store.ping().await {
        (StatusCode::OK, Json(json!({"status": "healthy", "service": "keystone-api"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy", "service": "keystone-api"})),
        )
    }
}

/// Parse a JSON body that may be omitted entirely
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))
}
