use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use super::jwt::{self, Role};
use crate::AppState;
use crate::error::AppError;

/// Authenticated caller, scoped to one tenant.
///
/// Every handler that touches tenant data takes this extractor and passes
/// `tenant_id` down to the store; nothing reads tenant data without it.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
}

impl TenantContext {
    /// Require a role allowed to change workflow configuration
    pub fn require_manager(&self) -> Result<(), AppError> {
        if self.role.can_manage_workflows() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Managing workflows requires the admin or manager role".to_string(),
            ))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for TenantContext {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()).into_response())?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid authorization format".to_string()).into_response())?;

        let token_data = jwt::verify_jwt(&state.config.jwt_secret, token)
            .map_err(|e| AppError::from(e).into_response())?;

        Ok(TenantContext {
            user_id: token_data.claims.sub,
            tenant_id: token_data.claims.tenant_id,
            role: token_data.claims.role,
        })
    }
}
