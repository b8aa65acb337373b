//! User management handlers

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    Json,
};
use serde::Deserialize;

use casetrack_core::models::{User, UserRole};

use crate::{get_user, map_core_error, AppError, AppState};

/// Request body for creating a user
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub emp_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "executive".to_string()
}

/// POST /api/users - Create a user
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<User>, AppError> {
    let acting_user = get_user(request.headers());

    let bytes = axum::body::to_bytes(request.into_body(), 1024 * 4)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let req: CreateUserRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    if req.first_name.trim().is_empty() {
        return Err(AppError::bad_request("first_name is required"));
    }

    let role: UserRole = req
        .role
        .parse()
        .map_err(|e: String| AppError::bad_request(&e))?;

    let id = state
        .db
        .create_user(
            req.emp_id.as_deref(),
            req.first_name.trim(),
            req.last_name.trim(),
            req.email.as_deref(),
            role,
        )
        .map_err(map_core_error)?;

    let user = state
        .db
        .get_user(id)?
        .ok_or_else(|| AppError::internal("User not found after insert"))?;

    state.db.log_audit(
        &acting_user,
        "user_created",
        Some("user"),
        Some(id),
        Some(&format!("emp_id={:?}, role={}", user.emp_id, user.role)),
    )?;

    Ok(Json(user))
}

/// GET /api/users - List all users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<User>>, AppError> {
    let users = state.db.list_users()?;
    Ok(Json(users))
}

/// GET /api/users/executives - List users with the executive role
pub async fn list_executives(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<User>>, AppError> {
    let users = state.db.list_executives()?;
    Ok(Json(users))
}
