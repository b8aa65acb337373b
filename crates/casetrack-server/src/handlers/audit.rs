//! Audit log handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use casetrack_core::AuditEntry;

use crate::{AppError, AppState, MAX_PAGE_LIMIT};

/// Query parameters for listing audit entries
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    /// Optional action filter (e.g. "case_upload")
    pub action: Option<String>,
}

fn default_limit() -> i64 {
    50
}

/// GET /api/audit - List audit entries, newest first
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let offset = params.offset.max(0);

    let entries = state.db.list_audit(params.action.as_deref(), limit, offset)?;
    Ok(Json(entries))
}
