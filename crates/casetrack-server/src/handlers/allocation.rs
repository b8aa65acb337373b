//! Allocation engine handlers

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    Json,
};
use serde::{Deserialize, Serialize};

use casetrack_core::db::AllocationByEmpId;
use casetrack_core::models::{AllocationRequest, AllocationResult, AllocationStatus};

use crate::{get_user, map_core_error, AppError, AppState};

/// Request body for single allocation
#[derive(Debug, Deserialize)]
pub struct SingleAllocateRequest {
    pub emp_id: String,
    pub executive_id: i64,
}

#[derive(Serialize)]
pub struct SingleAllocateResponse {
    pub emp_id: String,
    pub executive_id: i64,
    pub updated: usize,
}

/// POST /api/cases/allocate/single - Allocate unassigned cases for one
/// employee identifier to an executive
pub async fn allocate_single(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<SingleAllocateResponse>, AppError> {
    let user = get_user(request.headers());

    let bytes = axum::body::to_bytes(request.into_body(), 1024)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let req: SingleAllocateRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    if req.emp_id.trim().is_empty() {
        return Err(AppError::bad_request("emp_id is required"));
    }

    let updated = state
        .db
        .allocate_cases_to_executive(&req.emp_id, req.executive_id)?;

    state.db.log_audit(
        &user,
        "allocate",
        Some("case"),
        None,
        Some(&format!(
            "emp_id={}, executive_id={}, updated={}",
            req.emp_id, req.executive_id, updated
        )),
    )?;

    Ok(Json(SingleAllocateResponse {
        emp_id: req.emp_id,
        executive_id: req.executive_id,
        updated,
    }))
}

/// Request body for bulk allocation
#[derive(Debug, Deserialize)]
pub struct BulkAllocateRequest {
    pub allocations: Vec<AllocationRequest>,
}

/// POST /api/cases/allocate/bulk - Apply single-allocation per pair; a
/// failed pair is reported in its result and does not stop the rest
pub async fn allocate_bulk(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<AllocationResult>>, AppError> {
    let user = get_user(request.headers());

    let bytes = axum::body::to_bytes(request.into_body(), 1024 * 100)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let req: BulkAllocateRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    if req.allocations.is_empty() {
        return Err(AppError::bad_request("No allocations provided"));
    }

    let results = state.db.bulk_allocate_cases(&req.allocations)?;
    let total_updated: usize = results.iter().map(|r| r.updated).sum();

    state.db.log_audit(
        &user,
        "allocate_bulk",
        Some("case"),
        None,
        Some(&format!(
            "pairs={}, updated={}",
            req.allocations.len(),
            total_updated
        )),
    )?;

    Ok(Json(results))
}

/// POST /api/cases/allocate-by-empid - Allocate with executive verification;
/// an unknown executive fails the whole operation with 404
pub async fn allocate_by_emp_id(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<AllocationByEmpId>, AppError> {
    let user = get_user(request.headers());

    let bytes = axum::body::to_bytes(request.into_body(), 1024)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let req: SingleAllocateRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    if req.emp_id.trim().is_empty() {
        return Err(AppError::bad_request("emp_id is required"));
    }

    let outcome = state
        .db
        .allocate_by_emp_id(&req.emp_id, req.executive_id)
        .map_err(map_core_error)?;

    state.db.log_audit(
        &user,
        "allocate_by_empid",
        Some("case"),
        None,
        Some(&format!(
            "emp_id={}, executive_id={}, updated={}",
            outcome.emp_id, outcome.executive_id, outcome.cases_allocated
        )),
    )?;

    Ok(Json(outcome))
}

/// GET /api/cases/allocation-status - Allocation snapshot with the
/// unallocated breakdown by employee identifier
pub async fn allocation_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AllocationStatus>, AppError> {
    let status = state.db.allocation_status()?;
    Ok(Json(status))
}
