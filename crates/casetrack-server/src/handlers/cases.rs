//! Case upload and management handlers

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, Request, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use casetrack_core::import::{distinct_employee_ids, parse_case_sheet};
use casetrack_core::models::{
    Case, CaseDraft, CaseFilter, CaseStatus, CaseUpload, CaseWithFeedbacks, SkippedRow,
    UploadMode,
};

use crate::{get_user, map_core_error, AppError, AppState, MAX_PAGE_LIMIT, MAX_UPLOAD_SIZE};

/// An executive/identifier receiving more than this many cases from one
/// upload is flagged as overloaded (informational, not enforced)
pub const OVERLOAD_THRESHOLD: usize = 100;

/// Allocation statistics for one upload
#[derive(Debug, Serialize)]
pub struct UploadAllocationStats {
    pub total: usize,
    pub allocated: usize,
    pub unallocated: usize,
    pub found_employees: usize,
    pub not_found_employees: usize,
    pub not_found_emp_ids: Vec<String>,
}

/// An executive (or unresolved identifier) exceeding the per-upload case
/// threshold
#[derive(Debug, Serialize)]
pub struct OverloadedExecutive {
    pub id: String,
    pub count: usize,
}

/// Response for the bulk upload endpoint
#[derive(Serialize)]
pub struct UploadResponse {
    pub upload: CaseUpload,
    /// Rows successfully upserted
    pub created: usize,
    /// Rows whose upsert failed after the batch was dispatched
    pub failed: usize,
    pub total_rows: usize,
    pub skipped_rows: usize,
    pub skipped_row_details: Vec<SkippedRow>,
    pub allocation_stats: UploadAllocationStats,
    pub overloaded: Vec<OverloadedExecutive>,
    /// Bounded sample of resulting cases
    pub sample: Vec<Case>,
}

/// POST /api/cases/upload - Bulk upload a case allocation sheet
///
/// Expects multipart form with:
/// - file: CSV sheet (required, max 10MB)
/// - supervisor: uploader reference (optional, defaults to the acting user)
/// - mode: upload mode tag, ORIGINAL or REFRESH (optional)
pub async fn upload_cases(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut supervisor: Option<String> = None;
    let mut mode = UploadMode::Original;

    // Extract fields from multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Failed to read form field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read file data"))?;

                if bytes.len() > MAX_UPLOAD_SIZE {
                    return Err(AppError::bad_request(&format!(
                        "File too large. Maximum size is {} MB",
                        MAX_UPLOAD_SIZE / 1024 / 1024
                    )));
                }

                file_data = Some(bytes.to_vec());
            }
            "supervisor" => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read supervisor"))?;
                if !value.trim().is_empty() {
                    supervisor = Some(value.trim().to_string());
                }
            }
            "mode" => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read mode"))?;
                if !value.trim().is_empty() {
                    mode = value
                        .parse()
                        .map_err(|e: String| AppError::bad_request(&e))?;
                }
            }
            _ => {}
        }
    }

    let file_data = file_data.ok_or_else(|| AppError::bad_request("Missing file field"))?;

    upload_cases_core(&state, &headers, file_data, filename, supervisor, mode).await
}

/// Core upload logic - separated from multipart parsing for testability.
///
/// Pipeline: normalize rows -> resolve employee identifiers in one batched
/// lookup -> bulk upsert in bounded batches -> report the structured
/// summary. A malformed sheet fails the whole upload before any row work;
/// row-level problems are reported in the summary, never thrown.
pub async fn upload_cases_core(
    state: &AppState,
    headers: &HeaderMap,
    file_data: Vec<u8>,
    filename: Option<String>,
    supervisor: Option<String>,
    mode: UploadMode,
) -> Result<Json<UploadResponse>, AppError> {
    let user = get_user(headers);
    let supervisor = supervisor.unwrap_or_else(|| user.clone());

    let content_hash = hex::encode(Sha256::digest(&file_data));

    let parsed = parse_case_sheet(file_data.as_slice())
        .map_err(|e| AppError::bad_request(&format!("Failed to parse sheet: {}", e)))?;

    // One batched lookup for all distinct identifiers in this sheet
    let emp_ids = distinct_employee_ids(&parsed.drafts);
    let resolution = state.db.resolve_employee_ids(&emp_ids)?;

    info!(
        "Upload by {}: {} rows, {} drafts, {} skipped, {}/{} employee ids resolved",
        supervisor,
        parsed.total_rows,
        parsed.drafts.len(),
        parsed.skipped.len(),
        resolution.found.len(),
        emp_ids.len()
    );

    let allocation_stats = build_allocation_stats(&parsed.drafts, &resolution);
    let overloaded = find_overloaded(&parsed.drafts, &resolution.map);

    let outcome = state
        .db
        .bulk_upsert_cases(
            parsed.drafts,
            &resolution.map,
            &supervisor,
            mode,
            filename.as_deref(),
            Some(&content_hash),
        )
        .await?;

    Ok(Json(UploadResponse {
        upload: outcome.upload,
        created: outcome.upserted,
        failed: outcome.failed,
        total_rows: parsed.total_rows,
        skipped_rows: parsed.skipped.len(),
        skipped_row_details: parsed.skipped,
        allocation_stats,
        overloaded,
        sample: outcome.sample,
    }))
}

fn build_allocation_stats(
    drafts: &[CaseDraft],
    resolution: &casetrack_core::models::EmployeeResolution,
) -> UploadAllocationStats {
    let allocated = drafts
        .iter()
        .filter(|d| {
            d.emp_id
                .as_deref()
                .map(|emp| resolution.map.contains_key(emp))
                .unwrap_or(false)
        })
        .count();

    UploadAllocationStats {
        total: drafts.len(),
        allocated,
        unallocated: drafts.len() - allocated,
        found_employees: resolution.found.len(),
        not_found_employees: resolution.not_found.len(),
        not_found_emp_ids: resolution.not_found.clone(),
    }
}

/// Per-executive case load check. Keys are the resolved executive id when
/// the identifier matched, the raw identifier otherwise, or "unassigned".
fn find_overloaded(
    drafts: &[CaseDraft],
    employee_map: &HashMap<String, i64>,
) -> Vec<OverloadedExecutive> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for draft in drafts {
        let key = match draft.emp_id.as_deref() {
            Some(emp) => match employee_map.get(emp) {
                Some(executive_id) => executive_id.to_string(),
                None => emp.to_string(),
            },
            None => "unassigned".to_string(),
        };
        *counts.entry(key).or_insert(0) += 1;
    }

    let mut overloaded: Vec<OverloadedExecutive> = counts
        .into_iter()
        .filter(|(_, count)| *count > OVERLOAD_THRESHOLD)
        .map(|(id, count)| OverloadedExecutive { id, count })
        .collect();
    overloaded.sort_by(|a, b| b.count.cmp(&a.count));
    overloaded
}

/// Request body for creating a single case
#[derive(Debug, Deserialize)]
pub struct CreateCaseRequest {
    pub acc_id: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub pos_amount: f64,
    pub bkt: Option<String>,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub bank_name: String,
    pub emp_id: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

/// POST /api/cases - Create a single case
pub async fn create_case(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Case>, AppError> {
    let user = get_user(request.headers());

    let bytes = axum::body::to_bytes(request.into_body(), 1024 * 64)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let req: CreateCaseRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    let draft = CaseDraft {
        acc_id: req.acc_id,
        customer_name: req.customer_name,
        pos_amount: req.pos_amount.max(0.0),
        bkt: req.bkt,
        product_type: req.product_type,
        bank_name: req.bank_name,
        emp_id: req.emp_id.map(|e| e.trim().to_string()),
        month: req.month,
        year: req.year,
        ..Default::default()
    };

    let case = state
        .db
        .create_case(&draft, UploadMode::Original)
        .map_err(map_core_error)?;

    state.db.log_audit(
        &user,
        "case_created",
        Some("case"),
        Some(case.id),
        Some(&format!("acc_id={}", case.acc_id)),
    )?;

    Ok(Json(case))
}

/// Query parameters for listing cases
#[derive(Debug, Deserialize)]
pub struct CaseQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub status: Option<String>,
    pub bkt: Option<String>,
    pub product_type: Option<String>,
    pub bank_name: Option<String>,
    pub npa_status: Option<String>,
    pub priority: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

fn default_limit() -> i64 {
    100
}

impl CaseQuery {
    pub(crate) fn to_filter(&self) -> Result<CaseFilter, AppError> {
        let status = self
            .status
            .as_deref()
            .map(|s| {
                s.parse::<CaseStatus>()
                    .map_err(|e| AppError::bad_request(&e))
            })
            .transpose()?;
        Ok(CaseFilter {
            status,
            bkt: self.bkt.clone(),
            product_type: self.product_type.clone(),
            bank_name: self.bank_name.clone(),
            npa_status: self.npa_status.clone(),
            priority: self.priority.clone(),
            month: self.month,
            year: self.year,
            executive_id: None,
        })
    }
}

#[derive(Serialize)]
pub struct CaseListResponse {
    pub cases: Vec<Case>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// GET /api/cases - List cases with filters
pub async fn list_cases(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CaseQuery>,
) -> Result<Json<CaseListResponse>, AppError> {
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let offset = params.offset.max(0);
    let filter = params.to_filter()?;

    let (cases, total) = state.db.list_cases(&filter, limit, offset)?;

    Ok(Json(CaseListResponse {
        cases,
        total,
        limit,
        offset,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub acc_id: String,
}

/// GET /api/cases/lookup?acc_id= - Look up a case by account identifier
pub async fn lookup_case(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupQuery>,
) -> Result<Json<CaseWithFeedbacks>, AppError> {
    let case = state
        .db
        .get_case_by_acc_id(&params.acc_id)?
        .ok_or_else(|| AppError::not_found("Account not found"))?;
    Ok(Json(case))
}

/// GET /api/cases/:id - Get a single case with its feedback history
pub async fn get_case(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<CaseWithFeedbacks>, AppError> {
    let case = state
        .db
        .get_case_with_feedbacks(id)?
        .ok_or_else(|| AppError::not_found(&format!("Case {} not found", id)))?;
    Ok(Json(case))
}

#[derive(Serialize)]
pub struct ExecutiveCasesResponse {
    pub cases: Vec<CaseWithFeedbacks>,
    pub total: usize,
}

/// GET /api/cases/executive/:executive_id - Cases assigned to one executive
pub async fn cases_for_executive(
    State(state): State<Arc<AppState>>,
    Path(executive_id): Path<i64>,
    Query(params): Query<CaseQuery>,
) -> Result<Json<ExecutiveCasesResponse>, AppError> {
    let mut filter = params.to_filter()?;
    filter.executive_id = Some(executive_id);

    let cases = state.db.cases_with_feedbacks(&filter)?;
    let total = cases.len();

    Ok(Json(ExecutiveCasesResponse { cases, total }))
}

/// Request body for updating case status
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// PATCH /api/cases/:id/status - Transition a case's lifecycle status
pub async fn update_case_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<crate::SuccessResponse>, AppError> {
    let user = get_user(request.headers());

    let bytes = axum::body::to_bytes(request.into_body(), 1024)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let req: UpdateStatusRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    let status: CaseStatus = req
        .status
        .parse()
        .map_err(|e: String| AppError::bad_request(&e))?;

    state
        .db
        .update_case_status(id, status)
        .map_err(map_core_error)?;

    state.db.log_audit(
        &user,
        "case_status_updated",
        Some("case"),
        Some(id),
        Some(&format!("status={}", status)),
    )?;

    Ok(Json(crate::SuccessResponse { success: true }))
}

/// GET /api/uploads - List upload manifests, newest first
pub async fn list_uploads(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CaseUpload>>, AppError> {
    let uploads = state.db.list_case_uploads(100)?;
    Ok(Json(uploads))
}
