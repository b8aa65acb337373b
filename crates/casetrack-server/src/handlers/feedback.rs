//! Visit feedback submission and audit handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::{Deserialize, Serialize};

use casetrack_core::db::{FakeVisitSummary, PtpAlert};
use casetrack_core::models::{Feedback, NewFeedback};

use crate::{get_user, map_core_error, AppError, AppState};

/// POST /api/feedback - Submit a geo-tagged visit for a case
pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Feedback>, AppError> {
    let user = get_user(request.headers());

    let bytes = axum::body::to_bytes(request.into_body(), 1024 * 64)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let req: NewFeedback =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    if req.visit_code.trim().is_empty() {
        return Err(AppError::bad_request("visit_code is required"));
    }

    let feedback = state.db.create_feedback(&req).map_err(map_core_error)?;

    state.db.log_audit(
        &user,
        "feedback_submitted",
        Some("feedback"),
        Some(feedback.id),
        Some(&format!(
            "case_id={}, visit_code={}",
            feedback.case_id, feedback.visit_code
        )),
    )?;

    Ok(Json(feedback))
}

/// GET /api/feedback/:id - Get a single feedback
pub async fn get_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Feedback>, AppError> {
    let feedback = state
        .db
        .get_feedback(id)?
        .ok_or_else(|| AppError::not_found(&format!("Feedback {} not found", id)))?;
    Ok(Json(feedback))
}

/// GET /api/feedback/case/:case_id - All feedback for a case, newest first
pub async fn feedbacks_for_case(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<i64>,
) -> Result<Json<Vec<Feedback>>, AppError> {
    // 404 for an unknown case rather than an empty list
    state
        .db
        .get_case(case_id)?
        .ok_or_else(|| AppError::not_found(&format!("Case {} not found", case_id)))?;

    let feedbacks = state.db.feedbacks_for_case(case_id)?;
    Ok(Json(feedbacks))
}

/// GET /api/feedback/executive/:executive_id - All feedback by an executive
pub async fn feedbacks_for_executive(
    State(state): State<Arc<AppState>>,
    Path(executive_id): Path<i64>,
) -> Result<Json<Vec<Feedback>>, AppError> {
    state
        .db
        .get_user(executive_id)?
        .ok_or_else(|| AppError::not_found(&format!("Executive {} not found", executive_id)))?;

    let feedbacks = state.db.feedbacks_for_executive(executive_id)?;
    Ok(Json(feedbacks))
}

/// Request body for marking a visit fake
#[derive(Debug, Deserialize)]
pub struct MarkFakeRequest {
    pub reason: Option<String>,
}

/// POST /api/feedback/:id/mark-fake - Flag a visit as fake (manual audit)
pub async fn mark_feedback_fake(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<crate::SuccessResponse>, AppError> {
    let user = get_user(request.headers());

    let bytes = axum::body::to_bytes(request.into_body(), 1024 * 4)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let req: MarkFakeRequest = if bytes.is_empty() {
        MarkFakeRequest { reason: None }
    } else {
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?
    };

    state
        .db
        .mark_feedback_fake(id, req.reason.as_deref())
        .map_err(map_core_error)?;

    state.db.log_audit(
        &user,
        "feedback_marked_fake",
        Some("feedback"),
        Some(id),
        req.reason.as_deref(),
    )?;

    Ok(Json(crate::SuccessResponse { success: true }))
}

/// DELETE /api/feedback/:id - Reject a visit (logical removal)
pub async fn reject_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<crate::SuccessResponse>, AppError> {
    let user = get_user(request.headers());

    state.db.reject_feedback(id).map_err(map_core_error)?;

    state
        .db
        .log_audit(&user, "feedback_rejected", Some("feedback"), Some(id), None)?;

    Ok(Json(crate::SuccessResponse { success: true }))
}

/// GET /api/feedback/audit/fake-visits - Fake-visit audit summary
pub async fn fake_visit_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FakeVisitSummary>, AppError> {
    let summary = state.db.fake_visit_summary()?;
    Ok(Json(summary))
}

/// Query parameters for PTP alerts
#[derive(Debug, Deserialize)]
pub struct PtpQuery {
    /// How many days ahead to look for due promises
    #[serde(default = "default_days_ahead")]
    pub days_ahead: i64,
}

fn default_days_ahead() -> i64 {
    7
}

/// GET /api/feedback/alerts/ptp - Upcoming and overdue promises to pay
pub async fn ptp_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PtpQuery>,
) -> Result<Json<Vec<PtpAlert>>, AppError> {
    let today = chrono::Utc::now().date_naive();
    let alerts = state.db.ptp_alerts(today, params.days_ahead.clamp(0, 365))?;
    Ok(Json(alerts))
}

#[derive(Serialize)]
pub struct BrokenPtpResponse {
    pub flagged: usize,
}

/// POST /api/feedback/check-broken-ptp - Sweep for promises whose date
/// passed without payment
pub async fn check_broken_ptp(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<BrokenPtpResponse>, AppError> {
    let user = get_user(request.headers());

    let today = chrono::Utc::now().date_naive();
    let flagged = state.db.check_broken_ptp(today)?;

    state.db.log_audit(
        &user,
        "ptp_sweep",
        Some("feedback"),
        None,
        Some(&format!("flagged={}", flagged)),
    )?;

    Ok(Json(BrokenPtpResponse { flagged }))
}
