//! Performance and leaderboard handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Datelike;
use serde::Deserialize;

use casetrack_core::leaderboard::{build_leaderboard, LeaderboardRow};
use casetrack_core::models::CaseFilter;
use casetrack_core::perf::{aggregate_performance, PerformanceSummary};

use crate::{AppError, AppState};

/// Query parameters for the performance report
#[derive(Debug, Deserialize)]
pub struct PerformanceQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub bank: Option<String>,
    pub product: Option<String>,
    pub bkt: Option<String>,
}

/// GET /api/cases/performance/:executive_id - Full aggregate report for one
/// executive's filtered case set
pub async fn executive_performance(
    State(state): State<Arc<AppState>>,
    Path(executive_id): Path<i64>,
    Query(params): Query<PerformanceQuery>,
) -> Result<Json<PerformanceSummary>, AppError> {
    // Single-target operation: fail fast on an unknown executive
    state
        .db
        .get_user(executive_id)?
        .ok_or_else(|| AppError::not_found(&format!("Executive {} not found", executive_id)))?;

    let today = chrono::Utc::now().date_naive();
    let filter = CaseFilter {
        executive_id: Some(executive_id),
        month: Some(params.month.unwrap_or_else(|| today.month())),
        year: Some(params.year.unwrap_or_else(|| today.year())),
        bank_name: params.bank,
        product_type: params.product,
        bkt: params.bkt,
        ..Default::default()
    };

    let cases = state.db.cases_with_feedbacks(&filter)?;
    let summary = aggregate_performance(&cases);

    Ok(Json(summary))
}

/// Query parameters for the leaderboard
#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

/// GET /api/cases/leaderboard - Ranked executives for one period
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardRow>>, AppError> {
    let today = chrono::Utc::now().date_naive();
    let month = params.month.unwrap_or_else(|| today.month());
    let year = params.year.unwrap_or_else(|| today.year());

    if !(1..=12).contains(&month) {
        return Err(AppError::bad_request(&format!("Invalid month: {}", month)));
    }

    let cases = state.db.cases_for_period(month, year)?;
    let users = state.db.user_map()?;
    let rows = build_leaderboard(&cases, &users);

    Ok(Json(rows))
}
