//! Visited-case listing and export handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use casetrack_core::export::{visit_rows, write_visits_csv};
use casetrack_core::models::{CaseFilter, VisitedCase};

use crate::{AppError, AppState, MAX_PAGE_LIMIT};

/// Query parameters for visited-case listing and export
#[derive(Debug, Deserialize)]
pub struct VisitedQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub bank: Option<String>,
    pub product: Option<String>,
    pub bkt: Option<String>,
}

fn default_limit() -> i64 {
    100
}

impl VisitedQuery {
    fn to_filter(&self) -> CaseFilter {
        CaseFilter {
            month: self.month,
            year: self.year,
            bank_name: self.bank.clone(),
            product_type: self.product.clone(),
            bkt: self.bkt.clone(),
            ..Default::default()
        }
    }
}

#[derive(Serialize)]
pub struct VisitedResponse {
    pub cases: Vec<VisitedCase>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// GET /api/cases/visited - Cases with at least one feedback, annotated
/// with visit counts and most-recent-visit timestamps
pub async fn visited_cases(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VisitedQuery>,
) -> Result<Json<VisitedResponse>, AppError> {
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let offset = params.offset.max(0);

    let (cases, total) = state.db.visited_cases(&params.to_filter(), limit, offset)?;

    Ok(Json(VisitedResponse {
        cases,
        total,
        limit,
        offset,
    }))
}

/// GET /api/cases/visited/export - Visited cases as CSV, one row per
/// (case, feedback) pair with every feedback field surfaced
pub async fn export_visited_cases(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VisitedQuery>,
) -> Result<Response, AppError> {
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let offset = params.offset.max(0);

    let (cases, _total) = state.db.visited_cases(&params.to_filter(), limit, offset)?;
    let users = state.db.user_map()?;

    let rows = visit_rows(&cases, &users);
    let mut buf = Vec::new();
    write_visits_csv(&mut buf, &rows)?;

    let filename = format!(
        "visited_cases_{}.csv",
        chrono::Utc::now().format("%Y%m%d%H%M%S")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        buf,
    )
        .into_response())
}
