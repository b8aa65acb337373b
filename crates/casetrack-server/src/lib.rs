//! Casetrack Web Server
//!
//! Axum-based REST API for the Casetrack field-collections case manager.
//!
//! Security features:
//! - Optional API-key authentication (secure by default, use --no-auth for
//!   local dev); keys are compared in constant time
//! - Restrictive CORS policy
//! - Input validation (pagination limits, upload size limits)
//! - Audit logging for mutating operations
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use casetrack_core::db::Database;

mod handlers;

/// Maximum sheet upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Header carrying the acting user for audit attribution
const USER_HEADER: &str = "x-casetrack-user";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only in production)
    pub allowed_origins: Vec<String>,
    /// API keys for service authentication
    /// Format: "Bearer <key>" in Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
}

/// Authentication middleware - validates API keys using constant-time
/// comparison to prevent timing attacks. With auth disabled (local dev)
/// every request passes through.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time
/// comparison to prevent timing attacks.
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        if provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes)) {
            return true;
        }
    }
    false
}

/// Extract the acting user from request headers (for audit logging).
/// Returns the x-casetrack-user header, "api-key" for API key auth, or
/// "local-dev" for unauthenticated requests.
pub fn get_user(headers: &axum::http::HeaderMap) -> String {
    if let Some(user) = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return user.to_string();
    }

    if headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .is_some()
    {
        return "api-key".to_string();
    }

    "local-dev".to_string()
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database, config: ServerConfig) -> Router {
    let state = Arc::new(AppState {
        db,
        config: config.clone(),
    });

    let api_routes = Router::new()
        // Case upload + management
        .route(
            "/cases",
            get(handlers::list_cases).post(handlers::create_case),
        )
        .route("/cases/upload", post(handlers::upload_cases))
        .route("/cases/lookup", get(handlers::lookup_case))
        .route(
            "/cases/executive/:executive_id",
            get(handlers::cases_for_executive),
        )
        // Allocation engine
        .route("/cases/allocate/single", post(handlers::allocate_single))
        .route("/cases/allocate/bulk", post(handlers::allocate_bulk))
        .route(
            "/cases/allocate-by-empid",
            post(handlers::allocate_by_emp_id),
        )
        .route("/cases/allocation-status", get(handlers::allocation_status))
        // Reporting
        .route(
            "/cases/performance/:executive_id",
            get(handlers::executive_performance),
        )
        .route("/cases/leaderboard", get(handlers::leaderboard))
        .route("/cases/visited", get(handlers::visited_cases))
        .route("/cases/visited/export", get(handlers::export_visited_cases))
        // Single case (param routes come after the static ones)
        .route("/cases/:id", get(handlers::get_case))
        .route("/cases/:id/status", patch(handlers::update_case_status))
        // Upload manifests
        .route("/uploads", get(handlers::list_uploads))
        // Feedback submission + audit
        .route("/feedback", post(handlers::submit_feedback))
        .route("/feedback/case/:case_id", get(handlers::feedbacks_for_case))
        .route(
            "/feedback/executive/:executive_id",
            get(handlers::feedbacks_for_executive),
        )
        .route(
            "/feedback/audit/fake-visits",
            get(handlers::fake_visit_summary),
        )
        .route("/feedback/alerts/ptp", get(handlers::ptp_alerts))
        .route("/feedback/check-broken-ptp", post(handlers::check_broken_ptp))
        .route(
            "/feedback/:id",
            get(handlers::get_feedback).delete(handlers::reject_feedback),
        )
        .route("/feedback/:id/mark-fake", post(handlers::mark_feedback_fake))
        // Users
        .route("/users", get(handlers::list_users).post(handlers::create_user))
        .route("/users/executives", get(handlers::list_executives))
        // Audit log
        .route("/audit", get(handlers::list_audit));

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server
pub async fn serve(db: Database, host: &str, port: u16) -> anyhow::Result<()> {
    serve_with_config(db, host, port, ServerConfig::default()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    }

    let app = create_router(db, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }
}

/// Map a core error onto the right HTTP status: single-target lookups fail
/// fast as 404, data problems as 400, everything else as a sanitized 500.
pub(crate) fn map_core_error(err: casetrack_core::Error) -> AppError {
    use casetrack_core::Error;
    match err {
        Error::NotFound(msg) => AppError::not_found(&msg),
        Error::InvalidData(msg) | Error::Import(msg) => AppError::bad_request(&msg),
        other => other.into(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
