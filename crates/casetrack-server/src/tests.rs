//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use casetrack_core::db::Database;
use casetrack_core::models::{CaseDraft, NewFeedback, UploadMode, UserRole};
use http_body_util::BodyExt;
use tower::ServiceExt;

fn test_db() -> Database {
    Database::in_memory().unwrap()
}

fn no_auth_config() -> ServerConfig {
    ServerConfig {
        require_auth: false,
        ..Default::default()
    }
}

fn setup_test_app() -> Router {
    create_router(test_db(), no_auth_config())
}

fn app_with_db(db: &Database) -> Router {
    create_router(db.clone(), no_auth_config())
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn draft(acc: &str, emp: Option<&str>, pos: f64, perf: &str) -> CaseDraft {
    CaseDraft {
        acc_id: acc.to_string(),
        customer_name: format!("Customer {}", acc),
        bank_name: "HDFC".to_string(),
        product_type: "PL".to_string(),
        bkt: Some("X1".to_string()),
        pos_amount: pos,
        performance: if perf.is_empty() {
            None
        } else {
            Some(perf.to_string())
        },
        emp_id: emp.map(str::to_string),
        month: Some(1),
        year: Some(2025),
        ..Default::default()
    }
}

fn executive(db: &Database, emp_id: &str) -> i64 {
    db.create_user(Some(emp_id), "Exec", emp_id, None, UserRole::Executive)
        .unwrap()
}

// ========== Auth Tests ==========

#[tokio::test]
async fn test_auth_required_by_default() {
    let config = ServerConfig {
        require_auth: true,
        api_keys: vec!["secret-key".to_string()],
        ..Default::default()
    };
    let app = create_router(test_db(), config);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/cases")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/cases")
                .header("authorization", "Bearer secret-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_bad_api_key_rejected() {
    let config = ServerConfig {
        require_auth: true,
        api_keys: vec!["secret-key".to_string()],
        ..Default::default()
    };
    let app = create_router(test_db(), config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/cases")
                .header("authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ========== User API Tests ==========

#[tokio::test]
async fn test_create_and_list_users() {
    let app = setup_test_app();

    let body = serde_json::json!({
        "emp_id": "EXE01",
        "first_name": "Ravi",
        "last_name": "Kumar",
        "role": "executive"
    });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["emp_id"], "EXE01");
    assert_eq!(json["role"], "executive");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/users/executives")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_user_invalid_role() {
    let app = setup_test_app();

    let body = serde_json::json!({
        "first_name": "X",
        "last_name": "Y",
        "role": "astronaut"
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Upload Tests ==========

#[tokio::test]
async fn test_upload_core_pipeline() {
    let db = test_db();
    let exe1 = executive(&db, "EXE01");
    let state = AppState {
        db: db.clone(),
        config: no_auth_config(),
    };

    // Sheet row 3 (second data row) has no account number
    let csv = "Acc_No,Acc_holder_name,POS_amount,Emp_ID\n\
               ACC001,Asha Rao,1000,EXE01\n\
               ,No Account,500,EXE01\n\
               ACC003,Vikram Shah,2000,GHOST\n";

    let response = handlers::upload_cases_core(
        &state,
        &axum::http::HeaderMap::new(),
        csv.as_bytes().to_vec(),
        Some("jan.csv".to_string()),
        Some("sup01".to_string()),
        UploadMode::Original,
    )
    .await;
    let result = response.ok().expect("upload failed").0;

    assert_eq!(result.created, 2);
    assert_eq!(result.failed, 0);
    assert_eq!(result.total_rows, 3);
    assert_eq!(result.skipped_rows, 1);
    assert_eq!(result.skipped_row_details.len(), 1);
    assert_eq!(result.skipped_row_details[0].row_number, 3);
    assert_eq!(result.skipped_row_details[0].reason, "missing account number");

    assert_eq!(result.allocation_stats.total, 2);
    assert_eq!(result.allocation_stats.allocated, 1);
    assert_eq!(result.allocation_stats.unallocated, 1);
    assert_eq!(result.allocation_stats.found_employees, 1);
    assert_eq!(result.allocation_stats.not_found_employees, 1);
    assert_eq!(result.allocation_stats.not_found_emp_ids, vec!["GHOST"]);
    assert!(result.overloaded.is_empty());

    assert_eq!(result.upload.supervisor, "sup01");
    assert_eq!(result.upload.total_cases, 2);
    assert!(result.upload.content_hash.is_some());

    let allocated = db.get_case_by_acc_id("ACC001").unwrap().unwrap();
    assert_eq!(allocated.case.executive_id, Some(exe1));
}

#[tokio::test]
async fn test_upload_endpoint_multipart() {
    let db = test_db();
    let app = app_with_db(&db);

    let csv = "Acc_No,Acc_holder_name,POS_amount\nACC001,Asha Rao,1000\n";
    let boundary = "X-CASETRACK-BOUNDARY";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"sheet.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n{csv}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"supervisor\"\r\n\r\nsup01\r\n\
         --{b}--\r\n",
        b = boundary,
        csv = csv
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/cases/upload")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["created"], 1);
    assert_eq!(json["skipped_rows"], 0);
    assert_eq!(db.count_cases().unwrap(), 1);
}

#[tokio::test]
async fn test_upload_endpoint_missing_file() {
    let app = setup_test_app();

    let boundary = "X-CASETRACK-BOUNDARY";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"supervisor\"\r\n\r\nsup01\r\n--{b}--\r\n",
        b = boundary
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/cases/upload")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Case API Tests ==========

#[tokio::test]
async fn test_create_and_lookup_case() {
    let app = setup_test_app();

    let body = serde_json::json!({
        "acc_id": "ACC100",
        "customer_name": "Meena Iyer",
        "pos_amount": 7500.0,
        "bank_name": "AXIS",
        "product_type": "GL"
    });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/cases")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["acc_id"], "ACC100");
    assert_eq!(json["status"], "OPEN");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/cases/lookup?acc_id=ACC100")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/cases/lookup?acc_id=NOPE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_case_status() {
    let db = test_db();
    let case = db
        .create_case(&draft("ACC001", None, 100.0, ""), UploadMode::Original)
        .unwrap();
    let app = app_with_db(&db);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/cases/{}/status", case.id))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"status":"PAID"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/api/cases/9999/status")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"status":"PAID"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ========== Allocation API Tests ==========

#[tokio::test]
async fn test_allocation_flow() {
    let db = test_db();
    let exe = executive(&db, "EXE01");
    db.create_case(&draft("ACC001", Some("E-A"), 100.0, ""), UploadMode::Original)
        .unwrap();
    db.create_case(&draft("ACC002", Some("E-A"), 200.0, ""), UploadMode::Original)
        .unwrap();
    let app = app_with_db(&db);

    let body = serde_json::json!({ "emp_id": "E-A", "executive_id": exe });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/cases/allocate/single")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["updated"], 2);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/cases/allocation-status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 2);
    assert_eq!(json["allocated"], 2);
    assert_eq!(json["unallocated"], 0);
}

#[tokio::test]
async fn test_allocate_by_empid_unknown_executive() {
    let db = test_db();
    db.create_case(&draft("ACC001", Some("E-A"), 100.0, ""), UploadMode::Original)
        .unwrap();
    let app = app_with_db(&db);

    let body = serde_json::json!({ "emp_id": "E-A", "executive_id": 9999 });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/cases/allocate-by-empid")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // No partial state change
    let status = db.allocation_status().unwrap();
    assert_eq!(status.unallocated, 1);
}

// ========== Performance & Leaderboard Tests ==========

#[tokio::test]
async fn test_performance_endpoint() {
    let db = test_db();
    let exe = executive(&db, "EXE01");
    db.create_case(&draft("ACC001", Some("EXE01"), 1000.0, "FLOW"), UploadMode::Original)
        .unwrap();
    db.create_case(&draft("ACC002", Some("EXE01"), 500.0, "RB"), UploadMode::Original)
        .unwrap();
    db.allocate_cases_to_executive("EXE01", exe).unwrap();
    let app = app_with_db(&db);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/cases/performance/{}?month=1&year=2025",
                    exe
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;

    assert_eq!(json["total_cases"], 2);
    assert_eq!(json["total_pos"], 1500.0);
    assert_eq!(json["pos_not_flow"], 500.0);
    assert_eq!(json["flow_count"], 1);
    assert_eq!(json["rb_count"], 1);
    let rate = json["pos_not_flow_rate"].as_f64().unwrap();
    assert!((rate - 33.333).abs() < 0.01);
    assert_eq!(json["bank_breakdown"].as_array().unwrap().len(), 1);

    // Unknown executive fails fast
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/cases/performance/9999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_leaderboard_endpoint() {
    let db = test_db();
    let exe1 = executive(&db, "EXE01");
    let exe2 = executive(&db, "EXE02");
    db.create_user(None, "Super", "Visor", None, UserRole::Supervisor)
        .unwrap();

    db.create_case(&draft("ACC001", Some("EXE01"), 1000.0, "FLOW"), UploadMode::Original)
        .unwrap();
    db.create_case(&draft("ACC002", Some("EXE02"), 400.0, "RB"), UploadMode::Original)
        .unwrap();
    db.create_case(&draft("ACC003", Some("EXE02"), 600.0, "FLOW"), UploadMode::Original)
        .unwrap();
    db.allocate_cases_to_executive("EXE01", exe1).unwrap();
    db.allocate_cases_to_executive("EXE02", exe2).unwrap();
    let app = app_with_db(&db);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/cases/leaderboard?month=1&year=2025")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let rows = json.as_array().unwrap();

    assert_eq!(rows.len(), 2);
    // EXE02 has 40% non-FLOW by amount, EXE01 0%
    assert_eq!(rows[0]["executive_id"], exe2);
    assert_eq!(rows[0]["rank"], 1);
    assert_eq!(rows[1]["executive_id"], exe1);
    assert_eq!(rows[1]["rank"], 2);
}

#[tokio::test]
async fn test_leaderboard_invalid_month() {
    let app = setup_test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/cases/leaderboard?month=13&year=2025")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Feedback & Visited Tests ==========

#[tokio::test]
async fn test_feedback_flow() {
    let db = test_db();
    let exe = executive(&db, "EXE01");
    let case = db
        .create_case(&draft("ACC001", None, 100.0, ""), UploadMode::Original)
        .unwrap();
    let app = app_with_db(&db);

    let body = serde_json::json!({
        "case_id": case.id,
        "executive_id": exe,
        "visit_code": "MET_CUSTOMER",
        "who_met": "Customer",
        "meeting_place": "Residence",
        "remarks": "Promised payment Friday",
        "ptp_date": "2025-02-14"
    });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/feedback")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let feedback_id = json["id"].as_i64().unwrap();
    assert_eq!(json["status"], "Visited");
    assert_eq!(json["ptp_date"], "2025-02-14");

    // Submitting against a nonexistent case fails fast
    let body = serde_json::json!({ "case_id": 9999, "visit_code": "MET" });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/feedback")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Mark fake, then check the audit summary
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/feedback/{}/mark-fake", feedback_id))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"reason":"geo mismatch"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/feedback/audit/fake-visits")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["fake_count"], 1);
}

#[tokio::test]
async fn test_visited_cases_and_export() {
    let db = test_db();
    let exe = executive(&db, "EXE01");
    let visited = db
        .create_case(&draft("ACC001", None, 100.0, ""), UploadMode::Original)
        .unwrap();
    db.create_case(&draft("ACC002", None, 200.0, ""), UploadMode::Original)
        .unwrap();

    db.create_feedback(&NewFeedback {
        case_id: visited.id,
        executive_id: Some(exe),
        visit_code: "MET_CUSTOMER".to_string(),
        who_met: Some("Customer".to_string()),
        relation: None,
        met_name: None,
        meeting_place: Some("Residence".to_string()),
        remarks: Some("ok".to_string()),
        photo_url: None,
        lat: None,
        lng: None,
        device_info: None,
        ptp_date: None,
    })
    .unwrap();
    let app = app_with_db(&db);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/cases/visited")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["cases"][0]["visits"], 1);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/cases/visited/export")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(content_type, "text/csv");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("ACC001"));
    assert!(text.contains("Customer"));
    assert!(!text.contains("ACC002"));
}

// ========== Audit API Tests ==========

#[tokio::test]
async fn test_audit_listing() {
    let db = test_db();
    db.log_audit("sup", "case_upload", None, None, None).unwrap();
    let app = app_with_db(&db);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/audit?action=case_upload")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
}
