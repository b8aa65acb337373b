//! Integration tests for casetrack-core
//!
//! These tests exercise the full upload → resolve → upsert → allocate →
//! aggregate workflow through the crate's public API.

use casetrack_core::{
    build_leaderboard,
    db::Database,
    import::{distinct_employee_ids, parse_case_sheet},
    models::{CaseFilter, NewFeedback, UploadMode, UserRole},
    perf::aggregate_performance,
    visit_rows, write_visits_csv,
};

/// A January allocation sheet: three executives' worth of cases plus one
/// row with a blank account number and one with an unknown employee id.
fn january_sheet() -> &'static str {
    r#"Acc_No,Acc_holder_name,Bank_name,Product_name,BKT,POS_amount,Collection_amount,Performance (Flow/Stab/Norm/RB),Emp_ID
ACC001,Asha Rao,HDFC,PL,X1,10000,0,FLOW,EXE01
ACC002,Vikram Shah,HDFC,PL,X2,5000,500,RB,EXE01
ACC003,Meena Iyer,ICICI,GL,X1,8000,0,NORM,EXE02
,Missing Account,AXIS,PL,X1,100,0,FLOW,EXE01
ACC004,Rohit Verma,ICICI,GL,X2,2000,0,STAB,EXE02
ACC005,Farah Khan,AXIS,PL,X1,3000,0,FLOW,GHOST9
"#
}

fn setup_executives(db: &Database) -> (i64, i64) {
    let exe1 = db
        .create_user(Some("EXE01"), "Ravi", "Kumar", None, UserRole::Executive)
        .unwrap();
    let exe2 = db
        .create_user(Some("EXE02"), "Sita", "Menon", None, UserRole::Executive)
        .unwrap();
    (exe1, exe2)
}

async fn upload_sheet(db: &Database, sheet: &str) -> (usize, usize) {
    let parsed = parse_case_sheet(sheet.as_bytes()).unwrap();
    let emp_ids = distinct_employee_ids(&parsed.drafts);
    let resolution = db.resolve_employee_ids(&emp_ids).unwrap();

    let skipped = parsed.skipped.len();
    let outcome = db
        .bulk_upsert_cases(
            parsed.drafts,
            &resolution.map,
            "sup01",
            UploadMode::Original,
            Some("january.csv"),
            None,
        )
        .await
        .unwrap();

    (outcome.upserted, skipped)
}

#[tokio::test]
async fn test_full_upload_workflow() {
    let db = Database::in_memory().unwrap();
    let (exe1, exe2) = setup_executives(&db);

    let (upserted, skipped) = upload_sheet(&db, january_sheet()).await;
    assert_eq!(upserted, 5);
    assert_eq!(skipped, 1);
    assert_eq!(db.count_cases().unwrap(), 5);

    // Resolved identifiers allocated their cases during upsert; the
    // unknown identifier left ACC005 unallocated
    let status = db.allocation_status().unwrap();
    assert_eq!(status.total, 5);
    assert_eq!(status.allocated, 4);
    assert_eq!(status.unallocated, 1);

    let acc1 = db.get_case_by_acc_id("ACC001").unwrap().unwrap().case;
    assert_eq!(acc1.executive_id, Some(exe1));
    let acc3 = db.get_case_by_acc_id("ACC003").unwrap().unwrap().case;
    assert_eq!(acc3.executive_id, Some(exe2));
    let acc5 = db.get_case_by_acc_id("ACC005").unwrap().unwrap().case;
    assert_eq!(acc5.executive_id, None);

    // Manual remediation: GHOST9's cases go to exe2
    let outcome = db.allocate_by_emp_id("GHOST9", exe2).unwrap();
    assert_eq!(outcome.cases_allocated, 1);
    assert_eq!(db.allocation_status().unwrap().unallocated, 0);
}

#[tokio::test]
async fn test_reupload_updates_in_place() {
    let db = Database::in_memory().unwrap();
    setup_executives(&db);

    upload_sheet(&db, january_sheet()).await;
    assert_eq!(db.count_cases().unwrap(), 5);

    // Second upload of the same sheet: still 5 cases, not 10
    let (upserted, _) = upload_sheet(&db, january_sheet()).await;
    assert_eq!(upserted, 5);
    assert_eq!(db.count_cases().unwrap(), 5);

    // A revised sheet moves ACC002's balance
    let revised = "Acc_No,POS_amount,Emp_ID\nACC002,7777,EXE01\n";
    upload_sheet(&db, revised).await;
    let acc2 = db.get_case_by_acc_id("ACC002").unwrap().unwrap().case;
    assert_eq!(acc2.pos_amount, 7777.0);
    assert_eq!(db.count_cases().unwrap(), 5);
}

#[tokio::test]
async fn test_performance_aggregation_end_to_end() {
    let db = Database::in_memory().unwrap();
    let (exe1, _) = setup_executives(&db);

    upload_sheet(&db, january_sheet()).await;

    // A visit against each of exe1's cases
    for acc in ["ACC001", "ACC002"] {
        let case = db.get_case_by_acc_id(acc).unwrap().unwrap().case;
        db.create_feedback(&NewFeedback {
            case_id: case.id,
            executive_id: Some(exe1),
            visit_code: "MET_CUSTOMER".to_string(),
            who_met: Some("Customer".to_string()),
            relation: None,
            met_name: None,
            meeting_place: Some("Residence".to_string()),
            remarks: Some("Promised to pay".to_string()),
            photo_url: None,
            lat: None,
            lng: None,
            device_info: None,
            ptp_date: None,
        })
        .unwrap();
    }

    let filter = CaseFilter {
        executive_id: Some(exe1),
        ..Default::default()
    };
    let cases = db.cases_with_feedbacks(&filter).unwrap();
    let summary = aggregate_performance(&cases);

    assert_eq!(summary.total_cases, 2);
    assert_eq!(summary.total_pos, 15000.0);
    assert_eq!(summary.flow_count, 1);
    assert_eq!(summary.rb_count, 1);
    assert_eq!(summary.pos_not_flow, 5000.0);
    assert!((summary.pos_not_flow_rate - 100.0 * 5000.0 / 15000.0).abs() < 1e-9);
    assert_eq!(summary.total_visited_cases, 2);
    assert_eq!(summary.total_visits, 2);
    assert_eq!(summary.total_recovered_amount, 500.0);

    // Bank partition covers the whole filtered set
    let bank_total: i64 = summary
        .bank_breakdown
        .iter()
        .map(|b| b.metrics.total_cases)
        .sum();
    assert_eq!(bank_total, summary.total_cases);
}

#[tokio::test]
async fn test_leaderboard_end_to_end() {
    let db = Database::in_memory().unwrap();
    let (exe1, exe2) = setup_executives(&db);

    upload_sheet(&db, january_sheet()).await;

    let today = chrono::Utc::now().date_naive();
    use chrono::Datelike;
    let cases = db.cases_for_period(today.month(), today.year()).unwrap();
    let users = db.user_map().unwrap();
    let rows = build_leaderboard(&cases, &users);

    assert_eq!(rows.len(), 2);
    // exe1: 5000/15000 non-FLOW by amount; exe2: 10000/10000 (NORM+STAB)
    assert_eq!(rows[0].executive_id, exe2);
    assert_eq!(rows[0].pos_not_flow_rate, 100.0);
    assert_eq!(rows[1].executive_id, exe1);

    // Dense ranks with no gaps
    let ranks: Vec<usize> = rows.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2]);
}

#[tokio::test]
async fn test_visited_export_end_to_end() {
    let db = Database::in_memory().unwrap();
    let (exe1, _) = setup_executives(&db);

    upload_sheet(&db, january_sheet()).await;

    let case = db.get_case_by_acc_id("ACC001").unwrap().unwrap().case;
    for place in ["Residence", "Office"] {
        db.create_feedback(&NewFeedback {
            case_id: case.id,
            executive_id: Some(exe1),
            visit_code: "MET_CUSTOMER".to_string(),
            who_met: Some("Customer".to_string()),
            relation: None,
            met_name: None,
            meeting_place: Some(place.to_string()),
            remarks: None,
            photo_url: None,
            lat: None,
            lng: None,
            device_info: None,
            ptp_date: None,
        })
        .unwrap();
    }

    let (visited, total) = db.visited_cases(&CaseFilter::default(), 100, 0).unwrap();
    assert_eq!(total, 1);
    assert_eq!(visited[0].visits, 2);

    let users = db.user_map().unwrap();
    let rows = visit_rows(&visited, &users);
    // One export row per (case, feedback) pair
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.account_id == "ACC001"));
    assert_eq!(rows[0].who_met, "Customer");
    assert_eq!(rows[0].name_of_person_met, "Asha Rao");
    assert_eq!(rows[0].executive_name, "Ravi Kumar");

    let mut buf = Vec::new();
    write_visits_csv(&mut buf, &rows).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert_eq!(text.lines().count(), 3); // header + 2 rows
}
