//! Visited-case export
//!
//! Flattens visited cases into one tabular row per (case, feedback) pair for
//! supervisor review. A case with feedback always contributes at least one
//! row, and every feedback field is surfaced verbatim.
//!
//! The who-met resolution order is load-bearing: several overlapping source
//! fields can describe the person met, and which one is surfaced follows the
//! chain relation+met_name, then an explicit "Customer" who-met label, then
//! met_name, then the case's customer name.

use std::collections::HashMap;
use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::models::{User, VisitedCase};

/// One export row: a single visit against a single case
#[derive(Debug, Clone, Serialize)]
pub struct VisitExportRow {
    pub account_id: String,
    pub customer_name: String,
    pub bank: String,
    pub product: String,
    pub bkt: String,
    pub who_met: String,
    pub name_of_person_met: String,
    pub meeting_place: String,
    pub visit_observation: String,
    pub executive_name: String,
    pub executive_emp_id: String,
    pub visit_code: String,
    pub photo_url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub ptp_date: String,
    pub is_fake_visit: bool,
    pub distance_from_address: Option<f64>,
    pub device_info: String,
    pub ptp_broken: bool,
    pub fake_visit_reason: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Resolve who was met and their name from the overlapping source fields
fn resolve_who_met(
    relation: Option<&str>,
    met_name: Option<&str>,
    who_met: Option<&str>,
    customer_name: &str,
) -> (String, String) {
    match (relation, met_name) {
        (Some(rel), Some(met)) if !rel.is_empty() && !met.is_empty() => {
            (rel.to_string(), met.to_string())
        }
        _ => {
            if who_met == Some("Customer") {
                ("Customer".to_string(), customer_name.to_string())
            } else if let Some(met) = met_name.filter(|m| !m.is_empty()) {
                (who_met.unwrap_or("").to_string(), met.to_string())
            } else {
                (
                    who_met.unwrap_or("").to_string(),
                    customer_name.to_string(),
                )
            }
        }
    }
}

/// Flatten visited cases into export rows, one per (case, feedback) pair
pub fn visit_rows(cases: &[VisitedCase], users: &HashMap<i64, User>) -> Vec<VisitExportRow> {
    let mut rows = Vec::new();

    for visited in cases {
        let case = &visited.case;
        for fb in &visited.feedbacks {
            let (who_met, name_of_person_met) = resolve_who_met(
                fb.relation.as_deref(),
                fb.met_name.as_deref(),
                fb.who_met.as_deref(),
                &case.customer_name,
            );

            let executive = fb.executive_id.and_then(|id| users.get(&id));

            rows.push(VisitExportRow {
                account_id: case.acc_id.clone(),
                customer_name: case.customer_name.clone(),
                bank: case.bank_name.clone(),
                product: case.product_type.clone(),
                bkt: case.bkt.clone().unwrap_or_default(),
                who_met,
                name_of_person_met,
                meeting_place: fb.meeting_place.clone().unwrap_or_default(),
                visit_observation: fb.remarks.clone().unwrap_or_default(),
                executive_name: executive.map(|u| u.full_name()).unwrap_or_default(),
                executive_emp_id: executive
                    .and_then(|u| u.emp_id.clone())
                    .unwrap_or_default(),
                visit_code: fb.visit_code.clone(),
                photo_url: fb.photo_url.clone().unwrap_or_default(),
                latitude: fb.lat,
                longitude: fb.lng,
                ptp_date: fb.ptp_date.map(|d| d.to_string()).unwrap_or_default(),
                is_fake_visit: fb.is_fake_visit,
                distance_from_address: fb.distance_from_address,
                device_info: fb.device_info.clone().unwrap_or_default(),
                ptp_broken: fb.ptp_broken,
                fake_visit_reason: fb.fake_visit_reason.clone().unwrap_or_default(),
                status: fb.status.to_string(),
                created_at: fb.created_at.to_rfc3339(),
                updated_at: fb.updated_at.to_rfc3339(),
            });
        }
    }

    rows
}

/// Render export rows as CSV
pub fn write_visits_csv<W: Write>(writer: W, rows: &[VisitExportRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Case, CaseStatus, Feedback, FeedbackStatus, UploadMode, UserRole,
    };
    use chrono::{NaiveDate, Utc};

    fn case(acc: &str, customer: &str) -> Case {
        Case {
            id: 1,
            acc_id: acc.to_string(),
            cust_id: None,
            customer_name: customer.to_string(),
            phone_number: None,
            address: String::new(),
            pincode: None,
            lat: None,
            lng: None,
            pos_amount: 0.0,
            overdue_amount: 0.0,
            collection_amount: 0.0,
            toss_amount: 0.0,
            emi_amount: 0.0,
            interest: 0.0,
            dpd: 0,
            bkt: Some("X1".to_string()),
            product_type: "PL".to_string(),
            sub_product_name: None,
            bank_name: "HDFC".to_string(),
            npa_status: None,
            priority: String::new(),
            performance: None,
            status: CaseStatus::Open,
            emp_id: None,
            executive_id: None,
            month: 1,
            year: 2025,
            upload_mode: UploadMode::Original,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn feedback(id: i64) -> Feedback {
        Feedback {
            id,
            case_id: 1,
            executive_id: Some(7),
            visit_code: "MET".to_string(),
            who_met: None,
            relation: None,
            met_name: None,
            meeting_place: Some("Residence".to_string()),
            remarks: Some("Will pay next week".to_string()),
            photo_url: Some("photos/1.jpg".to_string()),
            lat: Some(12.9),
            lng: Some(77.6),
            device_info: None,
            distance_from_address: Some(42.5),
            ptp_date: NaiveDate::from_ymd_opt(2025, 2, 10),
            ptp_broken: false,
            is_fake_visit: false,
            fake_visit_reason: None,
            status: FeedbackStatus::Visited,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn exec_users() -> HashMap<i64, User> {
        let mut users = HashMap::new();
        users.insert(
            7,
            User {
                id: 7,
                emp_id: Some("EXE07".to_string()),
                first_name: "Ravi".to_string(),
                last_name: "Kumar".to_string(),
                email: None,
                role: UserRole::Executive,
                created_at: Utc::now(),
            },
        );
        users
    }

    #[test]
    fn test_one_row_per_case_feedback_pair() {
        let visited = vec![VisitedCase {
            case: case("ACC001", "Asha Rao"),
            visits: 2,
            last_visit_at: None,
            feedbacks: vec![feedback(1), feedback(2)],
        }];

        let rows = visit_rows(&visited, &exec_users());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.account_id == "ACC001"));
        assert_eq!(rows[0].executive_name, "Ravi Kumar");
        assert_eq!(rows[0].executive_emp_id, "EXE07");
        assert_eq!(rows[0].ptp_date, "2025-02-10");
        assert_eq!(rows[0].distance_from_address, Some(42.5));
    }

    #[test]
    fn test_who_met_relation_takes_priority() {
        let mut fb = feedback(1);
        fb.relation = Some("Spouse".to_string());
        fb.met_name = Some("Sita Rao".to_string());
        fb.who_met = Some("Customer".to_string());

        let visited = vec![VisitedCase {
            case: case("ACC001", "Asha Rao"),
            visits: 1,
            last_visit_at: None,
            feedbacks: vec![fb],
        }];

        let rows = visit_rows(&visited, &exec_users());
        assert_eq!(rows[0].who_met, "Spouse");
        assert_eq!(rows[0].name_of_person_met, "Sita Rao");
    }

    #[test]
    fn test_who_met_customer_label() {
        let mut fb = feedback(1);
        fb.who_met = Some("Customer".to_string());

        let visited = vec![VisitedCase {
            case: case("ACC001", "Asha Rao"),
            visits: 1,
            last_visit_at: None,
            feedbacks: vec![fb],
        }];

        let rows = visit_rows(&visited, &exec_users());
        assert_eq!(rows[0].who_met, "Customer");
        assert_eq!(rows[0].name_of_person_met, "Asha Rao");
    }

    #[test]
    fn test_who_met_met_name_fallback() {
        let mut fb = feedback(1);
        fb.who_met = Some("Neighbour".to_string());
        fb.met_name = Some("Mohan".to_string());

        let visited = vec![VisitedCase {
            case: case("ACC001", "Asha Rao"),
            visits: 1,
            last_visit_at: None,
            feedbacks: vec![fb],
        }];

        let rows = visit_rows(&visited, &exec_users());
        assert_eq!(rows[0].who_met, "Neighbour");
        assert_eq!(rows[0].name_of_person_met, "Mohan");
    }

    #[test]
    fn test_who_met_final_fallback_uses_customer_name() {
        let mut fb = feedback(1);
        fb.who_met = Some("Guard".to_string());

        let visited = vec![VisitedCase {
            case: case("ACC001", "Asha Rao"),
            visits: 1,
            last_visit_at: None,
            feedbacks: vec![fb],
        }];

        let rows = visit_rows(&visited, &exec_users());
        assert_eq!(rows[0].who_met, "Guard");
        assert_eq!(rows[0].name_of_person_met, "Asha Rao");
    }

    #[test]
    fn test_csv_output() {
        let visited = vec![VisitedCase {
            case: case("ACC001", "Asha Rao"),
            visits: 1,
            last_visit_at: None,
            feedbacks: vec![feedback(1)],
        }];

        let rows = visit_rows(&visited, &exec_users());
        let mut buf = Vec::new();
        write_visits_csv(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("account_id,customer_name,bank"));
        let data = lines.next().unwrap();
        assert!(data.contains("ACC001"));
        assert!(data.contains("Will pay next week"));
    }
}
