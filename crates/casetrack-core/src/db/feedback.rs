//! Visit feedback, fraud audit, PTP tracking, and visited-case queries

use std::collections::HashMap;

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{CaseFilter, Feedback, FeedbackStatus, NewFeedback, VisitedCase};

use super::cases::CASE_COLUMNS;

const FEEDBACK_COLUMNS: &str = "f.id, f.case_id, f.executive_id, f.visit_code, f.who_met, \
     f.relation, f.met_name, f.meeting_place, f.remarks, f.photo_url, f.lat, \
     f.lng, f.device_info, f.distance_from_address, f.ptp_date, f.ptp_broken, \
     f.is_fake_visit, f.fake_visit_reason, f.status, f.created_at, f.updated_at";

/// Fake-visit audit summary
#[derive(Debug, Clone, Serialize)]
pub struct FakeVisitSummary {
    pub total_feedbacks: i64,
    pub fake_count: i64,
    pub rejected_count: i64,
    /// Most recently flagged visits
    pub flagged: Vec<Feedback>,
}

/// One upcoming or overdue promise-to-pay
#[derive(Debug, Clone, Serialize)]
pub struct PtpAlert {
    pub feedback_id: i64,
    pub case_id: i64,
    pub acc_id: String,
    pub customer_name: String,
    pub executive_id: Option<i64>,
    pub ptp_date: NaiveDate,
    pub ptp_broken: bool,
}

/// Great-circle distance in meters between two coordinates
fn haversine_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

impl Database {
    /// Record one visit against a case.
    ///
    /// When both the case's registered address and the capture carry
    /// coordinates, the distance between them is computed and stored as the
    /// fraud signal. Feedback is immutable after creation except through the
    /// audit actions (mark-fake, reject).
    pub fn create_feedback(&self, new: &NewFeedback) -> Result<Feedback> {
        let case = self
            .get_case(new.case_id)?
            .ok_or_else(|| Error::NotFound(format!("Case {} not found", new.case_id)))?;

        let distance = match (case.lat, case.lng, new.lat, new.lng) {
            (Some(clat), Some(clng), Some(flat), Some(flng)) => {
                Some(haversine_meters(clat, clng, flat, flng))
            }
            _ => None,
        };

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO feedbacks (
                case_id, executive_id, visit_code, who_met, relation, met_name,
                meeting_place, remarks, photo_url, lat, lng, device_info,
                distance_from_address, ptp_date
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                new.case_id,
                new.executive_id,
                new.visit_code,
                new.who_met,
                new.relation,
                new.met_name,
                new.meeting_place,
                new.remarks,
                new.photo_url,
                new.lat,
                new.lng,
                new.device_info,
                distance,
                new.ptp_date.map(|d| d.to_string()),
            ],
        )?;

        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_feedback(id)?
            .ok_or_else(|| Error::NotFound(format!("Feedback {} not found after insert", id)))
    }

    /// Get a single feedback by ID
    pub fn get_feedback(&self, id: i64) -> Result<Option<Feedback>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM feedbacks f WHERE f.id = ?", FEEDBACK_COLUMNS);
        let feedback = conn
            .query_row(&sql, params![id], Self::row_to_feedback)
            .optional()?;
        Ok(feedback)
    }

    /// All feedback for one case, newest first
    pub fn feedbacks_for_case(&self, case_id: i64) -> Result<Vec<Feedback>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM feedbacks f WHERE f.case_id = ?
             ORDER BY f.created_at DESC, f.id DESC",
            FEEDBACK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let feedbacks = stmt
            .query_map(params![case_id], Self::row_to_feedback)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(feedbacks)
    }

    /// All feedback submitted by one executive, newest first
    pub fn feedbacks_for_executive(&self, executive_id: i64) -> Result<Vec<Feedback>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM feedbacks f WHERE f.executive_id = ?
             ORDER BY f.created_at DESC, f.id DESC",
            FEEDBACK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let feedbacks = stmt
            .query_map(params![executive_id], Self::row_to_feedback)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(feedbacks)
    }

    /// Feedback for every case matching a filter, grouped by case id,
    /// newest first within each case
    pub(crate) fn feedbacks_for_filter(
        &self,
        filter: &CaseFilter,
    ) -> Result<HashMap<i64, Vec<Feedback>>> {
        let conn = self.conn()?;
        let (where_clause, case_params) = Self::case_filter_clauses(filter);

        let sql = format!(
            "SELECT {} FROM feedbacks f JOIN cases c ON c.id = f.case_id {}
             ORDER BY f.case_id, f.created_at DESC, f.id DESC",
            FEEDBACK_COLUMNS, where_clause
        );
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            case_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let feedbacks = stmt
            .query_map(params_refs.as_slice(), Self::row_to_feedback)?
            .collect::<std::result::Result<Vec<Feedback>, _>>()?;

        let mut map: HashMap<i64, Vec<Feedback>> = HashMap::new();
        for feedback in feedbacks {
            map.entry(feedback.case_id).or_default().push(feedback);
        }
        Ok(map)
    }

    /// Mark a visit as fake (manual audit action)
    pub fn mark_feedback_fake(&self, id: i64, reason: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE feedbacks SET is_fake_visit = 1, fake_visit_reason = ?,
             status = 'Fake', updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![reason, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Feedback {} not found", id)));
        }
        Ok(())
    }

    /// Reject a visit: logical removal from active consideration, the row
    /// itself is kept
    pub fn reject_feedback(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE feedbacks SET status = 'Rejected', updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Feedback {} not found", id)));
        }
        Ok(())
    }

    /// Fake-visit audit summary with the most recently flagged visits
    pub fn fake_visit_summary(&self) -> Result<FakeVisitSummary> {
        let conn = self.conn()?;

        let total_feedbacks: i64 =
            conn.query_row("SELECT COUNT(*) FROM feedbacks", [], |row| row.get(0))?;
        let fake_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM feedbacks WHERE is_fake_visit = 1",
            [],
            |row| row.get(0),
        )?;
        let rejected_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM feedbacks WHERE status = 'Rejected'",
            [],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM feedbacks f WHERE f.is_fake_visit = 1
             ORDER BY f.updated_at DESC, f.id DESC LIMIT 50",
            FEEDBACK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let flagged = stmt
            .query_map([], Self::row_to_feedback)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(FakeVisitSummary {
            total_feedbacks,
            fake_count,
            rejected_count,
            flagged,
        })
    }

    /// Promises to pay falling due within `days_ahead` days of `today`,
    /// including already-broken ones, for open cases
    pub fn ptp_alerts(&self, today: NaiveDate, days_ahead: i64) -> Result<Vec<PtpAlert>> {
        let conn = self.conn()?;
        let horizon = today + chrono::Duration::days(days_ahead);

        let mut stmt = conn.prepare(
            "SELECT f.id, f.case_id, c.acc_id, c.customer_name, f.executive_id,
                    f.ptp_date, f.ptp_broken
             FROM feedbacks f
             JOIN cases c ON c.id = f.case_id
             WHERE f.ptp_date IS NOT NULL
               AND f.ptp_date <= ?
               AND f.status = 'Visited'
               AND c.status = 'OPEN'
             ORDER BY f.ptp_date ASC, f.id ASC",
        )?;

        let alerts = stmt
            .query_map(params![horizon.to_string()], |row| {
                let ptp_str: String = row.get(5)?;
                let broken: i64 = row.get(6)?;
                Ok(PtpAlert {
                    feedback_id: row.get(0)?,
                    case_id: row.get(1)?,
                    acc_id: row.get(2)?,
                    customer_name: row.get(3)?,
                    executive_id: row.get(4)?,
                    ptp_date: NaiveDate::parse_from_str(&ptp_str, "%Y-%m-%d")
                        .unwrap_or(today),
                    ptp_broken: broken != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(alerts)
    }

    /// Mark promises broken where the promised date passed while the case is
    /// still open. Returns the number of feedbacks flagged.
    pub fn check_broken_ptp(&self, today: NaiveDate) -> Result<usize> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE feedbacks SET ptp_broken = 1, updated_at = CURRENT_TIMESTAMP
             WHERE ptp_broken = 0
               AND ptp_date IS NOT NULL
               AND ptp_date < ?
               AND case_id IN (SELECT id FROM cases WHERE status = 'OPEN')",
            params![today.to_string()],
        )?;
        Ok(updated)
    }

    /// Cases with at least one feedback, annotated with visit count and the
    /// most recent visit timestamp, paginated with a total count
    pub fn visited_cases(
        &self,
        filter: &CaseFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<VisitedCase>, i64)> {
        let conn = self.conn()?;
        let (where_clause, mut case_params) = Self::case_filter_clauses(filter);

        let visited_clause = if where_clause.is_empty() {
            "WHERE EXISTS (SELECT 1 FROM feedbacks f WHERE f.case_id = c.id)".to_string()
        } else {
            format!(
                "{} AND EXISTS (SELECT 1 FROM feedbacks f WHERE f.case_id = c.id)",
                where_clause
            )
        };

        let count_sql = format!("SELECT COUNT(*) FROM cases c {}", visited_clause);
        let count_refs: Vec<&dyn rusqlite::ToSql> =
            case_params.iter().map(|p| p.as_ref()).collect();
        let total: i64 = conn.query_row(&count_sql, count_refs.as_slice(), |row| row.get(0))?;

        let sql = format!(
            "SELECT {} FROM cases c {}
             ORDER BY c.updated_at DESC, c.id DESC LIMIT ? OFFSET ?",
            CASE_COLUMNS, visited_clause
        );
        case_params.push(Box::new(limit));
        case_params.push(Box::new(offset));
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            case_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let cases = stmt
            .query_map(params_refs.as_slice(), Self::row_to_case)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        let visited = cases
            .into_iter()
            .map(|case| {
                let feedbacks = self.feedbacks_for_case(case.id)?;
                let visits = feedbacks.len() as i64;
                let last_visit_at = feedbacks.first().map(|f| f.created_at);
                Ok(VisitedCase {
                    case,
                    visits,
                    last_visit_at,
                    feedbacks,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((visited, total))
    }

    /// Helper to convert a row to Feedback
    /// Column order matches `FEEDBACK_COLUMNS`
    pub(crate) fn row_to_feedback(row: &rusqlite::Row) -> rusqlite::Result<Feedback> {
        let ptp_str: Option<String> = row.get(14)?;
        let ptp_broken: i64 = row.get(15)?;
        let is_fake: i64 = row.get(16)?;
        let status_str: String = row.get(18)?;
        let created_at_str: String = row.get(19)?;
        let updated_at_str: String = row.get(20)?;
        Ok(Feedback {
            id: row.get(0)?,
            case_id: row.get(1)?,
            executive_id: row.get(2)?,
            visit_code: row.get(3)?,
            who_met: row.get(4)?,
            relation: row.get(5)?,
            met_name: row.get(6)?,
            meeting_place: row.get(7)?,
            remarks: row.get(8)?,
            photo_url: row.get(9)?,
            lat: row.get(10)?,
            lng: row.get(11)?,
            device_info: row.get(12)?,
            distance_from_address: row.get(13)?,
            ptp_date: ptp_str
                .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            ptp_broken: ptp_broken != 0,
            is_fake_visit: is_fake != 0,
            fake_visit_reason: row.get(17)?,
            status: status_str.parse().unwrap_or(FeedbackStatus::Visited),
            created_at: parse_datetime(&created_at_str),
            updated_at: parse_datetime(&updated_at_str),
        })
    }
}
