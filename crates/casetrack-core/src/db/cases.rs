//! Case operations

use chrono::Datelike;
use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{
    Case, CaseDraft, CaseFilter, CaseStatus, CaseWithFeedbacks, UploadMode,
};

/// Shared SELECT column list for case queries.
/// Column order must match `row_to_case`.
pub(crate) const CASE_COLUMNS: &str = "c.id, c.acc_id, c.cust_id, c.customer_name, c.phone_number, \
     c.address, c.pincode, c.lat, c.lng, c.pos_amount, c.overdue_amount, \
     c.collection_amount, c.toss_amount, c.emi_amount, c.interest, c.dpd, \
     c.bkt, c.product_type, c.sub_product_name, c.bank_name, c.npa_status, \
     c.priority, c.performance, c.status, c.emp_id, c.executive_id, c.month, \
     c.year, c.upload_mode, c.created_at, c.updated_at";

impl Database {
    /// Create a single case. The account identifier must not already exist;
    /// bulk upload is the only path that updates existing cases.
    pub fn create_case(&self, draft: &CaseDraft, mode: UploadMode) -> Result<Case> {
        let acc_id = draft.acc_id.trim();
        if acc_id.is_empty() {
            return Err(Error::InvalidData("acc_id must not be blank".to_string()));
        }
        if let Some(month) = draft.month {
            if !(1..=12).contains(&month) {
                return Err(Error::InvalidData(format!("Invalid month: {}", month)));
            }
        }
        if self.get_case_by_acc_id_only(acc_id)?.is_some() {
            return Err(Error::InvalidData(format!(
                "A case with acc_id {} already exists",
                acc_id
            )));
        }

        let today = chrono::Utc::now().date_naive();
        let month = draft.month.unwrap_or_else(|| today.month());
        let year = draft.year.unwrap_or_else(|| today.year());

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO cases (
                acc_id, cust_id, customer_name, phone_number, address, pincode,
                lat, lng, pos_amount, overdue_amount, collection_amount,
                toss_amount, emi_amount, interest, dpd, bkt, product_type,
                sub_product_name, bank_name, npa_status, priority, performance,
                emp_id, executive_id, month, year, upload_mode
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                acc_id,
                draft.cust_id,
                draft.customer_name,
                draft.phone_number,
                draft.address,
                draft.pincode,
                draft.lat,
                draft.lng,
                draft.pos_amount,
                draft.overdue_amount,
                draft.collection_amount,
                draft.toss_amount,
                draft.emi_amount,
                draft.interest,
                draft.dpd,
                draft.bkt,
                draft.product_type,
                draft.sub_product_name,
                draft.bank_name,
                draft.npa_status,
                draft.priority,
                draft.performance,
                draft.emp_id,
                Option::<i64>::None,
                month,
                year,
                mode.as_str(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_case(id)?
            .ok_or_else(|| Error::NotFound(format!("Case {} not found after insert", id)))
    }

    /// Get a single case by ID
    pub fn get_case(&self, id: i64) -> Result<Option<Case>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM cases c WHERE c.id = ?", CASE_COLUMNS);
        let case = conn
            .query_row(&sql, params![id], Self::row_to_case)
            .optional()?;
        Ok(case)
    }

    /// Get a single case with its feedback history, newest first
    pub fn get_case_with_feedbacks(&self, id: i64) -> Result<Option<CaseWithFeedbacks>> {
        let Some(case) = self.get_case(id)? else {
            return Ok(None);
        };
        let feedbacks = self.feedbacks_for_case(case.id)?;
        Ok(Some(CaseWithFeedbacks { case, feedbacks }))
    }

    /// Look up a case by its account identifier, with feedback history
    pub fn get_case_by_acc_id(&self, acc_id: &str) -> Result<Option<CaseWithFeedbacks>> {
        let Some(case) = self.get_case_by_acc_id_only(acc_id)? else {
            return Ok(None);
        };
        let feedbacks = self.feedbacks_for_case(case.id)?;
        Ok(Some(CaseWithFeedbacks { case, feedbacks }))
    }

    pub(crate) fn get_case_by_acc_id_only(&self, acc_id: &str) -> Result<Option<Case>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM cases c WHERE c.acc_id = ?", CASE_COLUMNS);
        let case = conn
            .query_row(&sql, params![acc_id.trim()], Self::row_to_case)
            .optional()?;
        Ok(case)
    }

    /// List cases matching the filter, newest first, with a total count
    pub fn list_cases(
        &self,
        filter: &CaseFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Case>, i64)> {
        let conn = self.conn()?;
        let (where_clause, mut case_params) = Self::case_filter_clauses(filter);

        let sql = format!(
            "SELECT {} FROM cases c {} ORDER BY c.created_at DESC, c.id DESC LIMIT ? OFFSET ?",
            CASE_COLUMNS, where_clause
        );

        let count_sql = format!("SELECT COUNT(*) FROM cases c {}", where_clause);
        let count_refs: Vec<&dyn rusqlite::ToSql> =
            case_params.iter().map(|p| p.as_ref()).collect();
        let total: i64 = conn.query_row(&count_sql, count_refs.as_slice(), |row| row.get(0))?;

        case_params.push(Box::new(limit));
        case_params.push(Box::new(offset));
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            case_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let cases = stmt
            .query_map(params_refs.as_slice(), Self::row_to_case)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((cases, total))
    }

    /// All cases matching the filter, each with its feedback history.
    /// Used by the performance aggregator; the full filtered set is pulled
    /// into memory.
    pub fn cases_with_feedbacks(&self, filter: &CaseFilter) -> Result<Vec<CaseWithFeedbacks>> {
        let conn = self.conn()?;
        let (where_clause, case_params) = Self::case_filter_clauses(filter);

        let sql = format!(
            "SELECT {} FROM cases c {} ORDER BY c.created_at DESC, c.id DESC",
            CASE_COLUMNS, where_clause
        );
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            case_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let cases = stmt
            .query_map(params_refs.as_slice(), Self::row_to_case)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        let mut feedback_map = self.feedbacks_for_filter(filter)?;

        Ok(cases
            .into_iter()
            .map(|case| {
                let feedbacks = feedback_map.remove(&case.id).unwrap_or_default();
                CaseWithFeedbacks { case, feedbacks }
            })
            .collect())
    }

    /// Cases for one period with a non-null executive (leaderboard input)
    pub fn cases_for_period(&self, month: u32, year: i32) -> Result<Vec<Case>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM cases c
             WHERE c.month = ? AND c.year = ? AND c.executive_id IS NOT NULL
             ORDER BY c.id",
            CASE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let cases = stmt
            .query_map(params![month, year], Self::row_to_case)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cases)
    }

    /// Update the lifecycle status of a case
    pub fn update_case_status(&self, id: i64, status: CaseStatus) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE cases SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![status.as_str(), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Case {} not found", id)));
        }
        Ok(())
    }

    /// Count all cases
    pub fn count_cases(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cases", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Build the WHERE clause for a case filter against alias `c`
    pub(crate) fn case_filter_clauses(
        filter: &CaseFilter,
    ) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("c.status = ?".to_string());
            params.push(Box::new(status.as_str().to_string()));
        }
        if let Some(ref bkt) = filter.bkt {
            conditions.push("c.bkt = ?".to_string());
            params.push(Box::new(bkt.clone()));
        }
        if let Some(ref product) = filter.product_type {
            conditions.push("c.product_type = ?".to_string());
            params.push(Box::new(product.clone()));
        }
        if let Some(ref bank) = filter.bank_name {
            conditions.push("c.bank_name = ?".to_string());
            params.push(Box::new(bank.clone()));
        }
        if let Some(ref npa) = filter.npa_status {
            conditions.push("c.npa_status = ?".to_string());
            params.push(Box::new(npa.clone()));
        }
        if let Some(ref priority) = filter.priority {
            conditions.push("c.priority = ?".to_string());
            params.push(Box::new(priority.clone()));
        }
        if let Some(month) = filter.month {
            conditions.push("c.month = ?".to_string());
            params.push(Box::new(month as i64));
        }
        if let Some(year) = filter.year {
            conditions.push("c.year = ?".to_string());
            params.push(Box::new(year as i64));
        }
        if let Some(executive_id) = filter.executive_id {
            conditions.push("c.executive_id = ?".to_string());
            params.push(Box::new(executive_id));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Helper to convert a row to Case
    /// Column order matches `CASE_COLUMNS`
    pub(crate) fn row_to_case(row: &rusqlite::Row) -> rusqlite::Result<Case> {
        let status_str: String = row.get(23)?;
        let month: i64 = row.get(26)?;
        let mode_str: String = row.get(28)?;
        let created_at_str: String = row.get(29)?;
        let updated_at_str: String = row.get(30)?;
        Ok(Case {
            id: row.get(0)?,
            acc_id: row.get(1)?,
            cust_id: row.get(2)?,
            customer_name: row.get(3)?,
            phone_number: row.get(4)?,
            address: row.get(5)?,
            pincode: row.get(6)?,
            lat: row.get(7)?,
            lng: row.get(8)?,
            pos_amount: row.get(9)?,
            overdue_amount: row.get(10)?,
            collection_amount: row.get(11)?,
            toss_amount: row.get(12)?,
            emi_amount: row.get(13)?,
            interest: row.get(14)?,
            dpd: row.get(15)?,
            bkt: row.get(16)?,
            product_type: row.get(17)?,
            sub_product_name: row.get(18)?,
            bank_name: row.get(19)?,
            npa_status: row.get(20)?,
            priority: row.get(21)?,
            performance: row.get(22)?,
            status: status_str.parse().unwrap_or_default(),
            emp_id: row.get(24)?,
            executive_id: row.get(25)?,
            month: month as u32,
            year: row.get::<_, i64>(27)? as i32,
            upload_mode: mode_str.parse().unwrap_or_default(),
            created_at: parse_datetime(&created_at_str),
            updated_at: parse_datetime(&updated_at_str),
        })
    }
}
