//! Upload manifests and the batched bulk-upsert pipeline

use std::collections::HashMap;

use chrono::Datelike;
use rusqlite::params;
use tracing::{debug, warn};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{BulkUpsertOutcome, Case, CaseDraft, CaseUpload, UploadMode};

use super::cases::CASE_COLUMNS;

/// Cases upserted per batch. Upserts within a batch run concurrently;
/// batches run strictly one after another to bound in-flight writes.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Cap on the case sample returned from a bulk upload (response-size control)
pub const SAMPLE_LIMIT: i64 = 100;

impl Database {
    /// Create one upload manifest row. Manifests are never mutated.
    pub fn create_case_upload(
        &self,
        supervisor: &str,
        filename: Option<&str>,
        content_hash: Option<&str>,
        mode: UploadMode,
        total_cases: i64,
    ) -> Result<CaseUpload> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO case_uploads (supervisor, filename, content_hash, upload_mode, total_cases)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![supervisor, filename, content_hash, mode.as_str(), total_cases],
        )?;

        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT id, supervisor, filename, content_hash, upload_mode, total_cases, created_at
             FROM case_uploads WHERE id = ?",
            params![id],
            Self::row_to_upload,
        )
        .map_err(Into::into)
    }

    /// List upload manifests, newest first
    pub fn list_case_uploads(&self, limit: i64) -> Result<Vec<CaseUpload>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, supervisor, filename, content_hash, upload_mode, total_cases, created_at
             FROM case_uploads ORDER BY created_at DESC, id DESC LIMIT ?",
        )?;
        let uploads = stmt
            .query_map(params![limit], Self::row_to_upload)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(uploads)
    }

    /// Idempotent bulk upsert of case drafts, keyed by account identifier.
    ///
    /// Creates the manifest first, then processes fixed-size batches: every
    /// upsert within a batch is dispatched concurrently (fire-and-await-all)
    /// and batches run sequentially. A failed row is counted, not raised -
    /// batches already committed stay committed and the caller reads the
    /// outcome counts, not exceptions.
    ///
    /// `employee_map` is the identifier->executive mapping resolved once for
    /// this upload; the executive reference on every upserted row is taken
    /// fresh from it, even for cases that already had an executive. (The
    /// allocation engine, by contrast, never overwrites an existing
    /// assignment.)
    pub async fn bulk_upsert_cases(
        &self,
        drafts: Vec<CaseDraft>,
        employee_map: &HashMap<String, i64>,
        supervisor: &str,
        mode: UploadMode,
        filename: Option<&str>,
        content_hash: Option<&str>,
    ) -> Result<BulkUpsertOutcome> {
        let upload = self.create_case_upload(
            supervisor,
            filename,
            content_hash,
            mode,
            drafts.len() as i64,
        )?;

        if let Err(e) = self.log_audit(
            supervisor,
            "case_upload",
            Some("case_upload"),
            Some(upload.id),
            Some(&format!("mode={}, total_rows={}", mode, drafts.len())),
        ) {
            warn!("Failed to write upload audit entry: {}", e);
        }

        let today = chrono::Utc::now().date_naive();
        let default_month = today.month();
        let default_year = today.year();

        let mut upserted = 0usize;
        let mut failed = 0usize;
        let mut batch_no = 0usize;

        let mut iter = drafts.into_iter();
        loop {
            let batch: Vec<CaseDraft> = iter.by_ref().take(UPSERT_BATCH_SIZE).collect();
            if batch.is_empty() {
                break;
            }
            batch_no += 1;
            let batch_len = batch.len();

            let mut handles = Vec::with_capacity(batch_len);
            for draft in batch {
                let db = self.clone();
                let supervisor = supervisor.to_string();
                let executive_id = draft
                    .emp_id
                    .as_deref()
                    .and_then(|emp| employee_map.get(emp))
                    .copied();

                handles.push(tokio::task::spawn_blocking(move || {
                    let result =
                        db.upsert_case(&draft, executive_id, mode, default_month, default_year);
                    if result.is_ok() {
                        if let Err(e) = db.log_audit(
                            &supervisor,
                            "case_row_processed",
                            Some("case"),
                            None,
                            Some(&format!(
                                "acc_id={}, emp_id={:?}, executive_id={:?}",
                                draft.acc_id, draft.emp_id, executive_id
                            )),
                        ) {
                            warn!("Failed to write row audit entry: {}", e);
                        }
                    }
                    result
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => upserted += 1,
                    Ok(Err(e)) => {
                        failed += 1;
                        warn!("Case upsert failed: {}", e);
                    }
                    Err(e) => {
                        failed += 1;
                        warn!("Case upsert task failed: {}", e);
                    }
                }
            }

            debug!(
                "Batch {}: upserted {} cases ({} total, {} failed)",
                batch_no, batch_len, upserted, failed
            );
        }

        let sample = self.recent_cases_for_mode(mode, SAMPLE_LIMIT)?;

        Ok(BulkUpsertOutcome {
            upload,
            upserted,
            failed,
            sample,
        })
    }

    /// Create-or-update one case by account identifier.
    ///
    /// On conflict every mutable field is replaced (full overwrite, not a
    /// merge); lifecycle status and creation time are left untouched.
    pub(crate) fn upsert_case(
        &self,
        draft: &CaseDraft,
        executive_id: Option<i64>,
        mode: UploadMode,
        default_month: u32,
        default_year: i32,
    ) -> Result<()> {
        let acc_id = draft.acc_id.trim();
        if acc_id.is_empty() {
            return Err(Error::InvalidData("acc_id must not be blank".to_string()));
        }

        let month = draft.month.unwrap_or(default_month);
        let year = draft.year.unwrap_or(default_year);

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
            ON CONFLICT(acc_id) DO UPDATE SET
                cust_id = excluded.cust_id,
                customer_name = excluded.customer_name,
                phone_number = excluded.phone_number,
                address = excluded.address,
                pincode = excluded.pincode,
                lat = excluded.lat,
                lng = excluded.lng,
                pos_amount = excluded.pos_amount,
                overdue_amount = excluded.overdue_amount,
                collection_amount = excluded.collection_amount,
                toss_amount = excluded.toss_amount,
                emi_amount = excluded.emi_amount,
                interest = excluded.interest,
                dpd = excluded.dpd,
                bkt = excluded.bkt,
                product_type = excluded.product_type,
                sub_product_name = excluded.sub_product_name,
                bank_name = excluded.bank_name,
                npa_status = excluded.npa_status,
                priority = excluded.priority,
                performance = excluded.performance,
                emp_id = excluded.emp_id,
                executive_id = excluded.executive_id,
                month = excluded.month,
                year = excluded.year,
                upload_mode = excluded.upload_mode,
                updated_at = CURRENT_TIMESTAMP
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
                executive_id,
                month,
                year,
                mode.as_str(),
            ],
        )?;

        Ok(())
    }

    /// Most recently touched cases for an upload mode (the outcome sample)
    pub(crate) fn recent_cases_for_mode(
        &self,
        mode: UploadMode,
        limit: i64,
    ) -> Result<Vec<Case>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM cases c WHERE c.upload_mode = ?
             ORDER BY c.updated_at DESC, c.id DESC LIMIT ?",
            CASE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let cases = stmt
            .query_map(params![mode.as_str(), limit], Self::row_to_case)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cases)
    }

    /// Helper to convert a row to CaseUpload
    /// Column order: id, supervisor, filename, content_hash, upload_mode,
    /// total_cases, created_at
    fn row_to_upload(row: &rusqlite::Row) -> rusqlite::Result<CaseUpload> {
        let mode_str: String = row.get(4)?;
        let created_at_str: String = row.get(6)?;
        Ok(CaseUpload {
            id: row.get(0)?,
            supervisor: row.get(1)?,
            filename: row.get(2)?,
            content_hash: row.get(3)?,
            upload_mode: mode_str.parse().unwrap_or_default(),
            total_cases: row.get(5)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}
