//! Append-only audit log

use rusqlite::params;

use super::{AuditEntry, Database};
use crate::error::Result;

impl Database {
    /// Append one audit log entry
    pub fn log_audit(
        &self,
        user_name: &str,
        action: &str,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
        details: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO audit_log (user_name, action, entity_type, entity_id, details)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![user_name, action, entity_type, entity_id, details],
        )?;
        Ok(())
    }

    /// List audit entries, newest first, optionally filtered by action
    pub fn list_audit(
        &self,
        action: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;

        let (sql, params): (&str, Vec<Box<dyn rusqlite::ToSql>>) = match action {
            Some(a) => (
                "SELECT id, timestamp, user_name, action, entity_type, entity_id, details
                 FROM audit_log WHERE action = ?
                 ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
                vec![Box::new(a.to_string()), Box::new(limit), Box::new(offset)],
            ),
            None => (
                "SELECT id, timestamp, user_name, action, entity_type, entity_id, details
                 FROM audit_log
                 ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
                vec![Box::new(limit), Box::new(offset)],
            ),
        };

        let mut stmt = conn.prepare(sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let entries = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    user_name: row.get(2)?,
                    action: row.get(3)?,
                    entity_type: row.get(4)?,
                    entity_id: row.get(5)?,
                    details: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Count audit entries for an action (used by upload history views)
    pub fn count_audit(&self, action: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE action = ?",
            params![action],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
