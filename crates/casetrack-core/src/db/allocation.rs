//! Allocation engine
//!
//! Every entry point here touches only currently-unallocated cases
//! (`executive_id IS NULL`). Reassigning an already-allocated case is the
//! exclusive business of a re-upload through the bulk upsert; the allocation
//! routes guard manual assignments from being clobbered.

use rusqlite::params;
use serde::Serialize;
use tracing::warn;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{AllocationRequest, AllocationResult, AllocationStatus, UnallocatedGroup};

/// Outcome of an allocate-by-empid call with executive verification
#[derive(Debug, Clone, Serialize)]
pub struct AllocationByEmpId {
    pub emp_id: String,
    pub executive_id: i64,
    pub executive_name: String,
    pub cases_allocated: usize,
}

impl Database {
    /// Assign all currently-unallocated cases carrying `emp_id` to the given
    /// executive. Cases that already have an executive are left untouched.
    /// Returns the number of cases updated.
    pub fn allocate_cases_to_executive(&self, emp_id: &str, executive_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE cases SET executive_id = ?, updated_at = CURRENT_TIMESTAMP
             WHERE emp_id = ? AND executive_id IS NULL",
            params![executive_id, emp_id.trim()],
        )?;
        Ok(updated)
    }

    /// Apply single-allocation for each pair in order. A failure on one pair
    /// is recorded in its result and does not stop subsequent pairs.
    pub fn bulk_allocate_cases(
        &self,
        allocations: &[AllocationRequest],
    ) -> Result<Vec<AllocationResult>> {
        let mut results = Vec::with_capacity(allocations.len());

        for request in allocations {
            match self.allocate_cases_to_executive(&request.emp_id, request.executive_id) {
                Ok(updated) => results.push(AllocationResult {
                    emp_id: request.emp_id.clone(),
                    executive_id: request.executive_id,
                    updated,
                    error: None,
                }),
                Err(e) => {
                    warn!(
                        "Allocation failed for emp_id {} -> executive {}: {}",
                        request.emp_id, request.executive_id, e
                    );
                    results.push(AllocationResult {
                        emp_id: request.emp_id.clone(),
                        executive_id: request.executive_id,
                        updated: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(results)
    }

    /// Allocate by employee identifier after verifying the target executive
    /// exists. Fails fast with NotFound before touching any case.
    pub fn allocate_by_emp_id(&self, emp_id: &str, executive_id: i64) -> Result<AllocationByEmpId> {
        let executive = self
            .get_user(executive_id)?
            .ok_or_else(|| Error::NotFound(format!("Executive {} not found", executive_id)))?;

        let updated = self.allocate_cases_to_executive(emp_id, executive_id)?;

        Ok(AllocationByEmpId {
            emp_id: emp_id.trim().to_string(),
            executive_id,
            executive_name: executive.full_name(),
            cases_allocated: updated,
        })
    }

    /// Allocation snapshot: total/allocated/unallocated counts plus the
    /// unallocated count grouped by employee identifier, to drive manual
    /// remediation.
    pub fn allocation_status(&self) -> Result<AllocationStatus> {
        let conn = self.conn()?;

        let allocated: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cases WHERE executive_id IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let unallocated: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cases WHERE executive_id IS NULL",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT emp_id, COUNT(*) FROM cases
             WHERE executive_id IS NULL
             GROUP BY emp_id
             ORDER BY COUNT(*) DESC",
        )?;
        let unallocated_by_emp_id = stmt
            .query_map([], |row| {
                Ok(UnallocatedGroup {
                    emp_id: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(AllocationStatus {
            total: allocated + unallocated,
            allocated,
            unallocated,
            unallocated_by_emp_id,
        })
    }
}
