//! User store and batched employee-identifier resolution

use std::collections::HashMap;

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{EmployeeResolution, ResolvedEmployee, User, UserRole};

impl Database {
    /// Create a user. `emp_id` must be unique when present.
    pub fn create_user(
        &self,
        emp_id: Option<&str>,
        first_name: &str,
        last_name: &str,
        email: Option<&str>,
        role: UserRole,
    ) -> Result<i64> {
        let emp_id = emp_id.map(str::trim).filter(|s| !s.is_empty());
        if let Some(id) = emp_id {
            if self.get_user_by_emp_id(id)?.is_some() {
                return Err(Error::InvalidData(format!(
                    "A user with emp_id {} already exists",
                    id
                )));
            }
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO users (emp_id, first_name, last_name, email, role)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![emp_id, first_name, last_name, email, role.as_str()],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a single user by ID
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, emp_id, first_name, last_name, email, role, created_at
                 FROM users WHERE id = ?",
                params![id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Get a single user by their employee identifier (exact, trimmed match)
    pub fn get_user_by_emp_id(&self, emp_id: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, emp_id, first_name, last_name, email, role, created_at
                 FROM users WHERE emp_id = ?",
                params![emp_id.trim()],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// List all users
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, emp_id, first_name, last_name, email, role, created_at
             FROM users ORDER BY id",
        )?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// List users with the executive role
    pub fn list_executives(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, emp_id, first_name, last_name, email, role, created_at
             FROM users WHERE role = 'executive' ORDER BY id",
        )?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// All users keyed by id (for leaderboard/export name resolution)
    pub fn user_map(&self) -> Result<HashMap<i64, User>> {
        Ok(self
            .list_users()?
            .into_iter()
            .map(|u| (u.id, u))
            .collect())
    }

    /// Resolve a set of free-text employee identifiers to internal user ids
    /// with exactly one batched lookup.
    ///
    /// Returns the match map plus the unmatched identifiers in input order.
    /// Purely advisory: nothing is mutated here.
    pub fn resolve_employee_ids(&self, emp_ids: &[String]) -> Result<EmployeeResolution> {
        if emp_ids.is_empty() {
            return Ok(EmployeeResolution::default());
        }

        let conn = self.conn()?;

        let placeholders: Vec<&str> = emp_ids.iter().map(|_| "?").collect();
        let sql = format!(
            "SELECT id, emp_id, first_name, last_name FROM users WHERE emp_id IN ({})",
            placeholders.join(", ")
        );

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            emp_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();

        let mut stmt = conn.prepare(&sql)?;
        let mut resolution = EmployeeResolution::default();

        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            let user_id: i64 = row.get(0)?;
            let emp_id: String = row.get(1)?;
            let first_name: String = row.get(2)?;
            let last_name: String = row.get(3)?;
            Ok((user_id, emp_id, first_name, last_name))
        })?;

        for row in rows {
            let (user_id, emp_id, first_name, last_name) = row?;
            let emp_id = emp_id.trim().to_string();
            resolution.map.insert(emp_id.clone(), user_id);
            resolution.found.push(ResolvedEmployee {
                emp_id,
                user_id,
                name: format!("{} {}", first_name, last_name).trim().to_string(),
            });
        }

        for emp_id in emp_ids {
            if !resolution.map.contains_key(emp_id.as_str()) {
                resolution.not_found.push(emp_id.clone());
            }
        }

        Ok(resolution)
    }

    /// Helper to convert a row to User
    /// Column order: id, emp_id, first_name, last_name, email, role, created_at
    pub(crate) fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let role_str: String = row.get(5)?;
        let created_at_str: String = row.get(6)?;
        Ok(User {
            id: row.get(0)?,
            emp_id: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            email: row.get(4)?,
            role: role_str.parse().unwrap_or(UserRole::Executive),
            created_at: parse_datetime(&created_at_str),
        })
    }
}
