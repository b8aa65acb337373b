//! Casetrack Core Library
//!
//! Shared functionality for the Casetrack field-collections case manager:
//! - Database access and migrations
//! - Row normalizer for heterogeneous case allocation sheets
//! - Batched employee-identifier resolution and bulk case upsert
//! - Allocation engine for assigning cases to field executives
//! - Performance aggregation (bank -> product -> bucket) and leaderboard
//! - Visit feedback with fraud audit and promise-to-pay tracking
//! - Visited-case export

pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod leaderboard;
pub mod models;
pub mod perf;

pub use db::{AuditEntry, Database};
pub use error::{Error, Result};
pub use export::{visit_rows, write_visits_csv, VisitExportRow};
pub use import::{distinct_employee_ids, parse_case_sheet};
pub use leaderboard::{build_leaderboard, rank_order, LeaderboardRow};
pub use perf::{aggregate_performance, PerformanceSummary};
