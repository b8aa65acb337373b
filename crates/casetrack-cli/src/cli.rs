//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Casetrack - Field-collections case management
#[derive(Parser)]
#[command(name = "casetrack")]
#[command(about = "Field-collections case allocation and performance tracker", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path (defaults to the platform data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set CASETRACK_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database status (encryption, counts, allocation)
    Status,

    /// Manage users (executives, supervisors, managers)
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Bulk upload a case allocation sheet
    Import {
        /// CSV sheet to import
        #[arg(short, long)]
        file: PathBuf,

        /// Uploader reference recorded on the manifest
        #[arg(short, long, default_value = "cli")]
        supervisor: String,

        /// Upload mode: ORIGINAL or REFRESH
        #[arg(short, long, default_value = "ORIGINAL")]
        mode: String,
    },

    /// Allocate cases to executives
    Allocate {
        #[command(subcommand)]
        action: AllocateAction,
    },

    /// Performance and leaderboard reports
    Report {
        #[command(subcommand)]
        report_type: ReportType,
    },

    /// Visited-case queries
    Visited {
        #[command(subcommand)]
        action: VisitedAction,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a
        /// network. By default, the server requires an API key from
        /// CASETRACK_API_KEYS.
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
pub enum UsersAction {
    /// Register a user
    Add {
        /// Employee identifier as used in allocation sheets
        #[arg(long)]
        emp_id: Option<String>,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        #[arg(long)]
        email: Option<String>,

        /// Role: executive, supervisor, manager, admin
        #[arg(long, default_value = "executive")]
        role: String,
    },

    /// List all users
    List,
}

#[derive(Subcommand)]
pub enum AllocateAction {
    /// Allocate all unassigned cases carrying an employee identifier
    Single {
        #[arg(long)]
        emp_id: String,

        #[arg(long)]
        executive_id: i64,
    },

    /// Allocate with executive verification (fails on unknown executive)
    ByEmpId {
        #[arg(long)]
        emp_id: String,

        #[arg(long)]
        executive_id: i64,
    },

    /// Show total/allocated/unallocated counts and the unallocated
    /// breakdown by employee identifier
    Status,
}

#[derive(Subcommand)]
pub enum ReportType {
    /// Full performance aggregate for one executive
    Performance {
        #[arg(long)]
        executive_id: i64,

        /// Month 1-12 (defaults to the current month)
        #[arg(long)]
        month: Option<u32>,

        /// Year (defaults to the current year)
        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        bank: Option<String>,

        #[arg(long)]
        product: Option<String>,

        #[arg(long)]
        bkt: Option<String>,
    },

    /// Ranked executive leaderboard for a period
    Leaderboard {
        /// Month 1-12 (defaults to the current month)
        #[arg(long)]
        month: Option<u32>,

        /// Year (defaults to the current year)
        #[arg(long)]
        year: Option<i32>,
    },
}

#[derive(Subcommand)]
pub enum VisitedAction {
    /// Export visited cases with all feedback fields as CSV
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        month: Option<u32>,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        bank: Option<String>,

        #[arg(long)]
        product: Option<String>,

        #[arg(long)]
        bkt: Option<String>,

        /// Maximum cases to export
        #[arg(long, default_value = "1000")]
        limit: i64,
    },
}
