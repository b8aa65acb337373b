//! Casetrack CLI - Field-collections case manager
//!
//! Usage:
//!   casetrack init                   Initialize database
//!   casetrack users add ...          Register executives and supervisors
//!   casetrack import --file CSV      Bulk upload a case allocation sheet
//!   casetrack allocate single ...    Allocate cases to an executive
//!   casetrack report leaderboard     Rank executives for a period
//!   casetrack serve --port 3000      Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let db_path = commands::resolve_db_path(cli.db.as_deref());

    match cli.command {
        Commands::Init => commands::cmd_init(&db_path, cli.no_encrypt),
        Commands::Status => commands::cmd_status(&db_path, cli.no_encrypt),
        Commands::Users { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                UsersAction::Add {
                    emp_id,
                    first_name,
                    last_name,
                    email,
                    role,
                } => commands::cmd_users_add(
                    &db,
                    emp_id.as_deref(),
                    &first_name,
                    &last_name,
                    email.as_deref(),
                    &role,
                ),
                UsersAction::List => commands::cmd_users_list(&db),
            }
        }
        Commands::Import {
            file,
            supervisor,
            mode,
        } => {
            commands::cmd_import(&db_path, &file, &supervisor, &mode, cli.no_encrypt).await
        }
        Commands::Allocate { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                AllocateAction::Single {
                    emp_id,
                    executive_id,
                } => commands::cmd_allocate_single(&db, &emp_id, executive_id),
                AllocateAction::ByEmpId {
                    emp_id,
                    executive_id,
                } => commands::cmd_allocate_by_emp_id(&db, &emp_id, executive_id),
                AllocateAction::Status => commands::cmd_allocate_status(&db),
            }
        }
        Commands::Report { report_type } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match report_type {
                ReportType::Performance {
                    executive_id,
                    month,
                    year,
                    bank,
                    product,
                    bkt,
                } => commands::cmd_report_performance(
                    &db,
                    executive_id,
                    month,
                    year,
                    bank.as_deref(),
                    product.as_deref(),
                    bkt.as_deref(),
                ),
                ReportType::Leaderboard { month, year } => {
                    commands::cmd_report_leaderboard(&db, month, year)
                }
            }
        }
        Commands::Visited { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                VisitedAction::Export {
                    output,
                    month,
                    year,
                    bank,
                    product,
                    bkt,
                    limit,
                } => commands::cmd_visited_export(
                    &db,
                    &output,
                    month,
                    year,
                    bank.as_deref(),
                    product.as_deref(),
                    bkt.as_deref(),
                    limit,
                ),
            }
        }
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&db_path, &host, port, no_auth, cli.no_encrypt).await,
    }
}
