//! Report commands (performance, leaderboard, visited export)

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Datelike;

use casetrack_core::db::Database;
use casetrack_core::export::{visit_rows, write_visits_csv};
use casetrack_core::leaderboard::build_leaderboard;
use casetrack_core::models::CaseFilter;
use casetrack_core::perf::aggregate_performance;

fn resolve_period(month: Option<u32>, year: Option<i32>) -> (u32, i32) {
    let today = chrono::Utc::now().date_naive();
    (
        month.unwrap_or_else(|| today.month()),
        year.unwrap_or_else(|| today.year()),
    )
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_report_performance(
    db: &Database,
    executive_id: i64,
    month: Option<u32>,
    year: Option<i32>,
    bank: Option<&str>,
    product: Option<&str>,
    bkt: Option<&str>,
) -> Result<()> {
    let executive = db
        .get_user(executive_id)?
        .ok_or_else(|| anyhow::anyhow!("Executive {} not found", executive_id))?;

    let (month, year) = resolve_period(month, year);
    let filter = CaseFilter {
        executive_id: Some(executive_id),
        month: Some(month),
        year: Some(year),
        bank_name: bank.map(str::to_string),
        product_type: product.map(str::to_string),
        bkt: bkt.map(str::to_string),
        ..Default::default()
    };

    let cases = db.cases_with_feedbacks(&filter)?;
    let summary = aggregate_performance(&cases);

    println!(
        "Performance: {} ({}/{})",
        executive.full_name(),
        month,
        year
    );
    println!(
        "  Cases: {}  POS: {:.2}  Banks: {}  Products: {}",
        summary.total_cases, summary.total_pos, summary.total_banks, summary.total_products
    );
    println!(
        "  Visited: {} ({:.1}%)  Visits: {}",
        summary.total_visited_cases, summary.visit_rate, summary.total_visits
    );
    println!(
        "  FLOW: {}  RB: {}  NORM: {}  STAB: {}",
        summary.flow_count, summary.rb_count, summary.norm_count, summary.stab_count
    );
    println!(
        "  POS non-FLOW: {:.2} ({:.2}%)  RB: {:.2} ({:.2}%)  NORM: {:.2} ({:.2}%)",
        summary.pos_not_flow,
        summary.pos_not_flow_rate,
        summary.pos_rb,
        summary.pos_rb_rate,
        summary.pos_norm,
        summary.pos_norm_rate
    );
    println!(
        "  Recovered: {:.2} (non-FLOW {:.2})  Recovery rate: {:.2}%",
        summary.total_recovered_amount, summary.paid_recovered_amount, summary.recovery_rate
    );

    for bank in &summary.bank_breakdown {
        println!();
        println!(
            "  {} - {} cases, POS {:.2}, non-FLOW {:.2}%",
            bank.bank_name,
            bank.metrics.total_cases,
            bank.metrics.total_pos,
            bank.metrics.pos_not_flow_rate
        );
        for product in &bank.products {
            println!(
                "    {} - {} cases, POS {:.2}",
                product.product_name, product.metrics.total_cases, product.metrics.total_pos
            );
            for bkt in &product.bkts {
                println!(
                    "      bkt {} - {} cases, POS {:.2}",
                    bkt.bkt, bkt.metrics.total_cases, bkt.metrics.total_pos
                );
            }
        }
    }

    Ok(())
}

pub fn cmd_report_leaderboard(
    db: &Database,
    month: Option<u32>,
    year: Option<i32>,
) -> Result<()> {
    let (month, year) = resolve_period(month, year);

    let cases = db.cases_for_period(month, year)?;
    let users = db.user_map()?;
    let rows = build_leaderboard(&cases, &users);

    if rows.is_empty() {
        println!("No ranked executives for {}/{}", month, year);
        return Ok(());
    }

    println!("Leaderboard {}/{}", month, year);
    println!(
        "{:<5} {:<10} {:<22} {:>7} {:>12} {:>10} {:>10}",
        "RANK", "EMP_ID", "NAME", "CASES", "POS", "NON-FLOW%", "RB+NORM%"
    );
    for row in rows {
        println!(
            "{:<5} {:<10} {:<22} {:>7} {:>12.2} {:>9.2}% {:>9.2}%",
            row.rank,
            row.emp_id.as_deref().unwrap_or("-"),
            row.name,
            row.total_cases,
            row.total_pos,
            row.pos_not_flow_rate,
            row.pos_rb_rate + row.pos_norm_rate
        );
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_visited_export(
    db: &Database,
    output: &Path,
    month: Option<u32>,
    year: Option<i32>,
    bank: Option<&str>,
    product: Option<&str>,
    bkt: Option<&str>,
    limit: i64,
) -> Result<()> {
    let filter = CaseFilter {
        month,
        year,
        bank_name: bank.map(str::to_string),
        product_type: product.map(str::to_string),
        bkt: bkt.map(str::to_string),
        ..Default::default()
    };

    let (cases, total) = db.visited_cases(&filter, limit.max(1), 0)?;
    let users = db.user_map()?;
    let rows = visit_rows(&cases, &users);

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    write_visits_csv(file, &rows)?;

    println!(
        "✅ Exported {} visit rows across {} cases to {}",
        rows.len(),
        cases.len(),
        output.display()
    );
    if total > cases.len() as i64 {
        println!(
            "   ({} visited cases matched; raise --limit to export more)",
            total
        );
    }

    Ok(())
}
