//! Allocation engine commands

use anyhow::Result;
use casetrack_core::db::Database;

pub fn cmd_allocate_single(db: &Database, emp_id: &str, executive_id: i64) -> Result<()> {
    let updated = db.allocate_cases_to_executive(emp_id, executive_id)?;
    println!(
        "✅ Allocated {} cases from emp_id {} to executive {}",
        updated, emp_id, executive_id
    );
    if updated == 0 {
        println!("   (no unallocated cases carried that identifier)");
    }
    Ok(())
}

pub fn cmd_allocate_by_emp_id(db: &Database, emp_id: &str, executive_id: i64) -> Result<()> {
    let outcome = db.allocate_by_emp_id(emp_id, executive_id)?;
    println!(
        "✅ Allocated {} cases from emp_id {} to {} (executive {})",
        outcome.cases_allocated, outcome.emp_id, outcome.executive_name, outcome.executive_id
    );
    Ok(())
}

pub fn cmd_allocate_status(db: &Database) -> Result<()> {
    let status = db.allocation_status()?;

    println!("Total cases: {}", status.total);
    println!("Allocated:   {}", status.allocated);
    println!("Unallocated: {}", status.unallocated);

    if !status.unallocated_by_emp_id.is_empty() {
        println!();
        println!("Unallocated by employee identifier:");
        for group in &status.unallocated_by_emp_id {
            println!(
                "  {:<12} {}",
                group.emp_id.as_deref().unwrap_or("(none)"),
                group.count
            );
        }
    }

    Ok(())
}
