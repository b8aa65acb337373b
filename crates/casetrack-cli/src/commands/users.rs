//! User registration and listing commands

use anyhow::Result;
use casetrack_core::db::Database;
use casetrack_core::models::UserRole;

pub fn cmd_users_add(
    db: &Database,
    emp_id: Option<&str>,
    first_name: &str,
    last_name: &str,
    email: Option<&str>,
    role: &str,
) -> Result<()> {
    let role: UserRole = role.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let id = db.create_user(emp_id, first_name, last_name, email, role)?;

    println!(
        "✅ Created {} {} {} (id {})",
        role, first_name, last_name, id
    );
    if let Some(emp) = emp_id {
        println!("   emp_id: {}", emp);
    }
    Ok(())
}

pub fn cmd_users_list(db: &Database) -> Result<()> {
    let users = db.list_users()?;
    if users.is_empty() {
        println!("No users registered. Add one with: casetrack users add");
        return Ok(());
    }

    println!("{:<5} {:<10} {:<25} {:<12}", "ID", "EMP_ID", "NAME", "ROLE");
    for user in users {
        println!(
            "{:<5} {:<10} {:<25} {:<12}",
            user.id,
            user.emp_id.as_deref().unwrap_or("-"),
            user.full_name(),
            user.role
        );
    }
    Ok(())
}
