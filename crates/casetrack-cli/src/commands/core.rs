//! Core commands (init, status) and shared utilities

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use casetrack_core::db::Database;

/// Resolve the database path: explicit --db wins, otherwise the platform
/// data directory (~/.local/share/casetrack on Linux), otherwise the
/// working directory.
pub fn resolve_db_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match dirs::data_dir() {
        Some(data) => data.join("casetrack").join("casetrack.db"),
        None => PathBuf::from("casetrack.db"),
    }
}

/// Open the database, honoring the encryption flag
pub fn open_db(path: &Path, no_encrypt: bool) -> Result<Database> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let path_str = path.to_string_lossy();
    let db = if no_encrypt {
        Database::new_unencrypted(&path_str)?
    } else {
        Database::new(&path_str)?
    };
    Ok(db)
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    println!("✅ Database initialized at {}", db.path());
    if no_encrypt {
        println!("⚠️  Encryption disabled - not recommended for production");
    }
    Ok(())
}

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let encrypted = db.is_encrypted().unwrap_or(false);
    let cases = db.count_cases()?;
    let users = db.list_users()?.len();
    let uploads = db.list_case_uploads(1000)?.len();
    let allocation = db.allocation_status()?;

    println!("Database: {}", db.path());
    println!("Encrypted: {}", if encrypted { "yes" } else { "no" });
    println!("Users: {}", users);
    println!("Uploads: {}", uploads);
    println!("Cases: {}", cases);
    println!(
        "  Allocated: {}  Unallocated: {}",
        allocation.allocated, allocation.unallocated
    );

    Ok(())
}
