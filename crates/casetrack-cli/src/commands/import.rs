//! Bulk sheet upload command

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use casetrack_core::import::{distinct_employee_ids, parse_case_sheet};
use casetrack_core::models::UploadMode;

use super::open_db;

pub async fn cmd_import(
    db_path: &Path,
    file: &Path,
    supervisor: &str,
    mode_str: &str,
    no_encrypt: bool,
) -> Result<()> {
    let mode: UploadMode = mode_str.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let mut sheet = File::open(file)
        .with_context(|| format!("Failed to open file: {}", file.display()))?;
    let mut bytes = Vec::new();
    sheet.read_to_end(&mut bytes)?;

    let content_hash = hex::encode(Sha256::digest(&bytes));
    let filename = file.file_name().map(|n| n.to_string_lossy().to_string());

    println!("📥 Importing {} ({} mode)...", file.display(), mode);

    // A malformed sheet fails the whole upload before any row work
    let parsed = parse_case_sheet(bytes.as_slice())?;
    println!(
        "   Parsed {} rows: {} drafts, {} skipped",
        parsed.total_rows,
        parsed.drafts.len(),
        parsed.skipped.len()
    );

    for skip in &parsed.skipped {
        println!("   ⚠️  Row {}: {}", skip.row_number, skip.reason);
    }

    let db = open_db(db_path, no_encrypt)?;

    let emp_ids = distinct_employee_ids(&parsed.drafts);
    let resolution = db.resolve_employee_ids(&emp_ids)?;
    println!(
        "   Resolved {}/{} employee identifiers",
        resolution.found.len(),
        emp_ids.len()
    );
    if !resolution.not_found.is_empty() {
        println!("   Not found: {}", resolution.not_found.join(", "));
    }

    let outcome = db
        .bulk_upsert_cases(
            parsed.drafts,
            &resolution.map,
            supervisor,
            mode,
            filename.as_deref(),
            Some(&content_hash),
        )
        .await?;

    println!("✅ Upload complete! (manifest {})", outcome.upload.id);
    println!("   Upserted: {}", outcome.upserted);
    if outcome.failed > 0 {
        println!("   Failed: {}", outcome.failed);
    }

    let allocation = db.allocation_status()?;
    println!(
        "   Allocation: {} allocated, {} unallocated",
        allocation.allocated, allocation.unallocated
    );

    Ok(())
}
