//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `users` - User store and batched employee-identifier resolution
//! - `cases` - Case CRUD, filtered queries, status transitions
//! - `uploads` - Upload manifests and the batched bulk-upsert pipeline
//! - `allocation` - Allocation engine (single, bulk, by-empid, status)
//! - `feedback` - Visit feedback, fraud audit, PTP tracking, visited cases
//! - `audit` - Append-only audit log

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod allocation;
mod audit;
mod cases;
mod feedback;
mod uploads;
mod users;

pub use allocation::AllocationByEmpId;
pub use feedback::{FakeVisitSummary, PtpAlert};
pub use uploads::{SAMPLE_LIMIT, UPSERT_BATCH_SIZE};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "CASETRACK_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the
/// same key, regardless of database path. This allows moving/renaming/
/// restoring the database freely.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing
    // encrypted databases
    const APP_SALT: &[u8; 16] = b"casetrack-slt-v1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `CASETRACK_DB_KEY` environment variable to be set.
    /// The database will be encrypted using SQLCipher with a key derived
    /// from the passphrase via Argon2.
    ///
    /// Returns an error if `CASETRACK_DB_KEY` is not set. Use
    /// `new_unencrypted()` for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: This creates an unencrypted database. Only use for
    /// development or testing. For production, use `new()` with
    /// `CASETRACK_DB_KEY` set.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = match passphrase {
            Some(pass) => {
                let key = derive_key(pass)?;
                Some(format!("PRAGMA key = 'x\"{}\"';", key))
            }
            None => None,
        };

        // Per-connection pragmas: the key must be set before anything else,
        // foreign_keys and busy_timeout apply to each connection (not the
        // database file). busy_timeout keeps concurrent batch upserts from
        // failing with SQLITE_BUSY under WAL's single-writer rule.
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(pragma) = &key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!(
            "{}/casetrack_test_{}_{}.db",
            std::env::temp_dir().display(),
            std::process::id(),
            id
        );

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- Performance pragmas for local storage (SSD/M.2 recommended)
            -- WAL mode: better concurrency, readers don't block writers
            -- Note: creates -wal and -shm sidecar files alongside the database
            PRAGMA journal_mode = WAL;

            -- Cache size: ~8MB (2000 pages * 4KB default page size)
            PRAGMA cache_size = 2000;

            -- Synchronous NORMAL: good balance of safety and performance
            PRAGMA synchronous = NORMAL;

            -- Store temp tables in memory (faster for complex queries)
            PRAGMA temp_store = MEMORY;

            -- Users (field executives, supervisors, managers, admins)
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                emp_id TEXT UNIQUE,                        -- free-text employee identifier
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT,
                role TEXT NOT NULL DEFAULT 'executive',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

            -- Cases (debt-collection account records)
            CREATE TABLE IF NOT EXISTS cases (
                id INTEGER PRIMARY KEY,
                acc_id TEXT NOT NULL UNIQUE,               -- upsert key, immutable
                cust_id TEXT,
                customer_name TEXT NOT NULL DEFAULT '',
                phone_number TEXT,
                address TEXT NOT NULL DEFAULT '',
                pincode TEXT,
                lat REAL,                                  -- registered address coordinates
                lng REAL,
                pos_amount REAL NOT NULL DEFAULT 0,        -- principal outstanding
                overdue_amount REAL NOT NULL DEFAULT 0,
                collection_amount REAL NOT NULL DEFAULT 0, -- recovered to date
                toss_amount REAL NOT NULL DEFAULT 0,
                emi_amount REAL NOT NULL DEFAULT 0,
                interest REAL NOT NULL DEFAULT 0,
                dpd INTEGER NOT NULL DEFAULT 0,            -- days past due
                bkt TEXT,                                  -- delinquency-age bucket
                product_type TEXT NOT NULL DEFAULT '',
                sub_product_name TEXT,
                bank_name TEXT NOT NULL DEFAULT '',
                npa_status TEXT,
                priority TEXT NOT NULL DEFAULT '',
                performance TEXT,                          -- FLOW/RB/NORM/STAB free text
                status TEXT NOT NULL DEFAULT 'OPEN',       -- OPEN, PAID, CLOSED
                emp_id TEXT,                               -- identifier from upload source
                executive_id INTEGER REFERENCES users(id), -- NULL = unallocated
                month INTEGER NOT NULL,
                year INTEGER NOT NULL,
                upload_mode TEXT NOT NULL DEFAULT 'ORIGINAL',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_cases_executive ON cases(executive_id);
            CREATE INDEX IF NOT EXISTS idx_cases_emp_id ON cases(emp_id);
            CREATE INDEX IF NOT EXISTS idx_cases_period ON cases(year, month);
            CREATE INDEX IF NOT EXISTS idx_cases_bank ON cases(bank_name);
            CREATE INDEX IF NOT EXISTS idx_cases_product ON cases(product_type);
            CREATE INDEX IF NOT EXISTS idx_cases_bkt ON cases(bkt);
            CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(status);

            -- Visit feedback (one case owns many feedbacks)
            CREATE TABLE IF NOT EXISTS feedbacks (
                id INTEGER PRIMARY KEY,
                case_id INTEGER NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
                executive_id INTEGER REFERENCES users(id),
                visit_code TEXT NOT NULL,
                who_met TEXT,
                relation TEXT,
                met_name TEXT,
                meeting_place TEXT,
                remarks TEXT,
                photo_url TEXT,
                lat REAL,                                  -- capture coordinates
                lng REAL,
                device_info TEXT,                          -- JSON device metadata
                distance_from_address REAL,                -- meters, fraud signal
                ptp_date DATE,
                ptp_broken BOOLEAN NOT NULL DEFAULT 0,
                is_fake_visit BOOLEAN NOT NULL DEFAULT 0,
                fake_visit_reason TEXT,
                status TEXT NOT NULL DEFAULT 'Visited',    -- Visited, Rejected, Fake
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_feedbacks_case ON feedbacks(case_id);
            CREATE INDEX IF NOT EXISTS idx_feedbacks_executive ON feedbacks(executive_id);
            CREATE INDEX IF NOT EXISTS idx_feedbacks_ptp ON feedbacks(ptp_date);
            CREATE INDEX IF NOT EXISTS idx_feedbacks_status ON feedbacks(status);

            -- Upload manifests (one row per bulk upload, never mutated)
            CREATE TABLE IF NOT EXISTS case_uploads (
                id INTEGER PRIMARY KEY,
                supervisor TEXT NOT NULL,
                filename TEXT,
                content_hash TEXT,                         -- SHA256 of uploaded bytes
                upload_mode TEXT NOT NULL DEFAULT 'ORIGINAL',
                total_cases INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_case_uploads_created ON case_uploads(created_at);

            -- Audit log (tracks uploads, row processing, and API access)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                user_name TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id INTEGER,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_user ON audit_log(user_name);
            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log(action);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

/// Audit log entry
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub user_name: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
}
