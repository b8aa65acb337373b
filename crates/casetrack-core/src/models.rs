//! Domain models for Casetrack

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A system user (field executive, supervisor, manager, or admin)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Free-text employee identifier as used in allocation sheets.
    /// Only executives normally carry one.
    pub emp_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// User roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Executive,
    Supervisor,
    Manager,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executive => "executive",
            Self::Supervisor => "supervisor",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "executive" => Ok(Self::Executive),
            "supervisor" => Ok(Self::Supervisor),
            "manager" => Ok(Self::Manager),
            "admin" | "super_admin" => Ok(Self::Admin),
            _ => Err(format!("Unknown user role: {}", s)),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Case lifecycle status. Cases are never hard-deleted; they transition
/// to PAID or CLOSED instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaseStatus {
    #[default]
    Open,
    Paid,
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Paid => "PAID",
            Self::Closed => "CLOSED",
        }
    }

    /// PAID and CLOSED cases count as resolved in performance reports
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Paid | Self::Closed)
    }
}

impl std::str::FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "PAID" => Ok(Self::Paid),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(format!("Unknown case status: {}", s)),
        }
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Upload mode recorded on the manifest and on each upserted case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadMode {
    #[default]
    Original,
    Refresh,
}

impl UploadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "ORIGINAL",
            Self::Refresh => "REFRESH",
        }
    }
}

impl std::str::FromStr for UploadMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ORIGINAL" => Ok(Self::Original),
            "REFRESH" => Ok(Self::Refresh),
            _ => Err(format!("Unknown upload mode: {}", s)),
        }
    }
}

impl std::fmt::Display for UploadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized performance status of a case.
///
/// Source data carries free-text labels; `parse` trims and upper-cases the
/// label and anything unrecognized is treated as unknown (None).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PerformanceStatus {
    Flow,
    Rb,
    Norm,
    Stab,
}

impl PerformanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flow => "FLOW",
            Self::Rb => "RB",
            Self::Norm => "NORM",
            Self::Stab => "STAB",
        }
    }

    /// Normalize a free-text performance label. Unrecognized or blank
    /// labels yield None (the "unknown" bucket in aggregation).
    pub fn parse(label: Option<&str>) -> Option<Self> {
        match label?.trim().to_uppercase().as_str() {
            "FLOW" => Some(Self::Flow),
            "RB" => Some(Self::Rb),
            "NORM" => Some(Self::Norm),
            "STAB" => Some(Self::Stab),
            _ => None,
        }
    }
}

impl std::fmt::Display for PerformanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A debt-collection account record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: i64,
    /// Account identifier - unique, immutable once created (the upsert key)
    pub acc_id: String,
    pub cust_id: Option<String>,
    pub customer_name: String,
    pub phone_number: Option<String>,
    pub address: String,
    pub pincode: Option<String>,
    /// Registered address coordinates (used for fake-visit distance checks)
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Principal outstanding balance
    pub pos_amount: f64,
    pub overdue_amount: f64,
    /// Amount recovered to date
    pub collection_amount: f64,
    pub toss_amount: f64,
    pub emi_amount: f64,
    pub interest: f64,
    /// Days past due
    pub dpd: i64,
    /// Delinquency-age bucket code
    pub bkt: Option<String>,
    pub product_type: String,
    pub sub_product_name: Option<String>,
    pub bank_name: String,
    pub npa_status: Option<String>,
    pub priority: String,
    /// Free-text performance label (FLOW/RB/NORM/STAB or anything else);
    /// normalized at aggregation time, stored as supplied
    pub performance: Option<String>,
    pub status: CaseStatus,
    /// Free-text employee identifier as supplied by the upload source
    pub emp_id: Option<String>,
    /// Resolved internal owner - None means unallocated
    pub executive_id: Option<i64>,
    pub month: u32,
    pub year: i32,
    pub upload_mode: UploadMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A canonical case draft produced by the row normalizer, before upsert
#[derive(Debug, Clone, Default)]
pub struct CaseDraft {
    pub acc_id: String,
    pub cust_id: Option<String>,
    pub customer_name: String,
    pub phone_number: Option<String>,
    pub address: String,
    pub pincode: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub pos_amount: f64,
    pub overdue_amount: f64,
    pub collection_amount: f64,
    pub toss_amount: f64,
    pub emi_amount: f64,
    pub interest: f64,
    pub dpd: i64,
    pub bkt: Option<String>,
    pub product_type: String,
    pub sub_product_name: Option<String>,
    pub bank_name: String,
    pub npa_status: Option<String>,
    pub priority: String,
    pub performance: Option<String>,
    /// Trimmed free-text employee identifier extracted from the row
    pub emp_id: Option<String>,
    /// Period; None defaults to the upload date's month/year at upsert time
    pub month: Option<u32>,
    pub year: Option<i32>,
}

/// A row rejected by the normalizer, tagged with its 1-based sheet row
/// number (counting the header row)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedRow {
    pub row_number: usize,
    pub reason: String,
}

/// Output of parsing one allocation sheet
#[derive(Debug, Clone, Default)]
pub struct SheetParse {
    pub drafts: Vec<CaseDraft>,
    pub skipped: Vec<SkippedRow>,
    /// Total data rows seen (accepted + skipped)
    pub total_rows: usize,
}

/// Visit feedback status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FeedbackStatus {
    #[default]
    Visited,
    Rejected,
    Fake,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visited => "Visited",
            Self::Rejected => "Rejected",
            Self::Fake => "Fake",
        }
    }
}

impl std::str::FromStr for FeedbackStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "visited" => Ok(Self::Visited),
            "rejected" => Ok(Self::Rejected),
            "fake" => Ok(Self::Fake),
            _ => Err(format!("Unknown feedback status: {}", s)),
        }
    }
}

impl std::fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One geo-tagged visit record attached to exactly one case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub case_id: i64,
    pub executive_id: Option<i64>,
    /// Visit outcome code
    pub visit_code: String,
    pub who_met: Option<String>,
    pub relation: Option<String>,
    pub met_name: Option<String>,
    pub meeting_place: Option<String>,
    pub remarks: Option<String>,
    pub photo_url: Option<String>,
    /// Capture coordinates
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Device metadata as JSON text
    pub device_info: Option<String>,
    /// Meters between capture point and the case's registered address
    pub distance_from_address: Option<f64>,
    pub ptp_date: Option<NaiveDate>,
    /// Set when a promised date passes without payment
    pub ptp_broken: bool,
    pub is_fake_visit: bool,
    pub fake_visit_reason: Option<String>,
    pub status: FeedbackStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A visit submission (before DB insertion)
#[derive(Debug, Clone, Deserialize)]
pub struct NewFeedback {
    pub case_id: i64,
    pub executive_id: Option<i64>,
    pub visit_code: String,
    pub who_met: Option<String>,
    pub relation: Option<String>,
    pub met_name: Option<String>,
    pub meeting_place: Option<String>,
    pub remarks: Option<String>,
    pub photo_url: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub device_info: Option<String>,
    pub ptp_date: Option<NaiveDate>,
}

/// A case together with its full feedback history (newest first)
#[derive(Debug, Clone, Serialize)]
pub struct CaseWithFeedbacks {
    #[serde(flatten)]
    pub case: Case,
    pub feedbacks: Vec<Feedback>,
}

/// A visited case annotated with visit count and last-visit timestamp
#[derive(Debug, Clone, Serialize)]
pub struct VisitedCase {
    #[serde(flatten)]
    pub case: Case,
    pub visits: i64,
    pub last_visit_at: Option<DateTime<Utc>>,
    pub feedbacks: Vec<Feedback>,
}

/// Manifest of one bulk-upload operation; created once, never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseUpload {
    pub id: i64,
    pub supervisor: String,
    pub filename: Option<String>,
    /// SHA-256 of the uploaded bytes
    pub content_hash: Option<String>,
    pub upload_mode: UploadMode,
    pub total_cases: i64,
    pub created_at: DateTime<Utc>,
}

/// Filters for case queries. All fields are optional and ANDed together.
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub status: Option<CaseStatus>,
    pub bkt: Option<String>,
    pub product_type: Option<String>,
    pub bank_name: Option<String>,
    pub npa_status: Option<String>,
    pub priority: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub executive_id: Option<i64>,
}

/// An executive matched during batched employee-identifier resolution
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedEmployee {
    pub emp_id: String,
    pub user_id: i64,
    pub name: String,
}

/// Result of one batched employee-identifier lookup.
///
/// Purely advisory: consumed by the bulk upsert, never cached across
/// uploads.
#[derive(Debug, Clone, Default)]
pub struct EmployeeResolution {
    /// emp_id -> internal user id, for every match found
    pub map: std::collections::HashMap<String, i64>,
    pub found: Vec<ResolvedEmployee>,
    /// Identifiers with no match, in input order
    pub not_found: Vec<String>,
}

/// Outcome of one bulk upsert run
#[derive(Debug, Clone, Serialize)]
pub struct BulkUpsertOutcome {
    pub upload: CaseUpload,
    /// Rows successfully created or updated
    pub upserted: usize,
    /// Rows whose upsert failed (batches already committed stay committed)
    pub failed: usize,
    /// Bounded sample of resulting cases for response-size control
    pub sample: Vec<Case>,
}

/// One (identifier, executive) pair for bulk allocation
#[derive(Debug, Clone, Deserialize)]
pub struct AllocationRequest {
    pub emp_id: String,
    pub executive_id: i64,
}

/// Per-pair result of a bulk allocation
#[derive(Debug, Clone, Serialize)]
pub struct AllocationResult {
    pub emp_id: String,
    pub executive_id: i64,
    pub updated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Unallocated case count for one employee identifier
#[derive(Debug, Clone, Serialize)]
pub struct UnallocatedGroup {
    pub emp_id: Option<String>,
    pub count: i64,
}

/// Allocation status snapshot for remediation workflows
#[derive(Debug, Clone, Serialize)]
pub struct AllocationStatus {
    pub total: i64,
    pub allocated: i64,
    pub unallocated: i64,
    pub unallocated_by_emp_id: Vec<UnallocatedGroup>,
}
