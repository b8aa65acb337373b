//! Row normalizer for case allocation sheets
//!
//! Sheets arrive with wildly inconsistent column headings depending on which
//! bank or agency exported them ("Acc_No", "Account", "acc_id", ...). Each
//! logical field carries an ordered list of accepted header synonyms; the
//! first synonym present with a non-blank value wins. Numeric parsing is
//! permissive - a value that fails to parse falls back to its default
//! instead of failing the row.
//!
//! The only hard requirement per row is an account identifier: rows without
//! one are rejected with their 1-based sheet row number (counting the header
//! row) and the rest of the sheet continues to parse.

use std::collections::HashMap;
use std::io::Read;

use csv::ReaderBuilder;
use tracing::debug;

use crate::error::Result;
use crate::models::{CaseDraft, SheetParse, SkippedRow};

/// Rejection reason for rows with no recognizable account identifier
pub const MISSING_ACCOUNT_REASON: &str = "missing account number";

// Ordered header synonyms per logical field. Matching is exact on the
// trimmed header, checked in list order.
const ACC_ID: &[&str] = &[
    "Acc_No",
    "Acc_no",
    "Acc No",
    "Account",
    "acc_no",
    "acc_id",
    "Acc ID",
    "ACC_NO",
    "Account_No",
];
const CUST_ID: &[&str] = &["cust_id", "Cust_id", "Cust_ID"];
const CUSTOMER_NAME: &[&str] = &[
    "Acc_holder_name",
    "Acc_Holder_Name",
    "Account Holder Name",
    "Name",
    "acc_holder_name",
];
const PHONE: &[&str] = &["phone_number", "Phone_number", "Phone", "phone"];
const ADDRESS: &[&str] = &[
    "Acc_holder_address",
    "Acc_Holder_Address",
    "Address",
    "acc_holder_address",
];
const PINCODE: &[&str] = &["pincode", "Pincode"];
const LAT: &[&str] = &["lat", "Lat"];
const LNG: &[&str] = &["lng", "Lng"];
const BANK_NAME: &[&str] = &["Bank_name", "Bank name", "Bank", "bank_name"];
const PRODUCT: &[&str] = &["Product_name", "product name", "Product", "product_name"];
const SUB_PRODUCT: &[&str] = &["Sub_product_name", "sub_product_name", "Sub_Product_Name"];
const BKT: &[&str] = &["BKT", "bkt", "Bkt"];
const PRIORITY: &[&str] = &["Importance", "importance", "priority"];
const POS_AMOUNT: &[&str] = &[
    "POS_amount",
    "pos amount",
    "Pos amount",
    "pos_amount",
    "POS_Amount",
];
const OVERDUE_AMOUNT: &[&str] = &[
    "Total_due_amount",
    "overdue_amount",
    "Overdue Amount",
    "overdue amount",
    "Total_Due_Amount",
];
const DPD: &[&str] = &["DPD", "dpd", "Dpd"];
const NPA_STATUS: &[&str] = &[
    "NPA_status",
    "npa status",
    "NPA Status",
    "npa_status",
    "NPA_Status",
];
const PERFORMANCE: &[&str] = &[
    "Performance (Flow/Stab/Norm/RB)",
    "Performance",
    "performance",
];
const COLLECTION_AMOUNT: &[&str] = &[
    "Collection_amount",
    "collection_amount",
    "Collection amount",
    "Collection_Amount",
];
const TOSS_AMOUNT: &[&str] = &[
    "Toss_amount",
    "toss_amount",
    "Toss amount",
    "Toss_Amount",
];
const EMI_AMOUNT: &[&str] = &["EMI_amount", "emi_amount", "EMI amount", "EMI_Amount"];
const INTEREST: &[&str] = &["Interest", "interest"];
const EMP_ID: &[&str] = &["Emp_ID", "emp_id", "Emp_id", "EMP_ID", "emp id", "Emp ID"];

/// One parsed row with header-keyed access
struct RowView<'a> {
    index: &'a HashMap<String, usize>,
    record: &'a csv::StringRecord,
}

impl<'a> RowView<'a> {
    /// First synonym present with a non-blank trimmed value
    fn field(&self, synonyms: &[&str]) -> Option<&'a str> {
        for key in synonyms {
            if let Some(&col) = self.index.get(*key) {
                let value = self.record.get(col).map(str::trim).unwrap_or("");
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        None
    }

    fn text(&self, synonyms: &[&str]) -> String {
        self.field(synonyms).unwrap_or("").to_string()
    }

    fn opt_text(&self, synonyms: &[&str]) -> Option<String> {
        self.field(synonyms).map(str::to_string)
    }

    /// Permissive monetary parse: absent or unparseable values become 0,
    /// and amounts are clamped non-negative
    fn amount(&self, synonyms: &[&str]) -> f64 {
        self.field(synonyms)
            .map(parse_amount)
            .unwrap_or(0.0)
            .max(0.0)
    }

    fn int(&self, synonyms: &[&str]) -> i64 {
        self.field(synonyms)
            .and_then(|s| s.parse::<f64>().ok())
            .map(|v| v as i64)
            .unwrap_or(0)
    }

    fn coord(&self, synonyms: &[&str]) -> Option<f64> {
        self.field(synonyms).and_then(|s| s.parse::<f64>().ok())
    }
}

/// Strip currency symbols, thousands separators and whitespace, then parse
fn parse_amount(s: &str) -> f64 {
    let cleaned: String = s.trim().replace(['$', '₹', ',', ' '], "");
    cleaned.parse::<f64>().unwrap_or(0.0)
}

/// Parse a case allocation sheet into canonical case drafts.
///
/// Pure function of the input rows: rejected rows are returned alongside the
/// drafts, never silently dropped. A malformed stream (unreadable record)
/// fails the whole parse before any drafts are produced downstream.
pub fn parse_case_sheet<R: Read>(reader: R) -> Result<SheetParse> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    // Trim surrounding whitespace off every header once per sheet; first
    // occurrence wins for duplicated headers
    let headers = rdr.headers()?.clone();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, header) in headers.iter().enumerate() {
        index.entry(header.trim().to_string()).or_insert(i);
    }

    let mut drafts = Vec::new();
    let mut skipped = Vec::new();
    let mut total_rows = 0usize;

    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        total_rows += 1;

        let row = RowView {
            index: &index,
            record: &record,
        };

        let acc_id = match row.field(ACC_ID) {
            Some(acc) => acc.to_string(),
            None => {
                // Data row i is sheet row i + 2, counting the header row
                skipped.push(SkippedRow {
                    row_number: i + 2,
                    reason: MISSING_ACCOUNT_REASON.to_string(),
                });
                continue;
            }
        };

        drafts.push(CaseDraft {
            acc_id,
            cust_id: row.opt_text(CUST_ID),
            customer_name: row.text(CUSTOMER_NAME),
            phone_number: row.opt_text(PHONE),
            address: row.text(ADDRESS),
            pincode: row.opt_text(PINCODE),
            lat: row.coord(LAT),
            lng: row.coord(LNG),
            pos_amount: row.amount(POS_AMOUNT),
            overdue_amount: row.amount(OVERDUE_AMOUNT),
            collection_amount: row.amount(COLLECTION_AMOUNT),
            toss_amount: row.amount(TOSS_AMOUNT),
            emi_amount: row.amount(EMI_AMOUNT),
            interest: row.amount(INTEREST),
            dpd: row.int(DPD),
            bkt: row.opt_text(BKT),
            product_type: row.text(PRODUCT),
            sub_product_name: row.opt_text(SUB_PRODUCT),
            bank_name: row.text(BANK_NAME),
            npa_status: row.opt_text(NPA_STATUS),
            priority: row.text(PRIORITY),
            performance: row.opt_text(PERFORMANCE),
            emp_id: row.opt_text(EMP_ID),
            month: None,
            year: None,
        });
    }

    debug!(
        "Parsed sheet: {} drafts, {} skipped of {} rows",
        drafts.len(),
        skipped.len(),
        total_rows
    );

    Ok(SheetParse {
        drafts,
        skipped,
        total_rows,
    })
}

/// Distinct non-blank employee identifiers across the drafts, first-seen
/// order preserved. This is the exact set handed to the batched resolver -
/// never more lookups than distinct identifiers.
pub fn distinct_employee_ids(drafts: &[CaseDraft]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();
    for draft in drafts {
        if let Some(emp_id) = draft.emp_id.as_deref() {
            if seen.insert(emp_id.to_string()) {
                ids.push(emp_id.to_string());
            }
        }
    }
    ids
}
