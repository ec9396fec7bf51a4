// Extractors - read-only row sources for the three upstream datasets
//
// Each source sits behind a trait so the pipeline can run against the live
// APIs, cached pulls on disk, or in-memory fixtures:
// - IDS:        IdsSource        (ids.rs, ids_bulk.rs)
// - Statements: StatementSource  (statements.rs)
// - CRS:        bulk file only   (crs.rs)

pub mod crs;
pub mod ids;
pub mod ids_bulk;
pub mod statements;

pub use crs::{load_crs_file, CrsRecord};
pub use ids::{IdsApiClient, IdsSource, MemoryIdsSource, RawIdsRow};
pub use ids_bulk::IdsBulkFile;
pub use statements::{
    MemoryStatementSource, StatementCache, StatementRow, StatementSource, StatementsApiClient,
};

use chrono::NaiveDate;
use serde_json::Value;

// ============================================================================
// SHARED PARSING HELPERS
// ============================================================================

/// Parse a date in any of the formats the upstream sources use
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // Statements API: 01-Sep-2024
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d-%b-%Y") {
        return Some(date);
    }

    // ISO, optionally with a time part (CRS exports carry "2015-03-12 00:00:00")
    let date_part = raw.split(|c: char| c == 'T' || c == ' ').next().unwrap_or(raw);
    if let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        return Some(date);
    }

    // Older CRS files: 3/12/2015
    if let Ok(date) = NaiveDate::parse_from_str(date_part, "%m/%d/%Y") {
        return Some(date);
    }

    None
}

/// Numbers arrive as JSON numbers or as strings, sometimes empty
pub(crate) fn value_as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim().replace(',', "");
            if s.is_empty() {
                None
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

pub(crate) fn value_as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
