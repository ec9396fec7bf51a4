// 🌐 CRS Extractor - OECD Creditor Reporting System bulk file
//
// Fallback source for project-level rates. Only World Bank donor rows are
// kept (901 IBRD, 903 IDA, 905 IDA-MDRI).
//
// project_number layout: "<project_id>.<loan_number>.<entry>"
// interest1 / interest2 are reported in thousandths of a percent.

use super::parse_date;
use crate::config::CrsConfig;
use crate::error::{PipelineError, Result};
use crate::indicators::RateUnit;
use crate::reference::CountryRegistry;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

// ============================================================================
// RECORDS
// ============================================================================

/// One CRS loan after de-duplication, rate in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrsRecord {
    pub project_id: String,
    pub loan_number: String,
    pub recipient_code: u32,
    pub iso3: Option<String>,
    pub commitment_date: Option<NaiveDate>,
    /// Commitment year, or the reporting year when the date is absent
    pub year: Option<i32>,
    pub interest_rate: f64,
    /// USD, summed over duplicate entries
    pub usd_commitment: f64,
}

/// Raw CRS line; accepts both the snake_case and the OECD CamelCase headers
#[derive(Debug, Deserialize)]
struct CrsLine {
    #[serde(alias = "Year", default)]
    year: Option<i32>,
    #[serde(alias = "DonorCode")]
    donor_code: Option<u32>,
    #[serde(alias = "RecipientCode")]
    recipient_code: Option<u32>,
    #[serde(alias = "ProjectNumber", default)]
    project_number: Option<String>,
    #[serde(alias = "CommitmentDate", default)]
    commitment_date: Option<String>,
    #[serde(alias = "Interest1", default)]
    interest1: Option<f64>,
    #[serde(alias = "Interest2", default)]
    interest2: Option<f64>,
    #[serde(alias = "USD_Commitment", default)]
    usd_commitment: Option<f64>,
}

/// Accumulator for one (project, loan, recipient, commitment date) group
#[derive(Debug, Default)]
struct CrsGroup {
    year: Option<i32>,
    interest1: Option<f64>,
    interest2: Option<f64>,
    usd_commitment: f64,
}

fn fmax(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Split "<project_id>.<loan_number>.<entry>"; the entry part is discarded
pub fn split_project_number(raw: &str) -> (String, String) {
    let mut parts = raw.trim().split('.');
    let project_id = parts.next().unwrap_or_default().trim().to_string();
    let loan_number = parts.next().unwrap_or_default().trim().to_string();
    (project_id, loan_number)
}

// ============================================================================
// LOADER
// ============================================================================

/// Load, filter and de-duplicate the CRS bulk file
///
/// Any failure to open or parse the file is a `CrsSource` error, including
/// short lines and non-numeric amounts or rates.
pub fn load_crs_file(path: &Path, config: &CrsConfig, registry: &CountryRegistry) -> Result<Vec<CrsRecord>> {
    if !path.exists() {
        return Err(PipelineError::crs(path, "file not found"));
    }

    info!(path = %path.display(), "loading CRS data");

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(config.delimiter as u8)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| PipelineError::crs(path, e.to_string()))?;

    let headers = rdr
        .headers()
        .map_err(|e| PipelineError::crs(path, e.to_string()))?
        .clone();
    let has_column = |names: &[&str]| headers.iter().any(|h| names.contains(&h));
    for required in [
        ["donor_code", "DonorCode"],
        ["recipient_code", "RecipientCode"],
        ["project_number", "ProjectNumber"],
    ] {
        if !has_column(&required[..]) {
            return Err(PipelineError::crs(path, format!("missing column {}", required[0])));
        }
    }

    let mut groups: BTreeMap<(String, String, u32, Option<NaiveDate>), CrsGroup> = BTreeMap::new();
    let mut read = 0usize;

    for (line_no, result) in rdr.deserialize::<CrsLine>().enumerate() {
        let line = result.map_err(|e| PipelineError::crs(path, format!("line {}: {}", line_no + 2, e)))?;
        read += 1;

        let Some(donor) = line.donor_code else { continue };
        if !config.donor_codes.contains(&donor) {
            continue;
        }
        let Some(recipient) = line.recipient_code else { continue };
        let (project_id, loan_number) = split_project_number(line.project_number.as_deref().unwrap_or_default());
        if project_id.is_empty() {
            continue;
        }
        let commitment_date = line.commitment_date.as_deref().and_then(parse_date);

        let group = groups
            .entry((project_id, loan_number, recipient, commitment_date))
            .or_default();
        group.year = group.year.max(line.year);
        group.interest1 = fmax(group.interest1, line.interest1);
        group.interest2 = fmax(group.interest2, line.interest2);
        group.usd_commitment += line.usd_commitment.unwrap_or(0.0) * config.amount_multiplier;
    }

    let mut records = Vec::new();
    let mut without_rate = 0usize;

    for ((project_id, loan_number, recipient_code, commitment_date), group) in groups {
        let Some(raw_rate) = fmax(group.interest1, group.interest2) else {
            without_rate += 1;
            continue;
        };

        let iso3 = registry.by_dac_code(recipient_code).and_then(|c| c.iso3.clone());
        if iso3.is_none() {
            debug!(recipient_code, "CRS recipient without ISO3 mapping");
        }

        records.push(CrsRecord {
            project_id,
            loan_number,
            recipient_code,
            iso3,
            year: commitment_date.map(|d| d.year()).or(group.year),
            commitment_date,
            interest_rate: RateUnit::MilliPercent.to_percent(raw_rate),
            usd_commitment: group.usd_commitment,
        });
    }

    if records.is_empty() {
        warn!(path = %path.display(), "CRS file has no World Bank loans with a rate");
    }
    info!(read, kept = records.len(), without_rate, "CRS data processed");

    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================
