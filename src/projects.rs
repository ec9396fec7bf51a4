// 🏗️ Project Records - World Bank IDA/IBRD loans, one row per loan
//
// Statements arrive as one row per loan per reporting period. This module
// collapses them into ProjectRecord values and decides which rates count as
// missing.

use crate::extract::StatementRow;
use crate::reference::CountryRegistry;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

// ============================================================================
// LENDER TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LenderType {
    Ida,
    Ibrd,
}

impl LenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LenderType::Ida => "IDA",
            LenderType::Ibrd => "IBRD",
        }
    }
}

impl fmt::Display for LenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ZERO RATE POLICY
// ============================================================================

/// Statements report a missing rate as 0. Some loan types legitimately carry
/// a zero rate; those are listed here and keep their 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZeroRatePolicy {
    legitimate_zero_loan_types: Vec<String>,
}

impl ZeroRatePolicy {
    /// Every zero is treated as missing
    pub fn all_missing() -> Self {
        Self::default()
    }

    pub fn with_legitimate_zero(loan_types: &[String]) -> Self {
        ZeroRatePolicy {
            legitimate_zero_loan_types: loan_types
                .iter()
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// True when the reported rate should be treated as absent
    pub fn is_missing(&self, rate: Option<f64>, loan_type: Option<&str>) -> bool {
        match rate {
            None => true,
            Some(r) if r.is_nan() => true,
            Some(r) if r == 0.0 => !loan_type
                .map(|t| {
                    let t = t.trim().to_uppercase();
                    self.legitimate_zero_loan_types.contains(&t)
                })
                .unwrap_or(false),
            Some(_) => false,
        }
    }
}

// ============================================================================
// PROJECT RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_id: String,
    pub loan_number: String,
    pub country: String,
    /// None for regional projects ("Western and Central Africa")
    pub iso3: Option<String>,
    pub approval_date: Option<NaiveDate>,
    pub approval_year: Option<i32>,
    pub lender: LenderType,
    pub loan_type: Option<String>,
    /// USD
    pub principal_amount: Option<f64>,
    /// Percent as reported, sentinel 0 preserved
    pub reported_rate: Option<f64>,
    pub rate_missing: bool,
}

impl ProjectRecord {
    /// Rate to publish when no fallback is needed
    pub fn primary_rate(&self) -> Option<f64> {
        if self.rate_missing {
            None
        } else {
            self.reported_rate
        }
    }
}

// ============================================================================
// STATEMENT SUMMARISATION
// ============================================================================

fn max_f64(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

type StatementKey = (String, Option<NaiveDate>, String, String, String, Option<String>);

/// Collapse per-period statement rows into one row per loan
///
/// Rows are grouped on (loan number, approval date, country code, project ID,
/// project name, loan type) taking the maximum of country, rate and
/// principal. Groups are then de-duplicated on (loan number, country code,
/// project ID), the last group in key order winning.
pub fn summarise_statements(rows: &[StatementRow]) -> Vec<StatementRow> {
    let mut groups: BTreeMap<StatementKey, StatementRow> = BTreeMap::new();

    for row in rows {
        let key = (
            row.loan_number.clone(),
            row.board_approval_date,
            row.country_code.clone(),
            row.project_id.clone(),
            row.project_name.clone(),
            row.loan_type.clone(),
        );
        groups
            .entry(key)
            .and_modify(|acc| {
                if row.country > acc.country {
                    acc.country = row.country.clone();
                }
                acc.interest_rate = max_f64(acc.interest_rate, row.interest_rate);
                acc.principal_amount = max_f64(acc.principal_amount, row.principal_amount);
                acc.end_of_period = acc.end_of_period.max(row.end_of_period);
            })
            .or_insert_with(|| row.clone());
    }

    let mut latest: BTreeMap<(String, String, String), StatementRow> = BTreeMap::new();
    for (_, row) in groups {
        latest.insert(
            (row.loan_number.clone(), row.country_code.clone(), row.project_id.clone()),
            row,
        );
    }

    latest.into_values().collect()
}

/// Build project records from IDA and IBRD statements
pub fn build_project_records(
    rows: &[StatementRow],
    registry: &CountryRegistry,
    policy: &ZeroRatePolicy,
) -> Vec<ProjectRecord> {
    let summarised = summarise_statements(rows);
    info!(raw = rows.len(), loans = summarised.len(), "statements summarised");

    let mut records: Vec<ProjectRecord> = summarised
        .into_iter()
        .map(|row| {
            let iso3 = registry.find(&row.country).and_then(|c| c.iso3.clone());
            if iso3.is_none() {
                debug!(country = %row.country, project_id = %row.project_id, "no ISO3 for project country");
            }
            let rate_missing = policy.is_missing(row.interest_rate, row.loan_type.as_deref());

            ProjectRecord {
                approval_year: row.board_approval_date.map(|d| d.year()),
                approval_date: row.board_approval_date,
                project_id: row.project_id,
                loan_number: row.loan_number,
                country: row.country,
                iso3,
                lender: row.lender,
                loan_type: row.loan_type,
                principal_amount: row.principal_amount,
                reported_rate: row.interest_rate,
                rate_missing,
            }
        })
        .collect();

    records.sort_by(|a, b| {
        (&a.project_id, &a.loan_number, a.lender).cmp(&(&b.project_id, &b.loan_number, b.lender))
    });
    records
}

// ============================================================================
// TESTS
// ============================================================================
