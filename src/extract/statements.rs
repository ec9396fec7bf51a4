// 🧾 Statements Extractor - World Bank IDA / IBRD statements of credits and loans
//
// DataCatalog API, paged with `top` / `skip`:
//   {base}?datasetId=DS00976&resourceId=RS00906&type=json&top=N&skip=K
// A page shorter than `top` is the last one.
//
// Rows are one per loan per reporting period; projects.rs summarises them.

use super::{parse_date, value_as_f64, value_as_string};
use crate::config::StatementsConfig;
use crate::error::{PipelineError, Result};
use crate::projects::LenderType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SOURCE_NAME: &str = "World Bank statements API";

// ============================================================================
// STATEMENT ROW
// ============================================================================

/// One statement line for an IDA credit or IBRD loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    pub lender: LenderType,
    /// IDA credit number / IBRD loan number
    pub loan_number: String,
    pub end_of_period: Option<NaiveDate>,
    pub board_approval_date: Option<NaiveDate>,
    pub country_code: String,
    pub country: String,
    pub project_id: String,
    pub project_name: String,
    /// IBRD only (e.g. "FSL", "SCL", "NPL")
    pub loan_type: Option<String>,
    /// IBRD interest rate or IDA service charge rate, percent; 0 = not reported
    pub interest_rate: Option<f64>,
    /// Original principal amount, USD
    pub principal_amount: Option<f64>,
}

impl StatementRow {
    /// Map a DataCatalog record onto the common row shape
    ///
    /// IDA and IBRD use different column names for the same concepts.
    pub fn from_api_record(lender: LenderType, record: &Map<String, Value>) -> Self {
        let text = |key: &str| value_as_string(record.get(key));
        let date = |key: &str| text(key).as_deref().and_then(parse_date);

        let (loan_key, name_key, rate_key, principal_key) = match lender {
            LenderType::Ida => (
                "credit_number",
                "project_name",
                "service_charge_rate",
                "original_principal_amount_us_",
            ),
            LenderType::Ibrd => (
                "loan_number",
                "project_name_",
                "interest_rate",
                "original_principal_amount",
            ),
        };

        StatementRow {
            lender,
            loan_number: text(loan_key).unwrap_or_default(),
            end_of_period: date("end_of_period"),
            board_approval_date: date("board_approval_date"),
            country_code: text("country_code").unwrap_or_default(),
            country: text("country").unwrap_or_default(),
            project_id: text("project_id").unwrap_or_default(),
            project_name: text(name_key)
                .or_else(|| text("project_name"))
                .unwrap_or_default(),
            loan_type: match lender {
                LenderType::Ibrd => text("loan_type"),
                LenderType::Ida => None,
            },
            interest_rate: value_as_f64(record.get(rate_key)),
            principal_amount: value_as_f64(record.get(principal_key)),
        }
    }
}

// ============================================================================
// SOURCE TRAIT
// ============================================================================

/// StatementSource - read-only access to IDA and IBRD statement rows
pub trait StatementSource {
    fn rows(&self, lender: LenderType) -> Result<Vec<StatementRow>>;

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

pub struct StatementsApiClient {
    client: reqwest::blocking::Client,
    config: StatementsConfig,
}

impl StatementsApiClient {
    pub fn new(config: &StatementsConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("debt-rates/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::extraction(SOURCE_NAME, e.to_string()))?;

        Ok(StatementsApiClient {
            client,
            config: config.clone(),
        })
    }

    fn dataset(&self, lender: LenderType) -> (&str, &str) {
        match lender {
            LenderType::Ida => (self.config.ida_dataset_id.as_str(), self.config.ida_resource_id.as_str()),
            LenderType::Ibrd => (self.config.ibrd_dataset_id.as_str(), self.config.ibrd_resource_id.as_str()),
        }
    }

    /// Fetch every page of a dataset
    fn fetch_paginated(&self, dataset_id: &str, resource_id: &str) -> Result<Vec<Map<String, Value>>> {
        let top = self.config.page_size;
        let mut all = Vec::new();
        let mut skip = 0;

        loop {
            let response = self
                .client
                .get(&self.config.base_url)
                .query(&[
                    ("datasetId", dataset_id.to_string()),
                    ("resourceId", resource_id.to_string()),
                    ("type", "json".to_string()),
                    ("top", top.to_string()),
                    ("skip", skip.to_string()),
                ])
                .send()
                .and_then(|r| r.error_for_status())
                .map_err(|e| PipelineError::extraction(SOURCE_NAME, e.to_string()))?;

            let body = response
                .text()
                .map_err(|e| PipelineError::extraction(SOURCE_NAME, e.to_string()))?;
            let batch = parse_statement_page(&body)?;
            let batch_len = batch.len();
            debug!(dataset_id, skip, rows = batch_len, "statements page");
            all.extend(batch);

            if batch_len < top {
                break;
            }
            skip += top;
        }

        Ok(all)
    }
}

impl StatementSource for StatementsApiClient {
    fn rows(&self, lender: LenderType) -> Result<Vec<StatementRow>> {
        let (dataset_id, resource_id) = self.dataset(lender);
        info!(lender = lender.as_str(), dataset_id, "downloading statements");

        let records = self.fetch_paginated(dataset_id, resource_id)?;
        Ok(records
            .iter()
            .map(|r| StatementRow::from_api_record(lender, r))
            .collect())
    }
}

/// Extract the `data` array of one DataCatalog page
pub(crate) fn parse_statement_page(body: &str) -> Result<Vec<Map<String, Value>>> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| PipelineError::extraction(SOURCE_NAME, format!("invalid JSON: {e}")))?;

    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| PipelineError::extraction(SOURCE_NAME, "JSON missing 'data' array"))?;

    Ok(data
        .iter()
        .filter_map(|item| item.as_object().cloned())
        .collect())
}

// ============================================================================
// RAW CACHE (raw_data/ida_interest.csv, raw_data/ibrd_interest.csv)
// ============================================================================

/// Statement rows pulled earlier and kept under the raw data directory
pub struct StatementCache {
    dir: PathBuf,
}

impl StatementCache {
    pub fn new(dir: &Path) -> Self {
        StatementCache {
            dir: dir.to_path_buf(),
        }
    }

    pub fn path(&self, lender: LenderType) -> PathBuf {
        self.dir.join(format!("{}_interest.csv", lender.as_str().to_lowercase()))
    }

    /// Store rows for later runs
    pub fn save(&self, lender: LenderType, rows: &[StatementRow]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| PipelineError::io(&self.dir, e))?;
        let path = self.path(lender);

        let mut wtr = csv::Writer::from_path(&path)?;
        for row in rows {
            wtr.serialize(CachedRow::from(row))?;
        }
        wtr.flush().map_err(|e| PipelineError::io(&path, e))?;

        info!(lender = lender.as_str(), rows = rows.len(), path = %path.display(), "statements cached");
        Ok(path)
    }
}

impl StatementSource for StatementCache {
    fn rows(&self, lender: LenderType) -> Result<Vec<StatementRow>> {
        let path = self.path(lender);
        let mut rdr = csv::Reader::from_path(&path)?;

        let mut rows = Vec::new();
        for result in rdr.deserialize::<CachedRow>() {
            rows.push(result?.into_row(lender));
        }
        Ok(rows)
    }

    fn name(&self) -> &str {
        "statement cache"
    }
}

/// Flat CSV shape (csv cannot serialize enums nested in Option cleanly)
#[derive(Debug, Serialize, Deserialize)]
struct CachedRow {
    loan_number: String,
    end_of_period: Option<NaiveDate>,
    board_approval_date: Option<NaiveDate>,
    country_code: String,
    country: String,
    project_id: String,
    project_name: String,
    loan_type: Option<String>,
    interest_rate: Option<f64>,
    principal_amount: Option<f64>,
}

impl From<&StatementRow> for CachedRow {
    fn from(row: &StatementRow) -> Self {
        CachedRow {
            loan_number: row.loan_number.clone(),
            end_of_period: row.end_of_period,
            board_approval_date: row.board_approval_date,
            country_code: row.country_code.clone(),
            country: row.country.clone(),
            project_id: row.project_id.clone(),
            project_name: row.project_name.clone(),
            loan_type: row.loan_type.clone(),
            interest_rate: row.interest_rate,
            principal_amount: row.principal_amount,
        }
    }
}

impl CachedRow {
    fn into_row(self, lender: LenderType) -> StatementRow {
        StatementRow {
            lender,
            loan_number: self.loan_number,
            end_of_period: self.end_of_period,
            board_approval_date: self.board_approval_date,
            country_code: self.country_code,
            country: self.country,
            project_id: self.project_id,
            project_name: self.project_name,
            loan_type: self.loan_type.filter(|t| !t.is_empty()),
            interest_rate: self.interest_rate,
            principal_amount: self.principal_amount,
        }
    }
}

// ============================================================================
// IN-MEMORY SOURCE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryStatementSource {
    rows: Vec<StatementRow>,
}

impl MemoryStatementSource {
    pub fn new(rows: Vec<StatementRow>) -> Self {
        MemoryStatementSource { rows }
    }
}

impl StatementSource for MemoryStatementSource {
    fn rows(&self, lender: LenderType) -> Result<Vec<StatementRow>> {
        Ok(self.rows.iter().filter(|r| r.lender == lender).cloned().collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// TESTS
// ============================================================================
