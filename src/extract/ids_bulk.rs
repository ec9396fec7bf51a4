// 📦 IDS Bulk File - local copy of the International Debt Statistics download
//
// The World Bank publishes IDS as one wide CSV:
//   Country Name, Country Code, Counterpart-Area Name, Counterpart-Area Code,
//   Series Name, Series Code, 1970, 1971, ... (or "1970 [YR1970]")
//
// Only the requested series are kept in memory; each year column becomes a
// RawIdsRow. ".." and empty cells are missing values, anything else that
// does not parse as a number fails the load.

use super::ids::{IdsSource, RawIdsRow};
use crate::error::{PipelineError, Result};
use std::path::Path;
use tracing::info;

const SOURCE_NAME: &str = "IDS bulk file";

// ============================================================================
// BULK SOURCE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct IdsBulkFile {
    rows: Vec<RawIdsRow>,
}

/// Column positions of the identifying fields
struct Layout {
    country_name: usize,
    country_code: usize,
    counterpart_name: usize,
    counterpart_code: usize,
    series_code: usize,
    years: Vec<(usize, i32)>,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| PipelineError::extraction(SOURCE_NAME, format!("missing column {name:?}")))
        };

        let years: Vec<(usize, i32)> = headers
            .iter()
            .enumerate()
            .filter_map(|(idx, h)| year_column(h).map(|year| (idx, year)))
            .collect();
        if years.is_empty() {
            return Err(PipelineError::extraction(SOURCE_NAME, "no year columns"));
        }

        Ok(Layout {
            country_name: find("Country Name")?,
            country_code: find("Country Code")?,
            counterpart_name: find("Counterpart-Area Name")?,
            counterpart_code: find("Counterpart-Area Code")?,
            series_code: find("Series Code")?,
            years,
        })
    }
}

/// "2021" or "2021 [YR2021]"
fn year_column(header: &str) -> Option<i32> {
    let head = header.trim().split_whitespace().next()?;
    if head.len() != 4 {
        return None;
    }
    head.parse().ok()
}

fn parse_cell(raw: &str) -> std::result::Result<Option<f64>, String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == ".." {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("non-numeric value {raw:?}"))
}

impl IdsBulkFile {
    pub fn new(rows: Vec<RawIdsRow>) -> Self {
        IdsBulkFile { rows }
    }

    /// Read `path`, keeping only the `indicators` series
    pub fn load(path: &Path, indicators: &[&str]) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
        let bulk = Self::from_reader(file, indicators)?;
        info!(path = %path.display(), rows = bulk.rows.len(), "IDS bulk file loaded");
        Ok(bulk)
    }

    pub fn from_reader<R: std::io::Read>(reader: R, indicators: &[&str]) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(|e| PipelineError::extraction(SOURCE_NAME, e.to_string()))?
            .clone();
        let layout = Layout::from_headers(&headers)?;

        let mut rows = Vec::new();
        for (line_no, record) in rdr.records().enumerate() {
            let record = record
                .map_err(|e| PipelineError::extraction(SOURCE_NAME, format!("line {}: {}", line_no + 2, e)))?;
            let field = |idx: usize| record.get(idx).unwrap_or_default().trim();

            let series = field(layout.series_code);
            if !indicators.iter().any(|i| i.eq_ignore_ascii_case(series)) {
                continue;
            }

            for &(idx, year) in &layout.years {
                let value = parse_cell(field(idx)).map_err(|reason| {
                    PipelineError::extraction(SOURCE_NAME, format!("line {}: {}", line_no + 2, reason))
                })?;
                rows.push(RawIdsRow {
                    entity_code: field(layout.country_code).to_string(),
                    entity_name: field(layout.country_name).to_string(),
                    counterpart_code: field(layout.counterpart_code).to_string(),
                    counterpart_name: field(layout.counterpart_name).to_string(),
                    indicator_code: series.to_string(),
                    year,
                    value,
                });
            }
        }

        Ok(IdsBulkFile { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl IdsSource for IdsBulkFile {
    fn fetch(
        &self,
        country_iso3: &str,
        indicators: &[&str],
        years: Option<(i32, i32)>,
    ) -> Result<Vec<RawIdsRow>> {
        Ok(self
            .rows
            .iter()
            .filter(|r| r.entity_code.eq_ignore_ascii_case(country_iso3))
            .filter(|r| indicators.iter().any(|i| i.eq_ignore_ascii_case(&r.indicator_code)))
            .filter(|r| years.map_or(true, |(start, end)| (start..=end).contains(&r.year)))
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ============================================================================
// TESTS
// ============================================================================
