// 📡 IDS Extractor - International Debt Statistics (World Bank API v2, source 6)
//
// Endpoint:
//   {base}/sources/6/country/{iso3}/series/{codes}/counterpart-area/all/time/{years}
//     ?format=json&per_page=N&page=P
//
// Rows come back as a list of "variable" concepts (Country, Series,
// Counterpart-Area, Time) plus a value; they are flattened into RawIdsRow.

use super::value_as_f64;
use crate::config::IdsConfig;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

const SOURCE_NAME: &str = "IDS API";
const IDS_SOURCE_ID: u32 = 6;

// ============================================================================
// RAW ROW
// ============================================================================

/// One IDS data point as returned by the API, before any cleaning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIdsRow {
    pub entity_code: String,
    pub entity_name: String,
    pub counterpart_code: String,
    pub counterpart_name: String,
    pub indicator_code: String,
    pub year: i32,
    pub value: Option<f64>,
}

// ============================================================================
// SOURCE TRAIT
// ============================================================================

/// IdsSource - read-only access to IDS series
pub trait IdsSource {
    /// Fetch `indicators` for one country (ISO3), optionally limited to a year window
    fn fetch(
        &self,
        country_iso3: &str,
        indicators: &[&str],
        years: Option<(i32, i32)>,
    ) -> Result<Vec<RawIdsRow>>;

    /// Name used in logs and provenance
    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

pub struct IdsApiClient {
    client: reqwest::blocking::Client,
    base_url: String,
    per_page: u32,
}

impl IdsApiClient {
    pub fn new(config: &IdsConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("debt-rates/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::extraction(SOURCE_NAME, e.to_string()))?;

        Ok(IdsApiClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            per_page: config.per_page,
        })
    }

    fn series_url(&self, country_iso3: &str, indicators: &[&str], years: Option<(i32, i32)>) -> String {
        let time = match years {
            Some((start, end)) => (start..=end)
                .map(|y| format!("YR{}", y))
                .collect::<Vec<_>>()
                .join(";"),
            None => "all".to_string(),
        };

        format!(
            "{}/sources/{}/country/{}/series/{}/counterpart-area/all/time/{}",
            self.base_url,
            IDS_SOURCE_ID,
            country_iso3,
            indicators.join(";"),
            time
        )
    }

    fn get_page(&self, url: &str, page: u32) -> Result<String> {
        let response = self
            .client
            .get(url)
            .query(&[
                ("format", "json".to_string()),
                ("per_page", self.per_page.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::extraction(SOURCE_NAME, e.to_string()))?;

        response
            .text()
            .map_err(|e| PipelineError::extraction(SOURCE_NAME, e.to_string()))
    }
}

impl IdsSource for IdsApiClient {
    fn fetch(
        &self,
        country_iso3: &str,
        indicators: &[&str],
        years: Option<(i32, i32)>,
    ) -> Result<Vec<RawIdsRow>> {
        let url = self.series_url(country_iso3, indicators, years);
        info!(country = country_iso3, indicators = ?indicators, "downloading IDS series");

        let mut rows = Vec::new();
        let mut page = 1;
        loop {
            let body = self.get_page(&url, page)?;
            let parsed = parse_ids_page(&body)?;
            debug!(page, pages = parsed.pages, rows = parsed.rows.len(), "IDS page");
            rows.extend(parsed.rows);

            if page >= parsed.pages {
                break;
            }
            page += 1;
        }

        Ok(rows)
    }
}

// ============================================================================
// PAYLOAD PARSING
// ============================================================================

#[derive(Debug)]
pub(crate) struct IdsPage {
    pub rows: Vec<RawIdsRow>,
    pub pages: u32,
}

/// Parse one page of the advanced-data API
///
/// The API answers errors with HTTP 200 and a `message` array, so those are
/// checked explicitly.
pub(crate) fn parse_ids_page(body: &str) -> Result<IdsPage> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| PipelineError::extraction(SOURCE_NAME, format!("invalid JSON: {e}")))?;

    // Error payload: [{"message":[{"id":"120","key":"Invalid value","value":"..."}]}]
    if let Some(message) = json
        .as_array()
        .and_then(|a| a.first())
        .and_then(|m| m.get("message"))
    {
        return Err(PipelineError::extraction(SOURCE_NAME, message.to_string()));
    }

    let pages = page_count(json.get("pages")).unwrap_or(1);

    // "source" is an object for single-source queries, an array otherwise
    let sources: Vec<&Value> = match json.get("source") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        // No data for the query: {"page":0,"pages":0,"total":0}
        _ => Vec::new(),
    };

    let mut rows = Vec::new();
    for source in sources {
        let data = match source.get("data").and_then(|d| d.as_array()) {
            Some(data) => data,
            None => continue,
        };
        for item in data {
            rows.push(parse_data_point(item)?);
        }
    }

    Ok(IdsPage { rows, pages })
}

fn page_count(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_data_point(item: &Value) -> Result<RawIdsRow> {
    let variables = item
        .get("variable")
        .and_then(|v| v.as_array())
        .ok_or_else(|| PipelineError::extraction(SOURCE_NAME, "data point without 'variable' array"))?;

    // concept → (id, value)
    let mut concepts: HashMap<String, (String, String)> = HashMap::new();
    for variable in variables {
        let concept = variable.get("concept").and_then(|c| c.as_str()).unwrap_or("");
        let id = variable.get("id").and_then(|c| c.as_str()).unwrap_or("");
        let value = variable.get("value").and_then(|c| c.as_str()).unwrap_or("");
        concepts.insert(concept.to_lowercase(), (id.to_string(), value.to_string()));
    }

    let get = |concept: &str| -> Result<(String, String)> {
        concepts.get(concept).cloned().ok_or_else(|| {
            PipelineError::extraction(SOURCE_NAME, format!("data point without '{concept}' concept"))
        })
    };

    let (entity_code, entity_name) = get("country")?;
    let (indicator_code, _) = get("series")?;
    let (counterpart_code, counterpart_name) = get("counterpart-area")?;
    let (time_id, time_value) = get("time")?;

    let year = time_value
        .trim()
        .parse::<i32>()
        .ok()
        .or_else(|| time_id.trim_start_matches(|c: char| c.is_ascii_alphabetic()).parse().ok())
        .ok_or_else(|| PipelineError::extraction(SOURCE_NAME, format!("unparseable year: {time_id}")))?;

    Ok(RawIdsRow {
        entity_code,
        entity_name,
        counterpart_code,
        counterpart_name,
        indicator_code,
        year,
        value: value_as_f64(item.get("value")),
    })
}

// ============================================================================
// IN-MEMORY SOURCE
// ============================================================================

/// Fixed rows keyed by country, for offline runs and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryIdsSource {
    rows: Vec<RawIdsRow>,
}

impl MemoryIdsSource {
    pub fn new(rows: Vec<RawIdsRow>) -> Self {
        MemoryIdsSource { rows }
    }
}

impl IdsSource for MemoryIdsSource {
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
        "memory"
    }
}

// ============================================================================
// TESTS
// ============================================================================
