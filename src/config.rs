// ⚙️ Configuration - debt-rates.toml
//
// Loaded once at startup (missing file means defaults) and passed by
// reference into each stage. Nothing here is mutated after startup.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "debt-rates.toml";

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub ids: IdsConfig,

    #[serde(default)]
    pub statements: StatementsConfig,

    #[serde(default)]
    pub crs: CrsConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub reference: ReferenceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Raw downloads and cached API pulls.
    #[serde(default = "default_raw_data")]
    pub raw_data: PathBuf,

    /// Root of the output tree.
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_data: default_raw_data(),
            output: default_output(),
        }
    }
}

fn default_raw_data() -> PathBuf {
    PathBuf::from("raw_data")
}
fn default_output() -> PathBuf {
    PathBuf::from("output")
}

/// `[ids]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdsConfig {
    #[serde(default = "default_ids_base_url")]
    pub base_url: String,

    #[serde(default = "default_ids_per_page")]
    pub per_page: u32,

    /// Inclusive year window; both unset means all years.
    #[serde(default)]
    pub start_year: Option<i32>,

    #[serde(default)]
    pub end_year: Option<i32>,

    /// Optional IDS bulk CSV; fills years the API does not return.
    /// Relative paths resolve against `paths.raw_data`.
    #[serde(default)]
    pub bulk_file: Option<PathBuf>,
}

impl Default for IdsConfig {
    fn default() -> Self {
        Self {
            base_url: default_ids_base_url(),
            per_page: default_ids_per_page(),
            start_year: None,
            end_year: None,
            bulk_file: None,
        }
    }
}

fn default_ids_base_url() -> String {
    "https://api.worldbank.org/v2".into()
}
fn default_ids_per_page() -> u32 {
    1000
}

/// `[statements]` section (World Bank DataCatalog API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementsConfig {
    #[serde(default = "default_statements_base_url")]
    pub base_url: String,

    #[serde(default = "default_statements_page_size")]
    pub page_size: usize,

    #[serde(default = "default_ida_dataset")]
    pub ida_dataset_id: String,

    #[serde(default = "default_ida_resource")]
    pub ida_resource_id: String,

    #[serde(default = "default_ibrd_dataset")]
    pub ibrd_dataset_id: String,

    #[serde(default = "default_ibrd_resource")]
    pub ibrd_resource_id: String,
}

impl Default for StatementsConfig {
    fn default() -> Self {
        Self {
            base_url: default_statements_base_url(),
            page_size: default_statements_page_size(),
            ida_dataset_id: default_ida_dataset(),
            ida_resource_id: default_ida_resource(),
            ibrd_dataset_id: default_ibrd_dataset(),
            ibrd_resource_id: default_ibrd_resource(),
        }
    }
}

fn default_statements_base_url() -> String {
    "https://datacatalogapi.worldbank.org/dexapps/fone/api/apiservice".into()
}
fn default_statements_page_size() -> usize {
    100_000
}
fn default_ida_dataset() -> String {
    "DS00976".into()
}
fn default_ida_resource() -> String {
    "RS00906".into()
}
fn default_ibrd_dataset() -> String {
    "DS00975".into()
}
fn default_ibrd_resource() -> String {
    "RS00905".into()
}

/// `[crs]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrsConfig {
    /// Bulk file, relative paths resolve against `paths.raw_data`.
    #[serde(default = "default_crs_file")]
    pub file: PathBuf,

    #[serde(default = "default_crs_delimiter")]
    pub delimiter: char,

    /// World Bank donor codes: 901 IBRD, 903 IDA, 905 IDA (MDRI).
    #[serde(default = "default_donor_codes")]
    pub donor_codes: Vec<u32>,

    /// CRS amounts are reported in USD millions.
    #[serde(default = "default_amount_multiplier")]
    pub amount_multiplier: f64,
}

impl Default for CrsConfig {
    fn default() -> Self {
        Self {
            file: default_crs_file(),
            delimiter: default_crs_delimiter(),
            donor_codes: default_donor_codes(),
            amount_multiplier: default_amount_multiplier(),
        }
    }
}

fn default_crs_file() -> PathBuf {
    PathBuf::from("CRS.csv")
}
fn default_crs_delimiter() -> char {
    ','
}
fn default_donor_codes() -> Vec<u32> {
    vec![901, 903, 905]
}
fn default_amount_multiplier() -> f64 {
    1_000_000.0
}

/// `[merge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Max |approval year - commitment year| for characteristic matches.
    #[serde(default = "default_year_tolerance")]
    pub year_tolerance: i32,

    /// Relative amount tolerance for characteristic matches (0.05 = 5%).
    #[serde(default = "default_amount_tolerance")]
    pub amount_tolerance: f64,

    /// Loan types (IBRD `loan_type` values, or "IDA") for which a 0 rate is real.
    #[serde(default)]
    pub legitimate_zero_loan_types: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            year_tolerance: default_year_tolerance(),
            amount_tolerance: default_amount_tolerance(),
            legitimate_zero_loan_types: Vec::new(),
        }
    }
}

fn default_year_tolerance() -> i32 {
    1
}
fn default_amount_tolerance() -> f64 {
    0.05
}

/// `[reference]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    #[serde(default = "default_countries_file")]
    pub countries_file: PathBuf,

    /// Countries documented as having no IDS interest data.
    #[serde(default)]
    pub known_missing: Vec<String>,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            countries_file: default_countries_file(),
            known_missing: Vec::new(),
        }
    }
}

fn default_countries_file() -> PathBuf {
    PathBuf::from("reference/countries.csv")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Used when RUST_LOG is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::Text,
        }
    }
}

fn default_log_filter() -> String {
    "debt_rates=info".into()
}

// ============================================================================
// LOADING
// ============================================================================

impl PipelineConfig {
    /// Load config from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PipelineError::config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.merge.year_tolerance < 0 {
            return Err(PipelineError::config("merge.year_tolerance must be >= 0"));
        }
        if !(0.0..1.0).contains(&self.merge.amount_tolerance) {
            return Err(PipelineError::config(
                "merge.amount_tolerance must be in [0, 1)",
            ));
        }
        if !self.crs.delimiter.is_ascii() {
            return Err(PipelineError::config("crs.delimiter must be an ASCII character"));
        }
        if self.statements.page_size == 0 || self.ids.per_page == 0 {
            return Err(PipelineError::config("page sizes must be positive"));
        }
        if let (Some(start), Some(end)) = (self.ids.start_year, self.ids.end_year) {
            if start > end {
                return Err(PipelineError::config("ids.start_year is after ids.end_year"));
            }
        }
        Ok(())
    }

    fn raw_data_path(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.paths.raw_data.join(file)
        }
    }

    /// CRS bulk file location.
    pub fn crs_path(&self) -> PathBuf {
        self.raw_data_path(&self.crs.file)
    }

    /// IDS bulk file location, when one is configured.
    pub fn ids_bulk_path(&self) -> Option<PathBuf> {
        self.ids.bulk_file.as_deref().map(|f| self.raw_data_path(f))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_world_bank_sources() {
        let config = PipelineConfig::default();
        assert_eq!(config.crs.donor_codes, vec![901, 903, 905]);
        assert_eq!(config.statements.ida_dataset_id, "DS00976");
        assert_eq!(config.statements.ibrd_resource_id, "RS00905");
        assert!(config.merge.legitimate_zero_loan_types.is_empty());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [paths]
            output = "/tmp/out"

            [merge]
            year_tolerance = 2
            legitimate_zero_loan_types = ["GRANT"]
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.output, PathBuf::from("/tmp/out"));
        assert_eq!(config.paths.raw_data, PathBuf::from("raw_data"));
        assert_eq!(config.merge.year_tolerance, 2);
        assert_eq!(config.merge.amount_tolerance, 0.05);
        assert_eq!(config.merge.legitimate_zero_loan_types, vec!["GRANT"]);
    }

    #[test]
    fn rejects_bad_tolerance() {
        let err = PipelineConfig::from_toml("[merge]\namount_tolerance = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("amount_tolerance"));
    }

    #[test]
    fn crs_path_resolves_against_raw_data() {
        let config = PipelineConfig::default();
        assert_eq!(config.crs_path(), PathBuf::from("raw_data/CRS.csv"));
        assert_eq!(config.ids_bulk_path(), None);

        let config = PipelineConfig::from_toml("[ids]\nbulk_file = \"IDS_ALL.csv\"\n").unwrap();
        assert_eq!(config.ids_bulk_path(), Some(PathBuf::from("raw_data/IDS_ALL.csv")));
    }
}
