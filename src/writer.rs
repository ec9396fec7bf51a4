// 💾 Output Writer - deterministic CSV / JSON tree
//
// <output>/
//   interest_rates/<group>/<country>_<start>_<end>.csv
//   interest_rates/coverage.json
//   projects/wb_projects_interest.csv
//   projects/merge_summary.json
//   visualisations/interest_rates.csv
//   manifest.json
//
// Same input → same bytes. No timestamps, no run ids, stable row order.

use crate::cleaner::Observation;
use crate::error::{PipelineError, Result};
use crate::merge::{MergeSummary, MergedProject};
use crate::visualisation::InterestPivot;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const PROJECTS_FILE: &str = "projects/wb_projects_interest.csv";
pub const MERGE_SUMMARY_FILE: &str = "projects/merge_summary.json";
pub const VISUALISATION_FILE: &str = "visualisations/interest_rates.csv";
pub const COVERAGE_FILE: &str = "interest_rates/coverage.json";
pub const MANIFEST_FILE: &str = "manifest.json";

// ============================================================================
// OUTPUT ROWS
// ============================================================================

#[derive(Debug, Serialize)]
struct CountryTableRow<'a> {
    entity_code: &'a str,
    entity_name: &'a str,
    counterpart_name: String,
    income_level: Option<&'a str>,
    continent: Option<&'a str>,
    year: i32,
    value: f64,
}

impl<'a> From<&'a Observation> for CountryTableRow<'a> {
    fn from(obs: &'a Observation) -> Self {
        CountryTableRow {
            entity_code: &obs.entity_code,
            entity_name: &obs.country,
            counterpart_name: obs.counterpart_label(),
            income_level: obs.income_level.as_deref(),
            continent: obs.continent.as_deref(),
            year: obs.year,
            value: obs.value,
        }
    }
}

#[derive(Debug, Serialize)]
struct ManifestEntry {
    path: String,
    sha256: String,
    bytes: u64,
}

#[derive(Debug, Serialize)]
struct Manifest {
    files: Vec<ManifestEntry>,
}

// ============================================================================
// WRITER
// ============================================================================

pub struct OutputWriter {
    root: PathBuf,
    /// Relative paths written this run
    written: Vec<PathBuf>,
}

impl OutputWriter {
    pub fn new(root: &Path) -> Self {
        OutputWriter {
            root: root.to_path_buf(),
            written: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative paths of every file written so far, sorted
    pub fn written(&self) -> Vec<PathBuf> {
        let mut files = self.written.clone();
        files.sort();
        files.dedup();
        files
    }

    fn prepare(&mut self, relative: &Path) -> Result<PathBuf> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        self.written.push(relative.to_path_buf());
        Ok(path)
    }

    fn write_bytes(&mut self, relative: &Path, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.prepare(relative)?;
        std::fs::write(&path, bytes).map_err(|e| PipelineError::io(&path, e))?;
        debug!(path = %relative.display(), bytes = bytes.len(), "file written");
        Ok(path)
    }

    fn write_json<T: Serialize>(&mut self, relative: &Path, value: &T) -> Result<PathBuf> {
        let mut json = serde_json::to_string_pretty(value)?;
        json.push('\n');
        self.write_bytes(relative, json.as_bytes())
    }

    /// One country's interest table
    ///
    /// Rows sort by counterpart label ascending, then year descending.
    /// A country without rows produces no file.
    pub fn write_country_table(&mut self, group: &str, country: &str, observations: &[Observation]) -> Result<Option<PathBuf>> {
        let (Some(start), Some(end)) = (
            observations.iter().map(|o| o.year).min(),
            observations.iter().map(|o| o.year).max(),
        ) else {
            return Ok(None);
        };

        let mut rows: Vec<CountryTableRow> = observations.iter().map(CountryTableRow::from).collect();
        rows.sort_by(|a, b| {
            a.counterpart_name
                .cmp(&b.counterpart_name)
                .then(b.year.cmp(&a.year))
        });

        let file_name = format!("{}_{}_{}.csv", sanitize_file_name(country), start, end);
        let relative = Path::new("interest_rates").join(group).join(file_name);
        let path = self.prepare(&relative)?;

        let mut wtr = csv::Writer::from_path(&path)?;
        for row in &rows {
            wtr.serialize(row)?;
        }
        wtr.flush().map_err(|e| PipelineError::io(&path, e))?;

        debug!(country, rows = rows.len(), path = %relative.display(), "country table written");
        Ok(Some(path))
    }

    pub fn write_coverage<T: Serialize>(&mut self, coverage: &T) -> Result<PathBuf> {
        self.write_json(Path::new(COVERAGE_FILE), coverage)
    }

    pub fn write_projects(&mut self, projects: &[MergedProject]) -> Result<PathBuf> {
        let path = self.prepare(Path::new(PROJECTS_FILE))?;

        let mut wtr = csv::Writer::from_path(&path)?;
        for project in projects {
            wtr.serialize(project.to_row())?;
        }
        wtr.flush().map_err(|e| PipelineError::io(&path, e))?;

        info!(rows = projects.len(), path = PROJECTS_FILE, "project table written");
        Ok(path)
    }

    pub fn write_merge_summary(&mut self, summary: &MergeSummary) -> Result<PathBuf> {
        self.write_json(Path::new(MERGE_SUMMARY_FILE), summary)
    }

    pub fn write_visualisation(&mut self, pivot: &InterestPivot) -> Result<PathBuf> {
        let path = self.prepare(Path::new(VISUALISATION_FILE))?;

        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record(pivot.headers())?;
        for row in pivot.rows() {
            wtr.serialize(&row)?;
        }
        wtr.flush().map_err(|e| PipelineError::io(&path, e))?;
        Ok(path)
    }

    /// SHA-256 of every file written this run, sorted by path
    pub fn write_manifest(&mut self) -> Result<PathBuf> {
        let mut files = Vec::new();
        for relative in self.written() {
            if relative == Path::new(MANIFEST_FILE) {
                continue;
            }
            let path = self.root.join(&relative);
            let bytes = std::fs::read(&path).map_err(|e| PipelineError::io(&path, e))?;

            files.push(ManifestEntry {
                path: relative_to_slash(&relative),
                sha256: sha256_hex(&bytes),
                bytes: bytes.len() as u64,
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        info!(files = files.len(), "manifest written");
        self.write_json(Path::new(MANIFEST_FILE), &Manifest { files })
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn relative_to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Country names become file names ("Bosnia/Herzegovina" is not a path)
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c => c,
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
