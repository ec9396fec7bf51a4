// 🚰 Pipeline - runs the stages in order and names the one that failed
//
// Country level:  IDS (API, plus bulk file when configured) → clean →
//                 per-country tables → coverage → visualisation
// Project level:  statements → project records → CRS merge → project table
//
// Reference data is loaded once and passed into every stage by reference.

use crate::cleaner::{drop_zero_values, resolve_duplicates, Cleaner, DataSource};
use crate::config::PipelineConfig;
use crate::error::{Result, Stage, StageExt};
use crate::extract::{load_crs_file, IdsBulkFile, IdsSource, StatementCache, StatementSource};
use crate::indicators::{IndicatorKind, IndicatorTaxonomy};
use crate::merge::{CrsIndex, MergeSummary, ProjectMerger};
use crate::projects::{build_project_records, LenderType, ZeroRatePolicy};
use crate::reference::{CountryRegistry, CoverageReport, KnownMissing};
use crate::visualisation::InterestPivot;
use crate::writer::OutputWriter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

pub const AFRICA_GROUP: &str = "africa";
pub const EMDE_NON_AFRICAN_GROUP: &str = "emde_non_african";

/// What a country-level run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CountryRunReport {
    pub countries_requested: usize,
    pub countries_written: usize,
    pub rows_written: usize,
    /// Coverage per output group
    pub coverage: BTreeMap<String, CoverageReport>,
}

pub struct Pipeline {
    config: PipelineConfig,
    registry: CountryRegistry,
    known_missing: KnownMissing,
    taxonomy: IndicatorTaxonomy,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, registry: CountryRegistry) -> Result<Self> {
        let known_missing = KnownMissing::new(&config.reference.known_missing, &registry)?;
        Ok(Pipeline {
            config,
            registry,
            known_missing,
            taxonomy: IndicatorTaxonomy::standard(),
        })
    }

    /// Load the reference table named in the config
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let registry = CountryRegistry::from_csv(&config.reference.countries_file)?;
        info!(countries = registry.count(), "reference table loaded");
        Self::new(config, registry)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &CountryRegistry {
        &self.registry
    }

    fn year_range(&self) -> Option<(i32, i32)> {
        match (self.config.ids.start_year, self.config.ids.end_year) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    // ========================================================================
    // EXTRACT
    // ========================================================================

    /// Pull IDA and IBRD statements and keep them under the raw data directory
    #[instrument(skip_all, fields(source = source.name()))]
    pub fn cache_statements(&self, source: &dyn StatementSource) -> Result<Vec<PathBuf>> {
        let cache = StatementCache::new(&self.config.paths.raw_data);
        let mut paths = Vec::new();

        for lender in [LenderType::Ida, LenderType::Ibrd] {
            let rows = source.rows(lender).stage(Stage::Extract)?;
            paths.push(cache.save(lender, &rows).stage(Stage::Write)?);
        }
        Ok(paths)
    }

    // ========================================================================
    // COUNTRY LEVEL
    // ========================================================================

    fn load_ids_bulk(&self, indicators: &[&str]) -> Result<Option<IdsBulkFile>> {
        let Some(path) = self.config.ids_bulk_path() else {
            return Ok(None);
        };
        IdsBulkFile::load(&path, indicators).map(Some)
    }

    /// Per-country interest tables for Africa and non-African EMDEs
    ///
    /// API rows win over bulk-file rows for the same country, counterpart,
    /// year and indicator.
    #[instrument(skip_all, fields(source = source.name()))]
    pub fn run_country_level(&self, source: &dyn IdsSource, writer: &mut OutputWriter) -> Result<CountryRunReport> {
        let cleaner = Cleaner::new(&self.registry, &self.taxonomy);
        let indicators = self.taxonomy.codes_of_kind(IndicatorKind::InterestRate);
        let years = self.year_range();
        let bulk = self.load_ids_bulk(&indicators).stage(Stage::Extract)?;

        let mut report = CountryRunReport::default();
        let mut pivot = InterestPivot::new();

        let groups = [
            (AFRICA_GROUP, self.registry.african()),
            (EMDE_NON_AFRICAN_GROUP, self.registry.emde_non_african()),
        ];

        for (group, countries) in groups {
            let mut requested = Vec::new();
            let mut with_data = Vec::new();

            for country in countries {
                requested.push(country.harmonized_name.clone());

                let Some(iso3) = country.iso3.as_deref() else {
                    warn!(country = %country.harmonized_name, "no ISO3 code, skipping download");
                    continue;
                };

                info!(country = %country.harmonized_name, group, "downloading interest data");
                let rows = source.fetch(iso3, &indicators, years).stage(Stage::Extract)?;
                let mut observations = cleaner.clean(&rows, DataSource::IdsApi).stage(Stage::Clean)?;
                if let Some(bulk) = &bulk {
                    let rows = bulk.fetch(iso3, &indicators, years).stage(Stage::Extract)?;
                    observations.extend(cleaner.clean(&rows, DataSource::IdsBulk).stage(Stage::Clean)?);
                }
                let observations = drop_zero_values(resolve_duplicates(observations));

                if writer
                    .write_country_table(group, &country.harmonized_name, &observations)
                    .stage(Stage::Write)?
                    .is_some()
                {
                    with_data.push(country.harmonized_name.clone());
                    report.countries_written += 1;
                    report.rows_written += observations.len();
                    pivot.add(&observations);
                }
            }

            let coverage = CoverageReport::build(&requested, &with_data, &self.known_missing);
            if !coverage.unexpected_missing.is_empty() {
                warn!(group, countries = ?coverage.unexpected_missing, "countries without data not on the known-missing list");
            }
            if !coverage.unexpectedly_present.is_empty() {
                warn!(group, countries = ?coverage.unexpectedly_present, "known-missing countries now have data");
            }
            report.countries_requested += requested.len();
            report.coverage.insert(group.to_string(), coverage);
        }

        writer.write_coverage(&report.coverage).stage(Stage::Write)?;
        writer.write_visualisation(&pivot).stage(Stage::Write)?;

        info!(
            requested = report.countries_requested,
            written = report.countries_written,
            rows = report.rows_written,
            "country-level run complete"
        );
        Ok(report)
    }

    // ========================================================================
    // PROJECT LEVEL
    // ========================================================================

    /// World Bank project rates, gap-filled from CRS
    #[instrument(skip_all, fields(source = source.name()))]
    pub fn run_project_level(&self, source: &dyn StatementSource, writer: &mut OutputWriter) -> Result<MergeSummary> {
        let mut rows = source.rows(LenderType::Ida).stage(Stage::Extract)?;
        rows.extend(source.rows(LenderType::Ibrd).stage(Stage::Extract)?);

        let policy = ZeroRatePolicy::with_legitimate_zero(&self.config.merge.legitimate_zero_loan_types);
        let records = build_project_records(&rows, &self.registry, &policy);
        let missing = records.iter().filter(|r| r.rate_missing).count();
        info!(projects = records.len(), missing, "projects with missing interest rates");

        let crs = load_crs_file(&self.config.crs_path(), &self.config.crs, &self.registry).stage(Stage::Merge)?;
        let index = CrsIndex::new(crs);

        let result = ProjectMerger::from_config(&self.config.merge).merge(records, &index);

        writer.write_projects(&result.projects).stage(Stage::Write)?;
        writer.write_merge_summary(&result.summary).stage(Stage::Write)?;

        Ok(result.summary)
    }

    /// Country and project level, then the manifest
    pub fn run_all(
        &self,
        ids: &dyn IdsSource,
        statements: &dyn StatementSource,
        writer: &mut OutputWriter,
    ) -> Result<(CountryRunReport, MergeSummary)> {
        let country = self.run_country_level(ids, writer)?;
        let projects = self.run_project_level(statements, writer)?;
        writer.write_manifest().stage(Stage::Write)?;
        Ok((country, projects))
    }
}

// ============================================================================
// TESTS
// ============================================================================
