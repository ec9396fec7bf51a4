// Debt Rates - Core Library
// Interest rates on sovereign and World Bank project debt: extract, clean,
// harmonize, gap-fill, write.

pub mod aggregate;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod extract;
pub mod indicators;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod projects;
pub mod reference;
pub mod visualisation;
pub mod writer;

// Re-export commonly used types
pub use aggregate::{build_terms_table, weighted_average, weighted_average_by, GroupBy, TermsRow};
pub use cleaner::{drop_zero_values, resolve_duplicates, Cleaner, DataSource, Observation};
pub use config::{LogFormat, PipelineConfig, CONFIG_FILE_NAME};
pub use error::{PipelineError, Result, Stage, StageExt};
pub use extract::{
    load_crs_file, CrsRecord, IdsApiClient, IdsBulkFile, IdsSource, MemoryIdsSource,
    MemoryStatementSource, RawIdsRow, StatementCache, StatementRow, StatementSource,
    StatementsApiClient,
};
pub use indicators::{CreditorClass, IndicatorKind, IndicatorTaxonomy, RateUnit};
pub use merge::{
    known_loans, CrsIndex, CrsMatcher, IdentifierThenCharacteristics, KnownLoans, MatchKind,
    MatchOutcome, MergeSummary, MergedProject, ProjectMerger, Provenance,
};
pub use pipeline::{CountryRunReport, Pipeline};
pub use projects::{build_project_records, LenderType, ProjectRecord, ZeroRatePolicy};
pub use reference::{Country, CountryRegistry, CoverageReport, KnownMissing};
pub use visualisation::{InterestPivot, PivotCell};
pub use writer::OutputWriter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
