use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;

use debt_rates::{
    logging::init_tracing, IdsApiClient, LenderType, OutputWriter, Pipeline, PipelineConfig,
    StatementCache, StatementsApiClient, CONFIG_FILE_NAME,
};

const USAGE: &str = "\
debt-rates - interest rates on sovereign and World Bank project debt

USAGE:
    debt-rates <COMMAND> [--config <FILE>] [-v]

COMMANDS:
    extract   Download IDA / IBRD statements into the raw data directory
    country   Country-level interest tables (Africa, non-African EMDEs)
    project   Project-level rates, gap-filled from CRS
    all       country + project + manifest
";

struct Args {
    command: String,
    config: PathBuf,
    verbose: u8,
}

fn parse_args() -> Result<Args> {
    let mut args = env::args().skip(1);
    let mut command = None;
    let mut config = PathBuf::from(CONFIG_FILE_NAME);
    let mut verbose = 0u8;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config = args
                    .next()
                    .map(PathBuf::from)
                    .context("--config needs a file path")?;
            }
            "-v" | "--verbose" => verbose = verbose.saturating_add(1),
            "-vv" => verbose = verbose.saturating_add(2),
            "-h" | "--help" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            other if command.is_none() => command = Some(other.to_string()),
            other => anyhow::bail!("unexpected argument: {other}\n\n{USAGE}"),
        }
    }

    Ok(Args {
        command: command.unwrap_or_else(|| "all".to_string()),
        config,
        verbose,
    })
}

fn main() -> Result<()> {
    let args = parse_args()?;

    let config = PipelineConfig::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    init_tracing(&config.logging, args.verbose)?;

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id, command = %args.command);
    let _guard = span.enter();

    let pipeline = Pipeline::from_config(config).context("failed to load reference data")?;
    let mut writer = OutputWriter::new(&pipeline.config().paths.output);

    match args.command.as_str() {
        "extract" => run_extract(&pipeline)?,
        "country" => run_country(&pipeline, &mut writer)?,
        "project" => run_project(&pipeline, &mut writer)?,
        "all" => {
            run_country(&pipeline, &mut writer)?;
            run_project(&pipeline, &mut writer)?;
        }
        other => anyhow::bail!("unknown command: {other}\n\n{USAGE}"),
    }

    if args.command != "extract" {
        writer.write_manifest().context("failed to write manifest")?;
        println!("✅ Output written to {}", writer.root().display());
    }

    Ok(())
}

fn run_extract(pipeline: &Pipeline) -> Result<()> {
    println!("📥 Downloading IDA / IBRD statements...");
    let client = StatementsApiClient::new(&pipeline.config().statements)?;
    let paths = pipeline.cache_statements(&client)?;
    for path in paths {
        println!("✓ {}", path.display());
    }
    Ok(())
}

fn run_country(pipeline: &Pipeline, writer: &mut OutputWriter) -> Result<()> {
    println!("🌍 Country-level interest rates...");
    let client = IdsApiClient::new(&pipeline.config().ids)?;
    let report = pipeline
        .run_country_level(&client, writer)
        .context("country-level run failed")?;

    println!(
        "✓ {} of {} countries written ({} rows)",
        report.countries_written, report.countries_requested, report.rows_written
    );
    for (group, coverage) in &report.coverage {
        if !coverage.is_clean() {
            println!("⚠️  {group}: coverage differs from the known-missing list");
        }
    }
    Ok(())
}

fn run_project(pipeline: &Pipeline, writer: &mut OutputWriter) -> Result<()> {
    println!("🏗️  Project-level interest rates...");
    let raw_data = &pipeline.config().paths.raw_data;
    if !statements_cached(raw_data) {
        info!("statement cache missing, downloading");
        run_extract(pipeline)?;
    }

    let cache = StatementCache::new(raw_data);
    let summary = pipeline
        .run_project_level(&cache, writer)
        .context("project-level run failed")?;

    println!(
        "✓ {} projects: {} primary, {} filled from CRS, {} still missing ({}%, {} ambiguous)",
        summary.total_projects,
        summary.with_primary_rate,
        summary.filled_from_crs,
        summary.still_missing,
        summary.missing_pct,
        summary.ambiguous
    );
    Ok(())
}

fn statements_cached(raw_data: &Path) -> bool {
    let cache = StatementCache::new(raw_data);
    [LenderType::Ida, LenderType::Ibrd]
        .iter()
        .all(|lender| cache.path(*lender).exists())
}
