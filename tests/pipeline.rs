// End-to-end runs against in-memory sources and a CRS file on disk

use chrono::NaiveDate;
use debt_rates::{
    CountryRegistry, LenderType, MemoryIdsSource, MemoryStatementSource, OutputWriter, Pipeline,
    PipelineConfig, PipelineError, RawIdsRow, Stage, StatementRow,
};
use std::collections::BTreeMap;
use std::path::Path;

const REFERENCE_CSV: &str = "\
entity_name,harmonized_name,iso3,dac_code,continent,income_level,emde,aliases
Kenya,Kenya,KEN,248,Africa,Lower middle income,true,Republic of Kenya
Cote d'Ivoire,Côte d'Ivoire,CIV,247,Africa,Lower middle income,true,Ivory Coast;Côte d'Ivoire
Peru,Peru,PER,433,South America,Upper middle income,true,
Germany,Germany,DEU,,Europe,High income,false,
";

const CRS_CSV: &str = "\
year,donor_code,recipient_code,project_number,commitment_date,interest1,interest2,usd_commitment
2012,903,248,P100.IDA100.1,2012-03-15,750,,50
2013,901,433,P900.IBRD900.1,2013-06-01,,2500,100
2013,901,433,P901.IBRD901.1,2013-07-01,,3000,100
";

fn create_test_config(root: &Path) -> PipelineConfig {
    let raw = root.join("raw");
    std::fs::create_dir_all(&raw).unwrap();
    std::fs::write(raw.join("CRS.csv"), CRS_CSV).unwrap();

    let mut config = PipelineConfig::default();
    config.paths.raw_data = raw;
    config
}

fn ids_row(entity: &str, iso3: &str, code: &str, year: i32, value: f64) -> RawIdsRow {
    RawIdsRow {
        entity_code: iso3.to_string(),
        entity_name: entity.to_string(),
        counterpart_code: "WLD".to_string(),
        counterpart_name: "World\u{a0}".to_string(),
        indicator_code: code.to_string(),
        year,
        value: Some(value),
    }
}

fn create_ids_source() -> MemoryIdsSource {
    MemoryIdsSource::new(vec![
        ids_row("Kenya", "KEN", "DT.INR.OFFT", 2021, 1.4),
        ids_row("Kenya", "KEN", "DT.INR.PRVT", 2021, 6.5),
        ids_row("Kenya", "KEN", "DT.INR.OFFT", 2022, 1.6),
        ids_row("Kenya", "KEN", "DT.INR.PRVT", 2022, 0.0),
        ids_row("Cote d'Ivoire", "CIV", "DT.INR.OFFT", 2022, 2.1),
        ids_row("Peru", "PER", "DT.INR.PRVT", 2022, 4.75),
    ])
}

fn statement(lender: LenderType, loan: &str, project: &str, country: &str, date: (i32, u32, u32), rate: f64, amount: f64) -> StatementRow {
    StatementRow {
        lender,
        loan_number: loan.to_string(),
        end_of_period: NaiveDate::from_ymd_opt(2024, 8, 31),
        board_approval_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
        country_code: String::new(),
        country: country.to_string(),
        project_id: project.to_string(),
        project_name: format!("{project} project"),
        loan_type: None,
        interest_rate: Some(rate),
        principal_amount: Some(amount),
    }
}

fn create_statement_source() -> MemoryStatementSource {
    MemoryStatementSource::new(vec![
        // primary rate
        statement(LenderType::Ida, "IDA200", "P200", "Kenya", (2015, 1, 10), 0.75, 2.0e7),
        // missing, identifier match in CRS
        statement(LenderType::Ida, "IDA100", "P100", "Kenya", (2012, 3, 15), 0.0, 5.0e7),
        // missing, two equally close CRS loans for Peru → ambiguous
        statement(LenderType::Ibrd, "IBRD777", "P777", "Peru", (2013, 2, 1), 0.0, 1.0e8),
        // missing, regional project with no CRS counterpart
        statement(LenderType::Ida, "IDA300", "P300", "Western and Central Africa", (2020, 5, 5), 0.0, 1.0e7),
    ])
}

fn run(root: &Path) {
    let config = create_test_config(root);
    let registry = CountryRegistry::from_reader(REFERENCE_CSV.as_bytes()).unwrap();
    let pipeline = Pipeline::new(config, registry).unwrap();
    let mut writer = OutputWriter::new(&root.join("out"));

    pipeline
        .run_all(&create_ids_source(), &create_statement_source(), &mut writer)
        .unwrap();
}

fn read_tree(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let relative = path.strip_prefix(dir).unwrap().to_string_lossy().into_owned();
                files.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }
    files
}

#[test]
fn test_identical_inputs_give_identical_bytes() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    run(first.path());
    run(second.path());

    let a = read_tree(&first.path().join("out"));
    let b = read_tree(&second.path().join("out"));

    assert!(!a.is_empty());
    assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
    for (path, bytes) in &a {
        assert_eq!(Some(bytes), b.get(path), "{path} differs between runs");
    }
}

#[test]
fn test_end_to_end_outputs() {
    let dir = tempfile::tempdir().unwrap();
    run(dir.path());
    let out = dir.path().join("out");

    // Kenya: 3 non-zero rows, official first then private, years descending
    let kenya = std::fs::read_to_string(out.join("interest_rates/africa/Kenya_2021_2022.csv")).unwrap();
    let lines: Vec<&str> = kenya.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[1].contains("World (official)") && lines[1].contains(",2022,"));
    assert!(lines[2].contains("World (official)") && lines[2].contains(",2021,"));
    assert!(lines[3].contains("World (private)"));

    assert!(out.join("interest_rates/africa/Côte d'Ivoire_2022_2022.csv").exists());
    assert!(out.join("interest_rates/emde_non_african/Peru_2022_2022.csv").exists());

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("projects/merge_summary.json")).unwrap()).unwrap();
    assert_eq!(summary["total_projects"], 4);
    assert_eq!(summary["with_primary_rate"], 1);
    assert_eq!(summary["filled_from_crs"], 1);
    assert_eq!(summary["still_missing"], 2);
    assert_eq!(summary["ambiguous"], 1);
    assert_eq!(summary["missing_pct"], 50.0);

    let projects = std::fs::read_to_string(out.join("projects/wb_projects_interest.csv")).unwrap();
    let filled = projects.lines().find(|l| l.starts_with("P100,")).unwrap();
    assert!(filled.contains(",0.75,filled-from-crs,identifier"));
    let ambiguous = projects.lines().find(|l| l.starts_with("P777,")).unwrap();
    assert!(ambiguous.contains(",still-missing,"));

    let manifest = std::fs::read_to_string(out.join("manifest.json")).unwrap();
    assert!(manifest.contains("visualisations/interest_rates.csv"));
    assert!(!manifest.contains("manifest.json"));
}

#[test]
fn test_missing_crs_file_fails_in_merge_stage() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path());
    std::fs::remove_file(config.crs_path()).unwrap();

    let registry = CountryRegistry::from_reader(REFERENCE_CSV.as_bytes()).unwrap();
    let pipeline = Pipeline::new(config, registry).unwrap();
    let mut writer = OutputWriter::new(&dir.path().join("out"));

    let err = pipeline
        .run_project_level(&create_statement_source(), &mut writer)
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Merge));
    assert!(err.to_string().contains("CRS source"));
    assert!(!matches!(err, PipelineError::UnmappedEntity { .. }));
}

#[test]
fn test_unmapped_country_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path());
    let registry = CountryRegistry::from_reader(REFERENCE_CSV.as_bytes()).unwrap();
    let pipeline = Pipeline::new(config, registry).unwrap();
    let mut writer = OutputWriter::new(&dir.path().join("out"));

    let source = MemoryIdsSource::new(vec![ids_row("Kenya (typo)", "KEN", "DT.INR.OFFT", 2021, 1.0)]);
    let err = pipeline.run_country_level(&source, &mut writer).unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Clean));
}
