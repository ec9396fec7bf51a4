// 🔗 Project-Level Merger - fill missing World Bank project rates from CRS
//
// Two-tier matching (same shape as bank reconciliation):
//
// Tier 1 (identifier): project ID + loan number (+ ISO3 when both known),
//   exact approval date preferred, else closest year within tolerance.
// Tier 2 (characteristics): only when tier 1 finds no candidate. Same
//   recipient ISO3, year within tolerance, USD amount within relative
//   tolerance. Closest year wins. CRS loans that name a project present in
//   the statements belong to that project and are never tier 2 candidates.
//
// Two equally good candidates → ambiguous → the project stays missing.
// One CRS loan claimed by several tier 2 projects → ambiguous for all.

use crate::config::MergeConfig;
use crate::extract::CrsRecord;
use crate::projects::{LenderType, ProjectRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

// ============================================================================
// MATCH TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Identifier,
    Characteristics,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Unique { index: usize, kind: MatchKind },
    NoMatch,
    /// Indices of the equally good candidates
    Ambiguous { candidates: Vec<usize> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Primary,
    FilledFromCrs,
    StillMissing,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Primary => "primary",
            Provenance::FilledFromCrs => "filled-from-crs",
            Provenance::StillMissing => "still-missing",
        }
    }
}

// ============================================================================
// CRS INDEX
// ============================================================================

/// CRS records with lookup maps by project ID and by recipient ISO3
pub struct CrsIndex {
    records: Vec<CrsRecord>,
    by_project: HashMap<String, Vec<usize>>,
    by_recipient: HashMap<String, Vec<usize>>,
}

impl CrsIndex {
    pub fn new(records: Vec<CrsRecord>) -> Self {
        let mut by_project: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_recipient: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, record) in records.iter().enumerate() {
            by_project.entry(record.project_id.clone()).or_default().push(idx);
            if let Some(iso3) = &record.iso3 {
                by_recipient.entry(iso3.clone()).or_default().push(idx);
            }
        }

        CrsIndex {
            records,
            by_project,
            by_recipient,
        }
    }

    pub fn get(&self, index: usize) -> Option<&CrsRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Latest year CRS covers
    pub fn max_year(&self) -> Option<i32> {
        self.records.iter().filter_map(|r| r.year).max()
    }

    fn for_project(&self, project_id: &str) -> &[usize] {
        self.by_project.get(project_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn for_recipient(&self, iso3: &str) -> &[usize] {
        self.by_recipient.get(iso3).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ============================================================================
// MATCHER
// ============================================================================

/// (project_id, loan_number) of every loan in the statements
pub type KnownLoans = HashSet<(String, String)>;

pub fn known_loans(records: &[ProjectRecord]) -> KnownLoans {
    records
        .iter()
        .map(|r| (r.project_id.clone(), r.loan_number.clone()))
        .collect()
}

/// Finds the CRS record for a project whose primary rate is missing
pub trait CrsMatcher {
    fn find_match(&self, project: &ProjectRecord, index: &CrsIndex, known: &KnownLoans) -> MatchOutcome;
}

/// Identifier match first, loan characteristics as fallback
#[derive(Debug, Clone)]
pub struct IdentifierThenCharacteristics {
    pub year_tolerance: i32,
    /// Relative, |a - b| / max(a, b)
    pub amount_tolerance: f64,
}

impl IdentifierThenCharacteristics {
    pub fn new() -> Self {
        Self::from_config(&MergeConfig::default())
    }

    pub fn from_config(config: &MergeConfig) -> Self {
        IdentifierThenCharacteristics {
            year_tolerance: config.year_tolerance,
            amount_tolerance: config.amount_tolerance,
        }
    }

    fn year_distance(&self, project: &ProjectRecord, record: &CrsRecord) -> Option<i32> {
        let distance = (project.approval_year? - record.year?).abs();
        (distance <= self.year_tolerance).then_some(distance)
    }

    fn amount_within_tolerance(&self, a: Option<f64>, b: f64) -> bool {
        let Some(a) = a else { return false };
        let largest = a.abs().max(b.abs());
        if largest == 0.0 {
            return true;
        }
        (a - b).abs() / largest <= self.amount_tolerance
    }

    /// Tier 1: project ID + loan number
    fn match_identifier(&self, project: &ProjectRecord, index: &CrsIndex) -> Vec<(usize, i32)> {
        index
            .for_project(&project.project_id)
            .iter()
            .copied()
            .filter_map(|idx| {
                let record = index.get(idx)?;
                if record.loan_number != project.loan_number {
                    return None;
                }
                if let (Some(a), Some(b)) = (&project.iso3, &record.iso3) {
                    if a != b {
                        return None;
                    }
                }
                if dates_equal(project.approval_date, record.commitment_date) {
                    return Some((idx, 0));
                }
                // distance 0 is reserved for exact dates
                self.year_distance(project, record).map(|d| (idx, d + 1))
            })
            .collect()
    }

    /// Tier 2: recipient + year + amount
    fn match_characteristics(&self, project: &ProjectRecord, index: &CrsIndex, known: &KnownLoans) -> Vec<(usize, i32)> {
        let Some(iso3) = &project.iso3 else {
            return Vec::new();
        };
        index
            .for_recipient(iso3)
            .iter()
            .copied()
            .filter_map(|idx| {
                let record = index.get(idx)?;
                if known.contains(&(record.project_id.clone(), record.loan_number.clone())) {
                    return None;
                }
                let distance = self.year_distance(project, record)?;
                self.amount_within_tolerance(project.principal_amount, record.usd_commitment)
                    .then_some((idx, distance))
            })
            .collect()
    }
}

impl Default for IdentifierThenCharacteristics {
    fn default() -> Self {
        Self::new()
    }
}

fn dates_equal(a: Option<NaiveDate>, b: Option<NaiveDate>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

/// Pick the closest candidate; a tie at the best distance is ambiguous
fn pick_best(candidates: Vec<(usize, i32)>, kind: MatchKind) -> MatchOutcome {
    let Some(best) = candidates.iter().map(|(_, d)| *d).min() else {
        return MatchOutcome::NoMatch;
    };
    let mut winners: Vec<usize> = candidates
        .into_iter()
        .filter(|(_, d)| *d == best)
        .map(|(idx, _)| idx)
        .collect();

    if winners.len() == 1 {
        MatchOutcome::Unique { index: winners[0], kind }
    } else {
        winners.sort_unstable();
        MatchOutcome::Ambiguous { candidates: winners }
    }
}

impl CrsMatcher for IdentifierThenCharacteristics {
    fn find_match(&self, project: &ProjectRecord, index: &CrsIndex, known: &KnownLoans) -> MatchOutcome {
        let by_identifier = self.match_identifier(project, index);
        if !by_identifier.is_empty() {
            return pick_best(by_identifier, MatchKind::Identifier);
        }
        pick_best(self.match_characteristics(project, index, known), MatchKind::Characteristics)
    }
}

// ============================================================================
// MERGED OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MergedProject {
    pub record: ProjectRecord,
    pub interest_rate: Option<f64>,
    pub provenance: Provenance,
    pub match_kind: Option<MatchKind>,
}

/// One CSV row of projects/wb_projects_interest.csv
#[derive(Debug, Serialize)]
pub struct MergedProjectRow<'a> {
    pub project_id: &'a str,
    pub loan_number: &'a str,
    pub lender: LenderType,
    pub country: &'a str,
    pub iso3: Option<&'a str>,
    pub board_approval_date: Option<NaiveDate>,
    pub loan_type: Option<&'a str>,
    pub principal_amount: Option<f64>,
    pub interest_rate: Option<f64>,
    pub provenance: &'static str,
    pub match_kind: Option<MatchKind>,
}

impl MergedProject {
    pub fn to_row(&self) -> MergedProjectRow<'_> {
        MergedProjectRow {
            project_id: &self.record.project_id,
            loan_number: &self.record.loan_number,
            lender: self.record.lender,
            country: &self.record.country,
            iso3: self.record.iso3.as_deref(),
            board_approval_date: self.record.approval_date,
            loan_type: self.record.loan_type.as_deref(),
            principal_amount: self.record.principal_amount,
            interest_rate: self.interest_rate,
            provenance: self.provenance.as_str(),
            match_kind: self.match_kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub total_projects: usize,
    pub with_primary_rate: usize,
    pub filled_from_crs: usize,
    pub filled_by_identifier: usize,
    pub filled_by_characteristics: usize,
    pub still_missing: usize,
    /// Subset of still_missing with more than one equally good candidate
    pub ambiguous: usize,
    /// Still-missing projects approved after the last CRS year
    pub missing_after_crs_coverage: usize,
    pub crs_max_year: Option<i32>,
    /// Share of projects without a rate, percent, one decimal
    pub missing_pct: f64,
}

pub struct MergeResult {
    pub projects: Vec<MergedProject>,
    pub summary: MergeSummary,
}

// ============================================================================
// MERGER
// ============================================================================

pub struct ProjectMerger {
    matcher: Box<dyn CrsMatcher>,
}

impl ProjectMerger {
    pub fn new(matcher: Box<dyn CrsMatcher>) -> Self {
        ProjectMerger { matcher }
    }

    pub fn from_config(config: &MergeConfig) -> Self {
        Self::new(Box::new(IdentifierThenCharacteristics::from_config(config)))
    }

    /// Keep primary rates, fill the gaps from CRS where a unique match exists
    pub fn merge(&self, records: Vec<ProjectRecord>, crs: &CrsIndex) -> MergeResult {
        let mut summary = MergeSummary {
            total_projects: records.len(),
            crs_max_year: crs.max_year(),
            ..MergeSummary::default()
        };
        let known = known_loans(&records);
        let mut projects = Vec::with_capacity(records.len());
        let mut pending = Vec::new();

        for record in records {
            if !record.rate_missing {
                summary.with_primary_rate += 1;
                projects.push(MergedProject {
                    interest_rate: record.reported_rate,
                    record,
                    provenance: Provenance::Primary,
                    match_kind: None,
                });
                continue;
            }
            let outcome = self.matcher.find_match(&record, crs, &known);
            pending.push((record, outcome));
        }

        // a CRS loan filling two projects by characteristics fills neither
        let mut claims: HashMap<usize, usize> = HashMap::new();
        for (_, outcome) in &pending {
            if let MatchOutcome::Unique { index, kind: MatchKind::Characteristics } = outcome {
                *claims.entry(*index).or_default() += 1;
            }
        }

        for (record, outcome) in pending {
            let outcome = match outcome {
                MatchOutcome::Unique { index, kind: MatchKind::Characteristics }
                    if claims.get(&index).copied().unwrap_or(0) > 1 =>
                {
                    MatchOutcome::Ambiguous { candidates: vec![index] }
                }
                other => other,
            };

            let merged = match outcome {
                MatchOutcome::Unique { index, kind } => match crs.get(index) {
                    Some(crs_record) => {
                        summary.filled_from_crs += 1;
                        match kind {
                            MatchKind::Identifier => summary.filled_by_identifier += 1,
                            MatchKind::Characteristics => summary.filled_by_characteristics += 1,
                        }
                        MergedProject {
                            interest_rate: Some(crs_record.interest_rate),
                            record,
                            provenance: Provenance::FilledFromCrs,
                            match_kind: Some(kind),
                        }
                    }
                    None => still_missing(record),
                },
                MatchOutcome::Ambiguous { candidates } => {
                    debug!(project_id = %record.project_id, loan = %record.loan_number, candidates = candidates.len(), "ambiguous CRS match");
                    summary.ambiguous += 1;
                    still_missing(record)
                }
                MatchOutcome::NoMatch => still_missing(record),
            };

            if merged.provenance == Provenance::StillMissing {
                summary.still_missing += 1;
                if let (Some(year), Some(max)) = (merged.record.approval_year, summary.crs_max_year) {
                    if year > max {
                        summary.missing_after_crs_coverage += 1;
                    }
                }
            }
            projects.push(merged);
        }

        projects.sort_by(|a, b| {
            (&a.record.project_id, &a.record.loan_number, a.record.lender)
                .cmp(&(&b.record.project_id, &b.record.loan_number, b.record.lender))
        });

        if summary.total_projects > 0 {
            let pct = 100.0 * summary.still_missing as f64 / summary.total_projects as f64;
            summary.missing_pct = (pct * 10.0).round() / 10.0;
        }

        info!(
            total = summary.total_projects,
            primary = summary.with_primary_rate,
            filled = summary.filled_from_crs,
            still_missing = summary.still_missing,
            ambiguous = summary.ambiguous,
            missing_pct = summary.missing_pct,
            "project merge complete"
        );

        MergeResult { projects, summary }
    }
}

impl Default for ProjectMerger {
    fn default() -> Self {
        Self::new(Box::new(IdentifierThenCharacteristics::new()))
    }
}

fn still_missing(record: ProjectRecord) -> MergedProject {
    MergedProject {
        record,
        interest_rate: None,
        provenance: Provenance::StillMissing,
        match_kind: None,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn create_test_project(project_id: &str, loan: &str, date: (i32, u32, u32), rate: Option<f64>) -> ProjectRecord {
        let approval_date = NaiveDate::from_ymd_opt(date.0, date.1, date.2);
        ProjectRecord {
            project_id: project_id.to_string(),
            loan_number: loan.to_string(),
            country: "Ghana".to_string(),
            iso3: Some("GHA".to_string()),
            approval_year: approval_date.map(|d| d.year()),
            approval_date,
            lender: LenderType::Ida,
            loan_type: None,
            principal_amount: Some(50_000_000.0),
            rate_missing: rate.map_or(true, |r| r == 0.0),
            reported_rate: rate,
        }
    }

    fn create_test_crs(project_id: &str, loan: &str, date: (i32, u32, u32), rate: f64, amount: f64) -> CrsRecord {
        let commitment_date = NaiveDate::from_ymd_opt(date.0, date.1, date.2);
        CrsRecord {
            project_id: project_id.to_string(),
            loan_number: loan.to_string(),
            recipient_code: 241,
            iso3: Some("GHA".to_string()),
            year: commitment_date.map(|d| d.year()),
            commitment_date,
            interest_rate: rate,
            usd_commitment: amount,
        }
    }

    #[test]
    fn test_primary_rate_kept() {
        let index = CrsIndex::new(vec![create_test_crs("P1", "IDA1", (2012, 3, 15), 2.0, 5.0e7)]);
        let result = ProjectMerger::default().merge(vec![create_test_project("P1", "IDA1", (2012, 3, 15), Some(0.75))], &index);

        assert_eq!(result.projects[0].provenance, Provenance::Primary);
        assert_eq!(result.projects[0].interest_rate, Some(0.75));
        assert_eq!(result.summary.with_primary_rate, 1);
    }

    #[test]
    fn test_fill_by_identifier() {
        let index = CrsIndex::new(vec![
            create_test_crs("P1", "IDA1", (2012, 3, 15), 0.75, 1.0),
            create_test_crs("P1", "IDA1", (2013, 1, 1), 1.25, 1.0),
        ]);
        let result = ProjectMerger::default().merge(vec![create_test_project("P1", "IDA1", (2012, 3, 15), Some(0.0))], &index);

        let merged = &result.projects[0];
        assert_eq!(merged.provenance, Provenance::FilledFromCrs);
        assert_eq!(merged.match_kind, Some(MatchKind::Identifier));
        assert_eq!(merged.interest_rate, Some(0.75));
        assert_eq!(result.summary.filled_by_identifier, 1);
    }

    #[test]
    fn test_fill_by_recipient_year_amount() {
        // different identifiers, same recipient, year and amount within 5%
        let index = CrsIndex::new(vec![create_test_crs("P999", "X", (2012, 6, 1), 1.25, 51_000_000.0)]);
        let result = ProjectMerger::default().merge(vec![create_test_project("P1", "IDA1", (2012, 3, 15), None)], &index);

        let merged = &result.projects[0];
        assert_eq!(merged.provenance, Provenance::FilledFromCrs);
        assert_eq!(merged.match_kind, Some(MatchKind::Characteristics));
        assert_eq!(merged.interest_rate, Some(1.25));
    }

    #[test]
    fn test_amount_outside_tolerance_no_match() {
        let index = CrsIndex::new(vec![create_test_crs("P999", "X", (2012, 6, 1), 1.25, 80_000_000.0)]);
        let result = ProjectMerger::default().merge(vec![create_test_project("P1", "IDA1", (2012, 3, 15), None)], &index);

        assert_eq!(result.projects[0].provenance, Provenance::StillMissing);
        assert_eq!(result.summary.ambiguous, 0);
        assert_eq!(result.summary.missing_pct, 100.0);
    }

    #[test]
    fn test_two_equal_candidates_stay_missing() {
        let index = CrsIndex::new(vec![
            create_test_crs("P8", "A", (2012, 5, 1), 1.0, 50_000_000.0),
            create_test_crs("P9", "B", (2012, 9, 1), 2.0, 50_000_000.0),
        ]);
        let result = ProjectMerger::default().merge(vec![create_test_project("P1", "IDA1", (2012, 3, 15), Some(0.0))], &index);

        let merged = &result.projects[0];
        assert_eq!(merged.provenance, Provenance::StillMissing);
        assert_eq!(merged.interest_rate, None);
        assert_eq!(result.summary.ambiguous, 1);
        assert_eq!(result.summary.still_missing, 1);
    }

    #[test]
    fn test_closest_year_wins() {
        let matcher = IdentifierThenCharacteristics::new();
        let index = CrsIndex::new(vec![
            create_test_crs("P8", "A", (2013, 5, 1), 1.0, 50_000_000.0),
            create_test_crs("P9", "B", (2012, 9, 1), 2.0, 50_000_000.0),
        ]);

        let outcome = matcher.find_match(&create_test_project("P1", "IDA1", (2012, 3, 15), None), &index, &KnownLoans::new());
        assert_eq!(outcome, MatchOutcome::Unique { index: 1, kind: MatchKind::Characteristics });
    }

    #[test]
    fn test_crs_loan_of_known_project_not_reused_by_characteristics() {
        // P1/IDA1 owns the only CRS loan; P2 looks the same but must not borrow it
        let index = CrsIndex::new(vec![create_test_crs("P1", "IDA1", (2012, 3, 15), 0.75, 5.0e7)]);
        let records = vec![
            create_test_project("P1", "IDA1", (2012, 3, 15), None),
            create_test_project("P2", "IDA2", (2012, 3, 15), None),
        ];

        let result = ProjectMerger::default().merge(records, &index);

        assert_eq!(result.projects[0].provenance, Provenance::FilledFromCrs);
        assert_eq!(result.projects[0].match_kind, Some(MatchKind::Identifier));
        assert_eq!(result.projects[1].provenance, Provenance::StillMissing);
        assert_eq!(result.projects[1].interest_rate, None);
        assert_eq!(result.summary.filled_from_crs, 1);
        assert_eq!(result.summary.missing_pct, 50.0);
    }

    #[test]
    fn test_crs_loan_claimed_twice_is_ambiguous() {
        let index = CrsIndex::new(vec![create_test_crs("P999", "X", (2012, 6, 1), 1.25, 5.0e7)]);
        let records = vec![
            create_test_project("P1", "IDA1", (2012, 3, 15), None),
            create_test_project("P2", "IDA2", (2012, 4, 20), None),
        ];

        let result = ProjectMerger::default().merge(records, &index);

        assert!(result.projects.iter().all(|p| p.provenance == Provenance::StillMissing));
        assert_eq!(result.summary.filled_from_crs, 0);
        assert_eq!(result.summary.ambiguous, 2);
        assert_eq!(result.summary.missing_pct, 100.0);
    }

    #[test]
    fn test_summary_counts_and_coverage() {
        let index = CrsIndex::new(vec![create_test_crs("P1", "IDA1", (2015, 1, 1), 1.0, 1.0)]);
        let records = vec![
            create_test_project("P1", "IDA1", (2015, 1, 1), None),
            create_test_project("P2", "IDA2", (2020, 1, 1), None),
            create_test_project("P3", "IDA3", (2020, 1, 1), Some(1.0)),
        ];

        let summary = ProjectMerger::default().merge(records, &index).summary;

        assert_eq!(summary.total_projects, 3);
        assert_eq!(summary.with_primary_rate, 1);
        assert_eq!(summary.filled_from_crs, 1);
        assert_eq!(summary.still_missing, 1);
        assert_eq!(summary.missing_after_crs_coverage, 1);
        assert_eq!(summary.crs_max_year, Some(2015));
        assert_eq!(summary.missing_pct, 33.3);
    }
}
