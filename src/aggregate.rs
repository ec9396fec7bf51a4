// 📊 Aggregator - commitment-weighted averages and the loan terms table
//
// Not wired into the published outputs; used for analysis runs.
//
//   weighted = Σ(rate_i × amount_i) / Σ(amount_i)
//
// A group whose amounts sum to zero has no average.

use crate::cleaner::Observation;
use crate::indicators::{CreditorClass, IndicatorKind};
use serde::Serialize;
use std::collections::BTreeMap;

// ============================================================================
// WEIGHTED AVERAGE
// ============================================================================

/// Weighted average of (rate, amount) pairs; None when total weight is zero
pub fn weighted_average(pairs: &[(f64, f64)]) -> Option<f64> {
    let total: f64 = pairs.iter().map(|(_, amount)| amount).sum();
    if total == 0.0 || !total.is_finite() {
        return None;
    }
    let weighted: f64 = pairs.iter().map(|(rate, amount)| rate * amount).sum();
    Some(weighted / total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Continent,
    IncomeLevel,
    Counterpart,
}

impl GroupBy {
    fn key(&self, row: &TermsRow) -> Option<String> {
        match self {
            GroupBy::Continent => row.continent.clone(),
            GroupBy::IncomeLevel => row.income_level.clone(),
            GroupBy::Counterpart => Some(row.counterpart.clone()),
        }
    }
}

/// Commitment-weighted rate per (group, year, class)
///
/// Rows without a rate, or without a value for the grouping column, are
/// left out.
pub fn weighted_average_by(rows: &[TermsRow], group_by: GroupBy) -> BTreeMap<(String, i32, CreditorClass), Option<f64>> {
    let mut pairs: BTreeMap<(String, i32, CreditorClass), Vec<(f64, f64)>> = BTreeMap::new();

    for row in rows {
        let (Some(group), Some(rate)) = (group_by.key(row), row.rate) else {
            continue;
        };
        pairs
            .entry((group, row.year, row.class))
            .or_default()
            .push((rate, row.commitments));
    }

    pairs
        .into_iter()
        .map(|(key, values)| (key, weighted_average(&values)))
        .collect()
}

// ============================================================================
// TERMS TABLE
// ============================================================================

/// Rates joined with commitments, payments and loan terms
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermsRow {
    pub year: i32,
    pub country: String,
    pub counterpart: String,
    pub class: CreditorClass,
    pub continent: Option<String>,
    pub income_level: Option<String>,
    /// USD, > 0
    pub commitments: f64,
    pub rate: Option<f64>,
    pub interest_payments: Option<f64>,
    pub grace_period: Option<f64>,
    pub maturity: Option<f64>,
}

#[derive(Default)]
struct TermsAccumulator {
    continent: Option<String>,
    income_level: Option<String>,
    commitments: Option<f64>,
    rate: Option<f64>,
    interest_payments: Option<f64>,
}

fn add(total: Option<f64>, value: f64) -> Option<f64> {
    Some(total.unwrap_or(0.0) + value)
}

/// Build one row per (year, country, counterpart, class) with commitments > 0
///
/// Commitments and interest payments are summed over the lender codes of a
/// class. Grace period and maturity cover all creditors and are attached to
/// both classes.
pub fn build_terms_table(observations: &[Observation]) -> Vec<TermsRow> {
    let mut acc: BTreeMap<(i32, String, String, CreditorClass), TermsAccumulator> = BTreeMap::new();
    let mut terms: BTreeMap<(i32, String, String), (Option<f64>, Option<f64>)> = BTreeMap::new();

    for obs in observations {
        let Some(class) = obs.class else {
            let entry = terms
                .entry((obs.year, obs.country.clone(), obs.counterpart.clone()))
                .or_default();
            match obs.kind {
                IndicatorKind::GracePeriod => entry.0 = Some(obs.value),
                IndicatorKind::Maturity => entry.1 = Some(obs.value),
                _ => {}
            }
            continue;
        };

        let row = acc
            .entry((obs.year, obs.country.clone(), obs.counterpart.clone(), class))
            .or_default();
        row.continent = obs.continent.clone();
        row.income_level = obs.income_level.clone();

        match obs.kind {
            IndicatorKind::Commitments => row.commitments = add(row.commitments, obs.value),
            IndicatorKind::InterestPayments => row.interest_payments = add(row.interest_payments, obs.value),
            IndicatorKind::InterestRate => row.rate = Some(obs.value),
            IndicatorKind::GracePeriod | IndicatorKind::Maturity => {}
        }
    }

    acc.into_iter()
        .filter_map(|((year, country, counterpart, class), row)| {
            let commitments = row.commitments.filter(|c| *c > 0.0)?;
            let (grace_period, maturity) = terms
                .get(&(year, country.clone(), counterpart.clone()))
                .copied()
                .unwrap_or_default();

            Some(TermsRow {
                year,
                country,
                counterpart,
                class,
                continent: row.continent,
                income_level: row.income_level,
                commitments,
                rate: row.rate,
                interest_payments: row.interest_payments,
                grace_period,
                maturity,
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
