// 🧹 Cleaner / Harmonizer - raw IDS rows → tidy observations
//
// Pipeline per row:
// 1. Harmonize the entity name (unmapped → error, never dropped)
// 2. Classify the indicator code (unknown → error)
// 3. Left-join continent / income level (missing metadata stays None)
// 4. Normalize rate units to percent
//
// One observation per (country, counterpart, year, indicator) after
// `resolve_duplicates`.

use crate::error::Result;
use crate::extract::RawIdsRow;
use crate::indicators::{CreditorClass, IndicatorKind, IndicatorTaxonomy, RateUnit};
use crate::reference::CountryRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// DATA SOURCE
// ============================================================================

/// Where an observation came from; the API is fresher than a bulk download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    IdsApi,
    IdsBulk,
}

impl DataSource {
    /// Higher wins when two sources report the same key
    pub fn priority(&self) -> u8 {
        match self {
            DataSource::IdsApi => 2,
            DataSource::IdsBulk => 1,
        }
    }
}

// ============================================================================
// OBSERVATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Harmonized country name
    pub country: String,
    /// Upstream entity code (usually ISO3)
    pub entity_code: String,
    pub iso3: Option<String>,
    /// Harmonized counterpart area ("World", "China", ...)
    pub counterpart: String,
    pub year: i32,
    pub indicator_code: String,
    pub class: Option<CreditorClass>,
    pub kind: IndicatorKind,
    /// Percent for rates, USD for amounts, years for terms
    pub value: f64,
    pub source: DataSource,
    pub continent: Option<String>,
    pub income_level: Option<String>,
}

impl Observation {
    /// "World (official)" / "World (private)"
    pub fn counterpart_label(&self) -> String {
        match self.class {
            Some(CreditorClass::Private) => format!("{} (private)", self.counterpart),
            _ => format!("{} (official)", self.counterpart),
        }
    }

    fn natural_key(&self) -> (String, String, i32, String) {
        (
            self.country.clone(),
            self.counterpart.clone(),
            self.year,
            self.indicator_code.clone(),
        )
    }
}

// ============================================================================
// CLEANER
// ============================================================================

pub struct Cleaner<'a> {
    registry: &'a CountryRegistry,
    taxonomy: &'a IndicatorTaxonomy,
    unit: RateUnit,
}

impl<'a> Cleaner<'a> {
    pub fn new(registry: &'a CountryRegistry, taxonomy: &'a IndicatorTaxonomy) -> Self {
        Cleaner {
            registry,
            taxonomy,
            unit: RateUnit::Percent,
        }
    }

    /// Unit the upstream reports rates in
    pub fn with_rate_unit(mut self, unit: RateUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Clean a batch of raw rows
    ///
    /// Every row is validated (entity and indicator) before null values are
    /// dropped, so a bad name fails the run even when its value is empty.
    pub fn clean(&self, rows: &[RawIdsRow], source: DataSource) -> Result<Vec<Observation>> {
        let mut observations = Vec::with_capacity(rows.len());
        let mut nulls = 0usize;

        for row in rows {
            let country = self.registry.resolve(&row.entity_name)?;
            let def = self.taxonomy.get(&row.indicator_code)?;

            let Some(raw_value) = row.value else {
                nulls += 1;
                continue;
            };
            let value = match def.kind {
                IndicatorKind::InterestRate => self.unit.to_percent(raw_value),
                _ => raw_value,
            };

            observations.push(Observation {
                country: country.harmonized_name.clone(),
                entity_code: row.entity_code.trim().to_string(),
                iso3: country.iso3.clone(),
                counterpart: self.registry.harmonize_counterpart(&row.counterpart_name),
                year: row.year,
                indicator_code: def.code.clone(),
                class: def.class(),
                kind: def.kind,
                value,
                source,
                continent: country.continent.clone(),
                income_level: country.income_level.clone(),
            });
        }

        debug!(rows = rows.len(), kept = observations.len(), nulls, "rows cleaned");
        Ok(observations)
    }
}

// ============================================================================
// POST-PROCESSING
// ============================================================================

/// One observation per (country, counterpart, year, indicator)
///
/// The highest-priority source wins; on equal priority the first
/// occurrence is kept. Output is sorted by the natural key.
pub fn resolve_duplicates(observations: Vec<Observation>) -> Vec<Observation> {
    let mut best: BTreeMap<(String, String, i32, String), Observation> = BTreeMap::new();

    for obs in observations {
        let key = obs.natural_key();
        match best.get(&key) {
            Some(existing) if existing.source.priority() >= obs.source.priority() => {}
            _ => {
                best.insert(key, obs);
            }
        }
    }

    best.into_values().collect()
}

/// Published country tables omit zero values
pub fn drop_zero_values(observations: Vec<Observation>) -> Vec<Observation> {
    observations.into_iter().filter(|o| o.value != 0.0).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::indicators::{INTEREST_RATE_OFFICIAL, INTEREST_RATE_PRIVATE};
    use crate::reference::Country;

    fn create_test_registry() -> CountryRegistry {
        let mut ivory = Country::new("Côte d'Ivoire", "Cote d'Ivoire")
            .with_iso3("CIV")
            .with_continent("Africa")
            .with_income_level("Lower middle income");
        ivory.add_alias("Ivory Coast");

        CountryRegistry::from_countries(vec![
            Country::new("Kenya", "Kenya")
                .with_iso3("KEN")
                .with_continent("Africa")
                .with_income_level("Lower middle income"),
            ivory,
            Country::new("China", "China").with_iso3("CHN").with_continent("Asia"),
        ])
        .unwrap()
    }

    fn create_test_row(entity: &str, code: &str, year: i32, value: Option<f64>) -> RawIdsRow {
        RawIdsRow {
            entity_code: String::new(),
            entity_name: entity.to_string(),
            counterpart_code: "WLD".to_string(),
            counterpart_name: "World\u{a0}".to_string(),
            indicator_code: code.to_string(),
            year,
            value,
        }
    }

    #[test]
    fn test_two_countries_two_years() {
        let registry = create_test_registry();
        let taxonomy = IndicatorTaxonomy::standard();
        let cleaner = Cleaner::new(&registry, &taxonomy);

        let rows = vec![
            create_test_row("Kenya", INTEREST_RATE_OFFICIAL, 2021, Some(1.5)),
            create_test_row("Kenya", INTEREST_RATE_OFFICIAL, 2022, Some(1.7)),
            create_test_row("Cote d'Ivoire", INTEREST_RATE_PRIVATE, 2021, Some(5.5)),
            create_test_row("ivory  coast", INTEREST_RATE_PRIVATE, 2022, Some(6.0)),
        ];

        let observations = resolve_duplicates(cleaner.clean(&rows, DataSource::IdsApi).unwrap());

        assert_eq!(observations.len(), 4);
        for obs in &observations {
            assert_eq!(obs.continent.as_deref(), Some("Africa"));
            assert_eq!(obs.income_level.as_deref(), Some("Lower middle income"));
            assert_eq!(obs.counterpart, "World");
        }
        let kenya: Vec<_> = observations.iter().filter(|o| o.country == "Kenya").collect();
        assert!(kenya.iter().all(|o| o.class == Some(CreditorClass::Official)));
        assert_eq!(kenya[0].counterpart_label(), "World (official)");

        let ivory: Vec<_> = observations.iter().filter(|o| o.country == "Côte d'Ivoire").collect();
        assert_eq!(ivory.len(), 2);
        assert_eq!(ivory[0].counterpart_label(), "World (private)");
    }

    #[test]
    fn test_unmapped_entity_fails() {
        let registry = create_test_registry();
        let taxonomy = IndicatorTaxonomy::standard();
        let cleaner = Cleaner::new(&registry, &taxonomy);

        let result = cleaner.clean(
            &[create_test_row("Atlantis", INTEREST_RATE_OFFICIAL, 2021, None)],
            DataSource::IdsApi,
        );
        assert!(matches!(result, Err(PipelineError::UnmappedEntity { name }) if name == "Atlantis"));
    }

    #[test]
    fn test_unknown_indicator_fails() {
        let registry = create_test_registry();
        let taxonomy = IndicatorTaxonomy::standard();
        let cleaner = Cleaner::new(&registry, &taxonomy);

        let result = cleaner.clean(
            &[create_test_row("Kenya", "NY.GDP.MKTP.CD", 2021, Some(1.0))],
            DataSource::IdsApi,
        );
        assert!(matches!(result, Err(PipelineError::UnknownIndicator { .. })));
    }

    #[test]
    fn test_missing_metadata_kept_as_none() {
        let registry = create_test_registry();
        let taxonomy = IndicatorTaxonomy::standard();
        let cleaner = Cleaner::new(&registry, &taxonomy);

        let observations = cleaner
            .clean(&[create_test_row("China", INTEREST_RATE_OFFICIAL, 2021, Some(2.0))], DataSource::IdsApi)
            .unwrap();

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].income_level, None);
        assert_eq!(observations[0].continent.as_deref(), Some("Asia"));
    }

    #[test]
    fn test_rate_unit_normalization() {
        let registry = create_test_registry();
        let taxonomy = IndicatorTaxonomy::standard();
        let cleaner = Cleaner::new(&registry, &taxonomy).with_rate_unit(RateUnit::Fraction);

        let observations = cleaner
            .clean(
                &[
                    create_test_row("KEN", INTEREST_RATE_OFFICIAL, 2021, Some(0.02)),
                    create_test_row("Kenya", "DT.COM.MLAT.CD", 2021, Some(5.0e8)),
                ],
                DataSource::IdsApi,
            )
            .unwrap();

        // ISO3 is accepted as a name; only rates are rescaled
        assert_eq!(observations[0].country, "Kenya");
        assert!((observations[0].value - 2.0).abs() < 1e-9);
        assert_eq!(observations[1].value, 5.0e8);
    }

    #[test]
    fn test_duplicate_resolution_prefers_api() {
        let registry = create_test_registry();
        let taxonomy = IndicatorTaxonomy::standard();
        let cleaner = Cleaner::new(&registry, &taxonomy);
        let row = create_test_row("Kenya", INTEREST_RATE_OFFICIAL, 2021, Some(1.0));

        let mut all = cleaner.clean(&[row.clone()], DataSource::IdsBulk).unwrap();
        let mut api = cleaner.clean(&[row.clone()], DataSource::IdsApi).unwrap();
        api[0].value = 2.0;
        let mut second_bulk = cleaner.clean(&[row], DataSource::IdsBulk).unwrap();
        second_bulk[0].value = 3.0;
        all.extend(api);
        all.extend(second_bulk);

        let resolved = resolve_duplicates(all);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].value, 2.0);
        assert_eq!(resolved[0].source, DataSource::IdsApi);
    }

    #[test]
    fn test_drop_zero_values() {
        let registry = create_test_registry();
        let taxonomy = IndicatorTaxonomy::standard();
        let observations = Cleaner::new(&registry, &taxonomy)
            .clean(
                &[
                    create_test_row("Kenya", INTEREST_RATE_OFFICIAL, 2021, Some(0.0)),
                    create_test_row("Kenya", INTEREST_RATE_OFFICIAL, 2022, Some(1.0)),
                ],
                DataSource::IdsApi,
            )
            .unwrap();

        assert_eq!(drop_zero_values(observations).len(), 1);
    }
}
