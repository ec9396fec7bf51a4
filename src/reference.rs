// 🌍 Country Reference - Stable identity + name harmonization
//
// Harmonized name is IDENTITY, raw spellings are aliases.
// "Côte d'Ivoire", "Cote d'Ivoire", "Ivory Coast" → one country record
//
// The registry is built once per run and only ever read afterwards.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

// ============================================================================
// COUNTRY RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    /// Canonical name used in every output table
    pub harmonized_name: String,

    /// Spelling used by the IDS database
    pub entity_name: String,

    /// ISO 3166-1 alpha-3
    pub iso3: Option<String>,

    /// OECD DAC recipient code (CRS files key recipients by it)
    pub dac_code: Option<u32>,

    pub continent: Option<String>,

    pub income_level: Option<String>,

    /// Emerging market or developing economy (IMF classification)
    pub emde: bool,

    /// Alternative spellings that map to this country
    pub aliases: Vec<String>,
}

impl Country {
    pub fn new(harmonized_name: &str, entity_name: &str) -> Self {
        Country {
            harmonized_name: harmonized_name.to_string(),
            entity_name: entity_name.to_string(),
            iso3: None,
            dac_code: None,
            continent: None,
            income_level: None,
            emde: false,
            aliases: Vec::new(),
        }
    }

    pub fn with_iso3(mut self, iso3: &str) -> Self {
        self.iso3 = Some(iso3.to_uppercase());
        self
    }

    pub fn with_dac_code(mut self, code: u32) -> Self {
        self.dac_code = Some(code);
        self
    }

    pub fn with_continent(mut self, continent: &str) -> Self {
        self.continent = Some(continent.to_string());
        self
    }

    pub fn with_income_level(mut self, income_level: &str) -> Self {
        self.income_level = Some(income_level.to_string());
        self
    }

    pub fn with_emde(mut self, emde: bool) -> Self {
        self.emde = emde;
        self
    }

    pub fn add_alias(&mut self, alias: &str) {
        let alias = alias.to_string();
        if !self.aliases.contains(&alias) && alias != self.harmonized_name {
            self.aliases.push(alias);
        }
    }

    /// Canonical + IDS spelling + aliases
    pub fn all_names(&self) -> Vec<&str> {
        let mut names = vec![self.harmonized_name.as_str(), self.entity_name.as_str()];
        names.extend(self.aliases.iter().map(String::as_str));
        if let Some(iso3) = &self.iso3 {
            names.push(iso3.as_str());
        }
        names
    }

    pub fn is_african(&self) -> bool {
        self.continent.as_deref() == Some("Africa")
    }
}

/// Clean a raw name before lookup.
///
/// The IDS API pads some names with non-breaking spaces; those and runs of
/// whitespace collapse to a single space.
pub fn clean_name(raw: &str) -> String {
    raw.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn lookup_key(raw: &str) -> String {
    clean_name(raw).to_lowercase()
}

// ============================================================================
// CSV ROW (reference/countries.csv)
// ============================================================================

#[derive(Debug, Deserialize)]
struct CountryRow {
    entity_name: String,
    harmonized_name: String,
    #[serde(default)]
    iso3: Option<String>,
    #[serde(default)]
    dac_code: Option<u32>,
    #[serde(default)]
    continent: Option<String>,
    #[serde(default)]
    income_level: Option<String>,
    #[serde(default)]
    emde: Option<bool>,
    #[serde(default)]
    aliases: Option<String>,
}

impl From<CountryRow> for Country {
    fn from(row: CountryRow) -> Self {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let mut country = Country::new(row.harmonized_name.trim(), row.entity_name.trim());
        country.iso3 = non_empty(row.iso3).map(|s| s.to_uppercase());
        country.dac_code = row.dac_code;
        country.continent = non_empty(row.continent);
        country.income_level = non_empty(row.income_level);
        country.emde = row.emde.unwrap_or(false);
        if let Some(aliases) = non_empty(row.aliases) {
            for alias in aliases.split(';').map(str::trim).filter(|a| !a.is_empty()) {
                country.add_alias(alias);
            }
        }
        country
    }
}

// ============================================================================
// COUNTRY REGISTRY
// ============================================================================

/// Immutable lookup table: raw name / ISO3 / DAC code → country
#[derive(Debug, Clone, Default)]
pub struct CountryRegistry {
    countries: Vec<Country>,
    by_name: HashMap<String, usize>,
    by_dac: HashMap<u32, usize>,
}

impl CountryRegistry {
    /// Build from records; a name claimed by two different countries is a config error
    pub fn from_countries(countries: Vec<Country>) -> Result<Self> {
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut by_dac: HashMap<u32, usize> = HashMap::new();

        for (idx, country) in countries.iter().enumerate() {
            for name in country.all_names() {
                let key = lookup_key(name);
                if key.is_empty() {
                    continue;
                }
                if let Some(&other) = by_name.get(&key) {
                    if other != idx {
                        return Err(PipelineError::config(format!(
                            "name {:?} maps to both {:?} and {:?}",
                            name, countries[other].harmonized_name, country.harmonized_name
                        )));
                    }
                }
                by_name.insert(key, idx);
            }
            if let Some(code) = country.dac_code {
                by_dac.insert(code, idx);
            }
        }

        Ok(CountryRegistry {
            countries,
            by_name,
            by_dac,
        })
    }

    /// Load reference/countries.csv
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut countries = Vec::new();
        for row in rdr.deserialize::<CountryRow>() {
            countries.push(Country::from(row?));
        }
        Self::from_countries(countries)
    }

    /// Find a country by any of its names, case-insensitive
    pub fn find(&self, raw_name: &str) -> Option<&Country> {
        self.by_name
            .get(&lookup_key(raw_name))
            .map(|&idx| &self.countries[idx])
    }

    /// Like `find`, but an unknown name is an error
    pub fn resolve(&self, raw_name: &str) -> Result<&Country> {
        self.find(raw_name)
            .ok_or_else(|| PipelineError::unmapped(clean_name(raw_name)))
    }

    /// Normalize a raw name to its harmonized name
    ///
    /// Example: "Cote d'Ivoire" → "Côte d'Ivoire"
    pub fn harmonize(&self, raw_name: &str) -> Result<String> {
        self.resolve(raw_name).map(|c| c.harmonized_name.clone())
    }

    /// Counterpart areas are not always countries ("World", "Bondholders");
    /// known names are harmonized, anything else is kept as cleaned.
    pub fn harmonize_counterpart(&self, raw_name: &str) -> String {
        match self.find(raw_name) {
            Some(country) => country.harmonized_name.clone(),
            None => clean_name(raw_name),
        }
    }

    pub fn by_dac_code(&self, code: u32) -> Option<&Country> {
        self.by_dac.get(&code).map(|&idx| &self.countries[idx])
    }

    pub fn all(&self) -> &[Country] {
        &self.countries
    }

    pub fn count(&self) -> usize {
        self.countries.len()
    }

    pub fn african(&self) -> Vec<&Country> {
        self.countries.iter().filter(|c| c.is_african()).collect()
    }

    pub fn emde_non_african(&self) -> Vec<&Country> {
        self.countries
            .iter()
            .filter(|c| c.emde && !c.is_african())
            .collect()
    }
}

// ============================================================================
// KNOWN MISSING COUNTRIES
// ============================================================================

/// Countries documented as having no interest-rate data (reporting only)
#[derive(Debug, Clone, Default)]
pub struct KnownMissing {
    names: Vec<String>,
}

impl KnownMissing {
    /// Names are harmonized against the registry so spellings need not match
    pub fn new(names: &[String], registry: &CountryRegistry) -> Result<Self> {
        let mut harmonized = names
            .iter()
            .map(|n| registry.harmonize(n))
            .collect::<Result<Vec<_>>>()?;
        harmonized.sort();
        harmonized.dedup();
        Ok(KnownMissing { names: harmonized })
    }

    pub fn contains(&self, harmonized_name: &str) -> bool {
        self.names.binary_search_by(|n| n.as_str().cmp(harmonized_name)).is_ok()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Compare countries that produced no rows against the documented list
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageReport {
    /// No data and documented as missing
    pub expected_missing: Vec<String>,
    /// No data but NOT documented
    pub unexpected_missing: Vec<String>,
    /// Documented as missing but data showed up
    pub unexpectedly_present: Vec<String>,
}

impl CoverageReport {
    pub fn build(requested: &[String], with_data: &[String], known: &KnownMissing) -> Self {
        let mut report = CoverageReport::default();
        for name in requested {
            let has_data = with_data.contains(name);
            match (has_data, known.contains(name)) {
                (false, true) => report.expected_missing.push(name.clone()),
                (false, false) => report.unexpected_missing.push(name.clone()),
                (true, true) => report.unexpectedly_present.push(name.clone()),
                (true, false) => {}
            }
        }
        report.expected_missing.sort();
        report.unexpected_missing.sort();
        report.unexpectedly_present.sort();
        report
    }

    pub fn is_clean(&self) -> bool {
        self.unexpected_missing.is_empty() && self.unexpectedly_present.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_registry() -> CountryRegistry {
        let mut civ = Country::new("Côte d'Ivoire", "Cote d'Ivoire")
            .with_iso3("civ")
            .with_dac_code(247)
            .with_continent("Africa")
            .with_income_level("Lower middle income")
            .with_emde(true);
        civ.add_alias("Ivory Coast");

        let ghana = Country::new("Ghana", "Ghana")
            .with_iso3("GHA")
            .with_dac_code(241)
            .with_continent("Africa")
            .with_income_level("Lower middle income")
            .with_emde(true);

        let peru = Country::new("Peru", "Peru")
            .with_iso3("PER")
            .with_continent("America")
            .with_emde(true);

        let kosovo = Country::new("Kosovo", "Kosovo");

        CountryRegistry::from_countries(vec![civ, ghana, peru, kosovo]).unwrap()
    }

    #[test]
    fn test_harmonize_aliases_and_case() {
        let registry = create_test_registry();

        assert_eq!(registry.harmonize("Cote d'Ivoire").unwrap(), "Côte d'Ivoire");
        assert_eq!(registry.harmonize("IVORY COAST").unwrap(), "Côte d'Ivoire");
        assert_eq!(registry.harmonize("civ").unwrap(), "Côte d'Ivoire");
        assert_eq!(registry.harmonize("Ghana").unwrap(), "Ghana");
    }

    #[test]
    fn test_harmonize_strips_non_breaking_space() {
        let registry = create_test_registry();
        assert_eq!(registry.harmonize("Ghana\u{a0}").unwrap(), "Ghana");
        assert_eq!(registry.harmonize("  Ivory\u{a0} Coast ").unwrap(), "Côte d'Ivoire");
    }

    #[test]
    fn test_unmapped_name_fails() {
        let registry = create_test_registry();
        let err = registry.harmonize("Atlantis").unwrap_err();
        assert!(matches!(err, PipelineError::UnmappedEntity { ref name } if name == "Atlantis"));
    }

    #[test]
    fn test_missing_metadata_stays_none() {
        let registry = create_test_registry();
        let kosovo = registry.resolve("Kosovo").unwrap();
        assert_eq!(kosovo.continent, None);
        assert_eq!(kosovo.income_level, None);
    }

    #[test]
    fn test_counterpart_passthrough() {
        let registry = create_test_registry();
        assert_eq!(registry.harmonize_counterpart("World\u{a0}"), "World");
        assert_eq!(registry.harmonize_counterpart("Ivory Coast"), "Côte d'Ivoire");
    }

    #[test]
    fn test_groups() {
        let registry = create_test_registry();
        assert_eq!(registry.african().len(), 2);

        let others: Vec<&str> = registry
            .emde_non_african()
            .iter()
            .map(|c| c.harmonized_name.as_str())
            .collect();
        assert_eq!(others, vec!["Peru"]);
        assert_eq!(registry.by_dac_code(241).unwrap().harmonized_name, "Ghana");
    }

    #[test]
    fn test_conflicting_alias_rejected() {
        let mut a = Country::new("Niger", "Niger");
        a.add_alias("NG");
        let mut b = Country::new("Nigeria", "Nigeria");
        b.add_alias("NG");

        let err = CountryRegistry::from_countries(vec![a, b]).unwrap_err();
        assert!(err.to_string().contains("maps to both"));
    }

    #[test]
    fn test_from_csv_reader() {
        let csv = "\
entity_name,harmonized_name,iso3,dac_code,continent,income_level,emde,aliases
Cote d'Ivoire,Côte d'Ivoire,CIV,247,Africa,Lower middle income,true,Ivory Coast;CI
Kosovo,Kosovo,,,,,,
";
        let registry = CountryRegistry::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(registry.count(), 2);
        assert_eq!(registry.harmonize("CI").unwrap(), "Côte d'Ivoire");
        let kosovo = registry.resolve("kosovo").unwrap();
        assert_eq!(kosovo.iso3, None);
        assert!(!kosovo.emde);
    }

    #[test]
    fn test_shipped_table_resolves_statement_spellings() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("reference/countries.csv");
        let registry = CountryRegistry::from_csv(&path).unwrap();

        let iso3 = |name: &str| registry.find(name).and_then(|c| c.iso3.clone());
        assert_eq!(iso3("Congo, Democratic Republic of").as_deref(), Some("COD"));
        assert_eq!(iso3("Congo, Republic of").as_deref(), Some("COG"));
        assert_eq!(iso3("Egypt, Arab Republic of").as_deref(), Some("EGY"));
        assert_eq!(iso3("Yemen, Republic of").as_deref(), Some("YEM"));
        assert_eq!(iso3("Lao People's Democratic Republic").as_deref(), Some("LAO"));
        assert_eq!(iso3("Uzbekistan").as_deref(), Some("UZB"));
        assert_eq!(iso3("Kenya").as_deref(), Some("KEN"));

        // regional projects stay unmapped
        assert!(registry.find("Western and Central Africa").is_none());

        assert!(registry.emde_non_african().len() > 90);
        assert_eq!(registry.by_dac_code(454).unwrap().harmonized_name, "Peru");
    }

    #[test]
    fn test_coverage_report() {
        let registry = create_test_registry();
        let known = KnownMissing::new(&["Cote d'Ivoire".to_string(), "Peru".to_string()], &registry).unwrap();

        let requested = vec!["Côte d'Ivoire".to_string(), "Ghana".to_string(), "Peru".to_string()];
        let with_data = vec!["Peru".to_string()];

        let report = CoverageReport::build(&requested, &with_data, &known);
        assert_eq!(report.expected_missing, vec!["Côte d'Ivoire"]);
        assert_eq!(report.unexpected_missing, vec!["Ghana"]);
        assert_eq!(report.unexpectedly_present, vec!["Peru"]);
        assert!(!report.is_clean());
    }
}
