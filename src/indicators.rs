// 🏷️ Indicator Taxonomy - Rules as Data
// Maps IDS series codes to creditor class (official / private) and unit.
//
// Multilateral lending is always official. Bilateral lending is official.
// Bonds, commercial banks and other private lenders are private.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// CLASSIFICATION TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditorClass {
    Official,
    Private,
}

impl CreditorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditorClass::Official => "official",
            CreditorClass::Private => "private",
        }
    }
}

impl fmt::Display for CreditorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LenderGroup {
    Bilateral,
    Multilateral,
    /// Bonds, commercial banks, other private creditors
    PrivateLenders,
    /// Aggregate across official creditors
    AllOfficial,
    /// Public and publicly guaranteed, all creditors
    AllCreditors,
}

impl LenderGroup {
    /// Creditor class implied by the lender group
    pub fn class(&self) -> Option<CreditorClass> {
        match self {
            LenderGroup::Bilateral | LenderGroup::Multilateral | LenderGroup::AllOfficial => {
                Some(CreditorClass::Official)
            }
            LenderGroup::PrivateLenders => Some(CreditorClass::Private),
            LenderGroup::AllCreditors => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    InterestRate,
    InterestPayments,
    Commitments,
    GracePeriod,
    Maturity,
}

/// Unit a source reports rates in; everything downstream is percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateUnit {
    Percent,
    /// 0.05 == 5%
    Fraction,
    /// 5000 == 5% (CRS interest1 / interest2 columns)
    MilliPercent,
}

impl RateUnit {
    pub fn to_percent(&self, value: f64) -> f64 {
        match self {
            RateUnit::Percent => value,
            RateUnit::Fraction => value * 100.0,
            RateUnit::MilliPercent => value / 1000.0,
        }
    }
}

// ============================================================================
// INDICATOR DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorDef {
    pub code: String,
    pub kind: IndicatorKind,
    pub lender: LenderGroup,
    pub description: String,
}

impl IndicatorDef {
    fn new(code: &str, kind: IndicatorKind, lender: LenderGroup, description: &str) -> Self {
        IndicatorDef {
            code: code.to_string(),
            kind,
            lender,
            description: description.to_string(),
        }
    }

    pub fn class(&self) -> Option<CreditorClass> {
        self.lender.class()
    }
}

// ============================================================================
// TAXONOMY
// ============================================================================

pub const INTEREST_RATE_OFFICIAL: &str = "DT.INR.OFFT";
pub const INTEREST_RATE_PRIVATE: &str = "DT.INR.PRVT";
pub const GRACE_PERIOD: &str = "DT.GPA.DPPG";
pub const MATURITY: &str = "DT.MAT.DPPG";

#[derive(Debug, Clone)]
pub struct IndicatorTaxonomy {
    defs: Vec<IndicatorDef>,
}

impl IndicatorTaxonomy {
    /// IDS series used by the country-level tables
    pub fn standard() -> Self {
        use IndicatorKind::*;
        use LenderGroup::*;

        IndicatorTaxonomy {
            defs: vec![
                // Average interest on new commitments
                IndicatorDef::new(INTEREST_RATE_OFFICIAL, InterestRate, AllOfficial, "Average interest on new external debt commitments, official (%)"),
                IndicatorDef::new(INTEREST_RATE_PRIVATE, InterestRate, PrivateLenders, "Average interest on new external debt commitments, private (%)"),
                // Interest payments
                IndicatorDef::new("DT.INT.BLAT.CD", InterestPayments, Bilateral, "PPG, bilateral (INT, current US$)"),
                IndicatorDef::new("DT.INT.MLAT.CD", InterestPayments, Multilateral, "PPG, multilateral (INT, current US$)"),
                IndicatorDef::new("DT.INT.PBND.CD", InterestPayments, PrivateLenders, "PPG, bonds (INT, current US$)"),
                IndicatorDef::new("DT.INT.PCBK.CD", InterestPayments, PrivateLenders, "PPG, commercial banks (INT, current US$)"),
                IndicatorDef::new("DT.INT.PROP.CD", InterestPayments, PrivateLenders, "PPG, other private creditors (INT, current US$)"),
                // Commitments
                IndicatorDef::new("DT.COM.BLAT.CD", Commitments, Bilateral, "Commitments, bilateral (COM, current US$)"),
                IndicatorDef::new("DT.COM.MLAT.CD", Commitments, Multilateral, "Commitments, multilateral (COM, current US$)"),
                IndicatorDef::new("DT.COM.PRVT.CD", Commitments, PrivateLenders, "Commitments, private creditors (COM, current US$)"),
                // Terms
                IndicatorDef::new(GRACE_PERIOD, GracePeriod, AllCreditors, "Average grace period on new external debt commitments (years)"),
                IndicatorDef::new(MATURITY, Maturity, AllCreditors, "Average maturity on new external debt commitments (years)"),
            ],
        }
    }

    pub fn get(&self, code: &str) -> Result<&IndicatorDef> {
        let code = code.trim();
        self.defs
            .iter()
            .find(|d| d.code.eq_ignore_ascii_case(code))
            .ok_or_else(|| PipelineError::UnknownIndicator {
                code: code.to_string(),
            })
    }

    /// Official / private label for a code; unknown codes fail
    pub fn classify(&self, code: &str) -> Result<Option<CreditorClass>> {
        self.get(code).map(|d| d.class())
    }

    pub fn codes_of_kind(&self, kind: IndicatorKind) -> Vec<&str> {
        self.defs
            .iter()
            .filter(|d| d.kind == kind)
            .map(|d| d.code.as_str())
            .collect()
    }
}

impl Default for IndicatorTaxonomy {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interest_rate_codes() {
        let taxonomy = IndicatorTaxonomy::standard();

        assert_eq!(taxonomy.classify("DT.INR.OFFT").unwrap(), Some(CreditorClass::Official));
        assert_eq!(taxonomy.classify("DT.INR.PRVT").unwrap(), Some(CreditorClass::Private));
        assert_eq!(
            taxonomy.codes_of_kind(IndicatorKind::InterestRate),
            vec!["DT.INR.OFFT", "DT.INR.PRVT"]
        );
    }

    #[test]
    fn test_multilateral_is_always_official() {
        let taxonomy = IndicatorTaxonomy::standard();
        for code in ["DT.INT.MLAT.CD", "DT.COM.MLAT.CD"] {
            assert_eq!(taxonomy.classify(code).unwrap(), Some(CreditorClass::Official));
        }
    }

    #[test]
    fn test_private_lenders() {
        let taxonomy = IndicatorTaxonomy::standard();
        for code in ["DT.INT.PBND.CD", "DT.INT.PCBK.CD", "DT.INT.PROP.CD", "DT.COM.PRVT.CD"] {
            assert_eq!(taxonomy.classify(code).unwrap(), Some(CreditorClass::Private));
        }
        assert_eq!(taxonomy.classify(GRACE_PERIOD).unwrap(), None);
    }

    #[test]
    fn test_unknown_code_fails() {
        let taxonomy = IndicatorTaxonomy::standard();
        assert!(matches!(
            taxonomy.classify("NY.GDP.MKTP.CD"),
            Err(PipelineError::UnknownIndicator { .. })
        ));
    }

    #[test]
    fn test_rate_units() {
        assert_eq!(RateUnit::Percent.to_percent(3.5), 3.5);
        assert!((RateUnit::Fraction.to_percent(0.035) - 3.5).abs() < 1e-9);
        assert_eq!(RateUnit::MilliPercent.to_percent(750.0), 0.75);
    }
}
