use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::AdvisorError;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates and fractions expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Year fractions or counts
pub type Years = Decimal;

/// Reserved allocation key for the cash sleeve.
pub const CASH_SYMBOL: &str = "CASH";

/// Allocation fractions must sum to one within this tolerance.
pub const ALLOCATION_TOLERANCE: Decimal = dec!(0.000001);

/// Discrete risk buckets, ordered from lowest to highest risk capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Conservative,
    ModerateConservative,
    Moderate,
    ModerateAggressive,
    Aggressive,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::Conservative,
        RiskLevel::ModerateConservative,
        RiskLevel::Moderate,
        RiskLevel::ModerateAggressive,
        RiskLevel::Aggressive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Conservative => "conservative",
            RiskLevel::ModerateConservative => "moderate_conservative",
            RiskLevel::Moderate => "moderate",
            RiskLevel::ModerateAggressive => "moderate_aggressive",
            RiskLevel::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Investment goals a client can select in the questionnaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentGoal {
    #[serde(alias = "retirement_planning")]
    Retirement,
    #[serde(alias = "growth", alias = "wealth_building")]
    WealthGrowth,
    #[serde(alias = "income")]
    IncomeGeneration,
    #[serde(alias = "tax")]
    TaxEfficiency,
    #[serde(alias = "capital_preservation")]
    Preservation,
}

/// A validated symbol → fraction mapping.
///
/// Every fraction lies in [0, 1] and the fractions sum to one within
/// [`ALLOCATION_TOLERANCE`]. Symbols are upper-cased; the reserved
/// [`CASH_SYMBOL`] key denotes the cash sleeve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Decimal>",
    into = "BTreeMap<String, Decimal>"
)]
pub struct Allocation(BTreeMap<String, Decimal>);

impl Allocation {
    /// Build an allocation, rejecting out-of-range fractions or a total
    /// that is not one.
    pub fn new(fractions: BTreeMap<String, Decimal>) -> Result<Self, AdvisorError> {
        if fractions.is_empty() {
            return Err(AdvisorError::invalid_parameter(
                "allocation",
                "At least one symbol is required",
            ));
        }
        let mut normalized = BTreeMap::new();
        for (symbol, fraction) in fractions {
            let key = normalize_symbol(&symbol)?;
            if fraction < Decimal::ZERO || fraction > Decimal::ONE {
                return Err(AdvisorError::invalid_parameter(
                    format!("allocation.{key}"),
                    format!("Fraction {fraction} is outside [0, 1]"),
                ));
            }
            *normalized.entry(key).or_insert(Decimal::ZERO) += fraction;
        }
        let total: Decimal = normalized.values().sum();
        if (total - Decimal::ONE).abs() > ALLOCATION_TOLERANCE {
            return Err(AdvisorError::invalid_parameter(
                "allocation",
                format!("Fractions sum to {total}, expected 1.0"),
            ));
        }
        Ok(Allocation(normalized))
    }

    /// Build an allocation from non-negative weights that need not sum to one.
    ///
    /// Weights are scaled to a unit total and rounded to 8 places; any
    /// rounding residue is assigned to the largest weight so the total is
    /// exactly one.
    pub fn from_weights<I, S>(weights: I) -> Result<Self, AdvisorError>
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: AsRef<str>,
    {
        let mut raw = BTreeMap::new();
        for (symbol, weight) in weights {
            let key = normalize_symbol(symbol.as_ref())?;
            let w = if weight < Decimal::ZERO { Decimal::ZERO } else { weight };
            *raw.entry(key).or_insert(Decimal::ZERO) += w;
        }
        let total: Decimal = raw.values().sum();
        if total.is_zero() {
            return Err(AdvisorError::invalid_parameter(
                "allocation",
                "Weights sum to zero",
            ));
        }
        let mut scaled: BTreeMap<String, Decimal> = raw
            .into_iter()
            .map(|(k, w)| (k, (w / total).round_dp(8)))
            .collect();
        let residue = Decimal::ONE - scaled.values().sum::<Decimal>();
        if !residue.is_zero() {
            if let Some(largest) = scaled
                .iter()
                .max_by(|a, b| a.1.cmp(b.1))
                .map(|(k, _)| k.clone())
            {
                if let Some(w) = scaled.get_mut(&largest) {
                    *w += residue;
                }
            }
        }
        Allocation::new(scaled)
    }

    /// Fraction for a symbol, zero when absent.
    pub fn get(&self, symbol: &str) -> Decimal {
        self.0
            .get(&symbol.trim().to_uppercase())
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.0.contains_key(&symbol.trim().to_uppercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Decimal)> {
        self.0.iter()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Symbols other than the cash sleeve with a non-zero fraction.
    pub fn invested_symbols(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, w)| k.as_str() != CASH_SYMBOL && !w.is_zero())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn cash_fraction(&self) -> Decimal {
        self.get(CASH_SYMBOL)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.0.values().sum()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Decimal> {
        &self.0
    }
}

impl TryFrom<BTreeMap<String, Decimal>> for Allocation {
    type Error = AdvisorError;

    fn try_from(value: BTreeMap<String, Decimal>) -> Result<Self, Self::Error> {
        Allocation::new(value)
    }
}

impl From<Allocation> for BTreeMap<String, Decimal> {
    fn from(value: Allocation) -> Self {
        value.0
    }
}

fn normalize_symbol(symbol: &str) -> Result<String, AdvisorError> {
    let key = symbol.trim().to_uppercase();
    if key.is_empty() {
        return Err(AdvisorError::invalid_parameter(
            "allocation",
            "Symbol must not be empty",
        ));
    }
    Ok(key)
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    wrap(methodology, assumptions, warnings, elapsed_us, result, "rust_decimal_128bit")
}

/// Same envelope for computations whose inner loop runs in f64 (random draws).
pub fn with_metadata_f64<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    wrap(methodology, assumptions, warnings, elapsed_us, result, "ieee754_f64")
}

fn wrap<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
    precision: &str,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: precision.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn map(pairs: &[(&str, Decimal)]) -> BTreeMap<String, Decimal> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_allocation_accepts_unit_total() {
        let a = Allocation::new(map(&[("vti", dec!(0.6)), ("BND", dec!(0.4))])).unwrap();
        assert_eq!(a.get("VTI"), dec!(0.6));
        assert_eq!(a.get("vti"), dec!(0.6));
        assert_eq!(a.get("GSG"), Decimal::ZERO);
    }

    #[test]
    fn test_allocation_rejects_bad_total() {
        let err = Allocation::new(map(&[("VTI", dec!(0.6)), ("BND", dec!(0.3))])).unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidParameter { .. }));
    }

    #[test]
    fn test_allocation_rejects_negative_fraction() {
        assert!(Allocation::new(map(&[("VTI", dec!(1.2)), ("BND", dec!(-0.2))])).is_err());
    }

    #[test]
    fn test_allocation_within_tolerance() {
        assert!(Allocation::new(map(&[("VTI", dec!(0.6000004)), ("BND", dec!(0.4))])).is_ok());
    }

    #[test]
    fn test_from_weights_sums_exactly_to_one() {
        let a = Allocation::from_weights(vec![
            ("A", dec!(1)),
            ("B", dec!(1)),
            ("C", dec!(1)),
        ])
        .unwrap();
        assert_eq!(a.total(), Decimal::ONE);
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Allocation = serde_json::from_str(r#"{"VTI": 0.65, "BND": 0.35}"#).unwrap();
        assert_eq!(ok.len(), 2);
        let bad: Result<Allocation, _> = serde_json::from_str(r#"{"VTI": 0.65, "BND": 0.45}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_invested_symbols_skip_cash() {
        let a = Allocation::new(map(&[("VTI", dec!(0.9)), ("CASH", dec!(0.1))])).unwrap();
        assert_eq!(a.invested_symbols(), vec!["VTI".to_string()]);
        assert_eq!(a.cash_fraction(), dec!(0.1));
    }

    #[test]
    fn test_goal_aliases() {
        let goals: Vec<InvestmentGoal> = serde_json::from_str(r#"["growth", "income"]"#).unwrap();
        assert_eq!(
            goals,
            vec![InvestmentGoal::WealthGrowth, InvestmentGoal::IncomeGeneration]
        );
    }

    #[test]
    fn test_risk_level_serde() {
        let s = serde_json::to_string(&RiskLevel::ModerateAggressive).unwrap();
        assert_eq!(s, "\"moderate_aggressive\"");
    }
}
