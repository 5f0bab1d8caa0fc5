//! Engine-wide tunables.
//!
//! Every field has a default, so a partial JSON/YAML document (or none at
//! all) yields a usable configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::AdvisorError;
use crate::types::{Money, Rate, RiskLevel, CASH_SYMBOL};
use crate::AdvisorResult;

/// Expected return and volatility assumed for an asset class when no
/// price history is available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassAssumption {
    pub expected_return: Rate,
    pub volatility: Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapitalMarketAssumptions {
    pub stocks: ClassAssumption,
    pub bonds: ClassAssumption,
    pub cash: ClassAssumption,
    /// Symbols treated as bonds; everything else that is not cash is a stock.
    pub bond_symbols: Vec<String>,
    /// Correlation between two distinct symbols of the same class.
    pub intra_class_correlation: Decimal,
    pub stock_bond_correlation: Decimal,
}

/// Coarse class a symbol belongs to for capital market assumptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Stocks,
    Bonds,
    Cash,
}

impl Default for CapitalMarketAssumptions {
    fn default() -> Self {
        Self {
            stocks: ClassAssumption {
                expected_return: dec!(0.07),
                volatility: dec!(0.16),
            },
            bonds: ClassAssumption {
                expected_return: dec!(0.035),
                volatility: dec!(0.06),
            },
            cash: ClassAssumption {
                expected_return: dec!(0.02),
                volatility: dec!(0.01),
            },
            bond_symbols: vec!["BND".into(), "BNDX".into(), "AGG".into(), "TLT".into()],
            intra_class_correlation: dec!(0.85),
            stock_bond_correlation: dec!(0.10),
        }
    }
}

impl CapitalMarketAssumptions {
    pub fn class_of(&self, symbol: &str) -> AssetClass {
        let key = symbol.trim().to_uppercase();
        if key == CASH_SYMBOL {
            AssetClass::Cash
        } else if self.bond_symbols.iter().any(|b| b.eq_ignore_ascii_case(&key)) {
            AssetClass::Bonds
        } else {
            AssetClass::Stocks
        }
    }

    pub fn for_class(&self, class: AssetClass) -> ClassAssumption {
        match class {
            AssetClass::Stocks => self.stocks,
            AssetClass::Bonds => self.bonds,
            AssetClass::Cash => self.cash,
        }
    }

    /// Assumed correlation between two symbols. Cash is uncorrelated with
    /// everything but itself.
    pub fn correlation(&self, a: &str, b: &str) -> Decimal {
        if a.eq_ignore_ascii_case(b) {
            return Decimal::ONE;
        }
        match (self.class_of(a), self.class_of(b)) {
            (AssetClass::Cash, _) | (_, AssetClass::Cash) => Decimal::ZERO,
            (x, y) if x == y => self.intra_class_correlation,
            _ => self.stock_bond_correlation,
        }
    }
}

/// Annualised volatility each risk level aims for on the efficient frontier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetVolatility {
    pub conservative: Rate,
    pub moderate_conservative: Rate,
    pub moderate: Rate,
    pub moderate_aggressive: Rate,
    pub aggressive: Rate,
}

impl Default for TargetVolatility {
    fn default() -> Self {
        Self {
            conservative: dec!(0.06),
            moderate_conservative: dec!(0.09),
            moderate: dec!(0.12),
            moderate_aggressive: dec!(0.15),
            aggressive: dec!(0.18),
        }
    }
}

impl TargetVolatility {
    pub fn for_level(&self, level: RiskLevel) -> Rate {
        match level {
            RiskLevel::Conservative => self.conservative,
            RiskLevel::ModerateConservative => self.moderate_conservative,
            RiskLevel::Moderate => self.moderate,
            RiskLevel::ModerateAggressive => self.moderate_aggressive,
            RiskLevel::Aggressive => self.aggressive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Annual risk-free rate used in Sharpe ratios and for the cash sleeve.
    pub risk_free_rate: Rate,
    /// Observations per year in the market history (252 for daily closes).
    pub periods_per_year: u32,
    /// Minimum aligned return observations before estimates are trusted.
    pub min_observations: usize,
    /// Largest calendar gap tolerated between consecutive prices.
    pub max_gap_days: i64,
    /// Years of history behind frontier, simulation and backtest estimates.
    pub lookback_years: u32,
    pub frontier_points: usize,
    pub allow_short: bool,
    /// Rebalance an asset once |current - target| reaches this fraction.
    pub drift_threshold: Rate,
    pub tax_rate: Rate,
    /// Losses smaller than this (in absolute currency) are not reported.
    pub min_harvest_loss: Money,
    pub benchmark_symbol: String,
    /// Annual return of the fixed-index benchmark in forward simulations.
    pub benchmark_return: Rate,
    pub monte_carlo_paths: u32,
    pub default_initial_investment: Money,
    pub capital_market_assumptions: CapitalMarketAssumptions,
    pub target_volatility: TargetVolatility,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: dec!(0.02),
            periods_per_year: 252,
            min_observations: 20,
            max_gap_days: 7,
            lookback_years: 3,
            frontier_points: 20,
            allow_short: false,
            drift_threshold: dec!(0.05),
            tax_rate: dec!(0.20),
            min_harvest_loss: Decimal::ZERO,
            benchmark_symbol: "SPY".into(),
            benchmark_return: dec!(0.07),
            monte_carlo_paths: 500,
            default_initial_investment: dec!(100000),
            capital_market_assumptions: CapitalMarketAssumptions::default(),
            target_volatility: TargetVolatility::default(),
        }
    }
}

impl EngineConfig {
    /// Reject configurations that would make downstream arithmetic meaningless.
    pub fn validate(&self) -> AdvisorResult<()> {
        if self.periods_per_year == 0 {
            return Err(AdvisorError::validation(
                "periods_per_year",
                "Must be at least 1",
            ));
        }
        if self.min_observations < 2 {
            return Err(AdvisorError::validation(
                "min_observations",
                "Must be at least 2",
            ));
        }
        if self.max_gap_days < 1 {
            return Err(AdvisorError::validation("max_gap_days", "Must be at least 1"));
        }
        if self.lookback_years == 0 {
            return Err(AdvisorError::validation("lookback_years", "Must be at least 1"));
        }
        if self.frontier_points < 2 {
            return Err(AdvisorError::validation(
                "frontier_points",
                "Must be at least 2",
            ));
        }
        if self.drift_threshold < Decimal::ZERO || self.drift_threshold > Decimal::ONE {
            return Err(AdvisorError::validation(
                "drift_threshold",
                "Must lie in [0, 1]",
            ));
        }
        if self.tax_rate < Decimal::ZERO || self.tax_rate > Decimal::ONE {
            return Err(AdvisorError::validation("tax_rate", "Must lie in [0, 1]"));
        }
        let cma = &self.capital_market_assumptions;
        for (field, rho) in [
            ("intra_class_correlation", cma.intra_class_correlation),
            ("stock_bond_correlation", cma.stock_bond_correlation),
        ] {
            if rho < dec!(-1) || rho > Decimal::ONE {
                return Err(AdvisorError::validation(
                    format!("capital_market_assumptions.{field}"),
                    "Must lie in [-1, 1]",
                ));
            }
        }
        if self.monte_carlo_paths == 0 {
            return Err(AdvisorError::validation(
                "monte_carlo_paths",
                "Must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"tax_rate": 0.3}"#).unwrap();
        assert_eq!(cfg.tax_rate, dec!(0.3));
        assert_eq!(cfg.drift_threshold, dec!(0.05));
        assert_eq!(cfg.target_volatility.moderate, dec!(0.12));
    }

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_periods() {
        let cfg = EngineConfig {
            periods_per_year: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_asset_classes() {
        let cma = CapitalMarketAssumptions::default();
        assert_eq!(cma.class_of("bnd"), AssetClass::Bonds);
        assert_eq!(cma.class_of("VTI"), AssetClass::Stocks);
        assert_eq!(cma.class_of("cash"), AssetClass::Cash);
        assert_eq!(cma.correlation("VTI", "VXUS"), dec!(0.85));
        assert_eq!(cma.correlation("VTI", "BND"), dec!(0.10));
        assert_eq!(cma.correlation("CASH", "BND"), Decimal::ZERO);
        assert_eq!(cma.correlation("VTI", "vti"), Decimal::ONE);
    }

    #[test]
    fn test_target_volatility_increases_with_level() {
        let tv = TargetVolatility::default();
        let vols: Vec<Rate> = RiskLevel::ALL.iter().map(|l| tv.for_level(*l)).collect();
        assert!(vols.windows(2).all(|w| w[0] < w[1]));
    }
}
