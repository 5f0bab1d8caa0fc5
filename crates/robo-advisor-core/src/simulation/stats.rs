use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

use crate::math::{max_drawdown, mean, sample_std_dev, sharpe_ratio, sqrt_decimal};
use crate::types::Rate;

/// Time-weighted performance of a return series. Contributions do not
/// affect any of these figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_return: Rate,
    pub annualized_return: Rate,
    pub annualized_volatility: Rate,
    pub sharpe_ratio: Decimal,
    /// Positive fraction.
    pub max_drawdown: Rate,
}

pub fn performance_stats(
    returns: &[Decimal],
    periods_per_year: u32,
    risk_free_rate: Rate,
) -> PerformanceStats {
    if returns.is_empty() || periods_per_year == 0 {
        return PerformanceStats::default();
    }
    let ppy = Decimal::from(periods_per_year);

    let mut index = Vec::with_capacity(returns.len() + 1);
    let mut level = Decimal::ONE;
    index.push(level);
    for r in returns {
        level *= Decimal::ONE + *r;
        index.push(level);
    }
    let total_return = level - Decimal::ONE;

    let years = Decimal::from(returns.len() as u64) / ppy;
    let annualized_return = if level > Decimal::ZERO && !years.is_zero() {
        level
            .checked_powd(Decimal::ONE / years)
            .map(|g| g - Decimal::ONE)
            .unwrap_or_else(|| mean(returns) * ppy)
    } else {
        Decimal::NEGATIVE_ONE
    };

    let annualized_volatility = sample_std_dev(returns) * sqrt_decimal(ppy);

    PerformanceStats {
        total_return: total_return.round_dp(6),
        annualized_return: annualized_return.round_dp(6),
        annualized_volatility: annualized_volatility.round_dp(6),
        sharpe_ratio: sharpe_ratio(annualized_return, risk_free_rate, annualized_volatility)
            .round_dp(4),
        max_drawdown: max_drawdown(&index).round_dp(6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_total_return_compounds() {
        let s = performance_stats(&[dec!(0.10), dec!(-0.10)], 12, dec!(0.02));
        assert_eq!(s.total_return, dec!(-0.01));
        assert_eq!(s.max_drawdown, dec!(0.1));
    }

    #[test]
    fn test_one_year_of_constant_returns() {
        let returns = vec![dec!(0.01); 12];
        let s = performance_stats(&returns, 12, dec!(0.02));
        assert_eq!(s.annualized_volatility, Decimal::ZERO);
        assert_eq!(s.annualized_return, s.total_return);
        assert_eq!(s.sharpe_ratio, Decimal::ZERO);
        assert_eq!(s.max_drawdown, Decimal::ZERO);
    }

    #[test]
    fn test_empty() {
        assert_eq!(performance_stats(&[], 252, dec!(0.02)), PerformanceStats::default());
    }
}
