//! Forward projection and historical replay of an allocation.

pub mod backtest;
pub mod forward;
pub mod stats;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::Money;

pub use backtest::{run_backtest, BacktestParams, BacktestResult};
pub use forward::{simulate_forward, ForwardParams, SimulationMode, SimulationResult};
pub use stats::{performance_stats, PerformanceStats};

/// One dated observation of a simulated or replayed portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationPoint {
    pub date: NaiveDate,
    #[serde(rename = "portfolioValue")]
    pub portfolio_value: Money,
    #[serde(rename = "benchmarkValue")]
    pub benchmark_value: Money,
    /// Monte Carlo 10th percentile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p10: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p90: Option<Money>,
}

/// Last calendar day of the month `offset` months after `start`.
pub(crate) fn month_end(start: NaiveDate, offset: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(start.year(), start.month(), 1)?;
    first
        .checked_add_months(Months::new(offset + 1))?
        .pred_opt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_end() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(month_end(d, 0), NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(month_end(d, 1), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(month_end(d, 11), NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(month_end(d, 13), NaiveDate::from_ymd_opt(2025, 2, 28));
    }
}
