use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::stats::{performance_stats, PerformanceStats};
use super::SimulationPoint;
use crate::error::AdvisorError;
use crate::market_data::AlignedSeries;
use crate::types::{with_metadata, Allocation, ComputationOutput, Money, Rate, CASH_SYMBOL};
use crate::AdvisorResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestParams {
    pub allocation: Allocation,
    pub benchmark_symbol: String,
    pub initial_investment: Money,
    #[serde(default)]
    pub monthly_contribution: Money,
    pub risk_free_rate: Rate,
    pub periods_per_year: u32,
    pub min_observations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// One point per aligned observation, starting with the initial value.
    pub backtest_results: Vec<SimulationPoint>,
    pub portfolio_stats: PerformanceStats,
    pub benchmark_stats: PerformanceStats,
    pub total_contributions: Money,
    pub final_value: Money,
    pub final_benchmark_value: Money,
    pub observations: usize,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Replay aligned history against a constant-mix allocation.
///
/// Weights are restored every period, the cash sleeve accrues the
/// risk-free rate, and the contribution lands on the first observation of
/// each new calendar month for both portfolio and benchmark.
pub fn run_backtest(
    params: &BacktestParams,
    history: &AlignedSeries,
) -> AdvisorResult<ComputationOutput<BacktestResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_params(params)?;

    let observations = history.observations();
    if observations < params.min_observations {
        return Err(AdvisorError::InsufficientData(format!(
            "{observations} observations in the backtest window, at least {} required",
            params.min_observations
        )));
    }

    let returns = history.returns();
    let column = |symbol: &str| -> AdvisorResult<usize> {
        history
            .symbols
            .iter()
            .position(|s| s.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| AdvisorError::not_found("Symbol", symbol))
    };

    let mut weighted: Vec<(usize, Decimal)> = Vec::new();
    for (symbol, fraction) in params.allocation.iter() {
        if symbol == CASH_SYMBOL || fraction.is_zero() {
            continue;
        }
        weighted.push((column(symbol)?, *fraction));
    }
    let bench_idx = column(&params.benchmark_symbol)?;
    let cash_return = params.allocation.cash_fraction() * params.risk_free_rate
        / Decimal::from(params.periods_per_year);

    let mut value = params.initial_investment;
    let mut bench = params.initial_investment;
    let mut contributions = params.initial_investment;
    let mut portfolio_returns = Vec::with_capacity(observations);
    let mut points = Vec::with_capacity(observations + 1);
    points.push(point(history, 0, value, bench));

    for t in 1..history.dates.len() {
        let r_p: Decimal = weighted
            .iter()
            .map(|(i, w)| *w * returns[*i][t - 1])
            .sum::<Decimal>()
            + cash_return;
        let r_b = returns[bench_idx][t - 1];
        portfolio_returns.push(r_p);

        value *= Decimal::ONE + r_p;
        bench *= Decimal::ONE + r_b;

        let prev = history.dates[t - 1];
        let today = history.dates[t];
        if (today.year(), today.month()) != (prev.year(), prev.month()) {
            value += params.monthly_contribution;
            bench += params.monthly_contribution;
            contributions += params.monthly_contribution;
        }
        points.push(point(history, t, value, bench));
    }

    let portfolio_stats = performance_stats(
        &portfolio_returns,
        params.periods_per_year,
        params.risk_free_rate,
    );
    let benchmark_stats = performance_stats(
        &returns[bench_idx],
        params.periods_per_year,
        params.risk_free_rate,
    );
    if portfolio_stats.annualized_return < benchmark_stats.annualized_return {
        warnings.push(format!(
            "Allocation underperformed {} over the window",
            params.benchmark_symbol
        ));
    }

    let output = BacktestResult {
        final_value: value.round_dp(2),
        final_benchmark_value: bench.round_dp(2),
        total_contributions: contributions,
        portfolio_stats,
        benchmark_stats,
        observations,
        backtest_results: points,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Constant-mix historical replay with monthly contributions",
        &serde_json::json!({
            "benchmark": params.benchmark_symbol,
            "risk_free_rate": params.risk_free_rate.to_string(),
            "periods_per_year": params.periods_per_year,
            "from": history.dates.first(),
            "to": history.dates.last(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn point(history: &AlignedSeries, t: usize, value: Money, bench: Money) -> SimulationPoint {
    SimulationPoint {
        date: history.dates[t],
        portfolio_value: value.round_dp(2),
        benchmark_value: bench.round_dp(2),
        p10: None,
        p90: None,
    }
}

fn validate_params(params: &BacktestParams) -> AdvisorResult<()> {
    if params.initial_investment < Decimal::ZERO {
        return Err(AdvisorError::invalid_parameter(
            "initial_investment",
            "Must be non-negative",
        ));
    }
    if params.monthly_contribution < Decimal::ZERO {
        return Err(AdvisorError::invalid_parameter(
            "monthly_contribution",
            "Must be non-negative",
        ));
    }
    if params.periods_per_year == 0 {
        return Err(AdvisorError::invalid_parameter(
            "periods_per_year",
            "Must be at least 1",
        ));
    }
    if params.min_observations < 2 {
        return Err(AdvisorError::invalid_parameter(
            "min_observations",
            "Must be at least 2",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::MathematicalOps;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    /// Weekly prices: A grows 1% per step, B is flat, SPY grows 0.5%.
    fn history(steps: usize) -> AlignedSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..=steps)
            .map(|k| start + chrono::Duration::days(7 * k as i64))
            .collect();
        let mut a = vec![dec!(100)];
        let mut s = vec![dec!(100)];
        for _ in 0..steps {
            let last_a = *a.last().unwrap();
            let last_s = *s.last().unwrap();
            a.push(last_a * dec!(1.01));
            s.push(last_s * dec!(1.005));
        }
        AlignedSeries {
            symbols: vec!["A".into(), "B".into(), "SPY".into()],
            dates,
            prices: vec![a, vec![dec!(50); steps + 1], s],
        }
    }

    fn params(pairs: &[(&str, Decimal)]) -> BacktestParams {
        let map: BTreeMap<String, Decimal> = pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        BacktestParams {
            allocation: Allocation::new(map).unwrap(),
            benchmark_symbol: "SPY".into(),
            initial_investment: dec!(10000),
            monthly_contribution: Decimal::ZERO,
            risk_free_rate: dec!(0.02),
            periods_per_year: 52,
            min_observations: 10,
        }
    }

    #[test]
    fn test_constant_mix_returns() {
        let out = run_backtest(&params(&[("A", dec!(0.5)), ("B", dec!(0.5))]), &history(20)).unwrap();
        let r = &out.result;
        assert_eq!(r.backtest_results.len(), 21);
        assert_eq!(r.backtest_results[0].portfolio_value, dec!(10000));
        // 0.5% per step on a rebalanced 50/50 mix.
        let expected = (dec!(10000) * dec!(1.005).powi(20)).round_dp(2);
        assert_eq!(r.final_value, expected);
        assert_eq!(r.final_value, r.final_benchmark_value);
    }

    #[test]
    fn test_contributions_on_month_change() {
        let mut p = params(&[("B", Decimal::ONE)]);
        p.monthly_contribution = dec!(100);
        let out = run_backtest(&p, &history(20)).unwrap();
        // 2024-01-01 + 140 days spans January through May: four month changes.
        assert_eq!(out.result.total_contributions, dec!(10400));
        assert_eq!(out.result.final_value, dec!(10400));
    }

    #[test]
    fn test_cash_earns_risk_free() {
        let out = run_backtest(&params(&[("CASH", Decimal::ONE)]), &history(52)).unwrap();
        assert!(out.result.final_value > dec!(10200));
        assert!(out.result.final_value < dec!(10203));
    }

    #[test]
    fn test_unknown_symbol() {
        let err = run_backtest(&params(&[("GSG", Decimal::ONE)]), &history(20)).unwrap_err();
        assert!(matches!(err, AdvisorError::NotFound { .. }));
    }

    #[test]
    fn test_short_window_is_insufficient() {
        let err = run_backtest(&params(&[("A", Decimal::ONE)]), &history(5)).unwrap_err();
        assert!(matches!(err, AdvisorError::InsufficientData(_)));
    }

    #[test]
    fn test_empty_window_is_an_error() {
        let mut p = params(&[("A", Decimal::ONE)]);
        p.min_observations = 0;
        assert!(matches!(
            run_backtest(&p, &history(20)).unwrap_err(),
            AdvisorError::InvalidParameter { .. }
        ));

        let empty = AlignedSeries {
            symbols: vec!["A".into(), "B".into(), "SPY".into()],
            dates: vec![],
            prices: vec![vec![], vec![], vec![]],
        };
        p.min_observations = 2;
        assert!(matches!(
            run_backtest(&p, &empty).unwrap_err(),
            AdvisorError::InsufficientData(_)
        ));
        // A single price gives no returns at all.
        let single = AlignedSeries {
            dates: vec![NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()],
            prices: vec![vec![dec!(100)], vec![dec!(50)], vec![dec!(100)]],
            ..empty
        };
        assert!(matches!(
            run_backtest(&p, &single).unwrap_err(),
            AdvisorError::InsufficientData(_)
        ));
    }
}
