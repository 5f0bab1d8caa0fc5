use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[cfg(feature = "monte_carlo")]
use rand::rngs::StdRng;
#[cfg(feature = "monte_carlo")]
use rand::{Rng, SeedableRng};
#[cfg(feature = "monte_carlo")]
use rayon::prelude::*;
#[cfg(feature = "monte_carlo")]
use statrs::distribution::Normal;

use super::{month_end, SimulationPoint};
use crate::error::AdvisorError;
#[cfg(feature = "monte_carlo")]
use crate::math::{to_decimal, to_f64};
use crate::time_value::monthly_rate;
use crate::types::{with_metadata, with_metadata_f64, ComputationOutput, Money, Rate};
use crate::AdvisorResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    #[default]
    MonteCarlo,
    Deterministic,
}

/// Fully resolved forward-simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardParams {
    /// Years; must be positive.
    pub time_horizon: i64,
    pub initial_investment: Money,
    pub monthly_contribution: Money,
    /// Annual arithmetic expected return of the allocation.
    pub expected_return: Rate,
    /// Annual volatility of the allocation.
    pub volatility: Rate,
    pub benchmark_return: Rate,
    pub mode: SimulationMode,
    pub num_paths: u32,
    /// Drawn and echoed back when absent.
    pub seed: Option<u64>,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// One point per month, `time_horizon * 12` in total.
    pub simulation_results: Vec<SimulationPoint>,
    pub mode: SimulationMode,
    pub seed: Option<u64>,
    pub num_paths: u32,
    pub expected_return: Rate,
    pub volatility: Rate,
    pub total_contributions: Money,
    pub final_value: Money,
    pub final_benchmark_value: Money,
    /// Share of paths ending below the money put in (Monte Carlo only).
    pub probability_of_shortfall: Option<Decimal>,
}

const MONTHS_PER_YEAR: i64 = 12;
const MAX_HORIZON_YEARS: i64 = 100;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Project an allocation forward month by month.
///
/// Contributions are added at the end of each month after growth. The
/// benchmark compounds at a fixed annual rate with the same contributions.
pub fn simulate_forward(params: &ForwardParams) -> AdvisorResult<ComputationOutput<SimulationResult>> {
    validate_params(params)?;
    match params.mode {
        SimulationMode::Deterministic => simulate_deterministic(params),
        SimulationMode::MonteCarlo => simulate_monte_carlo(params),
    }
}

// ---------------------------------------------------------------------------
// Deterministic
// ---------------------------------------------------------------------------

fn simulate_deterministic(params: &ForwardParams) -> AdvisorResult<ComputationOutput<SimulationResult>> {
    let start = Instant::now();
    let months = months_of(params);
    let growth = Decimal::ONE + monthly_rate(params.expected_return);
    let benchmark = benchmark_path(params, months);

    let mut value = params.initial_investment;
    let mut points = Vec::with_capacity(months);
    for (k, bench) in benchmark.iter().enumerate() {
        value = value * growth + params.monthly_contribution;
        points.push(SimulationPoint {
            date: date_for(params.start_date, k)?,
            portfolio_value: value.round_dp(2),
            benchmark_value: bench.round_dp(2),
            p10: None,
            p90: None,
        });
    }

    let output = finish(params, points, None, None);
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Deterministic monthly compounding at the allocation's expected return",
        &assumptions(params),
        Vec::new(),
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Monte Carlo
// ---------------------------------------------------------------------------

#[cfg(feature = "monte_carlo")]
fn simulate_monte_carlo(params: &ForwardParams) -> AdvisorResult<ComputationOutput<SimulationResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let months = months_of(params);
    let seed = params
        .seed
        .unwrap_or_else(|| StdRng::from_entropy().gen::<u64>());

    // Log-normal monthly steps whose arithmetic mean matches the annual
    // expected return.
    let sigma_annual = to_f64(params.volatility);
    let drift_annual = (1.0 + to_f64(params.expected_return)).ln() - 0.5 * sigma_annual * sigma_annual;
    let drift = drift_annual / MONTHS_PER_YEAR as f64;
    let sigma = sigma_annual / (MONTHS_PER_YEAR as f64).sqrt();

    let normal = Normal::new(0.0, 1.0).map_err(|e| AdvisorError::Computation {
        function: "monte_carlo".into(),
        iterations: 0,
        detail: format!("standard normal: {e}"),
    })?;

    let initial = to_f64(params.initial_investment);
    let contribution = to_f64(params.monthly_contribution);

    // Path seeds are drawn from one master stream keyed by the run seed.
    let mut master = StdRng::seed_from_u64(seed);
    let path_seeds: Vec<u64> = (0..params.num_paths).map(|_| master.gen::<u64>()).collect();

    let paths: Vec<Vec<f64>> = path_seeds
        .into_par_iter()
        .map(|path_seed| {
            let mut rng = StdRng::seed_from_u64(path_seed);
            let mut value = initial;
            let mut path = Vec::with_capacity(months);
            for _ in 0..months {
                let z: f64 = rng.sample(&normal);
                value = value * (drift + sigma * z).exp() + contribution;
                path.push(value);
            }
            path
        })
        .collect();

    if paths.iter().flatten().any(|v| !v.is_finite()) {
        log::error!("monte carlo produced non-finite values (seed {seed})");
        return Err(AdvisorError::Computation {
            function: "monte_carlo".into(),
            iterations: params.num_paths,
            detail: "non-finite portfolio value".into(),
        });
    }

    let benchmark = benchmark_path(params, months);
    let mut points = Vec::with_capacity(months);
    let mut column = Vec::with_capacity(paths.len());
    for (k, bench) in benchmark.iter().enumerate() {
        column.clear();
        column.extend(paths.iter().map(|path| path[k]));
        column.sort_by(|a, b| a.total_cmp(b));
        points.push(SimulationPoint {
            date: date_for(params.start_date, k)?,
            portfolio_value: to_decimal(percentile(&column, 0.5)).round_dp(2),
            benchmark_value: bench.round_dp(2),
            p10: Some(to_decimal(percentile(&column, 0.10)).round_dp(2)),
            p90: Some(to_decimal(percentile(&column, 0.90)).round_dp(2)),
        });
    }

    let invested = to_f64(
        params.initial_investment + params.monthly_contribution * Decimal::from(months as u64),
    );
    let short = paths
        .iter()
        .filter(|p| p.last().copied().unwrap_or(0.0) < invested)
        .count();
    let shortfall = Decimal::from(short as u64) / Decimal::from(params.num_paths);
    if shortfall > dec!(0.25) {
        warnings.push(format!(
            "{}% of paths end below the amount invested",
            (shortfall * dec!(100)).round_dp(1)
        ));
    }

    let output = finish(params, points, Some(seed), Some(shortfall.round_dp(4)));
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Monte Carlo simulation of monthly log-normal returns (median path, p10/p90 bands)",
        &assumptions(params),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(not(feature = "monte_carlo"))]
fn simulate_monte_carlo(_params: &ForwardParams) -> AdvisorResult<ComputationOutput<SimulationResult>> {
    Err(AdvisorError::invalid_parameter(
        "mode",
        "Monte Carlo simulation requires the monte_carlo feature",
    ))
}

/// Linear interpolation between closest ranks of a sorted slice.
#[cfg(feature = "monte_carlo")]
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn months_of(params: &ForwardParams) -> usize {
    (params.time_horizon * MONTHS_PER_YEAR) as usize
}

fn date_for(start: NaiveDate, k: usize) -> AdvisorResult<NaiveDate> {
    month_end(start, k as u32).ok_or_else(|| {
        AdvisorError::invalid_parameter("start_date", "Simulation runs past the supported date range")
    })
}

fn benchmark_path(params: &ForwardParams, months: usize) -> Vec<Money> {
    let growth = Decimal::ONE + monthly_rate(params.benchmark_return);
    let mut value = params.initial_investment;
    (0..months)
        .map(|_| {
            value = value * growth + params.monthly_contribution;
            value
        })
        .collect()
}

fn finish(
    params: &ForwardParams,
    points: Vec<SimulationPoint>,
    seed: Option<u64>,
    probability_of_shortfall: Option<Decimal>,
) -> SimulationResult {
    let months = points.len() as u64;
    let (final_value, final_benchmark_value) = points
        .last()
        .map(|p| (p.portfolio_value, p.benchmark_value))
        .unwrap_or((params.initial_investment, params.initial_investment));
    SimulationResult {
        mode: params.mode,
        seed,
        num_paths: match params.mode {
            SimulationMode::MonteCarlo => params.num_paths,
            SimulationMode::Deterministic => 1,
        },
        expected_return: params.expected_return,
        volatility: params.volatility,
        total_contributions: params.initial_investment
            + params.monthly_contribution * Decimal::from(months),
        final_value,
        final_benchmark_value,
        probability_of_shortfall,
        simulation_results: points,
    }
}

fn assumptions(params: &ForwardParams) -> serde_json::Value {
    serde_json::json!({
        "time_horizon_years": params.time_horizon,
        "expected_return": params.expected_return.to_string(),
        "volatility": params.volatility.to_string(),
        "benchmark_return": params.benchmark_return.to_string(),
        "contribution_timing": "end_of_month",
    })
}

fn validate_params(params: &ForwardParams) -> AdvisorResult<()> {
    if params.time_horizon <= 0 {
        return Err(AdvisorError::invalid_parameter(
            "time_horizon",
            format!("Must be positive, got {}", params.time_horizon),
        ));
    }
    if params.time_horizon > MAX_HORIZON_YEARS {
        return Err(AdvisorError::invalid_parameter(
            "time_horizon",
            format!("Must be at most {MAX_HORIZON_YEARS} years"),
        ));
    }
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
    if params.volatility < Decimal::ZERO {
        return Err(AdvisorError::invalid_parameter("volatility", "Must be non-negative"));
    }
    if params.expected_return <= dec!(-1) || params.benchmark_return <= dec!(-1) {
        return Err(AdvisorError::invalid_parameter(
            "expected_return",
            "Must be greater than -100%",
        ));
    }
    if params.mode == SimulationMode::MonteCarlo && params.num_paths == 0 {
        return Err(AdvisorError::invalid_parameter("num_paths", "Must be at least 1"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: SimulationMode) -> ForwardParams {
        ForwardParams {
            time_horizon: 5,
            initial_investment: dec!(100000),
            monthly_contribution: dec!(1000),
            expected_return: dec!(0.07),
            volatility: dec!(0.12),
            benchmark_return: dec!(0.07),
            mode,
            num_paths: 200,
            seed: Some(42),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        }
    }

    #[test]
    fn test_deterministic_length_and_dates() {
        let out = simulate_forward(&params(SimulationMode::Deterministic)).unwrap();
        let r = &out.result.simulation_results;
        assert_eq!(r.len(), 60);
        assert_eq!(r[0].date, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
        assert_eq!(r[59].date, NaiveDate::from_ymd_opt(2029, 12, 31).unwrap());
        assert!(r.windows(2).all(|w| w[1].portfolio_value > w[0].portfolio_value));
    }

    #[test]
    fn test_deterministic_matches_benchmark_at_same_rate() {
        let out = simulate_forward(&params(SimulationMode::Deterministic)).unwrap();
        for p in &out.result.simulation_results {
            assert_eq!(p.portfolio_value, p.benchmark_value);
        }
        assert_eq!(out.result.total_contributions, dec!(160000));
        assert_eq!(out.result.seed, None);
    }

    #[test]
    fn test_zero_return_adds_contributions_only() {
        let mut p = params(SimulationMode::Deterministic);
        p.expected_return = Decimal::ZERO;
        let out = simulate_forward(&p).unwrap();
        assert_eq!(out.result.final_value, dec!(160000));
    }

    #[cfg(feature = "monte_carlo")]
    #[test]
    fn test_monte_carlo_same_seed_same_output() {
        let a = simulate_forward(&params(SimulationMode::MonteCarlo)).unwrap();
        let b = simulate_forward(&params(SimulationMode::MonteCarlo)).unwrap();
        assert_eq!(a.result.simulation_results, b.result.simulation_results);
        assert_eq!(a.result.simulation_results.len(), 60);
        assert_eq!(a.result.seed, Some(42));
    }

    #[cfg(feature = "monte_carlo")]
    #[test]
    fn test_monte_carlo_bands_bracket_median() {
        let out = simulate_forward(&params(SimulationMode::MonteCarlo)).unwrap();
        for p in &out.result.simulation_results {
            let lo = p.p10.unwrap();
            let hi = p.p90.unwrap();
            assert!(lo <= p.portfolio_value && p.portfolio_value <= hi);
        }
    }

    #[cfg(feature = "monte_carlo")]
    #[test]
    fn test_monte_carlo_seed_drawn_when_absent() {
        let mut p = params(SimulationMode::MonteCarlo);
        p.seed = None;
        p.num_paths = 10;
        let out = simulate_forward(&p).unwrap();
        let seed = out.result.seed.unwrap();
        p.seed = Some(seed);
        let again = simulate_forward(&p).unwrap();
        assert_eq!(out.result.simulation_results, again.result.simulation_results);
    }

    #[cfg(feature = "monte_carlo")]
    #[test]
    fn test_different_seed_differs() {
        let a = simulate_forward(&params(SimulationMode::MonteCarlo)).unwrap();
        let mut p = params(SimulationMode::MonteCarlo);
        p.seed = Some(7);
        let b = simulate_forward(&p).unwrap();
        assert_ne!(a.result.final_value, b.result.final_value);
    }

    #[cfg(feature = "monte_carlo")]
    #[test]
    fn test_adjacent_seeds_do_not_share_paths() {
        let run = |seed: u64| {
            let mut p = params(SimulationMode::MonteCarlo);
            p.seed = Some(seed);
            simulate_forward(&p).unwrap().result.simulation_results
        };
        let a = run(1);
        let b = run(2);
        assert_ne!(a.last().unwrap().portfolio_value, b.last().unwrap().portfolio_value);
        assert!(a.iter().zip(&b).any(|(x, y)| x.p10 != y.p10));
    }

    #[test]
    fn test_rejects_non_positive_horizon() {
        let mut p = params(SimulationMode::Deterministic);
        p.time_horizon = 0;
        assert!(matches!(
            simulate_forward(&p).unwrap_err(),
            AdvisorError::InvalidParameter { .. }
        ));
        p.time_horizon = -3;
        assert!(simulate_forward(&p).is_err());
    }

    #[test]
    fn test_rejects_negative_investment() {
        let mut p = params(SimulationMode::Deterministic);
        p.initial_investment = dec!(-1);
        assert!(matches!(
            simulate_forward(&p).unwrap_err(),
            AdvisorError::InvalidParameter { .. }
        ));
    }
}
