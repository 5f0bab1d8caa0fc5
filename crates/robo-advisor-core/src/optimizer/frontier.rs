use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use super::estimates::MarketEstimates;
use crate::config::{EngineConfig, TargetVolatility};
use crate::error::AdvisorError;
use crate::math::{mat_vec_multiply, quadratic_form, sharpe_ratio, solve_linear_system, sqrt_decimal, vec_dot};
use crate::types::{with_metadata, Allocation, ComputationOutput, Rate, RiskLevel, CASH_SYMBOL};
use crate::AdvisorResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Frontier construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierParams {
    pub risk_free_rate: Rate,
    /// Number of target returns swept between the endpoints (>= 2).
    pub points: usize,
    pub allow_short: bool,
}

impl FrontierParams {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            risk_free_rate: config.risk_free_rate,
            points: config.frontier_points,
            allow_short: config.allow_short,
        }
    }
}

/// A single point on the efficient frontier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficientFrontierPoint {
    /// Annualised standard deviation of portfolio returns.
    pub volatility: Decimal,
    /// Annualised expected return.
    pub expected_return: Decimal,
    pub sharpe_ratio: Decimal,
    pub weights: BTreeMap<String, Decimal>,
}

impl EfficientFrontierPoint {
    /// The weights as a validated allocation. Short positions are clipped.
    pub fn allocation(&self) -> AdvisorResult<Allocation> {
        Allocation::from_weights(self.weights.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EfficientFrontier {
    /// Ascending volatility; each point strictly improves return on the last.
    pub efficient_frontier: Vec<EfficientFrontierPoint>,
    pub min_variance: EfficientFrontierPoint,
    /// Highest Sharpe ratio on the frontier.
    pub tangency: EfficientFrontierPoint,
    /// The caller's existing allocation, evaluated with the same estimates.
    pub current: Option<EfficientFrontierPoint>,
    pub observations: usize,
}

// ---------------------------------------------------------------------------
// Solver constants
// ---------------------------------------------------------------------------

const WEIGHT_EPSILON: Decimal = dec!(0.000000001);
const RETURN_TOLERANCE: Decimal = dec!(0.00000001);
/// Bracket for the risk-aversion parameter.
const GAMMA_MIN: Decimal = dec!(0.0001);
const GAMMA_MAX: Decimal = dec!(100000000);
const BISECTION_STEPS: u32 = 40;
const ACTIVE_SET_BASE_STEPS: u32 = 50;
const OUTPUT_DP: u32 = 8;
const WEIGHT_DP: u32 = 6;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Trace the efficient frontier for the given estimates.
///
/// Each point maximises `w'mu - (gamma/2) w'Sigma w` subject to full
/// investment (and no shorting unless allowed) for a risk aversion `gamma`
/// chosen by bisection so that the point hits an evenly spaced target
/// return between the minimum-variance and maximum-return portfolios.
pub fn compute_efficient_frontier(
    estimates: &MarketEstimates,
    params: &FrontierParams,
    current: Option<&Allocation>,
) -> AdvisorResult<ComputationOutput<EfficientFrontier>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_params(estimates, params)?;

    let mu = &estimates.expected_returns;
    let sigma = &estimates.covariance;
    let n = mu.len();
    let rf = params.risk_free_rate;

    let gmv = min_variance_weights(sigma, params.allow_short)?;
    let r_min = vec_dot(&gmv, mu);

    let top = max_return_weights(mu, sigma, params.allow_short)?;
    let r_max = vec_dot(&top, mu);

    let mut raw_points: Vec<Vec<Decimal>> = vec![gmv.clone()];
    if r_max - r_min > RETURN_TOLERANCE {
        let steps = Decimal::from((params.points - 1) as u64);
        for k in 1..params.points - 1 {
            let target = r_min + (r_max - r_min) * Decimal::from(k as u64) / steps;
            raw_points.push(weights_for_target(mu, sigma, target, params.allow_short)?);
        }
        raw_points.push(top);
    } else {
        warnings.push("All assets share the same expected return; frontier is a single point".into());
    }

    let mut points: Vec<EfficientFrontierPoint> = raw_points
        .iter()
        .map(|w| make_point(&estimates.symbols, mu, sigma, w, rf))
        .collect();
    points.sort_by(|a, b| {
        a.volatility
            .cmp(&b.volatility)
            .then(b.expected_return.cmp(&a.expected_return))
    });
    let efficient_frontier = drop_dominated(points);

    let min_variance = make_point(&estimates.symbols, mu, sigma, &gmv, rf);
    let tangency = efficient_frontier
        .iter()
        .max_by(|a, b| a.sharpe_ratio.cmp(&b.sharpe_ratio))
        .cloned()
        .unwrap_or_else(|| min_variance.clone());

    let current_point = match current {
        Some(allocation) => {
            let p = evaluate_allocation(estimates, allocation, rf)?;
            if efficient_frontier
                .iter()
                .any(|f| f.volatility <= p.volatility && f.expected_return > p.expected_return)
            {
                warnings.push(
                    "Current allocation lies below the frontier; a frontier point earns more for the same risk".into(),
                );
            }
            Some(p)
        }
        None => None,
    };

    if estimates.observations > 0 && estimates.observations < 2 * n {
        warnings.push(format!(
            "Only {} observations for {} assets; covariance estimate is noisy",
            estimates.observations, n
        ));
    }

    log::debug!(
        "frontier: {} assets, {} points kept of {}",
        n,
        efficient_frontier.len(),
        raw_points.len()
    );

    let output = EfficientFrontier {
        efficient_frontier,
        min_variance,
        tangency,
        current: current_point,
        observations: estimates.observations,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Mean-variance efficient frontier (active-set QP, risk-aversion bisection)",
        &serde_json::json!({
            "risk_free_rate": rf.to_string(),
            "points": params.points,
            "allow_short": params.allow_short,
            "assets": estimates.symbols,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Expected return, volatility and Sharpe ratio of an arbitrary allocation.
///
/// The cash sleeve earns the risk-free rate with zero variance; every other
/// symbol must be covered by the estimates.
pub fn evaluate_allocation(
    estimates: &MarketEstimates,
    allocation: &Allocation,
    risk_free_rate: Rate,
) -> AdvisorResult<EfficientFrontierPoint> {
    let mut w = vec![Decimal::ZERO; estimates.len()];
    let mut cash = Decimal::ZERO;
    for (symbol, fraction) in allocation.iter() {
        if symbol == CASH_SYMBOL && estimates.index_of(symbol).is_none() {
            cash += *fraction;
            continue;
        }
        match estimates.index_of(symbol) {
            Some(i) => w[i] += *fraction,
            None => return Err(AdvisorError::not_found("Symbol", symbol.clone())),
        }
    }
    let ret = vec_dot(&w, &estimates.expected_returns) + cash * risk_free_rate;
    let vol = sqrt_decimal(quadratic_form(&w, &estimates.covariance));
    Ok(EfficientFrontierPoint {
        volatility: vol.round_dp(OUTPUT_DP),
        expected_return: ret.round_dp(OUTPUT_DP),
        sharpe_ratio: sharpe_ratio(ret, risk_free_rate, vol).round_dp(OUTPUT_DP),
        weights: allocation.as_map().clone(),
    })
}

/// Frontier point whose volatility is closest to the level's target.
/// Ties go to the lower-volatility point.
pub fn select_for_risk_level<'a>(
    frontier: &'a EfficientFrontier,
    level: RiskLevel,
    targets: &TargetVolatility,
) -> &'a EfficientFrontierPoint {
    let target = targets.for_level(level);
    frontier
        .efficient_frontier
        .iter()
        .min_by(|a, b| {
            (a.volatility - target)
                .abs()
                .cmp(&(b.volatility - target).abs())
                .then(a.volatility.cmp(&b.volatility))
        })
        .unwrap_or(&frontier.min_variance)
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

fn min_variance_weights(sigma: &[Vec<Decimal>], allow_short: bool) -> AdvisorResult<Vec<Decimal>> {
    let zeros = vec![Decimal::ZERO; sigma.len()];
    solve_mean_variance(&zeros, sigma, Decimal::ONE, allow_short)
}

/// Long-only: all weight in the best asset (minimum-variance mix when
/// several share the top return). With shorting the return is unbounded,
/// so the best single-asset return is used as the upper target.
fn max_return_weights(
    mu: &[Decimal],
    sigma: &[Vec<Decimal>],
    allow_short: bool,
) -> AdvisorResult<Vec<Decimal>> {
    let best = mu.iter().copied().max().unwrap_or(Decimal::ZERO);
    if allow_short {
        return weights_for_target(mu, sigma, best, true);
    }
    let tied: Vec<usize> = (0..mu.len()).filter(|&i| mu[i] == best).collect();
    let mut w = vec![Decimal::ZERO; mu.len()];
    if tied.len() == 1 {
        w[tied[0]] = Decimal::ONE;
        return Ok(w);
    }
    let sub: Vec<Vec<Decimal>> = tied
        .iter()
        .map(|&i| tied.iter().map(|&j| sigma[i][j]).collect())
        .collect();
    let sub_w = min_variance_weights(&sub, false)?;
    for (k, &i) in tied.iter().enumerate() {
        w[i] = sub_w[k];
    }
    Ok(w)
}

/// Bisect on log-gamma until the optimal portfolio's return meets `target`.
/// Portfolio return falls monotonically as gamma grows.
fn weights_for_target(
    mu: &[Decimal],
    sigma: &[Vec<Decimal>],
    target: Decimal,
    allow_short: bool,
) -> AdvisorResult<Vec<Decimal>> {
    let mut lo = GAMMA_MIN;
    let mut hi = GAMMA_MAX;
    let mut best = solve_mean_variance(mu, sigma, hi, allow_short)?;
    for _ in 0..BISECTION_STEPS {
        let mid = sqrt_decimal(lo * hi);
        let w = solve_mean_variance(mu, sigma, mid, allow_short)?;
        let r = vec_dot(&w, mu);
        if (r - target).abs() < RETURN_TOLERANCE {
            return Ok(w);
        }
        if r > target {
            lo = mid;
        } else {
            hi = mid;
        }
        best = w;
    }
    Ok(best)
}

/// Maximise `w'mu - (gamma/2) w'Sigma w` subject to `sum(w) = 1`, and
/// `w >= 0` unless shorting is allowed.
fn solve_mean_variance(
    mu: &[Decimal],
    sigma: &[Vec<Decimal>],
    gamma: Decimal,
    allow_short: bool,
) -> AdvisorResult<Vec<Decimal>> {
    let n = mu.len();
    if allow_short {
        let all: Vec<usize> = (0..n).collect();
        let (w, _) = solve_kkt(mu, sigma, gamma, &all)?;
        return Ok(w);
    }
    solve_long_only(mu, sigma, gamma)
}

/// Primal active-set method over the bound constraints `w >= 0`.
fn solve_long_only(
    mu: &[Decimal],
    sigma: &[Vec<Decimal>],
    gamma: Decimal,
) -> AdvisorResult<Vec<Decimal>> {
    let n = mu.len();
    let half = gamma / dec!(2);
    let start = (0..n)
        .max_by(|&a, &b| {
            (mu[a] - half * sigma[a][a]).cmp(&(mu[b] - half * sigma[b][b]))
        })
        .unwrap_or(0);

    let mut w = vec![Decimal::ZERO; n];
    w[start] = Decimal::ONE;
    let mut free: Vec<usize> = vec![start];
    let max_steps = ACTIVE_SET_BASE_STEPS + 10 * n as u32;

    for _ in 0..max_steps {
        let (w_free, lambda) = solve_kkt(mu, sigma, gamma, &free)?;

        // First free weight to hit zero on the way to the unconstrained step.
        let blocking = free
            .iter()
            .enumerate()
            .filter(|(p, _)| w_free[*p] < -WEIGHT_EPSILON)
            .map(|(p, &i)| (p, w[i] / (w[i] - w_free[p])))
            .min_by(|a, b| a.1.cmp(&b.1));

        match blocking {
            Some((pos, alpha)) => {
                for (p, &i) in free.iter().enumerate() {
                    let wi = w[i];
                    w[i] = wi + alpha * (w_free[p] - wi);
                }
                let leaving = free.remove(pos);
                w[leaving] = Decimal::ZERO;
            }
            None => {
                for (p, &i) in free.iter().enumerate() {
                    w[i] = w_free[p].max(Decimal::ZERO);
                }
                let sigma_w = mat_vec_multiply(sigma, &w);
                let entering = (0..n)
                    .filter(|i| !free.contains(i))
                    .map(|i| (i, gamma * sigma_w[i] - mu[i] + lambda))
                    .filter(|(_, nu)| *nu < -WEIGHT_EPSILON)
                    .min_by(|a, b| a.1.cmp(&b.1));
                match entering {
                    Some((i, _)) => {
                        free.push(i);
                        free.sort_unstable();
                    }
                    None => return Ok(renormalize(w)),
                }
            }
        }
    }

    log::error!("active set did not settle after {max_steps} steps (gamma {gamma})");
    Err(AdvisorError::Computation {
        function: "active_set".into(),
        iterations: max_steps,
        detail: format!("free set {free:?} did not settle at gamma {gamma}"),
    })
}

/// Stationarity on the free set:
/// `gamma Sigma_FF w_F + lambda 1 = mu_F`, `1' w_F = 1`.
fn solve_kkt(
    mu: &[Decimal],
    sigma: &[Vec<Decimal>],
    gamma: Decimal,
    free: &[usize],
) -> AdvisorResult<(Vec<Decimal>, Decimal)> {
    let m = free.len();
    let mut a = vec![vec![Decimal::ZERO; m + 1]; m + 1];
    let mut b = vec![Decimal::ZERO; m + 1];
    for (r, &i) in free.iter().enumerate() {
        for (c, &j) in free.iter().enumerate() {
            a[r][c] = gamma * sigma[i][j];
        }
        a[r][m] = Decimal::ONE;
        a[m][r] = Decimal::ONE;
        b[r] = mu[i];
    }
    b[m] = Decimal::ONE;

    let x = solve_linear_system(&a, &b)?;
    Ok((x[..m].to_vec(), x[m]))
}

fn renormalize(mut w: Vec<Decimal>) -> Vec<Decimal> {
    let total: Decimal = w.iter().sum();
    if !total.is_zero() {
        for x in w.iter_mut() {
            *x /= total;
        }
    }
    w
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_point(
    symbols: &[String],
    mu: &[Decimal],
    sigma: &[Vec<Decimal>],
    w: &[Decimal],
    rf: Rate,
) -> EfficientFrontierPoint {
    let ret = vec_dot(w, mu);
    let vol = sqrt_decimal(quadratic_form(w, sigma));
    EfficientFrontierPoint {
        volatility: vol.round_dp(OUTPUT_DP),
        expected_return: ret.round_dp(OUTPUT_DP),
        sharpe_ratio: sharpe_ratio(ret, rf, vol).round_dp(OUTPUT_DP),
        weights: symbols
            .iter()
            .cloned()
            .zip(w.iter().map(|x| x.round_dp(WEIGHT_DP)))
            .collect(),
    }
}

/// Expects points sorted by ascending volatility, descending return on ties.
fn drop_dominated(points: Vec<EfficientFrontierPoint>) -> Vec<EfficientFrontierPoint> {
    let mut kept: Vec<EfficientFrontierPoint> = Vec::with_capacity(points.len());
    for p in points {
        let improves = match kept.last() {
            Some(last) => {
                p.expected_return > last.expected_return && p.volatility > last.volatility
            }
            None => true,
        };
        if improves {
            kept.push(p);
        }
    }
    kept
}

fn validate_params(estimates: &MarketEstimates, params: &FrontierParams) -> AdvisorResult<()> {
    if estimates.len() < 2 {
        return Err(AdvisorError::InsufficientData(format!(
            "At least 2 assets are required, got {}",
            estimates.len()
        )));
    }
    if params.points < 2 {
        return Err(AdvisorError::invalid_parameter(
            "frontier_points",
            "Must be at least 2",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
