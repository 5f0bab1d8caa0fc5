use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::CapitalMarketAssumptions;
use crate::error::AdvisorError;
use crate::market_data::AlignedSeries;
use crate::math::{mean, sample_covariance, sqrt_decimal};
use crate::simulation::stats::performance_stats;
use crate::types::{Allocation, Rate, CASH_SYMBOL};
use crate::AdvisorResult;

const SYMMETRY_TOLERANCE: Decimal = dec!(0.0000000001);

/// Annualised expected returns and covariance for a set of symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEstimates {
    pub symbols: Vec<String>,
    pub expected_returns: Vec<Decimal>,
    /// N x N, annualised.
    pub covariance: Vec<Vec<Decimal>>,
    /// Return observations the estimates were drawn from (0 for assumptions).
    pub observations: usize,
}

impl MarketEstimates {
    /// Validate shapes: at least two assets, a square symmetric covariance
    /// with a non-negative diagonal.
    pub fn new(
        symbols: Vec<String>,
        expected_returns: Vec<Decimal>,
        covariance: Vec<Vec<Decimal>>,
        observations: usize,
    ) -> AdvisorResult<Self> {
        let n = symbols.len();
        if n < 2 {
            return Err(AdvisorError::InsufficientData(format!(
                "At least 2 assets are required, got {n}"
            )));
        }
        if expected_returns.len() != n {
            return Err(AdvisorError::invalid_parameter(
                "expected_returns",
                format!("Expected {n} entries, got {}", expected_returns.len()),
            ));
        }
        if covariance.len() != n || covariance.iter().any(|row| row.len() != n) {
            return Err(AdvisorError::invalid_parameter(
                "covariance",
                format!("Must be {n}x{n}"),
            ));
        }
        for i in 0..n {
            if covariance[i][i] < Decimal::ZERO {
                return Err(AdvisorError::invalid_parameter(
                    "covariance",
                    format!("Negative variance for {}", symbols[i]),
                ));
            }
            for j in (i + 1)..n {
                if (covariance[i][j] - covariance[j][i]).abs() > SYMMETRY_TOLERANCE {
                    return Err(AdvisorError::invalid_parameter(
                        "covariance",
                        format!("Not symmetric at ({i}, {j})"),
                    ));
                }
            }
        }
        Ok(Self {
            symbols,
            expected_returns,
            covariance,
            observations,
        })
    }

    /// Estimates implied by per-class capital market assumptions rather than
    /// history.
    pub fn from_assumptions(
        symbols: &[String],
        cma: &CapitalMarketAssumptions,
    ) -> AdvisorResult<Self> {
        let expected_returns = symbols
            .iter()
            .map(|s| cma.for_class(cma.class_of(s)).expected_return)
            .collect();
        let vols: Vec<Decimal> = symbols
            .iter()
            .map(|s| cma.for_class(cma.class_of(s)).volatility)
            .collect();
        let covariance = symbols
            .iter()
            .enumerate()
            .map(|(i, a)| {
                symbols
                    .iter()
                    .enumerate()
                    .map(|(j, b)| vols[i] * vols[j] * cma.correlation(a, b))
                    .collect()
            })
            .collect();
        Self::new(symbols.to_vec(), expected_returns, covariance, 0)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.symbols
            .iter()
            .position(|s| s.eq_ignore_ascii_case(symbol.trim()))
    }
}

/// Annualised mean and sample covariance of the aligned simple returns.
pub fn estimate_from_series(
    aligned: &AlignedSeries,
    periods_per_year: u32,
    min_observations: usize,
) -> AdvisorResult<MarketEstimates> {
    let n = aligned.symbols.len();
    if n < 2 {
        return Err(AdvisorError::InsufficientData(format!(
            "At least 2 assets are required, got {n}"
        )));
    }
    let observations = aligned.observations();
    if observations < min_observations {
        return Err(AdvisorError::InsufficientData(format!(
            "{observations} aligned return observations, at least {min_observations} required"
        )));
    }

    let ppy = Decimal::from(periods_per_year);
    let returns = aligned.returns();
    let expected_returns: Vec<Decimal> = returns.iter().map(|r| mean(r) * ppy).collect();

    let mut covariance = vec![vec![Decimal::ZERO; n]; n];
    for i in 0..n {
        for j in i..n {
            let c = sample_covariance(&returns[i], &returns[j]) * ppy;
            covariance[i][j] = c;
            covariance[j][i] = c;
        }
    }

    log::debug!(
        "estimated {} assets over {} observations",
        n,
        observations
    );
    MarketEstimates::new(aligned.symbols.clone(), expected_returns, covariance, observations)
}

/// Where a set of portfolio moments came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentSource {
    History,
    Assumptions,
}

/// Annualised first and second moments of one allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMoments {
    pub expected_return: Rate,
    pub volatility: Rate,
    /// Only known when derived from history.
    pub max_drawdown: Option<Rate>,
    pub observations: usize,
    pub source: MomentSource,
}

/// Moments of the constant-mix return series of `allocation` over
/// `history`. Cash earns the risk-free rate.
pub fn historical_moments(
    allocation: &Allocation,
    history: &AlignedSeries,
    periods_per_year: u32,
    risk_free_rate: Rate,
) -> AdvisorResult<PortfolioMoments> {
    let returns = history.returns();
    let mut weighted = Vec::new();
    for (symbol, w) in allocation.iter() {
        if symbol == CASH_SYMBOL || w.is_zero() {
            continue;
        }
        let i = history
            .symbols
            .iter()
            .position(|s| s.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| AdvisorError::not_found("Symbol", symbol.clone()))?;
        weighted.push((i, *w));
    }
    let ppy = Decimal::from(periods_per_year);
    let cash = allocation.cash_fraction() * risk_free_rate / ppy;
    let series: Vec<Decimal> = (0..history.observations())
        .map(|t| weighted.iter().map(|(i, w)| *w * returns[*i][t]).sum::<Decimal>() + cash)
        .collect();
    if series.len() < 2 {
        return Err(AdvisorError::InsufficientData(format!(
            "{} return observations for the allocation",
            series.len()
        )));
    }
    let stats = performance_stats(&series, periods_per_year, risk_free_rate);
    Ok(PortfolioMoments {
        expected_return: (mean(&series) * ppy).round_dp(6),
        volatility: stats.annualized_volatility,
        max_drawdown: Some(stats.max_drawdown),
        observations: series.len(),
        source: MomentSource::History,
    })
}

/// Moments implied by per-class capital market assumptions.
pub fn assumed_moments(allocation: &Allocation, cma: &CapitalMarketAssumptions) -> PortfolioMoments {
    let legs: Vec<(&String, Decimal, Decimal, Decimal)> = allocation
        .iter()
        .map(|(s, w)| {
            let a = cma.for_class(cma.class_of(s));
            (s, *w, a.expected_return, a.volatility)
        })
        .collect();
    let expected_return: Decimal = legs.iter().map(|(_, w, mu, _)| *w * *mu).sum();
    let mut variance = Decimal::ZERO;
    for (a, wa, _, va) in &legs {
        for (b, wb, _, vb) in &legs {
            variance += *wa * *wb * *va * *vb * cma.correlation(a, b);
        }
    }
    PortfolioMoments {
        expected_return: expected_return.round_dp(6),
        volatility: sqrt_decimal(variance).round_dp(6),
        max_drawdown: None,
        observations: 0,
        source: MomentSource::Assumptions,
    }
}
