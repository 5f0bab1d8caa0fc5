//! Historical price series and the pull-based provider seam.

pub mod in_memory;
#[cfg(feature = "monte_carlo")]
pub mod synthetic;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::AdvisorError;
use crate::types::{Money, Rate};
use crate::AdvisorResult;

pub use in_memory::InMemoryMarketData;
#[cfg(feature = "monte_carlo")]
pub use synthetic::{SymbolSpec, SyntheticMarketData};

/// A single dated closing price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Money,
}

/// Ordered price history for one symbol.
///
/// Dates are strictly increasing, prices are positive, and no two
/// consecutive observations are further apart than the gap tolerance the
/// series was built with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl AssetSeries {
    pub fn new(
        symbol: impl Into<String>,
        points: Vec<PricePoint>,
        max_gap_days: i64,
    ) -> AdvisorResult<Self> {
        let symbol = symbol.into().trim().to_uppercase();
        for (i, p) in points.iter().enumerate() {
            if p.price <= Decimal::ZERO {
                return Err(AdvisorError::validation(
                    format!("series.{symbol}[{i}]"),
                    format!("Price must be positive, got {}", p.price),
                ));
            }
        }
        for (i, pair) in points.windows(2).enumerate() {
            let gap = (pair[1].date - pair[0].date).num_days();
            if gap <= 0 {
                return Err(AdvisorError::validation(
                    format!("series.{symbol}[{}]", i + 1),
                    format!("Dates must be strictly increasing ({} after {})", pair[1].date, pair[0].date),
                ));
            }
            if gap > max_gap_days {
                return Err(AdvisorError::validation(
                    format!("series.{symbol}[{}]", i + 1),
                    format!("Gap of {gap} days exceeds tolerance of {max_gap_days}"),
                ));
            }
        }
        Ok(Self { symbol, points })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Observations within [from, to], inclusive. The sub-range of a valid
    /// series is itself valid.
    pub fn window(&self, from: NaiveDate, to: NaiveDate) -> AssetSeries {
        AssetSeries {
            symbol: self.symbol.clone(),
            points: self
                .points
                .iter()
                .filter(|p| p.date >= from && p.date <= to)
                .copied()
                .collect(),
        }
    }

    /// Periodic simple returns p[t] / p[t-1] - 1.
    pub fn simple_returns(&self) -> Vec<Decimal> {
        simple_returns(&self.points.iter().map(|p| p.price).collect::<Vec<_>>())
    }
}

pub fn simple_returns(prices: &[Decimal]) -> Vec<Decimal> {
    prices
        .windows(2)
        .map(|w| w[1] / w[0] - Decimal::ONE)
        .collect()
}

/// Several series restricted to the dates they all share.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSeries {
    pub symbols: Vec<String>,
    pub dates: Vec<NaiveDate>,
    /// prices[i][t] is the price of symbols[i] on dates[t].
    pub prices: Vec<Vec<Decimal>>,
}

impl AlignedSeries {
    /// Per-symbol simple returns over the shared dates.
    pub fn returns(&self) -> Vec<Vec<Decimal>> {
        self.prices.iter().map(|p| simple_returns(p)).collect()
    }

    pub fn observations(&self) -> usize {
        self.dates.len().saturating_sub(1)
    }
}

/// Intersect the dates of every series. The shared dates are held to the
/// same gap tolerance as each input series.
pub fn align_series(series: &[AssetSeries], max_gap_days: i64) -> AdvisorResult<AlignedSeries> {
    if series.is_empty() {
        return Err(AdvisorError::InsufficientData(
            "No series to align".into(),
        ));
    }
    let mut common: BTreeSet<NaiveDate> = series[0].points.iter().map(|p| p.date).collect();
    for s in &series[1..] {
        let dates: BTreeSet<NaiveDate> = s.points.iter().map(|p| p.date).collect();
        common = common.intersection(&dates).copied().collect();
    }
    let dates: Vec<NaiveDate> = common.into_iter().collect();
    for pair in dates.windows(2) {
        let gap = (pair[1] - pair[0]).num_days();
        if gap > max_gap_days {
            let symbols: Vec<&str> = series.iter().map(|s| s.symbol()).collect();
            return Err(AdvisorError::validation(
                format!("aligned.{}", symbols.join(",")),
                format!(
                    "Shared dates skip {gap} days between {} and {}, tolerance is {max_gap_days}",
                    pair[0], pair[1]
                ),
            ));
        }
    }
    let prices = series
        .iter()
        .map(|s| {
            s.points
                .iter()
                .filter(|p| dates.binary_search(&p.date).is_ok())
                .map(|p| p.price)
                .collect::<Vec<_>>()
        })
        .collect();
    Ok(AlignedSeries {
        symbols: series.iter().map(|s| s.symbol.clone()).collect(),
        dates,
        prices,
    })
}

/// Pull-based source of historical and current prices.
pub trait MarketDataProvider: Send + Sync {
    /// Prices for `symbol` within [from, to].
    fn price_history(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> AdvisorResult<AssetSeries>;

    /// Most recent known price for `symbol`.
    fn latest_price(&self, symbol: &str) -> AdvisorResult<Money>;

    /// Trailing dividend yield, when the provider knows it.
    fn dividend_yield(&self, _symbol: &str) -> AdvisorResult<Option<Rate>> {
        Ok(None)
    }

    /// Last date for which the provider has data; anchors historical windows.
    fn last_date(&self) -> Option<NaiveDate>;
}

/// Fetch and align the history of several symbols in one go.
pub fn fetch_aligned(
    provider: &dyn MarketDataProvider,
    symbols: &[String],
    from: NaiveDate,
    to: NaiveDate,
    max_gap_days: i64,
) -> AdvisorResult<AlignedSeries> {
    let series = symbols
        .iter()
        .map(|s| provider.price_history(s, from, to))
        .collect::<AdvisorResult<Vec<_>>>()?;
    align_series(&series, max_gap_days)
}
