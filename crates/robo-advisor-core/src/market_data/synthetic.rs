//! Seeded geometric-Brownian-motion price histories.
//!
//! All symbols are generated in one pass from a single `StdRng`, sharing a
//! common market shock, so the same seed, date range and symbol list always
//! yield the same (correlated) histories.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use super::{AssetSeries, InMemoryMarketData, MarketDataProvider, PricePoint};
use crate::error::AdvisorError;
use crate::math::to_decimal;
use crate::types::{Money, Rate};
use crate::AdvisorResult;

const TRADING_DAYS: f64 = 252.0;

/// Generation parameters for one synthetic symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub symbol: String,
    /// Annual drift.
    pub drift: f64,
    /// Annual volatility.
    pub volatility: f64,
    /// Loading on the shared market shock, in [-1, 1].
    pub market_beta: f64,
    pub start_price: f64,
    #[serde(default)]
    pub dividend_yield: Option<f64>,
}

impl SymbolSpec {
    pub fn new(symbol: &str, drift: f64, volatility: f64, market_beta: f64, start_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            drift,
            volatility,
            market_beta,
            start_price,
            dividend_yield: None,
        }
    }

    pub fn with_yield(mut self, dividend_yield: f64) -> Self {
        self.dividend_yield = Some(dividend_yield);
        self
    }
}

/// The ETF universe used by default portfolios plus the benchmark.
pub fn default_universe() -> Vec<SymbolSpec> {
    vec![
        SymbolSpec::new("VTI", 0.08, 0.17, 0.95, 200.0).with_yield(0.014),
        SymbolSpec::new("VXUS", 0.06, 0.18, 0.85, 55.0).with_yield(0.030),
        SymbolSpec::new("BND", 0.030, 0.06, 0.10, 75.0).with_yield(0.031),
        SymbolSpec::new("BNDX", 0.025, 0.05, 0.05, 50.0).with_yield(0.026),
        SymbolSpec::new("VNQ", 0.06, 0.21, 0.70, 85.0).with_yield(0.040),
        SymbolSpec::new("GSG", 0.03, 0.22, 0.30, 20.0),
        SymbolSpec::new("SPY", 0.08, 0.16, 1.00, 450.0).with_yield(0.013),
    ]
}

/// Deterministic synthetic market, materialised up front.
#[derive(Debug, Clone)]
pub struct SyntheticMarketData {
    seed: u64,
    data: InMemoryMarketData,
}

impl SyntheticMarketData {
    pub fn generate(
        seed: u64,
        start: NaiveDate,
        end: NaiveDate,
        specs: &[SymbolSpec],
    ) -> AdvisorResult<Self> {
        if end <= start {
            return Err(AdvisorError::invalid_parameter(
                "end",
                "End date must be after start date",
            ));
        }
        for spec in specs {
            if spec.volatility < 0.0 || spec.start_price <= 0.0 || spec.market_beta.abs() > 1.0 {
                return Err(AdvisorError::invalid_parameter(
                    format!("specs.{}", spec.symbol),
                    "Volatility must be >= 0, start price > 0 and |beta| <= 1",
                ));
            }
        }

        let std_normal = Normal::new(0.0, 1.0).map_err(|e| {
            AdvisorError::invalid_parameter("distribution", format!("Invalid Normal parameters: {e}"))
        })?;
        let mut rng = StdRng::seed_from_u64(seed);
        let dt = 1.0 / TRADING_DAYS;

        let dates = business_days(start, end);
        let mut levels: Vec<f64> = specs.iter().map(|s| s.start_price).collect();
        let mut points: Vec<Vec<PricePoint>> = vec![Vec::with_capacity(dates.len()); specs.len()];

        for (t, date) in dates.iter().enumerate() {
            if t > 0 {
                let market: f64 = rng.sample(&std_normal);
                for (i, spec) in specs.iter().enumerate() {
                    let idio: f64 = rng.sample(&std_normal);
                    let beta = spec.market_beta;
                    let z = beta * market + (1.0 - beta * beta).sqrt() * idio;
                    let log_ret = (spec.drift - 0.5 * spec.volatility * spec.volatility) * dt
                        + spec.volatility * dt.sqrt() * z;
                    levels[i] *= log_ret.exp();
                }
            }
            for (i, level) in levels.iter().enumerate() {
                let price = to_decimal(*level).round_dp(4).max(Decimal::new(1, 4));
                points[i].push(PricePoint { date: *date, price });
            }
        }

        let mut data = InMemoryMarketData::new();
        for (spec, pts) in specs.iter().zip(points) {
            data.insert(AssetSeries::new(&spec.symbol, pts, 4)?);
            if let Some(y) = spec.dividend_yield {
                data.set_dividend_yield(&spec.symbol, to_decimal(y));
            }
        }

        log::debug!(
            "generated {} synthetic series over {} business days (seed {seed})",
            specs.len(),
            dates.len()
        );
        Ok(Self { seed, data })
    }

    /// The default ETF universe over the `years` calendar years ending at `end`.
    pub fn default_universe(seed: u64, end: NaiveDate, years: i32) -> AdvisorResult<Self> {
        let start = end
            .with_year(end.year() - years)
            .unwrap_or(end - chrono::Duration::days(365 * years as i64));
        Self::generate(seed, start, end, &default_universe())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn into_inner(self) -> InMemoryMarketData {
        self.data
    }
}

impl MarketDataProvider for SyntheticMarketData {
    fn price_history(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> AdvisorResult<AssetSeries> {
        self.data.price_history(symbol, from, to)
    }

    fn latest_price(&self, symbol: &str) -> AdvisorResult<Money> {
        self.data.latest_price(symbol)
    }

    fn dividend_yield(&self, symbol: &str) -> AdvisorResult<Option<Rate>> {
        self.data.dividend_yield(symbol)
    }

    fn last_date(&self) -> Option<NaiveDate> {
        self.data.last_date()
    }
}

fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_same_seed_same_history() {
        let a = SyntheticMarketData::default_universe(7, d(2024, 6, 28), 2).unwrap();
        let b = SyntheticMarketData::default_universe(7, d(2024, 6, 28), 2).unwrap();
        let from = d(2022, 1, 1);
        let to = d(2024, 6, 28);
        assert_eq!(
            a.price_history("VTI", from, to).unwrap(),
            b.price_history("VTI", from, to).unwrap()
        );
    }

    #[test]
    fn test_different_seed_differs() {
        let a = SyntheticMarketData::default_universe(1, d(2024, 6, 28), 1).unwrap();
        let b = SyntheticMarketData::default_universe(2, d(2024, 6, 28), 1).unwrap();
        assert_ne!(a.latest_price("VTI").unwrap(), b.latest_price("VTI").unwrap());
    }

    #[test]
    fn test_only_business_days() {
        let md = SyntheticMarketData::default_universe(3, d(2024, 6, 28), 1).unwrap();
        let s = md.price_history("BND", d(2023, 1, 1), d(2024, 6, 28)).unwrap();
        assert!(s
            .points()
            .iter()
            .all(|p| !matches!(p.date.weekday(), Weekday::Sat | Weekday::Sun)));
        assert_eq!(md.last_date(), Some(d(2024, 6, 28)));
    }

    #[test]
    fn test_rejects_inverted_range() {
        assert!(SyntheticMarketData::generate(1, d(2024, 1, 2), d(2024, 1, 1), &default_universe()).is_err());
    }
}
