use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::{AssetSeries, MarketDataProvider, PricePoint};
use crate::error::AdvisorError;
use crate::types::{Money, Rate};
use crate::AdvisorResult;

/// On-disk shape of a market data file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketDataDocument {
    pub series: BTreeMap<String, Vec<PricePoint>>,
    #[serde(default)]
    pub dividend_yields: BTreeMap<String, Rate>,
}

/// Market data held entirely in memory, typically loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    series: HashMap<String, AssetSeries>,
    dividend_yields: HashMap<String, Rate>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(doc: MarketDataDocument, max_gap_days: i64) -> AdvisorResult<Self> {
        let mut data = Self::new();
        for (symbol, points) in doc.series {
            data.insert(AssetSeries::new(symbol, points, max_gap_days)?);
        }
        for (symbol, y) in doc.dividend_yields {
            data.dividend_yields.insert(symbol.trim().to_uppercase(), y);
        }
        Ok(data)
    }

    pub fn from_json(json: &str, max_gap_days: i64) -> AdvisorResult<Self> {
        let doc: MarketDataDocument = serde_json::from_str(json)?;
        Self::from_document(doc, max_gap_days)
    }

    pub fn insert(&mut self, series: AssetSeries) {
        self.series.insert(series.symbol().to_string(), series);
    }

    pub fn set_dividend_yield(&mut self, symbol: &str, dividend_yield: Rate) {
        self.dividend_yields
            .insert(symbol.trim().to_uppercase(), dividend_yield);
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    fn lookup(&self, symbol: &str) -> AdvisorResult<&AssetSeries> {
        let key = symbol.trim().to_uppercase();
        self.series
            .get(&key)
            .ok_or_else(|| AdvisorError::not_found("Symbol", key))
    }
}

impl MarketDataProvider for InMemoryMarketData {
    fn price_history(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> AdvisorResult<AssetSeries> {
        let window = self.lookup(symbol)?.window(from, to);
        if window.is_empty() {
            return Err(AdvisorError::InsufficientData(format!(
                "No prices for {} between {from} and {to}",
                window.symbol()
            )));
        }
        Ok(window)
    }

    fn latest_price(&self, symbol: &str) -> AdvisorResult<Money> {
        let series = self.lookup(symbol)?;
        series.last().map(|p| p.price).ok_or_else(|| {
            AdvisorError::InsufficientData(format!("No prices for {}", series.symbol()))
        })
    }

    fn dividend_yield(&self, symbol: &str) -> AdvisorResult<Option<Rate>> {
        Ok(self
            .dividend_yields
            .get(&symbol.trim().to_uppercase())
            .copied())
    }

    fn last_date(&self) -> Option<NaiveDate> {
        self.series
            .values()
            .filter_map(|s| s.last().map(|p| p.date))
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const DOC: &str = r#"{
        "series": {
            "VTI": [
                {"date": "2024-01-02", "price": 100},
                {"date": "2024-01-03", "price": 101.5},
                {"date": "2024-01-04", "price": 99}
            ]
        },
        "dividend_yields": {"vti": 0.014}
    }"#;

    #[test]
    fn test_load_and_query() {
        let md = InMemoryMarketData::from_json(DOC, 7).unwrap();
        assert_eq!(md.latest_price("vti").unwrap(), dec!(99));
        assert_eq!(md.dividend_yield("VTI").unwrap(), Some(dec!(0.014)));
        assert_eq!(
            md.last_date(),
            NaiveDate::from_ymd_opt(2024, 1, 4)
        );
    }

    #[test]
    fn test_window_filters_dates() {
        let md = InMemoryMarketData::from_json(DOC, 7).unwrap();
        let from = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(md.price_history("VTI", from, to).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_symbol_is_not_found() {
        let md = InMemoryMarketData::from_json(DOC, 7).unwrap();
        assert!(matches!(
            md.latest_price("XYZ"),
            Err(AdvisorError::NotFound { .. })
        ));
    }
}
