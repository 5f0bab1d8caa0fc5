use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::error::AdvisorError;
use crate::types::{with_metadata, Allocation, ComputationOutput, Money, Rate, CASH_SYMBOL};
use crate::AdvisorResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceRequest {
    pub current_allocation: Allocation,
    pub target_allocation: Allocation,
    /// Absolute drift at which an asset is traded back towards target.
    pub drift_threshold: Rate,
    #[serde(default)]
    pub force: bool,
    /// Total portfolio value; with `prices` this yields share-level trades.
    #[serde(default)]
    pub portfolio_value: Option<Money>,
    #[serde(default)]
    pub prices: BTreeMap<String, Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftEntry {
    pub symbol: String,
    pub current: Rate,
    pub target: Rate,
    /// |current - target|
    pub drift: Rate,
    pub flagged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: TradeSide,
    /// Always positive.
    pub shares: Decimal,
    pub price: Money,
    /// Always positive.
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceResult {
    pub new_allocation: Allocation,
    pub drifts: Vec<DriftEntry>,
    /// Sells first, then buys.
    pub trades: Vec<Trade>,
    pub rebalance_needed: bool,
}

const FRACTION_DP: u32 = 8;
const SHARE_DP: u32 = 6;
/// Trades smaller than one cent are not emitted.
const MIN_TRADE_AMOUNT: Decimal = dec!(0.01);

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Realign an allocation with its target.
///
/// Assets whose drift is at or above the threshold (or every asset when
/// `force` is set) are flagged. Unflagged assets keep their current
/// fraction; flagged assets share the remaining weight in proportion to
/// their targets, so the result still sums to one.
pub fn rebalance(req: &RebalanceRequest) -> AdvisorResult<ComputationOutput<RebalanceResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_request(req)?;

    let universe: BTreeSet<&String> = req
        .current_allocation
        .symbols()
        .chain(req.target_allocation.symbols())
        .collect();

    let drifts: Vec<DriftEntry> = universe
        .iter()
        .map(|symbol| {
            let current = req.current_allocation.get(symbol);
            let target = req.target_allocation.get(symbol);
            let drift = (current - target).abs();
            DriftEntry {
                symbol: (*symbol).clone(),
                current,
                target,
                drift,
                flagged: req.force || drift >= req.drift_threshold,
            }
        })
        .collect();

    let rebalance_needed = drifts.iter().any(|d| d.flagged);
    let new_allocation = if rebalance_needed {
        redistribute(&drifts)?
    } else {
        warnings.push(format!(
            "No asset drifted by {} or more; allocation unchanged",
            req.drift_threshold
        ));
        req.current_allocation.clone()
    };

    let trades = match req.portfolio_value {
        Some(value) if rebalance_needed => plan_trades(req, &new_allocation, value)?,
        _ => Vec::new(),
    };

    log::debug!(
        "rebalance: {} of {} assets flagged, {} trades",
        drifts.iter().filter(|d| d.flagged).count(),
        drifts.len(),
        trades.len()
    );

    let output = RebalanceResult {
        new_allocation,
        drifts,
        trades,
        rebalance_needed,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Threshold rebalancing: flagged assets share the unflagged remainder pro rata to target",
        &serde_json::json!({
            "drift_threshold": req.drift_threshold.to_string(),
            "force": req.force,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn redistribute(drifts: &[DriftEntry]) -> AdvisorResult<Allocation> {
    let kept: Decimal = drifts.iter().filter(|d| !d.flagged).map(|d| d.current).sum();
    let remainder = Decimal::ONE - kept;
    let flagged: Vec<&DriftEntry> = drifts.iter().filter(|d| d.flagged).collect();
    let flagged_target: Decimal = flagged.iter().map(|d| d.target).sum();

    let mut fractions: BTreeMap<String, Decimal> = drifts
        .iter()
        .filter(|d| !d.flagged)
        .map(|d| (d.symbol.clone(), d.current))
        .collect();

    for d in &flagged {
        let share = if flagged_target.is_zero() {
            remainder / Decimal::from(flagged.len() as u64)
        } else {
            remainder * d.target / flagged_target
        };
        fractions.insert(d.symbol.clone(), share.round_dp(FRACTION_DP).max(Decimal::ZERO));
    }

    // Rounding residue goes to the largest flagged asset.
    let residue = Decimal::ONE - fractions.values().sum::<Decimal>();
    if !residue.is_zero() {
        if let Some(largest) = flagged
            .iter()
            .max_by(|a, b| fractions[&a.symbol].cmp(&fractions[&b.symbol]))
        {
            if let Some(f) = fractions.get_mut(&largest.symbol) {
                *f = (*f + residue).max(Decimal::ZERO);
            }
        }
    }

    fractions.retain(|_, f| !f.is_zero());
    Allocation::new(fractions)
}

fn plan_trades(
    req: &RebalanceRequest,
    new_allocation: &Allocation,
    portfolio_value: Money,
) -> AdvisorResult<Vec<Trade>> {
    let mut sells = Vec::new();
    let mut buys = Vec::new();
    let symbols: BTreeSet<&String> = req
        .current_allocation
        .symbols()
        .chain(new_allocation.symbols())
        .collect();

    for symbol in symbols {
        if symbol == CASH_SYMBOL {
            continue;
        }
        let delta = (new_allocation.get(symbol) - req.current_allocation.get(symbol)) * portfolio_value;
        if delta.abs() < MIN_TRADE_AMOUNT {
            continue;
        }
        let price = req
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| AdvisorError::not_found("Price", symbol.clone()))?;
        if price <= Decimal::ZERO {
            return Err(AdvisorError::invalid_parameter(
                format!("prices.{symbol}"),
                "Price must be positive",
            ));
        }
        let trade = Trade {
            symbol: symbol.clone(),
            side: if delta > Decimal::ZERO { TradeSide::Buy } else { TradeSide::Sell },
            shares: (delta.abs() / price).round_dp(SHARE_DP),
            price,
            amount: delta.abs().round_dp(2),
        };
        match trade.side {
            TradeSide::Sell => sells.push(trade),
            TradeSide::Buy => buys.push(trade),
        }
    }
    sells.extend(buys);
    Ok(sells)
}

fn validate_request(req: &RebalanceRequest) -> AdvisorResult<()> {
    if req.drift_threshold < Decimal::ZERO || req.drift_threshold > Decimal::ONE {
        return Err(AdvisorError::invalid_parameter(
            "drift_threshold",
            format!("Must lie in [0, 1], got {}", req.drift_threshold),
        ));
    }
    if let Some(v) = req.portfolio_value {
        if v < Decimal::ZERO {
            return Err(AdvisorError::invalid_parameter(
                "portfolio_value",
                "Must be non-negative",
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn alloc(pairs: &[(&str, Decimal)]) -> Allocation {
        Allocation::new(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()).unwrap()
    }

    fn request(current: Allocation, target: Allocation) -> RebalanceRequest {
        RebalanceRequest {
            current_allocation: current,
            target_allocation: target,
            drift_threshold: dec!(0.05),
            force: false,
            portfolio_value: None,
            prices: BTreeMap::new(),
        }
    }

    #[test]
    fn test_drift_at_threshold_is_flagged() {
        let req = request(
            alloc(&[("VTI", dec!(0.65)), ("BND", dec!(0.35))]),
            alloc(&[("VTI", dec!(0.6)), ("BND", dec!(0.4))]),
        );
        let out = rebalance(&req).unwrap().result;
        assert!(out.drifts.iter().all(|d| d.flagged));
        assert_eq!(out.new_allocation, req.target_allocation);
    }

    #[test]
    fn test_below_threshold_unchanged() {
        let req = request(
            alloc(&[("VTI", dec!(0.62)), ("BND", dec!(0.38))]),
            alloc(&[("VTI", dec!(0.6)), ("BND", dec!(0.4))]),
        );
        let out = rebalance(&req).unwrap();
        assert!(!out.result.rebalance_needed);
        assert_eq!(out.result.new_allocation, req.current_allocation);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_force_realigns_everything() {
        let mut req = request(
            alloc(&[("VTI", dec!(0.62)), ("BND", dec!(0.38))]),
            alloc(&[("VTI", dec!(0.6)), ("BND", dec!(0.4))]),
        );
        req.force = true;
        let out = rebalance(&req).unwrap().result;
        assert_eq!(out.new_allocation, req.target_allocation);
    }

    #[test]
    fn test_partial_flagging_keeps_unflagged_weight() {
        // VTI drifts 0.10, BND 0.08, CASH 0.02 (kept).
        let req = request(
            alloc(&[("VTI", dec!(0.70)), ("BND", dec!(0.22)), ("CASH", dec!(0.08))]),
            alloc(&[("VTI", dec!(0.60)), ("BND", dec!(0.30)), ("CASH", dec!(0.10))]),
        );
        let out = rebalance(&req).unwrap().result;
        let a = &out.new_allocation;
        assert_eq!(a.get("CASH"), dec!(0.08));
        // 0.92 shared 2:1
        assert!((a.get("VTI") - dec!(0.61333333)).abs() < dec!(0.00000002));
        assert!((a.total() - Decimal::ONE).abs() < dec!(0.000001));
    }

    #[test]
    fn test_new_symbol_in_target() {
        let req = request(
            alloc(&[("VTI", Decimal::ONE)]),
            alloc(&[("VTI", dec!(0.5)), ("BND", dec!(0.5))]),
        );
        let out = rebalance(&req).unwrap().result;
        assert_eq!(out.new_allocation.get("BND"), dec!(0.5));
        assert_eq!(out.new_allocation.get("VTI"), dec!(0.5));
    }

    #[test]
    fn test_symbol_dropped_from_target() {
        let req = request(
            alloc(&[("VTI", dec!(0.5)), ("GSG", dec!(0.5))]),
            alloc(&[("VTI", Decimal::ONE)]),
        );
        let out = rebalance(&req).unwrap().result;
        assert!(!out.new_allocation.contains("GSG"));
        assert_eq!(out.new_allocation.get("VTI"), Decimal::ONE);
    }

    #[test]
    fn test_trades_sells_before_buys() {
        let mut req = request(
            alloc(&[("VTI", dec!(0.70)), ("BND", dec!(0.30))]),
            alloc(&[("VTI", dec!(0.60)), ("BND", dec!(0.40))]),
        );
        req.portfolio_value = Some(dec!(100000));
        req.prices.insert("VTI".into(), dec!(250));
        req.prices.insert("BND".into(), dec!(80));
        let out = rebalance(&req).unwrap().result;
        assert_eq!(out.trades.len(), 2);
        assert_eq!(out.trades[0].side, TradeSide::Sell);
        assert_eq!(out.trades[0].symbol, "VTI");
        assert_eq!(out.trades[0].shares, dec!(40));
        assert_eq!(out.trades[1].side, TradeSide::Buy);
        assert_eq!(out.trades[1].amount, dec!(10000));
        assert_eq!(out.trades[1].shares, dec!(125));
    }

    #[test]
    fn test_missing_price_is_not_found() {
        let mut req = request(
            alloc(&[("VTI", dec!(0.70)), ("BND", dec!(0.30))]),
            alloc(&[("VTI", dec!(0.60)), ("BND", dec!(0.40))]),
        );
        req.portfolio_value = Some(dec!(1000));
        assert!(matches!(
            rebalance(&req).unwrap_err(),
            AdvisorError::NotFound { .. }
        ));
    }

    #[test]
    fn test_invalid_threshold() {
        let mut req = request(
            alloc(&[("VTI", Decimal::ONE)]),
            alloc(&[("VTI", Decimal::ONE)]),
        );
        req.drift_threshold = dec!(1.5);
        assert!(rebalance(&req).is_err());
    }
}
