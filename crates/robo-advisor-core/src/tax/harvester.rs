use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::error::AdvisorError;
use crate::portfolio::{apply_transaction, cost_basis, Portfolio, Transaction, TransactionKind, TransactionRequest};
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::AdvisorResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A holding eligible for review: shares and average purchase price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestCandidate {
    pub symbol: String,
    pub shares: Decimal,
    pub purchase_price: Money,
}

impl HarvestCandidate {
    /// Open positions of a portfolio, priced at average cost from its log.
    pub fn from_portfolio(portfolio: &Portfolio) -> Vec<HarvestCandidate> {
        cost_basis(&portfolio.transactions)
            .into_values()
            .map(|p| HarvestCandidate {
                symbol: p.symbol,
                shares: p.shares,
                purchase_price: p.average_cost,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLossOpportunity {
    pub symbol: String,
    pub shares: Decimal,
    pub purchase_price: Money,
    pub current_price: Money,
    /// shares x (current - purchase); always negative.
    pub potential_loss: Money,
    pub estimated_tax_savings: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxLossReport {
    pub opportunities: Vec<TaxLossOpportunity>,
    pub total_potential_loss: Money,
    /// sum(|potential_loss|) x tax_rate
    pub total_potential_savings: Money,
    pub tax_rate: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestOutcome {
    pub symbol: String,
    pub shares_sold: Decimal,
    pub sale_price: Money,
    /// Negative.
    pub realized_loss: Money,
    pub estimated_tax_savings: Money,
    pub transaction: Transaction,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Scan holdings for unrealized losses.
///
/// Losses smaller in magnitude than `min_loss` are skipped. With `symbol`
/// set only that holding is considered.
pub fn find_opportunities(
    holdings: &[HarvestCandidate],
    prices: &BTreeMap<String, Money>,
    tax_rate: Rate,
    min_loss: Money,
    symbol: Option<&str>,
) -> AdvisorResult<ComputationOutput<TaxLossReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE {
        return Err(AdvisorError::invalid_parameter(
            "tax_rate",
            format!("Must lie in [0, 1], got {tax_rate}"),
        ));
    }
    if let Some(s) = symbol {
        if !holdings.iter().any(|h| h.symbol.eq_ignore_ascii_case(s)) {
            return Err(AdvisorError::not_found("Holding", s));
        }
    }

    let mut opportunities = Vec::new();
    for h in holdings {
        if let Some(s) = symbol {
            if !h.symbol.eq_ignore_ascii_case(s) {
                continue;
            }
        }
        let Some(current_price) = prices.get(&h.symbol).copied() else {
            warnings.push(format!("No current price for {}; skipped", h.symbol));
            continue;
        };
        if current_price >= h.purchase_price || h.shares <= Decimal::ZERO {
            continue;
        }
        let potential_loss = (h.shares * (current_price - h.purchase_price)).round_dp(2);
        if potential_loss.is_zero() || potential_loss.abs() < min_loss {
            continue;
        }
        opportunities.push(TaxLossOpportunity {
            symbol: h.symbol.clone(),
            shares: h.shares,
            purchase_price: h.purchase_price,
            current_price,
            potential_loss,
            estimated_tax_savings: potential_loss.abs() * tax_rate,
        });
    }
    opportunities.sort_by(|a, b| a.potential_loss.cmp(&b.potential_loss));

    let total_potential_loss: Money = opportunities.iter().map(|o| o.potential_loss).sum();
    let total_potential_savings = opportunities
        .iter()
        .map(|o| o.potential_loss.abs())
        .sum::<Money>()
        * tax_rate;

    if !opportunities.is_empty() {
        warnings.push(
            "Repurchasing a harvested security within 30 days may trigger wash-sale rules".into(),
        );
    }

    let output = TaxLossReport {
        opportunities,
        total_potential_loss,
        total_potential_savings,
        tax_rate,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Unrealized loss scan against average cost at a flat tax rate",
        &serde_json::json!({
            "tax_rate": tax_rate.to_string(),
            "min_loss": min_loss.to_string(),
            "wash_sale_modeled": false,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Sell an entire losing position at `price` and record the realized loss.
/// Nothing is repurchased.
pub fn harvest_position(
    portfolio: &mut Portfolio,
    symbol: &str,
    price: Money,
    tax_rate: Rate,
    now: DateTime<Utc>,
) -> AdvisorResult<HarvestOutcome> {
    let symbol = symbol.trim().to_uppercase();
    let held = cost_basis(&portfolio.transactions)
        .remove(&symbol)
        .ok_or_else(|| AdvisorError::not_found("Holding", symbol.clone()))?;
    if price >= held.average_cost {
        return Err(AdvisorError::invalid_parameter(
            "symbol",
            format!(
                "{symbol} trades at {price}, at or above its cost {}; nothing to harvest",
                held.average_cost
            ),
        ));
    }

    let tx = apply_transaction(
        portfolio,
        &TransactionRequest::trade(TransactionKind::Sell, &symbol, held.shares, price)
            .with_note("Tax-loss harvest"),
        now,
    )?;
    let realized_loss = tx.realized_gain.unwrap_or(Decimal::ZERO);

    log::info!(
        "harvested {} {} in portfolio {} for a loss of {}",
        held.shares,
        symbol,
        portfolio.id,
        realized_loss
    );

    Ok(HarvestOutcome {
        symbol,
        shares_sold: held.shares,
        sale_price: price,
        estimated_tax_savings: realized_loss.abs() * tax_rate,
        realized_loss,
        transaction: tx,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn holdings() -> Vec<HarvestCandidate> {
        vec![
            HarvestCandidate { symbol: "VTI".into(), shares: dec!(100), purchase_price: dec!(250) },
            HarvestCandidate { symbol: "BND".into(), shares: dec!(200), purchase_price: dec!(80) },
            HarvestCandidate { symbol: "VXUS".into(), shares: dec!(50), purchase_price: dec!(60) },
        ]
    }

    fn prices() -> BTreeMap<String, Money> {
        [("VTI", dec!(230)), ("BND", dec!(82)), ("VXUS", dec!(59.5))]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn test_only_losses_reported() {
        let out = find_opportunities(&holdings(), &prices(), dec!(0.2), Decimal::ZERO, None).unwrap();
        let r = &out.result;
        assert_eq!(r.opportunities.len(), 2);
        assert_eq!(r.opportunities[0].symbol, "VTI");
        assert_eq!(r.opportunities[0].potential_loss, dec!(-2000));
        assert_eq!(r.opportunities[1].potential_loss, dec!(-25));
        assert_eq!(r.total_potential_loss, dec!(-2025));
        assert_eq!(r.total_potential_savings, dec!(405));
    }

    #[test]
    fn test_min_loss_filters_small_positions() {
        let out = find_opportunities(&holdings(), &prices(), dec!(0.2), dec!(1000), None).unwrap();
        assert_eq!(out.result.opportunities.len(), 1);
    }

    #[test]
    fn test_symbol_filter() {
        let out = find_opportunities(&holdings(), &prices(), dec!(0.2), Decimal::ZERO, Some("vxus")).unwrap();
        assert_eq!(out.result.opportunities.len(), 1);
        assert_eq!(out.result.opportunities[0].symbol, "VXUS");
        let err = find_opportunities(&holdings(), &prices(), dec!(0.2), Decimal::ZERO, Some("GSG")).unwrap_err();
        assert!(matches!(err, AdvisorError::NotFound { .. }));
    }

    #[test]
    fn test_missing_price_warns() {
        let mut px = prices();
        px.remove("VTI");
        let out = find_opportunities(&holdings(), &px, dec!(0.2), Decimal::ZERO, None).unwrap();
        assert_eq!(out.result.opportunities.len(), 1);
        assert!(out.warnings.iter().any(|w| w.contains("VTI")));
    }

    #[test]
    fn test_invalid_tax_rate() {
        assert!(find_opportunities(&holdings(), &prices(), dec!(1.5), Decimal::ZERO, None).is_err());
    }
}
