use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ledger::{apply_transaction, revalue, TransactionRequest};
use super::model::{Portfolio, TransactionKind};
use crate::error::AdvisorError;
use crate::risk_profile::AssetClassAllocation;
use crate::types::{Allocation, InvestmentGoal, Money, RiskLevel, CASH_SYMBOL};
use crate::AdvisorResult;

/// Default fund universe behind each asset class, with in-class weights.
pub const STOCK_FUNDS: [(&str, Decimal); 2] = [("VTI", dec!(0.60)), ("VXUS", dec!(0.40))];
pub const BOND_FUNDS: [(&str, Decimal); 2] = [("BND", dec!(0.70)), ("BNDX", dec!(0.30))];

const SHARE_DP: u32 = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePortfolioRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub risk_level: RiskLevel,
    pub investment_goals: Vec<InvestmentGoal>,
    pub recommended_allocation: AssetClassAllocation,
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub initial_investment: Option<Money>,
    /// Pick fund weights from the efficient frontier instead of the fixed split.
    #[serde(default)]
    pub optimize: bool,
}

/// Spread a stock/bond/cash split over the default fund universe.
pub fn etf_allocation(classes: &AssetClassAllocation) -> AdvisorResult<Allocation> {
    let mut fractions: BTreeMap<String, Decimal> = BTreeMap::new();
    for (symbol, w) in STOCK_FUNDS {
        fractions.insert(symbol.to_string(), classes.stocks * w);
    }
    for (symbol, w) in BOND_FUNDS {
        fractions.insert(symbol.to_string(), classes.bonds * w);
    }
    fractions.insert(CASH_SYMBOL.to_string(), classes.cash);
    fractions.retain(|_, f| !f.is_zero());
    Allocation::new(fractions)
}

/// Fund a new portfolio: one deposit, then buys towards `target` at
/// `prices`. Share counts round down so the buys never exceed the deposit;
/// the remainder stays in cash.
pub fn build_portfolio(
    id: String,
    req: &CreatePortfolioRequest,
    target: Allocation,
    initial_investment: Money,
    prices: &BTreeMap<String, Money>,
    now: DateTime<Utc>,
) -> AdvisorResult<Portfolio> {
    if initial_investment < Decimal::ZERO {
        return Err(AdvisorError::invalid_parameter(
            "initial_investment",
            "Must be non-negative",
        ));
    }
    if req.investment_goals.is_empty() {
        return Err(AdvisorError::validation(
            "investment_goals",
            "At least one goal is required",
        ));
    }
    let total = req.recommended_allocation.total();
    if (total - Decimal::ONE).abs() > crate::types::ALLOCATION_TOLERANCE {
        return Err(AdvisorError::invalid_parameter(
            "recommended_allocation",
            format!("Fractions sum to {total}, expected 1.0"),
        ));
    }

    let mut portfolio = Portfolio {
        id,
        name: req.name.clone(),
        version: 0,
        risk_level: req.risk_level,
        investment_goals: req.investment_goals.clone(),
        target_allocation: target.clone(),
        total_value: Decimal::ZERO,
        cash_balance: Decimal::ZERO,
        assets: Vec::new(),
        transactions: Vec::new(),
        created_at: now,
        updated_at: now,
        last_rebalanced: None,
    };

    if initial_investment.is_zero() {
        return Ok(portfolio);
    }

    apply_transaction(
        &mut portfolio,
        &TransactionRequest::cash(TransactionKind::Deposit, initial_investment)
            .with_note("Initial investment"),
        now,
    )?;

    for symbol in target.invested_symbols() {
        let price = prices
            .get(&symbol)
            .copied()
            .ok_or_else(|| AdvisorError::not_found("Price", symbol.clone()))?;
        if price <= Decimal::ZERO {
            return Err(AdvisorError::invalid_parameter(
                format!("prices.{symbol}"),
                "Price must be positive",
            ));
        }
        let budget = initial_investment * target.get(&symbol);
        let shares = (budget / price).round_dp_with_strategy(SHARE_DP, RoundingStrategy::ToZero);
        if shares.is_zero() {
            continue;
        }
        apply_transaction(
            &mut portfolio,
            &TransactionRequest::trade(TransactionKind::Buy, &symbol, shares, price)
                .with_note("Initial allocation"),
            now,
        )?;
    }

    revalue(&mut portfolio, prices);
    log::info!(
        "built portfolio {} ({}) with {} holdings",
        portfolio.id,
        portfolio.risk_level,
        portfolio.assets.len()
    );
    Ok(portfolio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk_profile::recommended_allocation;

    fn prices() -> BTreeMap<String, Money> {
        [("VTI", dec!(250)), ("VXUS", dec!(60)), ("BND", dec!(72)), ("BNDX", dec!(49))]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    fn request() -> CreatePortfolioRequest {
        CreatePortfolioRequest {
            name: Some("Core".into()),
            risk_level: RiskLevel::Moderate,
            investment_goals: vec![InvestmentGoal::WealthGrowth],
            recommended_allocation: recommended_allocation(RiskLevel::Moderate),
            initial_investment: None,
            optimize: false,
        }
    }

    #[test]
    fn test_etf_split() {
        let a = etf_allocation(&recommended_allocation(RiskLevel::Moderate)).unwrap();
        assert_eq!(a.get("VTI"), dec!(0.36));
        assert_eq!(a.get("VXUS"), dec!(0.24));
        assert_eq!(a.get("BND"), dec!(0.21));
        assert_eq!(a.get("BNDX"), dec!(0.09));
        assert_eq!(a.get("CASH"), dec!(0.10));
        assert_eq!(a.total(), Decimal::ONE);
    }

    #[test]
    fn test_build_invests_and_keeps_invariant() {
        let req = request();
        let target = etf_allocation(&req.recommended_allocation).unwrap();
        let p = build_portfolio("id".into(), &req, target, dec!(100000), &prices(), Utc::now()).unwrap();
        assert_eq!(p.assets.len(), 4);
        assert_eq!(p.total_value, p.computed_total());
        assert!((p.total_value - dec!(100000)).abs() < dec!(0.05));
        assert!(p.cash_balance >= dec!(10000));
        assert_eq!(p.transactions[0].kind, TransactionKind::Deposit);
        assert_eq!(p.transactions.len(), 5);
        let alloc_sum: Decimal = p.assets.iter().map(|a| a.allocation).sum::<Decimal>()
            + p.cash_balance / p.total_value;
        assert!((alloc_sum - Decimal::ONE).abs() < dec!(0.000001));
    }

    #[test]
    fn test_missing_price() {
        let req = request();
        let target = etf_allocation(&req.recommended_allocation).unwrap();
        let mut px = prices();
        px.remove("BNDX");
        let err = build_portfolio("id".into(), &req, target, dec!(1000), &px, Utc::now()).unwrap_err();
        assert!(matches!(err, AdvisorError::NotFound { .. }));
    }

    #[test]
    fn test_zero_investment_is_empty() {
        let req = request();
        let target = etf_allocation(&req.recommended_allocation).unwrap();
        let p = build_portfolio("id".into(), &req, target, Decimal::ZERO, &prices(), Utc::now()).unwrap();
        assert!(p.transactions.is_empty());
        assert_eq!(p.current_allocation(), p.target_allocation);
    }
}
