use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::model::{Asset, Portfolio, Transaction, TransactionKind};
use crate::error::AdvisorError;
use crate::types::{Money, CASH_SYMBOL};
use crate::AdvisorResult;

/// Spending up to half a cent beyond the cash balance is rounding, not
/// overdraft.
const CASH_TOLERANCE: Decimal = dec!(0.005);
const FRACTION_DP: u32 = 8;

/// A request to record one transaction against a portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub shares: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Money>,
    /// Cash amount for deposits, withdrawals and dividends. Defaults to
    /// shares x price when omitted.
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub note: Option<String>,
}

impl TransactionRequest {
    pub fn trade(kind: TransactionKind, symbol: &str, shares: Decimal, price: Money) -> Self {
        Self {
            kind,
            symbol: Some(symbol.to_string()),
            shares: Some(shares),
            price: Some(price),
            amount: None,
            note: None,
        }
    }

    pub fn cash(kind: TransactionKind, amount: Money) -> Self {
        Self {
            kind,
            symbol: None,
            shares: None,
            price: None,
            amount: Some(amount),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Shares held and average cost per share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub shares: Decimal,
    pub average_cost: Money,
}

/// Replay buys and sells into open positions. Sells leave the average
/// cost of the remaining shares unchanged.
pub fn cost_basis(transactions: &[Transaction]) -> BTreeMap<String, Position> {
    let mut positions: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();
    for tx in transactions {
        let (Some(symbol), Some(shares), Some(price)) = (&tx.symbol, tx.shares, tx.price) else {
            continue;
        };
        match tx.kind {
            TransactionKind::Buy => {
                let entry = positions.entry(symbol.clone()).or_insert((Decimal::ZERO, Decimal::ZERO));
                entry.0 += shares;
                entry.1 += shares * price;
            }
            TransactionKind::Sell => {
                if let Some(entry) = positions.get_mut(symbol) {
                    if !entry.0.is_zero() {
                        let avg = entry.1 / entry.0;
                        entry.0 -= shares;
                        entry.1 -= shares * avg;
                    }
                    if entry.0 <= Decimal::ZERO {
                        positions.remove(symbol);
                    }
                }
            }
            _ => {}
        }
    }
    positions
        .into_iter()
        .map(|(symbol, (shares, cost))| {
            let average_cost = if shares.is_zero() { Decimal::ZERO } else { cost / shares };
            (
                symbol.clone(),
                Position {
                    symbol,
                    shares,
                    average_cost: average_cost.round_dp(6),
                },
            )
        })
        .collect()
}

/// Validate and record a transaction, updating cash, holdings and values.
/// Holdings are rebuilt from the log so cost basis always matches it.
pub fn apply_transaction(
    portfolio: &mut Portfolio,
    req: &TransactionRequest,
    now: DateTime<Utc>,
) -> AdvisorResult<Transaction> {
    let mut tx = Transaction {
        id: Uuid::new_v4().to_string(),
        kind: req.kind,
        symbol: None,
        shares: None,
        price: None,
        amount: Decimal::ZERO,
        realized_gain: None,
        timestamp: now,
        note: req.note.clone(),
    };

    match req.kind {
        TransactionKind::Deposit => {
            tx.amount = cash_amount(req)?;
            portfolio.cash_balance += tx.amount;
        }
        TransactionKind::Withdrawal => {
            tx.amount = cash_amount(req)?;
            if tx.amount > portfolio.cash_balance + CASH_TOLERANCE {
                return Err(AdvisorError::invalid_parameter(
                    "amount",
                    format!(
                        "Withdrawal of {} exceeds cash balance {}",
                        tx.amount, portfolio.cash_balance
                    ),
                ));
            }
            portfolio.cash_balance = (portfolio.cash_balance - tx.amount).max(Decimal::ZERO);
        }
        TransactionKind::Dividend => {
            tx.symbol = Some(trade_symbol(req)?);
            tx.amount = cash_amount(req)?;
            portfolio.cash_balance += tx.amount;
        }
        TransactionKind::Buy => {
            let (symbol, shares, price) = trade_fields(req)?;
            let cost = (shares * price).round_dp(2);
            if cost > portfolio.cash_balance + CASH_TOLERANCE {
                return Err(AdvisorError::invalid_parameter(
                    "shares",
                    format!(
                        "Buying {shares} {symbol} costs {cost}, cash balance is {}",
                        portfolio.cash_balance
                    ),
                ));
            }
            portfolio.cash_balance = (portfolio.cash_balance - cost).max(Decimal::ZERO);
            set_price(portfolio, &symbol, price);
            tx.symbol = Some(symbol);
            tx.shares = Some(shares);
            tx.price = Some(price);
            tx.amount = cost;
        }
        TransactionKind::Sell => {
            let (symbol, shares, price) = trade_fields(req)?;
            let basis = cost_basis(&portfolio.transactions);
            let held = basis.get(&symbol).ok_or_else(|| {
                AdvisorError::invalid_parameter("symbol", format!("{symbol} is not held"))
            })?;
            if shares > held.shares {
                return Err(AdvisorError::invalid_parameter(
                    "shares",
                    format!("Selling {shares} {symbol}, only {} held", held.shares),
                ));
            }
            let proceeds = (shares * price).round_dp(2);
            let cost = (shares * held.average_cost).round_dp(2);
            portfolio.cash_balance += proceeds;
            set_price(portfolio, &symbol, price);
            tx.realized_gain = Some(proceeds - cost);
            tx.symbol = Some(symbol);
            tx.shares = Some(shares);
            tx.price = Some(price);
            tx.amount = proceeds;
        }
    }

    portfolio.transactions.push(tx.clone());
    rebuild_holdings(portfolio);
    revalue(portfolio, &BTreeMap::new());
    portfolio.updated_at = now;
    Ok(tx)
}

/// Mark holdings to the given prices (others keep their last price) and
/// recompute values, total and per-asset fractions so that
/// `sum(value) + cash == total_value`.
pub fn revalue(portfolio: &mut Portfolio, prices: &BTreeMap<String, Money>) {
    for asset in portfolio.assets.iter_mut() {
        if let Some(p) = prices.get(&asset.symbol) {
            asset.price = *p;
        }
        asset.value = (asset.shares * asset.price).round_dp(2);
    }
    portfolio.total_value = portfolio.computed_total();
    let total = portfolio.total_value;
    for asset in portfolio.assets.iter_mut() {
        asset.allocation = if total > Decimal::ZERO {
            (asset.value / total).round_dp(FRACTION_DP)
        } else {
            Decimal::ZERO
        };
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rebuild_holdings(portfolio: &mut Portfolio) {
    let basis = cost_basis(&portfolio.transactions);
    let prices: BTreeMap<String, Money> = portfolio
        .assets
        .iter()
        .map(|a| (a.symbol.clone(), a.price))
        .collect();
    portfolio.assets = basis
        .into_values()
        .map(|p| Asset {
            price: prices.get(&p.symbol).copied().unwrap_or(p.average_cost),
            symbol: p.symbol,
            shares: p.shares,
            value: Decimal::ZERO,
            allocation: Decimal::ZERO,
            average_cost: p.average_cost,
        })
        .collect();
}

fn set_price(portfolio: &mut Portfolio, symbol: &str, price: Money) {
    match portfolio.assets.iter_mut().find(|a| a.symbol == symbol) {
        Some(asset) => asset.price = price,
        None => portfolio.assets.push(Asset {
            symbol: symbol.to_string(),
            shares: Decimal::ZERO,
            price,
            value: Decimal::ZERO,
            allocation: Decimal::ZERO,
            average_cost: price,
        }),
    }
}

fn trade_symbol(req: &TransactionRequest) -> AdvisorResult<String> {
    let symbol = req
        .symbol
        .as_deref()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AdvisorError::validation("symbol", "Required for this transaction type"))?;
    if symbol == CASH_SYMBOL {
        return Err(AdvisorError::validation("symbol", "CASH cannot be traded"));
    }
    Ok(symbol)
}

fn trade_fields(req: &TransactionRequest) -> AdvisorResult<(String, Decimal, Money)> {
    let symbol = trade_symbol(req)?;
    let shares = req
        .shares
        .filter(|s| *s > Decimal::ZERO)
        .ok_or_else(|| AdvisorError::validation("shares", "Must be positive"))?;
    let price = req
        .price
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| AdvisorError::validation("price", "Must be positive"))?;
    Ok((symbol, shares, price))
}

fn cash_amount(req: &TransactionRequest) -> AdvisorResult<Money> {
    let amount = match (req.amount, req.shares, req.price) {
        (Some(a), _, _) => a,
        (None, Some(s), Some(p)) => (s * p).round_dp(2),
        _ => {
            return Err(AdvisorError::validation(
                "amount",
                "Required for this transaction type",
            ))
        }
    };
    if amount <= Decimal::ZERO {
        return Err(AdvisorError::validation("amount", "Must be positive"));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Allocation, RiskLevel};

    fn empty() -> Portfolio {
        let now = Utc::now();
        Portfolio {
            id: "p".into(),
            name: None,
            version: 0,
            risk_level: RiskLevel::Moderate,
            investment_goals: vec![],
            target_allocation: Allocation::from_weights([("VTI", Decimal::ONE)]).unwrap(),
            total_value: Decimal::ZERO,
            cash_balance: Decimal::ZERO,
            assets: vec![],
            transactions: vec![],
            created_at: now,
            updated_at: now,
            last_rebalanced: None,
        }
    }

    fn funded(cash: Money) -> Portfolio {
        let mut p = empty();
        apply_transaction(&mut p, &TransactionRequest::cash(TransactionKind::Deposit, cash), Utc::now())
            .unwrap();
        p
    }

    #[test]
    fn test_deposit_and_buy() {
        let mut p = funded(dec!(10000));
        let tx = apply_transaction(
            &mut p,
            &TransactionRequest::trade(TransactionKind::Buy, "vti", dec!(20), dec!(250)),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(tx.amount, dec!(5000));
        assert_eq!(p.cash_balance, dec!(5000));
        assert_eq!(p.total_value, dec!(10000));
        let a = p.asset("VTI").unwrap();
        assert_eq!(a.shares, dec!(20));
        assert_eq!(a.allocation, dec!(0.5));
        assert_eq!(p.transactions.len(), 2);
    }

    #[test]
    fn test_average_cost_and_realized_gain() {
        let mut p = funded(dec!(10000));
        let now = Utc::now();
        apply_transaction(&mut p, &TransactionRequest::trade(TransactionKind::Buy, "VTI", dec!(10), dec!(100)), now).unwrap();
        apply_transaction(&mut p, &TransactionRequest::trade(TransactionKind::Buy, "VTI", dec!(10), dec!(200)), now).unwrap();
        assert_eq!(p.asset("VTI").unwrap().average_cost, dec!(150));

        let tx = apply_transaction(&mut p, &TransactionRequest::trade(TransactionKind::Sell, "VTI", dec!(5), dec!(120)), now).unwrap();
        assert_eq!(tx.realized_gain, Some(dec!(-150)));
        let a = p.asset("VTI").unwrap();
        assert_eq!(a.shares, dec!(15));
        assert_eq!(a.average_cost, dec!(150));
        assert_eq!(a.price, dec!(120));
        assert_eq!(p.total_value, p.computed_total());
    }

    #[test]
    fn test_sell_all_removes_holding() {
        let mut p = funded(dec!(1000));
        let now = Utc::now();
        apply_transaction(&mut p, &TransactionRequest::trade(TransactionKind::Buy, "BND", dec!(10), dec!(80)), now).unwrap();
        apply_transaction(&mut p, &TransactionRequest::trade(TransactionKind::Sell, "BND", dec!(10), dec!(80)), now).unwrap();
        assert!(p.asset("BND").is_none());
        assert_eq!(p.cash_balance, dec!(1000));
    }

    #[test]
    fn test_overspend_and_oversell_rejected() {
        let mut p = funded(dec!(100));
        let now = Utc::now();
        let err = apply_transaction(&mut p, &TransactionRequest::trade(TransactionKind::Buy, "VTI", dec!(1), dec!(250)), now).unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidParameter { .. }));
        let err = apply_transaction(&mut p, &TransactionRequest::trade(TransactionKind::Sell, "VTI", dec!(1), dec!(250)), now).unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidParameter { .. }));
        let err = apply_transaction(&mut p, &TransactionRequest::cash(TransactionKind::Withdrawal, dec!(101)), now).unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidParameter { .. }));
        // Failed requests leave no trace in the log.
        assert_eq!(p.transactions.len(), 1);
    }

    #[test]
    fn test_dividend_and_withdrawal() {
        let mut p = funded(dec!(1000));
        let now = Utc::now();
        let mut div = TransactionRequest::cash(TransactionKind::Dividend, dec!(12.5));
        div.symbol = Some("VTI".into());
        apply_transaction(&mut p, &div, now).unwrap();
        apply_transaction(&mut p, &TransactionRequest::cash(TransactionKind::Withdrawal, dec!(500)), now).unwrap();
        assert_eq!(p.cash_balance, dec!(512.5));
        assert_eq!(p.total_value, dec!(512.5));
    }

    #[test]
    fn test_validation_errors() {
        let mut p = funded(dec!(1000));
        let now = Utc::now();
        let no_symbol = TransactionRequest::cash(TransactionKind::Dividend, dec!(1));
        assert!(matches!(
            apply_transaction(&mut p, &no_symbol, now).unwrap_err(),
            AdvisorError::Validation { .. }
        ));
        let cash_buy = TransactionRequest::trade(TransactionKind::Buy, "cash", dec!(1), dec!(1));
        assert!(apply_transaction(&mut p, &cash_buy, now).is_err());
        let zero = TransactionRequest::cash(TransactionKind::Deposit, Decimal::ZERO);
        assert!(apply_transaction(&mut p, &zero, now).is_err());
    }

    #[test]
    fn test_revalue_keeps_total_invariant() {
        let mut p = funded(dec!(1000));
        apply_transaction(&mut p, &TransactionRequest::trade(TransactionKind::Buy, "VTI", dec!(3), dec!(100)), Utc::now()).unwrap();
        let mut prices = BTreeMap::new();
        prices.insert("VTI".to_string(), dec!(90.333));
        revalue(&mut p, &prices);
        assert_eq!(p.asset("VTI").unwrap().value, dec!(271.00));
        assert_eq!(p.total_value, dec!(971.00));
    }
}
