use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Allocation, InvestmentGoal, Money, Rate, RiskLevel, CASH_SYMBOL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Buy,
    Sell,
    Dividend,
    Deposit,
    Withdrawal,
}

/// An entry in a portfolio's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    /// Cash moved by the transaction, always positive.
    pub amount: Money,
    /// Sells only: proceeds minus average cost of the shares sold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_gain: Option<Money>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A holding valued at its last known price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub shares: Decimal,
    pub price: Money,
    pub value: Money,
    /// value / portfolio total_value
    pub allocation: Rate,
    /// Average cost per share from the transaction log.
    pub average_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Bumped by the store on every successful update.
    pub version: u64,
    pub risk_level: RiskLevel,
    pub investment_goals: Vec<InvestmentGoal>,
    pub target_allocation: Allocation,
    pub total_value: Money,
    pub cash_balance: Money,
    pub assets: Vec<Asset>,
    pub transactions: Vec<Transaction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_rebalanced: Option<DateTime<Utc>>,
}

impl Portfolio {
    pub fn asset(&self, symbol: &str) -> Option<&Asset> {
        self.assets
            .iter()
            .find(|a| a.symbol.eq_ignore_ascii_case(symbol.trim()))
    }

    pub fn held_symbols(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.symbol.clone()).collect()
    }

    /// Actual weights including the cash sleeve. An empty portfolio reports
    /// its target.
    pub fn current_allocation(&self) -> Allocation {
        if self.total_value <= Decimal::ZERO {
            return self.target_allocation.clone();
        }
        let weights = self
            .assets
            .iter()
            .map(|a| (a.symbol.clone(), a.value))
            .chain(std::iter::once((CASH_SYMBOL.to_string(), self.cash_balance)));
        Allocation::from_weights(weights).unwrap_or_else(|_| self.target_allocation.clone())
    }

    /// Invested value plus cash, recomputed from holdings.
    pub fn computed_total(&self) -> Money {
        self.assets.iter().map(|a| a.value).sum::<Money>() + self.cash_balance
    }
}
