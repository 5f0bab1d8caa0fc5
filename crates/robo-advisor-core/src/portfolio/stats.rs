use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use super::model::Portfolio;
use crate::math::sharpe_ratio;
use crate::optimizer::{MomentSource, PortfolioMoments};
use crate::types::{with_metadata, ComputationOutput, Money, Rate};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub expected_return: Rate,
    pub volatility: Rate,
    pub sharpe_ratio: Decimal,
    pub max_drawdown: Option<Rate>,
    pub investment_amount: Money,
    pub cash_balance: Money,
    /// sum(value x dividend yield) over holdings with a known yield.
    pub estimated_annual_income: Money,
    pub holdings: usize,
    pub source: MomentSource,
}

/// Summary figures for a revalued portfolio.
pub fn compute_stats(
    portfolio: &Portfolio,
    moments: &PortfolioMoments,
    dividend_yields: &BTreeMap<String, Rate>,
    risk_free_rate: Rate,
) -> ComputationOutput<PortfolioStats> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let mut income = Decimal::ZERO;
    for asset in &portfolio.assets {
        match dividend_yields.get(&asset.symbol) {
            Some(y) => income += asset.value * *y,
            None => warnings.push(format!("No dividend yield for {}", asset.symbol)),
        }
    }
    if let Some(top) = portfolio.assets.iter().max_by(|a, b| a.allocation.cmp(&b.allocation)) {
        if top.allocation > Decimal::new(5, 1) {
            warnings.push(format!("Concentrated position: {} is {} of the portfolio", top.symbol, top.allocation));
        }
    }

    let output = PortfolioStats {
        expected_return: moments.expected_return,
        volatility: moments.volatility,
        sharpe_ratio: sharpe_ratio(moments.expected_return, risk_free_rate, moments.volatility)
            .round_dp(4),
        max_drawdown: moments.max_drawdown,
        investment_amount: portfolio.total_value,
        cash_balance: portfolio.cash_balance,
        estimated_annual_income: income.round_dp(2),
        holdings: portfolio.assets.len(),
        source: moments.source,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    with_metadata(
        "Current allocation moments with dividend income estimate",
        &serde_json::json!({
            "risk_free_rate": risk_free_rate.to_string(),
            "observations": moments.observations,
        }),
        warnings,
        elapsed,
        output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::{apply_transaction, TransactionKind, TransactionRequest};
    use crate::types::{Allocation, RiskLevel};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_income_and_sharpe() {
        let now = Utc::now();
        let mut p = Portfolio {
            id: "p".into(),
            name: None,
            version: 1,
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
        };
        apply_transaction(&mut p, &TransactionRequest::cash(TransactionKind::Deposit, dec!(10000)), now).unwrap();
        apply_transaction(&mut p, &TransactionRequest::trade(TransactionKind::Buy, "VTI", dec!(40), dec!(250)), now).unwrap();

        let moments = PortfolioMoments {
            expected_return: dec!(0.08),
            volatility: dec!(0.15),
            max_drawdown: Some(dec!(0.2)),
            observations: 252,
            source: MomentSource::History,
        };
        let mut yields = BTreeMap::new();
        yields.insert("VTI".to_string(), dec!(0.014));
        let out = compute_stats(&p, &moments, &yields, dec!(0.02));
        assert_eq!(out.result.estimated_annual_income, dec!(140));
        assert_eq!(out.result.sharpe_ratio, dec!(0.4));
        assert_eq!(out.result.investment_amount, dec!(10000));
        assert!(out.warnings.iter().any(|w| w.contains("Concentrated")));
    }
}
