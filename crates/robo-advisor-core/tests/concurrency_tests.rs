#![cfg(feature = "monte_carlo")]

use chrono::NaiveDate;
use robo_advisor_core::market_data::SyntheticMarketData;
use robo_advisor_core::portfolio::{
    CreatePortfolioRequest, Portfolio, TransactionKind, TransactionRequest,
};
use robo_advisor_core::risk_profile::recommended_allocation;
use robo_advisor_core::storage::{InMemoryPortfolioRepository, JsonFileRepository, PortfolioRepository};
use robo_advisor_core::{AdvisorError, Engine, EngineConfig, InvestmentGoal, RiskLevel};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;

fn market() -> Arc<SyntheticMarketData> {
    let end = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
    Arc::new(SyntheticMarketData::default_universe(3, end, 2).unwrap())
}

fn moderate(initial: Decimal) -> CreatePortfolioRequest {
    CreatePortfolioRequest {
        name: Some("shared".into()),
        risk_level: RiskLevel::Moderate,
        investment_goals: vec![InvestmentGoal::WealthGrowth],
        recommended_allocation: recommended_allocation(RiskLevel::Moderate),
        initial_investment: Some(initial),
        optimize: false,
    }
}

fn assert_accounted(p: &Portfolio) {
    let invested: Decimal = p.assets.iter().map(|a| a.value).sum();
    assert_eq!(invested + p.cash_balance, p.total_value);
}

#[test]
fn test_parallel_deposits_are_not_lost() {
    let engine = Arc::new(
        Engine::new(
            EngineConfig::default(),
            Arc::new(InMemoryPortfolioRepository::new()),
            market(),
        )
        .unwrap(),
    );
    let created = engine.create_portfolio(&moderate(dec!(10000))).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let id = created.id.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    engine
                        .record_transaction(
                            &id,
                            &TransactionRequest::cash(TransactionKind::Deposit, dec!(10)),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let p = engine.get_portfolio(&created.id).unwrap();
    assert_eq!(p.cash_balance, created.cash_balance + dec!(400));
    assert_eq!(p.version, created.version + 40);
    assert_eq!(p.transactions.len(), created.transactions.len() + 40);
    assert_accounted(&p);
}

#[test]
fn test_parallel_buys_never_overspend() {
    let engine = Arc::new(
        Engine::new(
            EngineConfig::default(),
            Arc::new(InMemoryPortfolioRepository::new()),
            market(),
        )
        .unwrap(),
    );
    let created = engine.create_portfolio(&moderate(dec!(10000))).unwrap();
    let price = dec!(1);
    let shares = (created.cash_balance / dec!(3)).round_dp(2);

    // Only three of the eight buys fit in the cash balance.
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let id = created.id.clone();
            thread::spawn(move || {
                engine
                    .record_transaction(
                        &id,
                        &TransactionRequest::trade(TransactionKind::Buy, "VTI", shares, price),
                    )
                    .is_ok()
            })
        })
        .collect();
    let accepted = handles.into_iter().filter_map(|h| h.join().ok()).filter(|ok| *ok).count();

    let p = engine.get_portfolio(&created.id).unwrap();
    assert!(accepted <= 3);
    assert!(p.cash_balance >= Decimal::ZERO);
    assert_eq!(p.version, created.version + accepted as u64);
    assert_accounted(&p);
}

#[test]
fn test_engines_sharing_a_store_see_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let open = || {
        Engine::new(
            EngineConfig::default(),
            Arc::new(JsonFileRepository::open(dir.path()).unwrap()),
            market(),
        )
        .unwrap()
    };
    let a = open();
    let b = open();

    let created = a.create_portfolio(&moderate(dec!(5000))).unwrap();
    b.record_transaction(
        &created.id,
        &TransactionRequest::cash(TransactionKind::Deposit, dec!(250)),
    )
    .unwrap();
    a.record_transaction(
        &created.id,
        &TransactionRequest::cash(TransactionKind::Withdrawal, dec!(100)),
    )
    .unwrap();

    let seen_by_b = b.get_portfolio(&created.id).unwrap();
    assert_eq!(seen_by_b.version, 3);
    assert_eq!(seen_by_b.cash_balance, created.cash_balance + dec!(150));
    assert_eq!(a.list_portfolios().unwrap().len(), 1);
}

#[test]
fn test_stale_update_is_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let repo = JsonFileRepository::open(dir.path()).unwrap();
    let engine = Engine::new(
        EngineConfig::default(),
        Arc::new(JsonFileRepository::open(dir.path()).unwrap()),
        market(),
    )
    .unwrap();
    let created = engine.create_portfolio(&moderate(dec!(1000))).unwrap();

    let stale = repo.get(&created.id).unwrap();
    repo.update(stale.clone(), stale.version).unwrap();
    let err = repo.update(stale.clone(), stale.version).unwrap_err();
    assert!(matches!(err, AdvisorError::Conflict { expected: 1, found: 2, .. }));
}
