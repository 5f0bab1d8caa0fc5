use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use robo_advisor_core::engine::{BacktestRequest, SimulateRequest};
use robo_advisor_core::portfolio::CreatePortfolioRequest;
use robo_advisor_core::rebalance::{rebalance, RebalanceRequest, TradeSide};
use robo_advisor_core::risk_profile::RiskQuestionnaire;
use robo_advisor_core::simulation::{simulate_forward, ForwardParams, SimulationMode};
use robo_advisor_core::storage::InMemoryPortfolioRepository;
use robo_advisor_core::{
    Allocation, Engine, EngineConfig, InvestmentGoal, RiskLevel, ALLOCATION_TOLERANCE,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;

fn allocation(pairs: &[(&str, Decimal)]) -> Allocation {
    Allocation::new(pairs.iter().map(|(s, w)| (s.to_string(), *w)).collect()).unwrap()
}

fn forward(seed: u64) -> ForwardParams {
    ForwardParams {
        time_horizon: 5,
        initial_investment: dec!(100000),
        monthly_contribution: dec!(1000),
        expected_return: dec!(0.07),
        volatility: dec!(0.15),
        benchmark_return: dec!(0.07),
        mode: SimulationMode::MonteCarlo,
        num_paths: 200,
        seed: Some(seed),
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
    }
}

#[cfg(feature = "monte_carlo")]
fn engine() -> Engine {
    use robo_advisor_core::market_data::SyntheticMarketData;
    let end = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
    Engine::new(
        EngineConfig::default(),
        Arc::new(InMemoryPortfolioRepository::new()),
        Arc::new(SyntheticMarketData::default_universe(11, end, 5).unwrap()),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Risk assessment
// ---------------------------------------------------------------------------

#[test]
fn test_moderate_profile_scenario() {
    let engine = Engine::new(
        EngineConfig::default(),
        Arc::new(InMemoryPortfolioRepository::new()),
        Arc::new(robo_advisor_core::market_data::InMemoryMarketData::new()),
    )
    .unwrap();
    let out = engine
        .assess_risk(&RiskQuestionnaire {
            age: 30,
            income: dec!(100000),
            investment_horizon: 20,
            risk_tolerance: 5,
            investment_goals: vec![InvestmentGoal::WealthGrowth, InvestmentGoal::IncomeGeneration],
        })
        .unwrap();
    assert_eq!(out.result.risk_level, RiskLevel::Moderate);
    let total = out.result.recommended_allocation.total();
    assert!((total - Decimal::ONE).abs() <= ALLOCATION_TOLERANCE);
    assert_eq!(out.result.investment_goals.len(), 2);
}

#[test]
fn test_questionnaire_json_uses_goal_aliases() {
    let q: RiskQuestionnaire = serde_json::from_str(
        r#"{"age": 45, "income": "85000", "investment_horizon": 10,
            "risk_tolerance": 3, "investment_goals": ["growth", "income"]}"#,
    )
    .unwrap();
    assert_eq!(
        q.investment_goals,
        vec![InvestmentGoal::WealthGrowth, InvestmentGoal::IncomeGeneration]
    );
}

// ---------------------------------------------------------------------------
// Rebalancing
// ---------------------------------------------------------------------------

#[test]
fn test_rebalance_at_threshold_scenario() {
    let req = RebalanceRequest {
        current_allocation: allocation(&[("VTI", dec!(0.65)), ("BND", dec!(0.35))]),
        target_allocation: allocation(&[("VTI", dec!(0.6)), ("BND", dec!(0.4))]),
        drift_threshold: dec!(0.05),
        force: false,
        portfolio_value: Some(dec!(10000)),
        prices: BTreeMap::from([("VTI".to_string(), dec!(250)), ("BND".to_string(), dec!(72))]),
    };
    let out = rebalance(&req).unwrap();
    assert!(out.result.drifts.iter().all(|d| d.flagged));
    assert_eq!(out.result.new_allocation, req.target_allocation);
    let sides: Vec<TradeSide> = out.result.trades.iter().map(|t| t.side).collect();
    assert_eq!(sides, vec![TradeSide::Sell, TradeSide::Buy]);
    assert_eq!(out.result.trades[0].amount, dec!(500));
}

#[test]
fn test_rebalance_below_threshold_keeps_current() {
    let current = allocation(&[("VTI", dec!(0.62)), ("BND", dec!(0.38))]);
    let req = RebalanceRequest {
        current_allocation: current.clone(),
        target_allocation: allocation(&[("VTI", dec!(0.6)), ("BND", dec!(0.4))]),
        drift_threshold: dec!(0.05),
        force: false,
        portfolio_value: Some(dec!(10000)),
        prices: BTreeMap::new(),
    };
    let out = rebalance(&req).unwrap();
    assert!(!out.result.rebalance_needed);
    assert_eq!(out.result.new_allocation, current);
    assert!(out.result.trades.is_empty());
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[cfg(feature = "monte_carlo")]
#[test]
fn test_seeded_simulation_is_reproducible() {
    let a = simulate_forward(&forward(42)).unwrap();
    let b = simulate_forward(&forward(42)).unwrap();
    assert_eq!(a.result.simulation_results, b.result.simulation_results);
    assert_eq!(a.result.simulation_results.len(), 60);
    assert_eq!(a.result.seed, Some(42));
}

#[cfg(feature = "monte_carlo")]
#[test]
fn test_different_seeds_differ() {
    let a = simulate_forward(&forward(1)).unwrap();
    let b = simulate_forward(&forward(2)).unwrap();
    assert_ne!(a.result.final_value, b.result.final_value);
}

#[test]
fn test_deterministic_projection_with_contributions() {
    let mut params = forward(0);
    params.mode = SimulationMode::Deterministic;
    params.expected_return = Decimal::ZERO;
    let out = simulate_forward(&params).unwrap();
    assert_eq!(out.result.final_value, dec!(160000));
    assert_eq!(out.result.total_contributions, dec!(160000));
}

// ---------------------------------------------------------------------------
// End-to-end through the engine
// ---------------------------------------------------------------------------

#[cfg(feature = "monte_carlo")]
#[test]
fn test_assess_create_simulate_backtest() {
    let engine = engine();
    let assessment = engine
        .assess_risk(&RiskQuestionnaire {
            age: 35,
            income: dec!(120000),
            investment_horizon: 25,
            risk_tolerance: 7,
            investment_goals: vec![InvestmentGoal::Retirement],
        })
        .unwrap()
        .result;

    let portfolio = engine
        .create_portfolio(&CreatePortfolioRequest {
            name: None,
            risk_level: assessment.risk_level,
            investment_goals: assessment.investment_goals.clone(),
            recommended_allocation: assessment.recommended_allocation,
            initial_investment: Some(dec!(50000)),
            optimize: false,
        })
        .unwrap();
    assert_eq!(portfolio.total_value, dec!(50000));
    assert_eq!(portfolio.risk_level, assessment.risk_level);

    let sim = engine
        .simulate(
            &portfolio.id,
            &SimulateRequest {
                time_horizon: 3,
                initial_investment: None,
                monthly_contribution: dec!(500),
                allocation: None,
                expected_return: None,
                volatility: None,
                mode: SimulationMode::MonteCarlo,
                num_paths: Some(100),
                seed: Some(9),
                start_date: NaiveDate::from_ymd_opt(2024, 7, 1),
            },
        )
        .unwrap();
    assert_eq!(sim.result.simulation_results.len(), 36);
    for point in &sim.result.simulation_results {
        let (p10, p90) = (point.p10.unwrap(), point.p90.unwrap());
        assert!(p10 <= point.portfolio_value && point.portfolio_value <= p90);
    }

    let bt = engine
        .backtest(
            &portfolio.id,
            &BacktestRequest {
                allocation: None,
                time_horizon: 2,
                initial_investment: Some(dec!(10000)),
                monthly_contribution: Decimal::ZERO,
            },
        )
        .unwrap();
    assert!(!bt.result.backtest_results.is_empty());
    assert_eq!(bt.result.total_contributions, dec!(10000));
    assert_eq!(
        bt.result.backtest_results.last().unwrap().portfolio_value,
        bt.result.final_value
    );
}

#[cfg(feature = "monte_carlo")]
#[test]
fn test_backtest_rejects_bad_allocation_override() {
    let engine = engine();
    let p = engine
        .create_portfolio(&CreatePortfolioRequest {
            name: None,
            risk_level: RiskLevel::Moderate,
            investment_goals: vec![InvestmentGoal::WealthGrowth],
            recommended_allocation: robo_advisor_core::risk_profile::recommended_allocation(
                RiskLevel::Moderate,
            ),
            initial_investment: None,
            optimize: false,
        })
        .unwrap();
    let bad = BTreeMap::from([("VTI".to_string(), dec!(0.7)), ("BND".to_string(), dec!(0.2))]);
    let err = engine
        .backtest(
            &p.id,
            &BacktestRequest {
                allocation: Some(bad),
                time_horizon: 1,
                initial_investment: None,
                monthly_contribution: Decimal::ZERO,
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        robo_advisor_core::AdvisorError::InvalidParameter { .. }
            | robo_advisor_core::AdvisorError::Validation { .. }
    ));
}
