use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use robo_advisor_core::engine::{BacktestRequest, SimulateRequest};
use robo_advisor_core::simulation::SimulationMode;

use super::parse_name;
use crate::context::{build_engine, GlobalArgs};
use crate::input;

/// Arguments for the efficient frontier
#[derive(Args)]
pub struct FrontierArgs {
    pub id: String,
}

/// Arguments for portfolio statistics
#[derive(Args)]
pub struct StatsArgs {
    pub id: String,
}

/// Arguments for a forward simulation
#[derive(Args)]
pub struct SimulateArgs {
    pub id: String,

    /// Path to JSON request (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Years to project
    #[arg(long, default_value_t = 10)]
    pub time_horizon: i64,

    /// Defaults to the portfolio's current value
    #[arg(long)]
    pub initial_investment: Option<Decimal>,

    #[arg(long, default_value = "0")]
    pub monthly_contribution: Decimal,

    /// monte-carlo or deterministic
    #[arg(long, default_value = "monte-carlo")]
    pub mode: String,

    #[arg(long)]
    pub num_paths: Option<u32>,

    /// Seed for the simulated paths; random when omitted
    #[arg(long)]
    pub path_seed: Option<u64>,

    /// First month of the projection (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub start_date: Option<NaiveDate>,
}

/// Arguments for a historical backtest
#[derive(Args)]
pub struct BacktestArgs {
    pub id: String,

    /// Path to JSON request with an optional allocation override
    #[arg(long)]
    pub input: Option<String>,

    /// Years of history to replay
    #[arg(long, default_value_t = 3)]
    pub time_horizon: i64,

    #[arg(long)]
    pub initial_investment: Option<Decimal>,

    #[arg(long, default_value = "0")]
    pub monthly_contribution: Decimal,
}

pub fn run_frontier(args: FrontierArgs, global: &GlobalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let engine = build_engine(global)?;
    Ok(serde_json::to_value(engine.efficient_frontier(&args.id)?)?)
}

pub fn run_stats(args: StatsArgs, global: &GlobalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let engine = build_engine(global)?;
    Ok(serde_json::to_value(engine.portfolio_stats(&args.id)?)?)
}

pub fn run_simulate(args: SimulateArgs, global: &GlobalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: SimulateRequest = match input::read_request(&args.input, "simulation")? {
        Some(req) => req,
        None => SimulateRequest {
            time_horizon: args.time_horizon,
            initial_investment: args.initial_investment,
            monthly_contribution: args.monthly_contribution,
            allocation: None,
            expected_return: None,
            volatility: None,
            mode: parse_name::<SimulationMode>(&args.mode, "simulation mode")?,
            num_paths: args.num_paths,
            seed: args.path_seed,
            start_date: args.start_date,
        },
    };
    let engine = build_engine(global)?;
    Ok(serde_json::to_value(engine.simulate(&args.id, &request)?)?)
}

pub fn run_backtest(args: BacktestArgs, global: &GlobalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: BacktestRequest = match input::read_request(&args.input, "backtest")? {
        Some(req) => req,
        None => BacktestRequest {
            allocation: None,
            time_horizon: args.time_horizon,
            initial_investment: args.initial_investment,
            monthly_contribution: args.monthly_contribution,
        },
    };
    let engine = build_engine(global)?;
    Ok(serde_json::to_value(engine.backtest(&args.id, &request)?)?)
}
