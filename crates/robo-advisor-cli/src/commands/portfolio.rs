use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use robo_advisor_core::portfolio::CreatePortfolioRequest;
use robo_advisor_core::risk_profile::{recommended_allocation, AssetClassAllocation};
use robo_advisor_core::{InvestmentGoal, RiskLevel};

use super::parse_name;
use crate::context::{build_engine, GlobalArgs};
use crate::input;

/// Arguments for creating a portfolio
#[derive(Args)]
pub struct CreatePortfolioArgs {
    /// Path to JSON request, e.g. a risk assessment result plus
    /// initial_investment (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long)]
    pub name: Option<String>,

    /// conservative, moderate-conservative, moderate, moderate-aggressive, aggressive
    #[arg(long)]
    pub risk_level: Option<String>,

    /// Comma-separated goals
    #[arg(long, value_delimiter = ',')]
    pub goals: Option<Vec<String>>,

    /// Stock fraction; with --bonds and --cash overrides the level's split
    #[arg(long, requires_all = ["bonds", "cash"])]
    pub stocks: Option<Decimal>,

    #[arg(long)]
    pub bonds: Option<Decimal>,

    #[arg(long)]
    pub cash: Option<Decimal>,

    #[arg(long)]
    pub initial_investment: Option<Decimal>,

    /// Pick fund weights from the efficient frontier
    #[arg(long)]
    pub optimize: bool,
}

/// Arguments for showing portfolios
#[derive(Args)]
pub struct PortfolioArgs {
    /// Portfolio id; lists every portfolio when omitted
    pub id: Option<String>,
}

pub fn run_create_portfolio(
    args: CreatePortfolioArgs,
    global: &GlobalArgs,
) -> Result<Value, Box<dyn std::error::Error>> {
    let request = match input::read_request::<CreatePortfolioRequest>(&args.input, "portfolio")? {
        Some(mut req) => {
            req.optimize |= args.optimize;
            if let Some(amount) = args.initial_investment {
                req.initial_investment = Some(amount);
            }
            req
        }
        None => {
            let level: RiskLevel = parse_name(
                &args.risk_level.ok_or("--risk-level is required (or provide --input)")?,
                "risk level",
            )?;
            let goals = args
                .goals
                .unwrap_or_else(|| vec!["wealth_growth".into()])
                .iter()
                .map(|g| parse_name::<InvestmentGoal>(g, "investment goal"))
                .collect::<Result<Vec<_>, _>>()?;
            let split = match (args.stocks, args.bonds, args.cash) {
                (Some(stocks), Some(bonds), Some(cash)) => AssetClassAllocation { stocks, bonds, cash },
                _ => recommended_allocation(level),
            };
            CreatePortfolioRequest {
                name: args.name,
                risk_level: level,
                investment_goals: goals,
                recommended_allocation: split,
                initial_investment: args.initial_investment,
                optimize: args.optimize,
            }
        }
    };
    let engine = build_engine(global)?;
    let portfolio = engine.create_portfolio(&request)?;
    Ok(serde_json::to_value(portfolio)?)
}

pub fn run_portfolio(args: PortfolioArgs, global: &GlobalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let engine = build_engine(global)?;
    match args.id {
        Some(id) => Ok(serde_json::to_value(engine.get_portfolio(&id)?)?),
        None => {
            let rows: Vec<Value> = engine
                .list_portfolios()?
                .into_iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.id,
                        "name": p.name,
                        "risk_level": p.risk_level,
                        "total_value": p.total_value,
                        "cash_balance": p.cash_balance,
                        "holdings": p.assets.len(),
                        "version": p.version,
                    })
                })
                .collect();
            Ok(Value::Array(rows))
        }
    }
}
