use chrono::{NaiveDate, Utc};
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use robo_advisor_core::goals::{self, GoalInput};

use crate::context::{load_config, GlobalArgs};
use crate::input;

/// Arguments for a goal projection
#[derive(Args)]
pub struct GoalArgs {
    /// Path to JSON goal (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long, default_value = "goal")]
    pub name: String,

    /// Free-form category, e.g. retirement, house, education
    #[arg(long = "type")]
    pub kind: Option<String>,

    #[arg(long)]
    pub target_amount: Option<Decimal>,

    #[arg(long, default_value = "0")]
    pub current_amount: Decimal,

    /// YYYY-MM-DD
    #[arg(long)]
    pub target_date: Option<NaiveDate>,

    #[arg(long, default_value = "0")]
    pub monthly_contribution: Decimal,

    /// Annual return; defaults to the configured stock assumption
    #[arg(long)]
    pub expected_return: Option<Decimal>,

    /// Valuation date; defaults to today
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

pub fn run_goal_projection(args: GoalArgs, global: &GlobalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let goal: GoalInput = match input::read_request(&args.input, "goal")? {
        Some(goal) => goal,
        None => {
            let config = load_config(global)?;
            GoalInput {
                name: args.name,
                kind: args.kind,
                target_amount: args
                    .target_amount
                    .ok_or("--target-amount is required (or provide --input)")?,
                current_amount: args.current_amount,
                target_date: args
                    .target_date
                    .ok_or("--target-date is required (or provide --input)")?,
                monthly_contribution: args.monthly_contribution,
                expected_return: args
                    .expected_return
                    .unwrap_or(config.capital_market_assumptions.stocks.expected_return),
                as_of: args.as_of.unwrap_or_else(|| Utc::now().date_naive()),
            }
        }
    };
    let result = goals::project_goal(&goal)?;
    Ok(serde_json::to_value(result)?)
}
