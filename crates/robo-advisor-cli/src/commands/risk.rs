use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use robo_advisor_core::risk_profile::{self, RiskQuestionnaire};
use robo_advisor_core::InvestmentGoal;

use super::parse_name;
use crate::context::GlobalArgs;
use crate::input;

/// Arguments for a risk assessment
#[derive(Args)]
pub struct RiskAssessmentArgs {
    /// Path to JSON questionnaire (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long)]
    pub age: Option<i64>,

    /// Annual income
    #[arg(long)]
    pub income: Option<Decimal>,

    /// Years until the money is needed
    #[arg(long)]
    pub investment_horizon: Option<i64>,

    /// Self-assessed tolerance, 1 to 10
    #[arg(long)]
    pub risk_tolerance: Option<i64>,

    /// Comma-separated goals (e.g. "retirement,growth")
    #[arg(long, value_delimiter = ',')]
    pub goals: Option<Vec<String>>,
}

pub fn run_risk_assessment(
    args: RiskAssessmentArgs,
    _global: &GlobalArgs,
) -> Result<Value, Box<dyn std::error::Error>> {
    let questionnaire: RiskQuestionnaire = match input::read_request(&args.input, "risk assessment")? {
        Some(q) => q,
        None => {
            let goals = args
                .goals
                .ok_or("--goals is required (or provide --input)")?
                .iter()
                .map(|g| parse_name::<InvestmentGoal>(g, "investment goal"))
                .collect::<Result<Vec<_>, _>>()?;
            RiskQuestionnaire {
                age: args.age.ok_or("--age is required (or provide --input)")?,
                income: args.income.unwrap_or(Decimal::ZERO),
                investment_horizon: args
                    .investment_horizon
                    .ok_or("--investment-horizon is required (or provide --input)")?,
                risk_tolerance: args
                    .risk_tolerance
                    .ok_or("--risk-tolerance is required (or provide --input)")?,
                investment_goals: goals,
            }
        }
    };
    let result = risk_profile::assess_risk(&questionnaire)?;
    Ok(serde_json::to_value(result)?)
}
