use clap::Args;
use serde_json::Value;

use robo_advisor_core::engine::RebalanceRequestBody;

use crate::context::{build_engine, GlobalArgs};
use crate::input;

/// Arguments for rebalancing
#[derive(Args)]
pub struct RebalanceArgs {
    /// Portfolio id (ignored when --input supplies portfolio_id)
    pub id: Option<String>,

    /// Path to JSON request with portfolio_id and optional
    /// current_allocation / target_allocation overrides
    #[arg(long)]
    pub input: Option<String>,

    /// Rebalance every asset regardless of drift
    #[arg(long)]
    pub force: bool,

    /// Execute the planned trades against the stored portfolio
    #[arg(long)]
    pub apply: bool,
}

pub fn run_rebalance(args: RebalanceArgs, global: &GlobalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let body = match input::read_request::<RebalanceRequestBody>(&args.input, "rebalance")? {
        Some(mut body) => {
            body.force |= args.force;
            body.apply |= args.apply;
            body
        }
        None => RebalanceRequestBody {
            portfolio_id: args.id.ok_or("portfolio id is required (or provide --input)")?,
            current_allocation: None,
            target_allocation: None,
            force: args.force,
            apply: args.apply,
        },
    };
    let engine = build_engine(global)?;
    Ok(serde_json::to_value(engine.rebalance(&body)?)?)
}
