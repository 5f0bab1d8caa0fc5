use clap::Args;
use serde_json::Value;

use crate::context::{build_engine, GlobalArgs};

/// Arguments for tax-loss harvesting
#[derive(Args)]
pub struct TaxLossArgs {
    pub id: String,

    /// Restrict the report to one holding (required with --harvest)
    #[arg(long)]
    pub symbol: Option<String>,

    /// Sell the losing position at the latest price
    #[arg(long, requires = "symbol")]
    pub harvest: bool,
}

pub fn run_tax_loss_harvest(args: TaxLossArgs, global: &GlobalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let engine = build_engine(global)?;
    match (args.harvest, args.symbol.as_deref()) {
        (true, Some(symbol)) => Ok(serde_json::to_value(engine.harvest(&args.id, symbol)?)?),
        (true, None) => Err("--harvest requires --symbol".into()),
        (false, symbol) => Ok(serde_json::to_value(
            engine.tax_loss_opportunities(&args.id, symbol)?,
        )?),
    }
}
