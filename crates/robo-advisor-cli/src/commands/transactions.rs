use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use robo_advisor_core::portfolio::{TransactionKind, TransactionRequest};

use super::parse_name;
use crate::context::{build_engine, GlobalArgs};
use crate::input;

/// Arguments for recording a transaction
#[derive(Args)]
pub struct RecordTransactionArgs {
    pub id: String,

    /// Path to JSON transaction (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// buy, sell, dividend, deposit or withdrawal
    #[arg(long = "type")]
    pub kind: Option<String>,

    #[arg(long)]
    pub symbol: Option<String>,

    #[arg(long)]
    pub shares: Option<Decimal>,

    #[arg(long)]
    pub price: Option<Decimal>,

    /// Cash amount for deposits, withdrawals and dividends
    #[arg(long)]
    pub amount: Option<Decimal>,

    #[arg(long)]
    pub note: Option<String>,
}

/// Arguments for listing transactions
#[derive(Args)]
pub struct TransactionsArgs {
    pub id: String,
}

pub fn run_record(args: RecordTransactionArgs, global: &GlobalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: TransactionRequest = match input::read_request(&args.input, "transaction")? {
        Some(req) => req,
        None => TransactionRequest {
            kind: parse_name::<TransactionKind>(
                &args.kind.ok_or("--type is required (or provide --input)")?,
                "transaction type",
            )?,
            symbol: args.symbol,
            shares: args.shares,
            price: args.price,
            amount: args.amount,
            note: args.note,
        },
    };
    let engine = build_engine(global)?;
    Ok(serde_json::to_value(engine.record_transaction(&args.id, &request)?)?)
}

pub fn run_list(args: TransactionsArgs, global: &GlobalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let engine = build_engine(global)?;
    Ok(serde_json::to_value(engine.transactions(&args.id)?)?)
}
