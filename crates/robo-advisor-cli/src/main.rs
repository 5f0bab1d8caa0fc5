mod commands;
mod context;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use commands::analytics::{BacktestArgs, FrontierArgs, SimulateArgs, StatsArgs};
use commands::goals::GoalArgs;
use commands::portfolio::{CreatePortfolioArgs, PortfolioArgs};
use commands::rebalance::RebalanceArgs;
use commands::risk::RiskAssessmentArgs;
use commands::tax::TaxLossArgs;
use commands::transactions::{RecordTransactionArgs, TransactionsArgs};
use context::GlobalArgs;

/// Risk profiling, portfolio optimization and simulation
#[derive(Parser)]
#[command(
    name = "robo",
    version,
    about = "Risk profiling, portfolio optimization and simulation",
    long_about = "A CLI for an automated investment advisor engine with decimal precision. \
                  Assesses risk, builds ETF portfolios, traces the efficient frontier, \
                  rebalances, simulates, backtests and harvests tax losses."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a risk questionnaire and recommend an asset-class split
    RiskAssessment(RiskAssessmentArgs),
    /// Create and fund a portfolio from a risk assessment
    CreatePortfolio(CreatePortfolioArgs),
    /// Show one portfolio, or list all of them
    Portfolio(PortfolioArgs),
    /// Trace the efficient frontier over a portfolio's assets
    EfficientFrontier(FrontierArgs),
    /// Project a portfolio forward (Monte Carlo or deterministic)
    Simulate(SimulateArgs),
    /// Replay an allocation over historical prices
    Backtest(BacktestArgs),
    /// Plan (and optionally execute) a rebalance
    Rebalance(RebalanceArgs),
    /// Report tax-loss harvesting opportunities, or harvest one
    TaxLossHarvest(TaxLossArgs),
    /// Record a buy, sell, dividend, deposit or withdrawal
    RecordTransaction(RecordTransactionArgs),
    /// List a portfolio's transactions
    Transactions(TransactionsArgs),
    /// Summary statistics for a portfolio
    Stats(StatsArgs),
    /// Project progress towards a savings goal
    GoalProjection(GoalArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let g = &cli.global;
    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::RiskAssessment(args) => commands::risk::run_risk_assessment(args, g),
        Commands::CreatePortfolio(args) => commands::portfolio::run_create_portfolio(args, g),
        Commands::Portfolio(args) => commands::portfolio::run_portfolio(args, g),
        Commands::EfficientFrontier(args) => commands::analytics::run_frontier(args, g),
        Commands::Simulate(args) => commands::analytics::run_simulate(args, g),
        Commands::Backtest(args) => commands::analytics::run_backtest(args, g),
        Commands::Rebalance(args) => commands::rebalance::run_rebalance(args, g),
        Commands::TaxLossHarvest(args) => commands::tax::run_tax_loss_harvest(args, g),
        Commands::RecordTransaction(args) => commands::transactions::run_record(args, g),
        Commands::Transactions(args) => commands::transactions::run_list(args, g),
        Commands::Stats(args) => commands::analytics::run_stats(args, g),
        Commands::GoalProjection(args) => commands::goals::run_goal_projection(args, g),
        Commands::Version => {
            println!("robo {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), context::public_message(e.as_ref()));
            process::exit(1);
        }
    }
}
