use chrono::Utc;
use clap::Args;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use robo_advisor_core::market_data::{InMemoryMarketData, MarketDataProvider, SyntheticMarketData};
use robo_advisor_core::storage::JsonFileRepository;
use robo_advisor_core::{AdvisorError, Engine, EngineConfig};

use crate::input;

/// Years of synthetic history generated when no market data file is given.
const SYNTHETIC_YEARS: i32 = 5;
const DEFAULT_STORE: &str = ".robo/portfolios";

/// Flags shared by every command that touches the engine.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding one JSON file per portfolio
    #[arg(long, global = true, default_value = DEFAULT_STORE)]
    pub store: PathBuf,

    /// JSON market data file ({"series": {...}, "dividend_yields": {...}})
    #[arg(long, global = true)]
    pub market_data: Option<String>,

    /// Engine configuration file (YAML or JSON)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Seed for synthetic market data when no file is given
    #[arg(long, global = true, default_value_t = 42)]
    pub seed: u64,
}

pub fn load_config(args: &GlobalArgs) -> Result<EngineConfig, Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => input::file::read_config(path)?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Wire the engine to the JSON store and the selected market data source.
pub fn build_engine(args: &GlobalArgs) -> Result<Engine, Box<dyn Error>> {
    let config = load_config(args)?;
    let market: Arc<dyn MarketDataProvider> = match &args.market_data {
        Some(path) => {
            let text = input::file::read_text(path)?;
            Arc::new(InMemoryMarketData::from_json(&text, config.max_gap_days)?)
        }
        None => {
            tracing::debug!("no market data file; generating synthetic prices (seed {})", args.seed);
            let end = Utc::now().date_naive();
            Arc::new(SyntheticMarketData::default_universe(args.seed, end, SYNTHETIC_YEARS)?)
        }
    };
    let repo = Arc::new(JsonFileRepository::open(&args.store)?);
    Ok(Engine::new(config, repo, market)?)
}

/// Caller-facing text for an error; engine internals stay in the log.
pub fn public_message(err: &(dyn Error + 'static)) -> String {
    match err.downcast_ref::<AdvisorError>() {
        Some(e) => {
            if matches!(e, AdvisorError::Computation { .. } | AdvisorError::Storage(_)) {
                tracing::error!("{e}");
            }
            e.public_message()
        }
        None => err.to_string(),
    }
}
