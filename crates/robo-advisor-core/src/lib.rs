pub mod config;
pub mod engine;
pub mod error;
pub mod goals;
pub mod market_data;
pub mod math;
pub mod optimizer;
pub mod portfolio;
pub mod rebalance;
pub mod risk_profile;
pub mod simulation;
pub mod storage;
pub mod tax;
pub mod time_value;
pub mod types;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::AdvisorError;
pub use types::*;

/// Standard result type for all engine operations
pub type AdvisorResult<T> = Result<T, AdvisorError>;
