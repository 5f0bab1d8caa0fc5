pub mod drift;

pub use drift::{rebalance, DriftEntry, RebalanceRequest, RebalanceResult, Trade, TradeSide};
