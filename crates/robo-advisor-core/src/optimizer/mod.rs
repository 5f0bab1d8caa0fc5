//! Mean-variance estimation and efficient-frontier construction.

pub mod estimates;
pub mod frontier;

pub use estimates::{
    assumed_moments, estimate_from_series, historical_moments, MarketEstimates, MomentSource,
    PortfolioMoments,
};
pub use frontier::{
    compute_efficient_frontier, evaluate_allocation, select_for_risk_level, EfficientFrontier,
    EfficientFrontierPoint, FrontierParams,
};
