//! Portfolio records, the transaction ledger and portfolio construction.

pub mod builder;
pub mod ledger;
pub mod model;
pub mod stats;

pub use builder::{build_portfolio, etf_allocation, CreatePortfolioRequest};
pub use ledger::{apply_transaction, cost_basis, revalue, Position, TransactionRequest};
pub use model::{Asset, Portfolio, Transaction, TransactionKind};
pub use stats::{compute_stats, PortfolioStats};
