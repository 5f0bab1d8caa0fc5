//! Durable portfolio records behind a repository seam.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileRepository;
pub use memory::InMemoryPortfolioRepository;

use crate::portfolio::Portfolio;
use crate::AdvisorResult;

pub trait PortfolioRepository: Send + Sync {
    fn get(&self, id: &str) -> AdvisorResult<Portfolio>;

    /// All portfolios, ordered by creation time.
    fn list(&self) -> AdvisorResult<Vec<Portfolio>>;

    /// Store a new portfolio at version 1.
    fn insert(&self, portfolio: Portfolio) -> AdvisorResult<Portfolio>;

    /// Replace the stored record if its version still equals
    /// `expected_version`; the stored copy gets `expected_version + 1`.
    fn update(&self, portfolio: Portfolio, expected_version: u64) -> AdvisorResult<Portfolio>;
}
