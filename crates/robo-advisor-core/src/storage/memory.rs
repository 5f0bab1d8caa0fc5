use dashmap::DashMap;

use super::PortfolioRepository;
use crate::error::AdvisorError;
use crate::portfolio::Portfolio;
use crate::AdvisorResult;

#[derive(Debug, Default)]
pub struct InMemoryPortfolioRepository {
    portfolios: DashMap<String, Portfolio>,
}

impl InMemoryPortfolioRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PortfolioRepository for InMemoryPortfolioRepository {
    fn get(&self, id: &str) -> AdvisorResult<Portfolio> {
        self.portfolios
            .get(id)
            .map(|p| p.value().clone())
            .ok_or_else(|| AdvisorError::not_found("Portfolio", id))
    }

    fn list(&self) -> AdvisorResult<Vec<Portfolio>> {
        let mut all: Vec<Portfolio> = self.portfolios.iter().map(|p| p.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    fn insert(&self, mut portfolio: Portfolio) -> AdvisorResult<Portfolio> {
        use dashmap::mapref::entry::Entry;
        match self.portfolios.entry(portfolio.id.clone()) {
            Entry::Occupied(existing) => Err(AdvisorError::Conflict {
                id: portfolio.id,
                expected: 0,
                found: existing.get().version,
            }),
            Entry::Vacant(slot) => {
                portfolio.version = 1;
                slot.insert(portfolio.clone());
                Ok(portfolio)
            }
        }
    }

    fn update(&self, mut portfolio: Portfolio, expected_version: u64) -> AdvisorResult<Portfolio> {
        let mut stored = self
            .portfolios
            .get_mut(&portfolio.id)
            .ok_or_else(|| AdvisorError::not_found("Portfolio", portfolio.id.clone()))?;
        if stored.version != expected_version {
            return Err(AdvisorError::Conflict {
                id: portfolio.id,
                expected: expected_version,
                found: stored.version,
            });
        }
        portfolio.version = expected_version + 1;
        *stored = portfolio.clone();
        Ok(portfolio)
    }
}
