//! Request and response bodies for the engine endpoints.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::portfolio::{Portfolio, Transaction};
use crate::rebalance::RebalanceResult;
use crate::simulation::SimulationMode;
use crate::tax::HarvestOutcome;
use crate::types::{Allocation, ComputationOutput, Money, Rate};
use crate::AdvisorResult;

/// Raw symbol -> fraction map as it arrives on the wire; validated into an
/// [`Allocation`] before use so a bad total surfaces as an invalid parameter.
pub type RawAllocation = BTreeMap<String, Decimal>;

pub(crate) fn parse_allocation(raw: &Option<RawAllocation>) -> AdvisorResult<Option<Allocation>> {
    raw.as_ref().map(|m| Allocation::new(m.clone())).transpose()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulateRequest {
    pub time_horizon: i64,
    /// Defaults to the portfolio's current value.
    #[serde(default)]
    pub initial_investment: Option<Money>,
    #[serde(default)]
    pub monthly_contribution: Money,
    /// Defaults to the portfolio's target allocation.
    #[serde(default)]
    pub allocation: Option<RawAllocation>,
    #[serde(default)]
    pub expected_return: Option<Rate>,
    #[serde(default)]
    pub volatility: Option<Rate>,
    #[serde(default)]
    pub mode: SimulationMode,
    #[serde(default)]
    pub num_paths: Option<u32>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    #[serde(default)]
    pub allocation: Option<RawAllocation>,
    /// Years of history to replay, ending at the provider's last date.
    pub time_horizon: i64,
    #[serde(default)]
    pub initial_investment: Option<Money>,
    #[serde(default)]
    pub monthly_contribution: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceRequestBody {
    pub portfolio_id: String,
    /// Defaults to the portfolio's holdings at latest prices.
    #[serde(default)]
    pub current_allocation: Option<RawAllocation>,
    /// Defaults to the stored target; when given it becomes the new target.
    #[serde(default)]
    pub target_allocation: Option<RawAllocation>,
    #[serde(default)]
    pub force: bool,
    /// Execute the trades against the stored portfolio.
    #[serde(default)]
    pub apply: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceResponse {
    #[serde(flatten)]
    pub plan: ComputationOutput<RebalanceResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<Portfolio>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub transaction: Transaction,
    pub portfolio: Portfolio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestResponse {
    pub harvest: HarvestOutcome,
    pub portfolio: Portfolio,
}
