//! Endpoint facade over the pure computation modules.
//!
//! Reads work on snapshots fetched from the repository. Writes to one
//! portfolio are serialized by a per-id mutex and committed with an
//! optimistic version check.

pub mod requests;

use chrono::{Months, NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::AdvisorError;
use crate::goals::{project_goal, GoalInput, GoalProjection};
use crate::market_data::{fetch_aligned, AlignedSeries, MarketDataProvider};
use crate::optimizer::{
    assumed_moments, compute_efficient_frontier, estimate_from_series, historical_moments,
    select_for_risk_level, EfficientFrontier, FrontierParams, PortfolioMoments,
};
use crate::portfolio::builder::{BOND_FUNDS, STOCK_FUNDS};
use crate::portfolio::{
    apply_transaction, build_portfolio, compute_stats, etf_allocation, revalue,
    CreatePortfolioRequest, Portfolio, PortfolioStats, Transaction, TransactionKind,
    TransactionRequest,
};
use crate::rebalance::{rebalance, RebalanceRequest, TradeSide};
use crate::risk_profile::{assess_risk, RiskAssessmentResult, RiskQuestionnaire};
use crate::simulation::{
    run_backtest, simulate_forward, BacktestParams, BacktestResult, ForwardParams,
    SimulationResult,
};
use crate::storage::PortfolioRepository;
use crate::tax::{find_opportunities, harvest_position, HarvestCandidate, TaxLossReport};
use crate::types::{Allocation, ComputationOutput, Money, CASH_SYMBOL};
use crate::AdvisorResult;

pub use requests::{
    BacktestRequest, HarvestResponse, RawAllocation, RebalanceRequestBody, RebalanceResponse,
    SimulateRequest, TransactionResponse,
};
use requests::parse_allocation;

/// Attempts at a write before a version conflict is reported.
const WRITE_ATTEMPTS: u32 = 3;
const SHARE_DP: u32 = 6;

pub struct Engine {
    config: EngineConfig,
    repo: Arc<dyn PortfolioRepository>,
    market: Arc<dyn MarketDataProvider>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        repo: Arc<dyn PortfolioRepository>,
        market: Arc<dyn MarketDataProvider>,
    ) -> AdvisorResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            repo,
            market,
            locks: DashMap::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Risk assessment and portfolio creation
    // -----------------------------------------------------------------------

    pub fn assess_risk(
        &self,
        questionnaire: &RiskQuestionnaire,
    ) -> AdvisorResult<ComputationOutput<RiskAssessmentResult>> {
        assess_risk(questionnaire).map_err(|e| log_failure("risk-assessment", e))
    }

    pub fn create_portfolio(&self, req: &CreatePortfolioRequest) -> AdvisorResult<Portfolio> {
        let result = (|| -> AdvisorResult<_> {
            let initial = req
                .initial_investment
                .unwrap_or(self.config.default_initial_investment);
            let target = if req.optimize {
                self.optimized_target(req)?
            } else {
                etf_allocation(&req.recommended_allocation)?
            };
            let prices = self.latest_prices(&target.invested_symbols())?;
            let portfolio = build_portfolio(
                Uuid::new_v4().to_string(),
                req,
                target,
                initial,
                &prices,
                Utc::now(),
            )?;
            let saved = self.repo.insert(portfolio)?;
            log::info!(
                "created portfolio {} ({}, value {})",
                saved.id,
                saved.risk_level,
                saved.total_value
            );
            Ok(saved)
        })();
        result.map_err(|e| log_failure("create-portfolio", e))
    }

    pub fn get_portfolio(&self, id: &str) -> AdvisorResult<Portfolio> {
        self.repo.get(id)
    }

    pub fn list_portfolios(&self) -> AdvisorResult<Vec<Portfolio>> {
        self.repo.list()
    }

    // -----------------------------------------------------------------------
    // Analytics
    // -----------------------------------------------------------------------

    pub fn efficient_frontier(&self, id: &str) -> AdvisorResult<ComputationOutput<EfficientFrontier>> {
        let result = (|| -> AdvisorResult<_> {
            let portfolio = self.priced_snapshot(id)?;
            let symbols: Vec<String> = portfolio
                .target_allocation
                .invested_symbols()
                .into_iter()
                .chain(portfolio.held_symbols())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if symbols.len() < 2 {
                return Err(AdvisorError::InsufficientData(format!(
                    "Portfolio {id} spans {} asset(s); at least 2 are required",
                    symbols.len()
                )));
            }
            let history = self.history(&symbols, self.config.lookback_years)?;
            let estimates = estimate_from_series(
                &history,
                self.config.periods_per_year,
                self.config.min_observations,
            )?;
            let current = portfolio.current_allocation();
            compute_efficient_frontier(
                &estimates,
                &FrontierParams::from_config(&self.config),
                Some(&current),
            )
        })();
        result.map_err(|e| log_failure("efficient-frontier", e))
    }

    pub fn simulate(
        &self,
        id: &str,
        req: &SimulateRequest,
    ) -> AdvisorResult<ComputationOutput<SimulationResult>> {
        let result = (|| -> AdvisorResult<_> {
            let portfolio = self.priced_snapshot(id)?;
            let allocation =
                parse_allocation(&req.allocation)?.unwrap_or_else(|| portfolio.target_allocation.clone());
            let moments = self.moments_for(&allocation, self.config.lookback_years);
            let params = ForwardParams {
                time_horizon: req.time_horizon,
                initial_investment: req.initial_investment.unwrap_or(portfolio.total_value),
                monthly_contribution: req.monthly_contribution,
                expected_return: req.expected_return.unwrap_or(moments.expected_return),
                volatility: req.volatility.unwrap_or(moments.volatility),
                benchmark_return: self.config.benchmark_return,
                mode: req.mode,
                num_paths: req.num_paths.unwrap_or(self.config.monte_carlo_paths),
                seed: req.seed,
                start_date: req.start_date.unwrap_or_else(|| Utc::now().date_naive()),
            };
            log::debug!(
                "simulate {id}: {} years, mode {:?}, moments from {:?}",
                params.time_horizon,
                params.mode,
                moments.source
            );
            simulate_forward(&params)
        })();
        result.map_err(|e| log_failure("simulate", e))
    }

    pub fn backtest(
        &self,
        id: &str,
        req: &BacktestRequest,
    ) -> AdvisorResult<ComputationOutput<BacktestResult>> {
        let result = (|| -> AdvisorResult<_> {
            if req.time_horizon <= 0 {
                return Err(AdvisorError::invalid_parameter(
                    "time_horizon",
                    format!("Must be positive, got {}", req.time_horizon),
                ));
            }
            let portfolio = self.priced_snapshot(id)?;
            let allocation =
                parse_allocation(&req.allocation)?.unwrap_or_else(|| portfolio.target_allocation.clone());
            let initial = match req.initial_investment {
                Some(v) => v,
                None if portfolio.total_value > Decimal::ZERO => portfolio.total_value,
                None => self.config.default_initial_investment,
            };
            let symbols: Vec<String> = allocation
                .invested_symbols()
                .into_iter()
                .chain(std::iter::once(self.config.benchmark_symbol.to_uppercase()))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let years = u32::try_from(req.time_horizon).map_err(|_| {
                AdvisorError::invalid_parameter("time_horizon", "Too large")
            })?;
            let history = self.history(&symbols, years)?;
            let params = BacktestParams {
                allocation,
                benchmark_symbol: self.config.benchmark_symbol.clone(),
                initial_investment: initial,
                monthly_contribution: req.monthly_contribution,
                risk_free_rate: self.config.risk_free_rate,
                periods_per_year: self.config.periods_per_year,
                min_observations: self.config.min_observations,
            };
            run_backtest(&params, &history)
        })();
        result.map_err(|e| log_failure("backtest", e))
    }

    pub fn portfolio_stats(&self, id: &str) -> AdvisorResult<ComputationOutput<PortfolioStats>> {
        let result = (|| -> AdvisorResult<_> {
            let portfolio = self.priced_snapshot(id)?;
            let moments = self.moments_for(&portfolio.current_allocation(), 1);
            let mut yields = BTreeMap::new();
            for symbol in portfolio.held_symbols() {
                if let Some(y) = self.market.dividend_yield(&symbol)? {
                    yields.insert(symbol, y);
                }
            }
            Ok(compute_stats(&portfolio, &moments, &yields, self.config.risk_free_rate))
        })();
        result.map_err(|e| log_failure("stats", e))
    }

    pub fn tax_loss_opportunities(
        &self,
        id: &str,
        symbol: Option<&str>,
    ) -> AdvisorResult<ComputationOutput<TaxLossReport>> {
        let result = (|| -> AdvisorResult<_> {
            let portfolio = self.repo.get(id)?;
            let candidates = HarvestCandidate::from_portfolio(&portfolio);
            let symbols: Vec<String> = candidates.iter().map(|c| c.symbol.clone()).collect();
            let prices = self.latest_prices(&symbols)?;
            find_opportunities(
                &candidates,
                &prices,
                self.config.tax_rate,
                self.config.min_harvest_loss,
                symbol,
            )
        })();
        result.map_err(|e| log_failure("tax-loss-harvest", e))
    }

    pub fn project_goal(&self, input: &GoalInput) -> AdvisorResult<ComputationOutput<GoalProjection>> {
        project_goal(input).map_err(|e| log_failure("goal-projection", e))
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Plan a rebalance and, when asked, execute it: sells first, then buys
    /// capped at available cash.
    pub fn rebalance(&self, body: &RebalanceRequestBody) -> AdvisorResult<RebalanceResponse> {
        let result = (|| -> AdvisorResult<_> {
            let current_override = parse_allocation(&body.current_allocation)?;
            let target_override = parse_allocation(&body.target_allocation)?;

            let plan_for = |portfolio: &Portfolio| -> AdvisorResult<_> {
                let symbols: Vec<String> = portfolio
                    .held_symbols()
                    .into_iter()
                    .chain(portfolio.target_allocation.invested_symbols())
                    .chain(target_override.iter().flat_map(|t| t.invested_symbols()))
                    .chain(current_override.iter().flat_map(|c| c.invested_symbols()))
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let prices = self.latest_prices(&symbols)?;
                let mut snapshot = portfolio.clone();
                revalue(&mut snapshot, &prices);
                let req = RebalanceRequest {
                    current_allocation: current_override
                        .clone()
                        .unwrap_or_else(|| snapshot.current_allocation()),
                    target_allocation: target_override
                        .clone()
                        .unwrap_or_else(|| snapshot.target_allocation.clone()),
                    drift_threshold: self.config.drift_threshold,
                    force: body.force,
                    portfolio_value: Some(snapshot.total_value),
                    prices: prices.clone(),
                };
                Ok((rebalance(&req)?, prices))
            };

            if !body.apply {
                let portfolio = self.repo.get(&body.portfolio_id)?;
                let (plan, _) = plan_for(&portfolio)?;
                return Ok(RebalanceResponse { plan, portfolio: None });
            }

            let (plan, saved) = self.mutate(&body.portfolio_id, |portfolio| {
                let (plan, prices) = plan_for(portfolio)?;
                let now = Utc::now();
                revalue(portfolio, &prices);
                for trade in plan.result.trades.iter().filter(|t| t.side == TradeSide::Sell) {
                    let held = portfolio.asset(&trade.symbol).map(|a| a.shares).unwrap_or_default();
                    // Exited positions are closed out in full.
                    let shares = if plan.result.new_allocation.get(&trade.symbol).is_zero() {
                        held
                    } else {
                        trade.shares.min(held)
                    };
                    if shares > Decimal::ZERO {
                        apply_transaction(
                            portfolio,
                            &TransactionRequest::trade(TransactionKind::Sell, &trade.symbol, shares, trade.price)
                                .with_note("Rebalance"),
                            now,
                        )?;
                    }
                }
                for trade in plan.result.trades.iter().filter(|t| t.side == TradeSide::Buy) {
                    let affordable = (portfolio.cash_balance / trade.price)
                        .round_dp_with_strategy(SHARE_DP, RoundingStrategy::ToZero);
                    let shares = trade.shares.min(affordable);
                    if shares > Decimal::ZERO {
                        apply_transaction(
                            portfolio,
                            &TransactionRequest::trade(TransactionKind::Buy, &trade.symbol, shares, trade.price)
                                .with_note("Rebalance"),
                            now,
                        )?;
                    }
                }
                if let Some(target) = &target_override {
                    portfolio.target_allocation = target.clone();
                }
                if plan.result.rebalance_needed {
                    portfolio.last_rebalanced = Some(now);
                }
                Ok(plan)
            })?;
            log::info!(
                "rebalanced portfolio {} with {} trades",
                saved.id,
                plan.result.trades.len()
            );
            Ok(RebalanceResponse {
                plan,
                portfolio: Some(saved),
            })
        })();
        result.map_err(|e| log_failure("rebalance", e))
    }

    /// Sell a losing position at the latest price.
    pub fn harvest(&self, id: &str, symbol: &str) -> AdvisorResult<HarvestResponse> {
        let result = (|| -> AdvisorResult<_> {
            let price = self.market.latest_price(symbol)?;
            let tax_rate = self.config.tax_rate;
            let (harvest, portfolio) = self.mutate(id, |portfolio| {
                let outcome = harvest_position(portfolio, symbol, price, tax_rate, Utc::now())?;
                let prices = self.latest_prices(&portfolio.held_symbols())?;
                revalue(portfolio, &prices);
                Ok(outcome)
            })?;
            Ok(HarvestResponse { harvest, portfolio })
        })();
        result.map_err(|e| log_failure("harvest", e))
    }

    pub fn record_transaction(
        &self,
        id: &str,
        req: &TransactionRequest,
    ) -> AdvisorResult<TransactionResponse> {
        let result = self.mutate(id, |portfolio| apply_transaction(portfolio, req, Utc::now()));
        match result {
            Ok((transaction, portfolio)) => {
                log::info!(
                    "recorded {:?} of {} on portfolio {}",
                    transaction.kind,
                    transaction.amount,
                    portfolio.id
                );
                Ok(TransactionResponse {
                    transaction,
                    portfolio,
                })
            }
            Err(e) => Err(log_failure("record-transaction", e)),
        }
    }

    pub fn transactions(&self, id: &str) -> AdvisorResult<Vec<Transaction>> {
        Ok(self.repo.get(id)?.transactions)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Run `f` against the latest stored copy while holding the portfolio's
    /// write lock, then commit with a version check. A conflict (another
    /// process wrote the same record) re-reads and retries.
    fn mutate<T, F>(&self, id: &str, mut f: F) -> AdvisorResult<(T, Portfolio)>
    where
        F: FnMut(&mut Portfolio) -> AdvisorResult<T>,
    {
        let lock = self
            .locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock
            .lock()
            .map_err(|_| AdvisorError::Storage(format!("write lock for {id} poisoned")))?;

        let mut attempt = 1;
        loop {
            let mut portfolio = self.repo.get(id)?;
            let expected = portfolio.version;
            let out = f(&mut portfolio)?;
            portfolio.updated_at = Utc::now();
            match self.repo.update(portfolio, expected) {
                Ok(saved) => return Ok((out, saved)),
                Err(AdvisorError::Conflict { found, .. }) if attempt < WRITE_ATTEMPTS => {
                    log::warn!(
                        "portfolio {id} changed underneath (version {expected} -> {found}); retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn priced_snapshot(&self, id: &str) -> AdvisorResult<Portfolio> {
        let mut portfolio = self.repo.get(id)?;
        let prices = self.latest_prices(&portfolio.held_symbols())?;
        revalue(&mut portfolio, &prices);
        Ok(portfolio)
    }

    fn latest_prices(&self, symbols: &[String]) -> AdvisorResult<BTreeMap<String, Money>> {
        symbols
            .iter()
            .filter(|s| s.as_str() != CASH_SYMBOL)
            .map(|s| Ok((s.clone(), self.market.latest_price(s)?)))
            .collect()
    }

    fn history(&self, symbols: &[String], years: u32) -> AdvisorResult<AlignedSeries> {
        let to = self.market.last_date().ok_or_else(|| {
            AdvisorError::InsufficientData("Market data provider has no prices".into())
        })?;
        let from = to
            .checked_sub_months(Months::new(years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MIN);
        fetch_aligned(&*self.market, symbols, from, to, self.config.max_gap_days)
    }

    /// Moments from recent history, falling back to capital market
    /// assumptions when the history is missing or too short.
    fn moments_for(&self, allocation: &Allocation, years: u32) -> PortfolioMoments {
        let cma = &self.config.capital_market_assumptions;
        let symbols = allocation.invested_symbols();
        if symbols.is_empty() {
            return assumed_moments(allocation, cma);
        }
        let from_history = self.history(&symbols, years).and_then(|h| {
            if h.observations() < self.config.min_observations {
                return Err(AdvisorError::InsufficientData(format!(
                    "{} observations",
                    h.observations()
                )));
            }
            historical_moments(allocation, &h, self.config.periods_per_year, self.config.risk_free_rate)
        });
        match from_history {
            Ok(m) => m,
            Err(e) => {
                log::debug!("using capital market assumptions: {e}");
                assumed_moments(allocation, cma)
            }
        }
    }

    fn optimized_target(&self, req: &CreatePortfolioRequest) -> AdvisorResult<Allocation> {
        let symbols: Vec<String> = STOCK_FUNDS
            .iter()
            .chain(BOND_FUNDS.iter())
            .map(|(s, _)| s.to_string())
            .collect();
        let history = self.history(&symbols, self.config.lookback_years)?;
        let estimates = estimate_from_series(
            &history,
            self.config.periods_per_year,
            self.config.min_observations,
        )?;
        let frontier = compute_efficient_frontier(
            &estimates,
            &FrontierParams::from_config(&self.config),
            None,
        )?;
        let point = select_for_risk_level(
            &frontier.result,
            req.risk_level,
            &self.config.target_volatility,
        );
        let cash = req.recommended_allocation.cash;
        let invested = Decimal::ONE - cash;
        let mut weights: Vec<(String, Decimal)> = point
            .weights
            .iter()
            .map(|(s, w)| (s.clone(), (*w).max(Decimal::ZERO) * invested))
            .collect();
        if cash > Decimal::ZERO {
            weights.push((CASH_SYMBOL.to_string(), cash));
        }
        log::debug!(
            "optimized target for {}: volatility {}, return {}",
            req.risk_level,
            point.volatility,
            point.expected_return
        );
        Allocation::from_weights(weights)
    }
}

/// Log a failed request at a level matching its kind.
fn log_failure(operation: &str, err: AdvisorError) -> AdvisorError {
    match &err {
        AdvisorError::Computation { .. } | AdvisorError::Storage(_) => {
            log::error!("{operation} failed: {err}")
        }
        AdvisorError::Conflict { .. } => log::warn!("{operation}: {err}"),
        _ => log::debug!("{operation} rejected: {err}"),
    }
    err
}
