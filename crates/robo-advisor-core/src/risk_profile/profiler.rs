use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AdvisorError;
use crate::types::{with_metadata, ComputationOutput, InvestmentGoal, Money, Rate, RiskLevel};
use crate::AdvisorResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Questionnaire answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskQuestionnaire {
    pub age: i64,
    pub income: Money,
    /// Years until the money is needed.
    pub investment_horizon: i64,
    /// Self-assessed tolerance, 1 (lowest) to 10 (highest).
    pub risk_tolerance: i64,
    pub investment_goals: Vec<InvestmentGoal>,
}

/// Coarse asset-class split recommended for a risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetClassAllocation {
    pub stocks: Rate,
    pub bonds: Rate,
    pub cash: Rate,
}

impl AssetClassAllocation {
    pub fn total(&self) -> Decimal {
        self.stocks + self.bonds + self.cash
    }
}

/// Narrative description of a risk level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSummary {
    pub description: String,
    pub suitable_for: String,
    pub expected_return: String,
    pub volatility: String,
    pub investment_horizon: String,
    pub goal_notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessmentResult {
    pub risk_level: RiskLevel,
    /// 0 (no risk capacity) to 100.
    pub risk_score: Decimal,
    pub investment_goals: Vec<InvestmentGoal>,
    pub risk_summary: RiskSummary,
    pub recommended_allocation: AssetClassAllocation,
}

// ---------------------------------------------------------------------------
// Scoring constants
// ---------------------------------------------------------------------------

const AGE_WEIGHT: Decimal = dec!(0.20);
const HORIZON_WEIGHT: Decimal = dec!(0.40);
const TOLERANCE_WEIGHT: Decimal = dec!(0.40);

/// Age at which capacity bottoms out, and the span over which it declines.
const AGE_CEILING: Decimal = dec!(80);
const AGE_SPAN: Decimal = dec!(60);
/// Horizons beyond this add no further capacity.
const HORIZON_CAP_YEARS: i64 = 30;

/// Upper score bound (exclusive) of each bucket below aggressive.
const LEVEL_THRESHOLDS: [(Decimal, RiskLevel); 4] = [
    (dec!(30), RiskLevel::Conservative),
    (dec!(50), RiskLevel::ModerateConservative),
    (dec!(70), RiskLevel::Moderate),
    (dec!(80), RiskLevel::ModerateAggressive),
];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Score a questionnaire and recommend an asset-class allocation.
///
/// The score depends on age, horizon and stated tolerance only; goals shape
/// the narrative summary.
pub fn assess_risk(
    input: &RiskQuestionnaire,
) -> AdvisorResult<ComputationOutput<RiskAssessmentResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_questionnaire(input)?;

    let age_capacity = clamp_unit((AGE_CEILING - Decimal::from(input.age)) / AGE_SPAN);
    let horizon_capacity = Decimal::from(input.investment_horizon.min(HORIZON_CAP_YEARS))
        / Decimal::from(HORIZON_CAP_YEARS);
    let tolerance = Decimal::from(input.risk_tolerance) / dec!(10);

    let raw = dec!(100)
        * (AGE_WEIGHT * age_capacity
            + HORIZON_WEIGHT * horizon_capacity
            + TOLERANCE_WEIGHT * tolerance);
    let risk_score = raw.round_dp(2).max(Decimal::ZERO).min(dec!(100));
    let risk_level = level_for_score(risk_score);

    let mut goals: Vec<InvestmentGoal> = Vec::with_capacity(input.investment_goals.len());
    for g in &input.investment_goals {
        if !goals.contains(g) {
            goals.push(*g);
        }
    }

    if input.investment_horizon < 3 && risk_level >= RiskLevel::Moderate {
        warnings.push(format!(
            "Horizon of {} years is short for a {} profile",
            input.investment_horizon, risk_level
        ));
    }
    if goals.contains(&InvestmentGoal::Preservation) && risk_level >= RiskLevel::ModerateAggressive {
        warnings.push("Capital preservation goal conflicts with a growth-oriented score".into());
    }

    let output = RiskAssessmentResult {
        risk_level,
        risk_score,
        risk_summary: summary_for(risk_level, &goals),
        investment_goals: goals,
        recommended_allocation: recommended_allocation(risk_level),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Weighted risk capacity score (age 20%, horizon 40%, tolerance 40%)",
        &serde_json::json!({
            "age_capacity": age_capacity.round_dp(4).to_string(),
            "horizon_capacity": horizon_capacity.round_dp(4).to_string(),
            "tolerance": tolerance.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Map a 0-100 score onto a risk bucket.
pub fn level_for_score(score: Decimal) -> RiskLevel {
    LEVEL_THRESHOLDS
        .iter()
        .find(|(upper, _)| score < *upper)
        .map(|(_, level)| *level)
        .unwrap_or(RiskLevel::Aggressive)
}

/// Fixed stock/bond/cash split per risk level. Each row sums to exactly one.
pub fn recommended_allocation(level: RiskLevel) -> AssetClassAllocation {
    let (stocks, bonds, cash) = match level {
        RiskLevel::Conservative => (dec!(0.30), dec!(0.60), dec!(0.10)),
        RiskLevel::ModerateConservative => (dec!(0.50), dec!(0.40), dec!(0.10)),
        RiskLevel::Moderate => (dec!(0.60), dec!(0.30), dec!(0.10)),
        RiskLevel::ModerateAggressive => (dec!(0.70), dec!(0.20), dec!(0.10)),
        RiskLevel::Aggressive => (dec!(0.80), dec!(0.10), dec!(0.10)),
    };
    AssetClassAllocation { stocks, bonds, cash }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_questionnaire(input: &RiskQuestionnaire) -> AdvisorResult<()> {
    if !(1..=120).contains(&input.age) {
        return Err(AdvisorError::validation(
            "age",
            format!("Must be between 1 and 120, got {}", input.age),
        ));
    }
    if input.income < Decimal::ZERO {
        return Err(AdvisorError::validation("income", "Must be non-negative"));
    }
    if !(1..=100).contains(&input.investment_horizon) {
        return Err(AdvisorError::validation(
            "investment_horizon",
            format!("Must be between 1 and 100 years, got {}", input.investment_horizon),
        ));
    }
    if !(1..=10).contains(&input.risk_tolerance) {
        return Err(AdvisorError::validation(
            "risk_tolerance",
            format!("Must be between 1 and 10, got {}", input.risk_tolerance),
        ));
    }
    if input.investment_goals.is_empty() {
        return Err(AdvisorError::validation(
            "investment_goals",
            "At least one goal is required",
        ));
    }
    Ok(())
}

fn clamp_unit(v: Decimal) -> Decimal {
    v.max(Decimal::ZERO).min(Decimal::ONE)
}

fn summary_for(level: RiskLevel, goals: &[InvestmentGoal]) -> RiskSummary {
    let (description, suitable_for, expected_return, volatility, horizon) = match level {
        RiskLevel::Conservative => (
            "Focus on preserving capital with modest growth potential",
            "Investors close to retirement or with low risk tolerance",
            "4-6% annually",
            "Low",
            "1-3 years",
        ),
        RiskLevel::ModerateConservative => (
            "Balanced approach with emphasis on stability",
            "Investors seeking steady growth with limited volatility",
            "5-7% annually",
            "Low to Medium",
            "3-5 years",
        ),
        RiskLevel::Moderate => (
            "Balance between growth and stability",
            "Investors comfortable with market fluctuations",
            "6-8% annually",
            "Medium",
            "5-10 years",
        ),
        RiskLevel::ModerateAggressive => (
            "Growth-oriented with higher risk tolerance",
            "Long-term investors seeking capital appreciation",
            "7-9% annually",
            "Medium to High",
            "10-15 years",
        ),
        RiskLevel::Aggressive => (
            "Maximum growth potential with high risk tolerance",
            "Young investors with long time horizons",
            "8-10%+ annually",
            "High",
            "15+ years",
        ),
    };

    let goal_notes = goals
        .iter()
        .map(|g| {
            match g {
                InvestmentGoal::Retirement => {
                    "Retirement: contributions compound best when kept invested through downturns"
                }
                InvestmentGoal::WealthGrowth => {
                    "Wealth growth: the equity sleeve drives long-run returns"
                }
                InvestmentGoal::IncomeGeneration => {
                    "Income generation: bond and dividend holdings provide regular cash flow"
                }
                InvestmentGoal::TaxEfficiency => {
                    "Tax efficiency: positions are monitored for tax-loss harvesting"
                }
                InvestmentGoal::Preservation => {
                    "Preservation: the cash and bond sleeves cushion drawdowns"
                }
            }
            .to_string()
        })
        .collect();

    RiskSummary {
        description: description.into(),
        suitable_for: suitable_for.into(),
        expected_return: expected_return.into(),
        volatility: volatility.into(),
        investment_horizon: horizon.into(),
        goal_notes,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
