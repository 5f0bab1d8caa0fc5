use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AdvisorError;
use crate::time_value::{fv, monthly_rate, pmt};
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::AdvisorResult;

/// A savings goal such as retirement or a house deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalInput {
    pub name: String,
    /// Free-form category, e.g. "retirement", "house", "education".
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub target_amount: Money,
    pub current_amount: Money,
    pub target_date: NaiveDate,
    #[serde(default)]
    pub monthly_contribution: Money,
    /// Annual return assumed on the saved amount.
    pub expected_return: Rate,
    pub as_of: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalProjection {
    pub name: String,
    pub kind: Option<String>,
    /// current / target, capped at one.
    pub progress: Decimal,
    pub months_remaining: u32,
    pub projected_value: Money,
    /// Monthly saving needed to hit the target exactly; zero when the
    /// current balance already grows past it.
    pub required_monthly_contribution: Money,
    pub shortfall: Money,
    pub on_track: bool,
}

pub fn project_goal(input: &GoalInput) -> AdvisorResult<ComputationOutput<GoalProjection>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.target_amount <= Decimal::ZERO {
        return Err(AdvisorError::validation("target_amount", "Must be positive"));
    }
    if input.current_amount < Decimal::ZERO || input.monthly_contribution < Decimal::ZERO {
        return Err(AdvisorError::validation(
            "current_amount",
            "Amounts must be non-negative",
        ));
    }
    let months = months_between(input.as_of, input.target_date);
    if months == 0 {
        return Err(AdvisorError::invalid_parameter(
            "target_date",
            format!("Must be at least one month after {}", input.as_of),
        ));
    }

    let rate = monthly_rate(input.expected_return);
    let projected_value = fv(rate, months, input.monthly_contribution, input.current_amount)?;
    let required = pmt(rate, months, input.current_amount, input.target_amount)?;
    let shortfall = (input.target_amount - projected_value).max(Decimal::ZERO);
    let progress = (input.current_amount / input.target_amount).min(Decimal::ONE);

    if months < 12 && shortfall > Decimal::ZERO {
        warnings.push("Less than a year remains and the goal is projected to fall short".into());
    }

    let output = GoalProjection {
        name: input.name.clone(),
        kind: input.kind.clone(),
        progress: progress.round_dp(4),
        months_remaining: months,
        projected_value: projected_value.round_dp(2),
        required_monthly_contribution: required.max(Decimal::ZERO).round_dp(2),
        shortfall: shortfall.round_dp(2),
        on_track: shortfall.is_zero(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Future value of current savings plus end-of-month contributions",
        &serde_json::json!({
            "expected_return": input.expected_return.to_string(),
            "monthly_rate": rate.round_dp(8).to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Whole months from `from` to `to`, zero when `to` is not later.
fn months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    if to <= from {
        return 0;
    }
    let mut months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    if to.day() < from.day() {
        months -= 1;
    }
    months.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn goal() -> GoalInput {
        GoalInput {
            name: "House Down Payment".into(),
            kind: Some("house".into()),
            target_amount: dec!(100000),
            current_amount: dec!(50000),
            target_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            monthly_contribution: dec!(500),
            expected_return: Decimal::ZERO,
            as_of: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        }
    }

    #[test]
    fn test_zero_return_projection() {
        let out = project_goal(&goal()).unwrap().result;
        assert_eq!(out.months_remaining, 60);
        assert_eq!(out.projected_value, dec!(80000));
        assert_eq!(out.shortfall, dec!(20000));
        assert_eq!(out.required_monthly_contribution, dec!(833.33));
        assert_eq!(out.progress, dec!(0.5));
        assert!(!out.on_track);
    }

    #[test]
    fn test_on_track_with_growth() {
        let mut g = goal();
        g.expected_return = dec!(0.08);
        g.monthly_contribution = dec!(1000);
        let out = project_goal(&g).unwrap().result;
        assert!(out.on_track);
        assert!(out.projected_value > dec!(100000));
        assert!(out.required_monthly_contribution < dec!(1000));
    }

    #[test]
    fn test_already_funded_needs_nothing() {
        let mut g = goal();
        g.current_amount = dec!(150000);
        let out = project_goal(&g).unwrap().result;
        assert_eq!(out.required_monthly_contribution, Decimal::ZERO);
        assert_eq!(out.progress, Decimal::ONE);
    }

    #[test]
    fn test_past_target_date_rejected() {
        let mut g = goal();
        g.target_date = g.as_of;
        assert!(matches!(
            project_goal(&g).unwrap_err(),
            AdvisorError::InvalidParameter { .. }
        ));
    }

    #[test]
    fn test_months_between() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(months_between(d(2025, 1, 15), d(2025, 3, 14)), 1);
        assert_eq!(months_between(d(2025, 1, 15), d(2025, 3, 15)), 2);
        assert_eq!(months_between(d(2025, 3, 1), d(2025, 1, 1)), 0);
    }
}
