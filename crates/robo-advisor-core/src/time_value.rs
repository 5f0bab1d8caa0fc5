use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::AdvisorError;
use crate::types::{Money, Rate};
use crate::AdvisorResult;

fn check_rate(rate: Rate) -> AdvisorResult<()> {
    if rate <= dec!(-1) {
        return Err(AdvisorError::invalid_parameter(
            "rate",
            "Periodic rate must be greater than -100%",
        ));
    }
    Ok(())
}

/// Growth factor (1 + r)^n.
pub fn compound(rate: Rate, nper: u32) -> Decimal {
    (Decimal::ONE + rate).powu(nper as u64)
}

/// Future value of a present balance plus end-of-period payments.
pub fn fv(rate: Rate, nper: u32, payment: Money, present_value: Money) -> AdvisorResult<Money> {
    check_rate(rate)?;
    if rate.is_zero() {
        return Ok(present_value + payment * Decimal::from(nper));
    }
    let factor = compound(rate, nper);
    let annuity_factor = (factor - Decimal::ONE) / rate;
    Ok(present_value * factor + payment * annuity_factor)
}

/// End-of-period payment that grows `present_value` into `future_value`
/// over `nper` periods. Negative when the balance already outgrows the target.
pub fn pmt(rate: Rate, nper: u32, present_value: Money, future_value: Money) -> AdvisorResult<Money> {
    if nper == 0 {
        return Err(AdvisorError::invalid_parameter(
            "nper",
            "Number of periods must be > 0",
        ));
    }
    check_rate(rate)?;

    if rate.is_zero() {
        return Ok((future_value - present_value) / Decimal::from(nper));
    }

    let factor = compound(rate, nper);
    let annuity_factor = (factor - Decimal::ONE) / rate;

    if annuity_factor.is_zero() {
        return Err(AdvisorError::Computation {
            function: "pmt".into(),
            iterations: 0,
            detail: "annuity factor is zero".into(),
        });
    }

    Ok((future_value - present_value * factor) / annuity_factor)
}

/// Convert an annual rate to its equivalent monthly compounding rate.
pub fn monthly_rate(annual: Rate) -> Rate {
    if annual <= dec!(-1) {
        return dec!(-1);
    }
    if annual.is_zero() {
        return Decimal::ZERO;
    }
    (Decimal::ONE + annual).powd(Decimal::ONE / dec!(12)) - Decimal::ONE
}
