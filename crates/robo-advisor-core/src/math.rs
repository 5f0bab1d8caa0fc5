//! Decimal linear algebra and statistics shared by the optimizer,
//! simulator and statistics code.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::AdvisorError;
use crate::AdvisorResult;

const PIVOT_EPSILON: Decimal = dec!(0.000000000001);

/// Matrix-vector multiplication.
pub fn mat_vec_multiply(mat: &[Vec<Decimal>], v: &[Decimal]) -> Vec<Decimal> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Dot product.
pub fn vec_dot(a: &[Decimal], b: &[Decimal]) -> Decimal {
    a.iter().zip(b.iter()).map(|(x, y)| *x * *y).sum()
}

/// Quadratic form w' * M * w.
pub fn quadratic_form(w: &[Decimal], mat: &[Vec<Decimal>]) -> Decimal {
    vec_dot(w, &mat_vec_multiply(mat, w))
}

/// Solve A x = b via Gauss-Jordan elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
pub fn solve_linear_system(a: &[Vec<Decimal>], b: &[Decimal]) -> AdvisorResult<Vec<Decimal>> {
    let n = a.len();
    if b.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(AdvisorError::invalid_parameter(
            "linear_system",
            format!("Expected a square {n}x{n} system"),
        ));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut aug: Vec<Vec<Decimal>> = a
        .iter()
        .zip(b.iter())
        .map(|(row, rhs)| {
            let mut r = row.clone();
            r.push(*rhs);
            r
        })
        .collect();

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < PIVOT_EPSILON {
            return Err(AdvisorError::Computation {
                function: "solve_linear_system".into(),
                iterations: col as u32,
                detail: "singular system".into(),
            });
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }

        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor.is_zero() {
                continue;
            }
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
    }

    Ok(aug.iter().map(|row| row[n]).collect())
}

/// Square root via Newton's method.
pub fn sqrt_decimal(val: Decimal) -> Decimal {
    if val <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if val == Decimal::ONE {
        return Decimal::ONE;
    }
    let two = dec!(2);
    let mut guess = if val > Decimal::ONE { val / two } else { Decimal::ONE };
    for _ in 0..100 {
        let next = (guess + val / guess) / two;
        if (next - guess).abs() < dec!(0.0000000000000001) {
            return next;
        }
        guess = next;
    }
    guess
}

pub fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().sum::<Decimal>() / Decimal::from(values.len() as i64)
}

/// Sample covariance of two equally long series (n - 1 denominator).
pub fn sample_covariance(a: &[Decimal], b: &[Decimal]) -> Decimal {
    let n = a.len().min(b.len());
    if n < 2 {
        return Decimal::ZERO;
    }
    let ma = mean(&a[..n]);
    let mb = mean(&b[..n]);
    let sum: Decimal = a[..n]
        .iter()
        .zip(b[..n].iter())
        .map(|(x, y)| (*x - ma) * (*y - mb))
        .sum();
    sum / Decimal::from((n - 1) as i64)
}

pub fn sample_std_dev(values: &[Decimal]) -> Decimal {
    sqrt_decimal(sample_covariance(values, values))
}

/// Sharpe ratio with division-by-zero guard.
pub fn sharpe_ratio(ret: Decimal, rf: Decimal, risk: Decimal) -> Decimal {
    if risk.is_zero() {
        Decimal::ZERO
    } else {
        (ret - rf) / risk
    }
}

/// Largest peak-to-trough decline of a value series, as a positive fraction.
pub fn max_drawdown(values: &[Decimal]) -> Decimal {
    let mut peak = Decimal::ZERO;
    let mut max_dd = Decimal::ZERO;
    for v in values {
        if *v > peak {
            peak = *v;
        }
        if peak > Decimal::ZERO {
            let dd = (peak - *v) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

pub fn to_decimal(v: f64) -> Decimal {
    if !v.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_f64(v).unwrap_or(Decimal::ZERO)
}

pub fn to_f64(v: Decimal) -> f64 {
    v.to_f64().unwrap_or(0.0)
}
