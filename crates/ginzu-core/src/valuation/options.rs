use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate, Years};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Inputs for valuing an employee-option overhang.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionValuationInput {
    pub stock_price: Money,
    /// Weighted-average strike of the outstanding options
    pub strike_price: Money,
    pub riskfree_rate: Rate,
    /// Annualized volatility as a fraction
    pub volatility: Rate,
    /// Weighted-average time to maturity in years
    pub maturity_years: Years,
    pub options_outstanding: Decimal,
    pub shares_outstanding: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionValuationOutput {
    /// Share price after folding in the strike proceeds of full exercise
    pub adjusted_stock_price: Money,
    pub value_per_option: Money,
    /// Deduct from equity value to reach common-stock equity
    pub total_option_value: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Value employee options as European calls on a dilution-adjusted share
/// price: S* = (S * shares + K * options) / (shares + options).
///
/// Degenerate inputs (no time value, no volatility, non-positive prices, or
/// no options outstanding) value to zero rather than failing; a caller with
/// no option overhang simply gets nothing to deduct.
pub fn compute_dilution_adjusted_option_value(
    input: &OptionValuationInput,
) -> ValuationResult<ComputationOutput<OptionValuationOutput>> {
    let start = Instant::now();

    if input.shares_outstanding <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "shares_outstanding".into(),
            reason: "must be positive".into(),
        });
    }

    let output = if input.options_outstanding <= Decimal::ZERO {
        OptionValuationOutput {
            adjusted_stock_price: input.stock_price,
            value_per_option: Decimal::ZERO,
            total_option_value: Decimal::ZERO,
        }
    } else {
        let adjusted = (input.stock_price * input.shares_outstanding
            + input.strike_price * input.options_outstanding)
            / (input.shares_outstanding + input.options_outstanding);

        let value_per_option = black_scholes_call(
            adjusted,
            input.strike_price,
            input.riskfree_rate,
            input.volatility,
            input.maturity_years,
        );

        OptionValuationOutput {
            adjusted_stock_price: adjusted,
            value_per_option,
            total_option_value: value_per_option * input.options_outstanding,
        }
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Dilution-adjusted Black-Scholes (European call)",
        input,
        Vec::new(),
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Black-Scholes internals
// ---------------------------------------------------------------------------

fn black_scholes_call(spot: Money, strike: Money, rate: Rate, volatility: Rate, maturity: Years) -> Money {
    if spot <= Decimal::ZERO
        || strike <= Decimal::ZERO
        || maturity <= Decimal::ZERO
        || volatility <= Decimal::ZERO
    {
        return Decimal::ZERO;
    }

    let sqrt_t = sqrt_decimal(maturity);
    let vol_sqrt_t = volatility * sqrt_t;
    let d1 = (ln_decimal(spot / strike) + (rate + volatility * volatility / dec!(2)) * maturity)
        / vol_sqrt_t;
    let d2 = d1 - vol_sqrt_t;

    spot * norm_cdf(d1) - strike * exp_decimal(-rate * maturity) * norm_cdf(d2)
}

// ---------------------------------------------------------------------------
// Decimal math helpers (no f64 round-trips in the pricing path)
// ---------------------------------------------------------------------------

/// Taylor-series exp(x), halving the argument recursively until |x| <= 2.
fn exp_decimal(x: Decimal) -> Decimal {
    let two = dec!(2);
    if x > two || x < -two {
        let half = exp_decimal(x / two);
        return half * half;
    }

    let mut sum = Decimal::ONE;
    let mut term = Decimal::ONE;
    for n in 1u32..=25 {
        term = term * x / Decimal::from(n);
        sum += term;
    }
    sum
}

/// Newton-iteration square root; 25 rounds from a magnitude-scaled guess.
fn sqrt_decimal(x: Decimal) -> Decimal {
    if x <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if x == Decimal::ONE {
        return Decimal::ONE;
    }
    let two = dec!(2);
    let mut guess = if x > dec!(100) {
        dec!(10)
    } else if x < dec!(0.01) {
        dec!(0.1)
    } else {
        x / two
    };
    for _ in 0..25 {
        guess = (guess + x / guess) / two;
    }
    guess
}

/// Natural log via Newton's method on exp: y <- y - 1 + x / exp(y).
fn ln_decimal(x: Decimal) -> Decimal {
    if x <= Decimal::ZERO {
        // Undefined; callers guard, sentinel keeps the arithmetic total
        return dec!(-999);
    }
    if x == Decimal::ONE {
        return Decimal::ZERO;
    }

    let e = dec!(2.718281828459045);
    let mut y = if x > dec!(0.5) && x < dec!(2) {
        x - Decimal::ONE
    } else {
        // Peel powers of e to land near the root before iterating
        let mut exponent = Decimal::ZERO;
        let mut v = x;
        if x > Decimal::ONE {
            while v > e {
                v /= e;
                exponent += Decimal::ONE;
            }
        } else {
            while v < Decimal::ONE / e {
                v *= e;
                exponent -= Decimal::ONE;
            }
        }
        exponent + (v - Decimal::ONE)
    };

    for _ in 0..30 {
        let ey = exp_decimal(y);
        if ey == Decimal::ZERO {
            break;
        }
        y = y - Decimal::ONE + x / ey;
    }
    y
}

/// Standard normal PDF
fn norm_pdf(x: Decimal) -> Decimal {
    let two_pi = dec!(6.283185307179586);
    exp_decimal(-(x * x) / dec!(2)) / sqrt_decimal(two_pi)
}

/// Standard normal CDF, Abramowitz & Stegun polynomial approximation.
/// Accurate to about 7.5e-8 in absolute terms.
fn norm_cdf(x: Decimal) -> Decimal {
    let b1 = dec!(0.319381530);
    let b2 = dec!(-0.356563782);
    let b3 = dec!(1.781477937);
    let b4 = dec!(-1.821255978);
    let b5 = dec!(1.330274429);
    let p = dec!(0.2316419);

    let abs_x = x.abs();
    let t = Decimal::ONE / (Decimal::ONE + p * abs_x);
    let poly = t * (b1 + t * (b2 + t * (b3 + t * (b4 + t * b5))));
    let cdf_pos = Decimal::ONE - norm_pdf(abs_x) * poly;

    if x < Decimal::ZERO {
        Decimal::ONE - cdf_pos
    } else {
        cdf_pos
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
