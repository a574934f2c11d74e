use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Inputs for capitalizing R&D as an asset instead of expensing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RndCapitalizationInput {
    /// Straight-line amortization life in years (1..=10)
    pub amortization_years: u32,
    /// R&D expense of the current (base) year
    pub current_year_expense: Money,
    /// Prior-year R&D expenses, newest first. May be shorter than the
    /// amortization life; missing years count as zero.
    pub prior_year_expenses: Vec<Money>,
}

/// The two adjustments the valuation engine consumes, plus the amortization
/// behind them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RndCapitalizationOutput {
    /// Unamortized R&D carried as an operating asset
    pub research_asset: Money,
    /// This year's amortization of prior-year R&D
    pub current_year_amortization: Money,
    /// Add to reported EBIT: current expense minus current amortization
    pub ebit_adjustment: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Capitalize R&D with straight-line amortization over an equal life.
///
/// A prior-year expense k years back retains an unamortized fraction of
/// (N - k) / N; the current year is carried in full. Amortization charges
/// each surviving prior year at 1/N.
pub fn compute_rnd_capitalization(
    input: &RndCapitalizationInput,
) -> ValuationResult<ComputationOutput<RndCapitalizationOutput>> {
    let start = Instant::now();

    validate(input)?;

    let life = Decimal::from(input.amortization_years);
    let mut research_asset = input.current_year_expense;
    let mut current_year_amortization = Decimal::ZERO;

    for (k, expense) in input.prior_year_expenses.iter().enumerate() {
        let years_back = Decimal::from(k as u32 + 1);
        let unamortized_fraction = (life - years_back) / life;
        research_asset += expense * unamortized_fraction;
        current_year_amortization += expense / life;
    }

    let output = RndCapitalizationOutput {
        research_asset,
        current_year_amortization,
        ebit_adjustment: input.current_year_expense - current_year_amortization,
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Straight-line R&D capitalization",
        input,
        Vec::new(),
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate(input: &RndCapitalizationInput) -> ValuationResult<()> {
    if !(1..=10).contains(&input.amortization_years) {
        return Err(ValuationError::InvalidInput {
            field: "amortization_years".into(),
            reason: "must be between 1 and 10".into(),
        });
    }
    if input.current_year_expense < Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "current_year_expense".into(),
            reason: "must not be negative".into(),
        });
    }
    if input.prior_year_expenses.len() > input.amortization_years as usize {
        return Err(ValuationError::InvalidInput {
            field: "prior_year_expenses".into(),
            reason: format!(
                "at most {} years fit an amortization life of {}",
                input.amortization_years, input.amortization_years
            ),
        });
    }
    if input.prior_year_expenses.iter().any(|e| *e < Decimal::ZERO) {
        return Err(ValuationError::InvalidInput {
            field: "prior_year_expenses".into(),
            reason: "must not contain negative amounts".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
