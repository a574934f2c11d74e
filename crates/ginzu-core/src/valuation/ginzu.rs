use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Multiple, ProjectionPeriod, Rate};
use crate::ValuationResult;

use super::inputs::{DistressProceedsTie, GinzuInputs};

/// Explicit forecast horizon. The tableau is this plus a stable terminal year.
pub const FORECAST_YEARS: usize = 10;
/// Years over which growth, tax rate, and WACC fade into the stable state.
pub const STABLE_TRANSITION_YEARS: usize = 5;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Base-year (Year 0) slots of the valuation tableau.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GinzuBaseYear {
    pub revenue: Money,
    pub margin: Rate,
    /// Reported EBIT plus capitalized R&D / operating-lease adjustments.
    pub ebit: Money,
    pub tax_rate: Rate,
    pub ebit_after_tax: Money,
    pub nol: Money,
}

/// Projection for one explicit forecast year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GinzuYearProjection {
    pub period: ProjectionPeriod,
    pub revenue: Money,
    pub growth_rate: Rate,
    pub margin: Rate,
    pub ebit: Money,
    pub tax_rate: Rate,
    /// NOL balance remaining after this year's shield.
    pub nol: Money,
    pub ebit_after_tax: Money,
    pub sales_to_capital: Multiple,
    pub reinvestment: Money,
    pub fcff: Money,
    pub cost_of_capital: Rate,
    /// Cumulative discount factor through this year.
    pub discount_factor: Rate,
    pub pv_fcff: Money,
}

/// The stable terminal year. After-tax EBIT here ignores any remaining NOL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GinzuTerminalYear {
    pub revenue: Money,
    pub growth_rate: Rate,
    pub margin: Rate,
    pub ebit: Money,
    pub tax_rate: Rate,
    pub ebit_after_tax: Money,
    pub reinvestment: Money,
    pub fcff: Money,
    pub cost_of_capital: Rate,
}

/// Stable-state parameters the run actually used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StableStateParameters {
    pub perpetual_growth_rate: Rate,
    pub stable_wacc: Rate,
    pub stable_roc: Rate,
    pub terminal_tax_rate: Rate,
}

/// Full output of one Ginzu valuation: the year-by-year tableau plus the
/// headline equity-bridge scalars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GinzuOutputs {
    pub base: GinzuBaseYear,
    pub projections: Vec<GinzuYearProjection>,
    pub terminal: GinzuTerminalYear,

    /// Sum of PV(FCFF) over the ten explicit years
    pub pv_10y: Money,
    pub terminal_value: Money,
    pub pv_terminal_value: Money,
    pub pv_sum: Money,

    pub probability_of_failure: Rate,
    pub proceeds_if_failure: Money,
    pub value_of_operating_assets: Money,

    /// Book debt plus capitalized operating leases
    pub debt_outstanding: Money,
    /// Cash net of the incremental tax on trapped foreign cash
    pub cash_adjusted: Money,
    pub value_of_equity: Money,
    pub options_value: Money,
    pub value_of_equity_common: Money,
    pub estimated_value_per_share: Money,
    /// Market price over estimated value; absent when the estimate is zero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_as_percent_of_value: Option<Rate>,

    pub stable_state: StableStateParameters,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the 14-step FCFF "Simple Ginzu" valuation.
///
/// Ten explicit forecast years plus a stable terminal year, folded into a
/// per-share equity value. Pure: no I/O, no hidden state, deterministic for
/// a given input record.
pub fn compute_ginzu(inputs: &GinzuInputs) -> ValuationResult<ComputationOutput<GinzuOutputs>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    inputs.validate()?;
    let stable = inputs.resolve_stable_state();
    let g = stable.perpetual_growth_rate;

    // --- Growth path and revenues (Steps 1-2) ---
    let growth_rates = build_growth_path(inputs.rev_growth_y1, inputs.rev_cagr_y2_5, g);
    let revenues = compound_revenues(inputs.revenues_base, &growth_rates)?;

    // --- Margins and EBIT on the adjusted base (Steps 3-4) ---
    let base_ebit = inputs.ebit_reported_base + inputs.base_ebit_adjustment();
    let base_margin = base_ebit / inputs.revenues_base;
    let margins = build_margin_path(
        base_margin,
        inputs.margin_y1,
        inputs.margin_target,
        inputs.margin_convergence_year,
    );
    let mut ebit: Vec<Money> = Vec::with_capacity(FORECAST_YEARS + 1);
    ebit.push(base_ebit);
    for year in 1..=FORECAST_YEARS {
        ebit.push(revenues[year] * margins[year]);
    }

    // --- Tax convergence and the NOL shield (Steps 5-6) ---
    let tax_rates = build_tax_path(inputs.tax_rate_effective, stable.terminal_tax_rate);
    let (nol, ebit_after_tax) = apply_nol_shield(&ebit, &tax_rates, inputs.resolved_nol_start());

    // --- Reinvestment (Steps 7-8) ---
    let sales_to_capital =
        build_sales_to_capital(inputs.sales_to_capital_1_5, inputs.sales_to_capital_6_10);
    let lag = inputs.resolved_reinvestment_lag();
    let reinvestment = build_reinvestment(&revenues, &sales_to_capital, lag, g)?;

    // --- Terminal-year operating results ---
    let revenue_terminal = revenues[FORECAST_YEARS]
        .checked_mul(Decimal::ONE + g)
        .ok_or_else(|| overflow("terminal revenue"))?;
    let margin_terminal = margins[FORECAST_YEARS];
    let ebit_terminal = revenue_terminal * margin_terminal;
    let ebit_after_tax_terminal = ebit_terminal * (Decimal::ONE - stable.terminal_tax_rate);

    // --- Cost of capital path and discounting (Step 10) ---
    let wacc = build_wacc_path(inputs.wacc_initial, stable.stable_wacc);
    let discount_factors = build_discount_factors(&wacc)?;
    // Stable ROC defaults to the Year-10 cost of capital when not overridden
    let stable_roc = stable.stable_roc.unwrap_or(wacc[FORECAST_YEARS - 1]);

    let reinvestment_terminal = terminal_reinvestment(g, stable_roc, ebit_after_tax_terminal)?;

    // --- FCFF and present values (Steps 9 and 11) ---
    let fcff: Vec<Money> = (1..=FORECAST_YEARS)
        .map(|t| ebit_after_tax[t] - reinvestment[t - 1])
        .collect();
    let fcff_terminal = ebit_after_tax_terminal - reinvestment_terminal;

    let pv_fcff: Vec<Money> = (0..FORECAST_YEARS)
        .map(|i| fcff[i] * discount_factors[i])
        .collect();
    let pv_10y: Money = pv_fcff.iter().sum();

    // --- Terminal value (Step 12) ---
    let tv_denominator = stable.stable_wacc - g;
    if tv_denominator <= Decimal::ZERO {
        return Err(ValuationError::InvalidStableState(format!(
            "stable WACC ({}) must exceed the perpetual growth rate ({})",
            stable.stable_wacc, g
        )));
    }
    let terminal_value = fcff_terminal
        .checked_div(tv_denominator)
        .ok_or_else(|| overflow("terminal value"))?;
    let pv_terminal_value = terminal_value * discount_factors[FORECAST_YEARS - 1];
    let pv_sum = pv_10y + pv_terminal_value;

    // --- Failure-probability blend (Step 13) ---
    let (probability_of_failure, proceeds_if_failure) = if inputs.override_failure_probability {
        let proceeds = distress_proceeds(
            inputs.distress_proceeds_tie.unwrap_or(DistressProceedsTie::BookValue),
            inputs.book_equity,
            inputs.book_debt,
            pv_sum,
            inputs.distress_proceeds_percent.unwrap_or(Decimal::ZERO),
        );
        (
            inputs.probability_of_failure.unwrap_or(Decimal::ZERO),
            proceeds,
        )
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };
    let value_of_operating_assets = pv_sum * (Decimal::ONE - probability_of_failure)
        + proceeds_if_failure * probability_of_failure;

    // --- Equity bridge (Step 14) ---
    let debt_outstanding = inputs.debt_outstanding();
    let cash_adjusted = inputs.cash_adjusted();
    let value_of_equity = value_of_operating_assets - debt_outstanding - inputs.minority_interests
        + cash_adjusted
        + inputs.non_operating_assets;
    let options_value = inputs.resolved_options_value();
    let value_of_equity_common = value_of_equity - options_value;
    let estimated_value_per_share = value_of_equity_common / inputs.shares_outstanding;
    let price_as_percent_of_value = if estimated_value_per_share.is_zero() {
        None
    } else {
        Some(inputs.stock_price / estimated_value_per_share)
    };

    if pv_sum > Decimal::ZERO && pv_terminal_value / pv_sum > dec!(0.75) {
        warnings.push(format!(
            "Terminal value represents {:.1}% of total present value; the stable-state assumptions carry most of the valuation",
            pv_terminal_value / pv_sum * dec!(100)
        ));
    }
    if estimated_value_per_share < Decimal::ZERO {
        warnings.push(
            "Estimated value per share is negative; the equity bridge exceeds operating-asset value"
                .to_string(),
        );
    }

    // --- Assemble the tableau ---
    let base = GinzuBaseYear {
        revenue: inputs.revenues_base,
        margin: base_margin,
        ebit: base_ebit,
        tax_rate: tax_rates[0],
        ebit_after_tax: ebit_after_tax[0],
        nol: nol[0],
    };

    let projections: Vec<GinzuYearProjection> = (1..=FORECAST_YEARS)
        .map(|t| GinzuYearProjection {
            period: ProjectionPeriod {
                year: t as i32,
                label: format!("Year {t}"),
                is_terminal: false,
            },
            revenue: revenues[t],
            growth_rate: growth_rates[t - 1],
            margin: margins[t],
            ebit: ebit[t],
            tax_rate: tax_rates[t],
            nol: nol[t],
            ebit_after_tax: ebit_after_tax[t],
            sales_to_capital: sales_to_capital[t - 1],
            reinvestment: reinvestment[t - 1],
            fcff: fcff[t - 1],
            cost_of_capital: wacc[t - 1],
            discount_factor: discount_factors[t - 1],
            pv_fcff: pv_fcff[t - 1],
        })
        .collect();

    let terminal = GinzuTerminalYear {
        revenue: revenue_terminal,
        growth_rate: g,
        margin: margin_terminal,
        ebit: ebit_terminal,
        tax_rate: stable.terminal_tax_rate,
        ebit_after_tax: ebit_after_tax_terminal,
        reinvestment: reinvestment_terminal,
        fcff: fcff_terminal,
        cost_of_capital: stable.stable_wacc,
    };

    let output = GinzuOutputs {
        base,
        projections,
        terminal,
        pv_10y,
        terminal_value,
        pv_terminal_value,
        pv_sum,
        probability_of_failure,
        proceeds_if_failure,
        value_of_operating_assets,
        debt_outstanding,
        cash_adjusted,
        value_of_equity,
        options_value,
        value_of_equity_common,
        estimated_value_per_share,
        price_as_percent_of_value,
        stable_state: StableStateParameters {
            perpetual_growth_rate: g,
            stable_wacc: stable.stable_wacc,
            stable_roc,
            terminal_tax_rate: stable.terminal_tax_rate,
        },
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "FCFF Simple Ginzu DCF (10-year explicit + stable terminal)",
        inputs,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Year 1 uses its own growth rate, Years 2-5 the CAGR, and Years 6-10 fade
/// linearly to the perpetual growth rate in five equal steps.
fn build_growth_path(year1: Rate, years2_5: Rate, stable_growth: Rate) -> Vec<Rate> {
    let mut growth = Vec::with_capacity(FORECAST_YEARS);
    growth.push(year1);
    for _ in 2..=5 {
        growth.push(years2_5);
    }
    let year5 = growth[4];
    let decrement = (year5 - stable_growth) / Decimal::from(STABLE_TRANSITION_YEARS as u32);
    for step in 1..=STABLE_TRANSITION_YEARS {
        growth.push(year5 - decrement * Decimal::from(step as u32));
    }
    growth
}

/// Forward-compound base revenue through the growth path. Index 0 is the
/// base year, 1..=10 the forecast years.
fn compound_revenues(base: Money, growth_rates: &[Rate]) -> ValuationResult<Vec<Money>> {
    let mut revenues = Vec::with_capacity(FORECAST_YEARS + 1);
    revenues.push(base);
    let mut current = base;
    for g in growth_rates {
        current = current
            .checked_mul(Decimal::ONE + g)
            .ok_or_else(|| overflow("revenue projection"))?;
        revenues.push(current);
    }
    Ok(revenues)
}

/// Linear convergence from the Year-1 margin to the target margin, pinned to
/// the target exactly at the convergence year and flat afterwards.
fn build_margin_path(base_margin: Rate, year1: Rate, target: Rate, convergence_year: u32) -> Vec<Rate> {
    let mut margins = Vec::with_capacity(FORECAST_YEARS + 1);
    margins.push(base_margin);
    margins.push(year1);

    let slope = (target - year1) / Decimal::from(convergence_year);
    for year in 2..=FORECAST_YEARS as u32 {
        if year > convergence_year {
            margins.push(target);
        } else {
            margins.push(target - slope * Decimal::from(convergence_year - year));
        }
    }
    margins
}

/// Effective rate through Year 5, then five equal steps to the terminal
/// rate. Index 0 is the base year.
fn build_tax_path(effective: Rate, terminal: Rate) -> Vec<Rate> {
    let mut tax_rates = Vec::with_capacity(FORECAST_YEARS + 1);
    for _ in 0..=5 {
        tax_rates.push(effective);
    }
    let step = (terminal - effective) / Decimal::from(STABLE_TRANSITION_YEARS as u32);
    for k in 1..=STABLE_TRANSITION_YEARS {
        tax_rates.push(effective + step * Decimal::from(k as u32));
    }
    tax_rates
}

/// Run the NOL balance through the forecast. Loss years grow the balance;
/// profitable years draw it down before any cash taxes are paid.
///
/// Returns (nol, ebit_after_tax), both indexed 0..=10 with the base year at 0.
fn apply_nol_shield(
    ebit: &[Money],
    tax_rates: &[Rate],
    nol_start: Money,
) -> (Vec<Money>, Vec<Money>) {
    let mut nol = Vec::with_capacity(FORECAST_YEARS + 1);
    let mut ebit_after_tax = Vec::with_capacity(FORECAST_YEARS + 1);

    nol.push(nol_start);
    let base_after_tax = if ebit[0] > Decimal::ZERO {
        ebit[0] * (Decimal::ONE - tax_rates[0])
    } else {
        ebit[0]
    };
    ebit_after_tax.push(base_after_tax);

    let mut balance = nol_start;
    for year in 1..=FORECAST_YEARS {
        let year_ebit = ebit[year];

        if year_ebit <= Decimal::ZERO {
            // Losses accrue to the carryforward untaxed
            ebit_after_tax.push(year_ebit);
            balance -= year_ebit;
        } else if year_ebit < balance {
            // Fully shielded
            ebit_after_tax.push(year_ebit);
            balance -= year_ebit;
        } else {
            let taxes = (year_ebit - balance) * tax_rates[year];
            ebit_after_tax.push(year_ebit - taxes);
            balance = Decimal::ZERO;
        }
        nol.push(balance);
    }

    (nol, ebit_after_tax)
}

fn build_sales_to_capital(years1_5: Multiple, years6_10: Multiple) -> Vec<Multiple> {
    (1..=FORECAST_YEARS)
        .map(|year| if year <= 5 { years1_5 } else { years6_10 })
        .collect()
}

/// Reinvestment for each forecast year: the lagged revenue delta divided by
/// that year's sales-to-capital ratio. Revenue indices past Year 10
/// extrapolate at the perpetual growth rate.
fn build_reinvestment(
    revenues: &[Money],
    sales_to_capital: &[Multiple],
    lag: u32,
    stable_growth: Rate,
) -> ValuationResult<Vec<Money>> {
    let lag = lag as usize;
    let mut reinvestment = Vec::with_capacity(FORECAST_YEARS);
    for year in 1..=FORECAST_YEARS {
        let left = revenue_at(revenues, year + lag - 1, stable_growth)?;
        let right = revenue_at(revenues, year + lag, stable_growth)?;
        reinvestment.push((right - left) / sales_to_capital[year - 1]);
    }
    Ok(reinvestment)
}

fn revenue_at(revenues: &[Money], index: usize, stable_growth: Rate) -> ValuationResult<Money> {
    let last = revenues.len() - 1;
    if index <= last {
        return Ok(revenues[index]);
    }
    let steps_beyond = (index - last) as i64;
    let factor = (Decimal::ONE + stable_growth)
        .checked_powi(steps_beyond)
        .ok_or_else(|| overflow("revenue extrapolation"))?;
    revenues[last]
        .checked_mul(factor)
        .ok_or_else(|| overflow("revenue extrapolation"))
}

/// Initial WACC through Year 5, then five equal steps to the stable WACC.
fn build_wacc_path(initial: Rate, stable: Rate) -> Vec<Rate> {
    let mut wacc = vec![initial; 5];
    let step = (initial - stable) / Decimal::from(STABLE_TRANSITION_YEARS as u32);
    for k in 1..=STABLE_TRANSITION_YEARS {
        wacc.push(initial - step * Decimal::from(k as u32));
    }
    wacc
}

/// Cumulative discount factors compounded year by year at that year's WACC.
fn build_discount_factors(wacc: &[Rate]) -> ValuationResult<Vec<Rate>> {
    let mut discount_factors = Vec::with_capacity(FORECAST_YEARS);
    let mut cumulative = Decimal::ONE;
    for (i, year_wacc) in wacc.iter().enumerate() {
        let one_plus = Decimal::ONE + year_wacc;
        if one_plus <= Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: "wacc_initial".into(),
                reason: format!("cost of capital path reaches -100% at year {}", i + 1),
            });
        }
        cumulative = cumulative
            .checked_div(one_plus)
            .ok_or_else(|| overflow("discount factors"))?;
        discount_factors.push(cumulative);
    }
    Ok(discount_factors)
}

/// Stable-growth consistency: reinvestment = g / ROC of after-tax operating
/// income. No growth means no reinvestment in perpetuity.
fn terminal_reinvestment(
    stable_growth: Rate,
    stable_roc: Rate,
    ebit_after_tax_terminal: Money,
) -> ValuationResult<Money> {
    if stable_growth <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    if stable_roc <= Decimal::ZERO {
        return Err(ValuationError::InvalidStableState(format!(
            "stable return on capital ({stable_roc}) must be positive when perpetual growth is positive"
        )));
    }
    Ok(stable_growth / stable_roc * ebit_after_tax_terminal)
}

fn distress_proceeds(
    tie: DistressProceedsTie,
    book_equity: Money,
    book_debt: Money,
    pv_sum_pre_failure: Money,
    percent: Rate,
) -> Money {
    if percent <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    match tie {
        DistressProceedsTie::BookValue => (book_equity + book_debt) * percent,
        DistressProceedsTie::FairValue => pv_sum_pre_failure * percent,
    }
}

fn overflow(context: &str) -> ValuationError {
    ValuationError::NumericOverflow {
        context: context.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
