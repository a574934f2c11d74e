use ginzu_core::valuation::{
    compute_dilution_adjusted_option_value, compute_ginzu, compute_rnd_capitalization,
    DistressProceedsTie, GinzuInputs, OptionValuationInput, RndCapitalizationInput,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Shared fixtures
// ===========================================================================

// Amazon FY2023 snapshot, currency in millions. Reference values come from
// the fcffsimpleginzu model run on the same inputs.
fn amazon_baseline() -> GinzuInputs {
    GinzuInputs {
        revenues_base: dec!(574785),
        ebit_reported_base: dec!(36852),
        book_equity: dec!(201875),
        book_debt: dec!(161574),
        cash: dec!(86780),
        non_operating_assets: dec!(2954),
        minority_interests: dec!(0),
        shares_outstanding: dec!(10492),
        stock_price: dec!(169),
        rev_growth_y1: dec!(0.12),
        rev_cagr_y2_5: dec!(0.12),
        margin_y1: dec!(0.1133),
        margin_target: dec!(0.14),
        margin_convergence_year: 5,
        sales_to_capital_1_5: dec!(1.5),
        sales_to_capital_6_10: dec!(1.5),
        riskfree_rate_now: dec!(0.0408),
        wacc_initial: dec!(0.086),
        tax_rate_effective: dec!(0.19),
        tax_rate_marginal: dec!(0.25),
        mature_market_erp: None,
        override_perpetual_growth: false,
        perpetual_growth_rate: None,
        override_riskfree_after_year10: false,
        riskfree_rate_after10: None,
        override_stable_wacc: false,
        stable_wacc: None,
        override_stable_roc: false,
        stable_roc: None,
        override_tax_rate_convergence: false,
        override_failure_probability: false,
        probability_of_failure: None,
        distress_proceeds_tie: None,
        distress_proceeds_percent: None,
        override_reinvestment_lag: false,
        reinvestment_lag_years: None,
        has_nol_carryforward: false,
        nol_start_year1: None,
        override_trapped_cash: false,
        trapped_cash_amount: None,
        trapped_cash_foreign_tax_rate: None,
        capitalize_rnd: false,
        rnd_asset: None,
        rnd_ebit_adjustment: None,
        capitalize_operating_leases: false,
        lease_debt: None,
        lease_ebit_adjustment: None,
        has_employee_options: false,
        options_value: None,
    }
}

fn assert_close(actual: Decimal, expected: Decimal, tolerance: Decimal) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}

// ===========================================================================
// Scenario 1: baseline
// ===========================================================================

#[test]
fn test_amazon_baseline_per_share_value() {
    let result = compute_ginzu(&amazon_baseline()).unwrap();
    let out = &result.result;

    // Reference model: 101.13 per share against a 169 market price
    assert_close(out.estimated_value_per_share, dec!(101.1298), dec!(0.001));
    assert_close(out.pv_10y, dec!(311009.24), dec!(0.01));
    assert_close(out.pv_terminal_value, dec!(821884.78), dec!(0.01));
    assert_close(out.value_of_equity_common, dec!(1061054.02), dec!(0.01));

    // Stock trades above intrinsic value in this snapshot
    let ratio = out.price_as_percent_of_value.unwrap();
    assert!(ratio > Decimal::ONE);
    assert_close(ratio, dec!(1.6712), dec!(0.0005));
}

#[test]
fn test_amazon_baseline_tableau_shape() {
    let result = compute_ginzu(&amazon_baseline()).unwrap();
    let out = &result.result;

    assert_eq!(out.projections.len(), 10);
    assert_eq!(out.projections[0].period.year, 1);
    assert_eq!(out.projections[9].period.label, "Year 10");
    assert!(!out.projections[9].period.is_terminal);

    // Terminal revenue compounds Year 10 at g
    assert_close(
        out.terminal.revenue,
        out.projections[9].revenue * (Decimal::ONE + dec!(0.0408)),
        dec!(0.0000001),
    );
    // FCFF identity holds in every year
    for p in &out.projections {
        assert_eq!(p.fcff, p.ebit_after_tax - p.reinvestment);
        assert_eq!(p.pv_fcff, p.fcff * p.discount_factor);
    }
}

// ===========================================================================
// Scenarios 2-3: growth and discount-rate stress
// ===========================================================================

#[test]
fn test_higher_growth_raises_value() {
    let mut inputs = amazon_baseline();
    inputs.rev_growth_y1 = dec!(0.20);
    inputs.rev_cagr_y2_5 = dec!(0.15);

    let stressed = compute_ginzu(&inputs).unwrap().result;
    let baseline = compute_ginzu(&amazon_baseline()).unwrap().result;

    assert!(stressed.estimated_value_per_share > baseline.estimated_value_per_share);
    assert_close(stressed.estimated_value_per_share, dec!(119.4269), dec!(0.001));
}

#[test]
fn test_higher_wacc_lowers_value() {
    let mut inputs = amazon_baseline();
    inputs.wacc_initial = dec!(0.10);

    let stressed = compute_ginzu(&inputs).unwrap().result;
    let baseline = compute_ginzu(&amazon_baseline()).unwrap().result;

    assert!(stressed.estimated_value_per_share < baseline.estimated_value_per_share);
    assert_close(stressed.estimated_value_per_share, dec!(92.2733), dec!(0.001));
}

// ===========================================================================
// Scenario 4: failure probability
// ===========================================================================

#[test]
fn test_failure_probability_blends_book_tied_proceeds() {
    let mut inputs = amazon_baseline();
    inputs.override_failure_probability = true;
    inputs.probability_of_failure = Some(dec!(0.10));
    inputs.distress_proceeds_tie = Some(DistressProceedsTie::BookValue);
    inputs.distress_proceeds_percent = Some(dec!(0.50));

    let out = compute_ginzu(&inputs).unwrap().result;

    // Proceeds = 50% of book capital
    let expected_proceeds = (dec!(201875) + dec!(161574)) * dec!(0.50);
    assert_eq!(out.proceeds_if_failure, expected_proceeds);
    // Operating assets = 0.9 * going concern + 0.1 * distress proceeds
    assert_eq!(
        out.value_of_operating_assets,
        out.pv_sum * dec!(0.9) + expected_proceeds * dec!(0.1)
    );
    assert_close(out.estimated_value_per_share, dec!(92.0642), dec!(0.001));
}

#[test]
fn test_failure_probability_blends_value_tied_proceeds() {
    let mut inputs = amazon_baseline();
    inputs.override_failure_probability = true;
    inputs.probability_of_failure = Some(dec!(0.15));
    inputs.distress_proceeds_tie = Some(DistressProceedsTie::FairValue);
    inputs.distress_proceeds_percent = Some(dec!(0.40));

    let out = compute_ginzu(&inputs).unwrap().result;

    assert_eq!(out.proceeds_if_failure, out.pv_sum * dec!(0.40));
    assert_close(out.value_of_operating_assets, dec!(1030933.5568), dec!(0.01));
}

// ===========================================================================
// Scenario 5: perpetual growth pin
// ===========================================================================

#[test]
fn test_perpetual_growth_pin_reshapes_fade_and_terminal_value() {
    let mut inputs = amazon_baseline();
    inputs.override_perpetual_growth = true;
    inputs.perpetual_growth_rate = Some(dec!(0.03));

    let out = compute_ginzu(&inputs).unwrap().result;

    // Fade from 12% to 3% in five equal steps of 1.8%
    assert_eq!(out.projections[5].growth_rate, dec!(0.102));
    assert_eq!(out.projections[7].growth_rate, dec!(0.066));
    assert_eq!(out.projections[9].growth_rate, dec!(0.03));
    assert_eq!(out.terminal.growth_rate, dec!(0.03));

    // Stable WACC stays at the derived 8.41%; only g moved
    assert_eq!(out.stable_state.stable_wacc, dec!(0.0841));
    assert_eq!(
        out.terminal_value,
        out.terminal.fcff / (dec!(0.0841) - dec!(0.03))
    );
    assert_close(out.estimated_value_per_share, dec!(99.4414), dec!(0.001));
}

// ===========================================================================
// Scenario 6: NOL shielding
// ===========================================================================

#[test]
fn test_nol_carryforward_shields_early_years() {
    let mut inputs = amazon_baseline();
    inputs.has_nol_carryforward = true;
    inputs.nol_start_year1 = Some(dec!(300000));

    let out = compute_ginzu(&inputs).unwrap().result;
    let y1 = &out.projections[0];
    let y2 = &out.projections[1];

    // The carryforward exceeds two years of EBIT: no taxes paid
    assert!(dec!(300000) > y1.ebit + y2.ebit);
    assert_eq!(y1.ebit_after_tax, y1.ebit);
    assert_eq!(y2.ebit_after_tax, y2.ebit);
    assert_eq!(y2.nol, dec!(300000) - y1.ebit - y2.ebit);

    // Terminal year ignores any NOL remaining
    assert_eq!(
        out.terminal.ebit_after_tax,
        out.terminal.ebit * (Decimal::ONE - dec!(0.25))
    );
}

// ===========================================================================
// Cross-module scenarios
// ===========================================================================

#[test]
fn test_capitalized_rnd_flows_into_the_valuation() {
    // R&D converter feeds the engine the way the source model wires them
    let rnd = compute_rnd_capitalization(&RndCapitalizationInput {
        amortization_years: 3,
        current_year_expense: dec!(85622),
        prior_year_expenses: vec![dec!(73213), dec!(56052), dec!(42740)],
    })
    .unwrap()
    .result;

    assert_eq!(rnd.ebit_adjustment, dec!(28287));

    let mut inputs = amazon_baseline();
    inputs.capitalize_rnd = true;
    inputs.rnd_asset = Some(rnd.research_asset);
    inputs.rnd_ebit_adjustment = Some(rnd.ebit_adjustment);
    inputs.margin_y1 = (dec!(36852) + rnd.ebit_adjustment) / dec!(574785);
    inputs.mature_market_erp = Some(dec!(0.0411));

    let out = compute_ginzu(&inputs).unwrap().result;

    assert_eq!(out.base.ebit, dec!(36852) + dec!(28287));
    assert_close(out.estimated_value_per_share, dec!(103.7946), dec!(0.001));
}

#[test]
fn test_option_overhang_flows_into_the_equity_bridge() {
    let options = compute_dilution_adjusted_option_value(&OptionValuationInput {
        stock_price: dec!(169),
        strike_price: dec!(80),
        riskfree_rate: dec!(0.0408),
        volatility: dec!(0.30),
        maturity_years: dec!(5),
        options_outstanding: dec!(100),
        shares_outstanding: dec!(10492),
    })
    .unwrap()
    .result;

    let mut inputs = amazon_baseline();
    inputs.has_employee_options = true;
    inputs.options_value = Some(options.total_option_value);

    let with_options = compute_ginzu(&inputs).unwrap().result;
    let without = compute_ginzu(&amazon_baseline()).unwrap().result;

    assert_eq!(
        with_options.value_of_equity_common,
        without.value_of_equity_common - options.total_option_value
    );
    assert!(with_options.estimated_value_per_share < without.estimated_value_per_share);
}

#[test]
fn test_riskfree_after_year10_feeds_growth_and_stable_wacc() {
    let mut inputs = amazon_baseline();
    inputs.override_riskfree_after_year10 = true;
    inputs.riskfree_rate_after10 = Some(dec!(0.035));

    let out = compute_ginzu(&inputs).unwrap().result;

    assert_eq!(out.stable_state.perpetual_growth_rate, dec!(0.035));
    assert_eq!(out.stable_state.stable_wacc, dec!(0.035) + dec!(0.0433));
    assert_close(out.estimated_value_per_share, dec!(107.4084), dec!(0.001));
}

#[test]
fn test_tax_convergence_override_keeps_effective_rate() {
    let mut inputs = amazon_baseline();
    inputs.override_tax_rate_convergence = true;

    let out = compute_ginzu(&inputs).unwrap().result;

    assert_eq!(out.projections[9].tax_rate, dec!(0.19));
    assert_eq!(out.terminal.tax_rate, dec!(0.19));
    assert_close(out.estimated_value_per_share, dec!(108.9779), dec!(0.001));
}

#[test]
fn test_trapped_cash_reduces_the_bridge() {
    let mut inputs = amazon_baseline();
    inputs.override_trapped_cash = true;
    inputs.trapped_cash_amount = Some(dec!(50000));
    inputs.trapped_cash_foreign_tax_rate = Some(dec!(0.10));

    let out = compute_ginzu(&inputs).unwrap().result;

    // 86780 - 50000 * (0.25 - 0.10) = 79280
    assert_eq!(out.cash_adjusted, dec!(79280));
    assert_close(out.estimated_value_per_share, dec!(100.4150), dec!(0.001));
}

// ===========================================================================
// Determinism
// ===========================================================================

#[test]
fn test_repeated_runs_are_identical() {
    let inputs = amazon_baseline();
    let first = compute_ginzu(&inputs).unwrap();
    let second = compute_ginzu(&inputs).unwrap();

    assert_eq!(
        serde_json::to_value(&first.result).unwrap(),
        serde_json::to_value(&second.result).unwrap()
    );
}

#[test]
fn test_outputs_serialize_to_json() {
    let result = compute_ginzu(&amazon_baseline()).unwrap();
    let json = serde_json::to_string(&result).unwrap();

    assert!(json.contains("estimated_value_per_share"));
    assert!(json.contains("\"methodology\""));
    // Sparse overrides stay out of the assumptions snapshot
    assert!(!json.contains("perpetual_growth_rate\":null"));
}
