use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::{Money, Multiple, Rate};
use crate::ValuationResult;

/// Mature-market equity risk premium applied when the stable WACC is not
/// overridden and no explicit premium is supplied.
pub const DEFAULT_MATURE_MARKET_ERP: Decimal = dec!(0.0433);

/// Default one-year lag between the revenue delta and the reinvestment
/// that funds it.
pub const DEFAULT_REINVESTMENT_LAG_YEARS: u32 = 1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Anchor for distress proceeds when a failure probability is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistressProceedsTie {
    /// Percent of book capital (book equity + book debt)
    #[serde(rename = "B")]
    BookValue,
    /// Percent of the pre-failure DCF value
    #[serde(rename = "V")]
    FairValue,
}

/// Full input record for one Ginzu valuation.
///
/// Every override is a boolean switch paired with an optional payload. A
/// switch that is on with its payload absent fails validation; a payload
/// supplied with its switch off is ignored. All currency amounts must share
/// one unit (e.g. millions) with `shares_outstanding` on the same scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GinzuInputs {
    // Base-year snapshot
    pub revenues_base: Money,
    pub ebit_reported_base: Money,
    pub book_equity: Money,
    pub book_debt: Money,
    pub cash: Money,
    pub non_operating_assets: Money,
    pub minority_interests: Money,
    pub shares_outstanding: Decimal,
    /// Informational; only feeds the price-to-value ratio.
    pub stock_price: Money,

    // Growth drivers
    pub rev_growth_y1: Rate,
    pub rev_cagr_y2_5: Rate,

    // Margin drivers
    pub margin_y1: Rate,
    pub margin_target: Rate,
    /// Year (1..=10) at which the operating margin reaches its target.
    pub margin_convergence_year: u32,

    // Reinvestment efficiency
    pub sales_to_capital_1_5: Multiple,
    pub sales_to_capital_6_10: Multiple,

    // Rates
    pub riskfree_rate_now: Rate,
    pub wacc_initial: Rate,
    pub tax_rate_effective: Rate,
    pub tax_rate_marginal: Rate,

    /// Feeds the stable WACC when `override_stable_wacc` is off.
    /// Defaults to 4.33% when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mature_market_erp: Option<Rate>,

    // Stable-state overrides
    #[serde(default)]
    pub override_perpetual_growth: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perpetual_growth_rate: Option<Rate>,

    #[serde(default)]
    pub override_riskfree_after_year10: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub riskfree_rate_after10: Option<Rate>,

    #[serde(default)]
    pub override_stable_wacc: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_wacc: Option<Rate>,

    #[serde(default)]
    pub override_stable_roc: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_roc: Option<Rate>,

    /// Terminal tax rate stays at the effective rate instead of converging
    /// to the marginal rate.
    #[serde(default)]
    pub override_tax_rate_convergence: bool,

    // Failure probability
    #[serde(default)]
    pub override_failure_probability: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_of_failure: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distress_proceeds_tie: Option<DistressProceedsTie>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distress_proceeds_percent: Option<Rate>,

    // Reinvestment lag
    #[serde(default)]
    pub override_reinvestment_lag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reinvestment_lag_years: Option<u32>,

    // Net operating loss carryforward
    #[serde(default)]
    pub has_nol_carryforward: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nol_start_year1: Option<Money>,

    // Trapped cash
    #[serde(default)]
    pub override_trapped_cash: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trapped_cash_amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trapped_cash_foreign_tax_rate: Option<Rate>,

    // Optional-module payloads, pre-computed outside the engine
    #[serde(default)]
    pub capitalize_rnd: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rnd_asset: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rnd_ebit_adjustment: Option<Money>,

    #[serde(default)]
    pub capitalize_operating_leases: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_debt: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_ebit_adjustment: Option<Money>,

    #[serde(default)]
    pub has_employee_options: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_value: Option<Money>,
}

/// Stable-state parameters resolved before the projection pipeline runs.
///
/// `stable_roc` stays `None` when not overridden; the engine fills it with
/// the Year-10 cost of capital once the WACC fade is known.
#[derive(Debug, Clone, Copy)]
pub struct StableState {
    pub perpetual_growth_rate: Rate,
    pub stable_wacc: Rate,
    pub terminal_tax_rate: Rate,
    pub stable_roc: Option<Rate>,
}

// ---------------------------------------------------------------------------
// Validation and canonicalization
// ---------------------------------------------------------------------------

impl GinzuInputs {
    /// Fail-fast validation of sign, range, and switch/payload consistency.
    pub fn validate(&self) -> ValuationResult<()> {
        if self.revenues_base <= Decimal::ZERO {
            return Err(invalid("revenues_base", "must be positive"));
        }
        if self.shares_outstanding <= Decimal::ZERO {
            return Err(invalid("shares_outstanding", "must be positive"));
        }
        if self.stock_price <= Decimal::ZERO {
            return Err(invalid("stock_price", "must be positive"));
        }
        if self.book_debt < Decimal::ZERO {
            return Err(invalid("book_debt", "must not be negative"));
        }
        if self.cash < Decimal::ZERO {
            return Err(invalid("cash", "must not be negative"));
        }
        if self.non_operating_assets < Decimal::ZERO {
            return Err(invalid("non_operating_assets", "must not be negative"));
        }
        if self.minority_interests < Decimal::ZERO {
            return Err(invalid("minority_interests", "must not be negative"));
        }
        if !is_fraction(self.tax_rate_effective) {
            return Err(invalid("tax_rate_effective", "must be between 0 and 1"));
        }
        if !is_fraction(self.tax_rate_marginal) {
            return Err(invalid("tax_rate_marginal", "must be between 0 and 1"));
        }
        if !(1..=10).contains(&self.margin_convergence_year) {
            return Err(invalid("margin_convergence_year", "must be between 1 and 10"));
        }
        if self.sales_to_capital_1_5 <= Decimal::ZERO {
            return Err(invalid("sales_to_capital_1_5", "must be positive"));
        }
        if self.sales_to_capital_6_10 <= Decimal::ZERO {
            return Err(invalid("sales_to_capital_6_10", "must be positive"));
        }

        self.validate_overrides()
    }

    fn validate_overrides(&self) -> ValuationResult<()> {
        if self.override_perpetual_growth && self.perpetual_growth_rate.is_none() {
            return Err(missing("override_perpetual_growth", "perpetual_growth_rate"));
        }
        if self.override_riskfree_after_year10 && self.riskfree_rate_after10.is_none() {
            return Err(missing("override_riskfree_after_year10", "riskfree_rate_after10"));
        }
        if self.override_stable_wacc && self.stable_wacc.is_none() {
            return Err(missing("override_stable_wacc", "stable_wacc"));
        }
        if self.override_stable_roc && self.stable_roc.is_none() {
            return Err(missing("override_stable_roc", "stable_roc"));
        }

        if self.override_failure_probability {
            let Some(p) = self.probability_of_failure else {
                return Err(missing("override_failure_probability", "probability_of_failure"));
            };
            if !is_fraction(p) {
                return Err(invalid("probability_of_failure", "must be between 0 and 1"));
            }
            if self.distress_proceeds_tie.is_none() {
                return Err(missing("override_failure_probability", "distress_proceeds_tie"));
            }
            if self.distress_proceeds_percent.is_none() {
                return Err(missing("override_failure_probability", "distress_proceeds_percent"));
            }
        }

        if self.override_reinvestment_lag {
            let Some(lag) = self.reinvestment_lag_years else {
                return Err(missing("override_reinvestment_lag", "reinvestment_lag_years"));
            };
            if lag > 3 {
                return Err(invalid("reinvestment_lag_years", "must be between 0 and 3"));
            }
        }

        if self.has_nol_carryforward {
            let Some(nol) = self.nol_start_year1 else {
                return Err(missing("has_nol_carryforward", "nol_start_year1"));
            };
            if nol < Decimal::ZERO {
                return Err(invalid("nol_start_year1", "must not be negative"));
            }
        }

        if self.override_trapped_cash {
            let Some(amount) = self.trapped_cash_amount else {
                return Err(missing("override_trapped_cash", "trapped_cash_amount"));
            };
            if amount < Decimal::ZERO {
                return Err(invalid("trapped_cash_amount", "must not be negative"));
            }
            let Some(foreign_rate) = self.trapped_cash_foreign_tax_rate else {
                return Err(missing("override_trapped_cash", "trapped_cash_foreign_tax_rate"));
            };
            if !is_fraction(foreign_rate) {
                return Err(invalid(
                    "trapped_cash_foreign_tax_rate",
                    "must be between 0 and 1",
                ));
            }
        }

        if self.capitalize_rnd {
            let Some(asset) = self.rnd_asset else {
                return Err(missing("capitalize_rnd", "rnd_asset"));
            };
            if asset < Decimal::ZERO {
                return Err(invalid("rnd_asset", "must not be negative"));
            }
            if self.rnd_ebit_adjustment.is_none() {
                return Err(missing("capitalize_rnd", "rnd_ebit_adjustment"));
            }
        }

        if self.capitalize_operating_leases {
            let Some(debt) = self.lease_debt else {
                return Err(missing("capitalize_operating_leases", "lease_debt"));
            };
            if debt < Decimal::ZERO {
                return Err(invalid("lease_debt", "must not be negative"));
            }
            if self.lease_ebit_adjustment.is_none() {
                return Err(missing("capitalize_operating_leases", "lease_ebit_adjustment"));
            }
        }

        if self.has_employee_options {
            let Some(value) = self.options_value else {
                return Err(missing("has_employee_options", "options_value"));
            };
            if value < Decimal::ZERO {
                return Err(invalid("options_value", "must not be negative"));
            }
        }

        Ok(())
    }

    /// Resolve the stable-state parameters (Step 0 of the pipeline).
    ///
    /// The perpetual-growth and stable-WACC overrides are independent:
    /// pinning one never changes the other.
    pub fn resolve_stable_state(&self) -> StableState {
        let perpetual_growth_rate = if self.override_perpetual_growth {
            self.perpetual_growth_rate.unwrap_or(self.riskfree_rate_now)
        } else {
            self.riskfree_for_stable()
        };

        let stable_wacc = if self.override_stable_wacc {
            self.stable_wacc.unwrap_or_else(|| self.derived_stable_wacc())
        } else {
            self.derived_stable_wacc()
        };

        let terminal_tax_rate = if self.override_tax_rate_convergence {
            self.tax_rate_effective
        } else {
            self.tax_rate_marginal
        };

        let stable_roc = if self.override_stable_roc {
            self.stable_roc
        } else {
            None
        };

        StableState {
            perpetual_growth_rate,
            stable_wacc,
            terminal_tax_rate,
            stable_roc,
        }
    }

    fn riskfree_for_stable(&self) -> Rate {
        if self.override_riskfree_after_year10 {
            self.riskfree_rate_after10.unwrap_or(self.riskfree_rate_now)
        } else {
            self.riskfree_rate_now
        }
    }

    fn derived_stable_wacc(&self) -> Rate {
        self.riskfree_for_stable() + self.mature_market_erp.unwrap_or(DEFAULT_MATURE_MARKET_ERP)
    }

    /// Lag (in years) between a revenue delta and the reinvestment funding it.
    pub fn resolved_reinvestment_lag(&self) -> u32 {
        if self.override_reinvestment_lag {
            self.reinvestment_lag_years
                .unwrap_or(DEFAULT_REINVESTMENT_LAG_YEARS)
        } else {
            DEFAULT_REINVESTMENT_LAG_YEARS
        }
    }

    /// NOL balance carried into Year 1.
    pub fn resolved_nol_start(&self) -> Money {
        if self.has_nol_carryforward {
            self.nol_start_year1.unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        }
    }

    /// Base-year EBIT adjustment from capitalized R&D and operating leases.
    pub fn base_ebit_adjustment(&self) -> Money {
        let lease = if self.capitalize_operating_leases {
            self.lease_ebit_adjustment.unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        let rnd = if self.capitalize_rnd {
            self.rnd_ebit_adjustment.unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        lease + rnd
    }

    /// Debt carried into the equity bridge (book debt plus capitalized leases).
    pub fn debt_outstanding(&self) -> Money {
        let lease = if self.capitalize_operating_leases {
            self.lease_debt.unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        self.book_debt + lease
    }

    /// Cash after the incremental tax on repatriating trapped foreign cash.
    /// May go negative; that flows through the bridge unchanged.
    pub fn cash_adjusted(&self) -> Money {
        if !self.override_trapped_cash {
            return self.cash;
        }
        let amount = self.trapped_cash_amount.unwrap_or(Decimal::ZERO);
        let foreign_rate = self.trapped_cash_foreign_tax_rate.unwrap_or(Decimal::ZERO);
        let additional_tax = amount * (self.tax_rate_marginal - foreign_rate);
        self.cash - additional_tax
    }

    /// Employee-option value deducted from equity.
    pub fn resolved_options_value(&self) -> Money {
        if self.has_employee_options {
            self.options_value.unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        }
    }
}

fn is_fraction(x: Rate) -> bool {
    x >= Decimal::ZERO && x <= Decimal::ONE
}

fn invalid(field: &str, reason: &str) -> ValuationError {
    ValuationError::InvalidInput {
        field: field.into(),
        reason: reason.into(),
    }
}

fn missing(switch: &'static str, payload: &'static str) -> ValuationError {
    ValuationError::InconsistentOverride { switch, payload }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
