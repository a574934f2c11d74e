pub mod ginzu;
pub mod inputs;
pub mod options;
pub mod rnd;

pub use ginzu::{
    compute_ginzu, GinzuBaseYear, GinzuOutputs, GinzuTerminalYear, GinzuYearProjection,
    StableStateParameters,
};
pub use inputs::{DistressProceedsTie, GinzuInputs, StableState};
pub use options::{compute_dilution_adjusted_option_value, OptionValuationInput, OptionValuationOutput};
pub use rnd::{compute_rnd_capitalization, RndCapitalizationInput, RndCapitalizationOutput};
