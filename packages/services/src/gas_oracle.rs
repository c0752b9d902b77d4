//! Third-party gas price suggestions, used to pick a max fee when the caller
//! wants something other than the node's own estimate.

use serde::Serialize;

const WEI_PER_GWEI: f64 = 1e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasSpeed {
    Slow,
    Standard,
    Fast,
}

/// Suggested gas prices in gwei.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GasFeeSuggestion {
    pub slow_gwei: f64,
    pub standard_gwei: f64,
    pub fast_gwei: f64,
}

impl GasFeeSuggestion {
    pub fn gwei(&self, speed: GasSpeed) -> f64 {
        match speed {
            GasSpeed::Slow => self.slow_gwei,
            GasSpeed::Standard => self.standard_gwei,
            GasSpeed::Fast => self.fast_gwei,
        }
    }

    pub fn max_fee_per_gas(&self, speed: GasSpeed) -> u128 {
        (self.gwei(speed) * WEI_PER_GWEI).round() as u128
    }
}

pub mod port {
    use super::GasFeeSuggestion;
    use crate::Result;

    #[allow(async_fn_in_trait)]
    #[trait_variant::make(Send)]
    #[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
    pub trait Api: Sync {
        async fn gas_prices(&self) -> Result<GasFeeSuggestion>;
    }
}
