//! Maps `Box<dyn Error>` from trait boundaries to typed `OptimizerError`.
//!
//! The traits in `growth_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `growth_hardware::HwError` downcasting.

use crate::error::OptimizerError;

/// Map a trait-boundary error to a typed `OptimizerError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> OptimizerError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<growth_hardware::error::HwError>() {
            return match hw {
                growth_hardware::error::HwError::OutOfRange { .. } => {
                    OptimizerError::Channel(hw.to_string())
                }
                other => OptimizerError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("fault") {
        OptimizerError::HardwareFault(s)
    } else {
        OptimizerError::Hardware(s)
    }
}
