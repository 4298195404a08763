//! Exponential smoothing of recorded suite durations.

use crate::error::ConfigError;

/// Smoothing factor alpha in (0.0, 1.0].
///
/// New observations are blended as `alpha * new + (1 - alpha) * old`;
/// 1.0 disables smoothing (the new observation wins unchanged).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingFactor(f64);

impl SmoothingFactor {
    /// Factor that leaves observations unchanged.
    pub const OFF: SmoothingFactor = SmoothingFactor(1.0);

    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if value > 0.0 && value <= 1.0 {
            Ok(SmoothingFactor(value))
        } else {
            Err(ConfigError::InvalidSmoothingFactor { value })
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Blend a new observation into the previous value, rounding to the
    /// nearest millisecond. With no prior value the observation is taken
    /// as-is.
    pub fn smooth(&self, previous: Option<u64>, observed: u64) -> u64 {
        match previous {
            Some(prev) => {
                (self.0 * observed as f64 + (1.0 - self.0) * prev as f64).round() as u64
            }
            None => observed,
        }
    }
}

impl Default for SmoothingFactor {
    fn default() -> Self {
        SmoothingFactor::OFF
    }
}
