//! Validation of cloud-sent sensor configuration lists.
//!
//! Pure: no registry or cloud access.  A list is valid iff every entry
//! passes all three rules; the first offender is reported.  Fields are
//! unsigned in wire form, so only cross-field consistency is checked here.

use std::fmt;
use tb_protocol::{SensorConfig, event_flags};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// No known event bit set (NONE alone, or unknown bits alone).
    NoEventBits,
    /// TIME flag set with a zero reporting interval.
    ZeroTimeWindow,
    /// Nonzero reporting interval without the TIME flag.
    SpuriousTimeWindow,
    /// A threshold flag set but `upper_limit <= lower_limit`.
    ThresholdOrder,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            InvalidReason::NoEventBits => "no known event flag set",
            InvalidReason::ZeroTimeWindow => "TIME flag with zero interval",
            InvalidReason::SpuriousTimeWindow => "nonzero interval without TIME flag",
            InvalidReason::ThresholdOrder => "upper limit not above lower limit",
        };
        write!(f, "{}", msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidConfig {
    pub sensor_id: u8,
    pub reason: InvalidReason,
}

impl fmt::Display for InvalidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sensor {}: {}", self.sensor_id, self.reason)
    }
}

impl std::error::Error for InvalidConfig {}

/// Check every entry against the three consistency rules.
pub fn validate(configs: &[SensorConfig]) -> Result<(), InvalidConfig> {
    for config in configs {
        if config.event_flags & event_flags::ALL == 0 {
            return Err(InvalidConfig {
                sensor_id: config.sensor_id,
                reason: InvalidReason::NoEventBits,
            });
        }

        if config.event_flags & event_flags::TIME != 0 {
            if config.time_sec == 0 {
                return Err(InvalidConfig {
                    sensor_id: config.sensor_id,
                    reason: InvalidReason::ZeroTimeWindow,
                });
            }
        } else if config.time_sec > 0 {
            return Err(InvalidConfig {
                sensor_id: config.sensor_id,
                reason: InvalidReason::SpuriousTimeWindow,
            });
        }

        let threshold_bits = event_flags::LOWER_THRESHOLD | event_flags::UPPER_THRESHOLD;
        if config.event_flags & threshold_bits != 0 && config.upper_limit <= config.lower_limit {
            return Err(InvalidConfig {
                sensor_id: config.sensor_id,
                reason: InvalidReason::ThresholdOrder,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
