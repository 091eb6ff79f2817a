//! Sensor records, result codes, and the sensor semantics table.
//!
//! `SensorSchema` and `SensorConfig` cross two boundaries: they are parsed
//! out of thing-side PDUs and serialized into the cloud's JSON API, so both
//! derive serde traits.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Result codes
// ---------------------------------------------------------------------------

/// Operation outcome carried in the `result` byte of every response frame.
///
/// Cloud-side rejections use the same value space, so a cloud error code is
/// surfaced to the thing verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum ResultCode {
    Success = 0,
    ErrorUnknown = -1,
    InvalidData = -2,
    CredentialUnauthorized = -3,
    RegisterInvalidDeviceName = -4,
    SchemaEmpty = -5,
    NoData = -6,
}

impl ResultCode {
    pub fn as_i8(self) -> i8 {
        self as i8
    }

    /// Decode a raw result byte; unknown values are rejected rather than
    /// folded into a catch-all so round-tripping stays exact.
    pub fn from_i8(raw: i8) -> Option<ResultCode> {
        match raw {
            0 => Some(ResultCode::Success),
            -1 => Some(ResultCode::ErrorUnknown),
            -2 => Some(ResultCode::InvalidData),
            -3 => Some(ResultCode::CredentialUnauthorized),
            -4 => Some(ResultCode::RegisterInvalidDeviceName),
            -5 => Some(ResultCode::SchemaEmpty),
            -6 => Some(ResultCode::NoData),
            _ => None,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResultCode::Success => "success",
            ResultCode::ErrorUnknown => "unknown error",
            ResultCode::InvalidData => "invalid data",
            ResultCode::CredentialUnauthorized => "credential unauthorized",
            ResultCode::RegisterInvalidDeviceName => "invalid device name",
            ResultCode::SchemaEmpty => "schema empty",
            ResultCode::NoData => "no data",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// Event flags
// ---------------------------------------------------------------------------

/// Bitmask controlling when a sensor reports, as configured by the cloud.
pub mod event_flags {
    pub const NONE: u8 = 0x00;
    pub const TIME: u8 = 0x01;
    pub const LOWER_THRESHOLD: u8 = 0x02;
    pub const UPPER_THRESHOLD: u8 = 0x04;
    pub const CHANGE: u8 = 0x08;
    pub const UNREGISTERED: u8 = 0x10;
    /// Every bit the gateway understands.
    pub const ALL: u8 = TIME | LOWER_THRESHOLD | UPPER_THRESHOLD | CHANGE | UNREGISTERED;
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// Primitive carried by a sensor reading.
pub mod value_types {
    pub const INT: u8 = 1;
    pub const FLOAT: u8 = 2;
    pub const BOOL: u8 = 3;
    pub const RAW: u8 = 4;
}

// ---------------------------------------------------------------------------
// Sensor type ids
// ---------------------------------------------------------------------------

/// Sensor categories.  Basic (measurement) types live in the low range;
/// logic types occupy the 0xFF00 page.
pub mod type_ids {
    pub const NONE: u16 = 0x0000;
    pub const VOLTAGE: u16 = 0x0001;
    pub const CURRENT: u16 = 0x0002;
    pub const RESISTANCE: u16 = 0x0003;
    pub const POWER: u16 = 0x0004;
    pub const TEMPERATURE: u16 = 0x0005;
    pub const RELATIVE_HUMIDITY: u16 = 0x0006;
    pub const LUMINOSITY: u16 = 0x0007;
    pub const TIME: u16 = 0x0008;
    pub const MASS: u16 = 0x0009;
    pub const PRESSURE: u16 = 0x000A;
    pub const DISTANCE: u16 = 0x000B;
    pub const ANGLE: u16 = 0x000C;
    pub const VOLUME: u16 = 0x000D;
    pub const AREA: u16 = 0x000E;
    pub const RAINFALL: u16 = 0x000F;
    pub const DENSITY: u16 = 0x0010;
    pub const LATITUDE: u16 = 0x0011;
    pub const LONGITUDE: u16 = 0x0012;
    pub const SPEED: u16 = 0x0013;
    pub const VOLUME_FLOW: u16 = 0x0014;
    pub const ENERGY: u16 = 0x0015;
    pub const PRESENCE: u16 = 0xFF01;
    pub const SWITCH: u16 = 0xFF02;
    pub const COMMAND: u16 = 0xFF03;
}

/// Highest valid unit enumerator for a basic sensor type, or `None` for an
/// unknown type id.  Unit 0 is reserved for unit-less (logic) sensors.
fn unit_ceiling(type_id: u16) -> Option<u8> {
    use type_ids::*;
    let max = match type_id {
        VOLTAGE | CURRENT | TIME | ANGLE | SPEED | VOLUME_FLOW | AREA => 2,
        POWER | TEMPERATURE | LUMINOSITY | MASS | PRESSURE | DISTANCE | VOLUME | ENERGY => 3,
        RESISTANCE | RELATIVE_HUMIDITY | RAINFALL | DENSITY | LATITUDE | LONGITUDE => 1,
        _ => return None,
    };
    Some(max)
}

/// Whether a `(type_id, value_type, unit)` triple names a sensor the cloud
/// can store: known type, unit within the type's range, and a value type the
/// category supports.
pub fn schema_is_valid(type_id: u16, value_type: u8, unit: u8) -> bool {
    use type_ids::*;
    match type_id {
        PRESENCE | SWITCH => unit == 0 && value_type == value_types::BOOL,
        COMMAND => unit == 0 && value_type == value_types::RAW,
        _ => match unit_ceiling(type_id) {
            Some(max) => {
                (1..=max).contains(&unit)
                    && (value_type == value_types::INT || value_type == value_types::FLOAT)
            }
            None => false,
        },
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One sensor declared by a thing: category, primitive type, unit, and a
/// human-readable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSchema {
    pub sensor_id: u8,
    pub type_id: u16,
    pub value_type: u8,
    pub unit: u8,
    pub name: String,
}

/// A fixed-point decimal: integral part plus fractional part.
///
/// Threshold comparison is lexicographic on `(int_part, frac_part)`, which
/// the derived ordering provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Decimal {
    pub int_part: i32,
    pub frac_part: u32,
}

impl Decimal {
    pub fn new(int_part: i32, frac_part: u32) -> Decimal {
        Decimal {
            int_part,
            frac_part,
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.int_part, self.frac_part)
    }
}

/// Per-sensor reporting configuration received from the cloud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub sensor_id: u8,
    pub event_flags: u8,
    pub time_sec: u32,
    pub lower_limit: Decimal,
    pub upper_limit: Decimal,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
