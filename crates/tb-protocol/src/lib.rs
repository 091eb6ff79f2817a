// tb-protocol: Thing-facing wire protocol types and PDU codec.
//
// Every PDU exchanged with a thing is a header-prefixed binary frame:
// `{msg_type: u8, payload_len: u8, body[payload_len]}`.  This crate owns the
// frame codec, the sensor schema/config records shared with the cloud side,
// and the result-code taxonomy carried in response frames.

pub mod msg;
pub mod types;

pub use msg::{DecodeError, EncodeError, Request, Response, msg_type};
pub use types::{
    Decimal, ResultCode, SensorConfig, SensorSchema, event_flags, schema_is_valid, type_ids,
    value_types,
};

/// Fixed header: message type byte plus payload length byte.
pub const HEADER_LEN: usize = 2;
/// Largest possible frame (`payload_len` is a `u8`).
pub const PDU_MAX: usize = HEADER_LEN + u8::MAX as usize;
/// Cloud-assigned device identity width on the wire.
pub const UUID_LEN: usize = 36;
/// Cloud-assigned authentication secret width on the wire.
pub const TOKEN_LEN: usize = 40;
/// Device name field width; effective names are capped one byte short.
pub const DEVICE_NAME_LEN: usize = 64;
/// Sensor name field width in schema fragments.
pub const SENSOR_NAME_LEN: usize = 64;
/// Largest response frame: the credential response to a register request.
pub const RESPONSE_MAX: usize = HEADER_LEN + 1 + UUID_LEN + TOKEN_LEN;
