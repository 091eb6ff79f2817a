//! PDU codec: header-prefixed binary frames to tagged variants and back.
//!
//! Decoding never reads past the declared `payload_len`, and every string
//! field is bounded by its declared width; frames are hostile input.
//! Fixed-width string fields (uuid, token, names) are *not* required to be
//! null-terminated on the wire; trailing NUL padding is stripped on decode
//! and restored on encode, so response frames round-trip byte-exact.

use crate::types::{ResultCode, SensorSchema};
use crate::{DEVICE_NAME_LEN, HEADER_LEN, RESPONSE_MAX, SENSOR_NAME_LEN, TOKEN_LEN, UUID_LEN};
use std::fmt;

// ---------------------------------------------------------------------------
// Message type codes
// ---------------------------------------------------------------------------

/// Frame type byte values.  Requests originate at the thing; `*_RESP` codes
/// are emitted by the gateway, except `DATA_RESP` and `CONFIG_RESP`, which a
/// thing sends to acknowledge gateway-delivered set-data and config frames.
pub mod msg_type {
    pub const REGISTER_REQ: u8 = 0x10;
    pub const REGISTER_RESP: u8 = 0x11;
    pub const UNREGISTER_REQ: u8 = 0x12;
    pub const UNREGISTER_RESP: u8 = 0x13;
    pub const AUTH_REQ: u8 = 0x14;
    pub const AUTH_RESP: u8 = 0x15;
    pub const DATA: u8 = 0x20;
    pub const DATA_RESP: u8 = 0x21;
    pub const CONFIG_RESP: u8 = 0x31;
    pub const SCHEMA: u8 = 0x40;
    pub const SCHEMA_RESP: u8 = 0x41;
    pub const SCHEMA_END: u8 = 0x42;
    pub const SCHEMA_END_RESP: u8 = 0x43;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Input shorter than the two-byte header.
    ShortHeader,
    /// Input length disagrees with the header's `payload_len`.
    LengthMismatch,
    /// Frame-level lengths are consistent but the body is too short (or not
    /// valid UTF-8 where a string is required) for its message type.
    BadBody { msg_type: u8 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::ShortHeader => write!(f, "PDU shorter than header"),
            DecodeError::LengthMismatch => write!(f, "PDU length disagrees with header"),
            DecodeError::BadBody { msg_type } => {
                write!(f, "malformed body for message type 0x{:02X}", msg_type)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Destination buffer smaller than the maximum response frame.
    OutputTooSmall,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::OutputTooSmall => write!(f, "output buffer below maximum response size"),
        }
    }
}

impl std::error::Error for EncodeError {}

// ---------------------------------------------------------------------------
// Request frames
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterReq {
    pub device_id: u64,
    /// Effective name: bounded at `DEVICE_NAME_LEN - 1` bytes, cut at the
    /// first NUL.  May be empty if the peer sent only padding.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthReq {
    pub uuid: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataReq {
    pub sensor_id: u8,
    /// Opaque value bytes; interpreted against the accepted schema, never by
    /// the codec.
    pub payload: Vec<u8>,
}

/// A decoded request PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register(RegisterReq),
    Unregister,
    Auth(AuthReq),
    Schema { fragment: SensorSchema, end: bool },
    Data(DataReq),
    ConfigResponse { sensor_id: u8 },
    SetDataResponse(DataReq),
    /// Unrecognized type byte; the dispatcher sends no reply.
    Unknown(u8),
}

impl Request {
    pub fn decode(input: &[u8]) -> Result<Request, DecodeError> {
        if input.len() < HEADER_LEN {
            return Err(DecodeError::ShortHeader);
        }
        let msg_type = input[0];
        let payload_len = input[1] as usize;
        if input.len() != HEADER_LEN + payload_len {
            return Err(DecodeError::LengthMismatch);
        }
        let body = &input[HEADER_LEN..];

        match msg_type {
            msg_type::REGISTER_REQ => decode_register(body),
            msg_type::UNREGISTER_REQ => Ok(Request::Unregister),
            msg_type::AUTH_REQ => decode_auth(body),
            msg_type::SCHEMA => decode_schema(body, false),
            msg_type::SCHEMA_END => decode_schema(body, true),
            msg_type::DATA => decode_data(body, msg_type::DATA).map(Request::Data),
            msg_type::DATA_RESP => {
                decode_data(body, msg_type::DATA_RESP).map(Request::SetDataResponse)
            }
            msg_type::CONFIG_RESP => match body.first() {
                Some(&sensor_id) => Ok(Request::ConfigResponse { sensor_id }),
                None => Err(DecodeError::BadBody {
                    msg_type: msg_type::CONFIG_RESP,
                }),
            },
            other => Ok(Request::Unknown(other)),
        }
    }
}

fn decode_register(body: &[u8]) -> Result<Request, DecodeError> {
    let bad = DecodeError::BadBody {
        msg_type: msg_type::REGISTER_REQ,
    };
    // Device id plus at least one name byte.
    if body.len() <= 8 {
        return Err(bad);
    }
    let mut id = [0u8; 8];
    id.copy_from_slice(&body[..8]);
    let name = bounded_str(&body[8..], DEVICE_NAME_LEN - 1).ok_or(bad)?;
    Ok(Request::Register(RegisterReq {
        device_id: u64::from_le_bytes(id),
        name: name.to_owned(),
    }))
}

fn decode_auth(body: &[u8]) -> Result<Request, DecodeError> {
    let bad = DecodeError::BadBody {
        msg_type: msg_type::AUTH_REQ,
    };
    if body.len() < UUID_LEN + TOKEN_LEN {
        return Err(bad);
    }
    let uuid = fixed_str(&body[..UUID_LEN]).ok_or(bad)?;
    let token = fixed_str(&body[UUID_LEN..UUID_LEN + TOKEN_LEN]).ok_or(bad)?;
    Ok(Request::Auth(AuthReq {
        uuid: uuid.to_owned(),
        token: token.to_owned(),
    }))
}

fn decode_schema(body: &[u8], end: bool) -> Result<Request, DecodeError> {
    let bad = DecodeError::BadBody {
        msg_type: if end {
            msg_type::SCHEMA_END
        } else {
            msg_type::SCHEMA
        },
    };
    if body.len() < 5 {
        return Err(bad);
    }
    let name = bounded_str(&body[5..], SENSOR_NAME_LEN).ok_or(bad)?;
    Ok(Request::Schema {
        fragment: SensorSchema {
            sensor_id: body[0],
            value_type: body[1],
            unit: body[2],
            type_id: u16::from_le_bytes([body[3], body[4]]),
            name: name.to_owned(),
        },
        end,
    })
}

fn decode_data(body: &[u8], msg_type: u8) -> Result<DataReq, DecodeError> {
    match body.split_first() {
        Some((&sensor_id, payload)) => Ok(DataReq {
            sensor_id,
            payload: payload.to_vec(),
        }),
        None => Err(DecodeError::BadBody { msg_type }),
    }
}

/// Read at most `cap` bytes, cutting at the first NUL; `None` on invalid
/// UTF-8; bad bytes are rejected, never rewritten.
fn bounded_str(bytes: &[u8], cap: usize) -> Option<&str> {
    let bytes = &bytes[..bytes.len().min(cap)];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).ok()
}

/// Read a fixed-width field, stripping trailing NUL padding only.
fn fixed_str(bytes: &[u8]) -> Option<&str> {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    std::str::from_utf8(&bytes[..end]).ok()
}

// ---------------------------------------------------------------------------
// Response frames
// ---------------------------------------------------------------------------

/// A response PDU emitted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Result-only response: `{result: i8}`.
    Status { msg_type: u8, result: ResultCode },
    /// Credential response to a register request:
    /// `{result: i8, uuid[UUID_LEN], token[TOKEN_LEN]}`.
    Credential {
        result: ResultCode,
        uuid: String,
        token: String,
    },
}

impl Response {
    /// Serialize into `out`, returning the number of bytes written.
    ///
    /// The destination must hold a maximum response frame regardless of the
    /// variant being encoded, so error replies can always be emitted in
    /// place.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, EncodeError> {
        if out.len() < RESPONSE_MAX {
            return Err(EncodeError::OutputTooSmall);
        }
        match self {
            Response::Status { msg_type, result } => {
                out[0] = *msg_type;
                out[1] = 1;
                out[2] = result.as_i8() as u8;
                Ok(HEADER_LEN + 1)
            }
            Response::Credential {
                result,
                uuid,
                token,
            } => {
                out[0] = msg_type::REGISTER_RESP;
                out[1] = (1 + UUID_LEN + TOKEN_LEN) as u8;
                out[2] = result.as_i8() as u8;
                write_padded(&mut out[3..3 + UUID_LEN], uuid);
                write_padded(&mut out[3 + UUID_LEN..3 + UUID_LEN + TOKEN_LEN], token);
                Ok(RESPONSE_MAX)
            }
        }
    }

    /// Parse a response frame: the thing side of the codec, used by test
    /// clients and device emulators.
    pub fn decode(input: &[u8]) -> Result<Response, DecodeError> {
        if input.len() < HEADER_LEN {
            return Err(DecodeError::ShortHeader);
        }
        let msg_type = input[0];
        let payload_len = input[1] as usize;
        if input.len() != HEADER_LEN + payload_len {
            return Err(DecodeError::LengthMismatch);
        }
        let bad = DecodeError::BadBody { msg_type };
        let body = &input[HEADER_LEN..];
        let result = body
            .first()
            .and_then(|&raw| ResultCode::from_i8(raw as i8))
            .ok_or(bad)?;

        match msg_type {
            // A register rejection is a plain status frame; only the success
            // path carries credentials.
            msg_type::REGISTER_RESP if body.len() != 1 => {
                if body.len() != 1 + UUID_LEN + TOKEN_LEN {
                    return Err(bad);
                }
                let uuid = fixed_str(&body[1..1 + UUID_LEN]).ok_or(bad)?;
                let token = fixed_str(&body[1 + UUID_LEN..]).ok_or(bad)?;
                Ok(Response::Credential {
                    result,
                    uuid: uuid.to_owned(),
                    token: token.to_owned(),
                })
            }
            msg_type::REGISTER_RESP
            | msg_type::UNREGISTER_RESP
            | msg_type::AUTH_RESP
            | msg_type::DATA_RESP
            | msg_type::SCHEMA_RESP
            | msg_type::SCHEMA_END_RESP => {
                if body.len() != 1 {
                    return Err(bad);
                }
                Ok(Response::Status { msg_type, result })
            }
            _ => Err(bad),
        }
    }
}

fn write_padded(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(field.len());
    field[..n].copy_from_slice(&bytes[..n]);
    field[n..].fill(0);
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
