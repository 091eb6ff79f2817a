//! Raw PDU builders.
//!
//! Frames are assembled byte-by-byte, independently of the codec under test.
//! Fixed-width fields are padded with NULs the way a C-struct sender would.

use tb_protocol::{
    SENSOR_NAME_LEN, SensorSchema, TOKEN_LEN, UUID_LEN, msg_type, type_ids, value_types,
};

fn frame(msg_type: u8, body: Vec<u8>) -> Vec<u8> {
    let mut f = vec![msg_type, body.len() as u8];
    f.extend_from_slice(&body);
    f
}

fn padded(value: &str, width: usize) -> Vec<u8> {
    let mut field = vec![0u8; width];
    let bytes = value.as_bytes();
    let n = bytes.len().min(width);
    field[..n].copy_from_slice(&bytes[..n]);
    field
}

pub fn register(device_id: u64, name: &str) -> Vec<u8> {
    let mut body = device_id.to_le_bytes().to_vec();
    body.extend_from_slice(name.as_bytes());
    frame(msg_type::REGISTER_REQ, body)
}

pub fn unregister() -> Vec<u8> {
    frame(msg_type::UNREGISTER_REQ, Vec::new())
}

pub fn auth(uuid: &str, token: &str) -> Vec<u8> {
    let mut body = padded(uuid, UUID_LEN);
    body.extend_from_slice(&padded(token, TOKEN_LEN));
    frame(msg_type::AUTH_REQ, body)
}

pub fn schema(fragment: &SensorSchema, end: bool) -> Vec<u8> {
    let mut body = vec![fragment.sensor_id, fragment.value_type, fragment.unit];
    body.extend_from_slice(&fragment.type_id.to_le_bytes());
    body.extend_from_slice(&padded(&fragment.name, SENSOR_NAME_LEN));
    let code = if end {
        msg_type::SCHEMA_END
    } else {
        msg_type::SCHEMA
    };
    frame(code, body)
}

pub fn data(sensor_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![sensor_id];
    body.extend_from_slice(payload);
    frame(msg_type::DATA, body)
}

pub fn config_resp(sensor_id: u8) -> Vec<u8> {
    frame(msg_type::CONFIG_RESP, vec![sensor_id])
}

pub fn setdata_resp(sensor_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![sensor_id];
    body.extend_from_slice(payload);
    frame(msg_type::DATA_RESP, body)
}

/// A valid temperature sensor declaration for tests.
pub fn sample_schema(sensor_id: u8) -> SensorSchema {
    SensorSchema {
        sensor_id,
        type_id: type_ids::TEMPERATURE,
        value_type: value_types::FLOAT,
        unit: 1,
        name: format!("sensor-{}", sensor_id),
    }
}
