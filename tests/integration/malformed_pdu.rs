//! Hostile framing: truncated headers, length lies, unusable bodies,
//! unknown types, and undersized output buffers.  Framing failures produce
//! no response bytes and leave the registry untouched; unusable bodies on a
//! well-framed PDU still get a protocol-level error reply.

use gateway::{DispatchError, Gateway};
use std::sync::Arc;
use tb_protocol::msg::msg_type;
use tb_protocol::{RESPONSE_MAX, Response, ResultCode, TOKEN_LEN, UUID_LEN};
use tb_test_utils::{MockCloud, frames};

const PEER_PID: i32 = 4242;

fn new_gateway() -> (Arc<MockCloud>, Gateway) {
    let cloud = Arc::new(MockCloud::new());
    let gateway = Gateway::new(cloud.clone());
    (cloud, gateway)
}

async fn process(
    gateway: &Gateway,
    handle: i32,
    input: &[u8],
) -> Result<Vec<u8>, DispatchError> {
    let mut out = [0u8; RESPONSE_MAX];
    let n = gateway.process(handle, Some(PEER_PID), input, &mut out).await?;
    Ok(out[..n].to_vec())
}

fn status_of(resp: &[u8]) -> (u8, ResultCode) {
    match Response::decode(resp).unwrap() {
        Response::Status { msg_type, result } => (msg_type, result),
        other => panic!("expected status response, got {:?}", other),
    }
}

#[tokio::test]
async fn header_claiming_more_than_received_is_dropped() {
    let (cloud, gateway) = new_gateway();
    // Five bytes on the wire, header claims a 10-byte payload.
    let input = [msg_type::DATA, 10, 0x01, 0x02, 0x03];

    let result = process(&gateway, 3, &input).await;
    assert_eq!(result, Err(DispatchError::LengthMismatch));
    assert!(cloud.calls().is_empty());
    assert!(gateway.registry.is_empty().await);
}

#[tokio::test]
async fn input_below_header_size_is_dropped() {
    let (_cloud, gateway) = new_gateway();
    assert_eq!(
        process(&gateway, 3, &[]).await,
        Err(DispatchError::ShortHeader)
    );
    assert_eq!(
        process(&gateway, 3, &[msg_type::DATA]).await,
        Err(DispatchError::ShortHeader)
    );
}

#[tokio::test]
async fn trailing_bytes_beyond_the_payload_are_dropped() {
    let (_cloud, gateway) = new_gateway();
    let mut input = frames::data(1, &[0x01]);
    input.push(0xFF);
    assert_eq!(
        process(&gateway, 3, &input).await,
        Err(DispatchError::LengthMismatch)
    );
}

#[tokio::test]
async fn unknown_message_type_gets_no_reply() {
    let (cloud, gateway) = new_gateway();
    let resp = process(&gateway, 3, &[0x7F, 2, 0xAB, 0xCD]).await.unwrap();
    assert!(resp.is_empty());
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn undersized_output_buffer_is_refused_up_front() {
    let (cloud, gateway) = new_gateway();
    let mut out = [0u8; RESPONSE_MAX - 1];
    let result = gateway
        .process(3, Some(PEER_PID), &frames::register(1, "dev"), &mut out)
        .await;
    assert_eq!(result, Err(DispatchError::OutputTooSmall));
    // Refused before any handler ran.
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn register_body_without_name_bytes_gets_an_error_reply() {
    let (cloud, gateway) = new_gateway();
    // Only the 8-byte device id, no name byte.
    let mut input = vec![msg_type::REGISTER_REQ, 8];
    input.extend_from_slice(&1u64.to_le_bytes());

    let resp = process(&gateway, 3, &input).await.unwrap();
    assert_eq!(
        status_of(&resp),
        (
            msg_type::REGISTER_RESP,
            ResultCode::RegisterInvalidDeviceName
        )
    );
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn truncated_auth_body_gets_an_error_reply() {
    let (_cloud, gateway) = new_gateway();
    let body_len = (UUID_LEN + TOKEN_LEN - 1) as u8;
    let mut input = vec![msg_type::AUTH_REQ, body_len];
    input.extend_from_slice(&vec![b'a'; body_len as usize]);

    let resp = process(&gateway, 3, &input).await.unwrap();
    assert_eq!(
        status_of(&resp),
        (msg_type::AUTH_RESP, ResultCode::InvalidData)
    );
}

#[tokio::test]
async fn empty_data_body_gets_an_error_reply() {
    let (_cloud, gateway) = new_gateway();
    let resp = process(&gateway, 3, &[msg_type::DATA, 0]).await.unwrap();
    assert_eq!(
        status_of(&resp),
        (msg_type::DATA_RESP, ResultCode::InvalidData)
    );
}

#[tokio::test]
async fn truncated_schema_body_gets_an_error_reply() {
    let (_cloud, gateway) = new_gateway();
    let resp = process(&gateway, 3, &[msg_type::SCHEMA_END, 3, 1, 2, 3])
        .await
        .unwrap();
    assert_eq!(
        status_of(&resp),
        (msg_type::SCHEMA_END_RESP, ResultCode::InvalidData)
    );
}

#[tokio::test]
async fn malformed_ack_bodies_stay_silent() {
    let (cloud, gateway) = new_gateway();
    // Zero-length CONFIG_RESP body: unusable, but acks never get a reply.
    let resp = process(&gateway, 3, &[msg_type::CONFIG_RESP, 0]).await.unwrap();
    assert!(resp.is_empty());
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn established_session_survives_malformed_frames() {
    let (cloud, gateway) = new_gateway();
    let first = process(&gateway, 3, &frames::register(0xAA, "dev"))
        .await
        .unwrap();

    let _ = process(&gateway, 3, &[msg_type::DATA, 10, 0x01]).await;
    let _ = process(&gateway, 3, &[]).await;

    // The same session still answers the retransmission with identical
    // credentials and without a second cloud node.
    let second = process(&gateway, 3, &frames::register(0xAA, "dev"))
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(cloud.mknode_calls(), 1);
}
