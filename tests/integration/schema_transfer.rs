//! Schema staging and commit: fragment accumulation, duplicate collapse,
//! atomic replacement on cloud acceptance, rollback-flag clearing, and
//! discard-on-failure.

use gateway::Gateway;
use std::sync::Arc;
use tb_protocol::msg::msg_type;
use tb_protocol::{RESPONSE_MAX, Response, ResultCode};
use tb_test_utils::{CloudCall, MockCloud, frames};

const PEER_PID: i32 = 4242;

fn new_gateway() -> (Arc<MockCloud>, Gateway) {
    let cloud = Arc::new(MockCloud::new());
    let gateway = Gateway::new(cloud.clone());
    (cloud, gateway)
}

async fn dispatch(gateway: &Gateway, handle: i32, frame: &[u8]) -> Vec<u8> {
    let mut out = [0u8; RESPONSE_MAX];
    let n = gateway
        .process(handle, Some(PEER_PID), frame, &mut out)
        .await
        .expect("framing should be accepted");
    out[..n].to_vec()
}

async fn register(gateway: &Gateway, handle: i32) {
    let resp = dispatch(gateway, handle, &frames::register(0xAA, "dev")).await;
    assert!(matches!(
        Response::decode(&resp).unwrap(),
        Response::Credential {
            result: ResultCode::Success,
            ..
        }
    ));
}

fn status_of(resp: &[u8]) -> (u8, ResultCode) {
    match Response::decode(resp).unwrap() {
        Response::Status { msg_type, result } => (msg_type, result),
        other => panic!("expected status response, got {:?}", other),
    }
}

#[tokio::test]
async fn fragments_commit_with_duplicates_collapsed() {
    let (cloud, gateway) = new_gateway();
    register(&gateway, 3).await;

    let resp = dispatch(&gateway, 3, &frames::schema(&frames::sample_schema(1), false)).await;
    assert_eq!(
        status_of(&resp),
        (msg_type::SCHEMA_RESP, ResultCode::Success)
    );
    dispatch(&gateway, 3, &frames::schema(&frames::sample_schema(2), false)).await;
    // The final fragment repeats sensor 2; the duplicate must collapse.
    let resp = dispatch(&gateway, 3, &frames::schema(&frames::sample_schema(2), true)).await;
    assert_eq!(
        status_of(&resp),
        (msg_type::SCHEMA_END_RESP, ResultCode::Success)
    );

    let committed: Vec<_> = cloud
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            CloudCall::Schema { schema, .. } => Some(schema),
            _ => None,
        })
        .collect();
    assert_eq!(committed.len(), 1, "cloud.schema called exactly once");
    let ids: Vec<u8> = committed[0].iter().map(|r| r.sensor_id).collect();
    assert_eq!(ids, vec![1, 2]);

    // Committed schema is live: readings for sensor 1 pass.
    let resp = dispatch(&gateway, 3, &frames::data(1, &[0x01])).await;
    assert_eq!(status_of(&resp), (msg_type::DATA_RESP, ResultCode::Success));
}

#[tokio::test]
async fn intermediate_fragments_do_not_touch_the_cloud() {
    let (cloud, gateway) = new_gateway();
    register(&gateway, 3).await;
    dispatch(&gateway, 3, &frames::schema(&frames::sample_schema(1), false)).await;

    assert!(
        !cloud
            .calls()
            .iter()
            .any(|c| matches!(c, CloudCall::Schema { .. }))
    );
}

#[tokio::test]
async fn fragment_before_any_session_is_unauthorized() {
    let (cloud, gateway) = new_gateway();
    let resp = dispatch(&gateway, 9, &frames::schema(&frames::sample_schema(1), false)).await;

    assert_eq!(
        status_of(&resp),
        (msg_type::SCHEMA_RESP, ResultCode::CredentialUnauthorized)
    );
    assert!(cloud.calls().is_empty());
    assert!(gateway.registry.is_empty().await);
}

#[tokio::test]
async fn first_fragment_clears_rollback() {
    let (cloud, gateway) = new_gateway();
    register(&gateway, 3).await;
    {
        let shared = gateway.registry.lookup(3).await.unwrap();
        assert!(shared.lock().await.rollback);
    }

    dispatch(&gateway, 3, &frames::schema(&frames::sample_schema(1), false)).await;
    {
        let shared = gateway.registry.lookup(3).await.unwrap();
        assert!(!shared.lock().await.rollback);
    }

    // Once cleared, a disconnect keeps the cloud node.
    gateway.connection_closed(3).await;
    assert_eq!(cloud.rmnode_calls(), 0);
}

#[tokio::test]
async fn commit_failure_discards_staging_and_keeps_accepted_schema() {
    let (cloud, gateway) = new_gateway();
    register(&gateway, 3).await;
    cloud.fail_schema(Some(ResultCode::ErrorUnknown));

    dispatch(&gateway, 3, &frames::schema(&frames::sample_schema(1), false)).await;
    let resp = dispatch(&gateway, 3, &frames::schema(&frames::sample_schema(2), true)).await;
    assert_eq!(
        status_of(&resp),
        (msg_type::SCHEMA_END_RESP, ResultCode::ErrorUnknown)
    );

    {
        let shared = gateway.registry.lookup(3).await.unwrap();
        let trust = shared.lock().await;
        assert!(trust.accepted_schema().is_empty());
        assert!(!trust.staging_is_open());
    }

    // Readings find no accepted schema.
    let resp = dispatch(&gateway, 3, &frames::data(1, &[0x01])).await;
    assert_eq!(
        status_of(&resp),
        (msg_type::DATA_RESP, ResultCode::InvalidData)
    );

    // A fresh transfer succeeds once the cloud recovers.
    cloud.fail_schema(None);
    let resp = dispatch(&gateway, 3, &frames::schema(&frames::sample_schema(1), true)).await;
    assert_eq!(
        status_of(&resp),
        (msg_type::SCHEMA_END_RESP, ResultCode::Success)
    );
    let resp = dispatch(&gateway, 3, &frames::data(1, &[0x01])).await;
    assert_eq!(status_of(&resp), (msg_type::DATA_RESP, ResultCode::Success));
}

#[tokio::test]
async fn recommit_replaces_the_accepted_schema() {
    let (_cloud, gateway) = new_gateway();
    register(&gateway, 3).await;
    dispatch(&gateway, 3, &frames::schema(&frames::sample_schema(1), true)).await;
    dispatch(&gateway, 3, &frames::schema(&frames::sample_schema(2), true)).await;

    // Sensor 1 was replaced away; sensor 2 is live.
    let resp = dispatch(&gateway, 3, &frames::data(1, &[0x01])).await;
    assert_eq!(
        status_of(&resp),
        (msg_type::DATA_RESP, ResultCode::InvalidData)
    );
    let resp = dispatch(&gateway, 3, &frames::data(2, &[0x01])).await;
    assert_eq!(status_of(&resp), (msg_type::DATA_RESP, ResultCode::Success));
}

#[tokio::test]
async fn retransmitted_fragment_keeps_the_first_copy() {
    let (cloud, gateway) = new_gateway();
    register(&gateway, 3).await;

    let mut original = frames::sample_schema(1);
    original.name = "first".to_owned();
    let mut retransmit = frames::sample_schema(1);
    retransmit.name = "second".to_owned();

    dispatch(&gateway, 3, &frames::schema(&original, false)).await;
    dispatch(&gateway, 3, &frames::schema(&retransmit, true)).await;

    let committed = cloud
        .calls()
        .into_iter()
        .find_map(|c| match c {
            CloudCall::Schema { schema, .. } => Some(schema),
            _ => None,
        })
        .expect("schema committed");
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].name, "first");
}
