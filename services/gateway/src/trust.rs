//! Per-connection session state.
//!
//! A `Trust` links a connection handle to a cloud identity and carries the
//! device's accepted schema, the staging buffer for an in-progress schema
//! transfer, and the last config received from the cloud.  Ownership is
//! shared between the registry and any in-flight handler via `Arc`, so a
//! handler suspended on a cloud call keeps its Trust alive even if the
//! connection is torn down concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use tb_protocol::{SensorConfig, SensorSchema};
use tokio::sync::Mutex;

/// Process-local connection identifier (the transport's file descriptor).
pub type ConnHandle = i32;

/// Stand-in peer pid when the transport cannot report one.
pub const PID_UNAVAILABLE: i32 = i32::MAX;

#[derive(Debug)]
pub struct Trust {
    /// Opaque identifier reported by the peer at registration.
    pub device_id: u64,
    /// Peer pid captured at registration; used only to recognize legitimate
    /// register retransmissions.
    pub peer_pid: i32,
    pub uuid: String,
    pub token: String,
    /// True between a successful register and the first schema commit; a
    /// Trust dropped while this is set must be removed from the cloud.
    pub rollback: bool,
    schema: Vec<SensorSchema>,
    staging: Option<Vec<SensorSchema>>,
    pub config: Vec<SensorConfig>,
}

impl Trust {
    /// Session for a freshly registered device.  Rollback is armed until the
    /// device commits a schema.
    pub fn registered(uuid: String, token: String, device_id: u64, peer_pid: i32) -> Trust {
        Trust {
            device_id,
            peer_pid,
            uuid,
            token,
            rollback: true,
            schema: Vec::new(),
            staging: None,
            config: Vec::new(),
        }
    }

    /// Session for a device that authenticated with existing credentials.
    pub fn authenticated(
        uuid: String,
        token: String,
        schema: Vec<SensorSchema>,
        config: Vec<SensorConfig>,
    ) -> Trust {
        Trust {
            device_id: 0,
            peer_pid: 0,
            uuid,
            token,
            rollback: false,
            schema,
            staging: None,
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Schema store
    // -----------------------------------------------------------------------

    pub fn staging_contains(&self, sensor_id: u8) -> bool {
        self.staging
            .as_ref()
            .is_some_and(|s| s.iter().any(|r| r.sensor_id == sensor_id))
    }

    /// Copy a fragment into staging, opening the staging buffer on the first
    /// fragment of a transfer.  Duplicate sensor ids keep the first copy, so
    /// a peer may retransmit fragments freely.
    pub fn staging_append(&mut self, record: &SensorSchema) {
        let staging = self.staging.get_or_insert_with(Vec::new);
        if !staging.iter().any(|r| r.sensor_id == record.sensor_id) {
            staging.push(record.clone());
        }
    }

    /// The records staged so far, in arrival order.
    pub fn staging_records(&self) -> &[SensorSchema] {
        self.staging.as_deref().unwrap_or(&[])
    }

    pub fn staging_is_open(&self) -> bool {
        self.staging.is_some()
    }

    /// Drop an in-progress transfer; the accepted schema is untouched.
    pub fn staging_discard(&mut self) {
        self.staging = None;
    }

    /// Replace the accepted schema with the staged records.  No-op when no
    /// transfer is open.
    pub fn staging_commit(&mut self) {
        if let Some(staged) = self.staging.take() {
            self.schema = staged;
        }
    }

    pub fn find_accepted(&self, sensor_id: u8) -> Option<&SensorSchema> {
        self.schema.iter().find(|r| r.sensor_id == sensor_id)
    }

    pub fn accepted_schema(&self) -> &[SensorSchema] {
        &self.schema
    }

    // -----------------------------------------------------------------------
    // Config
    // -----------------------------------------------------------------------

    /// Forget the config entry for a sensor once the thing acknowledged it.
    /// Removing an absent entry is a defined no-op.
    pub fn remove_config(&mut self, sensor_id: u8) -> bool {
        let before = self.config.len();
        self.config.retain(|c| c.sensor_id != sensor_id);
        self.config.len() != before
    }
}

pub type SharedTrust = Arc<Mutex<Trust>>;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps connection handles to sessions: online devices only.
#[derive(Default)]
pub struct TrustRegistry {
    map: Mutex<HashMap<ConnHandle, SharedTrust>>,
}

impl TrustRegistry {
    pub fn new() -> TrustRegistry {
        TrustRegistry::default()
    }

    /// Insert a Trust for a handle, displacing any prior session on the same
    /// handle (its registry reference is released here).
    pub async fn insert(&self, handle: ConnHandle, trust: Trust) -> SharedTrust {
        let shared = Arc::new(Mutex::new(trust));
        self.map.lock().await.insert(handle, shared.clone());
        shared
    }

    pub async fn lookup(&self, handle: ConnHandle) -> Option<SharedTrust> {
        self.map.lock().await.get(&handle).cloned()
    }

    /// Remove and return the session, transferring the registry's reference
    /// to the caller.
    pub async fn remove(&self, handle: ConnHandle) -> Option<SharedTrust> {
        self.map.lock().await.remove(&handle)
    }

    /// Empty the registry, handing every remaining session to the caller for
    /// finalization.
    pub async fn drain(&self) -> Vec<SharedTrust> {
        self.map.lock().await.drain().map(|(_, t)| t).collect()
    }

    pub async fn len(&self) -> usize {
        self.map.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.map.lock().await.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
