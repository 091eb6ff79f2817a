//! Session handlers, one per request kind.
//!
//! Every handler resolves the connection's Trust first; operations other
//! than register/auth are refused without one.  Cloud rejections surface to
//! the thing unchanged via `ResultCode::from(CloudError)`.

use crate::dispatch::Gateway;
use crate::trust::{ConnHandle, PID_UNAVAILABLE, Trust};
use crate::validator;
use tb_cloud::Credentials;
use tb_protocol::msg::{AuthReq, DataReq, RegisterReq};
use tb_protocol::{ResultCode, SensorSchema, schema_is_valid};
use tracing::{debug, error, info, warn};

impl Gateway {
    /// Register a new device: create the cloud node, sign it in, and open a
    /// rollback-armed session.
    ///
    /// A lossy peer may retransmit a register request it never saw the
    /// answer to; when the handle already carries a session for the same
    /// device id and peer pid, the stored credentials are re-issued without
    /// touching the cloud.
    pub(crate) async fn register(
        &self,
        handle: ConnHandle,
        peer_pid: Option<i32>,
        req: &RegisterReq,
    ) -> Result<Credentials, ResultCode> {
        if req.name.is_empty() {
            error!(handle, "missing device name");
            return Err(ResultCode::RegisterInvalidDeviceName);
        }
        let peer_pid = peer_pid.unwrap_or(PID_UNAVAILABLE);

        info!(handle, device_id = req.device_id, "registering");
        if let Some(shared) = self.registry.lookup(handle).await {
            let trust = shared.lock().await;
            if trust.device_id == req.device_id && trust.peer_pid == peer_pid {
                info!(uuid = %trust.uuid, "register retransmission, re-issuing credentials");
                return Ok(Credentials {
                    uuid: trust.uuid.clone(),
                    token: trust.token.clone(),
                });
            }
        }

        let creds = self
            .cloud
            .mknode(&req.name, req.device_id)
            .await
            .map_err(ResultCode::from)?;
        info!(uuid = %creds.uuid, name = %req.name, "device node created");

        self.cloud
            .signin(&creds.uuid, &creds.token)
            .await
            .map_err(ResultCode::from)?;

        let trust = Trust::registered(
            creds.uuid.clone(),
            creds.token.clone(),
            req.device_id,
            peer_pid,
        );
        self.registry.insert(handle, trust).await;

        Ok(creds)
    }

    /// Tear down the session and remove the device from the cloud.  The
    /// local session is gone even if the cloud refuses; the error is
    /// surfaced but the Trust is not restored.
    pub(crate) async fn unregister(&self, handle: ConnHandle) -> Result<(), ResultCode> {
        let Some(shared) = self.registry.remove(handle).await else {
            info!(handle, "permission denied");
            return Err(ResultCode::CredentialUnauthorized);
        };
        let trust = shared.lock().await;
        info!(uuid = %trust.uuid, "removing device node");
        self.cloud
            .rmnode(&trust.uuid, &trust.token)
            .await
            .map_err(ResultCode::from)?;
        Ok(())
    }

    /// Authenticate with existing credentials and restore the device's
    /// cloud-side schema and config.  Idempotent per connection.
    pub(crate) async fn auth(&self, handle: ConnHandle, req: &AuthReq) -> Result<(), ResultCode> {
        if self.registry.lookup(handle).await.is_some() {
            info!(handle, "authenticated already");
            return Ok(());
        }

        let signin = self
            .cloud
            .signin(&req.uuid, &req.token)
            .await
            .map_err(ResultCode::from)?;

        if signin.schema.is_empty() {
            info!(uuid = %req.uuid, "sign-in returned no schema");
            return Err(ResultCode::SchemaEmpty);
        }

        // A bad config must not block authentication; the device just runs
        // unconfigured until the cloud sends a sane one.
        let config = match validator::validate(&signin.config) {
            Ok(()) => signin.config,
            Err(e) => {
                warn!(uuid = %req.uuid, %e, "discarding invalid config from cloud");
                Vec::new()
            }
        };

        let trust = Trust::authenticated(req.uuid.clone(), req.token.clone(), signin.schema, config);
        self.registry.insert(handle, trust).await;
        info!(uuid = %req.uuid, "authenticated");
        Ok(())
    }

    /// Accept one schema fragment; on the final fragment, publish the staged
    /// set to the cloud and commit it as the accepted schema.
    pub(crate) async fn schema(
        &self,
        handle: ConnHandle,
        fragment: &SensorSchema,
        end: bool,
    ) -> Result<(), ResultCode> {
        let Some(shared) = self.registry.lookup(handle).await else {
            info!(handle, "permission denied");
            return Err(ResultCode::CredentialUnauthorized);
        };
        let mut trust = shared.lock().await;

        // Sending schema means the credential response arrived, so the
        // registration is confirmed: a disconnect no longer clones back the
        // cloud node.
        trust.rollback = false;

        if !trust.staging_contains(fragment.sensor_id) {
            trust.staging_append(fragment);
        }

        if !end {
            return Ok(());
        }

        let result = self
            .cloud
            .schema(&trust.uuid, &trust.token, trust.staging_records())
            .await;
        match result {
            Ok(()) => {
                trust.staging_commit();
                info!(
                    uuid = %trust.uuid,
                    sensors = trust.accepted_schema().len(),
                    "schema committed"
                );
                Ok(())
            }
            Err(e) => {
                warn!(uuid = %trust.uuid, %e, "schema rejected, discarding staging");
                trust.staging_discard();
                Err(e.into())
            }
        }
    }

    /// Publish a sensor reading, then pull any pending set-data for the same
    /// sensor so it round-trips into the device.
    pub(crate) async fn data(&self, handle: ConnHandle, req: &DataReq) -> Result<(), ResultCode> {
        let Some(shared) = self.registry.lookup(handle).await else {
            info!(handle, "permission denied");
            return Err(ResultCode::CredentialUnauthorized);
        };
        let trust = shared.lock().await;

        let schema = self.checked_schema(&trust, req.sensor_id)?;
        debug!(
            sensor_id = req.sensor_id,
            unit = schema.unit,
            value_type = schema.value_type,
            "reading"
        );

        let result = self
            .cloud
            .data(
                &trust.uuid,
                &trust.token,
                req.sensor_id,
                schema.value_type,
                &req.payload,
            )
            .await;

        // Fire-and-forget: a failed pull must not fail the publish.
        if let Err(e) = self
            .cloud
            .getdata(&trust.uuid, &trust.token, req.sensor_id)
            .await
        {
            debug!(sensor_id = req.sensor_id, %e, "set-data pull failed");
        }

        result.map_err(ResultCode::from)
    }

    /// The thing acknowledged a config frame; stop re-sending it.  Emits no
    /// response frame.
    pub(crate) async fn config_resp(
        &self,
        handle: ConnHandle,
        sensor_id: u8,
    ) -> Result<(), ResultCode> {
        let Some(shared) = self.registry.lookup(handle).await else {
            info!(handle, "permission denied");
            return Err(ResultCode::CredentialUnauthorized);
        };
        let mut trust = shared.lock().await;
        trust.remove_config(sensor_id);
        info!(uuid = %trust.uuid, sensor_id, "config acknowledged");
        Ok(())
    }

    /// The thing acknowledged a set-data frame: consume the pending record
    /// in the cloud and publish the resulting state.  Emits no response
    /// frame.
    pub(crate) async fn setdata_resp(
        &self,
        handle: ConnHandle,
        req: &DataReq,
    ) -> Result<(), ResultCode> {
        let Some(shared) = self.registry.lookup(handle).await else {
            info!(handle, "permission denied");
            return Err(ResultCode::CredentialUnauthorized);
        };
        let trust = shared.lock().await;

        let schema = self.checked_schema(&trust, req.sensor_id)?;

        if let Err(e) = self
            .cloud
            .setdata(&trust.uuid, &trust.token, req.sensor_id)
            .await
        {
            debug!(sensor_id = req.sensor_id, %e, "set-data consume failed");
        }

        self.cloud
            .data(
                &trust.uuid,
                &trust.token,
                req.sensor_id,
                schema.value_type,
                &req.payload,
            )
            .await
            .map_err(ResultCode::from)?;

        info!(uuid = %trust.uuid, sensor_id = req.sensor_id, "set-data committed");
        Ok(())
    }

    /// Resolve a reading's sensor against the accepted schema and check the
    /// declared triple is one the cloud can store.
    fn checked_schema<'a>(
        &self,
        trust: &'a Trust,
        sensor_id: u8,
    ) -> Result<&'a SensorSchema, ResultCode> {
        let Some(schema) = trust.find_accepted(sensor_id) else {
            info!(sensor_id, "no accepted schema for sensor");
            return Err(ResultCode::InvalidData);
        };
        if !schema_is_valid(schema.type_id, schema.value_type, schema.unit) {
            info!(
                sensor_id,
                type_id = schema.type_id,
                "schema unit/type mismatch"
            );
            return Err(ResultCode::InvalidData);
        }
        Ok(schema)
    }
}
