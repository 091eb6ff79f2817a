// tb-cloud: Remote device-service client.
//
// The gateway core consumes the `CloudClient` trait only; `HttpCloud` is the
// production implementation against the cloud's JSON REST API.  Cloud result
// codes share the thing protocol's value space, so a rejection surfaces to
// the thing verbatim.

pub mod http;

pub use http::{HttpCloud, HttpCloudConfig};

use async_trait::async_trait;
use tb_protocol::{ResultCode, SensorConfig, SensorSchema};
use thiserror::Error;

/// Cloud-assigned device identity pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub uuid: String,
    pub token: String,
}

/// Device state returned by a successful sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignIn {
    pub schema: Vec<SensorSchema>,
    pub config: Vec<SensorConfig>,
}

#[derive(Debug, Error)]
pub enum CloudError {
    /// The cloud understood the request and refused it.
    #[error("cloud rejected operation: {0}")]
    Rejected(ResultCode),
    /// The request never completed (connect, TLS, timeout).
    #[error("cloud transport failure: {0}")]
    Transport(String),
    /// The cloud answered with a body this client cannot interpret.
    #[error("cloud response decode failure: {0}")]
    Decode(String),
}

impl CloudError {
    /// The result byte to surface to the thing for this failure.
    pub fn result_code(&self) -> ResultCode {
        match self {
            CloudError::Rejected(code) => *code,
            CloudError::Transport(_) | CloudError::Decode(_) => ResultCode::ErrorUnknown,
        }
    }
}

impl From<CloudError> for ResultCode {
    fn from(err: CloudError) -> ResultCode {
        err.result_code()
    }
}

/// The remote operations the gateway core invokes.
///
/// Injected as `Arc<dyn CloudClient>`; the core never constructs one.  All
/// retry/backoff policy lives behind this seam.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Create a device node; returns its assigned credentials.
    async fn mknode(&self, name: &str, device_id: u64) -> Result<Credentials, CloudError>;

    /// Remove a device node.
    async fn rmnode(&self, uuid: &str, token: &str) -> Result<(), CloudError>;

    /// Authenticate a device and fetch its accepted schema and config.
    async fn signin(&self, uuid: &str, token: &str) -> Result<SignIn, CloudError>;

    /// Publish a complete schema, replacing whatever the cloud held.
    async fn schema(
        &self,
        uuid: &str,
        token: &str,
        schema: &[SensorSchema],
    ) -> Result<(), CloudError>;

    /// Publish one sensor reading.
    async fn data(
        &self,
        uuid: &str,
        token: &str,
        sensor_id: u8,
        value_type: u8,
        payload: &[u8],
    ) -> Result<(), CloudError>;

    /// Pull pending set-data for a sensor so it round-trips into the device.
    async fn getdata(&self, uuid: &str, token: &str, sensor_id: u8) -> Result<(), CloudError>;

    /// Consume the pending set-data record for a sensor.
    async fn setdata(&self, uuid: &str, token: &str, sensor_id: u8) -> Result<(), CloudError>;
}
