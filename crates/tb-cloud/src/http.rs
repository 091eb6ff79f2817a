//! JSON/HTTP implementation of the cloud contract.
//!
//! # Endpoints
//! - `POST   /devices`                        create node, returns credentials
//! - `DELETE /devices/{uuid}`                 remove node
//! - `GET    /devices/{uuid}`                 sign-in; returns schema + config
//! - `PUT    /devices/{uuid}/schema`          replace schema
//! - `POST   /devices/{uuid}/data`            publish a reading
//! - `GET    /devices/{uuid}/data/{sensor}`   pull pending set-data
//! - `DELETE /devices/{uuid}/data/{sensor}`   consume pending set-data
//!
//! Device credentials ride in `x-device-uuid` / `x-device-token` headers.
//! Opaque reading payloads are base64-encoded into the JSON body.

use crate::{CloudClient, CloudError, Credentials, SignIn};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tb_protocol::{ResultCode, SensorConfig, SensorSchema};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpCloudConfig {
    /// Service root, e.g. `https://cloud.example.com`.
    pub base_url: String,
    pub timeout: Duration,
}

pub struct HttpCloud {
    http: Client,
    base_url: String,
}

impl HttpCloud {
    pub fn new(cfg: &HttpCloudConfig) -> Result<HttpCloud, CloudError> {
        let http = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| CloudError::Transport(e.to_string()))?;
        Ok(HttpCloud {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, CloudError> {
        let resp = req
            .send()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?;
        match status_to_code(resp.status()) {
            None => Ok(resp),
            Some(code) => {
                debug!(status = %resp.status(), "cloud refused request");
                Err(CloudError::Rejected(code))
            }
        }
    }
}

/// Map an HTTP status onto the protocol's result space; `None` for success.
fn status_to_code(status: StatusCode) -> Option<ResultCode> {
    if status.is_success() {
        return None;
    }
    let code = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ResultCode::CredentialUnauthorized,
        StatusCode::NOT_FOUND => ResultCode::InvalidData,
        StatusCode::UNPROCESSABLE_ENTITY => ResultCode::InvalidData,
        _ => ResultCode::ErrorUnknown,
    };
    Some(code)
}

fn device_headers(req: RequestBuilder, uuid: &str, token: &str) -> RequestBuilder {
    req.header("x-device-uuid", uuid)
        .header("x-device-token", token)
}

// ---------------------------------------------------------------------------
// JSON bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct MknodeBody<'a> {
    name: &'a str,
    /// 64-bit ids don't survive JSON numbers; fixed-width hex instead.
    id: String,
}

#[derive(Deserialize)]
struct CredentialsBody {
    uuid: String,
    token: String,
}

#[derive(Deserialize, Default)]
struct DeviceBody {
    #[serde(default)]
    schema: Vec<SensorSchema>,
    #[serde(default)]
    config: Vec<SensorConfig>,
}

#[derive(Serialize)]
struct SchemaBody<'a> {
    schema: &'a [SensorSchema],
}

#[derive(Serialize)]
struct DataBody {
    sensor_id: u8,
    value_type: u8,
    value: String,
}

#[async_trait]
impl CloudClient for HttpCloud {
    async fn mknode(&self, name: &str, device_id: u64) -> Result<Credentials, CloudError> {
        let body = MknodeBody {
            name,
            id: format!("{:016x}", device_id),
        };
        let resp = self
            .send(self.http.post(self.url("/devices")).json(&body))
            .await?;
        let creds: CredentialsBody = resp
            .json()
            .await
            .map_err(|e| CloudError::Decode(e.to_string()))?;
        Ok(Credentials {
            uuid: creds.uuid,
            token: creds.token,
        })
    }

    async fn rmnode(&self, uuid: &str, token: &str) -> Result<(), CloudError> {
        let req = self.http.delete(self.url(&format!("/devices/{}", uuid)));
        self.send(device_headers(req, uuid, token)).await?;
        Ok(())
    }

    async fn signin(&self, uuid: &str, token: &str) -> Result<SignIn, CloudError> {
        let req = self.http.get(self.url(&format!("/devices/{}", uuid)));
        let resp = self.send(device_headers(req, uuid, token)).await?;
        let device: DeviceBody = resp
            .json()
            .await
            .map_err(|e| CloudError::Decode(e.to_string()))?;
        Ok(SignIn {
            schema: device.schema,
            config: device.config,
        })
    }

    async fn schema(
        &self,
        uuid: &str,
        token: &str,
        schema: &[SensorSchema],
    ) -> Result<(), CloudError> {
        let req = self
            .http
            .put(self.url(&format!("/devices/{}/schema", uuid)))
            .json(&SchemaBody { schema });
        self.send(device_headers(req, uuid, token)).await?;
        Ok(())
    }

    async fn data(
        &self,
        uuid: &str,
        token: &str,
        sensor_id: u8,
        value_type: u8,
        payload: &[u8],
    ) -> Result<(), CloudError> {
        let body = DataBody {
            sensor_id,
            value_type,
            value: BASE64.encode(payload),
        };
        let req = self
            .http
            .post(self.url(&format!("/devices/{}/data", uuid)))
            .json(&body);
        self.send(device_headers(req, uuid, token)).await?;
        Ok(())
    }

    async fn getdata(&self, uuid: &str, token: &str, sensor_id: u8) -> Result<(), CloudError> {
        let req = self
            .http
            .get(self.url(&format!("/devices/{}/data/{}", uuid, sensor_id)));
        self.send(device_headers(req, uuid, token)).await?;
        Ok(())
    }

    async fn setdata(&self, uuid: &str, token: &str, sensor_id: u8) -> Result<(), CloudError> {
        let req = self
            .http
            .delete(self.url(&format!("/devices/{}/data/{}", uuid, sensor_id)));
        self.send(device_headers(req, uuid, token)).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
