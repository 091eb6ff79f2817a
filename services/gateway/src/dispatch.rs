//! Top-level PDU dispatcher and gateway lifecycle.
//!
//! `Gateway::process` is the single entry point for inbound PDUs: decode,
//! route to a handler, encode the response.  Framing failures are `Err` and
//! produce no response bytes; handler failures always produce a response
//! frame carrying the result code.  `Ok(0)` means the request kind gets no
//! reply (acknowledgements, unknown types).

use crate::trust::{ConnHandle, SharedTrust, TrustRegistry};
use std::fmt;
use std::sync::Arc;
use tb_cloud::CloudClient;
use tb_protocol::msg::{DecodeError, Request, Response, msg_type};
use tb_protocol::{RESPONSE_MAX, ResultCode};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// Output buffer cannot hold a maximum response frame.
    OutputTooSmall,
    /// Input shorter than a PDU header.
    ShortHeader,
    /// Input length disagrees with the header's payload length.
    LengthMismatch,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::OutputTooSmall => {
                write!(f, "output buffer below maximum response size")
            }
            DispatchError::ShortHeader => write!(f, "PDU below minimum length"),
            DispatchError::LengthMismatch => write!(f, "PDU length mismatch"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// The session and dispatch core.  Owns the trust registry; the cloud client
/// is an injected capability.
pub struct Gateway {
    pub registry: TrustRegistry,
    pub(crate) cloud: Arc<dyn CloudClient>,
}

impl Gateway {
    pub fn new(cloud: Arc<dyn CloudClient>) -> Gateway {
        Gateway {
            registry: TrustRegistry::new(),
            cloud,
        }
    }

    /// Process one inbound PDU, writing any response frame into `output`.
    ///
    /// Returns the number of response bytes (0 for request kinds that get no
    /// reply), or an error for framing-level failures, in which case no
    /// response bytes are produced and the caller should drop the frame.
    pub async fn process(
        &self,
        handle: ConnHandle,
        peer_pid: Option<i32>,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, DispatchError> {
        if output.len() < RESPONSE_MAX {
            error!("output buffer below maximum response size");
            return Err(DispatchError::OutputTooSmall);
        }

        let request = match Request::decode(input) {
            Ok(request) => request,
            Err(DecodeError::ShortHeader) => {
                error!(handle, len = input.len(), "PDU below minimum length");
                return Err(DispatchError::ShortHeader);
            }
            Err(DecodeError::LengthMismatch) => {
                error!(handle, len = input.len(), "PDU length mismatch");
                return Err(DispatchError::LengthMismatch);
            }
            Err(DecodeError::BadBody { msg_type }) => {
                return self.reply_bad_body(handle, msg_type, output);
            }
        };

        debug!(handle, op = input[0], len = input[1], "PDU");

        let response = match request {
            Request::Register(req) => match self.register(handle, peer_pid, &req).await {
                Ok(creds) => Response::Credential {
                    result: ResultCode::Success,
                    uuid: creds.uuid,
                    token: creds.token,
                },
                Err(result) => Response::Status {
                    msg_type: msg_type::REGISTER_RESP,
                    result,
                },
            },
            Request::Unregister => status(msg_type::UNREGISTER_RESP, self.unregister(handle).await),
            Request::Auth(req) => status(msg_type::AUTH_RESP, self.auth(handle, &req).await),
            Request::Schema { fragment, end } => {
                let resp_type = if end {
                    msg_type::SCHEMA_END_RESP
                } else {
                    msg_type::SCHEMA_RESP
                };
                status(resp_type, self.schema(handle, &fragment, end).await)
            }
            Request::Data(req) => status(msg_type::DATA_RESP, self.data(handle, &req).await),
            Request::ConfigResponse { sensor_id } => {
                // No octets to be transmitted.
                let _ = self.config_resp(handle, sensor_id).await;
                return Ok(0);
            }
            Request::SetDataResponse(req) => {
                let _ = self.setdata_resp(handle, &req).await;
                return Ok(0);
            }
            Request::Unknown(msg_type) => {
                debug!(handle, msg_type, "unknown message type, no reply");
                return Ok(0);
            }
        };

        response
            .encode(output)
            .map_err(|_| DispatchError::OutputTooSmall)
    }

    /// A well-framed PDU whose body is unusable still gets an error reply,
    /// so the peer can tell rejection from loss.
    fn reply_bad_body(
        &self,
        handle: ConnHandle,
        bad_type: u8,
        output: &mut [u8],
    ) -> Result<usize, DispatchError> {
        warn!(handle, msg_type = bad_type, "malformed PDU body");
        let (resp_type, result) = match bad_type {
            msg_type::REGISTER_REQ => (
                msg_type::REGISTER_RESP,
                ResultCode::RegisterInvalidDeviceName,
            ),
            msg_type::AUTH_REQ => (msg_type::AUTH_RESP, ResultCode::InvalidData),
            msg_type::SCHEMA => (msg_type::SCHEMA_RESP, ResultCode::InvalidData),
            msg_type::SCHEMA_END => (msg_type::SCHEMA_END_RESP, ResultCode::InvalidData),
            msg_type::DATA => (msg_type::DATA_RESP, ResultCode::InvalidData),
            // Acknowledgement kinds never get a reply.
            _ => return Ok(0),
        };
        Response::Status {
            msg_type: resp_type,
            result,
        }
        .encode(output)
        .map_err(|_| DispatchError::OutputTooSmall)
    }

    /// Disconnect hook: drop the connection's session, removing the cloud
    /// node first when the registration was never confirmed.
    pub async fn connection_closed(&self, handle: ConnHandle) {
        if let Some(trust) = self.registry.remove(handle).await {
            self.finalize(trust).await;
        }
    }

    /// Graceful shutdown: finalize every remaining session.
    pub async fn shutdown(&self) {
        let remaining = self.registry.drain().await;
        if !remaining.is_empty() {
            info!(sessions = remaining.len(), "finalizing remaining sessions");
        }
        for trust in remaining {
            self.finalize(trust).await;
        }
    }

    async fn finalize(&self, trust: SharedTrust) {
        let trust = trust.lock().await;
        if trust.rollback {
            info!(uuid = %trust.uuid, "rolling back unconfirmed registration");
            if let Err(e) = self.cloud.rmnode(&trust.uuid, &trust.token).await {
                warn!(uuid = %trust.uuid, %e, "rollback rmnode failed");
            }
        }
    }
}

fn status(msg_type: u8, result: Result<(), ResultCode>) -> Response {
    Response::Status {
        msg_type,
        result: match result {
            Ok(()) => ResultCode::Success,
            Err(code) => code,
        },
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
