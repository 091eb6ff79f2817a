//! In-memory cloud double.
//!
//! Records every call in arrival order and supports scripting a failure per
//! operation.  `mknode` mints credentials with the exact wire widths
//! (hyphenated v4 uuid = 36 bytes, 20 random bytes hex-encoded = 40 bytes).

use async_trait::async_trait;
use rand::Rng;
use std::sync::Mutex;
use tb_cloud::{CloudClient, CloudError, Credentials, SignIn};
use tb_protocol::{ResultCode, SensorSchema};
use uuid::Uuid;

/// One recorded cloud invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudCall {
    Mknode {
        name: String,
        device_id: u64,
    },
    Rmnode {
        uuid: String,
    },
    Signin {
        uuid: String,
    },
    Schema {
        uuid: String,
        schema: Vec<SensorSchema>,
    },
    Data {
        uuid: String,
        sensor_id: u8,
        value_type: u8,
        payload: Vec<u8>,
    },
    Getdata {
        uuid: String,
        sensor_id: u8,
    },
    Setdata {
        uuid: String,
        sensor_id: u8,
    },
}

#[derive(Default)]
struct Failures {
    mknode: Option<ResultCode>,
    rmnode: Option<ResultCode>,
    signin: Option<ResultCode>,
    schema: Option<ResultCode>,
    data: Option<ResultCode>,
    getdata: Option<ResultCode>,
    setdata: Option<ResultCode>,
}

#[derive(Default)]
pub struct MockCloud {
    calls: Mutex<Vec<CloudCall>>,
    signin_state: Mutex<SignIn>,
    failures: Mutex<Failures>,
}

impl MockCloud {
    pub fn new() -> MockCloud {
        MockCloud::default()
    }

    /// What subsequent `signin` calls return on success.
    pub fn set_signin(&self, state: SignIn) {
        *self.signin_state.lock().unwrap() = state;
    }

    pub fn fail_mknode(&self, code: Option<ResultCode>) {
        self.failures.lock().unwrap().mknode = code;
    }

    pub fn fail_rmnode(&self, code: Option<ResultCode>) {
        self.failures.lock().unwrap().rmnode = code;
    }

    pub fn fail_signin(&self, code: Option<ResultCode>) {
        self.failures.lock().unwrap().signin = code;
    }

    pub fn fail_schema(&self, code: Option<ResultCode>) {
        self.failures.lock().unwrap().schema = code;
    }

    pub fn fail_data(&self, code: Option<ResultCode>) {
        self.failures.lock().unwrap().data = code;
    }

    pub fn fail_getdata(&self, code: Option<ResultCode>) {
        self.failures.lock().unwrap().getdata = code;
    }

    pub fn fail_setdata(&self, code: Option<ResultCode>) {
        self.failures.lock().unwrap().setdata = code;
    }

    /// Snapshot of every recorded call, in arrival order.
    pub fn calls(&self) -> Vec<CloudCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mknode_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, CloudCall::Mknode { .. }))
            .count()
    }

    pub fn rmnode_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, CloudCall::Rmnode { .. }))
            .count()
    }

    fn record(&self, call: CloudCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, scripted: Option<ResultCode>) -> Result<(), CloudError> {
        match scripted {
            Some(code) => Err(CloudError::Rejected(code)),
            None => Ok(()),
        }
    }
}

fn mint_credentials() -> Credentials {
    let mut token_bytes = [0u8; 20];
    rand::thread_rng().fill(&mut token_bytes[..]);
    Credentials {
        uuid: Uuid::new_v4().to_string(),
        token: hex::encode(token_bytes),
    }
}

#[async_trait]
impl CloudClient for MockCloud {
    async fn mknode(&self, name: &str, device_id: u64) -> Result<Credentials, CloudError> {
        self.record(CloudCall::Mknode {
            name: name.to_owned(),
            device_id,
        });
        self.check(self.failures.lock().unwrap().mknode)?;
        Ok(mint_credentials())
    }

    async fn rmnode(&self, uuid: &str, _token: &str) -> Result<(), CloudError> {
        self.record(CloudCall::Rmnode {
            uuid: uuid.to_owned(),
        });
        self.check(self.failures.lock().unwrap().rmnode)
    }

    async fn signin(&self, uuid: &str, _token: &str) -> Result<SignIn, CloudError> {
        self.record(CloudCall::Signin {
            uuid: uuid.to_owned(),
        });
        self.check(self.failures.lock().unwrap().signin)?;
        Ok(self.signin_state.lock().unwrap().clone())
    }

    async fn schema(
        &self,
        uuid: &str,
        _token: &str,
        schema: &[SensorSchema],
    ) -> Result<(), CloudError> {
        self.record(CloudCall::Schema {
            uuid: uuid.to_owned(),
            schema: schema.to_vec(),
        });
        self.check(self.failures.lock().unwrap().schema)
    }

    async fn data(
        &self,
        uuid: &str,
        _token: &str,
        sensor_id: u8,
        value_type: u8,
        payload: &[u8],
    ) -> Result<(), CloudError> {
        self.record(CloudCall::Data {
            uuid: uuid.to_owned(),
            sensor_id,
            value_type,
            payload: payload.to_vec(),
        });
        self.check(self.failures.lock().unwrap().data)
    }

    async fn getdata(&self, uuid: &str, _token: &str, sensor_id: u8) -> Result<(), CloudError> {
        self.record(CloudCall::Getdata {
            uuid: uuid.to_owned(),
            sensor_id,
        });
        self.check(self.failures.lock().unwrap().getdata)
    }

    async fn setdata(&self, uuid: &str, _token: &str, sensor_id: u8) -> Result<(), CloudError> {
        self.record(CloudCall::Setdata {
            uuid: uuid.to_owned(),
            sensor_id,
        });
        self.check(self.failures.lock().unwrap().setdata)
    }
}
