use serde::{Deserialize, Serialize};

use crate::error::PulseError;
use crate::protocol::PatientProfile;

pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PulseRequest {
    Ping,
    Health,
    /// Full consultation; waits for the final answer (poll delivery).
    Consult {
        message: String,
        #[serde(default)]
        patient: Option<PatientProfile>,
    },
    /// Full consultation delivered as push chat messages.
    Chat {
        message: String,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        patient: Option<PatientProfile>,
    },
    /// Triage routing only.
    Route {
        symptoms: String,
        #[serde(default)]
        age: Option<u32>,
    },
    /// One specialist analysis, no orchestration.
    Analyze {
        specialty: String,
        symptoms: String,
        #[serde(default)]
        age: Option<u32>,
        #[serde(default)]
        history: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PulseResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl PulseResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// MessagePack body of one IPC frame (named fields).
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, PulseError> {
    rmp_serde::to_vec_named(value).map_err(|e| PulseError::Ipc(format!("encode: {}", e)))
}

pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, PulseError> {
    rmp_serde::from_slice(bytes).map_err(|e| PulseError::Ipc(format!("decode: {}", e)))
}
