//! Daemon wire protocol: newline-delimited JSON envelopes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KanbusError;

/// Protocol version spoken by this build.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Client request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub protocol_version: String,
    pub request_id: String,
    pub action: String,
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
}

/// Structured error inside a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

/// Daemon response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub protocol_version: String,
    pub request_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl ResponseEnvelope {
    pub fn ok(request_id: String, result: BTreeMap<String, Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            request_id,
            status: "ok".to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(request_id: String, code: &str, message: String) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            request_id,
            status: "error".to_string(),
            result: None,
            error: Some(ErrorEnvelope {
                code: code.to_string(),
                message,
                details: BTreeMap::new(),
            }),
        }
    }
}

/// Enforce the version rule: equal major, client minor at most ours.
pub fn validate_protocol_compatibility(
    client_version: &str,
    daemon_version: &str,
) -> Result<(), KanbusError> {
    let (client_major, client_minor) = parse_version(client_version)?;
    let (daemon_major, daemon_minor) = parse_version(daemon_version)?;
    if client_major != daemon_major {
        return Err(KanbusError::ProtocolVersionMismatch);
    }
    if client_minor > daemon_minor {
        return Err(KanbusError::ProtocolVersionUnsupported);
    }
    Ok(())
}

fn parse_version(version: &str) -> Result<(u32, u32), KanbusError> {
    let parts: Vec<&str> = version.split('.').collect();
    let [major, minor] = parts.as_slice() else {
        return Err(KanbusError::ProtocolVersionMismatch);
    };
    let major = major
        .parse()
        .map_err(|_| KanbusError::ProtocolVersionMismatch)?;
    let minor = minor
        .parse()
        .map_err(|_| KanbusError::ProtocolVersionMismatch)?;
    Ok((major, minor))
}
