//! JSON message types for active checks.
//!
//! Two request/response pairs, each carried in one frame per direction:
//!   1. "active checks" -- register the host, learn which items to send
//!   2. "agent data"    -- push a batch of item values

use serde::{Deserialize, Serialize};

use crate::{AGENT_VARIANT, PROTOCOL_VERSION};

/// Response value signalling success in both exchanges.
pub const RESPONSE_SUCCESS: &str = "success";

pub const REQUEST_ACTIVE_CHECKS: &str = "active checks";
pub const REQUEST_AGENT_DATA: &str = "agent data";

// ============================================================================
// Registration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveChecksRequest {
    pub request: String,
    pub host: String,
    pub version: String,
    pub variant: u8,
}

impl ActiveChecksRequest {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            request: REQUEST_ACTIVE_CHECKS.into(),
            host: host.into(),
            version: PROTOCOL_VERSION.into(),
            variant: AGENT_VARIANT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveChecksResponse {
    pub response: String,
    #[serde(default)]
    pub data: Vec<SupportedItem>,
}

/// An item the collector expects this agent to push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedItem {
    pub key: String,
    #[serde(rename = "itemid")]
    pub item_id: u64,
    #[serde(default)]
    pub delay: String,
    #[serde(default)]
    pub timeout: String,
}

// ============================================================================
// Agent data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDataRequest {
    pub request: String,
    pub data: Vec<AgentDataValue>,
    pub session: String,
    pub host: String,
    pub version: String,
    pub variant: u8,
}

impl AgentDataRequest {
    pub fn new(
        session: impl Into<String>,
        host: impl Into<String>,
        data: Vec<AgentDataValue>,
    ) -> Self {
        Self {
            request: REQUEST_AGENT_DATA.into(),
            data,
            session: session.into(),
            host: host.into(),
            version: PROTOCOL_VERSION.into(),
            variant: AGENT_VARIANT,
        }
    }
}

/// One pushed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDataValue {
    /// Per-item sequence number within the session.
    pub id: u64,
    #[serde(rename = "itemid")]
    pub item_id: u64,
    pub value: String,
    /// Unix seconds.
    pub clock: i64,
    /// Nanosecond remainder of `clock`.
    pub ns: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDataResponse {
    pub response: String,
    #[serde(default)]
    pub info: String,
}
