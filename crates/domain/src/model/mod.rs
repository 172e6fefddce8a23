//! Data structures shared across the API and monitor crates.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Page of pending transactions returned by a mempool query endpoint. Only the
/// `results` array matters; paging fields are tolerated when absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PendingTxPage {
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub results: Vec<PendingTxRecord>,
}

/// A mempool entry. The core reads `tx_id` and `sender_address`; the rest is
/// carried along untouched. Absent fields decode as empty so one odd entry
/// never costs the rest of its page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTxRecord {
    #[serde(default)]
    pub tx_id: String,
    #[serde(default)]
    pub sender_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_rate: Option<String>,
}

impl PendingTxRecord {
    pub fn new(tx_id: impl Into<String>, sender_address: impl Into<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            sender_address: sender_address.into(),
            tx_status: None,
            tx_type: None,
            nonce: None,
            fee_rate: None,
        }
    }
}

/// Pre-signed, already serialized transaction. Never decoded: the bytes go on
/// the wire exactly as supplied.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Payload(Bytes);

impl Payload {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cheap reference-counted copy for handing to an HTTP body.
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

// Payloads can be large signed blobs; logs only need the size.
impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({} bytes)", self.0.len())
    }
}

/// Outcome of submitting the payload to one broadcast node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastResult {
    pub node_url: String,
    #[serde(default)]
    pub tx_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl BroadcastResult {
    pub fn accepted(node_url: impl Into<String>, tx_id: impl Into<String>) -> Self {
        Self {
            node_url: node_url.into(),
            tx_id: tx_id.into(),
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(node_url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            node_url: node_url.into(),
            tx_id: String::new(),
            success: false,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Point-in-time view of the monitoring session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub is_running: bool,
    pub target_address: String,
    pub detected_count: usize,
    #[serde(rename = "detectedTxIDs")]
    pub detected_tx_ids: Vec<String>,
    pub broadcast_count: usize,
    pub last_check_time: Option<DateTime<Utc>>,
}

/// Answer of a one-shot check: every matching transaction seen in that poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuickCheckOutcome {
    pub detected: bool,
    pub tx_ids: Vec<String>,
}

impl QuickCheckOutcome {
    pub fn from_tx_ids(tx_ids: Vec<String>) -> Self {
        Self {
            detected: !tx_ids.is_empty(),
            tx_ids,
        }
    }
}
