use serde::{Deserialize, Serialize};

/// A peer as known to the hub, refreshed on every `register` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerRecord {
    pub url: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub location: Option<String>,
    pub group: Option<String>,
    pub accepts: Vec<String>,
    pub active: bool,
    /// Unix timestamp (seconds) of the last `register`/refresh.
    pub last_seen: u64,
}

impl PeerRecord {
    pub fn accepts(&self, action: &str) -> bool {
        self.accepts.iter().any(|a| a == action)
    }
}
