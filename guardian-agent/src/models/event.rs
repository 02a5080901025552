use serde::{Deserialize, Serialize};

/// An asynchronous threat notification delivered by the risk service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatEvent {
    /// Opaque identifier correlating the event to a local user.
    pub user_hash: String,
    /// Event time, seconds since the Unix epoch.
    pub time: i64,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub ip_reverse: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub system: String,
}
