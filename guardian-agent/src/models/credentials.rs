use serde::{Deserialize, Serialize};

/// The agent's registered identity with the risk service.
///
/// Created empty, populated once by registration, read on every login.
/// Persisted as a single document so the returned fields land atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCredentials {
    pub agent_id: String,
    /// Symmetric key, base64.
    pub key: String,
    /// Key material returned alongside the key, base64. Bound into the
    /// payload envelope as associated data.
    pub iv: String,
    pub org_id: String,
    pub auth_group_id: String,
    pub service_name: String,
    /// Locally derived random salt, kept for future use.
    pub salt: String,
    /// Whether reverse DNS resolution is expected for this agent.
    pub reverse_dns: bool,
}

impl AgentCredentials {
    /// Registration is complete once a symmetric key is present.
    pub fn is_registered(&self) -> bool {
        !self.key.is_empty() && !self.agent_id.is_empty()
    }
}
