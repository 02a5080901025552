use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maps the risk service's opaque user hash back to a local account.
///
/// Upserted on every successful login so inbound events can be routed to
/// the affected user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserHashLink {
    pub user_hash: String,
    pub username: String,
    pub email: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_utc: DateTime<Utc>,
}

impl UserHashLink {
    pub fn new(agent_id: &str, username: &str, email: &str) -> Self {
        Self {
            user_hash: user_hash(agent_id, username),
            username: username.to_string(),
            email: email.to_string(),
            created_utc: Utc::now(),
        }
    }
}

/// Deterministic correlator for a user: both sides can derive it from the
/// agent id and the username alone.
pub fn user_hash(agent_id: &str, username: &str) -> String {
    let input = format!("{}:{}", agent_id, username.to_lowercase());
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_case_insensitive() {
        let a = user_hash("agent-1", "Alice");
        let b = user_hash("agent-1", "alice");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_differs_per_agent() {
        assert_ne!(user_hash("agent-1", "alice"), user_hash("agent-2", "alice"));
    }
}
