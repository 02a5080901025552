//! Login decision logic.
//!
//! `LoginGuard` is the capability surface a host adapter wires its
//! post-authentication hook and scheduled task into. It never validates or
//! mutates credentials itself; it only observes logins that another
//! component has already authenticated.

use crate::config::{FailPolicy, GuardianConfig};
use crate::models::{AgentCredentials, UserHashLink};
use crate::services::guardiankey::{AccessCheckRequest, RiskClient};
use crate::services::store::AgentStore;
use agent_core::error::AppError;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use validator::Validate;

/// One successful (or failed) authentication observed by the host.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginEvent {
    #[validate(length(min = 1, message = "Username cannot be empty"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub login_failed: bool,
}

/// What the host must do with the session.
///
/// A `Block` means the session is terminated immediately and the browser is
/// sent to the redirect target; it is never subject to the interactive
/// confirmation used for user-initiated logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block { redirect: String },
}

impl Decision {
    pub fn is_block(&self) -> bool {
        matches!(self, Decision::Block { .. })
    }
}

/// Result of one scheduled registration tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    AlreadyRegistered,
    Registered,
}

pub struct LoginGuard {
    config: GuardianConfig,
    store: Arc<dyn AgentStore>,
    client: Arc<dyn RiskClient>,
    registration_lock: Mutex<()>,
}

impl LoginGuard {
    pub fn new(
        config: GuardianConfig,
        store: Arc<dyn AgentStore>,
        client: Arc<dyn RiskClient>,
    ) -> Self {
        Self {
            config,
            store,
            client,
            registration_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &GuardianConfig {
        &self.config
    }

    /// Decide what happens to an authenticated session.
    pub async fn on_authenticated(&self, login: &LoginEvent) -> Result<Decision, AppError> {
        let creds = match self.store.load_credentials().await? {
            Some(creds) if creds.is_registered() => creds,
            _ => {
                tracing::debug!("Agent not registered yet, letting login proceed");
                return Ok(Decision::Allow);
            }
        };

        // Record the hash so inbound events can be routed back to this user.
        let link = UserHashLink::new(&creds.agent_id, &login.username, &login.email);
        if let Err(e) = self.store.upsert_user_link(&link).await {
            tracing::error!(error = %e, username = %login.username, "Failed to record user hash");
        }

        let request = AccessCheckRequest {
            username: login.username.clone(),
            email: login.email.clone(),
            ip: login.ip.clone(),
            user_agent: login.user_agent.clone(),
            service: creds.service_name.clone(),
            login_failed: login.login_failed,
            reverse_dns: creds.reverse_dns,
            time: chrono::Utc::now().timestamp(),
        };

        if self.config.remote.active {
            self.blocking_check(&creds, &request).await
        } else {
            self.audit_only(creds, request);
            Ok(Decision::Allow)
        }
    }

    async fn blocking_check(
        &self,
        creds: &AgentCredentials,
        request: &AccessCheckRequest,
    ) -> Result<Decision, AppError> {
        match self.client.check_access(creds, request).await {
            Ok(verdict) => {
                if verdict.is_block() {
                    tracing::warn!(
                        username = %request.username,
                        "Risk service blocked the login, terminating session"
                    );
                    Ok(self.block_decision())
                } else {
                    tracing::debug!(
                        username = %request.username,
                        verdict = %verdict,
                        "Login allowed"
                    );
                    Ok(Decision::Allow)
                }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    username = %request.username,
                    "Access check failed, applying fail policy"
                );
                match self.config.remote.fail_policy {
                    FailPolicy::Open => Ok(Decision::Allow),
                    FailPolicy::Closed => Ok(self.block_decision()),
                }
            }
        }
    }

    /// Fire-and-forget audit event; failures are logged inside the task.
    fn audit_only(&self, creds: AgentCredentials, request: AccessCheckRequest) {
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            if let Err(e) = client.send_event(&creds, &request).await {
                tracing::error!(
                    error = %e,
                    username = %request.username,
                    "Failed to send audit event"
                );
            }
        });
    }

    fn block_decision(&self) -> Decision {
        Decision::Block {
            redirect: self.config.remote.landing_url.clone(),
        }
    }

    /// Register the agent if no key is configured yet.
    ///
    /// The lock plus the re-check under it keeps overlapping ticks from
    /// registering two agents for the same deployment.
    pub async fn on_scheduled_tick(&self) -> Result<SyncOutcome, AppError> {
        if self.is_registered().await? {
            return Ok(SyncOutcome::AlreadyRegistered);
        }

        let _guard = self.registration_lock.lock().await;
        if self.is_registered().await? {
            return Ok(SyncOutcome::AlreadyRegistered);
        }

        let registration = self
            .client
            .register(
                &self.config.remote.admin_email,
                "webhook",
                serde_json::json!({ "webhook_url": self.config.webhook_url() }),
            )
            .await?;

        if registration.agent_id.is_empty() {
            return Err(AppError::RemoteService(anyhow::anyhow!(
                "Registration returned an empty agent id"
            )));
        }

        let creds = AgentCredentials {
            agent_id: registration.agent_id,
            key: registration.key,
            iv: registration.iv,
            org_id: registration.org_id,
            auth_group_id: registration.auth_group_id,
            service_name: self.config.service_name.clone(),
            salt: random_salt(),
            reverse_dns: self.config.remote.reverse_dns,
        };
        self.store.save_credentials(&creds).await?;

        tracing::info!(agent_id = %creds.agent_id, "Agent registered with the risk service");
        Ok(SyncOutcome::Registered)
    }

    async fn is_registered(&self) -> Result<bool, AppError> {
        Ok(self
            .store
            .load_credentials()
            .await?
            .map(|c| c.is_registered())
            .unwrap_or(false))
    }

    // The guard only observes logins; every credential-mutation capability
    // is disabled.

    pub fn validates_credentials(&self) -> bool {
        false
    }

    pub fn supports_password_change(&self) -> bool {
        false
    }

    pub fn supports_password_reset(&self) -> bool {
        false
    }

    pub fn change_password_url(&self) -> Option<String> {
        None
    }
}

fn random_salt() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
