//! Client for the GuardianKey risk-scoring API.
//!
//! Three operations: `register` (bootstrap, before any key exists),
//! `checkaccess` (synchronous verdict for a login) and `sendevent`
//! (fire-and-forget audit). The authenticated operations seal their payload
//! in the agent envelope and sign the request with the agent key.

use crate::models::{AgentCredentials, Verdict};
use crate::services::crypto;
use agent_core::error::AppError;
use agent_core::utils::signature::sign_request;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REGISTER_PATH: &str = "/api/v1/register";
const CHECK_ACCESS_PATH: &str = "/api/v1/checkaccess";
const SEND_EVENT_PATH: &str = "/api/v1/sendevent";

/// Identity and context of one authenticated login, as forwarded to the
/// risk service.
#[derive(Debug, Clone, Serialize)]
pub struct AccessCheckRequest {
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub service: String,
    pub login_failed: bool,
    pub reverse_dns: bool,
    pub time: i64,
}

/// Fields returned by agent registration.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    #[serde(rename = "agentid")]
    pub agent_id: String,
    pub key: String,
    pub iv: String,
    #[serde(rename = "orgid")]
    pub org_id: String,
    #[serde(rename = "groupid")]
    pub auth_group_id: String,
}

#[derive(Debug, Serialize)]
struct SealedRequest {
    agent_id: String,
    payload: String,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    client_type: &'a str,
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckAccessResponse {
    response: Verdict,
}

#[async_trait]
pub trait RiskClient: Send + Sync {
    /// Bootstrap call. Runs before any credentials exist, so it is neither
    /// sealed nor signed.
    async fn register(
        &self,
        email: &str,
        client_type: &str,
        payload: serde_json::Value,
    ) -> Result<Registration, AppError>;

    async fn check_access(
        &self,
        creds: &AgentCredentials,
        request: &AccessCheckRequest,
    ) -> Result<Verdict, AppError>;

    async fn send_event(
        &self,
        creds: &AgentCredentials,
        request: &AccessCheckRequest,
    ) -> Result<(), AppError>;
}

pub struct GuardianKeyClient {
    http: reqwest::Client,
    base_url: String,
}

impl GuardianKeyClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn sealed_post(
        &self,
        creds: &AgentCredentials,
        path: &str,
        request: &AccessCheckRequest,
    ) -> Result<reqwest::Response, AppError> {
        let plaintext = serde_json::to_vec(request)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;

        let body = serde_json::to_string(&SealedRequest {
            agent_id: creds.agent_id.clone(),
            payload: crypto::seal(creds, &plaintext)?,
        })
        .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;

        let timestamp = chrono::Utc::now().timestamp();
        let nonce = random_nonce();
        let signature = sign_request(&creds.key, "POST", path, timestamp, &nonce, &body)
            .map_err(AppError::InternalError)?;

        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Content-Type", "application/json")
            .header("X-Timestamp", timestamp.to_string())
            .header("X-Nonce", nonce)
            .header("X-Signature", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::RemoteService(anyhow::anyhow!("{} failed: {}", path, e)))?;

        if !response.status().is_success() {
            return Err(AppError::RemoteService(anyhow::anyhow!(
                "{} returned status {}",
                path,
                response.status()
            )));
        }

        Ok(response)
    }
}

fn random_nonce() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[async_trait]
impl RiskClient for GuardianKeyClient {
    async fn register(
        &self,
        email: &str,
        client_type: &str,
        payload: serde_json::Value,
    ) -> Result<Registration, AppError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, REGISTER_PATH))
            .json(&RegisterRequest {
                email,
                client_type,
                payload,
            })
            .send()
            .await
            .map_err(|e| AppError::RemoteService(anyhow::anyhow!("register failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::RemoteService(anyhow::anyhow!(
                "register returned status {}",
                response.status()
            )));
        }

        response
            .json::<Registration>()
            .await
            .map_err(|e| AppError::RemoteService(anyhow::anyhow!("malformed register response: {}", e)))
    }

    async fn check_access(
        &self,
        creds: &AgentCredentials,
        request: &AccessCheckRequest,
    ) -> Result<Verdict, AppError> {
        let response = self.sealed_post(creds, CHECK_ACCESS_PATH, request).await?;

        let decoded: CheckAccessResponse = response.json().await.map_err(|e| {
            AppError::RemoteService(anyhow::anyhow!("malformed checkaccess response: {}", e))
        })?;

        Ok(decoded.response)
    }

    async fn send_event(
        &self,
        creds: &AgentCredentials,
        request: &AccessCheckRequest,
    ) -> Result<(), AppError> {
        self.sealed_post(creds, SEND_EVENT_PATH, request).await?;
        Ok(())
    }
}

/// Scriptable client for tests: fixed verdict, optional failure, call
/// counters, and an optional registration delay to widen race windows.
pub struct MockRiskClient {
    verdict: Verdict,
    fail_remote: bool,
    register_delay: Duration,
    register_count: std::sync::atomic::AtomicU32,
    check_count: std::sync::atomic::AtomicU32,
    event_count: std::sync::atomic::AtomicU32,
}

impl Default for MockRiskClient {
    fn default() -> Self {
        Self {
            verdict: Verdict::Allow,
            fail_remote: false,
            register_delay: Duration::ZERO,
            register_count: std::sync::atomic::AtomicU32::new(0),
            check_count: std::sync::atomic::AtomicU32::new(0),
            event_count: std::sync::atomic::AtomicU32::new(0),
        }
    }
}

impl MockRiskClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verdict(verdict: Verdict) -> Self {
        Self {
            verdict,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_remote: true,
            ..Self::default()
        }
    }

    pub fn with_register_delay(delay: Duration) -> Self {
        Self {
            register_delay: delay,
            ..Self::default()
        }
    }

    pub fn register_count(&self) -> u32 {
        self.register_count.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn check_count(&self) -> u32 {
        self.check_count.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn event_count(&self) -> u32 {
        self.event_count.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl RiskClient for MockRiskClient {
    async fn register(
        &self,
        _email: &str,
        _client_type: &str,
        _payload: serde_json::Value,
    ) -> Result<Registration, AppError> {
        if self.register_delay > Duration::ZERO {
            tokio::time::sleep(self.register_delay).await;
        }

        self.register_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if self.fail_remote {
            return Err(AppError::RemoteService(anyhow::anyhow!("mock register failure")));
        }

        Ok(Registration {
            agent_id: "mock-agent".to_string(),
            key: crypto::generate_key_b64(),
            iv: crypto::generate_iv_b64(),
            org_id: "mock-org".to_string(),
            auth_group_id: "mock-group".to_string(),
        })
    }

    async fn check_access(
        &self,
        _creds: &AgentCredentials,
        _request: &AccessCheckRequest,
    ) -> Result<Verdict, AppError> {
        self.check_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if self.fail_remote {
            return Err(AppError::RemoteService(anyhow::anyhow!("mock checkaccess failure")));
        }

        Ok(self.verdict.clone())
    }

    async fn send_event(
        &self,
        _creds: &AgentCredentials,
        _request: &AccessCheckRequest,
    ) -> Result<(), AppError> {
        self.event_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if self.fail_remote {
            return Err(AppError::RemoteService(anyhow::anyhow!("mock sendevent failure")));
        }

        Ok(())
    }
}
