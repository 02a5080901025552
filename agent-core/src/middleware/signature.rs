use crate::error::AppError;
use crate::utils::signature::verify_request;
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;

/// How far an inbound timestamp may drift from local time, in seconds.
pub const DEFAULT_TIMESTAMP_WINDOW: i64 = 300;

#[derive(Clone, Debug)]
pub struct SignatureConfig {
    pub timestamp_window_secs: i64,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            timestamp_window_secs: DEFAULT_TIMESTAMP_WINDOW,
        }
    }
}

/// Key and replay state needed to authenticate an inbound webhook delivery.
#[async_trait]
pub trait WebhookAuth: Send + Sync {
    /// The agent key used to verify signatures, if the agent is registered.
    async fn signing_key(&self) -> Result<Option<String>, AppError>;

    /// Record the nonce; returns false if it was already seen inside the
    /// timestamp window.
    async fn register_nonce(&self, nonce: &str, timestamp: i64) -> Result<bool, AppError>;
}

pub async fn webhook_signature_middleware<S>(
    State(state): State<S>,
    req: Request,
    next: Next,
) -> Result<Response, AppError>
where
    S: AsRef<SignatureConfig> + WebhookAuth + Clone + Send + Sync + 'static,
{
    let config = state.as_ref();

    let (timestamp_str, nonce, signature) = extract_auth_data(req.headers())?;

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| AppError::AuthError(anyhow::anyhow!("Invalid timestamp format")))?;

    let now = chrono::Utc::now().timestamp();
    if (now - timestamp).abs() > config.timestamp_window_secs {
        return Err(AppError::AuthError(anyhow::anyhow!(
            "Request timestamp expired"
        )));
    }

    if !state.register_nonce(&nonce, timestamp).await? {
        return Err(AppError::AuthError(anyhow::anyhow!(
            "Replay detected (nonce used)"
        )));
    }

    let key = state.signing_key().await?.ok_or(AppError::NotRegistered)?;

    let (parts, body) = req.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to read body: {}", e)))?
        .to_bytes();

    let body_str = std::str::from_utf8(&bytes).unwrap_or("");

    let method = parts.method.as_str();
    let path = parts.uri.path();

    let is_valid = verify_request(&key, method, path, timestamp, &nonce, body_str, &signature)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Signature verification error: {}", e)))?;

    if !is_valid {
        return Err(AppError::AuthError(anyhow::anyhow!("Invalid signature")));
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(req).await)
}

fn extract_auth_data(headers: &HeaderMap) -> Result<(String, String, String), AppError> {
    let timestamp = get_header(headers, "X-Timestamp")?;
    let nonce = get_header(headers, "X-Nonce")?;
    let signature = get_header(headers, "X-Signature")?;
    Ok((timestamp, nonce, signature))
}

fn get_header(headers: &HeaderMap, key: &str) -> Result<String, AppError> {
    headers
        .get(key)
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Missing header: {}", key)))?
        .to_str()
        .map(|s| s.to_string())
        .map_err(|_| AppError::AuthError(anyhow::anyhow!("Invalid header format: {}", key)))
}
