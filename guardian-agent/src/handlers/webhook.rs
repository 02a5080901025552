use crate::models::ThreatEvent;
use crate::services::crypto;
use crate::startup::AppState;
use agent_core::error::AppError;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

/// Sealed event delivery from the risk service. The HMAC signature on the
/// request has already been verified by the middleware.
#[derive(Debug, Deserialize)]
pub struct WebhookDelivery {
    pub agent_id: String,
    pub payload: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

#[tracing::instrument(skip(state, delivery))]
pub async fn receive_event(
    State(state): State<AppState>,
    Json(delivery): Json<WebhookDelivery>,
) -> Result<(StatusCode, Json<WebhookResponse>), AppError> {
    let creds = state
        .store
        .load_credentials()
        .await?
        .filter(|c| c.is_registered())
        .ok_or(AppError::NotRegistered)?;

    if delivery.agent_id != creds.agent_id {
        return Err(AppError::AuthError(anyhow::anyhow!(
            "Delivery addressed to a different agent"
        )));
    }

    let plaintext = crypto::open(&creds, &delivery.payload)?;
    let event: ThreatEvent = serde_json::from_slice(&plaintext)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed event payload: {}", e)))?;

    let status = match state.events.process_event(&event).await {
        Ok(_) => "processed",
        // Events for hashes this deployment has never seen are dropped.
        Err(AppError::UnknownUserHash(_)) => "ignored",
        Err(e) => return Err(e),
    };

    Ok((StatusCode::OK, Json(WebhookResponse { status })))
}
