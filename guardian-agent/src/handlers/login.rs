use crate::hook::{Decision, LoginEvent};
use crate::startup::AppState;
use agent_core::error::AppError;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct LoginHookResponse {
    pub decision: &'static str,
    pub force_logout: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

/// Post-authentication hook for the host adapter.
///
/// A `block` response means the host must terminate the session and follow
/// the redirect without asking the user for confirmation.
#[tracing::instrument(skip(state, request), fields(username = %request.username))]
pub async fn login_hook(
    State(state): State<AppState>,
    Json(request): Json<LoginEvent>,
) -> Result<(StatusCode, Json<LoginHookResponse>), AppError> {
    request.validate()?;

    let decision = state.guard.on_authenticated(&request).await?;

    let response = match decision {
        Decision::Allow => LoginHookResponse {
            decision: "allow",
            force_logout: false,
            redirect: None,
        },
        Decision::Block { redirect } => LoginHookResponse {
            decision: "block",
            force_logout: true,
            redirect: Some(redirect),
        },
    };

    Ok((StatusCode::OK, Json(response)))
}
