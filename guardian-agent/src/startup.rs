//! Application startup and lifecycle management.

use crate::config::GuardianConfig;
use crate::handlers;
use crate::hook::LoginGuard;
use crate::services::{
    AgentStore, EventProcessor, GuardianKeyClient, Mailer, MemoryStore, MockMailer, MongoStore,
    RiskClient, SmtpMailer,
};
use agent_core::error::AppError;
use agent_core::middleware::signature::{
    webhook_signature_middleware, SignatureConfig, WebhookAuth,
};
use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: GuardianConfig,
    pub store: Arc<dyn AgentStore>,
    pub mailer: Arc<dyn Mailer>,
    pub guard: Arc<LoginGuard>,
    pub events: Arc<EventProcessor>,
    signature: SignatureConfig,
    nonces: Arc<DashMap<String, i64>>,
}

impl AsRef<SignatureConfig> for AppState {
    fn as_ref(&self) -> &SignatureConfig {
        &self.signature
    }
}

#[async_trait]
impl WebhookAuth for AppState {
    async fn signing_key(&self) -> Result<Option<String>, AppError> {
        Ok(self
            .store
            .load_credentials()
            .await?
            .filter(|c| c.is_registered())
            .map(|c| c.key))
    }

    async fn register_nonce(&self, nonce: &str, timestamp: i64) -> Result<bool, AppError> {
        let window = self.signature.timestamp_window_secs;
        let now = chrono::Utc::now().timestamp();
        self.nonces.retain(|_, seen| now - *seen <= 2 * window);
        Ok(self.nonces.insert(nonce.to_string(), timestamp).is_none())
    }
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": state.config.service_name,
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": state.config.service_name,
                "error": e.to_string()
            })),
        ),
    }
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration, selecting
    /// providers from it.
    pub async fn build(config: GuardianConfig) -> Result<Self, AppError> {
        let store: Arc<dyn AgentStore> = if config.mongodb.enabled {
            let store = MongoStore::connect(&config.mongodb.uri, &config.mongodb.database)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to MongoDB: {}", e);
                    e
                })?;
            store.initialize_indexes().await?;
            Arc::new(store)
        } else {
            tracing::warn!("MongoDB disabled, agent state is held in memory only");
            Arc::new(MemoryStore::new())
        };

        let mailer: Arc<dyn Mailer> = if config.smtp.enabled {
            match SmtpMailer::new(config.smtp.clone()) {
                Ok(mailer) => {
                    tracing::info!("SMTP mailer initialized");
                    Arc::new(mailer)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP mailer: {}. Using mock.", e);
                    Arc::new(MockMailer::new())
                }
            }
        } else {
            tracing::info!("SMTP disabled, using mock mailer");
            Arc::new(MockMailer::new())
        };

        let client: Arc<dyn RiskClient> = Arc::new(GuardianKeyClient::new(
            &config.remote.endpoint,
            Duration::from_secs(config.remote.timeout_seconds),
        )?);

        Self::build_with(config, store, mailer, client).await
    }

    /// Build with explicit providers. Used by tests to inject mocks.
    pub async fn build_with(
        config: GuardianConfig,
        store: Arc<dyn AgentStore>,
        mailer: Arc<dyn Mailer>,
        client: Arc<dyn RiskClient>,
    ) -> Result<Self, AppError> {
        let guard = Arc::new(LoginGuard::new(
            config.clone(),
            store.clone(),
            client.clone(),
        ));
        let events = Arc::new(EventProcessor::new(
            store.clone(),
            mailer.clone(),
            config.notify.clone(),
        ));

        let state = AppState {
            config: config.clone(),
            store,
            mailer,
            guard,
            events,
            signature: SignatureConfig::default(),
            nonces: Arc::new(DashMap::new()),
        };

        // Port 0 binds a random port for testing.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("guardian-agent listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn guard(&self) -> Arc<LoginGuard> {
        self.state.guard.clone()
    }

    pub fn router(state: AppState) -> Router {
        let webhook_routes = Router::new()
            .route("/guardiankey/webhook", post(handlers::receive_event))
            .layer(from_fn_with_state(
                state.clone(),
                webhook_signature_middleware::<AppState>,
            ));

        Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/hooks/login", post(handlers::login_hook))
            .merge(webhook_routes)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Self::router(self.state.clone());
        axum::serve(self.listener, router).await
    }
}
