use guardian_agent::config::{
    Environment, FailPolicy, GuardianConfig, MongoConfig, NotifyConfig, RemoteConfig, SmtpConfig,
};
use guardian_agent::models::AgentCredentials;
use guardian_agent::services::{crypto, MemoryStore, MockMailer, MockRiskClient};
use guardian_agent::startup::Application;
use std::sync::Arc;

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<MockMailer>,
    pub client: Arc<MockRiskClient>,
}

pub fn test_config(active: bool, fail_policy: FailPolicy) -> GuardianConfig {
    GuardianConfig {
        common: agent_core::config::Config { port: 0 },
        environment: Environment::Dev,
        service_name: "guardian-agent-test".to_string(),
        log_level: "info".to_string(),
        remote: RemoteConfig {
            endpoint: "http://localhost:9".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            admin_email: "admin@example.com".to_string(),
            landing_url: "http://localhost:8080/".to_string(),
            active,
            fail_policy,
            reverse_dns: true,
            timeout_seconds: 1,
            sync_interval_seconds: 300,
        },
        mongodb: MongoConfig {
            uri: String::new(),
            database: String::new(),
            enabled: false,
        },
        smtp: SmtpConfig {
            host: "smtp.test.local".to_string(),
            port: 587,
            user: "test".to_string(),
            password: "test".to_string(),
            from_email: "test@example.com".to_string(),
            from_name: "Test Service".to_string(),
            enabled: false, // Use mock
        },
        notify: NotifyConfig {
            email_subject: "Security alert".to_string(),
            email_text: "From [IP] ([IP_REVERSE]) at [DATE] [TIME]".to_string(),
            email_html: "<p>From [IP] ([IP_REVERSE]) at [DATE] [TIME]</p>".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            time_format: "%H:%M:%S".to_string(),
            test_mode: false,
            support_addr: Some("support@example.com".to_string()),
        },
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(MockRiskClient::new(), test_config(false, FailPolicy::Open)).await
    }

    pub async fn spawn_with(client: MockRiskClient, config: GuardianConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(MockMailer::new());
        let client = Arc::new(client);

        let app = Application::build_with(config, store.clone(), mailer.clone(), client.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to come up.
        let http = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if http.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            store,
            mailer,
            client,
        }
    }

    /// Put registered credentials into the store, as if the sync task had
    /// already completed.
    pub async fn seed_credentials(&self) -> AgentCredentials {
        use guardian_agent::services::AgentStore;

        let creds = AgentCredentials {
            agent_id: "agent-1".to_string(),
            key: crypto::generate_key_b64(),
            iv: crypto::generate_iv_b64(),
            org_id: "org-1".to_string(),
            auth_group_id: "group-1".to_string(),
            service_name: "guardian-agent-test".to_string(),
            salt: "f0f0".to_string(),
            reverse_dns: true,
        };
        self.store
            .save_credentials(&creds)
            .await
            .expect("Failed to seed credentials");
        creds
    }
}
