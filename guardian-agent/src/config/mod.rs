use agent_core::config as core_config;
use agent_core::error::AppError;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct GuardianConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub remote: RemoteConfig,
    pub mongodb: MongoConfig,
    pub smtp: SmtpConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

/// How a login decision resolves when the risk service cannot be reached.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FailPolicy {
    /// Let the login proceed.
    Open,
    /// Treat the login as blocked.
    Closed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub public_base_url: String,
    pub admin_email: String,
    pub landing_url: String,
    pub active: bool,
    pub fail_policy: FailPolicy,
    pub reverse_dns: bool,
    pub timeout_seconds: u64,
    pub sync_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    pub email_subject: String,
    pub email_text: String,
    pub email_html: String,
    pub date_format: String,
    pub time_format: String,
    pub test_mode: bool,
    pub support_addr: Option<String>,
}

const DEFAULT_EMAIL_TEXT: &str = "A suspicious access to your account was detected.\n\n\
Address: [IP] ([IP_REVERSE])\nLocation: [CITY]\nBrowser: [USER_AGENT]\n\
System: [SYSTEM]\nWhen: [DATE] [TIME]\n\n\
If this was not you, please change your password.";

const DEFAULT_EMAIL_HTML: &str = "<p>A suspicious access to your account was detected.</p>\
<ul><li>Address: [IP] ([IP_REVERSE])</li><li>Location: [CITY]</li>\
<li>Browser: [USER_AGENT]</li><li>System: [SYSTEM]</li>\
<li>When: [DATE] [TIME]</li></ul>\
<p>If this was not you, please change your password.</p>";

impl GuardianConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let public_base_url = get_env("PUBLIC_BASE_URL", Some("http://localhost:8080"), is_prod)?;
        let landing_url = get_env("LANDING_URL", Some(&format!("{}/", public_base_url)), is_prod)?;

        let config = GuardianConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("guardian-agent"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            remote: RemoteConfig {
                endpoint: get_env(
                    "GUARDIANKEY_ENDPOINT",
                    Some("https://api.guardiankey.io"),
                    is_prod,
                )?,
                public_base_url,
                admin_email: get_env("ADMIN_EMAIL", Some("admin@localhost"), is_prod)?,
                landing_url,
                active: get_env("ACTIVE_MODE", Some("false"), is_prod)?
                    .parse()
                    .unwrap_or(false),
                fail_policy: get_env(
                    "FAIL_POLICY",
                    Some(if is_prod { "closed" } else { "open" }),
                    is_prod,
                )?
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                reverse_dns: get_env("REVERSE_DNS", Some("true"), is_prod)?
                    .parse()
                    .unwrap_or(true),
                timeout_seconds: get_env("REMOTE_TIMEOUT_SECONDS", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
                sync_interval_seconds: get_env("SYNC_INTERVAL_SECONDS", Some("300"), is_prod)?
                    .parse()
                    .unwrap_or(300),
            },
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("guardian_agent"), is_prod)?,
                enabled: env::var("MONGODB_ENABLED")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .unwrap_or(true),
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: get_env("SMTP_PORT", Some("587"), is_prod)?
                    .parse()
                    .unwrap_or(587),
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_email: get_env("SMTP_FROM_EMAIL", Some("noreply@example.com"), is_prod)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Account Security"), is_prod)?,
                enabled: env::var("SMTP_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
            },
            notify: NotifyConfig {
                email_subject: get_env(
                    "EMAIL_SUBJECT",
                    Some("Security alert for your account"),
                    is_prod,
                )?,
                email_text: get_env("EMAIL_TEXT", Some(DEFAULT_EMAIL_TEXT), is_prod)?,
                email_html: get_env("EMAIL_HTML", Some(DEFAULT_EMAIL_HTML), is_prod)?,
                date_format: get_env("DATE_FORMAT", Some("%Y-%m-%d"), is_prod)?,
                time_format: get_env("TIME_FORMAT", Some("%H:%M:%S"), is_prod)?,
                test_mode: get_env("TEST_MODE", Some("false"), is_prod)?
                    .parse()
                    .unwrap_or(false),
                support_addr: env::var("SUPPORT_ADDR").ok().filter(|s| !s.trim().is_empty()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 && self.environment == Environment::Prod {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.remote.timeout_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REMOTE_TIMEOUT_SECONDS must be positive"
            )));
        }

        if self.remote.sync_interval_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SYNC_INTERVAL_SECONDS must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.remote.public_base_url.starts_with("http://localhost") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "PUBLIC_BASE_URL must be set to a reachable address in production"
                )));
            }

            if self.remote.active && self.remote.fail_policy == FailPolicy::Open {
                tracing::warn!(
                    "Active blocking with FAIL_POLICY=open: logins proceed when the risk service is unreachable"
                );
            }
        }

        Ok(())
    }

    /// The callback URL handed to the risk service at registration time.
    pub fn webhook_url(&self) -> String {
        format!(
            "{}/guardiankey/webhook",
            self.remote.public_base_url.trim_end_matches('/')
        )
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for FailPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(FailPolicy::Open),
            "closed" => Ok(FailPolicy::Closed),
            _ => Err(format!("Invalid fail policy: {}", s)),
        }
    }
}
