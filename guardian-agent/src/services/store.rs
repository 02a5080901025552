use crate::models::{AgentCredentials, UserHashLink};
use agent_core::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use mongodb::{
    bson::doc,
    options::{IndexOptions, ReplaceOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Persistence for the agent: the registered credentials document and the
/// user-hash table that routes inbound events back to local accounts.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn load_credentials(&self) -> Result<Option<AgentCredentials>, AppError>;

    /// Replace the credentials document in a single write, so the fields
    /// returned by registration are either all visible or not at all.
    async fn save_credentials(&self, creds: &AgentCredentials) -> Result<(), AppError>;

    async fn upsert_user_link(&self, link: &UserHashLink) -> Result<(), AppError>;

    async fn find_user_by_hash(&self, user_hash: &str) -> Result<Option<UserHashLink>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Singleton identity document. One agent per deployment.
#[derive(Debug, Serialize, Deserialize)]
struct CredentialsDoc {
    #[serde(rename = "_id")]
    id: String,
    #[serde(flatten)]
    creds: AgentCredentials,
}

const CREDENTIALS_DOC_ID: &str = "agent";

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(uri = %uri, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB at {}: {}", uri, e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        let user_hash_index = IndexModel::builder()
            .keys(doc! { "user_hash": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_hash_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.user_links()
            .create_index(user_hash_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create user_hash index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        Ok(())
    }

    fn credentials(&self) -> Collection<CredentialsDoc> {
        self.db.collection("agent_credentials")
    }

    fn user_links(&self) -> Collection<UserHashLink> {
        self.db.collection("user_hashes")
    }
}

#[async_trait]
impl AgentStore for MongoStore {
    async fn load_credentials(&self) -> Result<Option<AgentCredentials>, AppError> {
        let found = self
            .credentials()
            .find_one(doc! { "_id": CREDENTIALS_DOC_ID }, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to load agent credentials: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(found.map(|d| d.creds))
    }

    async fn save_credentials(&self, creds: &AgentCredentials) -> Result<(), AppError> {
        let document = CredentialsDoc {
            id: CREDENTIALS_DOC_ID.to_string(),
            creds: creds.clone(),
        };

        self.credentials()
            .replace_one(
                doc! { "_id": CREDENTIALS_DOC_ID },
                &document,
                ReplaceOptions::builder().upsert(true).build(),
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to save agent credentials: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(())
    }

    async fn upsert_user_link(&self, link: &UserHashLink) -> Result<(), AppError> {
        self.user_links()
            .replace_one(
                doc! { "user_hash": &link.user_hash },
                link,
                ReplaceOptions::builder().upsert(true).build(),
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to upsert user hash link: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(())
    }

    async fn find_user_by_hash(&self, user_hash: &str) -> Result<Option<UserHashLink>, AppError> {
        self.user_links()
            .find_one(doc! { "user_hash": user_hash }, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to look up user hash: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(())
    }
}

/// In-memory store for tests and store-less deployments.
#[derive(Default)]
pub struct MemoryStore {
    credentials: RwLock<Option<AgentCredentials>>,
    user_links: DashMap<String, UserHashLink>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn load_credentials(&self) -> Result<Option<AgentCredentials>, AppError> {
        Ok(self.credentials.read().await.clone())
    }

    async fn save_credentials(&self, creds: &AgentCredentials) -> Result<(), AppError> {
        *self.credentials.write().await = Some(creds.clone());
        Ok(())
    }

    async fn upsert_user_link(&self, link: &UserHashLink) -> Result<(), AppError> {
        self.user_links
            .insert(link.user_hash.clone(), link.clone());
        Ok(())
    }

    async fn find_user_by_hash(&self, user_hash: &str) -> Result<Option<UserHashLink>, AppError> {
        Ok(self.user_links.get(user_hash).map(|e| e.value().clone()))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
