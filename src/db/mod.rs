//! Persistence seam for the authentication core.
//!
//! The core never sees SQL: it talks to the narrow store traits below, which
//! cover exactly the point lookups and updates authentication needs. The
//! SeaORM-backed [`Database`] is the production backend; [`memory::MemoryStore`]
//! backs tests and standalone runs.

pub mod groups;
pub mod memory;
pub mod session_tokens;
pub mod user_tokens;
pub mod users;
pub mod webhook_secrets;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{Database as SeaDatabase, DatabaseConnection};
use secrecy::SecretString;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::User;

/// A server-side session record; the signed cookie references it by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A bearer token row; the raw token never touches storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserToken {
    pub token_hash: String,
    pub user_id: Uuid,
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// User lookups and the narrow mutations registration performs.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_login(&self, login: &str) -> AppResult<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_by_external_id_and_provider(
        &self,
        external_id: &str,
        provider: &str,
    ) -> AppResult<Option<User>>;
    async fn find_by_external_login_and_provider(
        &self,
        external_login: &str,
        provider: &str,
    ) -> AppResult<Option<User>>;
    /// Active users with this email, compared case-insensitively.
    async fn find_active_by_email(&self, email: &str) -> AppResult<Vec<User>>;
    async fn insert_user(&self, user: User) -> AppResult<User>;
    async fn update_user(&self, user: &User) -> AppResult<()>;
    async fn touch_last_login(&self, id: Uuid) -> AppResult<()>;
}

/// Group membership, addressed by group name.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn default_group_name(&self) -> AppResult<Option<String>>;
    async fn group_exists(&self, name: &str) -> AppResult<bool>;
    async fn group_names_of_user(&self, user_id: Uuid) -> AppResult<BTreeSet<String>>;
    async fn add_member(&self, group_name: &str, user_id: Uuid) -> AppResult<()>;
    async fn remove_member(&self, group_name: &str, user_id: Uuid) -> AppResult<()>;
}

/// Session token rows: one per live browser session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, token: SessionToken) -> AppResult<()>;
    async fn find_session(&self, id: Uuid) -> AppResult<Option<SessionToken>>;
    async fn update_session_expiration(
        &self,
        id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()>;
    async fn delete_session(&self, id: Uuid) -> AppResult<()>;
    /// Sweep rows whose expiration lies before the cutoff. Returns the count.
    async fn delete_sessions_expired_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

/// Bearer token rows, looked up by hash only.
#[async_trait]
pub trait UserTokenStore: Send + Sync {
    async fn insert_token(&self, token: UserToken) -> AppResult<()>;
    async fn find_token_by_hash(&self, token_hash: &str) -> AppResult<Option<UserToken>>;
    async fn touch_token_last_used(&self, token_hash: &str) -> AppResult<()>;
}

/// HMAC secrets for provisioned webhook apps.
#[async_trait]
pub trait WebhookSecretStore: Send + Sync {
    async fn webhook_secret(&self, app_id: &str) -> AppResult<Option<SecretString>>;
}

/// Everything the authentication core needs from persistence.
pub trait Store:
    UserStore + GroupStore + SessionStore + UserTokenStore + WebhookSecretStore
{
}

impl<T> Store for T where
    T: UserStore + GroupStore + SessionStore + UserTokenStore + WebhookSecretStore
{
}

/// SeaORM-backed store over the platform's PostgreSQL database.
#[derive(Clone)]
pub struct Database {
    conn: DatabaseConnection,
}

impl Database {
    /// Connect using the configured database URL.
    pub async fn connect(config: &Config) -> AppResult<Self> {
        let conn = SeaDatabase::connect(&config.database_url)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;
        Ok(Self { conn })
    }

    /// Access the underlying connection for queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }
}
