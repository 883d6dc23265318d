//! In-memory store backend.
//!
//! Backs the test suites and standalone development runs; behaves like the
//! SeaORM backend for every narrow operation the core performs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

use crate::db::{
    GroupStore, SessionStore, SessionToken, UserStore, UserToken, UserTokenStore,
    WebhookSecretStore,
};
use crate::error::AppResult;
use crate::models::User;

#[derive(Debug, Default)]
struct GroupEntry {
    is_default: bool,
    members: HashSet<Uuid>,
}

/// Hash-map backed store; all guards are short-lived, no await while locked.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    groups: RwLock<HashMap<String, GroupEntry>>,
    sessions: RwLock<HashMap<Uuid, SessionToken>>,
    tokens: RwLock<HashMap<String, UserToken>>,
    webhook_secrets: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a group; `is_default` marks the group every new user joins.
    pub fn add_group(&self, name: &str, is_default: bool) {
        self.groups.write().unwrap().insert(
            name.to_string(),
            GroupEntry {
                is_default,
                members: HashSet::new(),
            },
        );
    }

    /// Provision the HMAC secret for a webhook app id.
    pub fn set_webhook_secret(&self, app_id: &str, secret: &str) {
        self.webhook_secrets
            .write()
            .unwrap()
            .insert(app_id.to_string(), secret.to_string());
    }

    /// Number of live session rows (test visibility).
    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Number of user rows (test visibility).
    pub fn user_count(&self) -> usize {
        self.users.read().unwrap().len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_login(&self, login: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .unwrap()
            .values()
            .find(|u| u.login == login)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().unwrap().get(&id).cloned())
    }

    async fn find_by_external_id_and_provider(
        &self,
        external_id: &str,
        provider: &str,
    ) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .unwrap()
            .values()
            .find(|u| {
                u.external_id.as_deref() == Some(external_id)
                    && u.external_identity_provider.as_deref() == Some(provider)
            })
            .cloned())
    }

    async fn find_by_external_login_and_provider(
        &self,
        external_login: &str,
        provider: &str,
    ) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .unwrap()
            .values()
            .find(|u| {
                u.external_login.as_deref() == Some(external_login)
                    && u.external_identity_provider.as_deref() == Some(provider)
            })
            .cloned())
    }

    async fn find_active_by_email(&self, email: &str) -> AppResult<Vec<User>> {
        let needle = email.to_lowercase();
        Ok(self
            .users
            .read()
            .unwrap()
            .values()
            .filter(|u| {
                u.active
                    && u.email
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase() == needle)
            })
            .cloned()
            .collect())
    }

    async fn insert_user(&self, user: User) -> AppResult<User> {
        self.users.write().unwrap().insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> AppResult<()> {
        self.users.write().unwrap().insert(user.id, user.clone());
        Ok(())
    }

    async fn touch_last_login(&self, id: Uuid) -> AppResult<()> {
        if let Some(user) = self.users.write().unwrap().get_mut(&id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn default_group_name(&self) -> AppResult<Option<String>> {
        Ok(self
            .groups
            .read()
            .unwrap()
            .iter()
            .find(|(_, entry)| entry.is_default)
            .map(|(name, _)| name.clone()))
    }

    async fn group_exists(&self, name: &str) -> AppResult<bool> {
        Ok(self.groups.read().unwrap().contains_key(name))
    }

    async fn group_names_of_user(&self, user_id: Uuid) -> AppResult<BTreeSet<String>> {
        Ok(self
            .groups
            .read()
            .unwrap()
            .iter()
            .filter(|(_, entry)| entry.members.contains(&user_id))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn add_member(&self, group_name: &str, user_id: Uuid) -> AppResult<()> {
        if let Some(entry) = self.groups.write().unwrap().get_mut(group_name) {
            entry.members.insert(user_id);
        }
        Ok(())
    }

    async fn remove_member(&self, group_name: &str, user_id: Uuid) -> AppResult<()> {
        if let Some(entry) = self.groups.write().unwrap().get_mut(group_name) {
            entry.members.remove(&user_id);
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, token: SessionToken) -> AppResult<()> {
        self.sessions.write().unwrap().insert(token.id, token);
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> AppResult<Option<SessionToken>> {
        Ok(self.sessions.read().unwrap().get(&id).cloned())
    }

    async fn update_session_expiration(
        &self,
        id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(token) = self.sessions.write().unwrap().get_mut(&id) {
            token.expires_at = expires_at;
        }
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> AppResult<()> {
        self.sessions.write().unwrap().remove(&id);
        Ok(())
    }

    async fn delete_sessions_expired_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut sessions = self.sessions.write().unwrap();
        let before = sessions.len();
        sessions.retain(|_, token| token.expires_at >= cutoff);
        Ok((before - sessions.len()) as u64)
    }
}

#[async_trait]
impl UserTokenStore for MemoryStore {
    async fn insert_token(&self, token: UserToken) -> AppResult<()> {
        self.tokens
            .write()
            .unwrap()
            .insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn find_token_by_hash(&self, token_hash: &str) -> AppResult<Option<UserToken>> {
        Ok(self.tokens.read().unwrap().get(token_hash).cloned())
    }

    async fn touch_token_last_used(&self, token_hash: &str) -> AppResult<()> {
        if let Some(token) = self.tokens.write().unwrap().get_mut(token_hash) {
            token.last_used_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookSecretStore for MemoryStore {
    async fn webhook_secret(&self, app_id: &str) -> AppResult<Option<SecretString>> {
        Ok(self
            .webhook_secrets
            .read()
            .unwrap()
            .get(app_id)
            .map(|s| SecretString::from(s.clone())))
    }
}
