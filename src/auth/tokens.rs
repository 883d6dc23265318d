//! Bearer user tokens.
//!
//! Opaque `vrd_`-prefixed tokens; storage only ever sees the SHA-256 hash.
//! Presented either as `Authorization: Bearer <token>` or as the login slot
//! of a Basic header with an empty password.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

use crate::auth::{AuthError, Method, Source};
use crate::db::{Store, UserStore, UserToken, UserTokenStore};
use crate::error::AppResult;
use crate::models::User;

/// Token prefix; lets support staff recognize leaked values.
const TOKEN_PREFIX: &str = "vrd_";
/// Length of the random part of the token, in bytes.
const TOKEN_RANDOM_LENGTH: usize = 20;

/// Generate a new random token string. Shown to the user once.
pub fn generate_token() -> String {
    format!(
        "{}{}",
        TOKEN_PREFIX,
        hex::encode(rand::random::<[u8; TOKEN_RANDOM_LENGTH]>())
    )
}

/// Hash a token for storage and lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolves presented tokens to their owning users.
pub struct UserTokenAuthenticator {
    store: Arc<dyn Store>,
}

impl UserTokenAuthenticator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create and persist a token for a user; returns the raw value.
    pub async fn create_token(
        &self,
        user: &User,
        name: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<String> {
        let raw = generate_token();
        self.store
            .insert_token(UserToken {
                token_hash: hash_token(&raw),
                user_id: user.id,
                name: name.to_string(),
                expires_at,
                last_used_at: None,
                created_at: Utc::now(),
            })
            .await?;
        Ok(raw)
    }

    /// Authenticate a presented token.
    ///
    /// Only called once a token was actually supplied, so every failure here
    /// is a rejection, not a pass.
    pub async fn authenticate(&self, token: &str, method: Method) -> AppResult<User> {
        let source = Source::local(method);
        let token_hash = hash_token(token);

        let row = self
            .store
            .find_token_by_hash(&token_hash)
            .await?
            .ok_or_else(|| AuthError::new(source.clone(), "Token doesn't exist"))?;

        if row.is_expired(Utc::now()) {
            return Err(AuthError::new(source.clone(), "Token has expired")
                .with_login(row.name.clone())
                .into());
        }

        let user = self
            .store
            .find_by_id(row.user_id)
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| {
                AuthError::new(source.clone(), "Token matches no active user")
                    .with_login(row.name.clone())
            })?;

        // Fire and forget; a failed timestamp update must not fail the request.
        if let Err(e) = self.store.touch_token_last_used(&token_hash).await {
            warn!("Failed to update token last-used timestamp: {}", e);
        }

        Ok(user)
    }
}
