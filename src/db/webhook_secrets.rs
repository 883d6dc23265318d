//! SeaORM-backed webhook secret lookups.

use async_trait::async_trait;
use sea_orm::*;
use secrecy::SecretString;

use crate::db::{Database, WebhookSecretStore};
use crate::entity::webhook_secret;
use crate::error::AppResult;

#[async_trait]
impl WebhookSecretStore for Database {
    async fn webhook_secret(&self, app_id: &str) -> AppResult<Option<SecretString>> {
        let result = webhook_secret::Entity::find_by_id(app_id.to_string())
            .one(self.connection())
            .await?;
        Ok(result.map(|m| SecretString::from(m.secret)))
    }
}
