//! SeaORM-backed user lookups and updates.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::*;
use uuid::Uuid;

use crate::db::{Database, UserStore};
use crate::entity::user;
use crate::error::{AppError, AppResult};
use crate::models::User;

fn model_to_user(m: user::Model) -> User {
    User {
        id: m.id,
        login: m.login,
        name: m.name,
        email: m.email,
        active: m.active,
        local: m.is_local,
        external_identity_provider: m.external_identity_provider,
        external_id: m.external_id,
        external_login: m.external_login,
        hash_method: m.hash_method,
        crypted_password: m.crypted_password,
        salt: m.salt,
        reset_password: m.reset_password,
        created_at: m.created_at,
        last_login_at: m.last_login_at,
    }
}

fn user_to_active_model(u: &User) -> user::ActiveModel {
    user::ActiveModel {
        id: Set(u.id),
        login: Set(u.login.clone()),
        name: Set(u.name.clone()),
        email: Set(u.email.clone()),
        active: Set(u.active),
        is_local: Set(u.local),
        external_identity_provider: Set(u.external_identity_provider.clone()),
        external_id: Set(u.external_id.clone()),
        external_login: Set(u.external_login.clone()),
        hash_method: Set(u.hash_method.clone()),
        crypted_password: Set(u.crypted_password.clone()),
        salt: Set(u.salt.clone()),
        reset_password: Set(u.reset_password),
        created_at: Set(u.created_at),
        last_login_at: Set(u.last_login_at),
    }
}

#[async_trait]
impl UserStore for Database {
    async fn find_by_login(&self, login: &str) -> AppResult<Option<User>> {
        let result = user::Entity::find()
            .filter(user::Column::Login.eq(login))
            .one(self.connection())
            .await?;
        Ok(result.map(model_to_user))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let result = user::Entity::find_by_id(id).one(self.connection()).await?;
        Ok(result.map(model_to_user))
    }

    async fn find_by_external_id_and_provider(
        &self,
        external_id: &str,
        provider: &str,
    ) -> AppResult<Option<User>> {
        let result = user::Entity::find()
            .filter(user::Column::ExternalId.eq(external_id))
            .filter(user::Column::ExternalIdentityProvider.eq(provider))
            .one(self.connection())
            .await?;
        Ok(result.map(model_to_user))
    }

    async fn find_by_external_login_and_provider(
        &self,
        external_login: &str,
        provider: &str,
    ) -> AppResult<Option<User>> {
        let result = user::Entity::find()
            .filter(user::Column::ExternalLogin.eq(external_login))
            .filter(user::Column::ExternalIdentityProvider.eq(provider))
            .one(self.connection())
            .await?;
        Ok(result.map(model_to_user))
    }

    async fn find_active_by_email(&self, email: &str) -> AppResult<Vec<User>> {
        let result = user::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(user::Column::Email)))
                    .eq(email.to_lowercase()),
            )
            .filter(user::Column::Active.eq(true))
            .all(self.connection())
            .await?;
        Ok(result.into_iter().map(model_to_user).collect())
    }

    async fn insert_user(&self, u: User) -> AppResult<User> {
        user::Entity::insert(user_to_active_model(&u))
            .exec(self.connection())
            .await?;

        let inserted = user::Entity::find_by_id(u.id)
            .one(self.connection())
            .await?
            .ok_or_else(|| AppError::Database("Failed to fetch newly inserted user".to_string()))?;

        Ok(model_to_user(inserted))
    }

    async fn update_user(&self, u: &User) -> AppResult<()> {
        user_to_active_model(u).update(self.connection()).await?;
        Ok(())
    }

    async fn touch_last_login(&self, id: Uuid) -> AppResult<()> {
        user::Entity::update_many()
            .filter(user::Column::Id.eq(id))
            .col_expr(user::Column::LastLoginAt, Expr::value(Some(Utc::now())))
            .exec(self.connection())
            .await?;
        Ok(())
    }
}
