//! SeaORM-backed session token rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::*;
use uuid::Uuid;

use crate::db::{Database, SessionStore, SessionToken};
use crate::entity::session_token;
use crate::error::AppResult;

#[async_trait]
impl SessionStore for Database {
    async fn insert_session(&self, token: SessionToken) -> AppResult<()> {
        session_token::Entity::insert(session_token::ActiveModel {
            id: Set(token.id),
            user_id: Set(token.user_id),
            expires_at: Set(token.expires_at),
            created_at: Set(token.created_at),
        })
        .exec(self.connection())
        .await?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> AppResult<Option<SessionToken>> {
        let result = session_token::Entity::find_by_id(id)
            .one(self.connection())
            .await?;
        Ok(result.map(|m| SessionToken {
            id: m.id,
            user_id: m.user_id,
            expires_at: m.expires_at,
            created_at: m.created_at,
        }))
    }

    async fn update_session_expiration(
        &self,
        id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        session_token::Entity::update_many()
            .filter(session_token::Column::Id.eq(id))
            .col_expr(
                session_token::Column::ExpiresAt,
                sea_orm::prelude::Expr::value(expires_at),
            )
            .exec(self.connection())
            .await?;
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> AppResult<()> {
        session_token::Entity::delete_by_id(id)
            .exec(self.connection())
            .await?;
        Ok(())
    }

    async fn delete_sessions_expired_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = session_token::Entity::delete_many()
            .filter(session_token::Column::ExpiresAt.lt(cutoff))
            .exec(self.connection())
            .await?;
        Ok(result.rows_affected)
    }
}
