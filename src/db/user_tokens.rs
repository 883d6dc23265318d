//! SeaORM-backed user token rows.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;

use crate::db::{Database, UserToken, UserTokenStore};
use crate::entity::user_token;
use crate::error::AppResult;

#[async_trait]
impl UserTokenStore for Database {
    async fn insert_token(&self, token: UserToken) -> AppResult<()> {
        user_token::Entity::insert(user_token::ActiveModel {
            token_hash: Set(token.token_hash),
            user_id: Set(token.user_id),
            name: Set(token.name),
            expires_at: Set(token.expires_at),
            last_used_at: Set(token.last_used_at),
            created_at: Set(token.created_at),
        })
        .exec(self.connection())
        .await?;
        Ok(())
    }

    async fn find_token_by_hash(&self, token_hash: &str) -> AppResult<Option<UserToken>> {
        let result = user_token::Entity::find_by_id(token_hash.to_string())
            .one(self.connection())
            .await?;
        Ok(result.map(|m| UserToken {
            token_hash: m.token_hash,
            user_id: m.user_id,
            name: m.name,
            expires_at: m.expires_at,
            last_used_at: m.last_used_at,
            created_at: m.created_at,
        }))
    }

    async fn touch_token_last_used(&self, token_hash: &str) -> AppResult<()> {
        user_token::Entity::update_many()
            .filter(user_token::Column::TokenHash.eq(token_hash))
            .col_expr(
                user_token::Column::LastUsedAt,
                Expr::value(Some(Utc::now())),
            )
            .exec(self.connection())
            .await?;
        Ok(())
    }
}
