//! SeaORM-backed group membership operations.

use async_trait::async_trait;
use sea_orm::*;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::db::{Database, GroupStore};
use crate::entity::{group, group_member};
use crate::error::AppResult;

impl Database {
    async fn group_by_name(&self, name: &str) -> AppResult<Option<group::Model>> {
        Ok(group::Entity::find()
            .filter(group::Column::Name.eq(name))
            .one(self.connection())
            .await?)
    }
}

#[async_trait]
impl GroupStore for Database {
    async fn default_group_name(&self) -> AppResult<Option<String>> {
        let result = group::Entity::find()
            .filter(group::Column::IsDefault.eq(true))
            .one(self.connection())
            .await?;
        Ok(result.map(|g| g.name))
    }

    async fn group_exists(&self, name: &str) -> AppResult<bool> {
        Ok(self.group_by_name(name).await?.is_some())
    }

    async fn group_names_of_user(&self, user_id: Uuid) -> AppResult<BTreeSet<String>> {
        let memberships = group_member::Entity::find()
            .filter(group_member::Column::UserId.eq(user_id))
            .all(self.connection())
            .await?;

        let mut names = BTreeSet::new();
        for membership in memberships {
            if let Some(g) = group::Entity::find_by_id(membership.group_id)
                .one(self.connection())
                .await?
            {
                names.insert(g.name);
            }
        }
        Ok(names)
    }

    async fn add_member(&self, group_name: &str, user_id: Uuid) -> AppResult<()> {
        let Some(g) = self.group_by_name(group_name).await? else {
            return Ok(());
        };

        let existing = group_member::Entity::find_by_id((g.id, user_id))
            .one(self.connection())
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        group_member::Entity::insert(group_member::ActiveModel {
            group_id: Set(g.id),
            user_id: Set(user_id),
        })
        .exec(self.connection())
        .await?;
        Ok(())
    }

    async fn remove_member(&self, group_name: &str, user_id: Uuid) -> AppResult<()> {
        let Some(g) = self.group_by_name(group_name).await? else {
            return Ok(());
        };

        group_member::Entity::delete_many()
            .filter(group_member::Column::GroupId.eq(g.id))
            .filter(group_member::Column::UserId.eq(user_id))
            .exec(self.connection())
            .await?;
        Ok(())
    }
}
