//! Organization repository

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter,
};

use crate::error::is_unique_violation;
use crate::models::organization;

pub struct OrganizationRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> OrganizationRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<organization::Model>, DbErr> {
        organization::Entity::find_by_id(id).one(self.db).await
    }

    pub async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<organization::Model>, DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        organization::Entity::find()
            .filter(organization::Column::Id.is_in(ids.iter().cloned()))
            .all(self.db)
            .await
    }

    /// Insert the organization, or update the existing row's name.
    pub async fn upsert(&self, id: &str, name: &str) -> Result<organization::Model, DbErr> {
        if let Some(existing) = self.find_by_id(id).await? {
            let mut active: organization::ActiveModel = existing.into();
            active.name = Set(name.to_string());
            active.updated_at = Set(Utc::now().into());
            return active.update(self.db).await;
        }

        match self.insert(id, name).await {
            Ok(model) => Ok(model),
            Err(err) if is_unique_violation(&err) => match self.find_by_id(id).await? {
                Some(model) => Ok(model),
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Insert the organization only if no row exists yet; an existing row wins.
    pub async fn insert_if_absent(&self, id: &str, name: &str) -> Result<organization::Model, DbErr> {
        if let Some(existing) = self.find_by_id(id).await? {
            return Ok(existing);
        }

        match self.insert(id, name).await {
            Ok(model) => Ok(model),
            Err(err) if is_unique_violation(&err) => match self.find_by_id(id).await? {
                Some(model) => Ok(model),
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    async fn insert(&self, id: &str, name: &str) -> Result<organization::Model, DbErr> {
        let now = Utc::now();
        let active = organization::ActiveModel {
            id: Set(id.to_string()),
            name: Set(name.to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            deleted_at: Set(None),
        };
        active.insert(self.db).await
    }
}
