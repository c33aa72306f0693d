//! User repository

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter,
};

use crate::error::is_unique_violation;
use crate::models::user;

/// Profile fields synced from the identity provider.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

pub struct UserRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<user::Model>, DbErr> {
        user::Entity::find_by_id(id).one(self.db).await
    }

    pub async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<user::Model>, DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        user::Entity::find()
            .filter(user::Column::Id.is_in(ids.iter().cloned()))
            .all(self.db)
            .await
    }

    /// Insert the profile, or update the existing row's profile fields.
    pub async fn upsert(&self, profile: &UserProfile) -> Result<user::Model, DbErr> {
        if let Some(existing) = self.find_by_id(&profile.id).await? {
            let mut active: user::ActiveModel = existing.into();
            active.email = Set(profile.email.clone());
            active.first_name = Set(profile.first_name.clone());
            active.last_name = Set(profile.last_name.clone());
            active.avatar_url = Set(profile.avatar_url.clone());
            active.updated_at = Set(Utc::now().into());
            return active.update(self.db).await;
        }

        match self.insert(profile).await {
            Ok(model) => Ok(model),
            // Lost an insert race; the other writer's row is authoritative
            // for everything except the profile fields we carry.
            Err(err) if is_unique_violation(&err) => {
                match self.find_by_id(&profile.id).await? {
                    Some(model) => Ok(model),
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Insert the profile only if no row exists yet; an existing row wins.
    pub async fn insert_if_absent(&self, profile: &UserProfile) -> Result<user::Model, DbErr> {
        if let Some(existing) = self.find_by_id(&profile.id).await? {
            return Ok(existing);
        }

        match self.insert(profile).await {
            Ok(model) => Ok(model),
            Err(err) if is_unique_violation(&err) => {
                match self.find_by_id(&profile.id).await? {
                    Some(model) => Ok(model),
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Persist the user's active organization choice.
    pub async fn set_selected_organization(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<(), DbErr> {
        user::Entity::update_many()
            .col_expr(
                user::Column::SelectedOrganizationId,
                sea_orm::sea_query::Expr::value(organization_id),
            )
            .col_expr(
                user::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(user::Column::Id.eq(user_id))
            .exec(self.db)
            .await?;
        Ok(())
    }

    async fn insert(&self, profile: &UserProfile) -> Result<user::Model, DbErr> {
        let now = Utc::now();
        let active = user::ActiveModel {
            id: Set(profile.id.clone()),
            email: Set(profile.email.clone()),
            first_name: Set(profile.first_name.clone()),
            last_name: Set(profile.last_name.clone()),
            avatar_url: Set(profile.avatar_url.clone()),
            selected_organization_id: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            deleted_at: Set(None),
        };
        active.insert(self.db).await
    }
}
