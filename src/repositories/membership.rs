//! Organization membership repository

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder,
};
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::membership;

pub struct MembershipRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> MembershipRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Option<membership::Model>, DbErr> {
        membership::Entity::find()
            .filter(membership::Column::UserId.eq(user_id))
            .filter(membership::Column::OrganizationId.eq(organization_id))
            .one(self.db)
            .await
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<membership::Model>, DbErr> {
        membership::Entity::find()
            .filter(membership::Column::UserId.eq(user_id))
            .order_by_asc(membership::Column::CreatedAt)
            .all(self.db)
            .await
    }

    pub async fn list_for_organization(
        &self,
        organization_id: &str,
    ) -> Result<Vec<membership::Model>, DbErr> {
        membership::Entity::find()
            .filter(membership::Column::OrganizationId.eq(organization_id))
            .order_by_asc(membership::Column::CreatedAt)
            .all(self.db)
            .await
    }

    /// Insert the membership if the (user, organization) pair is new; an
    /// existing row wins, keeping its role.
    pub async fn insert_if_absent(
        &self,
        user_id: &str,
        organization_id: &str,
        role: &str,
    ) -> Result<membership::Model, DbErr> {
        if let Some(existing) = self.find(user_id, organization_id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let active = membership::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.to_string()),
            organization_id: Set(organization_id.to_string()),
            role: Set(role.to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            deleted_at: Set(None),
        };

        match active.insert(self.db).await {
            Ok(model) => Ok(model),
            Err(err) if is_unique_violation(&err) => {
                match self.find(user_id, organization_id).await? {
                    Some(model) => Ok(model),
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Delete the membership, returning the number of rows removed.
    /// Deleting an absent membership is a no-op.
    pub async fn delete(&self, user_id: &str, organization_id: &str) -> Result<u64, DbErr> {
        let result = membership::Entity::delete_many()
            .filter(membership::Column::UserId.eq(user_id))
            .filter(membership::Column::OrganizationId.eq(organization_id))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Update the membership's role, returning the updated row or `None`
    /// when no such membership exists.
    pub async fn update_role(
        &self,
        user_id: &str,
        organization_id: &str,
        role: &str,
    ) -> Result<Option<membership::Model>, DbErr> {
        let Some(existing) = self.find(user_id, organization_id).await? else {
            return Ok(None);
        };

        let mut active: membership::ActiveModel = existing.into();
        active.role = Set(role.to_string());
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(self.db).await?;
        Ok(Some(updated))
    }
}
