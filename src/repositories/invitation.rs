//! Invitation repository
//!
//! Status transitions are guarded here: terminal states (accepted, revoked,
//! expired) never move again, so a replayed `invitation.accepted` webhook
//! cannot resurrect a revoked invitation.

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder,
};

use crate::error::is_unique_violation;
use crate::models::invitation::{self, Status};

/// Fields required to record a new invitation.
#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub id: String,
    pub email: String,
    pub organization_id: String,
    pub invited_by_user_id: Option<String>,
    pub expires_at: Option<DateTimeWithTimeZone>,
}

/// Outcome of a status transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was applied.
    Applied(invitation::Model),
    /// The invitation was already in the requested state.
    AlreadyInState,
    /// The invitation is in a terminal state and cannot move.
    Refused { current: String },
    /// No invitation with that id exists locally.
    Missing,
}

pub struct InvitationRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> InvitationRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<invitation::Model>, DbErr> {
        invitation::Entity::find_by_id(id).one(self.db).await
    }

    pub async fn list_pending_for_organization(
        &self,
        organization_id: &str,
    ) -> Result<Vec<invitation::Model>, DbErr> {
        invitation::Entity::find()
            .filter(invitation::Column::OrganizationId.eq(organization_id))
            .filter(invitation::Column::Status.eq(Status::Pending.as_str()))
            .order_by_asc(invitation::Column::CreatedAt)
            .all(self.db)
            .await
    }

    pub async fn find_pending_by_org_and_email(
        &self,
        organization_id: &str,
        email: &str,
    ) -> Result<Option<invitation::Model>, DbErr> {
        invitation::Entity::find()
            .filter(invitation::Column::OrganizationId.eq(organization_id))
            .filter(invitation::Column::Email.eq(email))
            .filter(invitation::Column::Status.eq(Status::Pending.as_str()))
            .one(self.db)
            .await
    }

    /// Record a new pending invitation; a replayed insert of the same
    /// provider id returns the existing row untouched.
    pub async fn insert(&self, new: &NewInvitation) -> Result<invitation::Model, DbErr> {
        if let Some(existing) = self.find_by_id(&new.id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let active = invitation::ActiveModel {
            id: Set(new.id.clone()),
            email: Set(new.email.clone()),
            organization_id: Set(new.organization_id.clone()),
            invited_by_user_id: Set(new.invited_by_user_id.clone()),
            status: Set(Status::Pending.as_str().to_string()),
            expires_at: Set(new.expires_at),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        match active.insert(self.db).await {
            Ok(model) => Ok(model),
            Err(err) if is_unique_violation(&err) => match self.find_by_id(&new.id).await? {
                Some(model) => Ok(model),
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Attempt to move the invitation to `to`, enforcing the lifecycle rules.
    pub async fn transition_status(
        &self,
        id: &str,
        to: Status,
    ) -> Result<TransitionOutcome, DbErr> {
        let Some(existing) = self.find_by_id(id).await? else {
            return Ok(TransitionOutcome::Missing);
        };

        let current = Status::parse(&existing.status);
        if current == Some(to) {
            return Ok(TransitionOutcome::AlreadyInState);
        }
        if current.map(|s| s.is_terminal()).unwrap_or(true) {
            return Ok(TransitionOutcome::Refused {
                current: existing.status,
            });
        }

        let mut active: invitation::ActiveModel = existing.into();
        active.status = Set(to.as_str().to_string());
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(self.db).await?;
        Ok(TransitionOutcome::Applied(updated))
    }
}
