//! Membership and invitation management.
//!
//! Mutations are authorized against the requester's role, pushed to the
//! identity provider first, then mirrored locally. Provider failures leave
//! the local mirror untouched so a retry converges.

use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;

use crate::authz::{self, Role};
use crate::error::OrgError;
use crate::models::invitation::{self, Status};
use crate::models::membership;
use crate::provider::IdentityProvider;
use crate::repositories::{
    InvitationRepository, MembershipRepository, NewInvitation, TransitionOutcome,
};

pub struct MembershipManager {
    db: DatabaseConnection,
    provider: Arc<dyn IdentityProvider>,
    invitation_expiry_days: i64,
}

impl MembershipManager {
    pub fn new(
        db: DatabaseConnection,
        provider: Arc<dyn IdentityProvider>,
        invitation_expiry_days: i64,
    ) -> Self {
        Self {
            db,
            provider,
            invitation_expiry_days,
        }
    }

    /// Remove a member from the organization.
    pub async fn remove_member(
        &self,
        organization_id: &str,
        requester_user_id: &str,
        target_user_id: &str,
    ) -> Result<(), OrgError> {
        let repo = MembershipRepository::new(&self.db);

        let requester = self
            .requester_role(&repo, organization_id, requester_user_id)
            .await?;
        let Some(target) = repo.find(target_user_id, organization_id).await? else {
            return Err(OrgError::NotFound(format!(
                "user {} is not a member of this organization",
                target_user_id
            )));
        };

        authz::check_remove_member(
            requester_user_id,
            requester,
            target_user_id,
            Role::parse(&target.role),
        )?;

        // Provider first: a provider failure must not leave the mirror ahead
        // of the source of truth.
        let provider_memberships = self
            .provider
            .list_memberships(Some(target_user_id), Some(organization_id))
            .await?;
        if let Some(provider_membership) = provider_memberships.first() {
            self.provider
                .delete_membership(&provider_membership.id)
                .await?;
        } else {
            tracing::warn!(
                target_user_id,
                organization_id,
                "membership exists locally but not at the provider; removing local row only"
            );
        }

        repo.delete(target_user_id, organization_id).await?;
        counter!("orgsync_membership_mutations_total", "operation" => "remove").increment(1);
        Ok(())
    }

    /// Change a member's role.
    pub async fn update_member_role(
        &self,
        organization_id: &str,
        requester_user_id: &str,
        target_user_id: &str,
        new_role_slug: &str,
    ) -> Result<membership::Model, OrgError> {
        let new_role = parse_known_role(new_role_slug)?;

        let repo = MembershipRepository::new(&self.db);
        let requester = self
            .requester_role(&repo, organization_id, requester_user_id)
            .await?;
        let Some(target) = repo.find(target_user_id, organization_id).await? else {
            return Err(OrgError::NotFound(format!(
                "user {} is not a member of this organization",
                target_user_id
            )));
        };

        authz::check_update_role(requester, Role::parse(&target.role), new_role)?;

        let provider_memberships = self
            .provider
            .list_memberships(Some(target_user_id), Some(organization_id))
            .await?;
        if let Some(provider_membership) = provider_memberships.first() {
            self.provider
                .update_membership(&provider_membership.id, new_role.as_str())
                .await?;
        } else {
            tracing::warn!(
                target_user_id,
                organization_id,
                "membership exists locally but not at the provider; updating local row only"
            );
        }

        let updated = repo
            .update_role(target_user_id, organization_id, new_role.as_str())
            .await?
            .ok_or_else(|| {
                OrgError::NotFound(format!(
                    "user {} is not a member of this organization",
                    target_user_id
                ))
            })?;
        counter!("orgsync_membership_mutations_total", "operation" => "update_role").increment(1);
        Ok(updated)
    }

    /// Send an invitation to join the organization.
    pub async fn send_invitation(
        &self,
        organization_id: &str,
        requester_user_id: &str,
        email: &str,
        role_slug: Option<&str>,
    ) -> Result<invitation::Model, OrgError> {
        let repo = MembershipRepository::new(&self.db);
        let requester = self
            .requester_role(&repo, organization_id, requester_user_id)
            .await?;
        authz::check_invitation_access(requester)?;

        let role = match role_slug {
            Some(slug) => Some(parse_known_role(slug)?),
            None => None,
        };
        if role == Some(Role::Owner) {
            return Err(OrgError::InvalidOperation(
                "cannot invite a user as owner".to_string(),
            ));
        }

        let invitation_repo = InvitationRepository::new(&self.db);
        if invitation_repo
            .find_pending_by_org_and_email(organization_id, email)
            .await?
            .is_some()
        {
            return Err(OrgError::Conflict(format!(
                "an invitation for {} is already pending",
                email
            )));
        }

        let provider_invitation = self
            .provider
            .send_invitation(
                organization_id,
                email,
                role.map(|r| r.as_str()),
                Some(requester_user_id),
            )
            .await?;

        let expires_at = provider_invitation
            .expires_at
            .unwrap_or_else(|| Utc::now() + Duration::days(self.invitation_expiry_days));

        let stored = invitation_repo
            .insert(&NewInvitation {
                id: provider_invitation.id,
                email: email.to_string(),
                organization_id: organization_id.to_string(),
                invited_by_user_id: Some(requester_user_id.to_string()),
                expires_at: Some(expires_at.into()),
            })
            .await?;
        counter!("orgsync_membership_mutations_total", "operation" => "invite").increment(1);
        Ok(stored)
    }

    /// Revoke a pending invitation. Revoking an already revoked invitation
    /// is a no-op; accepted and expired invitations cannot be revoked.
    pub async fn revoke_invitation(
        &self,
        organization_id: &str,
        requester_user_id: &str,
        invitation_id: &str,
    ) -> Result<(), OrgError> {
        let repo = MembershipRepository::new(&self.db);
        let requester = self
            .requester_role(&repo, organization_id, requester_user_id)
            .await?;
        authz::check_invitation_access(requester)?;

        let invitation_repo = InvitationRepository::new(&self.db);
        let invitation = invitation_repo
            .find_by_id(invitation_id)
            .await?
            .filter(|inv| inv.organization_id == organization_id)
            .ok_or_else(|| OrgError::NotFound(format!("invitation {} not found", invitation_id)))?;

        match Status::parse(&invitation.status) {
            Some(Status::Pending) => {
                self.provider.revoke_invitation(invitation_id).await?;
                match invitation_repo
                    .transition_status(invitation_id, Status::Revoked)
                    .await?
                {
                    TransitionOutcome::Applied(_) | TransitionOutcome::AlreadyInState => {}
                    TransitionOutcome::Refused { current } => {
                        // Lost a race against an accept or expiry event.
                        return Err(OrgError::InvalidOperation(format!(
                            "invitation is {} and cannot be revoked",
                            current
                        )));
                    }
                    TransitionOutcome::Missing => {
                        return Err(OrgError::NotFound(format!(
                            "invitation {} not found",
                            invitation_id
                        )));
                    }
                }
                counter!("orgsync_membership_mutations_total", "operation" => "revoke_invite")
                    .increment(1);
                Ok(())
            }
            Some(Status::Revoked) => Ok(()),
            _ => Err(OrgError::InvalidOperation(format!(
                "invitation is {} and cannot be revoked",
                invitation.status
            ))),
        }
    }

    async fn requester_role(
        &self,
        repo: &MembershipRepository<'_>,
        organization_id: &str,
        requester_user_id: &str,
    ) -> Result<Role, OrgError> {
        let membership = repo
            .find(requester_user_id, organization_id)
            .await?
            .ok_or_else(|| {
                OrgError::PermissionDenied(
                    "you are not a member of this organization".to_string(),
                )
            })?;
        Ok(Role::parse(&membership.role))
    }
}

fn parse_known_role(slug: &str) -> Result<Role, OrgError> {
    match slug {
        "owner" => Ok(Role::Owner),
        "admin" => Ok(Role::Admin),
        "member" => Ok(Role::Member),
        other => Err(OrgError::InvalidOperation(format!(
            "unknown role '{}'",
            other
        ))),
    }
}
