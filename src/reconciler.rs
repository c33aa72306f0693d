//! Identity reconciliation.
//!
//! Applies webhook events and login callbacks to the local mirror of
//! provider state. Every operation here is idempotent: replayed events and
//! concurrent deliveries converge on the same rows.
//!
//! Local state is authoritative for membership once a user has any local
//! membership; the provider is only consulted as a fallback for users the
//! mirror has never seen with an organization.

use std::sync::Arc;

use metrics::counter;
use sea_orm::DatabaseConnection;

use crate::authz::Role;
use crate::error::OrgError;
use crate::models::invitation::Status;
use crate::models::membership;
use crate::provider::{IdentityProvider, ProviderUser};
use crate::repositories::{
    InvitationRepository, MembershipRepository, OrganizationRepository, TransitionOutcome,
    UserProfile, UserRepository,
};
use crate::webhook_verification::MembershipEventData;

pub struct Reconciler {
    db: DatabaseConnection,
    provider: Arc<dyn IdentityProvider>,
}

impl Reconciler {
    pub fn new(db: DatabaseConnection, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { db, provider }
    }

    /// Apply a `user.created` or `user.updated` event.
    pub async fn apply_user_upsert(&self, profile: &UserProfile) -> Result<(), OrgError> {
        UserRepository::new(&self.db).upsert(profile).await?;
        counter!("orgsync_reconcile_applied_total", "entity" => "user").increment(1);
        Ok(())
    }

    /// Apply an `organization.created` or `organization.updated` event.
    pub async fn apply_organization_upsert(&self, id: &str, name: &str) -> Result<(), OrgError> {
        OrganizationRepository::new(&self.db).upsert(id, name).await?;
        counter!("orgsync_reconcile_applied_total", "entity" => "organization").increment(1);
        Ok(())
    }

    /// Apply an `organization_membership.created` event.
    ///
    /// The organization and user rows may not exist locally yet when the
    /// provider delivers events out of order, so both are fetched from the
    /// provider and inserted if absent before the membership row.
    pub async fn apply_membership_created(
        &self,
        data: &MembershipEventData,
    ) -> Result<(), OrgError> {
        self.ensure_organization(&data.organization_id).await?;
        self.ensure_user(&data.user_id).await?;

        let role = data
            .role
            .as_ref()
            .map(|r| r.slug.as_str())
            .unwrap_or(Role::Member.as_str());
        MembershipRepository::new(&self.db)
            .insert_if_absent(&data.user_id, &data.organization_id, role)
            .await?;

        counter!("orgsync_reconcile_applied_total", "entity" => "membership").increment(1);
        Ok(())
    }

    /// Apply an `organization_membership.deleted` event. Deleting a
    /// membership that never existed locally is a no-op.
    pub async fn apply_membership_deleted(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<(), OrgError> {
        let removed = MembershipRepository::new(&self.db)
            .delete(user_id, organization_id)
            .await?;
        if removed == 0 {
            tracing::debug!(
                user_id,
                organization_id,
                "membership.deleted for a membership not mirrored locally"
            );
        }
        counter!("orgsync_reconcile_applied_total", "entity" => "membership_delete").increment(1);
        Ok(())
    }

    /// Apply an `invitation.accepted` event. Terminal invitations stay put;
    /// an event for an unknown invitation is logged and acknowledged.
    pub async fn apply_invitation_accepted(&self, invitation_id: &str) -> Result<(), OrgError> {
        let outcome = InvitationRepository::new(&self.db)
            .transition_status(invitation_id, Status::Accepted)
            .await?;

        match outcome {
            TransitionOutcome::Applied(_) | TransitionOutcome::AlreadyInState => {
                counter!("orgsync_reconcile_applied_total", "entity" => "invitation").increment(1);
            }
            TransitionOutcome::Refused { ref current } => {
                tracing::warn!(
                    invitation_id,
                    current,
                    "invitation.accepted refused: invitation is in a terminal state"
                );
            }
            TransitionOutcome::Missing => {
                tracing::warn!(invitation_id, "invitation.accepted for unknown invitation");
            }
        }
        Ok(())
    }

    /// Reconcile local state after a successful login, returning the id of
    /// the organization selected for the session.
    ///
    /// Order of precedence:
    /// 1. local memberships, if any exist
    /// 2. a one-time sync of the provider's membership list
    /// 3. a freshly provisioned personal organization with an owner membership
    pub async fn reconcile_login_state(&self, user: &ProviderUser) -> Result<String, OrgError> {
        let profile = profile_from_provider(user);
        let local_user = UserRepository::new(&self.db).upsert(&profile).await?;

        let membership_repo = MembershipRepository::new(&self.db);
        let mut memberships = membership_repo.list_for_user(&user.id).await?;

        if memberships.is_empty() {
            self.sync_memberships_from_provider(&user.id).await?;
            memberships = membership_repo.list_for_user(&user.id).await?;
        }

        if memberships.is_empty() {
            let organization = self.provision_personal_organization(user).await?;
            memberships = membership_repo.list_for_user(&user.id).await?;
            counter!("orgsync_login_reconcile_total", "outcome" => "provisioned").increment(1);
            tracing::info!(
                user_id = %user.id,
                organization_id = %organization,
                "provisioned personal organization for first login"
            );
        } else {
            counter!("orgsync_login_reconcile_total", "outcome" => "existing").increment(1);
        }

        let selected = choose_selected_organization(
            local_user.selected_organization_id.as_deref(),
            &memberships,
        )
        .ok_or_else(|| {
            OrgError::NotFound(format!("no organization membership for user {}", user.id))
        })?;

        UserRepository::new(&self.db)
            .set_selected_organization(&user.id, &selected)
            .await?;

        Ok(selected)
    }

    /// Switch the user's active organization. Selecting an organization the
    /// user does not belong to falls back to their first membership.
    pub async fn select_organization(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<String, OrgError> {
        let membership_repo = MembershipRepository::new(&self.db);

        let selected = if membership_repo.find(user_id, organization_id).await?.is_some() {
            organization_id.to_string()
        } else {
            let memberships = membership_repo.list_for_user(user_id).await?;
            match memberships.first() {
                Some(first) => {
                    tracing::debug!(
                        user_id,
                        requested = organization_id,
                        fallback = %first.organization_id,
                        "selected organization is not a membership; falling back"
                    );
                    first.organization_id.clone()
                }
                None => {
                    return Err(OrgError::NotFound(format!(
                        "no organization membership for user {}",
                        user_id
                    )));
                }
            }
        };

        UserRepository::new(&self.db)
            .set_selected_organization(user_id, &selected)
            .await?;
        Ok(selected)
    }

    /// Make sure the organization is mirrored locally, fetching it from the
    /// provider when absent. An existing row is never overwritten here.
    async fn ensure_organization(&self, organization_id: &str) -> Result<(), OrgError> {
        let repo = OrganizationRepository::new(&self.db);
        if repo.find_by_id(organization_id).await?.is_some() {
            return Ok(());
        }
        let organization = self.provider.get_organization(organization_id).await?;
        repo.insert_if_absent(&organization.id, &organization.name)
            .await?;
        Ok(())
    }

    /// Make sure the user is mirrored locally, fetching the profile from the
    /// provider when absent.
    async fn ensure_user(&self, user_id: &str) -> Result<(), OrgError> {
        let repo = UserRepository::new(&self.db);
        if repo.find_by_id(user_id).await?.is_some() {
            return Ok(());
        }
        let user = self.provider.get_user(user_id).await?;
        repo.insert_if_absent(&profile_from_provider(&user)).await?;
        Ok(())
    }

    async fn sync_memberships_from_provider(&self, user_id: &str) -> Result<(), OrgError> {
        let provider_memberships = self.provider.list_memberships(Some(user_id), None).await?;

        for provider_membership in provider_memberships {
            self.ensure_organization(&provider_membership.organization_id)
                .await?;
            let role = provider_membership
                .role
                .as_ref()
                .map(|r| r.slug.as_str())
                .unwrap_or(Role::Member.as_str());
            MembershipRepository::new(&self.db)
                .insert_if_absent(user_id, &provider_membership.organization_id, role)
                .await?;
        }
        Ok(())
    }

    /// Create a personal organization at the provider and mirror it locally
    /// with an owner membership for the user.
    async fn provision_personal_organization(
        &self,
        user: &ProviderUser,
    ) -> Result<String, OrgError> {
        let name = personal_organization_name(&user.email);
        let organization = self.provider.create_organization(&name).await?;

        OrganizationRepository::new(&self.db)
            .insert_if_absent(&organization.id, &organization.name)
            .await?;

        self.provider
            .create_membership(&organization.id, &user.id, Some(Role::Owner.as_str()))
            .await?;
        MembershipRepository::new(&self.db)
            .insert_if_absent(&user.id, &organization.id, Role::Owner.as_str())
            .await?;

        Ok(organization.id)
    }
}

/// Map a provider user record to the local profile shape.
pub fn profile_from_provider(user: &ProviderUser) -> UserProfile {
    UserProfile {
        id: user.id.clone(),
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        avatar_url: user.profile_picture_url.clone(),
    }
}

/// Name a freshly provisioned organization after the user's email local part.
fn personal_organization_name(email: &str) -> String {
    let local_part = email.split('@').next().unwrap_or(email);
    format!("{}'s Organization", local_part)
}

/// Prefer the previously selected organization when the user is still a
/// member of it; otherwise the oldest membership wins.
fn choose_selected_organization(
    previous: Option<&str>,
    memberships: &[membership::Model],
) -> Option<String> {
    if let Some(previous) = previous
        && memberships.iter().any(|m| m.organization_id == previous)
    {
        return Some(previous.to_string());
    }
    memberships.first().map(|m| m.organization_id.clone())
}
