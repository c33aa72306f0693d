//! # Identity Provider Client
//!
//! Trait and data types for talking to the upstream identity provider.
//! The HTTP implementation lives in [`http`]; tests substitute their own
//! implementations of [`IdentityProvider`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;

pub use http::HttpIdentityProvider;

/// Errors returned by identity provider calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned status {status}")]
    Http {
        status: u16,
        body_snippet: Option<String>,
    },
    #[error("provider request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl ProviderError {
    /// Whether the provider rejected the credentials presented.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ProviderError::Http { status: 401, .. })
    }
}

/// User record as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

/// Organization record as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOrganization {
    pub id: String,
    pub name: String,
}

/// Role attached to a provider membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipRole {
    pub slug: String,
}

/// Organization membership record as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMembership {
    pub id: String,
    pub user_id: String,
    pub organization_id: String,
    #[serde(default)]
    pub role: Option<MembershipRole>,
}

/// Invitation record as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInvitation {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of exchanging a login authorization code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user: ProviderUser,
    pub access_token: String,
}

/// Upstream identity provider operations used by reconciliation and
/// membership management.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_organization(&self, id: &str) -> Result<ProviderOrganization, ProviderError>;

    async fn create_organization(&self, name: &str) -> Result<ProviderOrganization, ProviderError>;

    async fn get_user(&self, id: &str) -> Result<ProviderUser, ProviderError>;

    /// List memberships, optionally filtered by user and/or organization.
    async fn list_memberships(
        &self,
        user_id: Option<&str>,
        organization_id: Option<&str>,
    ) -> Result<Vec<ProviderMembership>, ProviderError>;

    async fn create_membership(
        &self,
        organization_id: &str,
        user_id: &str,
        role: Option<&str>,
    ) -> Result<ProviderMembership, ProviderError>;

    async fn delete_membership(&self, membership_id: &str) -> Result<(), ProviderError>;

    async fn update_membership(
        &self,
        membership_id: &str,
        role: &str,
    ) -> Result<ProviderMembership, ProviderError>;

    async fn send_invitation(
        &self,
        organization_id: &str,
        email: &str,
        role: Option<&str>,
        inviter_user_id: Option<&str>,
    ) -> Result<ProviderInvitation, ProviderError>;

    async fn revoke_invitation(
        &self,
        invitation_id: &str,
    ) -> Result<ProviderInvitation, ProviderError>;

    /// Exchange a login callback authorization code for the authenticated user.
    async fn exchange_code(&self, code: &str) -> Result<AuthenticatedUser, ProviderError>;

    /// Resolve an access token to the user it belongs to.
    async fn introspect_token(&self, access_token: &str) -> Result<ProviderUser, ProviderError>;
}
