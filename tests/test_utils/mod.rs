//! Test utilities for database and provider testing.
//!
//! Provides an in-memory SQLite database with migrations applied, seed
//! helpers for mirrored rows, and an in-memory [`IdentityProvider`]
//! implementation that records its calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use orgsync::config::AppConfig;
use orgsync::provider::{
    AuthenticatedUser, IdentityProvider, MembershipRole, ProviderError, ProviderInvitation,
    ProviderMembership, ProviderOrganization, ProviderUser,
};
use orgsync::repositories::{
    MembershipRepository, NewInvitation, InvitationRepository, OrganizationRepository,
    UserProfile, UserRepository,
};
use orgsync::server::AppState;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;

    Migrator::up(&db, None).await?;

    // SQLite does not enforce our Postgres foreign key semantics; disable FK
    // checks so fixtures can be inserted in any order.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Configuration suitable for tests: secrets set, test profile.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        provider_api_key: Some("sk_test".to_string()),
        webhook_secret: Some("whsec_test".to_string()),
        ..AppConfig::default()
    }
}

/// Assemble application state around a test database and mock provider.
#[allow(dead_code)]
pub fn test_state(
    db: DatabaseConnection,
    provider: Arc<MockIdentityProvider>,
    config: AppConfig,
) -> AppState {
    AppState {
        config: Arc::new(config),
        db,
        provider,
    }
}

#[allow(dead_code)]
pub async fn seed_user(db: &DatabaseConnection, id: &str, email: &str) -> Result<()> {
    UserRepository::new(db)
        .insert_if_absent(&UserProfile {
            id: id.to_string(),
            email: email.to_string(),
            first_name: None,
            last_name: None,
            avatar_url: None,
        })
        .await?;
    Ok(())
}

#[allow(dead_code)]
pub async fn seed_organization(db: &DatabaseConnection, id: &str, name: &str) -> Result<()> {
    OrganizationRepository::new(db).insert_if_absent(id, name).await?;
    Ok(())
}

#[allow(dead_code)]
pub async fn seed_membership(
    db: &DatabaseConnection,
    user_id: &str,
    organization_id: &str,
    role: &str,
) -> Result<()> {
    MembershipRepository::new(db)
        .insert_if_absent(user_id, organization_id, role)
        .await?;
    Ok(())
}

#[allow(dead_code)]
pub async fn seed_invitation(
    db: &DatabaseConnection,
    id: &str,
    organization_id: &str,
    email: &str,
) -> Result<()> {
    InvitationRepository::new(db)
        .insert(&NewInvitation {
            id: id.to_string(),
            email: email.to_string(),
            organization_id: organization_id.to_string(),
            invited_by_user_id: None,
            expires_at: None,
        })
        .await?;
    Ok(())
}

/// In-memory identity provider double. State is seeded through the public
/// fields and every call is recorded for assertions.
#[derive(Default)]
pub struct MockIdentityProvider {
    pub users: Mutex<HashMap<String, ProviderUser>>,
    pub organizations: Mutex<HashMap<String, ProviderOrganization>>,
    pub memberships: Mutex<Vec<ProviderMembership>>,
    pub exchangeable_codes: Mutex<HashMap<String, AuthenticatedUser>>,
    pub access_tokens: Mutex<HashMap<String, ProviderUser>>,
    pub calls: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl MockIdentityProvider {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn with_user(self, user: ProviderUser) -> Self {
        self.users.lock().unwrap().insert(user.id.clone(), user);
        self
    }

    #[allow(dead_code)]
    pub fn with_organization(self, organization: ProviderOrganization) -> Self {
        self.organizations
            .lock()
            .unwrap()
            .insert(organization.id.clone(), organization);
        self
    }

    #[allow(dead_code)]
    pub fn with_membership(self, membership: ProviderMembership) -> Self {
        self.memberships.lock().unwrap().push(membership);
        self
    }

    #[allow(dead_code)]
    pub fn with_exchangeable_code(self, code: &str, authenticated: AuthenticatedUser) -> Self {
        self.exchangeable_codes
            .lock()
            .unwrap()
            .insert(code.to_string(), authenticated);
        self
    }

    #[allow(dead_code)]
    pub fn with_access_token(self, token: &str, user: ProviderUser) -> Self {
        self.access_tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), user);
        self
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{}_{}", prefix, n)
    }

    fn not_found() -> ProviderError {
        ProviderError::Http {
            status: 404,
            body_snippet: None,
        }
    }

    fn unauthorized() -> ProviderError {
        ProviderError::Http {
            status: 401,
            body_snippet: None,
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn get_organization(&self, id: &str) -> Result<ProviderOrganization, ProviderError> {
        self.record(format!("get_organization:{}", id));
        self.organizations
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(Self::not_found)
    }

    async fn create_organization(&self, name: &str) -> Result<ProviderOrganization, ProviderError> {
        self.record(format!("create_organization:{}", name));
        let organization = ProviderOrganization {
            id: self.fresh_id("org_mock"),
            name: name.to_string(),
        };
        self.organizations
            .lock()
            .unwrap()
            .insert(organization.id.clone(), organization.clone());
        Ok(organization)
    }

    async fn get_user(&self, id: &str) -> Result<ProviderUser, ProviderError> {
        self.record(format!("get_user:{}", id));
        self.users
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(Self::not_found)
    }

    async fn list_memberships(
        &self,
        user_id: Option<&str>,
        organization_id: Option<&str>,
    ) -> Result<Vec<ProviderMembership>, ProviderError> {
        self.record(format!(
            "list_memberships:{}:{}",
            user_id.unwrap_or("*"),
            organization_id.unwrap_or("*")
        ));
        let memberships = self.memberships.lock().unwrap();
        Ok(memberships
            .iter()
            .filter(|m| user_id.is_none_or(|u| m.user_id == u))
            .filter(|m| organization_id.is_none_or(|o| m.organization_id == o))
            .cloned()
            .collect())
    }

    async fn create_membership(
        &self,
        organization_id: &str,
        user_id: &str,
        role: Option<&str>,
    ) -> Result<ProviderMembership, ProviderError> {
        self.record(format!("create_membership:{}:{}", organization_id, user_id));
        let membership = ProviderMembership {
            id: self.fresh_id("om_mock"),
            user_id: user_id.to_string(),
            organization_id: organization_id.to_string(),
            role: role.map(|slug| MembershipRole {
                slug: slug.to_string(),
            }),
        };
        self.memberships.lock().unwrap().push(membership.clone());
        Ok(membership)
    }

    async fn delete_membership(&self, membership_id: &str) -> Result<(), ProviderError> {
        self.record(format!("delete_membership:{}", membership_id));
        self.memberships
            .lock()
            .unwrap()
            .retain(|m| m.id != membership_id);
        Ok(())
    }

    async fn update_membership(
        &self,
        membership_id: &str,
        role: &str,
    ) -> Result<ProviderMembership, ProviderError> {
        self.record(format!("update_membership:{}:{}", membership_id, role));
        let mut memberships = self.memberships.lock().unwrap();
        let membership = memberships
            .iter_mut()
            .find(|m| m.id == membership_id)
            .ok_or_else(Self::not_found)?;
        membership.role = Some(MembershipRole {
            slug: role.to_string(),
        });
        Ok(membership.clone())
    }

    async fn send_invitation(
        &self,
        organization_id: &str,
        email: &str,
        _role: Option<&str>,
        _inviter_user_id: Option<&str>,
    ) -> Result<ProviderInvitation, ProviderError> {
        self.record(format!("send_invitation:{}:{}", organization_id, email));
        Ok(ProviderInvitation {
            id: self.fresh_id("invite_mock"),
            email: email.to_string(),
            organization_id: Some(organization_id.to_string()),
            expires_at: None,
        })
    }

    async fn revoke_invitation(
        &self,
        invitation_id: &str,
    ) -> Result<ProviderInvitation, ProviderError> {
        self.record(format!("revoke_invitation:{}", invitation_id));
        Ok(ProviderInvitation {
            id: invitation_id.to_string(),
            email: String::new(),
            organization_id: None,
            expires_at: None,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<AuthenticatedUser, ProviderError> {
        self.record(format!("exchange_code:{}", code));
        self.exchangeable_codes
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or_else(Self::unauthorized)
    }

    async fn introspect_token(&self, access_token: &str) -> Result<ProviderUser, ProviderError> {
        self.record(format!("introspect_token:{}", access_token));
        self.access_tokens
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or_else(Self::unauthorized)
    }
}

#[allow(dead_code)]
pub fn provider_user(id: &str, email: &str) -> ProviderUser {
    ProviderUser {
        id: id.to_string(),
        email: email.to_string(),
        first_name: None,
        last_name: None,
        profile_picture_url: None,
    }
}
