//! HTTP implementation of [`IdentityProvider`].
//!
//! Calls a WorkOS-style REST API. All requests are authenticated with the
//! service API key; error bodies are truncated before they reach logs or
//! problem responses.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{
    AuthenticatedUser, IdentityProvider, ProviderError, ProviderInvitation, ProviderMembership,
    ProviderOrganization, ProviderUser,
};

const BODY_SNIPPET_MAX_CHARS: usize = 200;

/// List envelope used by the provider's collection endpoints.
#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

pub struct HttpIdentityProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl HttpIdentityProvider {
    pub fn new(api_base: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body_snippet: snippet(&body),
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn expect_success(response: reqwest::Response) -> Result<(), ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body_snippet: snippet(&body),
            });
        }
        Ok(())
    }
}

fn snippet(body: &str) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    if body.chars().count() > BODY_SNIPPET_MAX_CHARS {
        let truncated: String = body.chars().take(BODY_SNIPPET_MAX_CHARS).collect();
        Some(format!("{}...", truncated))
    } else {
        Some(body.to_string())
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn get_organization(&self, id: &str) -> Result<ProviderOrganization, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/organizations/{}", id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn create_organization(&self, name: &str) -> Result<ProviderOrganization, ProviderError> {
        let response = self
            .client
            .post(self.url("/organizations"))
            .bearer_auth(&self.api_key)
            .json(&json!({ "name": name }))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get_user(&self, id: &str) -> Result<ProviderUser, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/user_management/users/{}", id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn list_memberships(
        &self,
        user_id: Option<&str>,
        organization_id: Option<&str>,
    ) -> Result<Vec<ProviderMembership>, ProviderError> {
        let mut request = self
            .client
            .get(self.url("/user_management/organization_memberships"))
            .bearer_auth(&self.api_key);
        if let Some(user_id) = user_id {
            request = request.query(&[("user_id", user_id)]);
        }
        if let Some(organization_id) = organization_id {
            request = request.query(&[("organization_id", organization_id)]);
        }
        let response = request.send().await?;
        let list: ListResponse<ProviderMembership> = Self::decode(response).await?;
        Ok(list.data)
    }

    async fn create_membership(
        &self,
        organization_id: &str,
        user_id: &str,
        role: Option<&str>,
    ) -> Result<ProviderMembership, ProviderError> {
        let mut body = json!({
            "organization_id": organization_id,
            "user_id": user_id,
        });
        if let Some(role) = role {
            body["role_slug"] = json!(role);
        }
        let response = self
            .client
            .post(self.url("/user_management/organization_memberships"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn delete_membership(&self, membership_id: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(self.url(&format!(
                "/user_management/organization_memberships/{}",
                membership_id
            )))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    async fn update_membership(
        &self,
        membership_id: &str,
        role: &str,
    ) -> Result<ProviderMembership, ProviderError> {
        let response = self
            .client
            .put(self.url(&format!(
                "/user_management/organization_memberships/{}",
                membership_id
            )))
            .bearer_auth(&self.api_key)
            .json(&json!({ "role_slug": role }))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn send_invitation(
        &self,
        organization_id: &str,
        email: &str,
        role: Option<&str>,
        inviter_user_id: Option<&str>,
    ) -> Result<ProviderInvitation, ProviderError> {
        let mut body = json!({
            "email": email,
            "organization_id": organization_id,
        });
        if let Some(role) = role {
            body["role_slug"] = json!(role);
        }
        if let Some(inviter) = inviter_user_id {
            body["inviter_user_id"] = json!(inviter);
        }
        let response = self
            .client
            .post(self.url("/user_management/invitations"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn revoke_invitation(
        &self,
        invitation_id: &str,
    ) -> Result<ProviderInvitation, ProviderError> {
        let response = self
            .client
            .post(self.url(&format!(
                "/user_management/invitations/{}/revoke",
                invitation_id
            )))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn exchange_code(&self, code: &str) -> Result<AuthenticatedUser, ProviderError> {
        let response = self
            .client
            .post(self.url("/user_management/authenticate"))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "grant_type": "authorization_code",
                "code": code,
            }))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn introspect_token(&self, access_token: &str) -> Result<ProviderUser, ProviderError> {
        let response = self
            .client
            .get(self.url("/user_management/users/me"))
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::decode(response).await
    }
}
