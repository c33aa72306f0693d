//! Organization listing and selection endpoints.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::auth::{SessionContext, selected_org_cookie};
use crate::error::ApiError;
use crate::reconciler::Reconciler;
use crate::repositories::{MembershipRepository, OrganizationRepository};
use crate::server::AppState;

/// Organization the current user belongs to
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrganizationSummary {
    pub id: String,
    pub name: String,
    pub role: String,
    pub selected: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectOrganizationRequest {
    pub organization_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SelectedOrganizationResponse {
    pub organization_id: String,
}

/// List the current user's organizations
#[utoipa::path(
    get,
    path = "/organizations",
    responses(
        (status = 200, description = "Organizations the user belongs to", body = [OrganizationSummary]),
        (status = 401, description = "Not authenticated", body = ApiError)
    ),
    tag = "organizations"
)]
pub async fn list_organizations(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<Vec<OrganizationSummary>>, ApiError> {
    let memberships = MembershipRepository::new(&state.db)
        .list_for_user(&session.user.id)
        .await?;

    let org_ids: Vec<String> = memberships
        .iter()
        .map(|m| m.organization_id.clone())
        .collect();
    let names: HashMap<String, String> = OrganizationRepository::new(&state.db)
        .find_by_ids(&org_ids)
        .await?
        .into_iter()
        .map(|org| (org.id, org.name))
        .collect();

    let summaries = memberships
        .into_iter()
        .map(|m| OrganizationSummary {
            name: names.get(&m.organization_id).cloned().unwrap_or_default(),
            selected: session.selected_organization_id.as_deref() == Some(&m.organization_id),
            id: m.organization_id,
            role: m.role,
        })
        .collect();

    Ok(Json(summaries))
}

/// Switch the active organization
#[utoipa::path(
    post,
    path = "/organizations/select",
    request_body = SelectOrganizationRequest,
    responses(
        (status = 200, description = "Active organization updated", body = SelectedOrganizationResponse),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 404, description = "User has no organization memberships", body = ApiError)
    ),
    tag = "organizations"
)]
pub async fn select_organization(
    State(state): State<AppState>,
    session: SessionContext,
    Json(request): Json<SelectOrganizationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reconciler = Reconciler::new(state.db.clone(), state.provider.clone());
    let selected = reconciler
        .select_organization(&session.user.id, &request.organization_id)
        .await?;

    let mut headers = HeaderMap::new();
    let cookie = selected_org_cookie(&selected, state.config.cookie_secure());
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(header::SET_COOKIE, value);
    }

    Ok((
        headers,
        Json(SelectedOrganizationResponse {
            organization_id: selected,
        }),
    ))
}
