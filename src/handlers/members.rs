//! Member management endpoints for the active organization.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::auth::SessionContext;
use crate::error::{ApiError, OrgError};
use crate::membership::MembershipManager;
use crate::repositories::{MembershipRepository, UserRepository};
use crate::server::AppState;

/// Member of the active organization
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemberResponse {
    pub user_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleUpdatedResponse {
    pub user_id: String,
    pub role: String,
}

fn manager(state: &AppState) -> MembershipManager {
    MembershipManager::new(
        state.db.clone(),
        state.provider.clone(),
        state.config.invitation_expiry_days,
    )
}

/// List members of the active organization
#[utoipa::path(
    get,
    path = "/organizations/members",
    responses(
        (status = 200, description = "Members of the active organization", body = [MemberResponse]),
        (status = 400, description = "No organization selected", body = ApiError),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 403, description = "Requester is not a member of the organization", body = ApiError)
    ),
    tag = "members"
)]
pub async fn list_members(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<Vec<MemberResponse>>, ApiError> {
    let organization_id = session.require_selected_org()?;

    let repo = MembershipRepository::new(&state.db);

    // The selected organization comes from a client-held cookie; the roster
    // is only visible to members of that organization.
    repo.find(&session.user.id, organization_id)
        .await?
        .ok_or_else(|| {
            OrgError::PermissionDenied("you are not a member of this organization".to_string())
        })?;

    let memberships = repo.list_for_organization(organization_id).await?;

    let user_ids: Vec<String> = memberships.iter().map(|m| m.user_id.clone()).collect();
    let users: HashMap<String, _> = UserRepository::new(&state.db)
        .find_by_ids(&user_ids)
        .await?
        .into_iter()
        .map(|user| (user.id.clone(), user))
        .collect();

    let members = memberships
        .into_iter()
        .map(|m| {
            let user = users.get(&m.user_id);
            MemberResponse {
                email: user.map(|u| u.email.clone()).unwrap_or_default(),
                first_name: user.and_then(|u| u.first_name.clone()),
                last_name: user.and_then(|u| u.last_name.clone()),
                user_id: m.user_id,
                role: m.role,
            }
        })
        .collect();

    Ok(Json(members))
}

/// Change a member's role
#[utoipa::path(
    patch,
    path = "/organizations/members/{user_id}",
    params(
        ("user_id" = String, Path, description = "Member's user id")
    ),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleUpdatedResponse),
        (status = 400, description = "Invalid role change", body = ApiError),
        (status = 403, description = "Requester may not change roles", body = ApiError),
        (status = 404, description = "Member not found", body = ApiError)
    ),
    tag = "members"
)]
pub async fn update_member_role(
    State(state): State<AppState>,
    session: SessionContext,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<RoleUpdatedResponse>, ApiError> {
    let organization_id = session.require_selected_org()?.to_string();

    let updated = manager(&state)
        .update_member_role(&organization_id, &session.user.id, &user_id, &request.role)
        .await?;

    Ok(Json(RoleUpdatedResponse {
        user_id: updated.user_id,
        role: updated.role,
    }))
}

/// Remove a member from the active organization
#[utoipa::path(
    delete,
    path = "/organizations/members/{user_id}",
    params(
        ("user_id" = String, Path, description = "Member's user id")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 400, description = "Removal not allowed for this member", body = ApiError),
        (status = 403, description = "Requester may not remove members", body = ApiError),
        (status = 404, description = "Member not found", body = ApiError)
    ),
    tag = "members"
)]
pub async fn remove_member(
    State(state): State<AppState>,
    session: SessionContext,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let organization_id = session.require_selected_org()?.to_string();

    manager(&state)
        .remove_member(&organization_id, &session.user.id, &user_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
