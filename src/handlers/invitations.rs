//! Invitation endpoints for the active organization.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::SessionContext;
use crate::error::{ApiError, OrgError};
use crate::membership::MembershipManager;
use crate::models::invitation;
use crate::repositories::{InvitationRepository, MembershipRepository};
use crate::server::AppState;

/// Invitation to join the active organization
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvitationResponse {
    pub id: String,
    pub email: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub expires_at: Option<DateTimeWithTimeZone>,
}

impl From<invitation::Model> for InvitationResponse {
    fn from(model: invitation::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            status: model.status,
            expires_at: model.expires_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendInvitationRequest {
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
}

fn manager(state: &AppState) -> MembershipManager {
    MembershipManager::new(
        state.db.clone(),
        state.provider.clone(),
        state.config.invitation_expiry_days,
    )
}

/// List pending invitations for the active organization. Readable by any
/// member; only creating and revoking are restricted to owners and admins.
#[utoipa::path(
    get,
    path = "/organizations/invitations",
    responses(
        (status = 200, description = "Pending invitations", body = [InvitationResponse]),
        (status = 400, description = "No organization selected", body = ApiError),
        (status = 403, description = "Requester is not a member of the organization", body = ApiError)
    ),
    tag = "invitations"
)]
pub async fn list_invitations(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<Vec<InvitationResponse>>, ApiError> {
    let organization_id = session.require_selected_org()?;

    MembershipRepository::new(&state.db)
        .find(&session.user.id, organization_id)
        .await?
        .ok_or_else(|| {
            OrgError::PermissionDenied("you are not a member of this organization".to_string())
        })?;

    let invitations = InvitationRepository::new(&state.db)
        .list_pending_for_organization(organization_id)
        .await?;

    Ok(Json(
        invitations.into_iter().map(InvitationResponse::from).collect(),
    ))
}

/// Invite a user to the active organization
#[utoipa::path(
    post,
    path = "/organizations/invitations",
    request_body = SendInvitationRequest,
    responses(
        (status = 201, description = "Invitation sent", body = InvitationResponse),
        (status = 400, description = "Invalid invitation request", body = ApiError),
        (status = 403, description = "Requester may not invite", body = ApiError),
        (status = 409, description = "An invitation is already pending for this email", body = ApiError)
    ),
    tag = "invitations"
)]
pub async fn send_invitation(
    State(state): State<AppState>,
    session: SessionContext,
    Json(request): Json<SendInvitationRequest>,
) -> Result<(StatusCode, Json<InvitationResponse>), ApiError> {
    let organization_id = session.require_selected_org()?.to_string();

    let stored = manager(&state)
        .send_invitation(
            &organization_id,
            &session.user.id,
            &request.email,
            request.role.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(stored.into())))
}

/// Revoke a pending invitation
#[utoipa::path(
    delete,
    path = "/organizations/invitations/{invitation_id}",
    params(
        ("invitation_id" = String, Path, description = "Invitation id")
    ),
    responses(
        (status = 204, description = "Invitation revoked (or already revoked)"),
        (status = 400, description = "Invitation is in a terminal state", body = ApiError),
        (status = 403, description = "Requester may not revoke invitations", body = ApiError),
        (status = 404, description = "Invitation not found", body = ApiError)
    ),
    tag = "invitations"
)]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    session: SessionContext,
    Path(invitation_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let organization_id = session.require_selected_org()?.to_string();

    manager(&state)
        .revoke_invitation(&organization_id, &session.user.id, &invitation_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
