//! Identity provider webhook endpoint.
//!
//! Deliveries are verified against the shared signing secret before any
//! parsing happens. Unknown event types are acknowledged with 200 so the
//! provider does not retry them forever; reconciliation failures return 500
//! so the provider does retry.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use metrics::counter;

use crate::error::{self, ApiError};
use crate::reconciler::Reconciler;
use crate::repositories::UserProfile;
use crate::server::AppState;
use crate::webhook_verification::{
    SIGNATURE_HEADER, WebhookEnvelope, WebhookEvent, verify_signature,
};

/// Receive an identity provider webhook delivery
#[utoipa::path(
    post,
    path = "/webhooks/identity",
    responses(
        (status = 200, description = "Event applied or acknowledged"),
        (status = 400, description = "Malformed event payload", body = ApiError),
        (status = 401, description = "Missing or invalid signature", body = ApiError),
        (status = 500, description = "Reconciliation failed; delivery will be retried", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn identity_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let Some(secret) = state.config.webhook_secret.as_deref() else {
        tracing::error!("webhook delivery received but no signing secret is configured");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Webhook verification is not configured",
        ));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| error::unauthorized(Some("Missing webhook signature")))?;

    verify_signature(
        &body,
        signature,
        secret,
        state.config.webhook_tolerance_seconds,
    )
    .map_err(|err| {
        counter!("orgsync_webhook_events_total", "outcome" => "rejected").increment(1);
        error::unauthorized(Some(&err.to_string()))
    })?;

    let envelope: WebhookEnvelope = serde_json::from_slice(&body).map_err(|err| {
        error::validation_error(
            "Malformed webhook payload",
            serde_json::json!({ "error": err.to_string() }),
        )
    })?;

    let event = WebhookEvent::from_envelope(&envelope).map_err(|err| {
        error::validation_error(
            "Malformed event data",
            serde_json::json!({ "event": envelope.event, "error": err.to_string() }),
        )
    })?;

    counter!("orgsync_webhook_events_total", "outcome" => "accepted").increment(1);
    tracing::debug!(event_id = %envelope.id, event = %envelope.event, "processing webhook event");

    let reconciler = Reconciler::new(state.db.clone(), state.provider.clone());
    match event {
        WebhookEvent::UserCreated(data) | WebhookEvent::UserUpdated(data) => {
            reconciler
                .apply_user_upsert(&UserProfile {
                    id: data.id,
                    email: data.email,
                    first_name: data.first_name,
                    last_name: data.last_name,
                    avatar_url: data.profile_picture_url,
                })
                .await?;
        }
        WebhookEvent::OrganizationCreated(data) | WebhookEvent::OrganizationUpdated(data) => {
            reconciler
                .apply_organization_upsert(&data.id, &data.name)
                .await?;
        }
        WebhookEvent::MembershipCreated(data) => {
            reconciler.apply_membership_created(&data).await?;
        }
        WebhookEvent::MembershipDeleted(data) => {
            reconciler
                .apply_membership_deleted(&data.user_id, &data.organization_id)
                .await?;
        }
        WebhookEvent::InvitationAccepted(data) => {
            reconciler.apply_invitation_accepted(&data.id).await?;
        }
        WebhookEvent::Unrecognized { event } => {
            tracing::debug!(event_id = %envelope.id, event, "ignoring unhandled webhook event");
            counter!("orgsync_webhook_events_total", "outcome" => "ignored").increment(1);
        }
    }

    Ok(StatusCode::OK)
}
