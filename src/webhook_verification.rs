//! Webhook signature verification and event decoding.
//!
//! The identity provider signs each delivery with
//! `X-Identity-Signature: t=<unix seconds>,v1=<hex hmac>` where the HMAC is
//! SHA-256 over `"{t}.{raw body}"`. Verification is constant-time and
//! rejects stale timestamps.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-identity-signature";

/// Errors surfaced during signature verification. All map to 401.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("signature header is malformed")]
    MalformedHeader,
    #[error("signature timestamp is invalid")]
    InvalidTimestamp,
    #[error("signature timestamp is outside the tolerance window")]
    StaleTimestamp,
    #[error("signature mismatch")]
    Mismatch,
}

impl VerificationError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        axum::http::StatusCode::UNAUTHORIZED
    }
}

/// Verify a webhook delivery against the shared secret.
pub fn verify_signature(
    body: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_seconds: u64,
) -> Result<(), VerificationError> {
    let (timestamp_str, signature_hex) = parse_header(signature_header)?;

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| VerificationError::InvalidTimestamp)?;
    let now = chrono::Utc::now().timestamp();
    if (now - timestamp).unsigned_abs() > tolerance_seconds {
        return Err(VerificationError::StaleTimestamp);
    }

    let provided =
        hex::decode(signature_hex).map_err(|_| VerificationError::MalformedHeader)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::Mismatch)?;
    mac.update(timestamp_str.as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    if expected.ct_eq(provided.as_slice()).into() {
        Ok(())
    } else {
        Err(VerificationError::Mismatch)
    }
}

fn parse_header(header: &str) -> Result<(&str, &str), VerificationError> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("t=") {
            timestamp = Some(value);
        } else if let Some(value) = part.strip_prefix("v1=") {
            signature = Some(value);
        }
    }

    match (timestamp, signature) {
        (Some(t), Some(v)) if !t.is_empty() && !v.is_empty() => Ok((t, v)),
        _ => Err(VerificationError::MalformedHeader),
    }
}

/// Compute the signature header value for a payload (used by tests and
/// local tooling).
pub fn sign_payload(body: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("t={},v1={}", timestamp, signature)
}

/// Raw webhook delivery envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// User payload carried by `user.*` events.
#[derive(Debug, Clone, Deserialize)]
pub struct UserEventData {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

/// Organization payload carried by `organization.*` events.
#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationEventData {
    pub id: String,
    pub name: String,
}

/// Membership payload carried by `organization_membership.*` events.
#[derive(Debug, Clone, Deserialize)]
pub struct MembershipEventData {
    pub id: String,
    pub user_id: String,
    pub organization_id: String,
    #[serde(default)]
    pub role: Option<RoleEventData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleEventData {
    pub slug: String,
}

/// Invitation payload carried by `invitation.*` events.
#[derive(Debug, Clone, Deserialize)]
pub struct InvitationEventData {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub organization_id: Option<String>,
}

/// Decoded webhook event.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    UserCreated(UserEventData),
    UserUpdated(UserEventData),
    OrganizationCreated(OrganizationEventData),
    OrganizationUpdated(OrganizationEventData),
    MembershipCreated(MembershipEventData),
    MembershipDeleted(MembershipEventData),
    InvitationAccepted(InvitationEventData),
    /// Event type this service does not handle; acknowledged without action.
    Unrecognized { event: String },
}

impl WebhookEvent {
    /// Decode the typed event from an envelope. Unknown event names are
    /// never an error.
    pub fn from_envelope(envelope: &WebhookEnvelope) -> Result<Self, serde_json::Error> {
        let data = envelope.data.clone();
        let event = match envelope.event.as_str() {
            "user.created" => WebhookEvent::UserCreated(serde_json::from_value(data)?),
            "user.updated" => WebhookEvent::UserUpdated(serde_json::from_value(data)?),
            "organization.created" => {
                WebhookEvent::OrganizationCreated(serde_json::from_value(data)?)
            }
            "organization.updated" => {
                WebhookEvent::OrganizationUpdated(serde_json::from_value(data)?)
            }
            "organization_membership.created" => {
                WebhookEvent::MembershipCreated(serde_json::from_value(data)?)
            }
            "organization_membership.deleted" => {
                WebhookEvent::MembershipDeleted(serde_json::from_value(data)?)
            }
            "invitation.accepted" => {
                WebhookEvent::InvitationAccepted(serde_json::from_value(data)?)
            }
            other => WebhookEvent::Unrecognized {
                event: other.to_string(),
            },
        };
        Ok(event)
    }
}
