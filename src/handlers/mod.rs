//! # API Handlers
//!
//! HTTP endpoint handlers for the orgsync API.

use crate::models::ServiceInfo;
use axum::response::Json;

pub mod callback;
pub mod health;
pub mod invitations;
pub mod members;
pub mod organizations;
pub mod webhooks;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}
