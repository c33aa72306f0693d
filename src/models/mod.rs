//! # Data Models
//!
//! SeaORM entity models for the local mirror of identity provider state.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod invitation;
pub mod membership;
pub mod organization;
pub mod user;

pub use invitation::Entity as Invitation;
pub use membership::Entity as Membership;
pub use organization::Entity as Organization;
pub use user::Entity as User;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "orgsync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
