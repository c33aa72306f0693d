//! User entity model
//!
//! Mirrors identity provider users. The primary key is the provider-issued
//! user id, so no local id generation happens here.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;

/// User row synced from the identity provider
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Provider-issued user id (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub email: String,

    pub first_name: Option<String>,

    pub last_name: Option<String>,

    pub avatar_url: Option<String>,

    /// Organization the user last selected as active, if any
    pub selected_organization_id: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,

    pub deleted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
