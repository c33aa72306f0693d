//! Database migrations for the orgsync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_01_10_000001_create_organizations;
mod m2025_01_10_000002_create_users;
mod m2025_01_10_000003_create_organization_members;
mod m2025_01_10_000004_create_invitations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_10_000001_create_organizations::Migration),
            Box::new(m2025_01_10_000002_create_users::Migration),
            Box::new(m2025_01_10_000003_create_organization_members::Migration),
            Box::new(m2025_01_10_000004_create_invitations::Migration),
        ]
    }
}
