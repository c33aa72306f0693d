//! # Repositories
//!
//! Data access layer over the mirrored identity tables. Each repository
//! borrows a [`sea_orm::DatabaseConnection`] and keeps conflict handling
//! close to the SQL: insert races on unique keys are absorbed by refetching
//! the winning row instead of surfacing an error.

pub mod invitation;
pub mod membership;
pub mod organization;
pub mod user;

pub use invitation::{InvitationRepository, NewInvitation, TransitionOutcome};
pub use membership::MembershipRepository;
pub use organization::OrganizationRepository;
pub use user::{UserProfile, UserRepository};
