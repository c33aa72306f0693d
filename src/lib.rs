//! Orgsync service library.
//!
//! Mirrors an external identity provider's users, organizations,
//! memberships and invitations into a local relational store, and exposes
//! an HTTP API for organization selection and member management.

pub mod auth;
pub mod authz;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod membership;
pub mod models;
pub mod provider;
pub mod reconciler;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod webhook_verification;

pub use migration;
