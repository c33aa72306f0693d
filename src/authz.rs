//! Role-based authorization rules for membership and invitation mutations.
//!
//! Rules:
//! - owners and admins manage members and invitations
//! - only an owner may change roles, and never to or from owner
//! - an owner can never be removed
//! - an admin cannot remove another admin
//! - nobody removes themselves through the members API

use crate::error::OrgError;

/// Membership role. Unknown slugs degrade to [`Role::Member`] so a new
/// provider role never grants privileges by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "owner" => Role::Owner,
            "admin" => Role::Admin,
            _ => Role::Member,
        }
    }

    /// Whether this role may manage members and invitations.
    pub fn can_manage_members(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

/// Check that `requester` may remove the member holding `target` role.
pub fn check_remove_member(
    requester_user_id: &str,
    requester: Role,
    target_user_id: &str,
    target: Role,
) -> Result<(), OrgError> {
    if requester_user_id == target_user_id {
        return Err(OrgError::InvalidOperation(
            "cannot remove yourself from the organization".to_string(),
        ));
    }
    if !requester.can_manage_members() {
        return Err(OrgError::PermissionDenied(
            "only owners and admins can remove members".to_string(),
        ));
    }
    if target == Role::Owner {
        return Err(OrgError::InvalidOperation(
            "the organization owner cannot be removed".to_string(),
        ));
    }
    if requester == Role::Admin && target == Role::Admin {
        return Err(OrgError::PermissionDenied(
            "admins cannot remove other admins".to_string(),
        ));
    }
    Ok(())
}

/// Check that `requester` may change the target's role to `new_role`.
pub fn check_update_role(requester: Role, target: Role, new_role: Role) -> Result<(), OrgError> {
    if requester != Role::Owner {
        return Err(OrgError::PermissionDenied(
            "only the owner can change member roles".to_string(),
        ));
    }
    if target == Role::Owner {
        return Err(OrgError::InvalidOperation(
            "the owner role cannot be changed".to_string(),
        ));
    }
    if new_role == Role::Owner {
        return Err(OrgError::InvalidOperation(
            "ownership cannot be assigned through role updates".to_string(),
        ));
    }
    Ok(())
}

/// Check that `requester` may create or revoke invitations.
pub fn check_invitation_access(requester: Role) -> Result<(), OrgError> {
    if !requester.can_manage_members() {
        return Err(OrgError::PermissionDenied(
            "only owners and admins can manage invitations".to_string(),
        ));
    }
    Ok(())
}
