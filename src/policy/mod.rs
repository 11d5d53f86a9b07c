//! Role and ownership checks for every resource operation.
//!
//! All handlers go through [`authorize`] / [`authorize_create`]; no handler
//! branches on roles by itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Publisher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Publisher => "publisher",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "publisher" => Some(Role::Publisher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a principal. Ownership is compared on this id only, never on
/// any other attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub Uuid);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: PrincipalId,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    /// Attach a child resource (e.g. a course) to this resource.
    AddChild,
}

impl Action {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Action::Update | Action::Delete | Action::AddChild)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotOwner,
    RoleForbidden,
    MissingOwner,
    AlreadyOwnsResource,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DenyReason::NotOwner => "not the owner of this resource",
            DenyReason::RoleForbidden => "role is not permitted to perform this action",
            DenyReason::MissingOwner => "resource has no owner",
            DenyReason::AlreadyOwnsResource => "already owns a resource of this kind",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

pub const ALL_ROLES: &[Role] = &[Role::User, Role::Publisher, Role::Admin];

/// Which roles may perform which action on one kind of resource.
#[derive(Debug)]
pub struct ResourcePolicy {
    pub collection: &'static str,
    pub read_roles: &'static [Role],
    pub create_roles: &'static [Role],
    pub mutate_roles: &'static [Role],
    pub child_roles: &'static [Role],
    /// Non-admin principals may own at most one resource of this kind.
    pub one_per_owner: bool,
}

impl ResourcePolicy {
    /// Whether the one-per-owner limit binds `principal`.
    pub fn limits_owner(&self, principal: &Principal) -> bool {
        self.one_per_owner && principal.role != Role::Admin
    }

    pub fn roles_for(&self, action: Action) -> &'static [Role] {
        match action {
            Action::Read => self.read_roles,
            Action::Create => self.create_roles,
            Action::Update | Action::Delete => self.mutate_roles,
            Action::AddChild => self.child_roles,
        }
    }
}

pub static BOOTCAMP_POLICY: ResourcePolicy = ResourcePolicy {
    collection: "bootcamps",
    read_roles: ALL_ROLES,
    create_roles: &[Role::Publisher, Role::Admin],
    mutate_roles: &[Role::Publisher, Role::Admin],
    child_roles: &[Role::Publisher, Role::Admin],
    one_per_owner: true,
};

pub static COURSE_POLICY: ResourcePolicy = ResourcePolicy {
    collection: "courses",
    read_roles: ALL_ROLES,
    create_roles: &[Role::Publisher, Role::Admin],
    mutate_roles: &[Role::Publisher, Role::Admin],
    child_roles: &[],
    one_per_owner: false,
};

pub static REVIEW_POLICY: ResourcePolicy = ResourcePolicy {
    collection: "reviews",
    read_roles: ALL_ROLES,
    create_roles: &[Role::User, Role::Admin],
    mutate_roles: &[Role::User, Role::Admin],
    child_roles: &[],
    one_per_owner: false,
};

/// Account management; a user record is owned by the account itself.
pub static USER_POLICY: ResourcePolicy = ResourcePolicy {
    collection: "users",
    read_roles: &[Role::Admin],
    create_roles: &[Role::Admin],
    mutate_roles: &[Role::Admin],
    child_roles: &[],
    one_per_owner: false,
};

/// Decides whether `principal` may perform `action` on a resource governed by
/// `policy` and owned by `owner`. Rules apply in order, first match wins.
pub fn authorize(
    principal: &Principal,
    action: Action,
    policy: &ResourcePolicy,
    owner: Option<PrincipalId>,
) -> Decision {
    if action.is_mutation() && owner.is_none() {
        return Decision::Denied(DenyReason::MissingOwner);
    }
    if principal.role == Role::Admin {
        return Decision::Allowed;
    }
    if action.is_mutation() && owner != Some(principal.id) {
        return Decision::Denied(DenyReason::NotOwner);
    }
    if !policy.roles_for(action).contains(&principal.role) {
        return Decision::Denied(DenyReason::RoleForbidden);
    }
    Decision::Allowed
}

/// Creation check. `already_owned` is whether the principal owns a resource
/// of this kind at the time of the request.
pub fn authorize_create(principal: &Principal, policy: &ResourcePolicy, already_owned: bool) -> Decision {
    match authorize(principal, Action::Create, policy, None) {
        Decision::Allowed => {}
        denied => return denied,
    }
    if already_owned && policy.limits_owner(principal) {
        return Decision::Denied(DenyReason::AlreadyOwnsResource);
    }
    Decision::Allowed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal { id: PrincipalId(Uuid::new_v4()), role }
    }

    #[test]
    fn owner_may_update() {
        let owner = principal(Role::Publisher);
        assert_eq!(authorize(&owner, Action::Update, &BOOTCAMP_POLICY, Some(owner.id)), Decision::Allowed);
    }

    #[test]
    fn other_principal_is_not_owner() {
        let owner = principal(Role::Publisher);
        let other = principal(Role::Publisher);
        assert_eq!(
            authorize(&other, Action::Update, &BOOTCAMP_POLICY, Some(owner.id)),
            Decision::Denied(DenyReason::NotOwner)
        );
        assert_eq!(
            authorize(&other, Action::Delete, &BOOTCAMP_POLICY, Some(owner.id)),
            Decision::Denied(DenyReason::NotOwner)
        );
    }

    #[test]
    fn identical_attributes_do_not_make_an_owner() {
        let owner = principal(Role::User);
        let twin = Principal { id: PrincipalId(Uuid::new_v4()), role: owner.role };
        assert_eq!(
            authorize(&twin, Action::Update, &REVIEW_POLICY, Some(owner.id)),
            Decision::Denied(DenyReason::NotOwner)
        );
    }

    #[test]
    fn admin_bypasses_ownership() {
        let owner = principal(Role::Publisher);
        let admin = principal(Role::Admin);
        assert_eq!(authorize(&admin, Action::Update, &BOOTCAMP_POLICY, Some(owner.id)), Decision::Allowed);
        assert_eq!(authorize(&admin, Action::AddChild, &BOOTCAMP_POLICY, Some(owner.id)), Decision::Allowed);
    }

    #[test]
    fn missing_owner_denies_every_mutation() {
        let admin = principal(Role::Admin);
        assert_eq!(
            authorize(&admin, Action::Delete, &BOOTCAMP_POLICY, None),
            Decision::Denied(DenyReason::MissingOwner)
        );
        assert_eq!(authorize(&admin, Action::Read, &BOOTCAMP_POLICY, None), Decision::Allowed);
    }

    #[test]
    fn owner_without_role_is_forbidden() {
        // a plain user who somehow owns a bootcamp still may not edit it
        let owner = principal(Role::User);
        assert_eq!(
            authorize(&owner, Action::Update, &BOOTCAMP_POLICY, Some(owner.id)),
            Decision::Denied(DenyReason::RoleForbidden)
        );
    }

    #[test]
    fn create_requires_role() {
        assert_eq!(
            authorize_create(&principal(Role::User), &BOOTCAMP_POLICY, false),
            Decision::Denied(DenyReason::RoleForbidden)
        );
        assert_eq!(authorize_create(&principal(Role::Publisher), &BOOTCAMP_POLICY, false), Decision::Allowed);
        assert_eq!(
            authorize_create(&principal(Role::Publisher), &REVIEW_POLICY, false),
            Decision::Denied(DenyReason::RoleForbidden)
        );
    }

    #[test]
    fn second_top_level_resource_is_denied() {
        assert_eq!(
            authorize_create(&principal(Role::Publisher), &BOOTCAMP_POLICY, true),
            Decision::Denied(DenyReason::AlreadyOwnsResource)
        );
        assert_eq!(authorize_create(&principal(Role::Admin), &BOOTCAMP_POLICY, true), Decision::Allowed);
        // reviews are not limited to one per owner
        assert_eq!(authorize_create(&principal(Role::User), &REVIEW_POLICY, true), Decision::Allowed);
    }

    #[test]
    fn user_management_is_admin_only() {
        let user = principal(Role::User);
        assert_eq!(
            authorize(&user, Action::Read, &USER_POLICY, Some(user.id)),
            Decision::Denied(DenyReason::RoleForbidden)
        );
        assert_eq!(
            authorize(&user, Action::Update, &USER_POLICY, Some(user.id)),
            Decision::Denied(DenyReason::RoleForbidden)
        );
        assert_eq!(authorize(&principal(Role::Admin), Action::Read, &USER_POLICY, None), Decision::Allowed);
    }
}
