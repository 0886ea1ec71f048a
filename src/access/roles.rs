//! Role hierarchy.
//!
//! Tenant-scoped roles are ranked owner (4) > admin (3) > editor (2) >
//! viewer (1). Global roles sit outside the hierarchy; `super-admin` and
//! `admin` satisfy every tenant-scoped check.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseRoleError {
    kind: &'static str,
    value: String,
}

impl ParseRoleError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Tenant-scoped role, ordered by rank.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum TenantRole {
    Viewer,
    Editor,
    Admin,
    Owner,
}

impl TenantRole {
    pub fn rank(self) -> u8 {
        match self {
            TenantRole::Viewer => 1,
            TenantRole::Editor => 2,
            TenantRole::Admin => 3,
            TenantRole::Owner => 4,
        }
    }

    /// Whether this role meets or exceeds `required`.
    pub fn satisfies(self, required: TenantRole) -> bool {
        satisfies(self.rank(), required)
    }

    /// Roles that may be stored on a member row or granted by invitation.
    pub fn is_assignable(self) -> bool {
        !matches!(self, TenantRole::Owner)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TenantRole::Viewer => "viewer",
            TenantRole::Editor => "editor",
            TenantRole::Admin => "admin",
            TenantRole::Owner => "owner",
        }
    }
}

impl FromStr for TenantRole {
    type Err = ParseRoleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(TenantRole::Viewer),
            "editor" => Ok(TenantRole::Editor),
            "admin" => Ok(TenantRole::Admin),
            "owner" => Ok(TenantRole::Owner),
            _ => Err(ParseRoleError::new("tenant role", value)),
        }
    }
}

impl fmt::Display for TenantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `user_rank >= required.rank()`
pub fn satisfies(user_rank: u8, required: TenantRole) -> bool {
    user_rank >= required.rank()
}

/// User-level role independent of any tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum GlobalRole {
    SuperAdmin,
    Admin,
    User,
}

impl GlobalRole {
    pub fn as_str(self) -> &'static str {
        match self {
            GlobalRole::SuperAdmin => "super-admin",
            GlobalRole::Admin => "admin",
            GlobalRole::User => "user",
        }
    }

    /// Global roles that bypass tenant-scoped checks.
    pub fn is_admin_tier(self) -> bool {
        matches!(self, GlobalRole::SuperAdmin | GlobalRole::Admin)
    }
}

impl FromStr for GlobalRole {
    type Err = ParseRoleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "super-admin" => Ok(GlobalRole::SuperAdmin),
            "admin" => Ok(GlobalRole::Admin),
            "user" => Ok(GlobalRole::User),
            _ => Err(ParseRoleError::new("global role", value)),
        }
    }
}

impl fmt::Display for GlobalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when any role in the set bypasses tenant checks.
pub fn has_admin_tier(roles: &[GlobalRole]) -> bool {
    roles.iter().any(|role| role.is_admin_tier())
}

/// Pricing plan bounding the number of owned tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Unlimited,
}

impl Plan {
    /// `None` means no limit.
    pub fn max_owned_tenants(self) -> Option<u64> {
        match self {
            Plan::Free => Some(1),
            Plan::Pro => Some(5),
            Plan::Unlimited => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Unlimited => "unlimited",
        }
    }
}

impl FromStr for Plan {
    type Err = ParseRoleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            "unlimited" => Ok(Plan::Unlimited),
            _ => Err(ParseRoleError::new("plan", value)),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoleSetError {
    #[error("a user must have at least one role")]
    Empty,
}

/// Deduplicates the role set and forces `unlimited` for admin-tier users.
pub fn normalize_roles_and_plan(
    roles: &[GlobalRole],
    plan: Plan,
) -> Result<(Vec<GlobalRole>, Plan), RoleSetError> {
    let mut normalized: Vec<GlobalRole> = Vec::with_capacity(roles.len());
    for role in roles {
        if !normalized.contains(role) {
            normalized.push(*role);
        }
    }

    if normalized.is_empty() {
        return Err(RoleSetError::Empty);
    }

    let plan = if has_admin_tier(&normalized) {
        Plan::Unlimited
    } else {
        plan
    };

    Ok((normalized, plan))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TenantRole; 4] = [
        TenantRole::Viewer,
        TenantRole::Editor,
        TenantRole::Admin,
        TenantRole::Owner,
    ];

    #[test]
    fn ranks_are_four_to_one() {
        assert_eq!(TenantRole::Owner.rank(), 4);
        assert_eq!(TenantRole::Admin.rank(), 3);
        assert_eq!(TenantRole::Editor.rank(), 2);
        assert_eq!(TenantRole::Viewer.rank(), 1);
    }

    #[test]
    fn satisfaction_is_monotonic() {
        for user in ALL {
            for low in ALL {
                for high in ALL {
                    if low.rank() <= high.rank() && user.satisfies(high) {
                        assert!(
                            user.satisfies(low),
                            "{user} satisfies {high} but not {low}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn viewer_cannot_satisfy_editor() {
        assert!(!TenantRole::Viewer.satisfies(TenantRole::Editor));
        assert!(TenantRole::Editor.satisfies(TenantRole::Editor));
        assert!(TenantRole::Owner.satisfies(TenantRole::Admin));
    }

    #[test]
    fn roles_parse_from_slugs() {
        assert_eq!("Editor".parse::<TenantRole>(), Ok(TenantRole::Editor));
        assert_eq!("super-admin".parse::<GlobalRole>(), Ok(GlobalRole::SuperAdmin));
        assert!("root".parse::<GlobalRole>().is_err());
        assert!(!TenantRole::Owner.is_assignable());
    }

    #[test]
    fn admin_tier_forces_unlimited_plan() {
        let (roles, plan) =
            normalize_roles_and_plan(&[GlobalRole::Admin, GlobalRole::Admin], Plan::Free).unwrap();
        assert_eq!(roles, vec![GlobalRole::Admin]);
        assert_eq!(plan, Plan::Unlimited);

        let (_, plan) = normalize_roles_and_plan(&[GlobalRole::User], Plan::Pro).unwrap();
        assert_eq!(plan, Plan::Pro);
    }

    #[test]
    fn empty_role_set_is_rejected() {
        assert_eq!(
            normalize_roles_and_plan(&[], Plan::Free),
            Err(RoleSetError::Empty)
        );
    }

    #[test]
    fn plan_limits() {
        assert_eq!(Plan::Free.max_owned_tenants(), Some(1));
        assert_eq!(Plan::Pro.max_owned_tenants(), Some(5));
        assert_eq!(Plan::Unlimited.max_owned_tenants(), None);
    }
}
