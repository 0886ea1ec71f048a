//! # Access Control
//!
//! Tenant-scoped role-based access control: the role hierarchy, the
//! membership resolver that answers "which tenants does this user belong
//! to", and the per-collection predicates built on both.

pub mod membership;
pub mod predicates;
pub mod roles;

use uuid::Uuid;

pub use membership::{MembershipResolver, SeaOrmMembershipResolver, TenantMembership};
pub use predicates::{AccessControl, AccessDecision, Action, Collection, TenantFilter};
pub use roles::{GlobalRole, Plan, TenantRole};

/// Identity of the caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(AuthenticatedUser),
}

/// Authenticated user as seen by the access layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
    pub roles: Vec<GlobalRole>,
}

impl AuthenticatedUser {
    pub fn is_admin_tier(&self) -> bool {
        roles::has_admin_tier(&self.roles)
    }

    pub fn is_super_admin(&self) -> bool {
        self.roles.contains(&GlobalRole::SuperAdmin)
    }
}

impl Caller {
    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            Caller::Anonymous => None,
            Caller::User(user) => Some(user),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user().map(|user| user.id)
    }
}

impl From<&crate::models::user::Model> for AuthenticatedUser {
    fn from(user: &crate::models::user::Model) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            roles: user.global_roles(),
        }
    }
}
