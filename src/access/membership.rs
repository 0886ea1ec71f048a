//! Tenant membership resolution.
//!
//! Every access predicate consults this module to learn which tenants a
//! user belongs to and at what rank. Query failures resolve to an empty
//! membership list so callers deny access.

use std::collections::HashMap;

use async_trait::async_trait;
use metrics::counter;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait,
};
use tracing::{error, warn};
use uuid::Uuid;

use super::roles::TenantRole;
use crate::models::tenant::{self, Entity as Tenant};
use crate::models::tenant_member::{self, Entity as TenantMember};

/// A tenant the user belongs to and the effective role there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantMembership {
    pub tenant_id: Uuid,
    pub role: TenantRole,
}

/// Source of truth for tenant membership.
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    /// All tenants where `user_id` is owner or member, optionally limited to
    /// memberships meeting `min_role`. Each tenant appears once.
    async fn tenant_memberships(
        &self,
        user_id: Uuid,
        min_role: Option<TenantRole>,
    ) -> Vec<TenantMembership>;

    async fn tenant_ids(&self, user_id: Uuid, min_role: Option<TenantRole>) -> Vec<Uuid> {
        self.tenant_memberships(user_id, min_role)
            .await
            .into_iter()
            .map(|membership| membership.tenant_id)
            .collect()
    }
}

/// Resolver backed by the `tenants` and `tenant_members` tables.
#[derive(Clone)]
pub struct SeaOrmMembershipResolver {
    db: DatabaseConnection,
    limit: u64,
}

impl SeaOrmMembershipResolver {
    pub fn new(db: DatabaseConnection, limit: u64) -> Self {
        Self {
            db,
            limit: limit.max(1),
        }
    }

    async fn load(&self, user_id: Uuid) -> Result<Vec<TenantMembership>, DbErr> {
        let member_tenants = TenantMember::find()
            .select_only()
            .column(tenant_member::Column::TenantId)
            .filter(tenant_member::Column::UserId.eq(user_id))
            .into_query();

        let tenants: Vec<(Uuid, Uuid)> = Tenant::find()
            .select_only()
            .column(tenant::Column::Id)
            .column(tenant::Column::OwnerId)
            .filter(
                Condition::any()
                    .add(tenant::Column::OwnerId.eq(user_id))
                    .add(tenant::Column::Id.in_subquery(member_tenants)),
            )
            .order_by_asc(tenant::Column::CreatedAt)
            .limit(self.limit)
            .into_tuple()
            .all(&self.db)
            .await?;

        if tenants.is_empty() {
            return Ok(Vec::new());
        }

        let tenant_ids: Vec<Uuid> = tenants.iter().map(|(id, _)| *id).collect();
        let member_rows = TenantMember::find()
            .filter(tenant_member::Column::UserId.eq(user_id))
            .filter(tenant_member::Column::TenantId.is_in(tenant_ids))
            .all(&self.db)
            .await?;

        Ok(classify(user_id, &tenants, &member_rows))
    }
}

#[async_trait]
impl MembershipResolver for SeaOrmMembershipResolver {
    async fn tenant_memberships(
        &self,
        user_id: Uuid,
        min_role: Option<TenantRole>,
    ) -> Vec<TenantMembership> {
        match self.load(user_id).await {
            Ok(memberships) => filter_min_role(memberships, min_role),
            Err(err) => {
                counter!("membership_resolution_failures_total").increment(1);
                error!(user_id = %user_id, error = %err, "Failed to resolve tenant memberships");
                Vec::new()
            }
        }
    }
}

/// Classifies `(tenant_id, owner_id)` rows for `user_id`.
///
/// Owners rank 4 unconditionally. When a user is somehow both owner and
/// member of a tenant the higher rank wins, and a tenant is never listed
/// twice. Output order follows `tenants`.
pub fn classify(
    user_id: Uuid,
    tenants: &[(Uuid, Uuid)],
    members: &[tenant_member::Model],
) -> Vec<TenantMembership> {
    let mut member_roles: HashMap<Uuid, TenantRole> = HashMap::new();
    for member in members.iter().filter(|m| m.user_id == Some(user_id)) {
        match member.role.parse::<TenantRole>() {
            Ok(role) => {
                let entry = member_roles.entry(member.tenant_id).or_insert(role);
                if role > *entry {
                    *entry = role;
                }
            }
            Err(err) => {
                warn!(tenant_id = %member.tenant_id, error = %err, "Ignoring member row with invalid role");
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    let mut memberships = Vec::with_capacity(tenants.len());

    for (tenant_id, owner_id) in tenants {
        if !seen.insert(*tenant_id) {
            continue;
        }

        let owner_role = (*owner_id == user_id).then_some(TenantRole::Owner);
        let member_role = member_roles.get(tenant_id).copied();

        if let Some(role) = owner_role.max(member_role) {
            memberships.push(TenantMembership {
                tenant_id: *tenant_id,
                role,
            });
        }
    }

    memberships
}

fn filter_min_role(
    memberships: Vec<TenantMembership>,
    min_role: Option<TenantRole>,
) -> Vec<TenantMembership> {
    match min_role {
        Some(required) => memberships
            .into_iter()
            .filter(|membership| membership.role.satisfies(required))
            .collect(),
        None => memberships,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn member(tenant_id: Uuid, user_id: Uuid, role: &str) -> tenant_member::Model {
        tenant_member::Model {
            id: Uuid::new_v4(),
            tenant_id,
            user_id: Some(user_id),
            email: None,
            role: role.to_string(),
            position: 0,
            created_at: Utc::now().fixed_offset(),
        }
    }

    #[test]
    fn owner_ranks_four_even_with_member_row() {
        let user = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let memberships = classify(user, &[(tenant, user)], &[member(tenant, user, "viewer")]);

        assert_eq!(
            memberships,
            vec![TenantMembership {
                tenant_id: tenant,
                role: TenantRole::Owner
            }]
        );
    }

    #[test]
    fn duplicate_tenant_rows_collapse() {
        let user = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let memberships = classify(
            user,
            &[(tenant, owner), (tenant, owner)],
            &[member(tenant, user, "viewer"), member(tenant, user, "admin")],
        );

        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].role, TenantRole::Admin);
    }

    #[test]
    fn tenants_without_attribution_are_skipped() {
        let user = Uuid::new_v4();
        let memberships = classify(user, &[(Uuid::new_v4(), Uuid::new_v4())], &[]);
        assert!(memberships.is_empty());
    }

    #[test]
    fn min_role_filter_drops_lower_ranks() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let memberships = vec![
            TenantMembership {
                tenant_id: a,
                role: TenantRole::Viewer,
            },
            TenantMembership {
                tenant_id: b,
                role: TenantRole::Editor,
            },
        ];

        let filtered = filter_min_role(memberships, Some(TenantRole::Editor));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].tenant_id, b);
    }
}
