//! Per-collection access predicates.
//!
//! Every decision is one of allow, deny, or a tenant filter restricting
//! which existing records are visible or affected. Admin-tier global roles
//! are settled before the membership resolver is consulted.

use std::sync::Arc;

use sea_orm::{ColumnTrait, Condition};
use uuid::Uuid;

use super::membership::MembershipResolver;
use super::roles::TenantRole;
use super::{AuthenticatedUser, Caller};

/// Collections guarded by the access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Tenants,
    Events,
    Participants,
    Partners,
    EmailTemplates,
    ImageTemplates,
    EmailLogs,
    Invitations,
    Media,
}

impl Collection {
    /// Collections accepting anonymous create (public registration forms).
    pub fn allows_public_create(self) -> bool {
        matches!(
            self,
            Collection::Participants | Collection::Partners | Collection::Media
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

/// Restricts visible records to the listed tenants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TenantFilter {
    pub tenant_ids: Vec<Uuid>,
}

impl TenantFilter {
    /// SeaORM condition on the given tenant column. An empty filter matches
    /// nothing.
    pub fn condition<C: ColumnTrait>(&self, column: C) -> Condition {
        Condition::all().add(column.is_in(self.tenant_ids.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny,
    Filter(TenantFilter),
}

impl AccessDecision {
    /// Whether a record owned by `tenant_id` passes this decision.
    pub fn permits(&self, tenant_id: Uuid) -> bool {
        match self {
            AccessDecision::Allow => true,
            AccessDecision::Deny => false,
            AccessDecision::Filter(filter) => filter.tenant_ids.contains(&tenant_id),
        }
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, AccessDecision::Deny)
    }

    /// Condition for list queries; `None` means unrestricted.
    pub fn condition<C: ColumnTrait>(&self, column: C) -> Option<Condition> {
        match self {
            AccessDecision::Allow => None,
            AccessDecision::Deny => Some(TenantFilter::default().condition(column)),
            AccessDecision::Filter(filter) => Some(filter.condition(column)),
        }
    }
}

/// Access predicates backed by a membership resolver.
#[derive(Clone)]
pub struct AccessControl {
    resolver: Arc<dyn MembershipResolver>,
}

impl AccessControl {
    pub fn new(resolver: Arc<dyn MembershipResolver>) -> Self {
        Self { resolver }
    }

    /// Decide `action` on `collection`. `payload_tenant` is the tenant of the
    /// record being created and is only consulted for [`Action::Create`].
    pub async fn decide(
        &self,
        caller: &Caller,
        collection: Collection,
        action: Action,
        payload_tenant: Option<Uuid>,
    ) -> AccessDecision {
        let user = match caller {
            Caller::Anonymous => {
                return if action == Action::Create && collection.allows_public_create() {
                    AccessDecision::Allow
                } else {
                    AccessDecision::Deny
                };
            }
            Caller::User(user) => user,
        };

        if collection == Collection::EmailLogs {
            return self.email_log_decision(user, action).await;
        }

        if user.is_admin_tier() {
            return AccessDecision::Allow;
        }

        match (collection, action) {
            (Collection::Tenants, Action::Read) => self.filter(user, None).await,
            (Collection::Tenants, Action::Create) => AccessDecision::Allow,
            (Collection::Tenants, Action::Update) => {
                self.filter(user, Some(TenantRole::Admin)).await
            }
            (Collection::Tenants, Action::Delete) => {
                self.filter(user, Some(TenantRole::Owner)).await
            }

            (Collection::Invitations, Action::Create) => {
                self.create_for(user, payload_tenant, TenantRole::Admin)
                    .await
            }
            (Collection::Invitations, _) => self.filter(user, Some(TenantRole::Admin)).await,

            (Collection::Media, Action::Read | Action::Create) => AccessDecision::Allow,

            (_, Action::Read | Action::Delete) => self.filter(user, None).await,
            (_, Action::Create) => {
                self.create_for(user, payload_tenant, TenantRole::Editor)
                    .await
            }
            (_, Action::Update) => self.filter(user, Some(TenantRole::Editor)).await,
        }
    }

    pub async fn read(&self, caller: &Caller, collection: Collection) -> AccessDecision {
        self.decide(caller, collection, Action::Read, None).await
    }

    pub async fn create(
        &self,
        caller: &Caller,
        collection: Collection,
        payload_tenant: Option<Uuid>,
    ) -> AccessDecision {
        self.decide(caller, collection, Action::Create, payload_tenant)
            .await
    }

    pub async fn update(&self, caller: &Caller, collection: Collection) -> AccessDecision {
        self.decide(caller, collection, Action::Update, None).await
    }

    pub async fn delete(&self, caller: &Caller, collection: Collection) -> AccessDecision {
        self.decide(caller, collection, Action::Delete, None).await
    }

    /// Field-level check: only the owner (or a global admin) may change a
    /// tenant's outbound email configuration.
    pub async fn can_update_email_config(&self, caller: &Caller, tenant_id: Uuid) -> bool {
        let Some(user) = caller.user() else {
            return false;
        };
        if user.is_admin_tier() {
            return true;
        }
        self.resolver
            .tenant_ids(user.id, Some(TenantRole::Owner))
            .await
            .contains(&tenant_id)
    }

    async fn email_log_decision(&self, user: &AuthenticatedUser, action: Action) -> AccessDecision {
        match action {
            Action::Update | Action::Create => AccessDecision::Deny,
            Action::Delete if user.is_super_admin() => AccessDecision::Allow,
            Action::Delete => AccessDecision::Deny,
            Action::Read if user.is_admin_tier() => AccessDecision::Allow,
            Action::Read => self.filter(user, None).await,
        }
    }

    async fn filter(&self, user: &AuthenticatedUser, min_role: Option<TenantRole>) -> AccessDecision {
        AccessDecision::Filter(TenantFilter {
            tenant_ids: self.resolver.tenant_ids(user.id, min_role).await,
        })
    }

    async fn create_for(
        &self,
        user: &AuthenticatedUser,
        payload_tenant: Option<Uuid>,
        min_role: TenantRole,
    ) -> AccessDecision {
        let Some(tenant_id) = payload_tenant else {
            return AccessDecision::Deny;
        };

        if self
            .resolver
            .tenant_ids(user.id, Some(min_role))
            .await
            .contains(&tenant_id)
        {
            AccessDecision::Allow
        } else {
            AccessDecision::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::membership::TenantMembership;
    use crate::access::roles::GlobalRole;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StaticResolver {
        memberships: HashMap<Uuid, Vec<TenantMembership>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MembershipResolver for StaticResolver {
        async fn tenant_memberships(
            &self,
            user_id: Uuid,
            min_role: Option<TenantRole>,
        ) -> Vec<TenantMembership> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.memberships
                .get(&user_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|m| min_role.is_none_or(|required| m.role.satisfies(required)))
                .collect()
        }
    }

    fn user(roles: &[GlobalRole]) -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            roles: roles.to_vec(),
        }
    }

    fn control(resolver: StaticResolver) -> (AccessControl, Arc<StaticResolver>) {
        let resolver = Arc::new(resolver);
        (AccessControl::new(resolver.clone()), resolver)
    }

    #[tokio::test]
    async fn anonymous_only_creates_public_collections() {
        let (access, _) = control(StaticResolver::default());
        let caller = Caller::Anonymous;

        for collection in [Collection::Participants, Collection::Partners, Collection::Media] {
            assert_eq!(
                access.create(&caller, collection, None).await,
                AccessDecision::Allow
            );
            assert_eq!(access.read(&caller, collection).await, AccessDecision::Deny);
        }
        assert_eq!(
            access.create(&caller, Collection::Events, None).await,
            AccessDecision::Deny
        );
        assert_eq!(
            access.read(&caller, Collection::Tenants).await,
            AccessDecision::Deny
        );
    }

    #[tokio::test]
    async fn admin_tier_never_consults_resolver() {
        let (access, resolver) = control(StaticResolver::default());
        let caller = Caller::User(user(&[GlobalRole::Admin]));
        let tenant = Some(Uuid::new_v4());

        for collection in [
            Collection::Tenants,
            Collection::Events,
            Collection::Participants,
            Collection::Invitations,
        ] {
            for action in [Action::Read, Action::Create, Action::Update, Action::Delete] {
                assert_eq!(
                    access.decide(&caller, collection, action, tenant).await,
                    AccessDecision::Allow
                );
            }
        }
        assert!(access.can_update_email_config(&caller, Uuid::new_v4()).await);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn viewer_reads_but_cannot_mutate() {
        let viewer = user(&[GlobalRole::User]);
        let tenant = Uuid::new_v4();
        let mut memberships = HashMap::new();
        memberships.insert(
            viewer.id,
            vec![TenantMembership {
                tenant_id: tenant,
                role: TenantRole::Viewer,
            }],
        );
        let (access, _) = control(StaticResolver {
            memberships,
            ..Default::default()
        });
        let caller = Caller::User(viewer);

        assert!(access.read(&caller, Collection::Events).await.permits(tenant));
        assert!(access.delete(&caller, Collection::Events).await.permits(tenant));
        assert!(!access.update(&caller, Collection::Events).await.permits(tenant));
        assert_eq!(
            access
                .create(&caller, Collection::Events, Some(tenant))
                .await,
            AccessDecision::Deny
        );
    }

    #[tokio::test]
    async fn email_logs_are_append_only() {
        let (access, _) = control(StaticResolver::default());
        let super_admin = Caller::User(user(&[GlobalRole::SuperAdmin]));
        let admin = Caller::User(user(&[GlobalRole::Admin]));

        assert_eq!(
            access.update(&super_admin, Collection::EmailLogs).await,
            AccessDecision::Deny
        );
        assert_eq!(
            access.delete(&super_admin, Collection::EmailLogs).await,
            AccessDecision::Allow
        );
        assert_eq!(
            access.delete(&admin, Collection::EmailLogs).await,
            AccessDecision::Deny
        );
    }

    #[tokio::test]
    async fn only_owner_edits_email_config() {
        let member = user(&[GlobalRole::User]);
        let tenant = Uuid::new_v4();
        let mut memberships = HashMap::new();
        memberships.insert(
            member.id,
            vec![TenantMembership {
                tenant_id: tenant,
                role: TenantRole::Admin,
            }],
        );
        let (access, _) = control(StaticResolver {
            memberships,
            ..Default::default()
        });

        let caller = Caller::User(member);
        assert!(!access.can_update_email_config(&caller, tenant).await);
        assert!(access.update(&caller, Collection::Tenants).await.permits(tenant));
        assert!(!access.delete(&caller, Collection::Tenants).await.permits(tenant));
    }
}
