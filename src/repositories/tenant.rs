//! # Tenant Repository
//!
//! Tenant CRUD plus the ordered member list. The owner is fixed at creation
//! and is never stored as a member row.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    ModelTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::info;
use uuid::Uuid;

use super::{normalize_email, require_text, slugify};
use crate::access::roles::TenantRole;
use crate::error::RepositoryError;
use crate::models::tenant::{ActiveModel, Column, Entity as Tenant, Model};
use crate::models::tenant_member::{
    self, ActiveModel as MemberActiveModel, Entity as TenantMember, Model as MemberModel,
};
use crate::models::user;

#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub slug: Option<String>,
}

/// Custom outbound email configuration; `None` clears a field.
#[derive(Debug, Clone, Default)]
pub struct EmailConfig {
    pub from_address: Option<String>,
    pub from_name: Option<String>,
    pub reply_to: Option<String>,
}

/// Member reference: a registered user or a pending email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRef {
    User(Uuid),
    Email(String),
}

pub struct TenantRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TenantRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates a tenant owned by `owner`, enforcing the owner's plan limit.
    pub async fn create(
        &self,
        owner: &user::Model,
        request: NewTenant,
    ) -> Result<Model, RepositoryError> {
        let name = require_text("name", &request.name, 255)?;
        let slug = slugify(request.slug.as_deref().unwrap_or(&name));
        if slug.is_empty() {
            return Err(RepositoryError::validation(
                "slug",
                "must contain at least one letter or digit",
            ));
        }

        if let Some(limit) = owner.plan().max_owned_tenants() {
            let owned = super::UserRepository::new(self.db)
                .owned_tenant_count(owner.id)
                .await?;
            if owned >= limit {
                return Err(RepositoryError::LimitExceeded(format!(
                    "The {} plan allows at most {} owned tenant(s)",
                    owner.plan().as_str(),
                    limit
                )));
            }
        }

        let now = Utc::now().fixed_offset();
        let tenant = ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            slug: Set(slug),
            owner_id: Set(owner.id),
            email_from_address: Set(None),
            email_from_name: Set(None),
            email_reply_to: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = tenant.insert(self.db).await.map_err(|err| {
            match RepositoryError::database_error(err) {
                RepositoryError::Conflict(_) => {
                    RepositoryError::Conflict("Tenant slug already taken".to_string())
                }
                other => other,
            }
        })?;

        info!(tenant_id = %created.id, owner_id = %owner.id, "Tenant created");
        Ok(created)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, RepositoryError> {
        Tenant::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn get(&self, id: Uuid) -> Result<Model, RepositoryError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))
    }

    /// Lists tenants, optionally restricted by an access condition.
    pub async fn list(&self, condition: Option<Condition>) -> Result<Vec<Model>, RepositoryError> {
        let mut query = Tenant::find().order_by_asc(Column::CreatedAt);
        if let Some(condition) = condition {
            query = query.filter(condition);
        }
        query
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn rename(&self, id: Uuid, name: &str) -> Result<Model, RepositoryError> {
        let name = require_text("name", name, 255)?;
        let mut active = self.get(id).await?.into_active_model();
        active.name = Set(name);
        active.updated_at = Set(Utc::now().fixed_offset());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn update_email_config(
        &self,
        id: Uuid,
        config: EmailConfig,
    ) -> Result<Model, RepositoryError> {
        let from_address = config
            .from_address
            .as_deref()
            .map(|address| normalize_email("email_from_address", address))
            .transpose()?;
        let reply_to = config
            .reply_to
            .as_deref()
            .map(|address| normalize_email("email_reply_to", address))
            .transpose()?;
        let from_name = config
            .from_name
            .as_deref()
            .map(|name| require_text("email_from_name", name, 255))
            .transpose()?;

        let mut active = self.get(id).await?.into_active_model();
        active.email_from_address = Set(from_address);
        active.email_from_name = Set(from_name);
        active.email_reply_to = Set(reply_to);
        active.updated_at = Set(Utc::now().fixed_offset());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let tenant = self.get(id).await?;
        tenant
            .delete(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        info!(tenant_id = %id, "Tenant deleted");
        Ok(())
    }

    pub async fn list_members(&self, tenant_id: Uuid) -> Result<Vec<MemberModel>, RepositoryError> {
        TenantMember::find()
            .filter(tenant_member::Column::TenantId.eq(tenant_id))
            .order_by_asc(tenant_member::Column::Position)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Adds a member, or updates the role of an existing entry for the same
    /// user or email. Concurrent writers are last-write-wins.
    pub async fn upsert_member(
        &self,
        tenant_id: Uuid,
        member: MemberRef,
        role: TenantRole,
    ) -> Result<MemberModel, RepositoryError> {
        if !role.is_assignable() {
            return Err(RepositoryError::validation(
                "role",
                "must be one of admin, editor, viewer",
            ));
        }

        let tenant = self.get(tenant_id).await?;

        let (user_id, email, lookup) = match member {
            MemberRef::User(user_id) => {
                if user_id == tenant.owner_id {
                    return Err(RepositoryError::validation(
                        "user_id",
                        "the tenant owner cannot be added as a member",
                    ));
                }
                (
                    Some(user_id),
                    None,
                    tenant_member::Column::UserId.eq(user_id),
                )
            }
            MemberRef::Email(email) => {
                let email = normalize_email("email", &email)?;
                let lookup = tenant_member::Column::Email.eq(email.clone());
                (None, Some(email), lookup)
            }
        };

        let existing = TenantMember::find()
            .filter(tenant_member::Column::TenantId.eq(tenant_id))
            .filter(lookup)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        if let Some(existing) = existing {
            let mut active = existing.into_active_model();
            active.role = Set(role.as_str().to_string());
            return active
                .update(self.db)
                .await
                .map_err(RepositoryError::database_error);
        }

        let position = self.next_position(tenant_id).await?;
        let member = MemberActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            user_id: Set(user_id),
            email: Set(email),
            role: Set(role.as_str().to_string()),
            position: Set(position),
            created_at: Set(Utc::now().fixed_offset()),
        };

        member
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Binds a pending email entry to a newly registered user, returning the
    /// updated row when one existed.
    pub async fn claim_email_member(
        &self,
        tenant_id: Uuid,
        email: &str,
        user_id: Uuid,
        role: TenantRole,
    ) -> Result<Option<MemberModel>, RepositoryError> {
        let pending = TenantMember::find()
            .filter(tenant_member::Column::TenantId.eq(tenant_id))
            .filter(tenant_member::Column::UserId.is_null())
            .filter(tenant_member::Column::Email.eq(email.trim().to_lowercase()))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        let Some(pending) = pending else {
            return Ok(None);
        };

        let mut active = pending.into_active_model();
        active.user_id = Set(Some(user_id));
        active.role = Set(role.as_str().to_string());
        active
            .update(self.db)
            .await
            .map(Some)
            .map_err(RepositoryError::database_error)
    }

    pub async fn remove_member(
        &self,
        tenant_id: Uuid,
        member_id: Uuid,
    ) -> Result<(), RepositoryError> {
        let result = TenantMember::delete_many()
            .filter(tenant_member::Column::TenantId.eq(tenant_id))
            .filter(tenant_member::Column::Id.eq(member_id))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound("Member not found".to_string()));
        }
        Ok(())
    }

    async fn next_position(&self, tenant_id: Uuid) -> Result<i32, RepositoryError> {
        let max: Option<i32> = TenantMember::find()
            .select_only()
            .column_as(tenant_member::Column::Position.max(), "max_position")
            .filter(tenant_member::Column::TenantId.eq(tenant_id))
            .into_tuple::<Option<i32>>()
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?
            .flatten();

        Ok(max.map_or(0, |position| position + 1))
    }
}
