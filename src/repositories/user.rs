//! # User Repository

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, Set,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{normalize_email, require_text};
use crate::access::roles::{GlobalRole, Plan, RoleSetError, normalize_roles_and_plan};
use crate::error::RepositoryError;
use crate::models::tenant::{self, Entity as Tenant};
use crate::models::user::{ActiveModel, Column, Entity as User, Model};

/// Data for a new account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub roles: Vec<GlobalRole>,
    pub plan: Plan,
}

pub struct UserRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates a user. The very first account is promoted to `super-admin`.
    pub async fn create(&self, new_user: NewUser) -> Result<Model, RepositoryError> {
        let email = normalize_email("email", &new_user.email)?;
        let name = match new_user.name.as_deref() {
            Some(name) if !name.trim().is_empty() => Some(require_text("name", name, 255)?),
            _ => None,
        };

        let is_first_user = User::find()
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)?
            == 0;

        let mut roles = new_user.roles;
        if is_first_user && !roles.contains(&GlobalRole::SuperAdmin) {
            roles.insert(0, GlobalRole::SuperAdmin);
        }

        let (roles, plan) = normalize_roles_and_plan(&roles, new_user.plan).map_err(role_error)?;
        let now = Utc::now().fixed_offset();

        let user = ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            name: Set(name),
            password_hash: Set(new_user.password_hash),
            roles: Set(roles_json(&roles)),
            plan: Set(plan.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = user.insert(self.db).await.map_err(|err| {
            match RepositoryError::database_error(err) {
                RepositoryError::Conflict(_) => {
                    RepositoryError::Conflict("Email already registered".to_string())
                }
                other => other,
            }
        })?;

        if is_first_user {
            info!(user_id = %created.id, "First user promoted to super-admin");
        }

        Ok(created)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, RepositoryError> {
        User::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Model>, RepositoryError> {
        User::find()
            .filter(Column::Email.eq(email.trim().to_lowercase()))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Replaces global roles and plan, applying the same normalization as
    /// on creation.
    pub async fn update_roles(
        &self,
        id: Uuid,
        roles: &[GlobalRole],
        plan: Plan,
    ) -> Result<Model, RepositoryError> {
        let (roles, plan) = normalize_roles_and_plan(roles, plan).map_err(role_error)?;

        let user = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("User not found".to_string()))?;

        let mut active = user.into_active_model();
        active.roles = Set(roles_json(&roles));
        active.plan = Set(plan.as_str().to_string());
        active.updated_at = Set(Utc::now().fixed_offset());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn owned_tenant_count(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        Tenant::find()
            .filter(tenant::Column::OwnerId.eq(user_id))
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}

fn roles_json(roles: &[GlobalRole]) -> serde_json::Value {
    json!(roles.iter().map(|role| role.as_str()).collect::<Vec<_>>())
}

fn role_error(err: RoleSetError) -> RepositoryError {
    RepositoryError::validation("roles", err.to_string())
}
