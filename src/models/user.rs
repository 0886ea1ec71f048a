//! User entity model
//!
//! Users carry their global roles as a JSON array and a pricing plan that
//! bounds how many tenants they may own.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

use crate::access::roles::{GlobalRole, Plan};

/// Registered account
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Lowercased login email (unique)
    pub email: String,

    pub name: Option<String>,

    /// Argon2id PHC string
    pub password_hash: String,

    /// Global roles, e.g. `["user"]` or `["super-admin"]`
    #[sea_orm(column_type = "JsonBinary")]
    pub roles: JsonValue,

    /// Pricing plan slug (`free`, `pro`, `unlimited`)
    pub plan: String,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::tenant::Entity")]
    OwnedTenants,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OwnedTenants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parses the stored role array, skipping unknown entries.
    pub fn global_roles(&self) -> Vec<GlobalRole> {
        self.roles
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| value.as_str())
                    .filter_map(|slug| slug.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn plan(&self) -> Plan {
        self.plan.parse().unwrap_or(Plan::Free)
    }
}
