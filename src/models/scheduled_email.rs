//! Scheduled email entity model
//!
//! Durable queue of delayed automation sends, drained by the background
//! worker.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "scheduled_emails")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub template_id: Uuid,

    pub recipient: String,

    pub trigger: String,

    /// Variable bag captured at dispatch time
    #[sea_orm(column_type = "JsonBinary")]
    pub variables: JsonValue,

    /// Earliest time the send may run
    pub due_at: DateTimeWithTimeZone,

    /// `queued`, `running`, `sent` or `failed`
    pub status: String,

    pub attempts: i32,

    pub last_error: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::email_template::Entity",
        from = "Column::TemplateId",
        to = "super::email_template::Column::Id"
    )]
    Template,
}

impl Related<super::email_template::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Template.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
