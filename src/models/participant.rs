//! Participant entity model
//!
//! Participants register against an event; their tenant is always the
//! event's tenant.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "participants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Derived from the event on every write
    pub tenant_id: Uuid,

    pub event_id: Uuid,

    /// Free-form category, e.g. `speaker` or `attendee`
    pub participant_type: String,

    pub first_name: String,
    pub last_name: String,

    /// Unique per event
    pub email: String,

    pub company: Option<String>,

    /// `not-approved`, `approved` or `declined`
    pub status: String,

    /// Generated marketing image, if any
    pub image_url: Option<String>,

    /// Custom form answers
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub fields: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::event::Entity",
        from = "Column::EventId",
        to = "super::event::Column::Id"
    )]
    Event,
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Event.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
