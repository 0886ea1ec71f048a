//! Image template entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

use crate::images::ImageElement;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "image_templates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub name: String,

    /// Canvas width in pixels
    pub width: i32,

    /// Canvas height in pixels
    pub height: i32,

    /// CSS color painted before any element
    pub background: Option<String>,

    /// Ordered element list, drawn first to last
    #[sea_orm(column_type = "JsonBinary")]
    pub elements: JsonValue,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Decodes the stored element list.
    pub fn parsed_elements(&self) -> Result<Vec<ImageElement>, serde_json::Error> {
        serde_json::from_value(self.elements.clone())
    }
}
