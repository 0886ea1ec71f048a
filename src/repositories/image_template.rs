//! Image template persistence.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use super::require_text;
use crate::error::RepositoryError;
use crate::images::ImageElement;
use crate::models::image_template::{
    ActiveModel as ImageTemplateActiveModel, Column as ImageTemplateColumn,
    Entity as ImageTemplate, Model as ImageTemplateModel,
};

/// Largest accepted canvas edge, in pixels.
pub const MAX_CANVAS_EDGE: i32 = 4096;

#[derive(Debug, Clone)]
pub struct NewImageTemplate {
    pub tenant_id: Uuid,
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub background: Option<String>,
    pub elements: Vec<ImageElement>,
}

pub struct ImageTemplateRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ImageTemplateRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        request: NewImageTemplate,
    ) -> Result<ImageTemplateModel, RepositoryError> {
        let name = require_text("name", &request.name, 255)?;
        validate_edge("width", request.width)?;
        validate_edge("height", request.height)?;
        for element in &request.elements {
            element
                .validate()
                .map_err(|message| RepositoryError::validation("elements", message))?;
        }

        let background = request
            .background
            .map(|color| color.trim().to_string())
            .filter(|color| !color.is_empty());
        let elements = serde_json::to_value(&request.elements)
            .map_err(|err| RepositoryError::validation("elements", err.to_string()))?;

        let now = Utc::now().fixed_offset();
        let template = ImageTemplateActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(request.tenant_id),
            name: Set(name),
            width: Set(request.width),
            height: Set(request.height),
            background: Set(background),
            elements: Set(elements),
            created_at: Set(now),
            updated_at: Set(now),
        };

        template
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn get(&self, id: Uuid) -> Result<ImageTemplateModel, RepositoryError> {
        ImageTemplate::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?
            .ok_or_else(|| RepositoryError::NotFound("Image template not found".to_string()))
    }

    pub async fn list(
        &self,
        condition: Option<Condition>,
    ) -> Result<Vec<ImageTemplateModel>, RepositoryError> {
        let mut query = ImageTemplate::find().order_by_asc(ImageTemplateColumn::CreatedAt);
        if let Some(condition) = condition {
            query = query.filter(condition);
        }
        query
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = ImageTemplate::delete_by_id(id)
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound(
                "Image template not found".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_edge(field: &'static str, value: i32) -> Result<(), RepositoryError> {
    if (1..=MAX_CANVAS_EDGE).contains(&value) {
        Ok(())
    } else {
        Err(RepositoryError::validation(
            field,
            format!("must be between 1 and {MAX_CANVAS_EDGE}"),
        ))
    }
}
