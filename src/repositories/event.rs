//! # Event Repository

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use super::{require_text, slugify};
use crate::error::RepositoryError;
use crate::models::event::{ActiveModel, Column, Entity as Event, Model};

pub const EVENT_STATUSES: &[&str] = &["draft", "published", "archived"];

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub tenant_id: Uuid,
    pub name: String,
    pub slug: Option<String>,
    pub starts_at: Option<DateTimeWithTimeZone>,
    pub ends_at: Option<DateTimeWithTimeZone>,
    pub location: Option<String>,
    pub status: Option<String>,
}

pub struct EventRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> EventRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: NewEvent) -> Result<Model, RepositoryError> {
        let name = require_text("name", &request.name, 255)?;
        let slug = slugify(request.slug.as_deref().unwrap_or(&name));
        if slug.is_empty() {
            return Err(RepositoryError::validation(
                "slug",
                "must contain at least one letter or digit",
            ));
        }

        let status = request.status.unwrap_or_else(|| "draft".to_string());
        if !EVENT_STATUSES.contains(&status.as_str()) {
            return Err(RepositoryError::validation(
                "status",
                format!("must be one of {}", EVENT_STATUSES.join(", ")),
            ));
        }

        if let (Some(starts_at), Some(ends_at)) = (request.starts_at, request.ends_at)
            && ends_at < starts_at
        {
            return Err(RepositoryError::validation(
                "ends_at",
                "must not be before starts_at",
            ));
        }

        let now = Utc::now().fixed_offset();
        let event = ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(request.tenant_id),
            name: Set(name),
            slug: Set(slug),
            starts_at: Set(request.starts_at),
            ends_at: Set(request.ends_at),
            location: Set(request.location.filter(|l| !l.trim().is_empty())),
            status: Set(status),
            created_at: Set(now),
            updated_at: Set(now),
        };

        event.insert(self.db).await.map_err(|err| {
            match RepositoryError::database_error(err) {
                RepositoryError::Conflict(_) => RepositoryError::Conflict(
                    "An event with this slug already exists for the tenant".to_string(),
                ),
                other => other,
            }
        })
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, RepositoryError> {
        Event::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn get(&self, id: Uuid) -> Result<Model, RepositoryError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Event not found".to_string()))
    }

    pub async fn list(&self, condition: Option<Condition>) -> Result<Vec<Model>, RepositoryError> {
        let mut query = Event::find().order_by_desc(Column::CreatedAt);
        if let Some(condition) = condition {
            query = query.filter(condition);
        }
        query
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Loads several events at once for reference population.
    pub async fn find_many(&self, ids: Vec<Uuid>) -> Result<Vec<Model>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Event::find()
            .filter(Column::Id.is_in(ids))
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}
