//! # Participant Repository
//!
//! Participants always inherit the tenant of their event. Registering the
//! same email twice for one event is a conflict surfaced as "already
//! registered".

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{
    DEFAULT_RECORD_STATUS, EventRepository, normalize_email, require_text, validate_record_status,
};
use crate::error::RepositoryError;
use crate::models::participant::{ActiveModel, Column, Entity as Participant, Model};

pub const ALREADY_REGISTERED: &str = "This email is already registered for this event";

#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub event_id: Uuid,
    pub participant_type: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company: Option<String>,
    pub fields: Option<JsonValue>,
}

#[derive(Debug, Clone, Default)]
pub struct ParticipantChanges {
    pub status: Option<String>,
    pub company: Option<String>,
    pub image_url: Option<String>,
    pub fields: Option<JsonValue>,
}

pub struct ParticipantRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ParticipantRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Registers a participant with status `not-approved`.
    pub async fn create(&self, request: NewParticipant) -> Result<Model, RepositoryError> {
        let participant_type = require_text("participant_type", &request.participant_type, 64)?;
        let first_name = require_text("first_name", &request.first_name, 255)?;
        let last_name = require_text("last_name", &request.last_name, 255)?;
        let email = normalize_email("email", &request.email)?;
        if let Some(fields) = &request.fields
            && !fields.is_object()
        {
            return Err(RepositoryError::validation("fields", "must be a JSON object"));
        }

        let event = EventRepository::new(self.db).get(request.event_id).await?;
        let now = Utc::now().fixed_offset();

        let participant = ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(event.tenant_id),
            event_id: Set(event.id),
            participant_type: Set(participant_type),
            first_name: Set(first_name),
            last_name: Set(last_name),
            email: Set(email),
            company: Set(request.company.filter(|c| !c.trim().is_empty())),
            status: Set(DEFAULT_RECORD_STATUS.to_string()),
            image_url: Set(None),
            fields: Set(request.fields),
            created_at: Set(now),
            updated_at: Set(now),
        };

        participant.insert(self.db).await.map_err(|err| {
            match RepositoryError::database_error(err) {
                RepositoryError::Conflict(_) => {
                    RepositoryError::Conflict(ALREADY_REGISTERED.to_string())
                }
                other => other,
            }
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Model, RepositoryError> {
        Participant::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?
            .ok_or_else(|| RepositoryError::NotFound("Participant not found".to_string()))
    }

    pub async fn list(
        &self,
        condition: Option<Condition>,
        event_id: Option<Uuid>,
    ) -> Result<Vec<Model>, RepositoryError> {
        let mut query = Participant::find().order_by_asc(Column::CreatedAt);
        if let Some(condition) = condition {
            query = query.filter(condition);
        }
        if let Some(event_id) = event_id {
            query = query.filter(Column::EventId.eq(event_id));
        }
        query
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Participants among `ids` that also satisfy `condition`.
    pub async fn find_many(
        &self,
        ids: Vec<Uuid>,
        condition: Option<Condition>,
    ) -> Result<Vec<Model>, RepositoryError> {
        let mut query = Participant::find()
            .filter(Column::Id.is_in(ids))
            .order_by_asc(Column::CreatedAt);
        if let Some(condition) = condition {
            query = query.filter(condition);
        }
        query
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Applies changes and re-derives the tenant from the event.
    pub async fn update(
        &self,
        id: Uuid,
        changes: ParticipantChanges,
    ) -> Result<Model, RepositoryError> {
        if let Some(status) = &changes.status {
            validate_record_status(status)?;
        }

        let participant = self.get(id).await?;
        let event = EventRepository::new(self.db).get(participant.event_id).await?;

        let mut active = participant.into_active_model();
        active.tenant_id = Set(event.tenant_id);
        if let Some(status) = changes.status {
            active.status = Set(status);
        }
        if let Some(company) = changes.company {
            active.company = Set(Some(company).filter(|c| !c.trim().is_empty()));
        }
        if let Some(image_url) = changes.image_url {
            active.image_url = Set(Some(image_url).filter(|u| !u.trim().is_empty()));
        }
        if let Some(fields) = changes.fields {
            active.fields = Set(Some(fields));
        }
        active.updated_at = Set(Utc::now().fixed_offset());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}
