//! # Partner Repository

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use super::{
    DEFAULT_RECORD_STATUS, EventRepository, normalize_email, require_text, validate_record_status,
};
use crate::error::RepositoryError;
use crate::models::partner::{ActiveModel, Column, Entity as Partner, Model};

pub const ALREADY_REGISTERED: &str = "This email is already registered as a partner for this event";

#[derive(Debug, Clone)]
pub struct NewPartner {
    pub event_id: Uuid,
    pub company_name: String,
    pub contact_name: Option<String>,
    pub email: String,
    pub tier: Option<String>,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PartnerChanges {
    pub status: Option<String>,
    pub tier: Option<String>,
    pub logo_url: Option<String>,
}

pub struct PartnerRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> PartnerRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: NewPartner) -> Result<Model, RepositoryError> {
        let company_name = require_text("company_name", &request.company_name, 255)?;
        let email = normalize_email("email", &request.email)?;
        let event = EventRepository::new(self.db).get(request.event_id).await?;
        let now = Utc::now().fixed_offset();

        let partner = ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(event.tenant_id),
            event_id: Set(event.id),
            company_name: Set(company_name),
            contact_name: Set(request.contact_name.filter(|n| !n.trim().is_empty())),
            email: Set(email),
            tier: Set(request.tier.filter(|t| !t.trim().is_empty())),
            status: Set(DEFAULT_RECORD_STATUS.to_string()),
            logo_url: Set(request.logo_url.filter(|u| !u.trim().is_empty())),
            created_at: Set(now),
            updated_at: Set(now),
        };

        partner.insert(self.db).await.map_err(|err| {
            match RepositoryError::database_error(err) {
                RepositoryError::Conflict(_) => {
                    RepositoryError::Conflict(ALREADY_REGISTERED.to_string())
                }
                other => other,
            }
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Model, RepositoryError> {
        Partner::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?
            .ok_or_else(|| RepositoryError::NotFound("Partner not found".to_string()))
    }

    pub async fn list(
        &self,
        condition: Option<Condition>,
        event_id: Option<Uuid>,
    ) -> Result<Vec<Model>, RepositoryError> {
        let mut query = Partner::find().order_by_asc(Column::CreatedAt);
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

    pub async fn update(&self, id: Uuid, changes: PartnerChanges) -> Result<Model, RepositoryError> {
        if let Some(status) = &changes.status {
            validate_record_status(status)?;
        }

        let partner = self.get(id).await?;
        let event = EventRepository::new(self.db).get(partner.event_id).await?;

        let mut active = partner.into_active_model();
        active.tenant_id = Set(event.tenant_id);
        if let Some(status) = changes.status {
            active.status = Set(status);
        }
        if let Some(tier) = changes.tier {
            active.tier = Set(Some(tier).filter(|t| !t.trim().is_empty()));
        }
        if let Some(logo_url) = changes.logo_url {
            active.logo_url = Set(Some(logo_url).filter(|u| !u.trim().is_empty()));
        }
        active.updated_at = Set(Utc::now().fixed_offset());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}
