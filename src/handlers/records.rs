//! # Event, Participant and Partner Handlers
//!
//! Authenticated back-office access to tenant-scoped records. Lists are
//! narrowed by the caller's tenant filter; single-record reads outside that
//! filter look like missing records.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::types::{EventSummary, ListResponse, TenantSummary, timestamp};
use super::{ensure_permitted, ensure_visible};
use crate::access::{Caller, Collection};
use crate::auth::RequireUser;
use crate::error::ApiError;
use crate::events::{DomainEvent, RecordEvent};
use crate::models::{Ref, event, participant, partner};
use crate::repositories::event::NewEvent;
use crate::repositories::participant::ParticipantChanges;
use crate::repositories::partner::PartnerChanges;
use crate::repositories::{EventRepository, ParticipantRepository, PartnerRepository};
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEventRequest {
    /// Tenant id, or the tenant object itself
    #[schema(value_type = String, format = Uuid)]
    pub tenant: Ref<TenantSummary>,
    #[schema(example = "RustConf Berlin")]
    pub name: String,
    /// Derived from the name when absent
    pub slug: Option<String>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub starts_at: Option<DateTimeWithTimeZone>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub ends_at: Option<DateTimeWithTimeZone>,
    pub location: Option<String>,
    /// `draft` (default), `published` or `archived`
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub slug: String,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    pub location: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl From<event::Model> for EventResponse {
    fn from(model: event::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            starts_at: model.starts_at.as_ref().map(timestamp),
            ends_at: model.ends_at.as_ref().map(timestamp),
            created_at: timestamp(&model.created_at),
            name: model.name,
            slug: model.slug,
            location: model.location,
            status: model.status,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Event id, or the event summary with `?populate=true`
    #[schema(value_type = Object)]
    pub event: Ref<EventSummary>,
    pub participant_type: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company: Option<String>,
    pub status: String,
    pub image_url: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub fields: Option<JsonValue>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<participant::Model> for ParticipantResponse {
    fn from(model: participant::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            event: Ref::Id(model.event_id),
            created_at: timestamp(&model.created_at),
            updated_at: timestamp(&model.updated_at),
            participant_type: model.participant_type,
            first_name: model.first_name,
            last_name: model.last_name,
            email: model.email,
            company: model.company,
            status: model.status,
            image_url: model.image_url,
            fields: model.fields,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PartnerResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[schema(value_type = Object)]
    pub event: Ref<EventSummary>,
    pub company_name: String,
    pub contact_name: Option<String>,
    pub email: String,
    pub tier: Option<String>,
    pub status: String,
    pub logo_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<partner::Model> for PartnerResponse {
    fn from(model: partner::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            event: Ref::Id(model.event_id),
            created_at: timestamp(&model.created_at),
            updated_at: timestamp(&model.updated_at),
            company_name: model.company_name,
            contact_name: model.contact_name,
            email: model.email,
            tier: model.tier,
            status: model.status,
            logo_url: model.logo_url,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RecordListQuery {
    /// Only records of this event
    pub event_id: Option<Uuid>,
    /// Embed the event summary instead of its id
    #[serde(default)]
    pub populate: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateParticipantRequest {
    /// `not-approved`, `approved` or `declined`
    pub status: Option<String>,
    pub company: Option<String>,
    pub image_url: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub fields: Option<JsonValue>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePartnerRequest {
    pub status: Option<String>,
    pub tier: Option<String>,
    pub logo_url: Option<String>,
}

/// Create an event (editor or above in the tenant)
#[utoipa::path(
    post,
    path = "/api/v1/events",
    security(("bearer_auth" = [])),
    request_body = CreateEventRequest,
    responses(
        (status = 201, description = "Event created", body = EventResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 403, description = "Insufficient permissions for this tenant", body = ApiError),
        (status = 409, description = "Slug already used in the tenant", body = ApiError)
    ),
    tag = "events"
)]
pub async fn create_event(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), ApiError> {
    let tenant_id = request.tenant.id();
    let decision = state
        .access
        .create(&Caller::User(user), Collection::Events, Some(tenant_id))
        .await;
    ensure_permitted(&decision, tenant_id)?;

    let event = EventRepository::new(&state.db)
        .create(NewEvent {
            tenant_id,
            name: request.name,
            slug: request.slug,
            starts_at: request.starts_at,
            ends_at: request.ends_at,
            location: request.location,
            status: request.status,
        })
        .await?;

    tracing::info!(event_id = %event.id, tenant_id = %tenant_id, "Event created");
    Ok((StatusCode::CREATED, Json(event.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/events",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Events in the caller's tenants", body = ListResponse<EventResponse>)
    ),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<ListResponse<EventResponse>>, ApiError> {
    let decision = state
        .access
        .read(&Caller::User(user), Collection::Events)
        .await;
    if decision.is_deny() {
        return Ok(Json(ListResponse::new(Vec::new())));
    }

    let events = EventRepository::new(&state.db)
        .list(decision.condition(event::Column::TenantId))
        .await?;
    Ok(Json(events.into_iter().collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/events/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event", body = EventResponse),
        (status = 404, description = "Event not found or not visible", body = ApiError)
    ),
    tag = "events"
)]
pub async fn get_event(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<Json<EventResponse>, ApiError> {
    let decision = state
        .access
        .read(&Caller::User(user), Collection::Events)
        .await;
    let event = EventRepository::new(&state.db).get(id).await?;
    ensure_visible(&decision, event.tenant_id, "Event")?;
    Ok(Json(event.into()))
}

#[utoipa::path(
    get,
    path = "/api/v1/participants",
    security(("bearer_auth" = [])),
    params(RecordListQuery),
    responses(
        (status = 200, description = "Participants in the caller's tenants", body = ListResponse<ParticipantResponse>)
    ),
    tag = "participants"
)]
pub async fn list_participants(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<RecordListQuery>,
) -> Result<Json<ListResponse<ParticipantResponse>>, ApiError> {
    let decision = state
        .access
        .read(&Caller::User(user), Collection::Participants)
        .await;
    if decision.is_deny() {
        return Ok(Json(ListResponse::new(Vec::new())));
    }

    let participants = ParticipantRepository::new(&state.db)
        .list(
            decision.condition(participant::Column::TenantId),
            query.event_id,
        )
        .await?;

    let event_ids = participants.iter().map(|p| p.event_id).collect();
    let mut responses: Vec<ParticipantResponse> =
        participants.into_iter().map(Into::into).collect();
    if query.populate {
        let events = load_event_summaries(&state, event_ids).await?;
        for response in &mut responses {
            response.event = populate_event(response.event.clone(), &events);
        }
    }
    Ok(Json(ListResponse::new(responses)))
}

/// Review a participant (editor or above)
#[utoipa::path(
    patch,
    path = "/api/v1/participants/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Participant id")),
    request_body = UpdateParticipantRequest,
    responses(
        (status = 200, description = "Participant updated", body = ParticipantResponse),
        (status = 400, description = "Unknown status", body = ApiError),
        (status = 403, description = "Insufficient permissions for this tenant", body = ApiError),
        (status = 404, description = "Participant not found", body = ApiError)
    ),
    tag = "participants"
)]
pub async fn update_participant(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateParticipantRequest>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let decision = state
        .access
        .update(&Caller::User(user), Collection::Participants)
        .await;
    let repo = ParticipantRepository::new(&state.db);
    let existing = repo.get(id).await?;
    ensure_permitted(&decision, existing.tenant_id)?;

    let updated = repo
        .update(
            id,
            ParticipantChanges {
                status: request.status,
                company: request.company,
                image_url: request.image_url,
                fields: request.fields,
            },
        )
        .await?;

    let event = EventRepository::new(&state.db).get(updated.event_id).await?;
    state
        .events
        .publish(DomainEvent::ParticipantUpdated(RecordEvent::for_participant(
            &updated, &event,
        )))
        .await;

    Ok(Json(updated.into()))
}

#[utoipa::path(
    get,
    path = "/api/v1/partners",
    security(("bearer_auth" = [])),
    params(RecordListQuery),
    responses(
        (status = 200, description = "Partners in the caller's tenants", body = ListResponse<PartnerResponse>)
    ),
    tag = "partners"
)]
pub async fn list_partners(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<RecordListQuery>,
) -> Result<Json<ListResponse<PartnerResponse>>, ApiError> {
    let decision = state
        .access
        .read(&Caller::User(user), Collection::Partners)
        .await;
    if decision.is_deny() {
        return Ok(Json(ListResponse::new(Vec::new())));
    }

    let partners = PartnerRepository::new(&state.db)
        .list(decision.condition(partner::Column::TenantId), query.event_id)
        .await?;

    let event_ids = partners.iter().map(|p| p.event_id).collect();
    let mut responses: Vec<PartnerResponse> = partners.into_iter().map(Into::into).collect();
    if query.populate {
        let events = load_event_summaries(&state, event_ids).await?;
        for response in &mut responses {
            response.event = populate_event(response.event.clone(), &events);
        }
    }
    Ok(Json(ListResponse::new(responses)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/partners/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Partner id")),
    request_body = UpdatePartnerRequest,
    responses(
        (status = 200, description = "Partner updated", body = PartnerResponse),
        (status = 400, description = "Unknown status", body = ApiError),
        (status = 403, description = "Insufficient permissions for this tenant", body = ApiError),
        (status = 404, description = "Partner not found", body = ApiError)
    ),
    tag = "partners"
)]
pub async fn update_partner(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePartnerRequest>,
) -> Result<Json<PartnerResponse>, ApiError> {
    let decision = state
        .access
        .update(&Caller::User(user), Collection::Partners)
        .await;
    let repo = PartnerRepository::new(&state.db);
    let existing = repo.get(id).await?;
    ensure_permitted(&decision, existing.tenant_id)?;

    let updated = repo
        .update(
            id,
            PartnerChanges {
                status: request.status,
                tier: request.tier,
                logo_url: request.logo_url,
            },
        )
        .await?;

    let event = EventRepository::new(&state.db).get(updated.event_id).await?;
    state
        .events
        .publish(DomainEvent::PartnerUpdated(RecordEvent::for_partner(
            &updated, &event,
        )))
        .await;

    Ok(Json(updated.into()))
}

async fn load_event_summaries(
    state: &AppState,
    mut ids: Vec<Uuid>,
) -> Result<HashMap<Uuid, EventSummary>, ApiError> {
    ids.sort_unstable();
    ids.dedup();
    let events = EventRepository::new(&state.db).find_many(ids).await?;
    Ok(events
        .iter()
        .map(|event| (event.id, EventSummary::from(event)))
        .collect())
}

fn populate_event(
    reference: Ref<EventSummary>,
    events: &HashMap<Uuid, EventSummary>,
) -> Ref<EventSummary> {
    reference.populate_with(|id| events.get(&id).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn populate_leaves_unknown_events_as_ids() {
        let known = Uuid::new_v4();
        let events = HashMap::from([(
            known,
            EventSummary {
                id: known,
                name: "Launch".to_string(),
                slug: "launch".to_string(),
                status: "published".to_string(),
            },
        )]);

        let populated = populate_event(Ref::Id(known), &events);
        assert_eq!(populated.populated().map(|e| e.slug.as_str()), Some("launch"));

        let missing = Uuid::new_v4();
        assert_eq!(populate_event(Ref::Id(missing), &events), Ref::Id(missing));
    }

    #[test]
    fn create_event_accepts_populated_tenant() {
        let tenant_id = Uuid::new_v4();
        let request: CreateEventRequest = serde_json::from_value(serde_json::json!({
            "tenant": {"id": tenant_id, "name": "Acme", "slug": "acme"},
            "name": "Launch",
            "starts_at": "2026-03-01T09:00:00+01:00"
        }))
        .unwrap();
        assert_eq!(request.tenant.id(), tenant_id);
        assert!(request.starts_at.is_some());
    }
}
