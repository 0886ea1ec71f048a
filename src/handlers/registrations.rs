//! # Public Registration Handlers
//!
//! Form submissions from event pages. These endpoints never look at the
//! `Authorization` header; a submission is always evaluated as anonymous.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use super::ensure_permitted;
use super::records::{ParticipantResponse, PartnerResponse};
use crate::access::{Caller, Collection};
use crate::error::ApiError;
use crate::events::{DomainEvent, RecordEvent};
use crate::repositories::participant::NewParticipant;
use crate::repositories::partner::NewPartner;
use crate::repositories::{EventRepository, ParticipantRepository, PartnerRepository};
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ParticipantRegistration {
    #[schema(example = "attendee")]
    pub participant_type: String,
    pub first_name: String,
    pub last_name: String,
    #[schema(example = "ana@example.com")]
    pub email: String,
    pub company: Option<String>,
    /// Custom form answers, stored as given
    #[schema(value_type = Option<Object>)]
    pub fields: Option<JsonValue>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PartnerRegistration {
    pub company_name: String,
    pub contact_name: Option<String>,
    pub email: String,
    pub tier: Option<String>,
    pub logo_url: Option<String>,
}

/// Register for an event
#[utoipa::path(
    post,
    path = "/api/v1/public/events/{event_id}/participants",
    params(("event_id" = Uuid, Path, description = "Event id")),
    request_body = ParticipantRegistration,
    responses(
        (status = 201, description = "Registered with status not-approved", body = ParticipantResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 404, description = "Event not found", body = ApiError),
        (status = 409, description = "Email already registered for this event", body = ApiError)
    ),
    tag = "registrations"
)]
pub async fn register_participant(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<ParticipantRegistration>,
) -> Result<(StatusCode, Json<ParticipantResponse>), ApiError> {
    let event = EventRepository::new(&state.db).get(event_id).await?;
    let decision = state
        .access
        .create(&Caller::Anonymous, Collection::Participants, Some(event.tenant_id))
        .await;
    ensure_permitted(&decision, event.tenant_id)?;

    let participant = ParticipantRepository::new(&state.db)
        .create(NewParticipant {
            event_id,
            participant_type: request.participant_type,
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            company: request.company,
            fields: request.fields,
        })
        .await?;

    tracing::info!(
        participant_id = %participant.id,
        event_id = %event.id,
        tenant_id = %event.tenant_id,
        "Participant registered"
    );

    state
        .events
        .publish(DomainEvent::ParticipantCreated(RecordEvent::for_participant(
            &participant,
            &event,
        )))
        .await;

    Ok((StatusCode::CREATED, Json(participant.into())))
}

/// Apply as a sponsor-partner
#[utoipa::path(
    post,
    path = "/api/v1/public/events/{event_id}/partners",
    params(("event_id" = Uuid, Path, description = "Event id")),
    request_body = PartnerRegistration,
    responses(
        (status = 201, description = "Application recorded with status not-approved", body = PartnerResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 404, description = "Event not found", body = ApiError),
        (status = 409, description = "Email already registered as a partner", body = ApiError)
    ),
    tag = "registrations"
)]
pub async fn register_partner(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<PartnerRegistration>,
) -> Result<(StatusCode, Json<PartnerResponse>), ApiError> {
    let event = EventRepository::new(&state.db).get(event_id).await?;
    let decision = state
        .access
        .create(&Caller::Anonymous, Collection::Partners, Some(event.tenant_id))
        .await;
    ensure_permitted(&decision, event.tenant_id)?;

    let partner = PartnerRepository::new(&state.db)
        .create(NewPartner {
            event_id,
            company_name: request.company_name,
            contact_name: request.contact_name,
            email: request.email,
            tier: request.tier,
            logo_url: request.logo_url,
        })
        .await?;

    tracing::info!(partner_id = %partner.id, event_id = %event.id, "Partner registered");

    state
        .events
        .publish(DomainEvent::PartnerCreated(RecordEvent::for_partner(
            &partner, &event,
        )))
        .await;

    Ok((StatusCode::CREATED, Json(partner.into())))
}
