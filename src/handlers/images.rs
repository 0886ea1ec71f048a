//! # Image Template Handlers
//!
//! Template management plus on-demand batch generation. Generated images are
//! returned inline as SVG data URIs and are not stored.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::types::{ListResponse, timestamp};
use super::{ensure_permitted, ensure_visible};
use crate::access::{Caller, Collection};
use crate::auth::RequireUser;
use crate::error::{ApiError, validation_error};
use crate::events::RecordEvent;
use crate::images::{ImageElement, ImageRecord, ImageResult, ImageTemplateSpec};
use crate::models::{event, image_template, participant};
use crate::repositories::{EventRepository, ImageTemplateRepository, ParticipantRepository};
use crate::repositories::image_template::NewImageTemplate;
use crate::server::AppState;

/// Upper bound on records per generate request.
const MAX_RECORDS_PER_REQUEST: usize = 1000;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateImageTemplateRequest {
    pub tenant_id: Uuid,
    pub name: String,
    #[schema(example = 1200)]
    pub width: i32,
    #[schema(example = 630)]
    pub height: i32,
    #[schema(example = "#ffffff")]
    pub background: Option<String>,
    /// Drawn in order: `static_text`, `variable_text`, `static_image`, `variable_image`
    #[schema(value_type = Vec<Object>)]
    pub elements: Vec<ImageElement>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImageTemplateResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub background: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub elements: serde_json::Value,
    pub created_at: String,
}

impl From<image_template::Model> for ImageTemplateResponse {
    fn from(model: image_template::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            created_at: timestamp(&model.created_at),
            name: model.name,
            width: model.width,
            height: model.height,
            background: model.background,
            elements: model.elements,
        }
    }
}

/// Either inline `records`, or a selection of stored participants by
/// `event_id` and/or `participant_ids`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateImagesRequest {
    #[serde(default)]
    pub records: Vec<ImageRecord>,
    /// Render every participant of this event
    pub event_id: Option<Uuid>,
    /// Render these participants
    pub participant_ids: Option<Vec<Uuid>>,
}

impl GenerateImagesRequest {
    fn selects_stored(&self) -> bool {
        self.event_id.is_some() || self.participant_ids.is_some()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GeneratedImage {
    #[serde(flatten)]
    pub result: ImageResult,
    /// `data:image/svg+xml;base64,...` when rendering succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_uri: Option<String>,
}

impl From<ImageResult> for GeneratedImage {
    fn from(result: ImageResult) -> Self {
        Self {
            data_uri: result.image.as_ref().map(|image| image.data_uri()),
            result,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateImagesResponse {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<GeneratedImage>,
}

#[utoipa::path(
    post,
    path = "/api/v1/image-templates",
    security(("bearer_auth" = [])),
    request_body = CreateImageTemplateRequest,
    responses(
        (status = 201, description = "Template created", body = ImageTemplateResponse),
        (status = 400, description = "Invalid canvas or elements", body = ApiError),
        (status = 403, description = "Insufficient permissions for this tenant", body = ApiError)
    ),
    tag = "images"
)]
pub async fn create_image_template(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(request): Json<CreateImageTemplateRequest>,
) -> Result<(StatusCode, Json<ImageTemplateResponse>), ApiError> {
    let decision = state
        .access
        .create(
            &Caller::User(user),
            Collection::ImageTemplates,
            Some(request.tenant_id),
        )
        .await;
    ensure_permitted(&decision, request.tenant_id)?;

    let template = ImageTemplateRepository::new(&state.db)
        .create(NewImageTemplate {
            tenant_id: request.tenant_id,
            name: request.name,
            width: request.width,
            height: request.height,
            background: request.background,
            elements: request.elements,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(template.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/image-templates",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Templates in the caller's tenants", body = ListResponse<ImageTemplateResponse>)
    ),
    tag = "images"
)]
pub async fn list_image_templates(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<ListResponse<ImageTemplateResponse>>, ApiError> {
    let decision = state
        .access
        .read(&Caller::User(user), Collection::ImageTemplates)
        .await;
    if decision.is_deny() {
        return Ok(Json(ListResponse::new(Vec::new())));
    }

    let templates = ImageTemplateRepository::new(&state.db)
        .list(decision.condition(image_template::Column::TenantId))
        .await?;
    Ok(Json(templates.into_iter().collect()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/image-templates/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Image template id")),
    responses(
        (status = 204, description = "Template deleted"),
        (status = 404, description = "Template not found or not visible", body = ApiError)
    ),
    tag = "images"
)]
pub async fn delete_image_template(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let decision = state
        .access
        .delete(&Caller::User(user), Collection::ImageTemplates)
        .await;
    let repo = ImageTemplateRepository::new(&state.db);
    let template = repo.get(id).await?;
    ensure_visible(&decision, template.tenant_id, "Image template")?;

    repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Render one image per record
///
/// Each record's `fields` feed the template's variable elements. Records are
/// either posted inline or loaded from the participants selected by
/// `event_id` / `participant_ids`, restricted to what the caller may read in
/// the template's tenant. A record that fails to render gets
/// `success: false` and does not affect the rest.
#[utoipa::path(
    post,
    path = "/api/v1/image-templates/{id}/generate",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Image template id")),
    request_body = GenerateImagesRequest,
    responses(
        (status = 200, description = "One result per record, in input order", body = GenerateImagesResponse),
        (status = 400, description = "Too many records or conflicting record sources", body = ApiError),
        (status = 404, description = "Template not found or not visible", body = ApiError),
        (status = 422, description = "Stored template is invalid", body = ApiError)
    ),
    tag = "images"
)]
pub async fn generate_images(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
    Json(request): Json<GenerateImagesRequest>,
) -> Result<Json<GenerateImagesResponse>, ApiError> {
    if request.selects_stored() && !request.records.is_empty() {
        return Err(validation_error(
            "Conflicting record sources",
            serde_json::json!({
                "records": "send either records or event_id/participant_ids, not both"
            }),
        ));
    }
    if request.records.len() > MAX_RECORDS_PER_REQUEST {
        return Err(too_many_records());
    }

    let caller = Caller::User(user);
    let decision = state
        .access
        .read(&caller, Collection::ImageTemplates)
        .await;
    let template = ImageTemplateRepository::new(&state.db).get(id).await?;
    ensure_visible(&decision, template.tenant_id, "Image template")?;

    let records = if request.selects_stored() {
        let records =
            stored_participant_records(&state, &caller, template.tenant_id, &request).await?;
        if records.len() > MAX_RECORDS_PER_REQUEST {
            return Err(too_many_records());
        }
        records
    } else {
        request.records
    };

    let spec = ImageTemplateSpec::try_from(&template).map_err(|err| {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_TEMPLATE",
            err.to_string(),
        )
    })?;

    let results = state.images.generate_batch(spec, records).await;
    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;

    tracing::info!(template_id = %id, succeeded, failed, "Image batch generated");

    Ok(Json(GenerateImagesResponse {
        succeeded,
        failed,
        results: results.into_iter().map(GeneratedImage::from).collect(),
    }))
}

fn too_many_records() -> ApiError {
    validation_error(
        "Too many records",
        serde_json::json!({
            "records": format!("at most {MAX_RECORDS_PER_REQUEST} per request")
        }),
    )
}

/// Loads the selected participants the caller may read, limited to the
/// template's tenant, as render inputs.
async fn stored_participant_records(
    state: &AppState,
    caller: &Caller,
    tenant_id: Uuid,
    request: &GenerateImagesRequest,
) -> Result<Vec<ImageRecord>, ApiError> {
    let decision = state.access.read(caller, Collection::Participants).await;
    if decision.is_deny() {
        return Ok(Vec::new());
    }
    let condition = decision.condition(participant::Column::TenantId);

    let repo = ParticipantRepository::new(&state.db);
    let participants = match &request.participant_ids {
        Some(ids) => repo.find_many(ids.clone(), condition).await?,
        None => repo.list(condition, request.event_id).await?,
    };
    let participants: Vec<_> = participants
        .into_iter()
        .filter(|p| p.tenant_id == tenant_id)
        .filter(|p| request.event_id.is_none_or(|event_id| p.event_id == event_id))
        .collect();

    let event_ids = participants.iter().map(|p| p.event_id).collect();
    let events: HashMap<Uuid, event::Model> = EventRepository::new(&state.db)
        .find_many(event_ids)
        .await?
        .into_iter()
        .map(|event| (event.id, event))
        .collect();

    Ok(participants
        .iter()
        .filter_map(|p| {
            let event = events.get(&p.event_id)?;
            Some(RecordEvent::for_participant(p, event).into())
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::RenderedImage;

    #[test]
    fn generated_image_carries_data_uri_only_on_success() {
        let ok = GeneratedImage::from(ImageResult {
            record_id: Uuid::new_v4(),
            success: true,
            image: Some(RenderedImage {
                svg: "<svg/>".to_string(),
                width: 1,
                height: 1,
                checksum: "00".to_string(),
            }),
            error: None,
        });
        assert_eq!(
            ok.data_uri.as_deref(),
            Some("data:image/svg+xml;base64,PHN2Zy8+")
        );

        let failed = GeneratedImage::from(ImageResult {
            record_id: Uuid::new_v4(),
            success: false,
            image: None,
            error: Some("missing field".to_string()),
        });
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("data_uri").is_none());
    }
}
