//! # Email Template and Log Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use sea_orm::{ColumnTrait, Condition};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::types::{ListResponse, timestamp};
use super::{ensure_permitted, ensure_visible};
use crate::access::{AccessDecision, Caller, Collection};
use crate::auth::RequireUser;
use crate::error::{ApiError, forbidden, validation_error};
use crate::mail::template::TemplateConditions;
use crate::models::{email_log, email_template};
use crate::repositories::email::{EmailTemplateChanges, NewEmailTemplate};
use crate::repositories::{EmailLogRepository, EmailTemplateRepository};
use crate::server::AppState;

const DEFAULT_LOG_LIMIT: u64 = 100;
const MAX_LOG_LIMIT: u64 = 500;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTemplateRequest {
    pub tenant_id: Uuid,
    pub name: String,
    #[schema(example = "Welcome to {{event.name}}")]
    pub subject: String,
    #[schema(example = "Hi {{first_name}}, thanks for registering.")]
    pub body: String,
    #[schema(example = "participant.created")]
    pub trigger: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Zero sends immediately
    #[serde(default)]
    pub delay_minutes: i32,
    pub conditions: Option<TemplateConditions>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub trigger: Option<String>,
    pub is_active: Option<bool>,
    pub delay_minutes: Option<i32>,
    /// Replaces the stored conditions; `{}` clears them
    pub conditions: Option<TemplateConditions>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TemplateResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub trigger: String,
    pub is_active: bool,
    pub delay_minutes: i32,
    pub conditions: Option<TemplateConditions>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<email_template::Model> for TemplateResponse {
    fn from(model: email_template::Model) -> Self {
        let conditions = TemplateConditions::from_stored(model.conditions.as_ref())
            .ok()
            .filter(|c| !c.is_empty());
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            created_at: timestamp(&model.created_at),
            updated_at: timestamp(&model.updated_at),
            name: model.name,
            subject: model.subject,
            body: model.body,
            trigger: model.trigger,
            is_active: model.is_active,
            delay_minutes: model.delay_minutes,
            conditions,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmailLogResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub template_id: Option<Uuid>,
    pub recipient: String,
    pub trigger: String,
    /// `sent`, `failed` or `scheduled`
    pub status: String,
    pub error: Option<String>,
    pub created_at: String,
}

impl From<email_log::Model> for EmailLogResponse {
    fn from(model: email_log::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            template_id: model.template_id,
            created_at: timestamp(&model.created_at),
            recipient: model.recipient,
            trigger: model.trigger,
            status: model.status,
            error: model.error,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TenantQuery {
    /// Only this tenant
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct EmailLogQuery {
    pub tenant_id: Option<Uuid>,
    /// Newest entries first, at most 500
    pub limit: Option<u64>,
}

/// Narrows a read decision plus an optional tenant parameter into a query
/// condition. `None` means the caller can see nothing.
fn scoped_condition<C: ColumnTrait + Copy>(
    decision: &AccessDecision,
    column: C,
    tenant_id: Option<Uuid>,
) -> Option<Condition> {
    if decision.is_deny() {
        return None;
    }
    let mut condition = Condition::all();
    if let Some(filter) = decision.condition(column) {
        condition = condition.add(filter);
    }
    if let Some(tenant_id) = tenant_id {
        condition = condition.add(column.eq(tenant_id));
    }
    Some(condition)
}

/// Create an automation template (editor or above)
#[utoipa::path(
    post,
    path = "/api/v1/email-templates",
    security(("bearer_auth" = [])),
    request_body = CreateTemplateRequest,
    responses(
        (status = 201, description = "Template created", body = TemplateResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 403, description = "Insufficient permissions for this tenant", body = ApiError)
    ),
    tag = "email"
)]
pub async fn create_template(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<TemplateResponse>), ApiError> {
    let decision = state
        .access
        .create(
            &Caller::User(user),
            Collection::EmailTemplates,
            Some(request.tenant_id),
        )
        .await;
    ensure_permitted(&decision, request.tenant_id)?;

    let template = EmailTemplateRepository::new(&state.db)
        .create(NewEmailTemplate {
            tenant_id: request.tenant_id,
            name: request.name,
            subject: request.subject,
            body: request.body,
            trigger: request.trigger,
            is_active: request.is_active,
            delay_minutes: request.delay_minutes,
            conditions: request.conditions,
        })
        .await?;

    tracing::info!(
        template_id = %template.id,
        tenant_id = %template.tenant_id,
        trigger = %template.trigger,
        "Email template created"
    );
    Ok((StatusCode::CREATED, Json(template.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/email-templates",
    security(("bearer_auth" = [])),
    params(TenantQuery),
    responses(
        (status = 200, description = "Templates in the caller's tenants", body = ListResponse<TemplateResponse>)
    ),
    tag = "email"
)]
pub async fn list_templates(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<TenantQuery>,
) -> Result<Json<ListResponse<TemplateResponse>>, ApiError> {
    let decision = state
        .access
        .read(&Caller::User(user), Collection::EmailTemplates)
        .await;
    let Some(condition) =
        scoped_condition(&decision, email_template::Column::TenantId, query.tenant_id)
    else {
        return Ok(Json(ListResponse::new(Vec::new())));
    };

    let templates = EmailTemplateRepository::new(&state.db)
        .list(Some(condition))
        .await?;
    Ok(Json(templates.into_iter().collect()))
}

#[utoipa::path(
    patch,
    path = "/api/v1/email-templates/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Template id")),
    request_body = UpdateTemplateRequest,
    responses(
        (status = 200, description = "Template updated", body = TemplateResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 403, description = "Insufficient permissions for this tenant", body = ApiError),
        (status = 404, description = "Template not found", body = ApiError)
    ),
    tag = "email"
)]
pub async fn update_template(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTemplateRequest>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let decision = state
        .access
        .update(&Caller::User(user), Collection::EmailTemplates)
        .await;
    let repo = EmailTemplateRepository::new(&state.db);
    let existing = repo.get(id).await?;
    ensure_permitted(&decision, existing.tenant_id)?;

    let updated = repo
        .update(
            id,
            EmailTemplateChanges {
                name: request.name,
                subject: request.subject,
                body: request.body,
                trigger: request.trigger,
                is_active: request.is_active,
                delay_minutes: request.delay_minutes,
                conditions: request
                    .conditions
                    .map(|conditions| Some(conditions).filter(|c| !c.is_empty())),
            },
        )
        .await?;
    Ok(Json(updated.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/email-templates/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Template id")),
    responses(
        (status = 204, description = "Template deleted"),
        (status = 404, description = "Template not found or not visible", body = ApiError)
    ),
    tag = "email"
)]
pub async fn delete_template(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let decision = state
        .access
        .delete(&Caller::User(user), Collection::EmailTemplates)
        .await;
    let repo = EmailTemplateRepository::new(&state.db);
    let existing = repo.get(id).await?;
    ensure_visible(&decision, existing.tenant_id, "Email template")?;

    repo.delete(id).await?;
    tracing::info!(template_id = %id, "Email template deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Send history, newest first
#[utoipa::path(
    get,
    path = "/api/v1/email-logs",
    security(("bearer_auth" = [])),
    params(EmailLogQuery),
    responses(
        (status = 200, description = "Log entries visible to the caller", body = ListResponse<EmailLogResponse>),
        (status = 400, description = "Limit out of range", body = ApiError)
    ),
    tag = "email"
)]
pub async fn list_logs(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<EmailLogQuery>,
) -> Result<Json<ListResponse<EmailLogResponse>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    if limit == 0 || limit > MAX_LOG_LIMIT {
        return Err(validation_error(
            "Invalid limit",
            serde_json::json!({ "limit": format!("must be between 1 and {MAX_LOG_LIMIT}") }),
        ));
    }

    let decision = state
        .access
        .read(&Caller::User(user), Collection::EmailLogs)
        .await;
    let Some(condition) = scoped_condition(&decision, email_log::Column::TenantId, query.tenant_id)
    else {
        return Ok(Json(ListResponse::new(Vec::new())));
    };

    let logs = EmailLogRepository::new(&state.db)
        .list(Some(condition), limit)
        .await?;
    Ok(Json(logs.into_iter().collect()))
}

/// Remove a log entry (super-admin only)
#[utoipa::path(
    delete,
    path = "/api/v1/email-logs/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Log entry id")),
    responses(
        (status = 204, description = "Entry deleted"),
        (status = 403, description = "Caller is not a super-admin", body = ApiError),
        (status = 404, description = "Entry not found", body = ApiError)
    ),
    tag = "email"
)]
pub async fn delete_log(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let decision = state
        .access
        .delete(&Caller::User(user), Collection::EmailLogs)
        .await;
    if !matches!(decision, AccessDecision::Allow) {
        return Err(forbidden(Some("Only super-admins may delete email logs")));
    }

    EmailLogRepository::new(&state.db).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::TenantFilter;

    #[test]
    fn denied_reads_see_nothing() {
        assert!(
            scoped_condition(
                &AccessDecision::Deny,
                email_log::Column::TenantId,
                None
            )
            .is_none()
        );
    }

    #[test]
    fn filters_and_tenant_parameter_combine() {
        let decision = AccessDecision::Filter(TenantFilter {
            tenant_ids: vec![Uuid::new_v4()],
        });
        let condition = scoped_condition(
            &decision,
            email_template::Column::TenantId,
            Some(Uuid::new_v4()),
        )
        .unwrap();
        assert_eq!(condition.len(), 2);
    }

    #[test]
    fn template_requests_default_to_active_and_immediate() {
        let request: CreateTemplateRequest = serde_json::from_value(serde_json::json!({
            "tenant_id": Uuid::new_v4(),
            "name": "Welcome",
            "subject": "Hi",
            "body": "Hello {{first_name}}",
            "trigger": "participant.created"
        }))
        .unwrap();
        assert!(request.is_active);
        assert_eq!(request.delay_minutes, 0);
        assert!(request.conditions.is_none());
    }
}
