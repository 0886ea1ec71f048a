//! # Tenants API Handlers
//!
//! Tenant CRUD, the member list and the owner-only email configuration.

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
use crate::access::{Caller, Collection, TenantRole};
use crate::auth::RequireUser;
use crate::error::{ApiError, forbidden, not_found, validation_error};
use crate::models::{tenant, tenant_member};
use crate::repositories::tenant::{EmailConfig, MemberRef, NewTenant};
use crate::repositories::{TenantRepository, UserRepository};
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTenantRequest {
    #[schema(example = "Acme Events")]
    pub name: String,
    /// Derived from the name when omitted
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTenantRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailConfigRequest {
    pub from_address: Option<String>,
    pub from_name: Option<String>,
    pub reply_to: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    /// Registered user to add
    pub user_id: Option<Uuid>,
    /// Email of someone not yet registered
    pub email: Option<String>,
    pub role: TenantRole,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TenantResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub owner_id: Uuid,
    pub email_from_address: Option<String>,
    pub email_from_name: Option<String>,
    pub email_reply_to: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<tenant::Model> for TenantResponse {
    fn from(model: tenant::Model) -> Self {
        Self {
            id: model.id,
            created_at: timestamp(&model.created_at),
            updated_at: timestamp(&model.updated_at),
            name: model.name,
            slug: model.slug,
            owner_id: model.owner_id,
            email_from_address: model.email_from_address,
            email_from_name: model.email_from_name,
            email_reply_to: model.email_reply_to,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub role: String,
    pub position: i32,
}

impl From<tenant_member::Model> for MemberResponse {
    fn from(model: tenant_member::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            email: model.email,
            role: model.role,
            position: model.position,
        }
    }
}

/// Create a tenant owned by the caller
#[utoipa::path(
    post,
    path = "/api/v1/tenants",
    security(("bearer_auth" = [])),
    request_body = CreateTenantRequest,
    responses(
        (status = 201, description = "Tenant created", body = TenantResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Plan limit reached", body = ApiError),
        (status = 409, description = "Slug already taken", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(request): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<TenantResponse>), ApiError> {
    let user_id = user.id;
    let caller = Caller::User(user);
    if state
        .access
        .create(&caller, Collection::Tenants, None)
        .await
        .is_deny()
    {
        return Err(forbidden(None));
    }

    let owner = UserRepository::new(&state.db)
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| not_found("User"))?;

    let tenant = TenantRepository::new(&state.db)
        .create(
            &owner,
            NewTenant {
                name: request.name,
                slug: request.slug,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(tenant.into())))
}

/// Tenants the caller belongs to (all tenants for global admins)
#[utoipa::path(
    get,
    path = "/api/v1/tenants",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Visible tenants", body = ListResponse<TenantResponse>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn list_tenants(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<ListResponse<TenantResponse>>, ApiError> {
    let decision = state
        .access
        .read(&Caller::User(user), Collection::Tenants)
        .await;
    if decision.is_deny() {
        return Err(forbidden(None));
    }

    let tenants = TenantRepository::new(&state.db)
        .list(decision.condition(tenant::Column::Id))
        .await?;
    Ok(Json(tenants.into_iter().collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/tenants/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Tenant", body = TenantResponse),
        (status = 404, description = "Tenant not found or not visible", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn get_tenant(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TenantResponse>, ApiError> {
    let decision = state
        .access
        .read(&Caller::User(user), Collection::Tenants)
        .await;
    ensure_visible(&decision, id, "Tenant")?;

    let tenant = TenantRepository::new(&state.db).get(id).await?;
    Ok(Json(tenant.into()))
}

/// Rename a tenant (admin or owner)
#[utoipa::path(
    patch,
    path = "/api/v1/tenants/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Tenant id")),
    request_body = UpdateTenantRequest,
    responses(
        (status = 200, description = "Tenant updated", body = TenantResponse),
        (status = 403, description = "Insufficient permissions", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn update_tenant(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTenantRequest>,
) -> Result<Json<TenantResponse>, ApiError> {
    let decision = state
        .access
        .update(&Caller::User(user), Collection::Tenants)
        .await;
    ensure_permitted(&decision, id)?;

    let tenant = TenantRepository::new(&state.db)
        .rename(id, &request.name)
        .await?;
    Ok(Json(tenant.into()))
}

/// Delete a tenant (owner only)
#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Tenant id")),
    responses(
        (status = 204, description = "Tenant deleted"),
        (status = 403, description = "Caller is not the owner", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn delete_tenant(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let decision = state
        .access
        .delete(&Caller::User(user), Collection::Tenants)
        .await;
    ensure_permitted(&decision, id)?;

    TenantRepository::new(&state.db).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the tenant's outbound email sender (owner only)
#[utoipa::path(
    put,
    path = "/api/v1/tenants/{id}/email-config",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Tenant id")),
    request_body = EmailConfigRequest,
    responses(
        (status = 200, description = "Email configuration saved", body = TenantResponse),
        (status = 400, description = "Invalid address", body = ApiError),
        (status = 403, description = "Caller is not the owner", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn update_email_config(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
    Json(request): Json<EmailConfigRequest>,
) -> Result<Json<TenantResponse>, ApiError> {
    if !state
        .access
        .can_update_email_config(&Caller::User(user), id)
        .await
    {
        return Err(forbidden(Some(
            "Only the tenant owner may change the email configuration",
        )));
    }

    let tenant = TenantRepository::new(&state.db)
        .update_email_config(
            id,
            EmailConfig {
                from_address: request.from_address,
                from_name: request.from_name,
                reply_to: request.reply_to,
            },
        )
        .await?;
    Ok(Json(tenant.into()))
}

#[utoipa::path(
    get,
    path = "/api/v1/tenants/{id}/members",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Members in display order", body = ListResponse<MemberResponse>),
        (status = 404, description = "Tenant not found or not visible", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn list_members(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ListResponse<MemberResponse>>, ApiError> {
    let decision = state
        .access
        .read(&Caller::User(user), Collection::Tenants)
        .await;
    ensure_visible(&decision, id, "Tenant")?;

    let members = TenantRepository::new(&state.db).list_members(id).await?;
    Ok(Json(members.into_iter().collect()))
}

/// Add a member or change an existing member's role (admin or owner)
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{id}/members",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Tenant id")),
    request_body = AddMemberRequest,
    responses(
        (status = 200, description = "Member saved", body = MemberResponse),
        (status = 400, description = "Invalid member or role", body = ApiError),
        (status = 403, description = "Insufficient permissions", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn add_member(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AddMemberRequest>,
) -> Result<Json<MemberResponse>, ApiError> {
    let decision = state
        .access
        .update(&Caller::User(user), Collection::Tenants)
        .await;
    ensure_permitted(&decision, id)?;

    let member = match (request.user_id, request.email) {
        (Some(user_id), None) => MemberRef::User(user_id),
        (None, Some(email)) => MemberRef::Email(email),
        _ => {
            return Err(validation_error(
                "Invalid member reference",
                serde_json::json!({ "member": "provide exactly one of user_id or email" }),
            ));
        }
    };

    let saved = TenantRepository::new(&state.db)
        .upsert_member(id, member, request.role)
        .await?;
    Ok(Json(saved.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{id}/members/{member_id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Tenant id"),
        ("member_id" = Uuid, Path, description = "Member row id")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Insufficient permissions", body = ApiError),
        (status = 404, description = "Member not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn remove_member(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path((id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let decision = state
        .access
        .update(&Caller::User(user), Collection::Tenants)
        .await;
    ensure_permitted(&decision, id)?;

    TenantRepository::new(&state.db)
        .remove_member(id, member_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
