//! # Invitation API Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use sea_orm::{ColumnTrait, Condition};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::types::{ListResponse, TenantSummary, timestamp};
use super::{ensure_permitted, ensure_visible};
use crate::access::{Caller, Collection, TenantRole};
use crate::auth::RequireUser;
use crate::error::{ApiError, not_found};
use crate::models::invitation;
use crate::repositories::TenantRepository;
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInvitationRequest {
    #[schema(example = "bo@example.com")]
    pub email: String,
    /// One of `admin`, `editor`, `viewer`
    pub role: TenantRole,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeclineInvitationRequest {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvitationResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub role: String,
    pub status: String,
    pub expires_at: String,
    pub invited_by: Option<Uuid>,
    pub accepted_at: Option<String>,
    pub created_at: String,
}

impl From<invitation::Model> for InvitationResponse {
    fn from(model: invitation::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            expires_at: timestamp(&model.expires_at),
            accepted_at: model.accepted_at.as_ref().map(timestamp),
            created_at: timestamp(&model.created_at),
            email: model.email,
            role: model.role,
            status: model.status,
            invited_by: model.invited_by,
        }
    }
}

/// What an invitee sees before registering
#[derive(Debug, Serialize, ToSchema)]
pub struct PublicInvitationResponse {
    pub tenant: TenantSummary,
    pub email: String,
    pub role: String,
    pub status: String,
    pub expires_at: String,
}

/// Invite someone to a tenant (owner, admin or global admin)
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{id}/invitations",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Tenant id")),
    request_body = CreateInvitationRequest,
    responses(
        (status = 201, description = "Invitation created and emailed", body = InvitationResponse),
        (status = 400, description = "Invalid email or role", body = ApiError),
        (status = 403, description = "Insufficient permissions", body = ApiError)
    ),
    tag = "invitations"
)]
pub async fn create_invitation(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateInvitationRequest>,
) -> Result<(StatusCode, Json<InvitationResponse>), ApiError> {
    let inviter = user.id;
    let decision = state
        .access
        .create(&Caller::User(user), Collection::Invitations, Some(id))
        .await;
    ensure_permitted(&decision, id)?;

    let invitation = state
        .invitations
        .create(id, &request.email, request.role, Some(inviter))
        .await?;
    Ok((StatusCode::CREATED, Json(invitation.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/tenants/{id}/invitations",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Invitations, newest first", body = ListResponse<InvitationResponse>),
        (status = 404, description = "Tenant not found or not visible", body = ApiError)
    ),
    tag = "invitations"
)]
pub async fn list_invitations(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ListResponse<InvitationResponse>>, ApiError> {
    let decision = state
        .access
        .read(&Caller::User(user), Collection::Invitations)
        .await;
    ensure_visible(&decision, id, "Tenant")?;

    let invitations = state
        .invitations
        .list(Some(
            Condition::all().add(invitation::Column::TenantId.eq(id)),
        ))
        .await?;
    Ok(Json(invitations.into_iter().collect()))
}

/// Look up an invitation by its emailed token
#[utoipa::path(
    get,
    path = "/api/v1/invitations/{token}",
    params(("token" = String, Path, description = "64 hex character invitation token")),
    responses(
        (status = 200, description = "Invitation details", body = PublicInvitationResponse),
        (status = 404, description = "Unknown token", body = ApiError)
    ),
    tag = "invitations"
)]
pub async fn get_invitation(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<PublicInvitationResponse>, ApiError> {
    let invitation = state.invitations.find_by_token(&token).await?;
    let tenant = TenantRepository::new(&state.db)
        .get(invitation.tenant_id)
        .await?;

    Ok(Json(PublicInvitationResponse {
        tenant: TenantSummary::from(&tenant),
        expires_at: timestamp(&invitation.expires_at),
        email: invitation.email,
        role: invitation.role,
        status: invitation.status,
    }))
}

/// Decline a pending invitation
#[utoipa::path(
    post,
    path = "/api/v1/invitations/decline",
    request_body = DeclineInvitationRequest,
    responses(
        (status = 200, description = "Invitation declined", body = InvitationResponse),
        (status = 404, description = "Unknown token", body = ApiError),
        (status = 409, description = "Invitation is no longer pending", body = ApiError)
    ),
    tag = "invitations"
)]
pub async fn decline_invitation(
    State(state): State<AppState>,
    Json(request): Json<DeclineInvitationRequest>,
) -> Result<Json<InvitationResponse>, ApiError> {
    let invitation = state.invitations.decline(request.token.trim()).await?;
    Ok(Json(invitation.into()))
}

/// Withdraw a pending invitation (owner, admin or global admin)
#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{id}/invitations/{invitation_id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Tenant id"),
        ("invitation_id" = Uuid, Path, description = "Invitation id")
    ),
    responses(
        (status = 204, description = "Invitation revoked"),
        (status = 403, description = "Insufficient permissions", body = ApiError),
        (status = 404, description = "Invitation not found", body = ApiError),
        (status = 409, description = "Invitation is no longer pending", body = ApiError)
    ),
    tag = "invitations"
)]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path((id, invitation_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let decision = state
        .access
        .delete(&Caller::User(user), Collection::Invitations)
        .await;
    ensure_permitted(&decision, id)?;

    let invitation = state.invitations.find_by_id(invitation_id).await?;
    if invitation.tenant_id != id {
        return Err(not_found("Invitation"));
    }

    state.invitations.revoke(&invitation).await?;
    Ok(StatusCode::NO_CONTENT)
}
