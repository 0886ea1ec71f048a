//! # User API Handlers
//!
//! Registration, login and global role management.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::{GlobalRole, Plan};
use crate::auth::{MIN_PASSWORD_LENGTH, RequireUser, hash_password, issue_token, verify_password};
use crate::error::{ApiError, forbidden, not_found, unauthorized, validation_error};
use crate::events::DomainEvent;
use crate::handlers::types::timestamp;
use crate::models::user;
use crate::repositories::UserRepository;
use crate::repositories::user::NewUser;
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "ana@example.com")]
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    /// Token from an invitation email; membership is granted when it matches
    pub invitation_token: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRolesRequest {
    pub roles: Vec<GlobalRole>,
    pub plan: Option<Plan>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub roles: Vec<GlobalRole>,
    pub plan: Plan,
    pub created_at: String,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            roles: model.global_roles(),
            plan: model.plan(),
            created_at: timestamp(&model.created_at),
            email: model.email,
            name: model.name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub token_type: &'static str,
    pub user: UserResponse,
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = SessionResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 409, description = "Email already registered", body = ApiError)
    ),
    tag = "users"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    if request.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(validation_error(
            "Password too short",
            serde_json::json!({
                "password": format!("must be at least {MIN_PASSWORD_LENGTH} characters")
            }),
        ));
    }

    let password_hash = hash_password(&request.password)?;
    let user = UserRepository::new(&state.db)
        .create(NewUser {
            email: request.email,
            name: request.name,
            password_hash,
            roles: vec![GlobalRole::User],
            plan: Plan::Free,
        })
        .await?;

    tracing::info!(user_id = %user.id, "User registered");

    state
        .events
        .publish(DomainEvent::UserCreated {
            user_id: user.id,
            email: user.email.clone(),
            invitation_token: request
                .invitation_token
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
        })
        .await;

    let token = issue_token(&state.config, &user)?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            token_type: "Bearer",
            user: user.into(),
        }),
    ))
}

/// Exchange credentials for a bearer token
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = ApiError)
    ),
    tag = "users"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let invalid = || unauthorized(Some("Invalid email or password"));

    let user = UserRepository::new(&state.db)
        .find_by_email(&request.email)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&request.password, &user.password_hash)? {
        return Err(invalid());
    }

    let token = issue_token(&state.config, &user)?;
    Ok(Json(SessionResponse {
        token,
        token_type: "Bearer",
        user: user.into(),
    }))
}

/// Current account
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Authenticated user", body = UserResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "users"
)]
pub async fn me(
    State(state): State<AppState>,
    RequireUser(caller): RequireUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = UserRepository::new(&state.db)
        .find_by_id(caller.id)
        .await?
        .ok_or_else(|| not_found("User"))?;
    Ok(Json(user.into()))
}

/// Replace a user's global roles (super-admin only)
#[utoipa::path(
    put,
    path = "/api/v1/users/{id}/roles",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateRolesRequest,
    responses(
        (status = 200, description = "Roles updated", body = UserResponse),
        (status = 400, description = "Empty role set", body = ApiError),
        (status = 403, description = "Caller is not a super-admin", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    tag = "users"
)]
pub async fn update_roles(
    State(state): State<AppState>,
    RequireUser(caller): RequireUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRolesRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if !caller.is_super_admin() {
        return Err(forbidden(Some("Only super-admins may change global roles")));
    }

    let repo = UserRepository::new(&state.db);
    let plan = match request.plan {
        Some(plan) => plan,
        None => repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found("User"))?
            .plan(),
    };

    let updated = repo.update_roles(id, &request.roles, plan).await?;
    tracing::info!(user_id = %id, changed_by = %caller.id, "Global roles updated");
    Ok(Json(updated.into()))
}
