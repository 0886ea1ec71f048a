//! # Authentication
//!
//! Password hashing, bearer session tokens and the request extractors that
//! turn an `Authorization` header into a [`Caller`].

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::access::{AuthenticatedUser, Caller};
use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized};
use crate::models::user;
use crate::repositories::UserRepository;
use crate::server::AppState;

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("secret key is not configured")]
    MissingSecret,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token encoding failed: {0}")]
    Encoding(String),
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token: {0}")]
    TokenInvalid(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExpired => unauthorized(Some("Session expired")),
            AuthError::TokenInvalid(_) => unauthorized(Some("Invalid bearer token")),
            other => {
                tracing::error!(error = %other, "Authentication subsystem failure");
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Authentication is unavailable",
                )
            }
        }
    }
}

/// Hashes `password` into an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Returns `Ok(false)` on mismatch and an error only for malformed hashes.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = argon2::PasswordHash::new(hash)
        .map_err(|e| AuthError::Hashing(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Hashing(format!("verify error: {e}"))),
    }
}

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues an HS256 session token for `user`.
pub fn issue_token(config: &AppConfig, user: &user::Model) -> Result<String, AuthError> {
    let secret = config.secret_key.as_deref().ok_or(AuthError::MissingSecret)?;
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        iat: now,
        exp: now + (config.session_ttl_hours as i64) * 3600,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Encoding(e.to_string()))
}

pub fn decode_token(config: &AppConfig, token: &str) -> Result<Claims, AuthError> {
    let secret = config.secret_key.as_deref().ok_or(AuthError::MissingSecret)?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["sub", "exp", "iat"]);

    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid(e.to_string()),
    })
}

/// Returns `Ok(None)` when no `Authorization` header is present.
fn extract_bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let header = value
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(Some)
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_bearer_token(&parts.headers)? else {
            return Ok(Caller::Anonymous);
        };

        let claims = decode_token(&state.config, token)?;
        let user = UserRepository::new(&state.db)
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| unauthorized(Some("Account no longer exists")))?;

        tracing::debug!(user_id = %user.id, "Authenticated request");
        Ok(Caller::User(AuthenticatedUser::from(&user)))
    }
}

/// Extractor that rejects anonymous callers with 401.
#[derive(Debug, Clone)]
pub struct RequireUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match Caller::from_request_parts(parts, state).await? {
            Caller::User(user) => Ok(RequireUser(user)),
            Caller::Anonymous => Err(unauthorized(Some("Authentication required"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn config() -> AppConfig {
        AppConfig {
            secret_key: Some("k".repeat(32)),
            ..Default::default()
        }
    }

    fn user() -> user::Model {
        let now = Utc::now().fixed_offset();
        user::Model {
            id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            name: None,
            password_hash: String::new(),
            roles: json!(["user"]),
            plan: "free".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
        assert!(verify_password("pw", "not-a-hash").is_err());
    }

    #[test]
    fn token_carries_subject() {
        let config = config();
        let user = user();
        let token = issue_token(&config, &user).unwrap();
        let claims = decode_token(&config, &token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, user.email);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = issue_token(&config(), &user()).unwrap();
        let other = AppConfig {
            secret_key: Some("z".repeat(32)),
            ..Default::default()
        };
        assert!(matches!(
            decode_token(&other, &token),
            Err(AuthError::TokenInvalid(_))
        ));
    }

    #[test]
    fn missing_header_is_anonymous() {
        let headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).unwrap().is_none());
    }

    #[test]
    fn non_bearer_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), Some("abc"));
    }
}
