//! # Invitation Lifecycle
//!
//! Invitations move one way out of `pending`: to `accepted` when the
//! invited address registers with the token, to `declined` on request, or
//! to `expired` when found past due. Acceptance performs two independent
//! writes (member list, then invitation status) without a transaction.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use rand::RngCore;
use sea_orm::{Condition, DatabaseConnection};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::TenantRole;
use crate::config::AppConfig;
use crate::error::{ApiError, RepositoryError};
use crate::events::{DomainEvent, EventSubscriber};
use crate::mail::{Mailer, OutgoingEmail, Sender};
use crate::models::{invitation, tenant, user};
use crate::repositories::invitation::{InvitationStatus, NewInvitation};
use crate::repositories::tenant::MemberRef;
use crate::repositories::{InvitationRepository, TenantRepository, UserRepository};

#[derive(Debug, Error)]
pub enum InvitationError {
    #[error("invitation not found")]
    NotFound,
    #[error("invitation is already {0}")]
    NotPending(String),
    #[error("invitation has expired")]
    Expired,
    #[error("invitation was issued to a different email address")]
    EmailMismatch,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<InvitationError> for ApiError {
    fn from(err: InvitationError) -> Self {
        match err {
            InvitationError::NotFound => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Invitation not found")
            }
            InvitationError::NotPending(status) => ApiError::new(
                StatusCode::CONFLICT,
                "INVITATION_NOT_PENDING",
                format!("Invitation is already {status}"),
            ),
            InvitationError::Expired => ApiError::new(
                StatusCode::GONE,
                "INVITATION_EXPIRED",
                "Invitation has expired",
            ),
            InvitationError::EmailMismatch => ApiError::new(
                StatusCode::FORBIDDEN,
                "INVITATION_EMAIL_MISMATCH",
                "Invitation was issued to a different email address",
            ),
            InvitationError::Repository(err) => err.into(),
        }
    }
}

/// Result of an acceptance attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted { tenant_id: Uuid, role: TenantRole },
    /// The invitation had already left `pending`; nothing was written.
    Unchanged { status: String },
}

/// 32 random bytes, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn acceptance_link(config: &AppConfig, token: &str) -> String {
    format!("{}/accept-invitation?token={token}", config.public_base_url())
}

#[derive(Clone)]
pub struct InvitationService {
    db: DatabaseConnection,
    mailer: Arc<dyn Mailer>,
    config: Arc<AppConfig>,
}

impl InvitationService {
    pub fn new(db: DatabaseConnection, mailer: Arc<dyn Mailer>, config: Arc<AppConfig>) -> Self {
        Self { db, mailer, config }
    }

    /// Issues a pending invitation and emails the acceptance link. A failed
    /// email is logged and does not undo the invitation.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        email: &str,
        role: TenantRole,
        invited_by: Option<Uuid>,
    ) -> Result<invitation::Model, InvitationError> {
        let tenant = TenantRepository::new(&self.db).get(tenant_id).await?;
        let expires_at = Utc::now() + Duration::days(self.config.invitation.ttl_days);

        let invitation = InvitationRepository::new(&self.db)
            .insert(NewInvitation {
                tenant_id,
                email: email.to_string(),
                role,
                token: generate_token(),
                expires_at,
                invited_by,
            })
            .await?;

        counter!("invitations_created_total").increment(1);
        info!(
            invitation_id = %invitation.id,
            tenant_id = %tenant_id,
            role = role.as_str(),
            "Invitation created"
        );

        let message = self.invitation_email(&tenant, &invitation);
        if let Err(err) = self.mailer.send(&message).await {
            counter!("invitation_email_failures_total").increment(1);
            warn!(invitation_id = %invitation.id, error = %err, "Failed to send invitation email");
        }

        Ok(invitation)
    }

    /// Applies an invitation for a freshly registered user.
    pub async fn accept(
        &self,
        token: &str,
        user: &user::Model,
    ) -> Result<AcceptOutcome, InvitationError> {
        self.accept_at(token, user, Utc::now()).await
    }

    pub async fn accept_at(
        &self,
        token: &str,
        user: &user::Model,
        now: DateTime<Utc>,
    ) -> Result<AcceptOutcome, InvitationError> {
        let repo = InvitationRepository::new(&self.db);
        let invitation = repo
            .find_by_token(token)
            .await?
            .ok_or(InvitationError::NotFound)?;

        if invitation.status != InvitationStatus::Pending.as_str() {
            return Ok(AcceptOutcome::Unchanged {
                status: invitation.status,
            });
        }

        if invitation.expires_at.with_timezone(&Utc) < now {
            repo.transition(invitation, InvitationStatus::Expired)
                .await?;
            counter!("invitations_expired_total").increment(1);
            return Err(InvitationError::Expired);
        }

        if !invitation.email.eq_ignore_ascii_case(user.email.trim()) {
            return Err(InvitationError::EmailMismatch);
        }

        let role: TenantRole = invitation
            .role
            .parse()
            .map_err(|_| RepositoryError::validation("role", "stored role is not recognised"))?;
        let tenant_id = invitation.tenant_id;
        let invitation_id = invitation.id;

        let tenants = TenantRepository::new(&self.db);
        let tenant = tenants.get(tenant_id).await?;
        if tenant.owner_id != user.id {
            let claimed = tenants
                .claim_email_member(tenant_id, &user.email, user.id, role)
                .await?;
            if claimed.is_none() {
                tenants
                    .upsert_member(tenant_id, MemberRef::User(user.id), role)
                    .await?;
            }
        }

        match repo
            .transition(invitation, InvitationStatus::Accepted)
            .await?
        {
            Some(_) => {
                counter!("invitations_accepted_total").increment(1);
                info!(tenant_id = %tenant_id, user_id = %user.id, "Invitation accepted");
                Ok(AcceptOutcome::Accepted { tenant_id, role })
            }
            None => {
                let status = repo
                    .find_by_id(invitation_id)
                    .await?
                    .map(|current| current.status)
                    .unwrap_or_else(|| InvitationStatus::Accepted.as_str().to_string());
                Ok(AcceptOutcome::Unchanged { status })
            }
        }
    }

    pub async fn decline(&self, token: &str) -> Result<invitation::Model, InvitationError> {
        let repo = InvitationRepository::new(&self.db);
        let invitation = repo
            .find_by_token(token)
            .await?
            .ok_or(InvitationError::NotFound)?;
        let status = invitation.status.clone();

        repo.transition(invitation, InvitationStatus::Declined)
            .await?
            .ok_or(InvitationError::NotPending(status))
    }

    /// Deletes a pending invitation.
    pub async fn revoke(&self, invitation: &invitation::Model) -> Result<(), InvitationError> {
        if invitation.status != InvitationStatus::Pending.as_str() {
            return Err(InvitationError::NotPending(invitation.status.clone()));
        }
        InvitationRepository::new(&self.db)
            .delete(invitation.id)
            .await?;
        info!(invitation_id = %invitation.id, "Invitation revoked");
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<invitation::Model, InvitationError> {
        InvitationRepository::new(&self.db)
            .find_by_id(id)
            .await?
            .ok_or(InvitationError::NotFound)
    }

    pub async fn find_by_token(&self, token: &str) -> Result<invitation::Model, InvitationError> {
        InvitationRepository::new(&self.db)
            .find_by_token(token)
            .await?
            .ok_or(InvitationError::NotFound)
    }

    pub async fn list(
        &self,
        condition: Option<Condition>,
    ) -> Result<Vec<invitation::Model>, InvitationError> {
        Ok(InvitationRepository::new(&self.db).list(condition).await?)
    }

    /// Marks every past-due pending invitation as expired.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, InvitationError> {
        let expired = InvitationRepository::new(&self.db)
            .expire_past_due(now)
            .await?;
        if expired > 0 {
            counter!("invitations_expired_total").increment(expired);
            info!(expired, "Expired past-due invitations");
        }
        Ok(expired)
    }

    fn invitation_email(
        &self,
        tenant: &tenant::Model,
        invitation: &invitation::Model,
    ) -> OutgoingEmail {
        let link = acceptance_link(&self.config, &invitation.token);
        OutgoingEmail {
            from: Sender::resolve(&self.config.mail, Some(tenant)),
            to: invitation.email.clone(),
            subject: format!("You have been invited to join {}", tenant.name),
            body: format!(
                "You have been invited to join {} as {}.\n\nAccept the invitation: {link}\n\nThis link expires on {}.",
                tenant.name,
                invitation.role,
                invitation.expires_at.format("%Y-%m-%d")
            ),
        }
    }
}

/// Accepts the invitation carried by a `UserCreated` event.
pub struct InvitationAcceptanceSubscriber {
    service: InvitationService,
}

impl InvitationAcceptanceSubscriber {
    pub fn new(service: InvitationService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventSubscriber for InvitationAcceptanceSubscriber {
    fn name(&self) -> &'static str {
        "invitation_acceptance"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let DomainEvent::UserCreated {
            user_id,
            invitation_token: Some(token),
            ..
        } = event
        else {
            return Ok(());
        };

        let user = UserRepository::new(&self.service.db)
            .find_by_id(*user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {user_id} disappeared before acceptance"))?;

        match self.service.accept(token, &user).await? {
            AcceptOutcome::Accepted { .. } => Ok(()),
            AcceptOutcome::Unchanged { status } => {
                info!(user_id = %user_id, status, "Invitation already processed");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn link_uses_public_base_url() {
        let config = AppConfig {
            server_url: "https://events.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            acceptance_link(&config, "abc"),
            "https://events.example.com/accept-invitation?token=abc"
        );
    }
}
