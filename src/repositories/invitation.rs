//! Invitation persistence. Status transitions are one-way out of `pending`.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use super::normalize_email;
use crate::access::TenantRole;
use crate::error::RepositoryError;
use crate::models::invitation::{
    ActiveModel as InvitationActiveModel, Column as InvitationColumn, Entity as Invitation,
    Model as InvitationModel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
            InvitationStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(InvitationStatus::Pending),
            "accepted" => Some(InvitationStatus::Accepted),
            "declined" => Some(InvitationStatus::Declined),
            "expired" => Some(InvitationStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub tenant_id: Uuid,
    pub email: String,
    pub role: TenantRole,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub invited_by: Option<Uuid>,
}

pub struct InvitationRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> InvitationRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert(&self, request: NewInvitation) -> Result<InvitationModel, RepositoryError> {
        let email = normalize_email("email", &request.email)?;
        if !request.role.is_assignable() {
            return Err(RepositoryError::validation(
                "role",
                "must be one of admin, editor, viewer",
            ));
        }

        let now = Utc::now().fixed_offset();
        let invitation = InvitationActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(request.tenant_id),
            email: Set(email),
            role: Set(request.role.as_str().to_string()),
            token: Set(request.token),
            status: Set(InvitationStatus::Pending.as_str().to_string()),
            expires_at: Set(request.expires_at.fixed_offset()),
            invited_by: Set(request.invited_by),
            accepted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        invitation
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<InvitationModel>, RepositoryError> {
        Invitation::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_token(
        &self,
        token: &str,
    ) -> Result<Option<InvitationModel>, RepositoryError> {
        Invitation::find()
            .filter(InvitationColumn::Token.eq(token))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn list(
        &self,
        condition: Option<Condition>,
    ) -> Result<Vec<InvitationModel>, RepositoryError> {
        let mut query = Invitation::find().order_by_desc(InvitationColumn::CreatedAt);
        if let Some(condition) = condition {
            query = query.filter(condition);
        }
        query
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Moves a pending invitation to `status`. Returns `None` when the
    /// invitation was no longer pending, including when another request
    /// moved it first.
    pub async fn transition(
        &self,
        invitation: InvitationModel,
        status: InvitationStatus,
    ) -> Result<Option<InvitationModel>, RepositoryError> {
        if InvitationStatus::parse(&invitation.status) != Some(InvitationStatus::Pending) {
            return Ok(None);
        }

        let now = Utc::now().fixed_offset();
        let mut update = Invitation::update_many()
            .col_expr(InvitationColumn::Status, Expr::value(status.as_str()))
            .col_expr(InvitationColumn::UpdatedAt, Expr::value(now));
        if status == InvitationStatus::Accepted {
            update = update.col_expr(InvitationColumn::AcceptedAt, Expr::value(Some(now)));
        }
        let result = update
            .filter(InvitationColumn::Id.eq(invitation.id))
            .filter(InvitationColumn::Status.eq(InvitationStatus::Pending.as_str()))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        if result.rows_affected == 0 {
            return Ok(None);
        }

        self.find_by_id(invitation.id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = Invitation::delete_by_id(id)
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound("Invitation not found".to_string()));
        }
        Ok(())
    }

    /// Marks every pending invitation past `now` as expired.
    pub async fn expire_past_due(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = Invitation::update_many()
            .col_expr(
                InvitationColumn::Status,
                Expr::value(InvitationStatus::Expired.as_str()),
            )
            .col_expr(InvitationColumn::UpdatedAt, Expr::value(now.fixed_offset()))
            .filter(InvitationColumn::Status.eq(InvitationStatus::Pending.as_str()))
            .filter(InvitationColumn::ExpiresAt.lt(now.fixed_offset()))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            InvitationStatus::Pending,
            InvitationStatus::Accepted,
            InvitationStatus::Declined,
            InvitationStatus::Expired,
        ] {
            assert_eq!(InvitationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InvitationStatus::parse("revoked"), None);
    }
}
