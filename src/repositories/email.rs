//! # Email Repositories
//!
//! Templates, the append-only send log and the durable queue of delayed
//! sends.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    ModelTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::require_text;
use crate::error::RepositoryError;
use crate::mail::template::TemplateConditions;
use crate::models::email_log::{
    ActiveModel as EmailLogActiveModel, Column as EmailLogColumn, Entity as EmailLog,
    Model as EmailLogModel,
};
use crate::models::email_template::{
    ActiveModel as TemplateActiveModel, Column as TemplateColumn, Entity as EmailTemplate,
    Model as TemplateModel,
};
use crate::models::scheduled_email::{
    ActiveModel as ScheduledActiveModel, Column as ScheduledColumn, Entity as ScheduledEmail,
    Model as ScheduledModel,
};

/// Outcome recorded in the email log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailLogStatus {
    Sent,
    Failed,
    Scheduled,
}

impl EmailLogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EmailLogStatus::Sent => "sent",
            EmailLogStatus::Failed => "failed",
            EmailLogStatus::Scheduled => "scheduled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewEmailTemplate {
    pub tenant_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub trigger: String,
    pub is_active: bool,
    pub delay_minutes: i32,
    pub conditions: Option<TemplateConditions>,
}

#[derive(Debug, Clone, Default)]
pub struct EmailTemplateChanges {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub trigger: Option<String>,
    pub is_active: Option<bool>,
    pub delay_minutes: Option<i32>,
    pub conditions: Option<Option<TemplateConditions>>,
}

pub struct EmailTemplateRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> EmailTemplateRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: NewEmailTemplate) -> Result<TemplateModel, RepositoryError> {
        let name = require_text("name", &request.name, 255)?;
        let subject = require_text("subject", &request.subject, 998)?;
        let body = require_text("body", &request.body, 100_000)?;
        let trigger = validate_trigger(&request.trigger)?;
        validate_delay(request.delay_minutes)?;

        let now = Utc::now().fixed_offset();
        let template = TemplateActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(request.tenant_id),
            name: Set(name),
            subject: Set(subject),
            body: Set(body),
            trigger: Set(trigger),
            is_active: Set(request.is_active),
            delay_minutes: Set(request.delay_minutes),
            conditions: Set(conditions_json(request.conditions.as_ref())?),
            created_at: Set(now),
            updated_at: Set(now),
        };

        template
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn get(&self, id: Uuid) -> Result<TemplateModel, RepositoryError> {
        EmailTemplate::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?
            .ok_or_else(|| RepositoryError::NotFound("Email template not found".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<TemplateModel>, RepositoryError> {
        EmailTemplate::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn list(
        &self,
        condition: Option<Condition>,
    ) -> Result<Vec<TemplateModel>, RepositoryError> {
        let mut query = EmailTemplate::find().order_by_asc(TemplateColumn::CreatedAt);
        if let Some(condition) = condition {
            query = query.filter(condition);
        }
        query
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Active templates of `tenant_id` bound to `trigger`.
    pub async fn active_for_trigger(
        &self,
        tenant_id: Uuid,
        trigger: &str,
    ) -> Result<Vec<TemplateModel>, RepositoryError> {
        EmailTemplate::find()
            .filter(TemplateColumn::TenantId.eq(tenant_id))
            .filter(TemplateColumn::Trigger.eq(trigger))
            .filter(TemplateColumn::IsActive.eq(true))
            .order_by_asc(TemplateColumn::CreatedAt)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn update(
        &self,
        id: Uuid,
        changes: EmailTemplateChanges,
    ) -> Result<TemplateModel, RepositoryError> {
        let mut active = self.get(id).await?.into_active_model();

        if let Some(name) = changes.name {
            active.name = Set(require_text("name", &name, 255)?);
        }
        if let Some(subject) = changes.subject {
            active.subject = Set(require_text("subject", &subject, 998)?);
        }
        if let Some(body) = changes.body {
            active.body = Set(require_text("body", &body, 100_000)?);
        }
        if let Some(trigger) = changes.trigger {
            active.trigger = Set(validate_trigger(&trigger)?);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(delay_minutes) = changes.delay_minutes {
            validate_delay(delay_minutes)?;
            active.delay_minutes = Set(delay_minutes);
        }
        if let Some(conditions) = changes.conditions {
            active.conditions = Set(conditions_json(conditions.as_ref())?);
        }
        active.updated_at = Set(Utc::now().fixed_offset());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let template = self.get(id).await?;
        template
            .delete(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(())
    }
}

fn validate_trigger(trigger: &str) -> Result<String, RepositoryError> {
    let trigger = trigger.trim();
    let valid = !trigger.is_empty()
        && trigger.len() <= 128
        && trigger
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(trigger.to_string())
    } else {
        Err(RepositoryError::validation(
            "trigger",
            "must be a dotted lowercase event name such as participant.created",
        ))
    }
}

fn validate_delay(delay_minutes: i32) -> Result<(), RepositoryError> {
    if (0..=60 * 24 * 90).contains(&delay_minutes) {
        Ok(())
    } else {
        Err(RepositoryError::validation(
            "delay_minutes",
            "must be between 0 and 129600",
        ))
    }
}

fn conditions_json(
    conditions: Option<&TemplateConditions>,
) -> Result<Option<JsonValue>, RepositoryError> {
    conditions
        .map(serde_json::to_value)
        .transpose()
        .map_err(|err| RepositoryError::validation("conditions", err.to_string()))
}

#[derive(Debug, Clone)]
pub struct NewEmailLog {
    pub tenant_id: Uuid,
    pub template_id: Option<Uuid>,
    pub recipient: String,
    pub trigger: String,
    pub status: EmailLogStatus,
    pub error: Option<String>,
}

/// Append-only: entries are written and read, never updated.
pub struct EmailLogRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> EmailLogRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn record(&self, entry: NewEmailLog) -> Result<EmailLogModel, RepositoryError> {
        let log = EmailLogActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(entry.tenant_id),
            template_id: Set(entry.template_id),
            recipient: Set(entry.recipient),
            trigger: Set(entry.trigger),
            status: Set(entry.status.as_str().to_string()),
            error: Set(entry.error),
            created_at: Set(Utc::now().fixed_offset()),
        };

        log.insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn list(
        &self,
        condition: Option<Condition>,
        limit: u64,
    ) -> Result<Vec<EmailLogModel>, RepositoryError> {
        let mut query = EmailLog::find().order_by_desc(EmailLogColumn::CreatedAt);
        if let Some(condition) = condition {
            query = query.filter(condition);
        }
        query
            .limit(limit)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = EmailLog::delete_by_id(id)
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound("Email log not found".to_string()));
        }
        Ok(())
    }
}

pub const SCHEDULED_QUEUED: &str = "queued";
pub const SCHEDULED_RUNNING: &str = "running";
pub const SCHEDULED_SENT: &str = "sent";
pub const SCHEDULED_FAILED: &str = "failed";

#[derive(Debug, Clone)]
pub struct NewScheduledEmail {
    pub tenant_id: Uuid,
    pub template_id: Uuid,
    pub recipient: String,
    pub trigger: String,
    pub variables: JsonValue,
    pub due_at: DateTime<Utc>,
}

pub struct ScheduledEmailRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ScheduledEmailRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn enqueue(&self, job: NewScheduledEmail) -> Result<ScheduledModel, RepositoryError> {
        let now = Utc::now().fixed_offset();
        let scheduled = ScheduledActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(job.tenant_id),
            template_id: Set(job.template_id),
            recipient: Set(job.recipient),
            trigger: Set(job.trigger),
            variables: Set(job.variables),
            due_at: Set(job.due_at.fixed_offset()),
            status: Set(SCHEDULED_QUEUED.to_string()),
            attempts: Set(0),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        scheduled
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Ids of queued jobs whose due time has passed, oldest first.
    pub async fn due_ids(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<Uuid>, RepositoryError> {
        ScheduledEmail::find()
            .select_only()
            .column(ScheduledColumn::Id)
            .filter(ScheduledColumn::Status.eq(SCHEDULED_QUEUED))
            .filter(ScheduledColumn::DueAt.lte(now.fixed_offset()))
            .order_by_asc(ScheduledColumn::DueAt)
            .limit(limit)
            .into_tuple::<Uuid>()
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Moves one job from `queued` to `running` and bumps its attempt count.
    /// Returns the claimed row, or `None` when another worker won the race.
    pub async fn claim(&self, id: Uuid) -> Result<Option<ScheduledModel>, RepositoryError> {
        let result = ScheduledEmail::update_many()
            .col_expr(ScheduledColumn::Status, Expr::value(SCHEDULED_RUNNING))
            .col_expr(
                ScheduledColumn::Attempts,
                Expr::col(ScheduledColumn::Attempts).add(1),
            )
            .col_expr(
                ScheduledColumn::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(ScheduledColumn::Id.eq(id))
            .filter(ScheduledColumn::Status.eq(SCHEDULED_QUEUED))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        ScheduledEmail::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Returns `running` jobs last touched before `stale_before` to the
    /// queue. Their claiming worker is presumed gone; the attempt it used
    /// still counts.
    pub async fn release_stale(&self, stale_before: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = ScheduledEmail::update_many()
            .col_expr(ScheduledColumn::Status, Expr::value(SCHEDULED_QUEUED))
            .col_expr(
                ScheduledColumn::LastError,
                Expr::value("claim expired before delivery completed"),
            )
            .col_expr(
                ScheduledColumn::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(ScheduledColumn::Status.eq(SCHEDULED_RUNNING))
            .filter(ScheduledColumn::UpdatedAt.lt(stale_before.fixed_offset()))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(result.rows_affected)
    }

    pub async fn mark_sent(&self, job: ScheduledModel) -> Result<ScheduledModel, RepositoryError> {
        let mut active = job.into_active_model();
        active.status = Set(SCHEDULED_SENT.to_string());
        active.last_error = Set(None);
        active.updated_at = Set(Utc::now().fixed_offset());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Returns the job to the queue with a later due time.
    pub async fn mark_retry(
        &self,
        job: ScheduledModel,
        error: String,
        retry_at: DateTime<Utc>,
    ) -> Result<ScheduledModel, RepositoryError> {
        let mut active = job.into_active_model();
        active.status = Set(SCHEDULED_QUEUED.to_string());
        active.last_error = Set(Some(error));
        active.due_at = Set(retry_at.fixed_offset());
        active.updated_at = Set(Utc::now().fixed_offset());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn mark_failed(
        &self,
        job: ScheduledModel,
        error: String,
    ) -> Result<ScheduledModel, RepositoryError> {
        let mut active = job.into_active_model();
        active.status = Set(SCHEDULED_FAILED.to_string());
        active.last_error = Set(Some(error));
        active.updated_at = Set(Utc::now().fixed_offset());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn list_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<ScheduledModel>, RepositoryError> {
        ScheduledEmail::find()
            .filter(ScheduledColumn::TenantId.eq(tenant_id))
            .order_by_asc(ScheduledColumn::DueAt)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}
