//! # Email Automation
//!
//! Matches a trigger against a tenant's active templates and either sends
//! each matching template right away or queues it in `scheduled_emails`.
//! One email log entry is written per attempt. Dispatch never fails as a
//! whole; per-template problems are returned in [`DispatchSummary::errors`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::template::{TemplateConditions, render};
use super::{Mailer, OutgoingEmail, Sender};
use crate::config::AppConfig;
use crate::error::RepositoryError;
use crate::events::{DomainEvent, EventSubscriber};
use crate::models::{email_template, scheduled_email, tenant};
use crate::repositories::TenantRepository;
use crate::repositories::email::{
    EmailLogRepository, EmailLogStatus, EmailTemplateRepository, NewEmailLog, NewScheduledEmail,
    ScheduledEmailRepository,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DispatchSummary {
    pub sent: usize,
    pub scheduled: usize,
    pub errors: Vec<DispatchError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DispatchError {
    /// Template that failed, absent when templates could not be loaded
    pub template_id: Option<Uuid>,
    pub message: String,
}

/// Result of delivering one claimed scheduled email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Retrying,
    Failed,
}

#[derive(Clone)]
pub struct EmailAutomation {
    db: DatabaseConnection,
    mailer: Arc<dyn Mailer>,
    config: Arc<AppConfig>,
}

impl EmailAutomation {
    pub fn new(db: DatabaseConnection, mailer: Arc<dyn Mailer>, config: Arc<AppConfig>) -> Self {
        Self { db, mailer, config }
    }

    pub async fn dispatch(
        &self,
        trigger: &str,
        tenant_id: Uuid,
        recipient: &str,
        variables: &JsonValue,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        let templates = match EmailTemplateRepository::new(&self.db)
            .active_for_trigger(tenant_id, trigger)
            .await
        {
            Ok(templates) => templates,
            Err(err) => {
                warn!(tenant_id = %tenant_id, trigger, error = %err, "Failed to load email templates");
                summary.errors.push(DispatchError {
                    template_id: None,
                    message: err.to_string(),
                });
                return summary;
            }
        };

        if templates.is_empty() {
            debug!(tenant_id = %tenant_id, trigger, "No active templates for trigger");
            return summary;
        }

        let sender = self.sender_for(tenant_id).await;

        for template in templates {
            let conditions = match TemplateConditions::from_stored(template.conditions.as_ref()) {
                Ok(conditions) => conditions,
                Err(err) => {
                    summary.errors.push(DispatchError {
                        template_id: Some(template.id),
                        message: format!("invalid conditions: {err}"),
                    });
                    continue;
                }
            };

            if !conditions.matches(variables) {
                debug!(template_id = %template.id, trigger, "Template conditions not met");
                continue;
            }

            if template.delay_minutes > 0 {
                match self.schedule(&template, recipient, variables).await {
                    Ok(()) => summary.scheduled += 1,
                    Err(err) => summary.errors.push(DispatchError {
                        template_id: Some(template.id),
                        message: err.to_string(),
                    }),
                }
                continue;
            }

            let email = compose(&template, sender.clone(), recipient, variables);
            match self.mailer.send(&email).await {
                Ok(()) => {
                    self.record(&template, recipient, EmailLogStatus::Sent, None)
                        .await;
                    summary.sent += 1;
                }
                Err(err) => {
                    let message = err.to_string();
                    self.record(
                        &template,
                        recipient,
                        EmailLogStatus::Failed,
                        Some(message.clone()),
                    )
                    .await;
                    summary.errors.push(DispatchError {
                        template_id: Some(template.id),
                        message,
                    });
                }
            }
        }

        counter!("email_automation_sent_total").increment(summary.sent as u64);
        counter!("email_automation_scheduled_total").increment(summary.scheduled as u64);
        counter!("email_automation_errors_total").increment(summary.errors.len() as u64);
        info!(
            tenant_id = %tenant_id,
            trigger,
            sent = summary.sent,
            scheduled = summary.scheduled,
            errors = summary.errors.len(),
            "Email automation dispatched"
        );

        summary
    }

    /// Sends a claimed scheduled email and records the outcome. Failures
    /// are retried with exponential backoff until `max_attempts`.
    pub async fn deliver_scheduled(
        &self,
        job: scheduled_email::Model,
    ) -> Result<DeliveryOutcome, RepositoryError> {
        let queue = ScheduledEmailRepository::new(&self.db);

        let template = EmailTemplateRepository::new(&self.db)
            .find_by_id(job.template_id)
            .await?
            .filter(|template| template.is_active);

        let Some(template) = template else {
            queue
                .mark_failed(job, "template deleted or inactive".to_string())
                .await?;
            return Ok(DeliveryOutcome::Failed);
        };

        let sender = self.sender_for(job.tenant_id).await;
        let email = compose(&template, sender, &job.recipient, &job.variables);

        match self.mailer.send(&email).await {
            Ok(()) => {
                self.record(&template, &job.recipient, EmailLogStatus::Sent, None)
                    .await;
                queue.mark_sent(job).await?;
                Ok(DeliveryOutcome::Sent)
            }
            Err(err) => {
                let message = err.to_string();
                self.record(
                    &template,
                    &job.recipient,
                    EmailLogStatus::Failed,
                    Some(message.clone()),
                )
                .await;

                let scheduler = &self.config.scheduler;
                if job.attempts >= scheduler.max_attempts {
                    warn!(job_id = %job.id, attempts = job.attempts, error = %message, "Scheduled email exhausted retries");
                    queue.mark_failed(job, message).await?;
                    Ok(DeliveryOutcome::Failed)
                } else {
                    let delay = retry_delay_seconds(scheduler.retry_base_seconds, job.attempts);
                    let retry_at = Utc::now() + Duration::seconds(delay);
                    queue.mark_retry(job, message, retry_at).await?;
                    Ok(DeliveryOutcome::Retrying)
                }
            }
        }
    }

    async fn schedule(
        &self,
        template: &email_template::Model,
        recipient: &str,
        variables: &JsonValue,
    ) -> Result<(), RepositoryError> {
        let due_at = Utc::now() + Duration::minutes(template.delay_minutes as i64);
        ScheduledEmailRepository::new(&self.db)
            .enqueue(NewScheduledEmail {
                tenant_id: template.tenant_id,
                template_id: template.id,
                recipient: recipient.to_string(),
                trigger: template.trigger.clone(),
                variables: variables.clone(),
                due_at,
            })
            .await?;
        self.record(template, recipient, EmailLogStatus::Scheduled, None)
            .await;
        Ok(())
    }

    async fn sender_for(&self, tenant_id: Uuid) -> Sender {
        let tenant: Option<tenant::Model> = match TenantRepository::new(&self.db)
            .find_by_id(tenant_id)
            .await
        {
            Ok(tenant) => tenant,
            Err(err) => {
                warn!(tenant_id = %tenant_id, error = %err, "Falling back to default sender");
                None
            }
        };
        Sender::resolve(&self.config.mail, tenant.as_ref())
    }

    async fn record(
        &self,
        template: &email_template::Model,
        recipient: &str,
        status: EmailLogStatus,
        error: Option<String>,
    ) {
        let entry = NewEmailLog {
            tenant_id: template.tenant_id,
            template_id: Some(template.id),
            recipient: recipient.to_string(),
            trigger: template.trigger.clone(),
            status,
            error,
        };
        if let Err(err) = EmailLogRepository::new(&self.db).record(entry).await {
            warn!(template_id = %template.id, error = %err, "Failed to write email log");
        }
    }
}

fn compose(
    template: &email_template::Model,
    from: Sender,
    recipient: &str,
    variables: &JsonValue,
) -> OutgoingEmail {
    OutgoingEmail {
        from,
        to: recipient.to_string(),
        subject: render(&template.subject, variables),
        body: render(&template.body, variables),
    }
}

/// `base * 2^(attempts - 1)`, capped at one day.
pub fn retry_delay_seconds(base_seconds: u64, attempts: i32) -> i64 {
    let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
    let delay = base_seconds.saturating_mul(1u64 << exponent);
    delay.min(86_400) as i64
}

/// Bridges record events on the bus to the dispatcher.
pub struct EmailAutomationSubscriber {
    automation: EmailAutomation,
}

impl EmailAutomationSubscriber {
    pub fn new(automation: EmailAutomation) -> Self {
        Self { automation }
    }
}

#[async_trait]
impl EventSubscriber for EmailAutomationSubscriber {
    fn name(&self) -> &'static str {
        "email_automation"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let Some(record) = event.record() else {
            return Ok(());
        };

        let summary = self
            .automation
            .dispatch(
                event.trigger(),
                record.tenant_id,
                &record.recipient,
                &record.variables,
            )
            .await;

        if summary.errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "{} email template(s) failed for {}",
                summary.errors.len(),
                event.trigger()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_exponentially() {
        assert_eq!(retry_delay_seconds(60, 1), 60);
        assert_eq!(retry_delay_seconds(60, 2), 120);
        assert_eq!(retry_delay_seconds(60, 4), 480);
        assert_eq!(retry_delay_seconds(60, 40), 86_400);
        assert_eq!(retry_delay_seconds(60, 0), 60);
    }
}
