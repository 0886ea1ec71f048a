//! # Delayed Email Worker
//!
//! Background task that drains the `scheduled_emails` queue. Each tick
//! loads due job ids, claims them one by one with a conditional
//! `queued -> running` update so concurrent workers never send the same
//! job twice, and hands claimed jobs to the automation dispatcher. Jobs left
//! `running` longer than the claim timeout (a worker died mid-delivery) are
//! requeued at the start of the next tick. When enabled, the tick also
//! expires past-due invitations.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use metrics::{counter, gauge, histogram};
use sea_orm::DatabaseConnection;
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::AppConfig;
use crate::error::RepositoryError;
use crate::invitations::InvitationService;
use crate::mail::EmailAutomation;
use crate::mail::automation::DeliveryOutcome;
use crate::repositories::ScheduledEmailRepository;

pub struct DelayedEmailWorker {
    config: Arc<AppConfig>,
    db: DatabaseConnection,
    automation: EmailAutomation,
    invitations: Option<InvitationService>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickStats {
    pub due: u64,
    pub claimed: u64,
    pub sent: u64,
    pub retrying: u64,
    pub failed: u64,
    pub lost_claims: u64,
    pub errors: u64,
    pub reclaimed: u64,
    pub invitations_expired: u64,
}

impl DelayedEmailWorker {
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection, automation: EmailAutomation) -> Self {
        Self {
            config,
            db,
            automation,
            invitations: None,
        }
    }

    /// Enables the invitation expiry sweep on every tick.
    pub fn with_invitation_sweep(mut self, invitations: InvitationService) -> Self {
        self.invitations = Some(invitations);
        self
    }

    /// Runs until `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Starting delayed email worker");
        let tick_interval = TokioDuration::from_secs(self.config.scheduler.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Delayed email worker shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    match self.tick().await {
                        Ok(stats) => debug!(?stats, "Worker tick completed"),
                        Err(err) => error!(error = %err, "Worker tick failed"),
                    }
                    histogram!("email_worker_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Delayed email worker stopped");
    }

    pub async fn tick(&self) -> Result<TickStats, RepositoryError> {
        let mut stats = TickStats::default();
        let queue = ScheduledEmailRepository::new(&self.db);

        let claim_timeout =
            ChronoDuration::seconds(self.config.scheduler.claim_timeout_seconds as i64);
        stats.reclaimed = queue.release_stale(Utc::now() - claim_timeout).await?;
        if stats.reclaimed > 0 {
            warn!(count = stats.reclaimed, "Requeued scheduled emails with expired claims");
        }

        let due = queue
            .due_ids(Utc::now(), self.config.scheduler.batch_size)
            .await?;
        stats.due = due.len() as u64;
        gauge!("email_worker_due_gauge").set(due.len() as f64);

        for id in due {
            let Some(job) = queue.claim(id).await? else {
                stats.lost_claims += 1;
                continue;
            };
            stats.claimed += 1;

            match self.automation.deliver_scheduled(job).await {
                Ok(DeliveryOutcome::Sent) => stats.sent += 1,
                Ok(DeliveryOutcome::Retrying) => stats.retrying += 1,
                Ok(DeliveryOutcome::Failed) => stats.failed += 1,
                Err(err) => {
                    stats.errors += 1;
                    error!(job_id = %id, error = %err, "Failed to record scheduled email outcome");
                }
            }
        }

        if let Some(invitations) = &self.invitations {
            match invitations.sweep_expired(Utc::now()).await {
                Ok(expired) => stats.invitations_expired = expired,
                Err(err) => {
                    stats.errors += 1;
                    error!(error = %err, "Invitation expiry sweep failed");
                }
            }
        }

        counter!("scheduled_emails_sent_total").increment(stats.sent);
        counter!("scheduled_emails_failed_total").increment(stats.failed);
        counter!("scheduled_emails_retried_total").increment(stats.retrying);
        counter!("scheduled_emails_reclaimed_total").increment(stats.reclaimed);

        Ok(stats)
    }
}
