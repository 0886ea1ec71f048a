//! # Domain Events
//!
//! Primary writes publish a [`DomainEvent`] once they have committed.
//! Subscribers run after the write, one after another, and their failures
//! are logged and counted without reaching the caller.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::{event, participant, partner};

#[derive(Debug, Clone)]
pub enum DomainEvent {
    UserCreated {
        user_id: Uuid,
        email: String,
        invitation_token: Option<String>,
    },
    ParticipantCreated(RecordEvent),
    ParticipantUpdated(RecordEvent),
    PartnerCreated(RecordEvent),
    PartnerUpdated(RecordEvent),
}

/// Payload shared by participant and partner events.
#[derive(Debug, Clone)]
pub struct RecordEvent {
    pub record_id: Uuid,
    pub tenant_id: Uuid,
    pub recipient: String,
    /// Flattened record used for template substitution and conditions.
    pub variables: JsonValue,
}

impl RecordEvent {
    /// Participant columns plus custom fields at the top level, with the
    /// event under `event`.
    pub fn for_participant(model: &participant::Model, event: &event::Model) -> Self {
        let mut variables = Map::new();
        if let Some(JsonValue::Object(fields)) = &model.fields {
            variables.extend(fields.clone());
        }
        variables.extend([
            ("id".to_string(), json!(model.id)),
            ("participant_type".to_string(), json!(model.participant_type)),
            ("first_name".to_string(), json!(model.first_name)),
            ("last_name".to_string(), json!(model.last_name)),
            ("email".to_string(), json!(model.email)),
            ("company".to_string(), json!(model.company)),
            ("status".to_string(), json!(model.status)),
            ("image_url".to_string(), json!(model.image_url)),
            ("event".to_string(), event_variables(event)),
        ]);

        Self {
            record_id: model.id,
            tenant_id: model.tenant_id,
            recipient: model.email.clone(),
            variables: JsonValue::Object(variables),
        }
    }

    pub fn for_partner(model: &partner::Model, event: &event::Model) -> Self {
        let variables = json!({
            "id": model.id,
            "company_name": model.company_name,
            "contact_name": model.contact_name,
            "email": model.email,
            "tier": model.tier,
            "status": model.status,
            "logo_url": model.logo_url,
            "event": event_variables(event),
        });

        Self {
            record_id: model.id,
            tenant_id: model.tenant_id,
            recipient: model.email.clone(),
            variables,
        }
    }
}

fn event_variables(event: &event::Model) -> JsonValue {
    json!({
        "id": event.id,
        "name": event.name,
        "slug": event.slug,
        "location": event.location,
        "starts_at": event.starts_at.map(|at| at.to_utc().to_rfc3339()),
    })
}

impl DomainEvent {
    /// Trigger name matched against email templates.
    pub fn trigger(&self) -> &'static str {
        match self {
            DomainEvent::UserCreated { .. } => "user.created",
            DomainEvent::ParticipantCreated(_) => "participant.created",
            DomainEvent::ParticipantUpdated(_) => "participant.updated",
            DomainEvent::PartnerCreated(_) => "partner.created",
            DomainEvent::PartnerUpdated(_) => "partner.updated",
        }
    }

    pub fn record(&self) -> Option<&RecordEvent> {
        match self {
            DomainEvent::ParticipantCreated(record)
            | DomainEvent::ParticipantUpdated(record)
            | DomainEvent::PartnerCreated(record)
            | DomainEvent::PartnerUpdated(record) => Some(record),
            DomainEvent::UserCreated { .. } => None,
        }
    }
}

#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// What happened when an event was published.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: Vec<&'static str>,
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribe(subscriber);
        self
    }

    pub async fn publish(&self, event: DomainEvent) -> PublishReport {
        let trigger = event.trigger();
        let mut report = PublishReport::default();

        for subscriber in &self.subscribers {
            match subscriber.handle(&event).await {
                Ok(()) => {
                    report.delivered += 1;
                    debug!(subscriber = subscriber.name(), trigger, "Event delivered");
                }
                Err(err) => {
                    counter!(
                        "domain_event_subscriber_failures_total",
                        "subscriber" => subscriber.name(),
                        "trigger" => trigger,
                    )
                    .increment(1);
                    error!(
                        subscriber = subscriber.name(),
                        trigger,
                        error = ?err,
                        "Event subscriber failed"
                    );
                    report.failed.push(subscriber.name());
                }
            }
        }

        report
    }
}
