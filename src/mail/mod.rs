//! Outbound email.
//!
//! Delivery goes through the [`Mailer`] trait so the automation dispatcher,
//! the invitation flow and the delayed worker never depend on a concrete
//! provider. Two transports ship with the service: a logging mailer for
//! local profiles and a JSON-over-HTTP mailer for real providers.

pub mod automation;
pub mod template;
pub mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::MailConfig;
use crate::models::tenant;

pub use automation::{DispatchError, DispatchSummary, EmailAutomation};
pub use transport::{HttpMailer, LogMailer};

/// Sender identity of an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sender {
    pub address: String,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Sender {
    /// Platform default sender, overridden field by field by the tenant's
    /// custom email configuration when present.
    pub fn resolve(config: &MailConfig, tenant: Option<&tenant::Model>) -> Self {
        let default = Sender {
            address: config.from_address.clone(),
            name: Some(config.from_name.clone()),
            reply_to: None,
        };

        let Some(tenant) = tenant else {
            return default;
        };

        Sender {
            address: tenant
                .email_from_address
                .clone()
                .filter(|address| !address.trim().is_empty())
                .unwrap_or(default.address),
            name: tenant
                .email_from_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .or(default.name),
            reply_to: tenant.email_reply_to.clone(),
        }
    }
}

/// Fully rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub from: Sender,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid recipient address '{0}'")]
    InvalidRecipient(String),
    #[error("mail transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Builds the mailer selected by `mail.provider`.
pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match (config.provider.as_str(), &config.api_base, &config.api_key) {
        ("http", Some(api_base), Some(api_key)) => Ok(Arc::new(HttpMailer::new(
            api_base.clone(),
            api_key.clone(),
            std::time::Duration::from_secs(config.timeout_seconds),
        )?)),
        _ => Ok(Arc::new(LogMailer)),
    }
}

pub(crate) fn validate_recipient(address: &str) -> Result<(), MailError> {
    let trimmed = address.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(MailError::InvalidRecipient(address.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn tenant_with(address: Option<&str>, name: Option<&str>) -> tenant::Model {
        let now = Utc::now().fixed_offset();
        tenant::Model {
            id: Uuid::new_v4(),
            name: "Acme".to_string(),
            slug: "acme".to_string(),
            owner_id: Uuid::new_v4(),
            email_from_address: address.map(str::to_string),
            email_from_name: name.map(str::to_string),
            email_reply_to: Some("events@acme.test".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn tenant_config_overrides_default_sender() {
        let config = MailConfig::default();
        let tenant = tenant_with(Some("hello@acme.test"), None);

        let sender = Sender::resolve(&config, Some(&tenant));
        assert_eq!(sender.address, "hello@acme.test");
        assert_eq!(sender.name.as_deref(), Some(config.from_name.as_str()));
        assert_eq!(sender.reply_to.as_deref(), Some("events@acme.test"));
    }

    #[test]
    fn blank_tenant_address_falls_back() {
        let config = MailConfig::default();
        let tenant = tenant_with(Some("  "), Some("Acme Events"));

        let sender = Sender::resolve(&config, Some(&tenant));
        assert_eq!(sender.address, config.from_address);
        assert_eq!(sender.name.as_deref(), Some("Acme Events"));
    }

    #[test]
    fn recipient_validation() {
        assert!(validate_recipient("ana@example.com").is_ok());
        assert!(validate_recipient("ana@localhost").is_err());
        assert!(validate_recipient("@example.com").is_err());
    }
}
