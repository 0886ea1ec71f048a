//! Mail transports.

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use super::{MailError, Mailer, OutgoingEmail, validate_recipient};

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        validate_recipient(&email.to)?;
        info!(
            to = %email.to,
            from = %email.from.address,
            subject = %email.subject,
            body_len = email.body.len(),
            "Email delivery (log transport)"
        );
        counter!("emails_sent_total", "transport" => "log").increment(1);
        Ok(())
    }
}

/// Posts messages as JSON to an HTTP email provider.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: String, timeout: Duration) -> Result<Self, MailError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        validate_recipient(&email.to)?;

        let payload = json!({
            "from": { "email": email.from.address, "name": email.from.name },
            "reply_to": email.from.reply_to,
            "to": [{ "email": email.to }],
            "subject": email.subject,
            "text": email.body,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            counter!("emails_sent_total", "transport" => "http").increment(1);
            return Ok(());
        }

        let body: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect();
        warn!(status = status.as_u16(), to = %email.to, "Mail provider rejected message");
        counter!("emails_failed_total", "transport" => "http").increment(1);

        Err(MailError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
