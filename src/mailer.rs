//! Mail collaborator: delivers the RFQ quote request to the supplier.
//!
//! Delivery goes through a JSON mail API; the spreadsheet attachment is
//! base64-encoded into the payload. Callers must only advance persisted
//! state after `send` returns Ok.

use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachment: Option<EmailAttachment>,
}

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("mail transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail service rejected the message: {0}")]
    Rejected(String),

    #[error("mail delivery is not configured; set APP__MAIL_API_URL and APP__MAIL_API_KEY")]
    NotConfigured,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Hands the message to the transport. Ok means accepted for delivery.
    async fn send(&self, mail: &OutboundEmail) -> Result<(), MailerError>;
}

/// Mailer backed by an HTTP mail-delivery API.
pub struct HttpMailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url,
            api_key,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    #[instrument(skip(self, mail), fields(to = %mail.to, subject = %mail.subject))]
    async fn send(&self, mail: &OutboundEmail) -> Result<(), MailerError> {
        let attachments: Vec<serde_json::Value> = mail
            .attachment
            .iter()
            .map(|a| {
                json!({
                    "filename": a.filename,
                    "type": a.content_type,
                    "content": base64::engine::general_purpose::STANDARD.encode(&a.bytes),
                })
            })
            .collect();

        let payload = json!({
            "from": { "email": mail.from },
            "personalizations": [{ "to": [{ "email": mail.to }] }],
            "subject": mail.subject,
            "content": [{ "type": "text/html", "value": mail.html_body }],
            "attachments": attachments,
        });

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MailerError::Rejected(format!("{}: {}", status, body)));
        }

        info!("mail accepted by transport");
        Ok(())
    }
}

/// Placeholder used when no mail API is configured; sends always fail so
/// RFQs stay in Draft rather than silently claiming dispatch.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _mail: &OutboundEmail) -> Result<(), MailerError> {
        Err(MailerError::NotConfigured)
    }
}
