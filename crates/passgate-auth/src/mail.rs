//! Outbound email delivery

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use passgate_common::config::{MailConfig, MailProvider};
use passgate_common::error::{Error, Result};

/// A message ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

/// Mail sender trait for extensibility
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// Build the sender selected by the mail configuration
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn MailSender>> {
    match config.provider {
        MailProvider::Log => Ok(Arc::new(LogMailer)),
        MailProvider::Http => Ok(Arc::new(HttpMailer::from_config(config)?)),
    }
}

/// Logs recipient and subject instead of sending; the body is dropped
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, "Email written to log instead of sent");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailBody {
    sender: EmailAddress,
    to: Vec<EmailAddress>,
    subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    html_content: Option<String>,
    text_content: String,
}

/// Sends mail through a transactional-mail HTTP API
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    sender_email: String,
    sender_name: Option<String>,
}

impl HttpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let api_key = require(config.api_key.as_deref(), "mail.api_key")?;
        let sender_email = require(config.sender_email.as_deref(), "mail.sender_email")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("passgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build mail client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            sender_email,
            sender_name: config.sender_name.clone(),
        })
    }

    fn body(&self, email: &OutgoingEmail) -> SendEmailBody {
        SendEmailBody {
            sender: EmailAddress {
                email: self.sender_email.clone(),
                name: self.sender_name.clone(),
            },
            to: vec![EmailAddress {
                email: email.to.clone(),
                name: None,
            }],
            subject: email.subject.clone(),
            html_content: email.html.clone(),
            text_content: email.text.clone(),
        }
    }
}

#[async_trait]
impl MailSender for HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let response = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .header("Accept", "application/json")
            .json(&self.body(email))
            .send()
            .await
            .map_err(|e| Error::MailError(format!("Request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::MailError(format!(
            "Mail API responded with status {status}: {body}"
        )))
    }
}

fn require(value: Option<&str>, key: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::ConfigError(format!("{key} is required"))),
    }
}

/// Keeps sent mail in memory; optionally fails every send
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().clone()
    }

    pub fn last_to(&self, to: &str) -> Option<OutgoingEmail> {
        self.sent.lock().iter().rev().find(|m| m.to == to).cloned()
    }
}

#[async_trait]
impl MailSender for MemoryMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        if self.fail {
            return Err(Error::MailError("delivery disabled".to_string()));
        }
        self.sent.lock().push(email.clone());
        Ok(())
    }
}
