//! Delivery of one-time sign-in codes.

use std::future::Future;
use std::sync::Mutex;

use serde_json::json;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mail provider rejected the message: {status} {body}")]
    Rejected { status: u16, body: String },
}

/// Something that can deliver a sign-in code to an address.
pub trait CodeSender: Send + Sync {
    fn send_code(
        &self,
        email: &str,
        code: &str,
    ) -> impl Future<Output = Result<(), MailError>> + Send;
}

/// Development sender: writes the code to the log instead of mailing it.
pub struct LogSender;

impl CodeSender for LogSender {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), MailError> {
        tracing::info!(event = "code_send", %email, %code, "sign-in code (not mailed)");
        Ok(())
    }
}

/// Sends codes through the Resend HTTP API.
pub struct ResendSender {
    http: reqwest::Client,
    api_key: String,
    from: String,
    api_url: String,
}

impl ResendSender {
    pub fn new(http: reqwest::Client, api_key: String, from: String) -> Self {
        Self {
            http,
            api_key,
            from,
            api_url: RESEND_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

impl CodeSender for ResendSender {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), MailError> {
        let body = json!({
            "from": self.from,
            "to": [email],
            "subject": format!("Your sign-in code: {}", code),
            "text": format!(
                "Your sign-in code is {}.\n\nIt expires in 10 minutes. If you did not request it, you can ignore this email.",
                code
            ),
        });

        let resp = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Rejected { status, body });
        }
        Ok(())
    }
}

/// Keeps every code in memory. Used by tests and local previews.
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<(String, String)>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent code sent to `email`.
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        let sent = self.sent.lock().ok()?;
        sent.iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CodeSender for Outbox {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), MailError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((email.to_string(), code.to_string()));
        }
        Ok(())
    }
}

/// Configured code sender.
pub enum Mailer {
    Log(LogSender),
    Resend(ResendSender),
    Outbox(Outbox),
}

impl Mailer {
    pub fn outbox(&self) -> Option<&Outbox> {
        match self {
            Mailer::Outbox(outbox) => Some(outbox),
            _ => None,
        }
    }
}

impl CodeSender for Mailer {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), MailError> {
        match self {
            Mailer::Log(sender) => sender.send_code(email, code).await,
            Mailer::Resend(sender) => sender.send_code(email, code).await,
            Mailer::Outbox(sender) => sender.send_code(email, code).await,
        }
    }
}
