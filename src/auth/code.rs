//! Emailed one-time code sign-in.
//!
//! `send_code` stores a short code under `totp:{email}` and mails it; a later
//! `verify` consumes the record before comparing, so every code can be tried
//! exactly once whether or not the attempt succeeds.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use super::Strategy;
use super::mailer::{CodeSender, Mailer};
use crate::error::AuthError;
use crate::identity::{AuthProfile, Provider};
use crate::kv::{KvStore, bounded, now_millis};

/// How long an issued code stays valid.
pub const CODE_TTL_SECS: u64 = 10 * 60;

const CODE_LENGTH: usize = 6;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_KEY_PREFIX: &str = "totp";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCode {
    code: String,
    /// Epoch milliseconds.
    expires_at: u64,
}

/// A code typed in by the person signing in, for the address it was sent to.
#[derive(Debug, Clone)]
pub struct CodeSubmission {
    pub email: String,
    pub code: String,
}

pub struct CodeStrategy<K: KvStore> {
    kv: Arc<K>,
    mailer: Arc<Mailer>,
    timeout: Duration,
}

impl<K: KvStore> CodeStrategy<K> {
    pub fn new(kv: Arc<K>, mailer: Arc<Mailer>, timeout: Duration) -> Self {
        Self {
            kv,
            mailer,
            timeout,
        }
    }

    fn key(email: &str) -> String {
        format!("{}:{}", CODE_KEY_PREFIX, email)
    }

    /// Issue a fresh code for `email` and hand it to the mailer.
    ///
    /// Returns the normalized address. Delivery happens in the background;
    /// a failed send is logged and the person can simply request another code.
    pub async fn send_code(&self, email: &str) -> Result<String, AuthError> {
        let email = normalize_email(email).ok_or(AuthError::InvalidEmail)?;
        let code = generate_code();

        let record = StoredCode {
            code: code.clone(),
            expires_at: now_millis() + CODE_TTL_SECS * 1000,
        };
        let value = serde_json::to_string(&record).map_err(|e| {
            tracing::error!("Failed to serialize sign-in code: {}", e);
            AuthError::LoginFailed
        })?;

        bounded(
            self.timeout,
            self.kv.put(&Self::key(&email), value, CODE_TTL_SECS),
        )
        .await?;

        let mailer = self.mailer.clone();
        let to = email.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_code(&to, &code).await {
                tracing::error!(event = "code_send_failed", email = %to, error = %e, "sign-in code not delivered");
            }
        });

        Ok(email)
    }
}

impl<K: KvStore> Strategy for CodeStrategy<K> {
    type Input = CodeSubmission;

    fn provider(&self) -> Provider {
        Provider::Code
    }

    async fn verify(&self, input: CodeSubmission) -> Result<AuthProfile, AuthError> {
        let email = normalize_email(&input.email).ok_or(AuthError::InvalidOrExpiredCode)?;
        let key = Self::key(&email);

        // Single use: gone before we even look at it, and only one of any
        // concurrent attempts gets it.
        let stored = bounded(self.timeout, self.kv.take(&key)).await?;
        let Some(stored) = stored else {
            return Err(AuthError::InvalidOrExpiredCode);
        };

        let stored: StoredCode =
            serde_json::from_str(&stored).map_err(|_| AuthError::InvalidOrExpiredCode)?;

        let submitted = input.code.trim().to_uppercase();
        let matches: bool = stored.code.as_bytes().ct_eq(submitted.as_bytes()).into();
        if !matches || now_millis() >= stored.expires_at {
            return Err(AuthError::InvalidOrExpiredCode);
        }

        Ok(AuthProfile::email_only(email, Provider::Code))
    }
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Lowercased address if it looks deliverable, `None` otherwise.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return None;
    }

    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || local.len() > 64 || domain.contains('@') {
        return None;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    let valid_domain = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });

    valid_domain.then_some(email)
}
