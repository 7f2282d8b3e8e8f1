//! Server-side session management.
//!
//! Sessions are JSON records in the KV store under
//! `session:{userId}:{sessionId}`, so all sessions of one user can be
//! enumerated by prefix. Each record carries an absolute `expiresAt`; the
//! store TTL is only a cleanup fallback.

pub mod cookie;

use axum::http::HeaderMap;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::kv::{KV_BULK_LIMIT, KvStore, StoreError, bounded, now_millis};

const SESSION_KEY_PREFIX: &str = "session";

/// A stored browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub user_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Epoch milliseconds.
    pub created_at: u64,
    /// Epoch milliseconds.
    pub expires_at: u64,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}

/// Best-effort client details recorded with a new session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub country: Option<String>,
}

impl SessionMetadata {
    /// Read client details from request headers, falling back to sentinels.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        let ip_address = header("cf-connecting-ip").or_else(|| {
            header("x-forwarded-for")
                .and_then(|v| v.split(',').next().map(|hop| hop.trim().to_string()))
                .filter(|v| !v.is_empty())
        });

        Self {
            user_agent: Some(header("user-agent").unwrap_or_else(|| "Unknown".into())),
            ip_address: Some(ip_address.unwrap_or_else(|| "127.0.0.1".into())),
            country: Some(header("cf-ipcountry").unwrap_or_else(|| "Unknown".into())),
        }
    }
}

/// Fields that may be changed on an existing session.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub expires_at: Option<u64>,
}

/// Session store over any [`KvStore`].
pub struct SessionManager<K: KvStore> {
    kv: Arc<K>,
    ttl: Duration,
    timeout: Duration,
}

impl<K: KvStore> SessionManager<K> {
    pub fn new(kv: Arc<K>, ttl: Duration, timeout: Duration) -> Self {
        Self { kv, ttl, timeout }
    }

    fn user_prefix(user_id: &str) -> String {
        format!("{}:{}:", SESSION_KEY_PREFIX, user_id)
    }

    fn session_key(user_id: &str, session_id: &str) -> String {
        format!("{}{}", Self::user_prefix(user_id), session_id)
    }

    fn parse(key: &str, raw: &str) -> Option<SessionRecord> {
        serde_json::from_str(raw)
            .map_err(|e| tracing::warn!("Ignoring unreadable session record {}: {}", key, e))
            .ok()
    }

    /// Create a session and return its id.
    pub async fn create_session(
        &self,
        user_id: &str,
        metadata: SessionMetadata,
    ) -> Result<String, StoreError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();
        let record = SessionRecord {
            user_id: user_id.to_string(),
            session_id: session_id.clone(),
            user_agent: metadata.user_agent,
            ip_address: metadata.ip_address,
            country: metadata.country,
            created_at: now,
            expires_at: now + self.ttl.as_millis() as u64,
        };

        self.write(&record, self.ttl.as_secs()).await?;
        tracing::debug!(user_id, session_id = %session_id, "session created");
        Ok(session_id)
    }

    /// Fetch a session record as stored. Callers decide validity with
    /// [`SessionRecord::is_expired_at`]: the store may still hold a record
    /// whose expiry has passed.
    pub async fn get_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let key = Self::session_key(user_id, session_id);
        let raw = bounded(self.timeout, self.kv.get(&key)).await?;
        Ok(raw.and_then(|r| Self::parse(&key, &r)))
    }

    pub async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), StoreError> {
        let key = Self::session_key(user_id, session_id);
        bounded(self.timeout, self.kv.delete(&key)).await
    }

    /// Unexpired sessions of a user, newest first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let keys = self.user_keys(user_id).await?;
        let now = now_millis();
        let mut sessions = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(KV_BULK_LIMIT) {
            let values = bounded(self.timeout, self.kv.get_many(chunk)).await?;
            sessions.extend(
                values
                    .iter()
                    .filter_map(|(key, raw)| Self::parse(key, raw))
                    .filter(|s| !s.is_expired_at(now)),
            );
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Number of session keys a user currently holds.
    pub async fn count_sessions(&self, user_id: &str) -> Result<usize, StoreError> {
        Ok(self.user_keys(user_id).await?.len())
    }

    pub async fn delete_all_sessions(&self, user_id: &str) -> Result<(), StoreError> {
        let keys = self.user_keys(user_id).await?;
        self.delete_keys(&keys).await
    }

    /// Delete every session of the user except `keep_session_id`.
    pub async fn delete_other_sessions(
        &self,
        user_id: &str,
        keep_session_id: &str,
    ) -> Result<(), StoreError> {
        let prefix = Self::user_prefix(user_id);
        let doomed: Vec<String> = self
            .user_keys(user_id)
            .await?
            .into_iter()
            .filter(|key| {
                key.strip_prefix(&prefix)
                    .is_some_and(|id| !id.is_empty() && id != keep_session_id)
            })
            .collect();
        self.delete_keys(&doomed).await
    }

    /// Merge `update` into an existing session. Returns `false` if the
    /// session does not exist.
    pub async fn update_session(
        &self,
        user_id: &str,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<bool, StoreError> {
        let Some(mut record) = self.get_session(user_id, session_id).await? else {
            return Ok(false);
        };

        if let Some(user_agent) = update.user_agent {
            record.user_agent = Some(user_agent);
        }
        if let Some(ip_address) = update.ip_address {
            record.ip_address = Some(ip_address);
        }
        if let Some(country) = update.country {
            record.country = Some(country);
        }
        if let Some(expires_at) = update.expires_at {
            record.expires_at = expires_at;
        }

        // Remaining lifetime rounded up to whole seconds. A record already
        // past its expiry still gets the 1s floor; validation rejects it anyway.
        let remaining_ms = record.expires_at.saturating_sub(now_millis());
        let ttl_secs = remaining_ms.div_ceil(1000).max(1);

        self.write(&record, ttl_secs).await?;
        Ok(true)
    }

    /// Push a session's expiry to a full TTL from now.
    pub async fn refresh_session(&self, user_id: &str, session_id: &str) -> Result<bool, StoreError> {
        let update = SessionUpdate {
            expires_at: Some(now_millis() + self.ttl.as_millis() as u64),
            ..Default::default()
        };
        self.update_session(user_id, session_id, update).await
    }

    async fn write(&self, record: &SessionRecord, ttl_secs: u64) -> Result<(), StoreError> {
        let key = Self::session_key(&record.user_id, &record.session_id);
        let value = serde_json::to_string(record)
            .map_err(|e| StoreError::Unavailable(format!("serialize session: {}", e)))?;
        bounded(self.timeout, self.kv.put(&key, value, ttl_secs)).await
    }

    async fn user_keys(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let prefix = Self::user_prefix(user_id);
        bounded(self.timeout, self.kv.list_keys(&prefix)).await
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<(), StoreError> {
        try_join_all(
            keys.iter()
                .map(|key| bounded(self.timeout, self.kv.delete(key))),
        )
        .await?;
        Ok(())
    }
}
