//! Key-value storage with per-key expiry.
//!
//! Sessions, pending one-time codes and OAuth state all live here. The
//! contract follows edge KV stores: TTLs are whole seconds, keys are
//! enumerated by prefix, and bulk reads are capped at [`KV_BULK_LIMIT`]
//! keys per call.

pub mod dynamodb;
pub mod memory;

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Maximum number of keys accepted by a single [`KvStore::get_many`] call.
pub const KV_BULK_LIMIT: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("bulk read of {0} keys exceeds the per-call limit")]
    TooManyKeys(usize),

    #[error("key {0:?} has no namespace")]
    InvalidKey(String),
}

/// Pluggable key-value backend.
///
/// Expired entries must never be returned, even if the backend has not
/// physically evicted them yet.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str)
    -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Fetch up to [`KV_BULK_LIMIT`] keys. Missing or expired keys are
    /// absent from the returned map.
    fn get_many(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<HashMap<String, String>, StoreError>> + Send;

    /// Write `value` under `key`, expiring after `ttl_secs` (minimum 1).
    fn put(
        &self,
        key: &str,
        value: String,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a key. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a key and return its live value in one store operation.
    ///
    /// Of any number of concurrent takes of the same key, at most one sees
    /// the value.
    fn take(&self, key: &str)
    -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// All live keys starting with `prefix`, in lexical order.
    ///
    /// Keys are namespaced with `:`. Listing stays inside the namespace the
    /// prefix names: `session:u1:` finds `session:u1:s1` but need not find
    /// `session:u1:x:y`.
    fn list_keys(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;
}

/// Type-erased KV backend.
///
/// `KvStore` uses RPITIT so it is not object-safe; this enum dispatches
/// manually instead.
pub enum AnyKv {
    Memory(memory::MemoryKv),
    DynamoDb(dynamodb::DynamoDbKv),
}

impl KvStore for AnyKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            AnyKv::Memory(kv) => kv.get(key).await,
            AnyKv::DynamoDb(kv) => kv.get(key).await,
        }
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>, StoreError> {
        match self {
            AnyKv::Memory(kv) => kv.get_many(keys).await,
            AnyKv::DynamoDb(kv) => kv.get_many(keys).await,
        }
    }

    async fn put(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), StoreError> {
        match self {
            AnyKv::Memory(kv) => kv.put(key, value, ttl_secs).await,
            AnyKv::DynamoDb(kv) => kv.put(key, value, ttl_secs).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self {
            AnyKv::Memory(kv) => kv.delete(key).await,
            AnyKv::DynamoDb(kv) => kv.delete(key).await,
        }
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            AnyKv::Memory(kv) => kv.take(key).await,
            AnyKv::DynamoDb(kv) => kv.take(key).await,
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        match self {
            AnyKv::Memory(kv) => kv.list_keys(prefix).await,
            AnyKv::DynamoDb(kv) => kv.list_keys(prefix).await,
        }
    }
}

/// Run a store call with an upper bound on how long it may take.
pub async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub(crate) fn now_secs() -> u64 {
    now_millis() / 1000
}
