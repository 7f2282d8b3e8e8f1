//! In-memory KV backend for development and testing.
//!
//! Uses `DashMap` for concurrent access without external locks. Expired
//! entries are evicted lazily on read and on listing.

use dashmap::DashMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{KV_BULK_LIMIT, KvStore, StoreError};

struct Entry {
    value: String,
    expires: Instant,
}

/// In-memory KV store.
///
/// Not suitable for production: entries are lost on restart and not
/// shared across processes. Use the DynamoDB backend for production.
#[derive(Default)]
pub struct MemoryKv {
    store: DashMap<String, Entry>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held (including expired ones not yet evicted).
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn live_value(&self, key: &str, now: Instant) -> Option<String> {
        let entry = self.store.get(key)?;
        if entry.expires <= now {
            drop(entry); // Release the read lock before removing
            self.store.remove_if(key, |_, e| e.expires <= now);
            return None;
        }
        Some(entry.value.clone())
    }
}

impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.live_value(key, Instant::now()))
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>, StoreError> {
        if keys.len() > KV_BULK_LIMIT {
            return Err(StoreError::TooManyKeys(keys.len()));
        }
        let now = Instant::now();
        Ok(keys
            .iter()
            .filter_map(|k| self.live_value(k, now).map(|v| (k.clone(), v)))
            .collect())
    }

    async fn put(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), StoreError> {
        let expires = Instant::now() + Duration::from_secs(ttl_secs.max(1));
        self.store.insert(key.to_string(), Entry { value, expires });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        Ok(self
            .store
            .remove(key)
            .filter(|(_, entry)| entry.expires > now)
            .map(|(_, entry)| entry.value))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        self.store.retain(|_, e| e.expires > now);
        let mut keys: Vec<String> = self
            .store
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
