//! DynamoDB KV backend for production/Lambda deployments.
//!
//! Table schema:
//! - `pk` (S): partition key, the KV key's namespace up to and including its
//!   last `:` (`session:{user}:`)
//! - `sk` (S): sort key, the rest of the KV key (`{session}`)
//! - `value` (S): stored payload
//! - `ttl` (N): Unix timestamp for DynamoDB automatic cleanup
//!
//! Splitting the key this way makes a per-user listing a `Query` on one
//! partition instead of a table scan.
//!
//! DynamoDB deletes expired items lazily (often hours later), so every
//! read also filters on `ttl`.

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{AttributeValue, KeysAndAttributes, ReturnValue};
use std::collections::HashMap;

use super::{KV_BULK_LIMIT, KvStore, StoreError, now_secs};

/// Rounds of `BatchGetItem` retries for unprocessed keys before giving up.
const MAX_BATCH_ROUNDS: usize = 5;

type Item = HashMap<String, AttributeValue>;

/// DynamoDB KV backend.
pub struct DynamoDbKv {
    client: Client,
    table_name: String,
}

impl DynamoDbKv {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

fn unavailable(e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// `(namespace, rest)` with the namespace ending in its last `:`.
/// Both halves must be non-empty to be usable as table keys.
fn split_key(key: &str) -> Result<(&str, &str), StoreError> {
    match key.rfind(':') {
        Some(i) if i + 1 < key.len() => Ok(key.split_at(i + 1)),
        _ => Err(StoreError::InvalidKey(key.to_string())),
    }
}

/// Like [`split_key`], but the rest may be empty (a whole namespace).
fn split_prefix(prefix: &str) -> Result<(&str, &str), StoreError> {
    match prefix.rfind(':') {
        Some(i) => Ok(prefix.split_at(i + 1)),
        None => Err(StoreError::InvalidKey(prefix.to_string())),
    }
}

fn key_of(key: &str) -> Result<Item, StoreError> {
    let (pk, sk) = split_key(key)?;
    Ok(HashMap::from([
        ("pk".to_string(), AttributeValue::S(pk.to_string())),
        ("sk".to_string(), AttributeValue::S(sk.to_string())),
    ]))
}

/// The KV key an item is stored under.
fn item_key(item: &Item) -> Option<String> {
    match (item.get("pk"), item.get("sk")) {
        (Some(AttributeValue::S(pk)), Some(AttributeValue::S(sk))) => Some(format!("{}{}", pk, sk)),
        _ => None,
    }
}

/// Value of an item, unless its `ttl` has already passed.
fn live_value(item: &Item, now: u64) -> Option<String> {
    let ttl = item
        .get("ttl")
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    if ttl <= now {
        return None;
    }
    item.get("value")?.as_s().ok().cloned()
}

impl KvStore for DynamoDbKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key_of(key)?))
            .consistent_read(true)
            .send()
            .await
            .map_err(unavailable)?;

        Ok(result.item().and_then(|item| live_value(item, now_secs())))
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>, StoreError> {
        if keys.len() > KV_BULK_LIMIT {
            return Err(StoreError::TooManyKeys(keys.len()));
        }

        let now = now_secs();
        let mut found = HashMap::new();
        let mut pending: Vec<Item> = keys
            .iter()
            .map(|k| key_of(k))
            .collect::<Result<_, _>>()?;

        for _ in 0..MAX_BATCH_ROUNDS {
            if pending.is_empty() {
                return Ok(found);
            }

            let request = KeysAndAttributes::builder()
                .set_keys(Some(std::mem::take(&mut pending)))
                .consistent_read(true)
                .build()
                .map_err(unavailable)?;

            let result = self
                .client
                .batch_get_item()
                .request_items(&self.table_name, request)
                .send()
                .await
                .map_err(unavailable)?;

            if let Some(items) = result.responses().and_then(|r| r.get(&self.table_name)) {
                for item in items {
                    if let (Some(key), Some(value)) = (item_key(item), live_value(item, now)) {
                        found.insert(key, value);
                    }
                }
            }

            // Throttled reads come back as unprocessed keys; ask again.
            pending = result
                .unprocessed_keys()
                .and_then(|u| u.get(&self.table_name))
                .map(|ka| ka.keys().to_vec())
                .unwrap_or_default();
        }

        if pending.is_empty() {
            Ok(found)
        } else {
            Err(StoreError::Unavailable(format!(
                "{} keys still unprocessed after {} rounds",
                pending.len(),
                MAX_BATCH_ROUNDS
            )))
        }
    }

    async fn put(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), StoreError> {
        let ttl = now_secs() + ttl_secs.max(1);

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(key_of(key)?))
            .item("value", AttributeValue::S(value))
            .item("ttl", AttributeValue::N(ttl.to_string()))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to write {}: {}", key, e);
                unavailable(e)
            })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(key_of(key)?))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete {}: {}", key, e);
                unavailable(e)
            })?;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        // DeleteItem is atomic per item; only one caller gets the old image.
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(key_of(key)?))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to take {}: {}", key, e);
                unavailable(e)
            })?;

        Ok(result
            .attributes()
            .and_then(|item| live_value(item, now_secs())))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let (namespace, rest) = split_prefix(prefix)?;
        let now = now_secs();
        let mut keys = Vec::new();
        let mut start_key: Option<Item> = None;

        // An empty string is not a valid key operand, so a whole-namespace
        // listing drops the sort key condition.
        let key_condition = if rest.is_empty() {
            "pk = :pk"
        } else {
            "pk = :pk AND begins_with(sk, :rest)"
        };

        loop {
            let mut query = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression(key_condition)
                .filter_expression("#ttl > :now")
                .expression_attribute_names("#ttl", "ttl")
                .expression_attribute_values(":pk", AttributeValue::S(namespace.to_string()))
                .expression_attribute_values(":now", AttributeValue::N(now.to_string()))
                .projection_expression("pk, sk")
                .consistent_read(true)
                .set_exclusive_start_key(start_key.take());
            if !rest.is_empty() {
                query = query
                    .expression_attribute_values(":rest", AttributeValue::S(rest.to_string()));
            }

            let page = query.send().await.map_err(unavailable)?;
            keys.extend(page.items().iter().filter_map(item_key));

            match page.last_evaluated_key() {
                Some(last) if !last.is_empty() => start_key = Some(last.clone()),
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }
}
