//! Token record storage.
//!
//! Maps a token's UUID to the entity it denotes. Entries carry an absolute
//! expiry enforced by the store; ephemeral records are additionally checked
//! against wall-clock elapsed time at resolution (see
//! [`TokenService::resolve`](crate::TokenService::resolve)).
//!
//! Deployments that scale the request layer horizontally should back this
//! trait with a shared out-of-process key-value service; the in-memory
//! implementation is for single-process use and tests.

use crate::error::TokenResult;
use async_trait::async_trait;
use dashmap::DashMap;
use medqr_core::{EntityType, expires_at, now_utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// What a stored token denotes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub ephemeral: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Storage trait for token records.
///
/// Lookup keys are the random v4 UUIDs embedded in token text, so ids never
/// collide across the store's lifetime.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Stores a record under `id` with an absolute TTL.
    async fn put(&self, id: Uuid, record: TokenRecord, ttl: Duration) -> TokenResult<()>;

    /// Returns the record for `id`, or `None` when absent or expired.
    async fn get(&self, id: Uuid) -> TokenResult<Option<TokenRecord>>;

    /// Removes the record for `id`. Returns `true` when something was removed.
    async fn delete(&self, id: Uuid) -> TokenResult<bool>;

    /// Evicts all expired entries, returning how many were removed.
    async fn cleanup_expired(&self) -> TokenResult<u64>;
}

#[derive(Debug, Clone)]
struct StoredToken {
    record: TokenRecord,
    expires_at: OffsetDateTime,
}

/// In-memory [`TokenStore`] on a concurrent map with lazy expiry.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    entries: DashMap<Uuid, StoredToken>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of live (possibly expired, not yet evicted) entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn put(&self, id: Uuid, record: TokenRecord, ttl: Duration) -> TokenResult<()> {
        let stored = StoredToken {
            record,
            expires_at: expires_at(now_utc(), ttl),
        };
        self.entries.insert(id, stored);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> TokenResult<Option<TokenRecord>> {
        let now = now_utc();
        let expired = match self.entries.get(&id) {
            Some(entry) if entry.expires_at <= now => true,
            Some(entry) => return Ok(Some(entry.record.clone())),
            None => return Ok(None),
        };
        if expired {
            self.entries.remove(&id);
        }
        Ok(None)
    }

    async fn delete(&self, id: Uuid) -> TokenResult<bool> {
        Ok(self.entries.remove(&id).is_some())
    }

    async fn cleanup_expired(&self) -> TokenResult<u64> {
        let now = now_utc();
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.expires_at > now);
        Ok((before - self.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ephemeral: bool) -> TokenRecord {
        TokenRecord {
            entity_type: EntityType::Device,
            entity_id: "42".to_string(),
            ephemeral,
            created_at: now_utc(),
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryTokenStore::new();
        let id = Uuid::new_v4();
        store
            .put(id, record(false), Duration::from_secs(60))
            .await
            .unwrap();

        let found = store.get(id).await.unwrap().unwrap();
        assert_eq!(found.entity_id, "42");

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_evicts_expired() {
        let store = InMemoryTokenStore::new();
        let id = Uuid::new_v4();
        store
            .put(id, record(true), Duration::from_secs(0))
            .await
            .unwrap();

        assert!(store.get(id).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = InMemoryTokenStore::new();
        store
            .put(Uuid::new_v4(), record(true), Duration::from_secs(0))
            .await
            .unwrap();
        store
            .put(Uuid::new_v4(), record(false), Duration::from_secs(300))
            .await
            .unwrap();

        let evicted = store.cleanup_expired().await.unwrap();
        assert_eq!(evicted, 1);
        assert_eq!(store.len(), 1);
    }
}
