//! Session storage.
//!
//! Every operation that mutates a session is a single atomic read-modify-write
//! on that session's key; two concurrent appends to one session can never lose
//! an update. Deployments that scale the request layer horizontally should
//! back this trait with a shared key-value service offering the same per-key
//! atomicity; the in-memory implementation serializes writers through the
//! map's per-key lock.

use crate::error::SessionResult;
use crate::flow::FlowMatch;
use crate::session::{ScanSession, SessionStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use medqr_core::{ScannedEntity, expires_at, now_utc};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Storage trait for scan sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores a new session with an absolute TTL.
    async fn create(&self, session: ScanSession, ttl: Duration) -> SessionResult<()>;

    /// Returns the session, or `None` when absent or expired.
    async fn get(&self, id: Uuid) -> SessionResult<Option<ScanSession>>;

    /// Atomically appends a scan to an *active* session, refreshing its TTL
    /// (sliding window). Returns the updated session, or `None` when the
    /// session is absent, expired, or no longer active.
    async fn append_scan(
        &self,
        id: Uuid,
        scan: ScannedEntity,
        refresh_ttl: Duration,
    ) -> SessionResult<Option<ScanSession>>;

    /// Records a flow match on the session. Returns `false` when absent.
    async fn store_match(&self, id: Uuid, matched: FlowMatch) -> SessionResult<bool>;

    /// Atomically transitions the session's status, stamping the transition
    /// time and shortening retention to `retain_ttl`. Returns the updated
    /// session, or `None` when absent or expired.
    async fn mark_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        retain_ttl: Duration,
    ) -> SessionResult<Option<ScanSession>>;

    /// Evicts expired sessions, returning how many were removed.
    async fn cleanup_expired(&self) -> SessionResult<u64>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    session: ScanSession,
    expires_at: OffsetDateTime,
}

/// In-memory [`SessionStore`] on a concurrent map.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: DashMap<Uuid, StoredSession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: ScanSession, ttl: Duration) -> SessionResult<()> {
        let stored = StoredSession {
            session,
            expires_at: expires_at(now_utc(), ttl),
        };
        self.entries.insert(stored.session.id, stored);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> SessionResult<Option<ScanSession>> {
        let now = now_utc();
        let expired = match self.entries.get(&id) {
            Some(entry) if entry.expires_at <= now => true,
            Some(entry) => return Ok(Some(entry.session.clone())),
            None => return Ok(None),
        };
        if expired {
            self.entries.remove(&id);
        }
        Ok(None)
    }

    async fn append_scan(
        &self,
        id: Uuid,
        scan: ScannedEntity,
        refresh_ttl: Duration,
    ) -> SessionResult<Option<ScanSession>> {
        let now = now_utc();
        let mut expired = false;
        let updated = match self.entries.get_mut(&id) {
            Some(mut entry) => {
                if entry.expires_at <= now {
                    expired = true;
                    None
                } else if !entry.session.is_active() {
                    None
                } else {
                    entry.session.scans.push(scan);
                    entry.expires_at = expires_at(now, refresh_ttl);
                    Some(entry.session.clone())
                }
            }
            None => None,
        };
        if expired {
            self.entries.remove(&id);
        }
        Ok(updated)
    }

    async fn store_match(&self, id: Uuid, matched: FlowMatch) -> SessionResult<bool> {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.session.matched_flow = Some(matched);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        retain_ttl: Duration,
    ) -> SessionResult<Option<ScanSession>> {
        let now = now_utc();
        let mut expired = false;
        let updated = match self.entries.get_mut(&id) {
            Some(mut entry) => {
                if entry.expires_at <= now {
                    expired = true;
                    None
                } else {
                    entry.session.status = status;
                    match status {
                        SessionStatus::Completed => entry.session.completed_at = Some(now),
                        SessionStatus::Ended => entry.session.ended_at = Some(now),
                        SessionStatus::Active => {}
                    }
                    entry.expires_at = expires_at(now, retain_ttl);
                    Some(entry.session.clone())
                }
            }
            None => None,
        };
        if expired {
            self.entries.remove(&id);
        }
        Ok(updated)
    }

    async fn cleanup_expired(&self) -> SessionResult<u64> {
        let now = now_utc();
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.expires_at > now);
        Ok((before - self.entries.len()) as u64)
    }
}
