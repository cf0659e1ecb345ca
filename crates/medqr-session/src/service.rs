//! Session lifecycle and flow-matching service.

use crate::error::{SessionError, SessionResult};
use crate::flow::{FlowCatalog, FlowDefinition, FlowMatch};
use crate::session::{DeviceClass, ScanSession, SessionStatus};
use crate::store::SessionStore;
use medqr_core::{EntityType, ScannedEntity, now_utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Retention windows for session records.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sliding TTL of an active session; refreshed on every successful scan.
    pub active_ttl: Duration,
    /// Short retention after completion/ending, for late client reads.
    pub retain_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            active_ttl: Duration::from_secs(300),
            retain_ttl: Duration::from_secs(60),
        }
    }
}

/// Result of appending one scan. The API layer shapes this into its
/// `matched: true/false` response form.
#[derive(Debug, Clone, Serialize)]
pub enum ScanOutcome {
    Matched {
        flow: FlowDefinition,
        /// `true` when the flow needs a manual confirm before execution.
        action_required: bool,
    },
    NoMatch {
        scan_count: usize,
        current_sequence: Vec<EntityType>,
    },
}

/// What `execute_flow` hands back for the caller to invoke.
#[derive(Debug, Clone, Serialize)]
pub struct FlowExecution {
    pub flow_name: String,
    pub action: String,
    pub entities: Vec<ScannedEntity>,
}

/// Tracks scan sessions and recognizes configured workflows.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    catalog: Arc<FlowCatalog>,
    config: SessionConfig,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, catalog: FlowCatalog) -> Self {
        Self::with_config(store, catalog, SessionConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn SessionStore>,
        catalog: FlowCatalog,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            catalog: Arc::new(catalog),
            config,
        }
    }

    pub fn catalog(&self) -> &FlowCatalog {
        &self.catalog
    }

    /// Open a new active session with an empty scan list.
    pub async fn start_session(
        &self,
        user_id: &str,
        device_class: DeviceClass,
    ) -> SessionResult<Uuid> {
        let session = ScanSession::new(user_id, device_class);
        let id = session.id;
        self.store.create(session, self.config.active_ttl).await?;
        tracing::debug!(session_id = %id, user_id, "session started");
        Ok(id)
    }

    /// Append a scan and check the updated sequence against every configured
    /// flow, in catalog order.
    pub async fn add_scan(
        &self,
        session_id: Uuid,
        scan: ScannedEntity,
    ) -> SessionResult<ScanOutcome> {
        let session = self
            .store
            .append_scan(session_id, scan, self.config.active_ttl)
            .await?
            .ok_or(SessionError::SessionNotFound)?;

        let sequence = session.type_sequence();
        match self.catalog.matches(&sequence) {
            Some(flow) => {
                let matched = FlowMatch {
                    name: flow.name.clone(),
                    action: flow.action.clone(),
                    auto_execute: flow.auto_execute,
                    matched_at: now_utc(),
                };
                self.store.store_match(session_id, matched).await?;
                tracing::info!(
                    session_id = %session_id,
                    flow = %flow.name,
                    auto_execute = flow.auto_execute,
                    "flow matched"
                );
                Ok(ScanOutcome::Matched {
                    flow: flow.clone(),
                    action_required: !flow.auto_execute,
                })
            }
            None => Ok(ScanOutcome::NoMatch {
                scan_count: session.scans.len(),
                current_sequence: sequence,
            }),
        }
    }

    /// Mark a matched session completed and return its action plus the full
    /// scanned-entity list for the caller to invoke. Mutates no domain
    /// entities itself.
    pub async fn execute_flow(&self, session_id: Uuid) -> SessionResult<FlowExecution> {
        let session = self
            .store
            .get(session_id)
            .await?
            .ok_or(SessionError::SessionNotFound)?;
        let matched = session.matched_flow.ok_or(SessionError::NoMatchedFlow)?;

        let completed = self
            .store
            .mark_status(session_id, SessionStatus::Completed, self.config.retain_ttl)
            .await?
            .ok_or(SessionError::SessionNotFound)?;

        tracing::info!(session_id = %session_id, flow = %matched.name, "flow executed");
        Ok(FlowExecution {
            flow_name: matched.name,
            action: matched.action,
            entities: completed.scans,
        })
    }

    /// End a session early. Returns `false` when it was already gone.
    pub async fn end_session(&self, session_id: Uuid) -> SessionResult<bool> {
        let ended = self
            .store
            .mark_status(session_id, SessionStatus::Ended, self.config.retain_ttl)
            .await?
            .is_some();
        if ended {
            tracing::debug!(session_id = %session_id, "session ended");
        }
        Ok(ended)
    }

    pub async fn get_session(&self, session_id: Uuid) -> SessionResult<Option<ScanSession>> {
        self.store.get(session_id).await
    }
}
