//! Shared application state: all services wired over in-memory stores.

use crate::config::AppConfig;
use anyhow::Context;
use medqr_ops::{
    HandlerRegistry, InMemoryDomain, InMemoryExecutionStore, OperationCatalog, OperationExecutor,
};
use medqr_session::{
    FlowCatalog, InMemorySessionStore, SessionConfig, SessionService, SessionStore,
};
use medqr_token::{InMemoryTokenStore, Signer, TokenConfig, TokenService, TokenStore, generate_secret};
use std::sync::Arc;
use url::Url;

#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenService,
    pub sessions: SessionService,
    pub executor: Arc<OperationExecutor>,
    pub domain: Arc<InMemoryDomain>,
    pub token_store: Arc<InMemoryTokenStore>,
    pub session_store: Arc<InMemorySessionStore>,
    pub base_url: Url,
}

impl AppState {
    /// Wire every service from configuration. Catalogue validation runs
    /// here, so a definition bound to an unknown handler code aborts
    /// startup.
    pub fn build(cfg: &AppConfig) -> anyhow::Result<Self> {
        let secret = if cfg.security.secret_key.is_empty() {
            tracing::warn!(
                "no signing key configured; generated an ephemeral key, previously issued tokens are invalid"
            );
            generate_secret()
        } else {
            cfg.security.secret_key.clone()
        };

        let token_store = Arc::new(InMemoryTokenStore::new());
        let tokens = TokenService::with_config(
            Signer::new(&secret),
            token_store.clone() as Arc<dyn TokenStore>,
            TokenConfig {
                ephemeral_ttl: cfg.tokens.ephemeral_ttl,
                permanent_ttl: cfg.tokens.permanent_ttl,
            },
        );

        let session_store = Arc::new(InMemorySessionStore::new());
        let sessions = SessionService::with_config(
            session_store.clone() as Arc<dyn SessionStore>,
            FlowCatalog::standard(),
            SessionConfig {
                active_ttl: cfg.sessions.active_ttl,
                retain_ttl: cfg.sessions.retain_ttl,
            },
        );

        let registry = HandlerRegistry::standard();
        let catalog = OperationCatalog::standard(&registry)
            .context("operation catalogue failed validation")?;
        let domain = Arc::new(InMemoryDomain::new());
        let executor = Arc::new(OperationExecutor::new(
            catalog,
            registry,
            Arc::new(InMemoryExecutionStore::new()),
            domain.clone(),
        ));

        let base_url = Url::parse(&cfg.base_url()).context("invalid base URL")?;

        Ok(Self {
            tokens,
            sessions,
            executor,
            domain,
            token_store,
            session_store,
            base_url,
        })
    }
}
