use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use medqr_session::SessionStore;
use medqr_token::TokenStore;

use crate::{config::AppConfig, routes, state::AppState};

pub struct MedqrServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<MedqrServer> {
        let state = AppState::build(&self.config)?;
        spawn_cleanup_sweep(state.clone(), self.config.cleanup.interval);

        Ok(MedqrServer {
            addr: self.config.addr(),
            app: routes::build_app(state),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MedqrServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

/// Periodically evict expired tokens and sessions. The stores also evict
/// lazily on access; the sweep keeps memory bounded for keys nobody reads
/// again.
fn spawn_cleanup_sweep(state: AppState, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match state.token_store.cleanup_expired().await {
                Ok(n) if n > 0 => tracing::debug!(evicted = n, "expired tokens swept"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "token sweep failed"),
            }
            match state.session_store.cleanup_expired().await {
                Ok(n) if n > 0 => tracing::debug!(evicted = n, "expired sessions swept"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "session sweep failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
