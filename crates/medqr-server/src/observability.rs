//! Tracing setup.
//!
//! The subscriber is installed before configuration is loaded, so the filter
//! sits behind a reload layer and [`set_level`] re-points it once the
//! configured level is known. `RUST_LOG` wins over both.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Safe to call more than once; only the
/// first call takes effect.
pub fn init(default_level: &str) {
    let (filter, handle) = reload::Layer::new(filter_for(default_level));
    let _ = FILTER_HANDLE.set(handle);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// Swap the active filter to the configured level. No-op when `RUST_LOG`
/// is set or tracing was never initialized.
pub fn set_level(level: &str) {
    if std::env::var("RUST_LOG").is_ok() {
        return;
    }
    if let Some(handle) = FILTER_HANDLE.get() {
        let _ = handle.modify(|f| *f = EnvFilter::new(level));
    }
}
