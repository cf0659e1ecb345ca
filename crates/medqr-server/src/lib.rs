//! HTTP surface for the MedQR identification and workflow services.

pub mod config;
pub mod error;
pub mod observability;
pub mod routes;
pub mod server;
pub mod state;

pub use config::AppConfig;
pub use error::ApiError;
pub use server::{MedqrServer, ServerBuilder};
pub use state::AppState;
