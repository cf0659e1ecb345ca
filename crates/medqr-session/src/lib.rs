//! Scan sessions and workflow matching.
//!
//! A session accumulates the scans one user makes over a bounded time window.
//! After every append the ordered entity-type sequence is checked against the
//! configured flow catalog; a full match surfaces the recognized workflow,
//! either for immediate execution or for a manual confirm step.

pub mod error;
pub mod flow;
pub mod service;
pub mod session;
pub mod store;

pub use error::{SessionError, SessionResult};
pub use flow::{FlowCatalog, FlowDefinition, FlowMatch};
pub use service::{FlowExecution, ScanOutcome, SessionConfig, SessionService};
pub use session::{DeviceClass, ScanSession, SessionStatus};
pub use store::{InMemorySessionStore, SessionStore};
