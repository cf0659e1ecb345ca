pub mod entity;
pub mod error;
pub mod scan;
pub mod time;

pub use entity::{EntityRef, EntityType};
pub use error::{CoreError, Result};
pub use scan::ScannedEntity;
pub use time::{expires_at, now_utc};
