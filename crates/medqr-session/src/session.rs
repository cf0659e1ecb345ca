use crate::flow::FlowMatch;
use medqr_core::{EntityType, ScannedEntity};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// What kind of client is driving the scans. Affects response shaping at the
/// API layer only, never matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Handheld,
    Mobile,
}

impl Default for DeviceClass {
    fn default() -> Self {
        DeviceClass::Mobile
    }
}

/// Session lifecycle. `Completed` and `Ended` are terminal for matching;
/// records persist briefly afterwards for client polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Ended,
}

/// One user's scan accumulator.
///
/// `scans` is append-only while the session is active; insertion order is
/// arrival order and is never reordered. Matching always runs against the
/// full current order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSession {
    pub id: Uuid,
    pub user_id: String,
    pub device_class: DeviceClass,
    pub scans: Vec<ScannedEntity>,
    pub matched_flow: Option<FlowMatch>,
    pub status: SessionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
}

impl ScanSession {
    pub fn new(user_id: impl Into<String>, device_class: DeviceClass) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            device_class,
            scans: Vec::new(),
            matched_flow: None,
            status: SessionStatus::Active,
            started_at: OffsetDateTime::now_utc(),
            completed_at: None,
            ended_at: None,
        }
    }

    /// Ordered entity-type sequence of all scans so far.
    pub fn type_sequence(&self) -> Vec<EntityType> {
        self.scans.iter().map(|s| s.entity_type).collect()
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}
