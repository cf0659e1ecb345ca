//! Domain records touched by operation handlers, and the atomic unit that
//! guards them.
//!
//! The executor's unit is the only place in the core that mutates these
//! records. [`InMemoryDomain`] implements the unit as clone-on-write under a
//! single lock: the in-memory analogue of a relational transaction with
//! row-level locking. Either every mutation and log record of a unit becomes
//! visible, or none do.

use crate::error::{OpsError, OpsResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// Who did something, when. Used for the various per-device check stamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stamp {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub by: String,
}

impl Stamp {
    pub fn now(by: impl Into<String>) -> Self {
        Self {
            at: OffsetDateTime::now_utc(),
            by: by.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Available,
    InUse,
    UnderMaintenance,
    OutOfService,
}

/// A medical device as the executor sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    pub status: DeviceStatus,
    pub department_id: Option<String>,
    /// Patient the device is currently attached to.
    pub current_patient: Option<String>,
    /// User currently responsible for the device.
    pub custodian: Option<String>,
    pub usage_started_at: Option<OffsetDateTime>,
    pub cleaning_in_progress: bool,
    pub last_cleaned: Option<Stamp>,
    pub sterilization_in_progress: bool,
    pub last_sterilized: Option<Stamp>,
    pub last_maintained: Option<Stamp>,
    pub last_inventory_check: Option<Stamp>,
    pub last_quality_check: Option<Stamp>,
    pub last_calibrated: Option<Stamp>,
    pub last_inspected: Option<Stamp>,
    pub out_of_service_reason: Option<String>,
    pub out_of_service_at: Option<OffsetDateTime>,
}

impl DeviceRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: DeviceStatus::Available,
            department_id: None,
            current_patient: None,
            custodian: None,
            usage_started_at: None,
            cleaning_in_progress: false,
            last_cleaned: None,
            sterilization_in_progress: false,
            last_sterilized: None,
            last_maintained: None,
            last_inventory_check: None,
            last_quality_check: None,
            last_calibrated: None,
            last_inspected: None,
            out_of_service_reason: None,
            out_of_service_at: None,
        }
    }

}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: String,
    pub name: String,
    pub current_bed: Option<String>,
}

impl PatientRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            current_bed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedRecord {
    pub id: String,
    pub label: String,
    pub occupied: bool,
}

impl BedRecord {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            occupied: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessoryRecord {
    pub id: String,
    pub name: String,
    /// Remaining consumable count; `None` for non-consumables.
    pub quantity: Option<u32>,
}

impl AccessoryRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, quantity: Option<u32>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentRecord {
    pub id: String,
    pub name: String,
}

impl DepartmentRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Log records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Usage,
    Transfer,
    PatientTransfer,
    Handover,
}

/// Reference to one created log record, kept on the execution row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRef {
    pub kind: LogKind,
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: u64,
    pub device_id: String,
    pub patient_id: Option<String>,
    pub used_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferLog {
    pub id: u64,
    pub device_id: String,
    pub from_department: Option<String>,
    pub to_department: String,
    pub transferred_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub transferred_at: OffsetDateTime,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientTransferLog {
    pub id: u64,
    pub patient_id: String,
    pub from_bed: Option<String>,
    pub to_bed: String,
    pub transferred_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub transferred_at: OffsetDateTime,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoverLog {
    pub id: u64,
    pub device_id: String,
    pub from_user: String,
    pub to_user: String,
    #[serde(with = "time::serde::rfc3339")]
    pub handed_over_at: OffsetDateTime,
    pub notes: String,
}

// ---------------------------------------------------------------------------
// Domain state
// ---------------------------------------------------------------------------

/// All records the executor may touch, plus the audit log tables.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    pub devices: HashMap<String, DeviceRecord>,
    pub patients: HashMap<String, PatientRecord>,
    pub beds: HashMap<String, BedRecord>,
    pub accessories: HashMap<String, AccessoryRecord>,
    pub departments: HashMap<String, DepartmentRecord>,
    pub usage_logs: Vec<UsageLog>,
    pub transfer_logs: Vec<TransferLog>,
    pub patient_transfer_logs: Vec<PatientTransferLog>,
    pub handover_logs: Vec<HandoverLog>,
    next_log_id: u64,
}

impl DomainState {
    pub fn device(&self, id: &str) -> OpsResult<&DeviceRecord> {
        self.devices
            .get(id)
            .ok_or_else(|| OpsError::entity_not_found("device", id))
    }

    pub fn device_mut(&mut self, id: &str) -> OpsResult<&mut DeviceRecord> {
        self.devices
            .get_mut(id)
            .ok_or_else(|| OpsError::entity_not_found("device", id))
    }

    pub fn patient(&self, id: &str) -> OpsResult<&PatientRecord> {
        self.patients
            .get(id)
            .ok_or_else(|| OpsError::entity_not_found("patient", id))
    }

    pub fn patient_mut(&mut self, id: &str) -> OpsResult<&mut PatientRecord> {
        self.patients
            .get_mut(id)
            .ok_or_else(|| OpsError::entity_not_found("patient", id))
    }

    pub fn bed_mut(&mut self, id: &str) -> OpsResult<&mut BedRecord> {
        self.beds
            .get_mut(id)
            .ok_or_else(|| OpsError::entity_not_found("bed", id))
    }

    pub fn accessory_mut(&mut self, id: &str) -> OpsResult<&mut AccessoryRecord> {
        self.accessories
            .get_mut(id)
            .ok_or_else(|| OpsError::entity_not_found("accessory", id))
    }

    pub fn department(&self, id: &str) -> OpsResult<&DepartmentRecord> {
        self.departments
            .get(id)
            .ok_or_else(|| OpsError::entity_not_found("department", id))
    }

    fn next_log_id(&mut self) -> u64 {
        self.next_log_id += 1;
        self.next_log_id
    }

    /// Close every open usage period for a device, optionally narrowed to one
    /// patient. Returns how many periods were closed.
    pub fn close_open_usage(
        &mut self,
        device_id: &str,
        patient_id: Option<&str>,
        at: OffsetDateTime,
    ) -> usize {
        let mut closed = 0;
        for log in &mut self.usage_logs {
            if log.device_id == device_id
                && log.ended_at.is_none()
                && patient_id.is_none_or(|p| log.patient_id.as_deref() == Some(p))
            {
                log.ended_at = Some(at);
                closed += 1;
            }
        }
        closed
    }

    pub fn create_usage_log(
        &mut self,
        device_id: impl Into<String>,
        patient_id: Option<String>,
        used_by: impl Into<String>,
        notes: impl Into<String>,
    ) -> LogRef {
        let id = self.next_log_id();
        self.usage_logs.push(UsageLog {
            id,
            device_id: device_id.into(),
            patient_id,
            used_by: used_by.into(),
            started_at: OffsetDateTime::now_utc(),
            ended_at: None,
            notes: notes.into(),
        });
        LogRef {
            kind: LogKind::Usage,
            id,
        }
    }

    pub fn create_transfer_log(
        &mut self,
        device_id: impl Into<String>,
        from_department: Option<String>,
        to_department: impl Into<String>,
        transferred_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> LogRef {
        let id = self.next_log_id();
        self.transfer_logs.push(TransferLog {
            id,
            device_id: device_id.into(),
            from_department,
            to_department: to_department.into(),
            transferred_by: transferred_by.into(),
            transferred_at: OffsetDateTime::now_utc(),
            reason: reason.into(),
        });
        LogRef {
            kind: LogKind::Transfer,
            id,
        }
    }

    pub fn create_patient_transfer_log(
        &mut self,
        patient_id: impl Into<String>,
        from_bed: Option<String>,
        to_bed: impl Into<String>,
        transferred_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> LogRef {
        let id = self.next_log_id();
        self.patient_transfer_logs.push(PatientTransferLog {
            id,
            patient_id: patient_id.into(),
            from_bed,
            to_bed: to_bed.into(),
            transferred_by: transferred_by.into(),
            transferred_at: OffsetDateTime::now_utc(),
            reason: reason.into(),
        });
        LogRef {
            kind: LogKind::PatientTransfer,
            id,
        }
    }

    pub fn create_handover_log(
        &mut self,
        device_id: impl Into<String>,
        from_user: impl Into<String>,
        to_user: impl Into<String>,
        notes: impl Into<String>,
    ) -> LogRef {
        let id = self.next_log_id();
        self.handover_logs.push(HandoverLog {
            id,
            device_id: device_id.into(),
            from_user: from_user.into(),
            to_user: to_user.into(),
            handed_over_at: OffsetDateTime::now_utc(),
            notes: notes.into(),
        });
        LogRef {
            kind: LogKind::Handover,
            id,
        }
    }
}

// ---------------------------------------------------------------------------
// Atomic unit
// ---------------------------------------------------------------------------

/// What one successful unit produced.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    /// Handler result, serialized onto the execution row.
    pub result: Map<String, Value>,
    pub created_logs: Vec<LogRef>,
}

/// One unit of work against the domain state.
pub type UnitWork = Box<dyn FnOnce(&mut DomainState) -> OpsResult<UnitOutcome> + Send>;

/// Storage trait for the shared domain records.
///
/// `run_unit` is the transactional seam: implementations must guarantee that
/// a failed unit leaves no trace, and that two concurrent units touching the
/// same records cannot interleave.
#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn run_unit(&self, work: UnitWork) -> OpsResult<UnitOutcome>;

    /// A consistent read-only copy of the current state.
    async fn snapshot(&self) -> DomainState;
}

/// In-memory [`DomainStore`] with clone-on-write units.
#[derive(Debug, Default)]
pub struct InMemoryDomain {
    state: Mutex<DomainState>,
}

impl InMemoryDomain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DomainState::default()),
        }
    }

    /// Seed records outside any unit; for bootstrap and tests.
    pub async fn seed<F>(&self, f: F)
    where
        F: FnOnce(&mut DomainState),
    {
        let mut guard = self.state.lock().await;
        f(&mut guard);
    }
}

#[async_trait]
impl DomainStore for InMemoryDomain {
    async fn run_unit(&self, work: UnitWork) -> OpsResult<UnitOutcome> {
        let mut guard = self.state.lock().await;
        let mut working = guard.clone();
        let outcome = work(&mut working)?;
        *guard = working;
        Ok(outcome)
    }

    async fn snapshot(&self) -> DomainState {
        self.state.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unit_commits_on_success() {
        let domain = InMemoryDomain::new();
        domain
            .seed(|state| {
                state
                    .devices
                    .insert("d1".to_string(), DeviceRecord::new("d1", "Ventilator"));
            })
            .await;

        let outcome = domain
            .run_unit(Box::new(|state| {
                state.device_mut("d1")?.status = DeviceStatus::InUse;
                let log = state.create_usage_log("d1", None, "u1", "test");
                Ok(UnitOutcome {
                    result: Map::new(),
                    created_logs: vec![log],
                })
            }))
            .await
            .unwrap();

        assert_eq!(outcome.created_logs.len(), 1);
        let state = domain.snapshot().await;
        assert_eq!(state.device("d1").unwrap().status, DeviceStatus::InUse);
        assert_eq!(state.usage_logs.len(), 1);
    }

    #[tokio::test]
    async fn test_unit_rolls_back_on_error() {
        let domain = InMemoryDomain::new();
        domain
            .seed(|state| {
                state
                    .devices
                    .insert("d1".to_string(), DeviceRecord::new("d1", "Ventilator"));
            })
            .await;

        let err = domain
            .run_unit(Box::new(|state| {
                // Mutate, create a log, then fail: nothing may stick
                state.device_mut("d1")?.status = DeviceStatus::InUse;
                state.create_usage_log("d1", None, "u1", "test");
                state.device_mut("missing")?;
                unreachable!()
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::EntityNotFound { .. }));

        let state = domain.snapshot().await;
        assert_eq!(state.device("d1").unwrap().status, DeviceStatus::Available);
        assert!(state.usage_logs.is_empty());
    }

    #[test]
    fn test_close_open_usage() {
        let mut state = DomainState::default();
        state.create_usage_log("d1", Some("p1".to_string()), "u1", "");
        state.create_usage_log("d1", Some("p2".to_string()), "u1", "");
        state.create_usage_log("d2", Some("p1".to_string()), "u1", "");

        let closed = state.close_open_usage("d1", Some("p1"), OffsetDateTime::now_utc());
        assert_eq!(closed, 1);

        let closed = state.close_open_usage("d1", None, OffsetDateTime::now_utc());
        assert_eq!(closed, 1); // only p2's period was still open

        assert!(state.usage_logs[2].ended_at.is_none());
    }

    #[test]
    fn test_log_ids_are_monotonic() {
        let mut state = DomainState::default();
        let a = state.create_usage_log("d1", None, "u1", "");
        let b = state.create_transfer_log("d1", None, "icu", "u1", "");
        assert!(b.id > a.id);
    }
}
