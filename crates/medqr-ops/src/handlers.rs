//! Per-code operation handlers.
//!
//! A handler receives the working domain state, the scanned entities and the
//! executing user, applies the operation's mutations, and reports what it
//! did. Handlers always run inside the executor's atomic unit, so a handler
//! error undoes everything the handler touched.
//!
//! The registry is validated against the operation catalogue at startup;
//! a definition whose code has no registered handler is a configuration
//! error. Codes without bespoke behavior can be bound explicitly to the
//! generic recorder via [`HandlerRegistry::register_generic`].

use crate::domain::{DeviceRecord, DeviceStatus, DomainState, LogRef, Stamp};
use crate::error::{OpsError, OpsResult};
use medqr_core::{EntityType, ScannedEntity};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use time::OffsetDateTime;

/// What a handler did, serialized onto the execution row.
#[derive(Debug, Clone, Default)]
pub struct HandlerReport {
    /// Human-readable summary lines.
    pub actions: Vec<String>,
    /// Structured result fields.
    pub extra: Map<String, Value>,
    /// Logs the handler created itself, beyond the definition's `log_*`
    /// flags.
    pub created_logs: Vec<LogRef>,
}

impl HandlerReport {
    pub fn action(mut self, line: impl Into<String>) -> Self {
        self.actions.push(line.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn into_map(self) -> Map<String, Value> {
        let mut map = self.extra;
        map.insert("actions".to_string(), json!(self.actions));
        map
    }
}

pub type Handler = fn(&mut DomainState, &[ScannedEntity], &str) -> OpsResult<HandlerReport>;

/// `code -> fn` dispatch table.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every stock handler bound.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("DEVICE_USAGE", device_usage);
        registry.register("END_DEVICE_USAGE", end_device_usage);
        registry.register("DEVICE_TRANSFER", device_transfer);
        registry.register("PATIENT_TRANSFER", patient_transfer);
        registry.register("DEVICE_HANDOVER", device_handover);
        registry.register("ACCESSORY_USAGE", accessory_usage);
        registry.register("DEVICE_CLEANING", device_cleaning);
        registry.register("DEVICE_STERILIZATION", device_sterilization);
        registry.register("DEVICE_MAINTENANCE", device_maintenance);
        registry.register("INVENTORY_CHECK", inventory_check);
        registry.register("QUALITY_CONTROL", quality_control);
        registry.register("CALIBRATION", calibration);
        registry.register("INSPECTION", inspection);
        registry.register("OUT_OF_SERVICE", out_of_service);
        registry
    }

    pub fn register(&mut self, code: impl Into<String>, handler: Handler) {
        self.handlers.insert(code.into(), handler);
    }

    /// Bind a code to the generic recorder, which records the scan sequence
    /// without touching any domain record.
    pub fn register_generic(&mut self, code: impl Into<String>) {
        self.handlers.insert(code.into(), generic_record);
    }

    pub fn contains(&self, code: &str) -> bool {
        self.handlers.contains_key(code)
    }

    pub fn get(&self, code: &str) -> Option<Handler> {
        self.handlers.get(code).copied()
    }
}

// ---------------------------------------------------------------------------
// Scan lookup helpers
// ---------------------------------------------------------------------------

fn find(entities: &[ScannedEntity], entity_type: EntityType) -> Option<&ScannedEntity> {
    entities.iter().find(|e| e.entity_type == entity_type)
}

fn require(entities: &[ScannedEntity], entity_type: EntityType) -> OpsResult<&ScannedEntity> {
    find(entities, entity_type)
        .ok_or_else(|| OpsError::validation(format!("Missing {entity_type} scan")))
}

fn users(entities: &[ScannedEntity]) -> Vec<&ScannedEntity> {
    entities
        .iter()
        .filter(|e| e.entity_type == EntityType::User)
        .collect()
}

// ---------------------------------------------------------------------------
// Stock handlers
// ---------------------------------------------------------------------------

fn device_usage(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    executed_by: &str,
) -> OpsResult<HandlerReport> {
    let device_id = require(entities, EntityType::Device)?.entity_id.clone();
    let patient_id = require(entities, EntityType::Patient)?.entity_id.clone();
    state.patient(&patient_id)?;

    let device = state.device_mut(&device_id)?;
    if device.status != DeviceStatus::Available {
        return Err(OpsError::validation(format!(
            "Device {} is not available",
            device.name
        )));
    }
    device.status = DeviceStatus::InUse;
    device.current_patient = Some(patient_id.clone());
    device.custodian = Some(executed_by.to_string());
    device.usage_started_at = Some(OffsetDateTime::now_utc());
    let device_name = device.name.clone();

    Ok(HandlerReport::default()
        .action(format!("Started usage of {device_name}"))
        .field("device_id", json!(device_id))
        .field("patient_id", json!(patient_id)))
}

fn end_device_usage(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    _executed_by: &str,
) -> OpsResult<HandlerReport> {
    let device_id = require(entities, EntityType::Device)?.entity_id.clone();
    let patient_id = find(entities, EntityType::Patient).map(|e| e.entity_id.clone());

    let closed = state.close_open_usage(
        &device_id,
        patient_id.as_deref(),
        OffsetDateTime::now_utc(),
    );
    let device = state.device_mut(&device_id)?;
    device.status = DeviceStatus::Available;
    device.current_patient = None;
    device.usage_started_at = None;

    Ok(HandlerReport::default()
        .action(format!("Ended usage, closed {closed} open period(s)"))
        .field("device_id", json!(device_id))
        .field("closed_periods", json!(closed)))
}

fn device_transfer(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    _executed_by: &str,
) -> OpsResult<HandlerReport> {
    let device_id = require(entities, EntityType::Device)?.entity_id.clone();
    let department_id = require(entities, EntityType::Department)?.entity_id.clone();
    let department_name = state.department(&department_id)?.name.clone();

    let device = state.device_mut(&device_id)?;
    let from = device.department_id.take();
    device.department_id = Some(department_id.clone());
    let device_name = device.name.clone();

    Ok(HandlerReport::default()
        .action(format!("Transferred {device_name} to {department_name}"))
        .field("device_id", json!(device_id))
        .field("from_department", json!(from))
        .field("to_department", json!(department_id)))
}

fn patient_transfer(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    executed_by: &str,
) -> OpsResult<HandlerReport> {
    let patient_id = require(entities, EntityType::Patient)?.entity_id.clone();
    let bed_id = require(entities, EntityType::Bed)?.entity_id.clone();

    let bed = state.bed_mut(&bed_id)?;
    if bed.occupied {
        return Err(OpsError::validation(format!("Bed {} is occupied", bed.label)));
    }
    bed.occupied = true;
    let bed_label = bed.label.clone();

    let from_bed = state.patient_mut(&patient_id)?.current_bed.take();
    state.patient_mut(&patient_id)?.current_bed = Some(bed_id.clone());
    if let Some(old) = &from_bed {
        state.bed_mut(old)?.occupied = false;
    }

    let log = state.create_patient_transfer_log(
        &patient_id,
        from_bed.clone(),
        &bed_id,
        executed_by,
        "",
    );

    let mut report = HandlerReport::default()
        .action(format!("Moved patient to bed {bed_label}"))
        .field("patient_id", json!(patient_id))
        .field("from_bed", json!(from_bed))
        .field("to_bed", json!(bed_id));
    report.created_logs.push(log);
    Ok(report)
}

fn device_handover(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    _executed_by: &str,
) -> OpsResult<HandlerReport> {
    let device_id = require(entities, EntityType::Device)?.entity_id.clone();
    let scanned_users = users(entities);
    let [from_user, to_user, ..] = scanned_users.as_slice() else {
        return Err(OpsError::validation("Handover requires two user scans"));
    };
    let from_user = from_user.entity_id.clone();
    let to_user = to_user.entity_id.clone();

    // The outgoing custodian's open usage ends at the moment of handover.
    let closed = state.close_open_usage(&device_id, None, OffsetDateTime::now_utc());
    state.device_mut(&device_id)?.custodian = Some(to_user.clone());

    Ok(HandlerReport::default()
        .action(format!("Handed over device from {from_user} to {to_user}"))
        .field("device_id", json!(device_id))
        .field("from_user", json!(from_user))
        .field("to_user", json!(to_user))
        .field("closed_periods", json!(closed)))
}

fn accessory_usage(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    _executed_by: &str,
) -> OpsResult<HandlerReport> {
    let accessory_id = require(entities, EntityType::Accessory)?.entity_id.clone();
    let device_id = require(entities, EntityType::Device)?.entity_id.clone();
    state.device(&device_id)?;

    let accessory = state.accessory_mut(&accessory_id)?;
    if let Some(quantity) = &mut accessory.quantity {
        if *quantity == 0 {
            return Err(OpsError::validation(format!(
                "Accessory {} is out of stock",
                accessory.name
            )));
        }
        *quantity -= 1;
    }
    let remaining = accessory.quantity;
    let name = accessory.name.clone();

    Ok(HandlerReport::default()
        .action(format!("Recorded usage of accessory {name}"))
        .field("accessory_id", json!(accessory_id))
        .field("device_id", json!(device_id))
        .field("remaining_quantity", json!(remaining)))
}

/// Two-phase cycle shared by cleaning and sterilization: the first scan
/// opens the cycle, the second closes it and stamps the device.
fn toggle_cycle(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    executed_by: &str,
    what: &str,
    in_progress: fn(&mut DeviceRecord) -> &mut bool,
    stamp: fn(&mut DeviceRecord) -> &mut Option<Stamp>,
) -> OpsResult<HandlerReport> {
    let device_id = require(entities, EntityType::Device)?.entity_id.clone();
    let device = state.device_mut(&device_id)?;

    let report = if *in_progress(device) {
        *in_progress(device) = false;
        *stamp(device) = Some(Stamp::now(executed_by));
        HandlerReport::default()
            .action(format!("{what} cycle completed"))
            .field("cycle", json!("completed"))
    } else {
        *in_progress(device) = true;
        HandlerReport::default()
            .action(format!("{what} cycle started"))
            .field("cycle", json!("started"))
    };
    Ok(report.field("device_id", json!(device_id)))
}

fn device_cleaning(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    executed_by: &str,
) -> OpsResult<HandlerReport> {
    toggle_cycle(
        state,
        entities,
        executed_by,
        "Cleaning",
        |d| &mut d.cleaning_in_progress,
        |d| &mut d.last_cleaned,
    )
}

fn device_sterilization(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    executed_by: &str,
) -> OpsResult<HandlerReport> {
    toggle_cycle(
        state,
        entities,
        executed_by,
        "Sterilization",
        |d| &mut d.sterilization_in_progress,
        |d| &mut d.last_sterilized,
    )
}

fn device_maintenance(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    executed_by: &str,
) -> OpsResult<HandlerReport> {
    let device_id = require(entities, EntityType::Device)?.entity_id.clone();
    let device = state.device_mut(&device_id)?;

    let report = if device.status == DeviceStatus::UnderMaintenance {
        device.status = DeviceStatus::Available;
        device.last_maintained = Some(Stamp::now(executed_by));
        HandlerReport::default()
            .action("Maintenance completed")
            .field("maintenance", json!("completed"))
    } else {
        device.status = DeviceStatus::UnderMaintenance;
        HandlerReport::default()
            .action("Maintenance started")
            .field("maintenance", json!("started"))
    };
    Ok(report.field("device_id", json!(device_id)))
}

/// Single-scan check shared by the stamp-only operations.
fn record_check(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    executed_by: &str,
    what: &str,
    stamp: fn(&mut DeviceRecord) -> &mut Option<Stamp>,
) -> OpsResult<HandlerReport> {
    let device_id = require(entities, EntityType::Device)?.entity_id.clone();
    *stamp(state.device_mut(&device_id)?) = Some(Stamp::now(executed_by));
    Ok(HandlerReport::default()
        .action(format!("{what} recorded"))
        .field("device_id", json!(device_id)))
}

fn inventory_check(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    executed_by: &str,
) -> OpsResult<HandlerReport> {
    record_check(state, entities, executed_by, "Inventory check", |d| {
        &mut d.last_inventory_check
    })
}

fn quality_control(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    executed_by: &str,
) -> OpsResult<HandlerReport> {
    record_check(state, entities, executed_by, "Quality control check", |d| {
        &mut d.last_quality_check
    })
}

fn calibration(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    executed_by: &str,
) -> OpsResult<HandlerReport> {
    record_check(state, entities, executed_by, "Calibration", |d| {
        &mut d.last_calibrated
    })
}

fn inspection(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    executed_by: &str,
) -> OpsResult<HandlerReport> {
    record_check(state, entities, executed_by, "Inspection", |d| {
        &mut d.last_inspected
    })
}

fn out_of_service(
    state: &mut DomainState,
    entities: &[ScannedEntity],
    _executed_by: &str,
) -> OpsResult<HandlerReport> {
    let scanned_users = users(entities);
    let distinct = scanned_users
        .iter()
        .map(|u| u.entity_id.as_str())
        .collect::<std::collections::HashSet<_>>();
    if distinct.len() < 2 {
        return Err(OpsError::validation(
            "Out-of-service requires scans from two different users",
        ));
    }

    let device_scan = require(entities, EntityType::Device)?;
    let device_id = device_scan.entity_id.clone();
    let reason = device_scan
        .attribute("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let device = state.device_mut(&device_id)?;
    device.status = DeviceStatus::OutOfService;
    device.out_of_service_reason = Some(reason.clone());
    device.out_of_service_at = Some(OffsetDateTime::now_utc());

    Ok(HandlerReport::default()
        .action("Device marked out of service")
        .field("device_id", json!(device_id))
        .field("reason", json!(reason)))
}

/// Records the scan sequence on the execution row without touching any
/// domain record.
fn generic_record(
    _state: &mut DomainState,
    entities: &[ScannedEntity],
    _executed_by: &str,
) -> OpsResult<HandlerReport> {
    let sequence: Vec<String> = entities
        .iter()
        .map(|e| format!("{}:{}", e.entity_type, e.entity_id))
        .collect();
    Ok(HandlerReport::default()
        .action("Scan sequence recorded")
        .field("entities", json!(sequence)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccessoryRecord, BedRecord, DeviceRecord, PatientRecord};

    fn scan(entity_type: EntityType, id: &str) -> ScannedEntity {
        ScannedEntity::new(entity_type, id)
    }

    fn state_with_device() -> DomainState {
        let mut state = DomainState::default();
        state
            .devices
            .insert("d1".to_string(), DeviceRecord::new("d1", "Ventilator"));
        state
    }

    #[test]
    fn test_device_usage_requires_available_device() {
        let mut state = state_with_device();
        state
            .patients
            .insert("p1".to_string(), PatientRecord::new("p1", "Doe"));
        state.devices.get_mut("d1").unwrap().status = DeviceStatus::InUse;

        let entities = [
            scan(EntityType::User, "u1"),
            scan(EntityType::Device, "d1"),
            scan(EntityType::Patient, "p1"),
        ];
        let err = device_usage(&mut state, &entities, "u1").unwrap_err();
        assert!(matches!(err, OpsError::ValidationFailed { .. }));
    }

    #[test]
    fn test_device_usage_attaches_patient() {
        let mut state = state_with_device();
        state
            .patients
            .insert("p1".to_string(), PatientRecord::new("p1", "Doe"));

        let entities = [
            scan(EntityType::User, "u1"),
            scan(EntityType::Device, "d1"),
            scan(EntityType::Patient, "p1"),
        ];
        device_usage(&mut state, &entities, "u1").unwrap();
        let device = state.device("d1").unwrap();
        assert_eq!(device.status, DeviceStatus::InUse);
        assert_eq!(device.current_patient.as_deref(), Some("p1"));
        assert_eq!(device.custodian.as_deref(), Some("u1"));
    }

    #[test]
    fn test_patient_transfer_releases_old_bed() {
        let mut state = DomainState::default();
        let mut patient = PatientRecord::new("p1", "Doe");
        patient.current_bed = Some("b1".to_string());
        state.patients.insert("p1".to_string(), patient);
        let mut old_bed = BedRecord::new("b1", "ICU-1");
        old_bed.occupied = true;
        state.beds.insert("b1".to_string(), old_bed);
        state.beds.insert("b2".to_string(), BedRecord::new("b2", "ICU-2"));

        let entities = [
            scan(EntityType::User, "u1"),
            scan(EntityType::Patient, "p1"),
            scan(EntityType::Bed, "b2"),
        ];
        let report = patient_transfer(&mut state, &entities, "u1").unwrap();
        assert!(!state.beds["b1"].occupied);
        assert!(state.beds["b2"].occupied);
        assert_eq!(state.patients["p1"].current_bed.as_deref(), Some("b2"));
        assert_eq!(report.created_logs.len(), 1);
        assert_eq!(state.patient_transfer_logs.len(), 1);
    }

    #[test]
    fn test_patient_transfer_rejects_occupied_bed() {
        let mut state = DomainState::default();
        state
            .patients
            .insert("p1".to_string(), PatientRecord::new("p1", "Doe"));
        let mut bed = BedRecord::new("b1", "ICU-1");
        bed.occupied = true;
        state.beds.insert("b1".to_string(), bed);

        let entities = [
            scan(EntityType::User, "u1"),
            scan(EntityType::Patient, "p1"),
            scan(EntityType::Bed, "b1"),
        ];
        assert!(patient_transfer(&mut state, &entities, "u1").is_err());
    }

    #[test]
    fn test_handover_closes_open_usage() {
        let mut state = state_with_device();
        state.create_usage_log("d1", None, "u1", "");

        let entities = [
            scan(EntityType::User, "u1"),
            scan(EntityType::Device, "d1"),
            scan(EntityType::User, "u2"),
        ];
        device_handover(&mut state, &entities, "u2").unwrap();
        assert!(state.usage_logs[0].ended_at.is_some());
        assert_eq!(state.devices["d1"].custodian.as_deref(), Some("u2"));
    }

    #[test]
    fn test_accessory_usage_decrements_and_bottoms_out() {
        let mut state = state_with_device();
        state.accessories.insert(
            "a1".to_string(),
            AccessoryRecord::new("a1", "Tubing", Some(1)),
        );

        let entities = [
            scan(EntityType::User, "u1"),
            scan(EntityType::Device, "d1"),
            scan(EntityType::Accessory, "a1"),
        ];
        accessory_usage(&mut state, &entities, "u1").unwrap();
        assert_eq!(state.accessories["a1"].quantity, Some(0));

        let err = accessory_usage(&mut state, &entities, "u1").unwrap_err();
        assert!(matches!(err, OpsError::ValidationFailed { .. }));
    }

    #[test]
    fn test_cleaning_cycle_toggles() {
        let mut state = state_with_device();
        let entities = [scan(EntityType::User, "u1"), scan(EntityType::Device, "d1")];

        device_cleaning(&mut state, &entities, "u1").unwrap();
        assert!(state.devices["d1"].cleaning_in_progress);
        assert!(state.devices["d1"].last_cleaned.is_none());

        device_cleaning(&mut state, &entities, "u1").unwrap();
        assert!(!state.devices["d1"].cleaning_in_progress);
        assert!(state.devices["d1"].last_cleaned.is_some());
    }

    #[test]
    fn test_check_handlers_stamp_their_own_field() {
        let mut state = state_with_device();
        let entities = [scan(EntityType::User, "u1"), scan(EntityType::Device, "d1")];

        inspection(&mut state, &entities, "u1").unwrap();
        calibration(&mut state, &entities, "u2").unwrap();

        let device = state.device("d1").unwrap();
        assert_eq!(device.last_inspected.as_ref().unwrap().by, "u1");
        assert_eq!(device.last_calibrated.as_ref().unwrap().by, "u2");
        assert!(device.last_inventory_check.is_none());
        assert!(device.last_quality_check.is_none());
    }

    #[test]
    fn test_out_of_service_needs_two_distinct_users() {
        let mut state = state_with_device();
        let same_user = [
            scan(EntityType::User, "u1"),
            scan(EntityType::Device, "d1"),
            scan(EntityType::User, "u1"),
        ];
        assert!(out_of_service(&mut state, &same_user, "u1").is_err());

        let two_users = [
            scan(EntityType::User, "u1"),
            scan(EntityType::Device, "d1"),
            scan(EntityType::User, "u2"),
        ];
        out_of_service(&mut state, &two_users, "u1").unwrap();
        assert_eq!(state.devices["d1"].status, DeviceStatus::OutOfService);
    }

    #[test]
    fn test_generic_recorder_touches_nothing() {
        let mut state = state_with_device();
        let before = state.clone();
        let entities = [scan(EntityType::User, "u1"), scan(EntityType::Device, "d1")];
        let report = generic_record(&mut state, &entities, "u1").unwrap();
        assert_eq!(state.devices.len(), before.devices.len());
        assert_eq!(
            report.extra["entities"],
            json!(["user:u1", "device:d1"])
        );
    }
}
