//! Operation definitions: the configured scan sequences and their execution
//! policy.

use crate::error::{OpsError, OpsResult};
use crate::handlers::HandlerRegistry;
use medqr_core::{EntityType, ScannedEntity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One expected scan position in an operation's sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStep {
    pub entity_type: EntityType,
    #[serde(default = "default_true")]
    pub is_required: bool,
    /// Attribute-equality predicate over the scan's `data` payload; every
    /// key must be present and equal for the step to accept the scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_rule: Option<Map<String, Value>>,
    /// When set, only these entity ids are accepted at this position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_entity_ids: Option<Vec<String>>,
    #[serde(default)]
    pub description: String,
}

fn default_true() -> bool {
    true
}

impl OperationStep {
    pub fn required(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            is_required: true,
            validation_rule: None,
            allowed_entity_ids: None,
            description: String::new(),
        }
    }

    pub fn optional(entity_type: EntityType) -> Self {
        Self {
            is_required: false,
            ..Self::required(entity_type)
        }
    }

    pub fn with_rule(mut self, rule: Map<String, Value>) -> Self {
        self.validation_rule = Some(rule);
        self
    }

    pub fn allow_only(mut self, ids: Vec<String>) -> Self {
        self.allowed_entity_ids = Some(ids);
        self
    }

    /// Whether this step accepts the given scan.
    pub fn accepts(&self, scan: &ScannedEntity) -> bool {
        if scan.entity_type != self.entity_type {
            return false;
        }
        if let Some(allowed) = &self.allowed_entity_ids
            && !allowed.iter().any(|id| id == &scan.entity_id)
        {
            return false;
        }
        if let Some(rule) = &self.validation_rule {
            for (key, expected) in rule {
                if scan.data.get(key) != Some(expected) {
                    return false;
                }
            }
        }
        true
    }
}

/// A configured operation: expected sequence plus execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<OperationStep>,
    #[serde(default)]
    pub auto_execute: bool,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default)]
    pub log_usage: bool,
    #[serde(default)]
    pub log_transfer: bool,
    #[serde(default)]
    pub log_handover: bool,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_minutes: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_session_timeout() -> u32 {
    5
}

impl OperationDefinition {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        steps: Vec<OperationStep>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            description: String::new(),
            steps,
            auto_execute: false,
            requires_confirmation: false,
            log_usage: false,
            log_transfer: false,
            log_handover: false,
            session_timeout_minutes: default_session_timeout(),
            is_active: true,
        }
    }

    pub fn auto(mut self) -> Self {
        self.auto_execute = true;
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub fn with_usage_log(mut self) -> Self {
        self.log_usage = true;
        self
    }

    pub fn with_transfer_log(mut self) -> Self {
        self.log_transfer = true;
        self
    }

    pub fn with_handover_log(mut self) -> Self {
        self.log_handover = true;
        self
    }

    fn required_steps(&self) -> impl Iterator<Item = &OperationStep> {
        self.steps.iter().filter(|s| s.is_required)
    }

    /// Positional match of the scanned sequence against the required steps.
    /// Extra trailing scans beyond the required steps are tolerated.
    pub fn matches(&self, entities: &[ScannedEntity]) -> bool {
        let required: Vec<&OperationStep> = self.required_steps().collect();
        if entities.len() < required.len() {
            return false;
        }
        required
            .iter()
            .zip(entities.iter())
            .all(|(step, scan)| step.accepts(scan))
    }
}

/// Ordered catalogue of active operation definitions.
///
/// Construction validates every active code against the handler registry so
/// a misconfigured catalogue fails at startup rather than at first scan.
#[derive(Debug, Clone)]
pub struct OperationCatalog {
    definitions: Vec<OperationDefinition>,
}

impl OperationCatalog {
    pub fn new(
        definitions: Vec<OperationDefinition>,
        registry: &HandlerRegistry,
    ) -> OpsResult<Self> {
        for def in &definitions {
            if def.is_active && !registry.contains(&def.code) {
                return Err(OpsError::unknown_code(&def.code));
            }
        }
        Ok(Self { definitions })
    }

    pub fn standard(registry: &HandlerRegistry) -> OpsResult<Self> {
        Self::new(standard_definitions(), registry)
    }

    pub fn get(&self, code: &str) -> Option<&OperationDefinition> {
        self.definitions
            .iter()
            .find(|d| d.code == code && d.is_active)
    }

    /// First active definition whose required steps match the scanned
    /// sequence. Definition order is the tie-break when several match.
    pub fn match_operation(&self, entities: &[ScannedEntity]) -> Option<&OperationDefinition> {
        self.definitions
            .iter()
            .filter(|d| d.is_active)
            .find(|d| d.matches(entities))
    }

    pub fn definitions(&self) -> &[OperationDefinition] {
        &self.definitions
    }
}

fn task_rule(task: &str) -> Map<String, Value> {
    let mut rule = Map::new();
    rule.insert("task".to_string(), Value::String(task.to_string()));
    rule
}

/// The stock hospital catalogue.
///
/// Ordered most-specific-first: fully typed three-step sequences come before
/// the two-step device-care operations, and the care operations are told
/// apart by a `task` attribute on the device scan (supplied by the client,
/// typically from token metadata). The bare `[user, device]` sequence falls
/// through to `END_DEVICE_USAGE` last, so every code here is reachable
/// through matching.
pub fn standard_definitions() -> Vec<OperationDefinition> {
    use EntityType::*;

    fn device_care(code: &str, name: &str, task: &str) -> OperationDefinition {
        OperationDefinition::new(
            code,
            name,
            vec![
                OperationStep::required(User),
                OperationStep::required(Device).with_rule(task_rule(task)),
            ],
        )
    }

    vec![
        OperationDefinition::new(
            "DEVICE_USAGE",
            "Start Device Usage",
            vec![
                OperationStep::required(User),
                OperationStep::required(Device),
                OperationStep::required(Patient),
            ],
        )
        .auto()
        .with_usage_log(),
        OperationDefinition::new(
            "DEVICE_TRANSFER",
            "Device Transfer",
            vec![
                OperationStep::required(User),
                OperationStep::required(Device),
                OperationStep::required(Department),
            ],
        )
        .confirmed()
        .with_transfer_log(),
        OperationDefinition::new(
            "PATIENT_TRANSFER",
            "Patient Transfer",
            vec![
                OperationStep::required(User),
                OperationStep::required(Patient),
                OperationStep::required(Bed),
            ],
        )
        .confirmed(),
        OperationDefinition::new(
            "ACCESSORY_USAGE",
            "Accessory Usage",
            vec![
                OperationStep::required(User),
                OperationStep::required(Device),
                OperationStep::required(Accessory),
            ],
        )
        .auto()
        .with_usage_log(),
        // Before DEVICE_HANDOVER: same [user, device, user] shape, selected
        // by the task attribute.
        OperationDefinition::new(
            "OUT_OF_SERVICE",
            "Mark Out of Service",
            vec![
                OperationStep::required(User),
                OperationStep::required(Device).with_rule(task_rule("out_of_service")),
                OperationStep::required(User),
            ],
        )
        .confirmed(),
        OperationDefinition::new(
            "DEVICE_HANDOVER",
            "Device Handover",
            vec![
                OperationStep::required(User),
                OperationStep::required(Device),
                OperationStep::required(User),
            ],
        )
        .auto()
        .with_handover_log(),
        device_care("DEVICE_CLEANING", "Device Cleaning", "cleaning").auto(),
        device_care("DEVICE_STERILIZATION", "Device Sterilization", "sterilization").auto(),
        device_care("DEVICE_MAINTENANCE", "Device Maintenance", "maintenance").confirmed(),
        device_care("INVENTORY_CHECK", "Inventory Check", "inventory").auto(),
        device_care("QUALITY_CONTROL", "Quality Control Check", "quality_control").auto(),
        device_care("CALIBRATION", "Device Calibration", "calibration").confirmed(),
        device_care("INSPECTION", "Device Inspection", "inspection").auto(),
        OperationDefinition::new(
            "END_DEVICE_USAGE",
            "End Device Usage",
            vec![
                OperationStep::required(User),
                OperationStep::required(Device),
                OperationStep::optional(Patient),
            ],
        )
        .auto(),
    ]
}
