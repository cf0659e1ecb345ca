//! Workflow (flow) definitions and sequence matching.
//!
//! A flow is a fixed ordered sequence of expected entity types. Matching is
//! exact-length, position-wise type equality: no subsequence matching, no
//! reordering tolerance. A flow expecting `[user, device]` does not match
//! `[device, user]`.

use medqr_core::{CoreError, EntityType};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One configured workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub name: String,
    /// Expected entity types in scan order; never empty.
    pub sequence: Vec<EntityType>,
    /// Opaque handler key invoked when the flow executes.
    pub action: String,
    pub auto_execute: bool,
    #[serde(default)]
    pub description: String,
}

/// A recognized flow stored on the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowMatch {
    pub name: String,
    pub action: String,
    pub auto_execute: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub matched_at: OffsetDateTime,
}

/// Ordered list of flow definitions.
///
/// Definitions are not required to be mutually exclusive; the first
/// configured match wins, so catalog order is a meaningful, documented
/// tie-break.
#[derive(Debug, Clone)]
pub struct FlowCatalog {
    flows: Vec<FlowDefinition>,
}

impl FlowCatalog {
    /// Build a catalog, preserving configuration order.
    ///
    /// Rejects definitions with an empty sequence.
    pub fn new(flows: Vec<FlowDefinition>) -> Result<Self, CoreError> {
        for flow in &flows {
            if flow.sequence.is_empty() {
                return Err(CoreError::configuration(format!(
                    "flow '{}' has an empty sequence",
                    flow.name
                )));
            }
        }
        Ok(Self { flows })
    }

    /// The flow set of the original hospital deployment.
    pub fn standard() -> Self {
        let flows = vec![
            FlowDefinition {
                name: "device_transfer".to_string(),
                sequence: vec![EntityType::User, EntityType::Device],
                action: "transfer_device".to_string(),
                auto_execute: false,
                description: "Transfer device ownership".to_string(),
            },
            FlowDefinition {
                name: "patient_admission".to_string(),
                sequence: vec![EntityType::User, EntityType::Patient, EntityType::Bed],
                action: "admit_patient".to_string(),
                auto_execute: true,
                description: "Admit patient to bed".to_string(),
            },
            FlowDefinition {
                name: "device_usage".to_string(),
                sequence: vec![EntityType::Device, EntityType::Patient],
                action: "log_device_usage".to_string(),
                auto_execute: true,
                description: "Log device usage on patient".to_string(),
            },
            FlowDefinition {
                name: "device_maintenance".to_string(),
                sequence: vec![EntityType::User, EntityType::Device],
                action: "start_maintenance".to_string(),
                auto_execute: false,
                description: "Start device maintenance".to_string(),
            },
            FlowDefinition {
                name: "bed_assignment".to_string(),
                sequence: vec![EntityType::Patient, EntityType::Bed],
                action: "assign_bed".to_string(),
                auto_execute: true,
                description: "Assign patient to bed".to_string(),
            },
        ];
        Self { flows }
    }

    pub fn flows(&self) -> &[FlowDefinition] {
        &self.flows
    }

    /// First configured flow whose sequence equals `scanned` exactly.
    pub fn matches(&self, scanned: &[EntityType]) -> Option<&FlowDefinition> {
        self.flows
            .iter()
            .find(|flow| flow.sequence.as_slice() == scanned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let catalog = FlowCatalog::standard();
        let flow = catalog
            .matches(&[EntityType::Device, EntityType::Patient])
            .unwrap();
        assert_eq!(flow.name, "device_usage");
        assert!(flow.auto_execute);
    }

    #[test]
    fn test_order_matters() {
        let catalog = FlowCatalog::standard();
        assert!(catalog.matches(&[EntityType::User, EntityType::Device]).is_some());
        assert!(catalog.matches(&[EntityType::Device, EntityType::User]).is_none());
    }

    #[test]
    fn test_prefix_does_not_match() {
        let catalog = FlowCatalog::standard();
        assert!(catalog.matches(&[EntityType::User]).is_none());
        assert!(
            catalog
                .matches(&[EntityType::User, EntityType::Patient])
                .is_none()
        );
        assert!(
            catalog
                .matches(&[EntityType::User, EntityType::Patient, EntityType::Bed])
                .is_some()
        );
    }

    #[test]
    fn test_first_configured_match_wins() {
        // device_transfer and device_maintenance share [user, device]
        let catalog = FlowCatalog::standard();
        let flow = catalog
            .matches(&[EntityType::User, EntityType::Device])
            .unwrap();
        assert_eq!(flow.name, "device_transfer");
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let bad = FlowDefinition {
            name: "broken".to_string(),
            sequence: vec![],
            action: "noop".to_string(),
            auto_execute: false,
            description: String::new(),
        };
        assert!(FlowCatalog::new(vec![bad]).is_err());
    }

    #[test]
    fn test_catalog_preserves_order() {
        let flows = vec![
            FlowDefinition {
                name: "a".to_string(),
                sequence: vec![EntityType::User],
                action: "a".to_string(),
                auto_execute: true,
                description: String::new(),
            },
            FlowDefinition {
                name: "b".to_string(),
                sequence: vec![EntityType::User],
                action: "b".to_string(),
                auto_execute: true,
                description: String::new(),
            },
        ];
        let catalog = FlowCatalog::new(flows).unwrap();
        assert_eq!(catalog.matches(&[EntityType::User]).unwrap().name, "a");
    }
}
