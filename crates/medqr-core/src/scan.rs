use crate::entity::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// One observed scan: which entity was scanned, plus any attributes the
/// resolving collaborator attached (device status, patient ward, ...).
///
/// `data` is consulted by operation step validation rules; it is otherwise
/// opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedEntity {
    pub entity_type: EntityType,
    pub entity_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub scanned_at: OffsetDateTime,
}

impl ScannedEntity {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            data: Map::new(),
            scanned_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Look up one attribute carried with the scan.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scanned_entity_attributes() {
        let mut data = Map::new();
        data.insert("status".to_string(), json!("available"));
        let scan = ScannedEntity::new(EntityType::Device, "7").with_data(data);

        assert_eq!(scan.attribute("status"), Some(&json!("available")));
        assert_eq!(scan.attribute("ward"), None);
    }

    #[test]
    fn test_scanned_entity_serde() {
        let scan = ScannedEntity::new(EntityType::Patient, "p-1");
        let text = serde_json::to_string(&scan).unwrap();
        let back: ScannedEntity = serde_json::from_str(&text).unwrap();
        assert_eq!(back.entity_type, EntityType::Patient);
        assert_eq!(back.entity_id, "p-1");
    }
}
