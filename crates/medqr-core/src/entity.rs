use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical entity classes that can carry a scannable code.
///
/// The wire name is the canonical lowercase form rendered by `Display`.
/// Parsing is case-insensitive and collapses the legacy aliases still found
/// on older printed labels (`customuser` for staff badges, `deviceaccessory`
/// for accessory tags).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    User,
    Patient,
    Device,
    Bed,
    Accessory,
    Department,
    Room,
}

impl EntityType {
    /// All known entity types, in no particular order.
    pub const ALL: [EntityType; 7] = [
        EntityType::User,
        EntityType::Patient,
        EntityType::Device,
        EntityType::Bed,
        EntityType::Accessory,
        EntityType::Department,
        EntityType::Room,
    ];

    /// Canonical lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Patient => "patient",
            EntityType::Device => "device",
            EntityType::Bed => "bed",
            EntityType::Accessory => "accessory",
            EntityType::Department => "department",
            EntityType::Room => "room",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" | "customuser" => Ok(EntityType::User),
            "patient" => Ok(EntityType::Patient),
            "device" => Ok(EntityType::Device),
            "bed" => Ok(EntityType::Bed),
            "accessory" | "deviceaccessory" => Ok(EntityType::Accessory),
            "department" => Ok(EntityType::Department),
            "room" => Ok(EntityType::Room),
            other => Err(CoreError::invalid_entity_type(other)),
        }
    }
}

/// A reference to a domain record by type and opaque identifier.
///
/// The core never interprets `entity_id`; it is whatever the owning
/// collaborator uses as a primary key (numeric or string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

impl FromStr for EntityRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (entity_type, entity_id) = s
            .split_once(':')
            .ok_or_else(|| CoreError::invalid_entity_ref(format!("missing ':' in '{s}'")))?;
        if entity_id.is_empty() {
            return Err(CoreError::invalid_entity_ref(format!("empty id in '{s}'")));
        }
        Ok(Self {
            entity_type: entity_type.parse()?,
            entity_id: entity_id.to_string(),
        })
    }
}
