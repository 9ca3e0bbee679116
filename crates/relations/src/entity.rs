//! Entity records and entity type tags
//!
//! `EntityRecord` is an immutable snapshot of a remote record: a map of
//! field name to JSON value that always carries a string `id`. Updating a
//! record means building a new snapshot and letting the store replace the
//! old one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RelationError, RelationResult};

/// Identifier of an entity record
pub type EntityId = String;

/// Category of domain record; selects the REST collection and the registry
/// entries that apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    League,
    DivisionConference,
    Team,
    Player,
    Game,
    Stadium,
    Broadcast,
    Production,
    Brand,
    GameBroadcast,
    LeagueExecutive,
}

impl EntityType {
    /// Every known entity type
    pub const ALL: [EntityType; 11] = [
        EntityType::League,
        EntityType::DivisionConference,
        EntityType::Team,
        EntityType::Player,
        EntityType::Game,
        EntityType::Stadium,
        EntityType::Broadcast,
        EntityType::Production,
        EntityType::Brand,
        EntityType::GameBroadcast,
        EntityType::LeagueExecutive,
    ];

    /// Snake-case tag used in configuration and accessor keys
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::League => "league",
            EntityType::DivisionConference => "division_conference",
            EntityType::Team => "team",
            EntityType::Player => "player",
            EntityType::Game => "game",
            EntityType::Stadium => "stadium",
            EntityType::Broadcast => "broadcast",
            EntityType::Production => "production",
            EntityType::Brand => "brand",
            EntityType::GameBroadcast => "game_broadcast",
            EntityType::LeagueExecutive => "league_executive",
        }
    }

    /// REST collection segment, e.g. `division-conferences`
    pub fn collection_path(self) -> String {
        crate::store::pluralize(self.as_str()).replace('_', "-")
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = RelationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| RelationError::UnknownEntityType(s.to_string()))
    }
}

/// Immutable snapshot of a remote entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct EntityRecord {
    id: EntityId,
    fields: Map<String, Value>,
}

impl EntityRecord {
    /// Create a record with the mandatory `id` and `name` fields
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String(id.clone()));
        fields.insert("name".to_string(), Value::String(name.into()));
        Self { id, fields }
    }

    /// Build a new snapshot with one more field set
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        if field == "id" {
            return self;
        }
        self.fields.insert(field, value.into());
        self
    }

    /// Decode a record from a JSON object
    pub fn from_value(value: Value) -> RelationResult<Self> {
        match value {
            Value::Object(map) => Self::try_from(map),
            other => Err(RelationError::InvalidRecord(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name; empty when the remote record has none
    pub fn name(&self) -> &str {
        self.fields
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field value as a join key. Numbers are rendered as strings; null,
    /// empty strings and non-scalar values yield `None`.
    pub fn join_value(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl TryFrom<Map<String, Value>> for EntityRecord {
    type Error = RelationError;

    fn try_from(mut fields: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = match fields.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(RelationError::InvalidRecord(format!(
                    "unsupported id value {}",
                    other
                )))
            }
            None => return Err(RelationError::InvalidRecord("record has no id".to_string())),
        };
        fields.insert("id".to_string(), Value::String(id.clone()));
        Ok(Self { id, fields })
    }
}

impl From<EntityRecord> for Map<String, Value> {
    fn from(record: EntityRecord) -> Self {
        record.fields
    }
}
