//! Error types for relationship resolution
//!
//! Transport failures and programmer errors (unknown entity types,
//! relationships or preload sets) are returned as `RelationError`. A failed
//! relationship branch inside a batch load is not an error of the call; it
//! is recorded as a `PartialRelationshipError` next to the partial results.

use std::fmt;

use thiserror::Error;

use crate::entity::EntityType;

/// Result type alias for relationship operations
pub type RelationResult<T> = Result<T, RelationError>;

/// Error types for relationship loading and caching
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelationError {
    #[error("Transport error{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("Unknown relationship '{name}' on entity type '{entity_type}'")]
    UnknownRelationship { entity_type: String, name: String },

    #[error("Unknown preload set: {0}")]
    UnknownPreloadSet(String),

    #[error("Invalid entity record: {0}")]
    InvalidRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl RelationError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn unknown_relationship(entity_type: EntityType, name: impl Into<String>) -> Self {
        Self::UnknownRelationship {
            entity_type: entity_type.to_string(),
            name: name.into(),
        }
    }

    /// Returns true for network/HTTP failures reported by a gateway
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<reqwest::Error> for RelationError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RelationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A single relationship branch that failed while the rest of a batch load
/// succeeded. The affected relationship holds an empty list in the results.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRelationshipError {
    /// Entity whose relationship could not be resolved
    pub entity_id: String,
    /// Relationship name from the registry
    pub relationship: String,
    /// Type that was being fetched
    pub related_entity_type: EntityType,
    /// Underlying cause
    pub cause: RelationError,
}

impl fmt::Display for PartialRelationshipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to resolve '{}' ({}) for entity '{}': {}",
            self.relationship, self.related_entity_type, self.entity_id, self.cause
        )
    }
}

impl std::error::Error for PartialRelationshipError {}

/// Configuration loading errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

impl From<ConfigError> for RelationError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display_includes_status() {
        let err = RelationError::transport(Some(503), "service unavailable");
        assert_eq!(
            err.to_string(),
            "Transport error (HTTP 503): service unavailable"
        );

        let err = RelationError::transport(None, "connection refused");
        assert_eq!(err.to_string(), "Transport error: connection refused");
        assert!(err.is_transport());
    }

    #[test]
    fn test_partial_error_display() {
        let err = PartialRelationshipError {
            entity_id: "team-2".to_string(),
            relationship: "league".to_string(),
            related_entity_type: EntityType::League,
            cause: RelationError::transport(Some(500), "boom"),
        };

        let message = err.to_string();
        assert!(message.contains("'league' (league)"));
        assert!(message.contains("team-2"));
        assert!(message.contains("HTTP 500"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: RelationError = ConfigError::MissingEnvVar {
            var: "SPORTSDB_API_BASE_URL".to_string(),
        }
        .into();
        assert!(matches!(err, RelationError::Configuration(_)));
    }
}
