//! Entity gateway - the only network boundary of the relationship layer
//!
//! A gateway turns `(entity_type, filter)` into a list of records. It does
//! not cache, retry or merge; those concerns live in the cache and loader.

use async_trait::async_trait;

use crate::entity::{EntityRecord, EntityType};
use crate::error::RelationResult;

pub mod http;
pub mod memory;

pub use http::HttpEntityGateway;
pub use memory::InMemoryGateway;

/// Query parameter name used for page-limited listing
pub const LIMIT_FIELD: &str = "limit";

/// Equality filter understood by the remote entity endpoints
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityFilter {
    /// `field = value`; `value` may be a comma-joined list of ids
    Equals { field: String, value: String },
    /// Unfiltered listing, first `page_size` records
    All { page_size: usize },
}

impl EntityFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `id = a,b,c`
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = ids
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        Self::equals("id", joined)
    }

    pub fn all(page_size: usize) -> Self {
        Self::All { page_size }
    }

    /// The `(field, value)` query pair sent to the endpoint
    pub fn query_pair(&self) -> (String, String) {
        match self {
            EntityFilter::Equals { field, value } => (field.clone(), value.clone()),
            EntityFilter::All { page_size } => (LIMIT_FIELD.to_string(), page_size.to_string()),
        }
    }
}

/// Fetches entity records from the remote service
#[async_trait]
pub trait EntityGateway: Send + Sync {
    /// Return every record of `entity_type` matching `filter`
    async fn fetch(
        &self,
        entity_type: EntityType,
        filter: &EntityFilter,
    ) -> RelationResult<Vec<EntityRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_filter_joins_with_commas() {
        let filter = EntityFilter::ids(["team-1", "team-2"]);
        assert_eq!(
            filter.query_pair(),
            ("id".to_string(), "team-1,team-2".to_string())
        );
    }

    #[test]
    fn test_all_filter_maps_to_limit() {
        assert_eq!(
            EntityFilter::all(25).query_pair(),
            ("limit".to_string(), "25".to_string())
        );
    }
}
