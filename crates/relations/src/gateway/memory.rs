//! In-memory gateway for tests and offline development
//!
//! Serves seeded records, evaluates equality filters the way the REST
//! endpoints do (comma-separated values match any), records every call and
//! can be told to fail specific requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::{EntityFilter, EntityGateway};
use crate::entity::{EntityRecord, EntityType};
use crate::error::{RelationError, RelationResult};

/// Gateway serving records from memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    records: Arc<RwLock<HashMap<EntityType, Vec<EntityRecord>>>>,
    calls: Arc<Mutex<Vec<(EntityType, EntityFilter)>>>,
    failures: Arc<Mutex<HashMap<(EntityType, EntityFilter), RelationError>>>,
    latency: Option<Duration>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed records for a type
    pub fn with_records(self, entity_type: EntityType, records: Vec<EntityRecord>) -> Self {
        for record in records {
            self.upsert(entity_type, record);
        }
        self
    }

    /// Delay every fetch, to exercise concurrent callers
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Insert or replace a record (by id), as a remote write would
    pub fn upsert(&self, entity_type: EntityType, record: EntityRecord) {
        let mut records = self.records.write();
        let list = records.entry(entity_type).or_default();
        match list.iter_mut().find(|existing| existing.id() == record.id()) {
            Some(existing) => *existing = record,
            None => list.push(record),
        }
    }

    /// Delete a record by id, as a remote delete would
    pub fn remove(&self, entity_type: EntityType, id: &str) -> bool {
        let mut records = self.records.write();
        let Some(list) = records.get_mut(&entity_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|record| record.id() != id);
        list.len() != before
    }

    /// Make the given request fail until `clear_failure` is called
    pub fn fail_on(&self, entity_type: EntityType, filter: EntityFilter, error: RelationError) {
        self.failures.lock().insert((entity_type, filter), error);
    }

    pub fn clear_failure(&self, entity_type: EntityType, filter: &EntityFilter) {
        self.failures.lock().remove(&(entity_type, filter.clone()));
    }

    /// Every request received so far, in arrival order
    pub fn calls(&self) -> Vec<(EntityType, EntityFilter)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of requests received for one `(type, filter)` pair
    pub fn calls_for(&self, entity_type: EntityType, filter: &EntityFilter) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(t, f)| *t == entity_type && f == filter)
            .count()
    }

    /// Number of requests received for a type, regardless of filter
    pub fn calls_for_type(&self, entity_type: EntityType) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(t, _)| *t == entity_type)
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    fn evaluate(&self, entity_type: EntityType, filter: &EntityFilter) -> Vec<EntityRecord> {
        let records = self.records.read();
        let Some(list) = records.get(&entity_type) else {
            return Vec::new();
        };

        match filter {
            EntityFilter::Equals { field, value } => {
                let wanted: Vec<&str> = value.split(',').map(str::trim).collect();
                list.iter()
                    .filter(|record| {
                        record
                            .join_value(field)
                            .map(|v| wanted.contains(&v.as_str()))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect()
            }
            EntityFilter::All { page_size } => list.iter().take(*page_size).cloned().collect(),
        }
    }
}

#[async_trait]
impl EntityGateway for InMemoryGateway {
    async fn fetch(
        &self,
        entity_type: EntityType,
        filter: &EntityFilter,
    ) -> RelationResult<Vec<EntityRecord>> {
        self.calls.lock().push((entity_type, filter.clone()));

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self
            .failures
            .lock()
            .get(&(entity_type, filter.clone()))
            .cloned();
        if let Some(error) = failure {
            return Err(error);
        }

        Ok(self.evaluate(entity_type, filter))
    }
}
