//! Relationship Loader - resolves entities and their relationships through
//! the cache
//!
//! Relationship fetches are grouped by distinct join value: ten teams in the
//! same league cost one `league?id=...` request, not ten. All fetches of a
//! batch are issued concurrently and the batch completes once every one of
//! them has settled. A failed branch is reported per entity and does not
//! fail the batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, RelationshipCache};
use crate::config::RelationsConfig;
use crate::entity::{EntityId, EntityRecord, EntityType};
use crate::error::{PartialRelationshipError, RelationError, RelationResult};
use crate::gateway::{EntityFilter, EntityGateway};
use crate::registry::{RelationshipConfig, RelationshipKind, RelationshipRegistry};
use crate::store::{merge_records, EntitiesByType, RelationshipsByEntityId};

/// Configuration for relationship loading
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Maximum number of values joined into a single multi-value filter
    pub max_batch_size: usize,
    /// Join distinct values into `field=a,b,c` requests instead of one
    /// request per value
    pub multi_value_filters: bool,
    /// Page size used by preloads and unfiltered listings
    pub default_page_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            multi_value_filters: false,
            default_page_size: 100,
        }
    }
}

impl From<&RelationsConfig> for LoaderConfig {
    fn from(config: &RelationsConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size.max(1),
            multi_value_filters: config.multi_value_filters,
            default_page_size: config.preload_page_size.max(1),
        }
    }
}

/// Result of resolving relationships for a batch of entities
#[derive(Debug, Clone, Default)]
pub struct RelationshipLoadResult {
    /// One entry per input entity, with one list per requested relationship
    pub relationships: RelationshipsByEntityId,
    /// Every related record fetched, grouped by its type
    pub related: EntitiesByType,
    /// Branches that failed; their lists are empty in `relationships`
    pub failures: Vec<PartialRelationshipError>,
    /// Number of distinct fetches issued for the batch
    pub request_count: usize,
}

impl RelationshipLoadResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Base entities plus their relationships, ready to merge into a store
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub entity_type: Option<EntityType>,
    /// Base records under their type plus every related record under its type
    pub entities_by_type: EntitiesByType,
    pub relationships_by_entity_id: RelationshipsByEntityId,
    pub failures: Vec<PartialRelationshipError>,
    /// Ids of the base records that were returned
    pub base_ids: Vec<EntityId>,
}

/// One planned relationship fetch
struct PlannedFetch {
    config_index: usize,
    values: Vec<String>,
    filter: EntityFilter,
}

/// Orchestrates gateway, registry and cache
#[derive(Clone)]
pub struct RelationshipLoader {
    gateway: Arc<dyn EntityGateway>,
    registry: Arc<RelationshipRegistry>,
    cache: Arc<RelationshipCache>,
    config: LoaderConfig,
}

impl RelationshipLoader {
    /// Create a loader with default configuration
    pub fn new(
        gateway: Arc<dyn EntityGateway>,
        registry: Arc<RelationshipRegistry>,
        cache: Arc<RelationshipCache>,
    ) -> Self {
        Self::with_config(gateway, registry, cache, LoaderConfig::default())
    }

    pub fn with_config(
        gateway: Arc<dyn EntityGateway>,
        registry: Arc<RelationshipRegistry>,
        cache: Arc<RelationshipCache>,
        config: LoaderConfig,
    ) -> Self {
        Self {
            gateway,
            registry,
            cache,
            config,
        }
    }

    pub fn registry(&self) -> &RelationshipRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<RelationshipCache> {
        &self.cache
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Fetch through the cache; `use_cache = false` forces a fetch and
    /// refreshes the cached value
    async fn fetch(
        &self,
        entity_type: EntityType,
        filter: EntityFilter,
        use_cache: bool,
    ) -> RelationResult<Vec<EntityRecord>> {
        let key = CacheKey::from_filter(entity_type, &filter);
        let gateway = Arc::clone(&self.gateway);
        self.cache
            .get_or_fetch(
                key,
                || async move { gateway.fetch(entity_type, &filter).await },
                !use_cache,
            )
            .await
    }

    /// Records of `entity_type` where `filter_field = filter_value`
    pub async fn fetch_entities_with_filter(
        &self,
        entity_type: EntityType,
        filter_field: &str,
        filter_value: &str,
        use_cache: bool,
    ) -> RelationResult<Vec<EntityRecord>> {
        self.fetch(
            entity_type,
            EntityFilter::equals(filter_field, filter_value),
            use_cache,
        )
        .await
    }

    /// Records of `entity_type` with the given ids, in `max_batch_size`
    /// chunks of `id=a,b,c` requests
    pub async fn fetch_entities_by_ids(
        &self,
        entity_type: EntityType,
        ids: &[EntityId],
        use_cache: bool,
    ) -> RelationResult<Vec<EntityRecord>> {
        let ids = distinct(ids.iter().filter(|id| !id.is_empty()).cloned());
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let fetches = ids
            .chunks(self.config.max_batch_size.max(1))
            .map(|chunk| self.fetch(entity_type, EntityFilter::ids(chunk), use_cache));

        let mut records = Vec::new();
        for result in join_all(fetches).await {
            merge_records(&mut records, result?);
        }
        Ok(records)
    }

    /// Resolve every relationship in `configs` for every entity.
    ///
    /// Never fails as a whole: a failed fetch is recorded as a
    /// `PartialRelationshipError` for each entity that depended on it and
    /// leaves that entity's list empty.
    pub async fn load_relationships_for_multiple(
        &self,
        entities: &[EntityRecord],
        entity_type: EntityType,
        configs: &[RelationshipConfig],
        use_cache: bool,
    ) -> RelationshipLoadResult {
        let plan = self.plan_fetches(entities, configs);
        debug!(
            %entity_type,
            entities = entities.len(),
            relationships = configs.len(),
            fetches = plan.len(),
            "Resolving relationships"
        );

        let fetches = plan.iter().map(|planned| {
            let related_type = configs[planned.config_index].related_entity_type;
            self.fetch(related_type, planned.filter.clone(), use_cache)
        });
        let results = join_all(fetches).await;

        let mut resolved: HashMap<(usize, String), Result<Vec<EntityRecord>, RelationError>> =
            HashMap::new();
        let mut related = EntitiesByType::new();

        for (planned, result) in plan.iter().zip(results) {
            let config = &configs[planned.config_index];
            match result {
                Ok(records) => {
                    merge_records(
                        related.entry(config.related_entity_type).or_default(),
                        records.clone(),
                    );
                    for value in &planned.values {
                        let matched = if planned.values.len() == 1 {
                            records.clone()
                        } else {
                            match_records(config, value, &records)
                        };
                        resolved.insert((planned.config_index, value.clone()), Ok(matched));
                    }
                }
                Err(err) => {
                    for value in &planned.values {
                        resolved.insert((planned.config_index, value.clone()), Err(err.clone()));
                    }
                }
            }
        }

        let mut relationships = RelationshipsByEntityId::new();
        let mut failures = Vec::new();

        for entity in entities {
            let map = relationships.entry(entity.id().to_string()).or_default();
            for (index, config) in configs.iter().enumerate() {
                let outcome = source_value(config, entity)
                    .and_then(|value| resolved.get(&(index, value)));

                let records = match outcome {
                    None => Vec::new(),
                    Some(Ok(records)) => records.clone(),
                    Some(Err(cause)) => {
                        warn!(
                            %entity_type,
                            entity_id = entity.id(),
                            relationship = %config.name,
                            error = %cause,
                            "Relationship branch failed"
                        );
                        failures.push(PartialRelationshipError {
                            entity_id: entity.id().to_string(),
                            relationship: config.name.clone(),
                            related_entity_type: config.related_entity_type,
                            cause: cause.clone(),
                        });
                        Vec::new()
                    }
                };
                map.insert(config.name.clone(), records);
            }
        }

        RelationshipLoadResult {
            relationships,
            related,
            failures,
            request_count: plan.len(),
        }
    }

    /// Resolve registered relationships of `entity_type`; `names` narrows
    /// the selection
    pub async fn load_registered_relationships(
        &self,
        entities: &[EntityRecord],
        entity_type: EntityType,
        names: Option<&[String]>,
        use_cache: bool,
    ) -> RelationResult<RelationshipLoadResult> {
        let configs = self.registry.select(entity_type, names)?;
        Ok(self
            .load_relationships_for_multiple(entities, entity_type, &configs, use_cache)
            .await)
    }

    /// Fetch every type of a named preload set, up to `page_size_hint`
    /// records each. Every constituent type gets an entry, even when empty.
    pub async fn preload_entity_set(
        &self,
        set_name: &str,
        page_size_hint: Option<usize>,
        use_cache: bool,
    ) -> RelationResult<EntitiesByType> {
        let set = self.registry.preload_set(set_name)?;
        let page_size = page_size_hint.unwrap_or(self.config.default_page_size).max(1);
        let entity_types = distinct(set.entity_types.iter().copied());

        let fetches = entity_types
            .iter()
            .map(|entity_type| self.fetch(*entity_type, EntityFilter::all(page_size), use_cache));
        let results = join_all(fetches).await;

        let mut entities = EntitiesByType::new();
        for (entity_type, result) in entity_types.into_iter().zip(results) {
            entities.insert(entity_type, result?);
        }

        info!(
            set = set_name,
            types = entities.len(),
            records = entities.values().map(Vec::len).sum::<usize>(),
            "Preloaded entity set"
        );
        Ok(entities)
    }

    /// Fetch base entities (all of a page when `ids` is `None`) and resolve
    /// their registered relationships.
    ///
    /// Fails when the type or a named relationship is not registered, or
    /// when the base fetch fails. Relationship failures are partial.
    pub async fn load_entities(
        &self,
        entity_type: EntityType,
        ids: Option<&[EntityId]>,
        names: Option<&[String]>,
        use_cache: bool,
    ) -> RelationResult<LoadOutcome> {
        let configs = self.registry.select(entity_type, names)?;

        let base = match ids {
            Some(ids) => self.fetch_entities_by_ids(entity_type, ids, use_cache).await?,
            None => {
                self.fetch(entity_type, EntityFilter::all(self.config.default_page_size), use_cache)
                    .await?
            }
        };

        let loaded = self
            .load_relationships_for_multiple(&base, entity_type, &configs, use_cache)
            .await;

        let base_ids = base.iter().map(|record| record.id().to_string()).collect();
        let mut entities_by_type = loaded.related;
        merge_records(entities_by_type.entry(entity_type).or_default(), base);

        Ok(LoadOutcome {
            entity_type: Some(entity_type),
            entities_by_type,
            relationships_by_entity_id: loaded.relationships,
            failures: loaded.failures,
            base_ids,
        })
    }

    fn plan_fetches(&self, entities: &[EntityRecord], configs: &[RelationshipConfig]) -> Vec<PlannedFetch> {
        let mut plan = Vec::new();

        for (config_index, config) in configs.iter().enumerate() {
            let values = distinct(entities.iter().filter_map(|entity| source_value(config, entity)));
            if values.is_empty() {
                continue;
            }

            if self.config.multi_value_filters {
                for chunk in values.chunks(self.config.max_batch_size.max(1)) {
                    plan.push(PlannedFetch {
                        config_index,
                        values: chunk.to_vec(),
                        filter: EntityFilter::equals(config.filter_field(), chunk.join(",")),
                    });
                }
            } else {
                for value in values {
                    plan.push(PlannedFetch {
                        config_index,
                        filter: EntityFilter::equals(config.filter_field(), value.clone()),
                        values: vec![value],
                    });
                }
            }
        }

        plan
    }
}

/// The value an entity contributes to a relationship filter
fn source_value(config: &RelationshipConfig, entity: &EntityRecord) -> Option<String> {
    match config.kind {
        RelationshipKind::BelongsTo => entity.join_value(&config.join_field),
        RelationshipKind::HasMany => Some(entity.id().to_string()),
    }
}

/// Records of a multi-value response that belong to one join value
fn match_records(config: &RelationshipConfig, value: &str, records: &[EntityRecord]) -> Vec<EntityRecord> {
    records
        .iter()
        .filter(|record| match config.kind {
            RelationshipKind::BelongsTo => record.id() == value,
            RelationshipKind::HasMany => record.join_value(&config.join_field).as_deref() == Some(value),
        })
        .cloned()
        .collect()
}

/// Order-preserving dedup
fn distinct<T, I>(items: I) -> Vec<T>
where
    T: Clone + Eq + std::hash::Hash,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
