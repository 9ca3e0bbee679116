//! Relationship sessions - the entry point a consuming view holds
//!
//! A session owns a `RelationshipStore` for the lifetime of the view and
//! drives the loader against it:
//!
//! ```text
//! Idle ──mount/load──▶ Loading ──▶ Ready
//!                         │
//!                         └──────▶ Error(message) ──reload/set_request──▶ Loading
//! ```
//!
//! Load state is published on a `tokio::sync::watch` channel so other tasks
//! can observe `is_loading` while an operation is in flight. Failed loads
//! keep everything accumulated so far; the error is reported next to it.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::entity::{EntityId, EntityRecord, EntityType};
use crate::error::{PartialRelationshipError, RelationResult};
use crate::loader::{LoadOutcome, RelationshipLoader};
use crate::store::{EntitiesByType, PluralAccessors, RelationshipMap, RelationshipStore, RelationshipsByEntityId};

/// Load lifecycle of a session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
    Error(String),
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoadState::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Receiver side of a session's load state
pub type LoadStateWatcher = watch::Receiver<LoadState>;

/// Options accepted when creating a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Load the requested entities when the session is mounted
    pub load_on_mount: bool,
    /// Preload set fetched on mount, before the entity load
    pub preload_set: Option<String>,
    /// Relationship names to resolve; `None` resolves all registered ones
    pub relationships: Option<Vec<String>>,
    /// Serve repeated requests from the cache
    pub use_caching: bool,
    /// Records fetched per type by preloads; `None` uses the loader default
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            load_on_mount: true,
            preload_set: None,
            relationships: None,
            use_caching: true,
            page_size: None,
        }
    }
}

impl SessionOptions {
    pub fn with_preload_set(mut self, name: impl Into<String>) -> Self {
        self.preload_set = Some(name.into());
        self
    }

    pub fn with_relationships<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationships = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn lazy(mut self) -> Self {
        self.load_on_mount = false;
        self
    }

    pub fn without_caching(mut self) -> Self {
        self.use_caching = false;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// Borrowed snapshot handed to a rendering view
#[derive(Debug, Clone)]
pub struct RelationshipsView<'a> {
    pub entities_by_type: &'a EntitiesByType,
    pub relationships_by_entity_id: &'a RelationshipsByEntityId,
    pub is_loading: bool,
    pub error: Option<String>,
    pub plural_accessors: &'a PluralAccessors,
    pub partial_failures: &'a [PartialRelationshipError],
}

impl<'a> RelationshipsView<'a> {
    /// Records under a plural accessor key such as `leagues`
    pub fn accessor(&self, key: &str) -> &'a [EntityRecord] {
        self.plural_accessors
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Relationship state for one consuming view
pub struct RelationshipSession {
    loader: RelationshipLoader,
    entity_type: EntityType,
    entity_ids: Option<Vec<EntityId>>,
    options: SessionOptions,
    store: RelationshipStore,
    state: watch::Sender<LoadState>,
    failures: Vec<PartialRelationshipError>,
    /// Base ids delivered by the last load of the current request
    base_ids: Vec<EntityId>,
}

impl RelationshipSession {
    /// Create an idle session; nothing is fetched until `mount` or `load`
    pub fn new(
        loader: RelationshipLoader,
        entity_type: EntityType,
        entity_ids: Option<Vec<EntityId>>,
        options: SessionOptions,
    ) -> Self {
        let (state, _) = watch::channel(LoadState::Idle);
        Self {
            loader,
            entity_type,
            entity_ids,
            options,
            store: RelationshipStore::new(),
            state,
            failures: Vec::new(),
            base_ids: Vec::new(),
        }
    }

    /// Run the preload set, then the eager load, as configured
    pub async fn mount(&mut self) -> RelationResult<()> {
        if let Some(set_name) = self.options.preload_set.clone() {
            self.preload_entity_set(&set_name).await?;
        }
        if self.options.load_on_mount {
            self.load().await?;
        }
        Ok(())
    }

    /// Load the requested entities and relationships into the store
    pub async fn load(&mut self) -> RelationResult<()> {
        self.run_load(self.options.use_caching).await
    }

    /// Re-fetch the requested entities bypassing the cache. Their records are
    /// replaced; other types and relationships already in the store are kept.
    pub async fn reload(&mut self) -> RelationResult<()> {
        self.run_load(false).await
    }

    /// Point the session at another type or id set; loads when it changed
    pub async fn set_request(
        &mut self,
        entity_type: EntityType,
        entity_ids: Option<Vec<EntityId>>,
    ) -> RelationResult<()> {
        if self.entity_type == entity_type && self.entity_ids == entity_ids {
            return Ok(());
        }
        self.entity_type = entity_type;
        self.entity_ids = entity_ids;
        self.base_ids.clear();
        self.load().await
    }

    /// Fetch a named preload set and merge it into the store
    pub async fn preload_entity_set(&mut self, set_name: &str) -> RelationResult<EntitiesByType> {
        self.set_state(LoadState::Loading);
        match self
            .loader
            .preload_entity_set(set_name, self.options.page_size, self.options.use_caching)
            .await
        {
            Ok(entities) => {
                self.store.merge_entities(entities.clone());
                self.set_state(LoadState::Ready);
                Ok(entities)
            }
            Err(err) => {
                error!(set = set_name, error = %err, "Preload failed");
                self.set_state(LoadState::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Clear a reported error, keeping the data
    pub fn dismiss_error(&mut self) {
        if self.state().error().is_some() {
            let next = if self.store.is_empty() {
                LoadState::Idle
            } else {
                LoadState::Ready
            };
            self.set_state(next);
        }
    }

    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// Observe state transitions from another task
    pub fn subscribe(&self) -> LoadStateWatcher {
        self.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error().map(str::to_string)
    }

    /// Relationship branches that failed during the last load
    pub fn partial_failures(&self) -> &[PartialRelationshipError] {
        &self.failures
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn entity_ids(&self) -> Option<&[EntityId]> {
        self.entity_ids.as_deref()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn store(&self) -> &RelationshipStore {
        &self.store
    }

    pub fn view(&self) -> RelationshipsView<'_> {
        let state = self.state.borrow();
        RelationshipsView {
            entities_by_type: self.store.entities_by_type(),
            relationships_by_entity_id: self.store.relationships_by_entity_id(),
            is_loading: state.is_loading(),
            error: state.error().map(str::to_string),
            plural_accessors: self.store.plural_accessors(),
            partial_failures: &self.failures,
        }
    }

    /// Records under a plural accessor key such as `leagues`
    pub fn accessor(&self, key: &str) -> &[EntityRecord] {
        self.store.accessor(key)
    }

    async fn run_load(&mut self, use_cache: bool) -> RelationResult<()> {
        self.set_state(LoadState::Loading);
        let entity_type = self.entity_type;

        let result = self
            .loader
            .load_entities(
                entity_type,
                self.entity_ids.as_deref(),
                self.options.relationships.as_deref(),
                use_cache,
            )
            .await;

        match result {
            Ok(outcome) => {
                debug!(
                    %entity_type,
                    entities = outcome.base_ids.len(),
                    failures = outcome.failures.len(),
                    refreshed = !use_cache,
                    "Relationships loaded"
                );
                self.apply(outcome, !use_cache);
                self.set_state(LoadState::Ready);
                Ok(())
            }
            Err(err) => {
                error!(%entity_type, error = %err, "Relationship load failed");
                self.set_state(LoadState::Error(err.to_string()));
                Err(err)
            }
        }
    }

    fn apply(&mut self, mut outcome: LoadOutcome, replace: bool) {
        if replace {
            let base = outcome
                .entities_by_type
                .remove(&self.entity_type)
                .unwrap_or_default();
            let stale = self.entity_ids.as_ref().unwrap_or(&self.base_ids).clone();
            let removed = self.store.replace_entities(self.entity_type, &stale, base);
            info!(
                entity_type = %self.entity_type,
                replaced = stale.len(),
                removed = removed.len(),
                "Replacing reloaded records"
            );
        }

        self.store.merge_entities(outcome.entities_by_type);
        self.store.merge_relationships(outcome.relationships_by_entity_id);
        self.failures = outcome.failures;
        self.base_ids = outcome.base_ids;
    }

    fn set_state(&self, state: LoadState) {
        self.state.send_replace(state);
    }
}

/// Session over a single entity and its relationships
pub struct EntityRelationshipSession {
    session: RelationshipSession,
    entity_id: EntityId,
}

impl EntityRelationshipSession {
    pub fn new(
        loader: RelationshipLoader,
        entity_type: EntityType,
        entity_id: impl Into<EntityId>,
        options: SessionOptions,
    ) -> Self {
        let entity_id = entity_id.into();
        Self {
            session: RelationshipSession::new(loader, entity_type, Some(vec![entity_id.clone()]), options),
            entity_id,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The loaded record, once available
    pub fn entity(&self) -> Option<&EntityRecord> {
        self.session
            .store
            .entity(self.session.entity_type, &self.entity_id)
    }

    /// Resolved relationships of the entity, once available
    pub fn relationships(&self) -> Option<&RelationshipMap> {
        self.session.store.relationships(&self.entity_id)
    }

    /// Switch to another entity of the same type
    pub async fn set_entity(&mut self, entity_id: impl Into<EntityId>) -> RelationResult<()> {
        self.entity_id = entity_id.into();
        let entity_type = self.session.entity_type;
        self.session
            .set_request(entity_type, Some(vec![self.entity_id.clone()]))
            .await
    }
}

impl Deref for EntityRelationshipSession {
    type Target = RelationshipSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl DerefMut for EntityRelationshipSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cache::RelationshipCache;
    use crate::error::RelationError;
    use crate::gateway::{EntityFilter, InMemoryGateway};
    use crate::loader::LoaderConfig;
    use crate::registry::RelationshipRegistry;

    fn loader(gateway: &Arc<InMemoryGateway>) -> RelationshipLoader {
        RelationshipLoader::new(
            gateway.clone(),
            Arc::new(RelationshipRegistry::sports_default()),
            Arc::new(RelationshipCache::new()),
        )
    }

    fn paged_loader(gateway: &Arc<InMemoryGateway>, page_size: usize) -> RelationshipLoader {
        RelationshipLoader::with_config(
            gateway.clone(),
            Arc::new(RelationshipRegistry::sports_default()),
            Arc::new(RelationshipCache::new()),
            LoaderConfig {
                default_page_size: page_size,
                ..LoaderConfig::default()
            },
        )
    }

    fn league_gateway() -> Arc<InMemoryGateway> {
        Arc::new(
            InMemoryGateway::new()
                .with_records(
                    EntityType::League,
                    vec![
                        EntityRecord::new("league-1", "Premier"),
                        EntityRecord::new("league-2", "Championship"),
                    ],
                )
                .with_records(
                    EntityType::Team,
                    vec![
                        EntityRecord::new("team-1", "Rovers").with_field("league_id", "league-1"),
                        EntityRecord::new("team-2", "United").with_field("league_id", "league-1"),
                        EntityRecord::new("team-3", "Athletic").with_field("league_id", "league-2"),
                    ],
                ),
        )
    }

    fn stadium_gateway() -> Arc<InMemoryGateway> {
        Arc::new(
            InMemoryGateway::new()
                .with_records(EntityType::Stadium, vec![EntityRecord::new("stadium-1", "Park")])
                .with_records(
                    EntityType::Team,
                    vec![EntityRecord::new("team-1", "Rovers").with_field("stadium_id", "stadium-1")],
                ),
        )
    }

    #[test]
    fn test_options_builders() {
        let options = SessionOptions::default()
            .with_preload_set("TEAM_FORM")
            .with_relationships(["league", "stadium"])
            .lazy()
            .without_caching()
            .with_page_size(25);

        assert!(!options.load_on_mount);
        assert!(!options.use_caching);
        assert_eq!(options.preload_set.as_deref(), Some("TEAM_FORM"));
        assert_eq!(options.page_size, Some(25));
        assert_eq!(options.relationships.unwrap(), vec!["league", "stadium"]);
    }

    #[tokio::test]
    async fn test_session_starts_idle_and_loads_on_mount() {
        let gateway = stadium_gateway();
        let mut session = RelationshipSession::new(
            loader(&gateway),
            EntityType::Stadium,
            Some(vec!["stadium-1".to_string()]),
            SessionOptions::default(),
        );
        assert_eq!(session.state(), LoadState::Idle);

        session.mount().await.unwrap();

        assert_eq!(session.state(), LoadState::Ready);
        let view = session.view();
        assert!(!view.is_loading);
        assert_eq!(view.accessor("stadiums").len(), 1);
        assert_eq!(view.relationships_by_entity_id["stadium-1"]["teams"][0].id(), "team-1");
        assert_eq!(view.accessor("teams").len(), 1);
    }

    #[tokio::test]
    async fn test_lazy_session_does_not_fetch_on_mount() {
        let gateway = stadium_gateway();
        let mut session = RelationshipSession::new(
            loader(&gateway),
            EntityType::Stadium,
            None,
            SessionOptions::default().lazy(),
        );

        session.mount().await.unwrap();

        assert_eq!(gateway.call_count(), 0);
        assert_eq!(session.state(), LoadState::Idle);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_data_and_reports_error() {
        let gateway = stadium_gateway();
        let mut session = RelationshipSession::new(
            loader(&gateway),
            EntityType::Stadium,
            Some(vec!["stadium-1".to_string()]),
            SessionOptions::default(),
        );
        session.load().await.unwrap();

        gateway.fail_on(
            EntityType::Stadium,
            EntityFilter::ids(["stadium-1"]),
            RelationError::transport(Some(503), "unavailable"),
        );
        let err = session.reload().await.unwrap_err();

        assert!(err.is_transport());
        let view = session.view();
        assert!(view.error.as_deref().unwrap().contains("unavailable"));
        assert_eq!(view.accessor("stadiums").len(), 1);

        session.dismiss_error();
        assert_eq!(session.state(), LoadState::Ready);
    }

    #[tokio::test]
    async fn test_unknown_preload_set_reports_error() {
        let gateway = stadium_gateway();
        let mut session = RelationshipSession::new(
            loader(&gateway),
            EntityType::Stadium,
            None,
            SessionOptions::default().with_preload_set("NOPE").lazy(),
        );

        let err = session.mount().await.unwrap_err();
        assert_eq!(err, RelationError::UnknownPreloadSet("NOPE".to_string()));
        assert_eq!(session.state(), LoadState::Error(err.to_string()));

        session.dismiss_error();
        assert_eq!(session.state(), LoadState::Idle);
    }

    #[tokio::test]
    async fn test_watchers_see_final_state() {
        let gateway = stadium_gateway();
        let mut session = RelationshipSession::new(
            loader(&gateway),
            EntityType::Stadium,
            None,
            SessionOptions::default(),
        );
        let watcher = session.subscribe();

        session.load().await.unwrap();

        assert_eq!(*watcher.borrow(), LoadState::Ready);
    }

    #[tokio::test]
    async fn test_set_request_only_loads_on_change() {
        let gateway = stadium_gateway();
        let ids = Some(vec!["stadium-1".to_string()]);
        let mut session = RelationshipSession::new(
            loader(&gateway),
            EntityType::Stadium,
            ids.clone(),
            SessionOptions::default(),
        );

        session.set_request(EntityType::Stadium, ids).await.unwrap();
        assert_eq!(gateway.call_count(), 0);

        session
            .set_request(EntityType::Team, Some(vec!["team-1".to_string()]))
            .await
            .unwrap();
        assert_eq!(session.entity_type(), EntityType::Team);
        assert_eq!(session.view().accessor("teams").len(), 1);
    }

    #[tokio::test]
    async fn test_entity_session_exposes_entity_and_relationships() {
        let gateway = stadium_gateway();
        let mut session = EntityRelationshipSession::new(
            loader(&gateway),
            EntityType::Team,
            "team-1",
            SessionOptions::default().with_relationships(["stadium"]),
        );
        assert!(session.entity().is_none());

        session.mount().await.unwrap();

        assert_eq!(session.entity().unwrap().name(), "Rovers");
        let relationships = session.relationships().unwrap();
        assert_eq!(relationships["stadium"][0].id(), "stadium-1");
        assert!(!relationships.contains_key("league"));
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_listing_reload_keeps_records_from_earlier_requests() {
        let gateway = league_gateway();
        let mut session = RelationshipSession::new(
            paged_loader(&gateway, 1),
            EntityType::Team,
            Some(vec!["team-3".to_string()]),
            SessionOptions::default().with_relationships(["league"]),
        );
        session.load().await.unwrap();
        session.set_request(EntityType::Team, None).await.unwrap();

        let before: Vec<&str> = session.store().entities(EntityType::Team).iter().map(|t| t.id()).collect();
        assert_eq!(before, vec!["team-3", "team-1"]);

        session.reload().await.unwrap();

        let store = session.store();
        assert!(store.entity(EntityType::Team, "team-3").is_some());
        assert!(store.entity(EntityType::Team, "team-1").is_some());
        assert_eq!(store.related("team-3", "league")[0].id(), "league-2");
    }

    #[tokio::test]
    async fn test_reload_drops_relationships_of_records_gone_upstream() {
        let gateway = league_gateway();
        let mut session = RelationshipSession::new(
            loader(&gateway),
            EntityType::Team,
            Some(vec!["team-1".to_string(), "team-2".to_string()]),
            SessionOptions::default().with_relationships(["league"]),
        );
        session.load().await.unwrap();
        assert!(session.store().relationships("team-2").is_some());

        gateway.remove(EntityType::Team, "team-2");
        session.reload().await.unwrap();

        let store = session.store();
        assert!(store.entity(EntityType::Team, "team-2").is_none());
        assert!(store.relationships("team-2").is_none());
        assert_eq!(store.related("team-1", "league")[0].id(), "league-1");
        assert_eq!(session.accessor("teams").len(), 1);
    }

    #[tokio::test]
    async fn test_preload_uses_configured_page_size() {
        let gateway = league_gateway();
        let mut session = RelationshipSession::new(
            loader(&gateway),
            EntityType::Team,
            None,
            SessionOptions::default().with_page_size(1),
        );

        let entities = session.preload_entity_set("EXECUTIVE_FORM").await.unwrap();

        assert_eq!(entities[&EntityType::League].len(), 1);
        assert_eq!(gateway.calls_for(EntityType::League, &EntityFilter::all(1)), 1);
        assert_eq!(session.accessor("leagues").len(), 1);
    }
}
