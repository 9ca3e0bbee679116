//! # sportsdb-relations
//!
//! Relationship resolution and caching for the sports entity database
//! console.
//!
//! ## Features
//!
//! - **Static relationship registry**: per entity type, which relationships
//!   exist and how they resolve (belongs-to or has-many)
//! - **Batched loading**: one fetch per distinct join value, issued
//!   concurrently, with per-branch failure isolation
//! - **Explicit cache instance**: keyed by `(type, field, value)`, no expiry,
//!   injected into the loader
//! - **Preload sets**: named bundles of reference data fetched ahead of a form
//! - **Sessions**: accumulate entities and relationships for a view with
//!   last-write-wins merges and plural accessors
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use sportsdb_relations::{
//!     EntityRecord, EntityType, InMemoryGateway, RelationshipCache, RelationshipLoader,
//!     RelationshipRegistry, RelationshipSession, SessionOptions,
//! };
//!
//! # tokio_test::block_on(async {
//! let gateway = InMemoryGateway::new()
//!     .with_records(EntityType::League, vec![EntityRecord::new("league-1", "Premier")])
//!     .with_records(
//!         EntityType::Team,
//!         vec![EntityRecord::new("team-1", "Rovers").with_field("league_id", "league-1")],
//!     );
//!
//! let loader = RelationshipLoader::new(
//!     Arc::new(gateway),
//!     Arc::new(RelationshipRegistry::sports_default()),
//!     Arc::new(RelationshipCache::new()),
//! );
//!
//! let mut session = RelationshipSession::new(
//!     loader,
//!     EntityType::Team,
//!     Some(vec!["team-1".to_string()]),
//!     SessionOptions::default().with_relationships(["league"]),
//! );
//! session.mount().await.unwrap();
//!
//! let view = session.view();
//! assert_eq!(view.relationships_by_entity_id["team-1"]["league"][0].name(), "Premier");
//! assert_eq!(view.accessor("leagues").len(), 1);
//! # });
//! ```

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod loader;
pub mod logging;
pub mod registry;
pub mod session;
pub mod store;

pub use cache::{CacheKey, CacheStatistics, RelationshipCache};
pub use config::RelationsConfig;
pub use entity::{EntityId, EntityRecord, EntityType};
pub use error::{ConfigError, PartialRelationshipError, RelationError, RelationResult};
pub use gateway::{EntityFilter, EntityGateway, HttpEntityGateway, InMemoryGateway};
pub use loader::{LoadOutcome, LoaderConfig, RelationshipLoadResult, RelationshipLoader};
pub use logging::{init_logging, LoggingConfig};
pub use registry::{PreloadSet, RelationshipConfig, RelationshipKind, RelationshipRegistry};
pub use session::{
    EntityRelationshipSession, LoadState, LoadStateWatcher, RelationshipSession, RelationshipsView,
    SessionOptions,
};
pub use store::{EntitiesByType, RelationshipStore, RelationshipsByEntityId};

use std::sync::Arc;

/// Wire the HTTP gateway, default registry and a fresh cache from `config`
pub fn http_loader(config: &RelationsConfig) -> RelationResult<RelationshipLoader> {
    let gateway = HttpEntityGateway::new(config)?;
    Ok(RelationshipLoader::with_config(
        Arc::new(gateway),
        Arc::new(RelationshipRegistry::sports_default()),
        Arc::new(RelationshipCache::new()),
        LoaderConfig::from(config),
    ))
}
