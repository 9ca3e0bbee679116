//! Relationship Registry - static relationship and preload-set configuration
//!
//! The registry is the single source of truth for which relationships exist
//! on each entity type and how they resolve. It is built once (normally via
//! `RelationshipRegistry::sports_default()`) and shared read-only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::error::{RelationError, RelationResult};

/// How a relationship is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Source holds the foreign key; fetch related where `id = source[join_field]`
    BelongsTo,
    /// Related holds the foreign key; fetch related where `join_field = source.id`
    HasMany,
}

/// Declares one named relationship of an entity type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipConfig {
    /// Relationship name, also the key in `relationships_by_entity_id`
    pub name: String,
    /// Type fetched to resolve the relationship
    pub related_entity_type: EntityType,
    /// Foreign key field (on the source for BelongsTo, on the related type for HasMany)
    pub join_field: String,
    pub kind: RelationshipKind,
}

impl RelationshipConfig {
    pub fn belongs_to(
        name: impl Into<String>,
        related_entity_type: EntityType,
        join_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            related_entity_type,
            join_field: join_field.into(),
            kind: RelationshipKind::BelongsTo,
        }
    }

    pub fn has_many(
        name: impl Into<String>,
        related_entity_type: EntityType,
        join_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            related_entity_type,
            join_field: join_field.into(),
            kind: RelationshipKind::HasMany,
        }
    }

    /// Field filtered on the related type
    pub fn filter_field(&self) -> &str {
        match self.kind {
            RelationshipKind::BelongsTo => "id",
            RelationshipKind::HasMany => &self.join_field,
        }
    }

    fn validate(&self) -> RelationResult<()> {
        if self.name.trim().is_empty() {
            return Err(RelationError::Configuration(
                "relationship name cannot be empty".to_string(),
            ));
        }
        if self.join_field.trim().is_empty() {
            return Err(RelationError::Configuration(format!(
                "relationship '{}' has an empty join field",
                self.name
            )));
        }
        Ok(())
    }
}

/// Named bundle of reference data fetched together before a form renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadSet {
    pub name: String,
    pub entity_types: Vec<EntityType>,
}

/// Static relationship configuration keyed by entity type
#[derive(Debug, Clone, Default)]
pub struct RelationshipRegistry {
    relationships: HashMap<EntityType, Vec<RelationshipConfig>>,
    preload_sets: HashMap<String, PreloadSet>,
}

impl RelationshipRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The hand-authored registry for the sports entity database
    pub fn sports_default() -> Self {
        use EntityType::*;
        use RelationshipConfig as R;

        let mut registry = Self::new();
        let entries: Vec<(EntityType, Vec<RelationshipConfig>)> = vec![
            (
                League,
                vec![
                    R::has_many("division_conferences", DivisionConference, "league_id"),
                    R::has_many("teams", Team, "league_id"),
                    R::has_many("league_executives", LeagueExecutive, "league_id"),
                ],
            ),
            (
                DivisionConference,
                vec![
                    R::belongs_to("league", League, "league_id"),
                    R::has_many("teams", Team, "division_conference_id"),
                ],
            ),
            (
                Team,
                vec![
                    R::belongs_to("league", League, "league_id"),
                    R::belongs_to("division_conference", DivisionConference, "division_conference_id"),
                    R::belongs_to("stadium", Stadium, "stadium_id"),
                    R::has_many("players", Player, "team_id"),
                    R::has_many("home_games", Game, "home_team_id"),
                    R::has_many("away_games", Game, "away_team_id"),
                ],
            ),
            (Player, vec![R::belongs_to("team", Team, "team_id")]),
            (
                Game,
                vec![
                    R::belongs_to("league", League, "league_id"),
                    R::belongs_to("home_team", Team, "home_team_id"),
                    R::belongs_to("away_team", Team, "away_team_id"),
                    R::belongs_to("stadium", Stadium, "stadium_id"),
                    R::has_many("game_broadcasts", GameBroadcast, "game_id"),
                    R::has_many("productions", Production, "game_id"),
                ],
            ),
            (
                Stadium,
                vec![
                    R::has_many("teams", Team, "stadium_id"),
                    R::has_many("games", Game, "stadium_id"),
                ],
            ),
            (
                Broadcast,
                vec![
                    R::belongs_to("brand", Brand, "brand_id"),
                    R::has_many("game_broadcasts", GameBroadcast, "broadcast_id"),
                ],
            ),
            (
                Production,
                vec![
                    R::belongs_to("game", Game, "game_id"),
                    R::belongs_to("brand", Brand, "brand_id"),
                ],
            ),
            (
                Brand,
                vec![
                    R::has_many("broadcasts", Broadcast, "brand_id"),
                    R::has_many("productions", Production, "brand_id"),
                ],
            ),
            (
                GameBroadcast,
                vec![
                    R::belongs_to("game", Game, "game_id"),
                    R::belongs_to("broadcast", Broadcast, "broadcast_id"),
                ],
            ),
            (LeagueExecutive, vec![R::belongs_to("league", League, "league_id")]),
        ];

        for (entity_type, configs) in entries {
            registry.register_type(entity_type);
            for config in configs {
                registry
                    .relationships
                    .entry(entity_type)
                    .or_default()
                    .push(config);
            }
        }

        let sets: [(&str, Vec<EntityType>); 6] = [
            ("FORM_BASICS", vec![League, Stadium, DivisionConference]),
            ("TEAM_FORM", vec![League, DivisionConference, Stadium]),
            ("GAME_FORM", vec![League, Team, Stadium]),
            ("BROADCAST_FORM", vec![Game, Brand]),
            ("PRODUCTION_FORM", vec![Game, Brand]),
            ("EXECUTIVE_FORM", vec![League]),
        ];
        for (name, entity_types) in sets {
            registry.preload_sets.insert(
                name.to_string(),
                PreloadSet {
                    name: name.to_string(),
                    entity_types,
                },
            );
        }

        registry
    }

    /// Make an entity type known to the registry, with no relationships yet
    pub fn register_type(&mut self, entity_type: EntityType) {
        self.relationships.entry(entity_type).or_default();
    }

    /// Register a relationship for an entity type
    pub fn register(
        &mut self,
        entity_type: EntityType,
        config: RelationshipConfig,
    ) -> RelationResult<()> {
        config.validate()?;

        let configs = self.relationships.entry(entity_type).or_default();
        if configs.iter().any(|existing| existing.name == config.name) {
            return Err(RelationError::Configuration(format!(
                "relationship '{}' is already registered on '{}'",
                config.name, entity_type
            )));
        }
        configs.push(config);
        Ok(())
    }

    /// Register (or replace) a named preload set
    pub fn register_preload_set(
        &mut self,
        name: impl Into<String>,
        entity_types: Vec<EntityType>,
    ) -> RelationResult<()> {
        let name = name.into();
        if entity_types.is_empty() {
            return Err(RelationError::Configuration(format!(
                "preload set '{}' has no entity types",
                name
            )));
        }
        self.preload_sets.insert(
            name.clone(),
            PreloadSet { name, entity_types },
        );
        Ok(())
    }

    /// Every relationship of a type, in registration order
    pub fn relationships_for(&self, entity_type: EntityType) -> RelationResult<&[RelationshipConfig]> {
        self.relationships
            .get(&entity_type)
            .map(Vec::as_slice)
            .ok_or_else(|| RelationError::UnknownEntityType(entity_type.to_string()))
    }

    /// The named subset of a type's relationships; `None` selects all of them
    pub fn select(
        &self,
        entity_type: EntityType,
        names: Option<&[String]>,
    ) -> RelationResult<Vec<RelationshipConfig>> {
        let all = self.relationships_for(entity_type)?;
        let Some(names) = names else {
            return Ok(all.to_vec());
        };

        names
            .iter()
            .map(|name| {
                all.iter()
                    .find(|config| &config.name == name)
                    .cloned()
                    .ok_or_else(|| RelationError::unknown_relationship(entity_type, name.clone()))
            })
            .collect()
    }

    pub fn get(&self, entity_type: EntityType, name: &str) -> Option<&RelationshipConfig> {
        self.relationships
            .get(&entity_type)?
            .iter()
            .find(|config| config.name == name)
    }

    pub fn is_registered(&self, entity_type: EntityType) -> bool {
        self.relationships.contains_key(&entity_type)
    }

    /// Relationships on other types that point at `entity_type`
    pub fn referencing(&self, entity_type: EntityType) -> Vec<(EntityType, &RelationshipConfig)> {
        let mut found: Vec<(EntityType, &RelationshipConfig)> = self
            .relationships
            .iter()
            .flat_map(|(source, configs)| configs.iter().map(move |config| (*source, config)))
            .filter(|(_, config)| config.related_entity_type == entity_type)
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));
        found
    }

    pub fn preload_set(&self, name: &str) -> RelationResult<&PreloadSet> {
        self.preload_sets
            .get(name)
            .ok_or_else(|| RelationError::UnknownPreloadSet(name.to_string()))
    }

    pub fn preload_set_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.preload_sets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Get statistics about the registry
    pub fn stats(&self) -> RegistryStats {
        let mut kind_counts = HashMap::new();
        for config in self.relationships.values().flatten() {
            *kind_counts.entry(config.kind).or_insert(0) += 1;
        }

        RegistryStats {
            total_entity_types: self.relationships.len(),
            total_relationships: self.relationships.values().map(Vec::len).sum(),
            preload_sets: self.preload_sets.len(),
            kind_counts,
        }
    }
}

/// Statistics about the relationship registry
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total_entity_types: usize,
    pub total_relationships: usize,
    pub preload_sets: usize,
    pub kind_counts: HashMap<RelationshipKind, usize>,
}
