//! Relationship store - accumulated entities and resolved relationships
//!
//! Merges are last-write-wins by id: an incoming record replaces the stored
//! record with the same id in place, new ids are appended. Plural accessors
//! (`leagues`, `teams`, ...) are derived from `entities_by_type` after every
//! merge and are never written to directly.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::entity::{EntityId, EntityRecord, EntityType};

/// Entity type -> deduplicated records
pub type EntitiesByType = HashMap<EntityType, Vec<EntityRecord>>;

/// Relationship name -> related records
pub type RelationshipMap = HashMap<String, Vec<EntityRecord>>;

/// Entity id -> relationship name -> related records
pub type RelationshipsByEntityId = HashMap<EntityId, RelationshipMap>;

/// Plural accessor key -> records
pub type PluralAccessors = BTreeMap<String, Vec<EntityRecord>>;

/// English plural of a snake_case tag, applied to its last word
pub fn pluralize(word: &str) -> String {
    let ends_with_consonant_y = word.ends_with('y')
        && word
            .chars()
            .rev()
            .nth(1)
            .map(|c| !"aeiou".contains(c))
            .unwrap_or(false);

    if ends_with_consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| word.ends_with(suffix)) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

/// Plural accessors derived from `entities_by_type`
pub fn plural_accessors(entities_by_type: &EntitiesByType) -> PluralAccessors {
    entities_by_type
        .iter()
        .map(|(entity_type, records)| (pluralize(entity_type.as_str()), records.clone()))
        .collect()
}

/// Last-write-wins merge of `incoming` into `existing`, keyed by id.
///
/// Existing order is kept; replaced records stay in their slot and new ids
/// are appended in incoming order. Duplicates inside `incoming` collapse to
/// the last one.
pub fn merge_records(existing: &mut Vec<EntityRecord>, incoming: Vec<EntityRecord>) {
    let mut positions: HashMap<String, usize> = existing
        .iter()
        .enumerate()
        .map(|(index, record)| (record.id().to_string(), index))
        .collect();

    for record in incoming {
        match positions.get(record.id()) {
            Some(&index) => existing[index] = record,
            None => {
                positions.insert(record.id().to_string(), existing.len());
                existing.push(record);
            }
        }
    }
}

/// Accumulated state shared by a consuming view
#[derive(Debug, Clone, Default)]
pub struct RelationshipStore {
    entities_by_type: EntitiesByType,
    relationships_by_entity_id: RelationshipsByEntityId,
    accessors: PluralAccessors,
}

impl RelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union each type's incoming records into the store
    pub fn merge_entities(&mut self, fragment: EntitiesByType) {
        for (entity_type, records) in fragment {
            merge_records(self.entities_by_type.entry(entity_type).or_default(), records);
        }
        self.rebuild_accessors();
    }

    /// Overwrite the named relationship lists of each entity; other names
    /// on the same entity are preserved
    pub fn merge_relationships(&mut self, fragment: RelationshipsByEntityId) {
        for (entity_id, relationships) in fragment {
            let stored = self.relationships_by_entity_id.entry(entity_id).or_default();
            for (name, records) in relationships {
                stored.insert(name, records);
            }
        }
    }

    /// Drop the records with `ids` from a type, then merge `records`.
    ///
    /// Records whose ids were not re-delivered are removed together with
    /// their relationship entries; their ids are returned.
    pub fn replace_entities(
        &mut self,
        entity_type: EntityType,
        ids: &[EntityId],
        records: Vec<EntityRecord>,
    ) -> Vec<EntityId> {
        let stale: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let delivered: HashSet<&str> = records.iter().map(EntityRecord::id).collect();

        let list = self.entities_by_type.entry(entity_type).or_default();
        let removed: Vec<EntityId> = list
            .iter()
            .map(EntityRecord::id)
            .filter(|id| stale.contains(id) && !delivered.contains(id))
            .map(str::to_string)
            .collect();

        list.retain(|record| !stale.contains(record.id()));
        merge_records(list, records);

        for id in &removed {
            self.relationships_by_entity_id.remove(id);
        }
        self.rebuild_accessors();
        removed
    }

    pub fn entities_by_type(&self) -> &EntitiesByType {
        &self.entities_by_type
    }

    pub fn relationships_by_entity_id(&self) -> &RelationshipsByEntityId {
        &self.relationships_by_entity_id
    }

    pub fn plural_accessors(&self) -> &PluralAccessors {
        &self.accessors
    }

    /// Records under a plural accessor key such as `leagues`
    pub fn accessor(&self, key: &str) -> &[EntityRecord] {
        self.accessors.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entities(&self, entity_type: EntityType) -> &[EntityRecord] {
        self.entities_by_type
            .get(&entity_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn entity(&self, entity_type: EntityType, id: &str) -> Option<&EntityRecord> {
        self.entities(entity_type).iter().find(|record| record.id() == id)
    }

    pub fn relationships(&self, entity_id: &str) -> Option<&RelationshipMap> {
        self.relationships_by_entity_id.get(entity_id)
    }

    pub fn related(&self, entity_id: &str, relationship: &str) -> &[EntityRecord] {
        self.relationships_by_entity_id
            .get(entity_id)
            .and_then(|map| map.get(relationship))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entities_by_type.values().all(Vec::is_empty) && self.relationships_by_entity_id.is_empty()
    }

    fn rebuild_accessors(&mut self) {
        self.accessors = plural_accessors(&self.entities_by_type);
    }
}
