// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identity map: one canonical record per server entity.
//!
//! Canonical entities are stored in an arena indexed by [`EntityId`]; the
//! lookup table maps [`IdentityKey`]s to arena slots. References between
//! entities are plain ids, so self-referential graphs are safe to hold.
//!
//! Every map carries a generation number, drawn from a process-wide counter
//! and renewed by [`IdentityMap::clear`]. Ids remember the generation that
//! issued them, so an id from another map or from before a clear resolves
//! to nothing instead of to whatever now sits in its slot.
//!
//! The map has no interior locking. Callers that share one map across
//! concurrent calls must serialize access themselves.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Datum, Record, ENTITY_TYPE_KEY};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Handle to a canonical entity, valid in the [`IdentityMap`] generation
/// that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    generation: u64,
    index: usize,
}

impl EntityId {
    /// Arena slot index.
    pub fn index(self) -> usize {
        self.index
    }

    /// Generation of the map that issued this id.
    pub fn generation(self) -> u64 {
        self.generation
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.generation, self.index)
    }
}

/// Entity type name followed by the ordered primary-key values, comma joined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Compose a key from an entity type and rendered primary-key values.
    pub fn new<I, S>(entity_type: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = entity_type.to_owned();
        for value in values {
            key.push(',');
            key.push_str(value.as_ref());
        }
        IdentityKey(key)
    }

    /// Key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical representation of one server entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    key: IdentityKey,
    entity_type: String,
    primary_key: Vec<String>,
    fields: Record,
}

impl Entity {
    /// Identity key of this entity.
    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    /// Server entity type name.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Primary-key field names, in schema order.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// All fields seen so far, including the type tag.
    pub fn fields(&self) -> &Record {
        &self.fields
    }

    /// Field value, if any response has carried it.
    pub fn get(&self, field: &str) -> Option<&Datum> {
        self.fields.get(field)
    }

    /// True when `field` has been populated.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Minimal mapping that identifies this entity to the server: the type
    /// tag plus every primary-key field.
    pub fn reference(&self) -> Record {
        let mut out = Record::new();
        out.insert(
            ENTITY_TYPE_KEY.to_owned(),
            Datum::String(self.entity_type.clone()),
        );
        for name in &self.primary_key {
            if let Some(value) = self.fields.get(name) {
                out.insert(name.clone(), value.clone());
            }
        }
        out
    }
}

/// Deduplicating store of canonical entities.
///
/// A clone keeps its source's generation, so ids issued before the clone
/// resolve in both copies.
#[derive(Debug, Clone)]
pub struct IdentityMap {
    generation: u64,
    entities: Vec<Entity>,
    index: HashMap<IdentityKey, EntityId>,
}

impl Default for IdentityMap {
    fn default() -> Self {
        Self {
            generation: next_generation(),
            entities: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl IdentityMap {
    /// Create an empty map with a generation of its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation stamped on the ids this map currently hands out.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when `id` was issued by this map since its last clear.
    pub fn owns(&self, id: EntityId) -> bool {
        id.generation == self.generation && id.index < self.entities.len()
    }

    /// Number of canonical entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when no entity has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Canonical entity behind `id`. `None` for ids issued by another map
    /// or before the last [`clear`](Self::clear).
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        if id.generation != self.generation {
            return None;
        }
        self.entities.get(id.index)
    }

    /// Canonical entity behind a decoded value, if it is an entity reference.
    pub fn resolve(&self, value: &Datum) -> Option<&Entity> {
        value.as_entity().and_then(|id| self.get(id))
    }

    /// Id registered for `key`.
    pub fn lookup(&self, key: &IdentityKey) -> Option<EntityId> {
        self.index.get(key).copied()
    }

    /// Iterate canonical entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (self.id_at(index), entity))
    }

    /// Forget every entity and start a new generation. Ids handed out
    /// earlier no longer resolve, even once their slots are reused.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.index.clear();
        self.generation = next_generation();
    }

    fn id_at(&self, index: usize) -> EntityId {
        EntityId {
            generation: self.generation,
            index,
        }
    }

    /// Find or allocate the slot for `key`. The flag is true on allocation.
    pub(crate) fn upsert(
        &mut self,
        key: IdentityKey,
        entity_type: &str,
        primary_key: &[String],
    ) -> (EntityId, bool) {
        if let Some(id) = self.index.get(&key) {
            return (*id, false);
        }
        let id = self.id_at(self.entities.len());
        self.entities.push(Entity {
            key: key.clone(),
            entity_type: entity_type.to_owned(),
            primary_key: primary_key.to_vec(),
            fields: Record::new(),
        });
        self.index.insert(key, id);
        (id, true)
    }

    /// Overwrite one field of a canonical entity.
    pub(crate) fn merge_field(&mut self, id: EntityId, name: String, value: Datum) {
        if id.generation != self.generation {
            return;
        }
        if let Some(entity) = self.entities.get_mut(id.index) {
            entity.fields.insert(name, value);
        }
    }

    /// Materialize a decoded value as plain JSON.
    ///
    /// Dates render in tagged wire form. Entities expand to their fields; an
    /// entity that is already being expanded further up the path renders as
    /// its [`Entity::reference`] so cycles terminate. Dangling ids render as
    /// null.
    pub fn to_json(&self, value: &Datum) -> Value {
        let mut path = Vec::new();
        self.materialize(value, &mut path)
    }

    fn materialize(&self, value: &Datum, path: &mut Vec<EntityId>) -> Value {
        match value {
            Datum::Null => Value::Null,
            Datum::Bool(b) => Value::Bool(*b),
            Datum::Number(n) => Value::Number(n.clone()),
            Datum::String(s) => Value::String(s.clone()),
            Datum::List(items) => {
                Value::Array(items.iter().map(|i| self.materialize(i, path)).collect())
            }
            Datum::Map(fields) => Value::Object(self.materialize_record(fields, path)),
            Datum::DateTime(ts) => ts.tagged(),
            Datum::Entity(id) => match self.get(*id) {
                None => Value::Null,
                Some(entity) if path.contains(id) => {
                    Value::Object(self.materialize_record(&entity.reference(), path))
                }
                Some(entity) => {
                    path.push(*id);
                    let out = self.materialize_record(&entity.fields, path);
                    path.pop();
                    Value::Object(out)
                }
            },
        }
    }

    fn materialize_record(&self, fields: &Record, path: &mut Vec<EntityId>) -> Map<String, Value> {
        fields
            .iter()
            .map(|(k, v)| (k.clone(), self.materialize(v, path)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    fn task_key(id: &str) -> IdentityKey {
        IdentityKey::new("Task", [id])
    }

    #[test]
    fn upsert_returns_existing_slot_for_known_key() {
        let mut map = IdentityMap::new();
        let pk = vec!["id".to_owned()];
        let (a, fresh_a) = map.upsert(task_key("1"), "Task", &pk);
        let (b, fresh_b) = map.upsert(task_key("1"), "Task", &pk);
        let (c, fresh_c) = map.upsert(task_key("2"), "Task", &pk);
        assert!(fresh_a);
        assert!(!fresh_b);
        assert!(fresh_c);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(map.len(), 2);
        assert_eq!(map.lookup(&task_key("2")), Some(c));
    }

    #[test]
    fn key_joins_type_and_values_with_commas() {
        let key = IdentityKey::new("Link", ["a", "b"]);
        assert_eq!(key.as_str(), "Link,a,b");
        assert_eq!(IdentityKey::new("Solo", Vec::<String>::new()).as_str(), "Solo");
    }

    #[test]
    fn to_json_cuts_cycles_with_references() {
        let mut map = IdentityMap::new();
        let pk = vec!["id".to_owned()];
        let (parent, _) = map.upsert(IdentityKey::new("Project", ["p"]), "Project", &pk);
        let (child, _) = map.upsert(task_key("t"), "Task", &pk);
        map.merge_field(parent, ENTITY_TYPE_KEY.into(), "Project".into());
        map.merge_field(parent, "id".into(), "p".into());
        map.merge_field(parent, "name".into(), "Apollo".into());
        map.merge_field(parent, "children".into(), Datum::List(vec![Datum::Entity(child)]));
        map.merge_field(child, ENTITY_TYPE_KEY.into(), "Task".into());
        map.merge_field(child, "id".into(), "t".into());
        map.merge_field(child, "parent".into(), Datum::Entity(parent));

        let rendered = map.to_json(&Datum::Entity(parent));
        assert_eq!(
            rendered,
            json!({
                "__entity_type__": "Project",
                "id": "p",
                "name": "Apollo",
                "children": [{
                    "__entity_type__": "Task",
                    "id": "t",
                    "parent": {"__entity_type__": "Project", "id": "p"}
                }]
            })
        );
    }

    #[test]
    fn clear_forgets_everything() {
        let mut map = IdentityMap::new();
        let (id, _) = map.upsert(task_key("1"), "Task", &["id".to_owned()]);
        map.clear();
        assert!(map.is_empty());
        assert!(map.get(id).is_none());
        assert_eq!(map.to_json(&Datum::Entity(id)), Value::Null);
    }

    #[test]
    fn ids_from_before_a_clear_do_not_alias_new_entities() {
        let mut map = IdentityMap::new();
        let pk = vec!["id".to_owned()];
        let (old, _) = map.upsert(task_key("t1"), "Task", &pk);
        map.clear();
        let (new, _) = map.upsert(task_key("t2"), "Task", &pk);
        map.merge_field(old, "name".into(), "stale".into());
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(map.get(old).is_none());
        assert!(!map.owns(old));
        assert!(map.owns(new));
        assert!(map.get(new).unwrap().get("name").is_none());
    }

    #[test]
    fn ids_do_not_resolve_in_other_maps() {
        let pk = vec!["id".to_owned()];
        let mut first = IdentityMap::new();
        let mut second = IdentityMap::new();
        let (a, _) = first.upsert(task_key("t1"), "Task", &pk);
        let (b, _) = second.upsert(task_key("t2"), "Task", &pk);
        assert_ne!(first.generation(), second.generation());
        assert!(second.get(a).is_none());
        assert!(first.get(b).is_none());

        let copy = first.clone();
        assert_eq!(copy.get(a).map(Entity::key), Some(&task_key("t1")));
    }
}
