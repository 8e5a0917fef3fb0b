// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Recursive response decoder with identity-map merging.
//!
//! Decoding rules, applied at every level of a [`Datum`] tree:
//!
//! 1. Scalars pass through unchanged.
//! 2. Sequences decode element by element, order preserved.
//! 3. A mapping tagged `__type__: "datetime"` becomes a [`Timestamp`].
//! 4. A mapping whose `__entity_type__` names a type with known primary keys
//!    is merged into the canonical entity for its identity key: every field
//!    it carries overwrites the canonical field, fields it lacks are left
//!    alone. The result is a [`Datum::Entity`] pointing at the canonical
//!    slot.
//! 5. Any other mapping decodes value by value.
//!
//! Malformed entity references (non-string type tag, unknown type, missing
//! or non-scalar primary-key value) are decoded as plain mappings rather
//! than failing the decode.

use tracing::{trace, warn};

use crate::{
    Datum, IdentityKey, IdentityMap, Record, SchemaLookup, Timestamp, DATETIME_TAG,
    ENTITY_TYPE_KEY, TYPE_TAG_KEY,
};

/// Decoder bound to one schema and one identity map.
pub struct Decoder<'a> {
    schema: &'a dyn SchemaLookup,
    identity_map: &'a mut IdentityMap,
}

impl<'a> Decoder<'a> {
    /// Create a decoder merging into `identity_map`.
    pub fn new(schema: &'a dyn SchemaLookup, identity_map: &'a mut IdentityMap) -> Self {
        Self {
            schema,
            identity_map,
        }
    }

    /// Identity map entities are merged into.
    pub fn identity_map(&self) -> &IdentityMap {
        self.identity_map
    }

    /// Decode a value, returning the decoded form.
    pub fn decode(&mut self, value: Datum) -> Datum {
        match value {
            Datum::List(items) => Datum::List(items.into_iter().map(|i| self.decode(i)).collect()),
            Datum::Map(record) => self.decode_map(record),
            other => other,
        }
    }

    /// Decode a value in place.
    pub fn decode_in_place(&mut self, value: &mut Datum) {
        let taken = std::mem::take(value);
        *value = self.decode(taken);
    }

    /// Decode every element of a slice in place.
    pub fn decode_each(&mut self, values: &mut [Datum]) {
        for value in values {
            self.decode_in_place(value);
        }
    }

    fn decode_map(&mut self, record: Record) -> Datum {
        if is_date(&record) {
            return self.decode_date(record);
        }
        match self.identify(&record) {
            Some((key, entity_type, primary_key)) => {
                self.merge_entity(key, &entity_type, &primary_key, record)
            }
            None => self.decode_plain(record),
        }
    }

    fn decode_plain(&mut self, record: Record) -> Datum {
        Datum::Map(
            record
                .into_iter()
                .map(|(k, v)| (k, self.decode(v)))
                .collect(),
        )
    }

    fn decode_date(&mut self, record: Record) -> Datum {
        let parsed = record
            .get("value")
            .and_then(Datum::as_str)
            .map(|text| Timestamp::parse_wire(text, self.schema.timezone_support()));
        match parsed {
            Some(Ok(ts)) => Datum::DateTime(ts),
            Some(Err(err)) => {
                warn!(%err, "unparseable datetime value; keeping raw mapping");
                self.decode_plain(record)
            }
            None => {
                warn!("datetime mapping without string value; keeping raw mapping");
                self.decode_plain(record)
            }
        }
    }

    fn identify(&self, record: &Record) -> Option<(IdentityKey, String, Vec<String>)> {
        let entity_type = match record.get(ENTITY_TYPE_KEY)? {
            Datum::String(t) => t,
            other => {
                trace!(?other, "non-string entity type tag; not tracking");
                return None;
            }
        };
        let Some(primary_key) = self.schema.primary_keys(entity_type) else {
            trace!(%entity_type, "unknown entity type; not tracking");
            return None;
        };
        let key = key_for(entity_type, primary_key, record)?;
        Some((key, entity_type.clone(), primary_key.to_vec()))
    }

    fn merge_entity(
        &mut self,
        key: IdentityKey,
        entity_type: &str,
        primary_key: &[String],
        record: Record,
    ) -> Datum {
        // Allocate before descending so nested back-references land on this slot.
        let (id, fresh) = self.identity_map.upsert(key, entity_type, primary_key);
        if fresh {
            trace!(%id, %entity_type, "new canonical entity");
        }
        for (name, value) in record {
            let decoded = self.decode(value);
            self.identity_map.merge_field(id, name, decoded);
        }
        Datum::Entity(id)
    }
}

/// Identity key of an entity-shaped record, or `None` when it cannot be
/// tracked under `schema`.
pub fn identifying_key(schema: &dyn SchemaLookup, record: &Record) -> Option<IdentityKey> {
    let entity_type = record.get(ENTITY_TYPE_KEY)?.as_str()?;
    key_for(entity_type, schema.primary_keys(entity_type)?, record)
}

fn key_for(entity_type: &str, primary_key: &[String], record: &Record) -> Option<IdentityKey> {
    let values = primary_key
        .iter()
        .map(|name| record.get(name).and_then(Datum::key_fragment))
        .collect::<Option<Vec<_>>>();
    if values.is_none() {
        trace!(%entity_type, "primary key unresolvable; not tracking");
    }
    values.map(|values| IdentityKey::new(entity_type, values))
}

fn is_date(record: &Record) -> bool {
    record.get(TYPE_TAG_KEY).and_then(Datum::as_str) == Some(DATETIME_TAG)
}
