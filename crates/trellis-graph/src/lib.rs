// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Decoded value model shared by the trellis client crates.
//!
//! Raw API responses deserialize into [`Datum`] trees that carry no knowledge
//! of entities or dates. The [`Decoder`] then walks those trees, turning
//! tagged date mappings into [`Timestamp`]s and folding entity-shaped
//! mappings into an [`IdentityMap`], so that every reference to the same
//! server record resolves to one canonical [`Entity`].
//!
//! Entities live in an arena owned by the identity map and reference each
//! other through [`EntityId`]s. Cyclic graphs (a task pointing at its parent
//! which lists the task among its children) therefore never form ownership
//! loops.

mod identity;
mod merge;
mod schema;
mod timestamp;

pub use identity::{Entity, EntityId, IdentityKey, IdentityMap};
pub use merge::{identifying_key, Decoder};
pub use schema::{SchemaError, SchemaIndex, SchemaLookup, TIMEZONE_SUPPORT_FIELD};
pub use timestamp::{Timestamp, WIRE_DATETIME_FORMAT};

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Reserved mapping key naming the server entity type of a record.
pub const ENTITY_TYPE_KEY: &str = "__entity_type__";
/// Reserved mapping key tagging special scalar encodings (dates).
pub const TYPE_TAG_KEY: &str = "__type__";
/// Tag value marking a date mapping.
pub const DATETIME_TAG: &str = "datetime";

/// String-keyed mapping of decoded values.
pub type Record = BTreeMap<String, Datum>;

/// A decoded API value.
///
/// Freshly deserialized data only ever contains the structural variants
/// (`Null` through `Map`). `DateTime` and `Entity` are produced by the
/// [`Decoder`] or by callers building outgoing operations.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Datum {
    /// JSON null.
    #[default]
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Numeric scalar.
    Number(Number),
    /// String scalar.
    String(String),
    /// Ordered sequence.
    List(Vec<Datum>),
    /// Plain mapping (including entity-shaped mappings that are not tracked).
    Map(Record),
    /// Tagged date.
    DateTime(Timestamp),
    /// Reference to a canonical entity in an [`IdentityMap`].
    Entity(EntityId),
}

impl Datum {
    /// Returns the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as `i64` when it is an integral number in range.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Returns the referenced entity id, if this is an entity reference.
    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Datum::Entity(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the mapping, if this is a plain mapping.
    pub fn as_map(&self) -> Option<&Record> {
        match self {
            Datum::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the elements, if this is a sequence.
    pub fn as_list(&self) -> Option<&[Datum]> {
        match self {
            Datum::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the timestamp, if this is a date.
    pub fn as_timestamp(&self) -> Option<&Timestamp> {
        match self {
            Datum::DateTime(ts) => Some(ts),
            _ => None,
        }
    }

    /// True for [`Datum::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Text used for this value inside an identity key.
    ///
    /// Only scalars qualify; strings render raw, numbers and booleans as
    /// their JSON text.
    pub(crate) fn key_fragment(&self) -> Option<String> {
        match self {
            Datum::String(s) => Some(s.clone()),
            Datum::Number(n) => Some(n.to_string()),
            Datum::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<Value> for Datum {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Datum::Null,
            Value::Bool(b) => Datum::Bool(b),
            Value::Number(n) => Datum::Number(n),
            Value::String(s) => Datum::String(s),
            Value::Array(items) => Datum::List(items.into_iter().map(Datum::from).collect()),
            Value::Object(map) => {
                Datum::Map(map.into_iter().map(|(k, v)| (k, Datum::from(v))).collect())
            }
        }
    }
}

impl<'de> Deserialize<'de> for Datum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Datum::from)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::String(value.to_owned())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Datum::String(value)
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self {
        Datum::Bool(value)
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Datum::Number(value.into())
    }
}

impl From<i32> for Datum {
    fn from(value: i32) -> Self {
        Datum::Number(value.into())
    }
}

impl From<u64> for Datum {
    fn from(value: u64) -> Self {
        Datum::Number(value.into())
    }
}

impl From<Timestamp> for Datum {
    fn from(value: Timestamp) -> Self {
        Datum::DateTime(value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Datum {
    fn from(value: DateTime<Tz>) -> Self {
        Datum::DateTime(value.into())
    }
}

impl From<EntityId> for Datum {
    fn from(value: EntityId) -> Self {
        Datum::Entity(value)
    }
}

impl From<Record> for Datum {
    fn from(value: Record) -> Self {
        Datum::Map(value)
    }
}

impl<T: Into<Datum>> From<Vec<T>> for Datum {
    fn from(value: Vec<T>) -> Self {
        Datum::List(value.into_iter().map(Into::into).collect())
    }
}

/// Build a [`Record`] from `(key, value)` pairs.
pub fn record<K, V, I>(pairs: I) -> Record
where
    K: Into<String>,
    V: Into<Datum>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
