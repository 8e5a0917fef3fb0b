// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Schema lookups consumed by the merger.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::{Datum, Record};

/// Server information field carrying the timezone-support flag.
pub const TIMEZONE_SUPPORT_FIELD: &str = "is_timezone_support_enabled";

/// Read-only schema facts needed to decode responses.
///
/// Populated once when a session starts and shared freely afterwards.
pub trait SchemaLookup: Send + Sync {
    /// Ordered primary-key field names for `entity_type`, or `None` when the
    /// type is unknown.
    fn primary_keys(&self, entity_type: &str) -> Option<&[String]>;

    /// Whether the server reports dates in UTC.
    fn timezone_support(&self) -> bool;
}

/// Errors raised while indexing bootstrap schemas.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// A schema lacks a required field.
    #[error("schema #{index} is missing field '{field}'")]
    MissingField {
        /// Position in the schema list.
        index: usize,
        /// Missing field name.
        field: &'static str,
    },
    /// A schema field has the wrong shape.
    #[error("schema #{index} field '{field}' is malformed: expected {expected}")]
    InvalidField {
        /// Position in the schema list.
        index: usize,
        /// Offending field name.
        field: &'static str,
        /// Expected shape.
        expected: &'static str,
    },
}

/// Primary-key index and full schema descriptions keyed by entity type.
#[derive(Debug, Clone, Default)]
pub struct SchemaIndex {
    primary_keys: BTreeMap<String, Vec<String>>,
    schemas: BTreeMap<String, Record>,
    timezone_support: bool,
}

impl SchemaIndex {
    /// Empty index: every entity type is unknown, dates stay server-local.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register primary keys for one entity type.
    pub fn with_primary_keys<I, S>(mut self, entity_type: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys
            .insert(entity_type.into(), keys.into_iter().map(Into::into).collect());
        self
    }

    /// Set the timezone-support flag.
    pub fn with_timezone_support(mut self, enabled: bool) -> Self {
        self.timezone_support = enabled;
        self
    }

    /// Build the index from the `query_server_information` and
    /// `query_schemas` results of a bootstrap call.
    ///
    /// Each schema must carry a string `id` and a `primary_key` list of
    /// strings. A missing or non-boolean timezone flag reads as `false`.
    pub fn from_bootstrap(
        server_information: &Record,
        schemas: &[Record],
    ) -> Result<Self, SchemaError> {
        let mut index = Self::new().with_timezone_support(
            server_information
                .get(TIMEZONE_SUPPORT_FIELD)
                .and_then(Datum::as_bool)
                .unwrap_or(false),
        );
        for (i, schema) in schemas.iter().enumerate() {
            let id = schema
                .get("id")
                .ok_or(SchemaError::MissingField { index: i, field: "id" })?
                .as_str()
                .ok_or(SchemaError::InvalidField {
                    index: i,
                    field: "id",
                    expected: "string",
                })?;
            let invalid_pk = SchemaError::InvalidField {
                index: i,
                field: "primary_key",
                expected: "list of strings",
            };
            let keys = schema
                .get("primary_key")
                .ok_or(SchemaError::MissingField {
                    index: i,
                    field: "primary_key",
                })?
                .as_list()
                .ok_or_else(|| invalid_pk.clone())?
                .iter()
                .map(|k| k.as_str().map(str::to_owned).ok_or_else(|| invalid_pk.clone()))
                .collect::<Result<Vec<_>, _>>()?;
            index.primary_keys.insert(id.to_owned(), keys);
            index.schemas.insert(id.to_owned(), schema.clone());
        }
        Ok(index)
    }

    /// Full schema description for `entity_type`.
    pub fn schema(&self, entity_type: &str) -> Option<&Record> {
        self.schemas.get(entity_type)
    }

    /// Known entity type names, sorted.
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.primary_keys.keys().map(String::as_str)
    }
}

impl SchemaLookup for SchemaIndex {
    fn primary_keys(&self, entity_type: &str) -> Option<&[String]> {
        self.primary_keys.get(entity_type).map(Vec::as_slice)
    }

    fn timezone_support(&self) -> bool {
        self.timezone_support
    }
}
