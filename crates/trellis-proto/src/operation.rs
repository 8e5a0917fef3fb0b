// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Request units of a batched call.

use std::borrow::Cow;
use trellis_graph::{Datum, Record, ENTITY_TYPE_KEY, TIMEZONE_SUPPORT_FIELD};

/// Action tags of the built-in operation kinds.
pub mod action {
    /// Run a query expression.
    pub const QUERY: &str = "query";
    /// Create an entity.
    pub const CREATE: &str = "create";
    /// Update an entity by primary key.
    pub const UPDATE: &str = "update";
    /// Delete an entity by primary key.
    pub const DELETE: &str = "delete";
    /// Fetch server information values.
    pub const QUERY_SERVER_INFORMATION: &str = "query_server_information";
    /// Fetch every entity schema.
    pub const QUERY_SCHEMAS: &str = "query_schemas";
    /// Request an upload destination for a component.
    pub const GET_UPLOAD_METADATA: &str = "get_upload_metadata";
}

/// One tagged request unit. Immutable once built.
///
/// Fields are kept in wire form (`entity_type`, `entity_data`, ...) so the
/// codec can serialize every kind the same way.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    action: Cow<'static, str>,
    fields: Record,
}

impl Operation {
    /// `query` with a query-language expression, e.g.
    /// `select name from Task where status.name is "Done"`.
    pub fn query(expression: impl Into<String>) -> Self {
        Self::builtin(action::QUERY, [("expression", Datum::String(expression.into()))])
    }

    /// `create` an entity of `entity_type`. The type tag is filled in when
    /// `data` lacks one.
    pub fn create(entity_type: impl Into<String>, data: Record) -> Self {
        let entity_type = entity_type.into();
        let data = with_type_tag(&entity_type, data);
        Self::builtin(
            action::CREATE,
            [
                ("entity_type", Datum::String(entity_type)),
                ("entity_data", Datum::Map(data)),
            ],
        )
    }

    /// `update` the entity identified by the ordered primary-key values.
    pub fn update<K>(entity_type: impl Into<String>, key: K, data: Record) -> Self
    where
        K: IntoIterator,
        K::Item: Into<Datum>,
    {
        let entity_type = entity_type.into();
        let data = with_type_tag(&entity_type, data);
        Self::builtin(
            action::UPDATE,
            [
                ("entity_type", Datum::String(entity_type)),
                ("entity_key", key_list(key)),
                ("entity_data", Datum::Map(data)),
            ],
        )
    }

    /// `delete` the entity identified by the ordered primary-key values.
    pub fn delete<K>(entity_type: impl Into<String>, key: K) -> Self
    where
        K: IntoIterator,
        K::Item: Into<Datum>,
    {
        Self::builtin(
            action::DELETE,
            [
                ("entity_type", Datum::String(entity_type.into())),
                ("entity_key", key_list(key)),
            ],
        )
    }

    /// `query_server_information` for the named values. The timezone-support
    /// flag is always requested: appended to a given list, or requested
    /// alone for `None`.
    pub fn query_server_information(values: Option<&[&str]>) -> Self {
        let mut names: Vec<Datum> = values
            .unwrap_or_default()
            .iter()
            .map(|v| Datum::from(*v))
            .collect();
        if !values.unwrap_or_default().contains(&TIMEZONE_SUPPORT_FIELD) {
            names.push(Datum::from(TIMEZONE_SUPPORT_FIELD));
        }
        Self::builtin(action::QUERY_SERVER_INFORMATION, [("values", Datum::List(names))])
    }

    /// `query_schemas`.
    pub fn query_schemas() -> Self {
        Self::builtin(action::QUERY_SCHEMAS, [])
    }

    /// `get_upload_metadata` for a component file.
    pub fn get_upload_metadata(
        file_name: impl Into<String>,
        file_size: u64,
        component_id: impl Into<String>,
    ) -> Self {
        Self::builtin(
            action::GET_UPLOAD_METADATA,
            [
                ("file_name", Datum::String(file_name.into())),
                ("file_size", Datum::from(file_size)),
                ("component_id", Datum::String(component_id.into())),
            ],
        )
    }

    /// Operation of an extension kind. The kind must be registered with the
    /// session's registry before the operation is sent. An `action` entry in
    /// `fields` is ignored on the wire.
    pub fn custom(action: impl Into<Cow<'static, str>>, fields: Record) -> Self {
        Self {
            action: action.into(),
            fields,
        }
    }

    fn builtin<const N: usize>(action: &'static str, fields: [(&str, Datum); N]) -> Self {
        Self {
            action: Cow::Borrowed(action),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        }
    }

    /// Discriminant tag.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Kind-specific fields, keyed by wire name.
    pub fn fields(&self) -> &Record {
        &self.fields
    }

    /// One kind-specific field.
    pub fn field(&self, name: &str) -> Option<&Datum> {
        self.fields.get(name)
    }

    /// Target entity type, for kinds that have one.
    pub fn entity_type(&self) -> Option<&str> {
        self.field("entity_type").and_then(Datum::as_str)
    }
}

fn with_type_tag(entity_type: &str, mut data: Record) -> Record {
    data.entry(ENTITY_TYPE_KEY.to_owned())
        .or_insert_with(|| Datum::from(entity_type));
    data
}

fn key_list<K>(key: K) -> Datum
where
    K: IntoIterator,
    K::Item: Into<Datum>,
{
    Datum::List(key.into_iter().map(Into::into).collect())
}
