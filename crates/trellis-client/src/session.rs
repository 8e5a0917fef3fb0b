// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bootstrapped session: schema index, operation registry and the batched
//! call entry points.

use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info};
use trellis_graph::{Datum, Entity, EntityId, IdentityMap, Record, SchemaIndex, SchemaLookup};
use trellis_proto::{
    action, DecodeError, DeleteResult, EncodeError, EntityResult, Operation, OperationResult,
    QueryResult, Registry,
};

use crate::config::{ConfigError, SessionConfig};
use crate::dispatch::dispatch;
use crate::{ClientError, Transport};

/// Results of one call plus the identity map their entity references
/// point into.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// One result per operation, in operation order.
    pub results: Vec<OperationResult>,
    /// Canonical entities referenced by `results`.
    pub identity_map: IdentityMap,
}

impl Batch {
    /// Canonical entity behind an entity reference.
    pub fn entity(&self, value: &Datum) -> Option<&Entity> {
        self.identity_map.resolve(value)
    }

    /// Plain JSON view of a decoded value.
    pub fn to_json(&self, value: &Datum) -> Value {
        self.identity_map.to_json(value)
    }
}

/// A single typed result plus its identity map.
#[derive(Debug, Clone)]
pub struct Reply<R> {
    /// The result.
    pub result: R,
    /// Canonical entities referenced by `result`.
    pub identity_map: IdentityMap,
}

impl<R> Reply<R> {
    /// Canonical entity behind an entity reference.
    pub fn entity(&self, value: &Datum) -> Option<&Entity> {
        self.identity_map.resolve(value)
    }

    /// Plain JSON view of a decoded value.
    pub fn to_json(&self, value: &Datum) -> Value {
        self.identity_map.to_json(value)
    }
}

/// Client session bound to one server.
pub struct Session<T> {
    config: SessionConfig,
    transport: T,
    registry: Registry,
    schema: SchemaIndex,
    server_information: Record,
}

impl<T: Transport> Session<T> {
    /// Validate `config`, then fetch server information and schemas in one
    /// batch and index them.
    pub fn connect(config: SessionConfig, transport: T) -> Result<Self, ClientError> {
        config.validate()?;
        let mut session = Self::from_parts(config, transport, SchemaIndex::new());
        let batch = session.call(&[
            Operation::query_server_information(None),
            Operation::query_schemas(),
        ])?;
        let information = batch
            .results
            .first()
            .and_then(OperationResult::as_server_information)
            .cloned()
            .unwrap_or_default();
        let schemas = batch
            .results
            .get(1)
            .and_then(OperationResult::as_schemas)
            .unwrap_or_default();
        session.schema = SchemaIndex::from_bootstrap(&information, schemas)?;
        session.server_information = information;
        info!(
            server = %session.config.server_url,
            version = session.server_version().unwrap_or("unknown"),
            entity_types = session.schema.entity_types().count(),
            timezone_support = session.schema.timezone_support(),
            "session ready"
        );
        Ok(session)
    }

    /// Session over an already known schema; no bootstrap call is made.
    pub fn from_parts(config: SessionConfig, transport: T, schema: SchemaIndex) -> Self {
        Self {
            config,
            transport,
            registry: Registry::builtin(),
            schema,
            server_information: Record::new(),
        }
    }

    /// Run `operations` as one batch with a fresh identity map.
    pub fn call(&self, operations: &[Operation]) -> Result<Batch, ClientError> {
        let mut identity_map = IdentityMap::new();
        let results = self.call_with(operations, &mut identity_map)?;
        Ok(Batch {
            results,
            identity_map,
        })
    }

    /// Run `operations` as one batch, merging into the caller's map.
    ///
    /// Entity references in `operations` are encoded through the same map,
    /// so entities from earlier calls can be passed back in.
    pub fn call_with(
        &self,
        operations: &[Operation],
        identity_map: &mut IdentityMap,
    ) -> Result<Vec<OperationResult>, ClientError> {
        dispatch(
            &self.transport,
            &self.registry,
            &self.schema,
            operations,
            identity_map,
        )
    }

    /// Run one query.
    pub fn query(&self, expression: impl Into<String>) -> Result<Reply<QueryResult>, ClientError> {
        self.single(Operation::query(expression), action::QUERY, OperationResult::into_query)
    }

    /// Create one entity.
    pub fn create(
        &self,
        entity_type: impl Into<String>,
        data: Record,
    ) -> Result<Reply<EntityResult>, ClientError> {
        self.single(
            Operation::create(entity_type, data),
            action::CREATE,
            OperationResult::into_entity,
        )
    }

    /// Update one entity by primary key.
    pub fn update<K>(
        &self,
        entity_type: impl Into<String>,
        key: K,
        data: Record,
    ) -> Result<Reply<EntityResult>, ClientError>
    where
        K: IntoIterator,
        K::Item: Into<Datum>,
    {
        self.single(
            Operation::update(entity_type, key, data),
            action::UPDATE,
            OperationResult::into_entity,
        )
    }

    /// Delete one entity by primary key. `true` when it was removed.
    pub fn delete<K>(&self, entity_type: impl Into<String>, key: K) -> Result<bool, ClientError>
    where
        K: IntoIterator,
        K::Item: Into<Datum>,
    {
        let reply: Reply<DeleteResult> = self.single(
            Operation::delete(entity_type, key),
            action::DELETE,
            OperationResult::into_delete,
        )?;
        Ok(reply.result.data)
    }

    fn single<R>(
        &self,
        operation: Operation,
        expected: &'static str,
        extract: fn(OperationResult) -> Option<R>,
    ) -> Result<Reply<R>, ClientError> {
        let Batch {
            results,
            identity_map,
        } = self.call(std::slice::from_ref(&operation))?;
        let result = results
            .into_iter()
            .next()
            .and_then(extract)
            .ok_or(DecodeError::UnexpectedResult { index: 0, expected })?;
        Ok(Reply {
            result,
            identity_map,
        })
    }

    /// Fetch any of `keys` the canonical entity `entity` lacks, merging the
    /// answer into the same entity. Nothing is sent when every key is
    /// already present.
    pub fn ensure_populated(
        &self,
        identity_map: &mut IdentityMap,
        entity: EntityId,
        keys: &[&str],
    ) -> Result<(), ClientError> {
        let target = identity_map
            .get(entity)
            .ok_or(EncodeError::DanglingEntity(entity))?;
        let missing: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|k| !target.contains(k))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let key = target.key().to_string();
        let criteria = target
            .primary_key()
            .iter()
            .map(|name| {
                target
                    .get(name)
                    .and_then(literal)
                    .map(|value| format!("{name} is {value}"))
                    .ok_or_else(|| ClientError::Populate {
                        key: key.clone(),
                        reason: format!("primary key '{name}' has no scalar value"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let expression = format!(
            "select {} from {} where {}",
            missing.join(", "),
            target.entity_type(),
            criteria.join(" and ")
        );
        debug!(%key, %expression, "populating entity");

        let results = self.call_with(&[Operation::query(expression)], identity_map)?;
        let found = results
            .first()
            .and_then(OperationResult::as_query)
            .map_or(0, |q| q.data.len());
        match found {
            1 => Ok(()),
            0 => Err(ClientError::Populate {
                key,
                reason: "no entity found".into(),
            }),
            n => Err(ClientError::Populate {
                key,
                reason: format!("{n} entities found"),
            }),
        }
    }

    /// Full schema description of `entity_type`.
    pub fn schema(&self, entity_type: &str) -> Option<&Record> {
        self.schema.schema(entity_type)
    }

    /// Schema index built at bootstrap.
    pub fn schema_index(&self) -> &SchemaIndex {
        &self.schema
    }

    /// Ordered primary-key field names of `entity_type`.
    pub fn primary_key_attributes(&self, entity_type: &str) -> Option<&[String]> {
        self.schema.primary_keys(entity_type)
    }

    /// Values returned by the bootstrap `query_server_information`.
    pub fn server_information(&self) -> &Record {
        &self.server_information
    }

    /// Server version string, when the server reported one.
    pub fn server_version(&self) -> Option<&str> {
        self.server_information.get("version").and_then(Datum::as_str)
    }

    /// Connection settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Operation registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Operation registry, for registering extension kinds.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Download URL of a component, credentials included.
    pub fn component_url(&self, component_id: &str) -> Result<Url, ClientError> {
        self.component_endpoint("component/get", &[("id", component_id)])
    }

    /// Thumbnail URL of a component at `size` pixels.
    pub fn thumbnail_url(&self, component_id: &str, size: u32) -> Result<Url, ClientError> {
        self.component_endpoint(
            "component/thumbnail",
            &[("id", component_id), ("size", &size.to_string())],
        )
    }

    fn component_endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ClientError> {
        let base = self.config.server_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{path}")).map_err(|_| ConfigError::Invalid {
            name: "server_url",
            value: self.config.server_url.clone(),
        })?;
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("username", &self.config.api_user)
            .append_pair("apiKey", &self.config.api_key);
        Ok(url)
    }
}

/// Query-language literal for a primary-key value.
fn literal(value: &Datum) -> Option<String> {
    match value {
        Datum::String(s) => Some(format!("\"{}\"", s.replace('"', "\\\""))),
        Datum::Number(n) => Some(n.to_string()),
        Datum::Bool(b) => Some(if *b { "True" } else { "False" }.to_owned()),
        _ => None,
    }
}
