// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON wire codec for batched calls.
//!
//! Request: `[{"action": "...", <fields>}, ...]`.
//! Response: an array of equal length in request order, or a single
//! `{"content", "exception", "error_code"}` object when the server rejects
//! the whole batch.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tracing::trace;
use trellis_graph::{Datum, Decoder, IdentityMap};

use crate::{DecodeError, EncodeError, Operation, OperationResult, Registry};

/// Converts outgoing [`Datum`]s into wire JSON.
///
/// Dates become tagged date mappings, in UTC unless the target server
/// lacks timezone support. Entity references become the referenced
/// entity's type tag plus primary keys, which requires the identity map
/// that produced them.
#[derive(Debug, Clone, Copy)]
pub struct Encoder<'a> {
    identity_map: Option<&'a IdentityMap>,
    timezone_support: bool,
}

impl Default for Encoder<'_> {
    fn default() -> Self {
        Self::detached()
    }
}

impl<'a> Encoder<'a> {
    /// Encoder for payloads without entity references.
    pub fn detached() -> Self {
        Self {
            identity_map: None,
            timezone_support: true,
        }
    }

    /// Encoder resolving entity references against `identity_map`.
    pub fn with_identity_map(identity_map: &'a IdentityMap) -> Self {
        Self {
            identity_map: Some(identity_map),
            ..Self::detached()
        }
    }

    /// Encode dates for a server with or without timezone support.
    #[must_use]
    pub fn with_timezone_support(self, timezone_support: bool) -> Self {
        Self {
            timezone_support,
            ..self
        }
    }

    /// Encode one value.
    pub fn encode(&self, value: &Datum) -> Result<Value, EncodeError> {
        Ok(match value {
            Datum::Null => Value::Null,
            Datum::Bool(b) => Value::Bool(*b),
            Datum::Number(n) => Value::Number(n.clone()),
            Datum::String(s) => Value::String(s.clone()),
            Datum::List(items) => Value::Array(
                items
                    .iter()
                    .map(|i| self.encode(i))
                    .collect::<Result<_, _>>()?,
            ),
            Datum::Map(fields) => Value::Object(self.encode_record(fields.iter())?),
            Datum::DateTime(ts) => ts.tagged_for(self.timezone_support),
            Datum::Entity(id) => {
                let map = self.identity_map.ok_or(EncodeError::DetachedEntity(*id))?;
                let entity = map.get(*id).ok_or(EncodeError::DanglingEntity(*id))?;
                Value::Object(self.encode_record(entity.reference().iter())?)
            }
        })
    }

    /// Encode one operation as its wire object.
    pub fn encode_operation(&self, operation: &Operation) -> Result<Value, EncodeError> {
        let mut object = self.encode_record(operation.fields().iter())?;
        object.insert("action".to_owned(), Value::String(operation.action().to_owned()));
        Ok(Value::Object(object))
    }

    fn encode_record<'r>(
        &self,
        fields: impl Iterator<Item = (&'r String, &'r Datum)>,
    ) -> Result<Map<String, Value>, EncodeError> {
        fields
            .map(|(k, v)| Ok((k.clone(), self.encode(v)?)))
            .collect()
    }
}

/// Serialize a batch into the request payload.
pub fn encode_operations(
    operations: &[Operation],
    encoder: &Encoder<'_>,
) -> Result<Vec<u8>, EncodeError> {
    let batch = operations
        .iter()
        .map(|op| encoder.encode_operation(op))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::to_vec(&batch)?)
}

/// Error description returned by the server in place of a result array.
///
/// Any JSON object is accepted; absent fields stay empty.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerFault {
    /// Human-readable message.
    #[serde(default)]
    pub content: String,
    /// Server exception name, e.g. `ValidationError`.
    #[serde(default)]
    pub exception: String,
    /// Numeric error code, when the server sets one. Numeric strings are
    /// read as numbers; anything else is dropped.
    #[serde(default, deserialize_with = "lenient_error_code")]
    pub error_code: Option<i64>,
}

fn lenient_error_code<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Coarse classification of a [`ServerFault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Request failed validation.
    Validation,
    /// Authentication failed or the user lacks permission.
    PermissionDenied,
    /// Anything else.
    Other,
}

impl ServerFault {
    /// Classify by exception name.
    pub fn kind(&self) -> FaultKind {
        match self.exception.as_str() {
            "ValidationError" => FaultKind::Validation,
            "FTAuthenticationError" | "PermissionError" => FaultKind::PermissionDenied,
            _ => FaultKind::Other,
        }
    }
}

impl fmt::Display for ServerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.exception, self.content)?;
        if let Some(code) = self.error_code {
            write!(f, " (code {code})")?;
        }
        Ok(())
    }
}

/// A response that is not a result array.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResponseError {
    /// The server returned an error description.
    #[error("server fault: {0}")]
    Server(ServerFault),
    /// Neither a result array nor an error description.
    #[error("malformed response ({} bytes)", .0.len())]
    Malformed(Vec<u8>),
}

/// Split a response body into its raw per-operation elements.
pub fn parse_response(body: &[u8]) -> Result<Vec<Value>, ResponseError> {
    if let Ok(elements) = serde_json::from_slice::<Vec<Value>>(body) {
        return Ok(elements);
    }
    match serde_json::from_slice::<ServerFault>(body) {
        Ok(fault) => Err(ResponseError::Server(fault)),
        Err(_) => Err(ResponseError::Malformed(body.to_vec())),
    }
}

/// Decode raw elements positionally against their operations.
///
/// Every element is first deserialized into its kind's result shell; only
/// when all of them fit is identity-map decoration run, so a failed batch
/// leaves `decoder`'s identity map untouched.
pub fn decode_batch(
    registry: &Registry,
    operations: &[Operation],
    elements: Vec<Value>,
    decoder: &mut Decoder<'_>,
) -> Result<Vec<OperationResult>, DecodeError> {
    if elements.len() != operations.len() {
        return Err(DecodeError::LengthMismatch {
            expected: operations.len(),
            actual: elements.len(),
        });
    }
    let shells = operations
        .iter()
        .zip(elements)
        .enumerate()
        .map(|(index, (op, element))| {
            let kind = registry
                .kind(op.action())
                .ok_or_else(|| DecodeError::UnknownAction {
                    index,
                    action: op.action().to_owned(),
                })?;
            let mut shell = (kind.result_factory)(op);
            shell.fill(element).map_err(|source| DecodeError::Shape {
                index,
                action: op.action().to_owned(),
                source,
            })?;
            Ok((kind.decorate, shell))
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    let results = shells
        .into_iter()
        .map(|(decorate, mut shell)| {
            decorate(&mut shell, decoder);
            shell
        })
        .collect();
    trace!(
        entities = decoder.identity_map().len(),
        "batch decoded"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use trellis_graph::{record, EntityId, SchemaIndex, Timestamp, WIRE_DATETIME_FORMAT};

    fn schema() -> SchemaIndex {
        SchemaIndex::new()
            .with_primary_keys("Task", ["id"])
            .with_timezone_support(true)
    }

    #[test]
    fn payload_is_an_array_of_action_tagged_objects() {
        let due = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        let ops = [
            Operation::query("select id from Task"),
            Operation::create("Task", record([("name", Datum::from("X")), ("due", due.into())])),
        ];
        let bytes = encode_operations(&ops, &Encoder::detached()).unwrap();
        let payload: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            payload,
            json!([
                {"action": "query", "expression": "select id from Task"},
                {
                    "action": "create",
                    "entity_type": "Task",
                    "entity_data": {
                        "__entity_type__": "Task",
                        "name": "X",
                        "due": {"__type__": "datetime", "value": "2024-02-03T04:05:06"}
                    }
                }
            ])
        );
    }

    #[test]
    fn entity_references_encode_as_type_and_primary_key() {
        let schema = schema();
        let mut map = IdentityMap::new();
        let task = Decoder::new(&schema, &mut map).decode(Datum::from(json!({
            "__entity_type__": "Task", "id": "t1", "name": "Layout"
        })));
        let op = Operation::create("Note", record([("parent", task.clone())]));

        match encode_operations(std::slice::from_ref(&op), &Encoder::detached()) {
            Err(EncodeError::DetachedEntity(_)) => {}
            other => panic!("expected DetachedEntity, got {other:?}"),
        }

        let encoded = Encoder::with_identity_map(&map).encode_operation(&op).unwrap();
        assert_eq!(
            encoded["entity_data"]["parent"],
            json!({"__entity_type__": "Task", "id": "t1"})
        );

        let empty = IdentityMap::new();
        assert!(matches!(
            Encoder::with_identity_map(&empty).encode(&task),
            Err(EncodeError::DanglingEntity(_))
        ));
    }

    #[test]
    fn references_from_other_maps_or_generations_are_dangling() {
        let schema = schema();
        let mut first = IdentityMap::new();
        let t1 = Decoder::new(&schema, &mut first).decode(Datum::from(json!({
            "__entity_type__": "Task", "id": "t1"
        })));
        let mut second = IdentityMap::new();
        let other = Decoder::new(&schema, &mut second).decode(Datum::from(json!({
            "__entity_type__": "Task", "id": "other"
        })));
        assert_eq!(other.as_entity().map(EntityId::index), t1.as_entity().map(EntityId::index));
        assert!(matches!(
            Encoder::with_identity_map(&second).encode(&t1),
            Err(EncodeError::DanglingEntity(_))
        ));

        first.clear();
        let t2 = Decoder::new(&schema, &mut first).decode(Datum::from(json!({
            "__entity_type__": "Task", "id": "t2"
        })));
        assert!(first.resolve(&t1).is_none());
        let op = Operation::create("Note", record([("parent", t1)]));
        assert!(matches!(
            Encoder::with_identity_map(&first).encode_operation(&op),
            Err(EncodeError::DanglingEntity(_))
        ));
        let op = Operation::create("Note", record([("parent", t2)]));
        let encoded = Encoder::with_identity_map(&first)
            .encode_operation(&op)
            .unwrap();
        assert_eq!(
            encoded["entity_data"]["parent"],
            json!({"__entity_type__": "Task", "id": "t2"})
        );
    }

    #[test]
    fn dates_follow_the_server_timezone_mode() {
        let instant = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        let value = Datum::from(instant);
        assert_eq!(
            Encoder::detached().encode(&value).unwrap()["value"],
            json!("2024-02-03T04:05:06")
        );
        let local = instant
            .with_timezone(&chrono::Local)
            .format(WIRE_DATETIME_FORMAT)
            .to_string();
        assert_eq!(
            Encoder::detached()
                .with_timezone_support(false)
                .encode(&value)
                .unwrap()["value"],
            json!(local)
        );
    }

    #[test]
    fn encoded_dates_decode_back_to_the_utc_instant() {
        let original = chrono::FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2023, 12, 31, 22, 0, 0)
            .unwrap();
        let wire = Encoder::detached().encode(&Datum::from(original)).unwrap();
        let schema = schema();
        let mut map = IdentityMap::new();
        let decoded = Decoder::new(&schema, &mut map).decode(Datum::from(wire));
        assert_eq!(
            decoded.as_timestamp().and_then(Timestamp::as_utc),
            Some(original.with_timezone(&Utc))
        );
    }

    #[test]
    fn error_objects_and_garbage_are_told_apart() {
        let body = br#"{"content": "bad expression", "exception": "ValidationError", "error_code": 4}"#;
        match parse_response(body) {
            Err(ResponseError::Server(fault)) => {
                assert_eq!(fault.kind(), FaultKind::Validation);
                assert_eq!(fault.error_code, Some(4));
                assert_eq!(fault.to_string(), "ValidationError: bad expression (code 4)");
            }
            other => panic!("expected server fault, got {other:?}"),
        }
        assert_eq!(
            parse_response(b"<html>502</html>"),
            Err(ResponseError::Malformed(b"<html>502</html>".to_vec()))
        );
        assert_eq!(parse_response(b"[]"), Ok(vec![]));
    }

    #[test]
    fn loose_error_objects_are_still_server_faults() {
        match parse_response(br#"{"content": "boom", "error_code": "17"}"#) {
            Err(ResponseError::Server(fault)) => {
                assert_eq!(fault.exception, "");
                assert_eq!(fault.kind(), FaultKind::Other);
                assert_eq!(fault.error_code, Some(17));
            }
            other => panic!("expected server fault, got {other:?}"),
        }
        match parse_response(br#"{"exception": "KeyError", "error_code": "E-9"}"#) {
            Err(ResponseError::Server(fault)) => {
                assert_eq!(fault.content, "");
                assert_eq!(fault.error_code, None);
                assert_eq!(fault.to_string(), "KeyError: ");
            }
            other => panic!("expected server fault, got {other:?}"),
        }
        assert_eq!(
            parse_response(b"\"oops\""),
            Err(ResponseError::Malformed(b"\"oops\"".to_vec()))
        );
    }

    #[test]
    fn fault_kinds_follow_exception_names() {
        let fault = |exception: &str| ServerFault {
            content: String::new(),
            exception: exception.to_owned(),
            error_code: None,
        };
        assert_eq!(fault("FTAuthenticationError").kind(), FaultKind::PermissionDenied);
        assert_eq!(fault("PermissionError").kind(), FaultKind::PermissionDenied);
        assert_eq!(fault("KeyError").kind(), FaultKind::Other);
    }

    #[test]
    fn batch_results_follow_operation_order() {
        let schema = schema();
        let mut map = IdentityMap::new();
        let ops = [
            Operation::delete("Task", ["t1"]),
            Operation::query("select name from Task"),
            Operation::update("Task", ["t1"], record([("name", "Y")])),
        ];
        let elements = vec![
            json!({"action": "delete", "data": true}),
            json!({"action": "query", "data": [{"__entity_type__": "Task", "id": "t1", "name": "X"}], "metadata": {}}),
            json!({"action": "update", "data": {"__entity_type__": "Task", "id": "t1", "name": "Y"}, "metadata": {}}),
        ];
        let results = decode_batch(
            &Registry::builtin(),
            &ops,
            elements,
            &mut Decoder::new(&schema, &mut map),
        )
        .unwrap();
        assert!(results[0].as_delete().unwrap().data);
        let queried = &results[1].as_query().unwrap().data[0];
        let updated = &results[2].as_entity().unwrap().data;
        assert_eq!(queried, updated);
        assert_eq!(
            map.resolve(updated).unwrap().get("name"),
            Some(&Datum::from("Y"))
        );
    }

    #[test]
    fn length_mismatch_fails_without_partial_results() {
        let schema = schema();
        let mut map = IdentityMap::new();
        let ops = [Operation::query("a"), Operation::query("b")];
        let err = decode_batch(
            &Registry::builtin(),
            &ops,
            vec![json!({"data": []})],
            &mut Decoder::new(&schema, &mut map),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn longer_responses_fail_without_touching_the_map() {
        let schema = schema();
        let mut map = IdentityMap::new();
        let ops = [Operation::query("a")];
        let elements = vec![
            json!({"data": [{"__entity_type__": "Task", "id": "t1"}]}),
            json!({"data": [{"__entity_type__": "Task", "id": "t2"}]}),
        ];
        let err = decode_batch(
            &Registry::builtin(),
            &ops,
            elements,
            &mut Decoder::new(&schema, &mut map),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::LengthMismatch {
                expected: 1,
                actual: 2
            }
        ));
        assert!(map.is_empty());
    }

    #[test]
    fn shape_failure_leaves_the_identity_map_untouched() {
        let schema = schema();
        let mut map = IdentityMap::new();
        let ops = [Operation::query("a"), Operation::delete("Task", ["t1"])];
        let elements = vec![
            json!({"data": [{"__entity_type__": "Task", "id": "t1"}]}),
            json!({"data": "yes"}),
        ];
        let err = decode_batch(
            &Registry::builtin(),
            &ops,
            elements,
            &mut Decoder::new(&schema, &mut map),
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::Shape { index: 1, .. }));
        assert!(map.is_empty());
    }
}
