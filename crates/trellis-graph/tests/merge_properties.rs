// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Property tests for identity-map merging.
#![allow(missing_docs, clippy::unwrap_used)]

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use trellis_graph::{Datum, Decoder, IdentityKey, IdentityMap, SchemaIndex};

fn schema() -> SchemaIndex {
    SchemaIndex::new().with_primary_keys("Task", ["id"])
}

fn field_name() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["name", "status", "bid", "priority", "description"])
        .prop_map(str::to_owned)
}

/// A partial selection of task fields, as a query with a narrow projection returns.
fn partial_task() -> impl Strategy<Value = (u8, BTreeMap<String, i64>)> {
    (0u8..4, prop::collection::btree_map(field_name(), any::<i64>(), 0..4))
}

fn to_raw(id: u8, fields: &BTreeMap<String, i64>) -> Value {
    let mut map = Map::new();
    map.insert("__entity_type__".into(), json!("Task"));
    map.insert("id".into(), json!(id.to_string()));
    for (k, v) in fields {
        map.insert(k.clone(), json!(v));
    }
    Value::Object(map)
}

proptest! {
    #[test]
    fn canonical_entities_hold_the_latest_value_of_every_field(
        records in prop::collection::vec(partial_task(), 1..24)
    ) {
        let schema = schema();
        let mut map = IdentityMap::new();
        let mut expected: BTreeMap<u8, BTreeMap<String, i64>> = BTreeMap::new();
        let mut decoder = Decoder::new(&schema, &mut map);
        for (id, fields) in &records {
            decoder.decode(Datum::from(to_raw(*id, fields)));
            expected.entry(*id).or_default().extend(fields.clone());
        }

        prop_assert_eq!(map.len(), expected.len());
        for (id, fields) in expected {
            let key = IdentityKey::new("Task", [id.to_string()]);
            let entity = map.get(map.lookup(&key).unwrap()).unwrap();
            for (name, value) in fields {
                prop_assert_eq!(entity.get(&name).and_then(Datum::as_i64), Some(value));
            }
        }
    }

    #[test]
    fn list_decoding_preserves_order_and_sharing(
        ids in prop::collection::vec(0u8..5, 1..32)
    ) {
        let schema = schema();
        let mut map = IdentityMap::new();
        let raw = Value::Array(ids.iter().map(|id| to_raw(*id, &BTreeMap::new())).collect());
        let decoded = Decoder::new(&schema, &mut map).decode(Datum::from(raw));
        let items = decoded.as_list().unwrap();
        prop_assert_eq!(items.len(), ids.len());
        for (item, id) in items.iter().zip(&ids) {
            let entity = map.resolve(item).unwrap();
            let expected_id = id.to_string();
            prop_assert_eq!(entity.get("id").and_then(Datum::as_str), Some(expected_id.as_str()));
        }
        for (i, a) in ids.iter().enumerate() {
            for (j, b) in ids.iter().enumerate() {
                prop_assert_eq!(a == b, items[i] == items[j]);
            }
        }
    }
}
