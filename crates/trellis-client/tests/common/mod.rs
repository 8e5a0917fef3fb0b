// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scripted in-memory transport shared by the client integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use trellis_client::{SchemaIndex, Session, SessionConfig, Transport, TransportError};

/// Replays canned response bodies in order and records every request.
#[derive(Clone, Default)]
pub struct Scripted {
    replies: Arc<Mutex<VecDeque<Vec<u8>>>>,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON reply.
    pub fn reply(self, body: Value) -> Self {
        self.reply_raw(serde_json::to_vec(&body).unwrap())
    }

    /// Queue a raw reply body.
    pub fn reply_raw(self, body: Vec<u8>) -> Self {
        self.replies.lock().unwrap().push_back(body);
        self
    }

    /// Requests seen so far, parsed.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// Action tags of request `index`.
    pub fn actions(&self, index: usize) -> Vec<String> {
        self.requests()[index]
            .as_array()
            .unwrap()
            .iter()
            .map(|op| op["action"].as_str().unwrap().to_owned())
            .collect()
    }
}

impl Transport for Scripted {
    fn exchange(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push(serde_json::from_slice(payload).unwrap());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::new("no scripted reply left"))
    }
}

pub fn config() -> SessionConfig {
    SessionConfig::new("https://studio.test", "jane", "secret")
}

pub fn bootstrap_reply(timezone_support: bool) -> Value {
    json!([
        {"version": "4.13.8", "is_timezone_support_enabled": timezone_support},
        [
            {"id": "Task", "primary_key": ["id"], "properties": {"name": {"type": "string"}}},
            {"id": "Status", "primary_key": ["id"]},
            {"id": "Metadata", "primary_key": ["parent_id", "key"]}
        ]
    ])
}

pub fn schema() -> SchemaIndex {
    SchemaIndex::new()
        .with_primary_keys("Task", ["id"])
        .with_primary_keys("Status", ["id"])
        .with_timezone_support(true)
}

/// Session over `transport` without a bootstrap exchange.
pub fn session(transport: Scripted) -> Session<Scripted> {
    Session::from_parts(config(), transport, schema())
}
