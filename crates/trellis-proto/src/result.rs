// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-kind result shapes.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use trellis_graph::{Datum, Record};

/// Result of a `query`: ordered records plus server metadata.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct QueryResult {
    /// Echoed action tag.
    #[serde(default)]
    pub action: String,
    /// Matching records, in server order.
    pub data: Vec<Datum>,
    /// Paging and other metadata.
    #[serde(default)]
    pub metadata: Record,
}

/// Result of a `create` or `update`: the affected entity.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct EntityResult {
    /// Echoed action tag.
    #[serde(default)]
    pub action: String,
    /// The entity as stored by the server.
    pub data: Datum,
    /// Server metadata.
    #[serde(default)]
    pub metadata: Record,
}

/// Result of a `delete`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct DeleteResult {
    /// Echoed action tag.
    #[serde(default)]
    pub action: String,
    /// Whether the entity was removed.
    pub data: bool,
}

/// Result of `get_upload_metadata`: where and how to upload the file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct UploadMetadata {
    /// Destination URL for the upload request.
    pub url: String,
    /// Headers the upload request must carry.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Result of a registered extension kind: the whole response element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OtherResult {
    /// Action of the operation that produced it.
    pub action: String,
    /// Decoded response element.
    pub data: Datum,
}

/// Decoded outcome of one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// `query`.
    Query(QueryResult),
    /// `create`.
    Create(EntityResult),
    /// `update`.
    Update(EntityResult),
    /// `delete`.
    Delete(DeleteResult),
    /// `query_server_information`: requested name to value.
    ServerInformation(Record),
    /// `query_schemas`: one description per entity type.
    Schemas(Vec<Record>),
    /// `get_upload_metadata`.
    UploadMetadata(UploadMetadata),
    /// Any registered extension kind.
    Other(OtherResult),
}

impl OperationResult {
    /// Replace the shell's contents with `raw`, deserialized into this
    /// variant's own shape.
    pub fn fill(&mut self, raw: Value) -> Result<(), serde_json::Error> {
        match self {
            OperationResult::Query(r) => *r = serde_json::from_value(raw)?,
            OperationResult::Create(r) | OperationResult::Update(r) => {
                *r = serde_json::from_value(raw)?;
            }
            OperationResult::Delete(r) => *r = serde_json::from_value(raw)?,
            OperationResult::ServerInformation(r) => *r = serde_json::from_value(raw)?,
            OperationResult::Schemas(r) => *r = serde_json::from_value(raw)?,
            OperationResult::UploadMetadata(r) => *r = serde_json::from_value(raw)?,
            OperationResult::Other(r) => r.data = Datum::from(raw),
        }
        Ok(())
    }

    /// Query result, if this is one.
    pub fn as_query(&self) -> Option<&QueryResult> {
        match self {
            OperationResult::Query(r) => Some(r),
            _ => None,
        }
    }

    /// Create or update result, if this is one.
    pub fn as_entity(&self) -> Option<&EntityResult> {
        match self {
            OperationResult::Create(r) | OperationResult::Update(r) => Some(r),
            _ => None,
        }
    }

    /// Delete result, if this is one.
    pub fn as_delete(&self) -> Option<&DeleteResult> {
        match self {
            OperationResult::Delete(r) => Some(r),
            _ => None,
        }
    }

    /// Server information values, if this is a server information result.
    pub fn as_server_information(&self) -> Option<&Record> {
        match self {
            OperationResult::ServerInformation(r) => Some(r),
            _ => None,
        }
    }

    /// Schema descriptions, if this is a schemas result.
    pub fn as_schemas(&self) -> Option<&[Record]> {
        match self {
            OperationResult::Schemas(r) => Some(r),
            _ => None,
        }
    }

    /// Upload metadata, if this is one.
    pub fn as_upload_metadata(&self) -> Option<&UploadMetadata> {
        match self {
            OperationResult::UploadMetadata(r) => Some(r),
            _ => None,
        }
    }

    /// Extension result, if this is one.
    pub fn as_other(&self) -> Option<&OtherResult> {
        match self {
            OperationResult::Other(r) => Some(r),
            _ => None,
        }
    }

    /// Consume into a query result.
    pub fn into_query(self) -> Option<QueryResult> {
        match self {
            OperationResult::Query(r) => Some(r),
            _ => None,
        }
    }

    /// Consume into a create or update result.
    pub fn into_entity(self) -> Option<EntityResult> {
        match self {
            OperationResult::Create(r) | OperationResult::Update(r) => Some(r),
            _ => None,
        }
    }

    /// Consume into a delete result.
    pub fn into_delete(self) -> Option<DeleteResult> {
        match self {
            OperationResult::Delete(r) => Some(r),
            _ => None,
        }
    }
}
