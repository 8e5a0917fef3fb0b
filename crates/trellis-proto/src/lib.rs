// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire schema for batched trellis API calls.
//!
//! A call is a JSON array of [`Operation`]s, each tagged by its `action`.
//! The server answers with an array of the same length; element *i* is
//! decoded into the result shape registered for operation *i*'s action in
//! the [`Registry`], then decorated through the identity-map [`Decoder`].

pub use trellis_graph::{
    record, Datum, Decoder, Entity, EntityId, IdentityKey, IdentityMap, Record, SchemaIndex,
    SchemaLookup, Timestamp, ENTITY_TYPE_KEY,
};

mod error;
mod operation;
mod registry;
mod result;
pub mod wire;

pub use error::{DecodeError, EncodeError, RegistryError};
pub use operation::{action, Operation};
pub use registry::{OperationKind, Registry};
pub use result::{
    DeleteResult, EntityResult, OperationResult, OtherResult, QueryResult, UploadMetadata,
};
pub use wire::{FaultKind, ResponseError, ServerFault};
