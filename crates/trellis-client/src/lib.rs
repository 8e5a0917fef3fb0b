// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Client for batched entity-graph APIs.
//!
//! A [`Session`] sends a list of [`Operation`]s as one request through a
//! [`Transport`] and returns one typed result per operation, in order.
//! Entities in the results are merged into an [`IdentityMap`], so every
//! reference to the same server entity within a call points at one
//! canonical copy.
//!
//! ```no_run
//! use trellis_client::{HttpTransport, Session, SessionConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::from_env()?;
//! let session = Session::connect(config.clone(), HttpTransport::new(&config)?)?;
//! let reply = session.query("select name, status.name from Task limit 5")?;
//! for task in &reply.result.data {
//!     println!("{}", reply.to_json(task));
//! }
//! # Ok(())
//! # }
//! ```

mod async_call;
pub mod config;
mod dispatch;
mod error;
mod session;
pub mod transport;

pub use async_call::{join, wait, Pending};
pub use config::{ConfigError, ConfigService, ConfigStore, FsConfigStore, SessionConfig};
pub use error::ClientError;
pub use session::{Batch, Reply, Session};
pub use transport::{HttpTransport, Transport, TransportError};

pub use trellis_graph::{
    record, Datum, Entity, EntityId, IdentityKey, IdentityMap, Record, SchemaIndex, SchemaLookup,
    Timestamp,
};
pub use trellis_proto::{
    action, DeleteResult, EntityResult, FaultKind, Operation, OperationKind, OperationResult,
    OtherResult, QueryResult, Registry, ServerFault, UploadMetadata,
};
