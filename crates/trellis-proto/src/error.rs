// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Codec and registry errors.

use thiserror::Error;
use trellis_graph::EntityId;

/// An operation could not be turned into wire form. Raised before any
/// network exchange.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Entity reference encoded without the identity map that owns it.
    #[error("entity {0} cannot be encoded without its identity map")]
    DetachedEntity(EntityId),
    /// Entity reference not present in the supplied identity map.
    #[error("entity {0} is not present in the identity map")]
    DanglingEntity(EntityId),
    /// Operation action has no registered kind, so its result could never be decoded.
    #[error("operation #{index} has unregistered action '{action}'")]
    UnregisteredAction {
        /// Position in the batch.
        index: usize,
        /// Offending action tag.
        action: String,
    },
    /// JSON serialization failure.
    #[error("payload serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A response element did not match the shape its operation expects.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Result count differs from operation count.
    #[error("response carries {actual} results for {expected} operations")]
    LengthMismatch {
        /// Number of operations sent.
        expected: usize,
        /// Number of result elements received.
        actual: usize,
    },
    /// No kind registered for an operation's action.
    #[error("no registered kind for action '{action}' (result #{index})")]
    UnknownAction {
        /// Position in the batch.
        index: usize,
        /// Offending action tag.
        action: String,
    },
    /// Element failed to deserialize into its result shape.
    #[error("result #{index} ('{action}') has unexpected shape: {source}")]
    Shape {
        /// Position in the batch.
        index: usize,
        /// Action of the matching operation.
        action: String,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
    /// A decoded result is not of the kind the caller asked for.
    #[error("result #{index} is not a '{expected}' result")]
    UnexpectedResult {
        /// Position in the batch.
        index: usize,
        /// Action whose result was expected.
        expected: &'static str,
    },
}

/// Registry mutation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A kind with this action tag is already registered.
    #[error("action '{0}' is already registered")]
    DuplicateAction(&'static str),
}
