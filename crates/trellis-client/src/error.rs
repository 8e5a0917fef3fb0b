// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Call-level error taxonomy.

use thiserror::Error;
use trellis_graph::SchemaError;
use trellis_proto::{DecodeError, EncodeError, FaultKind, ResponseError, ServerFault};

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Every way a call can fail. All variants are terminal for the call that
/// produced them: nothing is retried and no partial results are returned.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An operation could not be put in wire form; nothing was sent.
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),
    /// A result element did not match its operation's shape.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    /// The server rejected the request as invalid.
    #[error("server validation error: {0}")]
    ServerValidation(ServerFault),
    /// Authentication failed or the user may not perform the request.
    #[error("server permission denied: {0}")]
    PermissionDenied(ServerFault),
    /// Any other server-side failure.
    #[error("server error: {0}")]
    Server(ServerFault),
    /// The body was neither a result array nor an error description.
    #[error("malformed response: {}", String::from_utf8_lossy(.content))]
    MalformedResponse {
        /// Raw response body.
        content: Vec<u8>,
    },
    /// Transport failure, passed through unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Bootstrap schemas could not be indexed.
    #[error("schema bootstrap failed: {0}")]
    Schema(#[from] SchemaError),
    /// Session configuration is invalid or unreadable.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// `ensure_populated` could not identify exactly one entity.
    #[error("cannot populate {key}: {reason}")]
    Populate {
        /// Identity key of the entity being populated.
        key: String,
        /// What went wrong.
        reason: String,
    },
    /// The background task of an async call ended without reporting.
    #[error("async call task ended without delivering a result")]
    TaskLost,
}

impl ClientError {
    /// The server fault behind this error, if it came from the server.
    pub fn server_fault(&self) -> Option<&ServerFault> {
        match self {
            ClientError::ServerValidation(f)
            | ClientError::PermissionDenied(f)
            | ClientError::Server(f) => Some(f),
            _ => None,
        }
    }
}

impl From<ServerFault> for ClientError {
    fn from(fault: ServerFault) -> Self {
        match fault.kind() {
            FaultKind::Validation => ClientError::ServerValidation(fault),
            FaultKind::PermissionDenied => ClientError::PermissionDenied(fault),
            FaultKind::Other => ClientError::Server(fault),
        }
    }
}

impl From<ResponseError> for ClientError {
    fn from(err: ResponseError) -> Self {
        match err {
            ResponseError::Server(fault) => fault.into(),
            ResponseError::Malformed(content) => ClientError::MalformedResponse { content },
        }
    }
}
