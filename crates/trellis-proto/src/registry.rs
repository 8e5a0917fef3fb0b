// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Operation kinds and the registry that pairs actions with result shapes.
//!
//! A kind is a (tag, factory, decorator) triple. The batch decoder looks the
//! kind up by the operation's action and never branches on the kind itself,
//! so new kinds plug in through [`Registry::register`].

use std::collections::HashMap;
use std::fmt;
use trellis_graph::{Datum, Decoder, Record};

use crate::operation::action;
use crate::{
    DeleteResult, EncodeError, EntityResult, Operation, OperationResult, OtherResult,
    QueryResult, RegistryError, UploadMetadata,
};

/// One registered operation kind.
#[derive(Clone, Copy)]
pub struct OperationKind {
    /// Action tag the kind answers to.
    pub action: &'static str,
    /// Produce the empty result shell a response element decodes into.
    pub result_factory: fn(&Operation) -> OperationResult,
    /// Run identity-map merging over whatever entity content the result carries.
    pub decorate: fn(&mut OperationResult, &mut Decoder<'_>),
}

impl OperationKind {
    /// Kind whose result is the whole response element, decoded through the
    /// merger.
    pub fn generic(action: &'static str) -> Self {
        Self {
            action,
            result_factory: other_shell,
            decorate: decorate_other,
        }
    }
}

impl fmt::Debug for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationKind")
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

const QUERY: OperationKind = OperationKind {
    action: action::QUERY,
    result_factory: query_shell,
    decorate: decorate_query,
};

const CREATE: OperationKind = OperationKind {
    action: action::CREATE,
    result_factory: create_shell,
    decorate: decorate_entity,
};

const UPDATE: OperationKind = OperationKind {
    action: action::UPDATE,
    result_factory: update_shell,
    decorate: decorate_entity,
};

const DELETE: OperationKind = OperationKind {
    action: action::DELETE,
    result_factory: delete_shell,
    decorate: decorate_nothing,
};

const QUERY_SERVER_INFORMATION: OperationKind = OperationKind {
    action: action::QUERY_SERVER_INFORMATION,
    result_factory: server_information_shell,
    decorate: decorate_nothing,
};

const QUERY_SCHEMAS: OperationKind = OperationKind {
    action: action::QUERY_SCHEMAS,
    result_factory: schemas_shell,
    decorate: decorate_nothing,
};

const GET_UPLOAD_METADATA: OperationKind = OperationKind {
    action: action::GET_UPLOAD_METADATA,
    result_factory: upload_metadata_shell,
    decorate: decorate_nothing,
};

fn query_shell(_: &Operation) -> OperationResult {
    OperationResult::Query(QueryResult::default())
}

fn create_shell(_: &Operation) -> OperationResult {
    OperationResult::Create(EntityResult::default())
}

fn update_shell(_: &Operation) -> OperationResult {
    OperationResult::Update(EntityResult::default())
}

fn delete_shell(_: &Operation) -> OperationResult {
    OperationResult::Delete(DeleteResult::default())
}

fn server_information_shell(_: &Operation) -> OperationResult {
    OperationResult::ServerInformation(Record::new())
}

fn schemas_shell(_: &Operation) -> OperationResult {
    OperationResult::Schemas(Vec::new())
}

fn upload_metadata_shell(_: &Operation) -> OperationResult {
    OperationResult::UploadMetadata(UploadMetadata::default())
}

fn other_shell(op: &Operation) -> OperationResult {
    OperationResult::Other(OtherResult {
        action: op.action().to_owned(),
        data: Datum::Null,
    })
}

fn decorate_query(result: &mut OperationResult, decoder: &mut Decoder<'_>) {
    if let OperationResult::Query(r) = result {
        decoder.decode_each(&mut r.data);
    }
}

fn decorate_entity(result: &mut OperationResult, decoder: &mut Decoder<'_>) {
    if let OperationResult::Create(r) | OperationResult::Update(r) = result {
        decoder.decode_in_place(&mut r.data);
    }
}

fn decorate_other(result: &mut OperationResult, decoder: &mut Decoder<'_>) {
    if let OperationResult::Other(r) = result {
        decoder.decode_in_place(&mut r.data);
    }
}

fn decorate_nothing(_: &mut OperationResult, _: &mut Decoder<'_>) {}

/// Action tag to kind lookup.
#[derive(Debug, Clone)]
pub struct Registry {
    kinds: HashMap<&'static str, OperationKind>,
}

impl Registry {
    /// Registry with no kinds at all.
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// Registry holding the seven built-in kinds.
    pub fn builtin() -> Self {
        let kinds = [
            QUERY,
            CREATE,
            UPDATE,
            DELETE,
            QUERY_SERVER_INFORMATION,
            QUERY_SCHEMAS,
            GET_UPLOAD_METADATA,
        ];
        Self {
            kinds: kinds.into_iter().map(|k| (k.action, k)).collect(),
        }
    }

    /// Add a kind. Actions are unique.
    pub fn register(&mut self, kind: OperationKind) -> Result<(), RegistryError> {
        if self.kinds.contains_key(kind.action) {
            return Err(RegistryError::DuplicateAction(kind.action));
        }
        self.kinds.insert(kind.action, kind);
        Ok(())
    }

    /// Kind registered for `action`.
    pub fn kind(&self, action: &str) -> Option<&OperationKind> {
        self.kinds.get(action)
    }

    /// True when `action` has a kind.
    pub fn contains(&self, action: &str) -> bool {
        self.kinds.contains_key(action)
    }

    /// Registered action tags, sorted.
    pub fn actions(&self) -> Vec<&'static str> {
        let mut out: Vec<_> = self.kinds.keys().copied().collect();
        out.sort_unstable();
        out
    }

    /// Check every operation of a batch has a kind, so nothing unanswerable
    /// is ever sent.
    pub fn ensure_registered(&self, operations: &[Operation]) -> Result<(), EncodeError> {
        match operations
            .iter()
            .enumerate()
            .find(|(_, op)| !self.contains(op.action()))
        {
            Some((index, op)) => Err(EncodeError::UnregisteredAction {
                index,
                action: op.action().to_owned(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
