// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! One synchronous batched exchange: encode, send, parse, decode.

use tracing::{debug, debug_span, warn};
use trellis_graph::{Decoder, IdentityMap, SchemaLookup};
use trellis_proto::wire::{decode_batch, encode_operations, parse_response, Encoder};
use trellis_proto::{Operation, OperationResult, Registry};

use crate::{ClientError, Transport};

/// Run `operations` as one batch, merging every returned entity into
/// `identity_map`.
///
/// The map is not touched unless the whole response decodes. Callers
/// sharing one map across threads must serialize calls themselves.
pub(crate) fn dispatch<T: Transport + ?Sized>(
    transport: &T,
    registry: &Registry,
    schema: &dyn SchemaLookup,
    operations: &[Operation],
    identity_map: &mut IdentityMap,
) -> Result<Vec<OperationResult>, ClientError> {
    registry.ensure_registered(operations)?;
    let encoder =
        Encoder::with_identity_map(identity_map).with_timezone_support(schema.timezone_support());
    let payload = encode_operations(operations, &encoder)?;

    let span = debug_span!("call", operations = operations.len(), payload_bytes = payload.len());
    let _enter = span.enter();

    let body = transport.exchange(&payload)?;
    let elements = parse_response(&body).map_err(|err| {
        warn!(%err, "call rejected");
        ClientError::from(err)
    })?;
    let mut decoder = Decoder::new(schema, identity_map);
    let results = decode_batch(registry, operations, elements, &mut decoder)?;
    debug!(
        results = results.len(),
        entities = decoder.identity_map().len(),
        "call complete"
    );
    Ok(results)
}
