// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Background calls with a one-shot completion channel.
//!
//! Each call runs on the tokio blocking pool when a runtime is current and
//! on a plain thread otherwise. The sender fires exactly once. There is no
//! cancellation: dropping the receiver does not stop the call.

use std::sync::Arc;
use std::thread;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use trellis_proto::{Operation, QueryResult};

use crate::{Batch, ClientError, Reply, Session, Transport};

/// Completion channel of a background call.
pub type Pending<R> = oneshot::Receiver<Result<R, ClientError>>;

impl<T: Transport + 'static> Session<T> {
    /// Run `operations` in the background with a fresh identity map.
    pub fn async_call(self: &Arc<Self>, operations: Vec<Operation>) -> Pending<Batch> {
        let session = Arc::clone(self);
        spawn_call(move || session.call(&operations))
    }

    /// Run one query in the background.
    pub fn async_query(self: &Arc<Self>, expression: impl Into<String>) -> Pending<Reply<QueryResult>> {
        let session = Arc::clone(self);
        let expression = expression.into();
        spawn_call(move || session.query(expression))
    }
}

/// Await a background call, mapping a vanished task to
/// [`ClientError::TaskLost`].
pub async fn join<R>(pending: Pending<R>) -> Result<R, ClientError> {
    pending.await.map_err(|_| ClientError::TaskLost)?
}

/// Blocking counterpart of [`join`] for callers outside a runtime.
pub fn wait<R>(pending: Pending<R>) -> Result<R, ClientError> {
    pending.blocking_recv().map_err(|_| ClientError::TaskLost)?
}

fn spawn_call<R, F>(job: F) -> Pending<R>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R, ClientError> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let task = move || {
        // Receiver may already be gone.
        let _ = tx.send(job());
    };
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(task);
        }
        Err(_) => {
            thread::spawn(task);
        }
    }
    rx
}
