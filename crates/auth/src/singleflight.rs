// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight execution: at most one operation in flight, shared by all
//! callers that arrive while it runs.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinError;

/// Awaitable handle to the outcome of the in-flight operation.
pub type SharedOutcome<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

type Slot<T, E> = Arc<Mutex<Option<SharedOutcome<T, E>>>>;

/// A guarded slot holding either nothing or the one in-flight operation.
///
/// The operation runs as a spawned task, so it completes and clears the slot
/// even if every caller stops awaiting it. Requires a Tokio runtime.
pub struct SingleFlight<T, E> {
    slot: Slot<T, E>,
}

impl<T, E> Default for SingleFlight<T, E> {
    fn default() -> Self {
        Self { slot: Arc::new(Mutex::new(None)) }
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an operation is currently in flight.
    pub fn is_in_flight(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Attach to the in-flight operation, or start one with `start`.
    ///
    /// Returns the shared outcome and `true` if this call started it. The
    /// check and the store happen under one lock acquisition, and `start` is
    /// only invoked by the caller that wins.
    pub fn join_or_start<F, Fut>(&self, start: F) -> (SharedOutcome<T, E>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(ref outcome) = *slot {
            return (outcome.clone(), false);
        }

        let work = start();
        let guard = ClearOnDrop { slot: Arc::clone(&self.slot) };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            work.await
        });
        let outcome: SharedOutcome<T, E> =
            async move { handle.await.unwrap_or_else(|e| Err(E::from(e))) }.boxed().shared();

        // The task cannot clear the slot before this store: it needs the lock we hold.
        *slot = Some(outcome.clone());
        (outcome, true)
    }

    /// Run `start` unless an operation is already in flight, and await the outcome.
    pub async fn run<F, Fut>(&self, start: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (outcome, _) = self.join_or_start(start);
        outcome.await
    }
}

/// Empties the slot when the operation's task finishes, panics, or is dropped.
struct ClearOnDrop<T, E> {
    slot: Slot<T, E>,
}

impl<T, E> Drop for ClearOnDrop<T, E> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

#[cfg(test)]
#[path = "singleflight_tests.rs"]
mod tests;
