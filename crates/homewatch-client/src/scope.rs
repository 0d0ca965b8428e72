//! Lifecycle-bound background tasks.
//!
//! Everything a view starts (render loop, push channel, status poller, frame
//! reader) is spawned into a [`TaskScope`]. Dropping the scope aborts all of
//! them, so nothing keeps writing after its owner is gone.

use std::future::Future;
use std::time::Duration;

use tokio::task::{AbortHandle, JoinSet};
use tracing::Instrument;

use crate::backend::SystemBackend;
use crate::store::{Action, Store};

#[derive(Default)]
pub struct TaskScope {
    tasks: JoinSet<()>,
}

impl TaskScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn into the scope. The handle lets the caller stop this one task
    /// early without tearing down the rest.
    pub fn spawn<F>(&mut self, name: &'static str, fut: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, "task started");
        self.tasks.spawn(fut.instrument(tracing::debug_span!("task", name)))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Abort every task and wait for them to unwind.
    pub async fn shutdown(mut self) {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }
}

/// Refresh the store's system snapshot every `every`. Failures are logged
/// and the next tick tries again.
pub async fn poll_status<B: SystemBackend>(backend: B, store: Store, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match backend.system_status().await {
            Ok(status) => store.dispatch(Action::SystemStatus(status)),
            Err(err) => tracing::debug!(error = %err, "status poll failed"),
        }
    }
}
