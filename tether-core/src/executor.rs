//! Deferred execution.
//!
//! Background work (heartbeat timers, reconnect attempts, closure watchers)
//! goes through an [`Executor`] so hosts can route it elsewhere, e.g. a test
//! harness that records scheduled delays.

use futures::future::LocalBoxFuture;
use std::time::Duration;

/// Runs detached background tasks on the current runtime.
pub trait Executor: Send + Sync + 'static {
    /// Run `task` to completion in the background.
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);

    /// Run `task` after `delay`.
    ///
    /// Always deferred, including for a zero delay: the task never runs
    /// inline with the caller.
    fn schedule(&self, delay: Duration, task: LocalBoxFuture<'static, ()>) {
        self.spawn(Box::pin(async move {
            compio::time::sleep(delay).await;
            task.await;
        }));
    }
}

/// [`Executor`] backed by the compio runtime of the calling thread.
///
/// Must be used from inside a compio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompioExecutor;

impl Executor for CompioExecutor {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        compio::runtime::spawn(task).detach();
    }
}
