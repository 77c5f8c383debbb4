//! Schedule-once primitive for delayed work.

use std::time::Duration;

use futures::future::BoxFuture;

/// Runs a task once after a delay. Fire-and-forget: no cancellation.
pub trait Scheduler: Send + Sync {
    fn schedule_once(&self, delay: Duration, task: BoxFuture<'static, ()>);
}

/// Spawns a tokio task that sleeps, then runs the callback.
///
/// Under `#[tokio::test(start_paused = true)]` the sleep follows the paused
/// clock, so tests advance time instead of waiting.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}
