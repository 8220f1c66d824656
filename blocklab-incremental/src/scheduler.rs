//! Cooperative single-threaded scheduling
//!
//! Resolution work runs as local tasks on a [`LocalPool`]. Consumers are
//! plain closures that read futures with
//! [`RenderFuture::read`](crate::RenderFuture::read); when a read hits a
//! pending future the closure returns a [`Suspend`], the scheduler runs
//! queued work until nothing can make progress, and re-invokes the closure
//! if the awaited future settled.
//!
//! A consumer must observe the same future instance across re-invocations.
//! A closure that creates a fresh future every time never converges; the
//! scheduler reports that as [`SuspenseError::Diverged`] after
//! `max_redrives` attempts.

use crate::future::Settled;
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::Poll;

/// Default number of re-invocations before a consumer is declared diverged
pub const DEFAULT_MAX_REDRIVES: usize = 64;

/// A consumer yielded because it read a pending future
pub struct Suspend {
    waiting_on: Arc<dyn Settled>,
}

impl Suspend {
    pub(crate) fn on(waiting_on: Arc<dyn Settled>) -> Self {
        Self { waiting_on }
    }

    /// Whether the future this suspension waits on has settled
    pub fn is_settled(&self) -> bool {
        self.waiting_on.is_settled()
    }
}

impl fmt::Debug for Suspend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspend")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Errors from driving a consumer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuspenseError {
    #[error("consumer did not converge after {redrives} re-drives")]
    Diverged { redrives: usize },
}

/// Single-threaded cooperative scheduler
///
/// Not re-entrant: [`Scheduler::drive`] and [`Scheduler::run_until_stalled`]
/// must not be called from inside a task spawned on this scheduler.
pub struct Scheduler {
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    max_redrives: usize,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_max_redrives(DEFAULT_MAX_REDRIVES)
    }

    pub fn with_max_redrives(max_redrives: usize) -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: RefCell::new(pool),
            spawner,
            max_redrives,
        }
    }

    /// Handle for spawning from inside running tasks
    pub fn spawner(&self) -> LocalSpawner {
        self.spawner.clone()
    }

    /// Queue a task; it starts on the next run of the pool
    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        spawn_on(&self.spawner, task);
    }

    /// Run queued tasks until none can make progress
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Drive a consumer to completion or until it waits on something that
    /// cannot settle yet.
    ///
    /// Returns `Poll::Pending` when the consumer is suspended on a future
    /// that is still pending after all runnable work has been done; the
    /// caller re-drives later (e.g. after new content is dispatched).
    pub fn drive<T>(
        &self,
        mut consumer: impl FnMut() -> Result<T, Suspend>,
    ) -> Result<Poll<T>, SuspenseError> {
        let mut redrives = 0;
        loop {
            match consumer() {
                Ok(value) => return Ok(Poll::Ready(value)),
                Err(suspend) => {
                    self.run_until_stalled();
                    if !suspend.is_settled() {
                        tracing::debug!(redrives, "consumer suspended on pending future");
                        return Ok(Poll::Pending);
                    }
                    redrives += 1;
                    if redrives > self.max_redrives {
                        tracing::warn!(redrives, "consumer diverged");
                        return Err(SuspenseError::Diverged { redrives });
                    }
                }
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("max_redrives", &self.max_redrives)
            .finish()
    }
}

/// Spawn onto a local spawner, logging if the pool is gone
pub fn spawn_on(spawner: &LocalSpawner, task: impl Future<Output = ()> + 'static) {
    if let Err(err) = spawner.spawn_local(task) {
        tracing::warn!("failed to spawn resolution task: {err}");
    }
}
