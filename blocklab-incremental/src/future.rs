//! Identity-stable render futures
//!
//! A [`RenderFuture`] is a shared handle on a computation that settles at
//! most once. Clones share one cell, so two handles obtained for the same
//! key compare equal with [`RenderFuture::ptr_eq`]. The handle can be
//! awaited from tasks on the [`Scheduler`](crate::Scheduler) or read
//! synchronously by consumers with [`RenderFuture::read`], which either
//! returns the settlement or a [`Suspend`] naming this future.

use crate::scheduler::Suspend;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

enum State<T, E> {
    Pending(Vec<Waker>),
    Settled(Result<T, E>),
}

pub(crate) struct Cell<T, E> {
    state: Mutex<State<T, E>>,
}

/// Type-erased view used by the scheduler to check whether a suspension
/// can be re-driven
pub trait Settled: Send + Sync {
    fn is_settled(&self) -> bool;
}

impl<T: Send, E: Send> Settled for Cell<T, E> {
    fn is_settled(&self) -> bool {
        matches!(*self.state.lock(), State::Settled(_))
    }
}

/// Pending-or-settled handle on one resolution
pub struct RenderFuture<T, E> {
    cell: Arc<Cell<T, E>>,
}

impl<T, E> Clone for RenderFuture<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T, E> RenderFuture<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// A future that has not settled yet
    pub fn pending() -> Self {
        Self {
            cell: Arc::new(Cell {
                state: Mutex::new(State::Pending(Vec::new())),
            }),
        }
    }

    /// A future that is already settled with a value
    pub fn ready(value: T) -> Self {
        Self::settled(Ok(value))
    }

    /// A future that is already settled with an error
    pub fn rejected(error: E) -> Self {
        Self::settled(Err(error))
    }

    fn settled(result: Result<T, E>) -> Self {
        Self {
            cell: Arc::new(Cell {
                state: Mutex::new(State::Settled(result)),
            }),
        }
    }

    /// Settle the future. Only the first settlement counts; returns false
    /// if the future had already settled.
    pub fn settle(&self, result: Result<T, E>) -> bool {
        let wakers = {
            let mut state = self.cell.state.lock();
            match &mut *state {
                State::Settled(_) => return false,
                State::Pending(wakers) => {
                    let wakers = std::mem::take(wakers);
                    *state = State::Settled(result);
                    wakers
                }
            }
        };

        for waker in wakers {
            waker.wake();
        }
        true
    }

    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    pub fn reject(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    /// The settlement, if any, without registering interest
    pub fn peek(&self) -> Option<Result<T, E>> {
        match &*self.cell.state.lock() {
            State::Settled(result) => Some(result.clone()),
            State::Pending(_) => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.cell.is_settled()
    }

    pub fn is_pending(&self) -> bool {
        !self.is_settled()
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.peek(), Some(Err(_)))
    }

    /// Blocking-read contract for consumers: the settlement when ready,
    /// otherwise a suspension the scheduler re-drives once this settles
    pub fn read(&self) -> Result<Result<T, E>, Suspend> {
        self.peek().ok_or_else(|| Suspend::on(self.cell.clone()))
    }

    /// Reference equality: both handles share one cell
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T, E> Future for RenderFuture<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.cell.state.lock();
        match &mut *state {
            State::Settled(result) => Poll::Ready(result.clone()),
            State::Pending(wakers) => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T, E> fmt::Debug for RenderFuture<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &*self.cell.state.lock() {
            State::Pending(_) => "pending",
            State::Settled(Ok(_)) => "resolved",
            State::Settled(Err(_)) => "rejected",
        };
        f.debug_struct("RenderFuture")
            .field("cell", &Arc::as_ptr(&self.cell))
            .field("status", &status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Fut = RenderFuture<u32, String>;

    #[test]
    fn test_settles_once() {
        let fut = Fut::pending();
        assert!(fut.is_pending());
        assert!(fut.resolve(1));
        assert!(!fut.resolve(2));
        assert!(!fut.reject("late".to_string()));
        assert_eq!(fut.peek(), Some(Ok(1)));
    }

    #[test]
    fn test_clones_share_identity() {
        let a = Fut::pending();
        let b = a.clone();
        let c = Fut::pending();

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));

        b.reject("boom".to_string());
        assert!(a.is_rejected());
    }

    #[test]
    fn test_read_suspends_until_settled() {
        let fut = Fut::pending();
        let suspend = fut.read().unwrap_err();
        assert!(!suspend.is_settled());

        fut.resolve(7);
        assert!(suspend.is_settled());
        assert_eq!(fut.read().unwrap(), Ok(7));
    }

    #[test]
    fn test_await_wakes_task() {
        let mut pool = LocalPool::new();
        let fut = Fut::pending();
        let seen = Rc::new(RefCell::new(None));

        let waiting = fut.clone();
        let sink = seen.clone();
        pool.spawner()
            .spawn_local(async move {
                *sink.borrow_mut() = Some(waiting.await);
            })
            .unwrap();

        pool.run_until_stalled();
        assert!(seen.borrow().is_none());

        fut.resolve(42);
        pool.run_until_stalled();
        assert_eq!(*seen.borrow(), Some(Ok(42)));
    }
}
