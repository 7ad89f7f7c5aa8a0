//! An unbounded blocking queue for handing values between threads.
//!
//! Every value sent is delivered to exactly one receiver. The queue does not
//! broadcast: several threads receiving from the same queue compete for its
//! values. Callers that need every value on every waiter should give each
//! waiter its own queue (see [`crate::controller::PhaseController::subscribe`]).
//!
//! The queue is unbounded. A producer that outpaces its consumers grows the
//! queue without limit, which is fine for seconds-scale signals but not for
//! high-frequency traffic.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Which end of the queue `receive` takes values from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Discipline {
    /// Values are received in the order they were sent.
    #[default]
    Fifo,
    /// The most recently sent value is received first.
    Lifo,
}

/// Returned by [`BlockingQueue::send`] once the queue is closed. Carries the rejected value.
#[derive(PartialEq, Eq)]
pub struct SendError<T>(pub T);

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendError { .. }")
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sending on a closed queue")
    }
}

impl<T> std::error::Error for SendError<T> {}

/// Returned by [`BlockingQueue::receive`] once the queue is closed and drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("receiving on a closed and empty queue")]
pub struct RecvError;

/// Returned by [`BlockingQueue::receive_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecvTimeoutError {
    /// Nothing arrived before the deadline.
    #[error("timed out waiting on queue")]
    Timeout,
    /// The queue was closed and has no values left.
    #[error("receiving on a closed and empty queue")]
    Closed,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A mutex-protected double-ended queue with a condition variable signaled on every send.
pub struct BlockingQueue<T> {
    data: Mutex<State<T>>,
    not_empty: Condvar,
    discipline: Discipline,
}

impl<T> BlockingQueue<T> {
    /// Creates an empty FIFO queue.
    pub fn new() -> Self {
        Self::with_discipline(Discipline::Fifo)
    }

    /// Creates an empty queue that receives from the end given by `discipline`.
    pub fn with_discipline(discipline: Discipline) -> Self {
        BlockingQueue {
            data: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            discipline,
        }
    }

    /// The extraction order of this queue.
    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    // The state is never left half-updated while the lock is held, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take(&self, state: &mut State<T>) -> Option<T> {
        match self.discipline {
            Discipline::Fifo => state.items.pop_front(),
            Discipline::Lifo => state.items.pop_back(),
        }
    }

    /// Appends `item` and wakes one waiting receiver. Never blocks on capacity.
    ///
    /// Fails only when the queue has been closed, handing `item` back.
    pub fn send(&self, item: T) -> Result<(), SendError<T>> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(SendError(item));
            }
            state.items.push_back(item);
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until a value is available and moves it out of the queue.
    ///
    /// Values sent before [`close`](Self::close) are still delivered; the
    /// error is returned only when the queue is both closed and empty.
    pub fn receive(&self) -> Result<T, RecvError> {
        let mut state = self.lock();
        loop {
            if let Some(item) = self.take(&mut state) {
                return Ok(item);
            }
            if state.closed {
                return Err(RecvError);
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Like [`receive`](Self::receive), but gives up after `timeout`.
    ///
    /// A timeout too large to express as a deadline waits without one.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.receive().map_err(|RecvError| RecvTimeoutError::Closed);
        };
        let mut state = self.lock();
        loop {
            if let Some(item) = self.take(&mut state) {
                return Ok(item);
            }
            if state.closed {
                return Err(RecvTimeoutError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RecvTimeoutError::Timeout);
            }
            state = self
                .not_empty
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
    }

    /// Takes a value if one is ready, without blocking.
    pub fn try_receive(&self) -> Option<T> {
        let mut state = self.lock();
        self.take(&mut state)
    }

    /// Rejects further sends and releases every blocked receiver once the queue drains.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of values waiting to be received.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether no values are waiting.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("BlockingQueue")
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .field("discipline", &self.discipline)
            .finish()
    }
}
