// src/channel.rs

//! Fixed-capacity blocking FIFO for handing values between threads.
//!
//! [`BoundedChannel`] is the standalone handoff structure collaborators use to
//! feed work (or results) across threads with backpressure:
//!
//! - `send` blocks while the buffer is full,
//! - `receive` blocks while it is empty,
//! - `close` wakes everyone and turns further blocking into errors.
//!
//! Share one channel between threads with `Arc<BoundedChannel<T>>`.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::trace;

use crate::errors::DagpoolError;

/// Returned by [`BoundedChannel::send`] on a closed channel.
///
/// The rejected item is handed back so nothing is silently dropped.
#[derive(Error, PartialEq, Eq)]
#[error("sending on a closed channel")]
pub struct SendError<T>(pub T);

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendError").finish_non_exhaustive()
    }
}

/// Returned by [`BoundedChannel::receive`] once the channel is closed and
/// drained.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("receiving on a closed channel")]
pub struct RecvError;

#[derive(Error, PartialEq, Eq)]
pub enum TrySendError<T> {
    #[error("channel is full")]
    Full(T),
    #[error("sending on a closed channel")]
    Closed(T),
}

impl<T> TrySendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(item) | TrySendError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("Full(..)"),
            TrySendError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    #[error("channel is empty")]
    Empty,
    #[error("receiving on a closed channel")]
    Closed,
}

impl<T> From<SendError<T>> for DagpoolError {
    fn from(_: SendError<T>) -> Self {
        DagpoolError::ChannelClosed
    }
}

impl From<RecvError> for DagpoolError {
    fn from(_: RecvError) -> Self {
        DagpoolError::ChannelClosed
    }
}

struct ChannelState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded multi-producer multi-consumer FIFO.
///
/// Invariants:
/// - `len() <= capacity()` at all times,
/// - items come out in the order they went in,
/// - `close` is permanent.
///
/// After `close`, items that were already buffered are still delivered by
/// `receive`; only an empty closed channel reports [`RecvError`].
pub struct BoundedChannel<T> {
    capacity: usize,
    state: Mutex<ChannelState<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> BoundedChannel<T> {
    /// Create a channel holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedChannel capacity must be at least 1");
        Self {
            capacity,
            state: Mutex::new(ChannelState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueue `item`, blocking while the channel is full.
    pub fn send(&self, item: T) -> Result<(), SendError<T>> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(SendError(item));
            }
            if state.items.len() < self.capacity {
                state.items.push_back(item);
                trace!(len = state.items.len(), "channel: item enqueued");
                self.not_empty.notify_one();
                return Ok(());
            }
            self.not_full.wait(&mut state);
        }
    }

    /// Dequeue the oldest item, blocking while the channel is empty.
    pub fn receive(&self) -> Result<T, RecvError> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                trace!(len = state.items.len(), "channel: item dequeued");
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(RecvError);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Enqueue `item` only if there is room right now.
    pub fn try_send(&self, item: T) -> Result<(), TrySendError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TrySendError::Closed(item));
        }
        if state.items.len() >= self.capacity {
            return Err(TrySendError::Full(item));
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the oldest item only if one is buffered right now.
    pub fn try_receive(&self) -> Result<T, TryRecvError> {
        let mut state = self.state.lock();
        match state.items.pop_front() {
            Some(item) => {
                self.not_full.notify_one();
                Ok(item)
            }
            None if state.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Close the channel and wake every blocked sender and receiver.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            trace!(buffered = state.items.len(), "channel: closed");
        }
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl<T> fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedChannel")
            .field("capacity", &self.capacity)
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}
