//! Bounded object stream with backpressure — the channel between pipeline
//! stages.
//!
//! An [`ObjectStream`] is a capacity-limited FIFO of [`Value`]s shared
//! between one logical producer side and any number of reader handles.
//! Writers block while the buffer is full; blocking reads wait for data or
//! for the stream to reach end of pipeline (closed and drained). `close()`
//! is idempotent and wakes everything that is blocked.
//!
//! Readiness is exposed two ways: a listener registry that fires on every
//! append (and on close), and a [`DataReadyHandle`] that external wait
//! loops can block on or poll with a timeout.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use husk_types::Value;
use tracing::{debug, trace};

use crate::error::StreamError;

/// Default stream capacity when a stage does not pick its own.
pub const DEFAULT_STREAM_CAPACITY: usize = 1024;

/// A data-ready callback registered on a stream or shared buffer.
pub type DataReadyFn = Arc<dyn Fn() + Send + Sync>;

/// Token identifying one registered data-ready listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next(counter: &mut u64) -> Self {
        let id = ListenerId(*counter);
        *counter += 1;
        id
    }
}

/// Shared mutable state protected by std::sync::Mutex.
///
/// The lock is held only for VecDeque operations and listener bookkeeping.
/// Listener callbacks are invoked after the lock is released.
pub(crate) struct StreamState {
    queue: VecDeque<Value>,
    open: bool,
    listeners: Vec<(ListenerId, DataReadyFn)>,
    next_listener: u64,
}

impl StreamState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            open: true,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    fn end_of_pipeline(&self) -> bool {
        !self.open && self.queue.is_empty()
    }

    /// Signaled condition for the waitable handle: data is buffered, or the
    /// stream is closed (possibly already drained).
    fn ready(&self) -> bool {
        !self.queue.is_empty() || !self.open
    }

    fn snapshot_listeners(&self) -> Vec<DataReadyFn> {
        self.listeners.iter().map(|(_, f)| Arc::clone(f)).collect()
    }

    fn add_listener(&mut self, listener: DataReadyFn) -> ListenerId {
        let id = ListenerId::next(&mut self.next_listener);
        self.listeners.push((id, listener));
        id
    }

    fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }
}

struct StreamShared {
    state: Mutex<StreamState>,
    /// Signaled when data arrives or the stream closes.
    read_ready: Condvar,
    /// Signaled when a read frees buffer space or the stream closes.
    space_ready: Condvar,
    capacity: usize,
}

impl StreamShared {
    fn lock(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bounded FIFO stream of pipeline values.
///
/// Cloning produces another handle to the same stream. The stream itself is
/// thread-safe; the single-consumer discipline lives in the reader adapters
/// layered on top.
#[derive(Clone)]
pub struct ObjectStream {
    shared: Arc<StreamShared>,
}

impl ObjectStream {
    /// Create a stream holding at most `capacity` values (clamped to ≥ 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(StreamShared {
                state: Mutex::new(StreamState::new()),
                read_ready: Condvar::new(),
                space_ready: Condvar::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Create a stream with the default capacity.
    pub fn default_capacity() -> Self {
        Self::new(DEFAULT_STREAM_CAPACITY)
    }

    /// Append a value, blocking while the stream is full.
    ///
    /// Fails immediately with [`StreamError::Closed`] once the stream is
    /// closed — including when the close happens while this writer is
    /// blocked waiting for space.
    pub fn write(&self, value: Value) -> Result<(), StreamError> {
        let listeners = {
            let mut state = self.shared.lock();
            loop {
                if !state.open {
                    trace!("write rejected: stream closed");
                    return Err(StreamError::Closed);
                }
                if state.queue.len() < self.shared.capacity {
                    state.queue.push_back(value);
                    break;
                }
                state = self
                    .shared
                    .space_ready
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
            }
            self.shared.read_ready.notify_all();
            state.snapshot_listeners()
        };
        for listener in &listeners {
            listener();
        }
        Ok(())
    }

    /// Read the next value, blocking until one arrives.
    ///
    /// Returns `None` only at end of pipeline (closed and drained).
    pub fn read(&self) -> Option<Value> {
        let mut state = self.shared.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                self.shared.space_ready.notify_all();
                return Some(value);
            }
            if !state.open {
                return None;
            }
            state = self
                .shared
                .read_ready
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Read up to `count` values, blocking until that many have been
    /// accumulated or the stream reaches end of pipeline.
    ///
    /// Values are taken as they arrive, so a partial batch survives a close:
    /// fewer than `count` values are returned only at end of pipeline.
    pub fn read_up_to(&self, count: usize) -> Vec<Value> {
        if count == 0 {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut state = self.shared.lock();
        loop {
            while out.len() < count {
                match state.queue.pop_front() {
                    Some(value) => out.push(value),
                    None => break,
                }
            }
            if !out.is_empty() {
                self.shared.space_ready.notify_all();
            }
            if out.len() == count || state.end_of_pipeline() {
                return out;
            }
            state = self
                .shared
                .read_ready
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block until end of pipeline and return every remaining value in
    /// write order (possibly empty).
    pub fn read_to_end(&self) -> Vec<Value> {
        let mut out = Vec::new();
        let mut state = self.shared.lock();
        loop {
            while let Some(value) = state.queue.pop_front() {
                out.push(value);
            }
            self.shared.space_ready.notify_all();
            if !state.open {
                return out;
            }
            state = self
                .shared
                .read_ready
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Drain up to `max` currently-buffered values without waiting for more
    /// to arrive.
    ///
    /// Never blocks on data — at most it waits briefly for the internal
    /// lock. `max == 0` returns empty without touching the lock.
    pub fn try_read(&self, max: usize) -> Vec<Value> {
        if max == 0 {
            return Vec::new();
        }
        let mut state = self.shared.lock();
        let take = max.min(state.queue.len());
        let out: Vec<Value> = state.queue.drain(..take).collect();
        if !out.is_empty() {
            self.shared.space_ready.notify_all();
        }
        out
    }

    /// The head value without removing it, or `None` when the buffer is
    /// currently empty.
    pub fn peek(&self) -> Option<Value> {
        self.shared.lock().queue.front().cloned()
    }

    /// Close the stream. Idempotent.
    ///
    /// Blocked writers fail with [`StreamError::Closed`]; blocked readers
    /// drain whatever remains and then observe end of pipeline. Data-ready
    /// listeners fire once so event-driven consumers see the transition.
    pub fn close(&self) {
        let listeners = {
            let mut state = self.shared.lock();
            if !state.open {
                return;
            }
            state.open = false;
            debug!(remaining = state.queue.len(), "object stream closed");
            self.shared.read_ready.notify_all();
            self.shared.space_ready.notify_all();
            state.snapshot_listeners()
        };
        for listener in &listeners {
            listener();
        }
    }

    /// Number of values currently buffered.
    pub fn count(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Maximum number of values the stream may hold at one time.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// True while the stream accepts writes.
    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// True once the stream is closed and drained. Terminal: never reverts.
    pub fn end_of_pipeline(&self) -> bool {
        self.shared.lock().end_of_pipeline()
    }

    /// Register a listener invoked after every append (and once on close).
    ///
    /// Listeners run on the writer's thread, after the internal lock has
    /// been released.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.attach(Arc::new(listener))
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.detach(id);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.lock().listeners.len()
    }

    /// A waitable handle signaled whenever data is buffered or the stream
    /// has reached end of pipeline.
    pub fn data_ready_handle(&self) -> DataReadyHandle {
        DataReadyHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub(crate) fn attach(&self, listener: DataReadyFn) -> ListenerId {
        self.shared.lock().add_listener(listener)
    }

    pub(crate) fn detach(&self, id: ListenerId) {
        self.shared.lock().remove_listener(id);
    }
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("ObjectStream")
            .field("count", &state.queue.len())
            .field("capacity", &self.shared.capacity)
            .field("open", &state.open)
            .finish()
    }
}

/// Waitable view of a stream's readiness condition.
///
/// Signaled whenever the stream has buffered data or has reached end of
/// pipeline. The stream offers no built-in read timeout; callers wanting a
/// bounded wait use [`DataReadyHandle::wait_timeout`] and re-check.
#[derive(Clone)]
pub struct DataReadyHandle {
    shared: Arc<StreamShared>,
}

impl DataReadyHandle {
    /// True when a read would not block.
    pub fn is_ready(&self) -> bool {
        self.shared.lock().ready()
    }

    /// Block until the stream is ready.
    pub fn wait(&self) {
        let mut state = self.shared.lock();
        while !state.ready() {
            state = self
                .shared
                .read_ready
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block until the stream is ready or `timeout` elapses.
    ///
    /// Returns true if the stream became ready within the timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if state.ready() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .read_ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
        }
    }
}

impl fmt::Debug for DataReadyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataReadyHandle")
            .field("ready", &self.is_ready())
            .finish()
    }
}
