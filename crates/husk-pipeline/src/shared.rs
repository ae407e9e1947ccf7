//! Shared buffers — collections consumed by several pipelines at once.
//!
//! An [`ObjectStream`](crate::ObjectStream) belongs to one pipeline. A
//! [`SharedBuffer`] is the opposite: an unbounded, thread-safe store that
//! several commands may feed or consume concurrently. Two reader shapes
//! exist over it:
//!
//! - [`SharedReader`] — a stable forward-only cursor. Each reader gets its
//!   own view; items stay in the buffer, so every cursor sees every item.
//! - [`RemoteReader`] — destructive reads against the store itself. Each
//!   item is delivered to at most one consumer, and the reader carries
//!   origin provenance (source label + run id) for downstream aggregation.
//!
//! Both support only single-item and bounded non-blocking reads; bulk reads
//! and peek are structurally incompatible with a single-advance cursor and
//! fail with [`ReaderError::Unsupported`].

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use husk_types::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ReaderError, StreamError};
use crate::reader::{
    AsRecord, DataReadyRelay, PipelineReader, Raw, ReadySource, SubscriptionId, Transform,
};
use crate::stream::{DataReadyFn, ListenerId};

struct BufferState {
    items: VecDeque<Value>,
    open: bool,
    listeners: Vec<(ListenerId, DataReadyFn)>,
    next_listener: u64,
}

impl BufferState {
    /// Signaled condition for the waitable handle: the store holds items,
    /// or it has completed (possibly already drained).
    fn ready(&self) -> bool {
        !self.items.is_empty() || !self.open
    }

    fn snapshot_listeners(&self) -> Vec<DataReadyFn> {
        self.listeners.iter().map(|(_, f)| Arc::clone(f)).collect()
    }
}

struct BufferShared {
    state: Mutex<BufferState>,
    /// Signaled when an item is appended or the buffer completes.
    added: Condvar,
}

impl BufferShared {
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Unbounded, thread-safe collection shared between pipelines.
///
/// Cloning produces another handle to the same buffer. A buffer is consumed
/// either through stable cursors or destructively — mixing the two on one
/// buffer skews the cursors' positions and is not supported.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<BufferShared>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BufferShared {
                state: Mutex::new(BufferState {
                    items: VecDeque::new(),
                    open: true,
                    listeners: Vec::new(),
                    next_listener: 0,
                }),
                added: Condvar::new(),
            }),
        }
    }

    /// Append a value. Fails once the buffer is complete.
    pub fn push(&self, value: Value) -> Result<(), StreamError> {
        let listeners = {
            let mut state = self.inner.lock();
            if !state.open {
                return Err(StreamError::Closed);
            }
            state.items.push_back(value);
            self.inner.added.notify_all();
            state.snapshot_listeners()
        };
        for listener in &listeners {
            listener();
        }
        Ok(())
    }

    /// Mark the buffer complete: no further pushes. Idempotent. Wakes every
    /// blocked cursor and destructive reader.
    pub fn complete(&self) {
        let listeners = {
            let mut state = self.inner.lock();
            if !state.open {
                return;
            }
            state.open = false;
            debug!(remaining = state.items.len(), "shared buffer completed");
            self.inner.added.notify_all();
            state.snapshot_listeners()
        };
        for listener in &listeners {
            listener();
        }
    }

    /// Number of items currently stored.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while the buffer accepts pushes.
    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    /// A stable forward-only cursor starting before the first item.
    pub fn cursor(&self) -> SharedCursor {
        SharedCursor {
            buf: self.clone(),
            pos: 0,
        }
    }

    /// Destructively remove the head item if one is currently available.
    pub fn take_head(&self) -> Option<Value> {
        self.inner.lock().items.pop_front()
    }

    /// Destructively remove the head item, blocking until one exists or the
    /// buffer completes.
    pub fn take_head_blocking(&self) -> Option<Value> {
        let mut state = self.inner.lock();
        loop {
            if let Some(value) = state.items.pop_front() {
                return Some(value);
            }
            if !state.open {
                return None;
            }
            state = self
                .inner
                .added
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Number of registered data-ready listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// A waitable handle signaled while the store holds items or has
    /// completed.
    pub fn data_ready_handle(&self) -> BufferReadyHandle {
        BufferReadyHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadySource for SharedBuffer {
    fn attach(&self, listener: DataReadyFn) -> ListenerId {
        let mut state = self.inner.lock();
        let id = ListenerId::next(&mut state.next_listener);
        state.listeners.push((id, listener));
        id
    }

    fn detach(&self, id: ListenerId) {
        self.inner.lock().listeners.retain(|(lid, _)| *lid != id);
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("SharedBuffer")
            .field("len", &state.items.len())
            .field("open", &state.open)
            .finish()
    }
}

/// Waitable view of a shared buffer's readiness condition.
///
/// Signaled while the store holds items or has completed — the condition a
/// destructive read unblocks on. A cursor that has already consumed every
/// stored item can still block after the handle signals; cursor readers
/// should prefer subscription-based readiness.
#[derive(Clone)]
pub struct BufferReadyHandle {
    inner: Arc<BufferShared>,
}

impl BufferReadyHandle {
    /// True when a destructive read would not block.
    pub fn is_ready(&self) -> bool {
        self.inner.lock().ready()
    }

    /// Block until the store is ready.
    pub fn wait(&self) {
        let mut state = self.inner.lock();
        while !state.ready() {
            state = self
                .inner
                .added
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block until the store is ready or `timeout` elapses.
    ///
    /// Returns true if the store became ready within the timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.lock();
        loop {
            if state.ready() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .inner
                .added
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
        }
    }
}

impl fmt::Debug for BufferReadyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferReadyHandle")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Stateful forward-only cursor over a [`SharedBuffer`].
///
/// The cursor never removes items; each cursor observes every item in
/// append order, independent of other cursors.
pub struct SharedCursor {
    buf: SharedBuffer,
    pos: usize,
}

impl SharedCursor {
    /// Advance to the next unread item, blocking until one is appended or
    /// the buffer completes. `None` once complete with nothing unread.
    pub fn next_blocking(&mut self) -> Option<Value> {
        let mut state = self.buf.inner.lock();
        loop {
            if self.pos < state.items.len() {
                let value = state.items[self.pos].clone();
                self.pos += 1;
                return Some(value);
            }
            if !state.open {
                return None;
            }
            state = self
                .buf
                .inner
                .added
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Advance without waiting. `None` when no unread item is currently
    /// available — whether because the producer is momentarily quiet or
    /// because the buffer is complete.
    pub fn try_next(&mut self) -> Option<Value> {
        let state = self.buf.inner.lock();
        if self.pos < state.items.len() {
            let value = state.items[self.pos].clone();
            self.pos += 1;
            Some(value)
        } else {
            None
        }
    }

    fn exhausted(&self) -> bool {
        let state = self.buf.inner.lock();
        !state.open && self.pos >= state.items.len()
    }
}

/// Reader over a [`SharedBuffer`] through a stable cursor, parameterized by
/// element transform.
///
/// Only `read` and `try_read` are supported; bulk reads and peek fail with
/// [`ReaderError::Unsupported`].
pub struct SharedReader<T: Transform> {
    buf: SharedBuffer,
    cursor: SharedCursor,
    relay: DataReadyRelay,
    _transform: PhantomData<T>,
}

/// Cursor reader returning raw values.
pub type SharedObjectReader = SharedReader<Raw>;

/// Cursor reader returning uniformly wrapped records.
pub type SharedRecordReader = SharedReader<AsRecord>;

impl<T: Transform> SharedReader<T> {
    pub fn new(buf: SharedBuffer) -> Self {
        let cursor = buf.cursor();
        Self {
            buf,
            cursor,
            relay: DataReadyRelay::new(),
            _transform: PhantomData,
        }
    }

    /// A waitable handle over the underlying store's readiness.
    pub fn data_ready_handle(&self) -> BufferReadyHandle {
        self.buf.data_ready_handle()
    }
}

impl<T: Transform> PipelineReader for SharedReader<T> {
    type Item = T::Output;

    fn read(&mut self) -> Option<T::Output> {
        self.cursor.next_blocking().map(T::apply)
    }

    fn read_up_to(&mut self, _count: usize) -> Result<Vec<T::Output>, ReaderError> {
        Err(ReaderError::Unsupported("read_up_to"))
    }

    fn read_to_end(&mut self) -> Result<Vec<T::Output>, ReaderError> {
        Err(ReaderError::Unsupported("read_to_end"))
    }

    fn try_read(&mut self, max: usize) -> Vec<T::Output> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.cursor.try_next() {
                Some(value) => out.push(T::apply(value)),
                None => break,
            }
        }
        out
    }

    fn peek(&mut self) -> Result<Option<T::Output>, ReaderError> {
        Err(ReaderError::Unsupported("peek"))
    }

    fn count(&self) -> usize {
        self.buf.len()
    }

    fn capacity(&self) -> usize {
        // The shared store is unbounded.
        usize::MAX
    }

    fn is_open(&self) -> bool {
        self.buf.is_open()
    }

    fn end_of_pipeline(&self) -> bool {
        self.cursor.exhausted()
    }

    fn close(&mut self) {
        self.buf.complete();
    }

    fn subscribe_data_ready(&mut self, listener: Box<dyn Fn() + Send + Sync>) -> SubscriptionId {
        self.relay.subscribe(&self.buf, listener)
    }

    fn unsubscribe_data_ready(&mut self, id: SubscriptionId) {
        self.relay.unsubscribe(&self.buf, id)
    }
}

impl<T: Transform> Drop for SharedReader<T> {
    fn drop(&mut self) {
        self.relay.detach_all(&self.buf);
        self.buf.complete();
    }
}

/// Destructive reader over a [`SharedBuffer`], tagged with origin
/// provenance.
///
/// Each successful read physically removes one item from the store, so
/// concurrent remote readers receive disjoint items — at most once
/// delivery, with no ordering guarantee between competing consumers. The
/// origin label and run id identify where the items came from, for
/// multi-source aggregators downstream.
///
/// This reader owns the store's lifetime: dropping it completes the buffer.
pub struct RemoteReader<T: Transform> {
    buf: SharedBuffer,
    origin: String,
    run_id: Uuid,
    relay: DataReadyRelay,
    _transform: PhantomData<T>,
}

/// Destructive reader returning raw values.
pub type RemoteObjectReader = RemoteReader<Raw>;

/// Destructive reader returning uniformly wrapped records.
pub type RemoteRecordReader = RemoteReader<AsRecord>;

impl<T: Transform> RemoteReader<T> {
    pub fn new(buf: SharedBuffer, origin: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            buf,
            origin: origin.into(),
            run_id,
            relay: DataReadyRelay::new(),
            _transform: PhantomData,
        }
    }

    /// Label of the source these items came from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Identifier of the run that produced these items.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// A waitable handle over the underlying store's readiness.
    pub fn data_ready_handle(&self) -> BufferReadyHandle {
        self.buf.data_ready_handle()
    }
}

impl<T: Transform> PipelineReader for RemoteReader<T> {
    type Item = T::Output;

    fn read(&mut self) -> Option<T::Output> {
        self.buf.take_head_blocking().map(T::apply)
    }

    fn read_up_to(&mut self, _count: usize) -> Result<Vec<T::Output>, ReaderError> {
        Err(ReaderError::Unsupported("read_up_to"))
    }

    fn read_to_end(&mut self) -> Result<Vec<T::Output>, ReaderError> {
        Err(ReaderError::Unsupported("read_to_end"))
    }

    fn try_read(&mut self, max: usize) -> Vec<T::Output> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.buf.take_head() {
                Some(value) => out.push(T::apply(value)),
                None => break,
            }
        }
        out
    }

    fn peek(&mut self) -> Result<Option<T::Output>, ReaderError> {
        Err(ReaderError::Unsupported("peek"))
    }

    fn count(&self) -> usize {
        self.buf.len()
    }

    fn capacity(&self) -> usize {
        usize::MAX
    }

    fn is_open(&self) -> bool {
        self.buf.is_open()
    }

    fn end_of_pipeline(&self) -> bool {
        // Destructive reads drain the store, so the structural definition
        // applies directly.
        !self.buf.is_open() && self.buf.is_empty()
    }

    fn close(&mut self) {
        self.buf.complete();
    }

    fn subscribe_data_ready(&mut self, listener: Box<dyn Fn() + Send + Sync>) -> SubscriptionId {
        self.relay.subscribe(&self.buf, listener)
    }

    fn unsubscribe_data_ready(&mut self, id: SubscriptionId) {
        self.relay.unsubscribe(&self.buf, id)
    }
}

impl<T: Transform> Drop for RemoteReader<T> {
    fn drop(&mut self) {
        self.relay.detach_all(&self.buf);
        // The remote reader owns the store: completing it releases every
        // other consumer still blocked on it.
        self.buf.complete();
    }
}
