//! Reader adapters — single-consumer façades over an [`ObjectStream`].
//!
//! One trait, [`PipelineReader`], is the uniform operation set every
//! adapter exposes. Concrete adapters differ only in the element transform
//! applied to returned values, chosen at compile time:
//!
//! - [`ObjectReader`] — raw values, unchanged.
//! - [`RecordReader`] — every value coerced into the uniform [`Record`]
//!   envelope (idempotent, null-safe).
//!
//! A reader is a single logical consumer: reading methods take `&mut self`,
//! while the stream underneath may be written concurrently from other
//! threads. Dropping a reader closes the underlying stream on every exit
//! path and detaches its data-ready relay.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use husk_types::{Record, Value};

use crate::error::ReaderError;
use crate::stream::{DataReadyFn, DataReadyHandle, ListenerId, ObjectStream};

/// Element conversion a reader applies to every value it returns.
///
/// Exactly two implementations exist — raw passthrough and record
/// wrapping — so an adapter can never be configured with an output shape
/// the pipeline does not understand.
pub trait Transform {
    type Output;
    fn apply(value: Value) -> Self::Output;
}

/// Identity transform: stored values come back unchanged.
pub struct Raw;

impl Transform for Raw {
    type Output = Value;

    fn apply(value: Value) -> Value {
        value
    }
}

/// Coerce every value into the uniform [`Record`] envelope.
///
/// Already-wrapped values pass through untouched; null wraps to a null
/// record.
pub struct AsRecord;

impl Transform for AsRecord {
    type Output = Record;

    fn apply(value: Value) -> Record {
        Record::wrap(value)
    }
}

/// Token identifying one data-ready subscription on a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A channel the relay can attach its forwarding listener to.
pub(crate) trait ReadySource {
    fn attach(&self, listener: DataReadyFn) -> ListenerId;
    fn detach(&self, id: ListenerId);
}

impl ReadySource for ObjectStream {
    fn attach(&self, listener: DataReadyFn) -> ListenerId {
        ObjectStream::attach(self, listener)
    }

    fn detach(&self, id: ListenerId) {
        ObjectStream::detach(self, id)
    }
}

struct RelayState {
    subscribers: Vec<(SubscriptionId, DataReadyFn)>,
    next_id: u64,
}

/// Subscriber-count-gated forwarding of a channel's data-ready signal.
///
/// The reader never holds a listener registration on its channel unless it
/// has at least one subscriber of its own: the first subscription attaches
/// one forwarding listener, removing the last subscriber detaches it. This
/// keeps the channel from retaining otherwise-collectible readers.
pub(crate) struct DataReadyRelay {
    state: Arc<Mutex<RelayState>>,
    attached: Option<ListenerId>,
}

impl DataReadyRelay {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RelayState {
                subscribers: Vec::new(),
                next_id: 0,
            })),
            attached: None,
        }
    }

    pub(crate) fn subscribe(
        &mut self,
        source: &dyn ReadySource,
        listener: Box<dyn Fn() + Send + Sync>,
    ) -> SubscriptionId {
        let id = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let id = SubscriptionId(state.next_id);
            state.next_id += 1;
            state.subscribers.push((id, Arc::from(listener)));
            id
        };
        if self.attached.is_none() {
            let relay = Arc::clone(&self.state);
            self.attached = Some(source.attach(Arc::new(move || {
                // Snapshot under the lock, invoke outside it: a subscriber
                // may re-enter the reader's subscription methods.
                let subscribers: Vec<DataReadyFn> = relay
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .subscribers
                    .iter()
                    .map(|(_, f)| Arc::clone(f))
                    .collect();
                for subscriber in &subscribers {
                    subscriber();
                }
            })));
        }
        id
    }

    pub(crate) fn unsubscribe(&mut self, source: &dyn ReadySource, id: SubscriptionId) {
        let empty = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.subscribers.retain(|(sid, _)| *sid != id);
            state.subscribers.is_empty()
        };
        if empty {
            if let Some(token) = self.attached.take() {
                source.detach(token);
            }
        }
    }

    pub(crate) fn detach_all(&mut self, source: &dyn ReadySource) {
        if let Some(token) = self.attached.take() {
            source.detach(token);
        }
    }
}

/// The uniform operation set over every reader adapter.
///
/// Operations a given adapter cannot support structurally return
/// [`ReaderError::Unsupported`]; everything else follows the semantics of
/// the channel underneath.
pub trait PipelineReader {
    type Item;

    /// Read the next item, blocking until one arrives. `None` only at end
    /// of pipeline.
    fn read(&mut self) -> Option<Self::Item>;

    /// Read up to `count` items, blocking until that many have arrived or
    /// the pipeline ends.
    fn read_up_to(&mut self, count: usize) -> Result<Vec<Self::Item>, ReaderError>;

    /// Block until end of pipeline and return everything remaining.
    fn read_to_end(&mut self) -> Result<Vec<Self::Item>, ReaderError>;

    /// Take up to `max` currently-available items without waiting for
    /// arrivals. Returns whatever was collected, possibly empty.
    fn try_read(&mut self, max: usize) -> Vec<Self::Item>;

    /// [`try_read`](Self::try_read) with no bound.
    fn try_read_all(&mut self) -> Vec<Self::Item> {
        self.try_read(usize::MAX)
    }

    /// The next item without consuming it, or `None` when nothing is
    /// buffered.
    fn peek(&mut self) -> Result<Option<Self::Item>, ReaderError>;

    /// Items currently buffered in the underlying channel.
    fn count(&self) -> usize;

    /// Maximum items the underlying channel holds at one time.
    fn capacity(&self) -> usize;

    /// True while the underlying channel accepts writes.
    fn is_open(&self) -> bool;

    /// True once the underlying channel is closed and this reader has no
    /// more data to deliver. Terminal.
    fn end_of_pipeline(&self) -> bool;

    /// Close the underlying channel. Idempotent; also invoked on drop.
    fn close(&mut self);

    /// Register a data-ready callback. The first subscription lazily
    /// attaches this reader to the channel's readiness signal.
    fn subscribe_data_ready(&mut self, listener: Box<dyn Fn() + Send + Sync>) -> SubscriptionId;

    /// Remove a data-ready callback. Removing the last one detaches the
    /// reader from the channel.
    fn unsubscribe_data_ready(&mut self, id: SubscriptionId);
}

/// Reader over an [`ObjectStream`], parameterized by element transform.
pub struct StreamReader<T: Transform> {
    stream: ObjectStream,
    relay: DataReadyRelay,
    _transform: PhantomData<T>,
}

/// Reader returning raw stream values.
pub type ObjectReader = StreamReader<Raw>;

/// Reader returning uniformly wrapped records.
pub type RecordReader = StreamReader<AsRecord>;

impl<T: Transform> StreamReader<T> {
    /// Wrap an existing stream. The reader owns the close obligation from
    /// here on: dropping it closes the stream.
    pub fn new(stream: ObjectStream) -> Self {
        Self {
            stream,
            relay: DataReadyRelay::new(),
            _transform: PhantomData,
        }
    }

    /// Waitable readiness handle of the underlying stream, for external
    /// wait loops that need to race data arrival against a timer.
    pub fn data_ready_handle(&self) -> DataReadyHandle {
        self.stream.data_ready_handle()
    }
}

impl<T: Transform> PipelineReader for StreamReader<T> {
    type Item = T::Output;

    fn read(&mut self) -> Option<T::Output> {
        self.stream.read().map(T::apply)
    }

    fn read_up_to(&mut self, count: usize) -> Result<Vec<T::Output>, ReaderError> {
        Ok(self
            .stream
            .read_up_to(count)
            .into_iter()
            .map(T::apply)
            .collect())
    }

    fn read_to_end(&mut self) -> Result<Vec<T::Output>, ReaderError> {
        Ok(self
            .stream
            .read_to_end()
            .into_iter()
            .map(T::apply)
            .collect())
    }

    fn try_read(&mut self, max: usize) -> Vec<T::Output> {
        self.stream.try_read(max).into_iter().map(T::apply).collect()
    }

    fn peek(&mut self) -> Result<Option<T::Output>, ReaderError> {
        Ok(self.stream.peek().map(T::apply))
    }

    fn count(&self) -> usize {
        self.stream.count()
    }

    fn capacity(&self) -> usize {
        self.stream.capacity()
    }

    fn is_open(&self) -> bool {
        self.stream.is_open()
    }

    fn end_of_pipeline(&self) -> bool {
        self.stream.end_of_pipeline()
    }

    fn close(&mut self) {
        self.stream.close();
    }

    fn subscribe_data_ready(&mut self, listener: Box<dyn Fn() + Send + Sync>) -> SubscriptionId {
        self.relay.subscribe(&self.stream, listener)
    }

    fn unsubscribe_data_ready(&mut self, id: SubscriptionId) {
        self.relay.unsubscribe(&self.stream, id)
    }
}

impl<T: Transform> Drop for StreamReader<T> {
    fn drop(&mut self) {
        self.relay.detach_all(&self.stream);
        self.stream.close();
    }
}
