//! Object streams for husk pipelines — a bounded channel of structured
//! values plus the family of reader adapters that consume it.
//!
//! Unlike a byte pipe, a pipeline stream carries heterogeneous
//! `husk_types::Value`s between command stages, with blocking writes on a
//! full buffer and both blocking and non-blocking reads:
//!
//! ```text
//!   producer ──▶ [ObjectStream: VecDeque<Value>] ──▶ ObjectReader ──▶ consumer
//!                ├── writer blocks when full (backpressure)            (raw values)
//!                ├── reader blocks when empty             ──▶ RecordReader
//!                ├── close() → drain → end of pipeline         (wrapped records)
//!                └── data-ready listeners + waitable handle
//!
//!   producer ──▶ [SharedBuffer]  ──▶ SharedReader  (stable cursor, per-reader view)
//!                               ──▶ RemoteReader  (destructive, at-most-once,
//!                                                  tagged with origin + run id)
//! ```
//!
//! Locks are `std::sync::Mutex` + `Condvar` — critical sections are just
//! VecDeque operations, and every wait rechecks its predicate in a loop so
//! wakeups are never lost. Nothing here needs an async runtime: writers and
//! readers are plain threads, and callers wanting a bounded wait race the
//! [`DataReadyHandle`] against their own timer.

pub mod error;
pub mod reader;
pub mod shared;
pub mod stream;

pub use error::{ReaderError, StreamError};
pub use reader::{
    AsRecord, ObjectReader, PipelineReader, Raw, RecordReader, StreamReader, SubscriptionId,
    Transform,
};
pub use shared::{
    BufferReadyHandle, RemoteObjectReader, RemoteReader, RemoteRecordReader, SharedBuffer,
    SharedCursor, SharedObjectReader, SharedReader, SharedRecordReader,
};
pub use stream::{
    DataReadyFn, DataReadyHandle, ListenerId, ObjectStream, DEFAULT_STREAM_CAPACITY,
};
