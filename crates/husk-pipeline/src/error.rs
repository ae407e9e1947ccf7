//! Error types for pipeline streams and readers.

use thiserror::Error;

/// Error writing into a pipeline stream or shared buffer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    /// The stream was closed before the write. Writes after close fail
    /// immediately — they never block.
    #[error("object stream is closed")]
    Closed,
}

/// Error from a reader operation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReaderError {
    /// The operation is structurally incompatible with this reader
    /// (bulk reads and peek on a single-advance cursor). Retrying
    /// will never succeed.
    #[error("{0} is not supported by this reader")]
    Unsupported(&'static str),
}
