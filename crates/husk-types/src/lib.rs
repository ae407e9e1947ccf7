//! Pure data types for husk — pipeline values and the uniform record wrapper.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It
//! exists so that consumers (formatters, aggregators, external tools) can
//! work with husk's value system without pulling in the pipeline machinery.

pub mod record;
pub mod value;

// Flat re-exports for convenience
pub use record::*;
pub use value::*;
