//! Observation input for the tensor smoother.
//!
//! Batches arrive as newline-delimited JSON objects mapping a class name to
//! its detected count for that tick.

pub mod lines;
pub mod types;

// Re-export commonly used types
pub use lines::{LineSource, DEFAULT_BUFFER};
pub use types::{parse_counts, Observation, SourceError};
