//! Core smoothing logic.
//!
//! This module contains:
//! - Per-key observation windows with incremental occurrence histograms
//! - The debounced mode tracker that turns batches into change notifications

pub mod tracker;
pub mod window_store;

// Re-export commonly used types
pub use tracker::{Delta, ModeTracker, Notification, TrackerConfig};
pub use window_store::{Advance, Histogram, TrackerError, UnknownKeyError, WindowStore};
