//! Session statistics for the tensor smoother.
//!
//! Counts batches, mode changes and publish outcomes so an operator can see
//! what a running smoother has done.

pub mod session;

// Re-export commonly used types
pub use session::{
    create_shared_stats, create_shared_stats_with_persistence, read_persisted, PersistedStats,
    SessionStats, SharedSessionStats, StatsSnapshot,
};
