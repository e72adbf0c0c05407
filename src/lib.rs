//! Tensor Smoother - debounced sliding-window mode tracking for detection counts.
//!
//! An object detector reports, at a fixed cadence, how many instances of each
//! class ("tensor") it sees. Raw counts flicker from frame to frame; this
//! library reports for each class the most frequent count over its last N
//! observations, and only when that smoothed value changes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Tensor Smoother                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Source    │──▶│ ModeTracker │──▶│ Dispatcher  │──▶ bus│
//! │  │ (JSON lines)│   │ (windows +  │   │ (payloads)  │       │
//! │  └─────────────┘   │ histograms) │   └─────────────┘       │
//! │         │          └─────────────┘          │              │
//! │         ▼                                   ▼              │
//! │  ┌─────────────────────────────────────────────────┐       │
//! │  │                  Session stats                  │       │
//! │  └─────────────────────────────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use tensor_smoother::core::{Delta, ModeTracker, TrackerConfig};
//!
//! let mut tracker: ModeTracker<i64> =
//!     ModeTracker::new(&TrackerConfig::new(["person"], 3)).unwrap();
//!
//! let batch: HashMap<String, i64> = [("person".to_string(), 2)].into_iter().collect();
//! assert!(tracker.observe(&batch).is_empty());
//! assert_eq!(tracker.observe(&batch), vec![Delta::new("person", 2)]);
//! ```

pub mod config;
pub mod core;
pub mod publish;
pub mod source;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{
    Delta, ModeTracker, Notification, TrackerConfig, TrackerError, UnknownKeyError, WindowStore,
};
pub use publish::{Dispatcher, Message, PublishError, Publisher};
pub use source::{LineSource, Observation, SourceError};
pub use stats::{SessionStats, SharedSessionStats};

#[cfg(feature = "gateway")]
pub use publish::{BlockingHttpPublisher, HttpConfig, HttpPublisher};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
