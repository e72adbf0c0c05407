//! Counters describing what the smoother did during a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Session statistics, safe to share between the source thread and the
/// dispatch loop.
#[derive(Debug)]
pub struct SessionStats {
    /// Number of observation batches applied
    batches_observed: AtomicU64,
    /// Number of per-key mode changes detected
    deltas_produced: AtomicU64,
    /// Number of messages handed to the transport successfully
    messages_published: AtomicU64,
    /// Number of messages the transport rejected
    publish_failures: AtomicU64,
    /// Number of input lines that could not be parsed
    rejected_lines: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            batches_observed: AtomicU64::new(0),
            deltas_produced: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            rejected_lines: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that accumulate on top of the totals stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous session stats: {e}");
        }

        stats
    }

    pub fn record_batch(&self) {
        self.batches_observed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deltas(&self, count: u64) {
        self.deltas_produced.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_line(&self) {
        self.rejected_lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            batches_observed: self.batches_observed.load(Ordering::Relaxed),
            deltas_produced: self.deltas_produced.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            rejected_lines: self.rejected_lines.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Batches observed: {}\n\
             - Mode changes: {}\n\
             - Messages published: {}\n\
             - Publish failures: {}\n\
             - Rejected input lines: {}\n\
             - Session duration: {} seconds",
            stats.batches_observed,
            stats.deltas_produced,
            stats.messages_published,
            stats.publish_failures,
            stats.rejected_lines,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                batches_observed: stats.batches_observed,
                deltas_produced: stats.deltas_produced,
                messages_published: stats.messages_published,
                publish_failures: stats.publish_failures,
                rejected_lines: stats.rejected_lines,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let persisted = read_persisted(path)?;

                self.batches_observed
                    .store(persisted.batches_observed, Ordering::Relaxed);
                self.deltas_produced
                    .store(persisted.deltas_produced, Ordering::Relaxed);
                self.messages_published
                    .store(persisted.messages_published, Ordering::Relaxed);
                self.publish_failures
                    .store(persisted.publish_failures, Ordering::Relaxed);
                self.rejected_lines
                    .store(persisted.rejected_lines, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.batches_observed.store(0, Ordering::Relaxed);
        self.deltas_produced.store(0, Ordering::Relaxed);
        self.messages_published.store(0, Ordering::Relaxed);
        self.publish_failures.store(0, Ordering::Relaxed);
        self.rejected_lines.store(0, Ordering::Relaxed);
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub batches_observed: u64,
    pub deltas_produced: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub rejected_lines: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedStats {
    pub batches_observed: u64,
    pub deltas_produced: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub rejected_lines: u64,
    pub last_updated: DateTime<Utc>,
}

/// Read totals saved by a previous session.
pub fn read_persisted(path: &std::path::Path) -> Result<PersistedStats, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(std::io::Error::other)
}

/// Thread-safe shared session stats.
pub type SharedSessionStats = Arc<SessionStats>;

pub fn create_shared_stats() -> SharedSessionStats {
    Arc::new(SessionStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedSessionStats {
    Arc::new(SessionStats::with_persistence(path))
}
