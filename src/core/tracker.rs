//! Debounced mode reporting on top of [`WindowStore`].
//!
//! The tracker advances every configured key once per observation batch and
//! reports only the keys whose smoothed value differs from what was last
//! announced.

use crate::config::ConfigError;
use crate::core::window_store::{TrackerError, WindowStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// A key whose reported value changed during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta<V> {
    pub key: String,
    pub value: V,
}

impl<V> Delta<V> {
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// What a tick asks the publisher to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification<V> {
    /// One message per changed key
    Deltas(Vec<Delta<V>>),
    /// The full reported state, in configured-key order
    Snapshot(Vec<Delta<V>>),
}

impl<V> Notification<V> {
    pub fn entries(&self) -> &[Delta<V>] {
        match self {
            Notification::Deltas(entries) | Notification::Snapshot(entries) => entries,
        }
    }
}

/// Validated inputs for building a [`ModeTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Tracked keys, in reporting order
    pub keys: Vec<String>,
    /// Window capacity for keys without an override
    pub default_capacity: usize,
    /// Per-key window capacities
    pub capacity_overrides: HashMap<String, usize>,
    /// Publish the full snapshot instead of individual deltas
    pub combine_notifications: bool,
}

impl TrackerConfig {
    pub fn new<I, K>(keys: I, default_capacity: usize) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            default_capacity,
            capacity_overrides: HashMap::new(),
            combine_notifications: false,
        }
    }

    /// Override the window capacity of one key.
    pub fn with_capacity(mut self, key: impl Into<String>, capacity: usize) -> Self {
        self.capacity_overrides.insert(key.into(), capacity);
        self
    }

    pub fn combined(mut self, combine_notifications: bool) -> Self {
        self.combine_notifications = combine_notifications;
        self
    }
}

/// Turns observation batches into change notifications.
///
/// Not internally synchronized: callers apply one batch at a time.
#[derive(Debug, Clone)]
pub struct ModeTracker<V> {
    keys: Vec<String>,
    store: WindowStore<V>,
    reported: HashMap<String, V>,
    combine_notifications: bool,
    ticks: u64,
}

impl<V> ModeTracker<V>
where
    V: Eq + Hash + Clone + Default + std::fmt::Debug,
{
    pub fn new(config: &TrackerConfig) -> Result<Self, ConfigError> {
        let store = WindowStore::new(
            &config.keys,
            &config.capacity_overrides,
            config.default_capacity,
        )?;
        let reported = config
            .keys
            .iter()
            .map(|key| (key.clone(), V::default()))
            .collect();

        tracing::debug!(
            keys = config.keys.len(),
            default_capacity = config.default_capacity,
            combine = config.combine_notifications,
            "mode tracker initialized"
        );

        Ok(Self {
            keys: config.keys.clone(),
            store,
            reported,
            combine_notifications: config.combine_notifications,
            ticks: 0,
        })
    }

    /// Apply one observation batch and return the keys whose mode changed.
    ///
    /// Every configured key advances, keys absent from `batch` observe the
    /// default value. Batch entries for unknown keys are ignored.
    pub fn observe(&mut self, batch: &HashMap<String, V>) -> Vec<Delta<V>> {
        self.ticks += 1;
        let mut deltas = Vec::new();
        let mut matched = 0;

        for key in &self.keys {
            let value = match batch.get(key) {
                Some(value) => {
                    matched += 1;
                    value.clone()
                }
                None => V::default(),
            };

            let advance = match self.store.advance(key, value) {
                Ok(advance) => advance,
                Err(e) => {
                    tracing::error!(error = %e, "configured key missing from window store");
                    continue;
                }
            };

            if let Some(reported) = self.reported.get_mut(key) {
                if *reported != advance.mode {
                    tracing::debug!(key = %key, from = ?reported, to = ?advance.mode, "mode changed");
                    *reported = advance.mode.clone();
                    deltas.push(Delta::new(key.clone(), advance.mode));
                }
            }
        }

        if batch.len() > matched {
            tracing::debug!(
                ignored = batch.len() - matched,
                "batch contained unconfigured keys"
            );
        }

        deltas
    }

    /// Package the deltas of one tick according to the batching policy.
    pub fn notification(&self, deltas: Vec<Delta<V>>) -> Option<Notification<V>> {
        if deltas.is_empty() {
            None
        } else if self.combine_notifications {
            Some(Notification::Snapshot(self.snapshot()))
        } else {
            Some(Notification::Deltas(deltas))
        }
    }

    /// Observe a batch and return the notification to publish, if any.
    pub fn tick(&mut self, batch: &HashMap<String, V>) -> Option<Notification<V>> {
        let deltas = self.observe(batch);
        self.notification(deltas)
    }

    /// The full reported state in configured-key order.
    pub fn snapshot(&self) -> Vec<Delta<V>> {
        self.keys
            .iter()
            .map(|key| {
                let value = self.reported.get(key).cloned().unwrap_or_default();
                Delta::new(key.clone(), value)
            })
            .collect()
    }

    /// Last value announced for `key`.
    pub fn reported(&self, key: &str) -> Option<&V> {
        self.reported.get(key)
    }

    /// Rebuild one key's window at a new capacity. The reported value is kept,
    /// so the next tick announces the return to the default if it differs.
    pub fn rebuild(&mut self, key: &str, capacity: usize) -> Result<(), TrackerError> {
        self.store.rebuild(key, capacity)?;
        tracing::info!(key = %key, capacity, "window rebuilt");
        Ok(())
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn store(&self) -> &WindowStore<V> {
        &self.store
    }

    pub fn combines_notifications(&self) -> bool {
        self.combine_notifications
    }

    /// Number of batches observed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
