//! Per-key sliding windows with incrementally maintained occurrence histograms.
//!
//! Every key owns a fixed-capacity window of its most recent observations and a
//! histogram counting how often each value appears in that window. Advancing a
//! key only touches the evicted value and the new value, so the histogram is
//! never rebuilt by rescanning the window.

use crate::config::ConfigError;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use thiserror::Error;

/// Advance was requested for a key that is not tracked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown key: '{0}'")]
pub struct UnknownKeyError(pub String);

/// Errors from operations that both resolve a key and validate a capacity.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    UnknownKey(#[from] UnknownKeyError),
}

/// Result of advancing a key's window by one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance<V> {
    /// Oldest value, pushed out of the window by this observation
    pub evicted: V,
    /// Most frequent value in the window after the update
    pub mode: V,
}

/// Occurrence counts for the values currently inside one window.
///
/// Entries are dropped when their count reaches zero, but every value keeps
/// the position it was first seen at, so a value that leaves and re-enters the
/// window wins the same ties it won before. The current mode is maintained on
/// every update; a full scan happens only when the mode's own count drops.
#[derive(Debug, Clone)]
pub struct Histogram<V> {
    counts: HashMap<V, usize>,
    first_seen: HashMap<V, u64>,
    next_seq: u64,
    mode: Option<V>,
}

impl<V: Eq + Hash + Clone> Histogram<V> {
    fn filled(value: V, count: usize) -> Self {
        let mut histogram = Self {
            counts: HashMap::new(),
            first_seen: HashMap::new(),
            next_seq: 0,
            mode: None,
        };
        if count > 0 {
            histogram.first_seen.insert(value.clone(), 0);
            histogram.counts.insert(value.clone(), count);
            histogram.next_seq = 1;
            histogram.mode = Some(value);
        }
        histogram
    }

    /// Number of occurrences of `value` in the window.
    pub fn count(&self, value: &V) -> usize {
        self.counts.get(value).copied().unwrap_or(0)
    }

    /// Sum of all counts. Always equals the window capacity.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Number of distinct values with a positive count.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Entries with a positive count, in tie-break order (first seen first).
    pub fn entries(&self) -> Vec<(&V, usize)> {
        let mut entries: Vec<(&V, usize)> = self.counts.iter().map(|(v, c)| (v, *c)).collect();
        entries.sort_by_key(|(value, _)| self.seq(value));
        entries
    }

    /// The value with the highest count; among equal counts the one seen first.
    pub fn mode(&self) -> Option<&V> {
        self.mode.as_ref()
    }

    fn seq(&self, value: &V) -> u64 {
        self.first_seen.get(value).copied().unwrap_or(u64::MAX)
    }

    /// Whether `a` wins over `b`: higher count, then earlier first sighting.
    fn outranks(&self, a: &V, b: &V) -> bool {
        match self.count(a).cmp(&self.count(b)) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.seq(a) < self.seq(b),
        }
    }

    fn increment(&mut self, value: V) {
        if !self.first_seen.contains_key(&value) {
            self.first_seen.insert(value.clone(), self.next_seq);
            self.next_seq += 1;
        }
        *self.counts.entry(value.clone()).or_insert(0) += 1;

        // Only the incremented value can overtake the current mode
        let overtakes = match self.mode {
            Some(ref mode) => *mode != value && self.outranks(&value, mode),
            None => true,
        };
        if overtakes {
            self.mode = Some(value);
        }
    }

    fn decrement(&mut self, value: &V) {
        let emptied = match self.counts.get_mut(value) {
            Some(count) => {
                *count -= 1;
                *count == 0
            }
            None => {
                debug_assert!(false, "decrement of a value absent from the histogram");
                return;
            }
        };
        if emptied {
            self.counts.remove(value);
        }
        if self.mode.as_ref() == Some(value) {
            self.mode = self.rescan();
        }
    }

    fn rescan(&self) -> Option<V> {
        self.counts
            .iter()
            .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then(self.seq(b).cmp(&self.seq(a))))
            .map(|(value, _)| value.clone())
    }
}

#[derive(Debug, Clone)]
struct KeyWindow<V> {
    values: VecDeque<V>,
    histogram: Histogram<V>,
}

impl<V: Eq + Hash + Clone + Default> KeyWindow<V> {
    fn new(capacity: usize) -> Self {
        Self {
            values: std::iter::repeat(V::default()).take(capacity).collect(),
            histogram: Histogram::filled(V::default(), capacity),
        }
    }

    fn advance(&mut self, value: V) -> Advance<V> {
        let evicted = self.values.pop_front().unwrap_or_default();
        self.values.push_back(value.clone());

        // Same value in and out: counts and mode are unchanged
        if evicted != value {
            self.histogram.increment(value);
            self.histogram.decrement(&evicted);
        }

        let mode = self.histogram.mode().cloned().unwrap_or_default();
        Advance { evicted, mode }
    }
}

/// Fixed-capacity observation windows for a fixed set of keys.
///
/// Windows start filled with `V::default()`, the "absent" sentinel, so every
/// key reports the sentinel as its mode until enough real observations arrive.
#[derive(Debug, Clone)]
pub struct WindowStore<V> {
    keys: Vec<String>,
    windows: HashMap<String, KeyWindow<V>>,
}

impl<V: Eq + Hash + Clone + Default> WindowStore<V> {
    /// Create windows for `keys`, sized from `capacity_by_key` or `default_capacity`.
    pub fn new(
        keys: &[String],
        capacity_by_key: &HashMap<String, usize>,
        default_capacity: usize,
    ) -> Result<Self, ConfigError> {
        if keys.is_empty() {
            return Err(ConfigError::EmptyKeys);
        }
        check_capacity("default", default_capacity)?;
        for (key, &capacity) in capacity_by_key {
            check_capacity(key, capacity)?;
        }

        let mut windows = HashMap::with_capacity(keys.len());
        for key in keys {
            let capacity = capacity_by_key
                .get(key)
                .copied()
                .unwrap_or(default_capacity);
            if windows.insert(key.clone(), KeyWindow::new(capacity)).is_some() {
                return Err(ConfigError::DuplicateKey(key.clone()));
            }
        }

        Ok(Self {
            keys: keys.to_vec(),
            windows,
        })
    }

    /// Push `value` into the key's window and return the evicted value and new mode.
    pub fn advance(&mut self, key: &str, value: V) -> Result<Advance<V>, UnknownKeyError> {
        let window = self
            .windows
            .get_mut(key)
            .ok_or_else(|| UnknownKeyError(key.to_string()))?;
        Ok(window.advance(value))
    }

    /// Discard a key's history and recreate its window at a new capacity.
    pub fn rebuild(&mut self, key: &str, capacity: usize) -> Result<(), TrackerError> {
        check_capacity(key, capacity)?;
        let window = self
            .windows
            .get_mut(key)
            .ok_or_else(|| UnknownKeyError(key.to_string()))?;
        *window = KeyWindow::new(capacity);
        Ok(())
    }

    /// Tracked keys in configured order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.windows.contains_key(key)
    }

    pub fn capacity(&self, key: &str) -> Option<usize> {
        self.windows.get(key).map(|w| w.values.len())
    }

    /// The key's window, oldest value first.
    pub fn window(&self, key: &str) -> Option<&VecDeque<V>> {
        self.windows.get(key).map(|w| &w.values)
    }

    pub fn histogram(&self, key: &str) -> Option<&Histogram<V>> {
        self.windows.get(key).map(|w| &w.histogram)
    }

    /// Current mode of the key's window.
    pub fn mode(&self, key: &str) -> Option<&V> {
        self.windows.get(key).and_then(|w| w.histogram.mode())
    }
}

fn check_capacity(scope: &str, capacity: usize) -> Result<(), ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::InvalidCapacity {
            scope: scope.to_string(),
            capacity: 0,
        });
    }
    Ok(())
}
