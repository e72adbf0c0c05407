//! Line-delimited JSON observation source.
//!
//! Reads one observation object per line on a background thread and hands
//! parsed batches to the dispatch loop over a channel.

use crate::source::types::{Observation, SourceError};
use crate::stats::SharedSessionStats;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Default number of parsed batches buffered between reader and consumer.
pub const DEFAULT_BUFFER: usize = 1_024;

pub struct LineSource {
    sender: Option<Sender<Observation>>,
    receiver: Receiver<Observation>,
    running: Arc<AtomicBool>,
    stats: Option<SharedSessionStats>,
    handle: Option<JoinHandle<()>>,
}

impl LineSource {
    pub fn new(buffer: usize) -> Self {
        let (sender, receiver) = bounded(buffer);
        Self {
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            stats: None,
            handle: None,
        }
    }

    /// Count rejected lines in `stats`.
    pub fn with_stats(mut self, stats: SharedSessionStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Start reading from `reader`.
    ///
    /// A source reads a single stream; once it ends, the receiver reports
    /// disconnection.
    pub fn start<R>(&mut self, reader: R) -> Result<(), SourceError>
    where
        R: BufRead + Send + 'static,
    {
        let sender = self.sender.take().ok_or(SourceError::AlreadyStarted)?;
        let running = self.running.clone();
        let stats = self.stats.clone();
        running.store(true, Ordering::SeqCst);

        self.handle = Some(std::thread::spawn(move || {
            read_lines(reader, &sender, &running, stats.as_deref());
            running.store(false, Ordering::SeqCst);
        }));
        Ok(())
    }

    /// Stop forwarding observations. Lines read after this are dropped.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the reader thread is still forwarding observations.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for observations.
    pub fn receiver(&self) -> &Receiver<Observation> {
        &self.receiver
    }

    /// Try to receive an observation without blocking.
    pub fn try_recv(&self) -> Option<Observation> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the reader thread to finish.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("observation reader thread panicked");
            }
        }
    }
}

impl Default for LineSource {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

fn read_lines<R: BufRead>(
    reader: R,
    sender: &Sender<Observation>,
    running: &AtomicBool,
    stats: Option<&crate::stats::SessionStats>,
) {
    for (index, line) in reader.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("failed to read observation input: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match Observation::parse_line(line) {
            Ok(observation) => {
                if sender.send(observation).is_err() {
                    // Consumer went away
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(line = index + 1, "skipping observation: {e}");
                if let Some(stats) = stats {
                    stats.record_rejected_line();
                }
            }
        }
    }
    tracing::debug!("observation input exhausted");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::create_shared_stats;
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn test_reads_until_end_of_input() {
        let input = "{\"A\": 1}\n\n{\"A\": 2, \"B\": 3}\n";
        let mut source = LineSource::new(8);
        source.start(Cursor::new(input)).unwrap();

        let first = source.receiver().recv_timeout(Duration::from_secs(1)).unwrap();
        let second = source.receiver().recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.counts.get("A"), Some(&1));
        assert_eq!(second.counts.get("B"), Some(&3));

        source.join();
        assert!(!source.is_running());
        assert!(source.receiver().recv().is_err());
    }

    #[test]
    fn test_bad_lines_are_counted_and_skipped() {
        let stats = create_shared_stats();
        let input = "{\"A\": 1}\nnot json\n{\"A\": \"x\"}\n{\"A\": 4}\n";
        let mut source = LineSource::new(8).with_stats(stats.clone());
        source.start(Cursor::new(input)).unwrap();
        source.join();

        let counts: Vec<i64> = source
            .receiver()
            .try_iter()
            .map(|o| o.counts["A"])
            .collect();
        assert_eq!(counts, vec![1, 4]);
        assert_eq!(stats.snapshot().rejected_lines, 2);
    }

    #[test]
    fn test_cannot_start_twice() {
        let mut source = LineSource::new(1);
        source.start(Cursor::new("")).unwrap();
        assert_eq!(
            source.start(Cursor::new("")),
            Err(SourceError::AlreadyStarted)
        );
    }
}
