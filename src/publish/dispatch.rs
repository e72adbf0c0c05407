//! Turns tracker notifications into published messages.

use crate::core::Notification;
use crate::publish::payload::{format_delta, format_snapshot};
use crate::publish::{Message, PublishError, Publisher};
use crate::stats::SharedSessionStats;
use chrono::Utc;
use serde::Serialize;
use std::fmt::Display;

/// Outcome of dispatching one notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub published: usize,
    pub failed: usize,
}

/// Formats notifications for a topic and sends them through a publisher.
pub struct Dispatcher<P> {
    publisher: P,
    name: String,
    topic: String,
    client_id: String,
    stats: Option<SharedSessionStats>,
}

impl<P: Publisher> Dispatcher<P> {
    pub fn new(
        publisher: P,
        name: impl Into<String>,
        topic: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            name: name.into(),
            topic: topic.into(),
            client_id: client_id.into(),
            stats: None,
        }
    }

    /// Count published and failed messages in `stats`.
    pub fn with_stats(mut self, stats: SharedSessionStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Render a notification into the messages it produces.
    ///
    /// Individual deltas become one message each; a snapshot becomes a
    /// single message.
    pub fn messages<V>(&self, notification: &Notification<V>) -> Result<Vec<Message>, PublishError>
    where
        V: Display + Serialize,
    {
        let payloads: Vec<String> = match notification {
            Notification::Deltas(deltas) => deltas
                .iter()
                .map(|delta| format_delta(&self.name, delta))
                .collect(),
            Notification::Snapshot(entries) => vec![format_snapshot(entries)?],
        };

        let published_at = Utc::now();
        Ok(payloads
            .into_iter()
            .map(|payload| Message {
                client_id: self.client_id.clone(),
                topic: self.topic.clone(),
                payload,
                published_at,
            })
            .collect())
    }

    /// Publish a notification. Failures are logged and counted, not retried.
    ///
    /// A notification that cannot be rendered counts as one failed message.
    pub fn dispatch<V>(&mut self, notification: &Notification<V>) -> DispatchReport
    where
        V: Display + Serialize,
    {
        let mut report = DispatchReport::default();

        let messages = match self.messages(notification) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!(topic = %self.topic, "dropping notification: {e}");
                self.record_failure(&mut report);
                return report;
            }
        };

        for message in messages {
            match self.publisher.publish(&message) {
                Ok(()) => {
                    report.published += 1;
                    if let Some(ref stats) = self.stats {
                        stats.record_published();
                    }
                }
                Err(e) => {
                    tracing::warn!(topic = %message.topic, "publish failed: {e}");
                    self.record_failure(&mut report);
                }
            }
        }

        report
    }

    fn record_failure(&self, report: &mut DispatchReport) {
        report.failed += 1;
        if let Some(ref stats) = self.stats {
            stats.record_publish_failure();
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Delta;
    use crate::publish::ChannelPublisher;
    use serde::ser::Error as _;
    use std::fmt;
    use crate::stats::create_shared_stats;

    struct FailingPublisher;

    impl Publisher for FailingPublisher {
        fn publish(&mut self, _message: &Message) -> Result<(), PublishError> {
            Err(PublishError::Transport("connection refused".to_string()))
        }
    }

    /// Value that displays fine but refuses to serialize.
    struct Opaque;

    impl fmt::Display for Opaque {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("opaque")
        }
    }

    impl Serialize for Opaque {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("opaque values cannot be serialized"))
        }
    }

    #[test]
    fn test_one_message_per_delta() {
        let (publisher, receiver) = ChannelPublisher::channel();
        let mut dispatcher = Dispatcher::new(publisher, "cam1", "testml/", "client");

        let report = dispatcher.dispatch(&Notification::Deltas(vec![
            Delta::new("person", 2),
            Delta::new("dog", 1),
        ]));
        assert_eq!(report, DispatchReport { published: 2, failed: 0 });

        let payloads: Vec<String> = receiver.try_iter().map(|m| m.payload).collect();
        assert_eq!(payloads, vec!["cam1_person=2", "cam1_dog=1"]);
    }

    #[test]
    fn test_snapshot_is_single_message() {
        let (publisher, receiver) = ChannelPublisher::channel();
        let mut dispatcher = Dispatcher::new(publisher, "cam1", "testml/", "client");

        dispatcher.dispatch(&Notification::Snapshot(vec![
            Delta::new("A", 3),
            Delta::new("B", 0),
        ]));

        let messages: Vec<Message> = receiver.try_iter().collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, r#"{"A":3,"B":0}"#);
        assert_eq!(messages[0].topic, "testml/");
        assert_eq!(messages[0].client_id, "client");
    }

    #[test]
    fn test_failures_are_counted_not_retried() {
        let stats = create_shared_stats();
        let mut dispatcher =
            Dispatcher::new(FailingPublisher, "cam1", "testml/", "client").with_stats(stats.clone());

        let report = dispatcher.dispatch(&Notification::Deltas(vec![
            Delta::new("A", 1),
            Delta::new("B", 1),
        ]));

        assert_eq!(report, DispatchReport { published: 0, failed: 2 });
        assert_eq!(stats.snapshot().publish_failures, 2);
        assert_eq!(stats.snapshot().messages_published, 0);
    }

    #[test]
    fn test_unrenderable_snapshot_counts_as_failure() {
        let stats = create_shared_stats();
        let (publisher, receiver) = ChannelPublisher::channel();
        let mut dispatcher =
            Dispatcher::new(publisher, "cam1", "testml/", "client").with_stats(stats.clone());

        let report = dispatcher.dispatch(&Notification::Snapshot(vec![Delta::new("A", Opaque)]));

        assert_eq!(report, DispatchReport { published: 0, failed: 1 });
        assert_eq!(stats.snapshot().publish_failures, 1);
        assert!(receiver.try_recv().is_err());

        // Per-delta payloads only need Display
        let report = dispatcher.dispatch(&Notification::Deltas(vec![Delta::new("A", Opaque)]));
        assert_eq!(report, DispatchReport { published: 1, failed: 0 });
        assert_eq!(receiver.try_recv().unwrap().payload, "cam1_A=opaque");
    }
}
