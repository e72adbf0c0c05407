//! In-process transports.

use crate::publish::{Message, PublishError, Publisher};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::{Stdout, Write};

/// Writes each message as a line, e.g. for piping into another tool.
pub struct LogPublisher<W = Stdout> {
    writer: W,
}

impl LogPublisher<Stdout> {
    pub fn stdout() -> Self {
        Self {
            writer: std::io::stdout(),
        }
    }
}

impl<W: Write> LogPublisher<W> {
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Publisher for LogPublisher<W> {
    fn publish(&mut self, message: &Message) -> Result<(), PublishError> {
        tracing::debug!(topic = %message.topic, payload = %message.payload, "publish");
        writeln!(
            self.writer,
            "[{}] {} {}",
            message.published_at.format("%H:%M:%S"),
            message.topic,
            message.payload
        )
        .and_then(|_| self.writer.flush())
        .map_err(|e| PublishError::Transport(e.to_string()))
    }
}

/// Forwards messages to an in-process consumer.
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: Sender<Message>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiver its messages arrive on.
    pub fn channel() -> (Self, Receiver<Message>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&mut self, message: &Message) -> Result<(), PublishError> {
        self.sender
            .send(message.clone())
            .map_err(|_| PublishError::Disconnected)
    }
}
