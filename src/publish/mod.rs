//! Delivery of smoothed values to downstream consumers.
//!
//! The tracker decides *what* changed; this module formats those changes into
//! messages and hands them to a transport. Delivery is best-effort: a failed
//! publish is logged and counted, never retried.

pub mod dispatch;
pub mod payload;
pub mod transport;

#[cfg(feature = "gateway")]
pub mod gateway;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use dispatch::{DispatchReport, Dispatcher};
pub use payload::{format_delta, format_snapshot};
pub use transport::{ChannelPublisher, LogPublisher};

#[cfg(feature = "gateway")]
pub use gateway::{BlockingHttpPublisher, HttpConfig, HttpPublisher};

/// A formatted notification ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier of the publishing client
    pub client_id: String,
    /// Destination topic
    pub topic: String,
    /// Rendered payload
    pub payload: String,
    /// Time the message was created
    pub published_at: DateTime<Utc>,
}

/// A transport that delivers messages to interested consumers.
pub trait Publisher {
    fn publish(&mut self, message: &Message) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, message: &Message) -> Result<(), PublishError> {
        (**self).publish(message)
    }
}

/// Publishing errors.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Payload could not be rendered
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Transport could not be set up
    #[error("transport config error: {0}")]
    Config(String),
    /// Network or I/O failure while sending
    #[error("transport error: {0}")]
    Transport(String),
    /// The receiving side answered with an error
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// The consumer of an in-process channel has gone away
    #[error("message consumer disconnected")]
    Disconnected,
}

/// Build a client identifier from a configured name, the host name and a
/// random suffix, so several smoothers with the same config stay distinct.
pub fn client_id(prefix: &str) -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!(
        "{}-{}-{}",
        prefix,
        hostname,
        &uuid::Uuid::new_v4().to_string()[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_shape() {
        let a = client_id("CAM");
        let b = client_id("CAM");
        assert!(a.starts_with("CAM-"));
        assert_ne!(a, b);
        assert_eq!(a.rsplit('-').next().map(str::len), Some(8));
    }
}
