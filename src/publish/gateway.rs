//! HTTP transport that relays messages to an event bus gateway.
//!
//! Each message is POSTed as JSON to `http://{host}/{topic}`.

use crate::config::Config;
use crate::publish::{client_id, Message, PublishError, Publisher};
use std::time::Duration;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Gateway host, optionally with a port (e.g. `127.0.0.1:8080`)
    pub host: String,
    /// Identifier sent with every request
    pub client_id: String,
    /// Request timeout
    pub timeout: Duration,
}

impl HttpConfig {
    pub fn new(host: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            client_id: client_id.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Build from the smoother configuration, using the keepalive as timeout.
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            client_id: client_id(&config.client_name),
            timeout: config.keepalive,
        }
    }

    /// Get the base gateway URL.
    pub fn url(&self) -> String {
        format!("http://{}", self.host)
    }

    /// Get the endpoint URL for a topic.
    pub fn publish_url(&self, topic: &str) -> String {
        format!("{}/{}", self.url(), topic.trim_matches('/'))
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.url())
    }
}

/// Async gateway client.
pub struct HttpPublisher {
    config: HttpConfig,
    client: reqwest::Client,
}

impl HttpPublisher {
    pub fn new(config: HttpConfig) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PublishError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Test connection to the gateway.
    pub async fn test_connection(&self) -> Result<bool, PublishError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Send one message to the gateway.
    pub async fn send(&self, message: &Message) -> Result<(), PublishError> {
        let response = self
            .client
            .post(self.config.publish_url(&message.topic))
            .header("X-Client-Id", &self.config.client_id)
            .json(message)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PublishError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

/// Blocking gateway publisher for the synchronous dispatch loop.
pub struct BlockingHttpPublisher {
    inner: HttpPublisher,
    runtime: Option<tokio::runtime::Runtime>,
}

impl BlockingHttpPublisher {
    pub fn new(config: HttpConfig) -> Result<Self, PublishError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PublishError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: HttpPublisher::new(config)?,
            runtime: Some(runtime),
        })
    }

    fn block_on<F: std::future::Future<Output = Result<T, PublishError>>, T>(
        &self,
        future: F,
    ) -> Result<T, PublishError> {
        match self.runtime {
            Some(ref runtime) => runtime.block_on(future),
            None => Err(PublishError::Config("runtime already shut down".to_string())),
        }
    }

    /// Test connection to the gateway.
    pub fn test_connection(&self) -> Result<bool, PublishError> {
        self.block_on(self.inner.test_connection())
    }
}

impl Publisher for BlockingHttpPublisher {
    fn publish(&mut self, message: &Message) -> Result<(), PublishError> {
        self.block_on(self.inner.send(message))
    }
}

impl Drop for BlockingHttpPublisher {
    fn drop(&mut self) {
        // The server may drop its publisher from inside an async context,
        // where a blocking runtime shutdown would panic.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
