//! HTTP server for receiving observation batches.
//!
//! This module provides an HTTP server that:
//! - Accepts observation batches via POST /observe
//! - Applies them to a single mode tracker, one batch at a time
//! - Publishes the resulting notification through the configured publisher
//!
//! # Architecture
//!
//! ```text
//! Detector ──→ POST /observe ──→ ModeTracker ──→ Dispatcher ──→ event bus
//!                                     │
//!                              GET /snapshot
//! ```

use crate::core::{Delta, ModeTracker, Notification, TrackerConfig};
use crate::publish::{Dispatcher, Publisher};
use crate::source::parse_counts;
use crate::stats::SharedSessionStats;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

/// Publisher type the server dispatches through.
pub type BoxedPublisher = Box<dyn Publisher + Send>;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Smoothing settings
    pub tracker: TrackerConfig,
    /// Payload prefix for individual deltas
    pub name: String,
    /// Destination topic
    pub topic: String,
    /// Client identifier attached to published messages
    pub client_id: String,
}

impl ServerConfig {
    pub fn new(
        port: u16,
        tracker: TrackerConfig,
        name: impl Into<String>,
        topic: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            port,
            tracker,
            name: name.into(),
            topic: topic.into(),
            client_id: client_id.into(),
        }
    }
}

/// Shared server state
pub struct ServerState {
    /// Tracker, held for the whole observe-and-publish step so ticks stay ordered
    tracker: Mutex<ModeTracker<i64>>,
    /// Dispatcher, driven from the blocking pool
    dispatcher: Arc<StdMutex<Dispatcher<BoxedPublisher>>>,
    stats: Option<SharedSessionStats>,
}

impl ServerState {
    pub fn new(
        config: &ServerConfig,
        publisher: BoxedPublisher,
        stats: Option<SharedSessionStats>,
    ) -> Result<Self, crate::config::ConfigError> {
        let tracker = ModeTracker::new(&config.tracker)?;
        let mut dispatcher = Dispatcher::new(
            publisher,
            config.name.clone(),
            config.topic.clone(),
            config.client_id.clone(),
        );
        if let Some(ref stats) = stats {
            dispatcher = dispatcher.with_stats(stats.clone());
        }

        Ok(Self {
            tracker: Mutex::new(tracker),
            dispatcher: Arc::new(StdMutex::new(dispatcher)),
            stats,
        })
    }
}

/// Response from the observe endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserveResponse {
    /// Keys whose mode changed with this batch
    pub deltas: Vec<Delta<i64>>,
    /// Full reported state, present in combined mode when anything changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Vec<Delta<i64>>>,
    /// Messages handed to the transport
    pub published: usize,
    /// Messages the transport rejected
    pub failed: usize,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /snapshot
async fn snapshot(State(state): State<Arc<ServerState>>) -> Json<Vec<Delta<i64>>> {
    Json(state.tracker.lock().await.snapshot())
}

/// POST /observe
///
/// Applies one observation batch and publishes whatever changed.
async fn observe(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ObserveResponse>, (StatusCode, Json<ErrorResponse>)> {
    let counts = parse_counts(&body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Invalid observation: {e}"),
                code: "INVALID_OBSERVATION".to_string(),
            }),
        )
    })?;

    let mut tracker = state.tracker.lock().await;
    let deltas = tracker.observe(&counts);
    if let Some(ref stats) = state.stats {
        stats.record_batch();
        stats.record_deltas(deltas.len() as u64);
    }

    let notification = tracker.notification(deltas.clone());
    let snapshot = match notification {
        Some(Notification::Snapshot(ref entries)) => Some(entries.clone()),
        _ => None,
    };

    let report = match notification {
        Some(notification) => {
            let dispatcher = state.dispatcher.clone();
            tokio::task::spawn_blocking(move || {
                let mut dispatcher = dispatcher.lock().unwrap_or_else(|p| p.into_inner());
                dispatcher.dispatch(&notification)
            })
            .await
            .map_err(|e| {
                tracing::error!("Dispatch task failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: format!("Dispatch failed: {e}"),
                        code: "DISPATCH_ERROR".to_string(),
                    }),
                )
            })?
        }
        None => Default::default(),
    };
    drop(tracker);

    Ok(Json(ObserveResponse {
        deltas,
        snapshot,
        published: report.published,
        failed: report.failed,
    }))
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    publisher: BoxedPublisher,
    stats: Option<SharedSessionStats>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(&config, publisher, stats)?);

    let app = Router::new()
        .route("/health", get(health))
        .route("/observe", post(observe))
        .route("/snapshot", get(snapshot))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Tensor smoother listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
