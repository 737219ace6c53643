//! API Module
//!
//! Optional HTTP transport serving measurements as a stream. Clients push
//! the device list to sample, then hold a streaming request open.

pub mod devices;
pub mod error;
pub mod health;
pub mod measurements;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use plcpoll_core::domain::device::DeviceDescriptor;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::service::RegisterReader;

/// Shared state of the transport
#[derive(Clone)]
pub struct StreamState {
    /// Most recently pushed device list
    pub devices: Arc<RwLock<Vec<DeviceDescriptor>>>,
    pub reader: Arc<dyn RegisterReader>,
    pub read_timeout: Duration,
    /// Period between two samples of a stream
    pub tick: Duration,
    pub shutdown: CancellationToken,
}

impl StreamState {
    pub fn new(
        reader: Arc<dyn RegisterReader>,
        read_timeout: Duration,
        tick: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            devices: Arc::new(RwLock::new(Vec::new())),
            reader,
            read_timeout,
            tick,
            shutdown,
        }
    }
}

/// Create the transport router with all endpoints
pub fn create_router(state: StreamState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/config", post(devices::push_config))
        .route(
            "/api/v1/measurements/stream",
            get(measurements::stream_measurements),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Binds the transport listener
///
/// Failing to bind is fatal, so this runs before any poll task starts.
pub async fn bind(addr: &str) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind stream transport to {}", addr))
}

/// Serves the transport until the state's shutdown token is cancelled
pub async fn serve(listener: TcpListener, state: StreamState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
