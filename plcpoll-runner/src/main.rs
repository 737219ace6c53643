//! plcpoll
//!
//! Polls PLC registers on behalf of a controlling process and forwards every
//! reading to the backend.
//!
//! Architecture:
//! - Configuration: flags and environment, with `.env` discovery
//! - Gateway: HTTP communication with the backend (device catalog, ingestion)
//! - Services: event emission and register reads
//! - Scheduler: one poll task per device key, owned by a supervisor
//! - Command loop: line protocol on stdin, events on stdout
//! - API: optional HTTP transport streaming measurements
//!
//! Stdout carries the event protocol only; logs go to stderr.

mod api;
mod command_loop;
mod config;
mod gateway;
mod scheduler;
mod service;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::StreamState;
use crate::command_loop::CommandLoop;
use crate::config::Config;
use crate::gateway::{DeviceGateway, HttpDeviceGateway};
use crate::scheduler::{Supervisor, TaskContext};
use crate::service::{EventSink, JsonLinesSink, RegisterReader, SimulatedReader};
use plcpoll_client::BackendClient;

#[derive(Parser)]
#[command(name = "plcpoll")]
#[command(about = "PLC polling worker driven by a line protocol", long_about = None)]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "BACKEND_API_URL", default_value = "http://localhost:5000")]
    backend_url: String,

    /// Key sent with measurement pushes
    #[arg(long, env = "POLLER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Timeout of one backend request, in seconds
    #[arg(long, env = "POLLER_HTTP_TIMEOUT", default_value_t = 10)]
    http_timeout_secs: u64,

    /// Bound on one register read or measurement push, in milliseconds
    #[arg(long, env = "POLLER_READ_TIMEOUT_MS", default_value_t = 5000)]
    read_timeout_ms: u64,

    /// Polling interval when neither the command nor the device sets one
    #[arg(long, env = "POLLER_DEFAULT_INTERVAL_MS", default_value_t = 1000)]
    default_interval_ms: u64,

    /// Listen address of the measurement stream transport
    #[arg(long, env = "POLLER_STREAM_ADDR")]
    stream_addr: Option<String>,

    /// Sampling period of the measurement stream, in milliseconds
    #[arg(long, env = "POLLER_STREAM_TICK_MS", default_value_t = 2000)]
    stream_tick_ms: u64,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            default_interval: Duration::from_millis(self.default_interval_ms),
            stream_addr: self.stream_addr,
            stream_tick: Duration::from_millis(self.stream_tick_ms),
            ..Config::new(self.backend_url)
        }
        .with_api_key(self.api_key)
    }
}

fn main() -> Result<()> {
    // Before the runtime exists: this may set environment variables.
    let dotenv = config::load_dotenv();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let result = runtime.block_on(run(cli, dotenv));

    // The blocking stdin reader cannot be interrupted; do not wait on it.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(
    cli: Cli,
    dotenv: std::result::Result<Option<PathBuf>, dotenvy::Error>,
) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "plcpoll_runner=info,plcpoll_client=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting plcpoll");
    match &dotenv {
        Ok(Some(path)) => info!("Loaded environment from {}", path.display()),
        Ok(None) => info!("No .env file found, using the process environment"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    }

    let config = cli.into_config();
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: backend_url={}, default_interval={:?}, read_timeout={:?}",
        config.backend_url, config.default_interval, config.read_timeout
    );
    if config.api_key.is_none() {
        warn!("POLLER_API_KEY is not set; the backend will reject measurement pushes");
    }

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let mut client = BackendClient::with_client(config.backend_url.clone(), http);
    if let Some(api_key) = &config.api_key {
        client = client.with_api_key(api_key.clone());
    }

    let gateway: Arc<dyn DeviceGateway> =
        Arc::new(HttpDeviceGateway::new(client, config.read_timeout));
    let reader: Arc<dyn RegisterReader> = Arc::new(SimulatedReader::new());
    let sink: Arc<dyn EventSink> = Arc::new(JsonLinesSink::stdout());

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    // Bind before any task starts so a bad address fails the whole process.
    let server = match &config.stream_addr {
        Some(addr) => {
            let listener = api::bind(addr).await?;
            info!("Measurement stream listening on {}", addr);

            let state = StreamState::new(
                reader.clone(),
                config.read_timeout,
                config.stream_tick,
                shutdown.clone(),
            );
            Some(tokio::spawn(api::serve(listener, state)))
        }
        None => None,
    };

    let context = TaskContext {
        gateway,
        reader,
        sink: sink.clone(),
        read_timeout: config.read_timeout,
        shutdown: shutdown.clone(),
    };
    let supervisor = Arc::new(Supervisor::new(context, config.default_interval));
    let command_loop = CommandLoop::new(supervisor, sink, shutdown.clone());

    let exit = command_loop
        .run(BufReader::new(tokio::io::stdin()))
        .await;
    info!("Stopped ({:?})", exit);

    shutdown.cancel();
    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Measurement stream failed: {}", e),
            Err(e) => error!("Measurement stream task panicked: {}", e),
        }
    }

    Ok(())
}

/// Cancels `shutdown` on ctrl-c or SIGTERM
async fn cancel_on_signal(shutdown: CancellationToken) {
    match wait_for_signal().await {
        Ok(()) => info!("Termination signal received"),
        Err(e) => {
            error!("Failed to listen for termination signals: {}", e);
            return;
        }
    }
    shutdown.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
