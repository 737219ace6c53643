//! Measurement stream API Handler

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use futures::stream;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::api::StreamState;
use crate::service::measure;

/// Content type of the measurement stream, one JSON document per line
pub const NDJSON: &str = "application/x-ndjson";

/// GET /api/v1/measurements/stream
/// Stream one measurement line per configured register, every tick
///
/// Each tick samples the configuration as it is at that moment. The stream
/// ends when the process shuts down.
pub async fn stream_measurements(State(state): State<StreamState>) -> Response {
    tracing::info!("Measurement stream opened (tick: {:?})", state.tick);

    let mut ticker = time::interval_at(Instant::now() + state.tick, state.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let batches = stream::unfold((state, ticker), |(state, mut ticker)| async move {
        loop {
            tokio::select! {
                biased;

                _ = state.shutdown.cancelled() => {
                    tracing::debug!("Measurement stream closed by shutdown");
                    return None;
                }
                _ = ticker.tick() => {}
            }

            let batch = sample(&state).await;
            if !batch.is_empty() {
                return Some((Ok::<_, Infallible>(batch), (state, ticker)));
            }
        }
    });

    ([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(batches)).into_response()
}

/// Reads every register of the current configuration once
async fn sample(state: &StreamState) -> Vec<u8> {
    let devices = state.devices.read().await.clone();
    let mut batch = Vec::new();

    for device in &devices {
        for register in &device.registers {
            let measurement =
                measure(state.reader.as_ref(), device, register, state.read_timeout).await;

            match serde_json::to_vec(&measurement) {
                Ok(line) => {
                    batch.extend_from_slice(&line);
                    batch.push(b'\n');
                }
                Err(e) => tracing::warn!("Failed to encode measurement: {}", e),
            }
        }
    }

    batch
}
