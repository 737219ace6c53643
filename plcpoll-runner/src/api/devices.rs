//! Device configuration API Handler
//!
//! The streaming transport does not use the backend catalog. Its clients
//! push the full device list they want sampled.

use axum::{Json, extract::State};
use plcpoll_core::dto::device_list::DeviceListResponse;
use serde::Serialize;

use crate::api::StreamState;
use crate::api::error::{ApiError, ApiResult};

/// Reply to a configuration push
#[derive(Debug, Serialize)]
pub struct ConfigAccepted {
    /// Number of devices now sampled
    pub devices: usize,
}

/// POST /api/v1/config
/// Replace the sampled device list
///
/// Accepts the same shapes as the backend catalog: a bare list, or a wrapper
/// with `items` or `data`.
pub async fn push_config(
    State(state): State<StreamState>,
    Json(body): Json<DeviceListResponse>,
) -> ApiResult<Json<ConfigAccepted>> {
    let devices = body.into_devices();

    if let Some(device) = devices.iter().find(|d| d.ip_address.trim().is_empty()) {
        return Err(ApiError::BadRequest(format!(
            "device {} has no ip_address",
            device.id
        )));
    }

    let count = devices.len();
    *state.devices.write().await = devices;
    tracing::info!("Stream configuration replaced ({} device(s))", count);

    Ok(Json(ConfigAccepted { devices: count }))
}
