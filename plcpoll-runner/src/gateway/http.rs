//! HTTP device gateway
//!
//! Resolves descriptors by listing the backend catalog and pushes
//! measurements to the ingestion endpoint.

use std::time::Duration;

use async_trait::async_trait;
use plcpoll_client::BackendClient;
use plcpoll_core::domain::device::DeviceDescriptor;
use plcpoll_core::domain::key::DeviceKey;
use plcpoll_core::domain::measurement::Measurement;
use tracing::{debug, warn};

use super::{DeviceGateway, GatewayError, select_device};

/// HTTP implementation of DeviceGateway
pub struct HttpDeviceGateway {
    client: BackendClient,
    push_timeout: Duration,
}

impl HttpDeviceGateway {
    /// Creates a new HTTP gateway
    ///
    /// # Arguments
    /// * `client` - Backend client, already carrying the API key
    /// * `push_timeout` - Bound on one measurement push
    pub fn new(client: BackendClient, push_timeout: Duration) -> Self {
        Self {
            client,
            push_timeout,
        }
    }
}

#[async_trait]
impl DeviceGateway for HttpDeviceGateway {
    async fn fetch_descriptor(&self, key: &DeviceKey) -> Result<DeviceDescriptor, GatewayError> {
        let devices = self.client.list_devices().await?;
        debug!("Backend listed {} device(s) while resolving {}", devices.len(), key);

        select_device(devices, key)
    }

    async fn push_measurement(&self, measurement: &Measurement) {
        let push = self.client.push_measurement(measurement);

        match tokio::time::timeout(self.push_timeout, push).await {
            Ok(Ok(())) => {
                debug!(
                    "Pushed measurement plc={} register={}",
                    measurement.plc_id, measurement.register_id
                );
            }
            Ok(Err(e)) => {
                warn!(
                    "Failed to push measurement plc={} register={}: {}",
                    measurement.plc_id, measurement.register_id, e
                );
            }
            Err(_) => {
                warn!(
                    "Timed out pushing measurement plc={} register={} after {:?}",
                    measurement.plc_id, measurement.register_id, self.push_timeout
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn unreachable_gateway() -> HttpDeviceGateway {
        // Port 9 (discard) on loopback is closed on test machines.
        let client = BackendClient::new("http://127.0.0.1:9").with_api_key("key");
        HttpDeviceGateway::new(client, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_push_failure_is_swallowed() {
        let gateway = unreachable_gateway();
        let measurement = Measurement::online(1, 2, 3.0, None, Utc::now());

        // Returns unit whether or not the backend is there.
        gateway.push_measurement(&measurement).await;
    }

    #[tokio::test]
    async fn test_against_local_backend() {
        use crate::testing::descriptor;
        use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::get, routing::post};
        use plcpoll_client::API_KEY_HEADER;
        use std::sync::{Arc, Mutex};

        let pushes = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/api/v1/plcs",
                get(|| async {
                    Json(serde_json::json!({ "items": [], "data": [descriptor(5, &[1])] }))
                }),
            )
            .route(
                "/api/v1/internal/poller-data",
                post({
                    let pushes = pushes.clone();
                    move |headers: HeaderMap, Json(measurement): Json<Measurement>| async move {
                        let key = headers
                            .get(API_KEY_HEADER)
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_string);
                        pushes.lock().unwrap().push((key, measurement));
                        StatusCode::CREATED
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = BackendClient::new(base).with_api_key("key");
        let gateway = HttpDeviceGateway::new(client, Duration::from_secs(2));

        let device = gateway
            .fetch_descriptor(&"10.0.0.5".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(device.id, 5);

        let missing = gateway
            .fetch_descriptor(&"10.0.0.5|3".parse().unwrap())
            .await
            .unwrap_err();
        assert_eq!(missing.to_string(), "plc 10.0.0.5|3 not found");

        let measurement = Measurement::online(5, 1, 2.5, Some("C"), Utc::now());
        gateway.push_measurement(&measurement).await;

        let pushes = pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].0.as_deref(), Some("key"));
        assert_eq!(pushes[0].1, measurement);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let gateway = unreachable_gateway();
        let key: DeviceKey = "10.0.0.5".parse().unwrap();

        let err = gateway.fetch_descriptor(&key).await.unwrap_err();
        assert!(matches!(err, GatewayError::Fetch(_)));
    }
}
