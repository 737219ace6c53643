//! Measurement domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quality flag attached to every successful read
pub const QUALITY_GOOD: &str = "GOOD";

/// One register reading, as pushed to the ingestion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub plc_id: i64,
    pub register_id: i64,
    pub status: MeasurementStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Mirror of `value` kept for ingestion endpoints that read this column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_float: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reachability of the register at read time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementStatus {
    Online,
    Offline,
}

impl Measurement {
    /// A successful read
    pub fn online(
        plc_id: i64,
        register_id: i64,
        value: f64,
        unit: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            plc_id,
            register_id,
            status: MeasurementStatus::Online,
            value: Some(value),
            value_float: Some(value),
            quality: Some(QUALITY_GOOD.to_string()),
            unit: unit.map(str::to_string),
            timestamp,
            error: None,
        }
    }

    /// A failed read
    pub fn offline(
        plc_id: i64,
        register_id: i64,
        error: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            plc_id,
            register_id,
            status: MeasurementStatus::Offline,
            value: None,
            value_float: None,
            quality: None,
            unit: None,
            timestamp,
            error: Some(error.into()),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == MeasurementStatus::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_online_payload() {
        let m = Measurement::online(4, 9, 21.5, Some("C"), ts());
        let json = serde_json::to_value(&m).unwrap();

        assert_eq!(json["plc_id"], 4);
        assert_eq!(json["register_id"], 9);
        assert_eq!(json["status"], "online");
        assert_eq!(json["value"], 21.5);
        assert_eq!(json["value_float"], 21.5);
        assert_eq!(json["quality"], "GOOD");
        assert_eq!(json["unit"], "C");
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00Z");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_offline_payload_omits_value() {
        let m = Measurement::offline(4, 9, "read timed out", ts());
        let json = serde_json::to_value(&m).unwrap();

        assert_eq!(json["status"], "offline");
        assert_eq!(json["error"], "read timed out");
        assert!(json.get("value").is_none());
        assert!(json.get("quality").is_none());
        assert!(json.get("unit").is_none());
        assert!(!m.is_online());
    }
}
