// Wire models for the cloud REST API
//
// Only the fields the client acts on are typed. Everything else a record
// carries is kept in `extra` so the CLI can render it verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of `GET product-items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductItem {
    pub serial_number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub mqtt_endpoint: Option<String>,
    pub mqtt_topics: MqttTopics,
    /// Most recent telemetry the cloud cached for this device.
    #[serde(default)]
    pub last_status: Option<LastStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Topic pair a device listens and reports on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttTopics {
    /// Commands go here (cloud -> device).
    pub command_in: String,
    /// Telemetry arrives here (device -> cloud).
    pub command_out: String,
}

/// Cached status embedded in a listing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastStatus {
    /// `"YYYY-MM-DD HH:MM:SS"` in the device's local time, when present.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// `GET users/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// The cloud returns numeric ids; tests and older deployments use strings.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
