// ── Device registry ──
//
// Devices registered on the account, keyed by serial number in listing
// order. Membership is fixed once fetched; only `last_status` changes.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use landroid_api::{CloudClient, ProductItem};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::CoreError;

/// Listing timestamps use the device's local clock.
const LISTING_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Latest status document a device reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub payload: Value,
    /// Local wall-clock time of receipt. `None` when seeded from a listing
    /// entry without a parseable timestamp.
    pub timestamp: Option<NaiveDateTime>,
}

/// A mower registered on the account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub serial_number: String,
    pub name: String,
    pub uuid: Option<String>,
    /// Commands are published here.
    pub inbound_topic: String,
    /// Telemetry arrives here.
    pub outbound_topic: String,
    pub mqtt_endpoint: Option<String>,
    pub last_status: Option<DeviceStatus>,
}

impl Device {
    /// `cfg.lg` of the last status, if the device reported one.
    pub fn language(&self) -> Option<&str> {
        self.last_status
            .as_ref()?
            .payload
            .get("cfg")?
            .get("lg")?
            .as_str()
    }
}

impl From<ProductItem> for Device {
    fn from(item: ProductItem) -> Self {
        let last_status = item.last_status.map(|status| DeviceStatus {
            timestamp: status.timestamp.as_deref().and_then(|raw| {
                NaiveDateTime::parse_from_str(raw, LISTING_TIMESTAMP_FORMAT).ok()
            }),
            payload: status.payload,
        });
        Self {
            serial_number: item.serial_number,
            name: item.name,
            uuid: item.uuid,
            inbound_topic: item.mqtt_topics.command_in,
            outbound_topic: item.mqtt_topics.command_out,
            mqtt_endpoint: item.mqtt_endpoint,
            last_status,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: IndexMap<String, Device>,
    default_language: String,
}

impl DeviceRegistry {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            devices: IndexMap::new(),
            default_language: default_language.into(),
        }
    }

    /// Fetch the account's active devices. Requires a session; never logs
    /// in on its own. Leaves the current set untouched on failure.
    pub async fn fetch(
        &mut self,
        client: &CloudClient,
        access_token: &SecretString,
    ) -> Result<usize, CoreError> {
        let items = client
            .list_devices(access_token)
            .await
            .map_err(CoreError::registry)?;

        info!(count = items.len(), "device listing received");
        self.replace(items);
        Ok(self.devices.len())
    }

    /// Install a listing. Duplicate serials keep their first position and
    /// the last record.
    pub fn replace(&mut self, items: Vec<ProductItem>) {
        self.devices.clear();
        for item in items {
            debug!(serial = %item.serial_number, name = %item.name, "found device");
            let device = Device::from(item);
            if self
                .devices
                .insert(device.serial_number.clone(), device)
                .is_some()
            {
                warn!("duplicate serial in device listing");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn first(&self) -> Option<&Device> {
        self.devices.first().map(|(_, device)| device)
    }

    pub fn get(&self, serial: &str) -> Option<&Device> {
        self.devices.get(serial)
    }

    /// Device whose outbound (telemetry) topic is `topic`.
    pub fn by_outbound_topic(&self, topic: &str) -> Option<&Device> {
        self.devices.values().find(|d| d.outbound_topic == topic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn snapshot(&self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }

    /// Store a status report. Returns `false` for unknown serials.
    pub fn record_status(&mut self, serial: &str, payload: Value, at: NaiveDateTime) -> bool {
        match self.devices.get_mut(serial) {
            Some(device) => {
                device.last_status = Some(DeviceStatus {
                    payload,
                    timestamp: Some(at),
                });
                true
            }
            None => false,
        }
    }

    /// Language for commands to `serial`: the device's own, else the default.
    pub fn language(&self, serial: &str) -> &str {
        self.devices
            .get(serial)
            .and_then(Device::language)
            .unwrap_or(&self.default_language)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn item(serial: &str, topic_in: &str, topic_out: &str) -> ProductItem {
        serde_json::from_value(json!({
            "serial_number": serial,
            "name": format!("mower {serial}"),
            "mqtt_topics": { "command_in": topic_in, "command_out": topic_out }
        }))
        .unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn keeps_listing_order_and_topics() {
        let mut registry = DeviceRegistry::new("de");
        registry.replace(vec![item("B", "b/in", "b/out"), item("A", "a/in", "a/out")]);

        let serials: Vec<_> = registry.iter().map(|d| d.serial_number.as_str()).collect();
        assert_eq!(serials, vec!["B", "A"]);
        assert_eq!(registry.first().unwrap().serial_number, "B");
        assert_eq!(registry.by_outbound_topic("a/out").unwrap().serial_number, "A");
        assert!(registry.by_outbound_topic("a/in").is_none());
    }

    #[test]
    fn language_defaults_until_reported() {
        let mut registry = DeviceRegistry::new("de");
        registry.replace(vec![item("ABC123", "in", "out")]);
        assert_eq!(registry.language("ABC123"), "de");
        assert_eq!(registry.language("nope"), "de");

        assert!(registry.record_status("ABC123", json!({ "cfg": { "lg": "fr" } }), at(9, 5, 0)));
        assert_eq!(registry.language("ABC123"), "fr");

        let status = registry.get("ABC123").unwrap().last_status.clone().unwrap();
        assert_eq!(status.timestamp, Some(at(9, 5, 0)));
    }

    #[test]
    fn record_status_ignores_unknown_serial() {
        let mut registry = DeviceRegistry::new("de");
        assert!(!registry.record_status("ghost", json!({}), at(0, 0, 0)));
        assert!(registry.is_empty());
    }

    #[test]
    fn listing_status_seeds_language() {
        let item: ProductItem = serde_json::from_value(json!({
            "serial_number": "S1",
            "name": "x",
            "mqtt_topics": { "command_in": "i", "command_out": "o" },
            "last_status": {
                "timestamp": "2024-05-01 09:05:00",
                "payload": { "cfg": { "lg": "it" } }
            }
        }))
        .unwrap();

        let mut registry = DeviceRegistry::new("de");
        registry.replace(vec![item]);
        assert_eq!(registry.language("S1"), "it");
        let status = registry.get("S1").unwrap().last_status.clone().unwrap();
        assert_eq!(status.timestamp, Some(at(9, 5, 0)));
    }
}
