// ── Connection manager ──
//
// Owns the single broker link and its state machine:
//
//   Disconnected → Connecting → Connected → (offline/close/disconnect)
//   Backoff → Connecting → …
//
// The link reconnects by itself; this layer counts the attempts and gives
// up once more than `max_attempts` pass without a Connected or an inbound
// message, leaving the
// restart to the engine. `stop()` is the only external route back to
// Disconnected.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use landroid_api::{
    CustomAuthHeaders, LinkConnector, LinkEvent, LinkOptions, PubSubLink, ReconnectConfig, Session,
};
use serde::Serialize;
use strum::Display;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::correlator::{Acknowledgement, CommandCorrelator};
use crate::error::CoreError;
use crate::event::{ClientEvent, EventSurface};
use crate::registry::{Device, DeviceRegistry};

const DEFAULT_REGION: &str = "eu-west-1";

/// Link state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
}

/// What the engine must do after a link event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    None,
    /// Entered Connected: any pending restart is obsolete.
    Connected,
    /// Too many reconnect attempts: the link was closed, schedule a restart.
    GaveUp,
}

pub struct ConnectionManager {
    connector: Arc<dyn LinkConnector>,
    link: Option<Box<dyn PubSubLink>>,
    link_events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
    app_name: String,
    mqtt_prefix: String,
    default_endpoint: String,
    reconnect: ReconnectConfig,
    keep_alive: Duration,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn LinkConnector>, config: &ClientConfig, mqtt_prefix: &str) -> Self {
        Self {
            connector,
            link: None,
            link_events: None,
            state: ConnectionState::Disconnected,
            attempts: 0,
            max_attempts: config.max_reconnect_attempts,
            app_name: config.app_name.clone(),
            mqtt_prefix: mqtt_prefix.to_owned(),
            default_endpoint: config.default_mqtt_endpoint.clone(),
            reconnect: config.reconnect.clone(),
            keep_alive: config.keep_alive,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive reconnect attempts since the last Connected or message.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn has_link(&self) -> bool {
        self.link.is_some()
    }

    // ── Connect ──────────────────────────────────────────────────────

    /// Open the broker link for the registry's devices.
    pub fn connect(
        &mut self,
        registry: &DeviceRegistry,
        session: Option<&Session>,
        user_id: &str,
        events: &EventSurface,
    ) -> Result<(), CoreError> {
        let Some(first) = registry.first() else {
            warn!("no device found to start MQTT");
            return Err(CoreError::NoDevices);
        };
        let session = session.ok_or_else(|| CoreError::Authentication {
            message: "not logged in".into(),
            payload: None,
        })?;
        let auth = session.custom_auth_headers()?;
        let options = self.link_options(first, user_id, auth);

        self.drop_link();
        let (tx, rx) = mpsc::unbounded_channel();
        let link = self.connector.open(options, tx)?;
        self.link = Some(link);
        self.link_events = Some(rx);
        self.transition(ConnectionState::Connecting, events);
        Ok(())
    }

    /// Broker options derived from the first device.
    pub fn link_options(&self, first: &Device, user_id: &str, auth: CustomAuthHeaders) -> LinkOptions {
        let endpoint = first.mqtt_endpoint.clone().unwrap_or_else(|| {
            warn!(serial = %first.serial_number, "cannot read mqtt_endpoint, using default");
            self.default_endpoint.clone()
        });
        let uuid = first
            .uuid
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        LinkOptions {
            region: region_of(&endpoint),
            client_id: format!(
                "{}/USER/{user_id}/{}/{uuid}",
                self.mqtt_prefix, self.app_name
            ),
            endpoint,
            username: self.app_name.clone(),
            auth,
            reconnect: self.reconnect.clone(),
            keep_alive: self.keep_alive,
        }
    }

    // ── Link events ──────────────────────────────────────────────────

    /// Next event from the current link. Pending forever without a link.
    pub async fn next_event(&mut self) -> Option<LinkEvent> {
        match self.link_events.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    pub fn handle_event(
        &mut self,
        event: LinkEvent,
        registry: &mut DeviceRegistry,
        correlator: &mut CommandCorrelator,
        events: &EventSurface,
        now: NaiveDateTime,
    ) -> LinkOutcome {
        if self.link.is_none() {
            debug!(?event, "ignoring event without a link");
            return LinkOutcome::None;
        }

        match event {
            LinkEvent::Connected => {
                self.attempts = 0;
                self.transition(ConnectionState::Connected, events);
                self.announce(registry);
                LinkOutcome::Connected
            }
            LinkEvent::Reconnecting { attempt } => {
                self.attempts = self.attempts.saturating_add(1);
                debug!(attempt, attempts = self.attempts, "MQTT reconnect");
                if self.attempts > self.max_attempts {
                    warn!(
                        attempts = self.attempts,
                        "reconnect limit exceeded; the cloud may be blocking this client"
                    );
                    self.drop_link();
                    self.transition(ConnectionState::Disconnected, events);
                    return LinkOutcome::GaveUp;
                }
                self.transition(ConnectionState::Connecting, events);
                LinkOutcome::None
            }
            LinkEvent::Offline { reason } => {
                debug!(%reason, "MQTT offline");
                self.transition(ConnectionState::Backoff, events);
                LinkOutcome::None
            }
            LinkEvent::BrokerDisconnect => {
                self.transition(ConnectionState::Backoff, events);
                LinkOutcome::None
            }
            LinkEvent::Closed => {
                self.link_lost(events);
                LinkOutcome::None
            }
            LinkEvent::Message { topic, payload } => {
                self.attempts = 0;
                self.handle_message(&topic, &payload, registry, correlator, events, now);
                LinkOutcome::None
            }
        }
    }

    /// The link's event stream ended without `stop()`.
    pub fn link_lost(&mut self, events: &EventSurface) {
        debug!("MQTT link ended");
        self.drop_link();
        self.transition(ConnectionState::Disconnected, events);
    }

    /// Subscribe to every outbound topic and ask every device for status.
    fn announce(&self, registry: &DeviceRegistry) {
        let Some(link) = &self.link else { return };
        for device in registry.iter() {
            debug!(topic = %device.outbound_topic, "MQTT subscribe");
            if let Err(e) = link.subscribe(&device.outbound_topic) {
                warn!(topic = %device.outbound_topic, error = %e, "subscribe failed");
            }
            if let Err(e) = link.publish(&device.inbound_topic, b"{}".to_vec()) {
                warn!(topic = %device.inbound_topic, error = %e, "status request failed");
            }
        }
    }

    fn handle_message(
        &self,
        topic: &str,
        payload: &[u8],
        registry: &mut DeviceRegistry,
        correlator: &mut CommandCorrelator,
        events: &EventSurface,
        now: NaiveDateTime,
    ) {
        let Some(serial) = registry
            .by_outbound_topic(topic)
            .map(|d| d.serial_number.clone())
        else {
            debug!(%topic, "message for unknown topic dropped");
            return;
        };
        let data: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!(%topic, error = %e, "message is not JSON, dropped");
                return;
            }
        };

        debug!(serial = %serial, "status received");
        registry.record_status(&serial, data.clone(), now);
        events.emit(ClientEvent::Telemetry {
            serial,
            payload: data.clone(),
        });
        if let Acknowledgement::Unsolicited(id) = correlator.acknowledge(&data) {
            debug!(id, "unsolicited device response");
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────

    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), CoreError> {
        let link = self.link.as_ref().ok_or_else(|| CoreError::Connection {
            message: "MQTT link is not open".into(),
        })?;
        Ok(link.publish(topic, payload)?)
    }

    /// Swap auth material into the live link without reconnecting.
    pub fn update_auth(&self, headers: CustomAuthHeaders) {
        match &self.link {
            Some(link) => link.update_auth_headers(headers),
            None => debug!("cannot update token for MQTT connection, MQTT offline"),
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Close the link and return to Disconnected.
    pub fn stop(&mut self, events: &EventSurface) {
        self.drop_link();
        self.attempts = 0;
        self.transition(ConnectionState::Disconnected, events);
    }

    fn drop_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.link_events = None;
    }

    fn transition(&mut self, next: ConnectionState, events: &EventSurface) {
        let previous = self.state;
        if previous == next {
            return;
        }
        self.state = next;
        info!(from = %previous, to = %next, "connection state");
        events.publish_state(next);

        match next {
            ConnectionState::Connected => events.emit(ClientEvent::Connected),
            ConnectionState::Backoff | ConnectionState::Disconnected
                if matches!(
                    previous,
                    ConnectionState::Connected | ConnectionState::Connecting
                ) =>
            {
                events.emit(ClientEvent::Disconnected);
            }
            _ => {}
        }
    }
}

/// Third dot-segment of a three-segment host, else the default region.
pub fn region_of(endpoint: &str) -> String {
    let parts: Vec<&str> = endpoint.split('.').collect();
    match parts.as_slice() {
        [_, _, region] => (*region).to_owned(),
        _ => DEFAULT_REGION.to_owned(),
    }
}
