// Pub/sub link seam
//
// The lifecycle engine in `landroid-core` talks to the broker only through
// these traits. `MqttConnector` is the production implementation; tests
// substitute a recording fake.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::auth::CustomAuthHeaders;
use crate::error::Error;

/// Everything needed to open one broker session.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Broker host, e.g. `iot.eu-west-1.worxlandroid.com`.
    pub endpoint: String,
    /// Region derived from the endpoint.
    pub region: String,
    /// `<prefix>/USER/<user_id>/<app_name>/<uuid>`.
    pub client_id: String,
    /// MQTT username (the app name). The password is empty.
    pub username: String,
    pub auth: CustomAuthHeaders,
    pub reconnect: ReconnectConfig,
    pub keep_alive: Duration,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff between broker reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

// ── LinkEvent ────────────────────────────────────────────────────────

/// Lifecycle and data notifications raised by a running link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Broker accepted the session (CONNACK).
    Connected,
    /// The link is about to retry; `attempt` counts retries since the
    /// last successful connect.
    Reconnecting { attempt: u32 },
    /// The connection dropped or could not be established.
    Offline { reason: String },
    /// The broker sent DISCONNECT.
    BrokerDisconnect,
    /// A PUBLISH arrived.
    Message { topic: String, payload: Vec<u8> },
    /// The link task has exited and will raise nothing further.
    Closed,
}

// ── Traits ───────────────────────────────────────────────────────────

/// A live broker session. Every subscribe and publish uses QoS 1.
///
/// Methods enqueue work and return immediately; delivery outcome is
/// reported (if at all) through [`LinkEvent`]s.
pub trait PubSubLink: Send {
    fn subscribe(&self, topic: &str) -> Result<(), Error>;

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Error>;

    /// Replace the custom-auth headers used for the next (re)connect
    /// handshake. The current connection is left untouched.
    fn update_auth_headers(&self, headers: CustomAuthHeaders);

    /// Disconnect and stop reconnecting. Idempotent.
    fn close(&self);
}

/// Opens links. Must be called from within a Tokio runtime.
pub trait LinkConnector: Send + Sync {
    fn open(
        &self,
        options: LinkOptions,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn PubSubLink>, Error>;
}
