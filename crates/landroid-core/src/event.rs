// ── Event surface ──
//
// Outward notifications for the host layer. Lifecycle events and telemetry
// share one broadcast channel; the connection state is also published on a
// watch channel so late subscribers can read the current value.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::connection::ConnectionState;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Something the host layer may want to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    Connected,
    Disconnected,
    /// Login was rejected. `payload` is the token endpoint's error body or
    /// `null` when there was none.
    AuthenticationFailed { payload: Value },
    /// A device reported status.
    Telemetry { serial: String, payload: Value },
}

/// Sender side of the event surface. Owned by the engine.
#[derive(Debug, Clone)]
pub struct EventSurface {
    events: broadcast::Sender<ClientEvent>,
    state: watch::Sender<ConnectionState>,
}

impl Default for EventSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSurface {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { events, state }
    }

    pub fn emit(&self, event: ClientEvent) {
        tracing::trace!(?event, "emitting event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn publish_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let surface = EventSurface::new();
        let mut rx = surface.subscribe();
        surface.emit(ClientEvent::Connected);
        surface.emit(ClientEvent::Telemetry {
            serial: "ABC123".into(),
            payload: serde_json::json!({ "dat": {} }),
        });
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::Connected);
        assert!(matches!(rx.recv().await.unwrap(), ClientEvent::Telemetry { serial, .. } if serial == "ABC123"));
    }

    #[test]
    fn state_is_observable_without_subscribers() {
        let surface = EventSurface::new();
        surface.publish_state(ConnectionState::Connecting);
        assert_eq!(*surface.state().borrow(), ConnectionState::Connecting);
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_value(ClientEvent::AuthenticationFailed {
            payload: Value::Null,
        })
        .unwrap();
        assert_eq!(json["event"], "authentication_failed");
        assert!(json["payload"].is_null());
    }
}
