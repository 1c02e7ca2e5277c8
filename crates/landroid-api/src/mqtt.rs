//! MQTT-over-WebSocket link built on `rumqttc`.
//!
//! The cloud's broker authenticates the WebSocket upgrade through a custom
//! authorizer, so the auth material travels as HTTP headers rather than
//! MQTT credentials. Headers live in an [`ArcSwap`] read by the request
//! modifier on every handshake, which lets a token refresh take effect on
//! the next reconnect without tearing down the current session.
//!
//! The event loop reconnects on its own with exponential backoff + jitter
//! and reports every transition as a [`LinkEvent`].

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::http;
use tokio_util::sync::CancellationToken;

use crate::auth::CustomAuthHeaders;
use crate::error::Error;
use crate::link::{LinkConnector, LinkEvent, LinkOptions, PubSubLink, ReconnectConfig};

// ── Tunables ─────────────────────────────────────────────────────────

const REQUEST_CHANNEL_CAPACITY: usize = 64;
const WSS_PORT: u16 = 443;
/// Telemetry documents regularly exceed rumqttc's 10 KiB default.
const MAX_PACKET_SIZE: usize = 256 * 1024;

// ── MqttConnector ────────────────────────────────────────────────────

/// Production [`LinkConnector`].
#[derive(Debug, Clone, Default)]
pub struct MqttConnector;

impl MqttConnector {
    pub fn new() -> Self {
        Self
    }
}

impl LinkConnector for MqttConnector {
    fn open(
        &self,
        options: LinkOptions,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn PubSubLink>, Error> {
        if options.client_id.is_empty() || options.client_id.starts_with(' ') {
            return Err(Error::Link(format!(
                "invalid MQTT client id {:?}",
                options.client_id
            )));
        }

        let headers = Arc::new(ArcSwap::from_pointee(options.auth.clone()));
        let broker_url = format!("wss://{}/mqtt", options.endpoint);

        let mut mqtt = MqttOptions::new(options.client_id.clone(), broker_url, WSS_PORT);
        mqtt.set_transport(Transport::wss_with_default_config())
            .set_credentials(options.username.clone(), "")
            .set_keep_alive(options.keep_alive)
            .set_clean_session(true)
            .set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

        let modifier_headers = Arc::clone(&headers);
        mqtt.set_request_modifier(move |request: http::Request<()>| {
            let current = modifier_headers.load_full();
            async move { apply_auth_headers(request, &current) }
        });

        tracing::info!(
            endpoint = %options.endpoint,
            region = %options.region,
            client_id = %options.client_id,
            "opening MQTT link"
        );

        let (client, eventloop) = AsyncClient::new(mqtt, REQUEST_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let reconnect = options.reconnect;
        tokio::spawn(async move {
            mqtt_loop(eventloop, &events, &reconnect, &task_cancel).await;
        });

        Ok(Box::new(MqttLink {
            client,
            headers,
            cancel,
        }))
    }
}

fn apply_auth_headers(
    mut request: http::Request<()>,
    auth: &CustomAuthHeaders,
) -> http::Request<()> {
    for (name, value) in auth.pairs() {
        match http::HeaderValue::from_str(value) {
            Ok(value) => {
                request.headers_mut().insert(name, value);
            }
            Err(e) => tracing::warn!(header = name, error = %e, "skipping invalid auth header"),
        }
    }
    request
}

// ── MqttLink ─────────────────────────────────────────────────────────

struct MqttLink {
    client: AsyncClient,
    headers: Arc<ArcSwap<CustomAuthHeaders>>,
    cancel: CancellationToken,
}

impl PubSubLink for MqttLink {
    fn subscribe(&self, topic: &str) -> Result<(), Error> {
        self.client
            .try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| Error::Link(e.to_string()))
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Error> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| Error::Link(e.to_string()))
    }

    fn update_auth_headers(&self, headers: CustomAuthHeaders) {
        tracing::debug!("swapping MQTT auth headers");
        self.headers.store(Arc::new(headers));
    }

    fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(error = %e, "disconnect request not queued");
        }
        self.cancel.cancel();
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Event loop ───────────────────────────────────────────────────────

/// Drive the rumqttc event loop: poll → on error, report, back off, poll
/// again (which reconnects).
async fn mqtt_loop(
    mut eventloop: EventLoop,
    events: &mpsc::UnboundedSender<LinkEvent>,
    reconnect: &ReconnectConfig,
    cancel: &CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            polled = eventloop.poll() => polled,
        };

        let outgoing = match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("MQTT connected");
                attempt = 0;
                Some(LinkEvent::Connected)
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::trace!(topic = %publish.topic, bytes = publish.payload.len(), "MQTT publish received");
                Some(LinkEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                })
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker sent DISCONNECT");
                Some(LinkEvent::BrokerDisconnect)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, attempt, "MQTT connection error");
                if events
                    .send(LinkEvent::Offline {
                        reason: e.to_string(),
                    })
                    .is_err()
                {
                    break;
                }

                let delay = calculate_backoff(attempt, reconnect);
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "Waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                attempt = attempt.saturating_add(1);
                Some(LinkEvent::Reconnecting { attempt })
            }
        };

        if let Some(link_event) = outgoing {
            if events.send(link_event).is_err() {
                break;
            }
        }
    }

    tracing::debug!("MQTT loop exiting");
    let _ = events.send(LinkEvent::Closed);
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
#[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = attempt.min(31) as i32;
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic spread seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let config = ReconnectConfig::default();
        let first = calculate_backoff(0, &config);
        assert!(first <= Duration::from_millis(1250), "{first:?}");

        for attempt in 0..64 {
            let delay = calculate_backoff(attempt, &config);
            assert!(delay <= Duration::from_secs_f64(30.0 * 1.25), "{attempt}: {delay:?}");
            assert!(delay >= Duration::from_secs_f64(0.75), "{attempt}: {delay:?}");
        }

        let late = calculate_backoff(20, &config);
        assert!(late >= Duration::from_secs_f64(30.0 * 0.75));
    }

    #[test]
    fn auth_headers_are_applied() {
        let token = secrecy::SecretString::from("h.c.s".to_owned());
        let auth = CustomAuthHeaders::from_access_token(&token).unwrap();
        let request = http::Request::builder()
            .uri("wss://iot.example.com/mqtt")
            .body(())
            .unwrap();

        let request = apply_auth_headers(request, &auth);
        let headers = request.headers();
        assert_eq!(headers["x-amz-customauthorizer-name"], "com-worxlandroid-customer");
        assert_eq!(headers["x-amz-customauthorizer-signature"], "s");
        assert_eq!(headers["jwt"], "h.c");
    }

    #[tokio::test]
    async fn rejects_blank_client_id() {
        let token = secrecy::SecretString::from("h.c.s".to_owned());
        let (tx, _rx) = mpsc::unbounded_channel();
        let options = LinkOptions {
            endpoint: "iot.eu-west-1.worxlandroid.com".into(),
            region: "eu-west-1".into(),
            client_id: String::new(),
            username: "app".into(),
            auth: CustomAuthHeaders::from_access_token(&token).unwrap(),
            reconnect: ReconnectConfig::default(),
            keep_alive: Duration::from_secs(30),
        };
        let result = MqttConnector::new().open(options, tx);
        assert!(matches!(result, Err(Error::Link(_))));
    }
}
