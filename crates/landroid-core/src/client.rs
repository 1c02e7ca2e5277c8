// ── Client handle ──
//
// Cheaply cloneable facade over the engine task. All mutations travel
// through an mpsc channel with a oneshot reply; events and connection
// state are vended directly from the shared surface.

use std::sync::Arc;

use landroid_api::{LinkConnector, MqttConnector};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::ConnectionState;
use crate::control::ControlInput;
use crate::correlator::Dispatch;
use crate::engine::{Engine, EngineStatus, Request, RequestEnvelope, Response, StartReport};
use crate::error::CoreError;
use crate::event::{ClientEvent, EventSurface};
use crate::registry::{Device, DeviceRegistry};
use crate::session::SessionManager;

const REQUEST_CHANNEL_SIZE: usize = 64;

/// Mower cloud client. Clone freely; every clone drives the same engine.
#[derive(Clone)]
pub struct LandroidClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    requests: mpsc::Sender<RequestEnvelope>,
    events: EventSurface,
    /// Taken on the first `start()`.
    engine: Mutex<Option<Engine>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LandroidClient {
    /// Client using the real MQTT-over-WebSocket transport.
    pub fn new(config: &ClientConfig) -> Result<Self, CoreError> {
        Self::with_connector(config, Arc::new(MqttConnector::new()))
    }

    /// Client using a caller-supplied link implementation.
    pub fn with_connector(
        config: &ClientConfig,
        connector: Arc<dyn LinkConnector>,
    ) -> Result<Self, CoreError> {
        let events = EventSurface::new();
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let engine = Engine::new(config, connector, events.clone(), rx)?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                requests: tx,
                events,
                engine: Mutex::new(Some(engine)),
                task: Mutex::new(None),
            }),
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Log in, list devices and open the broker connection.
    ///
    /// A failed start leaves the engine running, so `start()` may be
    /// retried on the same client.
    pub async fn start(&self) -> Result<StartReport, CoreError> {
        self.spawn_engine().await;
        match self.request(Request::Start).await? {
            Response::Started(report) => Ok(report),
            other => Err(unexpected(&other)),
        }
    }

    /// Tear down the link and timers, then wait for the engine to exit.
    /// Terminal: later requests fail with `NotStarted`.
    pub async fn stop(&self) -> Result<(), CoreError> {
        let Some(task) = self.inner.task.lock().await.take() else {
            return Ok(());
        };
        let result = self.request(Request::Stop).await;
        if let Err(e) = task.await {
            debug!(error = %e, "engine task ended abnormally");
        }
        result.map(|_| ())
    }

    async fn spawn_engine(&self) {
        let Some(engine) = self.inner.engine.lock().await.take() else {
            return;
        };
        let handle = tokio::spawn(engine.run());
        *self.inner.task.lock().await = Some(handle);
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Send a payload to one device, or every device when `target` is
    /// empty. Object payloads are wrapped in the command envelope.
    pub async fn send(
        &self,
        payload: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<Dispatch, CoreError> {
        let request = Request::Send {
            payload: payload.into(),
            target: target.into(),
        };
        match self.request(request).await? {
            Response::Dispatched(dispatch) => Ok(dispatch),
            other => Err(unexpected(&other)),
        }
    }

    /// Send `{"cmd": code}`. Codes outside 0..=9 are rejected without
    /// touching the link.
    pub async fn send_command(
        &self,
        code: i64,
        target: impl Into<String>,
    ) -> Result<Dispatch, CoreError> {
        let request = Request::SendCommand {
            code,
            target: target.into(),
        };
        match self.request(request).await? {
            Response::Dispatched(dispatch) => Ok(dispatch),
            other => Err(unexpected(&other)),
        }
    }

    /// Resolve a host-layer control input and send it. `Ok(None)` when the
    /// input carries nothing to send.
    pub async fn control(&self, input: ControlInput) -> Result<Option<Dispatch>, CoreError> {
        let Some(resolved) = input.resolve() else {
            debug!("empty control input ignored");
            return Ok(None);
        };
        self.send(resolved.payload, resolved.target).await.map(Some)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Log in and list the account's devices without opening a broker
    /// connection or spawning the engine.
    pub async fn fetch_devices(config: &ClientConfig) -> Result<Vec<Device>, CoreError> {
        let mut session = SessionManager::new(config.cloud_client()?, config);
        session.login(&EventSurface::new()).await?;
        let token = session
            .access_token()
            .cloned()
            .ok_or_else(|| CoreError::Internal("no access token after login".into()))?;
        let mut registry = DeviceRegistry::new(config.default_language.clone());
        registry.fetch(session.client(), &token).await?;
        Ok(registry.snapshot())
    }

    /// Devices from the last listing, in listing order.
    pub async fn devices(&self) -> Result<Vec<Device>, CoreError> {
        match self.request(Request::Devices).await? {
            Response::Devices(devices) => Ok(devices),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn status(&self) -> Result<EngineStatus, CoreError> {
        match self.request(Request::Status).await? {
            Response::Status(status) => Ok(*status),
            other => Err(unexpected(&other)),
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Event stream that skips over lagged gaps.
    pub fn event_stream(&self) -> impl tokio_stream::Stream<Item = ClientEvent> + use<> {
        BroadcastStream::new(self.inner.events.subscribe()).filter_map(Result::ok)
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.events.state()
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    async fn request(&self, request: Request) -> Result<Response, CoreError> {
        if self.inner.engine.lock().await.is_some() {
            return Err(CoreError::NotStarted);
        }
        let (response_tx, response_rx) = oneshot::channel();
        self.inner
            .requests
            .send(RequestEnvelope {
                request,
                response_tx,
            })
            .await
            .map_err(|_| CoreError::NotStarted)?;
        response_rx.await.map_err(|_| CoreError::NotStarted)?
    }
}

fn unexpected(response: &Response) -> CoreError {
    CoreError::Internal(format!("unexpected engine response: {response:?}"))
}
