// ── Lifecycle engine ──
//
// One task owns the session, the device registry, the outstanding-command
// set, the connection state machine and every timer. Host requests, link
// events, background HTTP completions and timer expiries are multiplexed
// onto that task, so no state is shared and nothing needs a lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use landroid_api::{LinkConnector, LinkEvent, Session};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState, LinkOutcome};
use crate::correlator::{CommandCorrelator, Dispatch, OutstandingCommand};
use crate::error::CoreError;
use crate::event::EventSurface;
use crate::registry::{Device, DeviceRegistry};
use crate::session::SessionManager;
use crate::timer::{Deadline, expired};

// ── Requests ─────────────────────────────────────────────────────────

/// Work the host asks of the engine.
#[derive(Debug)]
pub(crate) enum Request {
    Start,
    Send { payload: String, target: String },
    SendCommand { code: i64, target: String },
    Devices,
    Status,
    Stop,
}

/// Engine replies, one variant per request kind.
#[derive(Debug)]
pub(crate) enum Response {
    Started(StartReport),
    Dispatched(Dispatch),
    Devices(Vec<Device>),
    Status(Box<EngineStatus>),
    Stopped,
}

/// A request plus the channel its reply goes back on.
pub(crate) struct RequestEnvelope {
    pub request: Request,
    pub response_tx: oneshot::Sender<Result<Response, CoreError>>,
}

/// Result of a successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartReport {
    pub devices: usize,
    pub user_id: String,
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub logged_in: bool,
    /// Time until the periodic token refresh.
    pub refresh_in: Option<Duration>,
    /// Time until the one-shot refresh scheduled after a 401.
    pub retry_in: Option<Duration>,
    /// Time until the forced restart after too many reconnects.
    pub restart_in: Option<Duration>,
    pub outstanding: Vec<OutstandingCommandView>,
}

/// Serializable summary of an [`OutstandingCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutstandingCommandView {
    pub correlation_id: u16,
    pub device_serial: String,
    pub created_at: NaiveDateTime,
}

impl From<&OutstandingCommand> for OutstandingCommandView {
    fn from(command: &OutstandingCommand) -> Self {
        Self {
            correlation_id: command.correlation_id,
            device_serial: command.device_serial.clone(),
            created_at: command.created_at,
        }
    }
}

/// Background completions delivered back onto the engine task.
#[derive(Debug)]
enum Internal {
    Refreshed(Result<Session, landroid_api::Error>),
}

// ── Engine ───────────────────────────────────────────────────────────

pub(crate) struct Engine {
    session: SessionManager,
    registry: DeviceRegistry,
    correlator: CommandCorrelator,
    connection: ConnectionManager,
    events: EventSurface,
    restart_cooldown: Duration,
    restart: Deadline,
    requests: mpsc::Receiver<RequestEnvelope>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    refresh_task: Option<JoinHandle<()>>,
}

impl Engine {
    pub(crate) fn new(
        config: &ClientConfig,
        connector: Arc<dyn LinkConnector>,
        events: EventSurface,
        requests: mpsc::Receiver<RequestEnvelope>,
    ) -> Result<Self, CoreError> {
        let client = config.cloud_client()?;
        let mqtt_prefix = client.endpoints().mqtt_prefix.clone();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        Ok(Self {
            session: SessionManager::new(client, config),
            registry: DeviceRegistry::new(config.default_language.clone()),
            correlator: CommandCorrelator::new(config.outstanding_limit),
            connection: ConnectionManager::new(connector, config, &mqtt_prefix),
            events,
            restart_cooldown: config.restart_cooldown,
            restart: Deadline::default(),
            requests,
            internal_tx,
            internal_rx,
            refresh_task: None,
        })
    }

    /// Run until a stop request arrives or every handle is dropped.
    pub(crate) async fn run(mut self) {
        debug!("engine started");
        loop {
            let refresh_at = self.session.periodic_deadline();
            let retry_at = self.session.retry_deadline();
            let restart_at = self.restart;

            tokio::select! {
                biased;
                envelope = self.requests.recv() => {
                    let Some(envelope) = envelope else {
                        debug!("all client handles dropped");
                        self.shutdown();
                        break;
                    };
                    let stopping = matches!(envelope.request, Request::Stop);
                    let result = self.handle_request(envelope.request).await;
                    let _ = envelope.response_tx.send(result);
                    if stopping {
                        break;
                    }
                }
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                event = self.connection.next_event() => match event {
                    Some(event) => self.handle_link_event(event),
                    None => self.connection.link_lost(&self.events),
                },
                () = expired(refresh_at) => {
                    debug!("periodic token refresh due");
                    self.session.on_periodic_due();
                    self.spawn_refresh();
                }
                () = expired(retry_at) => {
                    debug!("one-shot token refresh due");
                    self.session.on_retry_due();
                    self.spawn_refresh();
                }
                () = expired(restart_at) => {
                    self.restart.cancel();
                    info!("restarting MQTT connection after cooldown");
                    if let Err(e) = self.connect().await {
                        warn!(error = %e, "MQTT restart failed");
                    }
                }
            }
        }
        debug!("engine stopped");
    }

    // ── Requests ─────────────────────────────────────────────────────

    async fn handle_request(&mut self, request: Request) -> Result<Response, CoreError> {
        match request {
            Request::Start => self.start().await.map(Response::Started),
            Request::Send { payload, target } => {
                let connection = &self.connection;
                self.correlator
                    .send(&payload, &target, &self.registry, local_now(), |topic, bytes| {
                        connection.publish(topic, bytes)
                    })
                    .map(Response::Dispatched)
            }
            Request::SendCommand { code, target } => {
                let connection = &self.connection;
                self.correlator
                    .send_command(code, &target, &self.registry, local_now(), |topic, bytes| {
                        connection.publish(topic, bytes)
                    })
                    .map(Response::Dispatched)
            }
            Request::Devices => Ok(Response::Devices(self.registry.snapshot())),
            Request::Status => Ok(Response::Status(Box::new(self.status()))),
            Request::Stop => {
                self.shutdown();
                Ok(Response::Stopped)
            }
        }
    }

    /// Login, device listing, then the broker connection.
    async fn start(&mut self) -> Result<StartReport, CoreError> {
        if self.connection.has_link() {
            return Err(CoreError::Connection {
                message: "already started".into(),
            });
        }

        self.session.login(&self.events).await?;

        let token = self
            .session
            .access_token()
            .cloned()
            .ok_or_else(|| CoreError::Internal("no access token after login".into()))?;
        if let Err(e) = self.registry.fetch(self.session.client(), &token).await {
            if e.is_unauthorized() {
                self.session.note_unauthorized("product-items");
            }
            return Err(e);
        }
        if self.registry.is_empty() {
            warn!("no mower found to start MQTT");
            return Err(CoreError::NoDevices);
        }

        let user_id = self.connect().await?;
        Ok(StartReport {
            devices: self.registry.len(),
            user_id,
        })
    }

    /// Profile lookup + broker connect. Also the restart path.
    async fn connect(&mut self) -> Result<String, CoreError> {
        let user_id = self.session.user_id().await;
        self.connection
            .connect(&self.registry, self.session.session(), &user_id, &self.events)?;
        Ok(user_id)
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.connection.state(),
            reconnect_attempts: self.connection.attempts(),
            logged_in: self.session.session().is_some(),
            refresh_in: self.session.periodic_deadline().remaining(),
            retry_in: self.session.retry_deadline().remaining(),
            restart_in: self.restart.remaining(),
            outstanding: self
                .correlator
                .outstanding()
                .map(OutstandingCommandView::from)
                .collect(),
        }
    }

    // ── Link events ──────────────────────────────────────────────────

    fn handle_link_event(&mut self, event: LinkEvent) {
        let outcome = self.connection.handle_event(
            event,
            &mut self.registry,
            &mut self.correlator,
            &self.events,
            local_now(),
        );
        match outcome {
            LinkOutcome::None => {}
            LinkOutcome::Connected => {
                if self.restart.is_pending() {
                    debug!("connected, cancelling pending restart");
                }
                self.restart.cancel();
            }
            LinkOutcome::GaveUp => {
                warn!(
                    cooldown_secs = self.restart_cooldown.as_secs(),
                    "MQTT connection closed; restarting after cooldown"
                );
                self.restart.schedule(self.restart_cooldown);
            }
        }
    }

    // ── Token refresh ────────────────────────────────────────────────

    fn spawn_refresh(&mut self) {
        let Some(request) = self.session.begin_refresh() else {
            return;
        };
        let tx = self.internal_tx.clone();
        self.refresh_task = Some(tokio::spawn(async move {
            let result = request.await;
            let _ = tx.send(Internal::Refreshed(result));
        }));
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Refreshed(result) => {
                self.refresh_task = None;
                if let Some(headers) = self.session.complete_refresh(result) {
                    self.connection.update_auth(headers);
                }
            }
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Close the link and cancel every timer and background task.
    fn shutdown(&mut self) {
        self.session.cancel_timers();
        self.restart.cancel();
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
        self.connection.stop(&self.events);
        info!("client stopped");
    }
}

/// Device clocks run on local time.
fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}
