// ── Session manager ──
//
// Owns the OAuth session for one account: login, the refresh schedule,
// and the 401-triggered one-shot refresh. HTTP refreshes run off the
// engine task; their result comes back through `complete_refresh`.

use std::future::Future;
use std::time::Duration;

use landroid_api::{CloudClient, CustomAuthHeaders, Session};
use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, Credentials};
use crate::error::CoreError;
use crate::event::{ClientEvent, EventSurface};
use crate::timer::Deadline;

/// User segment of the MQTT client id when the profile lookup fails.
pub const UNKNOWN_USER: &str = "unknown";

pub struct SessionManager {
    client: CloudClient,
    credentials: Credentials,
    session: Option<Session>,
    refresh_margin: Duration,
    refresh_floor: Duration,
    unauthorized_retry: Duration,
    periodic: Deadline,
    retry: Deadline,
    refresh_in_flight: bool,
}

impl SessionManager {
    pub fn new(client: CloudClient, config: &ClientConfig) -> Self {
        Self {
            client,
            credentials: config.credentials.clone(),
            session: None,
            refresh_margin: config.refresh_margin,
            refresh_floor: config.refresh_floor,
            unauthorized_retry: config.unauthorized_retry,
            periodic: Deadline::default(),
            retry: Deadline::default(),
            refresh_in_flight: false,
        }
    }

    pub fn client(&self) -> &CloudClient {
        &self.client
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn access_token(&self) -> Option<&SecretString> {
        self.session.as_ref().map(|s| &s.access_token)
    }

    // ── Login ────────────────────────────────────────────────────────

    /// Password grant. On failure the current session is left as it was
    /// and an `AuthenticationFailed` event carries the error body.
    pub async fn login(&mut self, events: &EventSurface) -> Result<&Session, CoreError> {
        let result = self
            .client
            .login(&self.credentials.username, &self.credentials.password)
            .await;

        match result {
            Ok(session) => {
                info!(
                    user = %self.credentials.username,
                    expires_in = session.expires_in,
                    "logged in"
                );
                self.install(session);
                self.session.as_ref().ok_or_else(|| {
                    CoreError::Internal("session missing right after login".into())
                })
            }
            Err(e) => {
                warn!(error = %e, "login failed");
                let payload = e.auth_payload().cloned();
                events.emit(ClientEvent::AuthenticationFailed {
                    payload: payload.clone().unwrap_or(Value::Null),
                });
                Err(CoreError::Authentication {
                    message: e.to_string(),
                    payload,
                })
            }
        }
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Build the refresh request, or `None` when there is nothing to
    /// refresh or a refresh is already running.
    pub fn begin_refresh(
        &mut self,
    ) -> Option<impl Future<Output = Result<Session, landroid_api::Error>> + Send + use<>> {
        if self.refresh_in_flight {
            debug!("refresh already in flight");
            return None;
        }
        let Some(session) = &self.session else {
            debug!("no session to refresh");
            return None;
        };

        self.refresh_in_flight = true;
        let client = self.client.clone();
        let refresh_token = session.refresh_token.clone();
        Some(async move { client.refresh(&refresh_token).await })
    }

    /// Apply a finished refresh. Returns fresh auth headers for the live
    /// link when the session was replaced.
    pub fn complete_refresh(
        &mut self,
        result: Result<Session, landroid_api::Error>,
    ) -> Option<CustomAuthHeaders> {
        self.refresh_in_flight = false;
        match result {
            Ok(session) => {
                info!(expires_in = session.expires_in, "token refreshed");
                self.install(session);
                match self.session.as_ref().map(Session::custom_auth_headers) {
                    Some(Ok(headers)) => Some(headers),
                    Some(Err(e)) => {
                        warn!(error = %e, "refreshed token cannot authorize MQTT");
                        None
                    }
                    None => None,
                }
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, keeping previous session");
                None
            }
        }
    }

    /// Replace the session wholesale and restart the periodic schedule.
    fn install(&mut self, session: Session) {
        let period = self.refresh_period_for(session.expires_in);
        self.session = Some(session);
        self.periodic.schedule(period);
        debug!(period_secs = period.as_secs(), "periodic refresh scheduled");
    }

    /// `expires_in - margin`, never shorter than the floor.
    pub fn refresh_period_for(&self, expires_in: u64) -> Duration {
        Duration::from_secs(expires_in)
            .saturating_sub(self.refresh_margin)
            .max(self.refresh_floor)
    }

    /// Current periodic refresh period.
    pub fn refresh_period(&self) -> Option<Duration> {
        self.session
            .as_ref()
            .map(|s| self.refresh_period_for(s.expires_in))
    }

    // ── Timers ───────────────────────────────────────────────────────

    pub fn periodic_deadline(&self) -> Deadline {
        self.periodic
    }

    pub fn retry_deadline(&self) -> Deadline {
        self.retry
    }

    /// The periodic timer fired: re-arm it with the same period so a
    /// failed refresh is retried one period later.
    pub fn on_periodic_due(&mut self) {
        self.periodic.cancel();
        if let Some(period) = self.refresh_period() {
            self.periodic.schedule(period);
        }
    }

    pub fn on_retry_due(&mut self) {
        self.retry.cancel();
    }

    /// An authenticated call got HTTP 401: refresh once after the retry
    /// delay, replacing any one-shot refresh already pending.
    pub fn note_unauthorized(&mut self, path: &str) {
        info!(
            path,
            delay_secs = self.unauthorized_retry.as_secs(),
            "received 401, refreshing token later"
        );
        self.retry.schedule(self.unauthorized_retry);
    }

    pub fn cancel_timers(&mut self) {
        self.periodic.cancel();
        self.retry.cancel();
    }

    // ── Profile ──────────────────────────────────────────────────────

    /// Look up the account's user id for the MQTT client id. Failures fall
    /// back to [`UNKNOWN_USER`]; a 401 also schedules the one-shot refresh.
    pub async fn user_id(&mut self) -> String {
        let Some(token) = self.access_token().cloned() else {
            return UNKNOWN_USER.into();
        };
        match self.client.current_user(&token).await {
            Ok(user) => user.id,
            Err(e) if e.is_unauthorized() => {
                self.note_unauthorized("users/me");
                UNKNOWN_USER.into()
            }
            Err(e) => {
                warn!(error = %e, "user profile lookup failed");
                UNKNOWN_USER.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use landroid_api::{Cloud, CloudEndpoints, TransportConfig};
    use secrecy::ExposeSecret;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn setup() -> (MockServer, SessionManager) {
        let server = MockServer::start().await;
        let base = Url::parse(&server.uri()).unwrap();
        let endpoints = CloudEndpoints {
            api_base: base.join("/api/v2/").unwrap(),
            token_url: base.join("/oauth/token").unwrap(),
            client_id: "cid".into(),
            mqtt_prefix: "WX".into(),
        };
        let config = ClientConfig::new(Cloud::Worx, "me@example.com", SecretString::from("pw".to_owned()));
        let client = CloudClient::new(endpoints, &TransportConfig::default()).unwrap();
        (server, SessionManager::new(client, &config))
    }

    fn token(access: &str, refresh: &str, expires_in: u64) -> Value {
        json!({ "access_token": access, "refresh_token": refresh, "expires_in": expires_in })
    }

    #[tokio::test]
    async fn login_stores_session_and_schedules_refresh() {
        let (server, mut manager) = setup().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token("a.b.c", "r1", 3600)))
            .mount(&server)
            .await;

        let events = EventSurface::new();
        manager.login(&events).await.unwrap();

        assert_eq!(manager.access_token().unwrap().expose_secret(), "a.b.c");
        assert!(manager.periodic_deadline().is_pending());
        assert_eq!(manager.refresh_period(), Some(Duration::from_secs(3500)));
    }

    #[tokio::test]
    async fn failed_login_keeps_session_and_emits_event() {
        let (server, mut manager) = setup().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "invalid_grant" })))
            .mount(&server)
            .await;

        let events = EventSurface::new();
        let mut rx = events.subscribe();
        let err = manager.login(&events).await.unwrap_err();

        assert!(matches!(err, CoreError::Authentication { .. }));
        assert!(manager.session().is_none());
        match rx.recv().await.unwrap() {
            ClientEvent::AuthenticationFailed { payload } => {
                assert_eq!(payload["error"], "invalid_grant");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_login_without_body_emits_null() {
        let (server, mut manager) = setup().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let events = EventSurface::new();
        let mut rx = events.subscribe();
        manager.login(&events).await.unwrap_err();
        assert_eq!(
            rx.recv().await.unwrap(),
            ClientEvent::AuthenticationFailed {
                payload: Value::Null
            }
        );
    }

    #[tokio::test]
    async fn refresh_replaces_session_wholesale() {
        let (server, mut manager) = setup().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({ "grant_type": "password" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(token("a.b.c", "r1", 3600)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({ "grant_type": "refresh_token", "refresh_token": "r1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(token("x.y.z", "r2", 600)))
            .mount(&server)
            .await;

        manager.login(&EventSurface::new()).await.unwrap();
        let request = manager.begin_refresh().unwrap();
        assert!(manager.begin_refresh().is_none(), "refreshes coalesce");

        let headers = manager.complete_refresh(request.await).unwrap();
        assert_eq!(headers.jwt, "x.y");
        assert_eq!(headers.signature, "z");

        let session = manager.session().unwrap();
        assert_eq!(session.refresh_token.expose_secret(), "r2");
        assert_eq!(manager.refresh_period(), Some(Duration::from_secs(500)));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_session() {
        let (server, mut manager) = setup().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({ "grant_type": "password" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(token("a.b.c", "r1", 3600)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({ "grant_type": "refresh_token" })))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        manager.login(&EventSurface::new()).await.unwrap();
        let request = manager.begin_refresh().unwrap();
        assert!(manager.complete_refresh(request.await).is_none());
        assert_eq!(manager.access_token().unwrap().expose_secret(), "a.b.c");
        assert!(manager.begin_refresh().is_some(), "next refresh may start");
    }

    fn offline_manager() -> SessionManager {
        let config = ClientConfig::new(Cloud::Worx, "me@example.com", SecretString::from("pw".to_owned()));
        let client = CloudClient::new(config.resolve_endpoints().unwrap(), &TransportConfig::default()).unwrap();
        SessionManager::new(client, &config)
    }

    #[test]
    fn refresh_period_is_floored() {
        let manager = offline_manager();
        assert_eq!(manager.refresh_period_for(3600), Duration::from_secs(3500));
        assert_eq!(manager.refresh_period_for(120), Duration::from_secs(60));
        assert_eq!(manager.refresh_period_for(0), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_retry_is_coalesced() {
        let mut manager = offline_manager();
        manager.note_unauthorized("product-items");
        tokio::time::advance(Duration::from_secs(20)).await;
        manager.note_unauthorized("users/me");
        assert_eq!(
            manager.retry_deadline().remaining(),
            Some(Duration::from_secs(30))
        );
    }

    #[tokio::test]
    async fn user_id_falls_back_on_401() {
        let (server, mut manager) = setup().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token("a.b.c", "r1", 3600)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        manager.login(&EventSurface::new()).await.unwrap();
        assert_eq!(manager.user_id().await, UNKNOWN_USER);
        assert!(manager.retry_deadline().is_pending());
    }
}
