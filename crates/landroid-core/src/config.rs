// ── Runtime client configuration ──
//
// Describes which cloud to talk to, with which account, and how the
// lifecycle engine is tuned. Never touches disk: the CLI (via
// `landroid-config`) builds a `ClientConfig` and hands it in.

use std::time::Duration;

use landroid_api::{Cloud, CloudClient, CloudEndpoints, ReconnectConfig, TransportConfig};
use secrecy::SecretString;

use crate::error::CoreError;

/// Account credentials for the password grant.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Configuration for one client instance (one account on one cloud).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub cloud: Cloud,
    /// Overrides the preset endpoints (mock servers, staging deployments).
    pub endpoints: Option<CloudEndpoints>,
    pub credentials: Credentials,
    /// Used as MQTT username, client-id segment and user agent.
    pub app_name: String,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Periodic refresh fires this long before the token expires.
    pub refresh_margin: Duration,
    /// Lower bound on the periodic refresh period.
    pub refresh_floor: Duration,
    /// Delay of the one-shot refresh scheduled after a 401.
    pub unauthorized_retry: Duration,
    /// Reconnect attempts tolerated before the link is forced closed.
    pub max_reconnect_attempts: u32,
    /// How long to wait before a forced restart.
    pub restart_cooldown: Duration,
    /// Outstanding-command count above which the set is cleared.
    pub outstanding_limit: usize,
    /// Language code used until a device reports its own.
    pub default_language: String,
    /// Fallback broker when a device has no `mqtt_endpoint`.
    pub default_mqtt_endpoint: String,
    pub reconnect: ReconnectConfig,
    pub keep_alive: Duration,
}

impl ClientConfig {
    pub const DEFAULT_APP_NAME: &'static str = "landroid-rs";
    pub const DEFAULT_MQTT_ENDPOINT: &'static str = "iot.eu-west-1.worxlandroid.com";

    /// Defaults for `cloud` with the given account.
    pub fn new(cloud: Cloud, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            cloud,
            endpoints: None,
            credentials: Credentials {
                username: username.into(),
                password,
            },
            app_name: Self::DEFAULT_APP_NAME.into(),
            timeout: Duration::from_secs(30),
            refresh_margin: Duration::from_secs(100),
            refresh_floor: Duration::from_secs(60),
            unauthorized_retry: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            restart_cooldown: Duration::from_secs(60 * 60),
            outstanding_limit: 50,
            default_language: "de".into(),
            default_mqtt_endpoint: Self::DEFAULT_MQTT_ENDPOINT.into(),
            reconnect: ReconnectConfig::default(),
            keep_alive: Duration::from_secs(30),
        }
    }

    /// Endpoints to use: the override if set, else the cloud preset.
    pub fn resolve_endpoints(&self) -> Result<CloudEndpoints, CoreError> {
        match &self.endpoints {
            Some(endpoints) => Ok(endpoints.clone()),
            None => self.cloud.endpoints().map_err(|e| CoreError::Config {
                message: format!("cannot resolve {} endpoints: {e}", self.cloud),
            }),
        }
    }

    /// `"<app name> <version>"`.
    pub fn user_agent(&self) -> String {
        format!("{} {}", self.app_name, env!("CARGO_PKG_VERSION"))
    }

    /// HTTP client for the resolved endpoints, with a fresh cookie jar.
    pub fn cloud_client(&self) -> Result<CloudClient, CoreError> {
        let transport = TransportConfig {
            timeout: self.timeout,
            ..TransportConfig::default()
        }
        .with_user_agent(self.user_agent())
        .with_cookie_jar();
        Ok(CloudClient::new(self.resolve_endpoints()?, &transport)?)
    }
}
