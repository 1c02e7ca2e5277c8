// Cloud HTTP client
//
// Wraps `reqwest::Client` with the token exchange (password and refresh
// grants) and the two bearer-authenticated REST calls the lifecycle
// needs: the device listing and the user profile. The client is stateless
// apart from the cookie jar; callers pass the access token per call.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace};
use url::Url;

use crate::auth::{REFRESH_SCOPE, Session};
use crate::cloud::CloudEndpoints;
use crate::error::Error;
use crate::models::{ProductItem, UserProfile};
use crate::transport::TransportConfig;

/// Listing filter: active devices with GPS status.
const PRODUCT_ITEMS_PATH: &str = "product-items?status=1&gps_status=1";
const USER_PATH: &str = "users/me";

/// HTTP client for one cloud deployment.
#[derive(Debug, Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    endpoints: CloudEndpoints,
}

impl CloudClient {
    /// Create a client from a `TransportConfig`, adding a cookie jar when
    /// the config has none.
    pub fn new(endpoints: CloudEndpoints, transport: &TransportConfig) -> Result<Self, Error> {
        let config = if transport.cookie_jar.is_some() {
            transport.clone()
        } else {
            transport.clone().with_cookie_jar()
        };
        Ok(Self {
            http: config.build_client()?,
            endpoints,
        })
    }

    pub fn endpoints(&self) -> &CloudEndpoints {
        &self.endpoints
    }

    // ── Token exchange ───────────────────────────────────────────────

    /// Password grant.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<Session, Error> {
        let body = json!({
            "client_id": self.endpoints.client_id,
            "username": username,
            "password": password.expose_secret(),
            "scope": "*",
            "grant_type": "password",
        });
        debug!(url = %self.endpoints.token_url, "requesting token (password grant)");
        self.token_request(&body).await
    }

    /// Refresh grant.
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<Session, Error> {
        let body = json!({
            "client_id": self.endpoints.client_id,
            "scope": REFRESH_SCOPE,
            "refresh_token": refresh_token.expose_secret(),
            "grant_type": "refresh_token",
        });
        debug!(url = %self.endpoints.token_url, "requesting token (refresh grant)");
        self.token_request(&body).await
    }

    async fn token_request(&self, body: &Value) -> Result<Session, Error> {
        let resp = self
            .http
            .post(self.endpoints.token_url.clone())
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let text = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            let payload = serde_json::from_str::<Value>(&text).ok();
            let message = payload
                .as_ref()
                .and_then(|p| {
                    p.get("error_description")
                        .or_else(|| p.get("message"))
                        .or_else(|| p.get("error"))
                })
                .and_then(Value::as_str)
                .map_or_else(|| preview(&text), str::to_owned);
            return Err(Error::Authentication {
                status: status.as_u16(),
                message,
                payload,
            });
        }

        decode(&text)
    }

    // ── REST ─────────────────────────────────────────────────────────

    /// `GET product-items?status=1&gps_status=1`.
    pub async fn list_devices(&self, access_token: &SecretString) -> Result<Vec<ProductItem>, Error> {
        self.get(PRODUCT_ITEMS_PATH, access_token).await
    }

    /// `GET users/me`.
    pub async fn current_user(&self, access_token: &SecretString) -> Result<UserProfile, Error> {
        self.get(USER_PATH, access_token).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &SecretString,
    ) -> Result<T, Error> {
        let url: Url = self.endpoints.api_url(path)?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .bearer_auth(access_token.expose_secret())
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized {
                path: path.to_owned(),
            });
        }

        let text = resp.text().await.map_err(Error::Transport)?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: preview(&text),
            });
        }

        trace!(bytes = text.len(), "response body received");
        decode(&text)
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(body)),
        body: body.to_owned(),
    })
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}
