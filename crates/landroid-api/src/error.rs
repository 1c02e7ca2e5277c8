use thiserror::Error;

/// Top-level error type for the `landroid-api` crate.
///
/// Covers every failure mode across the cloud surfaces:
/// token exchange, REST transport, payload decoding, and the MQTT link.
/// `landroid-core` maps these into its own lifecycle errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Token exchange rejected (wrong credentials, revoked refresh token, ...).
    ///
    /// `payload` carries the response body when the endpoint returned JSON,
    /// so callers can forward it verbatim to their own listeners.
    #[error("Authentication failed (HTTP {status}): {message}")]
    Authentication {
        status: u16,
        message: String,
        payload: Option<serde_json::Value>,
    },

    /// An authenticated request came back with HTTP 401.
    #[error("Unauthorized request to {path} -- access token expired or revoked")]
    Unauthorized { path: String },

    /// The access token does not have the three dot-separated JWT segments
    /// needed to derive the MQTT custom-auth headers.
    #[error("Malformed access token: expected 3 segments, got {segments}")]
    InvalidToken { segments: usize },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── REST ────────────────────────────────────────────────────────
    /// Non-success response from the REST API.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── MQTT link ───────────────────────────────────────────────────
    /// The pub/sub link refused a request (closed, queue full, bad options).
    #[error("MQTT link error: {0}")]
    Link(String),
}

impl Error {
    /// Returns `true` if the cloud answered 401 and a token refresh
    /// might resolve it.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// The JSON body attached to an authentication failure, if any.
    pub fn auth_payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Authentication { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_detected() {
        let err = Error::Unauthorized {
            path: "users/me".into(),
        };
        assert!(err.is_unauthorized());
    }

    #[test]
    fn server_errors_are_not_unauthorized() {
        let err = Error::Api {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn auth_payload_is_exposed() {
        let body = serde_json::json!({ "error": "invalid_grant" });
        let err = Error::Authentication {
            status: 400,
            message: "invalid_grant".into(),
            payload: Some(body.clone()),
        };
        assert_eq!(err.auth_payload(), Some(&body));
    }
}
