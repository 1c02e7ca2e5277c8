// ── Core error types ──
//
// Lifecycle-level errors from landroid-core. Consumers see these rather
// than raw HTTP statuses; the `From<landroid_api::Error>` impl translates
// wire-layer failures into the closest lifecycle category.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session ──────────────────────────────────────────────────────
    /// Login failed. `payload` is the token endpoint's error body, if any.
    #[error("Authentication failed: {message}")]
    Authentication {
        message: String,
        payload: Option<serde_json::Value>,
    },

    /// An authenticated call came back 401. A one-shot refresh has been
    /// scheduled; the call itself yields nothing.
    #[error("Access token rejected on {path}; refresh scheduled")]
    TokenExpired { path: String },

    // ── Registry ─────────────────────────────────────────────────────
    #[error("Device listing failed: {message}")]
    Registry { message: String, unauthorized: bool },

    #[error("No devices registered on this account")]
    NoDevices,

    #[error("Device not found: {serial}")]
    DeviceNotFound { serial: String },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Client is not running")]
    NotStarted,

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the failure was an HTTP 401 that a refresh may cure.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired { .. }
                | Self::Registry {
                    unauthorized: true,
                    ..
                }
        )
    }

    pub(crate) fn registry(err: landroid_api::Error) -> Self {
        Self::Registry {
            unauthorized: err.is_unauthorized(),
            message: err.to_string(),
        }
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<landroid_api::Error> for CoreError {
    fn from(err: landroid_api::Error) -> Self {
        match err {
            landroid_api::Error::Authentication {
                message, payload, ..
            } => CoreError::Authentication { message, payload },
            landroid_api::Error::InvalidToken { .. } => CoreError::Authentication {
                message: err.to_string(),
                payload: None,
            },
            landroid_api::Error::Unauthorized { path } => CoreError::TokenExpired { path },
            landroid_api::Error::Transport(_)
            | landroid_api::Error::Api { .. }
            | landroid_api::Error::Link(_) => CoreError::Connection {
                message: err.to_string(),
            },
            landroid_api::Error::InvalidUrl(_) => CoreError::Config {
                message: err.to_string(),
            },
            landroid_api::Error::Deserialization { .. } => CoreError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn unauthorized_maps_to_token_expired() {
        let err: CoreError = landroid_api::Error::Unauthorized {
            path: "users/me".into(),
        }
        .into();
        assert!(matches!(err, CoreError::TokenExpired { ref path } if path == "users/me"));
        assert!(err.is_unauthorized());
    }

    #[test]
    fn registry_keeps_unauthorized_flag() {
        let err = CoreError::registry(landroid_api::Error::Unauthorized {
            path: "product-items".into(),
        });
        assert!(err.is_unauthorized());

        let err = CoreError::registry(landroid_api::Error::Api {
            status: 500,
            message: "boom".into(),
        });
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn auth_payload_survives_conversion() {
        let err: CoreError = landroid_api::Error::Authentication {
            status: 400,
            message: "invalid_grant".into(),
            payload: Some(serde_json::json!({ "error": "invalid_grant" })),
        }
        .into();
        match err {
            CoreError::Authentication { payload, .. } => {
                assert_eq!(payload.unwrap()["error"], "invalid_grant");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
