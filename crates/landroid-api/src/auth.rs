use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::error::Error;

/// Name of the AWS IoT custom authorizer the cloud registers for app clients.
pub const CUSTOM_AUTHORIZER_NAME: &str = "com-worxlandroid-customer";

/// Scope requested on the refresh grant. The password grant asks for `*`.
pub const REFRESH_SCOPE: &str = "user:profile mower:firmware mower:view mower:pair user:manage \
     mower:update mower:activity_log user:certificate data:products mower:unpair \
     mower:warranty mobile:notifications mower:lawn";

/// OAuth session returned by the token endpoint.
///
/// Fields mirror the response body; `issued_at` is the only derived value
/// and is stamped locally when the body is decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    #[serde(deserialize_with = "secret")]
    pub access_token: SecretString,
    #[serde(deserialize_with = "secret")]
    pub refresh_token: SecretString,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(skip, default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
    /// Everything else the token endpoint returned.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Session {
    /// Derive the MQTT custom-auth headers from the access token.
    pub fn custom_auth_headers(&self) -> Result<CustomAuthHeaders, Error> {
        CustomAuthHeaders::from_access_token(&self.access_token)
    }
}

fn secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// Headers sent on the MQTT WebSocket upgrade for the cloud's custom
/// authorizer.
///
/// The access token is a JWT. After mapping the URL-safe alphabet back to
/// standard base64 (`_` -> `/`, `-` -> `+`) it is split on `.`: the third
/// segment becomes the authorizer signature, the first two (rejoined) the
/// `jwt` header.
#[derive(Clone, PartialEq, Eq)]
pub struct CustomAuthHeaders {
    pub authorizer_name: String,
    pub signature: String,
    pub jwt: String,
}

impl CustomAuthHeaders {
    pub fn from_access_token(token: &SecretString) -> Result<Self, Error> {
        let normalized = token.expose_secret().replace('_', "/").replace('-', "+");
        let parts: Vec<&str> = normalized.split('.').collect();
        let [header, claims, signature] = parts.as_slice() else {
            return Err(Error::InvalidToken {
                segments: parts.len(),
            });
        };

        Ok(Self {
            authorizer_name: CUSTOM_AUTHORIZER_NAME.to_owned(),
            signature: (*signature).to_owned(),
            jwt: format!("{header}.{claims}"),
        })
    }

    /// Header name/value pairs in the order they are applied to the request.
    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("x-amz-customauthorizer-name", self.authorizer_name.as_str()),
            ("x-amz-customauthorizer-signature", self.signature.as_str()),
            ("jwt", self.jwt.as_str()),
        ]
    }
}

impl std::fmt::Debug for CustomAuthHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomAuthHeaders")
            .field("authorizer_name", &self.authorizer_name)
            .field("signature", &"[REDACTED]")
            .field("jwt", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn session_json(token: &str) -> serde_json::Value {
        serde_json::json!({
            "access_token": token,
            "refresh_token": "refresh-1",
            "expires_in": 3600,
            "token_type": "Bearer",
            "id_token": "xyz"
        })
    }

    #[test]
    fn session_mirrors_body() {
        let session: Session = serde_json::from_value(session_json("a.b.c")).unwrap();
        assert_eq!(session.access_token.expose_secret(), "a.b.c");
        assert_eq!(session.refresh_token.expose_secret(), "refresh-1");
        assert_eq!(session.expires_in, 3600);
        assert_eq!(session.token_type.as_deref(), Some("Bearer"));
        assert_eq!(session.extra["id_token"], "xyz");
    }

    #[test]
    fn headers_split_token_segments() {
        let token = SecretString::from("hdr_1.clm-2.sig_3-x".to_owned());
        let headers = CustomAuthHeaders::from_access_token(&token).unwrap();
        assert_eq!(headers.authorizer_name, CUSTOM_AUTHORIZER_NAME);
        assert_eq!(headers.jwt, "hdr/1.clm+2");
        assert_eq!(headers.signature, "sig/3+x");
    }

    #[test]
    fn headers_reject_non_jwt() {
        let token = SecretString::from("opaque-token".to_owned());
        let err = CustomAuthHeaders::from_access_token(&token).unwrap_err();
        assert!(matches!(err, Error::InvalidToken { segments: 1 }));
    }

    #[test]
    fn debug_redacts_material() {
        let token = SecretString::from("a.b.secret".to_owned());
        let headers = CustomAuthHeaders::from_access_token(&token).unwrap();
        let rendered = format!("{headers:?}");
        assert!(!rendered.contains("secret"));
    }
}
