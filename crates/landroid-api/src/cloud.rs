// Cloud presets
//
// The four mower brands share one backend design but run separate
// deployments: each has its own REST host, OAuth issuer, OAuth client id
// and MQTT client-id prefix. `CloudEndpoints` is the resolved form the
// HTTP client and the MQTT link consume; tests build it by hand to point
// at a mock server.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use url::Url;

use crate::error::Error;

/// A vendor cloud deployment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Cloud {
    /// Worx Landroid (default).
    #[default]
    Worx,
    /// Kress Mission.
    Kress,
    /// LandXcape.
    Landxcape,
    /// Ferrex (smartmower.cloud).
    Ferrex,
}

impl Cloud {
    /// REST API host.
    pub fn api_host(self) -> &'static str {
        match self {
            Self::Worx => "api.worxlandroid.com",
            Self::Kress => "api.kress-robotik.com",
            Self::Landxcape => "api.landxcape-services.com",
            Self::Ferrex => "api.watermelon.smartmower.cloud",
        }
    }

    /// OAuth issuer base URL (trailing slash included).
    pub fn login_base(self) -> &'static str {
        match self {
            Self::Worx => "https://id.worx.com/",
            Self::Kress => "https://id.kress.com/",
            Self::Landxcape => "https://id.landxcape-services.com/",
            Self::Ferrex => "https://id.watermelon.smartmower.cloud/",
        }
    }

    /// OAuth client id registered for the vendor mobile app.
    pub fn client_id(self) -> &'static str {
        match self {
            Self::Worx => "150da4d2-bb44-433b-9429-3773adc70a2a",
            Self::Kress => "931d4bc4-3192-405a-be78-98e43486dc59",
            Self::Landxcape => "dec998a9-066f-433b-987a-f5fc54d3af7c",
            Self::Ferrex => "10078D10-3840-474A-848A-5EED949AB0FC",
        }
    }

    /// Prefix of the MQTT client id (`<prefix>/USER/...`).
    pub fn mqtt_prefix(self) -> &'static str {
        match self {
            Self::Worx => "WX",
            Self::Kress => "KR",
            Self::Landxcape => "LX",
            Self::Ferrex => "FE",
        }
    }

    /// Resolve the preset into concrete endpoints.
    pub fn endpoints(self) -> Result<CloudEndpoints, Error> {
        let api_base = Url::parse(&format!("https://{}/api/v2/", self.api_host()))?;
        let token_url = Url::parse(self.login_base())?.join("oauth/token")?;
        Ok(CloudEndpoints {
            api_base,
            token_url,
            client_id: self.client_id().to_owned(),
            mqtt_prefix: self.mqtt_prefix().to_owned(),
        })
    }
}

/// Concrete endpoints for one cloud deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEndpoints {
    /// REST base, e.g. `https://api.worxlandroid.com/api/v2/`.
    /// Must end with a slash so relative paths join underneath it.
    pub api_base: Url,
    /// OAuth token endpoint used for both password and refresh grants.
    pub token_url: Url,
    /// OAuth client id sent with every token request.
    pub client_id: String,
    /// MQTT client-id prefix.
    pub mqtt_prefix: String,
}

impl CloudEndpoints {
    /// Build a REST URL below `api_base`.
    pub fn api_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.api_base.join(path.trim_start_matches('/'))?)
    }
}
