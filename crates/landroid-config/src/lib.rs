//! Shared configuration for landroid tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `landroid_core::ClientConfig`. The CLI layers its
//! global flags on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use landroid_core::{ClientConfig, Cloud, CloudEndpoints};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keyring service name; entries are keyed `<profile>/password`.
pub const KEYRING_SERVICE: &str = "landroid";

/// Environment variable consulted when a profile names no `password_env`.
pub const PASSWORD_ENV: &str = "LANDROID_PASSWORD";

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "LANDROID_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, falling back to the default profile.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// One cloud account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Vendor cloud: worx, kress, landxcape or ferrex.
    #[serde(default)]
    pub cloud: Cloud,

    /// Account e-mail (the OAuth username).
    pub email: String,

    /// Password (plaintext — prefer keyring or env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable name containing the password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Overrides the app name sent as MQTT username and user agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    /// HTTP timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Language code used until a device reports its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// REST base override, for staging deployments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Token endpoint override; required when `api_url` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `LANDROID_CONFIG`, else the platform
/// config dir.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "landroid", "landroid").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("landroid");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then `path` (if it exists), then `LANDROID_*` variables.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LANDROID_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the account password: the profile's `password_env`, then
/// `LANDROID_PASSWORD`, then the system keyring, then plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_password_with(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        keyring_password,
    )
}

/// Password chain with injectable env and keyring lookups.
pub fn resolve_password_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env, else the global variable
    let env_name = profile.password_env.as_deref().unwrap_or(PASSWORD_ENV);
    if let Some(val) = env(env_name) {
        return Ok(SecretString::from(val));
    }

    // 2. System keyring
    if let Some(secret) = keyring(profile_name) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

fn keyring_password(profile_name: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))
        .ok()?
        .get_password()
        .ok()
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(password)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `ClientConfig` from a profile and an already-resolved password.
pub fn profile_to_client_config(
    profile: &Profile,
    password: SecretString,
) -> Result<ClientConfig, ConfigError> {
    if profile.email.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "email".into(),
            reason: "must not be empty".into(),
        });
    }

    let mut config = ClientConfig::new(profile.cloud, profile.email.clone(), password);
    if let Some(ref app_name) = profile.app_name {
        config.app_name.clone_from(app_name);
    }
    if let Some(secs) = profile.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(ref language) = profile.language {
        config.default_language.clone_from(language);
    }
    config.endpoints = endpoint_overrides(profile)?;
    Ok(config)
}

fn endpoint_overrides(profile: &Profile) -> Result<Option<CloudEndpoints>, ConfigError> {
    let (api_url, token_url) = match (&profile.api_url, &profile.token_url) {
        (None, None) => return Ok(None),
        (Some(api), Some(token)) => (api, token),
        _ => {
            return Err(ConfigError::Validation {
                field: "api_url".into(),
                reason: "api_url and token_url must be set together".into(),
            });
        }
    };

    let mut api_base = parse_url("api_url", api_url)?;
    if !api_base.path().ends_with('/') {
        let path = format!("{}/", api_base.path());
        api_base.set_path(&path);
    }
    Ok(Some(CloudEndpoints {
        api_base,
        token_url: parse_url("token_url", token_url)?,
        client_id: profile.cloud.client_id().into(),
        mqtt_prefix: profile.cloud.mqtt_prefix().into(),
    }))
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "home"

[defaults]
output = "json"

[profiles.home]
cloud = "kress"
email = "me@example.com"
password_env = "HOME_MOWER_PW"
timeout = 10

[profiles.cabin]
email = "cabin@example.com"
password = "plain"
language = "it"
"#;

    fn sample_profile() -> Profile {
        Profile {
            email: "me@example.com".into(),
            ..Profile::default()
        }
    }

    #[test]
    fn loads_profiles_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.defaults.output, "json");
        assert_eq!(config.defaults.color, "auto");
        assert_eq!(config.defaults.timeout, 30);

        let (name, home) = config.profile(None).unwrap();
        assert_eq!(name, "home");
        assert_eq!(home.cloud, Cloud::Kress);
        assert_eq!(home.timeout, Some(10));

        let (_, cabin) = config.profile(Some("cabin")).unwrap();
        assert_eq!(cabin.cloud, Cloud::Worx);
        assert!(matches!(
            config.profile(Some("missing")),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn save_then_load_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.profiles.insert("default".into(), sample_profile());

        save_config_to(&config, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("password"), "{text}");

        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn password_chain_order() {
        let mut profile = sample_profile();
        profile.password = Some("plain".into());
        profile.password_env = Some("MY_PW".into());

        let env = |name: &str| (name == "MY_PW").then(|| "from-env".to_owned());
        let keyring = |_: &str| Some("from-keyring".to_owned());
        let none = |_: &str| None;

        let pw = resolve_password_with(&profile, "p", env, keyring).unwrap();
        assert_eq!(pw.expose_secret(), "from-env");

        let pw = resolve_password_with(&profile, "p", none, keyring).unwrap();
        assert_eq!(pw.expose_secret(), "from-keyring");

        let pw = resolve_password_with(&profile, "p", none, none).unwrap();
        assert_eq!(pw.expose_secret(), "plain");

        profile.password = None;
        assert!(matches!(
            resolve_password_with(&profile, "p", none, none),
            Err(ConfigError::NoCredentials { .. })
        ));
    }

    #[test]
    fn global_password_variable_is_the_fallback_env() {
        let profile = sample_profile();
        let env = |name: &str| (name == PASSWORD_ENV).then(|| "global".to_owned());
        let pw = resolve_password_with(&profile, "p", env, |_| None).unwrap();
        assert_eq!(pw.expose_secret(), "global");
    }

    #[test]
    fn profile_translates_to_client_config() {
        let mut profile = sample_profile();
        profile.cloud = Cloud::Landxcape;
        profile.app_name = Some("mowbot".into());
        profile.timeout = Some(5);
        profile.language = Some("fr".into());

        let config = profile_to_client_config(&profile, SecretString::from("pw".to_owned())).unwrap();
        assert_eq!(config.cloud, Cloud::Landxcape);
        assert_eq!(config.credentials.username, "me@example.com");
        assert_eq!(config.app_name, "mowbot");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.default_language, "fr");
        assert_eq!(config.endpoints, None);
        assert_eq!(config.max_reconnect_attempts, 10);
    }

    #[test]
    fn endpoint_overrides_need_both_urls() {
        let mut profile = sample_profile();
        profile.api_url = Some("http://127.0.0.1:9000/api/v2".into());
        let pw = || SecretString::from("pw".to_owned());
        assert!(matches!(
            profile_to_client_config(&profile, pw()),
            Err(ConfigError::Validation { .. })
        ));

        profile.token_url = Some("http://127.0.0.1:9000/oauth/token".into());
        let endpoints = profile_to_client_config(&profile, pw())
            .unwrap()
            .endpoints
            .unwrap();
        assert_eq!(endpoints.api_base.as_str(), "http://127.0.0.1:9000/api/v2/");
        assert_eq!(endpoints.mqtt_prefix, "WX");
    }

    #[test]
    fn empty_email_is_rejected() {
        let profile = Profile::default();
        assert!(matches!(
            profile_to_client_config(&profile, SecretString::from("pw".to_owned())),
            Err(ConfigError::Validation { .. })
        ));
    }
}
