//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use landroid_config::ConfigError;
use landroid_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the mower cloud: {message}")]
    #[diagnostic(
        code(landroid::connection_failed),
        help("Check your network connection and the selected cloud (--cloud).")
    )]
    ConnectionFailed { message: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(landroid::auth_failed),
        help(
            "Verify the e-mail and password of profile '{profile}'.\n\
             Run: landroid config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(landroid::no_credentials),
        help(
            "Store one with: landroid config set-password\n\
             Or set the LANDROID_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("Device '{serial}' not found")]
    #[diagnostic(
        code(landroid::not_found),
        help("Run: landroid devices to see the account's mowers")
    )]
    DeviceNotFound { serial: String },

    #[error("No mowers are registered on this account")]
    #[diagnostic(
        code(landroid::no_devices),
        help("Pair a mower in the vendor app first.")
    )]
    NoDevices,

    #[error("Command rejected: {reason}")]
    #[diagnostic(code(landroid::rejected))]
    Rejected { reason: String },

    // ── API ──────────────────────────────────────────────────────────

    #[error("API error ({code}): {message}")]
    #[diagnostic(code(landroid::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(landroid::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(landroid::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: landroid config set email <address> --profile {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No account configured")]
    #[diagnostic(
        code(landroid::no_config),
        help(
            "Pass --email, or create a profile with: landroid config set email <address>\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(landroid::config))]
    Config { message: String },

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("No answer within {seconds}s")]
    #[diagnostic(
        code(landroid::timeout),
        help("Increase the wait with --wait, or check that the mower is online.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(landroid::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::DeviceNotFound { .. } | Self::NoDevices | Self::ProfileNotFound { .. } => {
                exit_code::NOT_FOUND
            }
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::Rejected { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the active profile name to authentication failures.
    pub fn for_profile(self, profile: &str) -> Self {
        match self {
            Self::AuthFailed { message, .. } => Self::AuthFailed {
                profile: profile.into(),
                message,
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Authentication { message, .. } => CliError::AuthFailed {
                profile: "default".into(),
                message,
            },
            CoreError::TokenExpired { path } => CliError::AuthFailed {
                profile: "default".into(),
                message: format!("token rejected by {path}"),
            },
            CoreError::Registry {
                message,
                unauthorized: true,
            } => CliError::AuthFailed {
                profile: "default".into(),
                message,
            },
            CoreError::Registry { message, .. } => CliError::ApiError {
                code: "registry".into(),
                message,
            },
            CoreError::NoDevices => CliError::NoDevices,
            CoreError::DeviceNotFound { serial } => CliError::DeviceNotFound { serial },
            CoreError::Connection { message } => CliError::ConnectionFailed { message },
            CoreError::NotStarted => CliError::ConnectionFailed {
                message: "client is not running".into(),
            },
            CoreError::Config { message } => CliError::Config { message },
            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: String::new(),
            },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
