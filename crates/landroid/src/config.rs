//! CLI configuration — thin wrapper around `landroid_config` shared types.
//!
//! Re-exports the shared types and adds resolution that respects
//! `GlobalOpts` flag overrides (--cloud, --email, --timeout).

use std::time::Duration;

use landroid_core::ClientConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use landroid_config::{
    Config, Profile, config_path, load_config_or_default, save_config, store_password,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Comma-separated profile names for diagnostics.
pub fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Build a `ClientConfig` from the config file, the active profile and
/// CLI overrides. Returns the profile name alongside for diagnostics.
pub fn build_client_config(global: &GlobalOpts) -> Result<(String, ClientConfig), CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly named profile must exist.
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&cfg),
            });
        }
        None => Profile::default(),
    };

    // Flag > env > profile
    if let Some(cloud) = global.cloud {
        profile.cloud = cloud;
    }
    if let Some(ref email) = global.email {
        profile.email.clone_from(email);
    }
    if profile.email.is_empty() {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    }

    let password = landroid_config::resolve_password(&profile, &profile_name)?;
    let mut client_config = landroid_config::profile_to_client_config(&profile, password)?;
    let secs = global
        .timeout
        .or(profile.timeout)
        .unwrap_or(cfg.defaults.timeout);
    client_config.timeout = Duration::from_secs(secs);

    Ok((profile_name, client_config))
}
