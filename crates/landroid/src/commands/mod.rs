//! Command dispatch: bridges CLI args -> core client -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod send;
pub mod util;
pub mod watch;

use landroid_core::ClientConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch an account-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    profile: &str,
    config: &ClientConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let result = match cmd {
        Command::Devices => devices::handle(config, global).await,
        Command::Watch(args) => watch::handle(config, args, global).await,
        Command::Send(args) => send::handle(config, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    };
    result.map_err(|e| e.for_profile(profile))
}
