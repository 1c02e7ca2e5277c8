//! Session and connection lifecycle between `landroid-api` and host layers
//! (CLI, home-automation bridges).
//!
//! - **[`LandroidClient`]** — Cloneable facade over a single engine task.
//!   [`start()`](LandroidClient::start) logs in, lists the account's
//!   mowers and opens the MQTT link; [`stop()`](LandroidClient::stop)
//!   tears everything down and joins the task.
//!
//! - **Engine** — Owns the OAuth session and its refresh timers, the
//!   device registry, the outstanding-command set and the connection
//!   state machine. Host requests, link events and timer expiries are
//!   serialized onto that one task.
//!
//! - **[`CommandCorrelator`]** — Wraps object payloads in the command
//!   envelope with a random correlation id and matches device replies
//!   back to the commands that caused them.
//!
//! - **[`ClientEvent`]** — Broadcast stream of connection changes, login
//!   failures and device telemetry. Connection state is also published
//!   through a `watch` channel.

pub mod client;
pub mod config;
pub mod connection;
pub mod control;
pub mod correlator;
mod engine;
pub mod error;
pub mod event;
pub mod registry;
pub mod session;
pub mod timer;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::LandroidClient;
pub use config::{ClientConfig, Credentials};
pub use connection::ConnectionState;
pub use control::{ControlCommand, ControlInput, Resolved};
pub use correlator::{CommandCorrelator, Dispatch, OutstandingCommand, SentCommand};
pub use engine::{EngineStatus, OutstandingCommandView, StartReport};
pub use error::CoreError;
pub use event::ClientEvent;
pub use registry::{Device, DeviceStatus};

// Upstream types callers need to build a config.
pub use landroid_api::{Cloud, CloudEndpoints, ReconnectConfig};
