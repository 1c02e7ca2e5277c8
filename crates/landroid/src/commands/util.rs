//! Shared helpers for command handlers.

use std::time::Duration;

use landroid_core::{ClientEvent, ConnectionState, ControlInput, LandroidClient};

use crate::error::CliError;
use crate::output;

/// Target word that addresses every device.
pub const ALL_DEVICES: &str = "*";

/// Map the CLI's broadcast marker to the empty target.
pub fn parse_target(raw: &str) -> String {
    if raw == ALL_DEVICES {
        String::new()
    } else {
        raw.to_owned()
    }
}

/// Parse one stdin control line.
///
/// - `{"serial_number": "...", "cmd": ...}` — structured command
/// - `<serial|*> <command>` — command for one device or all of them
/// - `<command>` — command for all devices
pub fn parse_control_line(line: &str) -> Result<Option<ControlInput>, CliError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(line)?;
        return Ok(Some(ControlInput::from_value("", value)));
    }
    let input = match line.split_once(char::is_whitespace) {
        Some((target, command)) => ControlInput::raw(parse_target(target), command.trim()),
        None => ControlInput::raw("", line),
    };
    Ok(Some(input))
}

/// Human-readable one-liner for table/plain output.
pub fn format_event(event: &ClientEvent, color: bool) -> String {
    let now = chrono::Local::now().format("%H:%M:%S").to_string();
    let stamp = output::dim(&now, color);
    match event {
        ClientEvent::Connected => format!("{stamp} {}", output::accent("connected", color)),
        ClientEvent::Disconnected => format!("{stamp} {}", output::accent("disconnected", color)),
        ClientEvent::AuthenticationFailed { payload } => {
            format!("{stamp} authentication failed: {payload}")
        }
        ClientEvent::Telemetry { serial, payload } => {
            format!("{stamp} {} {payload}", output::accent(serial, color))
        }
    }
}

/// Correlation id a device echoed back in `cfg.id`.
pub fn reply_id(payload: &serde_json::Value) -> Option<u64> {
    payload.get("cfg")?.get("id")?.as_u64()
}

/// Wait until the broker link reports Connected.
pub async fn wait_connected(client: &LandroidClient, timeout: Duration) -> Result<(), CliError> {
    let mut state = client.connection_state();
    match tokio::time::timeout(timeout, state.wait_for(|s| *s == ConnectionState::Connected)).await
    {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => Err(CliError::ConnectionFailed {
            message: "client stopped before connecting".into(),
        }),
        Err(_) => Err(CliError::Timeout {
            seconds: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use landroid_core::{ControlCommand, Resolved};
    use serde_json::json;

    use super::*;

    fn resolved(line: &str) -> Option<Resolved> {
        parse_control_line(line).unwrap().and_then(ControlInput::resolve)
    }

    #[test]
    fn targeted_shorthand() {
        let r = resolved("ABC123 start").unwrap();
        assert_eq!(r.target, "ABC123");
        assert_eq!(r.payload, r#"{"cmd":1}"#);
    }

    #[test]
    fn single_word_broadcasts() {
        let r = resolved("pause").unwrap();
        assert_eq!(r.target, "");
        assert_eq!(r.payload, r#"{"cmd":2}"#);

        let r = resolved("* {\"cmd\":3}").unwrap();
        assert_eq!(r.target, "");
        assert_eq!(r.payload, r#"{"cmd":3}"#);
    }

    #[test]
    fn structured_json_line() {
        let input = parse_control_line(r#"{"serial_number":"S1","cmd":"stop"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            input.command,
            ControlCommand::Structured {
                serial_number: "S1".into(),
                cmd: json!("stop"),
            }
        );
        assert_eq!(input.resolve().unwrap().payload, r#"{"cmd":3}"#);
    }

    #[test]
    fn blank_and_broken_lines() {
        assert!(parse_control_line("   ").unwrap().is_none());
        assert!(parse_control_line("{not json").is_err());
    }

    #[test]
    fn reply_id_reads_cfg_id() {
        assert_eq!(reply_id(&json!({ "cfg": { "id": 4242 } })), Some(4242));
        assert_eq!(reply_id(&json!({ "dat": {} })), None);
    }
}
