// ── Inbound control surface ──
//
// Host-layer input (a target plus a command) resolved into the payload
// text handed to the correlator.

use serde::Deserialize;
use serde_json::Value;

/// Payload text for the shorthand words, or `None` for anything else.
pub fn shorthand(word: &str) -> Option<&'static str> {
    match word {
        "start" => Some(r#"{"cmd":1}"#),
        "stop" => Some(r#"{"cmd":3}"#),
        "pause" => Some(r#"{"cmd":2}"#),
        "status" => Some("{}"),
        _ => None,
    }
}

/// Either a structured command or a bare string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ControlCommand {
    /// `{serial_number, cmd}`. The serial overrides the input's target.
    Structured {
        serial_number: String,
        #[serde(default)]
        cmd: Value,
    },
    /// A shorthand word or a payload forwarded as-is.
    Raw(String),
}

/// One message from the host layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlInput {
    /// Device serial; empty means every device.
    pub target: String,
    pub command: ControlCommand,
}

/// A control input ready for `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub target: String,
    pub payload: String,
}

impl ControlInput {
    pub fn raw(target: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            command: ControlCommand::Raw(command.into()),
        }
    }

    /// Interpret an arbitrary JSON value as a command: objects carrying a
    /// `serial_number` are structured, strings are raw, anything else is
    /// forwarded as its JSON text.
    pub fn from_value(target: impl Into<String>, value: Value) -> Self {
        let command = match value {
            Value::String(s) => ControlCommand::Raw(s),
            other => serde_json::from_value::<ControlCommand>(other.clone())
                .unwrap_or_else(|_| ControlCommand::Raw(other.to_string())),
        };
        Self {
            target: target.into(),
            command,
        }
    }

    /// Resolve target and payload. `None` when there is nothing to send
    /// (an empty or null command).
    pub fn resolve(self) -> Option<Resolved> {
        let (target, command) = match self.command {
            ControlCommand::Structured { serial_number, cmd } => {
                let command = match cmd {
                    Value::Null => return None,
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                let target = if serial_number.is_empty() {
                    self.target
                } else {
                    serial_number
                };
                (target, command)
            }
            ControlCommand::Raw(command) => (self.target, command),
        };

        if command.is_empty() {
            return None;
        }
        let payload = shorthand(&command).map_or(command, str::to_owned);
        Some(Resolved { target, payload })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn resolved(target: &str, payload: &str) -> Option<Resolved> {
        Some(Resolved {
            target: target.into(),
            payload: payload.into(),
        })
    }

    #[test]
    fn shorthand_words_map_to_fixed_payloads() {
        assert_eq!(ControlInput::raw("S1", "start").resolve(), resolved("S1", r#"{"cmd":1}"#));
        assert_eq!(ControlInput::raw("S1", "stop").resolve(), resolved("S1", r#"{"cmd":3}"#));
        assert_eq!(ControlInput::raw("S1", "pause").resolve(), resolved("S1", r#"{"cmd":2}"#));
        assert_eq!(ControlInput::raw("", "status").resolve(), resolved("", "{}"));
    }

    #[test]
    fn other_strings_are_verbatim() {
        assert_eq!(
            ControlInput::raw("S1", r#"{"sc":{"m":1}}"#).resolve(),
            resolved("S1", r#"{"sc":{"m":1}}"#)
        );
        assert_eq!(ControlInput::raw("S1", "START").resolve(), resolved("S1", "START"));
        assert_eq!(ControlInput::raw("S1", "").resolve(), None);
    }

    #[test]
    fn structured_serial_overrides_target() {
        let input = ControlInput::from_value("topic-target", json!({ "serial_number": "S9", "cmd": "pause" }));
        assert_eq!(input.resolve(), resolved("S9", r#"{"cmd":2}"#));

        let input = ControlInput::from_value("T", json!({ "serial_number": "S9", "cmd": { "cmd": 5 } }));
        assert_eq!(input.resolve(), resolved("S9", r#"{"cmd":5}"#));

        let input = ControlInput::from_value("T", json!({ "serial_number": "S9" }));
        assert_eq!(input.resolve(), None);
    }

    #[test]
    fn non_structured_values_are_forwarded_as_json() {
        let input = ControlInput::from_value("T", json!({ "cmd": 1 }));
        assert_eq!(input.resolve(), resolved("T", r#"{"cmd":1}"#));
    }
}
