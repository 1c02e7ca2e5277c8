// ── Command correlator ──
//
// Wraps outgoing commands in the device envelope, tags each with a
// correlation id, and matches device acknowledgements (`cfg.id`) against
// the outstanding set. Delivery is at-most-once: nothing is resent.

use std::ops::{Range, RangeInclusive};

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::registry::{Device, DeviceRegistry};

/// Correlation ids are drawn from this range.
pub const CORRELATION_IDS: Range<u16> = 1024..65535;

/// Command codes the devices define.
pub const COMMAND_CODES: RangeInclusive<i64> = 0..=9;

const TIME_FORMAT: &str = "%H:%M:%S";
const DATE_FORMAT: &str = "%d/%m/%Y";

// ── Types ────────────────────────────────────────────────────────────

/// A published command still waiting for its acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutstandingCommand {
    pub correlation_id: u16,
    pub device_serial: String,
    /// The envelope exactly as published.
    pub raw_payload: String,
    pub created_at: NaiveDateTime,
}

/// Wire form of a command.
///
/// Caller-supplied keys other than the fixed ones land in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub id: u16,
    pub cmd: i64,
    pub lg: String,
    pub sn: String,
    pub tm: String,
    pub dt: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What happened to a send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// One entry per targeted device, in registry order.
    Sent(Vec<SentCommand>),
    /// The command code was outside [`COMMAND_CODES`]; nothing was published.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentCommand {
    pub serial: String,
    pub topic: String,
    /// `None` when the payload was published verbatim and is not tracked.
    pub correlation_id: Option<u16>,
}

/// Outcome of matching an inbound status against the outstanding set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    Matched(OutstandingCommand),
    /// A device-originated response to a request this client did not track.
    Unsolicited(i64),
    None,
}

// ── Correlator ───────────────────────────────────────────────────────

pub struct CommandCorrelator {
    outstanding: IndexMap<u16, OutstandingCommand>,
    limit: usize,
    rng: StdRng,
}

impl CommandCorrelator {
    pub fn new(limit: usize) -> Self {
        Self::with_rng(limit, StdRng::from_entropy())
    }

    pub fn with_rng(limit: usize, rng: StdRng) -> Self {
        // The set may hold limit + 1 ids; leave room to draw a free one.
        let capacity = usize::from(CORRELATION_IDS.end - CORRELATION_IDS.start) - 2;
        Self {
            outstanding: IndexMap::new(),
            limit: limit.min(capacity),
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn contains(&self, id: u16) -> bool {
        self.outstanding.contains_key(&id)
    }

    pub fn outstanding(&self) -> impl Iterator<Item = &OutstandingCommand> {
        self.outstanding.values()
    }

    // ── Sending ──────────────────────────────────────────────────────

    /// Publish `payload` to `target`, or to every device when `target` is
    /// empty.
    ///
    /// A JSON object payload is merged into an [`Envelope`] and tracked.
    /// Anything else (invalid JSON, non-objects, a non-integer `cmd`) is
    /// published verbatim and not tracked.
    pub fn send<P>(
        &mut self,
        payload: &str,
        target: &str,
        registry: &DeviceRegistry,
        now: NaiveDateTime,
        mut publish: P,
    ) -> Result<Dispatch, CoreError>
    where
        P: FnMut(&str, Vec<u8>) -> Result<(), CoreError>,
    {
        let targets: Vec<&Device> = if target.is_empty() {
            registry.iter().collect()
        } else {
            let device = registry.get(target).ok_or_else(|| {
                warn!(serial = %target, "cannot send, device not found");
                CoreError::DeviceNotFound {
                    serial: target.to_owned(),
                }
            })?;
            vec![device]
        };

        let mut sent = Vec::with_capacity(targets.len());
        for device in targets {
            debug!(serial = %device.serial_number, payload, "sending message");
            if self.outstanding.len() > self.limit {
                debug!(
                    outstanding = self.outstanding.len(),
                    "outstanding commands over limit, clearing"
                );
                self.outstanding.clear();
            }

            let language = registry.language(&device.serial_number);
            let correlation_id = match self.envelope(payload, device, language, now) {
                Some(envelope) => {
                    let id = envelope.id;
                    let raw = serde_json::to_string(&envelope)
                        .map_err(|e| CoreError::Internal(format!("envelope encoding: {e}")))?;
                    self.outstanding.insert(
                        id,
                        OutstandingCommand {
                            correlation_id: id,
                            device_serial: device.serial_number.clone(),
                            raw_payload: raw.clone(),
                            created_at: now,
                        },
                    );
                    if let Err(e) = publish(&device.inbound_topic, raw.into_bytes()) {
                        self.outstanding.shift_remove(&id);
                        return Err(e);
                    }
                    Some(id)
                }
                None => {
                    debug!(serial = %device.serial_number, "publishing payload verbatim");
                    publish(&device.inbound_topic, payload.as_bytes().to_vec())?;
                    None
                }
            };

            sent.push(SentCommand {
                serial: device.serial_number.clone(),
                topic: device.inbound_topic.clone(),
                correlation_id,
            });
        }

        Ok(Dispatch::Sent(sent))
    }

    /// Send `{"cmd": code}`. Codes outside [`COMMAND_CODES`] are dropped
    /// locally and reported as [`Dispatch::Rejected`].
    pub fn send_command<P>(
        &mut self,
        code: i64,
        target: &str,
        registry: &DeviceRegistry,
        now: NaiveDateTime,
        publish: P,
    ) -> Result<Dispatch, CoreError>
    where
        P: FnMut(&str, Vec<u8>) -> Result<(), CoreError>,
    {
        if !COMMAND_CODES.contains(&code) {
            warn!(code, "command code not allowed, not sending");
            return Ok(Dispatch::Rejected);
        }
        self.send(&format!(r#"{{"cmd":{code}}}"#), target, registry, now, publish)
    }

    /// Build the envelope for an object payload, drawing a fresh id.
    fn envelope(
        &mut self,
        payload: &str,
        device: &Device,
        language: &str,
        now: NaiveDateTime,
    ) -> Option<Envelope> {
        let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(payload) else {
            return None;
        };
        let cmd = match fields.remove("cmd") {
            None => 0,
            Some(value) => value.as_i64()?,
        };

        for fixed in ["id", "sn"] {
            if fields.remove(fixed).is_some() {
                debug!(key = fixed, "ignoring caller-supplied envelope key");
            }
        }

        Some(Envelope {
            id: self.next_id(),
            cmd,
            lg: take_string(&mut fields, "lg").unwrap_or_else(|| language.to_owned()),
            sn: device.serial_number.clone(),
            tm: take_string(&mut fields, "tm")
                .unwrap_or_else(|| now.format(TIME_FORMAT).to_string()),
            dt: take_string(&mut fields, "dt")
                .unwrap_or_else(|| now.format(DATE_FORMAT).to_string()),
            extra: fields,
        })
    }

    fn next_id(&mut self) -> u16 {
        loop {
            let id = self.rng.gen_range(CORRELATION_IDS);
            if !self.outstanding.contains_key(&id) {
                return id;
            }
        }
    }

    // ── Acknowledgements ─────────────────────────────────────────────

    /// Match `cfg.id` of an inbound status against the outstanding set.
    pub fn acknowledge(&mut self, payload: &Value) -> Acknowledgement {
        let Some(id) = payload
            .get("cfg")
            .and_then(|cfg| cfg.get("id"))
            .and_then(Value::as_i64)
        else {
            return Acknowledgement::None;
        };

        if let Some(command) = u16::try_from(id)
            .ok()
            .and_then(|id| self.outstanding.shift_remove(&id))
        {
            info!(
                id,
                serial = %command.device_serial,
                "request has been passed to the device"
            );
            return Acknowledgement::Matched(command);
        }

        if id > 1 {
            debug!(id, "response id from device");
            return Acknowledgement::Unsolicited(id);
        }
        Acknowledgement::None
    }
}

/// Remove `key` when it holds a string; other values are dropped.
fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key)? {
        Value::String(s) => Some(s),
        other => {
            debug!(key, value = %other, "ignoring non-string envelope field");
            None
        }
    }
}
