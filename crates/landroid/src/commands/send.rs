//! One-shot command: connect, send, wait for the device's answer.

use std::collections::BTreeMap;
use std::time::Duration;

use landroid_core::{ClientConfig, ClientEvent, ControlInput, Dispatch, LandroidClient, SentCommand};
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::cli::{GlobalOpts, SendArgs};
use crate::error::CliError;
use crate::output;

use super::util;

/// A device's answer to a tracked command.
#[derive(Debug, Serialize)]
struct Reply {
    serial: String,
    correlation_id: u16,
    payload: serde_json::Value,
}

pub async fn handle(
    config: &ClientConfig,
    args: SendArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let input = ControlInput::raw(util::parse_target(&args.target), args.command.clone());
    if input.clone().resolve().is_none() {
        return Err(CliError::Validation {
            field: "command".into(),
            reason: "must not be empty".into(),
        });
    }

    let client = LandroidClient::new(config)?;
    let result = run(&client, config.timeout, input, &args, global).await;
    client.stop().await?;
    result
}

async fn run(
    client: &LandroidClient,
    connect_timeout: Duration,
    input: ControlInput,
    args: &SendArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let events = client.event_stream();
    tokio::pin!(events);

    client.start().await?;
    util::wait_connected(client, connect_timeout).await?;

    let sent = match client.control(input).await? {
        Some(Dispatch::Sent(sent)) => sent,
        Some(Dispatch::Rejected) => {
            return Err(CliError::Rejected {
                reason: "command code out of range".into(),
            });
        }
        None => Vec::new(),
    };

    // Correlation id -> serial for every tracked publish.
    let mut pending: BTreeMap<u16, String> = sent
        .iter()
        .filter_map(|s| s.correlation_id.map(|id| (id, s.serial.clone())))
        .collect();

    if args.wait == 0 || pending.is_empty() {
        print_sent(&sent, global);
        return Ok(());
    }

    let deadline = tokio::time::sleep(Duration::from_secs(args.wait));
    tokio::pin!(deadline);
    let mut replies = Vec::new();

    while !pending.is_empty() {
        tokio::select! {
            () = &mut deadline => {
                print_replies(&replies, global);
                return Err(CliError::Timeout { seconds: args.wait });
            }
            event = events.next() => {
                let Some(event) = event else {
                    return Err(CliError::ConnectionFailed {
                        message: "event stream closed".into(),
                    });
                };
                let ClientEvent::Telemetry { serial, payload } = event else {
                    continue;
                };
                let Some(id) = util::reply_id(&payload).and_then(|id| u16::try_from(id).ok()) else {
                    continue;
                };
                if pending.get(&id) == Some(&serial) {
                    debug!(%serial, id, "command acknowledged");
                    pending.remove(&id);
                    replies.push(Reply { serial, correlation_id: id, payload });
                }
            }
        }
    }

    print_replies(&replies, global);
    Ok(())
}

fn print_sent(sent: &[SentCommand], global: &GlobalOpts) {
    let out = output::render_single(
        &global.output,
        &sent,
        |sent| {
            sent.iter()
                .map(|s| format!("sent to {} on {}", s.serial, s.topic))
                .collect::<Vec<_>>()
                .join("\n")
        },
        |sent| {
            sent.iter()
                .map(|s| s.serial.clone())
                .collect::<Vec<_>>()
                .join("\n")
        },
    );
    output::print_output(&out, global.quiet);
}

fn print_replies(replies: &[Reply], global: &GlobalOpts) {
    let out = output::render_single(
        &global.output,
        &replies,
        |replies| {
            replies
                .iter()
                .map(|r| format!("{} #{}: {}", r.serial, r.correlation_id, r.payload))
                .collect::<Vec<_>>()
                .join("\n")
        },
        |replies| {
            replies
                .iter()
                .map(|r| r.payload.to_string())
                .collect::<Vec<_>>()
                .join("\n")
        },
    );
    output::print_output(&out, global.quiet);
}
