//! Live telemetry stream with stdin control input.

use landroid_core::{ClientConfig, ClientEvent, Dispatch, LandroidClient};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

type StdinLines = Lines<BufReader<Stdin>>;

pub async fn handle(
    config: &ClientConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let client = LandroidClient::new(config)?;
    let events = client.event_stream();
    tokio::pin!(events);

    let report = client.start().await?;
    if !global.quiet {
        eprintln!(
            "Watching {} mower(s) as user {}. Ctrl-C to stop.",
            report.devices, report.user_id
        );
    }

    let color = output::should_color(&global.color);
    let mut lines = (!args.no_input).then(|| BufReader::new(tokio::io::stdin()).lines());

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            event = events.next() => {
                let Some(event) = event else { break Ok(()) };
                if shown(&event, args.serial.as_deref()) {
                    output::print_output(&render_event(&event, &global.output, color), global.quiet);
                }
            }
            line = next_line(&mut lines) => match line {
                Ok(Some(line)) => control(&client, &line).await,
                Ok(None) => {
                    debug!("stdin closed, control input disabled");
                    lines = None;
                }
                Err(e) => break Err(CliError::Io(e)),
            },
        }
    };

    client.stop().await?;
    result
}

fn shown(event: &ClientEvent, serial: Option<&str>) -> bool {
    match (event, serial) {
        (ClientEvent::Telemetry { serial: s, .. }, Some(wanted)) => s == wanted,
        _ => true,
    }
}

fn render_event(event: &ClientEvent, format: &OutputFormat, color: bool) -> String {
    match format {
        OutputFormat::Table | OutputFormat::Plain => util::format_event(event, color),
        _ => output::render_json_compact(event),
    }
}

async fn next_line(lines: &mut Option<StdinLines>) -> std::io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

/// Send one control line. Failures are reported but never end the watch.
async fn control(client: &LandroidClient, line: &str) {
    let input = match util::parse_control_line(line) {
        Ok(Some(input)) => input,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "ignoring control line");
            return;
        }
    };
    match client.control(input).await {
        Ok(Some(Dispatch::Sent(sent))) => {
            for s in sent {
                debug!(serial = %s.serial, id = ?s.correlation_id, "command sent");
            }
        }
        Ok(Some(Dispatch::Rejected)) => warn!("command rejected"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "command failed"),
    }
}
