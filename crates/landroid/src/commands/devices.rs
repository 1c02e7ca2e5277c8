//! Device listing.

use landroid_core::{ClientConfig, Device, LandroidClient};
use tabled::Tabled;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Broker")]
    endpoint: String,
    #[tabled(rename = "Command topic")]
    inbound: String,
    #[tabled(rename = "Status topic")]
    outbound: String,
    #[tabled(rename = "Lang")]
    language: String,
    #[tabled(rename = "Last status")]
    updated: String,
}

impl From<&Device> for DeviceRow {
    fn from(d: &Device) -> Self {
        Self {
            serial: d.serial_number.clone(),
            name: d.name.clone(),
            endpoint: d.mqtt_endpoint.clone().unwrap_or_else(|| "-".into()),
            inbound: d.inbound_topic.clone(),
            outbound: d.outbound_topic.clone(),
            language: d.language().unwrap_or("-").to_owned(),
            updated: d
                .last_status
                .as_ref()
                .and_then(|s| s.timestamp)
                .map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(config: &ClientConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let devices = LandroidClient::fetch_devices(config).await?;
    let out = output::render_list(&global.output, &devices, |d: &Device| DeviceRow::from(d), |d| {
        d.serial_number.clone()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
