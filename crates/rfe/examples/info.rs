//! Identify a connected RF Explorer.
//!
//! Opens the analyzer, prints its model, firmware, serial number and
//! frequency limits, then closes the session.
//!
//! # Usage
//!
//! ```sh
//! RFE_PORT=/dev/ttyUSB0 cargo run -p rfe --example info
//! ```
//!
//! Without `RFE_PORT` the first USB port with the analyzer's CP210x bridge
//! is used.

use anyhow::{bail, Context};
use rfe::{format_freq_mhz, SessionBuilder};

fn find_port() -> anyhow::Result<String> {
    if let Ok(port) = std::env::var("RFE_PORT") {
        return Ok(port);
    }
    match rfe::analyzer_ports()?.into_iter().next() {
        Some(port) => Ok(port.name),
        None => bail!("no RF Explorer found; set RFE_PORT"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let port = find_port()?;
    println!("Connecting to {port}...");

    let session = SessionBuilder::new()
        .serial_port(&port)
        .connect()
        .await
        .with_context(|| format!("opening {port}"))?;

    let info = session.request_info().await?;
    println!("Model:      {}", info.model_name);
    if let Some(expansion) = &info.expansion_model_name {
        let active = if info.expansion_active { " (active)" } else { "" };
        println!("Expansion:  {expansion}{active}");
    }
    println!("Firmware:   {}", info.firmware_version);
    match session.serial_number().await {
        Ok(serial) => println!("Serial:     {serial}"),
        Err(e) => println!("Serial:     unavailable ({e})"),
    }
    println!(
        "Range:      {} .. {}",
        format_freq_mhz(info.min_freq_hz),
        format_freq_mhz(info.max_freq_hz)
    );
    println!(
        "Span:       {} .. {}",
        format_freq_mhz(info.min_span_hz),
        format_freq_mhz(info.max_span_hz)
    );

    if let Some(config) = session.config() {
        println!(
            "Sweeping:   {} .. {}, {} points",
            format_freq_mhz(config.start_hz),
            format_freq_mhz(config.stop_hz),
            config.sweep_points
        );
    }

    session.close().await;
    Ok(())
}
