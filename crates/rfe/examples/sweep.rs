//! Take one blocking sweep and print it.
//!
//! Configures 2.400-2.500 GHz on a 2.4 GHz module, or the lower part of the
//! active module's range otherwise, and prints every point with a crude bar.
//!
//! # Usage
//!
//! ```sh
//! RFE_PORT=/dev/ttyUSB0 cargo run -p rfe --example sweep
//! ```

use anyhow::Context;
use rfe::{format_freq_mhz, SessionBuilder, SweepConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let port = std::env::var("RFE_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());
    let session = SessionBuilder::new()
        .serial_port(&port)
        .connect()
        .await
        .with_context(|| format!("opening {port}"))?;

    let info = session.request_info().await?;
    let (start_hz, stop_hz) = if info.min_freq_hz <= 2_400_000_000 && info.max_freq_hz >= 2_500_000_000 {
        (2_400_000_000, 2_500_000_000)
    } else {
        let span = (info.max_freq_hz - info.min_freq_hz).min(100_000_000);
        (info.min_freq_hz, info.min_freq_hz + span)
    };

    let config = SweepConfig::new(start_hz, stop_hz, 112).with_amp_range(-110, -10);
    println!(
        "{}: sweeping {} .. {}",
        info.model_name,
        format_freq_mhz(start_hz),
        format_freq_mhz(stop_hz)
    );

    let sweep = session.sweep_blocking(config).await?;
    for (freq_hz, dbm) in sweep.points() {
        let bar = ((dbm + 110.0).max(0.0) / 2.0) as usize;
        println!("{:>16}  {dbm:>7.1} dBm  {}", format_freq_mhz(freq_hz), "#".repeat(bar));
    }
    if let Some((freq_hz, dbm)) = sweep.peak() {
        println!("\npeak {} at {dbm:.1} dBm", format_freq_mhz(freq_hz));
    }

    session.close().await;
    Ok(())
}
