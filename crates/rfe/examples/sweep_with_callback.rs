//! Stream sweeps to a callback for ten seconds.
//!
//! Registers a closure that prints the peak of each sweep as it arrives,
//! then unregisters it and closes the session.
//!
//! # Usage
//!
//! ```sh
//! RFE_PORT=/dev/ttyUSB0 cargo run -p rfe --example sweep_with_callback
//! ```

use std::time::{Duration, Instant};

use anyhow::Context;
use rfe::{format_freq_mhz, DeviceEvent, SessionBuilder, SweepConfig, SweepRecord};
use tokio::sync::broadcast::error::RecvError;

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
    let start_hz = info.min_freq_hz;
    let stop_hz = info.min_freq_hz + (info.max_freq_hz - info.min_freq_hz).min(50_000_000);
    let config = SweepConfig::new(start_hz, stop_hz, 112);

    let mut events = session.subscribe();
    let started = Instant::now();
    let mut count = 0u64;

    session
        .sweep_with_callback(config, move |sweep: &SweepRecord| {
            count += 1;
            if let Some((freq_hz, dbm)) = sweep.peak() {
                println!(
                    "{:>6.2}s  #{count:<5} peak {} at {dbm:.1} dBm",
                    started.elapsed().as_secs_f64(),
                    format_freq_mhz(freq_hz)
                );
            }
        })
        .await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(DeviceEvent::Disconnected)) => {
                println!("analyzer disconnected");
                break;
            }
            Ok(Ok(DeviceEvent::FrameDiscarded { reason })) => println!("dropped frame: {reason}"),
            Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => {}
            Ok(Err(RecvError::Closed)) | Err(_) => break,
        }
    }

    session.unregister();
    session.close().await;
    Ok(())
}
