//! Formatting helpers for frequencies and amplitudes.

/// Format a frequency in hertz as a human-readable MHz string.
///
/// # Example
///
/// ```
/// use rfe_core::format_freq_mhz;
///
/// assert_eq!(format_freq_mhz(433_920_000), "433.920000 MHz");
/// ```
pub fn format_freq_mhz(freq_hz: u64) -> String {
    let mhz = freq_hz as f64 / 1_000_000.0;
    format!("{mhz:.6} MHz")
}

/// Convert a power level in dBm to milliwatts.
///
/// # Example
///
/// ```
/// use rfe_core::dbm_to_mw;
///
/// assert!((dbm_to_mw(0.0) - 1.0).abs() < 1e-9);
/// assert!((dbm_to_mw(-30.0) - 0.001).abs() < 1e-9);
/// ```
pub fn dbm_to_mw(dbm: f32) -> f64 {
    10f64.powf(f64::from(dbm) / 10.0)
}
