//! Core types shared by the driver, its transports, and the C boundary.

use std::fmt;

use chrono::{DateTime, Utc};

/// Smallest number of points the analyzer produces per sweep.
pub const MIN_SWEEP_POINTS: u16 = 112;

/// Sweep point counts are rounded down to a multiple of this value.
pub const SWEEP_POINTS_STEP: u16 = 16;

/// Largest point count the extended sweep-points command can express.
pub const MAX_EXT_SWEEP_POINTS: u16 = 4096;

/// Lifecycle state of a device session.
///
/// ```text
/// Disconnected -> Connecting -> Configuring -> Idle <-> Configuring -> Sweeping
///                     |             |                                   |
///                     +--> Faulted <+-----------------------------------+
/// ```
///
/// `close()` returns any state to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No transport is open.
    #[default]
    Disconnected,
    /// The transport is being opened.
    Connecting,
    /// A configuration command is in flight.
    Configuring,
    /// Connected and idle; no sweep configuration has been requested.
    Idle,
    /// A sweep configuration was acknowledged and records are flowing.
    Sweeping,
    /// A fatal transport error occurred. Terminal until `close()` + `open()`.
    Faulted,
}

impl SessionState {
    /// Returns `true` for states in which the device link is usable.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Configuring | SessionState::Idle | SessionState::Sweeping
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Configuring => "configuring",
            SessionState::Idle => "idle",
            SessionState::Sweeping => "sweeping",
            SessionState::Faulted => "faulted",
        };
        write!(f, "{s}")
    }
}

/// A requested sweep: frequency range, resolution, and optional display range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    /// First frequency of the sweep in hertz.
    pub start_hz: u64,
    /// Last frequency of the sweep in hertz.
    pub stop_hz: u64,
    /// Requested number of points. See [`effective_points`](Self::effective_points).
    pub sweep_points: u16,
    /// Bottom and top of the amplitude range in dBm. `None` keeps the
    /// analyzer's current range.
    pub amp_range_dbm: Option<(i16, i16)>,
}

impl SweepConfig {
    /// Create a sweep configuration that keeps the current amplitude range.
    pub fn new(start_hz: u64, stop_hz: u64, sweep_points: u16) -> Self {
        SweepConfig {
            start_hz,
            stop_hz,
            sweep_points,
            amp_range_dbm: None,
        }
    }

    /// Create a sweep configuration centred on `center_hz`.
    ///
    /// An odd span loses its last hertz; a span wider than twice the
    /// center is clamped at 0 Hz.
    pub fn from_center_span(center_hz: u64, span_hz: u64, sweep_points: u16) -> Self {
        let half = span_hz / 2;
        SweepConfig::new(
            center_hz.saturating_sub(half),
            center_hz.saturating_add(half),
            sweep_points,
        )
    }

    /// Set the amplitude range (bottom, top) in dBm.
    pub fn with_amp_range(mut self, min_dbm: i16, max_dbm: i16) -> Self {
        self.amp_range_dbm = Some((min_dbm, max_dbm));
        self
    }

    /// Span of the sweep in hertz.
    pub fn span_hz(&self) -> u64 {
        self.stop_hz.saturating_sub(self.start_hz)
    }

    /// The number of points the analyzer will actually produce.
    ///
    /// Requests below [`MIN_SWEEP_POINTS`] are raised to it; everything else
    /// is rounded down to a multiple of [`SWEEP_POINTS_STEP`].
    pub fn effective_points(&self) -> u16 {
        if self.sweep_points < MIN_SWEEP_POINTS {
            MIN_SWEEP_POINTS
        } else {
            (self.sweep_points / SWEEP_POINTS_STEP) * SWEEP_POINTS_STEP
        }
    }
}

/// One sweep: amplitude samples over an evenly spaced frequency axis.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRecord {
    /// Frequency of the first sample in hertz.
    pub start_hz: u64,
    /// Frequency of the last sample in hertz.
    pub stop_hz: u64,
    /// Amplitude samples in dBm, in ascending frequency order.
    pub amplitudes_dbm: Vec<f32>,
    /// Time the record was parsed.
    pub timestamp: DateTime<Utc>,
}

impl SweepRecord {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.amplitudes_dbm.len()
    }

    /// Returns `true` if the record has no samples.
    pub fn is_empty(&self) -> bool {
        self.amplitudes_dbm.is_empty()
    }

    /// Spacing between adjacent samples in hertz. Zero if `stop_hz` is
    /// below `start_hz`.
    pub fn step_hz(&self) -> f64 {
        if self.len() < 2 {
            return 0.0;
        }
        self.stop_hz.saturating_sub(self.start_hz) as f64 / (self.len() - 1) as f64
    }

    /// Frequency of sample `index` in hertz.
    ///
    /// Computed in integer arithmetic so that index 0 is exactly
    /// `start_hz` and the last index is exactly `stop_hz`. A record with
    /// `stop_hz` below `start_hz` puts every sample at `start_hz`.
    pub fn frequency_hz(&self, index: usize) -> u64 {
        let last = self.len().saturating_sub(1);
        if last == 0 {
            return self.start_hz;
        }
        let span = u128::from(self.stop_hz.saturating_sub(self.start_hz));
        let offset = span * index as u128 / last as u128;
        self.start_hz + offset as u64
    }

    /// Iterator over `(frequency_hz, amplitude_dbm)` pairs.
    pub fn points(&self) -> impl Iterator<Item = (u64, f32)> + '_ {
        self.amplitudes_dbm
            .iter()
            .enumerate()
            .map(|(i, &amp)| (self.frequency_hz(i), amp))
    }

    /// The sample with the highest amplitude, as `(frequency_hz, amplitude_dbm)`.
    pub fn peak(&self) -> Option<(u64, f32)> {
        self.points().max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Identity and capabilities of a connected analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Numeric model code of the main radio module.
    pub model_id: u8,
    /// Human-readable model name (e.g. "WSUB1G+").
    pub model_name: String,
    /// Numeric model code of the expansion module, if fitted.
    pub expansion_model_id: Option<u8>,
    /// Human-readable expansion module name, if fitted.
    pub expansion_model_name: Option<String>,
    /// Firmware version string as reported (e.g. "01.12").
    pub firmware_version: String,
    /// Whether the expansion module is the active radio module.
    pub expansion_active: bool,
    /// Lowest frequency the active module can sweep, in hertz.
    pub min_freq_hz: u64,
    /// Highest frequency the active module can sweep, in hertz.
    pub max_freq_hz: u64,
    /// Narrowest span the active module supports, in hertz.
    pub min_span_hz: u64,
    /// Widest span the active module supports, in hertz.
    pub max_span_hz: u64,
}

impl DeviceInfo {
    /// Parse the firmware version into `(major, minor)`.
    ///
    /// Build suffixes are ignored, so `"01.12B26"` parses as `(1, 12)`.
    /// Returns `None` if the string does not start with `MM.mm`.
    pub fn firmware_version_number(&self) -> Option<(u16, u16)> {
        let (major, rest) = self.firmware_version.trim().split_once('.')?;
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        Some((major.parse().ok()?, rest[..digits].parse().ok()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start_hz: u64, stop_hz: u64, points: usize) -> SweepRecord {
        SweepRecord {
            start_hz,
            stop_hz,
            amplitudes_dbm: vec![-100.0; points],
            timestamp: Utc::now(),
        }
    }

    // ---------------------------------------------------------------
    // SweepConfig
    // ---------------------------------------------------------------

    #[test]
    fn effective_points_raises_small_requests() {
        assert_eq!(SweepConfig::new(1, 2, 0).effective_points(), 112);
        assert_eq!(SweepConfig::new(1, 2, 100).effective_points(), 112);
        assert_eq!(SweepConfig::new(1, 2, 112).effective_points(), 112);
    }

    #[test]
    fn effective_points_rounds_down_to_multiple_of_16() {
        assert_eq!(SweepConfig::new(1, 2, 127).effective_points(), 112);
        assert_eq!(SweepConfig::new(1, 2, 128).effective_points(), 128);
        assert_eq!(SweepConfig::new(1, 2, 1000).effective_points(), 992);
        assert_eq!(SweepConfig::new(1, 2, 4096).effective_points(), 4096);
        assert_eq!(SweepConfig::new(1, 2, 65535).effective_points(), 65520);
    }

    #[test]
    fn sweep_config_amp_range() {
        let config = SweepConfig::new(100, 200, 112).with_amp_range(-110, -10);
        assert_eq!(config.amp_range_dbm, Some((-110, -10)));
        assert_eq!(config.span_hz(), 100);
    }

    // ---------------------------------------------------------------
    // SweepRecord frequency axis
    // ---------------------------------------------------------------

    #[test]
    fn frequency_axis_hits_both_endpoints() {
        let r = record(100_000_000, 200_000_000, 100);
        assert_eq!(r.frequency_hz(0), 100_000_000);
        assert_eq!(r.frequency_hz(99), 200_000_000);
    }

    #[test]
    fn frequency_axis_strictly_increasing() {
        let r = record(100_000_000, 200_000_000, 112);
        let freqs: Vec<u64> = r.points().map(|(f, _)| f).collect();
        assert_eq!(freqs.len(), 112);
        assert!(freqs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*freqs.last().unwrap(), 200_000_000);
    }

    #[test]
    fn frequency_axis_step() {
        let r = record(0, 1_110, 112);
        assert!((r.step_hz() - 10.0).abs() < f64::EPSILON);
        assert_eq!(r.frequency_hz(5), 50);
    }

    #[test]
    fn single_point_record() {
        let r = record(433_000_000, 433_000_000, 1);
        assert_eq!(r.frequency_hz(0), 433_000_000);
        assert_eq!(r.step_hz(), 0.0);
    }

    #[test]
    fn inverted_record_does_not_underflow() {
        let r = record(200, 100, 11);
        assert_eq!(r.step_hz(), 0.0);
        assert_eq!(r.frequency_hz(0), 200);
        assert_eq!(r.frequency_hz(10), 200);
    }

    #[test]
    fn center_span_config() {
        let config = SweepConfig::from_center_span(433_920_000, 2_000_000, 112);
        assert_eq!(config.start_hz, 432_920_000);
        assert_eq!(config.stop_hz, 434_920_000);
        assert_eq!(config.span_hz(), 2_000_000);

        let config = SweepConfig::from_center_span(1_000_000, 5_000_000, 112);
        assert_eq!(config.start_hz, 0);
        assert_eq!(config.stop_hz, 3_500_000);
    }

    #[test]
    fn peak_finds_strongest_sample() {
        let mut r = record(0, 110, 12);
        r.amplitudes_dbm[7] = -20.5;
        assert_eq!(r.peak(), Some((70, -20.5)));
    }

    // ---------------------------------------------------------------
    // DeviceInfo / SessionState
    // ---------------------------------------------------------------

    #[test]
    fn firmware_version_parsing() {
        let mut info = DeviceInfo {
            model_id: 10,
            model_name: "WSUB1G+".into(),
            expansion_model_id: None,
            expansion_model_name: None,
            firmware_version: "01.12".into(),
            expansion_active: false,
            min_freq_hz: 50_000,
            max_freq_hz: 960_000_000,
            min_span_hz: 112_000,
            max_span_hz: 959_950_000,
        };
        assert_eq!(info.firmware_version_number(), Some((1, 12)));

        info.firmware_version = "01.15B26".into();
        assert_eq!(info.firmware_version_number(), Some((1, 15)));

        info.firmware_version = "garbage".into();
        assert_eq!(info.firmware_version_number(), None);
    }

    #[test]
    fn session_state_connected_states() {
        assert!(SessionState::Idle.is_connected());
        assert!(SessionState::Sweeping.is_connected());
        assert!(SessionState::Configuring.is_connected());
        assert!(!SessionState::Connecting.is_connected());
        assert!(!SessionState::Faulted.is_connected());
        assert!(!SessionState::Disconnected.is_connected());
        assert_eq!(SessionState::default(), SessionState::Disconnected);
        assert_eq!(SessionState::Sweeping.to_string(), "sweeping");
    }
}
