//! Message parser: turns decoded frames into typed messages.
//!
//! [`parse_message`] is a pure function over a single [`Frame`]. Sweep
//! frames become amplitude vectors; the frequency axis is attached later by
//! the IO task from the most recent [`DeviceConfig`].

use std::str;

use rfe_core::{DeviceInfo, SweepConfig};

use crate::error::ParseError;
use crate::frame::Frame;
use crate::models::{Model, NO_EXPANSION};
use crate::modes::{CalcMode, DspMode, InputStage, Mode, TrackingStatus};

const CONFIG_PREFIX: &[u8] = b"#C2-F:";
const SETUP_PREFIX: &[u8] = b"#C2-M:";
const SERIAL_PREFIX: &[u8] = b"#Sn";
const DSP_PREFIX: &[u8] = b"DSP:";
const TRACKING_PREFIX: &[u8] = b"#K";
const INPUT_STAGE_PREFIX: &[u8] = b"#a";

/// A parsed message from the analyzer.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Current sweep configuration (`#C2-F:`).
    Config(DeviceConfig),
    /// Models and firmware version (`#C2-M:`).
    SetupInfo(SetupInfo),
    /// Amplitudes of one sweep in dBm.
    Sweep(Vec<f32>),
    /// Raw LCD contents.
    ScreenData(Vec<u8>),
    /// Device serial number (`#Sn`).
    SerialNumber(String),
    /// DSP mode report (`DSP:`).
    DspMode(DspMode),
    /// Tracking generator status (`#K`).
    TrackingStatus(TrackingStatus),
    /// Input stage report (`#a`).
    InputStage(InputStage),
}

/// The analyzer's current configuration, from a `#C2-F:` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub start_hz: u64,
    pub step_hz: u64,
    pub stop_hz: u64,
    pub max_amp_dbm: i16,
    pub min_amp_dbm: i16,
    pub sweep_points: u16,
    pub expansion_active: bool,
    pub mode: Mode,
    pub min_freq_hz: u64,
    pub max_freq_hz: u64,
    pub max_span_hz: u64,
    /// Resolution bandwidth. Not reported by older firmware.
    pub rbw_hz: Option<u64>,
    /// Amplitude offset. Not reported by older firmware.
    pub amp_offset_db: Option<i8>,
    /// Calculator mode. Not reported by older firmware.
    pub calc_mode: Option<CalcMode>,
}

impl DeviceConfig {
    /// Whether this configuration is the device's acknowledgement of
    /// `target`.
    ///
    /// The device works in whole kHz and snaps the range to its own step
    /// grid, so start and stop only have to agree to within one step (or
    /// 1 kHz, whichever is larger). The point count must match the
    /// effective count exactly, and the amplitude range if one was given.
    pub fn matches(&self, target: &SweepConfig) -> bool {
        let tolerance = self.step_hz.max(1_000);
        let close = |a: u64, b: u64| a.abs_diff(b) <= tolerance;

        let amps_match = match target.amp_range_dbm {
            Some((min, max)) => self.min_amp_dbm == min && self.max_amp_dbm == max,
            None => true,
        };

        close(self.start_hz, target.start_hz)
            && close(self.stop_hz, target.stop_hz)
            && self.sweep_points == target.effective_points()
            && amps_match
    }
}

/// Model codes and firmware version, from a `#C2-M:` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupInfo {
    pub main_model: Model,
    pub expansion_model: Option<Model>,
    pub firmware_version: String,
}

impl SetupInfo {
    /// Combine with the current configuration into a [`DeviceInfo`].
    ///
    /// Frequency limits come from the configuration, which reports them
    /// for the active radio module; the minimum span comes from the model
    /// table.
    pub fn device_info(&self, config: &DeviceConfig) -> DeviceInfo {
        let active = match (config.expansion_active, self.expansion_model) {
            (true, Some(expansion)) => expansion,
            _ => self.main_model,
        };
        DeviceInfo {
            model_id: self.main_model.code(),
            model_name: self.main_model.name().to_string(),
            expansion_model_id: self.expansion_model.map(Model::code),
            expansion_model_name: self.expansion_model.map(|m| m.name().to_string()),
            firmware_version: self.firmware_version.clone(),
            expansion_active: config.expansion_active,
            min_freq_hz: config.min_freq_hz,
            max_freq_hz: config.max_freq_hz,
            min_span_hz: active.min_span_hz(),
            max_span_hz: config.max_span_hz,
        }
    }
}

/// Parse a decoded frame.
///
/// # Example
///
/// ```
/// use rfe_analyzer::frame::Frame;
/// use rfe_analyzer::messages::{parse_message, Message};
///
/// let frame = Frame::Text(b"#C2-M:010,255,01.12".to_vec());
/// match parse_message(&frame) {
///     Ok(Message::SetupInfo(setup)) => assert_eq!(setup.firmware_version, "01.12"),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub fn parse_message(frame: &Frame) -> Result<Message, ParseError> {
    match frame {
        Frame::Sweep {
            declared, payload, ..
        } => parse_sweep(*declared, payload),
        Frame::ScreenDump(data) => Ok(Message::ScreenData(data.clone())),
        Frame::Text(text) => parse_text(text),
    }
}

fn parse_sweep(declared: usize, payload: &[u8]) -> Result<Message, ParseError> {
    if declared == 0 || payload.len() != declared {
        return Err(ParseError::InvalidSampleCount {
            declared,
            found: payload.len(),
        });
    }
    let amplitudes = payload.iter().map(|&b| f32::from(b) / -2.0).collect();
    Ok(Message::Sweep(amplitudes))
}

fn parse_text(text: &[u8]) -> Result<Message, ParseError> {
    if let Some(body) = text.strip_prefix(CONFIG_PREFIX) {
        parse_config(body).map(Message::Config)
    } else if let Some(body) = text.strip_prefix(SETUP_PREFIX) {
        parse_setup(body).map(Message::SetupInfo)
    } else if let Some(body) = text.strip_prefix(SERIAL_PREFIX) {
        let serial = ascii(body)?.trim();
        if serial.is_empty() {
            return Err(ParseError::TruncatedPayload);
        }
        Ok(Message::SerialNumber(serial.to_string()))
    } else if let Some(body) = text.strip_prefix(DSP_PREFIX) {
        let code = single_digit(body)?;
        DspMode::from_code(code)
            .map(Message::DspMode)
            .ok_or_else(|| ParseError::Invalid(format!("DSP mode {code}")))
    } else if let Some(body) = text.strip_prefix(TRACKING_PREFIX) {
        match single_digit(body)? {
            0 => Ok(Message::TrackingStatus(TrackingStatus::Disabled)),
            _ => Ok(Message::TrackingStatus(TrackingStatus::Enabled)),
        }
    } else if let Some(body) = text.strip_prefix(INPUT_STAGE_PREFIX) {
        let byte = *body.first().ok_or(ParseError::TruncatedPayload)?;
        InputStage::from_byte(byte)
            .map(Message::InputStage)
            .ok_or_else(|| ParseError::Invalid(format!("input stage {byte:#04x}")))
    } else {
        Err(ParseError::UnknownMessage)
    }
}

fn ascii(bytes: &[u8]) -> Result<&str, ParseError> {
    str::from_utf8(bytes).map_err(|_| ParseError::Invalid("non-ASCII text".into()))
}

fn single_digit(body: &[u8]) -> Result<u8, ParseError> {
    match body.first() {
        Some(b) if b.is_ascii_digit() => Ok(b - b'0'),
        Some(b) => Err(ParseError::Invalid(format!("expected digit, got {b:#04x}"))),
        None => Err(ParseError::TruncatedPayload),
    }
}

/// Comma-separated fields of a text message.
struct Fields<'a> {
    inner: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn new(body: &'a [u8]) -> Result<Self, ParseError> {
        Ok(Fields {
            inner: ascii(body)?.split(','),
        })
    }

    /// Next required field.
    fn next<T: str::FromStr>(&mut self, name: &str) -> Result<T, ParseError> {
        let raw = self.inner.next().ok_or(ParseError::TruncatedPayload)?;
        parse_field(raw, name)
    }

    /// Next field, if present.
    fn next_opt<T: str::FromStr>(&mut self, name: &str) -> Result<Option<T>, ParseError> {
        match self.inner.next() {
            Some(raw) if !raw.trim().is_empty() => parse_field(raw, name).map(Some),
            _ => Ok(None),
        }
    }
}

fn parse_field<T: str::FromStr>(raw: &str, name: &str) -> Result<T, ParseError> {
    raw.trim()
        .parse()
        .map_err(|_| ParseError::Invalid(format!("{name}: {raw:?}")))
}

fn khz_to_hz(khz: u64, name: &str) -> Result<u64, ParseError> {
    khz.checked_mul(1_000)
        .ok_or_else(|| ParseError::Invalid(format!("{name}: {khz} kHz out of range")))
}

fn parse_config(body: &[u8]) -> Result<DeviceConfig, ParseError> {
    let mut fields = Fields::new(body)?;

    let start_khz: u64 = fields.next("start")?;
    let step_hz: u64 = fields.next("step")?;
    let max_amp_dbm: i16 = fields.next("max amp")?;
    let min_amp_dbm: i16 = fields.next("min amp")?;
    let sweep_points: u16 = fields.next("sweep points")?;
    let expansion_active: u8 = fields.next("expansion active")?;
    let mode: u8 = fields.next("mode")?;
    let min_freq_khz: u64 = fields.next("min freq")?;
    let max_freq_khz: u64 = fields.next("max freq")?;
    let max_span_khz: u64 = fields.next("max span")?;
    let rbw_khz: Option<u64> = fields.next_opt("rbw")?;
    let amp_offset_db: Option<i8> = fields.next_opt("amp offset")?;
    let calc_mode: Option<u8> = fields.next_opt("calc mode")?;

    if sweep_points == 0 {
        return Err(ParseError::Invalid("sweep points: 0".into()));
    }

    let start_hz = khz_to_hz(start_khz, "start")?;
    let stop_hz = step_hz
        .checked_mul(u64::from(sweep_points - 1))
        .and_then(|width| start_hz.checked_add(width))
        .ok_or_else(|| {
            ParseError::Invalid(format!(
                "stop: {start_hz} Hz + {step_hz} Hz x {sweep_points} points"
            ))
        })?;

    Ok(DeviceConfig {
        start_hz,
        step_hz,
        stop_hz,
        max_amp_dbm,
        min_amp_dbm,
        sweep_points,
        expansion_active: expansion_active == 1,
        mode: Mode::from(mode),
        min_freq_hz: khz_to_hz(min_freq_khz, "min freq")?,
        max_freq_hz: khz_to_hz(max_freq_khz, "max freq")?,
        max_span_hz: khz_to_hz(max_span_khz, "max span")?,
        rbw_hz: rbw_khz.map(|khz| khz_to_hz(khz, "rbw")).transpose()?,
        amp_offset_db,
        calc_mode: calc_mode.and_then(CalcMode::from_code),
    })
}

fn parse_setup(body: &[u8]) -> Result<SetupInfo, ParseError> {
    let mut fields = Fields::new(body)?;

    let main_code: u8 = fields.next("main model")?;
    let expansion_code: u8 = fields.next("expansion model")?;
    let firmware_version: String = fields.next("firmware version")?;

    let main_model = Model::from_code(main_code)
        .ok_or_else(|| ParseError::Invalid(format!("main model code {main_code}")))?;
    let expansion_model = match expansion_code {
        NO_EXPANSION => None,
        code => Model::from_code(code),
    };

    Ok(SetupInfo {
        main_model,
        expansion_model,
        firmware_version,
    })
}
