//! Host-to-device command encoders.
//!
//! Every command is `#`, a byte giving the total command length (including
//! the `#` and the length byte itself), then an ASCII body with optional
//! binary arguments.
//!
//! ```text
//! '#' <len> <body...>
//! ```
//!
//! # Example
//!
//! ```
//! use rfe_analyzer::commands::{cmd_request_config, cmd_set_config};
//!
//! assert_eq!(cmd_request_config(), b"#\x04C0".to_vec());
//!
//! let cmd = cmd_set_config(100_000_000, 200_000_000, -120, -10);
//! assert_eq!(&cmd[2..], b"C2-F:0100000,0200000,-010,-120");
//! ```

use bytes::{BufMut, BytesMut};

use crate::modes::{CalcMode, DspMode, InputStage, RadioModule};

/// Command start byte.
pub const COMMAND_START: u8 = b'#';

/// Amplitude range the analyzer accepts for the display limits, in dBm.
pub const AMP_RANGE_DBM: std::ops::RangeInclusive<i16> = -120..=35;

/// Build a command from its body, prepending `#` and the length byte.
fn encode_command(body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(body.len() + 2);
    buf.put_u8(COMMAND_START);
    buf.put_u8((body.len() + 2) as u8);
    buf.put_slice(body);
    buf.to_vec()
}

/// Request the current configuration (`#C2-F:` reply, preceded by `#C2-M:`
/// on first connection).
pub fn cmd_request_config() -> Vec<u8> {
    encode_command(b"C0")
}

/// Request the device serial number (`#Sn` reply).
pub fn cmd_request_serial_number() -> Vec<u8> {
    encode_command(b"Cn")
}

/// Stop sweeping and hold the current trace.
pub fn cmd_hold() -> Vec<u8> {
    encode_command(b"CH")
}

/// Set the sweep range and display amplitude limits.
///
/// Frequencies are sent in whole kHz (7 digits), amplitudes in dBm as
/// 4-character signed fields. The device replies with a new `#C2-F:`.
pub fn cmd_set_config(start_hz: u64, stop_hz: u64, min_amp_dbm: i16, max_amp_dbm: i16) -> Vec<u8> {
    let body = format!(
        "C2-F:{:07},{:07},{:04},{:04}",
        start_hz / 1_000,
        stop_hz / 1_000,
        max_amp_dbm,
        min_amp_dbm
    );
    encode_command(body.as_bytes())
}

/// Set the number of points per sweep.
///
/// Counts up to 4096 use the extended form, which encodes `points / 16 - 1`
/// in one byte; larger counts use the large form with a big-endian `u16`.
/// `points` must already be rounded to a multiple of 16.
pub fn cmd_set_sweep_points(points: u16) -> Vec<u8> {
    if points <= rfe_core::MAX_EXT_SWEEP_POINTS {
        let code = (points / rfe_core::SWEEP_POINTS_STEP).saturating_sub(1) as u8;
        encode_command(&[b'C', b'j', code])
    } else {
        let mut body = BytesMut::with_capacity(4);
        body.put_slice(b"Ck");
        body.put_u16(points);
        encode_command(&body)
    }
}

/// Select how successive sweeps are combined.
pub fn cmd_set_calc_mode(mode: CalcMode) -> Vec<u8> {
    encode_command(&[b'C', b'+', mode as u8])
}

/// Select the DSP mode. Sent as an ASCII digit.
pub fn cmd_set_dsp_mode(mode: DspMode) -> Vec<u8> {
    encode_command(&[b'C', b'p', b'0' + mode as u8])
}

/// Add a fixed offset to reported amplitudes.
pub fn cmd_set_offset_db(offset_db: i8) -> Vec<u8> {
    encode_command(&[b'C', b'O', offset_db as u8])
}

/// Select the RF input stage.
pub fn cmd_set_input_stage(stage: InputStage) -> Vec<u8> {
    encode_command(&[b'a', stage as u8])
}

/// Make `module` the active radio module. The device answers with a new
/// `#C2-F:` for that module.
pub fn cmd_switch_module(module: RadioModule) -> Vec<u8> {
    encode_command(&[b'C', b'M', module as u8])
}

/// Turn the LCD back on.
pub fn cmd_lcd_on() -> Vec<u8> {
    encode_command(b"L1")
}

/// Turn the LCD off. Sweeps keep streaming.
pub fn cmd_lcd_off() -> Vec<u8> {
    encode_command(b"L0")
}

/// Restart the device. The serial link drops.
pub fn cmd_reboot() -> Vec<u8> {
    encode_command(b"r")
}

/// Switch the device off. The serial link drops.
pub fn cmd_power_off() -> Vec<u8> {
    encode_command(b"S")
}
