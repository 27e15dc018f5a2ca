//! Byte-level fixtures shared by the IO task and session tests.

use rfe_test_harness::MockTransport;

use crate::commands;

/// `#C2-M:` for a WSUB1G+ with no expansion module.
pub(crate) const SETUP_WSUB1G_PLUS: &[u8] = b"#C2-M:010,255,01.12\r\n";

/// A `#C2-F:` message on the WSUB1G+ frequency range.
pub(crate) fn config_msg(
    start_khz: u64,
    step_hz: u64,
    points: u16,
    max_amp_dbm: i16,
    min_amp_dbm: i16,
) -> Vec<u8> {
    format!(
        "#C2-F:{start_khz:07},{step_hz:07},{max_amp_dbm:04},{min_amp_dbm:04},{points:04},0,000,0000050,0960000,0959950\r\n"
    )
    .into_bytes()
}

/// The device's acknowledgement of 100-200 MHz at `points`, with the
/// default -120..-10 dBm range.
pub(crate) fn config_100_200_mhz(points: u16) -> Vec<u8> {
    let step_hz = 100_000_000 / u64::from(points - 1);
    config_msg(100_000, step_hz, points, -10, -120)
}

/// One sweep of `points` identical samples, using the large format when
/// the count does not fit in a byte.
pub(crate) fn sweep_msg(points: usize, amp_byte: u8) -> Vec<u8> {
    let mut msg = Vec::with_capacity(points + 6);
    if points <= usize::from(u8::MAX) {
        msg.extend_from_slice(&[b'$', b'S', points as u8]);
    } else {
        msg.extend_from_slice(b"$z");
        msg.extend_from_slice(&(points as u16).to_be_bytes());
    }
    msg.resize(msg.len() + points, amp_byte);
    msg.extend_from_slice(b"\r\n");
    msg
}

/// A WSUB1G+ that answers the open handshake, sweeping 240-311 MHz.
pub(crate) fn mock_with_handshake() -> MockTransport {
    let mut response = SETUP_WSUB1G_PLUS.to_vec();
    response.extend(config_msg(240_000, 642_857, 112, -10, -120));

    let mut mock = MockTransport::new();
    mock.expect(&commands::cmd_request_config(), &response);
    mock
}
