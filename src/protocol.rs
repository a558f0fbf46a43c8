//! Wire constants, timing defaults, and frame encode helpers for the serial IMUs.
//!
//! Both sensors speak the same little-endian protocol over a plain byte stream:
//!
//! | Direction | Frame | Layout |
//! |---|---|---|
//! | sensor → host | acceleration (streamed) | `55 51 AxL AxH AyL AyH AzL AzH TL TH sum` |
//! | host → sensor | register read | `FF AA <reg> 00` |
//! | sensor → host | register response | 10 bytes, quaternion at `[2..10)` |

use std::time::Duration;

// ── Streamed acceleration frames ─────────────────────────────────────────────

/// First byte of every streamed frame.
pub const SENTINEL: u8 = 0x55;

/// Frame-type tag that follows [`SENTINEL`] in an acceleration frame.
///
/// Other tags (angular rate, angle, …) share the sentinel and are skipped by
/// the acceleration decoder.
pub const ACCELERATION_TAG: u8 = 0x51;

/// Total length of one acceleration frame, sentinel and checksum included.
pub const ACCELERATION_FRAME_LEN: usize = 11;

/// Number of payload bytes between the tag and the checksum
/// (three axes plus the ignored temperature word).
pub const ACCELERATION_PAYLOAD_LEN: usize = 8;

/// Full-scale range of the accelerometer in multiples of g.
pub const ACCEL_RANGE_G: f64 = 16.0;

/// Standard gravity as used by the sensor vendor's conversion formula.
pub const GRAVITY: f64 = 9.8;

/// Raw i16 → physical units: `raw / 32768 × 16 × 9.8`.
///
/// `i16::MIN` maps to exactly `-156.8`; `i16::MAX` to just under `+156.8`.
pub const ACCEL_SCALE: f64 = ACCEL_RANGE_G * GRAVITY / 32768.0;

// ── Register reads (orientation) ─────────────────────────────────────────────

/// Two-byte prefix of every host → sensor command.
pub const COMMAND_HEADER: [u8; 2] = [0xFF, 0xAA];

/// Register holding the orientation quaternion.
pub const QUATERNION_REGISTER: u8 = 0x2C;

/// Exact length of a register-read response.
pub const ORIENTATION_RESPONSE_LEN: usize = 10;

/// Expected leading bytes of a register-read response.
///
/// The sensor does not document these beyond "header"; a mismatch is logged
/// and counted by [`crate::channel::SensorChannel`] but only rejected in
/// strict mode.
pub const ORIENTATION_RESPONSE_HEADER: [u8; 2] = [0xAA, 0x55];

/// Raw i16 → normalised quaternion component.
pub const QUATERNION_SCALE: f64 = 1.0 / 32768.0;

// ── Timing and sizing defaults ───────────────────────────────────────────────

/// Default serial line speed.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Polling period of the acquisition loop.
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Pause between writing a register read and collecting its response.
pub const SETTLE_DELAY: Duration = Duration::from_millis(10);

/// Upper bound on the blocking response read.  Must stay finite so a silent
/// sensor cannot stall the tick loop.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(100);

/// Minimum spacing between two export records.
pub const EXPORT_INTERVAL: Duration = Duration::from_millis(300);

/// Length of one test run before the restart prompt.
pub const SESSION_LIMIT: Duration = Duration::from_secs(300);

/// History length kept per channel before the windows reset.
pub const WINDOW_CAPACITY: usize = 100;

// ── Checksum ─────────────────────────────────────────────────────────────────

/// 8-bit additive checksum: the sum of all bytes modulo 256.
///
/// ```
/// # use lips_rs::protocol::checksum;
/// assert_eq!(checksum(&[0x55, 0x51]), 0xA6);
/// assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
/// assert_eq!(checksum(&[]), 0);
/// ```
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

// ── Encoders ─────────────────────────────────────────────────────────────────

/// Build the 4-byte register-read command `FF AA <register> 00`.
///
/// ```
/// # use lips_rs::protocol::{encode_read_register, QUATERNION_REGISTER};
/// assert_eq!(encode_read_register(QUATERNION_REGISTER), [0xFF, 0xAA, 0x2C, 0x00]);
/// ```
pub fn encode_read_register(register: u8) -> [u8; 4] {
    [COMMAND_HEADER[0], COMMAND_HEADER[1], register, 0x00]
}

/// Build a complete acceleration frame from raw axis counts and a raw
/// temperature word, checksum included.
///
/// Used by the simulator and by tests; real frames come from the sensor.
pub fn encode_acceleration_frame(raw: [i16; 3], temperature: i16) -> [u8; ACCELERATION_FRAME_LEN] {
    let mut frame = [0u8; ACCELERATION_FRAME_LEN];
    frame[0] = SENTINEL;
    frame[1] = ACCELERATION_TAG;
    for (i, value) in raw.iter().chain(std::iter::once(&temperature)).enumerate() {
        let [lo, hi] = value.to_le_bytes();
        frame[2 + i * 2] = lo;
        frame[3 + i * 2] = hi;
    }
    frame[10] = checksum(&frame[..10]);
    frame
}

/// Build a register-read response carrying raw quaternion counts.
pub fn encode_orientation_response(raw: [i16; 4]) -> [u8; ORIENTATION_RESPONSE_LEN] {
    let mut resp = [0u8; ORIENTATION_RESPONSE_LEN];
    resp[..2].copy_from_slice(&ORIENTATION_RESPONSE_HEADER);
    for (i, value) in raw.iter().enumerate() {
        resp[2 + i * 2..4 + i * 2].copy_from_slice(&value.to_le_bytes());
    }
    resp
}
