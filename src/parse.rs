//! Binary decoders for the two frame formats the sensors produce.
//!
//! All functions here are pure (no I/O) and never panic on malformed input.
//! Corrupted or partial data is reported as a value, so callers decide
//! whether to log it:
//!
//! | Function | Frame | Failure reporting |
//! |---|---|---|
//! | [`decode_frame`] | one acceleration frame at a known offset | [`FrameOutcome`] reason code |
//! | [`scan_acceleration`] | a whole read buffer | [`ScanReport`] counters, at most one sample |
//! | [`parse_orientation_response`] | a register-read response | [`ResponseError`] |

use thiserror::Error;

use crate::protocol::{
    checksum, ACCELERATION_FRAME_LEN, ACCELERATION_PAYLOAD_LEN, ACCELERATION_TAG, ACCEL_RANGE_G,
    GRAVITY, ORIENTATION_RESPONSE_HEADER, ORIENTATION_RESPONSE_LEN, QUATERNION_SCALE, SENTINEL,
};
use crate::types::{AccelerationSample, QuaternionSample};

// ── Acceleration frames ──────────────────────────────────────────────────────

/// Result of decoding the bytes at one candidate frame position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// A complete frame with a matching checksum.
    Sample(AccelerationSample),
    /// The slice does not start with [`SENTINEL`].
    NoSentinel,
    /// Fewer than [`ACCELERATION_FRAME_LEN`] bytes are available.
    Truncated,
    /// A sentinel followed by a different frame type.
    WrongTag(u8),
    /// The trailing byte disagrees with the computed checksum.
    ChecksumMismatch { expected: u8, found: u8 },
}

/// Convert one raw two's-complement axis count to m/s².
///
/// ```
/// # use lips_rs::parse::raw_to_acceleration;
/// assert_eq!(raw_to_acceleration(0), 0.0);
/// assert!((raw_to_acceleration(i16::MIN) + 156.8).abs() < 1e-9);
/// ```
pub fn raw_to_acceleration(raw: i16) -> f64 {
    raw as f64 / 32768.0 * ACCEL_RANGE_G * GRAVITY
}

fn read_i16_le(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Decode the acceleration frame that starts at `data[0]`.
///
/// Checks run in wire order: sentinel, length, tag, checksum.  The two
/// temperature bytes are covered by the checksum but otherwise ignored.
pub fn decode_frame(data: &[u8]) -> FrameOutcome {
    if data.first() != Some(&SENTINEL) {
        return FrameOutcome::NoSentinel;
    }
    if data.len() < ACCELERATION_FRAME_LEN {
        return FrameOutcome::Truncated;
    }
    if data[1] != ACCELERATION_TAG {
        return FrameOutcome::WrongTag(data[1]);
    }
    let (body, rest) = data.split_at(2 + ACCELERATION_PAYLOAD_LEN);
    let expected = checksum(body);
    let found = rest[0];
    if expected != found {
        return FrameOutcome::ChecksumMismatch { expected, found };
    }
    let payload = &body[2..];
    FrameOutcome::Sample(AccelerationSample {
        ax: raw_to_acceleration(read_i16_le(payload, 0)),
        ay: raw_to_acceleration(read_i16_le(payload, 2)),
        az: raw_to_acceleration(read_i16_le(payload, 4)),
    })
}

/// What one pass of [`scan_acceleration`] found.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScanReport {
    /// The first valid frame in the buffer, if any.
    pub sample: Option<AccelerationSample>,
    /// Bytes skipped while hunting for a sentinel.
    pub skipped: usize,
    /// Sentinels too close to the end of the buffer to hold a frame.
    pub truncated: u32,
    /// Sentinels followed by a tag other than [`ACCELERATION_TAG`].
    pub wrong_tags: u32,
    /// Complete frames rejected by the checksum.
    pub checksum_failures: u32,
}

impl ScanReport {
    /// `true` when anything in the buffer looked like a damaged frame.
    pub fn saw_noise(&self) -> bool {
        self.checksum_failures > 0 || self.truncated > 0
    }
}

/// Scan a read buffer for the first valid acceleration frame.
///
/// * Bytes before a sentinel are skipped.
/// * A sentinel with fewer than 11 bytes behind it, or with a foreign tag,
///   is dropped by itself and scanning resumes at the next byte (the tag may
///   itself be the start of another frame).
/// * A full frame with a bad checksum is skipped as a whole.
/// * Scanning stops at the first good frame; whatever follows it in the
///   buffer is ignored for this call.
///
/// ```
/// # use lips_rs::parse::scan_acceleration;
/// # use lips_rs::protocol::encode_acceleration_frame;
/// let mut buf = vec![0x00, 0x13];
/// buf.extend_from_slice(&encode_acceleration_frame([0, i16::MIN, 0], 0));
/// buf.extend_from_slice(&[0x55, 0x51, 0xde, 0xad]);
/// let s = scan_acceleration(&buf).sample.unwrap();
/// assert!((s.ay + 156.8).abs() < 1e-9);
/// ```
pub fn scan_acceleration(data: &[u8]) -> ScanReport {
    let mut report = ScanReport::default();
    let mut idx = 0;

    while idx < data.len() {
        match decode_frame(&data[idx..]) {
            FrameOutcome::Sample(sample) => {
                report.sample = Some(sample);
                break;
            }
            FrameOutcome::NoSentinel => {
                report.skipped += 1;
                idx += 1;
            }
            FrameOutcome::Truncated => {
                report.truncated += 1;
                idx += 1;
            }
            FrameOutcome::WrongTag(_) => {
                report.wrong_tags += 1;
                idx += 1;
            }
            FrameOutcome::ChecksumMismatch { expected, found } => {
                log::debug!(
                    "acceleration frame at offset {idx}: checksum 0x{found:02x}, expected 0x{expected:02x}"
                );
                report.checksum_failures += 1;
                idx += ACCELERATION_FRAME_LEN;
            }
        }
    }

    report
}

// ── Orientation responses ────────────────────────────────────────────────────

/// Why a register-read response was not turned into a quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("invalid response length: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("unexpected response header {found:02x?}")]
    Header { found: [u8; 2] },
}

/// `true` when the first two bytes equal [`ORIENTATION_RESPONSE_HEADER`].
pub fn response_header_matches(response: &[u8]) -> bool {
    response.get(..2) == Some(&ORIENTATION_RESPONSE_HEADER[..])
}

/// [`response_header_matches`] as a `Result`, carrying the bytes found.
pub fn check_response_header(response: &[u8]) -> Result<(), ResponseError> {
    if response_header_matches(response) {
        return Ok(());
    }
    let mut found = [0u8; 2];
    for (dst, src) in found.iter_mut().zip(response) {
        *dst = *src;
    }
    Err(ResponseError::Header { found })
}

/// Decode a 10-byte register-read response into a quaternion.
///
/// Only the length is validated here; header checking is left to the caller
/// via [`response_header_matches`].  Components are `i16 LE / 32768` and are
/// not clamped.
///
/// ```
/// # use lips_rs::parse::parse_orientation_response;
/// let q = parse_orientation_response(&[0xAA, 0x55, 0x00, 0x40, 0, 0, 0, 0, 0, 0]).unwrap();
/// assert_eq!(q.q0, 0.5);
/// assert!(parse_orientation_response(&[0xAA, 0x55, 0x00]).is_err());
/// ```
pub fn parse_orientation_response(response: &[u8]) -> Result<QuaternionSample, ResponseError> {
    if response.len() != ORIENTATION_RESPONSE_LEN {
        return Err(ResponseError::Length {
            expected: ORIENTATION_RESPONSE_LEN,
            actual: response.len(),
        });
    }
    let component = |off: usize| read_i16_le(response, off) as f64 * QUATERNION_SCALE;
    Ok(QuaternionSample {
        q0: component(2),
        q1: component(4),
        q2: component(6),
        q3: component(8),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_acceleration_frame;

    const TOL: f64 = 1e-9;

    fn scenario_frame() -> Vec<u8> {
        let mut f = vec![0x55, 0x51, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00];
        f.push(checksum(&f));
        f
    }

    #[test]
    fn decodes_reference_frame() {
        let s = scan_acceleration(&scenario_frame()).sample.unwrap();
        assert_eq!(s.ax, 0.0);
        assert!((s.ay - (-16.0 * 9.8)).abs() < TOL);
        assert_eq!(s.az, 0.0);
    }

    #[test]
    fn axis_conversion_endpoints() {
        assert_eq!(raw_to_acceleration(0), 0.0);
        assert!((raw_to_acceleration(i16::MIN) + 156.8).abs() < TOL);
        let max = raw_to_acceleration(i16::MAX);
        assert!(max < 156.8 && (max - 156.8).abs() < 0.01);
    }

    #[test]
    fn valid_frame_followed_by_garbage() {
        let mut buf = scenario_frame();
        buf.extend_from_slice(&[0x55, 0x51, 0x01, 0x02, 0xFF, 0x55, 0x00, 0x13]);
        let report = scan_acceleration(&buf);
        let s = report.sample.unwrap();
        assert!((s.ay + 156.8).abs() < TOL);
        assert_eq!(report.checksum_failures, 0);
        assert_eq!(report.truncated, 0);
    }

    #[test]
    fn only_first_frame_is_returned() {
        let mut buf = encode_acceleration_frame([100, 0, 0], 0).to_vec();
        buf.extend_from_slice(&encode_acceleration_frame([200, 0, 0], 0));
        let s = scan_acceleration(&buf).sample.unwrap();
        assert_eq!(s.ax, raw_to_acceleration(100));
    }

    #[test]
    fn any_single_byte_mutation_is_rejected() {
        let good = scenario_frame();
        for i in 0..10 {
            let mut bad = good.clone();
            bad[i] = bad[i].wrapping_add(1);
            assert_eq!(
                scan_acceleration(&bad).sample,
                None,
                "mutating byte {i} should invalidate the frame"
            );
        }
    }

    #[test]
    fn checksum_failure_skips_whole_frame() {
        let mut buf = scenario_frame();
        buf[10] ^= 0xFF;
        buf.extend_from_slice(&encode_acceleration_frame([1, 2, 3], 0));
        let report = scan_acceleration(&buf);
        assert_eq!(report.checksum_failures, 1);
        assert_eq!(report.sample.unwrap().az, raw_to_acceleration(3));
    }

    #[test]
    fn leading_noise_and_foreign_frames_are_skipped() {
        // angular-rate frame (tag 0x52) sharing the sentinel, then junk
        let mut buf = vec![0x01, 0x02];
        let mut gyro = encode_acceleration_frame([9, 9, 9], 0);
        gyro[1] = 0x52;
        gyro[10] = checksum(&gyro[..10]);
        buf.extend_from_slice(&gyro);
        buf.extend_from_slice(&encode_acceleration_frame([0, 0, -1], 0));
        let report = scan_acceleration(&buf);
        assert_eq!(report.wrong_tags, 1);
        assert!(report.skipped >= 2);
        assert_eq!(report.sample.unwrap().az, raw_to_acceleration(-1));
    }

    #[test]
    fn tag_byte_can_start_the_next_frame() {
        let mut buf = vec![0x55];
        buf.extend_from_slice(&encode_acceleration_frame([7, 0, 0], 0));
        let report = scan_acceleration(&buf);
        assert_eq!(report.wrong_tags, 1);
        assert_eq!(report.sample.unwrap().ax, raw_to_acceleration(7));
    }

    #[test]
    fn truncated_trailing_frame_yields_nothing() {
        let frame = scenario_frame();
        let report = scan_acceleration(&frame[..7]);
        assert_eq!(report.sample, None);
        assert_eq!(report.truncated, 1);
        assert!(report.saw_noise());
    }

    #[test]
    fn empty_buffer() {
        assert_eq!(scan_acceleration(&[]), ScanReport::default());
    }

    #[test]
    fn decode_frame_reason_codes() {
        assert_eq!(decode_frame(&[0x00]), FrameOutcome::NoSentinel);
        assert_eq!(decode_frame(&[0x55, 0x51]), FrameOutcome::Truncated);
        let mut f = scenario_frame();
        f[1] = 0x53;
        assert_eq!(decode_frame(&f), FrameOutcome::WrongTag(0x53));
        let mut f = scenario_frame();
        let good = f[10];
        f[10] = good.wrapping_add(1);
        assert_eq!(
            decode_frame(&f),
            FrameOutcome::ChecksumMismatch { expected: good, found: good.wrapping_add(1) }
        );
    }

    #[test]
    fn decode_frame_reads_only_its_own_payload() {
        let mut buf = encode_acceleration_frame([1000, -2000, 3000], -5).to_vec();
        buf.extend_from_slice(&[0x55, 0x51, 0xFF]);
        let FrameOutcome::Sample(s) = decode_frame(&buf) else {
            panic!("expected a sample");
        };
        assert_eq!(s.ax, raw_to_acceleration(1000));
        assert_eq!(s.ay, raw_to_acceleration(-2000));
        assert_eq!(s.az, raw_to_acceleration(3000));
    }

    #[test]
    fn quaternion_reference_response() {
        let q = parse_orientation_response(&[0xAA, 0x55, 0x00, 0x40, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!((q.q0, q.q1, q.q2, q.q3), (0.5, 0.0, 0.0, 0.0));
    }

    #[test]
    fn quaternion_is_not_clamped() {
        let resp = [0xAA, 0x55, 0x00, 0x80, 0xFF, 0x7F, 0x00, 0x00, 0x00, 0x00];
        let q = parse_orientation_response(&resp).unwrap();
        assert_eq!(q.q0, -1.0);
        assert!((q.q1 - 32767.0 / 32768.0).abs() < TOL);
    }

    #[test]
    fn short_or_long_response_is_rejected() {
        assert_eq!(
            parse_orientation_response(&[0xAA; 9]),
            Err(ResponseError::Length { expected: 10, actual: 9 })
        );
        assert!(parse_orientation_response(&[0; 11]).is_err());
        assert!(parse_orientation_response(&[]).is_err());
    }

    #[test]
    fn header_check() {
        assert!(response_header_matches(&[0xAA, 0x55, 0, 0]));
        assert!(!response_header_matches(&[0x55, 0xAA]));
        assert!(!response_header_matches(&[0xAA]));

        assert_eq!(check_response_header(&[0xAA, 0x55, 1, 2]), Ok(()));
        assert_eq!(
            check_response_header(&[0x55, 0xAA]),
            Err(ResponseError::Header { found: [0x55, 0xAA] })
        );
        assert_eq!(
            check_response_header(&[0x11]),
            Err(ResponseError::Header { found: [0x11, 0x00] })
        );
    }
}
