//! One sensor, one byte stream, and the recent history derived from it.

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::parse::{check_response_header, parse_orientation_response, scan_acceleration};
use crate::protocol::{
    encode_read_register, ORIENTATION_RESPONSE_LEN, QUATERNION_REGISTER, RESPONSE_TIMEOUT,
    SETTLE_DELAY, WINDOW_CAPACITY,
};
use crate::transport::{ByteStream, StreamError};
use crate::types::{AccelerationSample, ChannelReading, Oscillation, QuaternionSample};
use crate::window::WindowBuffer;

// ── ChannelConfig ────────────────────────────────────────────────────────────

/// Per-channel acquisition settings.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Capacity of each history window.  Default: `100`.
    pub window_capacity: usize,
    /// Register polled for orientation.  Default: `0x2C` (quaternion).
    pub orientation_register: u8,
    /// Pause between the register-read command and its response.
    /// Default: 10 ms.  Blocks the tick.
    pub settle_delay: Duration,
    /// Upper bound on waiting for the 10-byte response.  Default: 100 ms.
    pub response_timeout: Duration,
    /// Reject responses whose first two bytes are not the expected header
    /// instead of only logging them.  Default: `false`.
    pub strict_response_header: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            window_capacity: WINDOW_CAPACITY,
            orientation_register: QUATERNION_REGISTER,
            settle_delay: SETTLE_DELAY,
            response_timeout: RESPONSE_TIMEOUT,
            strict_response_header: false,
        }
    }
}

// ── Diagnostics ──────────────────────────────────────────────────────────────

/// Running counters for everything a channel has silently absorbed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelDiagnostics {
    pub samples: u64,
    pub checksum_failures: u64,
    pub wrong_tags: u64,
    pub truncated_frames: u64,
    pub invalid_responses: u64,
    pub header_mismatches: u64,
    pub stream_faults: u64,
}

// ── ChannelUpdate ────────────────────────────────────────────────────────────

/// What one [`SensorChannel::refresh`] produced.
#[derive(Debug, Default)]
pub struct ChannelUpdate {
    /// A fresh sample, if a valid frame arrived this tick.
    pub acceleration: Option<AccelerationSample>,
    /// Magnitude of `acceleration`.
    pub oscillation: Option<f64>,
    /// The orientation read this tick, if the round trip succeeded.
    pub orientation: Option<QuaternionSample>,
    /// Set when the link itself failed.  Everything not yet done this tick
    /// was skipped; the channel keeps its previous state.
    pub fault: Option<StreamError>,
}

impl ChannelUpdate {
    pub fn is_fresh(&self) -> bool {
        self.acceleration.is_some()
    }
}

// ── SensorChannel ────────────────────────────────────────────────────────────

/// A single sensor and the state derived from its stream.
///
/// Each tick, [`refresh`](Self::refresh) drains the stream for one
/// acceleration frame, then performs one orientation round trip.  The drain
/// always comes first so the command/response exchange never lands in the
/// acceleration scanner's buffer.
pub struct SensorChannel<S> {
    name: String,
    stream: S,
    config: ChannelConfig,

    acceleration: WindowBuffer<AccelerationSample>,
    oscillation: WindowBuffer<Oscillation>,
    orientation: WindowBuffer<QuaternionSample>,

    frequency: f64,
    last_sample_at: Option<Instant>,
    latest_acceleration: Option<AccelerationSample>,
    latest_orientation: Option<QuaternionSample>,

    diagnostics: ChannelDiagnostics,
}

impl<S: ByteStream> SensorChannel<S> {
    pub fn new(name: impl Into<String>, stream: S, config: ChannelConfig) -> Self {
        let cap = config.window_capacity;
        Self {
            name: name.into(),
            stream,
            config,
            acceleration: WindowBuffer::new(cap),
            oscillation: WindowBuffer::new(cap),
            orientation: WindowBuffer::new(cap),
            frequency: 0.0,
            last_sample_at: None,
            latest_acceleration: None,
            latest_orientation: None,
            diagnostics: ChannelDiagnostics::default(),
        }
    }

    /// Run one acquisition step at time `now`.
    ///
    /// Never fails: decode noise is counted, and a link failure is returned
    /// in [`ChannelUpdate::fault`] with the channel left as it was.
    pub fn refresh(&mut self, now: Instant) -> ChannelUpdate {
        let mut update = ChannelUpdate::default();

        match self.poll_acceleration() {
            Ok(Some(sample)) => {
                let osc = self.record_acceleration(sample, now);
                update.acceleration = Some(sample);
                update.oscillation = Some(osc);
            }
            Ok(None) => {}
            Err(e) => return self.fault(update, e),
        }

        match self.poll_orientation() {
            Ok(Some(q)) => {
                self.orientation.push(q);
                self.latest_orientation = Some(q);
                update.orientation = Some(q);
            }
            Ok(None) => {}
            Err(e) => return self.fault(update, e),
        }

        update
    }

    /// Drop all derived state.  The stream is kept as is.
    pub fn reset(&mut self) {
        self.acceleration.clear();
        self.oscillation.clear();
        self.orientation.clear();
        self.frequency = 0.0;
        self.last_sample_at = None;
        self.latest_acceleration = None;
        self.latest_orientation = None;
        self.diagnostics = ChannelDiagnostics::default();
    }

    fn fault(&mut self, mut update: ChannelUpdate, e: StreamError) -> ChannelUpdate {
        warn!("{}: stream fault: {e}", self.name);
        self.diagnostics.stream_faults += 1;
        update.fault = Some(e);
        update
    }

    fn poll_acceleration(&mut self) -> Result<Option<AccelerationSample>, StreamError> {
        let bytes = self.stream.read_available()?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let report = scan_acceleration(&bytes);
        self.diagnostics.checksum_failures += report.checksum_failures as u64;
        self.diagnostics.wrong_tags += report.wrong_tags as u64;
        self.diagnostics.truncated_frames += report.truncated as u64;
        if report.sample.is_none() && report.saw_noise() {
            debug!(
                "{}: no valid frame in {} bytes ({} checksum failures, {} truncated)",
                self.name,
                bytes.len(),
                report.checksum_failures,
                report.truncated
            );
        }
        Ok(report.sample)
    }

    fn poll_orientation(&mut self) -> Result<Option<QuaternionSample>, StreamError> {
        self.stream
            .write_all(&encode_read_register(self.config.orientation_register))?;
        if !self.config.settle_delay.is_zero() {
            std::thread::sleep(self.config.settle_delay);
        }
        let response = self
            .stream
            .read_with_timeout(ORIENTATION_RESPONSE_LEN, self.config.response_timeout)?;
        debug!(
            "{}: orientation response ({} bytes): {}",
            self.name,
            response.len(),
            hex(&response)
        );

        let q = match parse_orientation_response(&response) {
            Ok(q) => q,
            Err(e) => {
                warn!("{}: {e}", self.name);
                self.diagnostics.invalid_responses += 1;
                return Ok(None);
            }
        };

        if let Err(e) = check_response_header(&response) {
            self.diagnostics.header_mismatches += 1;
            warn!("{}: {e}", self.name);
            if self.config.strict_response_header {
                self.diagnostics.invalid_responses += 1;
                return Ok(None);
            }
        }

        Ok(Some(q))
    }

    /// Push a fresh sample into the windows and update the frequency.
    /// Returns the oscillation magnitude.
    fn record_acceleration(&mut self, sample: AccelerationSample, now: Instant) -> f64 {
        if let Some(prev) = self.last_sample_at {
            match now.checked_duration_since(prev) {
                Some(dt) if !dt.is_zero() => {
                    let hz = 1.0 / dt.as_secs_f64();
                    if hz.is_finite() {
                        self.frequency = hz;
                    }
                }
                _ => debug!("{}: non-positive sample interval, frequency held", self.name),
            }
        }
        self.last_sample_at = Some(now);

        let osc = Oscillation::from(sample);
        self.acceleration.push(sample);
        self.oscillation.push(osc);
        self.latest_acceleration = Some(sample);
        self.diagnostics.samples += 1;
        osc.magnitude
    }
}

impl<S> SensorChannel<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest frequency estimate in Hz; `0.0` before two samples arrived.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn acceleration_window(&self) -> &WindowBuffer<AccelerationSample> {
        &self.acceleration
    }

    pub fn oscillation_window(&self) -> &WindowBuffer<Oscillation> {
        &self.oscillation
    }

    pub fn orientation_window(&self) -> &WindowBuffer<QuaternionSample> {
        &self.orientation
    }

    pub fn latest_acceleration(&self) -> Option<AccelerationSample> {
        self.latest_acceleration
    }

    pub fn latest_orientation(&self) -> Option<QuaternionSample> {
        self.latest_orientation
    }

    pub fn diagnostics(&self) -> ChannelDiagnostics {
        self.diagnostics
    }

    /// The latest values in export form, or `None` before the first sample.
    /// `orientation` is passed in because exports use this tick's read only.
    pub fn reading(&self, orientation: Option<QuaternionSample>) -> Option<ChannelReading> {
        self.latest_acceleration.map(|acceleration| ChannelReading {
            acceleration,
            oscillation: acceleration.magnitude(),
            frequency: self.frequency,
            orientation,
        })
    }

    /// Direct access to the underlying link.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_acceleration_frame, encode_orientation_response};
    use std::collections::VecDeque;
    use std::io;

    #[derive(Debug, PartialEq)]
    enum Op {
        Drain,
        Write(Vec<u8>),
        Read(usize),
    }

    /// Replays canned reads and responses, recording every call.
    #[derive(Default)]
    struct Scripted {
        reads: VecDeque<Vec<u8>>,
        responses: VecDeque<Vec<u8>>,
        fail_next_read: bool,
        ops: Vec<Op>,
    }

    impl ByteStream for Scripted {
        fn read_available(&mut self) -> Result<Vec<u8>, StreamError> {
            self.ops.push(Op::Drain);
            if std::mem::take(&mut self.fail_next_read) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged").into());
            }
            Ok(self.reads.pop_front().unwrap_or_default())
        }

        fn write_all(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
            self.ops.push(Op::Write(bytes.to_vec()));
            Ok(())
        }

        fn read_with_timeout(&mut self, n: usize, _: Duration) -> Result<Vec<u8>, StreamError> {
            self.ops.push(Op::Read(n));
            Ok(self.responses.pop_front().unwrap_or_default())
        }
    }

    fn config() -> ChannelConfig {
        ChannelConfig {
            settle_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn channel(reads: Vec<Vec<u8>>, responses: Vec<Vec<u8>>) -> SensorChannel<Scripted> {
        let stream = Scripted {
            reads: reads.into(),
            responses: responses.into(),
            ..Default::default()
        };
        SensorChannel::new("test", stream, config())
    }

    fn frame(x: i16) -> Vec<u8> {
        encode_acceleration_frame([x, 0, 0], 0).to_vec()
    }

    #[test]
    fn drains_before_the_orientation_round_trip() {
        let mut ch = channel(vec![frame(1)], vec![]);
        ch.refresh(Instant::now());
        assert_eq!(
            ch.stream_mut().ops,
            vec![Op::Drain, Op::Write(vec![0xFF, 0xAA, 0x2C, 0x00]), Op::Read(10)]
        );
    }

    #[test]
    fn fresh_sample_updates_windows_and_frequency() {
        let t0 = Instant::now();
        let mut ch = channel(vec![frame(100), frame(200)], vec![]);

        let first = ch.refresh(t0);
        assert!(first.is_fresh());
        assert_eq!(ch.frequency(), 0.0);

        let second = ch.refresh(t0 + Duration::from_millis(20));
        assert!(second.is_fresh());
        assert!((ch.frequency() - 50.0).abs() < 1e-6);
        assert_eq!(ch.acceleration_window().len(), 2);
        assert_eq!(ch.oscillation_window().len(), 2);
        assert_eq!(
            second.oscillation,
            Some(ch.oscillation_window().last().unwrap().magnitude)
        );
    }

    #[test]
    fn no_sample_leaves_state_untouched() {
        let t0 = Instant::now();
        let mut ch = channel(vec![frame(1), frame(2), vec![]], vec![]);
        ch.refresh(t0);
        ch.refresh(t0 + Duration::from_millis(10));
        let stale = ch.refresh(t0 + Duration::from_millis(15));
        assert!(!stale.is_fresh());
        assert!((ch.frequency() - 100.0).abs() < 1e-6);
        assert_eq!(ch.acceleration_window().len(), 2);
    }

    #[test]
    fn non_positive_interval_holds_frequency() {
        let t0 = Instant::now();
        let mut ch = channel(vec![frame(1), frame(2), frame(3), frame(4)], vec![]);
        ch.refresh(t0);
        ch.refresh(t0 + Duration::from_millis(10));
        assert!((ch.frequency() - 100.0).abs() < 1e-6);

        ch.refresh(t0 + Duration::from_millis(10));
        assert!((ch.frequency() - 100.0).abs() < 1e-6);
        ch.refresh(t0 + Duration::from_millis(5));
        assert!((ch.frequency() - 100.0).abs() < 1e-6);
        assert!(ch.frequency().is_finite());
    }

    #[test]
    fn quaternion_is_recorded() {
        let resp = vec![0xAA, 0x55, 0x00, 0x40, 0, 0, 0, 0, 0, 0];
        let mut ch = channel(vec![], vec![resp]);
        let up = ch.refresh(Instant::now());
        assert_eq!(up.orientation.unwrap().q0, 0.5);
        assert_eq!(ch.orientation_window().len(), 1);
        assert_eq!(ch.latest_orientation().unwrap().q0, 0.5);
    }

    #[test]
    fn short_response_is_absorbed() {
        let mut ch = channel(vec![frame(5)], vec![vec![0xAA, 0x55, 0x00]]);
        let up = ch.refresh(Instant::now());
        assert!(up.is_fresh());
        assert!(up.orientation.is_none());
        assert!(up.fault.is_none());
        assert_eq!(ch.diagnostics().invalid_responses, 1);
    }

    #[test]
    fn header_mismatch_is_counted_but_accepted() {
        let mut resp = encode_orientation_response([0x4000, 0, 0, 0]).to_vec();
        resp[0] = 0x00;
        let mut ch = channel(vec![], vec![resp.clone()]);
        assert!(ch.refresh(Instant::now()).orientation.is_some());
        assert_eq!(ch.diagnostics().header_mismatches, 1);

        let mut strict = SensorChannel::new(
            "strict",
            Scripted {
                responses: vec![resp].into(),
                ..Default::default()
            },
            ChannelConfig {
                strict_response_header: true,
                ..config()
            },
        );
        assert!(strict.refresh(Instant::now()).orientation.is_none());
        assert_eq!(strict.diagnostics().invalid_responses, 1);
    }

    #[test]
    fn stream_fault_is_reported_not_raised() {
        let mut ch = channel(vec![], vec![]);
        ch.stream_mut().fail_next_read = true;
        let up = ch.refresh(Instant::now());
        assert!(matches!(up.fault, Some(StreamError::Io(_))));
        assert!(!up.is_fresh());
        assert_eq!(ch.diagnostics().stream_faults, 1);
        // the round trip is skipped once the link is known bad
        assert_eq!(ch.stream_mut().ops, vec![Op::Drain]);

        let recovered = ch.refresh(Instant::now());
        assert!(recovered.fault.is_none());
    }

    #[test]
    fn noise_is_counted() {
        let mut bad = frame(1);
        bad[10] ^= 0x01;
        let mut ch = channel(vec![bad], vec![]);
        assert!(!ch.refresh(Instant::now()).is_fresh());
        assert_eq!(ch.diagnostics().checksum_failures, 1);
    }

    #[test]
    fn windows_reset_at_capacity() {
        let t0 = Instant::now();
        let reads = (0..100).map(|i| frame(i as i16)).collect();
        let mut ch = SensorChannel::new(
            "cap",
            Scripted {
                reads,
                ..Default::default()
            },
            config(),
        );
        for i in 0..99 {
            ch.refresh(t0 + Duration::from_millis(i));
        }
        assert_eq!(ch.acceleration_window().len(), 99);
        ch.refresh(t0 + Duration::from_millis(99));
        assert!(ch.acceleration_window().is_empty());
        assert!(ch.oscillation_window().is_empty());
    }

    #[test]
    fn reset_clears_derived_state() {
        let t0 = Instant::now();
        let mut ch = channel(vec![frame(1), frame(2)], vec![]);
        ch.refresh(t0);
        ch.refresh(t0 + Duration::from_millis(10));
        ch.reset();
        assert_eq!(ch.frequency(), 0.0);
        assert!(ch.acceleration_window().is_empty());
        assert!(ch.reading(None).is_none());
        assert_eq!(ch.diagnostics(), ChannelDiagnostics::default());
    }
}
