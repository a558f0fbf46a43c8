//! An in-process stand-in for a serial IMU.
//!
//! [`SimulatedSensor`] speaks the real wire protocol: it streams checksummed
//! acceleration frames and answers quaternion register reads, so everything
//! above the [`ByteStream`] seam runs unmodified with `--simulate`.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::time::{Duration, Instant};

use log::debug;

use crate::protocol::{
    encode_acceleration_frame, encode_orientation_response, encode_read_register, ACCEL_SCALE,
    GRAVITY, QUATERNION_REGISTER,
};
use crate::transport::{ByteStream, StreamError};

/// Most frames a real-time sensor will hand out in one read, so a long stall
/// does not produce an unbounded burst.
const MAX_BURST: u64 = 64;

/// When the simulator emits frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Frames accrue at `rate_hz` of wall-clock time.
    RealTime { rate_hz: f64 },
    /// Exactly one frame per [`ByteStream::read_available`] call, with
    /// simulated time advancing by `step` each call.  Deterministic.
    PerRead { step: Duration },
}

/// Shape of the simulated motion.
#[derive(Debug, Clone)]
pub struct MotionProfile {
    /// Peak horizontal swing in m/s².
    pub amplitude: f64,
    /// Swing frequency in Hz.
    pub frequency_hz: f64,
    /// Phase offset in radians, so two sensors do not move in lockstep.
    pub phase: f64,
    /// Corrupt the checksum of every Nth frame.
    pub corrupt_every: Option<u64>,
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            amplitude: 6.0,
            frequency_hz: 0.8,
            phase: 0.0,
            corrupt_every: None,
        }
    }
}

pub struct SimulatedSensor {
    pacing: Pacing,
    profile: MotionProfile,
    started: Instant,
    emitted: u64,
    /// Register-read responses waiting to be collected.
    pending: VecDeque<u8>,
}

impl SimulatedSensor {
    pub fn new(pacing: Pacing, profile: MotionProfile) -> Self {
        Self {
            pacing,
            profile,
            started: Instant::now(),
            emitted: 0,
            pending: VecDeque::new(),
        }
    }

    /// A 50 Hz real-time sensor with the default motion and `phase`.
    pub fn realtime(phase: f64) -> Self {
        Self::new(
            Pacing::RealTime { rate_hz: 50.0 },
            MotionProfile {
                phase,
                ..Default::default()
            },
        )
    }

    /// Frames emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Simulated time of frame number `n`.
    fn frame_time(&self, n: u64) -> f64 {
        match self.pacing {
            Pacing::RealTime { rate_hz } => n as f64 / rate_hz,
            Pacing::PerRead { step } => n as f64 * step.as_secs_f64(),
        }
    }

    /// Simulated time of the most recent frame.
    fn now_secs(&self) -> f64 {
        self.frame_time(self.emitted.saturating_sub(1))
    }

    fn acceleration_at(&self, t: f64) -> [f64; 3] {
        let p = &self.profile;
        let w = 2.0 * PI * p.frequency_hz * t + p.phase;
        [
            p.amplitude * w.sin(),
            0.5 * p.amplitude * w.cos(),
            GRAVITY + 0.2 * (3.0 * w).sin(),
        ]
    }

    fn quaternion_at(&self, t: f64) -> [f64; 4] {
        let p = &self.profile;
        let angle = 0.3 * (2.0 * PI * p.frequency_hz * t + p.phase).sin();
        [(angle / 2.0).cos(), 0.0, 0.0, (angle / 2.0).sin()]
    }

    fn frame(&self, n: u64) -> [u8; 11] {
        let to_raw = |v: f64| (v / ACCEL_SCALE).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        let [ax, ay, az] = self.acceleration_at(self.frame_time(n));
        let mut frame = encode_acceleration_frame([to_raw(ax), to_raw(ay), to_raw(az)], 0x0A28);
        if let Some(every) = self.profile.corrupt_every {
            if every > 0 && (n + 1) % every == 0 {
                frame[10] = frame[10].wrapping_add(1);
            }
        }
        frame
    }

    fn frames_due(&self) -> u64 {
        match self.pacing {
            Pacing::RealTime { rate_hz } => {
                let elapsed = self.started.elapsed().as_secs_f64();
                let total = (elapsed * rate_hz) as u64;
                total.saturating_sub(self.emitted).min(MAX_BURST)
            }
            Pacing::PerRead { .. } => 1,
        }
    }
}

impl ByteStream for SimulatedSensor {
    fn read_available(&mut self) -> Result<Vec<u8>, StreamError> {
        let due = self.frames_due();
        let mut out = Vec::with_capacity(due as usize * 11);
        for _ in 0..due {
            out.extend_from_slice(&self.frame(self.emitted));
            self.emitted += 1;
        }
        Ok(out)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        if bytes == encode_read_register(QUATERNION_REGISTER) {
            let to_raw = |v: f64| (v * 32767.0).round() as i16;
            let [q0, q1, q2, q3] = self.quaternion_at(self.now_secs());
            self.pending
                .extend(encode_orientation_response([to_raw(q0), to_raw(q1), to_raw(q2), to_raw(q3)]));
        } else {
            debug!("simulator: ignoring command {bytes:02x?}");
        }
        Ok(())
    }

    fn read_with_timeout(&mut self, n: usize, _timeout: Duration) -> Result<Vec<u8>, StreamError> {
        let take = n.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }
}
