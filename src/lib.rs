//! # lips-rs
//!
//! Rust library and terminal UI for acquiring motion telemetry from two
//! WitMotion-style serial IMUs at once.
//!
//! Each sensor streams 11-byte acceleration frames and answers quaternion
//! register reads.  The library decodes both, derives the oscillation
//! magnitude and sampling frequency of each channel, keeps short plot
//! windows, and exports a combined row to CSV at most every 300 ms during a
//! fixed-length test session.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Instant;
//! use lips_rs::prelude::*;
//!
//! struct Operator;
//!
//! impl SessionControl for Operator {
//!     type Sink = CsvSink;
//!     fn request_file_name(&mut self) -> String { "trial-1".into() }
//!     fn open_sink(&mut self, name: &str) -> Result<CsvSink, SinkError> {
//!         CsvSink::create("runs", name)
//!     }
//!     fn notify_session_ended(&mut self) -> bool { false }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let serial = SerialConfig::default();
//!     let a = SerialStream::open("/dev/ttyUSB0", &serial)?;
//!     let b = SerialStream::open("/dev/ttyUSB1", &serial)?;
//!
//!     let mut op = Operator;
//!     let config = SessionConfig::default();
//!     let tick = config.tick_interval;
//!     let mut session = TestSession::start(a, b, config, &mut op, Instant::now())?;
//!
//!     while session.state() != SessionState::Stopped {
//!         if session.tick(Instant::now()).session_ended() {
//!             session.conclude(&mut op, Instant::now())?;
//!         }
//!         std::thread::sleep(tick);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Using as a library dependency
//!
//! ```toml
//! [dependencies]
//! # Full build (includes the ratatui dashboard):
//! lips-rs = "0.1"
//!
//! # Library only, skipping ratatui / crossterm:
//! lips-rs = { version = "0.1", default-features = false }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`protocol`] | Wire constants, default timings, and frame encoders |
//! | [`parse`] | Acceleration frame scanner and orientation response decoder |
//! | [`types`] | Samples, per-channel readings, and the export row |
//! | [`window`] | [`window::WindowBuffer`], bounded history that empties when full |
//! | [`transport`] | The [`transport::ByteStream`] contract, serial ports, and discovery |
//! | [`simulator`] | [`simulator::SimulatedSensor`], a protocol-accurate fake IMU |
//! | [`channel`] | [`channel::SensorChannel`], one sensor's per-tick acquisition |
//! | [`export`] | Export rate limiting and the CSV sink |
//! | [`session`] | [`session::TestSession`], the two-channel session state machine |
//! | [`cli`] | Command-line options shared by the `lips` and `tui` binaries |

pub mod channel;
pub mod cli;
pub mod export;
pub mod parse;
pub mod protocol;
pub mod session;
pub mod simulator;
pub mod transport;
pub mod types;
pub mod window;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Session ───────────────────────────────────────────────────────────────
    pub use crate::session::{
        SessionConfig, SessionControl, SessionError, SessionState, TestSession, TickOutcome,
        TickReport,
    };

    // ── Channels and export ───────────────────────────────────────────────────
    pub use crate::channel::{ChannelConfig, ChannelDiagnostics, ChannelUpdate, SensorChannel};
    pub use crate::export::{CsvSink, ExportGate, ExportScheduler, ExportSink, SinkError};

    // ── Transport ─────────────────────────────────────────────────────────────
    pub use crate::simulator::SimulatedSensor;
    pub use crate::transport::{discover_ports, ByteStream, SerialConfig, SerialStream, StreamError};

    // ── Data types ────────────────────────────────────────────────────────────
    pub use crate::types::{
        AccelerationSample, ChannelReading, ExportRecord, Oscillation, QuaternionSample,
    };
    pub use crate::window::WindowBuffer;
}
