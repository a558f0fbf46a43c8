//! The test-session state machine that drives both channels.
//!
//! ```text
//!            start
//!              │
//!              ▼
//!          Running ──── elapsed ≥ limit ───▶ AwaitingRestartDecision
//!              ▲                                 │            │
//!              └─────────── restart ─────────────┘            │ stop
//!                                                             ▼
//!                                                          Stopped
//! ```
//!
//! [`TestSession`] does no I/O scheduling of its own.  A driver (the CLI's
//! interval loop, the TUI's event loop, or a test) calls
//! [`tick`](TestSession::tick) every `tick_interval` with the current time.

use std::time::{Duration, Instant};

use chrono::Local;
use log::{debug, error, info};
use thiserror::Error;

use crate::channel::{ChannelConfig, SensorChannel};
use crate::export::{default_file_name, ExportGate, ExportInput, ExportScheduler, ExportSink, SinkError};
use crate::protocol::{EXPORT_INTERVAL, SESSION_LIMIT, TICK_INTERVAL};
use crate::transport::ByteStream;

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the driver should call [`TestSession::tick`].  Default: 10 ms.
    pub tick_interval: Duration,
    /// Minimum spacing of export rows.  Default: 300 ms.
    pub export_interval: Duration,
    /// Session length before the restart prompt.  Default: 5 minutes.
    pub session_limit: Duration,
    /// Default: [`ExportGate::BothFresh`].
    pub export_gate: ExportGate,
    /// Applied to both channels.
    pub channel: ChannelConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: TICK_INTERVAL,
            export_interval: EXPORT_INTERVAL,
            session_limit: SESSION_LIMIT,
            export_gate: ExportGate::default(),
            channel: ChannelConfig::default(),
        }
    }
}

// ── Collaborator ─────────────────────────────────────────────────────────────

/// What the session needs from whoever operates it.
pub trait SessionControl {
    type Sink: ExportSink;

    /// Ask for an output name.  An empty answer selects a timestamped default.
    fn request_file_name(&mut self) -> String;

    /// Open the sink rows are exported to.
    fn open_sink(&mut self, name: &str) -> Result<Self::Sink, SinkError>;

    /// The time limit was reached.  Return `true` to start over.
    fn notify_session_ended(&mut self) -> bool;
}

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    AwaitingRestartDecision,
    Stopped,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is stopped")]
    Stopped,

    #[error("session is not awaiting a restart decision")]
    NotAwaiting,

    #[error("could not open export sink: {0}")]
    Sink(#[from] SinkError),
}

/// What one [`TestSession::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The session is not running; nothing happened.
    Skipped,
    Ran(TickReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Which channels produced a fresh sample.
    pub fresh: [bool; 2],
    /// Link faults absorbed this tick, across both channels.
    pub faults: usize,
    /// A row was handed to the sink successfully.
    pub exported: bool,
    /// This tick reached the time limit.
    pub ended: bool,
    /// Wall-clock time spent in the tick.
    pub duration: Duration,
}

impl TickOutcome {
    pub fn session_ended(&self) -> bool {
        matches!(self, TickOutcome::Ran(r) if r.ended)
    }
}

// ── TestSession ──────────────────────────────────────────────────────────────

/// Both channels, the export schedule, and the session clock.
pub struct TestSession<S, K> {
    channels: [SensorChannel<S>; 2],
    config: SessionConfig,
    state: SessionState,
    started: Instant,
    scheduler: ExportScheduler,

    file_name: String,
    sink: K,

    ticks: u64,
    exports: u64,
    sink_errors: u64,
    last_tick: Duration,
}

impl<S: ByteStream, K: ExportSink> TestSession<S, K> {
    /// Ask `control` for a file name, open the sink, and start running.
    pub fn start<C>(
        first: S,
        second: S,
        config: SessionConfig,
        control: &mut C,
        now: Instant,
    ) -> Result<Self, SessionError>
    where
        C: SessionControl<Sink = K>,
    {
        let (file_name, sink) = open_output(control)?;
        let channels = [
            SensorChannel::new("channel 1", first, config.channel.clone()),
            SensorChannel::new("channel 2", second, config.channel.clone()),
        ];
        let scheduler = ExportScheduler::new(config.export_interval, config.export_gate, now);
        info!(
            "Session started: exporting to {}, limit {:?}",
            sink.describe(),
            config.session_limit
        );
        Ok(Self {
            channels,
            config,
            state: SessionState::Running,
            started: now,
            scheduler,
            file_name,
            sink,
            ticks: 0,
            exports: 0,
            sink_errors: 0,
            last_tick: Duration::ZERO,
        })
    }

    /// Refresh both channels, maybe export a row, then check the time limit.
    /// A no-op unless the session is running.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.state != SessionState::Running {
            return TickOutcome::Skipped;
        }
        let t0 = Instant::now();

        let updates = [self.channels[0].refresh(now), self.channels[1].refresh(now)];
        let inputs = [0, 1].map(|i| ExportInput {
            fresh: updates[i].is_fresh(),
            reading: self.channels[i].reading(updates[i].orientation),
        });

        let mut exported = false;
        let stamp = Local::now().naive_local();
        if let Some(record) = self.scheduler.poll(now, stamp, &inputs[0], &inputs[1]) {
            match self.sink.append(&record) {
                Ok(()) => {
                    self.exports += 1;
                    exported = true;
                }
                Err(e) => {
                    self.sink_errors += 1;
                    error!("Export to {} failed: {e}", self.sink.describe());
                }
            }
        }

        let ended = self.elapsed(now) >= self.config.session_limit;
        if ended {
            self.state = SessionState::AwaitingRestartDecision;
            info!(
                "Session limit of {:?} reached after {} ticks, {} rows exported",
                self.config.session_limit, self.ticks + 1, self.exports
            );
        }

        self.ticks += 1;
        self.last_tick = t0.elapsed();
        debug!("tick {} took {:?}", self.ticks, self.last_tick);

        TickOutcome::Ran(TickReport {
            fresh: [inputs[0].fresh, inputs[1].fresh],
            faults: updates.iter().filter(|u| u.fault.is_some()).count(),
            exported,
            ended,
            duration: self.last_tick,
        })
    }

    /// Start over with a fresh output: windows, frequencies and both clocks
    /// are reset.  The byte streams are kept.
    ///
    /// Only allowed once the time limit has been reached.  If the new sink
    /// cannot be opened the session is left as it was.
    pub fn restart<C>(&mut self, control: &mut C, now: Instant) -> Result<(), SessionError>
    where
        C: SessionControl<Sink = K>,
    {
        match self.state {
            SessionState::AwaitingRestartDecision => {}
            SessionState::Stopped => return Err(SessionError::Stopped),
            SessionState::Running => return Err(SessionError::NotAwaiting),
        }
        let (file_name, sink) = open_output(control)?;
        for ch in &mut self.channels {
            ch.reset();
        }
        self.scheduler.reset(now);
        self.started = now;
        self.file_name = file_name;
        self.sink = sink;
        self.exports = 0;
        self.sink_errors = 0;
        self.state = SessionState::Running;
        info!("Session restarted: exporting to {}", self.sink.describe());
        Ok(())
    }

    /// Halt for good.
    pub fn stop(&mut self) {
        if self.state != SessionState::Stopped {
            info!("Session stopped after {} ticks", self.ticks);
        }
        self.state = SessionState::Stopped;
    }

    /// Apply the operator's answer to the end-of-session question.  Does
    /// nothing unless the session is awaiting that answer.
    pub fn resolve<C>(
        &mut self,
        restart: bool,
        control: &mut C,
        now: Instant,
    ) -> Result<SessionState, SessionError>
    where
        C: SessionControl<Sink = K>,
    {
        if self.state == SessionState::AwaitingRestartDecision {
            if restart {
                self.restart(control, now)?;
            } else {
                self.stop();
            }
        }
        Ok(self.state)
    }

    /// Ask `control` whether to restart and act on it.
    pub fn conclude<C>(&mut self, control: &mut C, now: Instant) -> Result<SessionState, SessionError>
    where
        C: SessionControl<Sink = K>,
    {
        if self.state != SessionState::AwaitingRestartDecision {
            return Ok(self.state);
        }
        let restart = control.notify_session_ended();
        self.resolve(restart, control, now)
    }
}

impl<S, K> TestSession<S, K> {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Time since the session (re)started.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    pub fn channels(&self) -> &[SensorChannel<S>; 2] {
        &self.channels
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Rows exported since the last (re)start.
    pub fn exports(&self) -> u64 {
        self.exports
    }

    pub fn sink_errors(&self) -> u64 {
        self.sink_errors
    }

    pub fn last_tick_duration(&self) -> Duration {
        self.last_tick
    }
}

fn open_output<C: SessionControl>(control: &mut C) -> Result<(String, C::Sink), SinkError> {
    let answer = control.request_file_name();
    let name = match answer.trim() {
        "" => default_file_name(Local::now()),
        name => name.to_owned(),
    };
    let sink = control.open_sink(&name)?;
    Ok((name, sink))
}
