use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tokio::time::MissedTickBehavior;

use lips_rs::cli::CliOptions;
use lips_rs::export::{CsvSink, SinkError};
use lips_rs::session::{SessionControl, SessionState, TestSession, TickOutcome};

/// Asks the operator on stdin.
struct StdinOperator {
    out_dir: PathBuf,
    /// Used instead of prompting for the first session.
    first_name: Option<String>,
}

impl StdinOperator {
    fn prompt(&self, question: &str) -> String {
        print!("{question}");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if let Err(e) = io::stdin().lock().read_line(&mut line) {
            warn!("Could not read answer: {e}");
        }
        line.trim().to_owned()
    }
}

impl SessionControl for StdinOperator {
    type Sink = CsvSink;

    fn request_file_name(&mut self) -> String {
        if let Some(name) = self.first_name.take() {
            return name;
        }
        self.prompt("Output file name (empty for a timestamped name): ")
    }

    fn open_sink(&mut self, name: &str) -> Result<CsvSink, SinkError> {
        CsvSink::create(&self.out_dir, name)
    }

    fn notify_session_ended(&mut self) -> bool {
        let answer = self.prompt("Test complete. Restart? [y/N] ");
        matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // Set RUST_LOG=debug to see decode noise and per-tick timing, e.g.:
    //   RUST_LOG=lips_rs=debug cargo run -- --simulate
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let opts = CliOptions::parse();
    let config = opts.session_config();
    let tick_interval = config.tick_interval;

    // ── Open sensors ──────────────────────────────────────────────────────────
    let [first, second] = opts.open_streams()?;

    let mut operator = StdinOperator {
        out_dir: opts.out_dir.clone(),
        first_name: opts.name.clone(),
    };
    let mut session = TestSession::start(first, second, config, &mut operator, Instant::now())
        .context("starting session")?;
    info!("Acquiring. Press Ctrl-C to quit.");

    // ── Tick loop ─────────────────────────────────────────────────────────────
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    'run: loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupted.");
                session.stop();
                break 'run;
            }
        }

        let outcome = session.tick(Instant::now());
        if let TickOutcome::Ran(report) = outcome {
            if report.exported {
                let [a, b] = session.channels();
                println!(
                    "[EXPORT] #{:<5} ch1 {:6.2} Hz osc {:6.2}   ch2 {:6.2} Hz osc {:6.2}",
                    session.exports(),
                    a.frequency(),
                    a.latest_acceleration().map_or(0.0, |s| s.magnitude()),
                    b.frequency(),
                    b.latest_acceleration().map_or(0.0, |s| s.magnitude()),
                );
            }
        }

        if outcome.session_ended() {
            // a failed restart leaves the session waiting, so ask again
            loop {
                match session.conclude(&mut operator, Instant::now()) {
                    Ok(SessionState::Stopped) => break 'run,
                    Ok(_) => {
                        interval.reset();
                        break;
                    }
                    Err(e) => error!("Restart failed: {e}"),
                }
            }
        }
    }

    for ch in session.channels() {
        info!("{}: {:?}", ch.name(), ch.diagnostics());
    }
    info!("Session finished after {} ticks.", session.ticks());
    Ok(())
}
