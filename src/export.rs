//! Rate-limited export of both channels' latest values, and the sinks that
//! receive the rows.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDateTime};
use csv::WriterBuilder;
use log::info;
use thiserror::Error;

use crate::types::{ChannelReading, ExportRecord, EXPORT_COLUMNS};

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

// ── Scheduler ────────────────────────────────────────────────────────────────

/// Which ticks may produce a row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportGate {
    /// Only ticks where both channels produced a fresh sample.
    #[default]
    BothFresh,
    /// Any tick where at least one channel is fresh, once both channels have
    /// produced a sample.  The stale channel contributes its latest values.
    AnyFresh,
}

/// One channel's contribution to an export decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportInput {
    /// A sample arrived this tick.
    pub fresh: bool,
    /// Latest values, `None` before the first sample.
    pub reading: Option<ChannelReading>,
}

/// Emits at most one [`ExportRecord`] per `interval`.
///
/// ```
/// # use std::time::{Duration, Instant};
/// # use lips_rs::export::{ExportGate, ExportScheduler};
/// let t0 = Instant::now();
/// let s = ExportScheduler::new(Duration::from_millis(300), ExportGate::BothFresh, t0);
/// assert!(!s.is_due(t0 + Duration::from_millis(299)));
/// assert!(s.is_due(t0 + Duration::from_millis(300)));
/// ```
#[derive(Debug, Clone)]
pub struct ExportScheduler {
    interval: Duration,
    gate: ExportGate,
    last_export: Instant,
}

impl ExportScheduler {
    /// `start` counts as the last emission, so the first row comes one
    /// interval after it at the earliest.
    pub fn new(interval: Duration, gate: ExportGate, start: Instant) -> Self {
        Self {
            interval,
            gate,
            last_export: start,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.last_export = now;
    }

    /// Whether enough time has passed since the last emission.  A clock that
    /// went backwards is never due.
    pub fn is_due(&self, now: Instant) -> bool {
        now.checked_duration_since(self.last_export)
            .is_some_and(|elapsed| elapsed >= self.interval)
    }

    /// Produce a row if the gate and the rate limit both allow it.
    pub fn poll(
        &mut self,
        now: Instant,
        timestamp: NaiveDateTime,
        first: &ExportInput,
        second: &ExportInput,
    ) -> Option<ExportRecord> {
        let open = match self.gate {
            ExportGate::BothFresh => first.fresh && second.fresh,
            ExportGate::AnyFresh => first.fresh || second.fresh,
        };
        if !open || !self.is_due(now) {
            return None;
        }
        let (a, b) = (first.reading.as_ref()?, second.reading.as_ref()?);
        self.last_export = now;
        Some(ExportRecord::new(timestamp, a, b))
    }
}

// ── Sinks ────────────────────────────────────────────────────────────────────

/// Append-only destination for export rows.
pub trait ExportSink {
    fn append(&mut self, record: &ExportRecord) -> Result<(), SinkError>;

    /// Human-readable location for status displays.
    fn describe(&self) -> String {
        String::from("<memory>")
    }
}

/// Collects rows in memory.
impl ExportSink for Vec<ExportRecord> {
    fn append(&mut self, record: &ExportRecord) -> Result<(), SinkError> {
        self.push(record.clone());
        Ok(())
    }
}

impl<K: ExportSink + ?Sized> ExportSink for Box<K> {
    fn append(&mut self, record: &ExportRecord) -> Result<(), SinkError> {
        (**self).append(record)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// A CSV file with a header row, flushed after every appended row so a crash
/// loses at most the row being written.
pub struct CsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: u64,
}

impl CsvSink {
    /// Create (or truncate) `<dir>/<name>.csv` and write the header.
    /// `dir` is created if missing.
    pub fn create(dir: impl AsRef<Path>, name: &str) -> Result<Self, SinkError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(csv_file_name(name));

        let mut writer = WriterBuilder::new().has_headers(false).from_path(&path)?;
        writer.write_record(EXPORT_COLUMNS)?;
        writer.flush()?;

        info!("Exporting to {}", path.display());
        Ok(Self {
            writer,
            path,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written, excluding the header.
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl ExportSink for CsvSink {
    fn append(&mut self, record: &ExportRecord) -> Result<(), SinkError> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn csv_file_name(name: &str) -> String {
    let name = name.trim();
    if name.to_ascii_lowercase().ends_with(".csv") {
        name.to_owned()
    } else {
        format!("{name}.csv")
    }
}

/// Name used when the operator does not supply one.
///
/// ```
/// # use chrono::{Local, TimeZone};
/// let t = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
/// assert_eq!(lips_rs::export::default_file_name(t), "lips-20240309_140507");
/// ```
pub fn default_file_name(now: DateTime<Local>) -> String {
    now.format("lips-%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccelerationSample, QuaternionSample};

    fn input(fresh: bool, ax: f64) -> ExportInput {
        let acceleration = AccelerationSample { ax, ay: 0.0, az: 9.8 };
        ExportInput {
            fresh,
            reading: Some(ChannelReading {
                acceleration,
                oscillation: acceleration.magnitude(),
                frequency: 50.0,
                orientation: None,
            }),
        }
    }

    fn ts() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap()
    }

    #[test]
    fn never_emits_twice_within_the_interval() {
        let t0 = Instant::now();
        let mut s = ExportScheduler::new(Duration::from_millis(300), ExportGate::BothFresh, t0);
        let (a, b) = (input(true, 1.0), input(true, 2.0));

        let mut emitted = Vec::new();
        for ms in (0..=1000).step_by(10) {
            let now = t0 + Duration::from_millis(ms);
            if s.poll(now, ts(), &a, &b).is_some() {
                emitted.push(ms);
            }
        }
        assert_eq!(emitted, vec![300, 600, 900]);
    }

    #[test]
    fn both_fresh_gate_requires_both() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(1);
        let mut s = ExportScheduler::new(Duration::from_millis(300), ExportGate::BothFresh, t0);
        assert!(s.poll(later, ts(), &input(true, 1.0), &input(false, 2.0)).is_none());
        assert!(s.poll(later, ts(), &input(false, 1.0), &input(true, 2.0)).is_none());
        // a rejected poll does not consume the slot
        assert!(s.poll(later, ts(), &input(true, 1.0), &input(true, 2.0)).is_some());
    }

    #[test]
    fn any_fresh_gate_uses_the_stale_channel() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(1);
        let mut s = ExportScheduler::new(Duration::from_millis(300), ExportGate::AnyFresh, t0);

        let never = ExportInput::default();
        assert!(s.poll(later, ts(), &input(true, 1.0), &never).is_none());

        let rec = s
            .poll(later, ts(), &input(true, 1.0), &input(false, 2.0))
            .expect("row");
        assert_eq!(rec.ax1, 1.0);
        assert_eq!(rec.ax2, 2.0);
        assert!(s.poll(later, ts(), &input(false, 1.0), &input(false, 2.0)).is_none());
    }

    #[test]
    fn backwards_clock_is_not_due() {
        let t0 = Instant::now() + Duration::from_secs(5);
        let s = ExportScheduler::new(Duration::from_millis(300), ExportGate::BothFresh, t0);
        assert!(!s.is_due(t0 - Duration::from_secs(1)));
    }

    #[test]
    fn csv_sink_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::create(dir.path().join("runs"), "trial").unwrap();
        assert!(sink.path().ends_with("runs/trial.csv"));

        let mut a = input(true, 1.5).reading.unwrap();
        a.orientation = Some(QuaternionSample {
            q0: 0.5,
            q1: 0.0,
            q2: -0.25,
            q3: 1.0,
        });
        let b = input(true, -3.0).reading.unwrap();
        sink.append(&ExportRecord::new(ts(), &a, &b)).unwrap();
        assert_eq!(sink.rows(), 1);

        let text = fs::read_to_string(sink.path()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), EXPORT_COLUMNS.join(","));
        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row.len(), EXPORT_COLUMNS.len());
        assert_eq!(row[0], "2024-01-02 03:04:05");
        assert_eq!(row[1], "1.5");
        assert_eq!(row[6], "-3.0");
        assert_eq!(&row[11..15], &["0.5", "0.0", "-0.25", "1.0"]);
        assert!(row[15..].iter().all(|cell| cell.is_empty()));
        assert!(lines.next().is_none());
    }

    #[test]
    fn csv_extension_is_not_doubled() {
        assert_eq!(csv_file_name("run.csv"), "run.csv");
        assert_eq!(csv_file_name(" run "), "run.csv");
    }
}
