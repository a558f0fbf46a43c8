use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

/// One decoded acceleration frame, in m/s² (±16 g full scale).
///
/// Produced by [`crate::parse::scan_acceleration`]; never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerationSample {
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
}

impl AccelerationSample {
    /// Euclidean norm of the three axes, i.e. the oscillation magnitude.
    pub fn magnitude(&self) -> f64 {
        (self.ax * self.ax + self.ay * self.ay + self.az * self.az).sqrt()
    }
}

/// An orientation quaternion read from the sensor's register.
///
/// Components are nominally in `[-1, 1]` but are passed through unclamped;
/// a sensor that reports slightly out-of-range values keeps them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuaternionSample {
    pub q0: f64,
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
}

/// An oscillation magnitude together with the sample that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillation {
    pub sample: AccelerationSample,
    pub magnitude: f64,
}

impl From<AccelerationSample> for Oscillation {
    fn from(sample: AccelerationSample) -> Self {
        Self {
            magnitude: sample.magnitude(),
            sample,
        }
    }
}

/// The latest values of one channel, as they go into an export row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReading {
    pub acceleration: AccelerationSample,
    pub oscillation: f64,
    /// Hz; `0.0` until two samples have arrived.
    pub frequency: f64,
    /// `None` when the orientation read failed this tick.
    pub orientation: Option<QuaternionSample>,
}

/// One flat export row covering both channels.
///
/// Field order is the column order of the persisted table; serde renames
/// give the header names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub ax1: f64,
    pub ay1: f64,
    pub az1: f64,
    pub oscillation1: f64,
    pub frequency1: f64,
    pub ax2: f64,
    pub ay2: f64,
    pub az2: f64,
    pub oscillation2: f64,
    pub frequency2: f64,
    pub q0_1: Option<f64>,
    pub q1_1: Option<f64>,
    pub q2_1: Option<f64>,
    pub q3_1: Option<f64>,
    pub q0_2: Option<f64>,
    pub q1_2: Option<f64>,
    pub q2_2: Option<f64>,
    pub q3_2: Option<f64>,
}

/// Column names in row order.
pub const EXPORT_COLUMNS: [&str; 19] = [
    "timestamp",
    "ax1",
    "ay1",
    "az1",
    "oscillation1",
    "frequency1",
    "ax2",
    "ay2",
    "az2",
    "oscillation2",
    "frequency2",
    "q0_1",
    "q1_1",
    "q2_1",
    "q3_1",
    "q0_2",
    "q1_2",
    "q2_2",
    "q3_2",
];

/// Timestamp format of the `timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl ExportRecord {
    /// Flatten two channel readings into one row.
    pub fn new(timestamp: NaiveDateTime, first: &ChannelReading, second: &ChannelReading) -> Self {
        let q = |r: &ChannelReading| match r.orientation {
            Some(q) => [Some(q.q0), Some(q.q1), Some(q.q2), Some(q.q3)],
            None => [None; 4],
        };
        let [q0_1, q1_1, q2_1, q3_1] = q(first);
        let [q0_2, q1_2, q2_2, q3_2] = q(second);
        Self {
            timestamp,
            ax1: first.acceleration.ax,
            ay1: first.acceleration.ay,
            az1: first.acceleration.az,
            oscillation1: first.oscillation,
            frequency1: first.frequency,
            ax2: second.acceleration.ax,
            ay2: second.acceleration.ay,
            az2: second.acceleration.az,
            oscillation2: second.oscillation,
            frequency2: second.frequency,
            q0_1,
            q1_1,
            q2_1,
            q3_1,
            q0_2,
            q1_2,
            q2_2,
            q3_2,
        }
    }
}

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&ts.format(TIMESTAMP_FORMAT))
}
