//! Command-line options shared by the `lips` and `tui` binaries.
//!
//! With no ports given, the first two ports the OS reports are used.

use std::f64::consts::FRAC_PI_2;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use crate::export::ExportGate;
use crate::protocol::DEFAULT_BAUD_RATE;
use crate::session::SessionConfig;
use crate::simulator::SimulatedSensor;
use crate::transport::{discover_ports, ByteStream, SerialConfig, SerialStream};

/// Acquire acceleration and orientation from two serial IMUs into CSV.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "lips", version, about = "Dual-channel serial IMU acquisition")]
pub struct CliOptions {
    /// Use two built-in simulated sensors instead of serial ports.
    #[arg(long)]
    pub simulate: bool,

    /// Serial line speed.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Session length in seconds [default: 300].
    #[arg(long, value_name = "SECS")]
    pub limit_secs: Option<u64>,

    /// Directory for exported CSV files.
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// File name for the first session (skips the prompt).
    #[arg(long)]
    pub name: Option<String>,

    /// Export when either channel has a fresh sample.
    #[arg(long)]
    pub any_fresh: bool,

    /// Reject orientation responses with an unexpected header.
    #[arg(long)]
    pub strict_header: bool,

    /// Serial port of sensor 1.
    #[arg(value_name = "PORT1")]
    pub first_port: Option<String>,

    /// Serial port of sensor 2.
    #[arg(value_name = "PORT2")]
    pub second_port: Option<String>,
}

impl CliOptions {
    /// Ports named on the command line, in order.
    pub fn ports(&self) -> Vec<String> {
        self.first_port.iter().chain(&self.second_port).cloned().collect()
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::default();
        if let Some(secs) = self.limit_secs {
            config.session_limit = Duration::from_secs(secs);
        }
        if self.any_fresh {
            config.export_gate = ExportGate::AnyFresh;
        }
        config.channel.strict_response_header = self.strict_header;
        config
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            baud_rate: self.baud,
            ..Default::default()
        }
    }

    /// Open both sensor links: simulators, the given ports, or the first
    /// two discovered ports.
    pub fn open_streams(&self) -> Result<[Box<dyn ByteStream>; 2]> {
        if self.simulate {
            info!("Using two simulated sensors");
            let streams: [Box<dyn ByteStream>; 2] = [
                Box::new(SimulatedSensor::realtime(0.0)),
                Box::new(SimulatedSensor::realtime(FRAC_PI_2)),
            ];
            return Ok(streams);
        }

        let given = self.ports();
        let ports = match given.len() {
            0 => {
                let found = discover_ports().context("listing serial ports")?;
                if found.len() < 2 {
                    bail!(
                        "two sensors are needed but {} serial port(s) were found: {found:?}",
                        found.len()
                    );
                }
                found.into_iter().take(2).collect()
            }
            1 => bail!("two ports are needed, only {:?} was given", given[0]),
            _ => given,
        };

        let serial = self.serial_config();
        let first = SerialStream::open(&ports[0], &serial)
            .with_context(|| format!("opening sensor 1 on {}", ports[0]))?;
        let second = SerialStream::open(&ports[1], &serial)
            .with_context(|| format!("opening sensor 2 on {}", ports[1]))?;
        let streams: [Box<dyn ByteStream>; 2] = [Box::new(first), Box::new(second)];
        Ok(streams)
    }
}
