// Pathswitch: Dual-Path Flow Control and Transfer Verification
// Copyright (C) 2021  The Pathswitch Contributors
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Runtime System
//!
//! This crate drives the actual switches. The [`PathController`](controller::PathController)
//! installs the rules computed by `pathswitch` through a
//! [`ControlPlane`](control_plane::ControlPlane), either on Open vSwitch
//! ([`OvsConnection`](ovs_conn::OvsConnection)), or on simulated tables
//! ([`SimulatedControlPlane`](sim_conn::SimulatedControlPlane)). For checking that every path
//! actually carries traffic, check the function [`probe_all_paths`].

#![deny(missing_docs, missing_debug_implementations)]

pub mod control_plane;
pub mod controller;
pub mod installer;
pub mod ovs_conn;
pub mod sim_conn;
mod test;

use control_plane::{ControlError, ControlPlane};
use controller::PathController;
use installer::InstallError;
use pathswitch::flows::FlowError;
use pathswitch::topology::{PathId, TopologyError};
use pathswitch_transfer::server::DEFAULT_PORT;
use pathswitch_transfer::{send_file, sink_path, verify, ClientConfig, ServerConfig, Verdict};

use log::*;
use serde::Serialize;
use std::fs::{self, File};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Main error type of the runtime
#[derive(Debug, Error)]
pub enum Error {
    /// Error propagated from the topology
    #[error("Topology Error: {0}")]
    Topology(#[from] TopologyError),
    /// Error propagated from the flow rules
    #[error("Flow Error: {0}")]
    Flow(#[from] FlowError),
    /// The installation on a switch failed
    #[error("Install Error: {0}")]
    Install(#[from] InstallError),
    /// The control plane failed
    #[error("Control Plane Error: {0}")]
    Control(#[from] ControlError),
    /// There exists no path between the two hosts
    #[error("No path exists between {src} and {dst}")]
    NoPath {
        /// Name of the source host
        src: String,
        /// Name of the destination host
        dst: String,
    },
    /// The transfer failed
    #[error("Transfer Error: {0}")]
    Transfer(#[from] pathswitch_transfer::Error),
    /// IO Error
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    /// The report cannot be serialized
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Interval in which the sink is checked while waiting for the server
const SINK_POLL: Duration = Duration::from_millis(50);

/// Settings of the probe
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Address of the transfer server
    pub server: SocketAddr,
    /// File to send
    pub source: PathBuf,
    /// Prefix of the sink files written by the server. The server must be able to write to it,
    /// and the probe must be able to read it.
    pub sink_prefix: PathBuf,
    /// Sequence number that the server assigns to the next connection
    pub first_sequence: u64,
    /// Configuration of the client
    pub transfer: ClientConfig,
    /// Maximum time to wait for the server to write the entire sink
    pub completion_wait: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            server: SocketAddr::from((Ipv4Addr::new(10, 0, 0, 2), DEFAULT_PORT)),
            source: PathBuf::from("/tmp/test_file.txt"),
            sink_prefix: ServerConfig::default().sink_prefix,
            first_sequence: 1,
            transfer: ClientConfig::default(),
            completion_wait: Duration::from_secs(5),
        }
    }
}

/// Outcome of probing a single path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProbeOutcome {
    /// The transfer finished, and the sink was compared with the source
    Verified(Verdict),
    /// The path could not be activated
    ActivationFailed(String),
    /// The transfer failed
    TransferFailed(String),
}

/// Report of probing a single path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    /// The probed path
    pub path: PathId,
    /// Names of the switches on the path
    pub switches: Vec<String>,
    /// Sink into which the server should have written the data
    pub sink: Option<PathBuf>,
    /// Number of bytes sent by the client
    pub bytes_sent: u64,
    /// Outcome
    pub outcome: ProbeOutcome,
}

impl ProbeReport {
    /// Returns `true` if the data arrived unmodified
    pub fn is_success(&self) -> bool {
        matches!(&self.outcome, ProbeOutcome::Verified(v) if v.is_identical())
    }
}

/// # Probe all paths
///
/// For every path between the two endpoints of the controller:
///
/// 1. Activate the path
/// 2. Send the source file to the transfer server
/// 3. Wait until the server has written the sink, and compare it with the source.
///
/// A failure on one path does not prevent the other paths from being probed. The server must be
/// fresh, i.e., the next connection it accepts gets the sequence number
/// [`ProbeSettings::first_sequence`]. Connections that could not be established do not consume a
/// sequence number.
pub fn probe_all_paths<C: ControlPlane>(
    ctrl: &mut PathController<C>,
    settings: &ProbeSettings,
) -> Result<Vec<ProbeReport>, Error> {
    let mut sequence = settings.first_sequence;
    let mut reports = Vec::new();

    for id in ctrl.path_ids() {
        let switches = ctrl
            .path(id)?
            .switches()
            .into_iter()
            .map(|s| ctrl.topology().get_node_name(s).map(String::from))
            .collect::<Result<Vec<_>, _>>()?;

        if let Err(e) = ctrl.activate_path(id) {
            reports.push(ProbeReport {
                path: id,
                switches,
                sink: None,
                bytes_sent: 0,
                outcome: ProbeOutcome::ActivationFailed(e.to_string()),
            });
            continue;
        }

        let report = match send_file(settings.server, &settings.source, &settings.transfer) {
            Ok(client_report) => {
                let sink = sink_path(&settings.sink_prefix, sequence);
                sequence += 1;
                wait_for_sink(&sink, client_report.bytes_sent, settings.completion_wait);
                let verdict = verify(&settings.source, &sink)?;
                info!("Path {}: {}", id, verdict);
                ProbeReport {
                    path: id,
                    switches,
                    sink: Some(sink),
                    bytes_sent: client_report.bytes_sent,
                    outcome: ProbeOutcome::Verified(verdict),
                }
            }
            Err(e) => {
                error!("Path {}: {}", id, e);
                let (sink, bytes_sent) = match &e {
                    // the server has accepted the connection
                    pathswitch_transfer::Error::Transfer { bytes, .. } => {
                        sequence += 1;
                        (Some(sink_path(&settings.sink_prefix, sequence - 1)), *bytes)
                    }
                    _ => (None, 0),
                };
                ProbeReport {
                    path: id,
                    switches,
                    sink,
                    bytes_sent,
                    outcome: ProbeOutcome::TransferFailed(e.to_string()),
                }
            }
        };
        reports.push(report);
    }

    Ok(reports)
}

/// Write the reports as JSON into the file.
pub fn write_report(path: &Path, reports: &[ProbeReport]) -> Result<(), Error> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, reports)?;
    info!("Report written to {}", path.display());
    Ok(())
}

/// Wait until the sink has the expected size, or the timeout has passed.
fn wait_for_sink(sink: &Path, expected: u64, timeout: Duration) {
    let start = Instant::now();
    loop {
        let size = fs::metadata(sink).map(|m| m.len()).ok();
        if size == Some(expected) {
            return;
        }
        if start.elapsed() >= timeout {
            warn!(
                "Sink {} has {} bytes after {:?}, expected {}",
                sink.display(),
                size.map(|s| s.to_string()).unwrap_or_else(|| "NONE".to_string()),
                timeout,
                expected
            );
            return;
        }
        sleep(SINK_POLL);
    }
}
