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

//! Utilities for interacting with Open vSwitch through `ovs-ofctl`, and with the kernel through
//! `ip` to find out which node sits behind a port.

use crate::control_plane::{ControlError, ControlPlane, PortQuery};
use pathswitch::flows::FlowRule;
use pathswitch::topology::{PortNo, ReportedPort};

use lazy_static::lazy_static;
use log::*;
use regex::Regex;

use std::collections::HashMap;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::{self, sleep, JoinHandle};
use std::time::{Duration, Instant};

/// Default time after which a single command is aborted
pub const CMD_TIMEOUT: Duration = Duration::from_secs(10);
const CMD_POLL: Duration = Duration::from_millis(10);

lazy_static! {
    static ref PORT_RE: Regex = Regex::new(r"^\s*(\d+)\(([^)]+)\):").unwrap();
    static ref LINK_RE: Regex = Regex::new(r"^\d+:\s+([^:@\s]+)(?:@([^:\s]+))?:").unwrap();
    static ref IFACE_RE: Regex = Regex::new(r"^(.+)-eth\d+$").unwrap();
}

/// # Connection to Open vSwitch
///
/// Every operation runs `ovs-ofctl` as a child process, and waits for it to finish. If the process
/// does not finish within the timeout, it is killed and the operation fails with
/// [`ControlError::Timeout`]. A non-zero exit status is reported as [`ControlError::Rejected`],
/// with the error message of `ovs-ofctl`.
///
/// The ports of a switch are taken from `ovs-ofctl show`. The node behind each port is found by
/// the veth peer of its interface, as listed by `ip -o link show` (`s1-eth2@s2-eth1`). A peer in a
/// different network namespace (`s1-eth1@if2`, typically a host) cannot be named.
///
/// All commands are synchronous and blocking. The wait is implemented as a busy loop with a short
/// sleep in between.
#[derive(Debug, Clone)]
pub struct OvsConnection {
    program: String,
    ip_program: String,
    timeout: Duration,
}

impl Default for OvsConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl OvsConnection {
    /// Create a new connection using `ovs-ofctl` from the `PATH`.
    pub fn new() -> Self {
        Self::with_program("ovs-ofctl")
    }

    /// Create a new connection using a different program, which must accept the same arguments as
    /// `ovs-ofctl`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into(), ip_program: "ip".to_string(), timeout: CMD_TIMEOUT }
    }

    /// Use a different program for listing the links, which must accept the same arguments as
    /// `ip`.
    pub fn ip_program(mut self, program: impl Into<String>) -> Self {
        self.ip_program = program.into();
        self
    }

    /// Set the time after which a single command is aborted
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `ovs-ofctl` with the arguments, and return its standard output.
    fn run(&self, switch: &str, args: &[&str]) -> Result<String, ControlError> {
        self.run_program(&self.program, switch, args)
    }

    fn run_program(
        &self,
        program: &str,
        switch: &str,
        args: &[&str],
    ) -> Result<String, ControlError> {
        let command = format!("{} {}", program, args.join(" "));
        debug!("{}", command);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // read both pipes in the background, such that the child never blocks on a full pipe
        let stdout = child.stdout.take().map(read_to_end);
        let stderr = child.stderr.take().map(read_to_end);

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if start.elapsed() > self.timeout {
                error!("`{}` did not finish within {:?}", command, self.timeout);
                if let Err(e) = child.kill() {
                    warn!("Cannot kill `{}`: {}", command, e);
                }
                child.wait()?;
                return Err(ControlError::Timeout {
                    switch: switch.to_string(),
                    command,
                    after: self.timeout,
                });
            }
            sleep(CMD_POLL);
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if status.success() {
            Ok(stdout)
        } else {
            let message = match stderr.trim() {
                "" => format!("`{}` exited with {}", command, status),
                msg => msg.to_string(),
            };
            Err(ControlError::Rejected { switch: switch.to_string(), message })
        }
    }
}

impl ControlPlane for OvsConnection {
    fn clear_all(&mut self, switch: &str) -> Result<(), ControlError> {
        self.run(switch, &["del-flows", switch]).map(|_| ())
    }

    fn install(&mut self, switch: &str, rule: &FlowRule) -> Result<(), ControlError> {
        let rule = rule.to_string();
        self.run(switch, &["add-flow", switch, rule.as_str()]).map(|_| ())
    }

    fn dump(&mut self, switch: &str) -> Result<String, ControlError> {
        self.run(switch, &["--no-names", "dump-flows", switch])
    }
}

impl PortQuery for OvsConnection {
    fn reported_ports(&mut self, switch: &str) -> Result<Vec<ReportedPort>, ControlError> {
        let output = self.run(switch, &["show", switch])?;
        let ports = self.parse_ports(switch, &output)?;
        let output = self.run_program(&self.ip_program, switch, &["-o", "link", "show"])?;
        let peers = parse_links(&output);

        let mut result: Vec<ReportedPort> = ports
            .into_iter()
            .map(|(iface, port)| {
                if !peers.contains_key(&iface) {
                    warn!("Interface {} of {} is not listed by `ip link`", iface, switch);
                }
                let peer = peers.get(&iface).cloned().flatten();
                ReportedPort { port, iface, peer }
            })
            .collect();
        result.sort_by_key(|r| r.port);
        debug!("Ports of {}: {:?}", switch, result);
        Ok(result)
    }
}

impl OvsConnection {
    /// Parse the port lines of `ovs-ofctl show` (` 2(s1-eth2): addr:...`). The local port is
    /// skipped.
    fn parse_ports(
        &self,
        switch: &str,
        output: &str,
    ) -> Result<HashMap<String, PortNo>, ControlError> {
        let mut ports = HashMap::new();
        for caps in output.lines().filter_map(|l| PORT_RE.captures(l)) {
            let port: u16 = caps[1].parse().map_err(|_| ControlError::Parse {
                switch: switch.to_string(),
                message: format!("invalid port number: {}", &caps[1]),
            })?;
            ports.insert(caps[2].to_string(), PortNo(port));
        }
        Ok(ports)
    }
}

/// Parse the output of `ip -o link show`. Returns the node name behind every interface, or `None`
/// if the peer cannot be named (no veth, or a peer in another namespace).
fn parse_links(output: &str) -> HashMap<String, Option<String>> {
    output
        .lines()
        .filter_map(|l| LINK_RE.captures(l))
        .map(|caps| {
            let peer = caps
                .get(2)
                .and_then(|p| IFACE_RE.captures(p.as_str()))
                .map(|p| p[1].to_string());
            (caps[1].to_string(), peer)
        })
        .collect()
}

fn read_to_end<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf) {
            warn!("Cannot read the output of the child process: {}", e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
