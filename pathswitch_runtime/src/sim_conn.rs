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

//! # Simulated Control Plane
//!
//! In-memory flow tables, behaving like the tables of Open vSwitch. Faults can be injected to
//! check how failures of the control plane are handled.

use crate::control_plane::{ControlError, ControlPlane, PortQuery};
use pathswitch::flows::{FlowRule, FlowTable, ForwardingState};
use pathswitch::topology::{ReportedPort, Topology};

use log::*;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Operation performed on the simulated control plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOp {
    /// The table of the switch was cleared
    Clear(String),
    /// The rule was installed on the switch
    Install(String, FlowRule),
    /// The table of the switch was dumped
    Dump(String),
}

impl ControlOp {
    /// Name of the switch on which the operation was performed
    pub fn switch(&self) -> &str {
        match self {
            Self::Clear(s) | Self::Install(s, _) | Self::Dump(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Faults {
    reject_clear: HashSet<String>,
    installs_left: HashMap<String, usize>,
    timeout: HashSet<String>,
}

/// # Simulated Control Plane
///
/// Keeps one [`FlowTable`] per switch name. Only successful operations are recorded in the log,
/// and only they change the tables.
#[derive(Debug, Clone, Default)]
pub struct SimulatedControlPlane {
    tables: HashMap<String, FlowTable>,
    ports: HashMap<String, Vec<ReportedPort>>,
    log: Vec<ControlOp>,
    faults: Faults,
}

impl SimulatedControlPlane {
    /// Create a control plane without any switch
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a control plane with an empty table for every switch of the topology. The reported
    /// ports are the ones currently stored in the topology. Like on a real switch, the peer of a
    /// port is only visible if it is another switch.
    pub fn from_topology(topo: &Topology) -> Self {
        let mut control = Self::new();
        for switch in topo.switches() {
            let name = match topo.get_node_name(switch) {
                Ok(name) => name.to_string(),
                Err(_) => continue,
            };
            let ports = topo
                .ports_of(switch)
                .into_iter()
                .filter_map(|(port, neighbor)| {
                    let iface = topo.interface_name(switch, neighbor).ok()?.to_string();
                    let peer = if topo.is_switch(neighbor) {
                        Some(topo.get_node_name(neighbor).ok()?.to_string())
                    } else {
                        None
                    };
                    Some(ReportedPort { port, iface, peer })
                })
                .collect();
            control.add_switch(name.as_str());
            control.set_ports(name.as_str(), ports);
        }
        control
    }

    /// Add a switch with an empty table. If the switch exists already, nothing happens.
    pub fn add_switch(&mut self, switch: impl Into<String>) {
        self.tables.entry(switch.into()).or_insert_with(FlowTable::new);
    }

    /// Set the ports reported for the switch.
    pub fn set_ports(&mut self, switch: impl Into<String>, ports: Vec<ReportedPort>) {
        self.ports.insert(switch.into(), ports);
    }

    /// Returns the current table of the switch
    pub fn table(&self, switch: &str) -> Option<&FlowTable> {
        self.tables.get(switch)
    }

    /// Returns all successful operations, in the order in which they were performed
    pub fn log(&self) -> &[ControlOp] {
        &self.log
    }

    /// Forget all operations performed so far
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// All subsequent attempts to clear the table of the switch are rejected.
    pub fn fail_clear(&mut self, switch: impl Into<String>) {
        self.faults.reject_clear.insert(switch.into());
    }

    /// Only `n` more rules can be installed on the switch, all subsequent rules are rejected.
    pub fn fail_install_after(&mut self, switch: impl Into<String>, n: usize) {
        self.faults.installs_left.insert(switch.into(), n);
    }

    /// All subsequent operations on the switch time out.
    pub fn fail_timeout(&mut self, switch: impl Into<String>) {
        self.faults.timeout.insert(switch.into());
    }

    /// Remove all injected faults
    pub fn clear_faults(&mut self) {
        self.faults = Faults::default();
    }

    /// Returns the forwarding state, as it results from the current tables. Switches of the
    /// topology that are unknown to the control plane have no table, and drop everything.
    pub fn forwarding_state<'a>(&self, topo: &'a Topology) -> ForwardingState<'a> {
        let mut state = ForwardingState::new(topo);
        for switch in topo.switches() {
            if let Some(table) = topo.get_node_name(switch).ok().and_then(|n| self.tables.get(n)) {
                state.set_table(switch, table.clone());
            }
        }
        state
    }

    fn check(&self, switch: &str, command: &str) -> Result<(), ControlError> {
        if !self.tables.contains_key(switch) {
            return Err(ControlError::UnknownSwitch(switch.to_string()));
        }
        if self.faults.timeout.contains(switch) {
            return Err(ControlError::Timeout {
                switch: switch.to_string(),
                command: command.to_string(),
                after: Duration::from_secs(0),
            });
        }
        Ok(())
    }

    fn table_mut(&mut self, switch: &str) -> Result<&mut FlowTable, ControlError> {
        self.tables.get_mut(switch).ok_or_else(|| ControlError::UnknownSwitch(switch.to_string()))
    }
}

impl ControlPlane for SimulatedControlPlane {
    fn clear_all(&mut self, switch: &str) -> Result<(), ControlError> {
        self.check(switch, "del-flows")?;
        if self.faults.reject_clear.contains(switch) {
            return Err(ControlError::Rejected {
                switch: switch.to_string(),
                message: "injected fault".to_string(),
            });
        }
        self.table_mut(switch)?.clear();
        self.log.push(ControlOp::Clear(switch.to_string()));
        trace!("{}: cleared", switch);
        Ok(())
    }

    fn install(&mut self, switch: &str, rule: &FlowRule) -> Result<(), ControlError> {
        self.check(switch, "add-flow")?;
        if let Some(left) = self.faults.installs_left.get_mut(switch) {
            if *left == 0 {
                return Err(ControlError::Rejected {
                    switch: switch.to_string(),
                    message: format!("injected fault while adding {}", rule),
                });
            }
            *left -= 1;
        }
        self.table_mut(switch)?.install(*rule);
        self.log.push(ControlOp::Install(switch.to_string(), *rule));
        trace!("{}: installed {}", switch, rule);
        Ok(())
    }

    fn dump(&mut self, switch: &str) -> Result<String, ControlError> {
        self.check(switch, "dump-flows")?;
        let table = self.table_mut(switch)?;
        let mut result = String::from("NXST_FLOW reply (xid=0x4):\n");
        for rule in table.sorted_rules() {
            result.push_str(&format!(
                " cookie=0x0, duration=0.000s, table=0, n_packets=0, n_bytes=0, {}\n",
                rule
            ));
        }
        self.log.push(ControlOp::Dump(switch.to_string()));
        Ok(result)
    }
}

impl PortQuery for SimulatedControlPlane {
    fn reported_ports(&mut self, switch: &str) -> Result<Vec<ReportedPort>, ControlError> {
        self.check(switch, "show")?;
        self.ports.get(switch).cloned().ok_or_else(|| ControlError::UnknownSwitch(switch.to_string()))
    }
}
