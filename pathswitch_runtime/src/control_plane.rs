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

//! # Control Plane
//!
//! The control plane is the interface through which the flow tables of the switches are changed.
//! It is treated as a black box, offering to clear the table of a switch, to install a single
//! rule, and to dump the table. See [`OvsConnection`](crate::ovs_conn::OvsConnection) for the
//! binding to Open vSwitch, and [`SimulatedControlPlane`](crate::sim_conn::SimulatedControlPlane)
//! for an in-memory implementation.

use pathswitch::flows::{FlowRule, FlowTable};
use pathswitch::topology::ReportedPort;

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Operations on the flow tables of the switches. Switches are addressed by their name.
pub trait ControlPlane {
    /// Remove all rules from the table of the switch. Clearing an empty table succeeds.
    fn clear_all(&mut self, switch: &str) -> Result<(), ControlError>;

    /// Add a single rule to the table of the switch.
    fn install(&mut self, switch: &str, rule: &FlowRule) -> Result<(), ControlError>;

    /// Returns the textual dump of the table of the switch, in the format of `dump-flows`.
    fn dump(&mut self, switch: &str) -> Result<String, ControlError>;

    /// Returns the parsed table of the switch.
    fn dump_rules(&mut self, switch: &str) -> Result<FlowTable, ControlError> {
        let dump = self.dump(switch)?;
        FlowTable::from_dump(&dump)
            .map_err(|e| ControlError::Parse { switch: switch.to_string(), message: e.to_string() })
    }
}

impl<C: ControlPlane + ?Sized> ControlPlane for &mut C {
    fn clear_all(&mut self, switch: &str) -> Result<(), ControlError> {
        (**self).clear_all(switch)
    }

    fn install(&mut self, switch: &str, rule: &FlowRule) -> Result<(), ControlError> {
        (**self).install(switch, rule)
    }

    fn dump(&mut self, switch: &str) -> Result<String, ControlError> {
        (**self).dump(switch)
    }
}

/// Query for the actual ports of a switch.
pub trait PortQuery {
    /// Returns every port of the switch with its interface name, and the node on the other end of
    /// the link, as far as the control plane can tell. The local port is not included.
    fn reported_ports(&mut self, switch: &str) -> Result<Vec<ReportedPort>, ControlError>;
}

impl<C: PortQuery + ?Sized> PortQuery for &mut C {
    fn reported_ports(&mut self, switch: &str) -> Result<Vec<ReportedPort>, ControlError> {
        (**self).reported_ports(switch)
    }
}

/// Errors of the control plane
#[derive(Debug, Error)]
pub enum ControlError {
    /// The switch rejected the command
    #[error("Switch {switch} rejected the command: {message}")]
    Rejected {
        /// Name of the switch
        switch: String,
        /// Reason reported by the control plane
        message: String,
    },
    /// The command did not finish in time
    #[error("Command `{command}` on {switch} timed out after {after:?}")]
    Timeout {
        /// Name of the switch
        switch: String,
        /// The command that timed out
        command: String,
        /// Time after which the command was aborted
        after: Duration,
    },
    /// The switch is not known to the control plane
    #[error("Unknown switch: {0}")]
    UnknownSwitch(String),
    /// The output of the control plane could not be parsed
    #[error("Cannot parse the output for {switch}: {message}")]
    Parse {
        /// Name of the switch
        switch: String,
        /// Description of the problem
        message: String,
    },
    /// The control plane could not be reached at all
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
}
