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

//! # Flow Rule Installer
//!
//! Applies the rules of a single switch: First, the table of the switch is cleared, and then every
//! rule is installed. There is no automatic retry. If the installation fails, the switch is left
//! with an incomplete table, and the caller must re-drive the full installation.

use crate::control_plane::{ControlError, ControlPlane};
use pathswitch::flows::FlowRule;

use log::*;
use std::thread::sleep;
use std::time::Duration;
use thiserror::Error;

/// Time to wait after the installation, before the new state is considered effective.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// The installation on a switch failed
#[derive(Debug, Error)]
#[error("Installation on {switch} failed while {}: {cause}", describe_step(.rule))]
pub struct InstallError {
    /// Name of the switch
    pub switch: String,
    /// The rule that could not be installed, or `None` if clearing the table failed
    pub rule: Option<FlowRule>,
    /// Number of rules installed successfully before the failure
    pub installed: usize,
    /// The error of the control plane
    #[source]
    pub cause: ControlError,
}

fn describe_step(rule: &Option<FlowRule>) -> String {
    match rule {
        Some(rule) => format!("adding `{}`", rule),
        None => "clearing the table".to_string(),
    }
}

/// Clear the table of the switch, and install all rules. The rules are installed in the order of
/// decreasing priority. Returns the number of installed rules.
pub fn install<C: ControlPlane + ?Sized>(
    control: &mut C,
    switch: &str,
    rules: &[FlowRule],
) -> Result<usize, InstallError> {
    control.clear_all(switch).map_err(|cause| InstallError {
        switch: switch.to_string(),
        rule: None,
        installed: 0,
        cause,
    })?;

    let mut sorted = rules.to_vec();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority));

    for (installed, rule) in sorted.iter().enumerate() {
        control.install(switch, rule).map_err(|cause| InstallError {
            switch: switch.to_string(),
            rule: Some(*rule),
            installed,
            cause,
        })?;
    }

    debug!("Installed {} rules on {}", sorted.len(), switch);
    Ok(sorted.len())
}

/// Wait until the installed rules are effective.
pub fn settle(delay: Duration) {
    if delay > Duration::from_secs(0) {
        debug!("Waiting {:?} for the rules to settle", delay);
        sleep(delay);
    }
}
