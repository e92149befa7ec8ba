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

//! # Path Controller
//!
//! The controller owns the topology, the enumerated paths between the two endpoints, and the
//! control plane. Activating a path reinstalls the rules of every switch in the topology, such
//! that the previous state is completely replaced.

use crate::control_plane::{ControlPlane, PortQuery};
use crate::installer::{self, DEFAULT_SETTLE_DELAY};
use crate::Error;
use pathswitch::flows::{CompileMode, FlowCompiler, RuleSet};
use pathswitch::printer;
use pathswitch::topology::{enumerate_paths, NodeId, Path, PathId, Topology, TopologyError};

use log::*;
use std::time::Duration;

/// Configuration of the controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// How the path-specific rules match packets
    pub compile_mode: CompileMode,
    /// Time to wait after all switches are configured
    pub settle_delay: Duration,
    /// If set, the rules remain on the switches when the controller is dropped.
    pub keep_rules: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            compile_mode: CompileMode::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            keep_rules: false,
        }
    }
}

/// The currently active path. Every successful activation increments the generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivePathState {
    path: Option<PathId>,
    generation: u64,
}

impl ActivePathState {
    /// The active path, or `None` if no path is active.
    pub fn path(&self) -> Option<PathId> {
        self.path
    }

    /// Number of successful activations so far
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// # Path Controller
///
/// Selects one of the paths between the source and the destination host, and configures all
/// switches accordingly. At most one path is active at any time.
///
/// The controller is not reentrant. Concurrent activations must be serialized by the caller,
/// e.g., by wrapping the controller in a `Mutex`.
///
/// When the controller is dropped, the tables of all switches are cleared, unless
/// [`ControllerConfig::keep_rules`] is set.
#[derive(Debug)]
pub struct PathController<C: ControlPlane> {
    topo: Topology,
    src: NodeId,
    dst: NodeId,
    paths: Vec<Path>,
    compiler: FlowCompiler,
    control: C,
    config: ControllerConfig,
    state: ActivePathState,
    torn_down: bool,
}

impl<C: ControlPlane> PathController<C> {
    /// Create a new controller. All paths between `src` and `dst` are enumerated. No switch is
    /// touched yet.
    pub fn new(
        topo: Topology,
        src: NodeId,
        dst: NodeId,
        control: C,
        config: ControllerConfig,
    ) -> Result<Self, Error> {
        let paths = enumerate_paths(&topo, src, dst)?;
        if paths.is_empty() {
            return Err(Error::NoPath {
                src: topo.get_node_name(src)?.to_string(),
                dst: topo.get_node_name(dst)?.to_string(),
            });
        }
        for (i, path) in paths.iter().enumerate() {
            info!("{}", printer::path_with_id(&topo, PathId(i + 1), path)?);
        }
        let compiler = FlowCompiler::new(config.compile_mode);
        Ok(Self {
            topo,
            src,
            dst,
            paths,
            compiler,
            control,
            config,
            state: ActivePathState::default(),
            torn_down: false,
        })
    }

    /// Returns all paths, ordered by their id
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    /// Returns the ids of all paths
    pub fn path_ids(&self) -> Vec<PathId> {
        (1..=self.paths.len()).map(PathId).collect()
    }

    /// Returns the path with the given id
    pub fn path(&self, id: PathId) -> Result<&Path, Error> {
        id.index()
            .and_then(|i| self.paths.get(i))
            .ok_or_else(|| TopologyError::PathNotFound(id).into())
    }

    /// Returns the topology
    pub fn topology(&self) -> &Topology {
        &self.topo
    }

    /// Returns the source and the destination host
    pub fn endpoints(&self) -> (NodeId, NodeId) {
        (self.src, self.dst)
    }

    /// Returns the control plane
    pub fn control(&self) -> &C {
        &self.control
    }

    /// Returns a mutable reference to the control plane
    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    /// Returns the configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Returns the active path, or `None` if no path is active.
    pub fn active_path(&self) -> Option<PathId> {
        self.state.path
    }

    /// Returns the state of the active path
    pub fn state(&self) -> ActivePathState {
        self.state
    }

    /// Compile the rule set for the path, without installing it.
    pub fn rule_set(&self, id: PathId) -> Result<RuleSet, Error> {
        let path = self.path(id)?;
        Ok(self.compiler.compile_for_hosts(&self.topo, path)?)
    }

    /// Activate the path: Compile the rule set, reinstall the rules of every switch (in ascending
    /// order of their id), and wait for the settle delay. Afterwards, the path is active.
    ///
    /// If the installation fails on any switch, the activation is aborted, and no path is active
    /// anymore. The switches configured until then are not rolled back. Activating again re-drives
    /// the full installation.
    ///
    /// An unknown path id fails before any switch is touched.
    pub fn activate_path(&mut self, id: PathId) -> Result<PathId, Error> {
        let rules = self.rule_set(id)?;
        info!("Activating {}", printer::path_with_id(&self.topo, id, self.path(id)?)?);

        self.state.path = None;
        self.torn_down = false;

        for switch in self.topo.switches() {
            let name = self.topo.get_node_name(switch)?;
            if let Err(e) = installer::install(&mut self.control, name, rules.rules_for(switch)) {
                error!("Activation of path {} aborted: {}", id, e);
                return Err(e.into());
            }
        }

        installer::settle(self.config.settle_delay);

        self.state = ActivePathState { path: Some(id), generation: self.state.generation + 1 };
        info!("Path {} is active", id);
        Ok(id)
    }

    /// Dump the tables of all switches, for diagnostics.
    pub fn dump_all(&mut self) -> Result<Vec<(String, String)>, Error> {
        let mut result = Vec::new();
        for switch in self.topo.switches() {
            let name = self.topo.get_node_name(switch)?;
            let dump = self.control.dump(name)?;
            result.push((name.to_string(), dump));
        }
        Ok(result)
    }

    /// Compare the tables of all switches with the rules of the active path. Returns the names
    /// of all switches whose table differs. If no path is active, every table is expected to be
    /// empty.
    pub fn check_installed(&mut self) -> Result<Vec<String>, Error> {
        let expected = match self.state.path {
            Some(id) => self.rule_set(id)?,
            None => RuleSet::new(),
        };
        let mut differing = Vec::new();
        for switch in self.topo.switches() {
            let name = self.topo.get_node_name(switch)?;
            let mut want = expected.rules_for(switch).to_vec();
            want.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.cmp(b)));
            if self.control.dump_rules(name)?.sorted_rules() != want {
                warn!("Table of {} differs from the expected rules", name);
                differing.push(name.to_string());
            }
        }
        Ok(differing)
    }

    /// Clear the tables of all switches. Failures are logged, but not returned. Afterwards, no
    /// path is active.
    pub fn teardown(&mut self) {
        info!("Clearing the tables of all switches");
        for switch in self.topo.switches() {
            let name = match self.topo.get_node_name(switch) {
                Ok(name) => name,
                Err(_) => continue,
            };
            if let Err(e) = self.control.clear_all(name) {
                warn!("Cannot clear the table of {}: {}", name, e);
            }
        }
        self.state.path = None;
        self.torn_down = true;
    }
}

impl<C: ControlPlane + PortQuery> PathController<C> {
    /// Update the ports of all switches with the ports reported by the control plane, and
    /// enumerate the paths again. Returns the number of ports that changed.
    ///
    /// All switches are queried before anything is applied. If any query fails, or any report is
    /// inconsistent, the controller is left unchanged. If any port changed while a path is active,
    /// the installed rules are stale, and the path is no longer considered active.
    pub fn sync_ports(&mut self) -> Result<usize, Error> {
        let mut reports = Vec::new();
        for switch in self.topo.switches() {
            let name = self.topo.get_node_name(switch)?;
            reports.push((switch, self.control.reported_ports(name)?));
        }

        let mut topo = self.topo.clone();
        let mut changed = 0;
        for (switch, ports) in reports.iter() {
            changed += topo.sync_ports(*switch, ports)?;
        }

        if changed > 0 {
            info!("{} ports changed, enumerating paths again", changed);
            self.paths = enumerate_paths(&topo, self.src, self.dst)?;
            if let Some(id) = self.state.path.take() {
                warn!("Path {} is no longer active, since its ports have changed", id);
            }
        }
        self.topo = topo;
        Ok(changed)
    }
}

impl<C: ControlPlane> Drop for PathController<C> {
    fn drop(&mut self) {
        if !self.config.keep_rules && !self.torn_down {
            self.teardown();
        }
    }
}
