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

//! # Flow rule compiler
//!
//! Turns a [`Path`] into the forwarding state of the entire topology.

use crate::flows::{FlowError, FlowRule};
use crate::topology::{MacAddr, NodeId, Path, Topology};

use log::*;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// How the path-specific rules match packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompileMode {
    /// Match on the ingress port and the destination MAC address
    AddressQualified,
    /// Match on the ingress port only. This is only correct if no other traffic than the one
    /// between the two endpoints traverses the path.
    PortOnly,
}

impl Default for CompileMode {
    fn default() -> Self {
        Self::AddressQualified
    }
}

/// # Rule Set
///
/// Mapping from switch to its flow rules. The priority of each rule is explicit, hence the order
/// of the rules of a switch carries no meaning. Iterating over the rule set yields the switches in
/// ascending order of their id.
///
/// The rule set never contains two rules on the same switch with the same priority, that would
/// match the same packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: BTreeMap<NodeId, Vec<FlowRule>>,
}

impl RuleSet {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule to a switch. If the rule conflicts with an existing rule of this switch (see
    /// [`FlowRule::conflicts_with`]), an error is returned and the rule set is not changed.
    pub fn insert(&mut self, switch: NodeId, rule: FlowRule) -> Result<(), FlowError> {
        let rules = self.rules.entry(switch).or_insert_with(Vec::new);
        if rules.iter().any(|r| r.conflicts_with(&rule)) {
            return Err(FlowError::AmbiguousRule { switch, rule });
        }
        rules.push(rule);
        Ok(())
    }

    /// Returns the rules of a switch. If the switch has no rules, an empty slice is returned.
    pub fn rules_for(&self, switch: NodeId) -> &[FlowRule] {
        self.rules.get(&switch).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Returns all switches of the rule set, in ascending order
    pub fn switches(&self) -> Vec<NodeId> {
        self.rules.keys().copied().collect()
    }

    /// Iterate over all switches (in ascending order) with their rules
    pub fn iter(&self) -> btree_map::Iter<'_, NodeId, Vec<FlowRule>> {
        self.rules.iter()
    }

    /// Total number of rules on all switches
    pub fn num_rules(&self) -> usize {
        self.rules.values().map(|r| r.len()).sum()
    }

    /// Returns `true` if the rule set contains no rule at all
    pub fn is_empty(&self) -> bool {
        self.num_rules() == 0
    }
}

/// # Flow Compiler
///
/// The compiler generates the rules for all switches of the topology, such that exactly the given
/// path carries the traffic between the two endpoints:
///
/// - Every switch of the topology floods ARP, and drops everything else by default.
/// - Every switch on the path gets one pair of rules: The forward rule (ingress from the previous
///   hop, towards `dst_addr`) outputs to the next hop, and the reverse rule (ingress from the next
///   hop, towards `src_addr`) outputs to the previous hop.
///
/// Switches which are not on the path receive only the broadcast and the default rule. Hence, they
/// are isolated from the unicast traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowCompiler {
    mode: CompileMode,
}

impl FlowCompiler {
    /// Create a new compiler with the given mode.
    pub fn new(mode: CompileMode) -> Self {
        Self { mode }
    }

    /// Returns the mode of the compiler
    pub fn mode(&self) -> CompileMode {
        self.mode
    }

    /// Compile the rule set of the entire topology for the given path. The path must be
    /// consistent with the topology, i.e., every port of every hop must lead to the adjacent hop.
    pub fn compile(
        &self,
        topo: &Topology,
        path: &Path,
        src_addr: MacAddr,
        dst_addr: MacAddr,
    ) -> Result<RuleSet, FlowError> {
        validate(topo, path)?;

        let mut rules = RuleSet::new();
        for switch in topo.switches() {
            rules.insert(switch, FlowRule::broadcast())?;
            rules.insert(switch, FlowRule::drop_all())?;
        }

        let (fw_dst, rev_dst) = match self.mode {
            CompileMode::AddressQualified => (Some(dst_addr), Some(src_addr)),
            CompileMode::PortOnly => (None, None),
        };

        for hop in path.hops() {
            rules.insert(hop.switch, FlowRule::forward(hop.ingress, fw_dst, hop.egress))?;
            rules.insert(hop.switch, FlowRule::forward(hop.egress, rev_dst, hop.ingress))?;
        }

        debug!(
            "Compiled {} rules on {} switches for a path of length {}",
            rules.num_rules(),
            rules.switches().len(),
            path.len()
        );
        Ok(rules)
    }

    /// Compile the rule set for the path, using the MAC addresses of its two endpoints.
    pub fn compile_for_hosts(&self, topo: &Topology, path: &Path) -> Result<RuleSet, FlowError> {
        let src_addr = topo.get_host(path.src())?.mac();
        let dst_addr = topo.get_host(path.dst())?.mac();
        self.compile(topo, path, src_addr, dst_addr)
    }
}

/// Check that every port of the path leads to the adjacent hop.
fn validate(topo: &Topology, path: &Path) -> Result<(), FlowError> {
    if path.is_empty() {
        return Err(FlowError::InvalidPath("the path traverses no switch".to_string()));
    }
    let hops = path.hops();
    for (i, hop) in hops.iter().enumerate() {
        topo.get_switch(hop.switch)?;
        let prev = if i == 0 { path.src() } else { hops[i - 1].switch };
        let next = if i + 1 == hops.len() { path.dst() } else { hops[i + 1].switch };
        for (port, expected) in [(hop.ingress, prev), (hop.egress, next)].iter() {
            if topo.neighbor_on_port(hop.switch, *port) != Some(*expected) {
                return Err(FlowError::InvalidPath(format!(
                    "port {} of {} does not lead to {}",
                    port,
                    topo.get_node_name(hop.switch)?,
                    topo.get_node_name(*expected)?
                )));
            }
        }
    }
    Ok(())
}
