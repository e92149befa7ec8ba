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

//! # Helper (printer) functions
//! Module containing helper functions to get formatted strings of paths and rule sets, with the
//! names of all nodes inserted.

use crate::flows::{Delivery, RuleSet};
use crate::topology::{NodeId, Path, PathId, Topology, TopologyError};

/// Returns the formatted string of a path, in the form `h1 -> s1[1->2] -> s2[1->2] -> h2`. The
/// numbers in brackets are the ingress and egress port of each switch.
pub fn path(topo: &Topology, path: &Path) -> Result<String, TopologyError> {
    let mut result = String::from(topo.get_node_name(path.src())?);
    for hop in path.hops() {
        result.push_str(&format!(
            " -> {}[{}->{}]",
            topo.get_node_name(hop.switch)?,
            hop.ingress,
            hop.egress
        ));
    }
    result.push_str(" -> ");
    result.push_str(topo.get_node_name(path.dst())?);
    Ok(result)
}

/// Returns the formatted string of a path, prefixed with its id: `Path 1: h1 -> s1[1->2] -> h2`
pub fn path_with_id(topo: &Topology, id: PathId, p: &Path) -> Result<String, TopologyError> {
    Ok(format!("Path {}: {}", id, path(topo, p)?))
}

/// Get a vector of strings, one line per rule, grouped by switch. The switches appear in the order
/// in which they are configured, and the rules of each switch are sorted by decreasing priority.
pub fn rule_set(topo: &Topology, rules: &RuleSet) -> Result<Vec<String>, TopologyError> {
    let mut result = Vec::new();
    for (switch, switch_rules) in rules.iter() {
        result.push(format!("{}:", topo.get_node_name(*switch)?));
        let mut sorted = switch_rules.to_vec();
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
        result.extend(sorted.iter().map(|r| format!("    {}", r)));
    }
    Ok(result)
}

/// Print the rule set to stdout
pub fn print_rule_set(topo: &Topology, rules: &RuleSet) -> Result<(), TopologyError> {
    for line in rule_set(topo, rules)? {
        println!("{}", line);
    }
    Ok(())
}

/// Returns a formatted summary of a simulated delivery.
pub fn delivery(topo: &Topology, delivery: &Delivery) -> Result<String, TopologyError> {
    Ok(format!(
        "reached: [{}], traversed: [{}], dropped at: [{}]{}",
        names(topo, &delivery.reached_hosts)?,
        names(topo, &delivery.traversed)?,
        names(topo, &delivery.dropped_at)?,
        if delivery.looped { ", LOOP" } else { "" }
    ))
}

fn names<'a, I>(topo: &Topology, ids: I) -> Result<String, TopologyError>
where
    I: IntoIterator<Item = &'a NodeId>,
{
    Ok(ids.into_iter().map(|id| topo.get_node_name(*id)).collect::<Result<Vec<_>, _>>()?.join(", "))
}
