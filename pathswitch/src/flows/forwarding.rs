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

//! # Forwarding simulation
//!
//! This module contains the [`ForwardingState`], which combines the topology with the flow table
//! of every switch, and computes where a packet sent by a host ends up.

use crate::flows::{FlowAction, FlowError, FlowTable, PacketHeader, RuleSet};
use crate::topology::{EtherType, MacAddr, NodeId, NodeRef, PortNo, Topology};

use log::*;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Result of sending a single packet into the network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Hosts that received the packet (i.e., the packet arrived, and the destination address was
    /// either their own address or the broadcast address)
    pub reached_hosts: BTreeSet<NodeId>,
    /// Switches that processed the packet
    pub traversed: BTreeSet<NodeId>,
    /// Switches that dropped the packet (explicitly, or because no rule matched)
    pub dropped_at: BTreeSet<NodeId>,
    /// Set if a switch received the packet twice on the same port. Further copies are not
    /// followed.
    pub looped: bool,
}

impl Delivery {
    /// Returns `true` if the host received the packet
    pub fn reached(&self, host: NodeId) -> bool {
        self.reached_hosts.contains(&host)
    }
}

/// # Forwarding State
///
/// Flow tables of all switches, together with the topology. Switches without a table drop every
/// packet.
#[derive(Debug, Clone)]
pub struct ForwardingState<'a> {
    topo: &'a Topology,
    tables: HashMap<NodeId, FlowTable>,
}

impl<'a> ForwardingState<'a> {
    /// Create a forwarding state where every switch has an empty table.
    pub fn new(topo: &'a Topology) -> Self {
        Self { topo, tables: HashMap::new() }
    }

    /// Create the forwarding state as it would be after installing the rule set.
    pub fn from_rule_set(topo: &'a Topology, rules: &RuleSet) -> Self {
        let mut state = Self::new(topo);
        for (switch, switch_rules) in rules.iter() {
            let mut table = FlowTable::new();
            switch_rules.iter().for_each(|r| {
                table.install(*r);
            });
            state.tables.insert(*switch, table);
        }
        state
    }

    /// Replace the table of a switch
    pub fn set_table(&mut self, switch: NodeId, table: FlowTable) {
        self.tables.insert(switch, table);
    }

    /// Returns the table of a switch, if one is set.
    pub fn table(&self, switch: NodeId) -> Option<&FlowTable> {
        self.tables.get(&switch)
    }

    /// Send a unicast IPv4 packet from `src` to the host `dst`.
    pub fn unicast(&self, src: NodeId, dst: NodeId) -> Result<Delivery, FlowError> {
        let dst_addr = self.topo.get_host(dst)?.mac();
        self.send(src, EtherType::IPV4, dst_addr)
    }

    /// Send a packet from the host `src` into the network, and follow every copy of it through the
    /// flow tables.
    pub fn send(
        &self,
        src: NodeId,
        eth_type: EtherType,
        eth_dst: MacAddr,
    ) -> Result<Delivery, FlowError> {
        self.topo.get_host(src)?;

        let mut delivery = Delivery::default();
        let mut visited: HashSet<(NodeId, PortNo)> = HashSet::new();
        let mut queue: VecDeque<(NodeId, PortNo)> = VecDeque::new();

        for (_, neighbor) in self.topo.ports_of(src) {
            queue.push_back((neighbor, self.topo.port_towards(neighbor, src)?));
        }

        while let Some((node, in_port)) = queue.pop_front() {
            let switch = match self.topo.get_node(node) {
                NodeRef::Host(h) => {
                    if node != src && (eth_dst == h.mac() || eth_dst == MacAddr::BROADCAST) {
                        delivery.reached_hosts.insert(node);
                    }
                    continue;
                }
                NodeRef::Switch(s) => s,
                NodeRef::None => continue,
            };

            delivery.traversed.insert(node);
            if !visited.insert((node, in_port)) {
                trace!("{} received the packet twice on port {}", switch.name(), in_port);
                delivery.looped = true;
                continue;
            }

            let header = PacketHeader { in_port, eth_type, eth_dst };
            let action = self.tables.get(&node).and_then(|t| t.lookup(&header)).map(|r| r.action);

            let out_ports: Vec<PortNo> = match action {
                Some(FlowAction::Output(port)) if port != in_port => vec![port],
                Some(FlowAction::Flood) => self
                    .topo
                    .ports_of(node)
                    .into_iter()
                    .map(|(p, _)| p)
                    .filter(|p| *p != in_port)
                    .collect(),
                _ => {
                    delivery.dropped_at.insert(node);
                    continue;
                }
            };

            for port in out_ports {
                match self.topo.neighbor_on_port(node, port) {
                    Some(next) => queue.push_back((next, self.topo.port_towards(next, node)?)),
                    None => {
                        delivery.dropped_at.insert(node);
                    }
                }
            }
        }

        Ok(delivery)
    }
}
