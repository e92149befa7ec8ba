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

//! # Top-level Topology module
//!
//! This module represents the physical topology: switches, hosts, and the links between them,
//! including the local port that every link occupies on both of its endpoints.

use crate::topology::types::{Host, NodeRef, Switch, TopologyGraph};
use crate::topology::{MacAddr, NodeId, PortNo, ReportedPort, TopologyError};

use log::*;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

/// First port number assigned on a switch. OpenFlow port 0 is reserved.
const FIRST_SWITCH_PORT: u16 = 1;
/// First port number assigned on a host (`h1-eth0`).
const FIRST_HOST_PORT: u16 = 0;

/// # Topology
///
/// The struct contains all switches and hosts, and the links between them. Every link occupies
/// exactly one local port on each of its endpoints. The port numbers are stored per direction:
/// `ports[(a, b)]` is the port on node `a` that leads to node `b`.
///
/// Ports are allocated in the order in which links are added (starting at port 1 on switches and
/// port 0 on hosts), which mirrors how the emulator usually numbers them. However, this is just a
/// guess! Before compiling any flow rules for a real network, the port numbers should be
/// synchronized with the ports actually reported by each switch, see [`Topology::sync_ports`],
/// which matches every reported port to the neighbor on the other end of the link. Each link
/// endpoint also remembers its interface name (`s1-eth2`), for display.
///
/// Parallel links between the same pair of nodes are not supported, since a port would then no
/// longer be identified by the neighbor alone.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    graph: TopologyGraph,
    links: Vec<(NodeId, NodeId)>,
    switches: HashMap<NodeId, Switch>,
    hosts: HashMap<NodeId, Host>,
    names: HashMap<String, NodeId>,
    ports: HashMap<(NodeId, NodeId), PortNo>,
    ifaces: HashMap<(NodeId, NodeId), String>,
}

impl Topology {
    /// Generate an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new switch to the topology. The name must be the name which the control plane uses
    /// to address the switch (e.g., `s1`). If the name is already taken, an error is returned.
    pub fn add_switch<S: Into<String>>(&mut self, name: S) -> Result<NodeId, TopologyError> {
        let name = name.into();
        self.check_name(&name)?;
        let id = self.graph.add_node(());
        self.names.insert(name.clone(), id);
        self.switches.insert(id, Switch { id, name });
        Ok(id)
    }

    /// Add a new host to the topology, with its MAC and IP address.
    pub fn add_host<S: Into<String>>(
        &mut self,
        name: S,
        mac: MacAddr,
        ip: Ipv4Addr,
    ) -> Result<NodeId, TopologyError> {
        let name = name.into();
        self.check_name(&name)?;
        let id = self.graph.add_node(());
        self.names.insert(name.clone(), id);
        self.hosts.insert(id, Host { id, name, mac, ip });
        Ok(id)
    }

    /// Create a link between `a` and `b`, using the next free port on both nodes.
    pub fn add_link(&mut self, a: NodeId, b: NodeId) -> Result<(), TopologyError> {
        let port_a = self.next_free_port(a)?;
        let port_b = self.next_free_port(b)?;
        self.add_link_with_ports(a, port_a, b, port_b)
    }

    /// Create a link between `a` and `b`, with explicitly assigned ports on both sides. Use this
    /// when the provisioning system already told us which ports are used.
    pub fn add_link_with_ports(
        &mut self,
        a: NodeId,
        port_a: PortNo,
        b: NodeId,
        port_b: PortNo,
    ) -> Result<(), TopologyError> {
        self.get_node_name(a)?;
        self.get_node_name(b)?;
        if a == b {
            return Err(TopologyError::SelfLoop(a));
        }
        if self.ports.contains_key(&(a, b)) {
            return Err(TopologyError::AlreadyConnected(a, b));
        }
        if self.neighbor_on_port(a, port_a).is_some() {
            return Err(TopologyError::PortInUse(a, port_a));
        }
        if self.neighbor_on_port(b, port_b).is_some() {
            return Err(TopologyError::PortInUse(b, port_b));
        }

        let iface_a = format!("{}-eth{}", self.get_node_name(a)?, port_a);
        let iface_b = format!("{}-eth{}", self.get_node_name(b)?, port_b);

        self.graph.add_edge(a, b, ());
        self.links.push((a, b));
        self.ports.insert((a, b), port_a);
        self.ports.insert((b, a), port_b);
        debug!("Created link [{} <-> {}] on ports {} and {}", iface_a, iface_b, port_a, port_b);
        self.ifaces.insert((a, b), iface_a);
        self.ifaces.insert((b, a), iface_b);
        Ok(())
    }

    /// Returns the underlying graph
    pub fn get_graph(&self) -> &TopologyGraph {
        &self.graph
    }

    /// Returns the number of nodes (switches and hosts) in the topology
    pub fn num_nodes(&self) -> usize {
        self.switches.len() + self.hosts.len()
    }

    /// Returns a reference to the node (switch or host)
    pub fn get_node(&self, id: NodeId) -> NodeRef<'_> {
        match self.switches.get(&id) {
            Some(s) => NodeRef::Switch(s),
            None => match self.hosts.get(&id) {
                Some(h) => NodeRef::Host(h),
                None => NodeRef::None,
            },
        }
    }

    /// Returns the switch, or an error if the node is not a switch.
    pub fn get_switch(&self, id: NodeId) -> Result<&Switch, TopologyError> {
        match self.get_node(id) {
            NodeRef::Switch(s) => Ok(s),
            NodeRef::Host(_) => Err(TopologyError::NotASwitch(id)),
            NodeRef::None => Err(TopologyError::NodeNotFound(id)),
        }
    }

    /// Returns the host, or an error if the node is not a host.
    pub fn get_host(&self, id: NodeId) -> Result<&Host, TopologyError> {
        match self.get_node(id) {
            NodeRef::Host(h) => Ok(h),
            NodeRef::Switch(_) => Err(TopologyError::NotAHost(id)),
            NodeRef::None => Err(TopologyError::NodeNotFound(id)),
        }
    }

    /// Returns `true` if the node is a switch
    pub fn is_switch(&self, id: NodeId) -> bool {
        self.switches.contains_key(&id)
    }

    /// Returns `true` if the node is a host
    pub fn is_host(&self, id: NodeId) -> bool {
        self.hosts.contains_key(&id)
    }

    /// Returns the node id from the name
    pub fn get_node_id(&self, name: impl AsRef<str>) -> Result<NodeId, TopologyError> {
        self.names
            .get(name.as_ref())
            .copied()
            .ok_or_else(|| TopologyError::NodeNameNotFound(name.as_ref().to_string()))
    }

    /// Returns the name of the node
    pub fn get_node_name(&self, id: NodeId) -> Result<&str, TopologyError> {
        self.get_node(id).name().ok_or(TopologyError::NodeNotFound(id))
    }

    /// Returns all switches, sorted by their id. This is the order in which switches are
    /// configured.
    pub fn switches(&self) -> Vec<NodeId> {
        let mut switches: Vec<NodeId> = self.switches.keys().copied().collect();
        switches.sort();
        switches
    }

    /// Returns all hosts, sorted by their id.
    pub fn hosts(&self) -> Vec<NodeId> {
        let mut hosts: Vec<NodeId> = self.hosts.keys().copied().collect();
        hosts.sort();
        hosts
    }

    /// Returns an iterator over all links, in the order in which they were created.
    pub fn links(&self) -> std::slice::Iter<'_, (NodeId, NodeId)> {
        self.links.iter()
    }

    /// Returns all neighbors of a node, sorted by the local port towards them.
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        self.ports_of(node).into_iter().map(|(_, n)| n).collect()
    }

    /// Returns the port on `node` which leads to `neighbor`.
    pub fn port_towards(&self, node: NodeId, neighbor: NodeId) -> Result<PortNo, TopologyError> {
        self.ports.get(&(node, neighbor)).copied().ok_or_else(|| {
            if self.get_node(node).is_none() {
                TopologyError::NodeNotFound(node)
            } else if self.get_node(neighbor).is_none() {
                TopologyError::NodeNotFound(neighbor)
            } else {
                TopologyError::NodesNotConnected(node, neighbor)
            }
        })
    }

    /// Returns the neighbor that is connected to `port` on `node`, or `None` if the port is not
    /// in use.
    pub fn neighbor_on_port(&self, node: NodeId, port: PortNo) -> Option<NodeId> {
        self.graph
            .neighbors(node)
            .find(|n| self.ports.get(&(node, *n)) == Some(&port))
    }

    /// Returns all used ports of a node together with the neighbor behind them, sorted by port.
    pub fn ports_of(&self, node: NodeId) -> Vec<(PortNo, NodeId)> {
        let mut ports: Vec<(PortNo, NodeId)> = self
            .graph
            .neighbors(node)
            .filter_map(|n| self.ports.get(&(node, n)).map(|p| (*p, n)))
            .collect();
        ports.sort();
        ports
    }

    /// Returns the interface name of the link from `node` towards `neighbor`.
    pub fn interface_name(&self, node: NodeId, neighbor: NodeId) -> Result<&str, TopologyError> {
        self.ifaces
            .get(&(node, neighbor))
            .map(|s| s.as_str())
            .ok_or(TopologyError::NodesNotConnected(node, neighbor))
    }

    /// Overwrite the port numbers of a switch with the ports reported by the switch itself. Every
    /// reported port is matched to a neighbor by the name of its peer, never by its interface
    /// name, since the interface name only repeats the port number guessed when the link was
    /// created.
    ///
    /// Ports whose peer is not a node of the topology are ignored. Ports without a peer (e.g., the
    /// switch side of a host link, whose peer lives in another namespace) can only be matched if
    /// exactly one such port and exactly one unmatched neighbor remain. Every neighbor must end up
    /// on exactly one port, and no two neighbors on the same port. If the report is inconsistent,
    /// the topology is left unchanged.
    ///
    /// Returns the number of ports that actually changed. The stored interface names are replaced
    /// by the reported ones.
    pub fn sync_ports(
        &mut self,
        switch: NodeId,
        reported: &[ReportedPort],
    ) -> Result<usize, TopologyError> {
        let switch_name = self.get_switch(switch)?.name.clone();
        let neighbors: HashSet<NodeId> = self.graph.neighbors(switch).collect();

        // first, compute the new assignment without changing anything
        let mut update: HashMap<NodeId, &ReportedPort> = HashMap::new();
        let mut anonymous: Vec<&ReportedPort> = Vec::new();
        let mut seen: HashSet<PortNo> = HashSet::new();
        for r in reported {
            if !seen.insert(r.port) {
                return Err(TopologyError::DuplicatePort(switch_name, r.port));
            }
            let peer = match r.peer.as_ref() {
                Some(peer) => peer,
                None => {
                    anonymous.push(r);
                    continue;
                }
            };
            match self.names.get(peer) {
                Some(n) if neighbors.contains(n) => {
                    if update.insert(*n, r).is_some() {
                        return Err(TopologyError::DuplicatePeer(switch_name, peer.clone()));
                    }
                }
                Some(_) => return Err(TopologyError::UnexpectedPeer(switch_name, peer.clone())),
                None => {
                    debug!("{}: ignoring port {} towards unknown {}", switch_name, r.iface, peer)
                }
            }
        }

        let mut missing: Vec<NodeId> =
            neighbors.iter().copied().filter(|n| !update.contains_key(n)).collect();
        missing.sort();
        match (missing.as_slice(), anonymous.as_slice()) {
            ([], _) => {}
            ([neighbor], [r]) => {
                update.insert(*neighbor, *r);
            }
            (_, []) => {
                return Err(TopologyError::NeighborNotReported(
                    switch_name,
                    self.get_node_name(missing[0])?.to_string(),
                ))
            }
            (_, _) => {
                return Err(TopologyError::AmbiguousPorts(
                    switch_name,
                    anonymous.len(),
                    missing.len(),
                ))
            }
        }

        let mut update: Vec<(NodeId, &ReportedPort)> = update.into_iter().collect();
        update.sort_by_key(|(_, r)| r.port);
        let mut changed = 0;
        for (neighbor, r) in update {
            let old = self.ports.insert((switch, neighbor), r.port);
            self.ifaces.insert((switch, neighbor), r.iface.clone());
            if old != Some(r.port) {
                changed += 1;
                info!(
                    "Port of {} towards {} changed from {} to {}",
                    switch_name,
                    self.get_node_name(neighbor)?,
                    old.map(|p| p.to_string()).unwrap_or_else(|| "NONE".to_string()),
                    r.port
                );
            }
        }
        Ok(changed)
    }

    fn check_name(&self, name: &str) -> Result<(), TopologyError> {
        if self.names.contains_key(name) {
            Err(TopologyError::DuplicateName(name.to_string()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn next_free_port(&self, node: NodeId) -> Result<PortNo, TopologyError> {
        let first = match self.get_node(node) {
            NodeRef::Switch(_) => FIRST_SWITCH_PORT,
            NodeRef::Host(_) => FIRST_HOST_PORT,
            NodeRef::None => return Err(TopologyError::NodeNotFound(node)),
        };
        match self.ports_of(node).last() {
            Some((p, _)) => {
                p.0.checked_add(1).map(PortNo).ok_or(TopologyError::PortsExhausted(node))
            }
            None => Ok(PortNo(first)),
        }
    }
}
