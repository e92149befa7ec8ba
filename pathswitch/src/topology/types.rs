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

//! Module containing all type definitions

use crate::topology::PathId;
use petgraph::prelude::*;
use petgraph::stable_graph::StableGraph;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

type IndexType = u32;
/// Node Identification (and index into the graph). Both switches and hosts are nodes.
pub type NodeId = NodeIndex<IndexType>;
/// Physical topology graph. Edges carry no weight, all port information is stored separately.
pub type TopologyGraph = StableGraph<(), (), Undirected, IndexType>;

/// Local port number of a node (OpenFlow port number on switches).
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortNo(pub u16);

impl fmt::Display for PortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A port as reported by the switch itself: its number, its interface name, and the name of the
/// node on the other end of the link, if the switch can tell.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct ReportedPort {
    /// Port number on the switch
    pub port: PortNo,
    /// Interface name (e.g., `s1-eth2`)
    pub iface: String,
    /// Name of the peer node. `None` if the peer lives in another namespace, e.g., a host.
    pub peer: Option<String>,
}

impl ReportedPort {
    /// Create a new reported port
    pub fn new(port: u16, iface: impl Into<String>, peer: Option<&str>) -> Self {
        Self { port: PortNo(port), iface: iface.into(), peer: peer.map(String::from) }
    }
}

/// Ethertype of a frame, as used in the flow match.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EtherType(pub u16);

impl EtherType {
    /// Address resolution protocol. This is the broadcast class that is flooded on every switch.
    pub const ARP: EtherType = EtherType(0x0806);
    /// IPv4
    pub const IPV4: EtherType = EtherType(0x0800);
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Ethernet (MAC) address.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The broadcast address `ff:ff:ff:ff:ff:ff`
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    /// Build the address from the lower 48 bits of a number. Mininet assigns `00:00:00:00:00:01`
    /// to the first host, which is `MacAddr::from_index(1)`.
    pub fn from_index(idx: u64) -> Self {
        let b = idx.to_be_bytes();
        Self([b[2], b[3], b[4], b[5], b[6], b[7]])
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a[0], a[1], a[2], a[3], a[4], a[5])
    }
}

impl FromStr for MacAddr {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut addr = [0u8; 6];
        let mut parts = s.trim().split(':');
        for byte in addr.iter_mut() {
            *byte = parts
                .next()
                .filter(|p| p.len() == 2)
                .and_then(|p| u8::from_str_radix(p, 16).ok())
                .ok_or_else(|| TopologyError::InvalidMacAddr(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(TopologyError::InvalidMacAddr(s.to_string()));
        }
        Ok(Self(addr))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = TopologyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(addr: MacAddr) -> Self {
        addr.to_string()
    }
}

/// # Switch
/// Forwarding node exposing one local port per link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    pub(crate) id: NodeId,
    pub(crate) name: String,
}

impl Switch {
    /// Return the ID of the switch
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    /// Return the name of the switch, as known to the control plane
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// # Host
/// End host, which does not forward any traffic. It is identified by its MAC and IP address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) mac: MacAddr,
    pub(crate) ip: Ipv4Addr,
}

impl Host {
    /// Return the ID of the host
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    /// Return the name of the host
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the MAC address of the host
    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    /// Return the IP address of the host
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }
}

/// # Topology Node (similar to `Option`)
/// Enumerates all possible nodes in the topology. This struct behaves similar to an `Option`, but
/// it knows two different `Some` values, the `Switch` and the `Host`.
#[derive(Debug)]
pub enum NodeRef<'a> {
    /// Switch
    Switch(&'a Switch),
    /// Host
    Host(&'a Host),
    /// None was found
    None,
}

impl<'a> NodeRef<'a> {
    /// Returns true if and only if self contains a switch.
    pub fn is_switch(&self) -> bool {
        matches!(self, Self::Switch(_))
    }

    /// Returns true if and only if self contains a host.
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host(_))
    }

    /// Returns true if and only if self contains `NodeRef::None`.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Maps the `NodeRef` to an option, with `Some(s)` only if self is `Switch`.
    pub fn switch(self) -> Option<&'a Switch> {
        match self {
            Self::Switch(s) => Some(s),
            _ => None,
        }
    }

    /// Maps the `NodeRef` to an option, with `Some(h)` only if self is `Host`.
    pub fn host(self) -> Option<&'a Host> {
        match self {
            Self::Host(h) => Some(h),
            _ => None,
        }
    }

    /// Returns the name of the node, if it exists.
    pub fn name(&self) -> Option<&'a str> {
        match self {
            Self::Switch(s) => Some(s.name.as_str()),
            Self::Host(h) => Some(h.name.as_str()),
            Self::None => None,
        }
    }
}

/// Topology Errors
#[derive(Error, Debug, PartialEq)]
pub enum TopologyError {
    /// Node is not present in the topology
    #[error("Node was not found in topology: {0:?}")]
    NodeNotFound(NodeId),
    /// Node name is not present in the topology
    #[error("Node name was not found in topology: {0}")]
    NodeNameNotFound(String),
    /// The name is already used by a different node
    #[error("Node name is already used: {0}")]
    DuplicateName(String),
    /// The node must be a switch
    #[error("Node is not a switch: {0:?}")]
    NotASwitch(NodeId),
    /// The node must be a host
    #[error("Node is not a host: {0:?}")]
    NotAHost(NodeId),
    /// Two nodes are not adjacent
    #[error("Link does not exist: {0:?} -- {1:?}")]
    NodesNotConnected(NodeId, NodeId),
    /// Two nodes are already connected. Parallel links are not supported.
    #[error("Link already exists: {0:?} -- {1:?}")]
    AlreadyConnected(NodeId, NodeId),
    /// A node cannot be connected to itself
    #[error("Cannot connect a node to itself: {0:?}")]
    SelfLoop(NodeId),
    /// The port is already occupied by a different link
    #[error("Port {1} of node {0:?} is already in use")]
    PortInUse(NodeId, PortNo),
    /// All port numbers of the node are taken
    #[error("No free port left on node {0:?}")]
    PortsExhausted(NodeId),
    /// The switch reports no port towards one of its neighbors
    #[error("Switch {0} reports no port towards {1}")]
    NeighborNotReported(String, String),
    /// The switch reports a link to a known node that is not its neighbor
    #[error("Switch {0} reports a link to {1}, which is not a neighbor")]
    UnexpectedPeer(String, String),
    /// The switch reports the same neighbor on two different ports
    #[error("Switch {0} reports more than one port towards {1}")]
    DuplicatePeer(String, String),
    /// The switch reports several ports with unknown peers, and more than one neighbor is left
    #[error("Switch {0} reports {1} ports with unknown peers for {2} remaining neighbors")]
    AmbiguousPorts(String, usize, usize),
    /// The switch reports the same port number for two different links
    #[error("Switch {0} reports port {1} for more than one link")]
    DuplicatePort(String, PortNo),
    /// Invalid MAC address
    #[error("Invalid MAC address: {0}")]
    InvalidMacAddr(String),
    /// Source and destination of a path must be different hosts
    #[error("Source and destination of a path are identical: {0:?}")]
    SameEndpoints(NodeId),
    /// A path needs at least a source and a destination
    #[error("A path must contain at least two hosts")]
    EmptyPath,
    /// The requested path is not known
    #[error("Path is not known: {0}")]
    PathNotFound(PathId),
}
