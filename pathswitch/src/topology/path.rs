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

//! # Paths between two hosts
//!
//! A [`Path`] is the sequence of switches between two hosts, together with the ingress and egress
//! port on every switch. All paths between two hosts are computed with [`enumerate_paths`].

use crate::topology::{NodeId, PortNo, Topology, TopologyError};

use log::*;
use petgraph::algo::all_simple_paths;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a path, as returned by [`enumerate_paths`]. Paths are numbered starting at 1.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(pub usize);

impl PathId {
    /// Returns the position of the path in the vector returned by [`enumerate_paths`].
    pub fn index(&self) -> Option<usize> {
        self.0.checked_sub(1)
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single hop of a path: The packet enters `switch` on `ingress`, and leaves it on `egress`.
/// The ingress port faces the source host, the egress port faces the destination host.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub struct Hop {
    /// Switch of this hop
    pub switch: NodeId,
    /// Port facing the previous hop (towards the source)
    pub ingress: PortNo,
    /// Port facing the next hop (towards the destination)
    pub egress: PortNo,
}

/// # Path
///
/// Ordered sequence of hops, connecting the source host to the destination host. A path is always
/// simple, i.e., no switch appears twice.
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct Path {
    src: NodeId,
    dst: NodeId,
    hops: Vec<Hop>,
}

impl Path {
    /// Build a path from a sequence of nodes, starting at the source host and ending at the
    /// destination host. The port of each hop is looked up in the topology.
    pub fn from_nodes(topo: &Topology, nodes: &[NodeId]) -> Result<Self, TopologyError> {
        let (src, dst) = match (nodes.first(), nodes.last()) {
            (Some(src), Some(dst)) => (*src, *dst),
            _ => return Err(TopologyError::EmptyPath),
        };
        topo.get_host(src)?;
        topo.get_host(dst)?;
        if src == dst {
            return Err(TopologyError::SameEndpoints(src));
        }

        let hops = nodes
            .windows(3)
            .map(|w| {
                topo.get_switch(w[1])?;
                Ok(Hop {
                    switch: w[1],
                    ingress: topo.port_towards(w[1], w[0])?,
                    egress: topo.port_towards(w[1], w[2])?,
                })
            })
            .collect::<Result<Vec<_>, TopologyError>>()?;

        Ok(Self { src, dst, hops })
    }

    /// Source host
    pub fn src(&self) -> NodeId {
        self.src
    }

    /// Destination host
    pub fn dst(&self) -> NodeId {
        self.dst
    }

    /// All hops of the path, starting at the switch next to the source.
    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// Number of hops (switches) on the path
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// Returns `true` if the path has no switch at all
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Returns the switches on the path, in order.
    pub fn switches(&self) -> Vec<NodeId> {
        self.hops.iter().map(|h| h.switch).collect()
    }

    /// Returns the hop on the given switch, if the path traverses it.
    pub fn hop(&self, switch: NodeId) -> Option<&Hop> {
        self.hops.iter().find(|h| h.switch == switch)
    }

    /// Returns `true` if the switch is traversed by the path
    pub fn contains(&self, switch: NodeId) -> bool {
        self.hop(switch).is_some()
    }
}

/// Returns all simple paths between the two hosts `src` and `dst`. The paths are sorted by the
/// number of hops, and then by the sequence of switch identifiers. Hence, calling this function
/// twice on the same topology always yields the same order.
///
/// Only switches may appear between the two endpoints, since hosts do not forward packets. Two
/// hosts that are directly connected have no path at all.
pub fn enumerate_paths(
    topo: &Topology,
    src: NodeId,
    dst: NodeId,
) -> Result<Vec<Path>, TopologyError> {
    topo.get_host(src)?;
    topo.get_host(dst)?;
    if src == dst {
        return Err(TopologyError::SameEndpoints(src));
    }

    let mut paths = all_simple_paths::<Vec<NodeId>, _>(topo.get_graph(), src, dst, 1, None)
        .filter(|nodes| nodes.len() > 2)
        .filter(|nodes| nodes[1..nodes.len() - 1].iter().all(|n| topo.is_switch(*n)))
        .map(|nodes| Path::from_nodes(topo, &nodes))
        .collect::<Result<Vec<Path>, TopologyError>>()?;

    paths.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.switches().cmp(&b.switches())));

    debug!("Found {} paths between {:?} and {:?}", paths.len(), src, dst);
    Ok(paths)
}
