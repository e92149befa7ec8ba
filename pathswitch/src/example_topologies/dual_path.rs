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

//! # Dual-Path Topology

use super::ExampleTopology;
use crate::topology::{MacAddr, NodeId, Topology};

use std::net::Ipv4Addr;

/// # Dual-Path Topology
///
/// Two hosts, connected by two disjoint paths of equal length:
///
/// ```text
///            +---- s2 ----+
///            |            |
/// h1 ---- s1 +            + s4 ---- h2
///            |            |
///            +---- s3 ----+
/// ```
///
/// Links are created in the order `h1-s1`, `s1-s2`, `s1-s3`, `s2-s4`, `s3-s4`, `s4-h2`, which
/// results in the following ports:
///
/// | Switch | Port 1 | Port 2 | Port 3 |
/// |--------|--------|--------|--------|
/// | s1     | h1     | s2     | s3     |
/// | s2     | s1     | s4     |        |
/// | s3     | s1     | s4     |        |
/// | s4     | s2     | s3     | h2     |
///
/// Path 1 is `h1 -> s1 -> s2 -> s4 -> h2`, and path 2 is `h1 -> s1 -> s3 -> s4 -> h2`.
pub struct DualPath {}

impl ExampleTopology for DualPath {
    fn topology() -> Topology {
        let mut t = Topology::new();

        // add hosts
        let h1 = t.add_host("h1", MacAddr::from_index(1), Ipv4Addr::new(10, 0, 0, 1)).unwrap();
        let h2 = t.add_host("h2", MacAddr::from_index(2), Ipv4Addr::new(10, 0, 0, 2)).unwrap();

        // add switches
        let s1 = t.add_switch("s1").unwrap();
        let s2 = t.add_switch("s2").unwrap();
        let s3 = t.add_switch("s3").unwrap();
        let s4 = t.add_switch("s4").unwrap();

        // add links
        t.add_link(h1, s1).unwrap();
        t.add_link(s1, s2).unwrap();
        t.add_link(s1, s3).unwrap();
        t.add_link(s2, s4).unwrap();
        t.add_link(s3, s4).unwrap();
        t.add_link(s4, h2).unwrap();

        t
    }

    fn endpoints(topo: &Topology) -> (NodeId, NodeId) {
        (topo.get_node_id("h1").unwrap(), topo.get_node_id("h2").unwrap())
    }
}
