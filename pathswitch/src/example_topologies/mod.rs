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

//! Topologies for testing

use crate::topology::{NodeId, Topology};

mod dual_path;
pub use dual_path::DualPath;

mod triple_path;
pub use triple_path::TriplePath;

/// Trait for easier access to example topologies.
pub trait ExampleTopology {
    /// Get the topology, with all ports assigned.
    fn topology() -> Topology;
    /// Get the source and the destination host.
    fn endpoints(topo: &Topology) -> (NodeId, NodeId);
}
