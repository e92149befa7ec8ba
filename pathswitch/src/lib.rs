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

#![deny(missing_docs)]

//! # Pathswitch: Dual-Path Flow Control
//! This is a library for selecting one of several disjoint forwarding paths between two hosts,
//! and for computing the flow rules of every switch, such that exactly the chosen path carries
//! the traffic between them.
//!
//! ## Structure
//!
//! This library is structured in the following way:
//!
//! - **[`Topology`](topology)**: Switches, hosts and links, together with the port each link
//!   occupies on both of its endpoints. Based on the topology, all simple
//!   [`Paths`](topology::Path) between two hosts are enumerated with
//!   [`enumerate_paths`](topology::enumerate_paths).
//!
//! - **[`Flows`](flows)**: The [`FlowCompiler`](flows::FlowCompiler) turns a path into a
//!   [`RuleSet`](flows::RuleSet) for the entire topology: Switches on the path forward the traffic
//!   of the two endpoints in both directions, while all other switches only flood ARP and drop
//!   everything else. The [`ForwardingState`](flows::ForwardingState) simulates the resulting
//!   flow tables to check where packets end up.
//!
//! - **[`ExampleTopologies`](example_topologies)**: Collection of prepared topologies, most
//!   importantly the [`DualPath`](example_topologies::DualPath) topology.
//!
//! Installing the rules on actual switches is done by the `pathswitch_runtime` crate.
//!
//! ## Usage
//!
//! ```
//! use pathswitch::example_topologies::{DualPath, ExampleTopology};
//! use pathswitch::flows::{CompileMode, FlowCompiler, ForwardingState};
//! use pathswitch::topology::enumerate_paths;
//! use pathswitch::Error;
//!
//! fn main() -> Result<(), Error> {
//!     let topo = DualPath::topology();
//!     let (h1, h2) = DualPath::endpoints(&topo);
//!
//!     let paths = enumerate_paths(&topo, h1, h2)?;
//!     let rules = FlowCompiler::new(CompileMode::AddressQualified)
//!         .compile_for_hosts(&topo, &paths[0])?;
//!
//!     // only the switches on the first path see the traffic
//!     let state = ForwardingState::from_rule_set(&topo, &rules);
//!     let delivery = state.unicast(h1, h2)?;
//!     assert!(delivery.reached(h2));
//!     assert_eq!(delivery.traversed.iter().copied().collect::<Vec<_>>(), paths[0].switches());
//!
//!     Ok(())
//! }
//! ```

pub mod example_topologies;
pub mod flows;
pub mod printer;
mod test;
pub mod topology;

mod error;
pub use error::Error;

use flows::{CompileMode, FlowCompiler, RuleSet};
use topology::{enumerate_paths, NodeId, Path, PathId, Topology};

/// Enumerate all paths between `src` and `dst`, and compile the rule set of each of them. The
/// result is ordered by [`PathId`].
pub fn compile_all_paths(
    topo: &Topology,
    src: NodeId,
    dst: NodeId,
    mode: CompileMode,
) -> Result<Vec<(PathId, Path, RuleSet)>, Error> {
    let compiler = FlowCompiler::new(mode);
    enumerate_paths(topo, src, dst)?
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            let rules = compiler.compile_for_hosts(topo, &path)?;
            Ok((PathId(i + 1), path, rules))
        })
        .collect()
}
