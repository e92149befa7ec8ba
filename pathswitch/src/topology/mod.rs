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

#![deny(missing_docs, missing_debug_implementations)]

//! # Topology
//!
//! This module represents the physical network between the two endpoints: switches, hosts, and
//! the links between them. Every link occupies one local port on both endpoints. Based on the
//! topology, all simple paths between two hosts can be enumerated.
//!
//! ## Example usage
//!
//! The following example builds the canonical dual-path topology, and enumerates both paths from
//! `h1` to `h2`.
//!
//! ```rust
//! use pathswitch::topology::{enumerate_paths, MacAddr, Topology};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut t = Topology::new();
//!
//!     let h1 = t.add_host("h1", MacAddr::from_index(1), "10.0.0.1".parse()?)?;
//!     let h2 = t.add_host("h2", MacAddr::from_index(2), "10.0.0.2".parse()?)?;
//!     let s1 = t.add_switch("s1")?;
//!     let s2 = t.add_switch("s2")?;
//!     let s3 = t.add_switch("s3")?;
//!     let s4 = t.add_switch("s4")?;
//!
//!     t.add_link(h1, s1)?;
//!     t.add_link(s1, s2)?;
//!     t.add_link(s1, s3)?;
//!     t.add_link(s2, s4)?;
//!     t.add_link(s3, s4)?;
//!     t.add_link(s4, h2)?;
//!
//!     let paths = enumerate_paths(&t, h1, h2)?;
//!     assert_eq!(paths.len(), 2);
//!     assert_eq!(paths[0].switches(), vec![s1, s2, s4]);
//!     assert_eq!(paths[1].switches(), vec![s1, s3, s4]);
//!
//!     Ok(())
//! }
//! ```

pub(crate) mod description;
pub(crate) mod network;
pub(crate) mod path;
pub(crate) mod types;

pub use description::{HostDescription, LinkDescription, TopologyDescription};
pub use network::Topology;
pub use path::{enumerate_paths, Hop, Path, PathId};
pub use types::{
    EtherType, Host, MacAddr, NodeId, NodeRef, PortNo, ReportedPort, Switch, TopologyError,
    TopologyGraph,
};
