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

//! # Topology description
//!
//! Serializable description of a topology, such that the network can be read from a JSON file
//! instead of being hard-coded. Links may carry explicit port numbers. If they are omitted, the
//! next free port is used on that side.
//!
//! ```json
//! {
//!   "switches": ["s1", "s2"],
//!   "hosts": [
//!     { "name": "h1", "mac": "00:00:00:00:00:01", "ip": "10.0.0.1" },
//!     { "name": "h2", "mac": "00:00:00:00:00:02", "ip": "10.0.0.2" }
//!   ],
//!   "links": [
//!     { "a": "h1", "b": "s1" },
//!     { "a": "s1", "b": "s2", "port_a": 2, "port_b": 1 },
//!     { "a": "s2", "b": "h2" }
//!   ]
//! }
//! ```

use crate::topology::{MacAddr, PortNo, Topology, TopologyError};

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Description of an entire topology
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopologyDescription {
    /// Names of all switches
    #[serde(default)]
    pub switches: Vec<String>,
    /// All hosts
    #[serde(default)]
    pub hosts: Vec<HostDescription>,
    /// All links, in the order in which they are created
    #[serde(default)]
    pub links: Vec<LinkDescription>,
}

/// Description of a single host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDescription {
    /// Name of the host
    pub name: String,
    /// MAC address of the host
    pub mac: MacAddr,
    /// IP address of the host
    pub ip: Ipv4Addr,
}

/// Description of a single link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescription {
    /// Name of the first endpoint
    pub a: String,
    /// Name of the second endpoint
    pub b: String,
    /// Port on the first endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_a: Option<PortNo>,
    /// Port on the second endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_b: Option<PortNo>,
}

impl Topology {
    /// Build a topology from its description. Hosts are added before switches, and links are
    /// created in the order of the description.
    pub fn from_description(desc: &TopologyDescription) -> Result<Self, TopologyError> {
        let mut t = Topology::new();
        for host in desc.hosts.iter() {
            t.add_host(host.name.as_str(), host.mac, host.ip)?;
        }
        for switch in desc.switches.iter() {
            t.add_switch(switch.as_str())?;
        }
        for link in desc.links.iter() {
            let a = t.get_node_id(&link.a)?;
            let b = t.get_node_id(&link.b)?;
            let port_a = match link.port_a {
                Some(p) => p,
                None => t.next_free_port(a)?,
            };
            let port_b = match link.port_b {
                Some(p) => p,
                None => t.next_free_port(b)?,
            };
            t.add_link_with_ports(a, port_a, b, port_b)?;
        }
        Ok(t)
    }

    /// Describe the topology, including all port numbers currently assigned.
    pub fn to_description(&self) -> Result<TopologyDescription, TopologyError> {
        let switches = self
            .switches()
            .into_iter()
            .map(|s| self.get_node_name(s).map(String::from))
            .collect::<Result<Vec<_>, _>>()?;
        let hosts = self
            .hosts()
            .into_iter()
            .map(|h| {
                self.get_host(h).map(|h| HostDescription {
                    name: h.name().to_string(),
                    mac: h.mac(),
                    ip: h.ip(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let links = self
            .links()
            .map(|(a, b)| {
                Ok(LinkDescription {
                    a: self.get_node_name(*a)?.to_string(),
                    b: self.get_node_name(*b)?.to_string(),
                    port_a: Some(self.port_towards(*a, *b)?),
                    port_b: Some(self.port_towards(*b, *a)?),
                })
            })
            .collect::<Result<Vec<_>, TopologyError>>()?;
        Ok(TopologyDescription { switches, hosts, links })
    }
}
