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

//! Module containing the definition of a single flow rule

use crate::flows::FlowError;
use crate::topology::{EtherType, MacAddr, PortNo};

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Priority of the broadcast-class rule (ARP is flooded)
pub const PRIORITY_BROADCAST: u16 = 200;
/// Priority of the path-specific rules
pub const PRIORITY_PATH: u16 = 100;
/// Priority of the default rule, dropping everything
pub const PRIORITY_DROP: u16 = 0;
/// Priority that the switch assigns to a rule without explicit priority
pub const DEFAULT_PRIORITY: u16 = 32768;

/// Fields of `dump-flows` output that carry statistics, and no match information.
const STATISTICS_FIELDS: [&str; 9] = [
    "cookie",
    "duration",
    "table",
    "n_packets",
    "n_bytes",
    "idle_age",
    "hard_age",
    "idle_timeout",
    "hard_timeout",
];

lazy_static! {
    static ref ACTIONS_RE: Regex = Regex::new(r"(?:^|[\s,])actions=(.*)$").unwrap();
}

/// Header fields of a packet which are relevant for the flow match.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub struct PacketHeader {
    /// Port on which the packet enters the switch
    pub in_port: PortNo,
    /// Ethertype of the frame
    pub eth_type: EtherType,
    /// Destination MAC address
    pub eth_dst: MacAddr,
}

/// Match of a flow rule. Fields set to `None` are wildcards.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Default)]
pub struct FlowMatch {
    /// Ingress port
    pub in_port: Option<PortNo>,
    /// Ethertype
    pub eth_type: Option<EtherType>,
    /// Destination MAC address
    pub eth_dst: Option<MacAddr>,
}

impl FlowMatch {
    /// Returns `true` if the packet matches all fields.
    pub fn matches(&self, header: &PacketHeader) -> bool {
        self.in_port.map(|p| p == header.in_port).unwrap_or(true)
            && self.eth_type.map(|t| t == header.eth_type).unwrap_or(true)
            && self.eth_dst.map(|d| d == header.eth_dst).unwrap_or(true)
    }

    /// Returns `true` if there exists at least one packet which matches both `self` and `other`.
    pub fn overlaps(&self, other: &FlowMatch) -> bool {
        fn compatible<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }
        compatible(self.in_port, other.in_port)
            && compatible(self.eth_type, other.eth_type)
            && compatible(self.eth_dst, other.eth_dst)
    }

    /// Returns `true` if all fields are wildcards
    pub fn is_any(&self) -> bool {
        self.in_port.is_none() && self.eth_type.is_none() && self.eth_dst.is_none()
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            self.in_port.map(|p| format!("in_port={}", p)),
            self.eth_type.map(|t| format!("dl_type={}", t)),
            self.eth_dst.map(|m| format!("dl_dst={}", m)),
        ];
        write!(f, "{}", fields.iter().flatten().join(","))
    }
}

/// Action of a flow rule
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub enum FlowAction {
    /// Send the packet out of the given port
    Output(PortNo),
    /// Send the packet out of all ports, except the one it entered
    Flood,
    /// Discard the packet
    Drop,
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output(port) => write!(f, "output:{}", port),
            Self::Flood => write!(f, "flood"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

impl FromStr for FlowAction {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("drop") {
            Ok(Self::Drop)
        } else if s.eq_ignore_ascii_case("flood") {
            Ok(Self::Flood)
        } else if s.contains(',') {
            Err(FlowError::UnsupportedField(format!("actions={}", s)))
        } else if let Some(port) = s.strip_prefix("output:") {
            Ok(Self::Output(PortNo(parse_u16(port)?)))
        } else if s.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self::Output(PortNo(parse_u16(s)?)))
        } else {
            Err(FlowError::UnsupportedField(format!("actions={}", s)))
        }
    }
}

/// # Flow Rule
///
/// A single rule of the flow table of a switch. The rule renders to the syntax of
/// `ovs-ofctl add-flow`:
///
/// ```
/// use pathswitch::flows::FlowRule;
/// use pathswitch::topology::{MacAddr, PortNo};
///
/// let rule = FlowRule::forward(PortNo(1), Some(MacAddr::from_index(2)), PortNo(2));
/// assert_eq!(
///     rule.to_string(),
///     "priority=100,in_port=1,dl_dst=00:00:00:00:00:02,actions=output:2"
/// );
/// ```
///
/// Parsing accepts both the `add-flow` syntax and the lines printed by `dump-flows`, for which the
/// statistics fields are ignored.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct FlowRule {
    /// Priority of the rule. Higher priorities take precedence.
    pub priority: u16,
    /// Match of the rule
    pub matches: FlowMatch,
    /// Action to perform on a matching packet
    pub action: FlowAction,
}

impl FlowRule {
    /// Rule flooding all ARP packets, with [`PRIORITY_BROADCAST`].
    pub fn broadcast() -> Self {
        Self {
            priority: PRIORITY_BROADCAST,
            matches: FlowMatch { eth_type: Some(EtherType::ARP), ..Default::default() },
            action: FlowAction::Flood,
        }
    }

    /// Catch-all rule dropping all packets, with [`PRIORITY_DROP`].
    pub fn drop_all() -> Self {
        Self { priority: PRIORITY_DROP, matches: FlowMatch::default(), action: FlowAction::Drop }
    }

    /// Path-specific rule with [`PRIORITY_PATH`], sending packets from `in_port` (and optionally
    /// destined to `eth_dst`) to `out_port`.
    pub fn forward(in_port: PortNo, eth_dst: Option<MacAddr>, out_port: PortNo) -> Self {
        Self {
            priority: PRIORITY_PATH,
            matches: FlowMatch { in_port: Some(in_port), eth_type: None, eth_dst },
            action: FlowAction::Output(out_port),
        }
    }

    /// Returns `true` if both rules have the same priority, and a packet exists that matches both.
    /// The switch cannot decide between two such rules.
    pub fn conflicts_with(&self, other: &FlowRule) -> bool {
        self.priority == other.priority && self.matches.overlaps(&other.matches)
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.matches.is_any() {
            write!(f, "priority={},actions={}", self.priority, self.action)
        } else {
            write!(f, "priority={},{},actions={}", self.priority, self.matches, self.action)
        }
    }
}

impl FromStr for FlowRule {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = ACTIONS_RE
            .captures(s)
            .ok_or_else(|| FlowError::Parse(format!("missing actions: {}", s.trim())))?;
        let action: FlowAction = caps[1].parse()?;
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);

        let mut priority = DEFAULT_PRIORITY;
        let mut matches = FlowMatch::default();

        for field in s[..start].split(|c: char| c == ',' || c.is_whitespace()) {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let (key, value) = match field.find('=') {
                Some(pos) => (&field[..pos], Some(&field[pos + 1..])),
                None => (field, None),
            };
            match (key, value) {
                ("priority", Some(v)) => priority = parse_u16(v)?,
                ("in_port", Some(v)) => matches.in_port = Some(PortNo(parse_u16(v)?)),
                ("dl_type", Some(v)) | ("eth_type", Some(v)) => {
                    matches.eth_type = Some(EtherType(parse_u16(v)?))
                }
                ("dl_dst", Some(v)) | ("eth_dst", Some(v)) => {
                    matches.eth_dst =
                        Some(v.parse().map_err(|_| FlowError::Parse(field.to_string()))?)
                }
                ("arp", None) => matches.eth_type = Some(EtherType::ARP),
                ("ip", None) => matches.eth_type = Some(EtherType::IPV4),
                (k, Some(_)) if STATISTICS_FIELDS.contains(&k) => {}
                _ => return Err(FlowError::UnsupportedField(field.to_string())),
            }
        }

        Ok(Self { priority, matches, action })
    }
}

/// Parse a decimal or hexadecimal (`0x` prefixed) number
fn parse_u16(s: &str) -> Result<u16, FlowError> {
    let s = s.trim();
    let result = match s.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    result.map_err(|_| FlowError::Parse(format!("invalid number: {}", s)))
}
