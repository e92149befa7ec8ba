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

//! # Flow rules
//!
//! This module contains everything about the per-switch forwarding state: The [`FlowRule`] itself
//! (which renders to, and parses from the textual syntax of `ovs-ofctl`), the [`FlowCompiler`]
//! turning a [`Path`](crate::topology::Path) into a [`RuleSet`], the [`FlowTable`] of a single
//! switch, and the [`ForwardingState`], which simulates how packets traverse the installed tables.
//!
//! ## Priorities
//!
//! The compiler uses three fixed priority levels:
//!
//! | Class                        | Priority               | Action           |
//! |------------------------------|------------------------|------------------|
//! | Broadcast (ARP, `0x0806`)    | [`PRIORITY_BROADCAST`] | flood            |
//! | Path-specific                | [`PRIORITY_PATH`]      | output to a port |
//! | Default                      | [`PRIORITY_DROP`]      | drop             |
//!
//! Every switch in the topology receives the broadcast and the default rule. Only the switches on
//! the path receive path-specific rules. Hence, switches not on the path drop all unicast traffic.

mod compiler;
mod forwarding;
mod rule;
mod table;

pub use compiler::{CompileMode, FlowCompiler, RuleSet};
pub use forwarding::{Delivery, ForwardingState};
pub use rule::{
    FlowAction, FlowMatch, FlowRule, PacketHeader, DEFAULT_PRIORITY, PRIORITY_BROADCAST,
    PRIORITY_DROP, PRIORITY_PATH,
};
pub use table::FlowTable;

use crate::topology::{NodeId, TopologyError};
use thiserror::Error;

/// Errors while compiling, parsing or evaluating flow rules
#[derive(Error, Debug, PartialEq)]
pub enum FlowError {
    /// The textual flow rule could not be parsed
    #[error("Cannot parse flow rule: {0}")]
    Parse(String),
    /// The flow rule uses a match field or action which is not supported
    #[error("Unsupported field in flow rule: {0}")]
    UnsupportedField(String),
    /// Two rules on the same switch with the same priority would match the same packet
    #[error("Ambiguous rule on switch {switch:?}: {rule}")]
    AmbiguousRule {
        /// Switch on which the rule was added
        switch: NodeId,
        /// The rule that overlaps an existing rule
        rule: FlowRule,
    },
    /// The path does not agree with the topology (e.g., ports changed after the path was computed)
    #[error("Path is inconsistent with the topology: {0}")]
    InvalidPath(String),
    /// Error propagated from the topology
    #[error("Topology Error: {0}")]
    Topology(#[from] TopologyError),
}
