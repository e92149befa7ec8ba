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

//! Module containing the flow table of a single switch

use crate::flows::{FlowError, FlowRule, PacketHeader};

/// # Flow Table
///
/// Flow table of a single switch, behaving like the table of Open vSwitch: Adding a rule with the
/// same match and priority as an existing rule replaces the existing one, and the lookup returns
/// the matching rule with the highest priority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowTable {
    rules: Vec<FlowRule>,
}

impl FlowTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the output of `ovs-ofctl dump-flows`. Header lines (`NXST_FLOW reply`,
    /// `OFPST_FLOW reply`) and empty lines are skipped.
    pub fn from_dump(dump: &str) -> Result<Self, FlowError> {
        let mut table = Self::new();
        for line in dump.lines() {
            let line = line.trim();
            if line.is_empty() || line.contains("_FLOW reply") {
                continue;
            }
            table.install(line.parse()?);
        }
        Ok(table)
    }

    /// Remove all rules
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Add a rule to the table. Returns `true` if an existing rule with the same match and
    /// priority was replaced.
    pub fn install(&mut self, rule: FlowRule) -> bool {
        match self
            .rules
            .iter_mut()
            .find(|r| r.priority == rule.priority && r.matches == rule.matches)
        {
            Some(existing) => {
                *existing = rule;
                true
            }
            None => {
                self.rules.push(rule);
                false
            }
        }
    }

    /// Returns the rule with the highest priority matching the packet. If two matching rules share
    /// the highest priority, the one installed first is returned.
    pub fn lookup(&self, header: &PacketHeader) -> Option<&FlowRule> {
        self.rules.iter().filter(|r| r.matches.matches(header)).fold(None, |best, r| match best {
            Some(b) if b.priority >= r.priority => Some(b),
            _ => Some(r),
        })
    }

    /// Returns all rules, in the order in which they were installed
    pub fn rules(&self) -> &[FlowRule] {
        &self.rules
    }

    /// Returns all rules, sorted by decreasing priority and then by their match
    pub fn sorted_rules(&self) -> Vec<FlowRule> {
        let mut rules = self.rules.clone();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.cmp(b)));
        rules
    }

    /// Number of rules in the table
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the table contains no rule
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
