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

//! Test the forwarding simulation on the compiled rule sets.

use crate::example_topologies::{DualPath, ExampleTopology, TriplePath};
use crate::flows::{CompileMode, FlowCompiler, FlowRule, FlowTable, ForwardingState};
use crate::printer;
use crate::topology::{enumerate_paths, EtherType, MacAddr, NodeId, PortNo};
use lazy_static::lazy_static;
use std::collections::BTreeSet;
use std::iter::FromIterator;

lazy_static! {
    static ref H1: NodeId = 0.into();
    static ref H2: NodeId = 1.into();
    static ref S1: NodeId = 2.into();
    static ref S2: NodeId = 3.into();
    static ref S3: NodeId = 4.into();
    static ref S4: NodeId = 5.into();
}

#[test]
fn test_traffic_follows_active_path() {
    let t = DualPath::topology();
    let paths = enumerate_paths(&t, *H1, *H2).unwrap();

    for path in paths.iter() {
        let rules = FlowCompiler::default().compile_for_hosts(&t, path).unwrap();
        let state = ForwardingState::from_rule_set(&t, &rules);

        let forward = state.unicast(*H1, *H2).unwrap();
        assert!(forward.reached(*H2));
        assert!(!forward.looped);
        assert!(forward.dropped_at.is_empty());
        assert_eq!(forward.traversed, BTreeSet::from_iter(path.switches()));

        let reverse = state.unicast(*H2, *H1).unwrap();
        assert!(reverse.reached(*H1));
        assert_eq!(reverse.traversed, BTreeSet::from_iter(path.switches()));
    }
}

#[test]
fn test_port_only_mode() {
    let t = TriplePath::topology();
    let (h1, h2) = TriplePath::endpoints(&t);
    for path in enumerate_paths(&t, h1, h2).unwrap() {
        let rules = FlowCompiler::new(CompileMode::PortOnly).compile_for_hosts(&t, &path).unwrap();
        let state = ForwardingState::from_rule_set(&t, &rules);
        let delivery = state.unicast(h1, h2).unwrap();
        assert!(delivery.reached(h2));
        assert_eq!(delivery.traversed, BTreeSet::from_iter(path.switches()));
    }
}

#[test]
fn test_unknown_destination_is_dropped() {
    let t = DualPath::topology();
    let path = enumerate_paths(&t, *H1, *H2).unwrap().remove(0);
    let rules = FlowCompiler::default().compile_for_hosts(&t, &path).unwrap();
    let state = ForwardingState::from_rule_set(&t, &rules);

    let delivery = state.send(*H1, EtherType::IPV4, MacAddr::from_index(42)).unwrap();
    assert!(delivery.reached_hosts.is_empty());
    assert_eq!(delivery.traversed, BTreeSet::from_iter(vec![*S1]));
    assert_eq!(delivery.dropped_at, BTreeSet::from_iter(vec![*S1]));
}

#[test]
fn test_arp_is_flooded() {
    let t = DualPath::topology();
    let path = enumerate_paths(&t, *H1, *H2).unwrap().remove(1);
    let rules = FlowCompiler::default().compile_for_hosts(&t, &path).unwrap();
    let state = ForwardingState::from_rule_set(&t, &rules);

    let delivery = state.send(*H1, EtherType::ARP, MacAddr::BROADCAST).unwrap();
    assert!(delivery.reached(*H2));
    assert!(!delivery.reached(*H1));
    assert_eq!(delivery.traversed, BTreeSet::from_iter(vec![*S1, *S2, *S3, *S4]));
    // the two paths form a cycle, on which flooded packets circulate
    assert!(delivery.looped);
}

#[test]
fn test_empty_tables_drop() {
    let t = DualPath::topology();
    let state = ForwardingState::new(&t);
    let delivery = state.unicast(*H1, *H2).unwrap();
    assert!(!delivery.reached(*H2));
    assert_eq!(delivery.dropped_at, BTreeSet::from_iter(vec![*S1]));
}

#[test]
fn test_misconfigured_table_is_detected() {
    let t = DualPath::topology();
    let path = enumerate_paths(&t, *H1, *H2).unwrap().remove(0);
    let rules = FlowCompiler::default().compile_for_hosts(&t, &path).unwrap();
    let mut state = ForwardingState::from_rule_set(&t, &rules);

    // s2 lost its path rules (e.g., a partial installation)
    let mut table = FlowTable::new();
    table.install(FlowRule::broadcast());
    table.install(FlowRule::drop_all());
    state.set_table(*S2, table);

    let delivery = state.unicast(*H1, *H2).unwrap();
    assert!(!delivery.reached(*H2));
    assert_eq!(delivery.dropped_at, BTreeSet::from_iter(vec![*S2]));
    assert_eq!(
        printer::delivery(&t, &delivery).unwrap(),
        "reached: [], traversed: [s1, s2], dropped at: [s2]"
    );
}

#[test]
fn test_output_loop_is_detected() {
    let t = DualPath::topology();
    let mut state = ForwardingState::new(&t);
    let mac2 = MacAddr::from_index(2);

    // s1 -> s2 -> s4 -> s3 -> s1 -> ...
    let rules = vec![
        (*S1, FlowRule::forward(PortNo(1), Some(mac2), PortNo(2))),
        (*S1, FlowRule::forward(PortNo(3), Some(mac2), PortNo(2))),
        (*S2, FlowRule::forward(PortNo(1), Some(mac2), PortNo(2))),
        (*S4, FlowRule::forward(PortNo(1), Some(mac2), PortNo(2))),
        (*S3, FlowRule::forward(PortNo(2), Some(mac2), PortNo(1))),
    ];
    for (switch, rule) in rules {
        let mut table = state.table(switch).cloned().unwrap_or_default();
        table.install(rule);
        state.set_table(switch, table);
    }

    let delivery = state.unicast(*H1, *H2).unwrap();
    assert!(delivery.looped);
    assert!(!delivery.reached(*H2));
}
