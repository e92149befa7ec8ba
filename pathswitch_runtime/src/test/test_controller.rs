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

//! Test the path controller on the simulated control plane.

use crate::control_plane::{ControlError, ControlPlane};
use crate::controller::{ControllerConfig, PathController};
use crate::sim_conn::{ControlOp, SimulatedControlPlane};
use crate::Error;
use pathswitch::example_topologies::{DualPath, ExampleTopology};
use pathswitch::flows::{FlowRule, PRIORITY_PATH};
use pathswitch::topology::{
    MacAddr, NodeId, PathId, PortNo, ReportedPort, Topology, TopologyError,
};
use lazy_static::lazy_static;
use std::collections::BTreeSet;
use std::iter::FromIterator;
use std::net::Ipv4Addr;
use std::time::Duration;

lazy_static! {
    static ref H1: NodeId = 0.into();
    static ref H2: NodeId = 1.into();
    static ref S1: NodeId = 2.into();
    static ref S2: NodeId = 3.into();
    static ref S3: NodeId = 4.into();
    static ref S4: NodeId = 5.into();
}

fn config() -> ControllerConfig {
    ControllerConfig { settle_delay: Duration::from_secs(0), ..Default::default() }
}

fn setup(control: &mut SimulatedControlPlane) -> PathController<&mut SimulatedControlPlane> {
    PathController::new(DualPath::topology(), *H1, *H2, control, config()).unwrap()
}

fn path_rules(control: &SimulatedControlPlane, switch: &str) -> Vec<FlowRule> {
    control
        .table(switch)
        .unwrap()
        .rules()
        .iter()
        .filter(|r| r.priority == PRIORITY_PATH)
        .cloned()
        .collect()
}

#[test]
fn test_new() {
    let t = DualPath::topology();
    let mut c = SimulatedControlPlane::from_topology(&t);
    let ctrl = setup(&mut c);
    assert_eq!(ctrl.path_ids(), vec![PathId(1), PathId(2)]);
    assert_eq!(ctrl.path(PathId(1)).unwrap().switches(), vec![*S1, *S2, *S4]);
    assert_eq!(ctrl.path(PathId(2)).unwrap().switches(), vec![*S1, *S3, *S4]);
    assert_eq!(ctrl.active_path(), None);
    assert_eq!(ctrl.state().generation(), 0);
    assert!(matches!(
        ctrl.path(PathId(3)),
        Err(Error::Topology(TopologyError::PathNotFound(PathId(3))))
    ));
    drop(ctrl);

    // nothing was installed
    assert!(c.log().iter().all(|op| matches!(op, ControlOp::Clear(_))));
}

#[test]
fn test_no_path() {
    let mut t = Topology::new();
    let h1 = t.add_host("h1", "00:00:00:00:00:01".parse().unwrap(), [10, 0, 0, 1].into()).unwrap();
    let h2 = t.add_host("h2", "00:00:00:00:00:02".parse().unwrap(), [10, 0, 0, 2].into()).unwrap();
    let s1 = t.add_switch("s1").unwrap();
    t.add_link(h1, s1).unwrap();

    let c = SimulatedControlPlane::from_topology(&t);
    match PathController::new(t, h1, h2, c, config()) {
        Err(Error::NoPath { src, dst }) => {
            assert_eq!(src, "h1");
            assert_eq!(dst, "h2");
        }
        r => panic!("Unexpected result: {:?}", r.map(|_| ())),
    }
}

#[test]
fn test_switch_paths() {
    let t = DualPath::topology();
    let mut c = SimulatedControlPlane::from_topology(&t);
    let mut ctrl = setup(&mut c);

    assert_eq!(ctrl.activate_path(PathId(1)).unwrap(), PathId(1));
    assert_eq!(ctrl.active_path(), Some(PathId(1)));
    assert!(ctrl.check_installed().unwrap().is_empty());

    assert_eq!(ctrl.activate_path(PathId(2)).unwrap(), PathId(2));
    assert_eq!(ctrl.active_path(), Some(PathId(2)));
    assert_eq!(ctrl.state().generation(), 2);
    assert!(ctrl.check_installed().unwrap().is_empty());

    let state = ctrl.control().forwarding_state(&t);
    let delivery = state.unicast(*H1, *H2).unwrap();
    assert!(delivery.reached(*H2));
    assert_eq!(delivery.traversed, BTreeSet::from_iter(vec![*S1, *S3, *S4]));
    let delivery = state.unicast(*H2, *H1).unwrap();
    assert!(delivery.reached(*H1));
    assert_eq!(delivery.traversed, BTreeSet::from_iter(vec![*S1, *S3, *S4]));

    // no stale rules of path 1 remain on s2
    assert!(path_rules(ctrl.control(), "s2").is_empty());
    assert_eq!(path_rules(ctrl.control(), "s3").len(), 2);
}

#[test]
fn test_no_stale_rules() {
    let t = DualPath::topology();
    let mut c = SimulatedControlPlane::from_topology(&t);
    {
        let mut ctrl = PathController::new(
            t.clone(),
            *H1,
            *H2,
            &mut c,
            ControllerConfig { keep_rules: true, ..config() },
        )
        .unwrap();
        ctrl.activate_path(PathId(1)).unwrap();
        ctrl.activate_path(PathId(2)).unwrap();
    }

    assert!(path_rules(&c, "s2").is_empty());
    assert_eq!(path_rules(&c, "s3").len(), 2);
    assert_eq!(path_rules(&c, "s1").len(), 2);
    assert_eq!(path_rules(&c, "s4").len(), 2);
    // broadcast and drop rule on every switch
    for s in &["s1", "s2", "s3", "s4"] {
        let table = c.table(s).unwrap();
        assert!(table.rules().contains(&FlowRule::broadcast()));
        assert!(table.rules().contains(&FlowRule::drop_all()));
    }
}

#[test]
fn test_activate_same_path_twice() {
    let t = DualPath::topology();
    let mut c = SimulatedControlPlane::from_topology(&t);
    let mut ctrl = setup(&mut c);
    ctrl.activate_path(PathId(1)).unwrap();
    let first = ctrl.dump_all().unwrap();
    ctrl.activate_path(PathId(1)).unwrap();
    assert_eq!(ctrl.dump_all().unwrap(), first);
    assert_eq!(ctrl.state().generation(), 2);
}

#[test]
fn test_unknown_path() {
    let t = DualPath::topology();
    let mut c = SimulatedControlPlane::from_topology(&t);
    let mut ctrl = setup(&mut c);
    ctrl.activate_path(PathId(1)).unwrap();
    ctrl.control_mut().clear_log();

    assert!(matches!(
        ctrl.activate_path(PathId(3)),
        Err(Error::Topology(TopologyError::PathNotFound(PathId(3))))
    ));
    assert!(matches!(
        ctrl.activate_path(PathId(0)),
        Err(Error::Topology(TopologyError::PathNotFound(PathId(0))))
    ));

    // no switch was touched, and the previous path is still active
    assert!(ctrl.control().log().is_empty());
    assert_eq!(ctrl.active_path(), Some(PathId(1)));
}

#[test]
fn test_install_failure() {
    let t = DualPath::topology();
    let mut c = SimulatedControlPlane::from_topology(&t);
    let mut ctrl = setup(&mut c);
    ctrl.activate_path(PathId(1)).unwrap();

    ctrl.control_mut().fail_install_after("s3", 1);
    match ctrl.activate_path(PathId(2)) {
        Err(Error::Install(e)) => {
            assert_eq!(e.switch, "s3");
            assert_eq!(e.installed, 1);
            assert!(matches!(e.cause, ControlError::Rejected { .. }));
        }
        r => panic!("Unexpected result: {:?}", r),
    }
    assert_eq!(ctrl.active_path(), None);
    assert_eq!(ctrl.state().generation(), 1);

    // s4 was never touched, and still carries the rules of path 1
    assert!(!ctrl.check_installed().unwrap().is_empty());

    // retry drives the full installation
    ctrl.control_mut().clear_faults();
    ctrl.activate_path(PathId(2)).unwrap();
    assert_eq!(ctrl.active_path(), Some(PathId(2)));
    assert!(ctrl.check_installed().unwrap().is_empty());
}

#[test]
fn test_clear_failure() {
    let t = DualPath::topology();
    let mut c = SimulatedControlPlane::from_topology(&t);
    let mut ctrl = setup(&mut c);

    ctrl.control_mut().fail_clear("s1");
    match ctrl.activate_path(PathId(1)) {
        Err(Error::Install(e)) => {
            assert_eq!(e.switch, "s1");
            assert_eq!(e.rule, None);
        }
        r => panic!("Unexpected result: {:?}", r),
    }
    assert_eq!(ctrl.active_path(), None);
    // s1 is the first switch, nothing else was touched
    assert!(ctrl.control().log().is_empty());
}

#[test]
fn test_timeout() {
    let t = DualPath::topology();
    let mut c = SimulatedControlPlane::from_topology(&t);
    let mut ctrl = setup(&mut c);

    ctrl.control_mut().fail_timeout("s2");
    match ctrl.activate_path(PathId(2)) {
        Err(Error::Install(e)) => {
            assert_eq!(e.switch, "s2");
            assert!(matches!(e.cause, ControlError::Timeout { .. }));
        }
        r => panic!("Unexpected result: {:?}", r),
    }
    assert_eq!(ctrl.active_path(), None);
    assert!(matches!(ctrl.dump_all(), Err(Error::Control(ControlError::Timeout { .. }))));
}

#[test]
fn test_drop_clears_tables() {
    let t = DualPath::topology();
    let mut c = SimulatedControlPlane::from_topology(&t);
    {
        let mut ctrl = setup(&mut c);
        ctrl.activate_path(PathId(1)).unwrap();
    }
    for s in &["s1", "s2", "s3", "s4"] {
        assert!(c.table(s).unwrap().is_empty());
    }

    // explicit teardown is not repeated on drop
    {
        let mut ctrl = setup(&mut c);
        ctrl.activate_path(PathId(1)).unwrap();
        ctrl.teardown();
        assert_eq!(ctrl.active_path(), None);
        ctrl.control_mut().clear_log();
    }
    assert!(c.log().is_empty());
}

#[test]
fn test_check_without_path() {
    let t = DualPath::topology();
    let mut c = SimulatedControlPlane::from_topology(&t);
    let mut ctrl = setup(&mut c);
    assert!(ctrl.check_installed().unwrap().is_empty());

    ctrl.control_mut().install("s2", &FlowRule::drop_all()).unwrap();
    assert_eq!(ctrl.check_installed().unwrap(), vec!["s2".to_string()]);
}

#[test]
fn test_sync_ports() {
    let t = DualPath::topology();
    let mut c = SimulatedControlPlane::from_topology(&t);
    let mut ctrl = setup(&mut c);
    ctrl.activate_path(PathId(1)).unwrap();

    // nothing changed
    assert_eq!(ctrl.sync_ports().unwrap(), 0);
    assert_eq!(ctrl.active_path(), Some(PathId(1)));

    // s1 reports the links to s2 and s3 on swapped ports
    ctrl.control_mut().set_ports(
        "s1",
        vec![
            ReportedPort::new(1, "s1-eth1", None),
            ReportedPort::new(2, "s1-eth2", Some("s3")),
            ReportedPort::new(3, "s1-eth3", Some("s2")),
        ],
    );
    assert_eq!(ctrl.sync_ports().unwrap(), 2);
    assert_eq!(ctrl.active_path(), None);
    assert_eq!(ctrl.topology().port_towards(*S1, *S2), Ok(PortNo(3)));

    // the paths are still the same, but the rules use the new ports
    assert_eq!(ctrl.path(PathId(1)).unwrap().switches(), vec![*S1, *S2, *S4]);
    ctrl.activate_path(PathId(1)).unwrap();
    let rules = ctrl.rule_set(PathId(1)).unwrap();
    let h2_mac = "00:00:00:00:00:02".parse().unwrap();
    assert!(rules.rules_for(*S1).contains(&FlowRule::forward(PortNo(1), Some(h2_mac), PortNo(3))));
    assert!(ctrl.check_installed().unwrap().is_empty());
}

/// The emulated network created its links in the order h1-s1, s1-s2, s2-s4, s4-h2, s1-s3, s3-s4.
/// Hence, on s4, port 2 leads to h2 and port 3 to s3, unlike in [`DualPath`].
fn dual_path_in_creation_order() -> Topology {
    let mut t = Topology::new();
    let h1 = t.add_host("h1", MacAddr::from_index(1), Ipv4Addr::new(10, 0, 0, 1)).unwrap();
    let h2 = t.add_host("h2", MacAddr::from_index(2), Ipv4Addr::new(10, 0, 0, 2)).unwrap();
    let s1 = t.add_switch("s1").unwrap();
    let s2 = t.add_switch("s2").unwrap();
    let s3 = t.add_switch("s3").unwrap();
    let s4 = t.add_switch("s4").unwrap();
    for (a, b) in vec![(h1, s1), (s1, s2), (s2, s4), (s4, h2), (s1, s3), (s3, s4)] {
        t.add_link(a, b).unwrap();
    }
    t
}

#[test]
fn test_sync_ports_link_order() {
    let actual = dual_path_in_creation_order();
    assert_eq!(actual.port_towards(*S4, *H2), Ok(PortNo(2)));
    let mut c = SimulatedControlPlane::from_topology(&actual);
    let mut ctrl = setup(&mut c);

    // with the inferred ports, path 1 sends the traffic for h2 from s4 towards s3
    ctrl.activate_path(PathId(1)).unwrap();
    let delivery = ctrl.control().forwarding_state(&actual).unicast(*H1, *H2).unwrap();
    assert!(!delivery.reached(*H2));

    assert_eq!(ctrl.sync_ports().unwrap(), 2);
    assert_eq!(ctrl.active_path(), None);
    assert_eq!(ctrl.topology().port_towards(*S4, *H2), Ok(PortNo(2)));
    assert_eq!(ctrl.topology().port_towards(*S4, *S3), Ok(PortNo(3)));
    assert_eq!(ctrl.topology().port_towards(*S4, *S2), Ok(PortNo(1)));

    for (id, via) in vec![(PathId(1), *S2), (PathId(2), *S3)] {
        ctrl.activate_path(id).unwrap();
        let state = ctrl.control().forwarding_state(&actual);
        for (src, dst) in vec![(*H1, *H2), (*H2, *H1)] {
            let delivery = state.unicast(src, dst).unwrap();
            assert!(delivery.reached(dst));
            assert_eq!(delivery.traversed, BTreeSet::from_iter(vec![*S1, via, *S4]));
        }
    }
}

#[test]
fn test_sync_ports_failure_keeps_state() {
    let t = DualPath::topology();
    let mut c = SimulatedControlPlane::from_topology(&t);
    let mut ctrl = setup(&mut c);
    ctrl.activate_path(PathId(1)).unwrap();

    // s1 has swapped ports, but the query of s3 fails afterwards
    ctrl.control_mut().set_ports(
        "s1",
        vec![
            ReportedPort::new(1, "s1-eth1", None),
            ReportedPort::new(2, "s1-eth2", Some("s3")),
            ReportedPort::new(3, "s1-eth3", Some("s2")),
        ],
    );
    ctrl.control_mut().fail_timeout("s3");
    assert!(matches!(ctrl.sync_ports(), Err(Error::Control(ControlError::Timeout { .. }))));

    // nothing was applied, the active path and its rules are unchanged
    assert_eq!(ctrl.active_path(), Some(PathId(1)));
    assert_eq!(ctrl.topology().port_towards(*S1, *S2), Ok(PortNo(2)));
    assert!(ctrl.rule_set(PathId(1)).is_ok());
    ctrl.control_mut().clear_faults();
    assert!(ctrl.check_installed().unwrap().is_empty());

    // an inconsistent report of s4 is not applied either
    ctrl.control_mut().set_ports("s4", vec![ReportedPort::new(1, "s4-eth1", Some("s2"))]);
    assert!(matches!(
        ctrl.sync_ports(),
        Err(Error::Topology(TopologyError::NeighborNotReported(_, _)))
    ));
    assert_eq!(ctrl.active_path(), Some(PathId(1)));
    assert_eq!(ctrl.topology().port_towards(*S1, *S2), Ok(PortNo(2)));
}

#[test]
fn test_sync_ports_unknown_switch() {
    let mut c = SimulatedControlPlane::new();
    c.add_switch("s1");
    let mut ctrl = setup(&mut c);
    assert!(matches!(ctrl.sync_ports(), Err(Error::Control(ControlError::UnknownSwitch(_)))));
}
