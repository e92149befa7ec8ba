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

use pathswitch::example_topologies::{DualPath, ExampleTopology, TriplePath};
use pathswitch::flows::{CompileMode, ForwardingState};
use pathswitch::topology::{
    enumerate_paths, EtherType, MacAddr, NodeId, PathId, Topology, TopologyDescription,
};
use pathswitch::{compile_all_paths, printer};
use pathswitch_runtime::control_plane::{ControlPlane, PortQuery};
use pathswitch_runtime::controller::{ControllerConfig, PathController};
use pathswitch_runtime::ovs_conn::OvsConnection;
use pathswitch_runtime::sim_conn::SimulatedControlPlane;
use pathswitch_runtime::{probe_all_paths, write_report, ProbeSettings};
use pathswitch_transfer::{
    send_file, verify, ClientConfig, ServerConfig, Stopper, TransferServer, Verdict,
};

use clap::{ArgEnum, Args, Parser, Subcommand};
use log::*;
use std::error::Error;
use std::fs::File;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod payload;
use payload::*;

fn main() -> Result<(), Box<dyn Error>> {
    // run clap
    let args = CommandLineArguments::parse();

    // initialize the env logger
    pretty_env_logger::init();

    // match on the action
    match args.cmd {
        MainCommand::Paths { topo } => {
            let (t, src, dst) = get_topo(&topo)?;
            for (i, path) in enumerate_paths(&t, src, dst)?.iter().enumerate() {
                println!("{}", printer::path_with_id(&t, PathId(i + 1), path)?);
            }
        }
        MainCommand::Rules { topo, id, port_only } => {
            let (t, src, dst) = get_topo(&topo)?;
            let (_, path, rules) = compile_all_paths(&t, src, dst, compile_mode(port_only))?
                .into_iter()
                .find(|(i, _, _)| *i == PathId(id))
                .ok_or_else(|| format!("Path {} does not exist", id))?;
            println!("{}", printer::path_with_id(&t, PathId(id), &path)?);
            printer::print_rule_set(&t, &rules)?;
        }
        MainCommand::Check { topo, port_only } => {
            let (t, src, dst) = get_topo(&topo)?;
            let mut all_ok = true;
            for (id, path, rules) in compile_all_paths(&t, src, dst, compile_mode(port_only))? {
                println!("{}", printer::path_with_id(&t, id, &path)?);
                all_ok &= check_path(&t, src, dst, &ForwardingState::from_rule_set(&t, &rules))?;
            }
            if !all_ok {
                error!("Some paths do not carry the traffic");
                std::process::exit(1);
            }
        }
        MainCommand::Activate { topo, control, id } => {
            let (t, src, dst) = get_topo(&topo)?;
            let config = ControllerConfig { keep_rules: true, ..control.controller_config() };
            if control.dry_run {
                let c = SimulatedControlPlane::from_topology(&t);
                let ctrl = PathController::new(t, src, dst, c, config)?;
                activate(ctrl, PathId(id), !control.no_sync)?;
            } else {
                let c = control.ovs_connection();
                let ctrl = PathController::new(t, src, dst, c, config)?;
                activate(ctrl, PathId(id), !control.no_sync)?;
            }
        }
        MainCommand::Teardown { topo, control } => {
            let (t, src, dst) = get_topo(&topo)?;
            let config = ControllerConfig { keep_rules: true, ..control.controller_config() };
            if control.dry_run {
                let c = SimulatedControlPlane::from_topology(&t);
                PathController::new(t, src, dst, c, config)?.teardown();
            } else {
                let c = control.ovs_connection();
                PathController::new(t, src, dst, c, config)?.teardown();
            }
        }
        MainCommand::Serve { bind, sink_prefix, timeout, sessions } => {
            let server = TransferServer::bind(ServerConfig {
                bind,
                sink_prefix,
                receive_timeout: Duration::from_secs(timeout),
                ..Default::default()
            })?;
            info!("Listening on {}", server.local_addr()?);
            let reports = match sessions {
                Some(n) => (0..n)
                    .map(|_| server.accept().map(|s| s.join()))
                    .collect::<Result<Vec<_>, _>>()?,
                None => server.serve(&Stopper::new())?,
            };
            for report in reports {
                println!(
                    "Session {} from {}: {} bytes into {} ({:?})",
                    report.sequence,
                    report.peer,
                    report.bytes,
                    report.sink.display(),
                    report.state
                );
            }
        }
        MainCommand::Send { server, file, connect_timeout } => {
            let config = ClientConfig {
                connect_timeout: Duration::from_secs(connect_timeout),
                ..Default::default()
            };
            let report = send_file(server, &file, &config)?;
            println!("Sent {} bytes to {} in {:?}", report.bytes_sent, report.peer, report.elapsed);
        }
        MainCommand::Verify { original, received } => {
            let verdict = verify(&original, &received)?;
            println!("{}", verdict);
            if let Verdict::Mismatch(_) = verdict {
                std::process::exit(1);
            }
        }
        MainCommand::Generate { output, size, seed } => {
            let data = match size {
                Some(size) => random_payload(size, seed),
                None => banner_payload(),
            };
            let n = write_payload(&output, &data)?;
            println!("Created {} ({} bytes)", output.display(), n);
        }
        MainCommand::Probe { topo, control, server, source, sink_prefix, generate, json } => {
            let (t, src, dst) = get_topo(&topo)?;
            if generate {
                write_payload(&source, &banner_payload())?;
            }
            let settings = ProbeSettings { server, source, sink_prefix, ..Default::default() };
            let config = control.controller_config();
            let all_ok = if control.dry_run {
                let c = SimulatedControlPlane::from_topology(&t);
                let ctrl = PathController::new(t, src, dst, c, config)?;
                probe(ctrl, &settings, json.as_deref(), !control.no_sync)?
            } else {
                let c = control.ovs_connection();
                let ctrl = PathController::new(t, src, dst, c, config)?;
                probe(ctrl, &settings, json.as_deref(), !control.no_sync)?
            };
            if !all_ok {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Activate the path, and print the resulting tables.
fn activate<C: ControlPlane + PortQuery>(
    mut ctrl: PathController<C>,
    id: PathId,
    sync_ports: bool,
) -> Result<(), Box<dyn Error>> {
    if sync_ports {
        ctrl.sync_ports()?;
    }
    if let Err(e) = ctrl.activate_path(id) {
        dump_tables(&mut ctrl);
        return Err(e.into());
    }
    dump_tables(&mut ctrl);
    let differing = ctrl.check_installed()?;
    if !differing.is_empty() {
        warn!("Tables differ from the expected rules: {}", differing.join(", "));
    }
    Ok(())
}

/// Try all paths, and print the summary. Returns `true` if every path carried the data.
fn probe<C: ControlPlane + PortQuery>(
    mut ctrl: PathController<C>,
    settings: &ProbeSettings,
    json: Option<&Path>,
    sync_ports: bool,
) -> Result<bool, Box<dyn Error>> {
    if sync_ports {
        ctrl.sync_ports()?;
    }
    let reports = probe_all_paths(&mut ctrl, settings)?;
    for report in reports.iter() {
        println!(
            "Path {} ({}): {}",
            report.path,
            report.switches.join(" -> "),
            if report.is_success() { "OK" } else { "FAILED" }
        );
        debug!("{:?}", report.outcome);
    }
    if let Some(file) = json {
        write_report(file, &reports)?;
    }
    Ok(reports.iter().all(|r| r.is_success()))
}

/// Simulate unicast traffic in both directions, and an ARP broadcast. Returns `true` if the
/// unicast traffic reached its destination.
fn check_path(
    t: &Topology,
    src: NodeId,
    dst: NodeId,
    state: &ForwardingState,
) -> Result<bool, Box<dyn Error>> {
    let forward = state.unicast(src, dst)?;
    let reverse = state.unicast(dst, src)?;
    let arp = state.send(src, EtherType::ARP, MacAddr::BROADCAST)?;
    println!("    forward: {}", printer::delivery(t, &forward)?);
    println!("    reverse: {}", printer::delivery(t, &reverse)?);
    println!("    arp:     {}", printer::delivery(t, &arp)?);
    Ok(forward.reached(dst) && reverse.reached(src))
}

fn dump_tables<C: ControlPlane>(ctrl: &mut PathController<C>) {
    match ctrl.dump_all() {
        Ok(dumps) => {
            for (switch, dump) in dumps {
                println!("{}:\n{}", switch, dump.trim_end());
            }
        }
        Err(e) => warn!("Cannot dump the tables: {}", e),
    }
}

fn compile_mode(port_only: bool) -> CompileMode {
    if port_only {
        CompileMode::PortOnly
    } else {
        CompileMode::AddressQualified
    }
}

/// Load the topology, and look up both endpoints.
fn get_topo(args: &TopologyArgs) -> Result<(Topology, NodeId, NodeId), Box<dyn Error>> {
    let t = match &args.file {
        Some(file) => {
            let desc: TopologyDescription = serde_json::from_reader(File::open(file)?)?;
            Topology::from_description(&desc)?
        }
        None => match args.topology {
            ExampleTopologySelection::DualPath => DualPath::topology(),
            ExampleTopologySelection::TriplePath => TriplePath::topology(),
        },
    };
    let src = t.get_node_id(&args.src)?;
    let dst = t.get_node_id(&args.dst)?;
    Ok((t, src, dst))
}

#[derive(Parser, Debug)]
#[clap(name = "pathswitch", about = "Dual-path flow control and transfer verification")]
struct CommandLineArguments {
    /// Action to perform
    #[clap(subcommand)]
    cmd: MainCommand,
}

#[derive(Subcommand, Debug)]
enum MainCommand {
    /// Print all paths between the two hosts
    #[clap(name = "paths")]
    Paths {
        #[clap(flatten)]
        topo: TopologyArgs,
    },
    /// Print the rules of a single path
    #[clap(name = "rules")]
    Rules {
        #[clap(flatten)]
        topo: TopologyArgs,
        /// Path to compile (starting at 1)
        id: usize,
        /// Match only on the ingress port
        #[clap(short = 'p', long)]
        port_only: bool,
    },
    /// Simulate the traffic along every path
    #[clap(name = "check")]
    Check {
        #[clap(flatten)]
        topo: TopologyArgs,
        /// Match only on the ingress port
        #[clap(short = 'p', long)]
        port_only: bool,
    },
    /// Activate a path. The rules remain on the switches afterwards.
    #[clap(name = "activate")]
    Activate {
        #[clap(flatten)]
        topo: TopologyArgs,
        #[clap(flatten)]
        control: ControlArgs,
        /// Path to activate (starting at 1)
        id: usize,
    },
    /// Clear the tables of all switches
    #[clap(name = "teardown")]
    Teardown {
        #[clap(flatten)]
        topo: TopologyArgs,
        #[clap(flatten)]
        control: ControlArgs,
    },
    /// Run the transfer server
    #[clap(name = "serve")]
    Serve {
        /// Address to listen on
        #[clap(short = 'b', long, default_value = "0.0.0.0:12345")]
        bind: SocketAddr,
        /// Prefix of the sink files
        #[clap(long, default_value = "/tmp/send_file.txt")]
        sink_prefix: PathBuf,
        /// Receive timeout in seconds
        #[clap(short = 't', long, default_value = "30")]
        timeout: u64,
        /// Stop after this many sessions. Without, the server runs until it is killed.
        #[clap(short = 'n', long)]
        sessions: Option<u64>,
    },
    /// Send a file to the transfer server
    #[clap(name = "send")]
    Send {
        /// Address of the server
        #[clap(short = 's', long, default_value = "10.0.0.2:12345")]
        server: SocketAddr,
        /// File to send
        #[clap(default_value = "/tmp/test_file.txt")]
        file: PathBuf,
        /// Connect timeout in seconds
        #[clap(short = 't', long, default_value = "10")]
        connect_timeout: u64,
    },
    /// Compare a received file with the original
    #[clap(name = "verify")]
    Verify {
        /// The original file
        original: PathBuf,
        /// The received file
        received: PathBuf,
    },
    /// Generate a payload
    #[clap(name = "generate")]
    Generate {
        /// Output file
        #[clap(default_value = "/tmp/test_file.txt")]
        output: PathBuf,
        /// Generate this many random bytes instead of the text payload
        #[clap(short = 'n', long)]
        size: Option<usize>,
        /// Seed for the random payload
        #[clap(short = 's', long)]
        seed: Option<u64>,
    },
    /// Activate every path in turn, send the file, and verify what arrived
    #[clap(name = "probe")]
    Probe {
        #[clap(flatten)]
        topo: TopologyArgs,
        #[clap(flatten)]
        control: ControlArgs,
        /// Address of the transfer server
        #[clap(short = 's', long, default_value = "10.0.0.2:12345")]
        server: SocketAddr,
        /// File to send
        #[clap(long, default_value = "/tmp/test_file.txt")]
        source: PathBuf,
        /// Prefix of the sink files written by the server
        #[clap(long, default_value = "/tmp/send_file.txt")]
        sink_prefix: PathBuf,
        /// Write the default payload into the source file first
        #[clap(short = 'g', long)]
        generate: bool,
        /// Store the result summary in a json file
        #[clap(long = "json")]
        json: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct TopologyArgs {
    /// Example topology to use
    #[clap(arg_enum, short = 't', long, default_value = "dual-path")]
    topology: ExampleTopologySelection,
    /// Read the topology from a JSON description instead
    #[clap(short = 'f', long)]
    file: Option<PathBuf>,
    /// Source host
    #[clap(long, default_value = "h1")]
    src: String,
    /// Destination host
    #[clap(long, default_value = "h2")]
    dst: String,
}

#[derive(Args, Debug)]
struct ControlArgs {
    /// Do not touch the switches, use simulated tables instead
    #[clap(short = 'd', long)]
    dry_run: bool,
    /// Program used to configure the switches
    #[clap(long, default_value = "ovs-ofctl")]
    ofctl: String,
    /// Time to wait after the installation, in milliseconds
    #[clap(long, default_value = "1000")]
    settle_ms: u64,
    /// Program used to find the peer of each switch port
    #[clap(long, default_value = "ip")]
    ip: String,
    /// Match only on the ingress port
    #[clap(short = 'p', long)]
    port_only: bool,
    /// Compile the rules from the inferred port numbers, without reading the actual ports from
    /// the switches first
    #[clap(long)]
    no_sync: bool,
}

impl ControlArgs {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            compile_mode: compile_mode(self.port_only),
            settle_delay: Duration::from_millis(self.settle_ms),
            keep_rules: false,
        }
    }

    fn ovs_connection(&self) -> OvsConnection {
        OvsConnection::with_program(self.ofctl.as_str()).ip_program(self.ip.as_str())
    }
}

#[derive(ArgEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ExampleTopologySelection {
    /// Two disjoint paths of equal length (h1, s1-s4, h2)
    DualPath,
    /// Three paths, one of them longer (h1, s1-s6, h2)
    TriplePath,
}
