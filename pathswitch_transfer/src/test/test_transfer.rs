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

//! Test the transfer over the loopback interface.

use crate::{
    send_file, send_reader, sink_path, verify, ClientConfig, Error, ServerConfig, SessionState,
    Stopper, TransferServer,
};
use std::collections::HashSet;
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn server(dir: &TempDir) -> TransferServer {
    TransferServer::bind(ServerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        sink_prefix: dir.path().join("send_file.txt"),
        ..Default::default()
    })
    .unwrap()
}

fn payload(size: usize, seed: u8) -> Vec<u8> {
    (0..size).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn test_sink_path() {
    assert_eq!(
        sink_path(Path::new("/tmp/send_file.txt"), 3),
        Path::new("/tmp/send_file.txt.3").to_path_buf()
    );
}

#[test]
fn test_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let server = server(&dir);
    let addr = server.local_addr().unwrap();

    for (i, size) in [0usize, 1, 4095, 4096, 4097, 1_000_000].iter().enumerate() {
        let original = dir.path().join(format!("original_{}", size));
        std::fs::write(&original, payload(*size, i as u8)).unwrap();

        let source = original.clone();
        let client =
            thread::spawn(move || send_file(addr, &source, &ClientConfig::default()).unwrap());
        let report = server.accept().unwrap().join();
        let client_report = client.join().unwrap();

        assert_eq!(report.sequence, i as u64 + 1);
        assert_eq!(report.state, SessionState::Complete);
        assert_eq!(report.bytes, *size as u64);
        assert_eq!(client_report.bytes_sent, *size as u64);
        assert_eq!(client_report.total, Some(*size as u64));
        assert_eq!(report.sink, sink_path(&dir.path().join("send_file.txt"), i as u64 + 1));
        assert!(verify(&original, &report.sink).unwrap().is_identical());
    }
    assert_eq!(server.num_sessions(), 6);
}

#[test]
fn test_concurrent_clients() {
    let dir = tempfile::tempdir().unwrap();
    let server = server(&dir);
    let addr = server.local_addr().unwrap();
    let stopper = Stopper::new();

    let payloads: Vec<Vec<u8>> = (0..5).map(|i| payload(10_000 + 1000 * i, i as u8)).collect();

    let server_stopper = stopper.clone();
    let server_thread = thread::spawn(move || server.serve(&server_stopper).unwrap());

    let clients = payloads
        .iter()
        .cloned()
        .map(|p| {
            thread::spawn(move || {
                send_reader(addr, p.as_slice(), Some(p.len() as u64), &ClientConfig::default())
                    .unwrap()
            })
        })
        .collect::<Vec<_>>();
    for client in clients {
        client.join().unwrap();
    }

    // wait until all sessions are accepted, then stop the server
    thread::sleep(Duration::from_millis(500));
    stopper.send_stop();
    let reports = server_thread.join().unwrap();

    assert_eq!(reports.len(), 5);
    let sequences: HashSet<u64> = reports.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, (1..=5).collect::<HashSet<u64>>());
    let sinks: HashSet<_> = reports.iter().map(|r| r.sink.clone()).collect();
    assert_eq!(sinks.len(), 5);

    // every sink contains exactly one of the payloads
    let mut received: Vec<Vec<u8>> =
        reports.iter().map(|r| std::fs::read(&r.sink).unwrap()).collect();
    let mut expected = payloads;
    received.sort();
    expected.sort();
    assert_eq!(received, expected);
    assert!(reports.iter().all(|r| r.is_complete()));
}

#[test]
fn test_connection_refused() {
    // reserve a port, and close it again
    let addr: SocketAddr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let result = send_reader(addr, &b"data"[..], None, &ClientConfig::default());
    match result {
        Err(Error::Connect { peer, .. }) => assert_eq!(peer, addr),
        r => panic!("Expected a connection error, got {:?}", r),
    }
}

/// A listening socket with a backlog of zero, that never accepts. After one connection is queued,
/// the kernel drops every further SYN, such that connection attempts time out.
fn never_accepting_listener() -> TcpListener {
    use std::os::unix::io::FromRawFd;
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0);
        assert!(fd >= 0);
        let mut addr: libc::sockaddr_in = std::mem::zeroed();
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_addr.s_addr = u32::from(Ipv4Addr::LOCALHOST).to_be();
        addr.sin_port = 0;
        let len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let sockaddr = &addr as *const libc::sockaddr_in as *const libc::sockaddr;
        assert_eq!(libc::bind(fd, sockaddr, len), 0);
        assert_eq!(libc::listen(fd, 0), 0);
        TcpListener::from_raw_fd(fd)
    }
}

#[test]
fn test_connect_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("send_file.txt");
    let server = TransferServer::from_listener(
        never_accepting_listener(),
        ServerConfig { sink_prefix: prefix.clone(), ..Default::default() },
    )
    .unwrap();
    let addr = server.local_addr().unwrap();

    // fill the accept queue
    let mut queued = Vec::new();
    let full = (0..16).any(|_| {
        match TcpStream::connect_timeout(&addr, Duration::from_millis(200)) {
            Ok(stream) => {
                queued.push(stream);
                false
            }
            Err(_) => true,
        }
    });
    assert!(full);

    let timeout = Duration::from_millis(300);
    let config = ClientConfig { connect_timeout: timeout, ..ClientConfig::default() };
    let start = Instant::now();
    match send_reader(addr, &b"data"[..], None, &config) {
        Err(Error::Connect { peer, .. }) => assert_eq!(peer, addr),
        r => panic!("Expected a connection error, got {:?}", r),
    }
    assert!(start.elapsed() >= timeout);

    // nothing arrived at the destination
    assert_eq!(server.num_sessions(), 0);
    assert!(!sink_path(&prefix, 1).exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_source_missing() {
    let dir = tempfile::tempdir().unwrap();
    let server = server(&dir);
    let addr = server.local_addr().unwrap();
    let missing = dir.path().join("does_not_exist");
    match send_file(addr, &missing, &ClientConfig::default()) {
        Err(Error::SourceMissing(p)) => assert_eq!(p, missing),
        r => panic!("Expected SourceMissing, got {:?}", r),
    }
    // no connection was attempted
    assert_eq!(server.num_sessions(), 0);
}

#[test]
fn test_receive_timeout_keeps_partial_sink() {
    let dir = tempfile::tempdir().unwrap();
    let server = TransferServer::bind(ServerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        sink_prefix: dir.path().join("sink"),
        receive_timeout: Duration::from_millis(300),
        ..Default::default()
    })
    .unwrap();
    let addr = server.local_addr().unwrap();

    // connect, send some data, and then stay silent without closing the connection
    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"partial").unwrap();
        thread::sleep(Duration::from_secs(2));
        drop(stream);
    });

    let report = server.accept().unwrap().join();
    assert!(matches!(report.state, SessionState::Failed(_)));
    assert_eq!(report.bytes, 7);
    assert_eq!(std::fs::read(&report.sink).unwrap(), b"partial".to_vec());
    client.join().unwrap();
}

#[test]
fn test_session_is_finished() {
    let dir = tempfile::tempdir().unwrap();
    let server = server(&dir);
    let addr = server.local_addr().unwrap();

    let client = thread::spawn(move || {
        send_reader(addr, &b"data"[..], Some(4), &ClientConfig::default()).unwrap()
    });
    let handle = server.accept().unwrap();
    client.join().unwrap();

    let start = Instant::now();
    while !handle.is_finished() {
        assert!(start.elapsed() < Duration::from_secs(5), "session did not finish");
        thread::sleep(Duration::from_millis(10));
    }
    let report = handle.join();
    assert!(report.is_complete());
    assert_eq!(report.bytes, 4);
}

#[test]
fn test_serve_joins_finished_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let server = server(&dir);
    let addr = server.local_addr().unwrap();
    let stopper = Stopper::new();

    let server_stopper = stopper.clone();
    let server_thread = thread::spawn(move || server.serve(&server_stopper).unwrap());

    // one client after the other, such that earlier sessions are joined while serving
    for i in 0..3u8 {
        let data = payload(1000, i);
        send_reader(addr, data.as_slice(), Some(1000), &ClientConfig::default()).unwrap();
        thread::sleep(Duration::from_millis(300));
    }
    stopper.send_stop();
    let reports = server_thread.join().unwrap();

    assert_eq!(reports.iter().map(|r| r.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(reports.iter().all(|r| r.is_complete() && r.bytes == 1000));
    for (i, report) in reports.iter().enumerate() {
        assert_eq!(std::fs::read(&report.sink).unwrap(), payload(1000, i as u8));
    }
}

#[test]
fn test_stop_idle_server() {
    let dir = tempfile::tempdir().unwrap();
    let server = server(&dir);
    let stopper = Stopper::new();
    stopper.send_stop();
    assert!(server.serve(&stopper).unwrap().is_empty());
    assert!(stopper.is_stop());
}
