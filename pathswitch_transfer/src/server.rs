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

//! # Transfer Server
//!
//! The server accepts connections, and spawns one thread per connection. Each session writes the
//! received bytes verbatim into its own sink file. The only state shared between the sessions is
//! the sequence counter, which is incremented atomically when a connection is accepted.
//!
//! A session is either `Complete` (the client closed the connection), or `Failed` (an IO error
//! occurred, or no data arrived within the receive timeout). In both cases, the sink keeps all
//! bytes received until then.

use crate::{Error, Result, Stopper};

use log::*;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, sleep, JoinHandle};
use std::time::{Duration, Instant};

/// Default port of the server
pub const DEFAULT_PORT: u16 = 12345;
/// Size of a single chunk, both while sending and while receiving
pub const CHUNK_SIZE: usize = 4096;
/// Time after which a session without any received data fails
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default prefix of the sink files
pub const DEFAULT_SINK_PREFIX: &str = "/tmp/send_file.txt";

/// Interval in which the accept loop checks for new connections, and for the stop flag.
const ACCEPT_POLL: Duration = Duration::from_millis(50);
/// Interval in which an idle session checks the stop flag.
const RECEIVE_POLL: Duration = Duration::from_millis(100);

/// Configuration of the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: SocketAddr,
    /// Prefix of the sink files. Session `n` writes to `<sink_prefix>.<n>`.
    pub sink_prefix: PathBuf,
    /// A session fails if no data arrives for this long
    pub receive_timeout: Duration,
    /// Size of the receive buffer
    pub chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            sink_prefix: PathBuf::from(DEFAULT_SINK_PREFIX),
            receive_timeout: RECEIVE_TIMEOUT,
            chunk_size: CHUNK_SIZE,
        }
    }
}

/// Terminal state of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// The client closed the connection, and all data was written to the sink
    Complete,
    /// The session was aborted, with the reason
    Failed(String),
}

/// Report of a single finished session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Sequence number of the session, starting at 1
    pub sequence: u64,
    /// Address of the client
    pub peer: SocketAddr,
    /// File into which the data was written
    pub sink: PathBuf,
    /// Number of bytes received and written
    pub bytes: u64,
    /// Terminal state
    pub state: SessionState,
}

impl SessionReport {
    /// Returns `true` if the session completed successfully
    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }
}

/// Returns the name of the sink of the session with the given sequence number:
/// `<prefix>.<sequence>`.
pub fn sink_path(prefix: &Path, sequence: u64) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!(".{}", sequence));
    PathBuf::from(name)
}

/// Handle of a running session
#[derive(Debug)]
pub struct SessionHandle {
    sequence: u64,
    peer: SocketAddr,
    sink: PathBuf,
    handle: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// Sequence number of the session
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Address of the client
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Returns `true` if the session has finished, such that [`SessionHandle::join`] does not
    /// block.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait until the session has finished, and return its report.
    pub fn join(self) -> SessionReport {
        let (sequence, peer, sink) = (self.sequence, self.peer, self.sink);
        self.handle.join().unwrap_or_else(|_| {
            error!("Session {} from {} panicked!", sequence, peer);
            SessionReport {
                sequence,
                peer,
                sink,
                bytes: 0,
                state: SessionState::Failed("session thread panicked".to_string()),
            }
        })
    }
}

/// # Transfer Server
///
/// Listens on a TCP port, and writes the data of every accepted connection into a separate sink.
/// The listening socket is closed when the server is dropped.
#[derive(Debug)]
pub struct TransferServer {
    listener: TcpListener,
    config: ServerConfig,
    sequence: Arc<AtomicU64>,
}

impl TransferServer {
    /// Create the server, and start listening.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let listener =
            TcpListener::bind(config.bind).map_err(|cause| Error::Bind { addr: config.bind, cause })?;
        Self::from_listener(listener, config)
    }

    /// Create the server on a socket that is already listening. The address in the configuration
    /// is ignored.
    pub fn from_listener(listener: TcpListener, config: ServerConfig) -> Result<Self> {
        info!("Listening on {}", listener.local_addr()?);
        Ok(Self { listener, config, sequence: Arc::new(AtomicU64::new(0)) })
    }

    /// Returns the address the server is listening on. Use this when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the configuration of the server
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of connections accepted so far
    pub fn num_sessions(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Wait for the next connection, and spawn its session. This function blocks until a client
    /// connects.
    pub fn accept(&self) -> Result<SessionHandle> {
        let (stream, peer) = self.listener.accept()?;
        Ok(self.spawn(stream, peer, Stopper::new()))
    }

    /// Accept connections until the stopper is triggered. Afterwards, wait for all sessions to
    /// finish, and return their reports, ordered by their sequence number.
    ///
    /// Finished sessions are joined while the server waits for new connections, so only the
    /// running sessions hold a thread.
    ///
    /// Idle sessions also observe the stopper, and fail when it is triggered. Sessions that are
    /// still receiving data are completed.
    pub fn serve(&self, stopper: &Stopper) -> Result<Vec<SessionReport>> {
        self.listener.set_nonblocking(true)?;

        let mut handles: Vec<SessionHandle> = Vec::new();
        let mut reports: Vec<SessionReport> = Vec::new();
        let result = loop {
            if stopper.is_stop() {
                break Ok(());
            }
            match self.listener.accept() {
                Ok((stream, peer)) => handles.push(self.spawn(stream, peer, stopper.clone())),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    join_finished(&mut handles, &mut reports);
                    sleep(ACCEPT_POLL)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };

        reports.extend(handles.into_iter().map(SessionHandle::join));
        reports.sort_by_key(|r| r.sequence);
        self.listener.set_nonblocking(false)?;
        result?;

        info!(
            "Server stopped after {} sessions ({} complete)",
            reports.len(),
            reports.iter().filter(|r| r.is_complete()).count()
        );
        Ok(reports)
    }

    fn spawn(&self, stream: TcpStream, peer: SocketAddr, stopper: Stopper) -> SessionHandle {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let sink = sink_path(&self.config.sink_prefix, sequence);
        info!("Accepted connection {} from {}", sequence, peer);

        let config = self.config.clone();
        let thread_sink = sink.clone();
        let handle =
            thread::spawn(move || session(stream, peer, sequence, thread_sink, &config, &stopper));

        SessionHandle { sequence, peer, sink, handle }
    }
}

/// Move the reports of all finished sessions from `handles` into `reports`.
fn join_finished(handles: &mut Vec<SessionHandle>, reports: &mut Vec<SessionReport>) {
    let (finished, running): (Vec<_>, Vec<_>) =
        handles.drain(..).partition(SessionHandle::is_finished);
    if !finished.is_empty() {
        debug!("{} sessions finished, {} still running", finished.len(), running.len());
    }
    reports.extend(finished.into_iter().map(SessionHandle::join));
    *handles = running;
}

/// Run a single session until the connection is closed or fails.
fn session(
    stream: TcpStream,
    peer: SocketAddr,
    sequence: u64,
    sink: PathBuf,
    config: &ServerConfig,
    stopper: &Stopper,
) -> SessionReport {
    let mut bytes = 0;
    let state = match receive(stream, &sink, config, stopper, &mut bytes) {
        Ok(()) => {
            info!(
                "Session {} from {} complete: {} bytes written to {}",
                sequence,
                peer,
                bytes,
                sink.display()
            );
            SessionState::Complete
        }
        Err(e) => {
            warn!("Session {} from {} failed after {} bytes: {}", sequence, peer, bytes, e);
            SessionState::Failed(e.to_string())
        }
    };
    SessionReport { sequence, peer, sink, bytes, state }
}

fn receive(
    mut stream: TcpStream,
    sink: &Path,
    config: &ServerConfig,
    stopper: &Stopper,
    bytes: &mut u64,
) -> io::Result<()> {
    // accepted sockets inherit the non-blocking flag of the listener on some platforms
    stream.set_nonblocking(false)?;
    let poll = RECEIVE_POLL.min(config.receive_timeout).max(Duration::from_millis(1));
    stream.set_read_timeout(Some(poll))?;

    let mut file = File::create(sink)?;
    let mut buffer = vec![0u8; config.chunk_size.max(1)];
    let mut last_data = Instant::now();

    loop {
        match stream.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                file.write_all(&buffer[..n])?;
                *bytes += n as u64;
                last_data = Instant::now();
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                if last_data.elapsed() >= config.receive_timeout {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no data received within {:?}", config.receive_timeout),
                    ));
                }
                if stopper.is_stop() {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "server stopped"));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    file.flush()
}
