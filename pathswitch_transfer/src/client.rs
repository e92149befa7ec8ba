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

//! # Transfer Client
//!
//! The client connects to the server, sends the entire source in chunks, and closes its side of
//! the connection. There is no retry: A failed connection attempt, or an error while sending, is
//! reported to the caller.

use crate::server::CHUNK_SIZE;
use crate::{Error, Result};

use log::*;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::path::Path;
use std::time::{Duration, Instant};

/// Time to wait for the connection to be established
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Time to wait for a single chunk to be sent
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Progress is only logged if the source is larger than this
pub const PROGRESS_THRESHOLD: u64 = 1024;

/// Configuration of the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Time to wait for the connection to be established
    pub connect_timeout: Duration,
    /// Time to wait for a single chunk to be sent
    pub send_timeout: Duration,
    /// Size of the chunks
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { connect_timeout: CONNECT_TIMEOUT, send_timeout: SEND_TIMEOUT, chunk_size: CHUNK_SIZE }
    }
}

/// Report of a successful transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientReport {
    /// Address of the server
    pub peer: SocketAddr,
    /// Number of bytes sent
    pub bytes_sent: u64,
    /// Size of the source, if known
    pub total: Option<u64>,
    /// Time from the connection attempt until the connection was closed
    pub elapsed: Duration,
}

/// Send a file to the server. If the file does not exist, no connection is attempted.
pub fn send_file(peer: SocketAddr, source: &Path, config: &ClientConfig) -> Result<ClientReport> {
    let file = match File::open(source) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            error!("Source file {} does not exist!", source.display());
            return Err(Error::SourceMissing(source.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    let total = file.metadata()?.len();
    info!("Sending {} ({} bytes) to {}", source.display(), total, peer);
    send_reader(peer, file, Some(total), config)
}

/// Send everything that can be read from `reader` to the server. If `total` is given and larger
/// than [`PROGRESS_THRESHOLD`], the progress is logged after every chunk.
pub fn send_reader<R: Read>(
    peer: SocketAddr,
    mut reader: R,
    total: Option<u64>,
    config: &ClientConfig,
) -> Result<ClientReport> {
    let start = Instant::now();

    let mut stream = TcpStream::connect_timeout(&peer, config.connect_timeout)
        .map_err(|cause| Error::Connect { peer, cause })?;
    debug!("Connected to {}", peer);
    stream.set_write_timeout(Some(config.send_timeout))?;
    stream.set_nodelay(true)?;

    let log_progress = total.map(|t| t > PROGRESS_THRESHOLD).unwrap_or(false);
    let mut buffer = vec![0u8; config.chunk_size.max(1)];
    let mut sent: u64 = 0;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        stream
            .write_all(&buffer[..n])
            .map_err(|cause| Error::Transfer { peer, bytes: sent, cause })?;
        sent += n as u64;

        if log_progress {
            if let Some(total) = total {
                info!(
                    "Progress: {}/{} bytes ({:.1}%)",
                    sent,
                    total,
                    100.0 * sent as f64 / total as f64
                );
            }
        }
    }

    stream.shutdown(Shutdown::Write).map_err(|cause| Error::Transfer { peer, bytes: sent, cause })?;

    let elapsed = start.elapsed();
    info!("Sent {} bytes to {} in {:?}", sent, peer, elapsed);
    Ok(ClientReport { peer, bytes_sent: sent, total, elapsed })
}
