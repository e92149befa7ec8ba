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

//! # Transfer Probe
//!
//! This is a very simple crate to send a file over a plain TCP connection, and to check that it
//! arrived unmodified. It is used to verify that a path through the network actually carries
//! traffic.
//!
//! The wire format is an unframed byte stream. The client sends the file in chunks, and closes
//! its side of the connection when done. The server writes everything it receives into a new sink
//! file for every connection, named `<prefix>.<sequence>`. End-of-stream is the only completion
//! signal, there is no acknowledgement nor checksum. Use [`verify`] to compare the sink with the
//! original.
//!
//! ```
//! use pathswitch_transfer::{send_file, verify, ClientConfig, ServerConfig, TransferServer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = tempfile::tempdir()?;
//!     let original = dir.path().join("payload.bin");
//!     std::fs::write(&original, b"hello world")?;
//!
//!     // start the server on a random port
//!     let server = TransferServer::bind(ServerConfig {
//!         bind: "127.0.0.1:0".parse()?,
//!         sink_prefix: dir.path().join("received"),
//!         ..Default::default()
//!     })?;
//!     let addr = server.local_addr()?;
//!
//!     // send the file, and wait for the server to write it
//!     let client = std::thread::spawn(move || {
//!         send_file(addr, &original, &ClientConfig::default())
//!     });
//!     let report = server.accept()?.join();
//!     client.join().unwrap()?;
//!
//!     assert!(verify(&dir.path().join("payload.bin"), &report.sink)?.is_identical());
//!     Ok(())
//! }
//! ```

#![deny(missing_docs, missing_debug_implementations)]

pub mod client;
pub mod server;
mod test;
pub mod verify;

pub use client::{send_file, send_reader, ClientConfig, ClientReport};
pub use server::{
    sink_path, ServerConfig, SessionHandle, SessionReport, SessionState, TransferServer,
};
pub use verify::{verify, Mismatch, Verdict};

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// # Transfer Error type
#[derive(Debug, Error)]
pub enum Error {
    /// The connection could not be established (refused, unreachable, or timed out)
    #[error("Cannot connect to {peer}: {cause}")]
    Connect {
        /// Address of the server
        peer: SocketAddr,
        /// Underlying error
        #[source]
        cause: io::Error,
    },
    /// The connection failed while sending. All bytes sent until then remain sent.
    #[error("Transfer to {peer} failed after {bytes} bytes: {cause}")]
    Transfer {
        /// Address of the server
        peer: SocketAddr,
        /// Number of bytes sent successfully
        bytes: u64,
        /// Underlying error
        #[source]
        cause: io::Error,
    },
    /// The file to send does not exist
    #[error("Source file does not exist: {}", .0.display())]
    SourceMissing(PathBuf),
    /// The server cannot listen on the address
    #[error("Cannot bind to {addr}: {cause}")]
    Bind {
        /// Address to listen on
        addr: SocketAddr,
        /// Underlying error
        #[source]
        cause: io::Error,
    },
    /// Any other IO error
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
}

/// Result type of this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Stopper, to check when to stop, or to send the stop command
#[derive(Clone, Debug, Default)]
pub struct Stopper {
    b: Arc<RwLock<bool>>,
}

impl Stopper {
    /// Create a new stopper
    pub fn new() -> Self {
        Self::default()
    }

    /// Send the stop command. This function will block until the write lock can be acquired.
    pub fn send_stop(&self) {
        match self.b.write() {
            Ok(mut b) => *b = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
    }

    /// Checks if the stop flag is set. This function will block until the read lock can be
    /// acquired. A poisoned lock counts as stopped.
    pub fn is_stop(&self) -> bool {
        self.b.read().map(|b| *b).unwrap_or(true)
    }
}
