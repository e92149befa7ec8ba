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

//! # Verifier
//!
//! Compares the original source with a received sink. Sizes are compared first, and the content
//! is only read if they are equal.

use crate::server::CHUNK_SIZE;
use crate::Result;

use log::*;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Reason why two files are not identical
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Mismatch {
    /// The original file does not exist
    MissingOriginal(PathBuf),
    /// The received file does not exist
    MissingReceived(PathBuf),
    /// The files have different sizes
    SizeDiffers {
        /// Size of the original
        original: u64,
        /// Size of the received file
        received: u64,
    },
    /// The files have the same size, but their content differs
    ContentDiffers {
        /// Position of the first byte that differs
        offset: u64,
    },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOriginal(p) => write!(f, "original {} is missing", p.display()),
            Self::MissingReceived(p) => write!(f, "received file {} is missing", p.display()),
            Self::SizeDiffers { original, received } => {
                write!(f, "size differs: {} bytes sent, {} bytes received", original, received)
            }
            Self::ContentDiffers { offset } => write!(f, "content differs at byte {}", offset),
        }
    }
}

/// Result of the comparison. A mismatch is not an error, since the comparison itself succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// Both files are identical
    Identical {
        /// Size of both files
        bytes: u64,
    },
    /// The files are not identical
    Mismatch(Mismatch),
}

impl Verdict {
    /// Returns `true` if both files are identical
    pub fn is_identical(&self) -> bool {
        matches!(self, Self::Identical { .. })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identical { bytes } => write!(f, "identical ({} bytes)", bytes),
            Self::Mismatch(m) => write!(f, "mismatch: {}", m),
        }
    }
}

/// Compare the original with the received file. Errors are only returned if reading fails; missing
/// files are reported as a [`Mismatch`].
pub fn verify(original: &Path, received: &Path) -> Result<Verdict> {
    let original_size = match file_size(original)? {
        Some(s) => s,
        None => return Ok(mismatch(Mismatch::MissingOriginal(original.to_path_buf()))),
    };
    let received_size = match file_size(received)? {
        Some(s) => s,
        None => return Ok(mismatch(Mismatch::MissingReceived(received.to_path_buf()))),
    };
    if original_size != received_size {
        return Ok(mismatch(Mismatch::SizeDiffers {
            original: original_size,
            received: received_size,
        }));
    }

    let mut a = File::open(original)?;
    let mut b = File::open(received)?;
    let mut buf_a = vec![0u8; CHUNK_SIZE];
    let mut buf_b = vec![0u8; CHUNK_SIZE];
    let mut offset: u64 = 0;

    loop {
        let n_a = fill(&mut a, &mut buf_a)?;
        let n_b = fill(&mut b, &mut buf_b)?;
        let n = n_a.min(n_b);
        if let Some(pos) = buf_a[..n].iter().zip(buf_b[..n].iter()).position(|(x, y)| x != y) {
            return Ok(mismatch(Mismatch::ContentDiffers { offset: offset + pos as u64 }));
        }
        offset += n as u64;
        if n_a != n_b {
            // one of the files changed while reading it
            return Ok(mismatch(Mismatch::ContentDiffers { offset }));
        }
        if n_a == 0 {
            break;
        }
    }

    debug!("{} and {} are identical ({} bytes)", original.display(), received.display(), offset);
    Ok(Verdict::Identical { bytes: offset })
}

fn mismatch(m: Mismatch) -> Verdict {
    warn!("Verification failed: {}", m);
    Verdict::Mismatch(m)
}

fn file_size(path: &Path) -> Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(m) => Ok(Some(m.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read until the buffer is full, or the end of the file is reached.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
