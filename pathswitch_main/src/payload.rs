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

//! Generate the payload that is sent over each path.

use rand::prelude::*;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

const BANNER: &str = "pathswitch transfer probe

The network carries this file over exactly one of the paths between h1 and h2. The receiver
stores every connection in its own sink, which is compared byte by byte with this file.

Printable: ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789
All 256 byte values follow:
";

const TRAILER: &str = "
End of the transfer probe.
";

/// Returns the default payload: A text banner, all 256 byte values in ascending order, and a
/// trailer.
pub fn banner_payload() -> Vec<u8> {
    let mut data = Vec::with_capacity(BANNER.len() + 256 + TRAILER.len());
    data.extend_from_slice(BANNER.as_bytes());
    data.extend(0..=255u8);
    data.extend_from_slice(TRAILER.as_bytes());
    data
}

/// Returns `size` random bytes. With a seed, the result is reproducible.
pub fn random_payload(size: usize, seed: Option<u64>) -> Vec<u8> {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let mut data = vec![0u8; size];
    rng.fill_bytes(&mut data);
    data
}

/// Write the payload to the file. Returns the number of bytes written.
pub fn write_payload(path: &Path, data: &[u8]) -> io::Result<u64> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(data.len() as u64)
}
