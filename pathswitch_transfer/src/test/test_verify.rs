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

//! Test the comparison of the original and the received file.

use crate::{verify, Mismatch, Verdict};
use std::fs;

#[test]
fn test_identical() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(&a, &data).unwrap();
    fs::write(&b, &data).unwrap();
    assert_eq!(verify(&a, &b).unwrap(), Verdict::Identical { bytes: 10_000 });

    let empty_a = dir.path().join("empty_a");
    let empty_b = dir.path().join("empty_b");
    fs::write(&empty_a, b"").unwrap();
    fs::write(&empty_b, b"").unwrap();
    assert_eq!(verify(&empty_a, &empty_b).unwrap(), Verdict::Identical { bytes: 0 });
}

#[test]
fn test_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::write(&a, vec![7u8; 5000]).unwrap();
    fs::write(&b, vec![7u8; 4096]).unwrap();
    assert_eq!(
        verify(&a, &b).unwrap(),
        Verdict::Mismatch(Mismatch::SizeDiffers { original: 5000, received: 4096 })
    );
}

#[test]
fn test_content_differs() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    let data = vec![1u8; 9000];
    let mut corrupted = data.clone();
    corrupted[4100] = 2;
    fs::write(&a, &data).unwrap();
    fs::write(&b, &corrupted).unwrap();
    let verdict = verify(&a, &b).unwrap();
    assert_eq!(verdict, Verdict::Mismatch(Mismatch::ContentDiffers { offset: 4100 }));
    assert!(!verdict.is_identical());
}

#[test]
fn test_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let missing = dir.path().join("missing");
    fs::write(&a, b"data").unwrap();
    assert_eq!(
        verify(&a, &missing).unwrap(),
        Verdict::Mismatch(Mismatch::MissingReceived(missing.clone()))
    );
    assert_eq!(
        verify(&missing, &a).unwrap(),
        Verdict::Mismatch(Mismatch::MissingOriginal(missing))
    );
}
