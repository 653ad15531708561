// This file is part of ocflash, a tool to program FPGA configuration flash and reload FPGA images over PCIe configuration space.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// ocflash is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// ocflash is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Error Wrapping File System I/O Helpers
//!
//! Thin wrappers around the standard library file operations used by the tool, converting
//! failures into [`FlashError`] variants that carry the offending path. All functions log
//! at trace level.

use crate::error::FlashError;
use log::trace;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Read the contents of a file to a String.
///
/// # Returns: `Result<String, FlashError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(FlashError::IORead)` - If the file cannot be read
pub fn fs_read(file_path: &Path) -> Result<String, FlashError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf: String = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(FlashError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Open a file read-only, e.g. an image to be streamed to the card.
pub fn fs_open_read(file_path: &Path) -> Result<File, FlashError> {
    trace!("Opening {file_path:?} read-only");
    OpenOptions::new()
        .read(true)
        .open(file_path)
        .map_err(|e| FlashError::IOOpen {
            file: file_path.into(),
            e,
        })
}

/// Open an existing file for reading and writing, e.g. a PCIe `config` resource.
pub fn fs_open_rw(file_path: &Path) -> Result<File, FlashError> {
    trace!("Opening {file_path:?} read/write");
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(file_path)
        .map_err(|e| FlashError::IOOpen {
            file: file_path.into(),
            e,
        })
}

/// Size in bytes of an open file.
pub fn fs_size(file: &File, file_path: &Path) -> Result<u64, FlashError> {
    file.metadata()
        .map(|m| m.len())
        .map_err(|e| FlashError::IORead {
            file: file_path.into(),
            e,
        })
}

/// Seek back to the start of the file.
pub fn fs_rewind(file: &mut File, file_path: &Path) -> Result<(), FlashError> {
    trace!("Rewinding {file_path:?}");
    file.seek(SeekFrom::Start(0))
        .map(|_| ())
        .map_err(|e| FlashError::IORead {
            file: file_path.into(),
            e,
        })
}

/// Fill as much of `buf` as the file still has, returning the number of bytes read.
///
/// Unlike a single `read` call this keeps reading until `buf` is full or end of file is
/// reached, so a short count always means end of file.
pub fn fs_read_fill(file: &mut File, file_path: &Path, buf: &mut [u8]) -> Result<usize, FlashError> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(FlashError::IORead {
                    file: file_path.into(),
                    e,
                });
            }
        }
    }
    Ok(filled)
}
