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

//! Image files and how they are cut into erase sectors, program pages and words.

use crate::error::FlashError;
use crate::system_io::{fs_open_read, fs_read_fill, fs_rewind, fs_size};
use log::debug;
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const SECTOR_SIZE: u64 = 65536;
pub const PAGE_SIZE: usize = 256;
pub const WORD_SIZE: usize = 4;

/// How the number of erase sectors and program pages is derived from the image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountRule {
    /// `size / unit + 1`. One extra unit whenever the size is an exact multiple.
    #[default]
    Legacy,
    /// `ceil(size / unit)`.
    Exact,
}

impl CountRule {
    pub fn count(self, size: u64, unit: u64) -> u64 {
        match self {
            CountRule::Legacy => size / unit + 1,
            CountRule::Exact => size.div_ceil(unit),
        }
    }

    pub fn geometry(self, size: u64) -> TransferGeometry {
        TransferGeometry {
            size,
            sectors: self.count(size, SECTOR_SIZE),
            pages: self.count(size, PAGE_SIZE as u64),
        }
    }
}

impl fmt::Display for CountRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountRule::Legacy => write!(f, "legacy"),
            CountRule::Exact => write!(f, "exact"),
        }
    }
}

/// Number of 64 KiB erase sectors and 256 byte pages an image occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferGeometry {
    pub size: u64,
    pub sectors: u64,
    pub pages: u64,
}

/// An image file, read strictly sequentially from the start for every pass.
#[derive(Debug)]
pub struct FlashImage {
    file: File,
    path: PathBuf,
    size: u64,
}

impl FlashImage {
    pub fn open(path: &Path) -> Result<FlashImage, FlashError> {
        let file = fs_open_read(path)?;
        let size = fs_size(&file, path)?;
        debug!("Opened image {path:?} of {size} bytes");
        Ok(FlashImage {
            file,
            path: path.to_path_buf(),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of 32-bit words, the last one possibly partial.
    pub fn word_count(&self) -> u64 {
        self.size.div_ceil(WORD_SIZE as u64)
    }

    /// Move the cursor back to the start of the file.
    pub fn rewind(&mut self) -> Result<(), FlashError> {
        fs_rewind(&mut self.file, &self.path)
    }

    /// Fill `buf` from the cursor, zero-padding whatever lies past the end of the file.
    ///
    /// Returns the number of bytes that came from the file.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, FlashError> {
        let filled = fs_read_fill(&mut self.file, &self.path, buf)?;
        buf[filled..].fill(0);
        Ok(filled)
    }

    /// Next 4 bytes as they sit in the file, zero-padded at the end.
    pub fn read_word_bytes(&mut self) -> Result<[u8; WORD_SIZE], FlashError> {
        let mut word = [0u8; WORD_SIZE];
        self.read_chunk(&mut word)?;
        Ok(word)
    }
}
