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

//! Configuration space backed by the sysfs `config` resource of a PCIe function.
//!
//! A sysfs map of the relevant part of a PCIe function:
//! ```text
//! /sys/bus/pci/devices/0000:01:00.0
//! ├── config        <- read/written here, little-endian, positioned I/O
//! ├── device
//! ├── subsystem_device
//! ├── vendor
//! └── ...
//! ```

use crate::access::ConfigSpace;
use crate::error::FlashError;
use crate::registers::Width;
use crate::system_io::fs_open_rw;
use log::trace;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// An open `config` resource. Opened once per run and used for every access.
#[derive(Debug)]
pub struct PciConfigFile {
    file: File,
    path: PathBuf,
    trace: bool,
}

impl PciConfigFile {
    /// Open `path` for reading and writing.
    ///
    /// # Returns: `Result<PciConfigFile, FlashError>`
    /// * `Ok(PciConfigFile)` - Ready for access
    /// * `Err(FlashError::IOOpen)` - The resource does not exist or permissions are missing
    pub fn open(path: &Path) -> Result<PciConfigFile, FlashError> {
        Ok(PciConfigFile {
            file: fs_open_rw(path)?,
            path: path.to_path_buf(),
            trace: false,
        })
    }

    /// Log every access at trace level.
    pub fn with_trace(mut self, trace: bool) -> PciConfigFile {
        self.trace = trace;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSpace for PciConfigFile {
    fn read(&mut self, offset: u32, width: Width) -> Result<u32, FlashError> {
        let mut buf = [0u8; 4];
        let len = width.bytes() as usize;
        self.file
            .read_exact_at(&mut buf[..len], offset.into())
            .map_err(|e| FlashError::ConfigSpace {
                offset,
                width: len as u8,
                e,
            })?;
        let value = u32::from_le_bytes(buf);
        if self.trace {
            trace!("config_read  {offset:#05x} ({len}B) -> {value:#010x}");
        }
        Ok(value)
    }

    fn write(&mut self, offset: u32, width: Width, value: u32) -> Result<(), FlashError> {
        let len = width.bytes() as usize;
        if self.trace {
            trace!("config_write {offset:#05x} ({len}B) <- {value:#010x}");
        }
        let bytes = (value & width.mask()).to_le_bytes();
        self.file
            .write_all_at(&bytes[..len], offset.into())
            .map_err(|e| FlashError::ConfigSpace {
                offset,
                width: len as u8,
                e,
            })
    }
}
