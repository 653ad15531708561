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

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FlashError {
    #[error("FlashError::Argument: {0}")]
    Argument(String),
    #[error("FlashError::IOOpen: An IO error occurred when opening {file:?}: {e}")]
    IOOpen { file: PathBuf, e: std::io::Error },
    #[error("FlashError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("FlashError::IOWrite: An IO error occurred when writing to {file:?}: {e}")]
    IOWrite { file: PathBuf, e: std::io::Error },
    #[error(
        "FlashError::ConfigSpace: {width}-byte access at config offset {offset:#05x} failed: {e}"
    )]
    ConfigSpace {
        offset: u32,
        width: u8,
        e: std::io::Error,
    },
    #[error(
        "FlashError::UnsupportedCard: vendor {vendor:#06x} device {device:#06x} should not be flashed with this tool"
    )]
    UnsupportedCard { vendor: u16, device: u16 },
    #[error("FlashError::PollTimeout: gave up waiting for {what} after {waited:?}")]
    PollTimeout { what: String, waited: Duration },
    #[error("FlashError::Cancelled: cancelled while waiting for {what}")]
    Cancelled { what: String },
    #[error("FlashError::Hardware: {0}")]
    Hardware(String),
    #[error("FlashError::TomlDe: Failed to parse config {file:?}: {e}")]
    TomlDe {
        file: PathBuf,
        e: toml::de::Error,
    },
    #[error("FlashError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}
