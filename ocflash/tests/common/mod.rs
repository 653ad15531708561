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


pub mod sim_card;

use ocflash::context::FlashContext;
use sim_card::SimCard;
use std::io::Write;
use tempfile::NamedTempFile;

/// Deterministic image contents that never repeat within a 64 KiB sector.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}

pub fn image_file(contents: &[u8]) -> NamedTempFile {
    image_file_named("", contents)
}

pub fn image_file_named(suffix: &str, contents: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

pub fn context(card: SimCard) -> FlashContext<SimCard> {
    FlashContext::new(card)
}
