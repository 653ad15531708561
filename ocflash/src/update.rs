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

//! Full image update of one flash device: erase, program, verify.
//!
//! The three passes walk the flash in increasing address order from the start address, in
//! step with the image file which is rewound before each pass. Verify compares every byte
//! and keeps going after a mismatch. Mismatches are returned in the [`UpdateReport`] and
//! also recorded in the context's error accumulator.

use crate::access::RegisterAccess;
use crate::context::FlashContext;
use crate::error::FlashError;
use crate::flash::{self, DeviceSelect};
use crate::image::{FlashImage, PAGE_SIZE, SECTOR_SIZE, TransferGeometry};
use crate::progress::Progress;
use log::info;
use std::fmt;
use std::time::Duration;

/// One byte that read back differently from the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub address: u32,
    pub page: u64,
    pub byte: usize,
    pub expected: u8,
    pub actual: u8,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "verify mismatch at {:#010x} (page {}, byte {}): expected {:#04x}, read {:#04x}",
            self.address, self.page, self.byte, self.expected, self.actual
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub device: DeviceSelect,
    pub geometry: TransferGeometry,
    pub erase_time: Duration,
    pub program_time: Duration,
    pub verify_time: Duration,
    pub bytes_verified: u64,
    pub mismatches: Vec<Mismatch>,
}

impl UpdateReport {
    pub fn total_time(&self) -> Duration {
        self.erase_time + self.program_time + self.verify_time
    }

    pub fn verified_ok(&self) -> bool {
        self.mismatches.is_empty()
    }
}

fn advance(address: u32, by: u64) -> Result<u32, FlashError> {
    u32::try_from(u64::from(address) + by)
        .map_err(|_| FlashError::Argument(format!("image does not fit above {address:#010x}")))
}

/// Erase, program and verify `image` on `device` starting at `start_address`.
///
/// `start_address` must be page aligned. The sector and page counts come from the
/// context's count rule.
pub fn update_image<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    image: &mut FlashImage,
    start_address: u32,
) -> Result<UpdateReport, FlashError> {
    if start_address as usize % PAGE_SIZE != 0 {
        return Err(FlashError::Argument(format!(
            "start address {start_address:#010x} is not aligned to a {PAGE_SIZE} byte page"
        )));
    }
    let geometry = ctx.count_rule().geometry(image.size());
    info!(
        "Flashing {:?} ({} bytes) to the {device} device at {start_address:#010x}",
        image.path(),
        geometry.size
    );
    info!(
        "Performing {} 64KiB sector erases and {} 256B programs/reads",
        geometry.sectors, geometry.pages
    );
    // Every address the passes will touch has to be representable.
    if geometry.sectors > 0 {
        advance(start_address, geometry.sectors * SECTOR_SIZE - 1)?;
    }

    let erase_time = erase_pass(ctx, device, start_address, &geometry)?;
    let program_time = program_pass(ctx, device, image, start_address, &geometry)?;
    let (verify_time, mismatches) = verify_pass(ctx, device, image, start_address, &geometry)?;

    let report = UpdateReport {
        device,
        geometry,
        erase_time,
        program_time,
        verify_time,
        bytes_verified: geometry.pages * PAGE_SIZE as u64,
        mismatches,
    };
    info!(
        "Total time to write the new image to the {device} device: {:.1} seconds",
        report.total_time().as_secs_f64()
    );
    Ok(report)
}

fn erase_pass<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    start_address: u32,
    geometry: &TransferGeometry,
) -> Result<Duration, FlashError> {
    let mut progress = Progress::start("Erasing sectors", "sectors", geometry.sectors);
    let mut address = start_address;
    for sector in 0..geometry.sectors {
        progress.step(sector);
        flash::write_enable(ctx, device)?;
        flash::sector_erase_64k(ctx, device, address)?;
        flash::wait_write_in_progress_clear(ctx, device)?;
        if sector + 1 < geometry.sectors {
            address = advance(address, SECTOR_SIZE)?;
        }
    }
    Ok(progress.finish())
}

fn program_pass<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    image: &mut FlashImage,
    start_address: u32,
    geometry: &TransferGeometry,
) -> Result<Duration, FlashError> {
    let mut progress = Progress::start("Writing image", "pages", geometry.pages);
    image.rewind()?;
    let mut page = [0u8; PAGE_SIZE];
    let mut address = start_address;
    for index in 0..geometry.pages {
        progress.step(index);
        image.read_chunk(&mut page)?;
        flash::write_enable(ctx, device)?;
        flash::page_program(ctx, device, address, &page)?;
        flash::wait_write_in_progress_clear(ctx, device)?;
        if index + 1 < geometry.pages {
            address = advance(address, PAGE_SIZE as u64)?;
        }
    }
    Ok(progress.finish())
}

fn verify_pass<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    image: &mut FlashImage,
    start_address: u32,
    geometry: &TransferGeometry,
) -> Result<(Duration, Vec<Mismatch>), FlashError> {
    let mut progress = Progress::start("Checking image", "pages", geometry.pages);
    image.rewind()?;
    let mut expected = [0u8; PAGE_SIZE];
    let mut actual = [0u8; PAGE_SIZE];
    let mut mismatches = Vec::new();
    let mut address = start_address;
    for index in 0..geometry.pages {
        progress.step(index);
        flash::read(ctx, device, address, &mut actual)?;
        image.read_chunk(&mut expected)?;
        for (byte, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
            if e != a {
                let mismatch = Mismatch {
                    address: address + byte as u32,
                    page: index,
                    byte,
                    expected: *e,
                    actual: *a,
                };
                ctx.record_error(format!("{device}: {mismatch}"));
                mismatches.push(mismatch);
            }
        }
        if index + 1 < geometry.pages {
            address = advance(address, PAGE_SIZE as u64)?;
        }
    }
    Ok((progress.finish(), mismatches))
}
