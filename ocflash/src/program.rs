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

//! One entry point for every way of getting an image onto a card.

use crate::access::RegisterAccess;
use crate::context::FlashContext;
use crate::device::TransferPath;
use crate::error::FlashError;
use crate::flash::{self, DeviceSelect};
use crate::icap::{self, PartialReport};
use crate::image::FlashImage;
use crate::qspi;
use crate::update::{UpdateReport, update_image};
use crate::zynqmp::{ZynqReport, load_zynqmp};
use log::{debug, info};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramOptions {
    /// Flash address of the first image byte, the same on both parts of a dual-SPI card.
    pub start_address: u32,
    /// Log the controller and flash registers at debug level before programming.
    pub dump_registers: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgramSummary {
    Flash(Vec<UpdateReport>),
    Partial(PartialReport),
    ZynqMp(ZynqReport),
}

impl ProgramSummary {
    /// Number of bytes that did not verify. Always 0 on paths without a verify pass.
    pub fn mismatch_count(&self) -> usize {
        match self {
            ProgramSummary::Flash(reports) => reports.iter().map(|r| r.mismatches.len()).sum(),
            ProgramSummary::Partial(_) | ProgramSummary::ZynqMp(_) => 0,
        }
    }
}

fn dump_controllers<A: RegisterAccess>(ctx: &mut FlashContext<A>) -> Result<(), FlashError> {
    debug!("QSPI registers:\n{}", qspi::read_registers(ctx)?);
    debug!("ICAP registers:\n{}", icap::read_registers(ctx)?);
    Ok(())
}

fn program_device<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    file: &Path,
    options: &ProgramOptions,
) -> Result<UpdateReport, FlashError> {
    let mut image = FlashImage::open(file)?;
    flash::setup(ctx, device)?;
    if options.dump_registers {
        debug!("{device} flash registers:\n{}", flash::read_registers(ctx, device)?);
    }
    update_image(ctx, device, &mut image, options.start_address)
}

/// Run the transfer selected for the card.
pub fn run_program<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    path: &TransferPath,
    options: &ProgramOptions,
) -> Result<ProgramSummary, FlashError> {
    info!("Programming through {path}");
    match path {
        TransferPath::DualSpi { primary, secondary } => {
            qspi::setup_qspi(ctx)?;
            if options.dump_registers {
                dump_controllers(ctx)?;
            }
            let first = program_device(ctx, DeviceSelect::Primary, primary, options)?;
            let second = program_device(ctx, DeviceSelect::Secondary, secondary, options)?;
            Ok(ProgramSummary::Flash(vec![first, second]))
        }
        TransferPath::SingleSpi { primary } => {
            qspi::setup_qspi(ctx)?;
            if options.dump_registers {
                dump_controllers(ctx)?;
            }
            let report = program_device(ctx, DeviceSelect::Primary, primary, options)?;
            Ok(ProgramSummary::Flash(vec![report]))
        }
        TransferPath::PartialReconfig { image } => {
            let mut image = FlashImage::open(image)?;
            if options.dump_registers {
                icap::wait_end_of_startup(ctx)?;
                dump_controllers(ctx)?;
                icap::read_idcode(ctx)?;
            }
            Ok(ProgramSummary::Partial(icap::load_partial(ctx, &mut image)?))
        }
        TransferPath::ZynqMpDdr { image } => {
            info!("Card with ZynqMP detected");
            let mut image = FlashImage::open(image)?;
            Ok(ProgramSummary::ZynqMp(load_zynqmp(ctx, &mut image)?))
        }
    }
}
