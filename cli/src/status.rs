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


//! Status command implementation for the ocflash CLI.
//!
//! Prints the PCI identity of the card, the FPGA IDCODE and the registers of the QSPI
//! and ICAP controllers. Nothing on the card is changed apart from the IDCODE readback
//! going through the ICAP.

use ocflash::access::RegisterAccess;
use ocflash::context::FlashContext;
use ocflash::error::FlashError;
use ocflash::status::read_card_status;

/// # Returns: `Result<String, FlashError>`
/// * `Ok(String)` - The formatted card status
/// * `Err(FlashError)` - The card has no flash controller, or a register could not be read
pub fn status_handler<A: RegisterAccess>(ctx: &mut FlashContext<A>) -> Result<String, FlashError> {
    let status = read_card_status(ctx)?;
    Ok(status.to_string().trim_end().to_string())
}
