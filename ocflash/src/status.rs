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

use crate::access::RegisterAccess;
use crate::context::FlashContext;
use crate::device::{CardIdentity, identify, require_supported};
use crate::error::FlashError;
use crate::icap;
use crate::qspi;
use crate::registers::RegisterDump;
use std::fmt;

/// Everything `status` reports about a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardStatus {
    pub identity: CardIdentity,
    pub qspi: RegisterDump,
    pub icap: RegisterDump,
    pub idcode: u32,
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---- CARD ----")?;
        writeln!(f, "{}", self.identity)?;
        writeln!(f, "FPGA IDCODE: {:#010x}", self.idcode)?;
        writeln!(f, "\n---- QSPI ----")?;
        write!(f, "{}", self.qspi)?;
        writeln!(f, "\n---- ICAP ----")?;
        write!(f, "{}", self.icap)
    }
}

/// Collect the identity, controller registers and IDCODE of the card.
///
/// Cards without the flash controller are refused before any bridged access.
pub fn read_card_status<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
) -> Result<CardStatus, FlashError> {
    let identity = identify(ctx.access_mut())?;
    require_supported(&identity)?;
    let qspi = qspi::read_registers(ctx)?;
    let icap = icap::read_registers(ctx)?;
    let idcode = icap::read_idcode(ctx)?;
    Ok(CardStatus {
        identity,
        qspi,
        icap,
        idcode,
    })
}
