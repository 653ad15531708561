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

//! Register access seams.
//!
//! Two traits split the hardware access in layers:
//! - [`ConfigSpace`] - the raw primitive: a blocking 1, 2 or 4 byte read or write at a
//!   byte offset of one PCIe function's configuration space.
//!   [`PciConfigFile`](pci_config::PciConfigFile) implements it over the sysfs `config`
//!   resource.
//! - [`RegisterAccess`] - what the engine consumes: reads and writes of typed
//!   [`Register`]s in any [`Space`](crate::registers::Space). [`PciBridge`](bridge::PciBridge)
//!   implements it on top of any [`ConfigSpace`], forwarding QSPI, ICAP and DDR accesses
//!   through the card's indirect bridges.
//!
//! Both must be synchronous and strictly ordered: a write is observed by the hardware before
//! the next access is issued. Tests substitute a simulated card at the [`RegisterAccess`]
//! level.

pub mod bridge;
pub mod pci_config;

use crate::error::FlashError;
use crate::registers::{Register, Width};

/// Width-qualified access to a PCIe configuration space.
pub trait ConfigSpace {
    fn read(&mut self, offset: u32, width: Width) -> Result<u32, FlashError>;
    fn write(&mut self, offset: u32, width: Width, value: u32) -> Result<(), FlashError>;
}

/// Access to the card's typed registers, direct or bridged.
pub trait RegisterAccess {
    fn read(&mut self, reg: Register) -> Result<u32, FlashError>;
    fn write(&mut self, reg: Register, value: u32) -> Result<(), FlashError>;
}

impl<T: ConfigSpace + ?Sized> ConfigSpace for &mut T {
    fn read(&mut self, offset: u32, width: Width) -> Result<u32, FlashError> {
        (**self).read(offset, width)
    }

    fn write(&mut self, offset: u32, width: Width, value: u32) -> Result<(), FlashError> {
        (**self).write(offset, width, value)
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for &mut T {
    fn read(&mut self, reg: Register) -> Result<u32, FlashError> {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Register, value: u32) -> Result<(), FlashError> {
        (**self).write(reg, value)
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for Box<T> {
    fn read(&mut self, reg: Register) -> Result<u32, FlashError> {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Register, value: u32) -> Result<(), FlashError> {
        (**self).write(reg, value)
    }
}
