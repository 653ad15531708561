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

//! SPI NOR flash commands (Micron MT25Q family) issued through the QSPI core.
//!
//! Addresses are sent as 3 bytes. The upper byte of a 32-bit address lives in the extended
//! address register, which is rewritten whenever an operation targets a different 16 MiB
//! segment than the previous one on the same device. Writing that register clears the write
//! enable latch, so erase and program re-enable writes after switching segments.

use crate::access::RegisterAccess;
use crate::context::FlashContext;
use crate::error::FlashError;
use crate::image::PAGE_SIZE;
use crate::qspi::transfer;
use crate::registers::qspi;
use log::trace;
use std::fmt;

pub mod cmd {
    pub const WRITE_ENABLE: u8 = 0x06;
    pub const READ_STATUS: u8 = 0x05;
    pub const READ_FLAG_STATUS: u8 = 0x70;
    pub const SECTOR_ERASE_64K: u8 = 0xD8;
    pub const SUBSECTOR_ERASE_4K: u8 = 0x20;
    pub const PAGE_PROGRAM: u8 = 0x02;
    pub const READ: u8 = 0x03;
    pub const READ_EAR: u8 = 0xC8;
    pub const WRITE_EAR: u8 = 0xC5;
    pub const READ_ID: u8 = 0x9F;
    pub const READ_NVCR: u8 = 0xB5;
    pub const READ_VCR: u8 = 0x85;
}

pub const STATUS_WRITE_IN_PROGRESS: u8 = 1 << 0;

/// One of the two flash parts on a dual-SPI card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceSelect {
    Primary,
    Secondary,
}

impl DeviceSelect {
    pub fn slave_select(self) -> u32 {
        match self {
            DeviceSelect::Primary => qspi::SSR_DEV1,
            DeviceSelect::Secondary => qspi::SSR_DEV2,
        }
    }

    fn index(self) -> usize {
        match self {
            DeviceSelect::Primary => 0,
            DeviceSelect::Secondary => 1,
        }
    }
}

impl fmt::Display for DeviceSelect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelect::Primary => write!(f, "primary"),
            DeviceSelect::Secondary => write!(f, "secondary"),
        }
    }
}

fn address_bytes(address: u32) -> [u8; 3] {
    let [_, a2, a1, a0] = address.to_be_bytes();
    [a2, a1, a0]
}

fn command<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    tx: &[u8],
    rx: &mut [u8],
) -> Result<(), FlashError> {
    transfer(ctx, device.slave_select(), tx, tx.len(), rx)
}

fn addressed<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    opcode: u8,
    address: u32,
    data: &[u8],
) -> Result<(), FlashError> {
    let [a2, a1, a0] = address_bytes(address);
    let mut tx = Vec::with_capacity(4 + data.len());
    tx.extend_from_slice(&[opcode, a2, a1, a0]);
    tx.extend_from_slice(data);
    command(ctx, device, &tx, &mut [])
}

/// Point the extended address register of `device` at the segment of `address`.
///
/// Returns `true` when the register had to be rewritten.
fn select_segment<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    address: u32,
) -> Result<bool, FlashError> {
    let segment = (address >> 24) as u8;
    if ctx.addressing.ear[device.index()] == Some(segment) {
        return Ok(false);
    }
    write_extended_address_register(ctx, device, segment)?;
    Ok(true)
}

pub fn write_enable<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
) -> Result<(), FlashError> {
    command(ctx, device, &[cmd::WRITE_ENABLE], &mut [])
}

/// Erase the 64 KiB sector containing `address`. Needs a prior [`write_enable`] and does not
/// wait for the erase to finish.
pub fn sector_erase_64k<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    address: u32,
) -> Result<(), FlashError> {
    if ctx.trace().flash {
        trace!("{device}: erase 64K sector at {address:#010x}");
    }
    if select_segment(ctx, device, address)? {
        write_enable(ctx, device)?;
    }
    addressed(ctx, device, cmd::SECTOR_ERASE_64K, address, &[])
}

/// Erase the 4 KiB subsector containing `address`. Same contract as [`sector_erase_64k`].
pub fn subsector_erase_4k<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    address: u32,
) -> Result<(), FlashError> {
    if ctx.trace().flash {
        trace!("{device}: erase 4K subsector at {address:#010x}");
    }
    if select_segment(ctx, device, address)? {
        write_enable(ctx, device)?;
    }
    addressed(ctx, device, cmd::SUBSECTOR_ERASE_4K, address, &[])
}

/// Program up to one page at a page-aligned `address`. Needs a prior [`write_enable`].
pub fn page_program<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    address: u32,
    data: &[u8],
) -> Result<(), FlashError> {
    if data.len() > PAGE_SIZE {
        return Err(FlashError::Argument(format!(
            "page program of {} bytes exceeds the {PAGE_SIZE} byte page",
            data.len()
        )));
    }
    if address as usize % PAGE_SIZE != 0 {
        return Err(FlashError::Argument(format!(
            "page program address {address:#010x} is not page aligned"
        )));
    }
    if ctx.trace().flash {
        trace!("{device}: program {} bytes at {address:#010x}", data.len());
    }
    if select_segment(ctx, device, address)? {
        write_enable(ctx, device)?;
    }
    addressed(ctx, device, cmd::PAGE_PROGRAM, address, data)
}

/// Read `buf.len()` bytes starting at `address`.
pub fn read<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    address: u32,
    buf: &mut [u8],
) -> Result<(), FlashError> {
    if ctx.trace().flash {
        trace!("{device}: read {} bytes at {address:#010x}", buf.len());
    }
    select_segment(ctx, device, address)?;
    let [a2, a1, a0] = address_bytes(address);
    command(ctx, device, &[cmd::READ, a2, a1, a0], buf)
}

pub fn read_status<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
) -> Result<u8, FlashError> {
    let mut status = [0u8; 1];
    command(ctx, device, &[cmd::READ_STATUS], &mut status)?;
    Ok(status[0])
}

/// Spin on the status register until the write-in-progress bit clears.
pub fn wait_write_in_progress_clear<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
) -> Result<(), FlashError> {
    ctx.poll(&format!("{device} flash write in progress to clear"), |ctx| {
        Ok(read_status(ctx, device)? & STATUS_WRITE_IN_PROGRESS == 0)
    })?;
    Ok(())
}

pub fn read_extended_address_register<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
) -> Result<u8, FlashError> {
    let mut ear = [0u8; 1];
    command(ctx, device, &[cmd::READ_EAR], &mut ear)?;
    Ok(ear[0])
}

/// Enable writes and set the extended address register to `value`.
pub fn write_extended_address_register<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
    value: u8,
) -> Result<(), FlashError> {
    if ctx.trace().flash {
        trace!("{device}: extended address register <- {value:#04x}");
    }
    write_enable(ctx, device)?;
    command(ctx, device, &[cmd::WRITE_EAR, value], &mut [])?;
    ctx.addressing.ear[device.index()] = Some(value);
    Ok(())
}

/// Bring `device` to a known addressing state: segment 0.
pub fn setup<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
) -> Result<(), FlashError> {
    write_extended_address_register(ctx, device, 0)
}

/// Identification and configuration registers of one flash part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashRegisters {
    pub jedec_id: [u8; 3],
    pub status: u8,
    pub flag_status: u8,
    pub extended_address: u8,
    pub nonvolatile_config: u16,
    pub volatile_config: u8,
}

impl fmt::Display for FlashRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [manufacturer, kind, capacity] = self.jedec_id;
        writeln!(
            f,
            "JEDEC ID: manufacturer {manufacturer:#04x} type {kind:#04x} capacity {capacity:#04x}"
        )?;
        writeln!(f, "Status register:                {:#04x}", self.status)?;
        writeln!(f, "Flag status register:           {:#04x}", self.flag_status)?;
        writeln!(f, "Extended address register:      {:#04x}", self.extended_address)?;
        writeln!(f, "Nonvolatile configuration:      {:#06x}", self.nonvolatile_config)?;
        write!(f, "Volatile configuration:         {:#04x}", self.volatile_config)
    }
}

pub fn read_registers<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    device: DeviceSelect,
) -> Result<FlashRegisters, FlashError> {
    let mut jedec_id = [0u8; 3];
    command(ctx, device, &[cmd::READ_ID], &mut jedec_id)?;
    let status = read_status(ctx, device)?;
    let mut flag = [0u8; 1];
    command(ctx, device, &[cmd::READ_FLAG_STATUS], &mut flag)?;
    let extended_address = read_extended_address_register(ctx, device)?;
    let mut nvcr = [0u8; 2];
    command(ctx, device, &[cmd::READ_NVCR], &mut nvcr)?;
    let mut vcr = [0u8; 1];
    command(ctx, device, &[cmd::READ_VCR], &mut vcr)?;
    Ok(FlashRegisters {
        jedec_id,
        status,
        flag_status: flag[0],
        extended_address,
        nonvolatile_config: u16::from_le_bytes(nvcr),
        volatile_config: vcr[0],
    })
}
