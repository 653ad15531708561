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

//! Indirect AXI access through configuration space.
//!
//! The QSPI and ICAP cores sit behind the "flash bridge" (`FLASH_ADDR`/`FLASH_DATA`), the
//! ZynqMP DDR staging window behind the "DDR bridge" (`ZYNQ_ADDR`/`ZYNQ_DATA`). Both use
//! the same control word:
//!
//! ```text
//!  31   30   29:28    27:24   23    22:0
//! ┌────┬────┬────────┬───────┬────┬──────────┐
//! │ WR │ RD │ select │ lanes │ EXP│  offset  │
//! └────┴────┴────────┴───────┴────┴──────────┘
//! ```
//!
//! A write puts the data in the data register and then the control word with `WR` set. A
//! read writes the control word with `RD` set and picks the result up from the data
//! register. In both cases the strobe is cleared by the card once the AXI transaction has
//! completed, and nothing else may be issued on the bridge before that.

use crate::access::{ConfigSpace, RegisterAccess};
use crate::error::FlashError;
use crate::poll::{CancelToken, Clock, PollPolicy, Poller, SystemClock};
use crate::registers::{Register, Space, cfg};
use log::trace;

pub const STROBE_WRITE: u32 = 1 << 31;
pub const STROBE_READ: u32 = 1 << 30;
const SELECT_SHIFT: u32 = 28;
const LANES_SHIFT: u32 = 24;
const EXPANSION_ENABLE: u32 = 1 << 23;
const OFFSET_MASK: u32 = 0x007F_FFFF;

/// Peripheral select field for a bridged space.
fn select_bits(space: Space) -> Option<u32> {
    match space {
        Space::Config => None,
        Space::Qspi => Some(0b01),
        Space::Icap => Some(0b10),
        Space::ZynqDdr => Some(0b11),
    }
}

/// Control word for a bridged access to `reg`, without strobes.
pub fn control_word(reg: Register) -> Result<u32, FlashError> {
    let select = select_bits(reg.space).ok_or_else(|| {
        FlashError::Internal(format!("{reg} is not reachable through a bridge"))
    })?;
    let mut word = (select << SELECT_SHIFT)
        | (u32::from(reg.expansion.lanes & 0xF) << LANES_SHIFT)
        | (reg.offset & OFFSET_MASK);
    if reg.expansion.enable {
        word |= EXPANSION_ENABLE;
    }
    Ok(word)
}

/// [`RegisterAccess`] over a raw [`ConfigSpace`].
pub struct PciBridge<C: ConfigSpace> {
    config: C,
    clock: Box<dyn Clock>,
    cancel: CancelToken,
    policy: PollPolicy,
    trace: bool,
}

impl<C: ConfigSpace> PciBridge<C> {
    pub fn new(config: C) -> PciBridge<C> {
        PciBridge {
            config,
            clock: Box::new(SystemClock::new()),
            cancel: CancelToken::new(),
            policy: PollPolicy::UNBOUNDED,
            trace: false,
        }
    }

    /// Bound the strobe wait and make it observe `cancel`.
    pub fn with_poll(mut self, policy: PollPolicy, cancel: CancelToken) -> PciBridge<C> {
        self.policy = policy;
        self.cancel = cancel;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> PciBridge<C> {
        self.clock = clock;
        self
    }

    /// Log every bridged access at trace level.
    pub fn with_trace(mut self, trace: bool) -> PciBridge<C> {
        self.trace = trace;
        self
    }

    pub fn into_inner(self) -> C {
        self.config
    }

    fn bridge_registers(space: Space) -> (Register, Register) {
        match space {
            Space::ZynqDdr => (cfg::ZYNQ_ADDR, cfg::ZYNQ_DATA),
            _ => (cfg::FLASH_ADDR, cfg::FLASH_DATA),
        }
    }

    fn wait_strobes(&mut self, addr_reg: Register, reg: Register) -> Result<(), FlashError> {
        let PciBridge {
            config,
            clock,
            cancel,
            policy,
            ..
        } = self;
        Poller::new(clock.as_ref(), cancel, *policy).until(
            &format!("bridge access to {reg}"),
            || {
                let ctrl = config.read(addr_reg.offset, addr_reg.width)?;
                Ok(ctrl & (STROBE_WRITE | STROBE_READ) == 0)
            },
        )?;
        Ok(())
    }
}

impl<C: ConfigSpace> RegisterAccess for PciBridge<C> {
    fn read(&mut self, reg: Register) -> Result<u32, FlashError> {
        if reg.space == Space::Config {
            return self.config.read(reg.offset, reg.width);
        }
        let (addr_reg, data_reg) = Self::bridge_registers(reg.space);
        let word = control_word(reg)?;
        self.config
            .write(addr_reg.offset, addr_reg.width, word | STROBE_READ)?;
        self.wait_strobes(addr_reg, reg)?;
        let value = self.config.read(data_reg.offset, data_reg.width)? & reg.width.mask();
        if self.trace {
            trace!("axi_read  {reg} -> {value:#010x}");
        }
        Ok(value)
    }

    fn write(&mut self, reg: Register, value: u32) -> Result<(), FlashError> {
        if reg.space == Space::Config {
            return self.config.write(reg.offset, reg.width, value);
        }
        if self.trace {
            trace!("axi_write {reg} <- {value:#010x}");
        }
        let (addr_reg, data_reg) = Self::bridge_registers(reg.space);
        let word = control_word(reg)?;
        self.config.write(data_reg.offset, data_reg.width, value)?;
        self.config
            .write(addr_reg.offset, addr_reg.width, word | STROBE_WRITE)?;
        self.wait_strobes(addr_reg, reg)
    }
}
