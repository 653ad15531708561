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

//! Typed register map of the card.
//!
//! Every register the engine touches is a [`Register`]: an address space, an offset inside
//! that space, an access width and an expansion selector. The fixed registers are `const`
//! items built with [`Register::new`], which rejects misaligned or out-of-window offsets at
//! compile time. The only addresses computed at runtime are the DDR staging offsets, which
//! go through [`Register::ddr`] and are checked against the same window.
//!
//! # Address spaces
//!
//! ```text
//! Space     Reached through            Window   Contents
//! ───────── ────────────────────────── ──────── ─────────────────────────────────
//! Config    direct config-space access 0x1000   IDs, bridge and control registers
//! Qspi      flash bridge, select 01    0x80     Xilinx AXI Quad SPI core
//! Icap      flash bridge, select 10    0x120    Xilinx AXI HWICAP core
//! ZynqDdr   DDR bridge,   select 11    0x2000   staging buffer + acknowledgement
//! ```

use crate::error::FlashError;
use std::fmt;

/// Address space a [`Register`] lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Space {
    Config,
    Qspi,
    Icap,
    ZynqDdr,
}

impl Space {
    /// Size in bytes of the addressable window of this space.
    pub const fn window(self) -> u32 {
        match self {
            Space::Config => 0x1000,
            Space::Qspi => 0x80,
            Space::Icap => 0x120,
            Space::ZynqDdr => 0x2000,
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Space::Config => "CFG",
            Space::Qspi => "QSPI",
            Space::Icap => "ICAP",
            Space::ZynqDdr => "DDR",
        })
    }
}

/// Access width of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Byte,
    Half,
    Word,
}

impl Width {
    pub const fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
        }
    }

    /// Mask of the value bits this width carries.
    pub const fn mask(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Half => 0xFFFF,
            Width::Word => 0xFFFF_FFFF,
        }
    }
}

/// Expansion selector forwarded to the bridge with every indirect access.
///
/// `lanes` is the byte-lane enable mask, `enable` turns on the bridge's expansion mode.
/// Every register used today is accessed with expansion off on all four lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Expansion {
    pub enable: bool,
    pub lanes: u8,
}

impl Expansion {
    pub const OFF_0123: Expansion = Expansion {
        enable: false,
        lanes: 0b1111,
    };
}

/// A single register address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub space: Space,
    pub offset: u32,
    pub width: Width,
    pub expansion: Expansion,
}

impl Register {
    /// Build a register address, panicking (at compile time for `const` items) when the
    /// offset is misaligned for `width` or does not fit the window of `space`.
    pub const fn new(space: Space, offset: u32, width: Width) -> Register {
        assert!(
            offset % width.bytes() == 0,
            "register offset is not aligned to its width"
        );
        assert!(
            offset + width.bytes() <= space.window(),
            "register offset is outside of its address space"
        );
        Register {
            space,
            offset,
            width,
            expansion: Expansion::OFF_0123,
        }
    }

    pub const fn config(offset: u32) -> Register {
        Register::new(Space::Config, offset, Width::Word)
    }

    pub const fn qspi(offset: u32) -> Register {
        Register::new(Space::Qspi, offset, Width::Word)
    }

    pub const fn icap(offset: u32) -> Register {
        Register::new(Space::Icap, offset, Width::Word)
    }

    /// A word in the DDR staging window. Used for the auto-incrementing staging address, so
    /// it is checked at runtime instead of panicking.
    pub fn ddr(offset: u32) -> Result<Register, FlashError> {
        Register::checked(Space::ZynqDdr, offset, Width::Word)
    }

    /// Same as [`Register::new`], returning an error instead of panicking.
    pub fn checked(space: Space, offset: u32, width: Width) -> Result<Register, FlashError> {
        let in_window = offset
            .checked_add(width.bytes())
            .is_some_and(|end| end <= space.window());
        if offset % width.bytes() != 0 || !in_window {
            return Err(FlashError::Argument(format!(
                "{space} offset {offset:#x} is not a valid {}-byte register",
                width.bytes()
            )));
        }
        Ok(Register {
            space,
            offset,
            width,
            expansion: Expansion::OFF_0123,
        })
    }

    /// The register `delta` bytes after this one, in the same space.
    pub fn offset_by(self, delta: u32) -> Result<Register, FlashError> {
        let offset = self.offset.checked_add(delta).ok_or_else(|| {
            FlashError::Argument(format!("{} offset overflow", self.space))
        })?;
        Register::checked(self.space, offset, self.width)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{:#05x}]", self.space, self.offset)
    }
}

/// Named register values read for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDump {
    pub space: Space,
    pub values: Vec<(&'static str, u32)>,
}

impl RegisterDump {
    pub fn get(&self, name: &str) -> Option<u32> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }
}

impl fmt::Display for RegisterDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.values {
            writeln!(f, "{:<4} {name:<8} = {value:#010x}", self.space)?;
        }
        Ok(())
    }
}

/// PCIe configuration space.
pub mod cfg {
    use super::{Register, Space, Width};

    /// [15:0] vendor ID, [31:16] device ID.
    pub const DEVID: Register = Register::config(0x000);
    /// [31:16] subsystem ID.
    pub const SUBSYS: Register = Register::config(0x02C);
    pub const FLASH_ADDR: Register = Register::config(0x460);
    pub const FLASH_DATA: Register = Register::config(0x464);
    pub const ZYNQ_ADDR: Register = Register::config(0x630);
    pub const ZYNQ_DATA: Register = Register::config(0x634);
    /// Soft-processor control on ZynqMP cards.
    pub const ZYNQ_CTRL: Register = Register::config(0x638);

    pub const ZYNQ_CTRL_RUN: u32 = 0x0000_0002;
    pub const ZYNQ_CTRL_IDLE: u32 = 0x0000_0000;
}

/// Xilinx AXI Quad SPI core (standard mode, FIFO enabled).
pub mod qspi {
    use super::Register;

    pub const DGIER: Register = Register::qspi(0x1C);
    pub const IPISR: Register = Register::qspi(0x20);
    pub const IPIER: Register = Register::qspi(0x28);
    pub const SRR: Register = Register::qspi(0x40);
    pub const SPICR: Register = Register::qspi(0x60);
    pub const SPISR: Register = Register::qspi(0x64);
    pub const SPIDTR: Register = Register::qspi(0x68);
    pub const SPIDRR: Register = Register::qspi(0x6C);
    pub const SPISSR: Register = Register::qspi(0x70);
    pub const TX_OCCUPANCY: Register = Register::qspi(0x74);
    pub const RX_OCCUPANCY: Register = Register::qspi(0x78);

    pub const SRR_RESET: u32 = 0x0000_000A;

    pub const SPICR_ENABLE: u32 = 1 << 1;
    pub const SPICR_MASTER: u32 = 1 << 2;
    pub const SPICR_TX_FIFO_RESET: u32 = 1 << 5;
    pub const SPICR_RX_FIFO_RESET: u32 = 1 << 6;
    pub const SPICR_MANUAL_SS: u32 = 1 << 7;
    pub const SPICR_INHIBIT: u32 = 1 << 8;
    /// Master, enabled, manual slave select, transactions inhibited.
    pub const SPICR_IDLE: u32 = SPICR_ENABLE | SPICR_MASTER | SPICR_MANUAL_SS | SPICR_INHIBIT;
    /// Same as [`SPICR_IDLE`] with both FIFOs reset (0x1E6).
    pub const SPICR_SETUP: u32 = SPICR_IDLE | SPICR_TX_FIFO_RESET | SPICR_RX_FIFO_RESET;
    pub const SPICR_RUN: u32 = SPICR_IDLE & !SPICR_INHIBIT;

    pub const SPISR_RX_EMPTY: u32 = 1 << 0;
    pub const SPISR_TX_EMPTY: u32 = 1 << 2;

    pub const SSR_DEV1: u32 = 0xFFFF_FFFE;
    pub const SSR_DEV2: u32 = 0xFFFF_FFFD;
    pub const SSR_NONE: u32 = 0xFFFF_FFFF;

    pub static MAP: &[(&str, Register)] = &[
        ("SPICR", SPICR),
        ("SPISR", SPISR),
        ("SPISSR", SPISSR),
        ("TX_OCC", TX_OCCUPANCY),
        ("RX_OCC", RX_OCCUPANCY),
        ("DGIER", DGIER),
        ("IPISR", IPISR),
        ("IPIER", IPIER),
    ];
}

/// Xilinx AXI HWICAP core.
pub mod icap {
    use super::Register;

    pub const GIER: Register = Register::icap(0x1C);
    pub const ISR: Register = Register::icap(0x20);
    pub const IER: Register = Register::icap(0x28);
    /// Write FIFO keyhole.
    pub const WF: Register = Register::icap(0x100);
    /// Read FIFO keyhole.
    pub const RF: Register = Register::icap(0x104);
    pub const SZ: Register = Register::icap(0x108);
    pub const CR: Register = Register::icap(0x10C);
    pub const SR: Register = Register::icap(0x110);
    /// Write FIFO vacancy.
    pub const WFV: Register = Register::icap(0x114);
    /// Read FIFO occupancy.
    pub const RFO: Register = Register::icap(0x118);
    pub const ASR: Register = Register::icap(0x11C);

    pub const CR_CLEAR: u32 = 0;
    pub const CR_WRITE: u32 = 1 << 0;
    pub const CR_READ: u32 = 1 << 1;
    pub const CR_FIFO_CLEAR: u32 = 1 << 2;
    pub const CR_SW_RESET: u32 = 1 << 3;

    /// DONE | EOS: ICAP enabled and end of startup reached.
    pub const SR_ICAPEN_EOS: u32 = 0x5;

    pub static MAP: &[(&str, Register)] = &[
        ("GIER", GIER),
        ("ISR", ISR),
        ("IER", IER),
        ("SZ", SZ),
        ("CR", CR),
        ("SR", SR),
        ("WFV", WFV),
        ("RFO", RFO),
        ("ASR", ASR),
    ];
}

/// DDR staging window on ZynqMP cards.
pub mod ddr {
    use super::{Register, Space, Width};

    pub const DATA_BASE: Register = Register::new(Space::ZynqDdr, 0x0000, Width::Word);
    pub const ACK: Register = Register::new(Space::ZynqDdr, 0x1000, Width::Word);

    pub const ACK_BUSY: u32 = 0x0000_0001;
    pub const ACK_NEW_DATA: u32 = 0x0000_0001;
    pub const ACK_DONE: u32 = 0x0000_00FF;
}
