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

//! ocflash - flash programming and warm reload for OpenCAPI FPGA cards.
//!
//! The library drives the configuration flash and the ICAP of a card through nothing but
//! its PCIe configuration space:
//! - erase, program and verify the SPI NOR flash behind the card's AXI Quad SPI core
//!   ([`update`], [`flash`], [`qspi`])
//! - stream partial bitstreams through the HWICAP keyhole ([`icap`])
//! - hand images to the on-card processor of ZynqMP based cards ([`zynqmp`])
//! - reboot the FPGA into the factory or user image without a power cycle ([`reload`])
//!
//! # Layers
//!
//! ```text
//! cli ── program::run_program / reload::reload_image / status::read_card_status
//!           │
//!           ▼
//!     FlashContext<A: RegisterAccess>   trace flags, poll policy, clock, cancel, errors
//!           │
//!           ▼
//!     PciBridge<C: ConfigSpace>          bridged QSPI / ICAP / DDR register access
//!           │
//!           ▼
//!     PciConfigFile                      /sys/bus/pci/devices/<bdf>/config
//! ```
//!
//! Every operation takes the [`context::FlashContext`] explicitly. Tests put a simulated
//! card behind [`access::RegisterAccess`] instead of a real device.

pub mod access;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod flash;
pub mod icap;
pub mod image;
pub mod poll;
pub mod program;
mod progress;
pub mod qspi;
pub mod registers;
pub mod reload;
pub mod status;
pub mod system_io;
pub mod update;
pub mod zynqmp;
