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


//! A card that lives in memory.
//!
//! [`SimCard`] answers register accesses the way the real card does closely enough for the
//! engine to run every transfer path end to end: the QSPI core with its FIFOs and two NOR
//! flash parts behind it, the HWICAP core, the ZynqMP staging window and the identity
//! registers of the config space.

use ocflash::access::RegisterAccess;
use ocflash::error::FlashError;
use ocflash::flash::{STATUS_WRITE_IN_PROGRESS, cmd};
use ocflash::registers::{Register, Space, cfg, ddr, icap, qspi};
use std::collections::{HashMap, VecDeque};

pub const JEDEC_ID: [u8; 3] = [0x20, 0xBA, 0x20];
pub const IDCODE: u32 = 0x04B3_1093;
const STATUS_WRITE_ENABLED: u8 = 1 << 1;

/// One command as the flash part saw it, with the EAR already applied to the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashCommand {
    pub opcode: u8,
    pub address: Option<u32>,
}

#[derive(Debug, Default)]
pub struct SimFlash {
    memory: HashMap<u32, u8>,
    /// Bytes that read back with these bits flipped.
    pub corrupt: HashMap<u32, u8>,
    pub ear: u8,
    pub write_enabled: bool,
    /// Status reads that report write in progress after an erase or program.
    pub busy_reads: u32,
    busy_left: u32,
    /// Erase, program or EAR writes sent without the write enable latch set.
    pub rejected: u32,
    pub log: Vec<FlashCommand>,
}

impl SimFlash {
    pub fn byte(&self, address: u32) -> u8 {
        let stored = self.memory.get(&address).copied().unwrap_or(0xFF);
        stored ^ self.corrupt.get(&address).copied().unwrap_or(0)
    }

    pub fn bytes(&self, address: u32, len: usize) -> Vec<u8> {
        (0..len as u32).map(|i| self.byte(address + i)).collect()
    }

    pub fn count(&self, opcode: u8) -> usize {
        self.log.iter().filter(|c| c.opcode == opcode).count()
    }

    fn full_address(&self, bytes: &[u8]) -> u32 {
        u32::from_be_bytes([self.ear, bytes[0], bytes[1], bytes[2]])
    }

    fn status(&mut self) -> u8 {
        let mut status = 0;
        if self.write_enabled {
            status |= STATUS_WRITE_ENABLED;
        }
        if self.busy_left > 0 {
            self.busy_left -= 1;
            status |= STATUS_WRITE_IN_PROGRESS;
        }
        status
    }

    fn take_write_enable(&mut self) -> bool {
        if std::mem::take(&mut self.write_enabled) {
            true
        } else {
            self.rejected += 1;
            false
        }
    }

    fn erase(&mut self, address: u32, size: u32) {
        let start = address & !(size - 1);
        self.memory
            .retain(|a, _| !(start..start.saturating_add(size)).contains(a));
        self.busy_left = self.busy_reads;
    }

    fn program(&mut self, address: u32, data: &[u8]) {
        let page = address & !0xFF;
        for (i, byte) in data.iter().enumerate() {
            let a = page | (address.wrapping_add(i as u32) & 0xFF);
            *self.memory.entry(a).or_insert(0xFF) &= byte;
        }
        self.busy_left = self.busy_reads;
    }

    /// Response to the byte at `position` of the transaction whose bytes so far are `sent`.
    fn respond(&mut self, sent: &[u8], position: usize) -> u8 {
        match sent[0] {
            cmd::READ if position >= 4 => {
                let address = self.full_address(&sent[1..4]);
                self.byte(address.wrapping_add((position - 4) as u32))
            }
            cmd::READ_STATUS if position >= 1 => self.status(),
            cmd::READ_FLAG_STATUS if position >= 1 => 0x80,
            cmd::READ_EAR if position >= 1 => self.ear,
            cmd::READ_ID if (1..=3).contains(&position) => JEDEC_ID[position - 1],
            cmd::READ_NVCR if position >= 1 => 0xFF,
            cmd::READ_VCR if position >= 1 => 0xFB,
            _ => 0,
        }
    }

    fn finish(&mut self, bytes: &[u8]) {
        let opcode = bytes[0];
        let address = match opcode {
            cmd::READ | cmd::PAGE_PROGRAM | cmd::SECTOR_ERASE_64K | cmd::SUBSECTOR_ERASE_4K
                if bytes.len() >= 4 =>
            {
                Some(self.full_address(&bytes[1..4]))
            }
            _ => None,
        };
        self.log.push(FlashCommand { opcode, address });
        match (opcode, address) {
            (cmd::WRITE_ENABLE, _) => self.write_enabled = true,
            (cmd::WRITE_EAR, _) => {
                if self.take_write_enable() {
                    self.ear = bytes.get(1).copied().unwrap_or(0);
                }
            }
            (cmd::SECTOR_ERASE_64K, Some(a)) => {
                if self.take_write_enable() {
                    self.erase(a, 0x1_0000);
                }
            }
            (cmd::SUBSECTOR_ERASE_4K, Some(a)) => {
                if self.take_write_enable() {
                    self.erase(a, 0x1000);
                }
            }
            (cmd::PAGE_PROGRAM, Some(a)) => {
                if self.take_write_enable() {
                    self.program(a, &bytes[4..]);
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug)]
pub struct SimIcap {
    /// Size of the write FIFO.
    pub capacity: u32,
    fifo: Vec<u32>,
    /// Every word handed to the ICAP primitive, in order.
    pub committed: Vec<u32>,
    pub commits: usize,
    pub keyhole_writes: usize,
    /// CR reads that still show the last command running.
    pub busy_reads: u32,
    busy_left: u32,
    busy_value: u32,
    /// SR reads before end of startup is reported, `None` for never.
    pub startup_reads: Option<u32>,
    pub decoupled: bool,
    /// Times the dynamic region was coupled again after a partial load.
    pub recouplings: usize,
    read_fifo: VecDeque<u32>,
}

impl Default for SimIcap {
    fn default() -> Self {
        SimIcap {
            capacity: 64,
            fifo: Vec::new(),
            committed: Vec::new(),
            commits: 0,
            keyhole_writes: 0,
            busy_reads: 0,
            busy_left: 0,
            busy_value: 0,
            startup_reads: Some(0),
            decoupled: false,
            recouplings: 0,
            read_fifo: VecDeque::new(),
        }
    }
}

impl SimIcap {
    fn start(&mut self, value: u32) {
        self.busy_left = self.busy_reads;
        self.busy_value = value;
    }

    fn read(&mut self, reg: Register) -> u32 {
        match reg {
            icap::CR => {
                if self.busy_left > 0 {
                    self.busy_left -= 1;
                    self.busy_value
                } else {
                    icap::CR_CLEAR
                }
            }
            icap::SR => match self.startup_reads.as_mut() {
                Some(0) => icap::SR_ICAPEN_EOS,
                Some(n) => {
                    *n -= 1;
                    0
                }
                None => 0,
            },
            icap::WFV => self.capacity - self.fifo.len() as u32,
            icap::RFO => self.read_fifo.len() as u32,
            icap::RF => self.read_fifo.pop_front().unwrap_or(0),
            _ => 0,
        }
    }

    fn write(&mut self, reg: Register, value: u32) -> Result<(), FlashError> {
        match reg {
            icap::WF => {
                if self.fifo.len() as u32 >= self.capacity {
                    return Err(FlashError::Hardware("ICAP write FIFO overflow".into()));
                }
                self.decoupled = true;
                self.keyhole_writes += 1;
                self.fifo.push(value);
            }
            icap::CR => match value {
                icap::CR_WRITE => {
                    self.committed.append(&mut self.fifo);
                    self.commits += 1;
                    self.start(value);
                }
                icap::CR_READ => {
                    self.read_fifo.push_back(IDCODE);
                    self.start(value);
                }
                icap::CR_SW_RESET | icap::CR_FIFO_CLEAR => {
                    self.fifo.clear();
                    self.read_fifo.clear();
                    self.start(value);
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SimZynq {
    window: HashMap<u32, u32>,
    ack: u32,
    /// ACK reads that stay busy after a block was handed over.
    pub busy_reads: u32,
    busy_left: u32,
    /// Every block received, concatenated.
    pub received: Vec<u8>,
    pub blocks: usize,
    pub done: bool,
    /// Values written to the processor control register.
    pub control: Vec<u32>,
}

impl SimZynq {
    fn read_ack(&mut self) -> u32 {
        if self.ack == ddr::ACK_NEW_DATA {
            if self.busy_left > 0 {
                self.busy_left -= 1;
            } else {
                self.ack = 0;
            }
        }
        self.ack
    }

    fn write(&mut self, reg: Register, value: u32) -> Result<(), FlashError> {
        if reg == ddr::ACK {
            match value {
                ddr::ACK_NEW_DATA => {
                    if self.ack == ddr::ACK_NEW_DATA {
                        return Err(FlashError::Hardware("block handed over while busy".into()));
                    }
                    for offset in (0..0x100).step_by(4) {
                        let word = self.window.get(&offset).copied().unwrap_or(0);
                        self.received.extend_from_slice(&word.to_le_bytes());
                    }
                    self.blocks += 1;
                    self.busy_left = self.busy_reads;
                }
                ddr::ACK_DONE => self.done = true,
                _ => {}
            }
            self.ack = value;
        } else {
            self.window.insert(reg.offset, value);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimCard {
    pub vendor: u16,
    pub device: u16,
    pub subsystem: u16,
    pub flash: [SimFlash; 2],
    pub icap: SimIcap,
    pub zynq: SimZynq,
    pub fifo_depth: usize,
    pub(crate) selected: Option<usize>,
    pub(crate) current: Vec<u8>,
    pub(crate) tx: VecDeque<u8>,
    pub(crate) rx: VecDeque<u8>,
    pub(crate) spicr: u32,
}

impl Default for SimCard {
    fn default() -> Self {
        SimCard {
            vendor: 0x1014,
            device: 0x062B,
            subsystem: 0x060F,
            flash: [SimFlash::default(), SimFlash::default()],
            icap: SimIcap::default(),
            zynq: SimZynq::default(),
            fifo_depth: 256,
            selected: None,
            current: Vec::new(),
            tx: VecDeque::new(),
            rx: VecDeque::new(),
            spicr: 0,
        }
    }
}

impl SimCard {
    pub fn with_subsystem(subsystem: u16) -> SimCard {
        SimCard {
            subsystem,
            ..SimCard::default()
        }
    }

    fn shift_out(&mut self) {
        while let Some(byte) = self.tx.pop_front() {
            let response = match self.selected {
                Some(device) => {
                    self.current.push(byte);
                    let position = self.current.len() - 1;
                    self.flash[device].respond(&self.current, position)
                }
                None => 0xFF,
            };
            self.rx.push_back(response);
        }
    }

    fn select(&mut self, value: u32) -> Result<(), FlashError> {
        if let Some(device) = self.selected.take() {
            let bytes = std::mem::take(&mut self.current);
            if !bytes.is_empty() {
                self.flash[device].finish(&bytes);
            }
        }
        self.selected = match value {
            qspi::SSR_DEV1 => Some(0),
            qspi::SSR_DEV2 => Some(1),
            qspi::SSR_NONE => None,
            other => {
                return Err(FlashError::Hardware(format!(
                    "unexpected slave select {other:#010x}"
                )));
            }
        };
        Ok(())
    }

    fn read_qspi(&mut self, reg: Register) -> u32 {
        if self.icap.decoupled {
            self.icap.decoupled = false;
            self.icap.recouplings += 1;
        }
        match reg {
            qspi::SPICR => self.spicr,
            qspi::SPISR => {
                let mut sr = 0;
                if self.tx.is_empty() {
                    sr |= qspi::SPISR_TX_EMPTY;
                }
                if self.rx.is_empty() {
                    sr |= qspi::SPISR_RX_EMPTY;
                }
                sr
            }
            qspi::SPIDRR => u32::from(self.rx.pop_front().unwrap_or(0)),
            qspi::TX_OCCUPANCY => self.tx.len() as u32,
            qspi::RX_OCCUPANCY => self.rx.len() as u32,
            qspi::SPISSR => match self.selected {
                Some(0) => qspi::SSR_DEV1,
                Some(_) => qspi::SSR_DEV2,
                None => qspi::SSR_NONE,
            },
            _ => 0,
        }
    }

    fn write_qspi(&mut self, reg: Register, value: u32) -> Result<(), FlashError> {
        match reg {
            qspi::SRR if value == qspi::SRR_RESET => {
                self.tx.clear();
                self.rx.clear();
            }
            qspi::SPICR => {
                self.spicr = value;
                if value & qspi::SPICR_TX_FIFO_RESET != 0 {
                    self.tx.clear();
                }
                if value & qspi::SPICR_RX_FIFO_RESET != 0 {
                    self.rx.clear();
                }
                if value & qspi::SPICR_INHIBIT == 0 {
                    self.shift_out();
                }
            }
            qspi::SPISSR => self.select(value)?,
            qspi::SPIDTR => {
                if self.tx.len() >= self.fifo_depth {
                    return Err(FlashError::Hardware("QSPI transmit FIFO overflow".into()));
                }
                self.tx.push_back(value as u8);
            }
            _ => {}
        }
        Ok(())
    }
}

impl RegisterAccess for SimCard {
    fn read(&mut self, reg: Register) -> Result<u32, FlashError> {
        Ok(match reg.space {
            Space::Config => match reg {
                cfg::DEVID => u32::from(self.device) << 16 | u32::from(self.vendor),
                cfg::SUBSYS => u32::from(self.subsystem) << 16 | 0x1014,
                _ => 0,
            },
            Space::Qspi => self.read_qspi(reg),
            Space::Icap => self.icap.read(reg),
            Space::ZynqDdr if reg == ddr::ACK => self.zynq.read_ack(),
            Space::ZynqDdr => self.zynq.window.get(&reg.offset).copied().unwrap_or(0),
        })
    }

    fn write(&mut self, reg: Register, value: u32) -> Result<(), FlashError> {
        match reg.space {
            Space::Config => {
                if reg == cfg::ZYNQ_CTRL {
                    self.zynq.control.push(value);
                }
                Ok(())
            }
            Space::Qspi => self.write_qspi(reg, value),
            Space::Icap => self.icap.write(reg, value),
            Space::ZynqDdr => self.zynq.write(reg, value),
        }
    }
}
