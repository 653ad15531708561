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

//! Driver for the AXI Quad SPI core in front of the configuration flash.
//!
//! The core runs in standard SPI master mode with manual slave select. A transaction keeps
//! the slave selected for its whole length and moves bytes through the FIFOs one burst at a
//! time:
//!
//! ```text
//! SPISSR <- select
//! repeat for each burst of at most fifo_depth bytes:
//!     SPIDTR <- byte ...          (fill the transmit FIFO)
//!     SPICR  <- RUN               (release the inhibit)
//!     poll SPISR until TX_EMPTY
//!     SPICR  <- IDLE              (inhibit again)
//!     SPIDRR -> byte ...          (drain as many bytes as were sent)
//! SPISSR <- NONE
//! ```

use crate::access::RegisterAccess;
use crate::context::FlashContext;
use crate::error::FlashError;
use crate::registers::{RegisterDump, Space, qspi};
use log::{debug, trace};

/// Reset the core and leave it idle, inhibited and with no slave selected.
pub fn setup_qspi<A: RegisterAccess>(ctx: &mut FlashContext<A>) -> Result<(), FlashError> {
    debug!("Setting up QSPI master core");
    ctx.write(qspi::SRR, qspi::SRR_RESET)?;
    ctx.write(qspi::SPICR, qspi::SPICR_SETUP)?;
    ctx.write(qspi::SPISSR, qspi::SSR_NONE)?;
    ctx.write(qspi::DGIER, 0)?;
    Ok(())
}

/// Run one full-duplex transaction on the slave selected by `select`.
///
/// `tx` is shifted out first, followed by dummy bytes until `rx_skip + rx.len()` bytes have
/// been clocked in total. Received bytes starting at position `rx_skip` land in `rx`.
pub fn transfer<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    select: u32,
    tx: &[u8],
    rx_skip: usize,
    rx: &mut [u8],
) -> Result<(), FlashError> {
    let total = tx.len().max(rx_skip + rx.len());
    let depth = ctx.qspi_fifo_depth();
    if ctx.trace().flash_cmd {
        trace!(
            "spi {select:#010x} tx {} rx {}: {:02x?}",
            tx.len(),
            rx.len(),
            &tx[..tx.len().min(16)]
        );
    }

    ctx.write(qspi::SPISSR, select)?;
    let mut position = 0;
    while position < total {
        let burst = depth.min(total - position);
        for i in position..position + burst {
            let byte = tx.get(i).copied().unwrap_or(0);
            ctx.write(qspi::SPIDTR, u32::from(byte))?;
        }
        ctx.write(qspi::SPICR, qspi::SPICR_RUN)?;
        ctx.poll_register(qspi::SPISR, "QSPI transmit FIFO to empty", |sr| {
            sr & qspi::SPISR_TX_EMPTY != 0
        })?;
        ctx.write(qspi::SPICR, qspi::SPICR_IDLE)?;
        for i in position..position + burst {
            let byte = (ctx.read(qspi::SPIDRR)? & 0xFF) as u8;
            if let Some(slot) = i.checked_sub(rx_skip).and_then(|j| rx.get_mut(j)) {
                *slot = byte;
            }
        }
        position += burst;
    }
    ctx.write(qspi::SPISSR, qspi::SSR_NONE)?;
    Ok(())
}

/// Read every diagnostic register. Only reads, so it can run at any time.
pub fn read_registers<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
) -> Result<RegisterDump, FlashError> {
    let values = qspi::MAP
        .iter()
        .map(|(name, reg)| Ok((*name, ctx.read(*reg)?)))
        .collect::<Result<Vec<_>, FlashError>>()?;
    Ok(RegisterDump {
        space: Space::Qspi,
        values,
    })
}
