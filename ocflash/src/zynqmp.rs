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

//! Flash programming on ZynqMP cards, where the on-card processor owns the flash.
//!
//! The host hands the image over in 256 byte blocks through a DDR staging window and a
//! single acknowledgement word that both sides poll:
//!
//! ```text
//!   host                                   processor
//!   ────                                   ─────────
//!   CFG 0x638 <- RUN
//!   wait ACK != BUSY   <────────────────── ACK <- 0 (ready for a block)
//!   DDR 0x000..0x0FC <- 64 words
//!   ACK <- NEW_DATA    ──────────────────> copy block to flash
//!   ... once per block ...
//!   ACK <- DONE        ──────────────────> finish
//!   CFG 0x638 <- IDLE
//! ```

use crate::access::RegisterAccess;
use crate::context::FlashContext;
use crate::error::FlashError;
use crate::image::{FlashImage, PAGE_SIZE, WORD_SIZE};
use crate::progress::Progress;
use crate::registers::{cfg, ddr};
use log::info;
use std::time::{Duration, Instant};

const WORDS_PER_BLOCK: usize = PAGE_SIZE / WORD_SIZE;

#[derive(Debug, Clone, PartialEq)]
pub struct ZynqReport {
    pub blocks: u64,
    pub elapsed: Duration,
}

/// Hand `image` to the on-card processor block by block.
pub fn load_zynqmp<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    image: &mut FlashImage,
) -> Result<ZynqReport, FlashError> {
    let started = Instant::now();
    let blocks = ctx.count_rule().geometry(image.size()).pages;
    info!(
        "Handing {:?} ({} bytes) to the ZynqMP in {blocks} blocks",
        image.path(),
        image.size()
    );
    info!("Waiting for card acknowledgement, this can take up to a minute");

    ctx.write(cfg::ZYNQ_CTRL, cfg::ZYNQ_CTRL_RUN)?;
    image.rewind()?;
    let mut progress = Progress::start("Writing image", "blocks", blocks);
    let mut block = [0u8; PAGE_SIZE];
    for index in 0..blocks {
        progress.step(index);
        ctx.poll_register(ddr::ACK, "ZynqMP to accept the next block", |ack| {
            ack != ddr::ACK_BUSY
        })?;
        image.read_chunk(&mut block)?;
        let mut reg = ddr::DATA_BASE;
        for (i, word) in block.chunks_exact(WORD_SIZE).enumerate() {
            let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            ctx.write(reg, value)?;
            if i + 1 < WORDS_PER_BLOCK {
                reg = reg.offset_by(WORD_SIZE as u32)?;
            }
        }
        ctx.write(ddr::ACK, ddr::ACK_NEW_DATA)?;
    }
    progress.finish();

    ctx.write(ddr::ACK, ddr::ACK_DONE)?;
    ctx.write(cfg::ZYNQ_CTRL, cfg::ZYNQ_CTRL_IDLE)?;
    let elapsed = started.elapsed();
    info!(
        "Copying image from DDR to flash completed in {:.1} seconds",
        elapsed.as_secs_f64()
    );
    Ok(ZynqReport { blocks, elapsed })
}
