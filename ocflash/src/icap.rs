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

//! AXI HWICAP helpers and the partial reconfiguration loader.
//!
//! Configuration words are pushed one at a time into the write FIFO keyhole (`WF`) and
//! committed to the ICAP primitive by writing `CR_WRITE`. The card decouples its dynamic
//! region on the first keyhole access of a partial load and only couples it again on the
//! next QSPI register read, which [`load_partial`] always performs last.
//!
//! Keyhole words are big-endian: each little-endian word of the file is byte reversed.
//! ```text
//! file bytes      78 56 34 12   (little-endian value 0x12345678)
//! keyhole word    0x78563412
//! ```

use crate::access::RegisterAccess;
use crate::context::FlashContext;
use crate::error::FlashError;
use crate::image::FlashImage;
use crate::progress::Progress;
use crate::registers::{RegisterDump, Space, icap, qspi};
use log::{debug, info, warn};
use std::fmt;
use std::time::{Duration, Instant};

/// Configuration packets that read the IDCODE register back through the read FIFO.
const IDCODE_READ: [u32; 6] = [
    0xFFFF_FFFF, // dummy
    0xAA99_5566, // sync
    0x2000_0000, // NOOP
    0x2801_8001, // type 1 read, IDCODE, 1 word
    0x2000_0000, // NOOP
    0x2000_0000, // NOOP
];

const DESYNC: [u32; 4] = [
    0x3000_8001, // type 1 write, CMD
    0x0000_000D, // DESYNC
    0x2000_0000, // NOOP
    0x2000_0000, // NOOP
];

/// Keyhole word for 4 bytes as they are stored in the image file.
pub fn keyhole_word(file_bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(file_bytes).swap_bytes()
}

/// Abort whatever the core is doing and empty its FIFOs.
pub fn reset<A: RegisterAccess>(ctx: &mut FlashContext<A>) -> Result<(), FlashError> {
    ctx.write(icap::CR, icap::CR_SW_RESET)?;
    wait_control_clear(ctx)?;
    ctx.write(icap::CR, icap::CR_FIFO_CLEAR)?;
    wait_control_clear(ctx)
}

pub fn write_fifo_vacancy<A: RegisterAccess>(ctx: &mut FlashContext<A>) -> Result<u32, FlashError> {
    ctx.read(icap::WFV)
}

pub fn write_keyhole<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    word: u32,
) -> Result<(), FlashError> {
    ctx.write(icap::WF, word)
}

/// Push everything in the write FIFO to the ICAP primitive.
pub fn commit<A: RegisterAccess>(ctx: &mut FlashContext<A>) -> Result<(), FlashError> {
    ctx.write(icap::CR, icap::CR_WRITE)
}

/// Spin until the control register reads back 0, i.e. the last command finished.
pub fn wait_control_clear<A: RegisterAccess>(ctx: &mut FlashContext<A>) -> Result<(), FlashError> {
    ctx.poll_register(icap::CR, "ICAP control register to clear", |cr| {
        cr == icap::CR_CLEAR
    })?;
    Ok(())
}

/// Spin until the status register shows the ICAP enabled at end of startup.
pub fn wait_end_of_startup<A: RegisterAccess>(ctx: &mut FlashContext<A>) -> Result<(), FlashError> {
    ctx.poll_register(icap::SR, "ICAP end of startup", |sr| sr == icap::SR_ICAPEN_EOS)?;
    Ok(())
}

/// Read the device IDCODE through a configuration readback.
pub fn read_idcode<A: RegisterAccess>(ctx: &mut FlashContext<A>) -> Result<u32, FlashError> {
    for word in IDCODE_READ {
        write_keyhole(ctx, word)?;
    }
    commit(ctx)?;
    wait_control_clear(ctx)?;

    ctx.write(icap::SZ, 1)?;
    ctx.write(icap::CR, icap::CR_READ)?;
    ctx.poll_register(icap::CR, "ICAP readback to finish", |cr| {
        cr & icap::CR_READ == 0
    })?;
    ctx.poll_register(icap::RFO, "ICAP read FIFO to fill", |rfo| rfo >= 1)?;
    let idcode = ctx.read(icap::RF)?;

    for word in DESYNC {
        write_keyhole(ctx, word)?;
    }
    commit(ctx)?;
    wait_control_clear(ctx)?;
    debug!("FPGA IDCODE: {idcode:#010x}");
    Ok(idcode)
}

pub fn read_registers<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
) -> Result<RegisterDump, FlashError> {
    let values = icap::MAP
        .iter()
        .map(|(name, reg)| Ok((*name, ctx.read(*reg)?)))
        .collect::<Result<Vec<_>, FlashError>>()?;
    Ok(RegisterDump {
        space: Space::Icap,
        values,
    })
}

/// Split of the image words into bursts of at most the write FIFO vacancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstPlan {
    pub words: u64,
    pub capacity: u64,
    pub full_bursts: u64,
    /// Words in the trailing burst, which is committed even when this is 0.
    pub remainder: u64,
}

impl BurstPlan {
    pub fn new(words: u64, capacity: u32) -> Result<BurstPlan, FlashError> {
        if capacity == 0 {
            return Err(FlashError::Hardware(
                "ICAP reports no write FIFO vacancy, cannot size bursts".into(),
            ));
        }
        let capacity = u64::from(capacity);
        let full_bursts = words / capacity;
        Ok(BurstPlan {
            words,
            capacity,
            full_bursts,
            remainder: words - full_bursts * capacity,
        })
    }

    /// Sizes of every burst in order, the trailing one included.
    pub fn bursts(&self) -> impl Iterator<Item = u64> + use<> {
        let (capacity, remainder) = (self.capacity, self.remainder);
        (0..self.full_bursts)
            .map(move |_| capacity)
            .chain(std::iter::once(remainder))
    }
}

impl fmt::Display for BurstPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} words in {} bursts of {} and a last burst of {}",
            self.words, self.full_bursts, self.capacity, self.remainder
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialReport {
    pub plan: BurstPlan,
    pub words_written: u64,
    pub elapsed: Duration,
}

/// Stream a partial bitstream through the keyhole and re-couple the dynamic region.
///
/// The re-coupling read is issued whether or not the stream succeeded, so a failed load
/// never leaves the dynamic region decoupled.
pub fn load_partial<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    image: &mut FlashImage,
) -> Result<PartialReport, FlashError> {
    let started = Instant::now();
    info!("Loading partial image {:?} ({} bytes)", image.path(), image.size());

    let streamed = stream_bursts(ctx, image);
    // Any QSPI register read ends the decoupling.
    let recoupled = ctx
        .read(qspi::SPICR)
        .inspect_err(|e| warn!("Could not re-couple the dynamic region: {e}"));
    let (plan, words_written) = streamed?;
    recoupled?;

    let elapsed = started.elapsed();
    info!(
        "Partial reprogramming completed in {:.1} seconds",
        elapsed.as_secs_f64()
    );
    Ok(PartialReport {
        plan,
        words_written,
        elapsed,
    })
}

fn stream_bursts<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    image: &mut FlashImage,
) -> Result<(BurstPlan, u64), FlashError> {
    wait_end_of_startup(ctx)?;
    debug!("ICAP end of startup reached");
    let plan = BurstPlan::new(image.word_count(), write_fifo_vacancy(ctx)?)?;
    info!("Partial image: {plan}");

    image.rewind()?;
    let mut progress = Progress::start("Writing partial image", "bursts", plan.full_bursts);
    let mut words_written = 0;
    for (index, burst) in plan.bursts().enumerate() {
        if (index as u64) < plan.full_bursts {
            progress.step(index as u64);
        }
        for _ in 0..burst {
            write_keyhole(ctx, keyhole_word(image.read_word_bytes()?))?;
            wait_control_clear(ctx)?;
            wait_end_of_startup(ctx)?;
            words_written += 1;
        }
        commit(ctx)?;
        wait_control_clear(ctx)?;
        wait_end_of_startup(ctx)?;
    }
    progress.finish();
    Ok((plan, words_written))
}
