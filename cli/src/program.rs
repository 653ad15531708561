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


//! Program command implementation for the ocflash CLI.
//!
//! Writes an image to the card selected with `--device`. The transfer path is picked from
//! the card and the request:
//! - ZynqMP based cards (subsystem `0x066A`) stage the image in the on-card DDR
//! - files whose name contains `_partial.bin` go through the ICAP as a partial bitstream
//! - otherwise both flash parts are programmed, or only the primary one with `--single-spi`
//!
//! Cards other than the supported vendor/device pair are refused before anything is
//! written.
//!
//! # Examples
//!
//! ```bash
//! ocflash --device 0006:00:00.0 program --image-file1 p.bin --image-file2 s.bin
//! ocflash --device 0006:00:00.0 program --single-spi --image-file1 user.bin --start-addr 0x01000000
//! ```

use log::{info, warn};
use ocflash::access::RegisterAccess;
use ocflash::context::FlashContext;
use ocflash::device::{ProgramRequest, TransferPath, identify, require_supported};
use ocflash::error::FlashError;
use ocflash::program::{ProgramOptions, ProgramSummary, run_program};
use std::fmt::Write;
use std::path::PathBuf;

/// The parsed arguments of `program`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramArgs {
    pub image_file1: PathBuf,
    pub image_file2: Option<PathBuf>,
    pub single_spi: bool,
    pub start_addr: u32,
    pub verbose: bool,
}

/// Parse a flash start address: up to 8 hex digits with an optional `0x` prefix.
pub fn parse_start_address(s: &str) -> Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || digits.len() > 8 {
        return Err(format!("{s:?} is not a 32-bit hex address"));
    }
    u32::from_str_radix(digits, 16).map_err(|e| format!("{s:?} is not a hex address: {e}"))
}

fn summarize(summary: &ProgramSummary) -> String {
    let mut out = String::new();
    match summary {
        ProgramSummary::Flash(reports) => {
            for r in reports {
                let _ = writeln!(
                    out,
                    "{} flash: {} sectors erased in {:.1?}, {} pages programmed in {:.1?}, {} bytes verified in {:.1?}",
                    r.device,
                    r.geometry.sectors,
                    r.erase_time,
                    r.geometry.pages,
                    r.program_time,
                    r.bytes_verified,
                    r.verify_time
                );
            }
        }
        ProgramSummary::Partial(r) => {
            let _ = writeln!(
                out,
                "Partial image loaded: {} in {:.1?}",
                r.plan, r.elapsed
            );
        }
        ProgramSummary::ZynqMp(r) => {
            let _ = writeln!(
                out,
                "Image handed to the ZynqMP: {} blocks in {:.1?}",
                r.blocks, r.elapsed
            );
        }
    }
    out.trim_end().to_string()
}

/// Write the requested image(s) to the card behind `ctx`.
///
/// # Returns: `Result<String, FlashError>`
/// * `Ok(String)` - Summary of what was written, how long it took and what did not verify
/// * `Err(FlashError::UnsupportedCard)` - The card is not the supported flash controller
/// * `Err(FlashError)` - Any failure of the transfer itself
///
/// Bytes that fail verification are listed in the summary, they are not an error.
pub fn program_handler<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    args: &ProgramArgs,
) -> Result<String, FlashError> {
    let identity = identify(ctx.access_mut())?;
    require_supported(&identity)?;
    let request = ProgramRequest {
        primary: args.image_file1.clone(),
        secondary: args.image_file2.clone(),
        dual_spi: !args.single_spi,
    };
    let path = TransferPath::select(&identity, &request)?;
    if args.single_spi && args.image_file2.is_some() {
        warn!("--single-spi given, ignoring {:?}", args.image_file2);
    }
    let options = ProgramOptions {
        start_address: args.start_addr,
        dump_registers: args.verbose,
    };
    let summary = run_program(ctx, &path, &options)?;
    let errors = ctx.check_accumulated_errors();
    info!("Programming finished");
    let mut message = summarize(&summary);
    if errors > 0 {
        let _ = write!(
            message,
            "\n{} bytes failed verification, {errors} errors in total",
            summary.mismatch_count()
        );
    }
    Ok(message)
}
