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


//! Reload command implementation for the ocflash CLI.
//!
//! Makes the FPGA boot again from the factory or the user image without a power cycle.
//! The card identity is checked but an unknown card only draws a warning, the command is
//! still sent.
//!
//! Two ways of issuing the command are offered:
//! - `wait-each-word` resets the ICAP and commits every word of the sequence separately
//! - `guarded` first checks that the running image finished startup, and reports the
//!   image as not supporting reload when it did not within a second

use clap::ValueEnum;
use log::warn;
use ocflash::access::RegisterAccess;
use ocflash::context::FlashContext;
use ocflash::device::{identify, require_supported};
use ocflash::error::FlashError;
use ocflash::reload::{ImageLocation, ReloadAddresses, ReloadMode, ReloadOutcome, reload_image};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocationArg {
    Factory,
    User,
}

impl From<LocationArg> for ImageLocation {
    fn from(arg: LocationArg) -> Self {
        match arg {
            LocationArg::Factory => ImageLocation::Factory,
            LocationArg::User => ImageLocation::User,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    WaitEachWord,
    Guarded,
}

impl From<ModeArg> for ReloadMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::WaitEachWord => ReloadMode::WaitEachWord,
            ModeArg::Guarded => ReloadMode::Guarded,
        }
    }
}

/// Reload the FPGA from `location`.
///
/// # Returns: `Result<String, FlashError>`
/// * `Ok(String)` - Which image the card was told to boot, or that the image cannot reload
/// * `Err(FlashError)` - The ICAP could not be driven
pub fn reload_handler<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    addresses: ReloadAddresses,
    location: LocationArg,
    mode: ModeArg,
) -> Result<String, FlashError> {
    let identity = identify(ctx.access_mut())?;
    if let Err(e) = require_supported(&identity) {
        warn!("{e}");
    }
    let location = ImageLocation::from(location);
    let outcome = reload_image(ctx, location, addresses, mode.into())?;
    ctx.check_accumulated_errors();
    Ok(match outcome {
        ReloadOutcome::Issued => format!(
            "Reload from the {location} image at {:#010x} issued",
            addresses.address(location)
        ),
        ReloadOutcome::Unsupported => {
            "The loaded image does not support reload, nothing was written".to_string()
        }
    })
}
