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

//! Warm reload of the FPGA from flash (IPROG through ICAP).

use crate::access::RegisterAccess;
use crate::context::FlashContext;
use crate::error::FlashError;
use crate::icap;
use crate::poll::PollPolicy;
use crate::registers::icap as regs;
use log::{debug, info, warn};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const FACTORY_ADDRESS: u32 = 0x0000_0000;
pub const USER_ADDRESS: u32 = 0x0010_0000;
pub const SEQUENCE_LEN: usize = 8;

/// How long [`ReloadMode::Guarded`] waits for the ICAP to report end of startup.
pub const GUARD_TIMEOUT: Duration = Duration::from_secs(1);

/// Which flash image the FPGA boots after the reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLocation {
    Factory,
    User,
}

impl FromStr for ImageLocation {
    type Err = FlashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "factory" => Ok(ImageLocation::Factory),
            "user" => Ok(ImageLocation::User),
            other => Err(FlashError::Argument(format!(
                "image location must be factory or user, got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageLocation::Factory => write!(f, "factory"),
            ImageLocation::User => write!(f, "user"),
        }
    }
}

/// Flash addresses of the two images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadAddresses {
    pub factory: u32,
    pub user: u32,
}

impl Default for ReloadAddresses {
    fn default() -> Self {
        ReloadAddresses {
            factory: FACTORY_ADDRESS,
            user: USER_ADDRESS,
        }
    }
}

impl ReloadAddresses {
    pub fn address(&self, location: ImageLocation) -> u32 {
        match location {
            ImageLocation::Factory => self.factory,
            ImageLocation::User => self.user,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadMode {
    /// Reset the ICAP first and commit every word on its own.
    #[default]
    WaitEachWord,
    /// Check that the loaded image supports reload, then commit the whole sequence at once
    /// without reading anything back.
    Guarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Issued,
    /// The ICAP never reached end of startup: the running image has no reload support and
    /// nothing was written.
    Unsupported,
}

/// The IPROG command sequence that boots the image at `address`.
pub fn iprog_sequence(address: u32) -> [u32; SEQUENCE_LEN] {
    [
        0xFFFF_FFFF, // dummy
        0xAA99_5566, // sync
        0x2000_0000, // NOOP
        0x3002_0001, // type 1 write, WBSTAR
        address,
        0x3000_8001, // type 1 write, CMD
        0x0000_000F, // IPROG
        0x2000_0000, // NOOP
    ]
}

fn require_room<A: RegisterAccess>(ctx: &mut FlashContext<A>) -> Result<(), FlashError> {
    let room = icap::write_fifo_vacancy(ctx)?;
    if room < SEQUENCE_LEN as u32 {
        return Err(FlashError::Hardware(format!(
            "too few ICAP write FIFO entries ({room}) to hold the reload sequence"
        )));
    }
    debug!("Sufficient room for the entire reload sequence: {room}");
    Ok(())
}

/// Make the FPGA reload itself from the image at `location`.
pub fn reload_image<A: RegisterAccess>(
    ctx: &mut FlashContext<A>,
    location: ImageLocation,
    addresses: ReloadAddresses,
    mode: ReloadMode,
) -> Result<ReloadOutcome, FlashError> {
    let address = addresses.address(location);
    info!("Reloading the {location} image at {address:#010x} ({mode:?})");
    let sequence = iprog_sequence(address);
    match mode {
        ReloadMode::WaitEachWord => {
            icap::reset(ctx)?;
            debug!("ICAP after reset:\n{}", icap::read_registers(ctx)?);
            require_room(ctx)?;
            for word in sequence {
                icap::write_keyhole(ctx, word)?;
                icap::commit(ctx)?;
                icap::wait_control_clear(ctx)?;
            }
        }
        ReloadMode::Guarded => {
            let startup = ctx.poll_with(
                PollPolicy::bounded(GUARD_TIMEOUT),
                "ICAP end of startup",
                |ctx| Ok(ctx.read(regs::SR)? == regs::SR_ICAPEN_EOS),
            );
            match startup {
                Ok(_) => {}
                Err(FlashError::PollTimeout { .. }) => {
                    warn!("The loaded image does not support reload, nothing was written");
                    return Ok(ReloadOutcome::Unsupported);
                }
                Err(e) => return Err(e),
            }
            require_room(ctx)?;
            for word in sequence {
                icap::write_keyhole(ctx, word)?;
            }
            icap::commit(ctx)?;
        }
    }
    info!("Reload sequence issued");
    Ok(ReloadOutcome::Issued)
}
