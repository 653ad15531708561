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

//! Opening a card, identifying it and deciding how an image gets onto it.

use crate::access::RegisterAccess;
use crate::access::bridge::PciBridge;
use crate::access::pci_config::PciConfigFile;
use crate::config::Settings;
use crate::context::TraceFlags;
use crate::error::FlashError;
use crate::poll::CancelToken;
use crate::registers::cfg;
use log::{debug, info};
use std::fmt;
use std::path::{Path, PathBuf};

pub const SUPPORTED_VENDOR: u16 = 0x1014;
pub const SUPPORTED_DEVICE: u16 = 0x062B;
/// Subsystem of the 250SOC card, which programs its flash through the ZynqMP.
pub const SUBSYSTEM_ZYNQMP: u16 = 0x066A;

const PARTIAL_IMAGE_MARKER: &str = "_partial.bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardIdentity {
    pub vendor: u16,
    pub device: u16,
    pub subsystem: u16,
}

impl fmt::Display for CardIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vendor {:#06x} device {:#06x} subsystem {:#06x}",
            self.vendor, self.device, self.subsystem
        )
    }
}

pub fn identify<A: RegisterAccess + ?Sized>(access: &mut A) -> Result<CardIdentity, FlashError> {
    let devid = access.read(cfg::DEVID)?;
    let subsys = access.read(cfg::SUBSYS)?;
    let identity = CardIdentity {
        vendor: (devid & 0xFFFF) as u16,
        device: (devid >> 16) as u16,
        subsystem: (subsys >> 16) as u16,
    };
    debug!("Card identity: {identity}");
    Ok(identity)
}

pub fn require_supported(identity: &CardIdentity) -> Result<(), FlashError> {
    if identity.vendor != SUPPORTED_VENDOR || identity.device != SUPPORTED_DEVICE {
        return Err(FlashError::UnsupportedCard {
            vendor: identity.vendor,
            device: identity.device,
        });
    }
    info!("This card has the flash controller");
    Ok(())
}

/// What the user asked to program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramRequest {
    pub primary: PathBuf,
    pub secondary: Option<PathBuf>,
    /// Program both flash parts of an x8 card. On by default.
    pub dual_spi: bool,
}

/// How an image reaches the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPath {
    DualSpi { primary: PathBuf, secondary: PathBuf },
    SingleSpi { primary: PathBuf },
    PartialReconfig { image: PathBuf },
    ZynqMpDdr { image: PathBuf },
}

impl TransferPath {
    pub fn select(identity: &CardIdentity, request: &ProgramRequest) -> Result<TransferPath, FlashError> {
        let primary = request.primary.clone();
        if identity.subsystem == SUBSYSTEM_ZYNQMP {
            return Ok(TransferPath::ZynqMpDdr { image: primary });
        }
        if is_partial_image(&primary) {
            return Ok(TransferPath::PartialReconfig { image: primary });
        }
        if request.dual_spi {
            let secondary = request.secondary.clone().ok_or_else(|| {
                FlashError::Argument("dual SPI programming needs a secondary image".into())
            })?;
            return Ok(TransferPath::DualSpi { primary, secondary });
        }
        Ok(TransferPath::SingleSpi { primary })
    }
}

impl fmt::Display for TransferPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferPath::DualSpi { .. } => write!(f, "dual SPI (x8)"),
            TransferPath::SingleSpi { .. } => write!(f, "single SPI (x4)"),
            TransferPath::PartialReconfig { .. } => write!(f, "partial reconfiguration"),
            TransferPath::ZynqMpDdr { .. } => write!(f, "ZynqMP DDR staging"),
        }
    }
}

fn is_partial_image(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(PARTIAL_IMAGE_MARKER))
}

/// Path of the config resource of `bdf`.
pub fn config_path(settings: &Settings, bdf: &str) -> Result<PathBuf, FlashError> {
    if bdf.is_empty() || bdf.contains('/') {
        return Err(FlashError::Argument(format!(
            "{bdf:?} is not a PCI bus/device/function"
        )));
    }
    Ok(settings.pci_devices_dir.join(bdf).join("config"))
}

pub type PciDevice = PciBridge<PciConfigFile>;

/// Open the config space of `bdf` and wrap it in the bridge that reaches the AXI cores.
pub fn open_device(
    bdf: &str,
    settings: &Settings,
    trace: TraceFlags,
    cancel: CancelToken,
) -> Result<PciDevice, FlashError> {
    let path = config_path(settings, bdf)?;
    debug!("Opening {path:?}");
    let config = PciConfigFile::open(&path)?.with_trace(trace.config);
    Ok(PciBridge::new(config)
        .with_poll(settings.poll_policy, cancel)
        .with_trace(trace.axi))
}
