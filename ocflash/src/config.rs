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

//! Layered configuration.
//!
//! User config overrides vendor config and vendor config overrides hardcoded defaults:
//! ```text
//! /etc/ocflash/config.toml       (or the file given with --config)
//! /usr/lib/ocflash/config.toml
//! hardcoded defaults below
//! ```
//! The resulting [`Settings`] are passed into the engine explicitly.

pub mod config_files;

use crate::context::{DEFAULT_QSPI_FIFO_DEPTH, FlashContext, TraceFlags};
use crate::access::RegisterAccess;
use crate::error::FlashError;
use crate::image::CountRule;
use crate::poll::PollPolicy;
use crate::reload::ReloadAddresses;
use config_files::{TomlConfig, config_from_file};
use log::{trace, warn};
use std::path::{Path, PathBuf};

// These are hardcoded backups used when no config file provides a value
pub static PCI_DEVICES_DIR: &str = "/sys/bus/pci/devices/";
pub const QSPI_FIFO_DEPTH: usize = DEFAULT_QSPI_FIFO_DEPTH;
pub static USER_CONFIG: &str = "/etc/ocflash/config.toml";
pub static VENDOR_CONFIG: &str = "/usr/lib/ocflash/config.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub pci_devices_dir: PathBuf,
    pub qspi_fifo_depth: usize,
    pub count_rule: CountRule,
    pub reload: ReloadAddresses,
    pub poll_policy: PollPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            pci_devices_dir: PathBuf::from(PCI_DEVICES_DIR),
            qspi_fifo_depth: QSPI_FIFO_DEPTH,
            count_rule: CountRule::default(),
            reload: ReloadAddresses::default(),
            poll_policy: PollPolicy::UNBOUNDED,
        }
    }
}

impl Settings {
    /// Build a context around `access` configured from these settings.
    pub fn context<A: RegisterAccess>(&self, access: A, trace: TraceFlags) -> FlashContext<A> {
        FlashContext::new(access)
            .with_trace(trace)
            .with_poll_policy(self.poll_policy)
            .with_qspi_fifo_depth(self.qspi_fifo_depth)
            .with_count_rule(self.count_rule)
    }
}

fn implicit_layer(file_path: &Path, layer: &str) -> TomlConfig {
    config_from_file(file_path).unwrap_or_else(|e| {
        warn!("Using hardcoded values for {layer} config because loading config failed: {e}");
        TomlConfig::default()
    })
}

/// Load the settings from explicit paths. `explicit` replaces the user layer and must
/// load successfully.
pub fn load_settings_from(
    explicit: Option<&Path>,
    user: &Path,
    vendor: &Path,
) -> Result<Settings, FlashError> {
    let vendor_config = implicit_layer(vendor, "vendor");
    let user_config = match explicit {
        Some(path) => config_from_file(path)?,
        None => implicit_layer(user, "user"),
    };
    trace!("Merging user_config: {user_config:?} with vendor_config {vendor_config:?}");
    let settings: Settings = user_config.merge(vendor_config).into();
    trace!("Resulting settings: {settings:?}");
    Ok(settings)
}

/// Load the settings from the standard locations.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, FlashError> {
    load_settings_from(explicit, Path::new(USER_CONFIG), Path::new(VENDOR_CONFIG))
}
