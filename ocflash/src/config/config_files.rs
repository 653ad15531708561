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

use crate::config::{self, Settings};
use crate::error::FlashError;
use crate::image::CountRule;
use crate::poll::PollPolicy;
use crate::reload::ReloadAddresses;
use crate::system_io::fs_read;
use log::trace;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// This is the top level struct which holds all sections
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlConfig {
    system_paths: Option<SystemPaths>,
    flash: Option<FlashSection>,
    reload: Option<ReloadSection>,
    polling: Option<PollingSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SystemPaths {
    pci_devices_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FlashSection {
    qspi_fifo_depth: Option<usize>,
    count_rule: Option<CountRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ReloadSection {
    factory_address: Option<u32>,
    user_address: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PollingSection {
    timeout_ms: Option<u64>,
}

fn merge_section<T>(primary: Option<T>, fallback: Option<T>, merge: fn(T, T) -> T) -> Option<T> {
    match (primary, fallback) {
        (Some(p), Some(f)) => Some(merge(p, f)),
        (p, f) => p.or(f),
    }
}

impl TomlConfig {
    /// Values present in `self` win over those in `fallback`.
    pub(crate) fn merge(self, fallback: TomlConfig) -> TomlConfig {
        TomlConfig {
            system_paths: merge_section(self.system_paths, fallback.system_paths, |p, f| {
                SystemPaths {
                    pci_devices_dir: p.pci_devices_dir.or(f.pci_devices_dir),
                }
            }),
            flash: merge_section(self.flash, fallback.flash, |p, f| FlashSection {
                qspi_fifo_depth: p.qspi_fifo_depth.or(f.qspi_fifo_depth),
                count_rule: p.count_rule.or(f.count_rule),
            }),
            reload: merge_section(self.reload, fallback.reload, |p, f| ReloadSection {
                factory_address: p.factory_address.or(f.factory_address),
                user_address: p.user_address.or(f.user_address),
            }),
            polling: merge_section(self.polling, fallback.polling, |p, f| PollingSection {
                timeout_ms: p.timeout_ms.or(f.timeout_ms),
            }),
        }
    }
}

impl From<TomlConfig> for Settings {
    fn from(value: TomlConfig) -> Self {
        trace!("Creating Settings from {value:?}");
        let system_paths = value.system_paths.unwrap_or_default();
        let flash = value.flash.unwrap_or_default();
        let reload = value.reload.unwrap_or_default();
        let polling = value.polling.unwrap_or_default();
        let defaults = ReloadAddresses::default();
        Settings {
            pci_devices_dir: system_paths.pci_devices_dir.unwrap_or_else(|| {
                trace!("No pci_devices_dir provided. Using hardcoded value.");
                PathBuf::from(config::PCI_DEVICES_DIR)
            }),
            qspi_fifo_depth: flash.qspi_fifo_depth.unwrap_or_else(|| {
                trace!("No qspi_fifo_depth provided. Using hardcoded value.");
                config::QSPI_FIFO_DEPTH
            }),
            count_rule: flash.count_rule.unwrap_or_default(),
            reload: ReloadAddresses {
                factory: reload.factory_address.unwrap_or(defaults.factory),
                user: reload.user_address.unwrap_or(defaults.user),
            },
            poll_policy: PollPolicy::from_millis(polling.timeout_ms.unwrap_or(0)),
        }
    }
}

pub(crate) fn toml_str_to_config(toml_string: &str, file: &Path) -> Result<TomlConfig, FlashError> {
    toml::from_str(toml_string).map_err(|e| FlashError::TomlDe {
        file: file.into(),
        e,
    })
}

pub(crate) fn config_from_file(file_path: &Path) -> Result<TomlConfig, FlashError> {
    if !file_path.is_file() {
        return Err(FlashError::Internal(format!(
            "Config file not found in {file_path:?}"
        )));
    }
    toml_str_to_config(&fs_read(file_path)?, file_path)
}
