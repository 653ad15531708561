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

use log::info;
use std::time::{Duration, Instant};

/// Logs the progress of one pass in 5 % steps and times it.
pub struct Progress {
    label: &'static str,
    unit: &'static str,
    total: u64,
    last_percent: Option<u64>,
    started: Instant,
}

impl Progress {
    pub fn start(label: &'static str, unit: &'static str, total: u64) -> Progress {
        Progress {
            label,
            unit,
            total,
            last_percent: None,
            started: Instant::now(),
        }
    }

    /// Report that item `index` (0-based) is about to be processed.
    ///
    /// Returns the percentage when it was logged.
    pub fn step(&mut self, index: u64) -> Option<u64> {
        let percent = index * 100 / self.total.max(1);
        if percent % 5 != 0 || self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);
        info!(
            "{:<20}: {percent:>3} % of {} {}",
            self.label, self.total, self.unit
        );
        Some(percent)
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.started.elapsed();
        info!("{:<20}: completed in {:.1} seconds", self.label, elapsed.as_secs_f64());
        elapsed
    }
}
