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

//! Per-invocation state handed to every engine operation.
//!
//! A [`FlashContext`] owns the register access for one card together with everything the
//! sequences need around it: trace switches, the poll policy and clock, a cancel token, the
//! per-device flash addressing state and the accumulator for non-fatal errors such as verify
//! mismatches. Nothing in the engine keeps global state.

use crate::access::RegisterAccess;
use crate::error::FlashError;
use crate::image::CountRule;
use crate::poll::{CancelToken, Clock, PollPolicy, Poller, SystemClock};
use crate::registers::Register;
use log::{error, info};
use std::rc::Rc;

pub const DEFAULT_QSPI_FIFO_DEPTH: usize = 256;

/// Which layers log their traffic at trace level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceFlags {
    /// Raw config-space reads and writes.
    pub config: bool,
    /// Bridged QSPI/ICAP/DDR register accesses.
    pub axi: bool,
    /// Flash level operations (erase, program, read, EAR changes).
    pub flash: bool,
    /// Bytes of every SPI transaction.
    pub flash_cmd: bool,
}

impl TraceFlags {
    pub const NONE: TraceFlags = TraceFlags {
        config: false,
        axi: false,
        flash: false,
        flash_cmd: false,
    };
}

/// Extended address register segment last written to each flash device, `None` until the
/// first write.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FlashAddressing {
    pub(crate) ear: [Option<u8>; 2],
}

pub struct FlashContext<A: RegisterAccess> {
    access: A,
    trace: TraceFlags,
    policy: PollPolicy,
    clock: Rc<dyn Clock>,
    cancel: CancelToken,
    qspi_fifo_depth: usize,
    count_rule: CountRule,
    pub(crate) addressing: FlashAddressing,
    errors: Vec<String>,
}

impl<A: RegisterAccess> FlashContext<A> {
    pub fn new(access: A) -> FlashContext<A> {
        FlashContext {
            access,
            trace: TraceFlags::NONE,
            policy: PollPolicy::UNBOUNDED,
            clock: Rc::new(SystemClock::new()),
            cancel: CancelToken::new(),
            qspi_fifo_depth: DEFAULT_QSPI_FIFO_DEPTH,
            count_rule: CountRule::default(),
            addressing: FlashAddressing::default(),
            errors: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: TraceFlags) -> FlashContext<A> {
        self.trace = trace;
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> FlashContext<A> {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> FlashContext<A> {
        self.clock = clock;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> FlashContext<A> {
        self.cancel = cancel;
        self
    }

    /// Number of bytes pushed to the QSPI transmit FIFO per burst. Zero is treated as one.
    pub fn with_qspi_fifo_depth(mut self, depth: usize) -> FlashContext<A> {
        self.qspi_fifo_depth = depth.max(1);
        self
    }

    pub fn with_count_rule(mut self, rule: CountRule) -> FlashContext<A> {
        self.count_rule = rule;
        self
    }

    pub fn trace(&self) -> TraceFlags {
        self.trace
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn qspi_fifo_depth(&self) -> usize {
        self.qspi_fifo_depth
    }

    pub fn count_rule(&self) -> CountRule {
        self.count_rule
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn access_mut(&mut self) -> &mut A {
        &mut self.access
    }

    pub fn into_access(self) -> A {
        self.access
    }

    pub fn read(&mut self, reg: Register) -> Result<u32, FlashError> {
        self.access.read(reg)
    }

    pub fn write(&mut self, reg: Register, value: u32) -> Result<(), FlashError> {
        self.access.write(reg, value)
    }

    /// Run `probe` until it reports success, under the context's poll policy.
    pub fn poll<F>(&mut self, what: &str, probe: F) -> Result<u64, FlashError>
    where
        F: FnMut(&mut FlashContext<A>) -> Result<bool, FlashError>,
    {
        self.poll_with(self.policy, what, probe)
    }

    /// Like [`FlashContext::poll`], bounded by the tighter of `policy` and the context's own.
    pub fn poll_with<F>(
        &mut self,
        policy: PollPolicy,
        what: &str,
        mut probe: F,
    ) -> Result<u64, FlashError>
    where
        F: FnMut(&mut FlashContext<A>) -> Result<bool, FlashError>,
    {
        let clock = Rc::clone(&self.clock);
        let cancel = self.cancel.clone();
        let policy = policy.min(self.policy);
        Poller::new(clock.as_ref(), &cancel, policy).until(what, || probe(self))
    }

    /// Poll `reg` until `done` accepts its value.
    pub fn poll_register(
        &mut self,
        reg: Register,
        what: &str,
        done: impl Fn(u32) -> bool,
    ) -> Result<u64, FlashError> {
        self.poll(what, |ctx| Ok(done(ctx.read(reg)?)))
    }

    /// Record a non-fatal error. It is logged now and counted in the final summary.
    pub fn record_error(&mut self, message: String) {
        error!("{message}");
        self.errors.push(message);
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Log the summary of every error recorded so far and return their number.
    pub fn check_accumulated_errors(&self) -> usize {
        match self.errors.len() {
            0 => info!("No errors were encountered"),
            n => error!("{n} error(s) were encountered during this run"),
        }
        self.errors.len()
    }
}
