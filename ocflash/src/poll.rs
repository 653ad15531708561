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

//! Busy-wait polling with an injectable clock.
//!
//! The hardware protocol is built on tight status polls: write-in-progress on the flash,
//! CR/SR on the ICAP core, the acknowledgement word of the ZynqMP consumer and the bridge
//! strobes. All of them go through [`Poller::until`], which spins with no backoff and
//! optionally gives up after a deadline or when a [`CancelToken`] fires.
//!
//! With [`PollPolicy::UNBOUNDED`] and a token nobody cancels, a poll blocks for as long as
//! the hardware does.

use crate::error::FlashError;
use log::trace;
use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source used to enforce poll deadlines.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Deterministic clock that moves forward by a fixed step every time it is read.
///
/// Lets a caller simulate hardware that never answers: a poll with a one second deadline
/// and a 100 ms step gives up after a bounded number of probes.
#[derive(Debug)]
pub struct StepClock {
    now: Cell<Duration>,
    step: Duration,
}

impl StepClock {
    pub fn new(step: Duration) -> StepClock {
        StepClock {
            now: Cell::new(Duration::ZERO),
            step,
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> Duration {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}

/// Shared flag that aborts any poll loop observing it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How long a poll may spin before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollPolicy {
    /// `None` waits forever.
    pub deadline: Option<Duration>,
}

impl PollPolicy {
    pub const UNBOUNDED: PollPolicy = PollPolicy { deadline: None };

    pub fn bounded(deadline: Duration) -> PollPolicy {
        PollPolicy {
            deadline: Some(deadline),
        }
    }

    /// Build a policy from a millisecond count where 0 means unbounded.
    pub fn from_millis(timeout_ms: u64) -> PollPolicy {
        match timeout_ms {
            0 => PollPolicy::UNBOUNDED,
            ms => PollPolicy::bounded(Duration::from_millis(ms)),
        }
    }

    /// The tighter of the two policies.
    pub fn min(self, other: PollPolicy) -> PollPolicy {
        match (self.deadline, other.deadline) {
            (Some(a), Some(b)) => PollPolicy::bounded(a.min(b)),
            (Some(a), None) | (None, Some(a)) => PollPolicy::bounded(a),
            (None, None) => PollPolicy::UNBOUNDED,
        }
    }
}

/// One poll loop configuration.
pub struct Poller<'a> {
    clock: &'a dyn Clock,
    cancel: &'a CancelToken,
    policy: PollPolicy,
}

impl<'a> Poller<'a> {
    pub fn new(clock: &'a dyn Clock, cancel: &'a CancelToken, policy: PollPolicy) -> Poller<'a> {
        Poller {
            clock,
            cancel,
            policy,
        }
    }

    /// Call `probe` until it returns `Ok(true)`.
    ///
    /// # Returns: `Result<u64, FlashError>`
    /// * `Ok(u64)` - Number of probes it took, at least 1
    /// * `Err(FlashError::PollTimeout)` - The deadline passed before `probe` succeeded
    /// * `Err(FlashError::Cancelled)` - The cancel token fired
    /// * `Err(_)` - Any error returned by `probe`
    pub fn until<F>(&self, what: &str, mut probe: F) -> Result<u64, FlashError>
    where
        F: FnMut() -> Result<bool, FlashError>,
    {
        let start = self.clock.now();
        let mut probes: u64 = 0;
        loop {
            probes += 1;
            if probe()? {
                if probes > 1 {
                    trace!("{what}: done after {probes} polls");
                }
                return Ok(probes);
            }
            if self.cancel.is_cancelled() {
                return Err(FlashError::Cancelled { what: what.into() });
            }
            if let Some(limit) = self.policy.deadline {
                let waited = self.clock.now().saturating_sub(start);
                if waited >= limit {
                    return Err(FlashError::PollTimeout {
                        what: what.into(),
                        waited,
                    });
                }
            }
            std::hint::spin_loop();
        }
    }
}
