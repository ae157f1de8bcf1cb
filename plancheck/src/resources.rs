// Plancheck: Metamorphic Testing of Action Policies for Classical Planning
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Cooperative time and memory limits.
//!
//! Execution is single threaded. All long running operations (policy execution, pairwise
//! comparisons, lookahead expansions, successor enumeration) call [`ResourceLimits::check`]
//! at well defined suspension points and propagate [`Error::OutOfResource`] upwards with `?`.
//! Only the engine catches the error; every component must have its invariants restored
//! before returning it.

use crate::{Error, Result};

use std::time::{Duration, Instant};

/// Deadline and memory bookkeeping shared by all components of a testing run.
///
/// Deadlines are propagated top down: the engine computes the remaining time of the overall
/// run and calls [`ResourceLimits::set_max_time`] before every step.
#[derive(Debug, Default)]
pub struct ResourceLimits {
    deadline: Option<Instant>,
    memory_limit_kb: Option<u64>,
    padding: Option<Vec<u8>>,
}

impl ResourceLimits {
    /// Create limits without any deadline or memory bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline to `max_time` from now.
    pub fn set_max_time(&mut self, max_time: Duration) {
        self.deadline = Some(Instant::now() + max_time);
    }

    /// Remove the deadline.
    pub fn clear_max_time(&mut self) {
        self.deadline = None;
    }

    /// Bound the peak resident set size (in kilobytes).
    pub fn set_memory_limit_kb(&mut self, limit: u64) {
        self.memory_limit_kb = Some(limit);
    }

    /// The time left until the deadline. `None` if no deadline is set.
    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Check whether the deadline has passed or the memory bound is exceeded.
    pub fn are_limits_reached(&self) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        if let Some(limit) = self.memory_limit_kb {
            if let Some(used) = peak_memory_kb() {
                if used >= limit {
                    return true;
                }
            }
        }
        false
    }

    /// Raise [`Error::OutOfResource`] if a limit is reached. Called at suspension points.
    pub fn check(&self) -> Result<()> {
        if self.are_limits_reached() {
            Err(Error::OutOfResource)
        } else {
            Ok(())
        }
    }

    /// Reserve a chunk of memory that can be released when memory runs out, so that the
    /// engine has room left for reporting results after catching [`Error::OutOfResource`].
    pub fn reserve_extra_memory_padding(&mut self, megabytes: usize) {
        if self.padding.is_none() {
            self.padding = Some(vec![0u8; megabytes * 1024 * 1024]);
        }
    }

    /// Release the reserved padding again.
    pub fn release_extra_memory_padding(&mut self) {
        self.padding = None;
    }
}

/// Peak resident set size of this process in kilobytes, if the platform exposes it.
#[cfg(target_os = "linux")]
pub fn peak_memory_kb() -> Option<u64> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::uninit();
    let ret = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if ret == 0 {
        let usage = unsafe { usage.assume_init() };
        // ru_maxrss is reported in kilobytes on linux
        Some(usage.ru_maxrss as u64)
    } else {
        None
    }
}

/// Peak resident set size of this process in kilobytes, if the platform exposes it.
#[cfg(not(target_os = "linux"))]
pub fn peak_memory_kb() -> Option<u64> {
    None
}
