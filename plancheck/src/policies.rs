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

//! Bundled policy providers.
//!
//! Remote policies and learned policies are consumed through the
//! [`PolicyProvider`](crate::policy::PolicyProvider) trait and live outside of this crate.
//! The providers here cover local testing setups: greedy heuristic descent and replaying a
//! previously recorded policy cache.

use crate::eval::{Estimate, Evaluator};
use crate::fdr::{OperatorId, Task, Val};
use crate::policy::PolicyProvider;
use crate::{Error, Result};

/// Chooses the action leading to the successor with minimal heuristic value.
///
/// If `strictly_descend` is set, the chosen successor's value must be strictly smaller than
/// the state's own value, otherwise the policy surrenders. If `stop_at_dead_ends` is set,
/// the policy surrenders on states the heuristic recognizes as dead ends.
pub struct HeuristicDescendPolicy {
    heuristic: Box<dyn Evaluator>,
    strictly_descend: bool,
    stop_at_dead_ends: bool,
}

impl HeuristicDescendPolicy {
    /// Create the policy around the given heuristic.
    pub fn new(heuristic: Box<dyn Evaluator>, strictly_descend: bool, stop_at_dead_ends: bool) -> Self {
        HeuristicDescendPolicy {
            heuristic,
            strictly_descend,
            stop_at_dead_ends,
        }
    }
}

impl PolicyProvider for HeuristicDescendPolicy {
    fn apply(&mut self, task: &Task, state: &[Val]) -> Result<Option<OperatorId>> {
        let mut h0 = std::i32::MAX;
        if self.strictly_descend || self.stop_at_dead_ends {
            match self.heuristic.estimate(task, state) {
                Estimate::Value(h) => h0 = h,
                Estimate::DeadEnd => {
                    if self.stop_at_dead_ends {
                        return Ok(None);
                    }
                }
            }
        }
        let mut best: Option<OperatorId> = None;
        let mut h_best = if self.strictly_descend { h0 } else { std::i32::MAX };
        for op in task.applicable_operators(state) {
            let succ = task.apply(op, state);
            if let Estimate::Value(h) = self.heuristic.estimate(task, &succ) {
                if h < h_best {
                    best = Some(op);
                    h_best = h;
                }
            }
        }
        Ok(best)
    }
}

/// A provider that refuses to be executed: usable only together with a pre-filled policy
/// cache (see [`Policy::read_running_policy_cache`](crate::policy::Policy)).
#[derive(Debug, Default)]
pub struct CachedPolicy;

impl PolicyProvider for CachedPolicy {
    fn apply(&mut self, _task: &Task, _state: &[Val]) -> Result<Option<OperatorId>> {
        Err(Error::Unsupported(
            "the cached policy can only read cached entries".into(),
        ))
    }
}
