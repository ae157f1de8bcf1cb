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

//! The shared testing environment.
//!
//! A [`TestingEnvironment`] bundles everything the components of a testing run mutate
//! together: the immutable task, the state registry, the resource limits and the bug store.
//! It is passed explicitly to every component; there is no process-global state.

use crate::bugs::BugRegistry;
use crate::fdr::{OperatorId, Task};
use crate::oracle::TestResult;
use crate::policy::Policy;
use crate::resources::ResourceLimits;
use crate::state::{StateId, StateRegistry};
use crate::Result;

/// Environment shared across the components of a testing run.
#[derive(Debug)]
pub struct TestingEnvironment {
    /// The immutable planning task
    pub task: Task,
    /// The state interning registry
    pub registry: StateRegistry,
    /// Cooperative time and memory limits
    pub limits: ResourceLimits,
    /// The bug store
    pub bugs: BugRegistry,
}

impl TestingEnvironment {
    /// Create an environment for the given task.
    pub fn new(task: Task) -> Self {
        TestingEnvironment {
            task,
            registry: StateRegistry::new(),
            limits: ResourceLimits::new(),
            bugs: BugRegistry::new(),
        }
    }

    /// Intern the task's initial state.
    pub fn initial_state(&mut self) -> StateId {
        let values = self.task.initial_state.clone();
        self.registry.intern(values)
    }

    /// Check if the given state is a goal state.
    pub fn is_goal(&self, state: StateId) -> bool {
        self.task.is_goal_state(self.registry.lookup(state))
    }

    /// The interned successor of `state` under `op`.
    pub fn successor(&mut self, state: StateId, op: OperatorId) -> StateId {
        self.registry.successor_state(&self.task, state, op)
    }

    /// All operators applicable in `state`, in deterministic operator-index order.
    pub fn applicable_ops(&self, state: StateId) -> Vec<OperatorId> {
        self.task.applicable_operators(self.registry.lookup(state))
    }

    /// Raise [`crate::Error::OutOfResource`] if the limits are exhausted.
    pub fn check_limits(&self) -> Result<()> {
        self.limits.check()
    }

    /// Record a bug for the state; see [`BugRegistry::add_additional_bug`]. Returns true
    /// iff the stored entry changed.
    pub fn add_additional_bug(
        &mut self,
        policy: &Policy,
        state: StateId,
        result: TestResult,
    ) -> bool {
        self.bugs
            .add_additional_bug(&self.registry, policy, state, result)
    }
}
