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

//! Shared fixtures for the test modules.

use crate::env::TestingEnvironment;
use crate::fdr::{Effect, Operator, OperatorId, Task, Val, Variable};
use crate::policy::{Policy, PolicyProvider};
use crate::pool::PoolEntry;
use crate::state::StateId;
use crate::Result;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An operator on a single variable: `pre -> post` with the given cost.
pub fn unary_op(name: &str, var: usize, pre: Val, post: Val, cost: i32) -> Operator {
    Operator {
        name: name.to_string(),
        prevail: Vec::new(),
        effects: vec![Effect {
            conditions: Vec::new(),
            var,
            pre: Some(pre),
            post,
        }],
        cost,
    }
}

/// A task over a single variable with the given domain size, initial value 0 and the goal
/// `var0 = domain - 1`.
pub fn single_var_task(domain: usize, operators: Vec<Operator>) -> Task {
    Task::new(
        vec![Variable::unnamed(0, domain)],
        vec![0],
        vec![(0, domain as Val - 1)],
        operators,
        true,
    )
}

/// A policy choosing operators by a fixed state-to-operator map, surrendering elsewhere.
pub struct MapPolicy {
    choices: HashMap<Vec<Val>, usize>,
}

impl MapPolicy {
    pub fn new(choices: Vec<(Vec<Val>, usize)>) -> Self {
        MapPolicy {
            choices: choices.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        MapPolicy {
            choices: HashMap::new(),
        }
    }
}

impl PolicyProvider for MapPolicy {
    fn apply(&mut self, _task: &Task, state: &[Val]) -> Result<Option<OperatorId>> {
        Ok(self.choices.get(state).map(|&i| OperatorId(i)))
    }
}

/// Wrap an environment and a policy for a task.
pub fn setup(task: Task, provider: impl PolicyProvider + 'static) -> (TestingEnvironment, Policy) {
    let env = TestingEnvironment::new(task);
    let policy = Policy::new(Box::new(provider), 0);
    (env, policy)
}

/// A root pool entry for the given state.
pub fn root_entry(state: StateId) -> PoolEntry {
    PoolEntry {
        ref_index: None,
        ref_state: StateId::NONE,
        steps: 0,
        state,
    }
}

/// A unique path in the system temp directory.
pub fn temp_file(name: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "plancheck-test-{}-{}-{}",
        std::process::id(),
        id,
        name
    ))
}
