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

//! # Unrelaxation oracle
//!
//! Metamorphic testing through single-fact unrelaxations: for a candidate `t`, every state
//! `t'` differing from `t` in exactly one variable with `D(t', t) > -∞` is comparable to
//! `t`, with `h*(t) <= h*(t') + ... <= cost(t') - D(t', t)`. If the policy solves such a
//! `t'` at a cost lower than `policycost(t) + D(t', t)`, then the policy takes a provable
//! detour on `t`.

use crate::dominance::{NumericDominance, MINUS_INFINITY};
use crate::env::TestingEnvironment;
use crate::eval::Evaluator;
use crate::oracle::local::{self, LocalBugTest};
use crate::oracle::{Oracle, OracleSettings, TestResult, UNSOLVED_BUG_VALUE};
use crate::policy::{Policy, PolicyCost};
use crate::state::StateId;
use crate::Result;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Configuration of the [`UnrelaxationOracle`].
#[derive(Clone, Copy, Debug)]
pub struct UnrelaxationSettings {
    /// Shared oracle options
    pub oracle: OracleSettings,
    /// Local bug criterion mode
    pub local_bug_test: LocalBugTest,
    /// Number of unrelaxations to evaluate per candidate (at least 1)
    pub operations_per_state: usize,
    /// Step bound for each policy evaluation on an unrelaxed state
    pub max_evaluation_steps: Option<i32>,
    /// Seed of the unrelaxation shuffle
    pub seed: u64,
}

impl Default for UnrelaxationSettings {
    fn default() -> Self {
        UnrelaxationSettings {
            oracle: OracleSettings::default(),
            local_bug_test: LocalBugTest::All,
            operations_per_state: 4,
            max_evaluation_steps: None,
            seed: 1734,
        }
    }
}

/// The single-fact unrelaxation oracle. See the module documentation.
pub struct UnrelaxationOracle {
    settings: UnrelaxationSettings,
    relation: NumericDominance,
    dead_end_eval: Option<Box<dyn Evaluator>>,
    rng: StdRng,
}

impl UnrelaxationOracle {
    /// Create the oracle around a dominance relation.
    pub fn new(
        relation: NumericDominance,
        settings: UnrelaxationSettings,
        dead_end_eval: Option<Box<dyn Evaluator>>,
    ) -> Self {
        let settings = UnrelaxationSettings {
            operations_per_state: settings.operations_per_state.max(1),
            ..settings
        };
        UnrelaxationOracle {
            rng: StdRng::seed_from_u64(settings.seed),
            settings,
            relation,
            dead_end_eval,
        }
    }

    /// Enumerate the comparable single-fact unrelaxations of `s` with their dominance
    /// values, shuffled and capped at `operations_per_state`.
    fn unrelax(
        &mut self,
        env: &mut TestingEnvironment,
        s: StateId,
    ) -> Vec<(StateId, i32)> {
        let relaxed = env.registry.lookup(s).to_vec();
        let mut result = Vec::new();
        for var in 0..env.task.num_variables() {
            let relaxed_value = relaxed[var];
            for unrelaxed_value in 0..env.task.domain_size(var) as i32 {
                if unrelaxed_value == relaxed_value {
                    continue;
                }
                let mut unrelaxed = relaxed.clone();
                unrelaxed[var] = unrelaxed_value;
                let dominance = self.relation.value(&unrelaxed, &relaxed);
                if dominance == MINUS_INFINITY {
                    continue;
                }
                result.push((env.registry.intern(unrelaxed), dominance));
            }
        }
        result.shuffle(&mut self.rng);
        result.truncate(self.settings.operations_per_state);
        result
    }
}

impl Oracle for UnrelaxationOracle {
    fn settings(&self) -> &OracleSettings {
        &self.settings.oracle
    }

    fn test(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        relaxed_state: StateId,
    ) -> Result<TestResult> {
        let (lower_bound, bound_is_exact) =
            policy.compute_lower_policy_cost_bound(env, relaxed_state, None)?;

        let mut bug_value = local::local_bug_test(
            &self.relation,
            self.settings.local_bug_test,
            env,
            policy,
            relaxed_state,
        )?;

        // skip the unrelaxations if the local criterion already confirmed a bug
        if bug_value > 0 {
            if bug_value < UNSOLVED_BUG_VALUE && bound_is_exact {
                if let PolicyCost::Finite(lower) = lower_bound {
                    return Ok(TestResult::new(
                        bug_value,
                        PolicyCost::Finite(lower - bug_value),
                    ));
                }
            }
            return Ok(TestResult::with_bug_value(bug_value));
        }

        let mut upper_cost_bound = PolicyCost::Unsolved;

        for (unrelaxed_state, dominance) in self.unrelax(env, relaxed_state) {
            debug_assert_ne!(relaxed_state, unrelaxed_state);
            let mut cost_limit: Option<i32> = None;
            if let PolicyCost::Finite(lower) = lower_bound {
                // bug criterion: cost(unrelaxed) < cost(relaxed) + dominance
                let limit = lower + dominance;
                if limit < 0 {
                    // the unrelaxed cost cannot be negative, no bug detectable
                    continue;
                }
                cost_limit = Some(limit);
            }

            let cost_unrelaxed = policy.lazy_compute_policy_cost(
                env,
                unrelaxed_state,
                cost_limit,
                self.settings.max_evaluation_steps,
                self.dead_end_eval
                    .as_mut()
                    .map(|e| &mut **e as &mut dyn Evaluator),
            )?;

            match lower_bound {
                PolicyCost::Unsolved => {
                    // the policy fails on the relaxed state; solving a dominating state
                    // proves the relaxed state solvable
                    if let PolicyCost::Finite(unrelaxed_cost) = cost_unrelaxed {
                        bug_value = UNSOLVED_BUG_VALUE;
                        upper_cost_bound = PolicyCost::Finite(unrelaxed_cost - dominance);
                        break;
                    }
                }
                PolicyCost::Finite(lower) => {
                    let unrelaxed_cost = match cost_unrelaxed {
                        PolicyCost::Finite(c) => c,
                        _ => continue,
                    };
                    if (unrelaxed_cost - lower) < dominance {
                        bug_value = bug_value.max(dominance - (unrelaxed_cost - lower));
                        if bug_value > 0 {
                            upper_cost_bound = PolicyCost::Finite(unrelaxed_cost - dominance);
                            // further unrelaxations are too expensive for a better value
                            break;
                        }
                    }
                }
                PolicyCost::Unknown => unreachable!("lower cost bounds are never unknown"),
            }
        }
        Ok(TestResult::new(bug_value, upper_cost_bound))
    }
}
