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

//! # Test oracles
//!
//! An [`Oracle`] decides for a candidate state whether the policy is buggy there, and
//! quantifies how buggy: the returned [`TestResult`] carries a [`BugValue`] lower-bounding
//! the policy's suboptimality on the state, and an upper bound on the optimal cost `h*` of
//! the state. The default [`Oracle::test_driver`] adds the shared machinery: the known-bug
//! shortcut, testing the intermediate states of the policy run in reverse order, and
//! propagating bugs to policy parents.
//!
//! The oracles in this module:
//!
//! - [`IterativeImprovementOracle`](iterative_improvement::IterativeImprovementOracle): the
//!   comparison based metamorphic oracle built on a numeric dominance relation.
//! - [`UnrelaxationOracle`](unrelaxation::UnrelaxationOracle): metamorphic single-fact
//!   unrelaxations through the dominance relation.
//! - [`BoundedLookaheadOracle`](external::BoundedLookaheadOracle) and
//!   [`CostEstimatorOracle`](external::CostEstimatorOracle): external oracles comparing the
//!   policy against exhaustive lookahead or a trusted cost estimator.
//! - [`CompositeOracle`](composite::CompositeOracle): combination of a metamorphic oracle
//!   with external ones.

pub mod composite;
pub mod external;
pub mod iterative_improvement;
mod local;
pub mod unrelaxation;

pub use local::LocalBugTest;

use crate::env::TestingEnvironment;
use crate::policy::{Policy, PolicyCost};
use crate::pool::PoolEntry;
use crate::state::StateId;
use crate::Result;

use std::collections::{HashSet, VecDeque};

/// Quantified bug classification of a single state: `0` is no bug, a positive value is a
/// proven lower bound on the policy's suboptimality, [`UNSOLVED_BUG_VALUE`] marks a solvable
/// state the policy fails on.
pub type BugValue = i32;

/// Marks a test whose method was not applicable to the candidate.
pub const NOT_APPLICABLE_INDICATOR: BugValue = -1;

/// Qualitative bug: the state is solvable, but the policy does not solve it.
pub const UNSOLVED_BUG_VALUE: BugValue = i32::max_value();

/// Join of two bug values: the numeric maximum, with [`UNSOLVED_BUG_VALUE`] absorbing and
/// not-applicable results deferring to the other side.
pub fn bug_value_best_of(left: BugValue, right: BugValue) -> BugValue {
    if left < 0 {
        right
    } else if right < 0 {
        left
    } else {
        left.max(right)
    }
}

/// Result of testing a single state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TestResult {
    /// The proven bug value of the state
    pub bug_value: BugValue,
    /// The best known upper bound on `h*` of the state
    pub upper_cost_bound: PolicyCost,
}

impl TestResult {
    /// A result with a bug value and an upper cost bound.
    pub fn new(bug_value: BugValue, upper_cost_bound: PolicyCost) -> Self {
        TestResult {
            bug_value,
            upper_cost_bound,
        }
    }

    /// A result carrying only a bug value.
    pub fn with_bug_value(bug_value: BugValue) -> Self {
        TestResult {
            bug_value,
            upper_cost_bound: PolicyCost::Unsolved,
        }
    }
}

impl Default for TestResult {
    fn default() -> Self {
        TestResult {
            bug_value: 0,
            upper_cost_bound: PolicyCost::Unsolved,
        }
    }
}

/// Combine two test results: the larger bug value and the tighter upper bound.
pub fn best_of(left: TestResult, right: TestResult) -> TestResult {
    TestResult {
        bug_value: bug_value_best_of(left.bug_value, right.bug_value),
        upper_cost_bound: PolicyCost::min_cost(left.upper_cost_bound, right.upper_cost_bound),
    }
}

/// Options shared by all oracles.
#[derive(Clone, Copy, Debug, Default)]
pub struct OracleSettings {
    /// For every reported bug go through all policy parents and report them as bugs as well.
    pub report_parent_bugs: bool,
    /// Also conduct the test for intermediate states of the policy run.
    pub consider_intermediate_states: bool,
    /// Consider intermediate states even if the candidate is already a known bug.
    pub enforce_intermediate: bool,
}

/// A test oracle. See the module documentation.
pub trait Oracle {
    /// The shared oracle options.
    fn settings(&self) -> &OracleSettings;

    /// Check whether the given state is a bug in the policy.
    ///
    /// The bug value is [`NOT_APPLICABLE_INDICATOR`] if the method cannot be applied to the
    /// candidate, and [`UNSOLVED_BUG_VALUE`] if the state is solvable but the policy does not
    /// induce a plan. Raises [`crate::Error::OutOfResource`] when the budget runs out.
    fn test(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
    ) -> Result<TestResult>;

    /// Check whether the given pool entry is a bug in the policy.
    ///
    /// The default driver returns the stored result for known bugs, tests the intermediate
    /// states of the policy run in reverse order, and propagates positive results to policy
    /// parents if configured.
    fn test_driver(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        entry: &PoolEntry,
    ) -> Result<TestResult> {
        let pool_state = entry.state;
        let settings = *self.settings();
        if env.bugs.is_known_bug(pool_state) && !settings.enforce_intermediate {
            return Ok(env.bugs.stored_result(pool_state));
        }
        if settings.consider_intermediate_states || settings.enforce_intermediate {
            let path = policy.execute_get_path_fragment(env, pool_state, None, true)?;
            debug_assert!(!path.is_empty());
            // test intermediate states in reverse order, skipping the pool state itself
            for &intermediate in path[1..].iter().rev() {
                if env.is_goal(intermediate) || env.bugs.is_known_bug(intermediate) {
                    continue;
                }
                let intermediate_result = self.test(env, policy, intermediate)?;
                if intermediate_result.bug_value > 0 {
                    env.add_additional_bug(policy, intermediate, intermediate_result);
                    if settings.report_parent_bugs {
                        report_parents_as_bugs(env, policy, intermediate, intermediate_result);
                        return Ok(intermediate_result);
                    }
                }
            }
            if env.bugs.is_known_bug(pool_state) {
                return Ok(env.bugs.stored_result(pool_state));
            }
        }

        let test_result = self.test(env, policy, pool_state)?;
        if test_result.bug_value > 0 && settings.report_parent_bugs {
            report_parents_as_bugs(env, policy, pool_state, test_result);
        }
        Ok(test_result)
    }

    /// Feed a cost bound obtained elsewhere into the oracle's bookkeeping.
    ///
    /// Does not guarantee to flag the state itself as a bug. Should only be called after
    /// `test` has run on the state.
    fn add_external_cost_bound(
        &mut self,
        _env: &mut TestingEnvironment,
        _policy: &mut Policy,
        _state: StateId,
        _bound: PolicyCost,
    ) -> Result<()> {
        Ok(())
    }

    /// Print oracle specific statistics at the end of the run.
    fn print_statistics(&self) {}
}

/// Goes through all known policy parents (transitively) of `state` and reports them as bugs,
/// bumping each parent's stored bug value only if the new value is strictly larger. If an
/// upper cost bound is known, the parent's bound is updated to `child_bound + edge_cost`.
pub fn report_parents_as_bugs(
    env: &mut TestingEnvironment,
    policy: &Policy,
    state: StateId,
    test_result: TestResult,
) {
    if test_result.bug_value <= 0 {
        return;
    }
    let mut processed: HashSet<StateId> = HashSet::new();
    if test_result.upper_cost_bound == PolicyCost::Unsolved {
        // no cost bounds can be propagated
        let mut queue: VecDeque<StateId> = VecDeque::new();
        queue.push_back(state);
        while let Some(current) = queue.pop_front() {
            if !processed.insert(current) {
                continue;
            }
            for &parent in policy.get_policy_parent_states(current) {
                let old_value = env.bugs.stored_result(parent).bug_value;
                if test_result.bug_value <= old_value {
                    continue;
                }
                env.add_additional_bug(policy, parent, test_result);
                queue.push_back(parent);
            }
        }
    } else {
        let mut queue: VecDeque<(StateId, PolicyCost)> = VecDeque::new();
        queue.push_back((state, test_result.upper_cost_bound));
        while let Some((current, current_bound)) = queue.pop_front() {
            if !processed.insert(current) {
                continue;
            }
            for &parent in policy.get_policy_parent_states(current) {
                let old_value = env.bugs.stored_result(parent).bug_value;
                if test_result.bug_value <= old_value {
                    continue;
                }
                let parent_bound = PolicyCost::add_cost(
                    current_bound,
                    PolicyCost::Finite(policy.read_action_cost(&env.task, parent)),
                );
                env.add_additional_bug(
                    policy,
                    parent,
                    TestResult::new(test_result.bug_value, parent_bound),
                );
                queue.push_back((parent, parent_bound));
            }
        }
    }
}
