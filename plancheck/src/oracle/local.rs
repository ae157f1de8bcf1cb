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

//! The local bug criterion shared by the dominance based oracles.
//!
//! For a policy-chosen step `s -> t` via operator `o`: if `D(t, s)` is finite and
//! `c(o) + D(t, s) > 0`, then substituting `t` for `s` saves `c(o) + D(t, s)` cost, so `s`
//! is a bug of at least that value.

use crate::dominance::{NumericDominance, MINUS_INFINITY};
use crate::env::TestingEnvironment;
use crate::fdr::OperatorId;
use crate::oracle::{BugValue, TestResult};
use crate::policy::{Policy, PolicyCost};
use crate::state::StateId;
use crate::Result;

/// Whether and how to apply the local bug criterion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalBugTest {
    /// Do not apply the local criterion
    None,
    /// Apply it only to the first step of the policy run
    One,
    /// Apply it to every step of the policy run, in reverse order
    All,
}

/// Apply the criterion to the single step `s -> t` via `op`, carrying the bug value
/// `additional` aggregated over the later steps. Reports `s` whenever the combined value is
/// positive and returns it.
pub(crate) fn local_bug_test_step(
    relation: &NumericDominance,
    env: &mut TestingEnvironment,
    policy: &Policy,
    s: StateId,
    op: OperatorId,
    t: StateId,
    additional: BugValue,
) -> BugValue {
    debug_assert!(additional >= 0);
    let action_cost = env.task.operator_cost(op);
    let dominance = relation.value_ids(&env.registry, t, s);
    if dominance != MINUS_INFINITY && action_cost > -dominance {
        let combined = action_cost + dominance + additional;
        debug_assert!(combined > 0);
        env.add_additional_bug(policy, s, TestResult::with_bug_value(combined));
        combined
    } else {
        if additional > 0 {
            env.add_additional_bug(policy, s, TestResult::with_bug_value(additional));
        }
        additional
    }
}

fn local_bug_test_first(
    relation: &NumericDominance,
    env: &mut TestingEnvironment,
    policy: &mut Policy,
    s: StateId,
) -> Result<BugValue> {
    if env.is_goal(s) {
        return Ok(0);
    }
    if policy.read_upper_policy_cost_bound(env, s).0 == PolicyCost::Unsolved {
        // the criterion needs a complete policy run
        return Ok(0);
    }
    let op = match policy.lookup_action(s) {
        Some(op) => op,
        None => return Ok(0),
    };
    let t = env.successor(s, op);
    Ok(local_bug_test_step(relation, env, policy, s, op, t, 0))
}

fn complete_local_bug_test(
    relation: &NumericDominance,
    env: &mut TestingEnvironment,
    policy: &mut Policy,
    start: StateId,
) -> Result<BugValue> {
    if policy.read_upper_policy_cost_bound(env, start).0 == PolicyCost::Unsolved {
        return Ok(0);
    }
    let (run, path) = policy.execute_get_plan_and_path(env, start, None, true)?;
    debug_assert!(run.complete && run.solved);
    let plan = run.plan;
    debug_assert_eq!(plan.len() + 1, path.len());
    let mut aggregated = 0;
    for path_index in (1..path.len()).rev() {
        let predecessor = path_index - 1;
        aggregated = local_bug_test_step(
            relation,
            env,
            policy,
            path[predecessor],
            plan[predecessor],
            path[path_index],
            aggregated,
        );
    }
    Ok(aggregated)
}

/// Apply the configured variant of the local bug criterion to `s`.
pub(crate) fn local_bug_test(
    relation: &NumericDominance,
    kind: LocalBugTest,
    env: &mut TestingEnvironment,
    policy: &mut Policy,
    s: StateId,
) -> Result<BugValue> {
    match kind {
        LocalBugTest::None => Ok(0),
        LocalBugTest::One => local_bug_test_first(relation, env, policy, s),
        LocalBugTest::All => complete_local_bug_test(relation, env, policy, s),
    }
}
