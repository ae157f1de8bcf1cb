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

use super::helpers::*;
use crate::bias::{FuzzingBias, PlanLengthBias, PolicyHeuristicBias, NEGATIVE_INFINITY, POSITIVE_INFINITY};
use crate::eval::{Estimate, Evaluator, GoalCountEvaluator};
use crate::fdr::{Task, Val};

fn chain_ops() -> Vec<crate::fdr::Operator> {
    vec![
        unary_op("a", 0, 0, 1, 1),
        unary_op("b", 0, 1, 2, 2),
        unary_op("c", 0, 2, 3, 3),
    ]
}

fn chain_policy() -> MapPolicy {
    MapPolicy::new(vec![(vec![0], 0), (vec![1], 1), (vec![2], 2)])
}

#[test]
fn plan_length_bias_uses_policy_cost() {
    let task = single_var_task(4, chain_ops());
    let (mut env, mut policy) = setup(task, chain_policy());
    let s0 = env.initial_state();
    let mut bias = PlanLengthBias::new(50);
    assert_eq!(bias.bias(&mut env, &mut policy, s0, 0).unwrap(), 6);
}

#[test]
fn plan_length_bias_penalizes_failures() {
    let task = single_var_task(4, chain_ops());
    let (mut env, mut policy) = setup(task, MapPolicy::empty());
    let s0 = env.initial_state();
    let mut bias = PlanLengthBias::new(50);
    assert_eq!(
        bias.bias(&mut env, &mut policy, s0, 0).unwrap(),
        POSITIVE_INFINITY
    );
    assert!(bias
        .policy_is_known_to_fail(&mut env, &mut policy, s0, 0)
        .unwrap());
}

#[test]
fn plan_length_bias_on_aborted_evaluation() {
    let task = single_var_task(4, chain_ops());
    let (mut env, mut policy) = setup(task, chain_policy());
    let s0 = env.initial_state();
    // the horizon cuts the run after one step, so the cost is unknown
    let mut bias = PlanLengthBias::new(1);
    assert_eq!(bias.bias(&mut env, &mut policy, s0, 0).unwrap(), 2);
}

#[test]
fn policy_heuristic_bias_measures_detour() {
    let task = single_var_task(4, chain_ops());
    let (mut env, mut policy) = setup(task, chain_policy());
    let s0 = env.initial_state();
    let mut bias = PolicyHeuristicBias::new(Box::new(GoalCountEvaluator), 50);
    // remaining path costs are 6, 5, 3 against a goal count of 1
    assert_eq!(bias.bias(&mut env, &mut policy, s0, 0).unwrap(), 5);
}

#[test]
fn policy_heuristic_bias_excludes_dead_ends() {
    struct DeadStart;
    impl Evaluator for DeadStart {
        fn estimate(&mut self, _task: &Task, state: &[Val]) -> Estimate {
            if state[0] == 0 {
                Estimate::DeadEnd
            } else {
                Estimate::Value(0)
            }
        }
    }

    let task = single_var_task(4, chain_ops());
    let (mut env, mut policy) = setup(task, chain_policy());
    let s0 = env.initial_state();
    let mut bias = PolicyHeuristicBias::new(Box::new(DeadStart), 50);
    assert!(bias.can_exclude_state(&mut env, &mut policy, s0).unwrap());
    assert_eq!(
        bias.bias(&mut env, &mut policy, s0, 0).unwrap(),
        NEGATIVE_INFINITY
    );
}
