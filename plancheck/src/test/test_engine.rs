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
use crate::bias::NeutralBias;
use crate::bugs::load_bug_file;
use crate::dominance::NumericDominance;
use crate::engine::{FuzzerSettings, PoolFuzzerEngine, PoolTesterEngine, PoolTesterSettings};
use crate::fdr::{Task, Variable};
use crate::filter::AcceptAllFilter;
use crate::oracle::iterative_improvement::{
    IterativeImprovementOracle, IterativeImprovementSettings,
};
use crate::oracle::UNSOLVED_BUG_VALUE;
use crate::policies::CachedPolicy;
use crate::pool::load_pool_file;
use crate::state::StateRegistry;
use crate::Error;

fn identity_oracle(task: &Task) -> IterativeImprovementOracle {
    IterativeImprovementOracle::new(
        NumericDominance::identity(task),
        IterativeImprovementSettings::default(),
        None,
    )
    .unwrap()
}

#[test]
fn trivial_goal_run_finds_no_bugs() {
    // the initial state is already a goal state
    let task = Task::new(
        vec![Variable::unnamed(0, 1)],
        vec![0],
        vec![(0, 0)],
        Vec::new(),
        true,
    );
    let oracle = identity_oracle(&task);
    let mut settings = FuzzerSettings::default();
    settings.max_steps = 1;
    let mut engine = PoolFuzzerEngine::new(
        task,
        Box::new(MapPolicy::empty()),
        Some(Box::new(oracle)),
        Box::new(NeutralBias),
        Box::new(AcceptAllFilter),
        None,
        settings,
    )
    .unwrap();
    engine.run().unwrap();
    assert_eq!(engine.pool().len(), 1);
    assert_eq!(engine.environment().bugs.num_bugs(), 0);
}

#[test]
fn duplicate_walks_are_counted() {
    // [0] <-> [1], the unreachable goal is [2]; after both states are pooled, every
    // further walk ends in a duplicate
    let task = single_var_task(3, vec![unary_op("a", 0, 0, 1, 1), unary_op("b", 0, 1, 0, 1)]);
    let mut settings = FuzzerSettings::default();
    settings.max_steps = 4;
    settings.max_walk_length = 1;
    let mut engine = PoolFuzzerEngine::new(
        task,
        Box::new(MapPolicy::empty()),
        None,
        Box::new(NeutralBias),
        Box::new(AcceptAllFilter),
        None,
        settings,
    )
    .unwrap();
    engine.run().unwrap();
    assert_eq!(engine.duplicates(), 2);

    let pooled: std::collections::HashSet<Vec<i32>> = engine
        .pool()
        .iter()
        .map(|e| engine.environment().registry.lookup(e.state).to_vec())
        .collect();
    assert_eq!(pooled, maplit::hashset! {vec![0], vec![1]});
}

#[test]
fn surrendering_policy_produces_qualitative_bugs_and_files() {
    // a two step corridor the policy refuses to walk
    let task = single_var_task(3, vec![unary_op("a", 0, 0, 1, 1), unary_op("b", 0, 1, 2, 1)]);
    let oracle = identity_oracle(&task);
    let pool_path = temp_file("engine-pool");
    let bugs_path = temp_file("engine-bugs");
    let mut settings = FuzzerSettings::default();
    settings.max_steps = 2;
    settings.max_walk_length = 1;
    settings.pool_file = Some(pool_path.clone());
    settings.bugs_file = Some(bugs_path.clone());
    let mut engine = PoolFuzzerEngine::new(
        task,
        Box::new(MapPolicy::empty()),
        Some(Box::new(oracle)),
        Box::new(NeutralBias),
        Box::new(AcceptAllFilter),
        None,
        settings,
    )
    .unwrap();
    engine.run().unwrap();

    // both pooled states are solvable but unsolved by the policy
    assert_eq!(engine.pool().len(), 2);
    assert_eq!(engine.environment().bugs.num_bugs(), 2);
    assert_eq!(engine.environment().bugs.num_unsolved_state_bugs(), 2);

    let mut registry = StateRegistry::new();
    let pool = load_pool_file(&mut registry, &pool_path).unwrap();
    assert_eq!(pool.len(), 2);
    assert_eq!(pool[1].ref_index, Some(0));

    let mut registry = StateRegistry::new();
    let bugs = load_bug_file(&mut registry, &bugs_path).unwrap();
    assert_eq!(bugs.len(), 2);
    assert!(bugs.iter().all(|b| b.result.bug_value == UNSOLVED_BUG_VALUE));

    std::fs::remove_file(&pool_path).unwrap();
    std::fs::remove_file(&bugs_path).unwrap();
}

#[test]
fn pool_tester_replays_a_recorded_pool() {
    let task = single_var_task(3, vec![unary_op("a", 0, 0, 1, 1), unary_op("b", 0, 1, 2, 1)]);
    let pool_path = temp_file("tester-pool");
    {
        // record the pool with one run ...
        let mut settings = FuzzerSettings::default();
        settings.max_steps = 2;
        settings.max_walk_length = 1;
        settings.pool_file = Some(pool_path.clone());
        let mut engine = PoolFuzzerEngine::new(
            task.clone(),
            Box::new(MapPolicy::empty()),
            None,
            Box::new(NeutralBias),
            Box::new(AcceptAllFilter),
            None,
            settings,
        )
        .unwrap();
        engine.run().unwrap();
    }

    // ... and replay it against a surrendering policy
    let oracle = identity_oracle(&task);
    let mut engine = PoolTesterEngine::new(
        task,
        Box::new(MapPolicy::empty()),
        Box::new(oracle),
        &pool_path,
        PoolTesterSettings::default(),
    )
    .unwrap();
    engine.run().unwrap();
    assert_eq!(engine.pool().len(), 2);
    assert_eq!(engine.environment().bugs.num_bugs(), 2);

    std::fs::remove_file(&pool_path).unwrap();
}

#[test]
fn pool_tester_rejects_mismatched_pool() {
    // the recorded pool starts from a different initial state
    let task = single_var_task(3, vec![unary_op("a", 0, 0, 1, 1)]);
    let pool_path = temp_file("mismatched-pool");
    std::fs::write(
        &pool_path,
        "sas_variables\n1\n3;val0;val1;val2\npool\n-1;0;0;1\n",
    )
    .unwrap();
    let result = PoolTesterEngine::new(
        task,
        Box::new(MapPolicy::empty()),
        Box::new(identity_oracle(&single_var_task(3, vec![]))),
        &pool_path,
        PoolTesterSettings::default(),
    );
    assert!(matches!(result, Err(Error::InputFormat(_))));
    std::fs::remove_file(&pool_path).unwrap();
}

#[test]
fn engine_rejects_inconsistent_cache_options() {
    let task = single_var_task(2, vec![unary_op("a", 0, 0, 1, 1)]);
    let mut settings = FuzzerSettings::default();
    settings.read_policy_cache = true;
    settings.just_write_policy_cache = true;
    settings.policy_cache_file = Some(temp_file("cache"));
    let result = PoolFuzzerEngine::new(
        task.clone(),
        Box::new(CachedPolicy),
        None,
        Box::new(NeutralBias),
        Box::new(AcceptAllFilter),
        None,
        settings,
    );
    assert!(matches!(result, Err(Error::Configuration(_))));

    let mut settings = FuzzerSettings::default();
    settings.read_policy_cache = true;
    let result = PoolFuzzerEngine::new(
        task,
        Box::new(CachedPolicy),
        None,
        Box::new(NeutralBias),
        Box::new(AcceptAllFilter),
        None,
        settings,
    );
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn engine_rejects_axioms() {
    let mut task = single_var_task(2, vec![unary_op("a", 0, 0, 1, 1)]);
    task.axioms.push(unary_op("<axiom>", 0, 0, 1, 0));
    let result = PoolFuzzerEngine::new(
        task,
        Box::new(CachedPolicy),
        None,
        Box::new(NeutralBias),
        Box::new(AcceptAllFilter),
        None,
        FuzzerSettings::default(),
    );
    assert!(matches!(result, Err(Error::Unsupported(_))));
}
