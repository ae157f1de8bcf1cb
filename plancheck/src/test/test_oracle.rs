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
use crate::dominance::{NumericDominance, MINUS_INFINITY};
use crate::env::TestingEnvironment;
use crate::eval::{CostEstimate, PlanCostEstimator};
use crate::fdr::{Task, Val};
use crate::oracle::composite::CompositeOracle;
use crate::oracle::external::{BoundedLookaheadOracle, BoundedLookaheadSettings, CostEstimatorOracle};
use crate::oracle::iterative_improvement::{
    IterativeImprovementOracle, IterativeImprovementSettings,
};
use crate::oracle::unrelaxation::{UnrelaxationOracle, UnrelaxationSettings};
use crate::oracle::{
    Oracle, OracleSettings, TestResult, LocalBugTest, UNSOLVED_BUG_VALUE,
};
use crate::policy::{Policy, PolicyCost};
use crate::state::StateId;
use crate::{Error, Result};

fn ii_oracle(
    task: &Task,
    tables: Option<Vec<Vec<Vec<i32>>>>,
    tweak: impl FnOnce(&mut IterativeImprovementSettings),
) -> IterativeImprovementOracle {
    let relation = match tables {
        Some(tables) => NumericDominance::from_atomic_tables(task, tables).unwrap(),
        None => NumericDominance::identity(task),
    };
    let mut settings = IterativeImprovementSettings::default();
    tweak(&mut settings);
    IterativeImprovementOracle::new(relation, settings, None).unwrap()
}

/// A square table with 0 on the diagonal and -infinity elsewhere, with overrides.
fn table(size: usize, overrides: &[(usize, usize, i32)]) -> Vec<Vec<i32>> {
    let mut table: Vec<Vec<i32>> = (0..size)
        .map(|a| {
            (0..size)
                .map(|b| if a == b { 0 } else { MINUS_INFINITY })
                .collect()
        })
        .collect();
    for &(a, b, v) in overrides {
        table[a][b] = v;
    }
    table
}

#[test]
fn trivial_goal_state_is_no_bug() {
    // the initial state already satisfies the goal
    let task = Task::new(
        vec![crate::fdr::Variable::unnamed(0, 1)],
        vec![0],
        vec![(0, 0)],
        Vec::new(),
        true,
    );
    let mut oracle = ii_oracle(&task, None, |_| {});
    let (mut env, mut policy) = setup(task, MapPolicy::empty());
    let s0 = env.initial_state();
    let result = oracle
        .test_driver(&mut env, &mut policy, &root_entry(s0))
        .unwrap();
    assert_eq!(result, TestResult::new(0, PolicyCost::Finite(0)));
    assert!(!oracle.is_tested(s0));
    assert_eq!(env.bugs.num_bugs(), 0);
    oracle.assert_cost_set_invariants();
}

#[test]
fn policy_surrender_is_found_by_lookahead() {
    // the goal is one step away, but the policy gives up immediately
    let task = single_var_task(2, vec![unary_op("a", 0, 0, 1, 1)]);
    let mut oracle = ii_oracle(&task, None, |_| {});
    let (mut env, mut policy) = setup(task, MapPolicy::empty());
    let s0 = env.initial_state();
    let result = oracle
        .test_driver(&mut env, &mut policy, &root_entry(s0))
        .unwrap();
    assert_eq!(result.bug_value, UNSOLVED_BUG_VALUE);
    assert_eq!(result.upper_cost_bound, PolicyCost::Finite(1));
    assert_eq!(oracle.upper_cost_bound(s0), PolicyCost::Finite(1));
    oracle.assert_cost_set_invariants();
}

/// Two solvable states: the policy pays 10 on [0] and 20 on [1]; the dominance entry
/// D([0], [1]) = -7 proves h*([1]) <= 10 + 7 = 17, a quantitative bug of value 3.
fn comparison_fixture() -> (Task, Vec<Vec<Vec<i32>>>) {
    let task = single_var_task(
        3,
        vec![unary_op("a", 0, 0, 2, 10), unary_op("b", 0, 1, 2, 20)],
    );
    let tables = vec![table(3, &[(0, 1, -7)])];
    (task, tables)
}

#[test]
fn quantitative_bug_via_comparison() {
    let (task, tables) = comparison_fixture();
    let mut oracle = ii_oracle(&task, Some(tables), |s| {
        s.conduct_lookahead_search = false;
        s.local_bug_test = LocalBugTest::None;
    });
    let (mut env, mut policy) = setup(
        task,
        MapPolicy::new(vec![(vec![0], 0), (vec![1], 1)]),
    );
    let s1 = env.initial_state();
    let s2 = env.registry.intern(vec![1]);

    let first = oracle
        .test_driver(&mut env, &mut policy, &root_entry(s1))
        .unwrap();
    assert_eq!(first, TestResult::new(0, PolicyCost::Finite(10)));

    let second = oracle
        .test_driver(&mut env, &mut policy, &root_entry(s2))
        .unwrap();
    assert_eq!(second, TestResult::new(3, PolicyCost::Finite(17)));
    oracle.assert_cost_set_invariants();
}

#[test]
fn max_state_comparisons_zero_disables_tightening() {
    let (task, tables) = comparison_fixture();
    let mut oracle = ii_oracle(&task, Some(tables), |s| {
        s.conduct_lookahead_search = false;
        s.local_bug_test = LocalBugTest::None;
        s.max_state_comparisons = 0;
    });
    let (mut env, mut policy) = setup(
        task,
        MapPolicy::new(vec![(vec![0], 0), (vec![1], 1)]),
    );
    let s1 = env.initial_state();
    let s2 = env.registry.intern(vec![1]);
    oracle
        .test_driver(&mut env, &mut policy, &root_entry(s1))
        .unwrap();
    let second = oracle
        .test_driver(&mut env, &mut policy, &root_entry(s2))
        .unwrap();
    assert_eq!(second, TestResult::new(0, PolicyCost::Finite(20)));
    oracle.assert_cost_set_invariants();
}

#[test]
fn retesting_changes_nothing() {
    let (task, tables) = comparison_fixture();
    let mut oracle = ii_oracle(&task, Some(tables), |s| {
        s.conduct_lookahead_search = false;
        s.local_bug_test = LocalBugTest::None;
    });
    let (mut env, mut policy) = setup(
        task,
        MapPolicy::new(vec![(vec![0], 0), (vec![1], 1)]),
    );
    let s1 = env.initial_state();
    let s2 = env.registry.intern(vec![1]);
    oracle
        .test_driver(&mut env, &mut policy, &root_entry(s1))
        .unwrap();
    oracle
        .test_driver(&mut env, &mut policy, &root_entry(s2))
        .unwrap();
    let bugs_before = env.bugs.num_bugs();

    let again = oracle
        .test_driver(&mut env, &mut policy, &root_entry(s2))
        .unwrap();
    assert_eq!(again.upper_cost_bound, PolicyCost::Finite(17));
    assert_eq!(oracle.upper_cost_bound(s2), PolicyCost::Finite(17));
    assert_eq!(oracle.upper_cost_bound(s1), PolicyCost::Finite(10));
    assert_eq!(env.bugs.num_bugs(), bugs_before);
    oracle.assert_cost_set_invariants();
}

#[test]
fn parent_propagation_through_external_bound() {
    // p -> q via cost 1, q -> goal via cost 5; a bound of 4 on q makes p a bug of value 1
    let task = single_var_task(
        3,
        vec![unary_op("a", 0, 0, 1, 1), unary_op("b", 0, 1, 2, 5)],
    );
    let mut oracle = ii_oracle(&task, None, |s| {
        s.conduct_lookahead_search = false;
        s.local_bug_test = LocalBugTest::None;
    });
    let (mut env, mut policy) = setup(
        task,
        MapPolicy::new(vec![(vec![0], 0), (vec![1], 1)]),
    );
    let p = env.initial_state();
    let q = env.registry.intern(vec![1]);
    oracle
        .test_driver(&mut env, &mut policy, &root_entry(p))
        .unwrap();
    oracle
        .test_driver(&mut env, &mut policy, &root_entry(q))
        .unwrap();
    assert_eq!(env.bugs.num_bugs(), 0);

    oracle
        .add_external_cost_bound(&mut env, &mut policy, q, PolicyCost::Finite(4))
        .unwrap();

    assert_eq!(oracle.upper_cost_bound(q), PolicyCost::Finite(4));
    assert_eq!(oracle.upper_cost_bound(p), PolicyCost::Finite(5));
    assert_eq!(
        env.bugs.stored_result(p),
        TestResult::new(1, PolicyCost::Finite(5))
    );
    oracle.assert_cost_set_invariants();
}

#[test]
fn lookahead_recovers_tighter_bound() {
    // the policy solves [0] at 10, but [0] -> [1] (cost 3) combined with the stored bound
    // of 4 on [2] (via dominance) proves an upper bound of 7
    let task = single_var_task(
        4,
        vec![
            unary_op("expensive", 0, 0, 3, 10),
            unary_op("detour", 0, 0, 1, 3),
            unary_op("short", 0, 2, 3, 4),
        ],
    );
    let tables = vec![table(4, &[(2, 1, 0)])];
    let mut oracle = ii_oracle(&task, Some(tables), |s| {
        s.local_bug_test = LocalBugTest::None;
        s.max_lookahead_state_visits = 10;
    });
    let (mut env, mut policy) = setup(
        task,
        MapPolicy::new(vec![(vec![0], 0), (vec![2], 2)]),
    );
    let s = env.initial_state();
    let w = env.registry.intern(vec![2]);

    let first = oracle
        .test_driver(&mut env, &mut policy, &root_entry(w))
        .unwrap();
    assert_eq!(first, TestResult::new(0, PolicyCost::Finite(4)));

    let second = oracle
        .test_driver(&mut env, &mut policy, &root_entry(s))
        .unwrap();
    assert_eq!(second, TestResult::new(3, PolicyCost::Finite(7)));
    oracle.assert_cost_set_invariants();
}

/// An oracle returning a fixed result for one state, used to exercise the default driver.
struct FixedOracle {
    settings: OracleSettings,
    target: StateId,
    result: TestResult,
}

impl Oracle for FixedOracle {
    fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    fn test(
        &mut self,
        _env: &mut TestingEnvironment,
        _policy: &mut Policy,
        state: StateId,
    ) -> Result<TestResult> {
        if state == self.target {
            Ok(self.result)
        } else {
            Ok(TestResult::default())
        }
    }
}

#[test]
fn default_driver_propagates_parent_bugs() {
    let task = single_var_task(
        3,
        vec![unary_op("a", 0, 0, 1, 1), unary_op("b", 0, 1, 2, 5)],
    );
    let (mut env, mut policy) = setup(
        task,
        MapPolicy::new(vec![(vec![0], 0), (vec![1], 1)]),
    );
    let p = env.initial_state();
    // run the policy so that the parent edge p -> q exists
    policy.compute_policy_cost(&mut env, p, None, true).unwrap();
    let q = env.registry.find(&[1]).unwrap();

    let mut oracle = FixedOracle {
        settings: OracleSettings {
            report_parent_bugs: true,
            consider_intermediate_states: false,
            enforce_intermediate: false,
        },
        target: q,
        result: TestResult::new(2, PolicyCost::Finite(3)),
    };
    let result = oracle
        .test_driver(&mut env, &mut policy, &root_entry(q))
        .unwrap();
    assert_eq!(result.bug_value, 2);
    // the parent bound is the child bound plus the connecting action cost
    assert_eq!(
        env.bugs.stored_result(p),
        TestResult::new(2, PolicyCost::Finite(4))
    );
}

#[test]
fn default_driver_returns_known_bug() {
    let task = single_var_task(2, vec![unary_op("a", 0, 0, 1, 1)]);
    let (mut env, mut policy) = setup(task, MapPolicy::new(vec![(vec![0], 0)]));
    let s = env.initial_state();
    policy.compute_policy_cost(&mut env, s, None, true).unwrap();
    let stored = TestResult::new(9, PolicyCost::Finite(1));
    env.add_additional_bug(&policy, s, stored);

    let mut oracle = FixedOracle {
        settings: OracleSettings::default(),
        target: s,
        result: TestResult::default(),
    };
    let result = oracle
        .test_driver(&mut env, &mut policy, &root_entry(s))
        .unwrap();
    assert_eq!(result, stored);
}

#[test]
fn unrelaxation_detects_detour() {
    // the policy goes [0] -> goal for 10 although [0] -> [1] -> goal costs 3
    let task = single_var_task(
        3,
        vec![
            unary_op("expensive", 0, 0, 2, 10),
            unary_op("cheap", 0, 1, 2, 2),
            unary_op("step", 0, 0, 1, 1),
        ],
    );
    let tables = vec![table(3, &[(1, 0, -1)])];
    let relation = NumericDominance::from_atomic_tables(&task, tables).unwrap();
    let mut settings = UnrelaxationSettings::default();
    settings.local_bug_test = LocalBugTest::None;
    let mut oracle = UnrelaxationOracle::new(relation, settings, None);
    let (mut env, mut policy) = setup(
        task,
        MapPolicy::new(vec![(vec![0], 0), (vec![1], 1)]),
    );
    let t = env.initial_state();
    let result = oracle
        .test_driver(&mut env, &mut policy, &root_entry(t))
        .unwrap();
    assert_eq!(result, TestResult::new(7, PolicyCost::Finite(3)));
}

#[test]
fn unrelaxation_skips_negative_cost_caps() {
    // D([1], [0]) = -20 makes the compensated cap negative, so nothing is evaluated
    let task = single_var_task(
        3,
        vec![unary_op("expensive", 0, 0, 2, 10), unary_op("cheap", 0, 1, 2, 2)],
    );
    let tables = vec![table(3, &[(1, 0, -20)])];
    let relation = NumericDominance::from_atomic_tables(&task, tables).unwrap();
    let mut settings = UnrelaxationSettings::default();
    settings.local_bug_test = LocalBugTest::None;
    let mut oracle = UnrelaxationOracle::new(relation, settings, None);
    let (mut env, mut policy) = setup(
        task,
        MapPolicy::new(vec![(vec![0], 0), (vec![1], 1)]),
    );
    let t = env.initial_state();
    let result = oracle
        .test_driver(&mut env, &mut policy, &root_entry(t))
        .unwrap();
    assert_eq!(result.bug_value, 0);
}

#[test]
fn bounded_lookahead_finds_cheap_goal() {
    // the policy pays 10, but the goal is directly reachable for 1
    let task = single_var_task(
        2,
        vec![unary_op("expensive", 0, 0, 1, 10), unary_op("cheap", 0, 0, 1, 1)],
    );
    let (mut env, mut policy) = setup(task, MapPolicy::new(vec![(vec![0], 0)]));
    let s = env.initial_state();
    let mut oracle = BoundedLookaheadOracle::new(BoundedLookaheadSettings::default(), None);
    let result = oracle
        .test_driver(&mut env, &mut policy, &root_entry(s))
        .unwrap();
    assert_eq!(result, TestResult::new(9, PolicyCost::Finite(1)));

    // the result is cached
    let again = oracle
        .test_driver(&mut env, &mut policy, &root_entry(s))
        .unwrap();
    assert_eq!(again, result);
}

#[test]
fn cost_estimator_oracle_compares_against_trusted_value() {
    struct Fixed(CostEstimate);
    impl PlanCostEstimator for Fixed {
        fn compute_cost(&mut self, _task: &Task, _state: &[Val]) -> Result<CostEstimate> {
            Ok(self.0)
        }
    }

    let task = single_var_task(2, vec![unary_op("a", 0, 0, 1, 10)]);
    let (mut env, mut policy) = setup(task, MapPolicy::new(vec![(vec![0], 0)]));
    let s = env.initial_state();

    let mut oracle = CostEstimatorOracle::new(
        OracleSettings::default(),
        Box::new(Fixed(CostEstimate::Plan(4))),
    );
    let result = oracle.test(&mut env, &mut policy, s).unwrap();
    assert_eq!(result, TestResult::new(6, PolicyCost::Finite(4)));

    let mut unknown = CostEstimatorOracle::new(
        OracleSettings::default(),
        Box::new(Fixed(CostEstimate::Unknown)),
    );
    let result = unknown.test(&mut env, &mut policy, s).unwrap();
    assert_eq!(result.bug_value, crate::oracle::NOT_APPLICABLE_INDICATOR);
}

#[test]
fn composite_refuses_inconsistent_intermediate_configuration() {
    let task = single_var_task(2, vec![unary_op("a", 0, 0, 1, 1)]);
    let metamorphic = ii_oracle(&task, None, |s| {
        s.oracle.consider_intermediate_states = false;
    });
    let external = BoundedLookaheadOracle::new(
        BoundedLookaheadSettings {
            oracle: OracleSettings {
                consider_intermediate_states: true,
                ..OracleSettings::default()
            },
            ..BoundedLookaheadSettings::default()
        },
        None,
    );
    let result = CompositeOracle::new(
        OracleSettings::default(),
        None,
        Some(Box::new(external)),
        Some(metamorphic),
        false,
    );
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn composite_runs_external_after_metamorphic() {
    // identity dominance: the metamorphic oracle finds nothing, the bounded lookahead does
    let task = single_var_task(
        2,
        vec![unary_op("expensive", 0, 0, 1, 10), unary_op("cheap", 0, 0, 1, 1)],
    );
    let metamorphic = ii_oracle(&task, None, |s| {
        s.conduct_lookahead_search = false;
        s.local_bug_test = LocalBugTest::None;
    });
    let external = BoundedLookaheadOracle::new(BoundedLookaheadSettings::default(), None);
    let mut composite = CompositeOracle::new(
        OracleSettings::default(),
        None,
        Some(Box::new(external)),
        Some(metamorphic),
        false,
    )
    .unwrap();

    let (mut env, mut policy) = setup(task, MapPolicy::new(vec![(vec![0], 0)]));
    let s = env.initial_state();
    let result = composite
        .test_driver(&mut env, &mut policy, &root_entry(s))
        .unwrap();
    assert_eq!(result, TestResult::new(9, PolicyCost::Finite(1)));
}
