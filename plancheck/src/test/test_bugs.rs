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
use crate::bugs::{load_bug_file, BugFileWriter, BugRegistry};
use crate::oracle::{best_of, TestResult, UNSOLVED_BUG_VALUE};
use crate::policies::CachedPolicy;
use crate::policy::{Policy, PolicyCost};
use crate::state::StateRegistry;

fn fixture() -> (StateRegistry, Policy) {
    let mut registry = StateRegistry::new();
    registry.intern(vec![0]);
    registry.intern(vec![1]);
    (registry, Policy::new(Box::new(CachedPolicy), 0))
}

#[test]
fn monotone_upgrade_equals_best_of() {
    let (registry, policy) = fixture();
    let state = registry.find(&[0]).unwrap();
    let r1 = TestResult::new(2, PolicyCost::Finite(10));
    let r2 = TestResult::new(2, PolicyCost::Finite(8));
    let r3 = TestResult::new(5, PolicyCost::Unsolved);

    let mut sequential = BugRegistry::new();
    sequential.add_additional_bug(&registry, &policy, state, r1);
    sequential.add_additional_bug(&registry, &policy, state, r2);
    sequential.add_additional_bug(&registry, &policy, state, r3);

    let mut joined = BugRegistry::new();
    joined.add_additional_bug(&registry, &policy, state, best_of(best_of(r1, r2), r3));

    assert_eq!(sequential.stored_result(state), joined.stored_result(state));
    assert_eq!(
        sequential.stored_result(state),
        TestResult::new(5, PolicyCost::Finite(8))
    );
}

#[test]
fn equal_bug_value_still_narrows_the_bound() {
    let (registry, policy) = fixture();
    let state = registry.find(&[0]).unwrap();
    let mut registry_bugs = BugRegistry::new();
    assert!(registry_bugs.add_additional_bug(
        &registry,
        &policy,
        state,
        TestResult::new(3, PolicyCost::Finite(10)),
    ));
    // same bug value, tighter bound: the entry must still be upgraded
    assert!(registry_bugs.add_additional_bug(
        &registry,
        &policy,
        state,
        TestResult::new(3, PolicyCost::Finite(7)),
    ));
    assert_eq!(
        registry_bugs.stored_result(state),
        TestResult::new(3, PolicyCost::Finite(7))
    );
    // a weaker result changes nothing
    assert!(!registry_bugs.add_additional_bug(
        &registry,
        &policy,
        state,
        TestResult::new(2, PolicyCost::Finite(9)),
    ));
}

#[test]
fn non_positive_results_are_ignored() {
    let (registry, policy) = fixture();
    let state = registry.find(&[0]).unwrap();
    let mut bugs = BugRegistry::new();
    assert!(!bugs.add_additional_bug(
        &registry,
        &policy,
        state,
        TestResult::new(0, PolicyCost::Finite(1)),
    ));
    assert!(!bugs.is_known_bug(state));
    bugs.mark_unclear(state);
    assert_eq!(bugs.num_unclear(), 1);
}

#[test]
fn bug_file_roundtrip() {
    let task = single_var_task(2, vec![unary_op("a", 0, 0, 1, 1)]);
    let path = temp_file("bugs");
    let (registry, policy) = fixture();
    let s0 = registry.find(&[0]).unwrap();
    let s1 = registry.find(&[1]).unwrap();
    {
        let mut bugs = BugRegistry::new();
        bugs.set_writer(BugFileWriter::create(&task, &path).unwrap());
        bugs.add_additional_bug(
            &registry,
            &policy,
            s0,
            TestResult::new(4, PolicyCost::Finite(6)),
        );
        bugs.add_additional_bug(
            &registry,
            &policy,
            s1,
            TestResult::new(UNSOLVED_BUG_VALUE, PolicyCost::Finite(2)),
        );
        // an upgrade producing a second result record for the same state
        bugs.add_additional_bug(
            &registry,
            &policy,
            s0,
            TestResult::new(7, PolicyCost::Unsolved),
        );
        bugs.write_pool_marker(s0).unwrap();
    }

    let mut fresh = StateRegistry::new();
    let loaded = load_bug_file(&mut fresh, &path).unwrap();
    assert_eq!(loaded.len(), 2);

    assert_eq!(fresh.lookup(loaded[0].state), &[0]);
    assert_eq!(
        loaded[0].result,
        TestResult::new(7, PolicyCost::Finite(6))
    );
    assert!(loaded[0].in_pool);

    assert_eq!(fresh.lookup(loaded[1].state), &[1]);
    assert_eq!(
        loaded[1].result,
        TestResult::new(UNSOLVED_BUG_VALUE, PolicyCost::Finite(2))
    );
    assert!(!loaded[1].in_pool);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn unsolved_bug_counter() {
    let (registry, policy) = fixture();
    let s0 = registry.find(&[0]).unwrap();
    let s1 = registry.find(&[1]).unwrap();
    let mut bugs = BugRegistry::new();
    bugs.add_additional_bug(
        &registry,
        &policy,
        s0,
        TestResult::with_bug_value(UNSOLVED_BUG_VALUE),
    );
    bugs.add_additional_bug(&registry, &policy, s1, TestResult::with_bug_value(3));
    // upgrading a quantitative bug to a qualitative one counts once
    bugs.add_additional_bug(
        &registry,
        &policy,
        s1,
        TestResult::with_bug_value(UNSOLVED_BUG_VALUE),
    );
    assert_eq!(bugs.num_bugs(), 2);
    assert_eq!(bugs.num_unsolved_state_bugs(), 2);
}
