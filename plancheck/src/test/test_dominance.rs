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

use super::helpers::temp_file;
use crate::dominance::{NumericDominance, MINUS_INFINITY};
use crate::fdr::{Task, Variable};

fn two_var_task() -> Task {
    Task::new(
        vec![Variable::unnamed(0, 2), Variable::unnamed(1, 2)],
        vec![0, 0],
        vec![(0, 1)],
        Vec::new(),
        true,
    )
}

#[test]
fn identity_relation() {
    let task = two_var_task();
    let relation = NumericDominance::identity(&task);
    assert_eq!(relation.value(&[0, 1], &[0, 1]), 0);
    assert_eq!(relation.value(&[0, 1], &[1, 1]), MINUS_INFINITY);
    assert_eq!(relation.minimal_finite_dominance_value(), 0);
    assert!(relation.matches_task(&task));
}

#[test]
fn factored_values_sum_per_variable() {
    let task = two_var_task();
    let relation = NumericDominance::from_atomic_tables(
        &task,
        vec![
            vec![vec![0, 2], vec![-1, 0]],
            vec![vec![0, MINUS_INFINITY], vec![3, 0]],
        ],
    )
    .unwrap();
    assert_eq!(relation.value(&[0, 0], &[1, 0]), 2);
    assert_eq!(relation.value(&[0, 1], &[1, 0]), 2 + 3);
    assert_eq!(relation.value(&[1, 0], &[0, 0]), -1);
    // a single -infinity entry absorbs the whole sum
    assert_eq!(relation.value(&[0, 0], &[0, 1]), MINUS_INFINITY);
    assert_eq!(relation.minimal_finite_dominance_value(), -1);
}

#[test]
fn rejects_mismatched_tables() {
    let task = two_var_task();
    assert!(NumericDominance::from_atomic_tables(&task, vec![vec![vec![0]]]).is_err());
    assert!(NumericDominance::from_atomic_tables(
        &task,
        vec![vec![vec![0, 0], vec![0, 0]], vec![vec![0], vec![0]]],
    )
    .is_err());
}

#[test]
fn test_serialization() {
    let task = two_var_task();
    let mut relation = NumericDominance::from_atomic_tables(
        &task,
        vec![
            vec![vec![0, -4], vec![MINUS_INFINITY, 0]],
            vec![vec![0, 7], vec![2, 0]],
        ],
    )
    .unwrap();
    relation.set_computation_time(1.25);

    let path = temp_file("simulation");
    relation.write_file(&path).unwrap();
    let restored = NumericDominance::read_file(&path).unwrap();
    assert_eq!(relation, restored);
    assert_eq!(restored.computation_time(), 1.25);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn rejects_garbage_simulation_file() {
    let path = temp_file("garbage-simulation");
    std::fs::write(&path, b"this is not a simulation").unwrap();
    assert!(NumericDominance::read_file(&path).is_err());
    std::fs::remove_file(&path).unwrap();
}
