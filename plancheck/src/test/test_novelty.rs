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

use crate::fdr::{Task, Variable};
use crate::novelty::NoveltyStore;

fn three_var_task() -> Task {
    Task::new(
        vec![
            Variable::unnamed(0, 2),
            Variable::unnamed(1, 3),
            Variable::unnamed(2, 2),
        ],
        vec![0, 0, 0],
        vec![(0, 1)],
        Vec::new(),
        true,
    )
}

#[test]
fn insert_is_true_iff_a_tuple_is_new() {
    let task = three_var_task();
    let mut store = NoveltyStore::new(2, &task);
    assert!(store.insert(&[0, 0, 0]));
    assert!(!store.insert(&[0, 0, 0]));
    // a single changed value introduces new 1-tuples and 2-tuples
    assert!(store.insert(&[0, 1, 0]));
    assert!(!store.insert(&[0, 1, 0]));
    // var1=2 has not been observed at arity 1 yet
    assert!(store.insert(&[0, 2, 0]));
}

#[test]
fn compute_novelty_returns_smallest_arity() {
    let task = three_var_task();
    let mut store = NoveltyStore::new(2, &task);
    store.insert(&[0, 0, 0]);
    // var1=1 has never been seen: novelty 1
    assert_eq!(store.compute_novelty(&[0, 1, 0]), 1);
    store.insert(&[0, 1, 0]);
    store.insert(&[1, 0, 0]);
    // every single value seen, but var0=1 with var1=1 never together: novelty 2
    assert_eq!(store.compute_novelty(&[1, 1, 0]), 2);
    // fully known state
    assert_eq!(store.compute_novelty(&[0, 0, 0]), 0);
}

#[test]
fn sizes_and_unique_factsets() {
    let task = three_var_task();
    let mut store = NoveltyStore::new(2, &task);
    assert_eq!(store.arity(), 2);
    store.insert(&[0, 0, 0]);
    assert_eq!(store.size(1), 3);
    assert_eq!(store.size(2), 3);
    store.insert(&[1, 0, 0]);
    assert_eq!(store.size(1), 4);
    // var0=1 was observed exactly once
    assert!(store.has_unique_factset(&[1, 0, 0], 1));
    assert!(!store.has_unique_factset(&[0, 0, 0], 1));
}

#[test]
fn arity_is_capped_at_variable_count() {
    let task = three_var_task();
    let store = NoveltyStore::new(10, &task);
    assert_eq!(store.arity(), 3);
}
