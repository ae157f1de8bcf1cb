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

//! Region extraction.
//!
//! A *region* is a connected component of the subgraph induced by a state set under
//! operator application: two states of the set are connected if one is reachable from the
//! other with a single operator (in either direction).

use crate::env::TestingEnvironment;
use crate::state::StateId;

use petgraph::unionfind::UnionFind;

use std::collections::HashMap;

/// The partition of a state set into regions.
pub type StateRegions = Vec<Vec<StateId>>;

/// Partition the given states into regions.
pub fn compute_state_regions(
    env: &mut TestingEnvironment,
    states: &[StateId],
) -> StateRegions {
    let mut position: HashMap<StateId, usize> = HashMap::with_capacity(states.len());
    for (i, &state) in states.iter().enumerate() {
        position.insert(state, i);
    }
    let mut union_find: UnionFind<usize> = UnionFind::new(states.len());
    for (i, &state) in states.iter().enumerate() {
        for op in env.applicable_ops(state) {
            let succ = env.successor(state, op);
            if let Some(&j) = position.get(&succ) {
                if i != j {
                    union_find.union(i, j);
                }
            }
        }
    }

    let mut regions: HashMap<usize, Vec<StateId>> = HashMap::new();
    for (i, &state) in states.iter().enumerate() {
        regions
            .entry(union_find.find(i))
            .or_insert_with(Vec::new)
            .push(state);
    }
    let mut result: StateRegions = regions.into_iter().map(|(_, r)| r).collect();
    // deterministic output order, independent of hashing
    result.sort_by_key(|r| r.iter().min().copied());
    result
}
