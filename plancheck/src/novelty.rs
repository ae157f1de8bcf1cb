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

//! Width-k novelty bookkeeping.
//!
//! For every arity `k = 1..=max_arity` the store remembers which value tuples have been
//! observed for every k-subset of the variables. A tuple is encoded as a single integer
//! using per-variable strides plus a per-subset offset table, so membership is one hash
//! lookup per subset.

use crate::fdr::{Task, Val};

use std::collections::HashMap;

type FactSet = u64;

/// Iterates over all size-`k` subsets of `0..num_vars` in lexicographic order, keeping
/// track of the running subset index.
struct VarsetIterator {
    vars: Vec<usize>,
    num_vars: usize,
    idx: usize,
}

impl VarsetIterator {
    fn new(num_vars: usize, varset_size: usize) -> Self {
        VarsetIterator {
            vars: (0..varset_size).collect(),
            num_vars,
            idx: 0,
        }
    }

    fn current(&self) -> &[usize] {
        &self.vars
    }

    fn idx(&self) -> usize {
        self.idx
    }

    fn advance(&mut self) -> bool {
        let size = self.vars.len();
        let mut i = size as i64 - 1;
        while i >= 0 {
            let pos = i as usize;
            self.vars[pos] += 1;
            if self.vars[pos] != self.num_vars - (size - pos - 1) {
                break;
            }
            i -= 1;
        }
        if i < 0 {
            return false;
        }
        for pos in (i as usize + 1)..size {
            self.vars[pos] = self.vars[pos - 1] + 1;
        }
        self.idx += 1;
        true
    }
}

/// Observed value tuples per variable subset, for arities `1..=max_arity`.
#[derive(Debug)]
pub struct NoveltyStore {
    max_arity: usize,
    domains: Vec<usize>,
    offsets: Vec<Vec<FactSet>>,
    fact_sets: Vec<HashMap<FactSet, u32>>,
}

impl NoveltyStore {
    /// Create a store for the given task. The arity is capped at the number of variables.
    pub fn new(max_arity: usize, task: &Task) -> Self {
        let max_arity = max_arity.min(task.num_variables());
        let domains: Vec<usize> = (0..task.num_variables())
            .map(|var| task.domain_size(var))
            .collect();
        let mut offsets = Vec::with_capacity(max_arity);
        for arity_index in 0..max_arity {
            let mut arity_offsets = vec![0];
            let mut offset: FactSet = 0;
            let mut varsets = VarsetIterator::new(domains.len(), arity_index + 1);
            loop {
                let product: FactSet = varsets
                    .current()
                    .iter()
                    .map(|&var| domains[var] as FactSet)
                    .product();
                offset += product;
                arity_offsets.push(offset);
                if !varsets.advance() {
                    break;
                }
            }
            offsets.push(arity_offsets);
        }
        NoveltyStore {
            max_arity,
            domains,
            offsets,
            fact_sets: (0..max_arity).map(|_| HashMap::new()).collect(),
        }
    }

    fn encode(&self, arity_index: usize, varsets: &VarsetIterator, state: &[Val]) -> FactSet {
        let mut result = self.offsets[arity_index][varsets.idx()];
        let mut product: FactSet = 1;
        for &var in varsets.current() {
            result += product * state[var] as FactSet;
            product *= self.domains[var] as FactSet;
        }
        result
    }

    /// The smallest arity at which the state contains an unseen tuple, or 0 if every tuple
    /// is known.
    pub fn compute_novelty(&self, state: &[Val]) -> usize {
        for arity_index in 0..self.max_arity {
            let mut varsets = VarsetIterator::new(self.domains.len(), arity_index + 1);
            loop {
                let key = self.encode(arity_index, &varsets, state);
                if !self.fact_sets[arity_index].contains_key(&key) {
                    return arity_index + 1;
                }
                if !varsets.advance() {
                    break;
                }
            }
        }
        0
    }

    /// Record all tuples of the state. Returns true iff at least one tuple was new at some
    /// arity.
    pub fn insert(&mut self, state: &[Val]) -> bool {
        let mut is_novel = false;
        for arity_index in 0..self.max_arity {
            let mut varsets = VarsetIterator::new(self.domains.len(), arity_index + 1);
            loop {
                let key = self.encode(arity_index, &varsets, state);
                let count = self.fact_sets[arity_index].entry(key).or_insert(0);
                if *count == 0 {
                    is_novel = true;
                }
                *count += 1;
                if !varsets.advance() {
                    break;
                }
            }
        }
        is_novel
    }

    /// Check if the state contains a tuple of the given arity that has been observed exactly
    /// once. Only meaningful for states that have been inserted.
    pub fn has_unique_factset(&self, state: &[Val], arity: usize) -> bool {
        debug_assert!(arity >= 1 && arity <= self.max_arity);
        let mut varsets = VarsetIterator::new(self.domains.len(), arity);
        loop {
            let key = self.encode(arity - 1, &varsets, state);
            if self.fact_sets[arity - 1].get(&key) == Some(&1) {
                return true;
            }
            if !varsets.advance() {
                break;
            }
        }
        false
    }

    /// The number of distinct tuples observed at the given arity.
    pub fn size(&self, arity: usize) -> usize {
        debug_assert!(arity >= 1 && arity <= self.max_arity);
        self.fact_sets[arity - 1].len()
    }

    /// The maximal tracked arity.
    pub fn arity(&self) -> usize {
        self.max_arity
    }

    /// Print the number of unique tuples per arity.
    pub fn print_statistics(&self) {
        for novelty in 1..=self.arity() {
            println!("Unique {}-fact-sets: {}", novelty, self.size(novelty));
        }
    }
}
