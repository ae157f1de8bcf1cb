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

//! # Iterative improvement oracle
//!
//! The comparison based metamorphic oracle. The oracle maintains sets `S^c` of tested
//! states `s` with `c >= h*(s)`, indexed by their cost `c`. For every new candidate `t` with
//! known policy cost, it compares `t` against a bounded number of stored states `s`:
//!
//! - `c - D(s, t) >= h*(s) + h*(t) - h*(s) = h*(t)`, so the candidate's bound can be
//!   tightened to `c - D(s, t)`,
//! - `policycost(t) - D(t, s) >= h*(s)`, so the stored state's bound can be tightened
//!   likewise.
//!
//! Whenever a state's upper bound drops strictly below the policy's lower cost bound for it,
//! the state is a bug of that margin. Tightened bounds are propagated through the reverse
//! policy graph, and an optional lookahead search improves the candidate's bound further.
//!
//! Between externally visible operations, every tested state sits in exactly one cost set
//! and the set's cost equals the state's current upper bound. Bound changes discovered
//! during a comparison sweep are buffered in a delayed-update list and flushed atomically.

use crate::dominance::{NumericDominance, MINUS_INFINITY};
use crate::env::TestingEnvironment;
use crate::eval::{Estimate, Evaluator};
use crate::oracle::local::{self, LocalBugTest};
use crate::oracle::{
    report_parents_as_bugs, BugValue, Oracle, OracleSettings, TestResult, UNSOLVED_BUG_VALUE,
};
use crate::policy::{Policy, PolicyCost};
use crate::pool::PoolEntry;
use crate::state::{PerStateTable, StateId};
use crate::{Error, Result};

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};

/// Order of cost-set keys: finite costs numerically, every finite cost before `Unsolved`.
///
/// `Unknown` is never a cost-set key.
fn cmp_cost(a: PolicyCost, b: PolicyCost) -> Ordering {
    use PolicyCost::*;
    match (a, b) {
        (Unsolved, Unsolved) => Ordering::Equal,
        (Unsolved, _) => Ordering::Greater,
        (_, Unsolved) => Ordering::Less,
        (Finite(x), Finite(y)) => x.cmp(&y),
        _ => panic!("Unknown is not a valid cost-set key"),
    }
}

/// The bug value implied by an upper bound dropping below the policy's lower bound.
fn bug_value_from_bounds(lower: PolicyCost, new_bound: PolicyCost) -> BugValue {
    debug_assert!(PolicyCost::is_less(new_bound, lower));
    match (lower, new_bound) {
        (PolicyCost::Unsolved, _) => UNSOLVED_BUG_VALUE,
        (PolicyCost::Finite(l), PolicyCost::Finite(n)) => l - n,
        _ => unreachable!("a reported bound must be finite"),
    }
}

/// Reference to a cost set: its cost and the index of the set in the set list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CostSetRef {
    /// Upper bound on the optimal plan cost of all states in the set
    pub cost: PolicyCost,
    /// Index of the state set in the set list
    pub index: usize,
}

/// Iterator over cost-set references by proximity to a start cost: it begins at the first
/// set with cost `>= start`, then alternates between the next higher and next lower set.
pub(crate) struct CostSetIterator<'a> {
    refs: &'a [CostSetRef],
    forward: usize,
    backward: usize,
    take_forward: bool,
}

impl<'a> CostSetIterator<'a> {
    pub(crate) fn new(start: PolicyCost, refs: &'a [CostSetRef]) -> Self {
        let forward = refs
            .iter()
            .position(|r| cmp_cost(r.cost, start) != Ordering::Less)
            .unwrap_or_else(|| refs.len());
        CostSetIterator {
            refs,
            forward,
            backward: forward,
            take_forward: forward < refs.len() || forward == 0,
        }
    }
}

impl<'a> Iterator for CostSetIterator<'a> {
    type Item = CostSetRef;

    fn next(&mut self) -> Option<CostSetRef> {
        let has_forward = self.forward < self.refs.len();
        let has_backward = self.backward > 0;
        let use_forward = if self.take_forward {
            has_forward
        } else {
            !has_backward && has_forward
        };
        if use_forward {
            let item = self.refs[self.forward];
            self.forward += 1;
            if self.backward > 0 {
                self.take_forward = false;
            }
            Some(item)
        } else if has_backward {
            let item = self.refs[self.backward - 1];
            self.backward -= 1;
            if self.forward < self.refs.len() {
                self.take_forward = true;
            }
            Some(item)
        } else {
            None
        }
    }
}

/// Priority used by the lookahead search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookaheadComp {
    /// Order by heuristic value only (resembles GBFS)
    H,
    /// Order by `g + h` (resembles A*)
    GPlusH,
}

/// Configuration of the [`IterativeImprovementOracle`].
#[derive(Clone, Copy, Debug)]
pub struct IterativeImprovementSettings {
    /// Shared oracle options
    pub oracle: OracleSettings,
    /// Local bug criterion mode
    pub local_bug_test: LocalBugTest,
    /// Maximal number of stored states to compare a candidate to
    pub max_state_comparisons: usize,
    /// Whether to run lookahead search
    pub conduct_lookahead_search: bool,
    /// Pass cost bounds to policy parent states
    pub update_parents: bool,
    /// Maximal number of comparisons per state inside lookahead search
    pub max_lookahead_state_comparisons: usize,
    /// Defer heuristic evaluation in lookahead search
    pub deferred_evaluation: bool,
    /// Priority used by the lookahead search
    pub lookahead_comp: LookaheadComp,
    /// Maximal number of states visited per lookahead search
    pub max_lookahead_state_visits: usize,
    /// Enable optimizations assuming a unit-cost, invertible domain
    pub domain_unit_cost_and_invertible: bool,
}

impl Default for IterativeImprovementSettings {
    fn default() -> Self {
        IterativeImprovementSettings {
            oracle: OracleSettings::default(),
            local_bug_test: LocalBugTest::All,
            max_state_comparisons: 1_000_000,
            conduct_lookahead_search: true,
            update_parents: true,
            max_lookahead_state_comparisons: 1_000_000,
            deferred_evaluation: false,
            lookahead_comp: LookaheadComp::H,
            max_lookahead_state_visits: 100,
            domain_unit_cost_and_invertible: false,
        }
    }
}

/// The comparison based metamorphic oracle. See the module documentation.
pub struct IterativeImprovementOracle {
    settings: IterativeImprovementSettings,
    relation: NumericDominance,
    lookahead_heuristic: Option<Box<dyn Evaluator>>,

    /// Sets of states sharing the same upper cost bound
    state_sets: Vec<Vec<StateId>>,
    /// Sorted references into `state_sets`
    set_refs: Vec<CostSetRef>,
    /// Number of states currently stored across all cost sets
    cost_set_size: usize,
    /// Buffered membership updates: state, old cost, new cost
    delayed_updates: Vec<(StateId, PolicyCost, PolicyCost)>,
    /// Best known upper bound on `h*` per state; never increases
    upper_cost_bounds: PerStateTable<PolicyCost>,
    /// All states that participated in a comparison
    tested_states: HashSet<StateId>,
}

impl IterativeImprovementOracle {
    /// Create the oracle around a dominance relation.
    pub fn new(
        relation: NumericDominance,
        settings: IterativeImprovementSettings,
        lookahead_heuristic: Option<Box<dyn Evaluator>>,
    ) -> Result<Self> {
        if settings.oracle.consider_intermediate_states && !settings.update_parents {
            return Err(Error::Configuration(
                "update_parents cannot be disabled if consider_intermediate_states is enabled"
                    .into(),
            ));
        }
        Ok(IterativeImprovementOracle {
            settings,
            relation,
            lookahead_heuristic,
            state_sets: Vec::new(),
            set_refs: Vec::new(),
            cost_set_size: 0,
            delayed_updates: Vec::new(),
            upper_cost_bounds: PerStateTable::new(PolicyCost::Unsolved),
            tested_states: HashSet::new(),
        })
    }

    /// Whether the oracle propagates bounds to policy parents.
    pub fn updates_parents(&self) -> bool {
        self.settings.update_parents
    }

    /// The shared oracle options.
    pub fn oracle_settings(&self) -> &OracleSettings {
        &self.settings.oracle
    }

    /// The current upper bound on `h*` of the state.
    pub fn upper_cost_bound(&self, state: StateId) -> PolicyCost {
        *self.upper_cost_bounds.get(state)
    }

    // ---- cost-set bookkeeping -------------------------------------------------------

    fn find_set(&self, cost: PolicyCost) -> Option<usize> {
        self.set_refs
            .binary_search_by(|r| cmp_cost(r.cost, cost))
            .ok()
    }

    /// Add `state` to the set of the given cost, constructing the set if necessary.
    fn add_state(&mut self, state: StateId, cost: PolicyCost) {
        self.cost_set_size += 1;
        match self.set_refs.binary_search_by(|r| cmp_cost(r.cost, cost)) {
            Ok(pos) => {
                let index = self.set_refs[pos].index;
                self.state_sets[index].push(state);
            }
            Err(pos) => {
                let index = self.state_sets.len();
                self.state_sets.push(vec![state]);
                self.set_refs.insert(pos, CostSetRef { cost, index });
            }
        }
    }

    /// Remove `state` from the set of the given cost. The state must be present.
    fn remove_state(&mut self, state: StateId, cost: PolicyCost) {
        debug_assert!(self.cost_set_size > 0);
        self.cost_set_size -= 1;
        let set_index = match self.find_set(cost) {
            Some(pos) => self.set_refs[pos].index,
            None => panic!(
                "no cost set with cost {} while removing state {}",
                cost, state
            ),
        };
        let set = &mut self.state_sets[set_index];
        match set.iter().position(|&s| s == state) {
            Some(pos) => {
                set.swap_remove(pos);
            }
            None => panic!(
                "state {} is not contained in the cost set for cost {}",
                state, cost
            ),
        }
    }

    /// Lower the upper bound of `s`, deferring the membership update.
    fn update_cost(&mut self, s: StateId, old_cost: PolicyCost, new_cost: PolicyCost) {
        let min_cost = PolicyCost::min_cost(*self.upper_cost_bounds.get(s), new_cost);
        self.delayed_updates.push((s, old_cost, min_cost));
        self.upper_cost_bounds.set(s, min_cost);
    }

    /// Flush the delayed membership updates.
    fn reorder_state_sets(&mut self) {
        let updates = std::mem::replace(&mut self.delayed_updates, Vec::new());
        for (state, old_cost, new_cost) in updates {
            self.remove_state(state, old_cost);
            self.add_state(state, new_cost);
        }
    }

    /// Flush the delayed updates and propagate the new bounds of all updated states to
    /// their policy parents, reordering again until the fixed point.
    fn reorder_state_sets_with_parent_updates(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
    ) -> Result<()> {
        let to_update: Vec<StateId> = if self.settings.update_parents {
            self.delayed_updates.iter().map(|&(s, _, _)| s).collect()
        } else {
            Vec::new()
        };
        self.reorder_state_sets();
        for state in to_update {
            let propagated = self.update_parent_cost(env, policy, state);
            self.reorder_state_sets();
            propagated?;
        }
        Ok(())
    }

    // ---- pairwise tightening --------------------------------------------------------

    /// One comparison sweep for a candidate that is currently in no cost set: tighten the
    /// candidate's bound in `improved` and the stored states' bounds (deferred), reporting
    /// stored states whose bound drops below their policy lower bound.
    fn pairwise_tighten(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
        seed: PolicyCost,
        improved: &mut PolicyCost,
    ) -> Result<()> {
        let order: Vec<CostSetRef> = CostSetIterator::new(seed, &self.set_refs).collect();
        let mut compared: usize = 0;
        for set_ref in order {
            let set_len = self.state_sets[set_ref.index].len();
            let original_cost_old = set_ref.cost;
            for i in 0..set_len {
                if compared >= self.settings.max_state_comparisons {
                    return Ok(());
                }
                env.check_limits()?;
                compared += 1;
                let old_state = self.state_sets[set_ref.index][i];

                if let PolicyCost::Finite(old_cost) = original_cost_old {
                    // tighten the candidate through the stored state
                    let dominance_old_new = self.relation.value_ids(&env.registry, old_state, state);
                    if dominance_old_new != MINUS_INFINITY {
                        let inferred = old_cost - dominance_old_new;
                        debug_assert!(inferred >= 0);
                        *improved =
                            PolicyCost::min_cost(*improved, PolicyCost::Finite(inferred));
                    }
                }

                if let PolicyCost::Finite(improved_cost) = *improved {
                    // tighten the stored state through the candidate
                    let dominance_new_old = self.relation.value_ids(&env.registry, state, old_state);
                    let mut improved_old = original_cost_old;
                    if dominance_new_old != MINUS_INFINITY {
                        let inferred = improved_cost - dominance_new_old;
                        debug_assert!(inferred >= 0);
                        improved_old =
                            PolicyCost::min_cost(improved_old, PolicyCost::Finite(inferred));
                    }
                    if original_cost_old != improved_old {
                        self.update_cost(old_state, original_cost_old, improved_old);
                        let (lower_old, _) = policy.read_lower_policy_cost_bound(env, old_state);
                        if PolicyCost::is_less(improved_old, lower_old) {
                            let bug = bug_value_from_bounds(lower_old, improved_old);
                            env.add_additional_bug(
                                policy,
                                old_state,
                                TestResult::new(bug, improved_old),
                            );
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// The core test of a single candidate. `local_test` enables the local criterion,
    /// `lookahead` the lookahead search.
    fn test_impl(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
        local_test: bool,
        lookahead: bool,
    ) -> Result<BugValue> {
        // goal states carry bound 0 trivially and never enter the cost sets
        if env.is_goal(state) {
            let current = *self.upper_cost_bounds.get(state);
            self.upper_cost_bounds
                .set(state, PolicyCost::min_cost(current, PolicyCost::Finite(0)));
            return Ok(0);
        }
        if !self.tested_states.insert(state) {
            let stored = env.bugs.stored_result(state).bug_value;
            if stored > 0 {
                return Ok(stored);
            }
            // take the state out while we compare, it is re-added below
            let bound = *self.upper_cost_bounds.get(state);
            self.remove_state(state, bound);
        }

        let (lower_bound, bound_is_exact) = policy.read_lower_policy_cost_bound(env, state);
        let upper_policy_bound = if bound_is_exact {
            lower_bound
        } else {
            PolicyCost::Unsolved
        };

        let mut improved =
            PolicyCost::min_cost(upper_policy_bound, *self.upper_cost_bounds.get(state));

        let mut bug_value: BugValue = 0;
        if local_test {
            bug_value = local::local_bug_test(
                &self.relation,
                self.settings.local_bug_test,
                env,
                policy,
                state,
            )?;
            if bug_value > 0 && bug_value < UNSOLVED_BUG_VALUE && bound_is_exact {
                if let PolicyCost::Finite(upper) = upper_policy_bound {
                    improved =
                        PolicyCost::min_cost(improved, PolicyCost::Finite(upper - bug_value));
                }
            }
        }

        let sweep = self.pairwise_tighten(env, policy, state, upper_policy_bound, &mut improved);

        // restore the cost-set invariants even if the sweep ran out of resources
        self.upper_cost_bounds.set(state, improved);
        self.add_state(state, improved);
        let reorder = self.reorder_state_sets_with_parent_updates(env, policy);
        sweep?;
        reorder?;

        if lookahead
            && ((upper_policy_bound == improved && bound_is_exact) || !bound_is_exact)
        {
            let lookahead_bound = self.lookahead_search(env, policy, state)?;
            improved = PolicyCost::min_cost(improved, lookahead_bound);
        }

        if PolicyCost::is_less(improved, lower_bound) {
            bug_value = bug_value.max(bug_value_from_bounds(lower_bound, improved));
            Ok(bug_value)
        } else {
            Ok(0)
        }
    }

    // ---- parent propagation ---------------------------------------------------------

    /// Propagate the bound of `s` backwards through the policy graph: every parent's bound
    /// becomes at most `child_bound + action_cost`, clamped by an exact policy cost, and
    /// parents whose bound drops below their policy lower bound are reported as bugs.
    fn update_parent_cost(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        s: StateId,
    ) -> Result<()> {
        let mut queue: VecDeque<StateId> = VecDeque::new();
        queue.push_back(s);
        let mut processed: HashSet<StateId> = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !processed.insert(current) {
                continue;
            }
            let current_bound = *self.upper_cost_bounds.get(current);
            if current_bound == PolicyCost::Unsolved {
                continue;
            }
            let parents: Vec<StateId> = policy.get_policy_parent_states(current).to_vec();
            for parent in parents {
                env.check_limits()?;
                let op_cost = policy.read_action_cost(&env.task, parent);
                let old_parent_bound = *self.upper_cost_bounds.get(parent);
                let mut new_parent_bound = PolicyCost::min_cost(
                    old_parent_bound,
                    PolicyCost::add_cost(current_bound, PolicyCost::Finite(op_cost)),
                );
                let (lower_parent, parent_bound_is_exact) =
                    policy.read_lower_policy_cost_bound(env, parent);
                if parent_bound_is_exact {
                    new_parent_bound = PolicyCost::min_cost(new_parent_bound, lower_parent);
                }
                if PolicyCost::is_less(new_parent_bound, lower_parent) {
                    let bug = bug_value_from_bounds(lower_parent, new_parent_bound);
                    env.add_additional_bug(
                        policy,
                        parent,
                        TestResult::new(bug, new_parent_bound),
                    );
                }
                if old_parent_bound != new_parent_bound {
                    if self.tested_states.contains(&parent) {
                        self.update_cost(parent, old_parent_bound, new_parent_bound);
                    } else {
                        self.upper_cost_bounds.set(parent, new_parent_bound);
                    }
                    queue.push_back(parent);
                }
            }
        }
        Ok(())
    }

    // ---- lookahead ------------------------------------------------------------------

    /// Tighten the bound of `u` via a comparison sweep without inserting `u` into the cost
    /// sets. Used for the states visited by the lookahead search.
    fn infer_upper_bound(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        new_state: StateId,
    ) -> Result<PolicyCost> {
        let old_bound = *self.upper_cost_bounds.get(new_state);
        let mut new_bound = PolicyCost::min_cost(
            old_bound,
            policy.read_upper_policy_cost_bound(env, new_state).0,
        );

        let order: Vec<CostSetRef> = CostSetIterator::new(old_bound, &self.set_refs).collect();
        let mut compared: usize = 0;
        let mut sweep: Result<()> = Ok(());
        'sweep: for set_ref in order {
            let old_cost = match set_ref.cost {
                PolicyCost::Finite(c) => c,
                _ => continue,
            };
            let set_len = self.state_sets[set_ref.index].len();
            for i in 0..set_len {
                if compared >= self.settings.max_lookahead_state_comparisons {
                    break 'sweep;
                }
                if let Err(e) = env.check_limits() {
                    sweep = Err(e);
                    break 'sweep;
                }
                compared += 1;
                let old_state = self.state_sets[set_ref.index][i];
                let dominance_old_new =
                    self.relation.value_ids(&env.registry, old_state, new_state);
                if dominance_old_new != MINUS_INFINITY {
                    let inferred = old_cost - dominance_old_new;
                    debug_assert!(inferred >= 0);
                    new_bound = PolicyCost::min_cost(new_bound, PolicyCost::Finite(inferred));
                }
            }
        }

        if old_bound != new_bound {
            self.upper_cost_bounds.set(new_state, new_bound);
            if self.tested_states.contains(&new_state) {
                self.remove_state(new_state, old_bound);
                self.add_state(new_state, new_bound);
                let (lower, _) = policy.read_lower_policy_cost_bound(env, new_state);
                if PolicyCost::is_less(new_bound, lower) {
                    let bug = bug_value_from_bounds(lower, new_bound);
                    env.add_additional_bug(policy, new_state, TestResult::new(bug, new_bound));
                }
            }
            if self.settings.update_parents && policy.has_complete_cached_path(env, new_state) {
                let propagated = self.update_parent_cost(env, policy, new_state);
                self.reorder_state_sets();
                propagated?;
            }
        }
        sweep?;
        Ok(new_bound)
    }

    /// Best-first search from `s`, using every visited state `u` to derive the bound
    /// `g(u) + infer_upper_bound(u)` for `s`. Goal states visited during the search yield
    /// the bound `g(u)` directly.
    fn lookahead_search(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        s: StateId,
    ) -> Result<PolicyCost> {
        struct SearchNode {
            state: StateId,
            g: i32,
            h: i32,
            key: i32,
            seq: usize,
        }
        impl PartialEq for SearchNode {
            fn eq(&self, other: &Self) -> bool {
                self.key == other.key && self.seq == other.seq
            }
        }
        impl Eq for SearchNode {}
        impl PartialOrd for SearchNode {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for SearchNode {
            // BinaryHeap is a max-heap: invert so that the smallest key pops first,
            // breaking ties in insertion order
            fn cmp(&self, other: &Self) -> Ordering {
                other
                    .key
                    .cmp(&self.key)
                    .then_with(|| other.seq.cmp(&self.seq))
            }
        }

        let comp = self.settings.lookahead_comp;
        let make_key = |g: i32, h: i32| match comp {
            LookaheadComp::H => h,
            LookaheadComp::GPlusH => g + h,
        };

        let mut queue: BinaryHeap<SearchNode> = BinaryHeap::new();
        let mut visited: HashSet<StateId> = HashSet::new();
        let mut seq: usize = 0;
        queue.push(SearchNode {
            state: s,
            g: 0,
            h: 0,
            key: make_key(0, 0),
            seq,
        });

        let mut upper_bound_for_start = *self.upper_cost_bounds.get(s);
        let mut handling_start_state = true;

        let mut visits: usize = 0;
        while visits < self.settings.max_lookahead_state_visits {
            let node = match queue.pop() {
                Some(node) => node,
                None => break,
            };
            if !visited.insert(node.state) {
                continue;
            }
            visits += 1;
            env.check_limits()?;

            if !handling_start_state {
                if env.is_goal(node.state) {
                    upper_bound_for_start =
                        PolicyCost::min_cost(upper_bound_for_start, PolicyCost::Finite(node.g));
                }
                let inferred = self.infer_upper_bound(env, policy, node.state)?;
                let new_bound = PolicyCost::add_cost(PolicyCost::Finite(node.g), inferred);
                upper_bound_for_start = PolicyCost::min_cost(upper_bound_for_start, new_bound);
            } else {
                handling_start_state = false;
            }

            let mut current_h = node.h;
            if self.settings.deferred_evaluation {
                if let Some(heuristic) = self.lookahead_heuristic.as_mut() {
                    match heuristic.estimate(&env.task, env.registry.lookup(node.state)) {
                        Estimate::DeadEnd => continue,
                        Estimate::Value(h) => current_h = h,
                    }
                }
            }

            for op in env.applicable_ops(node.state) {
                let succ = env.successor(node.state, op);
                let succ_g = node.g + env.task.operator_cost(op);
                let mut succ_h = 0;
                if let Some(heuristic) = self.lookahead_heuristic.as_mut() {
                    if self.settings.deferred_evaluation {
                        succ_h = current_h;
                    } else {
                        match heuristic.estimate(&env.task, env.registry.lookup(succ)) {
                            Estimate::DeadEnd => continue,
                            Estimate::Value(h) => succ_h = h,
                        }
                    }
                }
                seq += 1;
                queue.push(SearchNode {
                    state: succ,
                    g: succ_g,
                    h: succ_h,
                    key: make_key(succ_g, succ_h),
                    seq,
                });
            }
        }

        let bound_before_update = *self.upper_cost_bounds.get(s);
        if bound_before_update != upper_bound_for_start {
            self.upper_cost_bounds.set(s, upper_bound_for_start);
            if self.tested_states.contains(&s) {
                self.remove_state(s, bound_before_update);
                self.add_state(s, upper_bound_for_start);
            }
            if self.settings.update_parents {
                let propagated = self.update_parent_cost(env, policy, s);
                self.reorder_state_sets();
                propagated?;
            }
        }
        Ok(upper_bound_for_start)
    }

    // ---- invariant checks (test support) --------------------------------------------

    #[cfg(test)]
    pub(crate) fn assert_cost_set_invariants(&self) {
        assert!(self.delayed_updates.is_empty());
        for window in self.set_refs.windows(2) {
            assert_eq!(cmp_cost(window[0].cost, window[1].cost), Ordering::Less);
        }
        let mut total = 0;
        for set_ref in &self.set_refs {
            for &state in &self.state_sets[set_ref.index] {
                total += 1;
                assert!(self.tested_states.contains(&state));
                assert_eq!(*self.upper_cost_bounds.get(state), set_ref.cost);
            }
        }
        assert_eq!(total, self.cost_set_size);
        assert_eq!(total, self.tested_states.len());
    }

    #[cfg(test)]
    pub(crate) fn is_tested(&self, state: StateId) -> bool {
        self.tested_states.contains(&state)
    }
}

impl Oracle for IterativeImprovementOracle {
    fn settings(&self) -> &OracleSettings {
        &self.settings.oracle
    }

    fn test(
        &mut self,
        _env: &mut TestingEnvironment,
        _policy: &mut Policy,
        _state: StateId,
    ) -> Result<TestResult> {
        Err(Error::Unsupported(
            "the iterative improvement oracle only works through its test driver".into(),
        ))
    }

    fn test_driver(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        entry: &PoolEntry,
    ) -> Result<TestResult> {
        let new_state = entry.state;
        let mut bug_value: BugValue = 0;

        // the policy needs to run once on the candidate
        let (lower_bound, _) = policy.compute_lower_policy_cost_bound(env, new_state, None)?;

        let mut preprocessing_cost_bound = PolicyCost::Unsolved;
        if self.settings.domain_unit_cost_and_invertible {
            // every unsolved state is a bug: fuzzing only produces solvable states here
            if lower_bound == PolicyCost::Unsolved {
                bug_value = UNSOLVED_BUG_VALUE;
            }
            if entry.ref_state != StateId::NONE {
                let ref_state = entry.ref_state;
                let ref_bound = PolicyCost::min_cost(
                    *self.upper_cost_bounds.get(ref_state),
                    policy.read_upper_policy_cost_bound(env, ref_state).0,
                );
                if ref_bound == PolicyCost::Unsolved {
                    if bug_value > 0 {
                        report_parents_as_bugs(
                            env,
                            policy,
                            new_state,
                            TestResult::with_bug_value(bug_value),
                        );
                    }
                } else {
                    preprocessing_cost_bound =
                        PolicyCost::add_cost(ref_bound, PolicyCost::Finite(entry.steps as i32));
                    if let (PolicyCost::Finite(lower), PolicyCost::Finite(bound)) =
                        (lower_bound, preprocessing_cost_bound)
                    {
                        if bound < lower {
                            bug_value = lower - bound;
                        }
                    }
                    if bug_value > 0 {
                        report_parents_as_bugs(
                            env,
                            policy,
                            new_state,
                            TestResult::new(bug_value, preprocessing_cost_bound),
                        );
                    }
                }
            }
        }

        if self.settings.oracle.consider_intermediate_states && bug_value <= 0 {
            let path = policy.execute_get_path_fragment(env, new_state, None, true)?;
            debug_assert!(!path.is_empty());
            for &intermediate in path[1..].iter().rev() {
                if env.is_goal(intermediate) {
                    continue;
                }
                let intermediate_bug = self.test_impl(env, policy, intermediate, false, false)?;
                if intermediate_bug > 0 {
                    let bound = *self.upper_cost_bounds.get(intermediate);
                    env.add_additional_bug(
                        policy,
                        intermediate,
                        TestResult::new(intermediate_bug, bound),
                    );
                }
                let propagated = self.update_parent_cost(env, policy, intermediate);
                self.reorder_state_sets();
                propagated?;
            }
        }

        let lookahead = self.settings.conduct_lookahead_search && bug_value <= 0;
        bug_value = bug_value.max(self.test_impl(env, policy, new_state, true, lookahead)?);

        if bug_value > 0 && self.settings.update_parents {
            let propagated = self.update_parent_cost(env, policy, new_state);
            self.reorder_state_sets();
            propagated?;
        }
        if bug_value > 0 && preprocessing_cost_bound != PolicyCost::Unsolved {
            Oracle::add_external_cost_bound(self, env, policy, new_state, preprocessing_cost_bound)?;
        }
        Ok(TestResult::new(
            bug_value,
            *self.upper_cost_bounds.get(new_state),
        ))
    }

    fn add_external_cost_bound(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        new_state: StateId,
        cost_bound: PolicyCost,
    ) -> Result<()> {
        let cost_bound = match cost_bound {
            PolicyCost::Finite(_) => cost_bound,
            _ => return Ok(()),
        };
        let old_bound = *self.upper_cost_bounds.get(new_state);
        let new_bound = PolicyCost::min_cost(old_bound, cost_bound);
        if old_bound == new_bound {
            return Ok(());
        }
        let is_tested = self.tested_states.contains(&new_state);
        if is_tested {
            self.remove_state(new_state, old_bound);
        }

        // use the improved bound to tighten the stored states
        let order: Vec<CostSetRef> = CostSetIterator::new(old_bound, &self.set_refs).collect();
        let mut compared: usize = 0;
        let mut sweep: Result<()> = Ok(());
        'sweep: for set_ref in order {
            let original_cost_old = set_ref.cost;
            let set_len = self.state_sets[set_ref.index].len();
            for i in 0..set_len {
                if compared >= self.settings.max_state_comparisons {
                    break 'sweep;
                }
                if let Err(e) = env.check_limits() {
                    sweep = Err(e);
                    break 'sweep;
                }
                compared += 1;
                let old_state = self.state_sets[set_ref.index][i];
                let dominance_new_old =
                    self.relation.value_ids(&env.registry, new_state, old_state);
                let mut improved_old = original_cost_old;
                if dominance_new_old != MINUS_INFINITY {
                    if let PolicyCost::Finite(bound) = new_bound {
                        let inferred = bound - dominance_new_old;
                        debug_assert!(inferred >= 0);
                        improved_old =
                            PolicyCost::min_cost(improved_old, PolicyCost::Finite(inferred));
                    }
                }
                if original_cost_old != improved_old {
                    self.update_cost(old_state, original_cost_old, improved_old);
                    let (lower_old, _) = policy.read_lower_policy_cost_bound(env, old_state);
                    if PolicyCost::is_less(improved_old, lower_old) {
                        let bug = bug_value_from_bounds(lower_old, improved_old);
                        env.add_additional_bug(
                            policy,
                            old_state,
                            TestResult::new(bug, improved_old),
                        );
                    }
                }
            }
        }

        self.upper_cost_bounds.set(new_state, new_bound);
        if is_tested {
            self.add_state(new_state, new_bound);
        }
        let reorder = self.reorder_state_sets_with_parent_updates(env, policy);
        sweep?;
        reorder?;

        if self.settings.update_parents {
            let propagated = self.update_parent_cost(env, policy, new_state);
            self.reorder_state_sets();
            propagated?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(costs: &[PolicyCost]) -> Vec<CostSetRef> {
        costs
            .iter()
            .enumerate()
            .map(|(index, &cost)| CostSetRef { cost, index })
            .collect()
    }

    #[test]
    fn cost_set_iterator_alternates_outward() {
        use PolicyCost::*;
        let refs = refs(&[Finite(1), Finite(3), Finite(5), Finite(8), Unsolved]);
        let order: Vec<PolicyCost> = CostSetIterator::new(Finite(5), &refs)
            .map(|r| r.cost)
            .collect();
        assert_eq!(
            order,
            vec![Finite(5), Finite(3), Finite(8), Finite(1), Unsolved]
        );
    }

    #[test]
    fn cost_set_iterator_handles_all_below() {
        use PolicyCost::*;
        let refs = refs(&[Finite(1), Finite(2)]);
        let order: Vec<PolicyCost> = CostSetIterator::new(Unsolved, &refs)
            .map(|r| r.cost)
            .collect();
        assert_eq!(order, vec![Finite(2), Finite(1)]);
    }

    #[test]
    fn cost_set_iterator_empty() {
        let refs: Vec<CostSetRef> = Vec::new();
        assert_eq!(CostSetIterator::new(PolicyCost::Finite(0), &refs).count(), 0);
    }

    #[test]
    fn cost_set_iterator_seed_before_all() {
        use PolicyCost::*;
        let refs = refs(&[Finite(4), Finite(9)]);
        let order: Vec<PolicyCost> = CostSetIterator::new(Finite(0), &refs)
            .map(|r| r.cost)
            .collect();
        assert_eq!(order, vec![Finite(4), Finite(9)]);
    }
}
