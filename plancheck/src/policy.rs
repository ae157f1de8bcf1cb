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

//! # Policy cache
//!
//! A [`Policy`] wraps a possibly expensive, black-box [`PolicyProvider`] and memoises one
//! chosen action per state. On top of the action cache it maintains the policy cost cache
//! (a lower bound on the cost the policy incurs from each state) and the reverse
//! *policy-parent* edges: for every state, the sorted list of states from which the policy's
//! chosen action leads there.
//!
//! Guarantees: the provider is called at most once per state; actions are write-once; the
//! cached cost of a state only ever moves from [`PolicyCost::Unknown`] to a finite value or
//! [`PolicyCost::Unsolved`], and a finite value may only decrease.

use crate::env::TestingEnvironment;
use crate::eval::{Estimate, Evaluator};
use crate::fdr::{OperatorId, Task, Val};
use crate::state::{PerStateTable, StateId};
use crate::Result;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Cost the policy incurs from a state: unknown, a proven failure, or a finite value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PolicyCost {
    /// The policy has not been evaluated (to completion) on the state.
    Unknown,
    /// The policy fails on the state (surrender, cycle, or dead end).
    Unsolved,
    /// The policy reaches the goal at this cost.
    Finite(i32),
}

impl PolicyCost {
    /// Minimum in the cost lattice: `Unknown` absorbs, `Unsolved` is the neutral element.
    pub fn min_cost(a: PolicyCost, b: PolicyCost) -> PolicyCost {
        use PolicyCost::*;
        match (a, b) {
            (Unknown, _) | (_, Unknown) => Unknown,
            (Unsolved, x) => x,
            (x, Unsolved) => x,
            (Finite(x), Finite(y)) => Finite(x.min(y)),
        }
    }

    /// Addition in the cost lattice: `Unknown` absorbs, then `Unsolved` absorbs.
    pub fn add_cost(a: PolicyCost, b: PolicyCost) -> PolicyCost {
        use PolicyCost::*;
        match (a, b) {
            (Unknown, _) | (_, Unknown) => Unknown,
            (Unsolved, _) | (_, Unsolved) => Unsolved,
            (Finite(x), Finite(y)) => Finite(x + y),
        }
    }

    /// Strict order: finite values compare numerically and every finite value is less than
    /// `Unsolved`. Everything involving `Unknown` compares as false.
    pub fn is_less(a: PolicyCost, b: PolicyCost) -> bool {
        use PolicyCost::*;
        match (a, b) {
            (Finite(x), Finite(y)) => x < y,
            (Finite(_), Unsolved) => true,
            _ => false,
        }
    }

    /// The finite value, if any.
    pub fn as_finite(self) -> Option<i32> {
        match self {
            PolicyCost::Finite(c) => Some(c),
            _ => None,
        }
    }

    /// Integer representation used in the pool, bug and cache file formats.
    pub fn to_file_repr(self) -> i64 {
        match self {
            PolicyCost::Unknown => -2,
            PolicyCost::Unsolved => -1,
            PolicyCost::Finite(c) => c as i64,
        }
    }

    /// Inverse of [`PolicyCost::to_file_repr`].
    pub fn from_file_repr(repr: i64) -> PolicyCost {
        match repr {
            -2 => PolicyCost::Unknown,
            -1 => PolicyCost::Unsolved,
            c => PolicyCost::Finite(c as i32),
        }
    }
}

impl std::fmt::Display for PolicyCost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyCost::Unknown => write!(f, "unknown"),
            PolicyCost::Unsolved => write!(f, "unsolved"),
            PolicyCost::Finite(c) => write!(f, "{}", c),
        }
    }
}

/// Memoised action of the policy for a single state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CachedAction {
    /// The provider has not been asked yet.
    Unset,
    /// The policy surrendered on the state.
    NoOp,
    /// The policy chose this operator.
    Chosen(OperatorId),
}

/// The black-box policy implementation.
///
/// `apply` is called at most once per state; the surrounding [`Policy`] caches the result.
pub trait PolicyProvider {
    /// Return the operator the policy chooses in the given state, or `None` to surrender.
    ///
    /// The returned operator must be applicable in the state. May raise
    /// [`crate::Error::OutOfResource`].
    fn apply(&mut self, task: &Task, state: &[Val]) -> Result<Option<OperatorId>>;
}

/// Outcome of executing the policy from a state.
#[derive(Clone, Debug)]
pub struct PolicyRun {
    /// The run terminated (goal, surrender or cycle) rather than hitting the step limit.
    pub complete: bool,
    /// The run reached a goal state. Only meaningful if `complete` is set.
    pub solved: bool,
    /// The executed plan. Empty unless the run solved the state.
    pub plan: Vec<OperatorId>,
}

/// Inserts an element into a sorted vector if it is not already present.
pub(crate) fn insert_sorted(vec: &mut Vec<StateId>, elem: StateId) {
    match vec.binary_search(&elem) {
        Ok(_) => {}
        Err(pos) => vec.insert(pos, elem),
    }
}

/// Appends every new action-cache entry to a file so that a later run can replay the policy
/// without access to the provider.
#[derive(Debug)]
pub struct RunningPolicyCacheWriter {
    out: BufWriter<File>,
}

impl RunningPolicyCacheWriter {
    /// Create the writer, truncating the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(RunningPolicyCacheWriter {
            out: BufWriter::new(File::create(path)?),
        })
    }

    /// Write one cache entry: the operator index (or -1 for surrender) and the state values.
    fn write(&mut self, state: &[Val], op: Option<OperatorId>) -> Result<()> {
        let index = op.map(|o| o.index() as i64).unwrap_or(-1);
        write!(self.out, "{}", index)?;
        for val in state {
            write!(self.out, " {}", val)?;
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

/// The policy cache. See the module documentation.
pub struct Policy {
    provider: Box<dyn PolicyProvider>,
    actions: PerStateTable<CachedAction>,
    costs: PerStateTable<PolicyCost>,
    parents: PerStateTable<Vec<StateId>>,
    cache_writer: Option<RunningPolicyCacheWriter>,
    /// The maximal number of steps to execute the policy; 0 means no limit.
    steps_limit: u32,
}

impl Policy {
    /// Wrap a provider. `steps_limit` bounds every policy execution; 0 means no limit.
    pub fn new(provider: Box<dyn PolicyProvider>, steps_limit: u32) -> Self {
        Policy {
            provider,
            actions: PerStateTable::new(CachedAction::Unset),
            costs: PerStateTable::new(PolicyCost::Unknown),
            parents: PerStateTable::new(Vec::new()),
            cache_writer: None,
            steps_limit,
        }
    }

    /// Attach a running cache writer persisting every new action-cache entry.
    pub fn set_running_cache_writer(&mut self, writer: RunningPolicyCacheWriter) {
        self.cache_writer = Some(writer);
    }

    /// Check if [`Policy::lookup_action`] can answer without calling the provider.
    pub fn can_lookup_action(&self, state: StateId) -> bool {
        *self.actions.get(state) != CachedAction::Unset
    }

    /// The cached action for the state. Panics if the state is uncached.
    pub fn lookup_action(&self, state: StateId) -> Option<OperatorId> {
        match *self.actions.get(state) {
            CachedAction::Unset => panic!("lookup_action called for uncached state {}", state),
            CachedAction::NoOp => None,
            CachedAction::Chosen(op) => Some(op),
        }
    }

    /// The cached policy cost of the state, without running anything.
    pub fn cached_cost(&self, state: StateId) -> PolicyCost {
        *self.costs.get(state)
    }

    /// All cached policy parents of `state`: states in which the chosen action leads to
    /// `state`. Sorted and free of duplicates.
    pub fn get_policy_parent_states(&self, state: StateId) -> &[StateId] {
        self.parents.get(state)
    }

    /// Cost of the action chosen in the given state. Panics if the state is uncached or the
    /// policy surrendered there.
    pub fn read_action_cost(&self, task: &Task, state: StateId) -> i32 {
        match self.lookup_action(state) {
            Some(op) => task.operator_cost(op),
            None => panic!("read_action_cost called for surrendered state {}", state),
        }
    }

    /// The cost of the chosen action in every state of `path` except the last.
    pub fn read_path_action_costs(&self, task: &Task, path: &[StateId]) -> Vec<i32> {
        if path.len() < 2 {
            return Vec::new();
        }
        path[..path.len() - 1]
            .iter()
            .map(|&s| self.read_action_cost(task, s))
            .collect()
    }

    /// Look up the cached action, falling back to the provider and extending the cache.
    fn lookup_apply(
        &mut self,
        env: &mut TestingEnvironment,
        state: StateId,
    ) -> Result<Option<OperatorId>> {
        if *self.actions.get(state) == CachedAction::Unset {
            let op = self.provider.apply(&env.task, env.registry.lookup(state))?;
            debug_assert!(op.map_or(true, |o| env.task.is_applicable(o, env.registry.lookup(state))));
            self.actions.set(
                state,
                match op {
                    None => CachedAction::NoOp,
                    Some(o) => CachedAction::Chosen(o),
                },
            );
            if let Some(writer) = &mut self.cache_writer {
                writer.write(env.registry.lookup(state), op)?;
            }
            if let Some(o) = op {
                let succ = env.registry.successor_state(&env.task, state, o);
                insert_sorted(self.parents.get_mut(succ), state);
            }
        }
        Ok(match *self.actions.get(state) {
            CachedAction::NoOp => None,
            CachedAction::Chosen(op) => Some(op),
            CachedAction::Unset => unreachable!(),
        })
    }

    /// Execute the policy from `state` until the goal, surrender, a cycle, or the step limit.
    pub fn execute_get_plan(
        &mut self,
        env: &mut TestingEnvironment,
        state0: StateId,
        step_limit_override: Option<u32>,
    ) -> Result<PolicyRun> {
        let (run, _path) =
            self.execute_get_plan_and_path(env, state0, step_limit_override, true)?;
        Ok(run)
    }

    /// Like [`Policy::execute_get_plan`] but also returns the visited states, including the
    /// start state and a potential goal state.
    pub fn execute_get_plan_and_path(
        &mut self,
        env: &mut TestingEnvironment,
        state0: StateId,
        step_limit_override: Option<u32>,
        continue_with_cached_actions: bool,
    ) -> Result<(PolicyRun, Vec<StateId>)> {
        let step_limit = step_limit_override.unwrap_or(self.steps_limit);
        let mut seen: HashSet<StateId> = HashSet::new();
        seen.insert(state0);
        let mut plan = Vec::new();
        let mut path = Vec::new();
        let mut state = state0;
        let mut step: u32 = 0;
        loop {
            path.push(state);
            if env.is_goal(state) {
                return Ok((
                    PolicyRun {
                        complete: true,
                        solved: true,
                        plan,
                    },
                    path,
                ));
            }
            env.limits.check()?;
            let may_execute = step < step_limit || step_limit == 0;
            if !(continue_with_cached_actions && self.can_lookup_action(state)) && !may_execute {
                break;
            }
            let op = match self.lookup_apply(env, state)? {
                Some(op) => op,
                None => {
                    return Ok((
                        PolicyRun {
                            complete: true,
                            solved: false,
                            plan: Vec::new(),
                        },
                        path,
                    ));
                }
            };
            plan.push(op);
            state = env.registry.successor_state(&env.task, state, op);
            if !seen.insert(state) {
                return Ok((
                    PolicyRun {
                        complete: true,
                        solved: false,
                        plan: Vec::new(),
                    },
                    path,
                ));
            }
            step += 1;
        }
        Ok((
            PolicyRun {
                complete: false,
                solved: false,
                plan: Vec::new(),
            },
            path,
        ))
    }

    /// Execute the policy and return the visited path fragment. Never empty.
    pub fn execute_get_path_fragment(
        &mut self,
        env: &mut TestingEnvironment,
        state0: StateId,
        step_limit_override: Option<u32>,
        continue_with_cached_actions: bool,
    ) -> Result<Vec<StateId>> {
        let step_limit = step_limit_override.unwrap_or(self.steps_limit);
        let mut seen: HashSet<StateId> = HashSet::new();
        seen.insert(state0);
        let mut path = Vec::new();
        let mut state = state0;
        let mut step: u32 = 0;
        loop {
            let may_execute = step < step_limit || step_limit == 0;
            path.push(state);
            if env.is_goal(state) {
                return Ok(path);
            }
            env.limits.check()?;
            if !(continue_with_cached_actions && self.can_lookup_action(state)) && !may_execute {
                break;
            }
            let op = match self.lookup_apply(env, state)? {
                Some(op) => op,
                None => break,
            };
            state = env.registry.successor_state(&env.task, state, op);
            if !seen.insert(state) {
                break;
            }
            step += 1;
        }
        Ok(path)
    }

    /// Check if there is a complete path using only cached actions, i.e. whether the policy
    /// run from `state0` terminates without consulting the provider.
    pub fn has_complete_cached_path(&self, env: &mut TestingEnvironment, state0: StateId) -> bool {
        let mut seen: HashSet<StateId> = HashSet::new();
        seen.insert(state0);
        let mut state = state0;
        loop {
            if env.is_goal(state) {
                return true;
            }
            if !self.can_lookup_action(state) {
                return false;
            }
            let op = match self.lookup_action(state) {
                Some(op) => op,
                // surrender terminates the run, so the cached path is complete
                None => return true,
            };
            state = env.registry.successor_state(&env.task, state, op);
            if !seen.insert(state) {
                return true;
            }
        }
    }

    /// Cost of the plan obtained by running the policy on the state, [`PolicyCost::Unsolved`]
    /// if the policy is known to fail, or [`PolicyCost::Unknown`] if the step limit was hit.
    ///
    /// Caches the cost of the state and of every state on the traversed path with consistent
    /// remainder costs.
    pub fn compute_policy_cost(
        &mut self,
        env: &mut TestingEnvironment,
        state: StateId,
        step_limit_override: Option<u32>,
        continue_with_cached_actions: bool,
    ) -> Result<PolicyCost> {
        if *self.costs.get(state) == PolicyCost::Unknown {
            let (run, path) = self.execute_get_plan_and_path(
                env,
                state,
                step_limit_override,
                continue_with_cached_actions,
            )?;
            if !run.complete {
                return Ok(PolicyCost::Unknown);
            }
            let mut remaining = if run.solved {
                PolicyCost::Finite(env.task.plan_cost(&run.plan))
            } else {
                PolicyCost::Unsolved
            };
            self.costs.set(state, remaining);
            if !run.plan.is_empty() {
                for path_index in 1..path.len() {
                    if let PolicyCost::Finite(c) = remaining {
                        remaining =
                            PolicyCost::Finite(c - env.task.operator_cost(run.plan[path_index - 1]));
                    }
                    let cached = self.costs.get_mut(path[path_index]);
                    if *cached == PolicyCost::Unknown {
                        *cached = remaining;
                    } else {
                        debug_assert_eq!(*cached, remaining);
                        break;
                    }
                }
            }
        }
        Ok(*self.costs.get(state))
    }

    /// A lower bound on the policy cost of `state` together with a flag telling whether the
    /// bound is exact. Executes the policy if necessary. The bound is never
    /// [`PolicyCost::Unknown`]; if it is [`PolicyCost::Unsolved`], it is always exact.
    pub fn compute_lower_policy_cost_bound(
        &mut self,
        env: &mut TestingEnvironment,
        state: StateId,
        step_limit_override: Option<u32>,
    ) -> Result<(PolicyCost, bool)> {
        let base = self.compute_policy_cost(env, state, step_limit_override, true)?;
        if base != PolicyCost::Unknown {
            return Ok((base, true));
        }
        Ok(self.cached_suffix_bound(env, state))
    }

    /// Like [`Policy::compute_lower_policy_cost_bound`] but never runs the policy.
    pub fn read_lower_policy_cost_bound(
        &mut self,
        env: &mut TestingEnvironment,
        state: StateId,
    ) -> (PolicyCost, bool) {
        let base = *self.costs.get(state);
        if base != PolicyCost::Unknown {
            return (base, true);
        }
        self.cached_suffix_bound(env, state)
    }

    /// Upper-bound variant of [`Policy::compute_lower_policy_cost_bound`]: exact lower
    /// bounds are exact upper bounds, everything else is [`PolicyCost::Unsolved`].
    pub fn compute_upper_policy_cost_bound(
        &mut self,
        env: &mut TestingEnvironment,
        state: StateId,
    ) -> Result<(PolicyCost, bool)> {
        let (lower, exact) = self.compute_lower_policy_cost_bound(env, state, None)?;
        if exact {
            Ok((lower, true))
        } else {
            Ok((PolicyCost::Unsolved, false))
        }
    }

    /// Upper-bound variant: exact lower bounds are exact upper bounds, everything else is
    /// [`PolicyCost::Unsolved`].
    pub fn read_upper_policy_cost_bound(
        &mut self,
        env: &mut TestingEnvironment,
        state: StateId,
    ) -> (PolicyCost, bool) {
        let (lower, exact) = self.read_lower_policy_cost_bound(env, state);
        if exact {
            (lower, true)
        } else {
            (PolicyCost::Unsolved, false)
        }
    }

    /// Walk the already cached suffix of the policy run, accumulating the incurred cost.
    fn cached_suffix_bound(
        &mut self,
        env: &mut TestingEnvironment,
        state: StateId,
    ) -> (PolicyCost, bool) {
        let mut current = state;
        let mut lower: i32 = 0;
        let mut seen: HashSet<StateId> = HashSet::new();
        seen.insert(current);
        loop {
            if env.is_goal(current) {
                debug_assert_eq!(*self.costs.get(state), PolicyCost::Unknown);
                self.costs.set(state, PolicyCost::Finite(lower));
                return (PolicyCost::Finite(lower), true);
            }
            if !self.can_lookup_action(current) {
                break;
            }
            let op = match self.lookup_action(current) {
                Some(op) => op,
                None => {
                    debug_assert_eq!(*self.costs.get(state), PolicyCost::Unknown);
                    self.costs.set(state, PolicyCost::Unsolved);
                    return (PolicyCost::Unsolved, true);
                }
            };
            lower += env.task.operator_cost(op);
            current = env.registry.successor_state(&env.task, current, op);
            if !seen.insert(current) {
                debug_assert_eq!(*self.costs.get(state), PolicyCost::Unknown);
                self.costs.set(state, PolicyCost::Unsolved);
                return (PolicyCost::Unsolved, true);
            }
        }
        (PolicyCost::Finite(lower), false)
    }

    /// Lazy policy-cost evaluation that neither caches the result nor tolerates exceeding
    /// `max_cost` or `max_steps`. In contrast to [`Policy::compute_policy_cost`], an aborted
    /// run counts as [`PolicyCost::Unsolved`]. A dead-end evaluator stops the run early.
    pub fn lazy_compute_policy_cost(
        &mut self,
        env: &mut TestingEnvironment,
        state0: StateId,
        max_cost: Option<i32>,
        max_steps: Option<i32>,
        mut dead_end_eval: Option<&mut dyn Evaluator>,
    ) -> Result<PolicyCost> {
        let mut seen: HashSet<StateId> = HashSet::new();
        seen.insert(state0);
        let mut state = state0;
        let mut plan = Vec::new();
        let mut current_cost: i32 = 0;
        let mut step_counter: i32 = 0;
        loop {
            if let Some(max_cost) = max_cost {
                if current_cost >= max_cost {
                    return Ok(PolicyCost::Unsolved);
                }
            }
            if let Some(max_steps) = max_steps {
                if step_counter > max_steps {
                    return Ok(PolicyCost::Unsolved);
                }
            }
            if env.is_goal(state) {
                return Ok(PolicyCost::Finite(env.task.plan_cost(&plan)));
            }
            if let Some(eval) = dead_end_eval.as_mut() {
                if eval.estimate(&env.task, env.registry.lookup(state)) == Estimate::DeadEnd {
                    return Ok(PolicyCost::Unsolved);
                }
            }
            env.limits.check()?;
            let op = match self.lookup_apply(env, state)? {
                Some(op) => op,
                None => return Ok(PolicyCost::Unsolved),
            };
            plan.push(op);
            state = env.registry.successor_state(&env.task, state, op);
            if !seen.insert(state) {
                return Ok(PolicyCost::Unsolved);
            }
            current_cost += env.task.operator_cost(op);
            step_counter += 1;
        }
    }

    /// Read a previously written running policy cache, filling the action cache and the
    /// policy-parent lists.
    pub fn read_running_policy_cache(
        &mut self,
        env: &mut TestingEnvironment,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let op_index: i64 = fields
                .next()
                .and_then(|tok| tok.parse().ok())
                .ok_or_else(|| {
                    crate::Error::InputFormat(format!("bad policy cache line `{}`", line))
                })?;
            let values: Vec<Val> = fields
                .map(|tok| {
                    tok.parse().map_err(|_| {
                        crate::Error::InputFormat(format!("bad policy cache line `{}`", line))
                    })
                })
                .collect::<Result<_>>()?;
            if values.len() != env.task.num_variables() {
                return Err(crate::Error::InputFormat(format!(
                    "policy cache line has {} values, task has {} variables",
                    values.len(),
                    env.task.num_variables()
                )));
            }
            let state = env.registry.intern(values);
            if op_index < 0 {
                self.actions.set(state, CachedAction::NoOp);
            } else {
                if op_index as usize >= env.task.num_operators() {
                    return Err(crate::Error::InputFormat(format!(
                        "operator index {} out of range in policy cache",
                        op_index
                    )));
                }
                let op = OperatorId(op_index as usize);
                self.actions.set(state, CachedAction::Chosen(op));
                let succ = env.registry.successor_state(&env.task, state, op);
                insert_sorted(self.parents.get_mut(succ), state);
            }
        }
        Ok(())
    }
}
