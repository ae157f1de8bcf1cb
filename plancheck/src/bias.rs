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

//! # Fuzzing biases
//!
//! A [`FuzzingBias`] scores candidate successor states during the random walk of the pool
//! generator. Weights are either [`NEGATIVE_INFINITY`] (never select the state),
//! [`POSITIVE_INFINITY`] (select only among such states) or finite and non-negative
//! (select proportionally). Finite negative weights are not supported.

use crate::env::TestingEnvironment;
use crate::eval::{Estimate, Evaluator};
use crate::policy::{Policy, PolicyCost};
use crate::state::StateId;
use crate::Result;

use rand::Rng;

/// The highest possible bias.
pub const POSITIVE_INFINITY: i32 = std::i32::MAX;

/// The lowest possible bias; states with this bias are never selected.
pub const NEGATIVE_INFINITY: i32 = std::i32::MIN;

/// Select a state from `states` with respect to `weights`.
///
/// If any state has weight [`POSITIVE_INFINITY`], the choice is uniform among those.
/// Otherwise the choice is proportional to the finite weights (uniform if they are all
/// zero). States with weight [`NEGATIVE_INFINITY`] are never chosen. Returns `None` if no
/// state is eligible.
///
/// # Panics
/// Panics if a finite negative weight is passed.
pub fn weighted_choose<R: Rng>(
    rng: &mut R,
    states: &[StateId],
    weights: &[i32],
) -> Option<StateId> {
    assert_eq!(states.len(), weights.len());
    if states.is_empty() {
        return None;
    }
    let mut pos_infinite: Vec<usize> = Vec::new();
    let mut finite: Vec<(usize, i32)> = Vec::new();
    for (i, &weight) in weights.iter().enumerate() {
        if weight == POSITIVE_INFINITY {
            pos_infinite.push(i);
        } else if weight == NEGATIVE_INFINITY {
            continue;
        } else if weight >= 0 {
            finite.push((i, weight));
        } else {
            panic!("finite negative weights are not supported");
        }
    }

    if !pos_infinite.is_empty() {
        let pick = pos_infinite[rng.gen_range(0, pos_infinite.len())];
        Some(states[pick])
    } else if !finite.is_empty() {
        let sum: i64 = finite.iter().map(|&(_, w)| w as i64).sum();
        if sum == 0 {
            let &(pick, _) = &finite[rng.gen_range(0, finite.len())];
            return Some(states[pick]);
        }
        let mut sample = rng.gen::<f64>() * sum as f64;
        let mut index = finite[finite.len() - 1].0;
        for &(i, weight) in &finite {
            sample -= weight as f64;
            if sample < 0.0 {
                index = i;
                break;
            }
        }
        Some(states[index])
    } else {
        None
    }
}

/// A scoring function biasing the random walk of the pool generator.
pub trait FuzzingBias {
    /// The weight of the state. Either [`POSITIVE_INFINITY`], [`NEGATIVE_INFINITY`], or a
    /// finite non-negative value. `budget` bounds the number of policy steps the bias may
    /// spend; 0 means no budget.
    fn bias(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
        budget: u32,
    ) -> Result<i32>;

    /// Fast pre-filter: can the bias determine that the state should not be considered?
    fn can_exclude_state(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
    ) -> Result<bool>;

    /// Check if the policy is known to fail on the state, executing at most the number of
    /// steps the bias computation would spend. `false` if the bias does not run the policy.
    fn policy_is_known_to_fail(
        &mut self,
        _env: &mut TestingEnvironment,
        _policy: &mut Policy,
        _state: StateId,
        _budget: u32,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Notification that a new state was inserted into the pool.
    fn notify_inserted(&mut self, _env: &mut TestingEnvironment, _state: StateId) {}

    /// The budget used up by computing the bias of the state.
    fn used_budget(
        &mut self,
        _env: &mut TestingEnvironment,
        _policy: &mut Policy,
        _state: StateId,
        _budget: u32,
    ) -> Result<u32> {
        Ok(0)
    }

    /// Print bias specific statistics at the end of the run.
    fn print_statistics(&self) {}
}

/// The effective step limit of a policy-based bias: the smaller of horizon and budget,
/// where 0 means unbounded on either side.
fn effective_step_limit(horizon: u32, budget: u32) -> u32 {
    if budget != 0 && horizon != 0 {
        budget.min(horizon)
    } else if horizon != 0 {
        horizon
    } else {
        budget
    }
}

/// The neutral bias: every state weighs 1.
#[derive(Debug, Default)]
pub struct NeutralBias;

impl FuzzingBias for NeutralBias {
    fn bias(
        &mut self,
        _env: &mut TestingEnvironment,
        _policy: &mut Policy,
        _state: StateId,
        _budget: u32,
    ) -> Result<i32> {
        Ok(1)
    }

    fn can_exclude_state(
        &mut self,
        _env: &mut TestingEnvironment,
        _policy: &mut Policy,
        _state: StateId,
    ) -> Result<bool> {
        Ok(false)
    }
}

/// Weighs states by the cost the policy incurs on them within the horizon.
///
/// States the policy fails on get [`POSITIVE_INFINITY`]; states where the evaluation hit the
/// step limit get `limit + 1`.
#[derive(Debug)]
pub struct PlanLengthBias {
    /// Number of policy steps to consider; 0 means no limit.
    pub horizon: u32,
}

impl PlanLengthBias {
    /// Create the bias with the given horizon.
    pub fn new(horizon: u32) -> Self {
        PlanLengthBias { horizon }
    }
}

impl FuzzingBias for PlanLengthBias {
    fn bias(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
        budget: u32,
    ) -> Result<i32> {
        let step_limit = effective_step_limit(self.horizon, budget);
        let cost = policy.compute_policy_cost(env, state, Some(step_limit), false)?;
        Ok(match cost {
            PolicyCost::Unsolved => POSITIVE_INFINITY,
            PolicyCost::Unknown => step_limit as i32 + 1,
            PolicyCost::Finite(c) => c,
        })
    }

    fn can_exclude_state(
        &mut self,
        _env: &mut TestingEnvironment,
        _policy: &mut Policy,
        _state: StateId,
    ) -> Result<bool> {
        Ok(false)
    }

    fn policy_is_known_to_fail(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
        budget: u32,
    ) -> Result<bool> {
        let step_limit = effective_step_limit(self.horizon, budget);
        let (bound, _) = policy.compute_lower_policy_cost_bound(env, state, Some(step_limit))?;
        Ok(bound == PolicyCost::Unsolved)
    }

    fn used_budget(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
        budget: u32,
    ) -> Result<u32> {
        let step_limit = effective_step_limit(self.horizon, budget);
        let path = policy.execute_get_path_fragment(env, state, Some(step_limit), false)?;
        debug_assert!(!path.is_empty());
        Ok(path.len() as u32 - 1)
    }
}

/// Weighs states by the largest gap between the accumulated policy cost along the executed
/// path and the heuristic value: the bigger the detour the policy takes, the higher the
/// weight.
pub struct PolicyHeuristicBias {
    h: Box<dyn Evaluator>,
    /// Number of policy steps to consider; 0 means no limit.
    pub horizon: u32,
}

impl PolicyHeuristicBias {
    /// Create the bias around the given heuristic.
    pub fn new(h: Box<dyn Evaluator>, horizon: u32) -> Self {
        PolicyHeuristicBias { h, horizon }
    }
}

impl FuzzingBias for PolicyHeuristicBias {
    fn bias(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
        budget: u32,
    ) -> Result<i32> {
        let step_limit = effective_step_limit(self.horizon, budget);
        let path = policy.execute_get_path_fragment(env, state, Some(step_limit), false)?;
        let action_costs = policy.read_path_action_costs(&env.task, &path);

        // remaining path cost from each state on the path
        let mut path_costs = vec![0; action_costs.len()];
        let mut current = 0;
        for i in (0..action_costs.len()).rev() {
            current += action_costs[i];
            path_costs[i] = current;
        }

        let mut max_value = 0;
        for (i, &path_state) in path.iter().enumerate().take(path.len().saturating_sub(1)) {
            match self.h.estimate(&env.task, env.registry.lookup(path_state)) {
                Estimate::DeadEnd => {
                    return Ok(if i == 0 {
                        NEGATIVE_INFINITY
                    } else {
                        POSITIVE_INFINITY
                    });
                }
                Estimate::Value(h_value) => {
                    max_value = max_value.max(path_costs[i] - h_value);
                }
            }
        }
        Ok(max_value)
    }

    fn can_exclude_state(
        &mut self,
        env: &mut TestingEnvironment,
        _policy: &mut Policy,
        state: StateId,
    ) -> Result<bool> {
        Ok(self
            .h
            .estimate(&env.task, env.registry.lookup(state))
            .is_dead_end())
    }

    fn policy_is_known_to_fail(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
        budget: u32,
    ) -> Result<bool> {
        let step_limit = effective_step_limit(self.horizon, budget);
        let (bound, _) = policy.compute_lower_policy_cost_bound(env, state, Some(step_limit))?;
        Ok(bound == PolicyCost::Unsolved)
    }

    fn used_budget(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
        budget: u32,
    ) -> Result<u32> {
        let step_limit = effective_step_limit(self.horizon, budget);
        let path = policy.execute_get_path_fragment(env, state, Some(step_limit), false)?;
        debug_assert!(!path.is_empty());
        Ok(path.len() as u32 - 1)
    }
}
