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

//! Heuristic evaluator and plan-cost estimator seams.
//!
//! Real heuristics (additive, FF, LM-cut, ...) and internal planners live outside of this
//! crate; components consume them exclusively through the [`Evaluator`] and
//! [`PlanCostEstimator`] traits. Two trivial evaluators are bundled so that biases, filters
//! and lookahead search can be driven without external code.

use crate::fdr::{Task, Val};
use crate::Result;

/// Outcome of a heuristic evaluation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Estimate {
    /// A finite, non-negative heuristic value
    Value(i32),
    /// The state was recognized as a dead end
    DeadEnd,
}

impl Estimate {
    /// Check whether this estimate flags a dead end.
    pub fn is_dead_end(self) -> bool {
        matches!(self, Estimate::DeadEnd)
    }
}

/// A state evaluator (heuristic function).
pub trait Evaluator {
    /// Evaluate the given state.
    fn estimate(&mut self, task: &Task, state: &[Val]) -> Estimate;
}

/// The blind evaluator: 0 on goal states, 1 everywhere else.
#[derive(Debug, Default)]
pub struct BlindEvaluator;

impl Evaluator for BlindEvaluator {
    fn estimate(&mut self, task: &Task, state: &[Val]) -> Estimate {
        if task.is_goal_state(state) {
            Estimate::Value(0)
        } else {
            Estimate::Value(1)
        }
    }
}

/// Counts the number of unsatisfied goal facts.
#[derive(Debug, Default)]
pub struct GoalCountEvaluator;

impl Evaluator for GoalCountEvaluator {
    fn estimate(&mut self, task: &Task, state: &[Val]) -> Estimate {
        let unsatisfied = task
            .goal
            .iter()
            .filter(|&&(var, val)| state[var] != val)
            .count();
        Estimate::Value(unsatisfied as i32)
    }
}

/// Outcome of a plan-cost estimation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CostEstimate {
    /// A plan of this cost exists from the state
    Plan(i32),
    /// The state is unsolvable
    DeadEnd,
    /// The estimator gave up within its budget
    Unknown,
}

/// An external cost estimator (e.g. an internal planner) producing trusted upper bounds.
pub trait PlanCostEstimator {
    /// Compute a trusted plan cost for the given state, or report that none was found.
    ///
    /// May raise [`crate::Error::OutOfResource`] at its own suspension points.
    fn compute_cost(&mut self, task: &Task, state: &[Val]) -> Result<CostEstimate>;
}
