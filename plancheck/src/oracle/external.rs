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

//! External (non-metamorphic) oracles.
//!
//! These oracles compare the policy against an independent source of truth: a bounded
//! exhaustive lookahead around the candidate, or a trusted plan-cost estimator such as an
//! internal planner.

use crate::env::TestingEnvironment;
use crate::eval::{CostEstimate, Evaluator, PlanCostEstimator};
use crate::oracle::{
    Oracle, OracleSettings, TestResult, NOT_APPLICABLE_INDICATOR, UNSOLVED_BUG_VALUE,
};
use crate::policy::{Policy, PolicyCost};
use crate::state::StateId;
use crate::Result;

use std::collections::{HashMap, HashSet};

/// Configuration of the [`BoundedLookaheadOracle`].
#[derive(Clone, Copy, Debug)]
pub struct BoundedLookaheadSettings {
    /// Shared oracle options
    pub oracle: OracleSettings,
    /// Lookahead depth
    pub depth: usize,
    /// Step bound for each policy evaluation on a frontier state
    pub max_evaluation_steps: Option<i32>,
    /// Cache the results of oracle invocations
    pub cache_results: bool,
}

impl Default for BoundedLookaheadSettings {
    fn default() -> Self {
        BoundedLookaheadSettings {
            oracle: OracleSettings::default(),
            depth: 2,
            max_evaluation_steps: None,
            cache_results: true,
        }
    }
}

/// Exhaustively explores the neighbourhood of the candidate up to a fixed depth. A goal
/// found at cost `g` below the policy's cost, or a frontier state the policy solves cheaply
/// enough, proves the candidate to be a bug.
pub struct BoundedLookaheadOracle {
    settings: BoundedLookaheadSettings,
    dead_end_eval: Option<Box<dyn Evaluator>>,
    result_cache: HashMap<StateId, TestResult>,
}

impl BoundedLookaheadOracle {
    /// Create the oracle.
    pub fn new(
        settings: BoundedLookaheadSettings,
        dead_end_eval: Option<Box<dyn Evaluator>>,
    ) -> Self {
        BoundedLookaheadOracle {
            settings: BoundedLookaheadSettings {
                depth: settings.depth.max(1),
                ..settings
            },
            dead_end_eval,
            result_cache: HashMap::new(),
        }
    }

    fn finish(&mut self, state: StateId, result: TestResult) -> Result<TestResult> {
        if self.settings.cache_results {
            self.result_cache.insert(state, result);
        }
        Ok(result)
    }
}

impl Oracle for BoundedLookaheadOracle {
    fn settings(&self) -> &OracleSettings {
        &self.settings.oracle
    }

    fn test(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
    ) -> Result<TestResult> {
        if self.settings.cache_results {
            if let Some(&cached) = self.result_cache.get(&state) {
                return Ok(cached);
            }
        }

        let (lower_bound, _) = policy.compute_lower_policy_cost_bound(env, state, None)?;

        let depth_limit = self.settings.depth;
        let mut open: Vec<Vec<(StateId, i32)>> = vec![Vec::new(); depth_limit];
        let mut closed: Vec<HashSet<StateId>> = vec![HashSet::new(); depth_limit];
        open[0].push((state, 0));
        let mut depth: usize = 0;
        loop {
            let (current, g) = match open[depth].pop() {
                Some(node) => node,
                None => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    continue;
                }
            };
            if !closed[depth].insert(current) {
                continue;
            }
            if env.is_goal(current) {
                match lower_bound {
                    PolicyCost::Unsolved => {
                        return self.finish(
                            state,
                            TestResult::new(UNSOLVED_BUG_VALUE, PolicyCost::Finite(g)),
                        );
                    }
                    PolicyCost::Finite(lower) if lower > g => {
                        return self
                            .finish(state, TestResult::new(lower - g, PolicyCost::Finite(g)));
                    }
                    _ => {}
                }
                continue;
            }
            let aops = env.applicable_ops(current);
            if depth + 1 == depth_limit {
                for op in aops {
                    let succ = env.successor(current, op);
                    let succ_g = g + env.task.operator_cost(op);

                    let mut cost_limit: Option<i32> = None;
                    let mut evaluate_succ = true;
                    if let PolicyCost::Finite(lower) = lower_bound {
                        // bug criterion: lower > succ_plan_cost + succ_g
                        let limit = lower - succ_g;
                        evaluate_succ = limit >= 0;
                        cost_limit = Some(limit);
                    }

                    let succ_plan_cost = if evaluate_succ {
                        policy.lazy_compute_policy_cost(
                            env,
                            succ,
                            cost_limit,
                            self.settings.max_evaluation_steps,
                            self.dead_end_eval
                                .as_mut()
                                .map(|e| &mut **e as &mut dyn Evaluator),
                        )?
                    } else {
                        PolicyCost::Unsolved
                    };

                    if let PolicyCost::Finite(succ_cost) = succ_plan_cost {
                        match lower_bound {
                            PolicyCost::Unsolved => {
                                return self.finish(
                                    state,
                                    TestResult::new(
                                        UNSOLVED_BUG_VALUE,
                                        PolicyCost::Finite(succ_cost + succ_g),
                                    ),
                                );
                            }
                            PolicyCost::Finite(lower) if lower > succ_cost + succ_g => {
                                return self.finish(
                                    state,
                                    TestResult::new(
                                        lower - succ_cost - succ_g,
                                        PolicyCost::Finite(succ_cost + succ_g),
                                    ),
                                );
                            }
                            _ => {}
                        }
                    }
                    env.check_limits()?;
                }
            } else {
                depth += 1;
                debug_assert!(open[depth].is_empty());
                for op in aops {
                    let succ = env.successor(current, op);
                    let op_cost = env.task.operator_cost(op);
                    open[depth].push((succ, g + op_cost));
                }
            }
        }
        self.finish(state, TestResult::default())
    }
}

/// Compares the policy against a trusted external cost estimator.
pub struct CostEstimatorOracle {
    settings: OracleSettings,
    estimator: Box<dyn PlanCostEstimator>,
}

impl CostEstimatorOracle {
    /// Create the oracle around the estimator.
    pub fn new(settings: OracleSettings, estimator: Box<dyn PlanCostEstimator>) -> Self {
        CostEstimatorOracle {
            settings,
            estimator,
        }
    }
}

impl Oracle for CostEstimatorOracle {
    fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    fn test(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
    ) -> Result<TestResult> {
        let (lower_bound, _) = policy.compute_lower_policy_cost_bound(env, state, None)?;
        let estimate = self
            .estimator
            .compute_cost(&env.task, env.registry.lookup(state))?;
        match estimate {
            CostEstimate::Unknown => Ok(TestResult::new(
                NOT_APPLICABLE_INDICATOR,
                PolicyCost::Unsolved,
            )),
            CostEstimate::DeadEnd => Ok(TestResult::default()),
            CostEstimate::Plan(cost) => {
                let upper = PolicyCost::Finite(cost);
                match lower_bound {
                    PolicyCost::Unsolved => Ok(TestResult::new(UNSOLVED_BUG_VALUE, upper)),
                    PolicyCost::Finite(lower) if lower > cost => {
                        Ok(TestResult::new(lower - cost, upper))
                    }
                    _ => Ok(TestResult::new(0, upper)),
                }
            }
        }
    }
}
