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

//! # Composite oracle
//!
//! Combines the iterative improvement oracle with external oracles: a *quantitative* one
//! for candidates the policy solves, and a *qualitative* one for candidates it fails on.
//! The metamorphic oracle runs first; if it cannot confirm a bug, the matching external
//! oracle gets its turn and any upper bound it proves is fed back into the metamorphic
//! oracle's cost sets.
//!
//! Inconsistent combinations are refused at construction: intermediate-state testing and
//! parent-bug reporting belong to the sub-oracles (and, with a metamorphic sub-oracle, to
//! that one), never to the composite itself.

use crate::env::TestingEnvironment;
use crate::oracle::iterative_improvement::IterativeImprovementOracle;
use crate::oracle::{best_of, Oracle, OracleSettings, TestResult};
use crate::policy::{Policy, PolicyCost};
use crate::pool::PoolEntry;
use crate::state::StateId;
use crate::{Error, Result};

/// The composite oracle. See the module documentation.
pub struct CompositeOracle {
    settings: OracleSettings,
    qual_oracle: Option<Box<dyn Oracle>>,
    quant_oracle: Option<Box<dyn Oracle>>,
    metamorphic_oracle: Option<IterativeImprovementOracle>,
    /// Run the external oracles even if the candidate is already a known bug.
    enforce_external: bool,
}

impl CompositeOracle {
    /// Combine the given oracles, validating the configuration.
    pub fn new(
        settings: OracleSettings,
        qual_oracle: Option<Box<dyn Oracle>>,
        quant_oracle: Option<Box<dyn Oracle>>,
        metamorphic_oracle: Option<IterativeImprovementOracle>,
        enforce_external: bool,
    ) -> Result<Self> {
        if settings.consider_intermediate_states {
            return Err(Error::Configuration(
                "consider_intermediate_states is not supported in the composite oracle".into(),
            ));
        }
        if settings.report_parent_bugs {
            return Err(Error::Configuration(
                "report_parent_bugs is not supported in the composite oracle".into(),
            ));
        }
        let external_reports_parents = |o: &Option<Box<dyn Oracle>>| {
            o.as_ref().map_or(false, |o| o.settings().report_parent_bugs)
        };
        let external_intermediate = |o: &Option<Box<dyn Oracle>>| {
            o.as_ref()
                .map_or(false, |o| o.settings().consider_intermediate_states)
        };
        if let Some(metamorphic) = &metamorphic_oracle {
            if external_reports_parents(&quant_oracle) || external_reports_parents(&qual_oracle) {
                return Err(Error::Configuration(
                    "parent bugs must be reported via parent cost updates in the metamorphic \
                     oracle, not by an external sub-oracle"
                        .into(),
                ));
            }
            if !metamorphic.oracle_settings().consider_intermediate_states
                && (external_intermediate(&quant_oracle) || external_intermediate(&qual_oracle))
            {
                return Err(Error::Configuration(
                    "intermediate-state testing in an external sub-oracle requires enabling it \
                     in the metamorphic oracle as well"
                        .into(),
                ));
            }
            if !metamorphic.updates_parents() {
                return Err(Error::Configuration(
                    "the metamorphic sub-oracle must update parent costs".into(),
                ));
            }
        }
        Ok(CompositeOracle {
            settings,
            qual_oracle,
            quant_oracle,
            metamorphic_oracle,
            enforce_external,
        })
    }

    /// Run the matching external oracle on the intermediate states of the policy run,
    /// feeding any confirmed bound back into the metamorphic oracle.
    fn run_external_on_path(
        external: &mut Box<dyn Oracle>,
        metamorphic: &mut IterativeImprovementOracle,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        state: StateId,
    ) -> Result<Option<TestResult>> {
        let path = policy.execute_get_path_fragment(env, state, None, true)?;
        debug_assert!(!path.is_empty());
        for &intermediate in path.iter().rev() {
            if env.is_goal(intermediate) || env.bugs.is_known_bug(intermediate) {
                continue;
            }
            let intermediate_test = external.test(env, policy, intermediate)?;
            if intermediate_test.bug_value > 0 {
                env.add_additional_bug(policy, intermediate, intermediate_test);
                metamorphic.add_external_cost_bound(
                    env,
                    policy,
                    intermediate,
                    intermediate_test.upper_cost_bound,
                )?;
                return Ok(Some(intermediate_test));
            }
        }
        Ok(None)
    }
}

impl Oracle for CompositeOracle {
    fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    fn test(
        &mut self,
        _env: &mut TestingEnvironment,
        _policy: &mut Policy,
        _state: StateId,
    ) -> Result<TestResult> {
        Err(Error::Unsupported(
            "the composite oracle only works through its test driver".into(),
        ))
    }

    fn test_driver(
        &mut self,
        env: &mut TestingEnvironment,
        policy: &mut Policy,
        entry: &PoolEntry,
    ) -> Result<TestResult> {
        let state = entry.state;
        let (upper_policy_cost_bound, _) = policy.compute_upper_policy_cost_bound(env, state)?;
        let solved = upper_policy_cost_bound != PolicyCost::Unsolved;

        let external_intermediate = |o: &Option<Box<dyn Oracle>>| {
            o.as_ref()
                .map_or(false, |o| o.settings().consider_intermediate_states)
        };
        let combine_on_path = self
            .metamorphic_oracle
            .as_ref()
            .map_or(false, |m| m.oracle_settings().consider_intermediate_states)
            && (external_intermediate(&self.quant_oracle)
                || external_intermediate(&self.qual_oracle));

        if combine_on_path {
            let metamorphic = match self.metamorphic_oracle.as_mut() {
                Some(m) => m,
                None => unreachable!(),
            };
            let metamorphic_result = metamorphic.test_driver(env, policy, entry)?;
            if metamorphic_result.bug_value > 0 && !self.enforce_external {
                return Ok(metamorphic_result);
            }
            if env.bugs.is_known_bug(state) && !self.enforce_external {
                return Ok(env.bugs.stored_result(state));
            }

            let external = if solved {
                self.quant_oracle.as_mut()
            } else {
                self.qual_oracle.as_mut()
            };
            let mut result = TestResult::default();
            if let Some(external) = external {
                if external.settings().consider_intermediate_states {
                    if let Some(confirmed) = Self::run_external_on_path(
                        external,
                        metamorphic,
                        env,
                        policy,
                        state,
                    )? {
                        return Ok(best_of(confirmed, metamorphic_result));
                    }
                } else {
                    result = external.test(env, policy, state)?;
                }
            }
            if result.bug_value <= 0 {
                return Ok(metamorphic_result);
            }
            metamorphic.add_external_cost_bound(env, policy, state, result.upper_cost_bound)?;
            Ok(best_of(result, metamorphic_result))
        } else if let Some(metamorphic) = self.metamorphic_oracle.as_mut() {
            let metamorphic_result = metamorphic.test_driver(env, policy, entry)?;
            if metamorphic_result.bug_value > 0 {
                return Ok(metamorphic_result);
            }
            if env.bugs.is_known_bug(state) {
                return Ok(env.bugs.stored_result(state));
            }
            let external = if solved {
                self.quant_oracle.as_mut()
            } else {
                self.qual_oracle.as_mut()
            };
            let mut result = TestResult::default();
            if let Some(external) = external {
                result = external.test(env, policy, state)?;
            }
            if result.bug_value <= 0 {
                return Ok(TestResult::default());
            }
            metamorphic.add_external_cost_bound(env, policy, state, result.upper_cost_bound)?;
            Ok(result)
        } else {
            if solved {
                if let Some(quant) = self.quant_oracle.as_mut() {
                    return quant.test_driver(env, policy, entry);
                }
            } else if let Some(qual) = self.qual_oracle.as_mut() {
                return qual.test_driver(env, policy, entry);
            }
            Ok(TestResult::default())
        }
    }

    fn print_statistics(&self) {
        if let Some(qual) = &self.qual_oracle {
            qual.print_statistics();
        }
        if let Some(quant) = &self.quant_oracle {
            quant.print_statistics();
        }
        if let Some(metamorphic) = &self.metamorphic_oracle {
            Oracle::print_statistics(metamorphic);
        }
    }
}
