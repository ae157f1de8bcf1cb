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

#![deny(missing_docs)]

//! # Plancheck: Metamorphic Testing of Action Policies for Classical Planning
//!
//! This is a library for finding *bug states* of a (possibly black-box) action policy on a
//! classical planning task in finite-domain representation: states in which the policy
//! either fails to reach a goal although one is reachable, or reaches a goal at a provably
//! higher cost than necessary. Every reported bug carries a quantified *bug value* that
//! lower-bounds the policy's suboptimality on the state.
//!
//! ## Problem Statement
//! Given
//! - a planning task in finite-domain representation,
//! - a policy mapping states to operators (which may also surrender), and
//! - a precomputed numeric dominance relation `D` with `D(s, t) <= h*(s) - h*(t)`,
//!
//! find as many bug states as possible within a time and memory budget, together with the
//! largest bug values that can be proven for them.
//!
//! ## Structure
//!
//! This library is structured in the following way:
//!
//! - **[`fdr`]**: The immutable planning task, and the parser for the textual FDR format.
//!
//! - **[`state`]**: The interning [`StateRegistry`](state::StateRegistry) handing out dense
//!   [`StateId`](state::StateId)s, and per-state tables keyed by them.
//!
//! - **[`policy`]**: The [`Policy`](policy::Policy) cache around a black-box
//!   [`PolicyProvider`](policy::PolicyProvider): memoised actions, policy cost bounds, and
//!   the reverse policy-parent edges used for bug propagation.
//!
//! - **[`dominance`]**: The factored [`NumericDominance`](dominance::NumericDominance)
//!   relation with its compressed on-disk representation. How such a relation is computed
//!   is outside of this library.
//!
//! - **[`oracle`]**: The [`Oracle`](oracle::Oracle) contract and its implementations, most
//!   importantly the comparison based
//!   [`IterativeImprovementOracle`](oracle::iterative_improvement::IterativeImprovementOracle).
//!
//! - **[`engine`]**: The [`PoolFuzzerEngine`](engine::PoolFuzzerEngine) driving pool
//!   growth, policy execution, oracle invocation and bug bookkeeping.
//!
//! - **[`bias`]**, **[`filter`]**, **[`novelty`]**: The scoring functions and admission
//!   filters of the pool generator.
//!
//! - **[`pool`]**, **[`bugs`]**, **[`regions`]**: The candidate pool, the bug store with
//!   its append-only log, and the region extractor partitioning pool and bug states into
//!   reachable components.
//!
//! ## Usage
//!
//! ```no_run
//! use plancheck::engine::{FuzzerSettings, PoolFuzzerEngine};
//! use plancheck::bias::NeutralBias;
//! use plancheck::dominance::NumericDominance;
//! use plancheck::eval::GoalCountEvaluator;
//! use plancheck::filter::AcceptAllFilter;
//! use plancheck::oracle::iterative_improvement::{
//!     IterativeImprovementOracle, IterativeImprovementSettings,
//! };
//! use plancheck::policies::HeuristicDescendPolicy;
//!
//! fn main() -> Result<(), plancheck::Error> {
//!     let task = plancheck::fdr::parse_task_file("output.sas")?;
//!     let relation = NumericDominance::identity(&task);
//!     let oracle = IterativeImprovementOracle::new(
//!         relation,
//!         IterativeImprovementSettings::default(),
//!         None,
//!     )?;
//!     let policy = HeuristicDescendPolicy::new(Box::new(GoalCountEvaluator), false, true);
//!     let mut settings = FuzzerSettings::default();
//!     settings.max_pool_size = 100;
//!     let mut engine = PoolFuzzerEngine::new(
//!         task,
//!         Box::new(policy),
//!         Some(Box::new(oracle)),
//!         Box::new(NeutralBias),
//!         Box::new(AcceptAllFilter),
//!         None,
//!         settings,
//!     )?;
//!     engine.run()
//! }
//! ```

pub mod bias;
pub mod bugs;
pub mod dominance;
pub mod engine;
pub mod env;
mod error;
pub mod eval;
pub mod fdr;
pub mod filter;
pub mod novelty;
pub mod oracle;
pub mod policies;
pub mod policy;
pub mod pool;
pub mod regions;
pub mod resources;
pub mod state;

// test modules
mod test;

pub use error::{exit_code, Error};

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
