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

//! # Test engines
//!
//! The [`PoolFuzzerEngine`] drives the whole testing run: it grows the pool of candidate
//! states with biased random walks, runs the policy and the oracle on every admitted
//! candidate, records bugs, and extracts the reachable regions of the pool and bug states
//! at the end. The [`PoolTesterEngine`] replays a previously recorded pool file instead of
//! generating fresh candidates.
//!
//! Every step reserves a memory padding, propagates the remaining time budget to the
//! resource limits, and treats [`Error::OutOfResource`] as the signal to wrap up: partial
//! progress is kept, the current step ends, and the run finishes.

use crate::bias::{weighted_choose, FuzzingBias, NEGATIVE_INFINITY, POSITIVE_INFINITY};
use crate::bugs::BugFileWriter;
use crate::env::TestingEnvironment;
use crate::eval::Evaluator;
use crate::fdr::Task;
use crate::filter::PoolFilter;
use crate::novelty::NoveltyStore;
use crate::oracle::{Oracle, NOT_APPLICABLE_INDICATOR, UNSOLVED_BUG_VALUE};
use crate::policy::{Policy, PolicyCost, PolicyProvider, RunningPolicyCacheWriter};
use crate::pool::{Pool, PoolEntry, PoolFileWriter};
use crate::regions::compute_state_regions;
use crate::state::StateId;
use crate::{Error, Result};

use itertools::Itertools;
use log::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Configuration of the [`PoolFuzzerEngine`].
#[derive(Clone, Debug)]
pub struct FuzzerSettings {
    /// Seed of the random walk PRNG
    pub seed: u64,
    /// Maximal number of fuzzing steps
    pub max_steps: usize,
    /// Maximal pool size
    pub max_pool_size: usize,
    /// Maximal length of a single random walk
    pub max_walk_length: usize,
    /// Budget for bias computation per state expansion; 0 means no limit
    pub bias_budget: u32,
    /// Cache the bias value of each state
    pub cache_bias: bool,
    /// Use an infinite bias for states the policy is known to fail on
    pub penalize_policy_fails: bool,
    /// Arity of the novelty statistics
    pub novelty_statistics_arity: usize,
    /// Step limit for policy executions; 0 means no limit
    pub policy_steps_limit: u32,
    /// Overall time budget of the run
    pub overall_time_limit: Option<Duration>,
    /// Bound on the peak resident set size, in kilobytes
    pub memory_limit_kb: Option<u64>,
    /// Memory padding reserved around each step, in megabytes
    pub memory_padding_mb: usize,
    /// Persist the pool to this file
    pub pool_file: Option<PathBuf>,
    /// Persist bugs to this file
    pub bugs_file: Option<PathBuf>,
    /// Policy cache file to read from or write to
    pub policy_cache_file: Option<PathBuf>,
    /// Fill the policy cache from `policy_cache_file` before the run
    pub read_policy_cache: bool,
    /// Skip all testing, only record the policy cache
    pub just_write_policy_cache: bool,
    /// Print verbose progress information
    pub verbose: bool,
}

impl Default for FuzzerSettings {
    fn default() -> Self {
        FuzzerSettings {
            seed: 1734,
            max_steps: std::usize::MAX,
            max_pool_size: std::usize::MAX,
            max_walk_length: 5,
            bias_budget: 200,
            cache_bias: false,
            penalize_policy_fails: false,
            novelty_statistics_arity: 2,
            policy_steps_limit: 0,
            overall_time_limit: None,
            memory_limit_kb: None,
            memory_padding_mb: 50,
            pool_file: None,
            bugs_file: None,
            policy_cache_file: None,
            read_policy_cache: false,
            just_write_policy_cache: false,
            verbose: false,
        }
    }
}

enum StepOutcome {
    InProgress,
    Finished,
}

fn fmt_limit(limit: usize) -> String {
    if limit == std::usize::MAX {
        String::from("inf")
    } else {
        limit.to_string()
    }
}

/// The pool based fuzzing engine. See the module documentation.
pub struct PoolFuzzerEngine {
    env: TestingEnvironment,
    policy: Policy,
    oracle: Option<Box<dyn Oracle>>,
    bias: Box<dyn FuzzingBias>,
    filter: Box<dyn PoolFilter>,
    dead_end_eval: Option<Box<dyn Evaluator>>,
    rng: StdRng,
    settings: FuzzerSettings,

    pool: Pool,
    states_in_pool: HashSet<StateId>,
    novelty: NoveltyStore,
    pool_file: Option<PoolFileWriter>,
    is_dead: HashMap<StateId, bool>,
    bias_cache: HashMap<StateId, i32>,

    fuzzing_step: usize,
    duplicates: usize,
    filtered: usize,
    failed: usize,
    num_tests: usize,
    num_solved: usize,

    start_time: Instant,
    deadline: Option<Instant>,
    fuzzing_time: Duration,
    testing_time: Duration,
}

impl PoolFuzzerEngine {
    /// Create the engine, validating the configuration.
    pub fn new(
        task: Task,
        provider: Box<dyn PolicyProvider>,
        oracle: Option<Box<dyn Oracle>>,
        bias: Box<dyn FuzzingBias>,
        filter: Box<dyn PoolFilter>,
        dead_end_eval: Option<Box<dyn Evaluator>>,
        settings: FuzzerSettings,
    ) -> Result<Self> {
        if !task.axioms.is_empty() {
            return Err(Error::Unsupported(
                "tasks with axioms are not supported".into(),
            ));
        }
        if settings.max_walk_length == 0 {
            return Err(Error::Configuration(
                "max_walk_length must be at least 1".into(),
            ));
        }
        if settings.read_policy_cache && settings.just_write_policy_cache {
            return Err(Error::Configuration(
                "you cannot read and write the policy cache in the same run".into(),
            ));
        }
        if (settings.read_policy_cache || settings.just_write_policy_cache)
            && settings.policy_cache_file.is_none()
        {
            return Err(Error::Configuration(
                "a policy cache file is required to read from or write to the policy cache"
                    .into(),
            ));
        }

        let novelty = NoveltyStore::new(settings.novelty_statistics_arity, &task);
        let mut env = TestingEnvironment::new(task);
        if let Some(limit) = settings.memory_limit_kb {
            env.limits.set_memory_limit_kb(limit);
        }
        let mut policy = Policy::new(provider, settings.policy_steps_limit);
        if let Some(cache_file) = &settings.policy_cache_file {
            if settings.read_policy_cache {
                policy.read_running_policy_cache(&mut env, cache_file)?;
            }
            if settings.just_write_policy_cache {
                policy.set_running_cache_writer(RunningPolicyCacheWriter::create(cache_file)?);
            }
        }
        if let Some(bugs_file) = &settings.bugs_file {
            env.bugs.set_writer(BugFileWriter::create(&env.task, bugs_file)?);
        }
        let pool_file = match &settings.pool_file {
            Some(path) => Some(PoolFileWriter::create(&env.task, path)?),
            None => None,
        };

        Ok(PoolFuzzerEngine {
            rng: StdRng::seed_from_u64(settings.seed),
            env,
            policy,
            oracle,
            bias,
            filter,
            dead_end_eval,
            pool: Pool::new(),
            states_in_pool: HashSet::new(),
            novelty,
            pool_file,
            is_dead: HashMap::new(),
            bias_cache: HashMap::new(),
            fuzzing_step: 0,
            duplicates: 0,
            filtered: 0,
            failed: 0,
            num_tests: 0,
            num_solved: 0,
            start_time: Instant::now(),
            deadline: None,
            fuzzing_time: Duration::from_secs(0),
            testing_time: Duration::from_secs(0),
            settings,
        })
    }

    /// Run the engine until its budgets are exhausted, then print the final statistics.
    pub fn run(&mut self) -> Result<()> {
        self.start_time = Instant::now();
        self.deadline = self
            .settings
            .overall_time_limit
            .map(|limit| self.start_time + limit);
        loop {
            match self.step()? {
                StepOutcome::InProgress => {}
                StepOutcome::Finished => break,
            }
        }
        self.print_statistics();
        Ok(())
    }

    fn elapsed(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Propagate the remaining time of the run to the resource limits.
    fn set_step_deadline(&mut self) {
        match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                self.env.limits.set_max_time(remaining);
            }
            None => self.env.limits.clear_max_time(),
        }
    }

    fn step(&mut self) -> Result<StepOutcome> {
        if self.fuzzing_step >= self.settings.max_steps
            || self.pool.len() >= self.settings.max_pool_size
        {
            println!("Computing state regions...");
            let pool_states: Vec<StateId> = self.pool.iter().map(|e| e.state).collect();
            let regions = compute_state_regions(&mut self.env, &pool_states);
            println!("Number of regions: {}", regions.len());
            self.compute_bug_regions_print_result();
            return Ok(StepOutcome::Finished);
        }

        self.env
            .limits
            .reserve_extra_memory_padding(self.settings.memory_padding_mb);
        let step_start = Instant::now();
        let outcome = self.fuzz_one_step();
        self.fuzzing_time += step_start.elapsed();
        self.env.limits.release_extra_memory_padding();
        match outcome {
            Ok(()) => Ok(StepOutcome::InProgress),
            Err(Error::OutOfResource) => {
                println!(
                    "aborting: out of time or memory [t={:.2}s]",
                    self.elapsed()
                );
                Ok(StepOutcome::Finished)
            }
            Err(e) => Err(e),
        }
    }

    fn fuzz_one_step(&mut self) -> Result<()> {
        self.set_step_deadline();
        if self.fuzzing_step == 0 {
            let initial = self.env.initial_state();
            self.insert(None, 0, initial)?;
        } else {
            self.random_walk()?;
        }
        self.fuzzing_step += 1;
        Ok(())
    }

    fn print_status_line(&self) {
        println!(
            "Pool {:>14} / {} [steps={}, dead-ends={}, filtered={}, t={:.2}s]",
            self.pool.len(),
            fmt_limit(self.settings.max_pool_size),
            self.fuzzing_step,
            self.failed,
            self.filtered,
            self.elapsed()
        );
    }

    /// Admit a state to the pool, run the oracle on it, and persist the entry.
    fn insert(&mut self, ref_index: Option<usize>, steps: u32, state: StateId) -> Result<bool> {
        if !self.filter.store(&mut self.env, state) {
            self.filtered += 1;
            return Ok(false);
        }
        self.states_in_pool.insert(state);
        let ref_state = ref_index
            .map(|i| self.pool[i].state)
            .unwrap_or(StateId::NONE);
        let entry = PoolEntry {
            ref_index,
            ref_state,
            steps,
            state,
        };
        self.pool.push(entry);
        self.novelty.insert(self.env.registry.lookup(state));
        self.bias.notify_inserted(&mut self.env, state);
        self.print_status_line();
        self.run_test(&entry)?;
        // tests run before the write so that the pool file only contains states the policy
        // has been executed on
        if let Some(writer) = &mut self.pool_file {
            writer.write(&self.env.registry, &entry)?;
        }
        Ok(true)
    }

    fn walk_limits_reached(&self) -> bool {
        self.pool.len() >= self.settings.max_pool_size || self.env.limits.are_limits_reached()
    }

    /// One biased random walk from a random pool entry.
    fn random_walk(&mut self) -> Result<()> {
        let ref_index = self.rng.gen_range(0, self.pool.len());
        // gen_range panics on an empty range, so never sample from less than 1
        let step_limit = self.rng.gen_range(0, self.settings.max_walk_length.max(1)) + 1;
        let mut state = self.pool[ref_index].state;
        let mut step_counter: u32 = 0;
        while (step_counter as usize) < step_limit {
            let mut applicable = self.env.applicable_ops(state);
            // not every successor may fit into the bias budget, so consider them in random
            // order
            applicable.shuffle(&mut self.rng);
            let mut successors: Vec<StateId> = Vec::new();
            let mut successor_biases: Vec<i32> = Vec::new();
            let mut used_budget: u32 = 0;

            for op in applicable {
                if self.walk_limits_reached() {
                    return Err(Error::OutOfResource);
                }
                let bias_budget = self.settings.bias_budget;
                if bias_budget != 0 && used_budget >= bias_budget {
                    break;
                }
                let remaining_budget = if bias_budget != 0 {
                    bias_budget - used_budget
                } else {
                    0
                };
                let succ = self.env.successor(state, op);

                let mut succ_bias = 0;
                let mut read_cached_bias = false;
                if self.settings.cache_bias {
                    if let Some(&cached) = self.bias_cache.get(&succ) {
                        succ_bias = cached;
                        read_cached_bias = true;
                        if cached == NEGATIVE_INFINITY {
                            continue;
                        }
                    }
                }
                if !read_cached_bias {
                    // goal states are not test candidates
                    if self.env.is_goal(succ) {
                        self.cache_bias_value(succ, NEGATIVE_INFINITY);
                        continue;
                    }
                    if !self
                        .env
                        .task
                        .has_applicable_operator(self.env.registry.lookup(succ))
                    {
                        self.cache_bias_value(succ, NEGATIVE_INFINITY);
                        continue;
                    }
                    let mut succ_is_known_dead_end = false;
                    if let Some(eval) = self.dead_end_eval.as_mut() {
                        let known = match self.is_dead.get(&succ) {
                            Some(&dead) => dead,
                            None => {
                                let dead = eval
                                    .estimate(&self.env.task, self.env.registry.lookup(succ))
                                    .is_dead_end();
                                self.is_dead.insert(succ, dead);
                                dead
                            }
                        };
                        succ_is_known_dead_end = known;
                    }
                    if succ_is_known_dead_end
                        || self
                            .bias
                            .can_exclude_state(&mut self.env, &mut self.policy, succ)?
                    {
                        self.cache_bias_value(succ, NEGATIVE_INFINITY);
                        continue;
                    }
                    succ_bias = if self.settings.penalize_policy_fails
                        && self.bias.policy_is_known_to_fail(
                            &mut self.env,
                            &mut self.policy,
                            succ,
                            remaining_budget,
                        )? {
                        POSITIVE_INFINITY
                    } else {
                        self.bias
                            .bias(&mut self.env, &mut self.policy, succ, remaining_budget)?
                    };
                    used_budget += self.bias.used_budget(
                        &mut self.env,
                        &mut self.policy,
                        succ,
                        remaining_budget,
                    )?;
                    self.cache_bias_value(succ, succ_bias);
                }
                successors.push(succ);
                successor_biases.push(succ_bias);
            }

            match weighted_choose(&mut self.rng, &successors, &successor_biases) {
                Some(selected) => state = selected,
                None => {
                    self.failed += 1;
                    self.is_dead.insert(state, true);
                    return Ok(());
                }
            }
            step_counter += 1;
        }

        if !self.states_in_pool.contains(&state) {
            self.insert(Some(ref_index), step_counter, state)?;
        } else {
            self.duplicates += 1;
        }
        Ok(())
    }

    fn cache_bias_value(&mut self, state: StateId, value: i32) {
        if self.settings.cache_bias {
            self.bias_cache.insert(state, value);
        }
    }

    /// Run the policy and the oracle on a pool entry, recording the result.
    fn run_test(&mut self, entry: &PoolEntry) -> Result<()> {
        if self.oracle.is_none() && !self.settings.just_write_policy_cache {
            return Ok(());
        }
        self.num_tests += 1;
        println!(
            "Starting test {:>5} [t={:.2}s]",
            self.num_tests,
            self.elapsed()
        );
        let test_start = Instant::now();
        let result = self.run_test_inner(entry);
        self.testing_time += test_start.elapsed();
        if let Err(Error::OutOfResource) = &result {
            println!("out of time! [t={:.2}s]", self.elapsed());
        }
        result
    }

    fn run_test_inner(&mut self, entry: &PoolEntry) -> Result<()> {
        let just_write_policy_cache = self.settings.just_write_policy_cache;
        let solved = test_pool_entry(
            &mut self.env,
            &mut self.policy,
            if just_write_policy_cache {
                None
            } else {
                self.oracle.as_mut().map(|o| &mut **o as &mut dyn Oracle)
            },
            entry,
            self.start_time,
            self.settings.verbose,
        )?;
        if solved {
            self.num_solved += 1;
        }
        Ok(())
    }

    fn compute_bug_regions_print_result(&mut self) {
        if self.oracle.is_some() && !self.settings.just_write_policy_cache {
            println!("Computing bug regions...");
            let mut bug_states: Vec<StateId> = self.env.bugs.bug_states().collect();
            bug_states.sort_unstable();
            let regions = compute_state_regions(&mut self.env, &bug_states);
            println!("Number of bug regions: {}", regions.len());
        }
    }

    /// Print the final statistics block.
    pub fn print_statistics(&self) {
        println!("Fuzzing time: {:.2}s", self.fuzzing_time.as_secs_f64());
        println!("Fuzzing steps: {}", self.fuzzing_step);
        println!("Duplicate states: {}", self.duplicates);
        println!("Pool size: {}", self.pool.len());
        println!("Max pool size: {}", fmt_limit(self.settings.max_pool_size));

        let mut pool_bugs = 0;
        let mut qualitative_pool_bugs = 0;
        for entry in &self.pool {
            if self.env.bugs.is_known_bug(entry.state) {
                pool_bugs += 1;
                if self.env.bugs.stored_result(entry.state).bug_value == UNSOLVED_BUG_VALUE {
                    qualitative_pool_bugs += 1;
                }
            }
        }
        println!(
            "Pool state ids: [{}]",
            self.pool.iter().map(|e| e.state).join(", ")
        );
        println!("Pool bug states: {}", pool_bugs);
        println!("Qualitative pool bug states: {}", qualitative_pool_bugs);
        println!(
            "Non-qualitative pool bug states: {}",
            pool_bugs - qualitative_pool_bugs
        );
        println!(
            "Pool unconfirmed states: {}",
            self.pool.len() - pool_bugs
        );
        println!(
            "Non-pool bug states: {}",
            self.env.bugs.num_bugs() - pool_bugs
        );
        println!("Solved pool states: {}", self.num_solved);
        println!("States filtered out: {}", self.filtered);
        println!("Failed attempts: {}", self.failed);
        self.novelty.print_statistics();
        self.bias.print_statistics();
        self.filter.print_statistics();
        if self.oracle.is_some() && !self.settings.just_write_policy_cache {
            println!("Testing time: {:.2}s", self.testing_time.as_secs_f64());
            println!("Conducted tests: {}", self.num_tests);
            println!("Unclear states: {}", self.env.bugs.num_unclear());
            println!("Bugs found: {}", self.env.bugs.num_bugs());
            println!(
                "Unsolved state bugs: {}",
                self.env.bugs.num_unsolved_state_bugs()
            );
            println!("States solved by policy: {}", self.num_solved);
            if let Some(oracle) = &self.oracle {
                oracle.print_statistics();
            }
        }
    }

    /// The current pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// The number of random walks that ended in an already pooled state.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// The number of fuzzing steps taken so far.
    pub fn fuzzing_steps(&self) -> usize {
        self.fuzzing_step
    }

    /// The shared testing environment.
    pub fn environment(&self) -> &TestingEnvironment {
        &self.env
    }

    /// The policy cache.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}

/// Run the policy and (if given) the oracle on one pool entry, recording the result in the
/// bug store. Returns whether the policy solved the state.
fn test_pool_entry(
    env: &mut TestingEnvironment,
    policy: &mut Policy,
    oracle: Option<&mut dyn Oracle>,
    entry: &PoolEntry,
    start_time: Instant,
    verbose: bool,
) -> Result<bool> {
    let state = entry.state;
    let elapsed = |start: Instant| start.elapsed().as_secs_f64();
    if verbose {
        debug!("Executing policy on StateID={}", state);
    }
    let policy_cost = policy.compute_policy_cost(env, state, None, true)?;
    let mut solved = false;
    match policy_cost {
        PolicyCost::Unknown => {
            println!(
                "Policy on StateID={}: aborted [t={:.2}s]",
                state,
                elapsed(start_time)
            );
        }
        PolicyCost::Unsolved => {
            println!(
                "Policy on StateID={}: not solved [t={:.2}s]",
                state,
                elapsed(start_time)
            );
        }
        PolicyCost::Finite(cost) => {
            println!(
                "Policy on StateID={}: policy_cost={} [t={:.2}s]",
                state,
                cost,
                elapsed(start_time)
            );
            solved = true;
        }
    }

    let oracle = match oracle {
        Some(oracle) => oracle,
        None => return Ok(solved),
    };
    if verbose {
        debug!("Running bug analysis on StateID={}", state);
    }
    if env.bugs.is_known_bug(state) {
        env.bugs.write_pool_marker(state)?;
    }
    let test_result = oracle.test_driver(env, policy, entry)?;

    if test_result.bug_value == NOT_APPLICABLE_INDICATOR {
        println!(
            "Result for StateID={}: method not applicable [t={:.2}s]",
            state,
            elapsed(start_time)
        );
        env.bugs.mark_unclear(state);
    } else if test_result.bug_value == 0 {
        println!(
            "Result for StateID={}: passed [t={:.2}s]",
            state,
            elapsed(start_time)
        );
        env.bugs.mark_unclear(state);
    } else {
        let was_known = env.bugs.is_known_bug(state);
        let improved = env.add_additional_bug(policy, state, test_result);
        if !improved {
            println!(
                "Result for StateID={}: bug already known, no improved bug value [t={:.2}s]",
                state,
                elapsed(start_time)
            );
        }
        if !was_known {
            env.bugs.write_pool_marker(state)?;
        }
    }
    Ok(solved)
}

/// Configuration of the [`PoolTesterEngine`].
#[derive(Clone, Debug)]
pub struct PoolTesterSettings {
    /// Index of the first pool entry to test
    pub start_from: usize,
    /// Maximal number of pool entries to test
    pub max_steps: usize,
    /// Arity of the novelty statistics
    pub novelty_statistics_arity: usize,
    /// Step limit for policy executions; 0 means no limit
    pub policy_steps_limit: u32,
    /// Overall time budget of the run
    pub overall_time_limit: Option<Duration>,
    /// Bound on the peak resident set size, in kilobytes
    pub memory_limit_kb: Option<u64>,
    /// Memory padding reserved around each step, in megabytes
    pub memory_padding_mb: usize,
    /// Persist bugs to this file
    pub bugs_file: Option<PathBuf>,
    /// Policy cache file to read before the run
    pub policy_cache_file: Option<PathBuf>,
    /// Fill the policy cache from `policy_cache_file` before the run
    pub read_policy_cache: bool,
    /// Print verbose progress information
    pub verbose: bool,
}

impl Default for PoolTesterSettings {
    fn default() -> Self {
        PoolTesterSettings {
            start_from: 0,
            max_steps: std::usize::MAX,
            novelty_statistics_arity: 2,
            policy_steps_limit: 0,
            overall_time_limit: None,
            memory_limit_kb: None,
            memory_padding_mb: 50,
            bugs_file: None,
            policy_cache_file: None,
            read_policy_cache: false,
            verbose: false,
        }
    }
}

/// Replays a previously recorded pool and runs the oracle on every entry, instead of
/// generating fresh candidates.
pub struct PoolTesterEngine {
    env: TestingEnvironment,
    policy: Policy,
    oracle: Box<dyn Oracle>,
    settings: PoolTesterSettings,

    pool: Pool,
    novelty: NoveltyStore,
    end_step: usize,
    step: usize,
    num_tests: usize,
    num_solved: usize,

    start_time: Instant,
    deadline: Option<Instant>,
}

impl PoolTesterEngine {
    /// Load the pool file and create the engine.
    pub fn new(
        task: Task,
        provider: Box<dyn PolicyProvider>,
        oracle: Box<dyn Oracle>,
        pool_path: impl AsRef<std::path::Path>,
        settings: PoolTesterSettings,
    ) -> Result<Self> {
        if !task.axioms.is_empty() {
            return Err(Error::Unsupported(
                "tasks with axioms are not supported".into(),
            ));
        }
        let novelty = NoveltyStore::new(settings.novelty_statistics_arity, &task);
        let mut env = TestingEnvironment::new(task);
        if let Some(limit) = settings.memory_limit_kb {
            env.limits.set_memory_limit_kb(limit);
        }
        let pool = crate::pool::load_pool_file(&mut env.registry, pool_path)?;
        if let Some(first) = pool.first() {
            // the first pool entry is the initial state of the recording run
            if env.registry.lookup(first.state) != env.task.initial_state.as_slice() {
                return Err(Error::InputFormat(
                    "the pool file does not match the task".into(),
                ));
            }
        }
        let mut policy = Policy::new(provider, settings.policy_steps_limit);
        if settings.read_policy_cache {
            let cache_file = settings.policy_cache_file.as_ref().ok_or_else(|| {
                Error::Configuration(
                    "a policy cache file is required to read from the policy cache".into(),
                )
            })?;
            policy.read_running_policy_cache(&mut env, cache_file)?;
        }
        if let Some(bugs_file) = &settings.bugs_file {
            env.bugs.set_writer(BugFileWriter::create(&env.task, bugs_file)?);
        }
        let end_step = settings
            .start_from
            .saturating_add(settings.max_steps)
            .min(pool.len());
        Ok(PoolTesterEngine {
            env,
            policy,
            oracle,
            step: settings.start_from,
            end_step,
            settings,
            pool,
            novelty,
            num_tests: 0,
            num_solved: 0,
            start_time: Instant::now(),
            deadline: None,
        })
    }

    /// Test the pool entries until the budgets are exhausted, then print the statistics.
    pub fn run(&mut self) -> Result<()> {
        self.start_time = Instant::now();
        self.deadline = self
            .settings
            .overall_time_limit
            .map(|limit| self.start_time + limit);
        loop {
            match self.step()? {
                StepOutcome::InProgress => {}
                StepOutcome::Finished => break,
            }
        }
        self.print_statistics();
        Ok(())
    }

    fn step(&mut self) -> Result<StepOutcome> {
        if self.step >= self.end_step {
            println!("Computing bug regions...");
            let mut bug_states: Vec<StateId> = self.env.bugs.bug_states().collect();
            bug_states.sort_unstable();
            let regions = compute_state_regions(&mut self.env, &bug_states);
            println!("Number of bug regions: {}", regions.len());
            return Ok(StepOutcome::Finished);
        }

        self.env
            .limits
            .reserve_extra_memory_padding(self.settings.memory_padding_mb);
        match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                self.env.limits.set_max_time(remaining);
            }
            None => self.env.limits.clear_max_time(),
        }

        let entry = self.pool[self.step];
        self.step += 1;
        self.novelty.insert(self.env.registry.lookup(entry.state));

        self.num_tests += 1;
        println!(
            "Starting test {:>5} [t={:.2}s]",
            self.num_tests,
            self.start_time.elapsed().as_secs_f64()
        );
        let outcome = test_pool_entry(
            &mut self.env,
            &mut self.policy,
            Some(self.oracle.as_mut()),
            &entry,
            self.start_time,
            self.settings.verbose,
        );
        self.env.limits.release_extra_memory_padding();
        match outcome {
            Ok(solved) => {
                if solved {
                    self.num_solved += 1;
                }
                Ok(StepOutcome::InProgress)
            }
            Err(Error::OutOfResource) => {
                println!(
                    "out of time! [t={:.2}s]",
                    self.start_time.elapsed().as_secs_f64()
                );
                Ok(StepOutcome::Finished)
            }
            Err(e) => Err(e),
        }
    }

    /// Print the final statistics block.
    pub fn print_statistics(&self) {
        println!("Pool size: {}", self.pool.len());
        let mut pool_bugs = 0;
        let mut qualitative_pool_bugs = 0;
        for entry in &self.pool {
            if self.env.bugs.is_known_bug(entry.state) {
                pool_bugs += 1;
                if self.env.bugs.stored_result(entry.state).bug_value == UNSOLVED_BUG_VALUE {
                    qualitative_pool_bugs += 1;
                }
            }
        }
        println!(
            "Pool state ids: [{}]",
            self.pool.iter().map(|e| e.state).join(", ")
        );
        println!("Pool bug states: {}", pool_bugs);
        println!("Qualitative pool bug states: {}", qualitative_pool_bugs);
        println!(
            "Non-qualitative pool bug states: {}",
            pool_bugs - qualitative_pool_bugs
        );
        println!("Pool unconfirmed states: {}", self.pool.len() - pool_bugs);
        println!(
            "Non-pool bug states: {}",
            self.env.bugs.num_bugs() - pool_bugs
        );
        println!("Solved pool states: {}", self.num_solved);
        self.novelty.print_statistics();
        println!("Conducted tests: {}", self.num_tests);
        println!("Unclear states: {}", self.env.bugs.num_unclear());
        println!("Bugs found: {}", self.env.bugs.num_bugs());
        println!(
            "Unsolved state bugs: {}",
            self.env.bugs.num_unsolved_state_bugs()
        );
        self.oracle.print_statistics();
    }

    /// The shared testing environment.
    pub fn environment(&self) -> &TestingEnvironment {
        &self.env
    }

    /// The loaded pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}
