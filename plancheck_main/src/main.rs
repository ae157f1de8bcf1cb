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

//! Command line frontend of the plancheck test engine.

use plancheck::bias::{FuzzingBias, NeutralBias, PlanLengthBias, PolicyHeuristicBias};
use plancheck::dominance::NumericDominance;
use plancheck::engine::{FuzzerSettings, PoolFuzzerEngine, PoolTesterEngine, PoolTesterSettings};
use plancheck::eval::{BlindEvaluator, Evaluator, GoalCountEvaluator};
use plancheck::exit_code;
use plancheck::fdr::{parse_task, parse_task_file, Task};
use plancheck::filter::{AcceptAllFilter, NoveltyPoolFilter, PoolFilter};
use plancheck::novelty::NoveltyStore;
use plancheck::oracle::composite::CompositeOracle;
use plancheck::oracle::external::{BoundedLookaheadOracle, BoundedLookaheadSettings};
use plancheck::oracle::iterative_improvement::{
    IterativeImprovementOracle, IterativeImprovementSettings, LookaheadComp,
};
use plancheck::oracle::unrelaxation::{UnrelaxationOracle, UnrelaxationSettings};
use plancheck::oracle::{LocalBugTest, Oracle, OracleSettings};
use plancheck::policies::{CachedPolicy, HeuristicDescendPolicy};
use plancheck::policy::PolicyProvider;
use plancheck::Error;

use clap::{Parser, ValueEnum};
use log::*;

use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum OracleChoice {
    /// The comparison based metamorphic oracle
    Iterative,
    /// The single-fact unrelaxation oracle
    Unrelaxation,
    /// Iterative improvement combined with a bounded lookahead oracle
    Composite,
    /// Depth-bounded exhaustive lookahead only
    BoundedLookahead,
    /// Do not test at all (pool generation only)
    None,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum EngineChoice {
    /// Grow a pool of candidates with biased random walks
    PoolFuzzer,
    /// Replay a recorded pool file and test every entry
    PoolTester,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum PolicyChoice {
    /// Greedy descent in the chosen heuristic
    Descend,
    /// Replay a previously recorded policy cache
    Cached,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum HeuristicChoice {
    /// Number of unsatisfied goal facts
    GoalCount,
    /// 0 on goals, 1 elsewhere
    Blind,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum BiasChoice {
    /// Uniform weights
    Neutral,
    /// Weight by the policy cost within the horizon
    PlanLength,
    /// Weight by the gap between policy path cost and heuristic
    PolicyHeuristic,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum FilterChoice {
    /// Admit every state
    None,
    /// Admit only novel states
    Novelty,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum LocalBugTestChoice {
    None,
    One,
    All,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum LookaheadCompChoice {
    /// Order lookahead by h (resembles GBFS)
    H,
    /// Order lookahead by g+h (resembles A*)
    GPlusH,
}

/// Pool based fuzzing of action policies for classical planning tasks.
#[derive(Parser, Debug)]
#[command(name = "plancheck", version)]
struct Args {
    /// The planning task in FDR format; read from stdin if omitted
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// URL of a remote policy server to test
    #[arg(long)]
    remote_policy: Option<String>,

    /// The test engine to run
    #[arg(long, value_enum, default_value = "pool-fuzzer")]
    engine: EngineChoice,

    /// Index of the first pool entry to test (pool-tester engine)
    #[arg(long, default_value_t = 0)]
    start_from: usize,

    /// The policy under test
    #[arg(long, value_enum, default_value = "descend")]
    policy: PolicyChoice,

    /// The heuristic used by the descend policy and the heuristic bias
    #[arg(long, value_enum, default_value = "goal-count")]
    heuristic: HeuristicChoice,

    /// Surrender whenever no successor strictly improves the heuristic
    #[arg(long)]
    strictly_descend: bool,

    /// The testing oracle
    #[arg(long, value_enum, default_value = "iterative")]
    oracle: OracleChoice,

    /// Maximal number of stored states to compare a candidate to
    #[arg(long, default_value_t = 1_000_000)]
    max_state_comparisons: usize,

    /// Disable the lookahead search of the iterative improvement oracle
    #[arg(long)]
    no_lookahead: bool,

    /// Maximal number of states visited per lookahead search
    #[arg(long, default_value_t = 100)]
    max_lookahead_state_visits: usize,

    /// Maximal number of comparisons per state inside lookahead search
    #[arg(long, default_value_t = 1_000_000)]
    max_lookahead_state_comparisons: usize,

    /// Priority used by the lookahead search
    #[arg(long, value_enum, default_value = "h")]
    lookahead_comp: LookaheadCompChoice,

    /// The local bug criterion mode
    #[arg(long, value_enum, default_value = "all")]
    local_bug_test: LocalBugTestChoice,

    /// Run the oracle on the intermediate states of the policy run as well
    #[arg(long)]
    consider_intermediate_states: bool,

    /// Assume a unit cost, invertible domain and use the walk length as a cost bound
    #[arg(long)]
    domain_unit_cost_and_invertible: bool,

    /// Number of unrelaxations evaluated per candidate
    #[arg(long, default_value_t = 4)]
    operations_per_state: usize,

    /// Depth of the bounded lookahead oracle
    #[arg(long, default_value_t = 2)]
    lookahead_depth: usize,

    /// The simulation file holding the numeric dominance relation
    #[arg(long)]
    simulation_file: Option<PathBuf>,

    /// Read the dominance relation from the simulation file instead of using the identity
    #[arg(long)]
    read_simulation: bool,

    /// Write the dominance relation to the simulation file and exit
    #[arg(long)]
    write_sim_and_exit: bool,

    /// Write the relation to disk, read it back and verify that it coincides
    #[arg(long)]
    test_serialization: bool,

    /// The fuzzing bias
    #[arg(long, value_enum, default_value = "neutral")]
    bias: BiasChoice,

    /// Number of policy steps a policy based bias may take per state
    #[arg(long, default_value_t = 50)]
    bias_horizon: u32,

    /// The pool admission filter
    #[arg(long, value_enum, default_value = "none")]
    filter: FilterChoice,

    /// Arity of the novelty filter and the novelty statistics
    #[arg(long, default_value_t = 2)]
    novelty: usize,

    /// Seed of all pseudo random choices
    #[arg(long, default_value_t = 1734)]
    seed: u64,

    /// Maximal number of fuzzing steps
    #[arg(long)]
    max_steps: Option<usize>,

    /// Maximal pool size
    #[arg(long)]
    max_pool_size: Option<usize>,

    /// Maximal length of a single random walk
    #[arg(long, default_value_t = 5)]
    max_walk_length: usize,

    /// Budget for bias computation per state expansion; 0 means no limit
    #[arg(long, default_value_t = 200)]
    bias_budget: u32,

    /// Cache the bias value of each state
    #[arg(long)]
    cache_bias: bool,

    /// Use an infinite bias for states the policy is known to fail on
    #[arg(long)]
    penalize_policy_fails: bool,

    /// Step limit for policy executions; 0 means no limit
    #[arg(long, default_value_t = 0)]
    steps_limit: u32,

    /// Overall time budget in seconds
    #[arg(long)]
    time_limit: Option<u64>,

    /// Bound on the peak resident set size in megabytes
    #[arg(long)]
    memory_limit: Option<u64>,

    /// Persist the pool to this file
    #[arg(long)]
    pool_file: Option<PathBuf>,

    /// Persist the found bugs to this file
    #[arg(long)]
    bugs_file: Option<PathBuf>,

    /// Policy cache file to read from or write to
    #[arg(long)]
    policy_cache_file: Option<PathBuf>,

    /// Fill the policy cache from the cache file before the run
    #[arg(long)]
    read_policy_cache: bool,

    /// Skip all testing and only record the policy cache
    #[arg(long)]
    just_write_policy_cache: bool,

    /// Print verbose progress information
    #[arg(long)]
    verbose: bool,
}

fn main() {
    pretty_env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn make_heuristic(choice: HeuristicChoice) -> Box<dyn Evaluator> {
    match choice {
        HeuristicChoice::GoalCount => Box::new(GoalCountEvaluator),
        HeuristicChoice::Blind => Box::new(BlindEvaluator),
    }
}

fn make_relation(args: &Args, task: &Task) -> Result<NumericDominance, Error> {
    if args.read_simulation {
        let path = args.simulation_file.as_ref().ok_or_else(|| {
            Error::Configuration(
                "a simulation file is required to read a simulation from disk".into(),
            )
        })?;
        println!("Reading simulation file.");
        let relation = NumericDominance::read_file(path)?;
        if !relation.matches_task(task) {
            return Err(Error::InputFormat(
                "the simulation file does not match the task".into(),
            ));
        }
        println!(
            "Computed numeric dominance function in {:.2}s (time stored in simulation file)",
            relation.computation_time()
        );
        Ok(relation)
    } else {
        Ok(NumericDominance::identity(task))
    }
}

fn make_oracle(
    args: &Args,
    relation: NumericDominance,
) -> Result<Option<Box<dyn Oracle>>, Error> {
    let oracle_settings = OracleSettings {
        report_parent_bugs: false,
        consider_intermediate_states: args.consider_intermediate_states,
        enforce_intermediate: false,
    };
    let ii_settings = IterativeImprovementSettings {
        oracle: oracle_settings,
        local_bug_test: match args.local_bug_test {
            LocalBugTestChoice::None => LocalBugTest::None,
            LocalBugTestChoice::One => LocalBugTest::One,
            LocalBugTestChoice::All => LocalBugTest::All,
        },
        max_state_comparisons: args.max_state_comparisons,
        conduct_lookahead_search: !args.no_lookahead,
        update_parents: true,
        max_lookahead_state_comparisons: args.max_lookahead_state_comparisons,
        deferred_evaluation: false,
        lookahead_comp: match args.lookahead_comp {
            LookaheadCompChoice::H => LookaheadComp::H,
            LookaheadCompChoice::GPlusH => LookaheadComp::GPlusH,
        },
        max_lookahead_state_visits: args.max_lookahead_state_visits,
        domain_unit_cost_and_invertible: args.domain_unit_cost_and_invertible,
    };
    match args.oracle {
        OracleChoice::None => Ok(None),
        OracleChoice::Iterative => {
            let heuristic = make_heuristic(args.heuristic);
            let oracle =
                IterativeImprovementOracle::new(relation, ii_settings, Some(heuristic))?;
            Ok(Some(Box::new(oracle)))
        }
        OracleChoice::Unrelaxation => {
            let settings = UnrelaxationSettings {
                oracle: oracle_settings,
                local_bug_test: ii_settings.local_bug_test,
                operations_per_state: args.operations_per_state,
                max_evaluation_steps: None,
                seed: args.seed,
            };
            Ok(Some(Box::new(UnrelaxationOracle::new(
                relation, settings, None,
            ))))
        }
        OracleChoice::BoundedLookahead => {
            let settings = BoundedLookaheadSettings {
                oracle: oracle_settings,
                depth: args.lookahead_depth,
                max_evaluation_steps: None,
                cache_results: true,
            };
            Ok(Some(Box::new(BoundedLookaheadOracle::new(settings, None))))
        }
        OracleChoice::Composite => {
            let metamorphic = IterativeImprovementOracle::new(
                relation,
                ii_settings,
                Some(make_heuristic(args.heuristic)),
            )?;
            let external = BoundedLookaheadOracle::new(
                BoundedLookaheadSettings {
                    oracle: OracleSettings::default(),
                    depth: args.lookahead_depth,
                    max_evaluation_steps: None,
                    cache_results: true,
                },
                None,
            );
            let composite = CompositeOracle::new(
                OracleSettings::default(),
                None,
                Some(Box::new(external)),
                Some(metamorphic),
                false,
            )?;
            Ok(Some(Box::new(composite)))
        }
    }
}

fn run(args: Args) -> Result<i32, Error> {
    if let Some(url) = &args.remote_policy {
        return Err(Error::PolicyTransport(format!(
            "cannot connect to remote policy at {}: no remote policy provider is available \
             in this build",
            url
        )));
    }

    let task = match &args.input_file {
        Some(path) => parse_task_file(path)?,
        None => {
            info!("Reading task from stdin");
            let stdin = std::io::stdin();
            let locked = stdin.lock();
            parse_task(locked)?
        }
    };
    info!(
        "Task has {} variables and {} operators",
        task.num_variables(),
        task.num_operators()
    );

    if args.write_sim_and_exit || args.test_serialization {
        let path = args.simulation_file.as_ref().ok_or_else(|| {
            Error::Configuration(
                "a simulation file is required to write a simulation to disk".into(),
            )
        })?;
        let relation = make_relation(&args, &task)?;
        if args.write_sim_and_exit {
            println!("Writing compressed simulation file.");
            relation.write_file(path)?;
            println!("Wrote compressed simulation file.");
            return Ok(exit_code::UNSOLVED_INCOMPLETE);
        }
        println!("Writing simulation file.");
        relation.write_file(path)?;
        println!("Reading simulation file.");
        let restored = NumericDominance::read_file(path)?;
        return if restored == relation {
            println!("Serialization successful");
            Ok(exit_code::UNSOLVED_INCOMPLETE)
        } else {
            eprintln!("Serialization failed!");
            Ok(exit_code::CRITICAL_ERROR)
        };
    }

    let relation = make_relation(&args, &task)?;
    let oracle = make_oracle(&args, relation)?;

    let provider: Box<dyn PolicyProvider> = match args.policy {
        PolicyChoice::Descend => Box::new(HeuristicDescendPolicy::new(
            make_heuristic(args.heuristic),
            args.strictly_descend,
            true,
        )),
        PolicyChoice::Cached => Box::new(CachedPolicy),
    };

    match args.engine {
        EngineChoice::PoolFuzzer => {
            let bias: Box<dyn FuzzingBias> = match args.bias {
                BiasChoice::Neutral => Box::new(NeutralBias),
                BiasChoice::PlanLength => Box::new(PlanLengthBias::new(args.bias_horizon)),
                BiasChoice::PolicyHeuristic => Box::new(PolicyHeuristicBias::new(
                    make_heuristic(args.heuristic),
                    args.bias_horizon,
                )),
            };
            let filter: Box<dyn PoolFilter> = match args.filter {
                FilterChoice::None => Box::new(AcceptAllFilter),
                FilterChoice::Novelty => Box::new(NoveltyPoolFilter::new(NoveltyStore::new(
                    args.novelty,
                    &task,
                ))),
            };
            let settings = FuzzerSettings {
                seed: args.seed,
                max_steps: args.max_steps.unwrap_or(std::usize::MAX),
                max_pool_size: args.max_pool_size.unwrap_or(std::usize::MAX),
                max_walk_length: args.max_walk_length,
                bias_budget: args.bias_budget,
                cache_bias: args.cache_bias,
                penalize_policy_fails: args.penalize_policy_fails,
                novelty_statistics_arity: args.novelty,
                policy_steps_limit: args.steps_limit,
                overall_time_limit: args.time_limit.map(Duration::from_secs),
                memory_limit_kb: args.memory_limit.map(|mb| mb * 1024),
                memory_padding_mb: 50,
                pool_file: args.pool_file.clone(),
                bugs_file: args.bugs_file.clone(),
                policy_cache_file: args.policy_cache_file.clone(),
                read_policy_cache: args.read_policy_cache,
                just_write_policy_cache: args.just_write_policy_cache,
                verbose: args.verbose,
            };
            let mut engine =
                PoolFuzzerEngine::new(task, provider, oracle, bias, filter, None, settings)?;
            engine.run()?;
        }
        EngineChoice::PoolTester => {
            let pool_file = args.pool_file.clone().ok_or_else(|| {
                Error::Configuration(
                    "the pool-tester engine needs a pool file to replay".into(),
                )
            })?;
            let oracle = oracle.ok_or_else(|| {
                Error::Configuration("the pool-tester engine needs a testing oracle".into())
            })?;
            let settings = PoolTesterSettings {
                start_from: args.start_from,
                max_steps: args.max_steps.unwrap_or(std::usize::MAX),
                novelty_statistics_arity: args.novelty,
                policy_steps_limit: args.steps_limit,
                overall_time_limit: args.time_limit.map(Duration::from_secs),
                memory_limit_kb: args.memory_limit.map(|mb| mb * 1024),
                memory_padding_mb: 50,
                bugs_file: args.bugs_file.clone(),
                policy_cache_file: args.policy_cache_file.clone(),
                read_policy_cache: args.read_policy_cache,
                verbose: args.verbose,
            };
            let mut engine = PoolTesterEngine::new(task, provider, oracle, pool_file, settings)?;
            engine.run()?;
        }
    }
    Ok(exit_code::SUCCESS)
}
