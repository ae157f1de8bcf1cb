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

//! # Bug store
//!
//! The [`BugRegistry`] keeps the in-memory map from states to their best known
//! [`TestResult`] and the set of states that were tested without finding a bug. Stored
//! entries are only ever upgraded: the bug value never regresses and the upper cost bound
//! only narrows. If a bug file is attached, every event is appended to the write-once log
//! (see [`BugFileWriter`] for the format).

use crate::fdr::{Task, Val};
use crate::oracle::{best_of, BugValue, TestResult, UNSOLVED_BUG_VALUE};
use crate::policy::{Policy, PolicyCost};
use crate::state::{StateId, StateRegistry};
use crate::{Error, Result};

use itertools::Itertools;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Append-only log of bug events.
///
/// The file starts with a `sas_variables` header listing the task variables and their
/// domains, followed by a `bugs` marker. After the header, each event is a short record
/// keyed by the state id: `<id>\nstate\n<values>` when a state is first reported,
/// `<id>\nresult\n<bug_value>\n<upper_bound>` for each (improved) result, and `<id>\npool`
/// when the state is (also) a pool state.
#[derive(Debug)]
pub struct BugFileWriter {
    out: BufWriter<File>,
}

impl BugFileWriter {
    /// Create the log file and write the task header.
    pub fn create(task: &Task, path: impl AsRef<Path>) -> Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        write_task_header(&mut out, task)?;
        writeln!(out, "bugs")?;
        out.flush()?;
        Ok(BugFileWriter { out })
    }

    fn write_state(&mut self, state: StateId, values: &[Val]) -> Result<()> {
        writeln!(self.out, "{}", state.value())?;
        writeln!(self.out, "state")?;
        let mut line = String::new();
        for val in values {
            line.push_str(&val.to_string());
            line.push(' ');
        }
        writeln!(self.out, "{}", line.trim_end())?;
        self.out.flush()?;
        Ok(())
    }

    fn write_result(&mut self, state: StateId, result: TestResult) -> Result<()> {
        let bug_value = if result.bug_value < UNSOLVED_BUG_VALUE {
            result.bug_value as i64
        } else {
            -1
        };
        writeln!(self.out, "{}", state.value())?;
        writeln!(self.out, "result")?;
        writeln!(self.out, "{}", bug_value)?;
        writeln!(self.out, "{}", result.upper_cost_bound.to_file_repr())?;
        self.out.flush()?;
        Ok(())
    }

    /// Mark the state as a pool state.
    pub fn write_pool_marker(&mut self, state: StateId) -> Result<()> {
        writeln!(self.out, "{}", state.value())?;
        writeln!(self.out, "pool")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Write the `sas_variables` header shared by the pool and bug file formats.
pub(crate) fn write_task_header(out: &mut impl Write, task: &Task) -> Result<()> {
    writeln!(out, "sas_variables")?;
    writeln!(out, "{}", task.num_variables())?;
    for var in 0..task.num_variables() {
        let mut line = task.domain_size(var).to_string();
        for val in 0..task.domain_size(var) {
            line.push(';');
            line.push_str(task.fact_name(var, val as Val));
        }
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

/// Skip the `sas_variables` header and check the expected section marker.
pub(crate) fn read_task_header(
    lines: &mut impl Iterator<Item = std::io::Result<String>>,
    marker: &str,
) -> Result<()> {
    let mut next = || -> Result<String> {
        lines
            .next()
            .ok_or_else(|| Error::InputFormat("unexpected end of file in header".into()))?
            .map_err(Error::from)
    };
    let head = next()?;
    if head.trim() != "sas_variables" {
        return Err(Error::InputFormat(format!(
            "expected `sas_variables` header, found `{}`",
            head
        )));
    }
    let num_vars: usize = next()?
        .trim()
        .parse()
        .map_err(|_| Error::InputFormat("bad variable count in header".into()))?;
    for _ in 0..num_vars {
        next()?;
    }
    let section = next()?;
    if section.trim() != marker {
        return Err(Error::InputFormat(format!(
            "expected `{}` marker, found `{}`",
            marker, section
        )));
    }
    Ok(())
}

/// In-memory bug store with counters and an optional append-only log.
#[derive(Debug, Default)]
pub struct BugRegistry {
    bugs: HashMap<StateId, TestResult>,
    non_bugs: HashSet<StateId>,
    num_unsolved_state_bugs: usize,
    writer: Option<BugFileWriter>,
}

impl BugRegistry {
    /// Create an empty registry without a log file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an append-only log file.
    pub fn set_writer(&mut self, writer: BugFileWriter) {
        self.writer = Some(writer);
    }

    /// Whether a bug file is attached.
    pub fn has_writer(&self) -> bool {
        self.writer.is_some()
    }

    /// Append a pool marker for the state to the log.
    pub fn write_pool_marker(&mut self, state: StateId) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.write_pool_marker(state)?;
        }
        Ok(())
    }

    /// Check whether the state is a known bug.
    pub fn is_known_bug(&self, state: StateId) -> bool {
        self.bugs.contains_key(&state)
    }

    /// The stored result for the state, or the neutral result if none is stored.
    pub fn stored_result(&self, state: StateId) -> TestResult {
        self.bugs.get(&state).copied().unwrap_or_default()
    }

    /// Remember that the state was tested without finding a bug.
    pub fn mark_unclear(&mut self, state: StateId) {
        if !self.bugs.contains_key(&state) {
            self.non_bugs.insert(state);
        }
    }

    /// Number of states found to be bugs.
    pub fn num_bugs(&self) -> usize {
        self.bugs.len()
    }

    /// Number of tested states without a bug verdict.
    pub fn num_unclear(&self) -> usize {
        self.non_bugs.len()
    }

    /// Number of qualitative (unsolved-state) bugs.
    pub fn num_unsolved_state_bugs(&self) -> usize {
        self.num_unsolved_state_bugs
    }

    /// Iterate over all bug states.
    pub fn bug_states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.bugs.keys().copied()
    }

    /// Iterate over all stored bug entries.
    pub fn entries(&self) -> impl Iterator<Item = (StateId, TestResult)> + '_ {
        self.bugs.iter().map(|(&s, &r)| (s, r))
    }

    /// Record a bug found for a state, upgrading any stored entry monotonically: the result
    /// stored afterwards is the [`best_of`] the old and the new one. Results without a
    /// positive bug value are ignored. Returns true iff the stored entry changed.
    pub fn add_additional_bug(
        &mut self,
        registry: &StateRegistry,
        policy: &Policy,
        state: StateId,
        result: TestResult,
    ) -> bool {
        if result.bug_value <= 0 {
            return false;
        }
        let stored = self.bugs.get(&state).copied();
        let merged = match stored {
            None => result,
            Some(old) => best_of(old, result),
        };
        if stored == Some(merged) {
            // neither a better bug value nor a tighter bound
            return false;
        }
        let is_new = stored.is_none();
        let value_improved = match stored {
            None => true,
            Some(old) => merged.bug_value > old.bug_value,
        };
        self.bugs.insert(state, merged);
        self.non_bugs.remove(&state);

        if value_improved {
            if merged.bug_value == UNSOLVED_BUG_VALUE {
                self.num_unsolved_state_bugs += 1;
                println!("Result for StateID={}: qualitative bug found", state);
            } else if policy.cached_cost(state).as_finite().is_some() {
                println!(
                    "Result for StateID={}: quantitative bug found with value={}",
                    state, merged.bug_value
                );
            } else {
                println!(
                    "Result for StateID={}: unclassified bug found with value={}",
                    state, merged.bug_value
                );
            }
        }
        if is_new {
            self.print_new_bug_info(state, registry.lookup(state));
        }
        if let Some(writer) = &mut self.writer {
            if let Err(e) = writer.write_result(state, merged) {
                panic!("cannot append to bug file: {}", e);
            }
        }
        true
    }

    fn print_new_bug_info(&mut self, state: StateId, values: &[Val]) {
        println!(
            "New Bug: StateID={}, Values=[{}]",
            state,
            values.iter().join(", ")
        );
        if let Some(writer) = &mut self.writer {
            if let Err(e) = writer.write_state(state, values) {
                panic!("cannot append to bug file: {}", e);
            }
        }
    }
}

/// A single entry read back from a bug file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedBug {
    /// The re-interned state
    pub state: StateId,
    /// The final stored result for the state
    pub result: TestResult,
    /// Whether the state was also a pool state
    pub in_pool: bool,
}

/// Load a bug file written by [`BugFileWriter`], re-interning all states.
///
/// Result records are merged with [`best_of`], mirroring the in-memory upgrade rule.
pub fn load_bug_file(
    registry: &mut StateRegistry,
    path: impl AsRef<Path>,
) -> Result<Vec<LoadedBug>> {
    let mut lines = BufReader::new(File::open(path)?).lines();
    read_task_header(&mut lines, "bugs")?;

    let mut order: Vec<u32> = Vec::new();
    let mut loaded: HashMap<u32, LoadedBug> = HashMap::new();
    let mut pending_results: HashMap<u32, TestResult> = HashMap::new();
    let mut pending_pool: HashSet<u32> = HashSet::new();

    let mut next = move || -> Result<Option<String>> {
        match lines.next() {
            Some(line) => Ok(Some(line?)),
            None => Ok(None),
        }
    };

    while let Some(id_line) = next()? {
        if id_line.trim().is_empty() {
            continue;
        }
        let file_id: u32 = id_line
            .trim()
            .parse()
            .map_err(|_| Error::InputFormat(format!("bad state id line `{}`", id_line)))?;
        let kind = next()?
            .ok_or_else(|| Error::InputFormat("truncated bug record".into()))?;
        match kind.trim() {
            "state" => {
                let values_line = next()?
                    .ok_or_else(|| Error::InputFormat("missing state values".into()))?;
                let values: Vec<Val> = values_line
                    .split_whitespace()
                    .map(|tok| {
                        tok.parse().map_err(|_| {
                            Error::InputFormat(format!("bad state value `{}`", tok))
                        })
                    })
                    .collect::<Result<_>>()?;
                let state = registry.intern(values);
                order.push(file_id);
                let entry = LoadedBug {
                    state,
                    result: pending_results.remove(&file_id).unwrap_or_default(),
                    in_pool: pending_pool.remove(&file_id),
                };
                loaded.insert(file_id, entry);
            }
            "result" => {
                let bug_line = next()?
                    .ok_or_else(|| Error::InputFormat("missing bug value".into()))?;
                let bound_line = next()?
                    .ok_or_else(|| Error::InputFormat("missing upper bound".into()))?;
                let raw_value: i64 = bug_line.trim().parse().map_err(|_| {
                    Error::InputFormat(format!("bad bug value `{}`", bug_line))
                })?;
                let bug_value: BugValue = if raw_value < 0 {
                    UNSOLVED_BUG_VALUE
                } else {
                    raw_value as BugValue
                };
                let bound_repr: i64 = bound_line.trim().parse().map_err(|_| {
                    Error::InputFormat(format!("bad upper bound `{}`", bound_line))
                })?;
                let result = TestResult::new(bug_value, PolicyCost::from_file_repr(bound_repr));
                if let Some(entry) = loaded.get_mut(&file_id) {
                    entry.result = best_of(entry.result, result);
                } else {
                    let merged = match pending_results.get(&file_id) {
                        Some(&old) => best_of(old, result),
                        None => result,
                    };
                    pending_results.insert(file_id, merged);
                }
            }
            "pool" => {
                if let Some(entry) = loaded.get_mut(&file_id) {
                    entry.in_pool = true;
                } else {
                    pending_pool.insert(file_id);
                }
            }
            other => {
                return Err(Error::InputFormat(format!(
                    "unknown bug record kind `{}`",
                    other
                )));
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|id| loaded.remove(&id))
        .collect())
}
