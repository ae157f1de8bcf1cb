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

//! The pool of test candidate states.
//!
//! Pool entries are append only and carry a back reference to the entry they were generated
//! from, forming a forest rooted at the initial state. The pool can be persisted to and
//! loaded from a pool file: the `sas_variables` header, a `pool` marker, and one
//! `<ref_index>;<steps>;<state_id>;<val0>;<val1>;...` line per entry.

use crate::bugs::{read_task_header, write_task_header};
use crate::fdr::{Task, Val};
use crate::state::{StateId, StateRegistry};
use crate::{Error, Result};

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A single test candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolEntry {
    /// Index of the pool entry this one was generated from, if any
    pub ref_index: Option<usize>,
    /// The state of the back-referenced entry ([`StateId::NONE`] for the root)
    pub ref_state: StateId,
    /// Number of fuzzing operations applied to the back-referenced state
    pub steps: u32,
    /// The actual pool state of this entry
    pub state: StateId,
}

/// The ordered collection of test candidates.
pub type Pool = Vec<PoolEntry>;

/// Streaming writer for the pool file format.
#[derive(Debug)]
pub struct PoolFileWriter {
    out: BufWriter<File>,
}

impl PoolFileWriter {
    /// Create the pool file and write the task header.
    pub fn create(task: &Task, path: impl AsRef<Path>) -> Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        write_task_header(&mut out, task)?;
        writeln!(out, "pool")?;
        out.flush()?;
        Ok(PoolFileWriter { out })
    }

    /// Append one entry.
    pub fn write(&mut self, registry: &StateRegistry, entry: &PoolEntry) -> Result<()> {
        let ref_index = entry.ref_index.map(|i| i as i64).unwrap_or(-1);
        let mut line = format!("{};{};{}", ref_index, entry.steps, entry.state.value());
        for val in registry.lookup(entry.state) {
            line.push(';');
            line.push_str(&val.to_string());
        }
        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Load a pool file, re-interning all states.
pub fn load_pool_file(registry: &mut StateRegistry, path: impl AsRef<Path>) -> Result<Pool> {
    let mut lines = BufReader::new(File::open(path)?).lines();
    read_task_header(&mut lines, "pool")?;

    let mut pool = Pool::new();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() < 4 {
            return Err(Error::InputFormat(format!("bad pool line `{}`", line)));
        }
        let ref_index: i64 = fields[0]
            .parse()
            .map_err(|_| Error::InputFormat(format!("bad pool reference `{}`", fields[0])))?;
        let steps: u32 = fields[1]
            .parse()
            .map_err(|_| Error::InputFormat(format!("bad pool step count `{}`", fields[1])))?;
        // fields[2] is the state id of the writing run and is not meaningful here
        let values: Vec<Val> = fields[3..]
            .iter()
            .map(|tok| {
                tok.parse()
                    .map_err(|_| Error::InputFormat(format!("bad state value `{}`", tok)))
            })
            .collect::<Result<_>>()?;
        let state = registry.intern(values);
        let (ref_index, ref_state) = if ref_index < 0 {
            (None, StateId::NONE)
        } else {
            let index = ref_index as usize;
            if index >= pool.len() {
                return Err(Error::InputFormat(format!(
                    "pool reference {} points beyond the current pool",
                    index
                )));
            }
            (Some(index), pool[index].state)
        };
        pool.push(PoolEntry {
            ref_index,
            ref_state,
            steps,
            state,
        });
    }
    Ok(pool)
}
