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

//! # Numeric dominance relation
//!
//! A precomputed function `D(s, t) ∈ ℤ ∪ {-∞}` with the guarantee
//! `D(s, t) <= h*(s) - h*(t)`: if finite, the *dominating* state `t` can substitute for the
//! *dominated* state `s` with a cost saving of at least `D(s, t)`. In particular,
//! `h*(t) <= b - D(s, t)` for every upper bound `b` on `h*(s)`, which is the inference the
//! comparison based oracles are built on. The dominated state is the first argument of
//! every function in this module; this convention is applied consistently everywhere in
//! this crate.
//!
//! The relation is factored per variable: `D(s, t)` is the sum of one table entry per
//! variable, where any `-∞` contribution makes the whole value `-∞`. How the tables are
//! computed (label-dominance simulation on abstractions) is outside of this crate; relations
//! are either loaded from a simulation file or supplied as tables.

use crate::fdr::{Task, Val};
use crate::state::{StateId, StateRegistry};
use crate::{Error, Result};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// The dominance value denoting "does not dominate".
pub const MINUS_INFINITY: i32 = std::i32::MIN;

const SIM_FILE_MAGIC: &[u8; 8] = b"NUMDOM01";

/// A factored numeric dominance relation. See the module documentation.
#[derive(Clone, Debug, PartialEq)]
pub struct NumericDominance {
    /// `tables[var][s_val][t_val]` is the contribution of `var` to `D(s, t)`
    tables: Vec<Vec<Vec<i32>>>,
    /// Lower bound on all finite values of the relation
    minimal_finite: i32,
    /// Seconds spent computing the relation, carried through serialization
    computation_time: f64,
}

impl NumericDominance {
    /// The identity relation: `D(s, t) = 0` if `s = t` and `-∞` otherwise.
    ///
    /// This is the weakest valid relation; it turns every comparison based oracle into a
    /// pure duplicate detector.
    pub fn identity(task: &Task) -> Self {
        let tables = (0..task.num_variables())
            .map(|var| {
                let size = task.domain_size(var);
                (0..size)
                    .map(|a| {
                        (0..size)
                            .map(|b| if a == b { 0 } else { MINUS_INFINITY })
                            .collect()
                    })
                    .collect()
            })
            .collect();
        Self::from_tables_unchecked(tables, 0.0)
    }

    /// Build a relation from per-variable tables. `tables[var][s_val][t_val]` must be a
    /// square matrix matching the domain size of `var`.
    pub fn from_atomic_tables(task: &Task, tables: Vec<Vec<Vec<i32>>>) -> Result<Self> {
        if tables.len() != task.num_variables() {
            return Err(Error::InputFormat(format!(
                "dominance relation has {} factors, task has {} variables",
                tables.len(),
                task.num_variables()
            )));
        }
        for (var, table) in tables.iter().enumerate() {
            let size = task.domain_size(var);
            if table.len() != size || table.iter().any(|row| row.len() != size) {
                return Err(Error::InputFormat(format!(
                    "dominance table of variable {} does not match its domain size {}",
                    var, size
                )));
            }
        }
        Ok(Self::from_tables_unchecked(tables, 0.0))
    }

    fn from_tables_unchecked(tables: Vec<Vec<Vec<i32>>>, computation_time: f64) -> Self {
        let minimal_finite = tables
            .iter()
            .map(|table| {
                table
                    .iter()
                    .flatten()
                    .copied()
                    .filter(|&v| v != MINUS_INFINITY)
                    .min()
                    .unwrap_or(0)
                    .min(0)
            })
            .sum();
        NumericDominance {
            tables,
            minimal_finite,
            computation_time,
        }
    }

    /// `D(dominated, dominating)` on raw value vectors.
    pub fn value(&self, dominated: &[Val], dominating: &[Val]) -> i32 {
        let mut total: i64 = 0;
        for (var, table) in self.tables.iter().enumerate() {
            let entry = table[dominated[var] as usize][dominating[var] as usize];
            if entry == MINUS_INFINITY {
                return MINUS_INFINITY;
            }
            total += entry as i64;
        }
        total as i32
    }

    /// `D(dominated, dominating)` on interned states.
    pub fn value_ids(
        &self,
        registry: &StateRegistry,
        dominated: StateId,
        dominating: StateId,
    ) -> i32 {
        self.value(registry.lookup(dominated), registry.lookup(dominating))
    }

    /// Lower bound on all finite values of the relation. Used to shift bias weights into the
    /// non-negative range.
    pub fn minimal_finite_dominance_value(&self) -> i32 {
        self.minimal_finite
    }

    /// Seconds spent computing the relation (carried through serialization).
    pub fn computation_time(&self) -> f64 {
        self.computation_time
    }

    /// Record the time spent computing the relation.
    pub fn set_computation_time(&mut self, seconds: f64) {
        self.computation_time = seconds;
    }

    /// Serialize the relation as zlib-compressed binary.
    pub fn write(&self, writer: impl Write) -> Result<()> {
        let mut out = ZlibEncoder::new(writer, Compression::best());
        out.write_all(SIM_FILE_MAGIC)?;
        out.write_f64::<LittleEndian>(self.computation_time)?;
        out.write_i32::<LittleEndian>(self.minimal_finite)?;
        out.write_u32::<LittleEndian>(self.tables.len() as u32)?;
        for table in &self.tables {
            out.write_u32::<LittleEndian>(table.len() as u32)?;
            for row in table {
                for &entry in row {
                    out.write_i32::<LittleEndian>(entry)?;
                }
            }
        }
        out.finish()?;
        Ok(())
    }

    /// Serialize the relation to a file.
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write(BufWriter::new(File::create(path)?))
    }

    /// Deserialize a relation written by [`NumericDominance::write`].
    pub fn read(reader: impl Read) -> Result<Self> {
        let mut input = ZlibDecoder::new(reader);
        let mut magic = [0u8; 8];
        input.read_exact(&mut magic)?;
        if &magic != SIM_FILE_MAGIC {
            return Err(Error::InputFormat(
                "not a simulation file (bad magic)".into(),
            ));
        }
        let computation_time = input.read_f64::<LittleEndian>()?;
        let minimal_finite = input.read_i32::<LittleEndian>()?;
        let num_tables = input.read_u32::<LittleEndian>()? as usize;
        let mut tables = Vec::with_capacity(num_tables);
        for _ in 0..num_tables {
            let size = input.read_u32::<LittleEndian>()? as usize;
            let mut table = Vec::with_capacity(size);
            for _ in 0..size {
                let mut row = Vec::with_capacity(size);
                for _ in 0..size {
                    row.push(input.read_i32::<LittleEndian>()?);
                }
                table.push(row);
            }
            tables.push(table);
        }
        Ok(NumericDominance {
            tables,
            minimal_finite,
            computation_time,
        })
    }

    /// Deserialize a relation from a file.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::read(BufReader::new(File::open(path)?))
    }

    /// Check that the relation matches the task's variables and domain sizes.
    pub fn matches_task(&self, task: &Task) -> bool {
        self.tables.len() == task.num_variables()
            && self
                .tables
                .iter()
                .enumerate()
                .all(|(var, table)| table.len() == task.domain_size(var))
    }
}
