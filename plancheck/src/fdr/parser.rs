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

//! Parser for the textual FDR format.
//!
//! The format is the output of the usual grounding pipeline: a version and metric header, the
//! variable section with value names, mutex groups (read and discarded), the initial state,
//! the goal, the operator records, and axiom rules. Every parse failure is reported as
//! [`Error::InputFormat`] with the offending line number.

use super::{Effect, Operator, Task, Val, Variable};
use crate::{Error, Result};

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

struct LineReader<R> {
    lines: std::io::Lines<BufReader<R>>,
    line_number: usize,
}

impl<R: Read> LineReader<R> {
    fn new(reader: R) -> Self {
        LineReader {
            lines: BufReader::new(reader).lines(),
            line_number: 0,
        }
    }

    fn error(&self, msg: impl std::fmt::Display) -> Error {
        Error::InputFormat(format!("line {}: {}", self.line_number, msg))
    }

    fn next_line(&mut self) -> Result<String> {
        self.line_number += 1;
        match self.lines.next() {
            Some(line) => Ok(line?),
            None => Err(Error::InputFormat(format!(
                "line {}: unexpected end of input",
                self.line_number
            ))),
        }
    }

    fn expect(&mut self, marker: &str) -> Result<()> {
        let line = self.next_line()?;
        if line.trim() == marker {
            Ok(())
        } else {
            Err(self.error(format_args!("expected `{}`, found `{}`", marker, line)))
        }
    }

    fn next_int(&mut self) -> Result<i64> {
        let line = self.next_line()?;
        line.trim()
            .parse::<i64>()
            .map_err(|_| self.error(format_args!("expected an integer, found `{}`", line)))
    }

    fn next_usize(&mut self) -> Result<usize> {
        let value = self.next_int()?;
        if value < 0 {
            return Err(self.error(format_args!("expected a non-negative count, found {}", value)));
        }
        Ok(value as usize)
    }

    fn next_ints(&mut self) -> Result<Vec<i64>> {
        let line = self.next_line()?;
        line.split_whitespace()
            .map(|tok| {
                tok.parse::<i64>()
                    .map_err(|_| Error::InputFormat(format!("bad integer token `{}`", tok)))
            })
            .collect()
    }
}

/// Parse a task from a file on disk.
pub fn parse_task_file(path: impl AsRef<Path>) -> Result<Task> {
    parse_task(File::open(path)?)
}

/// Parse a task from any reader carrying the textual FDR format.
pub fn parse_task(reader: impl Read) -> Result<Task> {
    let mut r = LineReader::new(reader);

    r.expect("begin_version")?;
    let version = r.next_int()?;
    if version != 3 {
        return Err(r.error(format_args!("unsupported FDR version {}", version)));
    }
    r.expect("end_version")?;

    r.expect("begin_metric")?;
    let metric = r.next_int()? != 0;
    r.expect("end_metric")?;

    let num_variables = r.next_usize()?;
    let mut variables = Vec::with_capacity(num_variables);
    for _ in 0..num_variables {
        r.expect("begin_variable")?;
        let name = r.next_line()?;
        let _axiom_layer = r.next_int()?;
        let domain_size = r.next_usize()?;
        let mut values = Vec::with_capacity(domain_size);
        for _ in 0..domain_size {
            values.push(r.next_line()?);
        }
        r.expect("end_variable")?;
        variables.push(Variable { name, values });
    }

    // mutex groups carry no information relevant for testing
    let num_mutexes = r.next_usize()?;
    for _ in 0..num_mutexes {
        r.expect("begin_mutex_group")?;
        let group_size = r.next_usize()?;
        for _ in 0..group_size {
            r.next_line()?;
        }
        r.expect("end_mutex_group")?;
    }

    r.expect("begin_state")?;
    let mut initial_state = Vec::with_capacity(num_variables);
    for var in 0..num_variables {
        let value = r.next_int()?;
        check_value(&r, &variables, var, value)?;
        initial_state.push(value as Val);
    }
    r.expect("end_state")?;

    r.expect("begin_goal")?;
    let num_goals = r.next_usize()?;
    let mut goal = Vec::with_capacity(num_goals);
    for _ in 0..num_goals {
        let pair = r.next_ints()?;
        if pair.len() != 2 {
            return Err(r.error("goal fact must be `<var> <val>`"));
        }
        let (var, val) = check_fact(&r, &variables, pair[0], pair[1])?;
        goal.push((var, val));
    }
    r.expect("end_goal")?;

    let num_operators = r.next_usize()?;
    let mut operators = Vec::with_capacity(num_operators);
    for _ in 0..num_operators {
        r.expect("begin_operator")?;
        operators.push(parse_operator(&mut r, &variables, metric)?);
        r.expect("end_operator")?;
    }

    let num_axioms = r.next_usize()?;
    let mut axioms = Vec::with_capacity(num_axioms);
    for _ in 0..num_axioms {
        r.expect("begin_rule")?;
        axioms.push(parse_rule(&mut r, &variables)?);
        r.expect("end_rule")?;
    }

    let mut task = Task::new(variables, initial_state, goal, operators, metric);
    task.axioms = axioms;
    Ok(task)
}

fn parse_operator<R: Read>(
    r: &mut LineReader<R>,
    variables: &[Variable],
    metric: bool,
) -> Result<Operator> {
    let name = r.next_line()?;

    let num_prevails = r.next_usize()?;
    let mut prevail = Vec::with_capacity(num_prevails);
    for _ in 0..num_prevails {
        let pair = r.next_ints()?;
        if pair.len() != 2 {
            return Err(r.error("prevail condition must be `<var> <val>`"));
        }
        prevail.push(check_fact(r, variables, pair[0], pair[1])?);
    }

    let num_effects = r.next_usize()?;
    let mut effects = Vec::with_capacity(num_effects);
    for _ in 0..num_effects {
        let fields = r.next_ints()?;
        effects.push(parse_effect(r, variables, &fields)?);
    }

    let cost = r.next_int()?;
    if metric && cost < 0 {
        return Err(r.error(format_args!("negative operator cost {}", cost)));
    }

    Ok(Operator {
        name,
        prevail,
        effects,
        cost: cost as i32,
    })
}

/// Effect lines have the shape `<#cond> (<cvar> <cval>)* <var> <pre> <post>`.
fn parse_effect<R: Read>(
    r: &LineReader<R>,
    variables: &[Variable],
    fields: &[i64],
) -> Result<Effect> {
    if fields.is_empty() {
        return Err(r.error("empty effect line"));
    }
    let num_conditions = fields[0];
    if num_conditions < 0 {
        return Err(r.error("negative effect condition count"));
    }
    let expected_len = 1 + 2 * num_conditions as usize + 3;
    if fields.len() != expected_len {
        return Err(r.error(format_args!(
            "malformed effect line: expected {} fields, found {}",
            expected_len,
            fields.len()
        )));
    }
    let mut conditions = Vec::with_capacity(num_conditions as usize);
    for i in 0..num_conditions as usize {
        conditions.push(check_fact(r, variables, fields[1 + 2 * i], fields[2 + 2 * i])?);
    }
    let base = 1 + 2 * num_conditions as usize;
    let var = check_variable(r, variables, fields[base])?;
    let pre = match fields[base + 1] {
        -1 => None,
        value => {
            check_value(r, variables, var, value)?;
            Some(value as Val)
        }
    };
    let post = fields[base + 2];
    check_value(r, variables, var, post)?;
    Ok(Effect {
        conditions,
        var,
        pre,
        post: post as Val,
    })
}

/// Axiom rules consist of a condition block and a single `<var> <old> <new>` line.
fn parse_rule<R: Read>(r: &mut LineReader<R>, variables: &[Variable]) -> Result<Operator> {
    let num_conditions = r.next_usize()?;
    let mut conditions = Vec::with_capacity(num_conditions);
    for _ in 0..num_conditions {
        let pair = r.next_ints()?;
        if pair.len() != 2 {
            return Err(r.error("rule condition must be `<var> <val>`"));
        }
        conditions.push(check_fact(r, variables, pair[0], pair[1])?);
    }
    let head = r.next_ints()?;
    if head.len() != 3 {
        return Err(r.error("rule head must be `<var> <old> <new>`"));
    }
    let var = check_variable(r, variables, head[0])?;
    check_value(r, variables, var, head[1])?;
    check_value(r, variables, var, head[2])?;
    Ok(Operator {
        name: String::from("<axiom>"),
        prevail: Vec::new(),
        effects: vec![Effect {
            conditions,
            var,
            pre: Some(head[1] as Val),
            post: head[2] as Val,
        }],
        cost: 0,
    })
}

fn check_variable<R: Read>(r: &LineReader<R>, variables: &[Variable], var: i64) -> Result<usize> {
    if var < 0 || var as usize >= variables.len() {
        return Err(r.error(format_args!("variable index {} out of range", var)));
    }
    Ok(var as usize)
}

fn check_value<R: Read>(
    r: &LineReader<R>,
    variables: &[Variable],
    var: usize,
    val: i64,
) -> Result<()> {
    if val < 0 || val as usize >= variables[var].domain_size() {
        return Err(r.error(format_args!(
            "value {} out of range for variable {}",
            val, var
        )));
    }
    Ok(())
}

fn check_fact<R: Read>(
    r: &LineReader<R>,
    variables: &[Variable],
    var: i64,
    val: i64,
) -> Result<(usize, Val)> {
    let var = check_variable(r, variables, var)?;
    check_value(r, variables, var, val)?;
    Ok((var, val as Val))
}
