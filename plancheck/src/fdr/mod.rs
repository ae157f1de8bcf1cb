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

//! # Finite-Domain Representation
//!
//! The immutable planning task in finite-domain representation (FDR): a set of variables with
//! ordered value domains, grounded operators with prevail conditions, (conditional) effects and
//! non-negative costs, an initial state (a total assignment) and a goal (a partial assignment).
//!
//! Tasks are usually read from the textual FDR format (see [`parser`]), but can also be
//! constructed programmatically with [`Task::new`].

pub mod parser;

pub use parser::{parse_task, parse_task_file};

/// A single variable value. Values are indices into the ordered domain of their variable.
pub type Val = i32;

/// Handle of a grounded operator in a [`Task`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct OperatorId(pub usize);

impl OperatorId {
    /// The position of the operator in [`Task::operators`].
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for OperatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// A state variable with its ordered value domain.
#[derive(Clone, Debug)]
pub struct Variable {
    /// Name of the variable
    pub name: String,
    /// Human readable names of the values, in domain order
    pub values: Vec<String>,
}

impl Variable {
    /// Construct a variable with `domain_size` unnamed values.
    pub fn unnamed(index: usize, domain_size: usize) -> Self {
        Variable {
            name: format!("var{}", index),
            values: (0..domain_size).map(|v| format!("val{}", v)).collect(),
        }
    }

    /// The number of values of this variable.
    pub fn domain_size(&self) -> usize {
        self.values.len()
    }
}

/// A single (possibly conditional) operator effect `var := post`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Effect {
    /// Effect conditions: the effect only fires if all of these facts hold
    pub conditions: Vec<(usize, Val)>,
    /// The affected variable
    pub var: usize,
    /// Precondition on the affected variable (`None` if unconstrained)
    pub pre: Option<Val>,
    /// The new value
    pub post: Val,
}

/// A grounded operator.
#[derive(Clone, Debug)]
pub struct Operator {
    /// Name of the grounded operator
    pub name: String,
    /// Prevail conditions: facts that must hold and are not changed
    pub prevail: Vec<(usize, Val)>,
    /// Effects, including their preconditions on the affected variables
    pub effects: Vec<Effect>,
    /// Cost of the operator, non-negative
    pub cost: i32,
}

/// The immutable planning task.
#[derive(Clone, Debug)]
pub struct Task {
    /// All state variables
    pub variables: Vec<Variable>,
    /// The initial state, a total assignment
    pub initial_state: Vec<Val>,
    /// The goal, a partial assignment as sorted `(var, val)` pairs
    pub goal: Vec<(usize, Val)>,
    /// All grounded operators
    pub operators: Vec<Operator>,
    /// All axiom rules (cost 0). Tasks with axioms are rejected by the engines.
    pub axioms: Vec<Operator>,
    /// Whether action costs are in effect. If `false`, every operator has cost 1.
    pub metric: bool,
}

impl Task {
    /// Construct a task from its parts. The goal is sorted by variable.
    pub fn new(
        variables: Vec<Variable>,
        initial_state: Vec<Val>,
        mut goal: Vec<(usize, Val)>,
        operators: Vec<Operator>,
        metric: bool,
    ) -> Self {
        goal.sort_unstable();
        Task {
            variables,
            initial_state,
            goal,
            operators,
            axioms: Vec::new(),
            metric,
        }
    }

    /// The number of state variables.
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// The domain size of the given variable.
    pub fn domain_size(&self, var: usize) -> usize {
        self.variables[var].domain_size()
    }

    /// The number of grounded operators.
    pub fn num_operators(&self) -> usize {
        self.operators.len()
    }

    /// The human readable name of a fact.
    pub fn fact_name(&self, var: usize, val: Val) -> &str {
        &self.variables[var].values[val as usize]
    }

    /// Check if the given total assignment extends the goal.
    pub fn is_goal_state(&self, state: &[Val]) -> bool {
        self.goal.iter().all(|&(var, val)| state[var] == val)
    }

    /// The cost of the given operator, taking the metric into account.
    pub fn operator_cost(&self, op: OperatorId) -> i32 {
        if self.metric {
            self.operators[op.index()].cost
        } else {
            1
        }
    }

    /// The summed cost of a plan.
    pub fn plan_cost(&self, plan: &[OperatorId]) -> i32 {
        plan.iter().map(|&op| self.operator_cost(op)).sum()
    }

    /// Check whether the operator is applicable in the given state.
    pub fn is_applicable(&self, op: OperatorId, state: &[Val]) -> bool {
        let operator = &self.operators[op.index()];
        operator.prevail.iter().all(|&(var, val)| state[var] == val)
            && operator.effects.iter().all(|e| match e.pre {
                Some(pre) => state[e.var] == pre,
                None => true,
            })
    }

    /// Apply the operator's effects to the given state, yielding the successor values.
    ///
    /// Effect conditions are evaluated against the predecessor state. The operator must be
    /// applicable.
    pub fn apply(&self, op: OperatorId, state: &[Val]) -> Vec<Val> {
        debug_assert!(self.is_applicable(op, state));
        let operator = &self.operators[op.index()];
        let mut succ = state.to_vec();
        for effect in &operator.effects {
            if effect
                .conditions
                .iter()
                .all(|&(var, val)| state[var] == val)
            {
                succ[effect.var] = effect.post;
            }
        }
        succ
    }

    /// All operators applicable in the given state, in operator-index order.
    ///
    /// The order is deterministic given the task; any randomization is the caller's business.
    pub fn applicable_operators(&self, state: &[Val]) -> Vec<OperatorId> {
        (0..self.operators.len())
            .map(OperatorId)
            .filter(|&op| self.is_applicable(op, state))
            .collect()
    }

    /// Check if any operator is applicable in the given state.
    pub fn has_applicable_operator(&self, state: &[Val]) -> bool {
        (0..self.operators.len()).any(|i| self.is_applicable(OperatorId(i), state))
    }
}
