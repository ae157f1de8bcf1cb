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

//! Pool admission filters.

use crate::env::TestingEnvironment;
use crate::novelty::NoveltyStore;
use crate::state::StateId;

/// Decides whether a generated state is admitted to the pool.
pub trait PoolFilter {
    /// Return true if the given state should be added to the pool.
    fn store(&mut self, env: &mut TestingEnvironment, state: StateId) -> bool;

    /// Print filter specific statistics at the end of the run.
    fn print_statistics(&self) {}
}

/// The trivial filter admitting every state.
#[derive(Debug, Default)]
pub struct AcceptAllFilter;

impl PoolFilter for AcceptAllFilter {
    fn store(&mut self, _env: &mut TestingEnvironment, _state: StateId) -> bool {
        true
    }
}

/// Admits a state only if it is novel with respect to a [`NoveltyStore`].
#[derive(Debug)]
pub struct NoveltyPoolFilter {
    store: NoveltyStore,
}

impl NoveltyPoolFilter {
    /// Create the filter around the given novelty store.
    pub fn new(store: NoveltyStore) -> Self {
        NoveltyPoolFilter { store }
    }
}

impl PoolFilter for NoveltyPoolFilter {
    fn store(&mut self, env: &mut TestingEnvironment, state: StateId) -> bool {
        self.store.insert(env.registry.lookup(state))
    }

    fn print_statistics(&self) {
        self.store.print_statistics();
    }
}
