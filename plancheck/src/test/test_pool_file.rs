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

use super::helpers::*;
use crate::pool::{load_pool_file, PoolEntry, PoolFileWriter};
use crate::state::{StateId, StateRegistry};

#[test]
fn pool_file_roundtrip() {
    let task = single_var_task(3, vec![unary_op("a", 0, 0, 1, 1)]);
    let path = temp_file("pool");

    let mut registry = StateRegistry::new();
    let s0 = registry.intern(vec![0]);
    let s1 = registry.intern(vec![1]);
    {
        let mut writer = PoolFileWriter::create(&task, &path).unwrap();
        writer
            .write(
                &registry,
                &PoolEntry {
                    ref_index: None,
                    ref_state: StateId::NONE,
                    steps: 0,
                    state: s0,
                },
            )
            .unwrap();
        writer
            .write(
                &registry,
                &PoolEntry {
                    ref_index: Some(0),
                    ref_state: s0,
                    steps: 2,
                    state: s1,
                },
            )
            .unwrap();
    }

    let mut fresh_registry = StateRegistry::new();
    let pool = load_pool_file(&mut fresh_registry, &path).unwrap();
    assert_eq!(pool.len(), 2);

    assert_eq!(pool[0].ref_index, None);
    assert_eq!(pool[0].ref_state, StateId::NONE);
    assert_eq!(pool[0].steps, 0);
    assert_eq!(fresh_registry.lookup(pool[0].state), &[0]);

    assert_eq!(pool[1].ref_index, Some(0));
    assert_eq!(pool[1].ref_state, pool[0].state);
    assert_eq!(pool[1].steps, 2);
    assert_eq!(fresh_registry.lookup(pool[1].state), &[1]);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn pool_file_rejects_bad_reference() {
    let path = temp_file("bad-pool");
    std::fs::write(
        &path,
        "sas_variables\n1\n2;val0;val1\npool\n5;1;0;0\n",
    )
    .unwrap();
    let mut registry = StateRegistry::new();
    assert!(load_pool_file(&mut registry, &path).is_err());
    std::fs::remove_file(&path).unwrap();
}
