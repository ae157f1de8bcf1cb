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

use crate::fdr::{parse_task, OperatorId, Task};
use crate::Error;

use lazy_static::lazy_static;

const SMALL_TASK: &str = "\
begin_version
3
end_version
begin_metric
1
end_metric
2
begin_variable
var0
-1
2
Atom at-a()
Atom at-b()
end_variable
begin_variable
var1
-1
2
Atom free()
Atom busy()
end_variable
0
begin_state
0
0
end_state
begin_goal
1
0 1
end_goal
2
begin_operator
move a b
1
1 0
1
0 0 0 1
3
end_operator
begin_operator
toggle
0
1
1 0 0 1 -1 1
0
end_operator
0
";

lazy_static! {
    static ref SMALL: Task = parse_task(SMALL_TASK.as_bytes()).unwrap();
}

#[test]
fn parse_small_task() {
    let task = &*SMALL;
    assert_eq!(task.num_variables(), 2);
    assert!(task.metric);
    assert_eq!(task.initial_state, vec![0, 0]);
    assert_eq!(task.goal, vec![(0, 1)]);
    assert_eq!(task.num_operators(), 2);

    let move_op = &task.operators[0];
    assert_eq!(move_op.name, "move a b");
    assert_eq!(move_op.prevail, vec![(1, 0)]);
    assert_eq!(move_op.effects.len(), 1);
    assert_eq!(move_op.effects[0].var, 0);
    assert_eq!(move_op.effects[0].pre, Some(0));
    assert_eq!(move_op.effects[0].post, 1);
    assert_eq!(move_op.cost, 3);

    let toggle = &task.operators[1];
    assert_eq!(toggle.effects[0].conditions, vec![(0, 0)]);
    assert_eq!(toggle.effects[0].pre, None);
}

#[test]
fn applicability_and_application() {
    let task = &*SMALL;
    let move_op = OperatorId(0);
    let toggle = OperatorId(1);

    assert!(task.is_applicable(move_op, &[0, 0]));
    assert!(!task.is_applicable(move_op, &[0, 1]));
    assert!(!task.is_applicable(move_op, &[1, 0]));
    assert_eq!(task.apply(move_op, &[0, 0]), vec![1, 0]);

    // the conditional effect only fires if var0 is 0
    assert_eq!(task.apply(toggle, &[0, 0]), vec![0, 1]);
    assert_eq!(task.apply(toggle, &[1, 0]), vec![1, 0]);

    assert!(!task.is_goal_state(&[0, 0]));
    assert!(task.is_goal_state(&[1, 1]));
    assert_eq!(task.applicable_operators(&[0, 0]), vec![move_op, toggle]);
}

#[test]
fn plan_cost_respects_metric() {
    assert_eq!(SMALL.plan_cost(&[OperatorId(0), OperatorId(1)]), 3);

    let unit = parse_task(SMALL_TASK.replace("begin_metric\n1", "begin_metric\n0").as_bytes())
        .unwrap();
    assert_eq!(unit.plan_cost(&[OperatorId(0), OperatorId(1)]), 2);
}

#[test]
fn rejects_malformed_input() {
    let err = parse_task(&b"begin_version\n2\nend_version\n"[..]).unwrap_err();
    assert!(matches!(err, Error::InputFormat(_)));

    let truncated = &SMALL_TASK[..SMALL_TASK.len() / 2];
    let err = parse_task(truncated.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::InputFormat(_)));

    let bad_value = SMALL_TASK.replace("begin_goal\n1\n0 1", "begin_goal\n1\n0 7");
    let err = parse_task(bad_value.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::InputFormat(_)));
}
