/*
    Nyx, blazing fast astrodynamics
    Copyright (C) 2018-onwards Christopher Rabotin <christopher.rabotin@gmail.com>

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use std::str::FromStr;

use nyx::command::{Command, EndKind, For, If, MissionSequence, While};
use nyx::cosmic::Spacecraft;
use nyx::md::ParamError;
use nyx::store::{ObjectKind, Scope, SimObject};
use nyx::CommandError;

use crate::{add_variable, assign, end, init_logger, run, test_scope, variable};

fn scope_with(vars: &[(&str, f64)]) -> Scope {
    let scope = test_scope();
    for (name, value) in vars {
        add_variable(&scope, name, *value);
    }
    scope
}

#[test]
fn for_loop_accumulates() {
    init_logger();
    let scope = scope_with(&[("x", 0.0), ("y", 0.0), ("I", 0.0)]);
    let mut seq = MissionSequence::new();
    seq.append(Command::new(For::from_str("I = 1:3").unwrap())).unwrap();
    seq.append(assign("x = x + I")).unwrap();
    seq.append(end(EndKind::EndFor)).unwrap();
    seq.append(assign("y = 10 * x")).unwrap();

    // Two ticks per pass (body and marker), one to leave the loop, one for the last command
    let ticks = run(&mut seq, &scope).unwrap();
    assert_eq!(ticks, 8);
    assert_eq!(variable(&scope, "x"), 6.0);
    assert_eq!(variable(&scope, "y"), 60.0);
    assert_eq!(variable(&scope, "I"), 3.0);
}

#[test]
fn descending_for_loop() {
    let scope = scope_with(&[("x", 0.0), ("I", 0.0)]);
    let mut seq = MissionSequence::new();
    seq.append(Command::new(For::from_str("I = 10:-5:0").unwrap())).unwrap();
    seq.append(assign("x = x + I")).unwrap();
    seq.append(end(EndKind::EndFor)).unwrap();
    run(&mut seq, &scope).unwrap();
    assert_eq!(variable(&scope, "x"), 15.0);
}

#[test]
fn nested_loops() {
    let scope = scope_with(&[("x", 0.0), ("I", 0.0), ("J", 0.0)]);
    let mut seq = MissionSequence::new();
    seq.append(Command::new(For::from_str("I = 1:2").unwrap())).unwrap();
    seq.append(Command::new(For::from_str("J = 1:3").unwrap())).unwrap();
    seq.append(assign("x = x + I * J")).unwrap();
    seq.append(end(EndKind::EndFor)).unwrap();
    seq.append(end(EndKind::EndFor)).unwrap();
    run(&mut seq, &scope).unwrap();
    // (1 + 2 + 3) * (1 + 2)
    assert_eq!(variable(&scope, "x"), 18.0);

    // A second run starts the loops over
    run(&mut seq, &scope).unwrap();
    assert_eq!(variable(&scope, "x"), 36.0);
}

#[test]
fn if_else_picks_one_branch() {
    let scope = scope_with(&[("x", 5.0), ("y", 0.0)]);
    let mut seq = MissionSequence::new();
    let owner = seq.append(Command::new(If::from_str("x > 3").unwrap())).unwrap();
    seq.append(assign("y = 1")).unwrap();
    seq.append(end(EndKind::Else)).unwrap();
    seq.append(assign("y = 2")).unwrap();
    seq.append(end(EndKind::EndIf)).unwrap();

    run(&mut seq, &scope).unwrap();
    assert_eq!(variable(&scope, "y"), 1.0);

    add_variable(&scope, "x", 1.0);
    run(&mut seq, &scope).unwrap();
    assert_eq!(variable(&scope, "y"), 2.0);
    match &seq.command(owner).unwrap().kind {
        nyx::command::CommandKind::If(cmd) => assert_eq!(cmd.active_branch(), 1),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn if_without_else_may_skip() {
    let scope = scope_with(&[("x", 5.0), ("y", 5.0)]);
    let mut seq = MissionSequence::new();
    seq.append(Command::new(If::from_str("x > 3 & y < 2").unwrap())).unwrap();
    seq.append(assign("y = 1")).unwrap();
    seq.append(end(EndKind::EndIf)).unwrap();
    seq.append(assign("x = 0")).unwrap();
    assert_eq!(run(&mut seq, &scope).unwrap(), 2);
    assert_eq!(variable(&scope, "y"), 5.0);
    assert_eq!(variable(&scope, "x"), 0.0);
}

#[test]
fn while_loop() {
    let scope = scope_with(&[("x", 0.0)]);
    let mut seq = MissionSequence::new();
    seq.append(Command::new(While::from_str("x < 10").unwrap())).unwrap();
    seq.append(assign("x = x + 3")).unwrap();
    seq.append(end(EndKind::EndWhile)).unwrap();
    run(&mut seq, &scope).unwrap();
    assert_eq!(variable(&scope, "x"), 12.0);
}

#[test]
fn zero_step_is_rejected() {
    let scope = scope_with(&[("x", 0.0), ("I", 0.0)]);
    let mut seq = MissionSequence::new();
    seq.append(Command::new(For::from_str("I = 1:0:3").unwrap())).unwrap();
    seq.append(assign("x = x + I")).unwrap();
    seq.append(end(EndKind::EndFor)).unwrap();
    assert!(matches!(
        run(&mut seq, &scope),
        Err(CommandError::InvalidParameter {
            source: ParamError::ZeroStep,
            ..
        })
    ));
}

#[test]
fn unresolved_reference_at_initialization() {
    let scope = scope_with(&[("x", 0.0)]);
    let mut seq = MissionSequence::new();
    seq.append(assign("x = 1")).unwrap();
    seq.append(assign("q = x")).unwrap();
    let err = run(&mut seq, &scope).unwrap_err();
    assert!(err.is_unresolved(), "{err}");
    // Nothing ran
    assert_eq!(variable(&scope, "x"), 0.0);
}

#[test]
fn missing_context() {
    let mut seq = MissionSequence::new();
    seq.append(assign("x = 1")).unwrap();
    assert!(matches!(
        seq.initialize_all(),
        Err(CommandError::MissingContext { .. })
    ));
}

#[test]
fn initialize_twice() {
    let scope = scope_with(&[("x", 0.0), ("I", 0.0)]);
    let mut seq = MissionSequence::new();
    seq.append(Command::new(For::from_str("I = 1:2").unwrap())).unwrap();
    seq.append(assign("x = x + 1")).unwrap();
    seq.append(end(EndKind::EndFor)).unwrap();
    seq.set_scope(&scope);
    seq.initialize_all().unwrap();
    seq.initialize_all().unwrap();
    assert_eq!(scope.local().unwrap().borrow().len(), 2);
    run(&mut seq, &scope).unwrap();
    assert_eq!(variable(&scope, "x"), 2.0);
}

#[test]
fn mission_summary() {
    let scope = scope_with(&[("x", 0.0)]);
    scope.local().unwrap().borrow_mut().insert(
        SimObject::new("Sat", ObjectKind::Spacecraft(Spacecraft::default())).shared(),
    );
    let mut seq = MissionSequence::new();
    let first = seq.append(assign("Sat.X = 7000")).unwrap();
    let second = seq.append(assign("x = Sat.X")).unwrap();
    assert!(seq
        .command(first)
        .unwrap()
        .summary_text()
        .contains("Execute the script to generate command summary data"));

    run(&mut seq, &scope).unwrap();
    assert_eq!(variable(&scope, "x"), 7000.0);
    let text = seq.command(second).unwrap().summary_text();
    assert!(text.starts_with("Command Summary: Assignment Command\n"));
    assert!(text.contains("        X  = 7000.000000000 km\n"));
    let summary = seq.command(first).unwrap().summary().unwrap();
    assert_eq!(summary.spacecraft.len(), 1);
    assert_eq!(seq.mission_summary().matches("Command Summary").count(), 2);
}
