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

use std::rc::Rc;
use std::str::FromStr;

use nyx::command::{CallFunction, Command, Create, Global, MissionSequence, ScriptFunction};
use nyx::cosmic::Spacecraft;
use nyx::store::{ObjectKind, SimObject, StoreError};
use nyx::CommandError;

use crate::{add_variable, assign, init_logger, run, test_scope, variable};

#[test]
fn global_is_exclusive() {
    init_logger();
    let scope = test_scope();
    let x = add_variable(&scope, "x", 1.0);
    let mut seq = MissionSequence::new();
    seq.append(Command::new(Global::new(&["x"]))).unwrap();
    // A second declaration of the same name is a no-op
    seq.append(Command::new(Global::new(&["x"]))).unwrap();
    seq.append(assign("x = x + 1")).unwrap();
    run(&mut seq, &scope).unwrap();

    let (los, gos) = (scope.local().unwrap(), scope.global().unwrap());
    assert!(!los.borrow().contains("x"));
    assert_eq!(gos.borrow().len(), 1);
    // The object moved, it was not copied
    assert!(Rc::ptr_eq(&gos.borrow().get("x").unwrap(), &x));
    assert!(x.borrow().is_global);
    assert_eq!(variable(&scope, "x"), 2.0);
}

#[test]
fn global_of_an_unknown_name() {
    let scope = test_scope();
    let mut seq = MissionSequence::new();
    seq.append(Command::new(Global::new(&["ghost"]))).unwrap();
    let err = run(&mut seq, &scope).unwrap_err();
    assert!(err.is_unresolved(), "{err}");
}

#[test]
fn create_is_idempotent() {
    let scope = test_scope();
    let mut seq = MissionSequence::new();
    seq.append(Command::new(Create::from_str("Array A[3,3]").unwrap()))
        .unwrap();
    seq.append(Command::new(Create::from_str("Array A[3,3]").unwrap()))
        .unwrap();
    seq.append(Command::new(Create::from_str("Variable x").unwrap()))
        .unwrap();
    seq.append(assign("A(2, 3) = 5")).unwrap();
    seq.append(assign("x = A(2, 3) * 2")).unwrap();
    run(&mut seq, &scope).unwrap();
    let first = scope.find_object("A").unwrap();

    // Running again reuses the objects
    run(&mut seq, &scope).unwrap();
    assert!(Rc::ptr_eq(&first, &scope.find_object("A").unwrap()));
    assert_eq!(scope.local().unwrap().borrow().len(), 2);
    assert_eq!(variable(&scope, "x"), 10.0);
}

#[test]
fn create_with_another_shape() {
    let scope = test_scope();
    let mut seq = MissionSequence::new();
    seq.append(Command::new(Create::from_str("Array A[3,3]").unwrap()))
        .unwrap();
    seq.append(Command::new(Create::from_str("Array A[2,4]").unwrap()))
        .unwrap();
    assert!(matches!(
        run(&mut seq, &scope),
        Err(CommandError::TypeMismatch {
            source: StoreError::DimensionMismatch { .. },
            ..
        })
    ));

    let mut seq = MissionSequence::new();
    seq.append(Command::new(Create::from_str("Variable A").unwrap()))
        .unwrap();
    assert!(matches!(
        run(&mut seq, &scope),
        Err(CommandError::TypeMismatch {
            source: StoreError::KindMismatch { .. },
            ..
        })
    ));
}

#[test]
fn create_global_objects() {
    let scope = test_scope();
    let mut seq = MissionSequence::new();
    seq.append(Command::new(
        Create::from_str("Spacecraft Sat").unwrap().global(),
    ))
    .unwrap();
    seq.append(Command::new(Create::from_str("Spacecraft Sat").unwrap()))
        .unwrap();
    run(&mut seq, &scope).unwrap();
    assert!(scope.global().unwrap().borrow().contains("Sat"));
    // The local definition is redundant with the global one
    assert!(scope.local().unwrap().borrow().is_empty());
}

#[test]
fn celestial_bodies_are_not_created() {
    let scope = test_scope();
    let mut seq = MissionSequence::new();
    seq.append(Command::new(Create::from_str("Planet Vulcan").unwrap()))
        .unwrap();
    run(&mut seq, &scope).unwrap();
    assert!(scope.find_object("Vulcan").is_none());
    assert!(scope.find_object("Earth").is_some());
}

#[test]
fn function_scope() {
    let caller = test_scope();
    add_variable(&caller, "x", 1.0);
    let callee = caller.function_scope();
    assert!(!callee.same_stores(&caller));

    // Locals of the caller are invisible to the function
    let mut seq = MissionSequence::new();
    seq.append(assign("y = x")).unwrap();
    assert!(run(&mut seq, &callee).unwrap_err().is_unresolved());

    // Globals declared by the function are visible to the caller, its locals are not
    add_variable(&callee, "g", 0.0);
    add_variable(&callee, "tmp", 7.0);
    let mut seq = MissionSequence::new();
    seq.append(Command::new(Global::new(&["g"]))).unwrap();
    seq.append(assign("g = tmp * 2")).unwrap();
    run(&mut seq, &callee).unwrap();

    assert_eq!(variable(&caller, "g"), 14.0);
    assert!(caller.find_object("tmp").is_none());
    match &caller.find_object("g").unwrap().borrow().kind {
        ObjectKind::Variable(value) => assert_eq!(*value, 14.0),
        other => panic!("unexpected {other:?}"),
    };
}

/// function [b] = Double(a) { Create Variable b; b = a * 2; a = 100 }
fn double() -> ScriptFunction {
    let mut body = MissionSequence::new();
    body.append(Command::new(Create::from_str("Variable b").unwrap()))
        .unwrap();
    body.append(assign("b = a * 2")).unwrap();
    body.append(assign("a = 100")).unwrap();
    ScriptFunction::new("Double", &["a"], &["b"], body)
}

#[test]
fn call_function_copies_arguments() {
    init_logger();
    let scope = test_scope();
    add_variable(&scope, "x", 3.0);
    add_variable(&scope, "y", 0.0);
    let mut seq = MissionSequence::new();
    seq.append(Command::new(CallFunction::new(double(), &["x"], &["y"])))
        .unwrap();
    seq.append(assign("x = x + y")).unwrap();
    run(&mut seq, &scope).unwrap();

    assert_eq!(variable(&scope, "y"), 6.0);
    // Inputs are passed by value
    assert_eq!(variable(&scope, "x"), 9.0);
    for name in ["a", "b"] {
        assert!(scope.find_object(name).is_none(), "`{name}` leaked");
    }
    assert_eq!(scope.local().unwrap().borrow().len(), 2);

    // Every call starts from a fresh local store
    run(&mut seq, &scope).unwrap();
    assert_eq!(variable(&scope, "y"), 18.0);
    assert_eq!(
        seq.generate_script(),
        "[y] = Double(x);\nx = x + y;"
    );
}

#[test]
fn call_function_shares_globals() {
    let scope = test_scope();
    add_variable(&scope, "g", 1.0);
    let mut body = MissionSequence::new();
    body.append(Command::new(Create::from_str("Variable h").unwrap()))
        .unwrap();
    body.append(Command::new(Global::new(&["h"]))).unwrap();
    body.append(assign("g = g + 1")).unwrap();
    body.append(assign("h = g * 10")).unwrap();
    let bump = ScriptFunction::new("Bump", &[], &[], body);

    let mut seq = MissionSequence::new();
    seq.append(Command::new(Global::new(&["g"]))).unwrap();
    seq.append(Command::new(CallFunction::new(bump, &[], &[])))
        .unwrap();
    run(&mut seq, &scope).unwrap();

    assert_eq!(variable(&scope, "g"), 2.0);
    // Declared global by the function, so it outlives the call
    assert_eq!(variable(&scope, "h"), 20.0);
    assert!(scope.global().unwrap().borrow().contains("h"));
}

#[test]
fn call_function_cannot_see_caller_locals() {
    let scope = test_scope();
    add_variable(&scope, "x", 1.0);
    let mut body = MissionSequence::new();
    body.append(Command::new(Create::from_str("Variable z").unwrap()))
        .unwrap();
    body.append(assign("z = x")).unwrap();
    let peek = ScriptFunction::new("Peek", &[], &[], body);

    let mut seq = MissionSequence::new();
    seq.append(Command::new(CallFunction::new(peek, &[], &[])))
        .unwrap();
    assert!(run(&mut seq, &scope).unwrap_err().is_unresolved());
}

#[test]
fn call_function_errors() {
    let scope = test_scope();
    add_variable(&scope, "x", 1.0);
    scope.local().unwrap().borrow_mut().insert(
        SimObject::new("Sat", ObjectKind::Spacecraft(Spacecraft::default())).shared(),
    );

    // No definition attached
    let mut seq = MissionSequence::new();
    seq.append(Command::new(CallFunction::from_str("[x] = Double(x)").unwrap()))
        .unwrap();
    assert!(matches!(
        run(&mut seq, &scope),
        Err(CommandError::MissingContext { .. })
    ));

    // Wrong number of arguments
    let mut seq = MissionSequence::new();
    seq.append(Command::new(CallFunction::new(double(), &["x", "x"], &["x"])))
        .unwrap();
    assert!(matches!(
        run(&mut seq, &scope),
        Err(CommandError::InvalidCommand { .. })
    ));

    // A variable cannot be copied into a spacecraft
    let mut seq = MissionSequence::new();
    seq.append(Command::new(CallFunction::new(double(), &["x"], &["Sat"])))
        .unwrap();
    assert!(matches!(
        run(&mut seq, &scope),
        Err(CommandError::TypeMismatch {
            source: StoreError::KindMismatch { .. },
            ..
        })
    ));
}
