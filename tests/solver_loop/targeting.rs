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

use approx::assert_abs_diff_eq;
use nyx::command::{Achieve, Command, EndKind, ExitMode, For, SolverLoop, StartMode, Vary};
use nyx::cosmic::Spacecraft;
use nyx::solvers::{DifferentialCorrector, GradientDescent};
use nyx::store::{ObjectKind, SimObject};
use nyx::{CommandError, CommandId, Sandbox};

use super::solver_loop;
use crate::{assign, end, init_logger, variable};

fn dc_sandbox(vars: &[(&str, f64)]) -> Sandbox {
    let mut sandbox = Sandbox::new();
    sandbox
        .add_object(SimObject::new(
            "DC1",
            ObjectKind::Solver(Box::new(DifferentialCorrector::default())),
        ))
        .unwrap();
    for (name, value) in vars {
        sandbox
            .add_object(SimObject::new(name, ObjectKind::Variable(*value)))
            .unwrap();
    }
    sandbox
}

/// Target DC1 { Vary x from 1; y = x * x; Achieve y = 4 }
fn square_root_of_four(sandbox: &mut Sandbox, target: SolverLoop) -> CommandId {
    let id = sandbox.append(Command::new(target)).unwrap();
    sandbox
        .append(Command::new(
            Vary::from_str("DC1(x = 1, {Perturbation = 1e-6})").unwrap(),
        ))
        .unwrap();
    sandbox.append(assign("y = x * x")).unwrap();
    sandbox
        .append(Command::new(
            Achieve::from_str("DC1(y = 4, {Tolerance = 1e-6})").unwrap(),
        ))
        .unwrap();
    sandbox.append(end(EndKind::EndTarget)).unwrap();
    id
}

#[test]
fn targets_a_variable() {
    init_logger();
    let mut sandbox = dc_sandbox(&[("x", 0.0), ("y", 0.0), ("z", 0.0)]);
    let target = square_root_of_four(
        &mut sandbox,
        SolverLoop::target("DC1").with_exit_mode(ExitMode::SaveAndContinue),
    );
    sandbox.append(assign("z = x + 1")).unwrap();

    sandbox.execute().unwrap();

    let scope = sandbox.scope();
    assert_abs_diff_eq!(variable(&scope, "x"), 2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(variable(&scope, "y"), 4.0, epsilon = 1e-6);
    // The command after the loop sees the solution
    assert_abs_diff_eq!(variable(&scope, "z"), 3.0, epsilon = 1e-6);

    let cmd = solver_loop(&sandbox, target);
    assert!(cmd.converged());
    assert_eq!(cmd.saved_guesses().len(), 1);
    assert_abs_diff_eq!(cmd.saved_guesses()[0], 2.0, epsilon = 1e-6);
    let solver = cmd.solver().unwrap().borrow();
    assert!(solver.converged());
    assert!(solver.iterations() < 10);
    // A nominal pass plus a perturbed pass per iteration, then the solved pass
    assert_eq!(cmd.passes(), 2 * solver.iterations() + 2);
}

#[test]
fn saved_solution_is_the_next_initial_guess() {
    init_logger();
    let mut sandbox = dc_sandbox(&[("x", 0.0), ("y", 0.0), ("I", 0.0)]);
    sandbox
        .append(Command::new(For::from_str("I = 1:2").unwrap()))
        .unwrap();
    let target = square_root_of_four(
        &mut sandbox,
        SolverLoop::target("DC1").with_exit_mode(ExitMode::SaveAndContinue),
    );
    sandbox.append(end(EndKind::EndFor)).unwrap();

    sandbox.execute().unwrap();

    // The second entry starts from the solution: one nominal pass meets the goal
    let cmd = solver_loop(&sandbox, target);
    assert!(cmd.converged());
    assert_eq!(cmd.passes(), 2);
    assert_abs_diff_eq!(variable(&sandbox.scope(), "x"), 2.0, epsilon = 1e-6);
}

#[test]
fn initialization_is_idempotent() {
    let mut sandbox = dc_sandbox(&[("x", 0.0), ("y", 0.0)]);
    let target = square_root_of_four(&mut sandbox, SolverLoop::target("DC1"));
    sandbox.initialize().unwrap();
    sandbox.initialize().unwrap();

    let cmd = solver_loop(&sandbox, target);
    let solver = cmd.solver().unwrap();
    // The loop is the only owner of its solver, the ports only hold weak handles
    assert_eq!(Rc::strong_count(solver), 1);
    assert_eq!(solver.borrow().variable_count(), 1);
    assert_eq!(solver.borrow().result_count(), 1);

    // The solver of the resource store is never registered with
    match &sandbox.scope().find_object("DC1").unwrap().borrow().kind {
        ObjectKind::Solver(catalog) => assert_eq!(catalog.variable_count(), 0),
        other => panic!("unexpected {other:?}"),
    }
    sandbox.execute().unwrap();
    assert_abs_diff_eq!(variable(&sandbox.scope(), "x"), 2.0, epsilon = 1e-6);
}

/// Target DC1 { Vary Sat.X from 7000; Achieve Sat.RMAG = 7500 }
fn raise_radius(exit_mode: ExitMode) -> (Sandbox, Result<(), CommandError>) {
    let mut sandbox = dc_sandbox(&[("r", 0.0)]);
    sandbox
        .add_object(SimObject::new(
            "Sat",
            ObjectKind::Spacecraft(Spacecraft::default()),
        ))
        .unwrap();
    sandbox
        .append(Command::new(
            SolverLoop::target("DC1").with_exit_mode(exit_mode),
        ))
        .unwrap();
    sandbox
        .append(Command::new(
            Vary::from_str("DC1(Sat.X = 7000, {Perturbation = 1e-3})").unwrap(),
        ))
        .unwrap();
    sandbox
        .append(Command::new(
            Achieve::from_str("DC1(Sat.RMAG = 7500, {Tolerance = 1e-6})").unwrap(),
        ))
        .unwrap();
    sandbox.append(end(EndKind::EndTarget)).unwrap();
    sandbox.append(assign("r = Sat.RMAG")).unwrap();
    let rslt = sandbox.execute().map(|_| ());
    (sandbox, rslt)
}

fn sat_x(sandbox: &Sandbox) -> f64 {
    let obj = sandbox.scope().find_object("Sat").unwrap();
    let x = match &obj.borrow().kind {
        ObjectKind::Spacecraft(sc) => sc.state[0],
        other => panic!("unexpected {other:?}"),
    };
    x
}

#[test]
fn exit_modes() {
    init_logger();
    let solution = (7500.0_f64.powi(2) - 1300.0_f64.powi(2)).sqrt();

    let (sandbox, rslt) = raise_radius(ExitMode::DiscardAndContinue);
    rslt.unwrap();
    // Back to the state of the initial guess
    assert_abs_diff_eq!(sat_x(&sandbox), 7000.0, epsilon = 1e-9);
    assert_abs_diff_eq!(
        variable(&sandbox.scope(), "r"),
        (7000.0_f64.powi(2) + 1300.0_f64.powi(2)).sqrt(),
        epsilon = 1e-9
    );

    let (sandbox, rslt) = raise_radius(ExitMode::SaveAndContinue);
    rslt.unwrap();
    assert_abs_diff_eq!(sat_x(&sandbox), solution, epsilon = 1e-5);
    assert_abs_diff_eq!(variable(&sandbox.scope(), "r"), 7500.0, epsilon = 1e-5);

    let (sandbox, rslt) = raise_radius(ExitMode::Stop);
    assert!(matches!(rslt, Err(CommandError::RunStopped { .. })));
    assert_abs_diff_eq!(sat_x(&sandbox), solution, epsilon = 1e-5);
    // The run stopped before the last assignment
    assert_eq!(variable(&sandbox.scope(), "r"), 0.0);
}

#[test]
fn run_initial_guess_does_not_iterate() {
    let mut sandbox = dc_sandbox(&[("x", 0.0), ("y", 0.0)]);
    let target = square_root_of_four(
        &mut sandbox,
        SolverLoop::target("DC1")
            .with_start_mode(StartMode::RunInitialGuess)
            .with_exit_mode(ExitMode::SaveAndContinue),
    );
    sandbox.execute().unwrap();
    assert_eq!(variable(&sandbox.scope(), "x"), 1.0);
    assert_eq!(variable(&sandbox.scope(), "y"), 1.0);
    let cmd = solver_loop(&sandbox, target);
    assert_eq!(cmd.passes(), 1);
    assert!(!cmd.converged());
}

#[test]
fn run_solution_is_not_available() {
    let mut sandbox = dc_sandbox(&[("x", 0.0), ("y", 0.0)]);
    square_root_of_four(
        &mut sandbox,
        SolverLoop::target("DC1").with_start_mode(StartMode::RunSolution),
    );
    assert!(matches!(
        sandbox.execute(),
        Err(CommandError::NotImplemented { .. })
    ));
}

#[test]
fn target_needs_a_targeter() {
    let mut sandbox = Sandbox::new();
    sandbox
        .add_object(SimObject::new(
            "OPT",
            ObjectKind::Solver(Box::new(GradientDescent::default())),
        ))
        .unwrap();
    sandbox
        .add_object(SimObject::new("x", ObjectKind::Variable(0.0)))
        .unwrap();
    sandbox
        .append(Command::new(SolverLoop::target("OPT")))
        .unwrap();
    sandbox.append(end(EndKind::EndTarget)).unwrap();
    assert!(matches!(
        sandbox.execute(),
        Err(CommandError::InvalidCommand { .. })
    ));
}
