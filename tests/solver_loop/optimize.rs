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

use approx::assert_abs_diff_eq;
use nyx::command::{Command, EndKind, ExitMode, Minimize, NonlinearConstraint, SolverLoop, Vary};
use nyx::solvers::GradientDescent;
use nyx::store::{ObjectKind, SimObject};
use nyx::Sandbox;

use super::solver_loop;
use crate::{assign, end, init_logger, variable};

/// Optimize OPT { Vary x from 0; cost = (x - 3)^2; Minimize cost }
fn parabola(optimizer: GradientDescent) -> Sandbox {
    let mut sandbox = Sandbox::new();
    sandbox
        .add_object(SimObject::new("OPT", ObjectKind::Solver(Box::new(optimizer))))
        .unwrap();
    for name in ["x", "cost"] {
        sandbox
            .add_object(SimObject::new(name, ObjectKind::Variable(0.0)))
            .unwrap();
    }
    sandbox
        .append(Command::new(
            SolverLoop::optimize("OPT").with_exit_mode(ExitMode::SaveAndContinue),
        ))
        .unwrap();
    sandbox
        .append(Command::new(
            Vary::from_str("OPT(x = 0, {Perturbation = 1e-6})").unwrap(),
        ))
        .unwrap();
    sandbox.append(assign("cost = (x - 3)^2")).unwrap();
    sandbox
        .append(Command::new(Minimize::from_str("OPT(cost)").unwrap()))
        .unwrap();
    sandbox
}

#[test]
fn minimizes_a_parabola() {
    init_logger();
    let mut sandbox = parabola(GradientDescent::default());
    let optimize = sandbox.append(end(EndKind::EndOptimize)).unwrap();
    let head = sandbox.sequence().head().unwrap();
    assert_ne!(head, optimize);

    sandbox.execute().unwrap();
    assert_abs_diff_eq!(variable(&sandbox.scope(), "x"), 3.0, epsilon = 1e-3);
    assert_abs_diff_eq!(variable(&sandbox.scope(), "cost"), 0.0, epsilon = 1e-6);
    let cmd = solver_loop(&sandbox, head);
    assert!(cmd.converged());
    assert!(cmd.solver().unwrap().borrow().iterations() < 200);
}

#[test]
fn callback_driven_optimizer() {
    init_logger();
    let mut sandbox = parabola(GradientDescent::builder().use_callbacks(true).build());
    sandbox.append(end(EndKind::EndOptimize)).unwrap();
    let head = sandbox.sequence().head().unwrap();

    let report = sandbox.execute().unwrap();
    assert_abs_diff_eq!(variable(&sandbox.scope(), "x"), 3.0, epsilon = 1e-3);
    let cmd = solver_loop(&sandbox, head);
    assert!(cmd.converged());
    // Trial passes run within a single tick, only the solved pass is spread over ticks
    assert!(report.ticks < 3 * cmd.passes(), "{} ticks", report.ticks);
}

#[test]
fn inactive_constraint() {
    init_logger();
    let mut sandbox = parabola(GradientDescent::default());
    sandbox
        .append(Command::new(
            NonlinearConstraint::from_str("OPT(x >= 1)").unwrap(),
        ))
        .unwrap();
    sandbox.append(end(EndKind::EndOptimize)).unwrap();
    let head = sandbox.sequence().head().unwrap();

    sandbox.execute().unwrap();
    assert_abs_diff_eq!(variable(&sandbox.scope(), "x"), 3.0, epsilon = 1e-3);
    let cmd = solver_loop(&sandbox, head);
    assert!(cmd.converged());
    assert_eq!(cmd.solver().unwrap().borrow().result_count(), 2);
}
