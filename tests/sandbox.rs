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

extern crate nyx_sequence as nyx;
extern crate pretty_env_logger;

use std::str::FromStr;
use std::sync::atomic::Ordering;

use approx::assert_abs_diff_eq;
use nyx::command::{
    Achieve, Assignment, BranchEnd, Command, CommandKind, Context, Create, EndKind, ExitMode,
    Executable, For, Global, Initializable, Renameable, Serializable, SolverLoop, Vary,
};
use nyx::io::{ConfigRepr, ResourcesRepr};
use nyx::md::ParamRef;
use nyx::publisher::{Publisher, RecordingPublisher, RunState};
use nyx::solvers::DifferentialCorrector;
use nyx::store::{ObjectKind, ObjectType, SimObject};
use nyx::{CommandError, CommandId, Sandbox};

fn init_logger() {
    if pretty_env_logger::try_init().is_err() {
        println!("could not init env_logger");
    }
}

fn assign(text: &str) -> Command {
    Command::new(Assignment::from_str(text).unwrap())
}

fn value_of(sandbox: &Sandbox, name: &str) -> f64 {
    ParamRef::from_str(name)
        .unwrap()
        .get(&sandbox.scope(), "Test")
        .unwrap()
}

const RESOURCES: &str = r#"
spacecraft:
  - name: Sat
    epoch: 2000-01-01T12:00:00 UTC
    state: [7100.0, 0.0, 1300.0, 0.0, 7.35, 1.0]
variables:
  r: 0.0
differential_correctors:
  - name: DC1
    max_iterations: 15
globals: [DC1]
"#;

#[test]
fn user_interrupt() {
    init_logger();
    let publisher = RecordingPublisher::new().shared();
    let mut sandbox = Sandbox::with_publisher(publisher.clone());
    sandbox
        .append(Command::new(Create::from_str("Variable x").unwrap()))
        .unwrap();
    sandbox.append(Command::new(Global::new(&["x"]))).unwrap();
    sandbox.append(assign("x = 1")).unwrap();

    sandbox.interrupt_handle().store(true, Ordering::SeqCst);
    match sandbox.execute() {
        Err(CommandError::Interrupted { command }) => assert_eq!(command, "x = 1;"),
        other => panic!("unexpected {other:?}"),
    }
    // Create and Global cannot be interrupted and ran
    assert!(sandbox.global_store().borrow().contains("x"));
    assert_eq!(value_of(&sandbox, "x"), 0.0);
    assert_eq!(publisher.borrow().runs_ended(), 1);
    assert_eq!(publisher.borrow().run_state(), RunState::Idle);

    // The flag is consumed by the interrupt
    assert!(!sandbox.interrupt_handle().load(Ordering::SeqCst));
    sandbox.execute().unwrap();
    assert_eq!(value_of(&sandbox, "x"), 1.0);
}

/// Never completes.
#[derive(Debug)]
struct Stalled;

impl Initializable for Stalled {
    fn initialize(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        Ok(true)
    }
}

impl Executable for Stalled {
    fn execute(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        Ok(false)
    }
}

impl Renameable for Stalled {
    fn rename_ref_object(&mut self, _: ObjectType, _: &str, _: &str) -> bool {
        true
    }
}

impl Serializable for Stalled {
    fn type_name(&self) -> &str {
        "Stalled"
    }

    fn generating_string(&self) -> String {
        "Stalled;".to_string()
    }
}

#[test]
fn incomplete_command() {
    let mut sandbox = Sandbox::new();
    sandbox.append(Command::custom(Box::new(Stalled))).unwrap();
    match sandbox.execute() {
        Err(CommandError::Incomplete { generating }) => assert_eq!(generating, "Stalled;"),
        other => panic!("unexpected {other:?}"),
    }
}

/// Fails whenever it runs.
#[derive(Debug)]
struct Failing;

impl Initializable for Failing {
    fn initialize(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        Ok(true)
    }
}

impl Executable for Failing {
    fn execute(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        Err(CommandError::InvalidCommand {
            command: "Failing".to_string(),
            details: "thruster offline".to_string(),
        })
    }
}

impl Renameable for Failing {
    fn rename_ref_object(&mut self, _: ObjectType, _: &str, _: &str) -> bool {
        true
    }
}

impl Serializable for Failing {
    fn type_name(&self) -> &str {
        "Failing"
    }

    fn generating_string(&self) -> String {
        "Failing;".to_string()
    }
}

fn loop_is_idle(sandbox: &Sandbox, id: CommandId) -> bool {
    let branch = match &sandbox.sequence().command(id).unwrap().kind {
        CommandKind::For(cmd) => &cmd.branch,
        CommandKind::SolverLoop(cmd) => &cmd.branch,
        other => panic!("not a loop: {other:?}"),
    };
    !branch.executing && !branch.branch_executing
}

fn assert_thruster_offline(rslt: Result<nyx::sandbox::RunReport, CommandError>) {
    match rslt {
        Err(CommandError::InvalidCommand { command, details }) => {
            assert_eq!(command, "Failing");
            assert_eq!(details, "thruster offline");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn body_errors_reach_the_driver() {
    init_logger();
    let publisher = RecordingPublisher::new().shared();
    let mut sandbox = Sandbox::with_publisher(publisher.clone());
    for name in ["I", "x"] {
        sandbox
            .add_object(SimObject::new(name, ObjectKind::Variable(0.0)))
            .unwrap();
    }
    let for_loop = sandbox
        .append(Command::new(For::from_str("I = 1:3").unwrap()))
        .unwrap();
    sandbox.append(assign("x = x + I")).unwrap();
    sandbox.append(Command::custom(Box::new(Failing))).unwrap();
    sandbox
        .append(Command::new(BranchEnd::new(EndKind::EndFor)))
        .unwrap();
    sandbox.append(assign("x = 100")).unwrap();

    assert_thruster_offline(sandbox.execute());
    // The first pass stopped at the failing command
    assert_eq!(value_of(&sandbox, "x"), 1.0);
    assert!(loop_is_idle(&sandbox, for_loop));
    assert_eq!(publisher.borrow().run_state(), RunState::Idle);
    assert_eq!(publisher.borrow().runs_ended(), 1);
}

#[test]
fn solver_loop_body_errors_reach_the_driver() {
    init_logger();
    let mut sandbox = Sandbox::new();
    sandbox
        .add_object(SimObject::new(
            "DC1",
            ObjectKind::Solver(Box::new(DifferentialCorrector::default())),
        ))
        .unwrap();
    for name in ["x", "y"] {
        sandbox
            .add_object(SimObject::new(name, ObjectKind::Variable(0.0)))
            .unwrap();
    }
    let target = sandbox
        .append(Command::new(SolverLoop::target("DC1")))
        .unwrap();
    sandbox
        .append(Command::new(Vary::from_str("DC1(x = 1)").unwrap()))
        .unwrap();
    sandbox.append(assign("y = x * x")).unwrap();
    sandbox.append(Command::custom(Box::new(Failing))).unwrap();
    sandbox
        .append(Command::new(Achieve::from_str("DC1(y = 4)").unwrap()))
        .unwrap();
    sandbox
        .append(Command::new(BranchEnd::new(EndKind::EndTarget)))
        .unwrap();

    assert_thruster_offline(sandbox.execute());
    assert!(loop_is_idle(&sandbox, target));
    // The nominal pass ran up to the failing command
    assert_eq!(value_of(&sandbox, "y"), 1.0);

    // Nothing is left checked out, the run can be repeated
    assert_thruster_offline(sandbox.execute());
    assert!(loop_is_idle(&sandbox, target));
}

#[test]
fn resources_from_yaml() {
    init_logger();
    let publisher = RecordingPublisher::new().shared();
    let mut sandbox = Sandbox::with_publisher(publisher.clone());
    let added = sandbox
        .add_resources(ResourcesRepr::loads(RESOURCES).unwrap())
        .unwrap();
    assert_eq!(added, 3);
    assert!(sandbox.global_store().borrow().contains("DC1"));

    sandbox.append(assign("Sat.X = 7000")).unwrap();
    sandbox
        .append(Command::new(
            SolverLoop::target("DC1").with_exit_mode(ExitMode::SaveAndContinue),
        ))
        .unwrap();
    sandbox
        .append(Command::new(
            Vary::from_str("DC1(Sat.VY = 7.35, {Perturbation = 1e-5})").unwrap(),
        ))
        .unwrap();
    sandbox.append(assign("Sat.VZ = Sat.VZ")).unwrap();
    sandbox
        .append(Command::new(
            Achieve::from_str("DC1(Sat.SMA = 8000, {Tolerance = 1e-6})").unwrap(),
        ))
        .unwrap();
    sandbox
        .append(Command::new(BranchEnd::new(EndKind::EndTarget)))
        .unwrap();
    sandbox.append(assign("r = Sat.SMA")).unwrap();

    let report = sandbox.execute().unwrap();
    assert!(report.ticks > 7);
    assert_abs_diff_eq!(value_of(&sandbox, "r"), 8000.0, epsilon = 1e-5);
    assert_abs_diff_eq!(value_of(&sandbox, "Sat.X"), 7000.0, epsilon = 1e-12);

    let publisher = publisher.borrow();
    // Both spacecraft assignments publish through the same provider
    assert_eq!(publisher.provider_count(), 1);
    assert_eq!(publisher.labels(0).unwrap().len(), 7);
    assert!(publisher.records().iter().all(|rec| rec.data.len() == 7));
    assert_eq!(publisher.records_in(RunState::Running).count(), 1);
    assert_eq!(publisher.records_in(RunState::SolvedPass).count(), 1);
    assert!(publisher.records_in(RunState::Solving).count() >= 2);
    assert_eq!(publisher.runs_ended(), 1);
}

#[test]
fn malformed_resources() {
    assert!(ResourcesRepr::loads("variables: [1, 2").is_err());
    let repr = ResourcesRepr::loads("variables:\n  x: 1.0\nglobals: [y]\n").unwrap();
    let mut sandbox = Sandbox::new();
    assert!(sandbox.add_resources(repr).is_err());
    assert!(sandbox.local_store().borrow().is_empty());
}

#[test]
fn clear_and_rerun() {
    let mut sandbox = Sandbox::new();
    sandbox
        .add_object(nyx::store::SimObject::new("x", ObjectKind::Variable(0.0)))
        .unwrap();
    sandbox.append(assign("x = x + 1")).unwrap();
    sandbox.execute().unwrap();
    sandbox.execute().unwrap();
    assert_eq!(value_of(&sandbox, "x"), 2.0);
    assert_eq!(sandbox.sequence().len(), 1);

    sandbox.clear();
    assert!(sandbox.sequence().is_empty());
    assert_eq!(sandbox.execute().unwrap().ticks, 0);
}
