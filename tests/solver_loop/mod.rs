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

mod optimize;
mod targeting;

use std::cell::RefCell;
use std::rc::Rc;

use nyx::command::{
    Command, CommandKind, Context, EndKind, Executable, Initializable, Renameable,
    Serializable, SolverLoop,
};
use nyx::publisher::{RecordingPublisher, RunState};
use nyx::solvers::{
    ResultSpec, Solver, SolverAction, SolverError, SolverKind, SolverState, VariableSpec,
};
use nyx::store::{ObjectKind, ObjectType, SimObject};
use nyx::{CommandError, CommandId, Sandbox};

use crate::{end, init_logger};

/// Walks a fixed list of states, whatever the loop body reports.
#[derive(Clone, Debug)]
struct ScriptedSolver {
    script: Vec<SolverState>,
    cursor: usize,
    state: SolverState,
}

impl ScriptedSolver {
    fn new(script: &[SolverState]) -> Self {
        Self {
            script: script.to_vec(),
            cursor: 0,
            state: SolverState::Initializing,
        }
    }
}

impl Solver for ScriptedSolver {
    fn clone_box(&self) -> Box<dyn Solver> {
        Box::new(self.clone())
    }

    fn type_name(&self) -> &'static str {
        "ScriptedSolver"
    }

    fn kind(&self) -> SolverKind {
        SolverKind::Targeter
    }

    fn state(&self) -> SolverState {
        self.state
    }

    fn register_variable(&mut self, _spec: VariableSpec) -> Result<usize, SolverError> {
        Ok(0)
    }

    fn register_result(&mut self, _spec: ResultSpec) -> Result<usize, SolverError> {
        Ok(0)
    }

    fn variable_count(&self) -> usize {
        0
    }

    fn result_count(&self) -> usize {
        0
    }

    fn initialize(&mut self) -> Result<(), SolverError> {
        Ok(())
    }

    fn take_action(&mut self, action: SolverAction) -> Result<(), SolverError> {
        if action == SolverAction::Reset {
            self.state = SolverState::Initializing;
            self.cursor = 0;
        }
        Ok(())
    }

    fn advance_state(&mut self) -> Result<SolverState, SolverError> {
        if self.state != SolverState::Initializing {
            self.cursor = (self.cursor + 1).min(self.script.len() - 1);
        }
        self.state = self.script[self.cursor];
        Ok(self.state)
    }

    fn set_variable_initial(&mut self, _index: usize, _value: f64) -> Result<(), SolverError> {
        Ok(())
    }

    fn variable_value(&self, _index: usize) -> Result<f64, SolverError> {
        Ok(0.0)
    }

    fn variable_values(&self) -> Vec<f64> {
        Vec::new()
    }

    fn set_result_goal(&mut self, _index: usize, _value: f64) -> Result<(), SolverError> {
        Ok(())
    }

    fn set_result_value(&mut self, _index: usize, _value: f64) -> Result<(), SolverError> {
        Ok(())
    }

    fn converged(&self) -> bool {
        self.state == SolverState::Finished
    }

    fn iterations(&self) -> usize {
        1
    }

    fn finalize(&mut self) -> Result<(), SolverError> {
        Ok(())
    }

    fn progress(&self) -> String {
        format!("{} at {}", self.type_name(), self.state)
    }
}

/// Records the run state of the publisher every time it executes.
#[derive(Debug)]
struct StateRecorder {
    seen: Rc<RefCell<Vec<RunState>>>,
}

impl Initializable for StateRecorder {
    fn initialize(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        Ok(true)
    }
}

impl Executable for StateRecorder {
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let state = ctx
            .publisher()
            .map_or(RunState::Idle, |publisher| publisher.borrow().run_state());
        self.seen.borrow_mut().push(state);
        Ok(true)
    }
}

impl Renameable for StateRecorder {
    fn rename_ref_object(&mut self, _: ObjectType, _: &str, _: &str) -> bool {
        true
    }
}

impl Serializable for StateRecorder {
    fn type_name(&self) -> &str {
        "StateRecorder"
    }

    fn generating_string(&self) -> String {
        "StateRecorder;".to_string()
    }
}

/// The solver loop command at `id`
pub fn solver_loop(sandbox: &Sandbox, id: CommandId) -> &SolverLoop {
    match &sandbox.sequence().command(id).unwrap().kind {
        CommandKind::SolverLoop(cmd) => cmd,
        other => panic!("not a solver loop: {other:?}"),
    }
}

#[test]
fn scripted_state_machine() {
    init_logger();
    use SolverState::*;
    let publisher = RecordingPublisher::new().shared();
    let mut sandbox = Sandbox::with_publisher(publisher.clone());
    let stub = ScriptedSolver::new(&[Nominal, Perturbing, Perturbing, CheckingRun, Calculating, Finished]);
    sandbox
        .add_object(SimObject::new("Stub", ObjectKind::Solver(Box::new(stub))))
        .unwrap();

    let body = Rc::new(RefCell::new(Vec::new()));
    let after = Rc::new(RefCell::new(Vec::new()));
    let target = sandbox.append(Command::new(SolverLoop::target("Stub"))).unwrap();
    sandbox
        .append(Command::custom(Box::new(StateRecorder { seen: body.clone() })))
        .unwrap();
    sandbox.append(end(EndKind::EndTarget)).unwrap();
    sandbox
        .append(Command::custom(Box::new(StateRecorder { seen: after.clone() })))
        .unwrap();

    sandbox.execute().unwrap();

    // Three trial passes (nominal and two perturbations) then the solved pass
    assert_eq!(
        *body.borrow(),
        vec![RunState::Solving, RunState::Solving, RunState::Solving, RunState::SolvedPass]
    );
    assert_eq!(*after.borrow(), vec![RunState::Running]);
    let cmd = solver_loop(&sandbox, target);
    assert_eq!(cmd.passes(), 4);
    assert!(cmd.converged());

    let publisher = publisher.borrow();
    assert_eq!(
        publisher.state_history(),
        &[
            RunState::Running,
            RunState::Solving,
            RunState::SolvedPass,
            RunState::Running,
            RunState::Idle
        ]
    );
    assert_eq!(publisher.runs_ended(), 1);
}
