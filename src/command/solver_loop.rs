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

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use enum_iterator::Sequence;
use snafu::prelude::*;

use super::{BranchState, Context, EndKind, Executable, Initializable, Renameable, Serializable};
use crate::errors::{
    CommandError, InvalidCommandSnafu, MissingContextSnafu, NotImplementedSnafu, SolverFailureSnafu,
    TypeMismatchSnafu,
};
use crate::md::ParamError;
use crate::publisher::RunState;
use crate::solvers::{SharedSolver, SolverAction, SolverKind, SolverState};
use crate::store::{LoopSnapshot, ObjectKind, ObjectType};

/// The two solver loops: Target drives a targeter, Optimize drives an optimizer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Sequence)]
pub enum SolverLoopKind {
    Target,
    Optimize,
}

impl SolverLoopKind {
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Target => "Target",
            Self::Optimize => "Optimize",
        }
    }

    pub const fn end_kind(&self) -> EndKind {
        match self {
            Self::Target => EndKind::EndTarget,
            Self::Optimize => EndKind::EndOptimize,
        }
    }

    /// Kind of solver this loop accepts
    pub const fn solver_kind(&self) -> SolverKind {
        match self {
            Self::Target => SolverKind::Targeter,
            Self::Optimize => SolverKind::Optimizer,
        }
    }
}

/// How the loop is run when entered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Sequence)]
pub enum StartMode {
    /// Runs the body once with the initial guesses, without iterating
    RunInitialGuess,
    /// Iterates until the solver finishes, then runs the solved pass
    #[default]
    RunAndSolve,
    /// Replays a previously solved answer
    RunSolution,
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunInitialGuess => write!(f, "RunInitialGuess"),
            Self::RunAndSolve => write!(f, "Solve"),
            Self::RunSolution => write!(f, "RunCorrected"),
        }
    }
}

impl FromStr for StartMode {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "RunInitialGuess" => Ok(Self::RunInitialGuess),
            "Solve" | "RunAndSolve" => Ok(Self::RunAndSolve),
            "RunCorrected" | "RunSolution" => Ok(Self::RunSolution),
            _ => Err(ParamError::Parse {
                text: s.to_string(),
                reason: "unknown solve mode".to_string(),
            }),
        }
    }
}

/// What happens to the objects and the solution once the solver finished.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Sequence)]
pub enum ExitMode {
    /// Restores the objects to their state before the first pass, and forgets the solution
    #[default]
    DiscardAndContinue,
    /// Keeps the objects as the last pass left them, and reuses the solution as the next initial guess
    SaveAndContinue,
    /// Keeps the objects and stops the run
    Stop,
}

impl fmt::Display for ExitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiscardAndContinue => write!(f, "DiscardAndContinue"),
            Self::SaveAndContinue => write!(f, "SaveAndContinue"),
            Self::Stop => write!(f, "Stop"),
        }
    }
}

impl FromStr for ExitMode {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "DiscardAndContinue" => Ok(Self::DiscardAndContinue),
            "SaveAndContinue" => Ok(Self::SaveAndContinue),
            "Stop" => Ok(Self::Stop),
            _ => Err(ParamError::Parse {
                text: s.to_string(),
                reason: "unknown exit mode".to_string(),
            }),
        }
    }
}

/// Target and Optimize: runs its body as many times as the solver asks for.
///
/// The solver named by the loop is cloned at initialization and shared with the
/// Vary, Achieve, Minimize and NonlinearConstraint commands of the body through weak
/// handles: the loop is the only owner of the clone, the catalog solver is never modified.
///
/// Every call to `execute` is one tick of the solver state machine:
/// + INITIALIZING runs the ports of the body once so that they register their settings
///   and initial guesses, then captures the baseline state of the spacecraft;
/// + NOMINAL and PERTURBING restore the baseline and start a pass of the body, which then
///   runs one command per tick;
/// + CHECKINGRUN and CALCULATING leave all the work to the solver;
/// + FINISHED restores the baseline and runs the solved pass, after which the loop applies
///   its exit mode and hands control to the next command.
///
/// A callback driven optimizer reports ITERATING instead of NOMINAL and PERTURBING, and
/// expects a complete pass of the body within the tick.
#[derive(Clone, Debug)]
pub struct SolverLoop {
    pub loop_kind: SolverLoopKind,
    pub solver_name: String,
    pub start_mode: StartMode,
    pub exit_mode: ExitMode,
    pub branch: BranchState,
    solver: Option<SharedSolver>,
    baseline: LoopSnapshot,
    saved_guesses: Vec<f64>,
    converged: bool,
    stop_requested: bool,
    passes: usize,
}

impl SolverLoop {
    pub fn new(loop_kind: SolverLoopKind, solver_name: &str) -> Self {
        Self {
            loop_kind,
            solver_name: solver_name.to_string(),
            start_mode: StartMode::default(),
            exit_mode: ExitMode::default(),
            branch: BranchState::default(),
            solver: None,
            baseline: LoopSnapshot::default(),
            saved_guesses: Vec::new(),
            converged: false,
            stop_requested: false,
            passes: 0,
        }
    }

    pub fn target(solver_name: &str) -> Self {
        Self::new(SolverLoopKind::Target, solver_name)
    }

    pub fn optimize(solver_name: &str) -> Self {
        Self::new(SolverLoopKind::Optimize, solver_name)
    }

    pub fn with_start_mode(mut self, start_mode: StartMode) -> Self {
        self.start_mode = start_mode;
        self
    }

    pub fn with_exit_mode(mut self, exit_mode: ExitMode) -> Self {
        self.exit_mode = exit_mode;
        self
    }

    /// The clone of the solver owned by this loop, once initialized
    pub fn solver(&self) -> Option<&SharedSolver> {
        self.solver.as_ref()
    }

    /// Whether the solver converged on the last run of the loop
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Set once the loop finished in Stop exit mode, until the run completes
    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Number of passes of the body started since the loop was entered, the solved pass included
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Variable values kept by SaveAndContinue for the next time the loop is entered
    pub fn saved_guesses(&self) -> &[f64] {
        &self.saved_guesses
    }

    fn shared_solver(&self) -> Result<SharedSolver, CommandError> {
        self.solver.clone().context(MissingContextSnafu {
            command: self.loop_kind.type_name(),
            missing: "solver",
        })
    }

    fn restore_baseline(&self) -> Result<(), CommandError> {
        self.baseline.restore().context(TypeMismatchSnafu {
            command: self.loop_kind.type_name(),
        })
    }

    fn start_pass(&mut self) -> Result<(), CommandError> {
        self.restore_baseline()?;
        self.passes += 1;
        self.branch.branch_executing = true;
        Ok(())
    }

    /// Executes the solver ports of the body, once, in order.
    fn prime_ports(&mut self, ctx: &mut Context<'_>) -> Result<(), CommandError> {
        let mut cur = self.branch.branch(0);
        while let Some(id) = cur {
            if id == ctx.id {
                break;
            }
            let is_port = ctx
                .seq
                .command(id)
                .map_or(false, |cmd| cmd.kind.is_solver_port());
            if is_port {
                ctx.seq.execute(id)?;
            }
            cur = ctx.seq.get_next(id)?;
        }
        Ok(())
    }

    fn complete_loop(&mut self, ctx: &mut Context<'_>, solver: &SharedSolver) -> Result<(), CommandError> {
        let command = self.loop_kind.type_name();
        self.branch.complete = true;
        let mut solver = solver.borrow_mut();
        solver.finalize().context(SolverFailureSnafu { command })?;
        match self.exit_mode {
            ExitMode::DiscardAndContinue => {
                self.restore_baseline()?;
                self.saved_guesses.clear();
            }
            ExitMode::SaveAndContinue => self.saved_guesses = solver.variable_values(),
            ExitMode::Stop => self.stop_requested = true,
        }
        if self.start_mode == StartMode::RunInitialGuess {
            info!("{command} {} ran its initial guess", self.solver_name);
        } else if self.converged {
            info!(
                "{command} {} converged after {} iterations ({} passes)",
                self.solver_name,
                solver.iterations(),
                self.passes
            );
        } else {
            warn!(
                "{command} {} did NOT converge after {} iterations",
                self.solver_name,
                solver.iterations()
            );
        }
        ctx.set_run_state(RunState::Running);
        Ok(())
    }
}

impl Default for SolverLoop {
    fn default() -> Self {
        Self::target("")
    }
}

impl Initializable for SolverLoop {
    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let command = self.loop_kind.type_name();
        let obj = ctx.scope().resolve(command, &self.solver_name)?;
        let mut solver = match &obj.borrow().kind {
            ObjectKind::Solver(solver) => solver.clone(),
            other => {
                return InvalidCommandSnafu {
                    command,
                    details: format!("`{}` is a {}, not a solver", self.solver_name, other.type_name()),
                }
                .fail()
            }
        };
        ensure!(
            solver.kind() == self.loop_kind.solver_kind(),
            InvalidCommandSnafu {
                command,
                details: format!(
                    "{} `{}` cannot be driven by {command}",
                    solver.type_name(),
                    self.solver_name
                ),
            }
        );
        solver
            .take_action(SolverAction::IncrementInstanceCount)
            .context(SolverFailureSnafu { command })?;

        // Replaces the clone of a previous initialization, the ports drop their stale handles when rebound
        let shared: SharedSolver = Rc::new(RefCell::new(solver));
        let weak = Rc::downgrade(&shared);
        for entry in self.branch.branches.iter().flatten() {
            ctx.seq.bind_solver_chain(*entry, &self.solver_name, &weak);
        }
        self.solver = Some(shared.clone());

        self.branch.initialize_branches(ctx)?;
        shared
            .borrow_mut()
            .initialize()
            .context(SolverFailureSnafu { command })?;
        self.branch.reset();
        self.converged = false;
        self.stop_requested = false;
        self.passes = 0;
        debug!(
            "{command} {} initialized with {} variables and {} results",
            self.solver_name,
            shared.borrow().variable_count(),
            shared.borrow().result_count()
        );
        Ok(true)
    }
}

impl Executable for SolverLoop {
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let command = self.loop_kind.type_name();
        let solver = self.shared_solver()?;
        let mut state = solver.borrow().state();

        if self.branch.complete {
            self.branch.complete = false;
            self.branch.executing = false;
        }

        if !self.branch.executing {
            ensure!(
                self.start_mode != StartMode::RunSolution,
                NotImplementedSnafu {
                    command,
                    feature: "SolveMode = RunCorrected",
                }
            );
            self.baseline = LoopSnapshot::capture(ctx.scope());
            self.branch.executing = true;
            self.converged = false;
            self.stop_requested = false;
            self.passes = 0;
            solver
                .borrow_mut()
                .take_action(SolverAction::Reset)
                .context(SolverFailureSnafu { command })?;
            state = solver.borrow().state();
        }

        let mut done = true;
        if self.branch.branch_executing {
            done = self.branch.execute_branch(ctx, 0)?;
            if !self.branch.branch_executing
                && (state == SolverState::Finished
                    || (self.start_mode == StartMode::RunInitialGuess && state == SolverState::Nominal))
            {
                self.complete_loop(ctx, &solver)?;
            }
        } else {
            ctx.set_run_state(RunState::Solving);
            match state {
                SolverState::Initializing => {
                    self.prime_ports(ctx)?;
                    let mut solver = solver.borrow_mut();
                    if !self.saved_guesses.is_empty() && self.saved_guesses.len() == solver.variable_count() {
                        debug!("{command} {} starts from its saved solution", self.solver_name);
                        for (index, value) in self.saved_guesses.iter().enumerate() {
                            solver
                                .set_variable_initial(index, *value)
                                .context(SolverFailureSnafu { command })?;
                        }
                    }
                    self.baseline = LoopSnapshot::capture(ctx.scope());
                }
                SolverState::Nominal | SolverState::Perturbing => self.start_pass()?,
                SolverState::CheckingRun | SolverState::Calculating => {}
                SolverState::Finished => {
                    self.converged = solver.borrow().converged();
                    self.start_pass()?;
                    ctx.set_run_state(RunState::SolvedPass);
                }
                SolverState::Iterating => match self.loop_kind {
                    SolverLoopKind::Target => {
                        return InvalidCommandSnafu {
                            command,
                            details: "invalid state ITERATING in the targeter state machine",
                        }
                        .fail()
                    }
                    SolverLoopKind::Optimize => {
                        self.start_pass()?;
                        done = self.branch.run_branch_pass(ctx, 0)?;
                    }
                },
            }
        }

        if !self.branch.branch_executing && !self.branch.complete {
            let next = solver
                .borrow_mut()
                .advance_state()
                .context(SolverFailureSnafu { command })?;
            if next == SolverState::Finished {
                self.converged = solver.borrow().converged();
            }
        }
        Ok(done)
    }

    fn run_complete(&mut self, ctx: &mut Context<'_>) {
        if self.branch.executing && !self.branch.complete {
            if let Some(solver) = &self.solver {
                if let Err(e) = solver.borrow_mut().finalize() {
                    warn!("{} {}: {e}", self.loop_kind.type_name(), self.solver_name);
                }
            }
        }
        self.stop_requested = false;
        self.branch.run_complete(ctx);
    }
}

impl Renameable for SolverLoop {
    fn rename_ref_object(&mut self, obj_type: ObjectType, old_name: &str, new_name: &str) -> bool {
        if obj_type == ObjectType::Solver && self.solver_name == old_name {
            self.solver_name = new_name.to_string();
        }
        true
    }
}

impl Serializable for SolverLoop {
    fn type_name(&self) -> &str {
        self.loop_kind.type_name()
    }

    fn generating_string(&self) -> String {
        format!(
            "{} {} {{SolveMode = {}, ExitMode = {}}};",
            self.loop_kind.type_name(),
            self.solver_name,
            self.start_mode,
            self.exit_mode
        )
    }
}
