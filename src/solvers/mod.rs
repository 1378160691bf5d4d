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
use std::rc::{Rc, Weak};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use typed_builder::TypedBuilder;

use crate::md::ParamError;

mod diffcorr;
pub use diffcorr::DifferentialCorrector;

mod gradient;
pub use gradient::GradientDescent;

/// Stand-in for an unbounded value in scripts
pub const UNBOUNDED: f64 = 9.999e300;

#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SolverError {
    #[snafu(display("{solver} needs at least one variable and one result, got {variables} and {results}"))]
    NoVariablesOrGoals {
        solver: &'static str,
        variables: usize,
        results: usize,
    },
    #[snafu(display("{goals} goals cannot be achieved with only {variables} variables"))]
    MoreGoalsThanVariables { goals: usize, variables: usize },
    #[snafu(display("variable index {index} out of range, {count} variables registered"))]
    VariableIndex { index: usize, count: usize },
    #[snafu(display("result index {index} out of range, {count} results registered"))]
    ResultIndex { index: usize, count: usize },
    #[snafu(display("variable `{name}` is invalid: {reason}"))]
    InvalidVariable { name: String, reason: String },
    #[snafu(display("{solver} does not accept {result}"))]
    InvalidResult { solver: &'static str, result: String },
    #[snafu(display("jacobian is singular, cannot compute the next step"))]
    SingularJacobian,
    #[snafu(display("{solver} cannot {operation} while {state}"))]
    InvalidState {
        solver: &'static str,
        operation: &'static str,
        state: SolverState,
    },
    #[snafu(display("{solver} used before initialization"))]
    NotInitialized { solver: &'static str },
}

/// The state machine cursor shared by every solver.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverState {
    #[default]
    Initializing,
    Nominal,
    Perturbing,
    Calculating,
    CheckingRun,
    /// Requests a complete run of the loop body from a callback driven solver
    Iterating,
    Finished,
}

impl fmt::Display for SolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Initializing => "INITIALIZING",
            Self::Nominal => "NOMINAL",
            Self::Perturbing => "PERTURBING",
            Self::Calculating => "CALCULATING",
            Self::CheckingRun => "CHECKINGRUN",
            Self::Iterating => "ITERATING",
            Self::Finished => "FINISHED",
        };
        write!(f, "{repr}")
    }
}

/// Out of band requests a solver loop makes to its solver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SolverAction {
    /// Re-arm the state machine to INITIALIZING
    Reset,
    IncrementInstanceCount,
}

impl FromStr for SolverAction {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Reset" => Ok(Self::Reset),
            "IncrementInstanceCount" => Ok(Self::IncrementInstanceCount),
            _ => Err(ParamError::Parse {
                text: s.to_string(),
                reason: "unknown solver action".to_string(),
            }),
        }
    }
}

/// Targeters drive goals to their values, optimizers minimize an objective.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SolverKind {
    Targeter,
    Optimizer,
}

/// A variable the solver adjusts, with the settings a Vary command provides.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[builder(doc)]
pub struct VariableSpec {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default = 0.0)]
    pub initial: f64,
    #[builder(default = 1e-4)]
    pub perturbation: f64,
    #[builder(default = -UNBOUNDED)]
    pub lower: f64,
    #[builder(default = UNBOUNDED)]
    pub upper: f64,
    #[builder(default = UNBOUNDED)]
    pub max_step: f64,
    #[builder(default = 0.0)]
    pub additive_scale: f64,
    #[builder(default = 1.0)]
    pub multiplicative_scale: f64,
}

impl VariableSpec {
    /// Returns an error if the settings cannot be used by a solver
    pub fn valid(&self) -> Result<(), SolverError> {
        let invalid = |reason: &str| {
            InvalidVariableSnafu {
                name: self.name.clone(),
                reason,
            }
            .fail()
        };
        if self.perturbation == 0.0 {
            return invalid("perturbation must be non zero");
        }
        if self.lower >= self.upper {
            return invalid("lower bound must be less than the upper bound");
        }
        if self.max_step <= 0.0 {
            return invalid("maximum step must be positive");
        }
        if self.multiplicative_scale == 0.0 {
            return invalid("multiplicative scale factor must be non zero");
        }
        Ok(())
    }

    /// Clamps the value within the bounds
    pub fn apply_bounds(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }

    /// Clamps the step to the maximum step
    pub fn apply_max_step(&self, step: f64) -> f64 {
        step.clamp(-self.max_step, self.max_step)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    Equality,
    LessThan,
    GreaterThan,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equality => write!(f, "="),
            Self::LessThan => write!(f, "<="),
            Self::GreaterThan => write!(f, ">="),
        }
    }
}

/// A quantity a command reports to the solver after every pass.
#[derive(Clone, Debug, PartialEq)]
pub enum ResultSpec {
    /// Targeter goal with its tolerance
    Goal {
        name: String,
        value: f64,
        tolerance: f64,
    },
    /// Optimizer cost function
    Objective { name: String },
    /// Optimizer constraint
    Constraint {
        name: String,
        kind: ConstraintKind,
        value: f64,
        tolerance: f64,
    },
}

impl ResultSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Goal { name, .. } | Self::Objective { name } | Self::Constraint { name, .. } => {
                name
            }
        }
    }
}

impl fmt::Display for ResultSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Goal { name, value, .. } => write!(f, "goal {name} = {value}"),
            Self::Objective { name } => write!(f, "objective {name}"),
            Self::Constraint {
                name, kind, value, ..
            } => write!(f, "constraint {name} {kind} {value}"),
        }
    }
}

/// The numeric engine embedded in a solver loop.
///
/// The loop command only drives the state machine: it runs the loop body when the
/// solver is NOMINAL, PERTURBING or ITERATING, and calls `advance_state` otherwise.
pub trait Solver: fmt::Debug {
    fn clone_box(&self) -> Box<dyn Solver>;

    /// Script type name of this solver, e.g. `DifferentialCorrector`
    fn type_name(&self) -> &'static str;

    fn kind(&self) -> SolverKind;

    fn state(&self) -> SolverState;

    /// Callback driven solvers report ITERATING and expect a full body pass per call.
    fn requires_callback(&self) -> bool {
        false
    }

    /// Registers a variable, returning its index. Registering the same name again updates it in place.
    fn register_variable(&mut self, spec: VariableSpec) -> Result<usize, SolverError>;

    /// Registers a result, returning its index. Registering the same name again updates it in place.
    fn register_result(&mut self, spec: ResultSpec) -> Result<usize, SolverError>;

    fn variable_count(&self) -> usize;

    fn result_count(&self) -> usize;

    /// Sizes the internal buffers once variables and results are registered.
    fn initialize(&mut self) -> Result<(), SolverError>;

    fn take_action(&mut self, action: SolverAction) -> Result<(), SolverError>;

    /// Moves the state machine forward after the loop body ran (or did not need to)
    fn advance_state(&mut self) -> Result<SolverState, SolverError>;

    fn set_variable_initial(&mut self, index: usize, value: f64) -> Result<(), SolverError>;

    /// Current value of the variable for the pass being run
    fn variable_value(&self, index: usize) -> Result<f64, SolverError>;

    fn variable_values(&self) -> Vec<f64>;

    /// Updates the desired value of a goal or constraint
    fn set_result_goal(&mut self, index: usize, value: f64) -> Result<(), SolverError>;

    /// Reports the value achieved by the pass being run
    fn set_result_value(&mut self, index: usize, value: f64) -> Result<(), SolverError>;

    fn converged(&self) -> bool;

    fn iterations(&self) -> usize;

    fn finalize(&mut self) -> Result<(), SolverError>;

    /// A one line progress report
    fn progress(&self) -> String;
}

impl Clone for Box<dyn Solver> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// The cloned solver of a loop, shared with the commands of its body through weak handles.
pub type SharedSolver = Rc<RefCell<Box<dyn Solver>>>;

/// Handle a port command keeps on the solver of its loop.
pub type WeakSolver = Weak<RefCell<Box<dyn Solver>>>;

pub(crate) fn check_index(index: usize, count: usize, variable: bool) -> Result<(), SolverError> {
    if index < count {
        Ok(())
    } else if variable {
        VariableIndexSnafu { index, count }.fail()
    } else {
        ResultIndexSnafu { index, count }.fail()
    }
}
