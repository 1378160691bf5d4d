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

use snafu::prelude::*;

use super::{
    bound_solver, parse_port, split_settings, Context, Executable, Initializable, Renameable,
    Serializable,
};
use crate::errors::{CommandError, MissingContextSnafu, SolverFailureSnafu};
use crate::md::{Expr, ParamError};
use crate::solvers::{ConstraintKind, ResultSpec, SolverState, WeakSolver};
use crate::store::ObjectType;

/// Declares a constraint of the enclosing Optimize loop, `lhs <= rhs`, `lhs >= rhs` or `lhs = rhs`.
///
/// The right hand side is the desired value, evaluated once per loop entry. The left hand
/// side is reported after every pass.
#[derive(Clone, Debug)]
pub struct NonlinearConstraint {
    pub solver_name: String,
    pub lhs: Expr,
    pub kind: ConstraintKind,
    pub rhs: Expr,
    /// Violations up to this value are ignored
    pub tolerance: f64,
    solver: Option<WeakSolver>,
    index: Option<usize>,
}

impl Default for NonlinearConstraint {
    fn default() -> Self {
        Self::new("", Expr::default(), ConstraintKind::Equality, Expr::default())
    }
}

impl NonlinearConstraint {
    pub fn new(solver_name: &str, lhs: impl Into<Expr>, kind: ConstraintKind, rhs: impl Into<Expr>) -> Self {
        Self {
            solver_name: solver_name.to_string(),
            lhs: lhs.into(),
            kind,
            rhs: rhs.into(),
            tolerance: 0.0,
            solver: None,
            index: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn bind(&mut self, solver: WeakSolver) {
        self.solver = Some(solver);
        self.index = None;
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

impl FromStr for NonlinearConstraint {
    type Err = ParamError;

    /// Parses `OPT(Sat.RMAG <= 7000, {Tolerance = 1e-3})`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (solver_name, args) = parse_port(s)?;
        let (head, settings) = split_settings(&args)?;
        let (lhs, kind, rhs) = if let Some((lhs, rhs)) = head.split_once("<=") {
            (lhs, ConstraintKind::LessThan, rhs)
        } else if let Some((lhs, rhs)) = head.split_once(">=") {
            (lhs, ConstraintKind::GreaterThan, rhs)
        } else if let Some((lhs, rhs)) = head.split_once('=') {
            (lhs, ConstraintKind::Equality, rhs)
        } else {
            return Err(ParamError::Parse {
                text: s.to_string(),
                reason: "expected `lhs <= rhs`, `lhs >= rhs` or `lhs = rhs`".to_string(),
            });
        };
        let mut me = Self::new(&solver_name, Expr::from_str(lhs)?, kind, Expr::from_str(rhs)?);
        for (key, value) in settings {
            match key.as_str() {
                "Tolerance" => me.tolerance = value,
                _ => {
                    return Err(ParamError::Parse {
                        text: key,
                        reason: "unknown NonlinearConstraint setting".to_string(),
                    })
                }
            }
        }
        Ok(me)
    }
}

impl Initializable for NonlinearConstraint {
    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let solver = bound_solver(self.solver.as_ref(), "NonlinearConstraint")?;
        self.lhs.validate(ctx.scope(), "NonlinearConstraint")?;
        self.rhs.validate(ctx.scope(), "NonlinearConstraint")?;
        let spec = ResultSpec::Constraint {
            name: self.lhs.to_string(),
            kind: self.kind,
            value: self.rhs.constant().unwrap_or(0.0),
            tolerance: self.tolerance,
        };
        let index = solver
            .borrow_mut()
            .register_result(spec)
            .context(SolverFailureSnafu {
                command: "NonlinearConstraint",
            })?;
        self.index = Some(index);
        Ok(true)
    }
}

impl Executable for NonlinearConstraint {
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let command = "NonlinearConstraint";
        let solver = bound_solver(self.solver.as_ref(), command)?;
        let index = self.index.context(MissingContextSnafu {
            command,
            missing: "constraint registration",
        })?;
        let rslt = if solver.borrow().state() == SolverState::Initializing {
            let desired = self.rhs.eval(ctx.scope(), command)?;
            solver.borrow_mut().set_result_goal(index, desired)
        } else {
            let achieved = self.lhs.eval(ctx.scope(), command)?;
            solver.borrow_mut().set_result_value(index, achieved)
        };
        rslt.context(SolverFailureSnafu { command })?;
        Ok(true)
    }
}

impl Renameable for NonlinearConstraint {
    fn rename_ref_object(&mut self, obj_type: ObjectType, old_name: &str, new_name: &str) -> bool {
        if obj_type == ObjectType::Solver {
            if self.solver_name == old_name {
                self.solver_name = new_name.to_string();
            }
        } else {
            self.lhs.rename(old_name, new_name);
            self.rhs.rename(old_name, new_name);
        }
        true
    }
}

impl Serializable for NonlinearConstraint {
    fn type_name(&self) -> &str {
        "NonlinearConstraint"
    }

    fn generating_string(&self) -> String {
        format!(
            "NonlinearConstraint {}({} {} {});",
            self.solver_name, self.lhs, self.kind, self.rhs
        )
    }
}
