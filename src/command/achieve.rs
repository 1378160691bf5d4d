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
use crate::md::{fmt_real, Expr, ParamError};
use crate::solvers::{ResultSpec, SolverState, WeakSolver};
use crate::store::ObjectType;

/// Declares a goal of the enclosing Target loop and reports the achieved value after every pass.
#[derive(Clone, Debug)]
pub struct Achieve {
    pub solver_name: String,
    pub achieved: Expr,
    pub goal: Expr,
    pub tolerance: f64,
    solver: Option<WeakSolver>,
    index: Option<usize>,
}

impl Default for Achieve {
    fn default() -> Self {
        Self::new("", Expr::default(), 0.0)
    }
}

impl Achieve {
    pub const DEFAULT_TOLERANCE: f64 = 0.1;

    pub fn new(solver_name: &str, achieved: impl Into<Expr>, goal: impl Into<Expr>) -> Self {
        Self {
            solver_name: solver_name.to_string(),
            achieved: achieved.into(),
            goal: goal.into(),
            tolerance: Self::DEFAULT_TOLERANCE,
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

impl FromStr for Achieve {
    type Err = ParamError;

    /// Parses `DC1(Sat.SMA = 42165, {Tolerance = 0.1})`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (solver_name, args) = parse_port(s)?;
        let (head, settings) = split_settings(&args)?;
        let (achieved, goal) = head.split_once('=').ok_or_else(|| ParamError::Parse {
            text: s.to_string(),
            reason: "expected `parameter = goal`".to_string(),
        })?;
        let mut me = Self::new(&solver_name, Expr::from_str(achieved)?, Expr::from_str(goal)?);
        for (key, value) in settings {
            match key.as_str() {
                "Tolerance" => me.tolerance = value,
                _ => {
                    return Err(ParamError::Parse {
                        text: key,
                        reason: "unknown Achieve setting".to_string(),
                    })
                }
            }
        }
        Ok(me)
    }
}

impl Initializable for Achieve {
    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let solver = bound_solver(self.solver.as_ref(), "Achieve")?;
        self.achieved.validate(ctx.scope(), "Achieve")?;
        self.goal.validate(ctx.scope(), "Achieve")?;
        let spec = ResultSpec::Goal {
            name: self.achieved.to_string(),
            value: self.goal.constant().unwrap_or(0.0),
            tolerance: self.tolerance,
        };
        let index = solver
            .borrow_mut()
            .register_result(spec)
            .context(SolverFailureSnafu { command: "Achieve" })?;
        self.index = Some(index);
        Ok(true)
    }
}

impl Executable for Achieve {
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let solver = bound_solver(self.solver.as_ref(), "Achieve")?;
        let index = self.index.context(MissingContextSnafu {
            command: "Achieve",
            missing: "goal registration",
        })?;
        // The goal may reference objects, it is evaluated once per loop entry
        let rslt = if solver.borrow().state() == SolverState::Initializing {
            let goal = self.goal.eval(ctx.scope(), "Achieve")?;
            solver.borrow_mut().set_result_goal(index, goal)
        } else {
            let achieved = self.achieved.eval(ctx.scope(), "Achieve")?;
            solver.borrow_mut().set_result_value(index, achieved)
        };
        rslt.context(SolverFailureSnafu { command: "Achieve" })?;
        Ok(true)
    }
}

impl Renameable for Achieve {
    fn rename_ref_object(&mut self, obj_type: ObjectType, old_name: &str, new_name: &str) -> bool {
        if obj_type == ObjectType::Solver {
            if self.solver_name == old_name {
                self.solver_name = new_name.to_string();
            }
        } else {
            self.achieved.rename(old_name, new_name);
            self.goal.rename(old_name, new_name);
        }
        true
    }
}

impl Serializable for Achieve {
    fn type_name(&self) -> &str {
        "Achieve"
    }

    fn generating_string(&self) -> String {
        format!(
            "Achieve {}({} = {}, {{Tolerance = {}}});",
            self.solver_name,
            self.achieved,
            self.goal,
            fmt_real(self.tolerance)
        )
    }
}
