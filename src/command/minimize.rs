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

use super::{bound_solver, parse_port, Context, Executable, Initializable, Renameable, Serializable};
use crate::errors::{CommandError, MissingContextSnafu, SolverFailureSnafu};
use crate::md::{Expr, ParamError};
use crate::solvers::{ResultSpec, SolverState, WeakSolver};
use crate::store::ObjectType;

/// Declares the objective of the enclosing Optimize loop and reports its value after every pass.
#[derive(Clone, Debug, Default)]
pub struct Minimize {
    pub solver_name: String,
    pub objective: Expr,
    solver: Option<WeakSolver>,
    index: Option<usize>,
}

impl Minimize {
    pub fn new(solver_name: &str, objective: impl Into<Expr>) -> Self {
        Self {
            solver_name: solver_name.to_string(),
            objective: objective.into(),
            solver: None,
            index: None,
        }
    }

    pub fn bind(&mut self, solver: WeakSolver) {
        self.solver = Some(solver);
        self.index = None;
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

impl FromStr for Minimize {
    type Err = ParamError;

    /// Parses `OPT(cost)`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (solver_name, objective) = parse_port(s)?;
        Ok(Self::new(&solver_name, Expr::from_str(&objective)?))
    }
}

impl Initializable for Minimize {
    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let solver = bound_solver(self.solver.as_ref(), "Minimize")?;
        self.objective.validate(ctx.scope(), "Minimize")?;
        let index = solver
            .borrow_mut()
            .register_result(ResultSpec::Objective {
                name: self.objective.to_string(),
            })
            .context(SolverFailureSnafu { command: "Minimize" })?;
        self.index = Some(index);
        Ok(true)
    }
}

impl Executable for Minimize {
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let solver = bound_solver(self.solver.as_ref(), "Minimize")?;
        let index = self.index.context(MissingContextSnafu {
            command: "Minimize",
            missing: "objective registration",
        })?;
        if solver.borrow().state() != SolverState::Initializing {
            let value = self.objective.eval(ctx.scope(), "Minimize")?;
            solver
                .borrow_mut()
                .set_result_value(index, value)
                .context(SolverFailureSnafu { command: "Minimize" })?;
        }
        Ok(true)
    }
}

impl Renameable for Minimize {
    fn rename_ref_object(&mut self, obj_type: ObjectType, old_name: &str, new_name: &str) -> bool {
        if obj_type == ObjectType::Solver {
            if self.solver_name == old_name {
                self.solver_name = new_name.to_string();
            }
        } else {
            self.objective.rename(old_name, new_name);
        }
        true
    }
}

impl Serializable for Minimize {
    fn type_name(&self) -> &str {
        "Minimize"
    }

    fn generating_string(&self) -> String {
        format!("Minimize {}({});", self.solver_name, self.objective)
    }
}
