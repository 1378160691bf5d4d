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
use typed_builder::TypedBuilder;

use super::{
    bound_solver, parse_port, split_settings, Context, Executable, Initializable, Renameable,
    Serializable,
};
use crate::errors::{CommandError, MissingContextSnafu, SolverFailureSnafu};
use crate::md::{fmt_real, Expr, ParamError, ParamRef};
use crate::solvers::{SolverState, VariableSpec, WeakSolver, UNBOUNDED};
use crate::store::ObjectType;

/// Declares a variable of the enclosing solver loop and writes the solver's value of it
/// to the referenced parameter on every pass.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(doc)]
pub struct Vary {
    #[builder(setter(into))]
    pub solver_name: String,
    pub variable: ParamRef,
    /// Initial guess, evaluated every time the loop is entered
    #[builder(default, setter(into))]
    pub initial: Expr,
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
    #[builder(default, setter(skip))]
    solver: Option<WeakSolver>,
    #[builder(default, setter(skip))]
    index: Option<usize>,
}

impl Default for Vary {
    fn default() -> Self {
        Self::builder()
            .solver_name("")
            .variable(ParamRef::object(""))
            .build()
    }
}

impl Vary {
    /// Attaches the solver of the enclosing loop, registration happens at initialization.
    pub fn bind(&mut self, solver: WeakSolver) {
        self.solver = Some(solver);
        self.index = None;
    }

    /// Index of the variable in the solver, once registered
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    fn spec(&self) -> VariableSpec {
        VariableSpec::builder()
            .name(self.variable.to_string())
            .initial(self.initial.constant().unwrap_or(0.0))
            .perturbation(self.perturbation)
            .lower(self.lower)
            .upper(self.upper)
            .max_step(self.max_step)
            .additive_scale(self.additive_scale)
            .multiplicative_scale(self.multiplicative_scale)
            .build()
    }
}

impl FromStr for Vary {
    type Err = ParamError;

    /// Parses `DC1(Sat.VX = 1.2, {Perturbation = 1e-5, MaxStep = 0.2})`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (solver_name, args) = parse_port(s)?;
        let (head, settings) = split_settings(&args)?;
        let (variable, initial) = head.split_once('=').ok_or_else(|| ParamError::Parse {
            text: s.to_string(),
            reason: "expected `variable = initial guess`".to_string(),
        })?;
        let mut me = Self::builder()
            .solver_name(solver_name)
            .variable(ParamRef::from_str(variable)?)
            .initial(Expr::from_str(initial)?)
            .build();
        for (key, value) in settings {
            match key.as_str() {
                "Perturbation" => me.perturbation = value,
                "Lower" => me.lower = value,
                "Upper" => me.upper = value,
                "MaxStep" => me.max_step = value,
                "AdditiveScaleFactor" => me.additive_scale = value,
                "MultiplicativeScaleFactor" => me.multiplicative_scale = value,
                _ => {
                    return Err(ParamError::Parse {
                        text: key,
                        reason: "unknown Vary setting".to_string(),
                    })
                }
            }
        }
        Ok(me)
    }
}

impl Initializable for Vary {
    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let solver = bound_solver(self.solver.as_ref(), "Vary")?;
        self.variable.validate(ctx.scope(), "Vary")?;
        self.initial.validate(ctx.scope(), "Vary")?;
        let index = solver
            .borrow_mut()
            .register_variable(self.spec())
            .context(SolverFailureSnafu { command: "Vary" })?;
        self.index = Some(index);
        Ok(true)
    }
}

impl Executable for Vary {
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let solver = bound_solver(self.solver.as_ref(), "Vary")?;
        let index = self.index.context(MissingContextSnafu {
            command: "Vary",
            missing: "variable registration",
        })?;
        if solver.borrow().state() == SolverState::Initializing {
            let guess = self.initial.eval(ctx.scope(), "Vary")?;
            solver
                .borrow_mut()
                .set_variable_initial(index, guess)
                .context(SolverFailureSnafu { command: "Vary" })?;
        }
        let value = solver
            .borrow()
            .variable_value(index)
            .context(SolverFailureSnafu { command: "Vary" })?;
        self.variable.set(ctx.scope(), "Vary", value)?;
        Ok(true)
    }
}

impl Renameable for Vary {
    fn rename_ref_object(&mut self, obj_type: ObjectType, old_name: &str, new_name: &str) -> bool {
        if obj_type == ObjectType::Solver {
            if self.solver_name == old_name {
                self.solver_name = new_name.to_string();
            }
        } else {
            self.variable.rename(old_name, new_name);
            self.initial.rename(old_name, new_name);
        }
        true
    }
}

impl Serializable for Vary {
    fn type_name(&self) -> &str {
        "Vary"
    }

    fn generating_string(&self) -> String {
        format!(
            "Vary {}({} = {}, {{Perturbation = {}, Lower = {}, Upper = {}, MaxStep = {}, AdditiveScaleFactor = {}, MultiplicativeScaleFactor = {}}});",
            self.solver_name,
            self.variable,
            self.initial,
            fmt_real(self.perturbation),
            fmt_real(self.lower),
            fmt_real(self.upper),
            fmt_real(self.max_step),
            fmt_real(self.additive_scale),
            fmt_real(self.multiplicative_scale)
        )
    }
}
