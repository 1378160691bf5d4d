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

use super::{BranchState, Context, Executable, Initializable, Renameable, Serializable};
use crate::errors::CommandError;
use crate::md::{Conditions, Expr, ParamError, ParamRef};
use crate::store::ObjectType;

/// Runs its first branch when the conditions hold, else its second branch (after an Else) if any.
#[derive(Clone, Debug, Default)]
pub struct If {
    pub conditions: Conditions,
    pub branch: BranchState,
    active: usize,
}

impl If {
    pub fn new(conditions: Conditions) -> Self {
        Self {
            conditions,
            ..Default::default()
        }
    }

    /// Index of the branch being run, or last run
    pub fn active_branch(&self) -> usize {
        self.active
    }
}

impl FromStr for If {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(Conditions::from_str(s)?))
    }
}

impl Initializable for If {
    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        self.conditions.validate(ctx.scope(), "If")?;
        self.branch.reset();
        self.branch.initialize_branches(ctx)?;
        Ok(true)
    }
}

impl Executable for If {
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        if self.branch.complete {
            self.branch.reset();
        }
        if !self.branch.executing {
            self.branch.executing = true;
            if self.conditions.eval(ctx.scope(), "If")? {
                self.active = 0;
            } else if self.branch.branch_count() > 1 {
                self.active = 1;
            } else {
                self.branch.complete = true;
                return Ok(true);
            }
        }
        let done = self.branch.execute_branch(ctx, self.active)?;
        if !self.branch.branch_executing {
            self.branch.complete = true;
        }
        Ok(done)
    }

    fn run_complete(&mut self, ctx: &mut Context<'_>) {
        self.branch.run_complete(ctx);
    }
}

impl Renameable for If {
    fn rename_ref_object(&mut self, _: ObjectType, old_name: &str, new_name: &str) -> bool {
        self.conditions.rename(old_name, new_name);
        true
    }
}

impl Serializable for If {
    fn type_name(&self) -> &str {
        "If"
    }

    fn generating_string(&self) -> String {
        format!("If {}", self.conditions)
    }
}

/// Runs its branch once per value of the index, from start to end (inclusive) by step.
#[derive(Clone, Debug)]
pub struct For {
    pub index: ParamRef,
    pub start: Expr,
    pub step: Expr,
    pub end: Expr,
    pub branch: BranchState,
    current: f64,
    step_value: f64,
    end_value: f64,
}

impl Default for For {
    fn default() -> Self {
        Self::new(ParamRef::object("I"), 1.0, 1.0, 1.0)
    }
}

impl For {
    pub fn new(
        index: ParamRef,
        start: impl Into<Expr>,
        step: impl Into<Expr>,
        end: impl Into<Expr>,
    ) -> Self {
        Self {
            index,
            start: start.into(),
            step: step.into(),
            end: end.into(),
            branch: BranchState::default(),
            current: 0.0,
            step_value: 1.0,
            end_value: 0.0,
        }
    }

    /// Value of the index for the pass in progress, or the next pass
    pub fn current_value(&self) -> f64 {
        self.current
    }

    fn still_looping(&self) -> bool {
        if self.step_value > 0.0 {
            self.current <= self.end_value
        } else {
            self.current >= self.end_value
        }
    }
}

impl FromStr for For {
    type Err = ParamError;

    /// Parses `I = start:end` or `I = start:step:end`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = |reason: &str| ParamError::Parse {
            text: s.to_string(),
            reason: reason.to_string(),
        };
        let (index, range) = s
            .split_once('=')
            .ok_or_else(|| parse_err("expected `index = start:step:end`"))?;
        let bounds = range
            .trim()
            .trim_end_matches(';')
            .split(':')
            .map(Expr::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        let index = ParamRef::from_str(index)?;
        match <[Expr; 3]>::try_from(bounds) {
            Ok([start, step, end]) => Ok(Self::new(index, start, step, end)),
            Err(bounds) => match <[Expr; 2]>::try_from(bounds) {
                Ok([start, end]) => Ok(Self::new(index, start, 1.0, end)),
                Err(_) => Err(parse_err("expected two or three loop bounds")),
            },
        }
    }
}

impl Initializable for For {
    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        self.index.validate(ctx.scope(), "For")?;
        for expr in [&self.start, &self.step, &self.end] {
            expr.validate(ctx.scope(), "For")?;
        }
        self.branch.reset();
        self.branch.initialize_branches(ctx)?;
        Ok(true)
    }
}

impl Executable for For {
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        if self.branch.complete {
            self.branch.reset();
        }
        if !self.branch.executing {
            let step = self.step.eval(ctx.scope(), "For")?;
            if step == 0.0 {
                return Err(CommandError::InvalidParameter {
                    command: self.generating_string(),
                    source: ParamError::ZeroStep,
                });
            }
            self.current = self.start.eval(ctx.scope(), "For")?;
            self.end_value = self.end.eval(ctx.scope(), "For")?;
            self.step_value = step;
            self.branch.executing = true;
        }
        if !self.branch.branch_executing {
            if !self.still_looping() {
                self.branch.complete = true;
                return Ok(true);
            }
            self.index.set(ctx.scope(), "For", self.current)?;
        }
        let done = self.branch.execute_branch(ctx, 0)?;
        if !self.branch.branch_executing {
            self.current += self.step_value;
        }
        Ok(done)
    }

    fn run_complete(&mut self, ctx: &mut Context<'_>) {
        self.branch.run_complete(ctx);
    }
}

impl Renameable for For {
    fn rename_ref_object(&mut self, _: ObjectType, old_name: &str, new_name: &str) -> bool {
        self.index.rename(old_name, new_name);
        for expr in [&mut self.start, &mut self.step, &mut self.end] {
            expr.rename(old_name, new_name);
        }
        true
    }
}

impl Serializable for For {
    fn type_name(&self) -> &str {
        "For"
    }

    fn generating_string(&self) -> String {
        format!(
            "For {} = {}:{}:{};",
            self.index, self.start, self.step, self.end
        )
    }
}

/// Runs its branch as long as the conditions hold, checked before every pass.
#[derive(Clone, Debug, Default)]
pub struct While {
    pub conditions: Conditions,
    pub branch: BranchState,
}

impl While {
    pub fn new(conditions: Conditions) -> Self {
        Self {
            conditions,
            branch: BranchState::default(),
        }
    }
}

impl FromStr for While {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(Conditions::from_str(s)?))
    }
}

impl Initializable for While {
    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        self.conditions.validate(ctx.scope(), "While")?;
        self.branch.reset();
        self.branch.initialize_branches(ctx)?;
        Ok(true)
    }
}

impl Executable for While {
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        if self.branch.complete {
            self.branch.reset();
        }
        self.branch.executing = true;
        if !self.branch.branch_executing && !self.conditions.eval(ctx.scope(), "While")? {
            self.branch.complete = true;
            return Ok(true);
        }
        self.branch.execute_branch(ctx, 0)
    }

    fn run_complete(&mut self, ctx: &mut Context<'_>) {
        self.branch.run_complete(ctx);
    }
}

impl Renameable for While {
    fn rename_ref_object(&mut self, _: ObjectType, old_name: &str, new_name: &str) -> bool {
        self.conditions.rename(old_name, new_name);
        true
    }
}

impl Serializable for While {
    fn type_name(&self) -> &str {
        "While"
    }

    fn generating_string(&self) -> String {
        format!("While {}", self.conditions)
    }
}
