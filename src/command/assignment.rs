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

use super::{Context, Executable, Initializable, Renameable, Serializable};
use crate::errors::CommandError;
use crate::md::{Expr, ParamError, ParamRef};
use crate::store::{ObjectKind, ObjectType};

/// Labels of the data published when an assignment writes a spacecraft
pub const PUBLISHED_LABELS: [&str; 7] = ["Epoch", "X", "Y", "Z", "VX", "VY", "VZ"];

/// `lhs = expression`, where the left hand side is a variable, an array element or a spacecraft field.
#[derive(Clone, Debug)]
pub struct Assignment {
    pub lhs: ParamRef,
    pub rhs: Expr,
    provider: Option<usize>,
}

impl Default for Assignment {
    fn default() -> Self {
        Self::new(ParamRef::object("x"), 0.0)
    }
}

impl Assignment {
    pub fn new(lhs: ParamRef, rhs: impl Into<Expr>) -> Self {
        Self {
            lhs,
            rhs: rhs.into(),
            provider: None,
        }
    }

    /// Id of this command with the publisher, if it publishes spacecraft data
    pub fn provider(&self) -> Option<usize> {
        self.provider
    }
}

impl FromStr for Assignment {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lhs, rhs) = s
            .trim()
            .trim_end_matches(';')
            .split_once('=')
            .ok_or_else(|| ParamError::Parse {
                text: s.to_string(),
                reason: "expected `lhs = expression`".to_string(),
            })?;
        Ok(Self::new(ParamRef::from_str(lhs)?, Expr::from_str(rhs)?))
    }
}

impl Initializable for Assignment {
    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        self.lhs.validate(ctx.scope(), "Assignment")?;
        self.rhs.validate(ctx.scope(), "Assignment")?;
        self.provider = None;
        if let (ParamRef::Field { object, .. }, Some(publisher)) = (&self.lhs, ctx.publisher()) {
            let labels = PUBLISHED_LABELS.map(String::from);
            self.provider = Some(
                publisher
                    .borrow_mut()
                    .register_published_data(object, &labels),
            );
        }
        Ok(true)
    }
}

impl Executable for Assignment {
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let value = self.rhs.eval(ctx.scope(), "Assignment")?;
        self.lhs.set(ctx.scope(), "Assignment", value)?;

        if let (Some(provider), Some(publisher)) = (self.provider, ctx.publisher()) {
            let obj = ctx.scope().resolve("Assignment", self.lhs.object_name())?;
            let data = match &obj.borrow().kind {
                ObjectKind::Spacecraft(sc) => {
                    let mut data = vec![sc.epoch.to_mjd_tai_days()];
                    data.extend(sc.state.iter());
                    data
                }
                _ => Vec::new(),
            };
            if !data.is_empty() {
                publisher.borrow_mut().publish(provider, &data);
            }
        }
        Ok(true)
    }
}

impl Renameable for Assignment {
    fn rename_ref_object(&mut self, _: ObjectType, old_name: &str, new_name: &str) -> bool {
        self.lhs.rename(old_name, new_name);
        self.rhs.rename(old_name, new_name);
        true
    }
}

impl Serializable for Assignment {
    fn type_name(&self) -> &str {
        "Assignment"
    }

    fn generating_string(&self) -> String {
        format!("{} = {};", self.lhs, self.rhs)
    }
}
