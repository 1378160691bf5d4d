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

use super::{Context, Executable, Initializable, Renameable, Serializable};
use crate::errors::{CommandError, UnresolvedReferenceSnafu};
use crate::md::ParamError;
use crate::store::{promote_to_global, ObjectType};

/// Moves objects from the local store to the global store, keeping their identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Global {
    pub names: Vec<String>,
}

impl Global {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl FromStr for Global {
    type Err = ParamError;

    /// Parses `a b c` or `a, b, c`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names = s
            .trim()
            .trim_end_matches(';')
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>();
        if names.is_empty() {
            return Err(ParamError::Parse {
                text: s.to_string(),
                reason: "expected at least one name".to_string(),
            });
        }
        Ok(Self::new(&names))
    }
}

impl Initializable for Global {
    fn initialize(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        Ok(true)
    }
}

impl Executable for Global {
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let (los, gos) = ctx.scope().stores("Global")?;
        for name in &self.names {
            if gos.borrow().contains(name) {
                if los.borrow().contains(name) {
                    // Only possible if the stores were edited directly
                    warn!("Global: `{name}` is bound in both stores, dropping the local binding");
                    los.borrow_mut().remove(name);
                } else {
                    warn!("Global: `{name}` is already global");
                }
                continue;
            }
            promote_to_global(&los, &gos, name).context(UnresolvedReferenceSnafu {
                command: "Global",
                name,
            })?;
            debug!("Global: `{name}` moved to the global store");
        }
        Ok(true)
    }

    fn skip_interrupt(&self) -> bool {
        true
    }
}

impl Renameable for Global {
    fn rename_ref_object(&mut self, _: ObjectType, old_name: &str, new_name: &str) -> bool {
        for name in self.names.iter_mut().filter(|name| *name == old_name) {
            *name = new_name.to_string();
        }
        true
    }
}

impl Serializable for Global {
    fn type_name(&self) -> &str {
        "Global"
    }

    fn generating_string(&self) -> String {
        format!("Global {};", self.names.join(" "))
    }
}
