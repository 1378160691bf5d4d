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

use lazy_static::lazy_static;
use regex::Regex;
use snafu::prelude::*;

use super::{Context, Executable, Initializable, Renameable, Serializable};
use crate::cosmic::{CelestialBody, Formation, Spacecraft};
use crate::errors::{CommandError, TypeMismatchSnafu};
use crate::md::{ParamError, ParseSnafu};
use crate::solvers::{DifferentialCorrector, GradientDescent};
use crate::store::{insert_into_object_store, Array, Insertion, ObjectKind, ObjectType, SimObject};

lazy_static! {
    static ref NAME_RE: Regex =
        Regex::new(r"([A-Za-z_]\w*)(?:\s*\[\s*(\d+)\s*,\s*(\d+)\s*\])?").unwrap();
}

/// Creates one object per requested name, cloned from a prototype, when initialized.
#[derive(Clone, Debug)]
pub struct Create {
    /// Script type name, e.g. `Spacecraft` or `DifferentialCorrector`
    pub object_type_name: String,
    prototype: SimObject,
    names: Vec<String>,
    /// Requested (rows, cols) of each name, arrays only
    dims: Vec<Option<(usize, usize)>>,
}

impl Default for Create {
    fn default() -> Self {
        Self::with_prototype(ObjectKind::Variable(0.0), &[])
    }
}

impl Create {
    /// Creates objects of the provided type with their default settings.
    ///
    /// Array names must carry their dimensions, e.g. `A[3,3]`.
    pub fn new(type_name: &str, names: &[&str]) -> Result<Self, ParamError> {
        let kind = match ObjectType::from_str(type_name)? {
            ObjectType::Spacecraft => ObjectKind::Spacecraft(Spacecraft::default()),
            ObjectType::Formation => ObjectKind::Formation(Formation::default()),
            ObjectType::Variable => ObjectKind::Variable(0.0),
            ObjectType::Array => ObjectKind::Array(Array::zeros(1, 1)),
            ObjectType::String => ObjectKind::String(String::new()),
            ObjectType::Solver => {
                if type_name.trim().eq_ignore_ascii_case("GradientDescent") {
                    ObjectKind::Solver(Box::new(GradientDescent::default()))
                } else {
                    ObjectKind::Solver(Box::new(DifferentialCorrector::default()))
                }
            }
            ObjectType::CelestialBody => {
                ObjectKind::CelestialBody(CelestialBody::new(type_name.trim(), 0.0, 0.0))
            }
        };
        let mut me = Self::with_prototype(kind, &[]);
        me.object_type_name = type_name.trim().to_string();
        for name in names {
            me.push_name(name)?;
        }
        Ok(me)
    }

    /// Creates clones of the provided object.
    pub fn with_prototype(prototype: ObjectKind, names: &[&str]) -> Self {
        let mut me = Self {
            object_type_name: prototype.type_name(),
            prototype: SimObject::new("", prototype),
            names: Vec::new(),
            dims: Vec::new(),
        };
        for name in names {
            me.names.push(name.to_string());
            me.dims.push(None);
        }
        me
    }

    /// Flags the created objects for the global store
    pub fn global(mut self) -> Self {
        self.prototype.is_global = true;
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn object_type(&self) -> ObjectType {
        self.prototype.object_type()
    }

    /// Adds a name to create, with its dimensions (`A[2,3]`) for arrays
    pub fn push_name(&mut self, name: &str) -> Result<(), ParamError> {
        let parse_err = |reason: &str| ParamError::Parse {
            text: name.to_string(),
            reason: reason.to_string(),
        };
        let cap = NAME_RE
            .captures(name)
            .filter(|cap| cap[0].len() == name.trim().len())
            .ok_or_else(|| parse_err("expected a name"))?;
        let dims = match (cap.get(2), cap.get(3)) {
            (Some(rows), Some(cols)) => {
                let rows = rows.as_str().parse::<usize>().map_err(|e| parse_err(&e.to_string()))?;
                let cols = cols.as_str().parse::<usize>().map_err(|e| parse_err(&e.to_string()))?;
                ensure!(rows > 0 && cols > 0, ParseSnafu {
                    text: name,
                    reason: "array dimensions must be positive",
                });
                Some((rows, cols))
            }
            _ => None,
        };
        match (self.prototype.object_type(), dims) {
            (ObjectType::Array, None) => return Err(parse_err("array dimensions are required")),
            (ObjectType::Array, _) | (_, None) => {}
            (_, Some(_)) => return Err(parse_err("only arrays have dimensions")),
        }
        self.names.push(cap[1].to_string());
        self.dims.push(dims);
        Ok(())
    }

    fn instance(&self, idx: usize) -> SimObject {
        let mut obj = self.prototype.clone();
        obj.name = self.names[idx].clone();
        if let Some((rows, cols)) = self.dims[idx] {
            obj.kind = ObjectKind::Array(Array::zeros(rows, cols));
        }
        obj
    }
}

impl FromStr for Create {
    type Err = ParamError;

    /// Parses `Spacecraft Sat1 Sat2` or `Array A[3,3] B[2,2]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches(';');
        let (type_name, names) = s.trim().split_once(char::is_whitespace).ok_or_else(|| {
            ParamError::Parse {
                text: s.to_string(),
                reason: "expected a type followed by names".to_string(),
            }
        })?;
        let names = NAME_RE
            .find_iter(names)
            .map(|found| found.as_str())
            .collect::<Vec<_>>();
        Self::new(type_name, &names)
    }
}

impl Initializable for Create {
    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        if self.prototype.object_type() == ObjectType::CelestialBody {
            warn!(
                "Create {}: celestial bodies belong to the solar system, nothing created",
                self.names.join(" ")
            );
            return Ok(true);
        }
        let (los, gos) = ctx.scope().stores("Create")?;
        for idx in 0..self.names.len() {
            let insertion = insert_into_object_store(&los, &gos, self.instance(idx))
                .context(TypeMismatchSnafu { command: "Create" })?;
            if let Insertion::Inserted(obj) = insertion {
                debug!("created {} `{}`", self.object_type_name, obj.borrow().name);
            }
        }
        Ok(true)
    }
}

impl Executable for Create {
    fn execute(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        Ok(true)
    }

    fn skip_interrupt(&self) -> bool {
        true
    }
}

impl Renameable for Create {
    fn rename_ref_object(&mut self, _: ObjectType, old_name: &str, new_name: &str) -> bool {
        for name in self.names.iter_mut().filter(|name| *name == old_name) {
            *name = new_name.to_string();
        }
        true
    }
}

impl Serializable for Create {
    fn type_name(&self) -> &str {
        "Create"
    }

    fn generating_string(&self) -> String {
        let names = self
            .names
            .iter()
            .zip(&self.dims)
            .map(|(name, dims)| match dims {
                Some((rows, cols)) => format!("{name}[{rows},{cols}]"),
                None => name.clone(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        format!("Create {} {names};", self.object_type_name)
    }
}
