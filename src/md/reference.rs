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

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use snafu::prelude::*;

use super::{NoSuchFieldSnafu, NotNumericSnafu, ParamError, SpacecraftParameter};
use crate::errors::{CommandError, InvalidParameterSnafu};
use crate::store::{ObjectKind, Scope};

lazy_static! {
    static ref FIELD_RE: Regex = Regex::new(r"^\s*([A-Za-z_]\w*)\.([A-Za-z_]\w*)\s*$").unwrap();
    static ref ELEMENT_RE: Regex =
        Regex::new(r"^\s*([A-Za-z_]\w*)\s*\(\s*(\d+)\s*,\s*(\d+)\s*\)\s*$").unwrap();
    static ref OBJECT_RE: Regex = Regex::new(r"^\s*([A-Za-z_]\w*)\s*$").unwrap();
}

/// A reference to a numeric value held by an object of the stores.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamRef {
    /// A whole object, e.g. the variable `x`
    Object(String),
    /// A spacecraft field, e.g. `Sat.X`
    Field {
        object: String,
        param: SpacecraftParameter,
    },
    /// One element of an array, indexed from one, e.g. `A(1, 2)`
    Element { array: String, row: usize, col: usize },
}

impl ParamRef {
    pub fn object(name: &str) -> Self {
        Self::Object(name.to_string())
    }

    pub fn field(object: &str, param: SpacecraftParameter) -> Self {
        Self::Field {
            object: object.to_string(),
            param,
        }
    }

    pub fn element(array: &str, row: usize, col: usize) -> Self {
        Self::Element {
            array: array.to_string(),
            row,
            col,
        }
    }

    /// Name of the object holding the value
    pub fn object_name(&self) -> &str {
        match self {
            Self::Object(name) => name,
            Self::Field { object, .. } => object,
            Self::Element { array, .. } => array,
        }
    }

    pub fn is_spacecraft_field(&self) -> bool {
        matches!(self, Self::Field { .. })
    }

    /// Renames the referenced object, returns whether anything changed.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> bool {
        let name = match self {
            Self::Object(name) => name,
            Self::Field { object, .. } => object,
            Self::Element { array, .. } => array,
        };
        if name == old_name {
            *name = new_name.to_string();
            true
        } else {
            false
        }
    }

    fn read(&self, kind: &ObjectKind) -> Result<f64, ParamError> {
        match (self, kind) {
            (Self::Object(_), ObjectKind::Variable(value)) => Ok(*value),
            (Self::Field { param, .. }, ObjectKind::Spacecraft(sc)) => param.value(sc),
            (Self::Element { array, row, col }, ObjectKind::Array(values)) => {
                values.get(array, *row, *col)
            }
            (Self::Field { object, param }, kind) => NoSuchFieldSnafu {
                name: object.clone(),
                field: param.to_string(),
                found: kind.object_type(),
            }
            .fail(),
            (_, kind) => NotNumericSnafu {
                name: self.object_name(),
                found: kind.object_type(),
            }
            .fail(),
        }
    }

    fn write(&self, kind: &mut ObjectKind, value: f64) -> Result<(), ParamError> {
        match (self, kind) {
            (Self::Object(_), ObjectKind::Variable(current)) => {
                *current = value;
                Ok(())
            }
            (Self::Field { param, .. }, ObjectKind::Spacecraft(sc)) => param.set_value(sc, value),
            (Self::Element { array, row, col }, ObjectKind::Array(values)) => {
                values.set(array, *row, *col, value)
            }
            (Self::Field { object, param }, kind) => NoSuchFieldSnafu {
                name: object.clone(),
                field: param.to_string(),
                found: kind.object_type(),
            }
            .fail(),
            (_, kind) => NotNumericSnafu {
                name: self.object_name(),
                found: kind.object_type(),
            }
            .fail(),
        }
    }

    /// Checks that the reference resolves to an object that holds such a value.
    pub fn validate(&self, scope: &Scope, command: &str) -> Result<(), CommandError> {
        self.get(scope, command).map(|_| ())
    }

    /// Reads the value from the stores of the scope.
    pub fn get(&self, scope: &Scope, command: &str) -> Result<f64, CommandError> {
        let obj = scope.resolve(command, self.object_name())?;
        let value = self.read(&obj.borrow().kind);
        value.context(InvalidParameterSnafu { command })
    }

    /// Writes the value into the stores of the scope.
    pub fn set(&self, scope: &Scope, command: &str, value: f64) -> Result<(), CommandError> {
        let obj = scope.resolve(command, self.object_name())?;
        let rslt = self.write(&mut obj.borrow_mut().kind, value);
        rslt.context(InvalidParameterSnafu { command })
    }
}

impl FromStr for ParamRef {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(cap) = FIELD_RE.captures(s) {
            let param = SpacecraftParameter::from_str(&cap[2])?;
            Ok(Self::field(&cap[1], param))
        } else if let Some(cap) = ELEMENT_RE.captures(s) {
            let parse = |idx: &str| {
                idx.parse::<usize>().map_err(|e| ParamError::Parse {
                    text: s.to_string(),
                    reason: e.to_string(),
                })
            };
            Ok(Self::element(&cap[1], parse(&cap[2])?, parse(&cap[3])?))
        } else if let Some(cap) = OBJECT_RE.captures(s) {
            Ok(Self::object(&cap[1]))
        } else {
            Err(ParamError::Parse {
                text: s.to_string(),
                reason: "expected `name`, `name.field` or `name(row, col)`".to_string(),
            })
        }
    }
}

impl fmt::Display for ParamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(name) => write!(f, "{name}"),
            Self::Field { object, param } => write!(f, "{object}.{param}"),
            Self::Element { array, row, col } => write!(f, "{array}({row}, {col})"),
        }
    }
}
