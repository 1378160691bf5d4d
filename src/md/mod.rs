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

use snafu::prelude::*;

use crate::store::ObjectType;

mod param;
pub use param::SpacecraftParameter;

mod reference;
pub use reference::ParamRef;

mod expr;
pub use expr::{BinOp, CmpOp, Condition, Conditions, Expr, Logic};
pub(crate) use expr::fmt_real;

#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ParamError {
    #[snafu(display("{param} is read-only"))]
    ReadOnly { param: String },
    #[snafu(display("{param} is undefined: {reason}"))]
    Undefined { param: String, reason: String },
    #[snafu(display("`{name}` is a {found} and has no numeric value"))]
    NotNumeric { name: String, found: ObjectType },
    #[snafu(display("`{name}` is a {found} and has no field `{field}`"))]
    NoSuchField {
        name: String,
        field: String,
        found: ObjectType,
    },
    #[snafu(display("element ({row}, {col}) is outside of array `{name}` of size {rows}x{cols}"))]
    OutOfBounds {
        name: String,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[snafu(display("cannot parse `{text}`: {reason}"))]
    Parse { text: String, reason: String },
    #[snafu(display("a loop step of zero never terminates"))]
    ZeroStep,
}
