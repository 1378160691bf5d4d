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

use crate::md::ParamError;
use crate::solvers::SolverError;
use crate::store::StoreError;

/// Errors raised while building, initializing or running a mission sequence.
///
/// Errors raised inside a branch body are returned unmodified by the owning
/// branch command: it is up to the driver to decide whether to abort the run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CommandError {
    #[snafu(display("{command}: `{name}` not found in the local, global or solar system stores"))]
    UnresolvedReference { command: String, name: String },
    #[snafu(display("{command}: {source}"))]
    TypeMismatch { command: String, source: StoreError },
    #[snafu(display("{command} used before its {missing} was set"))]
    MissingContext { command: String, missing: String },
    #[snafu(display("illegal sequence edit: {details}"))]
    Structural { details: String },
    #[snafu(display("{command}: {feature} is not implemented"))]
    NotImplemented { command: String, feature: String },
    #[snafu(display("{command}: solver failed: {source}"))]
    SolverFailure { command: String, source: SolverError },
    #[snafu(display("{command}: {source}"))]
    InvalidParameter { command: String, source: ParamError },
    #[snafu(display("{command}: {details}"))]
    InvalidCommand { command: String, details: String },
    #[snafu(display("command did not complete: {generating}"))]
    Incomplete { generating: String },
    #[snafu(display("{command} finished in Stop exit mode, run stopped"))]
    RunStopped { command: String },
    #[snafu(display("run interrupted by the user before {command}"))]
    Interrupted { command: String },
    #[snafu(display("command #{id} is currently executing and cannot be borrowed"))]
    Busy { id: usize },
    #[snafu(display("no command of type `{type_name}` is registered"))]
    UnknownCommand { type_name: String },
}

impl CommandError {
    /// Returns true if this error stems from a name that could not be resolved
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::UnresolvedReference { .. })
    }
}
