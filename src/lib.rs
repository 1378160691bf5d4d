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

/*! # nyx-sequence

The command sequence engine of mission scripts: the commands a script compiles to, the
linked mission sequence they form, the branch commands (If, For, While) and the solver
loops (Target, Optimize) that run parts of the sequence repeatedly, and the sandbox that
owns the object stores and ticks the sequence to completion.
*/

/// Spacecraft, formations and the solar system catalogue.
pub mod cosmic;

mod errors;
/// Commands never panic, functions which may fail return an error.
pub use self::errors::CommandError;

/// Named objects, the local and global object stores, and name resolution.
pub mod store;

/// Parameters, expressions and conditions evaluated against the object stores.
pub mod md;

/// The solvers driven by the Target and Optimize commands.
pub mod solvers;

/// Telemetry sink interface.
pub mod publisher;

/// Command nodes and the mission sequence.
pub mod command;

/// The driver of a mission sequence.
pub mod sandbox;

/// YAML configuration of the resources a sandbox starts from.
pub mod io;

#[macro_use]
extern crate log;
extern crate hifitime;
extern crate nalgebra as na;

/// Re-export of hifitime
pub mod time {
    pub use hifitime::*;
}

/// Re-export nalgebra
pub mod linalg {
    pub use na::base::*;
}

/// Re-export some useful things
pub use self::command::{Command, CommandId, MissionSequence};
pub use self::sandbox::{RunReport, Sandbox};
