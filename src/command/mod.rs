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

use lazy_static::lazy_static;
use regex::Regex;
use snafu::prelude::*;

use crate::errors::{CommandError, MissingContextSnafu};
use crate::md::ParamError;
use crate::publisher::{RunState, SharedPublisher};
use crate::solvers::{SharedSolver, WeakSolver};
use crate::store::{ObjectType, Scope};

mod branch;
pub use branch::{BranchEnd, BranchState, EndKind};

mod sequence;
pub use sequence::MissionSequence;

mod control;
pub use control::{For, If, While};

mod solver_loop;
pub use solver_loop::{ExitMode, SolverLoop, SolverLoopKind, StartMode};

mod vary;
pub use vary::Vary;

mod achieve;
pub use achieve::Achieve;

mod minimize;
pub use minimize::Minimize;

mod constraint;
pub use constraint::NonlinearConstraint;

mod create;
pub use create::Create;

mod global;
pub use global::Global;

mod assignment;
pub use assignment::Assignment;

mod call_function;
pub use call_function::{CallFunction, ScriptFunction};

mod factory;
pub use factory::{CommandFactory, CustomCommandBuilder};

mod summary;
pub use summary::{CommandSummary, SpacecraftSummary};

lazy_static! {
    static ref PORT_RE: Regex = Regex::new(r"^\s*([A-Za-z_]\w*)\s*\((.*)\)\s*;?\s*$").unwrap();
    static ref SETTING_RE: Regex = Regex::new(r"^\s*([A-Za-z_]\w*)\s*=\s*(\S+)\s*$").unwrap();
}

/// Splits `Solver(arguments)` into the solver name and its arguments.
pub(crate) fn parse_port(text: &str) -> Result<(String, String), ParamError> {
    let cap = PORT_RE.captures(text).ok_or_else(|| ParamError::Parse {
        text: text.to_string(),
        reason: "expected `SolverName(...)`".to_string(),
    })?;
    Ok((cap[1].to_string(), cap[2].to_string()))
}

/// Splits `x = 1, {Key = 2, Other = 3}` into `x = 1` and its numeric settings.
pub(crate) fn split_settings(args: &str) -> Result<(&str, Vec<(String, f64)>), ParamError> {
    let Some(open) = args.find('{') else {
        return Ok((args.trim(), Vec::new()));
    };
    let close = args.rfind('}').filter(|close| *close > open).ok_or_else(|| ParamError::Parse {
        text: args.to_string(),
        reason: "unbalanced braces".to_string(),
    })?;
    let head = args[..open].trim().trim_end_matches(',').trim();
    let mut settings = Vec::new();
    for setting in args[open + 1..close].split(',').filter(|s| !s.trim().is_empty()) {
        let cap = SETTING_RE.captures(setting).ok_or_else(|| ParamError::Parse {
            text: setting.to_string(),
            reason: "expected `Key = value`".to_string(),
        })?;
        let value = cap[2].parse::<f64>().map_err(|e| ParamError::Parse {
            text: setting.to_string(),
            reason: e.to_string(),
        })?;
        settings.push((cap[1].to_string(), value));
    }
    Ok((head, settings))
}

/// The solver a port was bound to, if its loop still holds it
pub(crate) fn bound_solver(
    solver: Option<&WeakSolver>,
    command: &str,
) -> Result<SharedSolver, CommandError> {
    solver
        .and_then(|weak| weak.upgrade())
        .context(MissingContextSnafu {
            command,
            missing: "solver",
        })
}

/// Stable handle of a command in its mission sequence.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub(crate) usize);

impl CommandId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a command sees while it is initialized or executed: its own id and shared
/// data, and the sequence it lives in (used by branch commands to run their bodies).
pub struct Context<'a> {
    pub id: CommandId,
    pub base: &'a mut CommandBase,
    pub seq: &'a mut MissionSequence,
}

impl Context<'_> {
    pub fn scope(&self) -> &Scope {
        &self.base.scope
    }

    pub fn publisher(&self) -> Option<SharedPublisher> {
        self.base.publisher.clone()
    }

    /// Sets the run state of the publisher, if any
    pub fn set_run_state(&self, state: RunState) {
        if let Some(publisher) = &self.base.publisher {
            publisher.borrow_mut().set_run_state(state);
        }
    }
}

pub trait Initializable {
    /// Resolves references and registers with collaborators. Must be safe to call repeatedly.
    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError>;
}

pub trait Executable {
    /// Performs the effect of the command once, returns whether it completed normally.
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError>;

    /// Instantaneous commands are never interrupted by the driver
    fn skip_interrupt(&self) -> bool {
        false
    }

    /// Called once the run ends, normally or not.
    fn run_complete(&mut self, _ctx: &mut Context<'_>) {}
}

pub trait Renameable {
    /// Renames every reference to `old_name`. Finding nothing to rename is not a failure.
    fn rename_ref_object(&mut self, obj_type: ObjectType, old_name: &str, new_name: &str) -> bool;
}

pub trait Serializable {
    fn type_name(&self) -> &str;

    /// Script text of the command, computed from its current settings
    fn generating_string(&self) -> String;
}

/// A command defined outside of this crate, registered with the `CommandFactory`.
pub trait CustomCommand: Initializable + Executable + Renameable + Serializable + fmt::Debug {}

impl<T> CustomCommand for T where T: Initializable + Executable + Renameable + Serializable + fmt::Debug
{}

/// Does nothing.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NoOp;

impl Initializable for NoOp {
    fn initialize(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        Ok(true)
    }
}

impl Executable for NoOp {
    fn execute(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        Ok(true)
    }

    fn skip_interrupt(&self) -> bool {
        true
    }
}

impl Renameable for NoOp {
    fn rename_ref_object(&mut self, _: ObjectType, _: &str, _: &str) -> bool {
        true
    }
}

impl Serializable for NoOp {
    fn type_name(&self) -> &str {
        "NoOp"
    }

    fn generating_string(&self) -> String {
        "NoOp;".to_string()
    }
}

/// Data every command carries regardless of its kind.
#[derive(Clone, Debug, Default)]
pub struct CommandBase {
    /// User comment, written before the command in generated scripts
    pub comment: String,
    /// Raw text the command was parsed from, never used to serialize the command
    pub source_text: Option<String>,
    pub scope: Scope,
    pub publisher: Option<SharedPublisher>,
    pub initialized: bool,
    /// Spacecraft snapshot taken after the last execution
    pub summary: Option<CommandSummary>,
}

/// Payload of a command node.
#[derive(Debug)]
pub enum CommandKind {
    NoOp(NoOp),
    Create(Create),
    Global(Global),
    Assignment(Assignment),
    CallFunction(CallFunction),
    Vary(Vary),
    Achieve(Achieve),
    Minimize(Minimize),
    NonlinearConstraint(NonlinearConstraint),
    If(If),
    For(For),
    While(While),
    SolverLoop(SolverLoop),
    BranchEnd(BranchEnd),
    Custom(Box<dyn CustomCommand>),
}

macro_rules! dispatch {
    ($kind:expr, $cmd:ident => $body:expr) => {
        match $kind {
            CommandKind::NoOp($cmd) => $body,
            CommandKind::Create($cmd) => $body,
            CommandKind::Global($cmd) => $body,
            CommandKind::Assignment($cmd) => $body,
            CommandKind::CallFunction($cmd) => $body,
            CommandKind::Vary($cmd) => $body,
            CommandKind::Achieve($cmd) => $body,
            CommandKind::Minimize($cmd) => $body,
            CommandKind::NonlinearConstraint($cmd) => $body,
            CommandKind::If($cmd) => $body,
            CommandKind::For($cmd) => $body,
            CommandKind::While($cmd) => $body,
            CommandKind::SolverLoop($cmd) => $body,
            CommandKind::BranchEnd($cmd) => $body,
            CommandKind::Custom($cmd) => $body,
        }
    };
}

macro_rules! impl_from_payload {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for CommandKind {
                fn from(cmd: $variant) -> Self {
                    Self::$variant(cmd)
                }
            }
        )*
    };
}

impl_from_payload!(
    NoOp,
    Create,
    Global,
    Assignment,
    CallFunction,
    Vary,
    Achieve,
    Minimize,
    NonlinearConstraint,
    If,
    For,
    While,
    SolverLoop,
    BranchEnd
);

impl From<Box<dyn CustomCommand>> for CommandKind {
    fn from(cmd: Box<dyn CustomCommand>) -> Self {
        Self::Custom(cmd)
    }
}

impl CommandKind {
    pub fn type_name(&self) -> &str {
        dispatch!(self, cmd => cmd.type_name())
    }

    pub fn generating_string(&self) -> String {
        dispatch!(self, cmd => cmd.generating_string())
    }

    pub fn skip_interrupt(&self) -> bool {
        dispatch!(self, cmd => cmd.skip_interrupt())
    }

    pub fn rename_ref_object(&mut self, obj_type: ObjectType, old_name: &str, new_name: &str) -> bool {
        dispatch!(self, cmd => cmd.rename_ref_object(obj_type, old_name, new_name))
    }

    pub fn branch(&self) -> Option<&BranchState> {
        match self {
            Self::If(cmd) => Some(&cmd.branch),
            Self::For(cmd) => Some(&cmd.branch),
            Self::While(cmd) => Some(&cmd.branch),
            Self::SolverLoop(cmd) => Some(&cmd.branch),
            _ => None,
        }
    }

    pub fn branch_mut(&mut self) -> Option<&mut BranchState> {
        match self {
            Self::If(cmd) => Some(&mut cmd.branch),
            Self::For(cmd) => Some(&mut cmd.branch),
            Self::While(cmd) => Some(&mut cmd.branch),
            Self::SolverLoop(cmd) => Some(&mut cmd.branch),
            _ => None,
        }
    }

    /// The marker that closes the branches of this command, if it is a branch command
    pub fn end_kind(&self) -> Option<EndKind> {
        match self {
            Self::If(_) => Some(EndKind::EndIf),
            Self::For(_) => Some(EndKind::EndFor),
            Self::While(_) => Some(EndKind::EndWhile),
            Self::SolverLoop(cmd) => Some(cmd.loop_kind.end_kind()),
            _ => None,
        }
    }

    /// Returns the marker kind if this is a branch end (including Else)
    pub fn marker(&self) -> Option<EndKind> {
        match self {
            Self::BranchEnd(end) => Some(end.end),
            _ => None,
        }
    }

    /// Attaches the solver of the enclosing loop if this is one of its ports.
    pub(crate) fn bind_solver(&mut self, solver_name: &str, solver: &WeakSolver) -> bool {
        match self {
            Self::Vary(cmd) if cmd.solver_name == solver_name => cmd.bind(solver.clone()),
            Self::Achieve(cmd) if cmd.solver_name == solver_name => cmd.bind(solver.clone()),
            Self::Minimize(cmd) if cmd.solver_name == solver_name => cmd.bind(solver.clone()),
            Self::NonlinearConstraint(cmd) if cmd.solver_name == solver_name => {
                cmd.bind(solver.clone())
            }
            _ => return false,
        }
        true
    }

    /// True for the commands a solver loop runs while it initializes its solver
    pub(crate) fn is_solver_port(&self) -> bool {
        matches!(
            self,
            Self::Vary(_) | Self::Achieve(_) | Self::Minimize(_) | Self::NonlinearConstraint(_)
        )
    }
}

/// One node of a mission sequence.
#[derive(Debug)]
pub struct Command {
    pub base: CommandBase,
    pub kind: CommandKind,
    pub(crate) next: Option<CommandId>,
    pub(crate) previous: Option<CommandId>,
    /// Owner of the branch this marker closes
    pub(crate) loop_back: Option<CommandId>,
}

impl Command {
    pub fn new(kind: impl Into<CommandKind>) -> Self {
        Self {
            base: CommandBase::default(),
            kind: kind.into(),
            next: None,
            previous: None,
            loop_back: None,
        }
    }

    /// Wraps a command defined outside of this crate
    pub fn custom(cmd: Box<dyn CustomCommand>) -> Self {
        Self::new(cmd)
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.base.comment = comment.to_string();
        self
    }

    pub fn with_source_text(mut self, text: &str) -> Self {
        self.base.source_text = Some(text.to_string());
        self
    }

    pub fn next(&self) -> Option<CommandId> {
        self.next
    }

    pub fn previous(&self) -> Option<CommandId> {
        self.previous
    }

    pub fn loop_back(&self) -> Option<CommandId> {
        self.loop_back
    }

    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    pub fn generating_string(&self) -> String {
        self.kind.generating_string()
    }

    pub fn is_branch_command(&self) -> bool {
        self.kind.branch().is_some()
    }

    pub fn is_branch_end(&self) -> bool {
        self.kind.marker().is_some()
    }

    /// How this node changes the nesting depth of the script
    pub fn depth_change(&self) -> i8 {
        match self.kind.marker() {
            Some(EndKind::Else) => 0,
            Some(_) => -1,
            None if self.is_branch_command() => 1,
            None => 0,
        }
    }

    pub fn summary(&self) -> Option<&CommandSummary> {
        self.base.summary.as_ref()
    }

    /// Summary text of the last execution
    pub fn summary_text(&self) -> String {
        CommandSummary::render(self.type_name(), self.base.summary.as_ref())
    }

    pub(crate) fn initialize(
        &mut self,
        seq: &mut MissionSequence,
        id: CommandId,
    ) -> Result<bool, CommandError> {
        let type_name = self.type_name().to_string();
        self.base.scope.validate(&type_name)?;
        self.base.summary = None;
        let mut ctx = Context {
            id,
            base: &mut self.base,
            seq,
        };
        let rslt = dispatch!(&mut self.kind, cmd => cmd.initialize(&mut ctx))?;
        self.base.initialized = true;
        Ok(rslt)
    }

    pub(crate) fn execute(
        &mut self,
        seq: &mut MissionSequence,
        id: CommandId,
    ) -> Result<bool, CommandError> {
        let mut ctx = Context {
            id,
            base: &mut self.base,
            seq,
        };
        let done = dispatch!(&mut self.kind, cmd => cmd.execute(&mut ctx))?;
        if !self.is_branch_end() {
            self.base.summary = Some(CommandSummary::build(
                self.kind.type_name(),
                &self.base.scope,
            ));
        }
        Ok(done)
    }

    pub(crate) fn run_complete(&mut self, seq: &mut MissionSequence, id: CommandId) {
        let mut ctx = Context {
            id,
            base: &mut self.base,
            seq,
        };
        dispatch!(&mut self.kind, cmd => cmd.run_complete(&mut ctx))
    }

    /// The node to execute after this one.
    ///
    /// Branch markers hand control back to their owner, branch commands return
    /// themselves while their loop is active.
    pub(crate) fn get_next(&self, id: CommandId) -> Result<Option<CommandId>, CommandError> {
        match &self.kind {
            CommandKind::BranchEnd(_) => Ok(self.loop_back),
            CommandKind::SolverLoop(cmd) if cmd.stop_requested() => {
                error!("{} completed in Stop exit mode", cmd.type_name());
                crate::errors::RunStoppedSnafu {
                    command: cmd.generating_string(),
                }
                .fail()
            }
            kind => match kind.branch() {
                Some(branch) if branch.executing && !branch.complete => Ok(Some(id)),
                _ => Ok(self.next),
            },
        }
    }
}
