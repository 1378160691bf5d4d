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

use enum_iterator::Sequence;

use super::{CommandId, Context, Executable, Initializable, Renameable, Serializable};
use crate::errors::CommandError;
use crate::store::ObjectType;

/// The markers closing a branch. `Else` closes the first branch of an If and opens the second.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Sequence)]
pub enum EndKind {
    EndIf,
    Else,
    EndFor,
    EndWhile,
    EndTarget,
    EndOptimize,
}

impl EndKind {
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::EndIf => "EndIf",
            Self::Else => "Else",
            Self::EndFor => "EndFor",
            Self::EndWhile => "EndWhile",
            Self::EndTarget => "EndTarget",
            Self::EndOptimize => "EndOptimize",
        }
    }

    pub const fn is_else(&self) -> bool {
        matches!(self, Self::Else)
    }

    /// True if this marker closes a branch of a command whose end marker is `end`
    pub const fn closes(&self, end: EndKind) -> bool {
        match (self, end) {
            (Self::Else, Self::EndIf) => true,
            (a, b) => *a as u8 == b as u8,
        }
    }
}

impl fmt::Display for EndKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Terminal node of a branch, handing control back to the branch owner.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BranchEnd {
    pub end: EndKind,
}

impl BranchEnd {
    pub fn new(end: EndKind) -> Self {
        Self { end }
    }
}

impl Initializable for BranchEnd {
    fn initialize(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        Ok(true)
    }
}

impl Executable for BranchEnd {
    fn execute(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        Ok(true)
    }

    fn skip_interrupt(&self) -> bool {
        true
    }
}

impl Renameable for BranchEnd {
    fn rename_ref_object(&mut self, _: ObjectType, _: &str, _: &str) -> bool {
        true
    }
}

impl Serializable for BranchEnd {
    fn type_name(&self) -> &str {
        self.end.type_name()
    }

    fn generating_string(&self) -> String {
        if self.end.is_else() {
            self.end.to_string()
        } else {
            format!("{};", self.end)
        }
    }
}

/// Branch bookkeeping shared by If, For, While, Target and Optimize.
#[derive(Clone, Debug)]
pub struct BranchState {
    /// Entry node of each branch
    pub(crate) branches: Vec<Option<CommandId>>,
    /// Branch receiving appended commands, None once the branch is closed
    pub(crate) branch_to_fill: Option<usize>,
    /// Depth of same-type branch commands nested in the branch being filled
    pub(crate) nest_level: usize,
    /// Next node of the branch pass in progress
    pub(crate) current: Option<CommandId>,
    pub executing: bool,
    pub complete: bool,
    pub branch_executing: bool,
}

impl Default for BranchState {
    fn default() -> Self {
        Self {
            branches: vec![None],
            branch_to_fill: Some(0),
            nest_level: 0,
            current: None,
            executing: false,
            complete: false,
            branch_executing: false,
        }
    }
}

impl BranchState {
    /// Entry of the requested branch (child command access)
    pub fn branch(&self, which: usize) -> Option<CommandId> {
        self.branches.get(which).copied().flatten()
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// True until the matching end marker is appended
    pub fn is_open(&self) -> bool {
        self.branch_to_fill.is_some()
    }

    pub fn nest_level(&self) -> usize {
        self.nest_level
    }

    /// Back to idle, ready for a new run
    pub fn reset(&mut self) {
        self.executing = false;
        self.complete = false;
        self.branch_executing = false;
        self.current = None;
    }

    /// Initializes every command of every branch.
    pub fn initialize_branches(&self, ctx: &mut Context<'_>) -> Result<(), CommandError> {
        for entry in self.branches.iter().flatten() {
            ctx.seq.initialize_chain(*entry)?;
        }
        Ok(())
    }

    /// Executes one node of the branch and moves the cursor forward.
    ///
    /// The pass ends (and `branch_executing` drops) once the node hands control back to the owner.
    pub fn execute_branch(&mut self, ctx: &mut Context<'_>, which: usize) -> Result<bool, CommandError> {
        let node = match self.current.or_else(|| self.branch(which)) {
            Some(node) => node,
            None => {
                self.branch_executing = false;
                return Ok(true);
            }
        };
        self.branch_executing = true;
        let done = ctx.seq.execute(node)?;
        match ctx.seq.get_next(node)? {
            Some(next) if next != ctx.id => self.current = Some(next),
            _ => {
                self.current = None;
                self.branch_executing = false;
            }
        }
        Ok(done)
    }

    /// Runs a complete pass of the branch within a single call.
    pub fn run_branch_pass(&mut self, ctx: &mut Context<'_>, which: usize) -> Result<bool, CommandError> {
        let mut done = true;
        loop {
            done &= self.execute_branch(ctx, which)?;
            if !self.branch_executing {
                return Ok(done);
            }
        }
    }

    /// Resets the branch and every command of its branches.
    pub fn run_complete(&mut self, ctx: &mut Context<'_>) {
        self.reset();
        for entry in self.branches.iter().flatten() {
            ctx.seq.run_complete_chain(*entry);
        }
    }
}

#[cfg(test)]
mod ut_branch {
    use super::*;
    use enum_iterator::all;

    #[test]
    fn end_kinds() {
        for end in all::<EndKind>() {
            assert!(end.closes(end));
            assert_eq!(end.to_string(), end.type_name());
            let marker = BranchEnd::new(end);
            assert!(marker.skip_interrupt());
            if end.is_else() {
                assert_eq!(marker.generating_string(), "Else");
            } else {
                assert!(marker.generating_string().ends_with(';'));
            }
        }
        assert!(EndKind::Else.closes(EndKind::EndIf));
        assert!(!EndKind::Else.closes(EndKind::EndFor));
        assert!(!EndKind::EndFor.closes(EndKind::EndWhile));
    }

    #[test]
    fn fresh_branch_is_open() {
        let branch = BranchState::default();
        assert!(branch.is_open());
        assert_eq!(branch.branch_count(), 1);
        assert_eq!(branch.branch(0), None);
        assert_eq!(branch.branch(3), None);
    }
}
