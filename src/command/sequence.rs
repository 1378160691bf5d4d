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

use std::mem;

use snafu::prelude::*;

use super::{Command, CommandId, EndKind};
use crate::errors::{BusySnafu, CommandError, StructuralSnafu};
use crate::publisher::SharedPublisher;
use crate::solvers::WeakSolver;
use crate::store::{ObjectType, Scope};

/// Indentation of one nesting level in generated scripts
const INDENT: &str = "   ";

#[derive(Debug)]
enum Slot {
    Vacant,
    Occupied(Box<Command>),
    /// Checked out while the command initializes, executes or completes
    Executing,
}

/// Arena of command nodes linked into a mission sequence.
///
/// Nodes are addressed by `CommandId` and link to each other through `next` and
/// `previous`. Branch commands own the entry node of each of their branches, and every
/// branch ends with a marker whose loop back edge names the owner.
#[derive(Debug, Default)]
pub struct MissionSequence {
    slots: Vec<Slot>,
    head: Option<CommandId>,
    config_changed: bool,
}

impl MissionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<CommandId> {
        self.head
    }

    /// Number of commands held, linked or not
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !matches!(slot, Slot::Vacant))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the sequence was edited since the flag was last cleared
    pub fn has_configuration_changed(&self) -> bool {
        self.config_changed
    }

    pub fn configuration_changed(&mut self, changed: bool) {
        self.config_changed = changed;
    }

    /// The command, unless it is being executed
    pub fn command(&self, id: CommandId) -> Option<&Command> {
        match self.slots.get(id.0)? {
            Slot::Occupied(cmd) => Some(cmd),
            _ => None,
        }
    }

    pub fn command_mut(&mut self, id: CommandId) -> Option<&mut Command> {
        match self.slots.get_mut(id.0)? {
            Slot::Occupied(cmd) => Some(cmd),
            _ => None,
        }
    }

    /// Every command held by the sequence, linked or not
    pub fn commands(&self) -> impl Iterator<Item = (CommandId, &Command)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| match slot {
                Slot::Occupied(cmd) => Some((CommandId(idx), cmd.as_ref())),
                _ => None,
            })
    }

    fn commands_mut(&mut self) -> impl Iterator<Item = &mut Command> {
        self.slots.iter_mut().filter_map(|slot| match slot {
            Slot::Occupied(cmd) => Some(cmd.as_mut()),
            _ => None,
        })
    }

    fn node(&self, id: CommandId) -> Result<&Command, CommandError> {
        match self.slots.get(id.0) {
            Some(Slot::Occupied(cmd)) => Ok(cmd),
            Some(Slot::Executing) => BusySnafu { id: id.0 }.fail(),
            _ => StructuralSnafu {
                details: format!("no command {id} in this sequence"),
            }
            .fail(),
        }
    }

    fn node_mut(&mut self, id: CommandId) -> Result<&mut Command, CommandError> {
        match self.slots.get_mut(id.0) {
            Some(Slot::Occupied(cmd)) => Ok(cmd),
            Some(Slot::Executing) => BusySnafu { id: id.0 }.fail(),
            _ => StructuralSnafu {
                details: format!("no command {id} in this sequence"),
            }
            .fail(),
        }
    }

    fn checkout(&mut self, id: CommandId) -> Result<Box<Command>, CommandError> {
        let slot = self.slots.get_mut(id.0).context(StructuralSnafu {
            details: format!("no command {id} in this sequence"),
        })?;
        match mem::replace(slot, Slot::Executing) {
            Slot::Occupied(cmd) => Ok(cmd),
            Slot::Executing => BusySnafu { id: id.0 }.fail(),
            Slot::Vacant => {
                *slot = Slot::Vacant;
                StructuralSnafu {
                    details: format!("command {id} was deleted"),
                }
                .fail()
            }
        }
    }

    fn checkin(&mut self, id: CommandId, cmd: Box<Command>) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            *slot = Slot::Occupied(cmd);
        }
    }

    /// Stores a command without linking it anywhere.
    pub fn add(&mut self, cmd: Command) -> CommandId {
        self.slots.push(Slot::Occupied(Box::new(cmd)));
        CommandId(self.slots.len() - 1)
    }

    /// Appends a command at the end of the sequence, routing it into the open branch if any.
    pub fn append(&mut self, cmd: Command) -> Result<CommandId, CommandError> {
        let id = self.add(cmd);
        match self.head {
            None => {
                self.head = Some(id);
                self.config_changed = true;
            }
            Some(head) => {
                if let Err(e) = self.append_to(head, id) {
                    self.slots[id.0] = Slot::Vacant;
                    return Err(e);
                }
            }
        }
        Ok(id)
    }

    /// Appends `new` to the chain starting at `at`.
    ///
    /// An open branch command receives the node in the branch it is filling, and closes
    /// that branch when the node is its matching end marker.
    pub fn append_to(&mut self, at: CommandId, new: CommandId) -> Result<(), CommandError> {
        if at == new {
            error!("attempted to append command {new} to itself");
            return StructuralSnafu {
                details: format!("cannot append command {new} to itself"),
            }
            .fail();
        }
        ensure!(
            self.node(new)?.previous.is_none() && self.head != Some(new),
            StructuralSnafu {
                details: format!("command {new} is already linked")
            }
        );
        let mut tail = at;
        loop {
            let node = self.node(tail)?;
            if let Some(which) = node.kind.branch().and_then(|branch| branch.branch_to_fill) {
                return self.append_into_branch(tail, which, new);
            }
            if node.is_branch_end() {
                error!("attempted to append after {} {tail}", node.type_name());
                return StructuralSnafu {
                    details: format!("cannot append after the closed branch end {tail}"),
                }
                .fail();
            }
            match node.next {
                Some(next) if next == new => {
                    return StructuralSnafu {
                        details: format!("command {new} is already in this chain"),
                    }
                    .fail()
                }
                Some(next) => tail = next,
                None => break,
            }
        }
        self.node_mut(tail)?.next = Some(new);
        self.node_mut(new)?.previous = Some(tail);
        self.config_changed = true;
        Ok(())
    }

    fn append_into_branch(
        &mut self,
        owner: CommandId,
        which: usize,
        new: CommandId,
    ) -> Result<(), CommandError> {
        let entry = self
            .node(owner)?
            .kind
            .branch()
            .and_then(|branch| branch.branch(which));
        match entry {
            Some(entry) => self.append_to(entry, new)?,
            None => {
                if let Some(branch) = self.node_mut(owner)?.kind.branch_mut() {
                    branch.branches[which] = Some(new);
                }
                self.node_mut(new)?.previous = Some(owner);
            }
        }

        let (marker, new_end) = {
            let node = self.node(new)?;
            (node.kind.marker(), node.kind.end_kind())
        };
        let owner_node = self.node_mut(owner)?;
        let owner_end = owner_node.kind.end_kind();
        let mut closed = false;
        if let (Some(branch), Some(owner_end)) = (owner_node.kind.branch_mut(), owner_end) {
            match marker {
                Some(marker) if marker.closes(owner_end) => {
                    if branch.nest_level == 0 {
                        if marker.is_else() {
                            branch.branches.push(None);
                            branch.branch_to_fill = Some(which + 1);
                        } else {
                            branch.branch_to_fill = None;
                        }
                        closed = true;
                    } else if !marker.is_else() {
                        branch.nest_level -= 1;
                    }
                }
                _ if new_end == Some(owner_end) => branch.nest_level += 1,
                _ => {}
            }
        }
        if closed {
            debug!("{new} closes branch {which} of {owner}");
            self.node_mut(new)?.loop_back = Some(owner);
        }
        self.config_changed = true;
        Ok(())
    }

    /// Last node reached by following `next` from `start`
    fn chain_tail(&self, start: CommandId) -> Result<CommandId, CommandError> {
        let mut tail = start;
        while let Some(next) = self.node(tail)?.next {
            tail = next;
        }
        Ok(tail)
    }

    /// Tail of the detached chain starting at `node`.
    ///
    /// Fails if `node` or any command following it is already linked, or if the chain loops.
    fn detached_tail(&self, node: CommandId) -> Result<CommandId, CommandError> {
        let linked: Vec<CommandId> = self.walk().into_iter().map(|(id, _)| id).collect();
        let first = self.node(node)?;
        ensure!(
            first.previous.is_none() && !linked.contains(&node),
            StructuralSnafu {
                details: format!("command {node} is already linked")
            }
        );
        let mut chain = vec![node];
        let mut tail = node;
        while let Some(next) = self.node(tail)?.next {
            ensure!(
                !linked.contains(&next) && !chain.contains(&next),
                StructuralSnafu {
                    details: format!("chain following {node} loops into linked commands")
                }
            );
            chain.push(next);
            tail = next;
        }
        Ok(tail)
    }

    fn splice_after(
        &mut self,
        prev: CommandId,
        node: CommandId,
        tail: CommandId,
    ) -> Result<(), CommandError> {
        let old_next = self.node(prev)?.next;
        self.node_mut(prev)?.next = Some(node);
        self.node_mut(node)?.previous = Some(prev);
        self.node_mut(tail)?.next = old_next;
        if let Some(old_next) = old_next {
            self.node_mut(old_next)?.previous = Some(tail);
        }
        Ok(())
    }

    fn splice_branch_front(
        &mut self,
        owner: CommandId,
        which: usize,
        node: CommandId,
        tail: CommandId,
    ) -> Result<(), CommandError> {
        let old_entry = match self.node_mut(owner)?.kind.branch_mut() {
            Some(branch) if which < branch.branches.len() => {
                mem::replace(&mut branch.branches[which], Some(node))
            }
            _ => {
                return StructuralSnafu {
                    details: format!("{owner} has no branch {which}"),
                }
                .fail()
            }
        };
        self.node_mut(node)?.previous = Some(owner);
        self.node_mut(tail)?.next = old_entry;
        if let Some(old_entry) = old_entry {
            self.node_mut(old_entry)?.previous = Some(tail);
        }
        Ok(())
    }

    /// Index of the branch of `owner` closed by the marker `end`
    fn branch_closed_by(&self, owner: CommandId, end: CommandId) -> Result<usize, CommandError> {
        let branch = self.node(owner)?.kind.branch();
        for (which, entry) in branch.into_iter().flat_map(|b| b.branches.iter().enumerate()) {
            if let Some(entry) = entry {
                if self.chain_tail(*entry)? == end {
                    return Ok(which);
                }
            }
        }
        StructuralSnafu {
            details: format!("{end} does not close any branch of {owner}"),
        }
        .fail()
    }

    /// Inserts `node` (and the chain following it) right after `after`.
    ///
    /// After a branch command the node starts its first branch, after an Else it starts
    /// the next branch, and after an end marker it follows the owner of that branch.
    /// Returns false if `after` is not part of the sequence. Inserting a command that is
    /// already linked, or that does not exist, is a structural error and leaves the
    /// sequence untouched.
    pub fn insert(&mut self, node: CommandId, after: CommandId) -> Result<bool, CommandError> {
        ensure!(
            node != after,
            StructuralSnafu {
                details: format!("cannot insert command {node} after itself")
            }
        );
        if !self.contains(after) {
            debug!("{after} not found, {node} not inserted");
            return Ok(false);
        }
        let tail = self.detached_tail(node)?;
        let (is_branch_command, marker, owner) = {
            let target = self.node(after)?;
            (target.is_branch_command(), target.kind.marker(), target.loop_back)
        };
        if is_branch_command {
            self.splice_branch_front(after, 0, node, tail)?;
        } else if let Some(marker) = marker {
            let owner = owner.context(StructuralSnafu {
                details: format!("{marker} {after} does not close a branch"),
            })?;
            if marker.is_else() {
                let which = self.branch_closed_by(owner, after)?;
                self.splice_branch_front(owner, which + 1, node, tail)?;
            } else {
                self.splice_after(owner, node, tail)?;
            }
        } else {
            self.splice_after(after, node, tail)?;
        }
        self.config_changed = true;
        Ok(true)
    }

    /// Unlinks a command from the sequence, returning it detached (with its branches).
    ///
    /// Branch end markers cannot be removed on their own, and neither can commands
    /// that are not part of the sequence: both yield None and leave the sequence untouched.
    pub fn remove(&mut self, target: CommandId) -> Option<CommandId> {
        let node = self.command(target)?;
        if node.is_branch_end() {
            debug!("refusing to remove {} {target}", node.type_name());
            return None;
        }
        let (previous, next) = (node.previous, node.next);
        if !self.contains(target) {
            return None;
        }

        if self.head == Some(target) {
            self.head = next;
            if let Some(next) = next.and_then(|id| self.command_mut(id)) {
                next.previous = None;
            }
        } else if let Some(prev) = previous {
            let prev_node = self.command_mut(prev)?;
            let entry_of = prev_node.kind.branch_mut().and_then(|branch| {
                branch
                    .branches
                    .iter_mut()
                    .find(|entry| **entry == Some(target))
            });
            match entry_of {
                Some(entry) => *entry = next,
                None => prev_node.next = next,
            }
            if let Some(next) = next.and_then(|id| self.command_mut(id)) {
                next.previous = Some(prev);
            }
        }

        let node = self.command_mut(target)?;
        node.next = None;
        node.previous = None;
        self.config_changed = true;
        debug!("removed {target}");
        Some(target)
    }

    /// Frees a detached command, the chain following it and its branches.
    /// Returns the number of commands freed.
    pub fn delete(&mut self, id: CommandId) -> usize {
        let mut freed = 0;
        let mut pending = vec![id];
        while let Some(cur) = pending.pop() {
            let cmd = match self.slots.get_mut(cur.0) {
                Some(slot) if matches!(slot, Slot::Occupied(_)) => {
                    match mem::replace(slot, Slot::Vacant) {
                        Slot::Occupied(cmd) => cmd,
                        _ => continue,
                    }
                }
                _ => continue,
            };
            freed += 1;
            if self.head == Some(cur) {
                self.head = None;
            }
            // A marker's loop back edge is not ownership
            if cmd.is_branch_end() {
                continue;
            }
            pending.extend(cmd.next);
            if let Some(branch) = cmd.kind.branch() {
                pending.extend(branch.branches.iter().flatten().copied());
            }
        }
        freed
    }

    /// Deletes every command.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = None;
        self.config_changed = true;
    }

    /// Every command reachable from the head with its nesting depth, in script order.
    pub fn walk(&self) -> Vec<(CommandId, usize)> {
        let mut visited = Vec::new();
        if let Some(head) = self.head {
            self.walk_chain(head, 0, &mut visited);
        }
        visited
    }

    fn walk_chain(&self, start: CommandId, depth: usize, visited: &mut Vec<(CommandId, usize)>) {
        let mut cur = Some(start);
        while let Some(id) = cur {
            let Some(node) = self.command(id) else { break };
            if node.is_branch_end() {
                visited.push((id, depth.saturating_sub(1)));
                break;
            }
            visited.push((id, depth));
            if let Some(branch) = node.kind.branch() {
                for entry in branch.branches.iter().flatten() {
                    self.walk_chain(*entry, depth + 1, visited);
                }
            }
            cur = node.next;
        }
    }

    /// True if the command is reachable from the head
    pub fn contains(&self, id: CommandId) -> bool {
        self.walk().iter().any(|(visited, _)| *visited == id)
    }

    /// Entry node of a branch of a branch command
    pub fn child_command(&self, owner: CommandId, which: usize) -> Option<CommandId> {
        self.command(owner)?.kind.branch()?.branch(which)
    }

    /// Script text of the whole sequence, indented by nesting depth.
    pub fn generate_script(&self) -> String {
        let mut lines = Vec::new();
        for (id, depth) in self.walk() {
            if let Some(cmd) = self.command(id) {
                let indent = INDENT.repeat(depth);
                for line in cmd.base.comment.lines() {
                    lines.push(format!("{indent}{line}"));
                }
                lines.push(format!("{indent}{}", cmd.generating_string()));
            }
        }
        lines.join("\n")
    }

    /// Renames every reference to an object throughout the sequence.
    pub fn rename_ref_object(&mut self, obj_type: ObjectType, old_name: &str, new_name: &str) -> bool {
        for (id, _) in self.walk() {
            if let Some(cmd) = self.command_mut(id) {
                cmd.kind.rename_ref_object(obj_type, old_name, new_name);
            }
        }
        true
    }

    /// Injects the stores in every command.
    pub fn set_scope(&mut self, scope: &Scope) {
        for cmd in self.commands_mut() {
            cmd.base.scope = scope.clone();
        }
    }

    pub fn set_publisher(&mut self, publisher: &SharedPublisher) {
        for cmd in self.commands_mut() {
            cmd.base.publisher = Some(publisher.clone());
        }
    }

    pub fn initialize(&mut self, id: CommandId) -> Result<bool, CommandError> {
        let mut cmd = self.checkout(id)?;
        let rslt = cmd.initialize(self, id);
        self.checkin(id, cmd);
        rslt
    }

    /// Initializes every command of the chain starting at `start`, stopping after its end marker.
    pub fn initialize_chain(&mut self, start: CommandId) -> Result<(), CommandError> {
        let mut cur = Some(start);
        while let Some(id) = cur {
            self.initialize(id)?;
            let node = self.node(id)?;
            if node.is_branch_end() {
                break;
            }
            cur = node.next;
        }
        Ok(())
    }

    /// Initializes the main chain, branch commands initialize their branches.
    pub fn initialize_all(&mut self) -> Result<(), CommandError> {
        match self.head {
            Some(head) => self.initialize_chain(head),
            None => Ok(()),
        }
    }

    pub fn execute(&mut self, id: CommandId) -> Result<bool, CommandError> {
        let mut cmd = self.checkout(id)?;
        let rslt = cmd.execute(self, id);
        self.checkin(id, cmd);
        rslt
    }

    /// The command to run after `id`, see `Command::get_next`.
    pub fn get_next(&self, id: CommandId) -> Result<Option<CommandId>, CommandError> {
        self.node(id)?.get_next(id)
    }

    pub fn skip_interrupt(&self, id: CommandId) -> bool {
        self.command(id)
            .map_or(false, |cmd| cmd.kind.skip_interrupt())
    }

    pub fn run_complete(&mut self, id: CommandId) {
        if let Ok(mut cmd) = self.checkout(id) {
            cmd.run_complete(self, id);
            self.checkin(id, cmd);
        }
    }

    /// Completes every command of the chain, without following loop back edges.
    pub fn run_complete_chain(&mut self, start: CommandId) {
        let mut cur = Some(start);
        while let Some(id) = cur {
            self.run_complete(id);
            cur = match self.command(id) {
                Some(node) if !node.is_branch_end() => node.next,
                _ => None,
            };
        }
    }

    pub fn run_complete_all(&mut self) {
        if let Some(head) = self.head {
            self.run_complete_chain(head);
        }
    }

    /// Attaches a solver to the ports naming it, down through control flow but not into nested solver loops.
    pub(crate) fn bind_solver_chain(&mut self, start: CommandId, solver_name: &str, solver: &WeakSolver) {
        let mut cur = Some(start);
        while let Some(id) = cur {
            let Some(node) = self.command_mut(id) else { break };
            if node.is_branch_end() {
                break;
            }
            node.kind.bind_solver(solver_name, solver);
            let nested = match &node.kind {
                super::CommandKind::SolverLoop(_) => Vec::new(),
                kind => kind
                    .branch()
                    .map(|branch| branch.branches.iter().flatten().copied().collect())
                    .unwrap_or_default(),
            };
            cur = node.next;
            for entry in nested {
                self.bind_solver_chain(entry, solver_name, solver);
            }
        }
    }

    /// Concatenation of the summaries of every command but the branch markers.
    pub fn mission_summary(&self) -> String {
        self.walk()
            .into_iter()
            .filter_map(|(id, _)| self.command(id))
            .filter(|cmd| !cmd.is_branch_end())
            .map(|cmd| cmd.summary_text())
            .collect()
    }

    /// Markers still missing to close the open branch commands, innermost first
    pub fn open_branch_ends(&self) -> Vec<EndKind> {
        let mut ends = Vec::new();
        let mut cur = self.head;
        while let Some(id) = cur {
            let Some(node) = self.command(id) else { break };
            match node.kind.branch() {
                Some(branch) if branch.is_open() => {
                    if let Some(end) = node.kind.end_kind() {
                        ends.push(end);
                    }
                    cur = branch.branch_to_fill.and_then(|which| branch.branch(which));
                }
                _ => cur = node.next,
            }
        }
        ends.reverse();
        ends
    }
}
