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

use nyx::command::{
    Command, CommandId, Create, EndKind, For, Global, If, MissionSequence, NoOp,
};
use nyx::store::ObjectType;
use nyx::CommandError;

use crate::{assign, end};

/// For I = 1:3 { x = x + I } followed by y = x
fn for_loop(seq: &mut MissionSequence) -> (CommandId, CommandId, CommandId, CommandId) {
    let owner = seq.append(Command::new(For::from_str("I = 1:3").unwrap())).unwrap();
    let body = seq.append(assign("x = x + I")).unwrap();
    let marker = seq.append(end(EndKind::EndFor)).unwrap();
    let after = seq.append(assign("y = x")).unwrap();
    (owner, body, marker, after)
}

#[test]
fn chain_integrity() {
    let mut seq = MissionSequence::new();
    let ids = (0..5)
        .map(|i| seq.append(assign(&format!("x = {i}"))).unwrap())
        .collect::<Vec<_>>();

    let mut forward = Vec::new();
    let mut cur = seq.head();
    while let Some(id) = cur {
        forward.push(id);
        cur = seq.command(id).unwrap().next();
    }
    assert_eq!(forward, ids);

    let mut backward = Vec::new();
    let mut cur = ids.last().copied();
    while let Some(id) = cur {
        backward.push(id);
        cur = seq.command(id).unwrap().previous();
    }
    backward.reverse();
    assert_eq!(backward, ids);
    assert_eq!(seq.walk().len(), 5);
}

#[test]
fn branch_layout() {
    let mut seq = MissionSequence::new();
    let (owner, body, marker, after) = for_loop(&mut seq);

    assert_eq!(seq.head(), Some(owner));
    assert_eq!(seq.child_command(owner, 0), Some(body));
    assert_eq!(seq.command(body).unwrap().previous(), Some(owner));
    assert_eq!(seq.command(body).unwrap().next(), Some(marker));
    // The owner's successor follows its end marker
    assert_eq!(seq.command(owner).unwrap().next(), Some(after));
    assert_eq!(seq.command(marker).unwrap().loop_back(), Some(owner));
    assert!(seq.open_branch_ends().is_empty());

    let depths = seq
        .walk()
        .into_iter()
        .map(|(_, depth)| depth)
        .collect::<Vec<_>>();
    assert_eq!(depths, vec![0, 1, 0, 0]);
}

#[test]
fn loop_back_is_a_bounded_cycle() {
    let mut seq = MissionSequence::new();
    let (owner, body, marker, _) = for_loop(&mut seq);
    assert_eq!(seq.get_next(marker).unwrap(), Some(owner));

    // Following the run order from the branch entry gets back to the owner
    let mut cur = body;
    let mut steps = 0;
    while cur != owner && steps < 10 {
        cur = seq.get_next(cur).unwrap().unwrap();
        steps += 1;
    }
    assert_eq!(cur, owner);
    assert_eq!(steps, 2);
}

#[test]
fn nested_same_type_branches() {
    let mut seq = MissionSequence::new();
    let outer = seq.append(Command::new(For::from_str("I = 1:2").unwrap())).unwrap();
    assert_eq!(seq.open_branch_ends(), vec![EndKind::EndFor]);
    let inner = seq.append(Command::new(For::from_str("J = 1:2").unwrap())).unwrap();
    assert_eq!(seq.open_branch_ends(), vec![EndKind::EndFor, EndKind::EndFor]);
    seq.append(assign("x = x + 1")).unwrap();
    let inner_end = seq.append(end(EndKind::EndFor)).unwrap();
    assert_eq!(seq.open_branch_ends(), vec![EndKind::EndFor]);
    let outer_end = seq.append(end(EndKind::EndFor)).unwrap();
    assert!(seq.open_branch_ends().is_empty());

    assert_eq!(seq.child_command(outer, 0), Some(inner));
    assert_eq!(seq.command(inner_end).unwrap().loop_back(), Some(inner));
    assert_eq!(seq.command(outer_end).unwrap().loop_back(), Some(outer));
    assert_eq!(seq.command(inner).unwrap().next(), Some(outer_end));
}

#[test]
fn else_opens_a_second_branch() {
    let mut seq = MissionSequence::new();
    let owner = seq.append(Command::new(If::from_str("x > 3").unwrap())).unwrap();
    let first = seq.append(assign("y = 1")).unwrap();
    let else_marker = seq.append(end(EndKind::Else)).unwrap();
    let second = seq.append(assign("y = 2")).unwrap();
    assert_eq!(seq.open_branch_ends(), vec![EndKind::EndIf]);
    seq.append(end(EndKind::EndIf)).unwrap();

    let branch = seq.command(owner).unwrap().kind.branch().unwrap();
    assert_eq!(branch.branch_count(), 2);
    assert_eq!(seq.child_command(owner, 0), Some(first));
    assert_eq!(seq.child_command(owner, 1), Some(second));
    assert_eq!(seq.command(else_marker).unwrap().loop_back(), Some(owner));
}

#[test]
fn insertion_points() {
    let mut seq = MissionSequence::new();
    let (owner, body, marker, after) = for_loop(&mut seq);

    // After a branch command: first node of its branch
    let front = seq.add(assign("z = 1"));
    assert!(seq.insert(front, owner).unwrap());
    assert_eq!(seq.child_command(owner, 0), Some(front));
    assert_eq!(seq.command(front).unwrap().next(), Some(body));

    // After an end marker: right after the owner's branch
    let follow = seq.add(assign("z = 2"));
    assert!(seq.insert(follow, marker).unwrap());
    assert_eq!(seq.command(owner).unwrap().next(), Some(follow));
    assert_eq!(seq.command(follow).unwrap().next(), Some(after));
    assert_eq!(seq.command(after).unwrap().previous(), Some(follow));

    // Unknown insertion points are not an error
    let lost = seq.add(Command::new(NoOp));
    let stray = seq.add(Command::new(NoOp));
    assert!(!seq.insert(stray, lost).unwrap());
    assert!(matches!(
        seq.insert(stray, stray),
        Err(CommandError::Structural { .. })
    ));
    assert!(seq.has_configuration_changed());
}

#[test]
fn remove_refuses_end_markers() {
    let mut seq = MissionSequence::new();
    let (owner, body, marker, after) = for_loop(&mut seq);
    let before = seq.walk();
    let script = seq.generate_script();

    assert_eq!(seq.remove(marker), None);
    assert_eq!(seq.walk(), before);
    assert_eq!(seq.generate_script(), script);

    // Removing the branch entry makes its successor the new entry
    assert_eq!(seq.remove(body), Some(body));
    assert_eq!(seq.child_command(owner, 0), Some(marker));
    assert_eq!(seq.command(marker).unwrap().previous(), Some(owner));
    assert_eq!(seq.delete(body), 1);

    // Removing the head
    assert_eq!(seq.remove(owner), Some(owner));
    assert_eq!(seq.head(), Some(after));
    assert_eq!(seq.command(after).unwrap().previous(), None);
    // The owner keeps its branch once detached
    assert_eq!(seq.delete(owner), 2);
    assert_eq!(seq.len(), 1);
}

#[test]
fn appending_to_itself_is_structural() {
    let mut seq = MissionSequence::new();
    let id = seq.append(Command::new(NoOp)).unwrap();
    assert!(matches!(
        seq.append_to(id, id),
        Err(CommandError::Structural { .. })
    ));
    assert_eq!(seq.command(id).unwrap().next(), None);
}

#[test]
fn script_generation() {
    let mut seq = MissionSequence::new();
    seq.append(Command::new(Create::from_str("Variable x y").unwrap()).with_comment("% Setup"))
        .unwrap();
    seq.append(Command::new(Global::new(&["x"]))).unwrap();
    for_loop(&mut seq);
    assert_eq!(
        seq.generate_script(),
        "% Setup\nCreate Variable x y;\nGlobal x;\nFor I = 1:1:3;\n   x = x + I;\nEndFor;\ny = x;"
    );

    // Serialization follows the settings, never the parsed text
    assert!(seq.rename_ref_object(ObjectType::Variable, "x", "z"));
    assert_eq!(
        seq.generate_script(),
        "% Setup\nCreate Variable z y;\nGlobal z;\nFor I = 1:1:3;\n   z = z + I;\nEndFor;\ny = z;"
    );
    let body = seq.walk()[3].0;
    assert_eq!(
        seq.command(body).unwrap().base.source_text.as_deref(),
        Some("x = x + I")
    );
}

#[test]
fn configuration_changed_tracking() {
    let mut seq = MissionSequence::new();
    assert!(!seq.has_configuration_changed());
    let id = seq.append(Command::new(NoOp)).unwrap();
    assert!(seq.has_configuration_changed());
    seq.configuration_changed(false);
    seq.append(Command::new(NoOp)).unwrap();
    assert!(seq.has_configuration_changed());
    seq.configuration_changed(false);
    seq.remove(id);
    assert!(seq.has_configuration_changed());
}
