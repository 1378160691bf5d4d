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

use super::{KindMismatchSnafu, ObjectKind, ObjectRef, Scope, SimObject, StoreError};
use crate::cosmic::{Formation, Spacecraft};

/// Deep copy of the mutable part of one object.
///
/// Only spacecraft and formations are captured: they are the objects a loop body
/// perturbs, everything else is rewritten by the body itself on every pass.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectSnapshot {
    Spacecraft(Spacecraft),
    Formation(Formation),
}

/// Captures the object if it is loop data.
pub fn snapshot(obj: &SimObject) -> Option<ObjectSnapshot> {
    match &obj.kind {
        ObjectKind::Spacecraft(sc) => Some(ObjectSnapshot::Spacecraft(sc.clone())),
        ObjectKind::Formation(formation) => Some(ObjectSnapshot::Formation(formation.clone())),
        _ => None,
    }
}

/// Overwrites the object with the snapshot, keeping the object's identity.
pub fn restore(obj: &mut SimObject, snap: &ObjectSnapshot) -> Result<(), StoreError> {
    match (&mut obj.kind, snap) {
        (ObjectKind::Spacecraft(sc), ObjectSnapshot::Spacecraft(saved)) => {
            *sc = saved.clone();
            Ok(())
        }
        (ObjectKind::Formation(formation), ObjectSnapshot::Formation(saved)) => {
            *formation = saved.clone();
            Ok(())
        }
        (kind, snap) => KindMismatchSnafu {
            name: obj.name.clone(),
            existing: kind.type_name(),
            incoming: match snap {
                ObjectSnapshot::Spacecraft(_) => "Spacecraft",
                ObjectSnapshot::Formation(_) => "Formation",
            },
        }
        .fail(),
    }
}

/// Baseline of every loop data object reachable from a scope, taken before a solver loop iterates.
#[derive(Clone, Debug, Default)]
pub struct LoopSnapshot {
    entries: Vec<(ObjectRef, ObjectSnapshot)>,
}

impl LoopSnapshot {
    /// Captures the local store then the global store.
    pub fn capture(scope: &Scope) -> Self {
        let mut entries = Vec::new();
        for store in [scope.local(), scope.global()].into_iter().flatten() {
            for (_, obj) in store.borrow().iter() {
                if let Some(snap) = snapshot(&obj.borrow()) {
                    entries.push((obj.clone(), snap));
                }
            }
        }
        Self { entries }
    }

    /// Puts every captured object back to its baseline.
    pub fn restore(&self) -> Result<(), StoreError> {
        for (obj, snap) in &self.entries {
            restore(&mut obj.borrow_mut(), snap)?;
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(obj, _)| obj.borrow().name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
