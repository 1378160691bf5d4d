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

use std::rc::Rc;

use snafu::prelude::*;

use super::{ObjectRef, ObjectStore, SharedStore};
use crate::cosmic::{SharedSolarSystem, SOLAR_SYSTEM_NAME};
use crate::errors::{CommandError, MissingContextSnafu, UnresolvedReferenceSnafu};

/// What a name resolves to.
#[derive(Clone, Debug)]
pub enum Resolved {
    SolarSystem(SharedSolarSystem),
    Object(ObjectRef),
}

/// The object stores a command sees: the local store, the global store, and the solar system catalogue.
///
/// All three are shared by reference with every other command of the sequence, none of them is owned here.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    local: Option<SharedStore>,
    global: Option<SharedStore>,
    solar_system: Option<SharedSolarSystem>,
}

/// Strips any trailing index syntax, e.g. `A(2, 3)` becomes `A`.
pub fn strip_index(name: &str) -> &str {
    match name.find('(') {
        Some(idx) => name[..idx].trim(),
        None => name.trim(),
    }
}

impl Scope {
    pub fn new(local: SharedStore, global: SharedStore, solar_system: SharedSolarSystem) -> Self {
        Self {
            local: Some(local),
            global: Some(global),
            solar_system: Some(solar_system),
        }
    }

    pub fn set_object_map(&mut self, local: SharedStore) {
        self.local = Some(local);
    }

    pub fn set_global_object_map(&mut self, global: SharedStore) {
        self.global = Some(global);
    }

    pub fn set_solar_system(&mut self, solar_system: SharedSolarSystem) {
        self.solar_system = Some(solar_system);
    }

    pub fn local(&self) -> Option<&SharedStore> {
        self.local.as_ref()
    }

    pub fn global(&self) -> Option<&SharedStore> {
        self.global.as_ref()
    }

    pub fn solar_system(&self) -> Option<&SharedSolarSystem> {
        self.solar_system.as_ref()
    }

    /// Fails with a missing context error naming the first store that was never injected.
    pub fn validate(&self, command: &str) -> Result<(), CommandError> {
        ensure!(
            self.local.is_some(),
            MissingContextSnafu {
                command,
                missing: "local object store"
            }
        );
        ensure!(
            self.global.is_some(),
            MissingContextSnafu {
                command,
                missing: "global object store"
            }
        );
        ensure!(
            self.solar_system.is_some(),
            MissingContextSnafu {
                command,
                missing: "solar system"
            }
        );
        Ok(())
    }

    /// Both stores, or a missing context error.
    pub fn stores(&self, command: &str) -> Result<(SharedStore, SharedStore), CommandError> {
        self.validate(command)?;
        match (&self.local, &self.global) {
            (Some(local), Some(global)) => Ok((local.clone(), global.clone())),
            _ => MissingContextSnafu {
                command,
                missing: "object stores",
            }
            .fail(),
        }
    }

    /// Looks the name up in order: the reserved solar system name, the local store,
    /// the global store, then the bodies of the solar system. The first match wins.
    pub fn find(&self, name: &str) -> Option<Resolved> {
        let name = strip_index(name);
        if name == SOLAR_SYSTEM_NAME {
            return self.solar_system.clone().map(Resolved::SolarSystem);
        }
        if let Some(obj) = self.local.as_ref().and_then(|los| los.borrow().get(name)) {
            return Some(Resolved::Object(obj));
        }
        if let Some(obj) = self.global.as_ref().and_then(|gos| gos.borrow().get(name)) {
            return Some(Resolved::Object(obj));
        }
        self.solar_system
            .as_ref()
            .and_then(|ss| ss.borrow().body(name))
            .map(Resolved::Object)
    }

    /// Same as `find` but only returns stored objects (i.e. never the solar system itself).
    pub fn find_object(&self, name: &str) -> Option<ObjectRef> {
        match self.find(name)? {
            Resolved::Object(obj) => Some(obj),
            Resolved::SolarSystem(_) => None,
        }
    }

    /// Resolves the name or fails with an unresolved reference error naming the command.
    pub fn resolve(&self, command: &str, name: &str) -> Result<ObjectRef, CommandError> {
        self.find_object(name).context(UnresolvedReferenceSnafu {
            command,
            name: strip_index(name),
        })
    }

    /// Scope of a function invocation: a fresh local store, the same global store and solar system.
    pub fn function_scope(&self) -> Self {
        Self {
            local: Some(ObjectStore::new().shared()),
            global: self.global.clone(),
            solar_system: self.solar_system.clone(),
        }
    }

    /// True if both scopes share the very same stores
    pub fn same_stores(&self, other: &Self) -> bool {
        fn same<T>(a: &Option<Rc<T>>, b: &Option<Rc<T>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
        }
        same(&self.local, &other.local)
            && same(&self.global, &other.global)
            && same(&self.solar_system, &other.solar_system)
    }
}
