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

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use enum_iterator::Sequence;
use snafu::prelude::*;

use crate::cosmic::{CelestialBody, Formation, Spacecraft};
use crate::linalg::DMatrix;
use crate::md::{OutOfBoundsSnafu, ParamError};
use crate::solvers::Solver;

mod resolver;
pub use resolver::*;

mod snapshot;
pub use snapshot::*;

#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("`{name}` is already a {existing}, it cannot be redefined as a {incoming}"))]
    KindMismatch {
        name: String,
        existing: String,
        incoming: String,
    },
    #[snafu(display(
        "array `{name}` is already {existing_rows}x{existing_cols}, it cannot be redefined as {rows}x{cols}"
    ))]
    DimensionMismatch {
        name: String,
        existing_rows: usize,
        existing_cols: usize,
        rows: usize,
        cols: usize,
    },
    #[snafu(display("`{name}` is not in the {store} object store"))]
    NotFound { name: String, store: &'static str },
}

/// Broad categories of objects a store can hold.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Sequence)]
pub enum ObjectType {
    Spacecraft,
    Formation,
    Variable,
    Array,
    String,
    Solver,
    CelestialBody,
}

impl ObjectType {
    /// Objects that a solver loop snapshots before iterating
    pub const fn is_loop_data(&self) -> bool {
        matches!(self, Self::Spacecraft | Self::Formation)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Spacecraft => "Spacecraft",
            Self::Formation => "Formation",
            Self::Variable => "Variable",
            Self::Array => "Array",
            Self::String => "String",
            Self::Solver => "Solver",
            Self::CelestialBody => "CelestialBody",
        };
        write!(f, "{repr}")
    }
}

impl FromStr for ObjectType {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spacecraft" => Ok(Self::Spacecraft),
            "formation" => Ok(Self::Formation),
            "variable" => Ok(Self::Variable),
            "array" => Ok(Self::Array),
            "string" => Ok(Self::String),
            "solver" | "differentialcorrector" | "gradientdescent" => Ok(Self::Solver),
            "celestialbody" | "planet" | "moon" => Ok(Self::CelestialBody),
            _ => Err(ParamError::Parse {
                text: s.to_string(),
                reason: "unknown object type".to_string(),
            }),
        }
    }
}

/// A two dimensional array of reals, indexed from one as in mission scripts.
#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    values: DMatrix<f64>,
}

impl Array {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            values: DMatrix::zeros(rows, cols),
        }
    }

    /// Builds an array from row-major values.
    pub fn from_row_slice(rows: usize, cols: usize, values: &[f64]) -> Self {
        Self {
            values: DMatrix::from_row_slice(rows, cols, values),
        }
    }

    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn cols(&self) -> usize {
        self.values.ncols()
    }

    fn check_bounds(&self, name: &str, row: usize, col: usize) -> Result<(), ParamError> {
        ensure!(
            row >= 1 && col >= 1 && row <= self.rows() && col <= self.cols(),
            OutOfBoundsSnafu {
                name: name.to_string(),
                row,
                col,
                rows: self.rows(),
                cols: self.cols()
            }
        );
        Ok(())
    }

    /// Element at one-based (row, col)
    pub fn get(&self, name: &str, row: usize, col: usize) -> Result<f64, ParamError> {
        self.check_bounds(name, row, col)?;
        Ok(self.values[(row - 1, col - 1)])
    }

    pub fn set(&mut self, name: &str, row: usize, col: usize, value: f64) -> Result<(), ParamError> {
        self.check_bounds(name, row, col)?;
        self.values[(row - 1, col - 1)] = value;
        Ok(())
    }
}

/// The payload of a named object.
#[derive(Clone, Debug)]
pub enum ObjectKind {
    Spacecraft(Spacecraft),
    Formation(Formation),
    Variable(f64),
    Array(Array),
    String(String),
    Solver(Box<dyn Solver>),
    CelestialBody(CelestialBody),
}

impl ObjectKind {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Spacecraft(_) => ObjectType::Spacecraft,
            Self::Formation(_) => ObjectType::Formation,
            Self::Variable(_) => ObjectType::Variable,
            Self::Array(_) => ObjectType::Array,
            Self::String(_) => ObjectType::String,
            Self::Solver(_) => ObjectType::Solver,
            Self::CelestialBody(_) => ObjectType::CelestialBody,
        }
    }

    /// Script type name, which for solvers is the name of the implementation.
    pub fn type_name(&self) -> String {
        match self {
            Self::Solver(solver) => solver.type_name().to_string(),
            _ => self.object_type().to_string(),
        }
    }
}

/// A named object living in one of the object stores.
#[derive(Clone, Debug)]
pub struct SimObject {
    pub name: String,
    pub is_global: bool,
    pub kind: ObjectKind,
}

/// Handle to an object shared between the stores and the commands.
pub type ObjectRef = Rc<RefCell<SimObject>>;

impl SimObject {
    pub fn new(name: &str, kind: ObjectKind) -> Self {
        Self {
            name: name.to_string(),
            is_global: false,
            kind,
        }
    }

    /// Same as `new` but flagged for insertion in the global store
    pub fn global(name: &str, kind: ObjectKind) -> Self {
        Self {
            is_global: true,
            ..Self::new(name, kind)
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.kind.object_type()
    }

    pub fn shared(self) -> ObjectRef {
        Rc::new(RefCell::new(self))
    }

    /// Checks that `incoming` may share this object's name, i.e. same type and, for arrays, same shape.
    pub fn check_compatible(&self, incoming: &SimObject) -> Result<(), StoreError> {
        ensure!(
            self.kind.type_name() == incoming.kind.type_name(),
            KindMismatchSnafu {
                name: self.name.clone(),
                existing: self.kind.type_name(),
                incoming: incoming.kind.type_name(),
            }
        );
        if let (ObjectKind::Array(existing), ObjectKind::Array(array)) = (&self.kind, &incoming.kind)
        {
            ensure!(
                existing.rows() == array.rows() && existing.cols() == array.cols(),
                DimensionMismatchSnafu {
                    name: self.name.clone(),
                    existing_rows: existing.rows(),
                    existing_cols: existing.cols(),
                    rows: array.rows(),
                    cols: array.cols(),
                }
            );
        }
        Ok(())
    }
}

/// A name to object mapping, either the local (LOS) or global (GOS) object store.
#[derive(Clone, Debug, Default)]
pub struct ObjectStore {
    objects: BTreeMap<String, ObjectRef>,
}

pub type SharedStore = Rc<RefCell<ObjectStore>>;

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedStore {
        Rc::new(RefCell::new(self))
    }

    pub fn get(&self, name: &str) -> Option<ObjectRef> {
        self.objects.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Binds the object under its own name, returning the previous binding if any.
    pub fn insert(&mut self, obj: ObjectRef) -> Option<ObjectRef> {
        let name = obj.borrow().name.clone();
        self.objects.insert(name, obj)
    }

    /// Removes the mapping, not the object: other holders of the handle keep it alive.
    pub fn remove(&mut self, name: &str) -> Option<ObjectRef> {
        self.objects.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ObjectRef)> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}

/// Outcome of inserting an object into the stores.
#[derive(Clone, Debug)]
pub enum Insertion {
    /// The object is now bound under its name.
    Inserted(ObjectRef),
    /// The local binding of that name was moved to the global store, the incoming object was dropped.
    Moved(ObjectRef),
    /// A compatible object already held that name, the incoming object was dropped.
    Redundant(ObjectRef),
}

impl Insertion {
    pub fn object(&self) -> &ObjectRef {
        match self {
            Self::Inserted(obj) | Self::Moved(obj) | Self::Redundant(obj) => obj,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Inserts the object in the global store if it is flagged as global, else in the local store.
pub fn insert_into_object_store(
    los: &SharedStore,
    gos: &SharedStore,
    obj: SimObject,
) -> Result<Insertion, StoreError> {
    if obj.is_global {
        insert_into_gos(los, gos, obj)
    } else {
        insert_into_los(los, gos, obj)
    }
}

/// Inserts into the local store unless the name is already bound in either store.
pub fn insert_into_los(
    los: &SharedStore,
    gos: &SharedStore,
    obj: SimObject,
) -> Result<Insertion, StoreError> {
    if let Some(existing) = gos.borrow().get(&obj.name) {
        existing.borrow().check_compatible(&obj)?;
        debug!("`{}` already global, dropping the local definition", obj.name);
        return Ok(Insertion::Redundant(existing));
    }
    let mut los = los.borrow_mut();
    if let Some(existing) = los.get(&obj.name) {
        existing.borrow().check_compatible(&obj)?;
        debug!("`{}` already defined, dropping the redundant definition", obj.name);
        return Ok(Insertion::Redundant(existing));
    }
    let obj = obj.shared();
    los.insert(obj.clone());
    Ok(Insertion::Inserted(obj))
}

/// Inserts into the global store. A local binding of the same name is moved rather than copied.
pub fn insert_into_gos(
    los: &SharedStore,
    gos: &SharedStore,
    mut obj: SimObject,
) -> Result<Insertion, StoreError> {
    let mut gos = gos.borrow_mut();
    if let Some(existing) = gos.get(&obj.name) {
        existing.borrow().check_compatible(&obj)?;
        return Ok(Insertion::Redundant(existing));
    }
    let local = los.borrow().get(&obj.name);
    if let Some(existing) = local {
        existing.borrow().check_compatible(&obj)?;
        los.borrow_mut().remove(&obj.name);
        existing.borrow_mut().is_global = true;
        gos.insert(existing.clone());
        debug!("moved `{}` from the local to the global store", obj.name);
        return Ok(Insertion::Moved(existing));
    }
    obj.is_global = true;
    let obj = obj.shared();
    gos.insert(obj.clone());
    Ok(Insertion::Inserted(obj))
}

/// Moves a locally bound object into the global store, keeping its handle.
///
/// Returns the object if it is now global (including if it already was), None if neither store binds it.
pub fn promote_to_global(los: &SharedStore, gos: &SharedStore, name: &str) -> Option<ObjectRef> {
    if let Some(existing) = gos.borrow().get(name) {
        return Some(existing);
    }
    let local = los.borrow_mut().remove(name)?;
    local.borrow_mut().is_global = true;
    gos.borrow_mut().insert(local.clone());
    Some(local)
}
