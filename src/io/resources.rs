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

use std::collections::{BTreeMap, BTreeSet};

use serde_derive::{Deserialize, Serialize};
use snafu::prelude::*;

use super::{epoch_from_str, epoch_to_str, ConfigError, ConfigRepr, InvalidConfigSnafu};
use crate::cosmic::{FuelTank, Spacecraft, EARTH_GM_KM3_S2};
use crate::linalg::Vector6;
use crate::solvers::{DifferentialCorrector, GradientDescent, Solver};
use crate::store::{Array, ObjectKind, SimObject};
use crate::time::Epoch;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TankRepr {
    pub name: String,
    pub fuel_mass_kg: f64,
}

/// A spacecraft, with its Cartesian state in km and km/s.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpacecraftRepr {
    pub name: String,
    #[serde(serialize_with = "epoch_to_str", deserialize_with = "epoch_from_str")]
    pub epoch: Epoch,
    pub state: [f64; 6],
    #[serde(default = "default_mu")]
    pub mu_km3_s2: f64,
    #[serde(default = "default_cd")]
    pub cd: f64,
    #[serde(default = "default_drag_area")]
    pub drag_area_m2: f64,
    #[serde(default = "default_cr")]
    pub cr: f64,
    #[serde(default = "default_srp_area")]
    pub srp_area_m2: f64,
    #[serde(default = "default_dry_mass")]
    pub dry_mass_kg: f64,
    #[serde(default)]
    pub tanks: Vec<TankRepr>,
}

fn default_mu() -> f64 {
    EARTH_GM_KM3_S2
}

fn default_cd() -> f64 {
    2.2
}

fn default_drag_area() -> f64 {
    15.0
}

fn default_cr() -> f64 {
    1.8
}

fn default_srp_area() -> f64 {
    1.0
}

fn default_dry_mass() -> f64 {
    850.0
}

impl From<&SpacecraftRepr> for Spacecraft {
    fn from(repr: &SpacecraftRepr) -> Self {
        Spacecraft::builder()
            .epoch(repr.epoch)
            .state(Vector6::from_row_slice(&repr.state))
            .mu_km3_s2(repr.mu_km3_s2)
            .cd(repr.cd)
            .drag_area_m2(repr.drag_area_m2)
            .cr(repr.cr)
            .srp_area_m2(repr.srp_area_m2)
            .dry_mass_kg(repr.dry_mass_kg)
            .tanks(
                repr.tanks
                    .iter()
                    .map(|tank| FuelTank::new(&tank.name, tank.fuel_mass_kg))
                    .collect(),
            )
            .build()
    }
}

/// An array, zero filled unless all of its values are given in row major order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayRepr {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    #[serde(default)]
    pub values: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifferentialCorrectorRepr {
    pub name: String,
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientDescentRepr {
    pub name: String,
    #[serde(default)]
    pub max_iterations: Option<usize>,
    #[serde(default)]
    pub learning_rate: Option<f64>,
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub penalty_weight: Option<f64>,
    #[serde(default)]
    pub use_callbacks: bool,
}

/// The resources a mission sequence runs against.
///
/// ```yaml
/// spacecraft:
///   - name: Sat
///     epoch: 2000-01-01T12:00:00 UTC
///     state: [7100.0, 0.0, 1300.0, 0.0, 7.35, 1.0]
/// variables:
///   x: 1.5
/// differential_correctors:
///   - name: DC1
/// globals: [x]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesRepr {
    pub spacecraft: Vec<SpacecraftRepr>,
    pub variables: BTreeMap<String, f64>,
    pub arrays: Vec<ArrayRepr>,
    pub strings: BTreeMap<String, String>,
    pub differential_correctors: Vec<DifferentialCorrectorRepr>,
    pub optimizers: Vec<GradientDescentRepr>,
    /// Names of the resources to create in the global store
    pub globals: Vec<String>,
}

impl ConfigRepr for ResourcesRepr {}

impl ResourcesRepr {
    /// Number of resources described, globals excluded
    pub fn len(&self) -> usize {
        self.spacecraft.len()
            + self.variables.len()
            + self.arrays.len()
            + self.strings.len()
            + self.differential_correctors.len()
            + self.optimizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validates the resources and builds the objects they describe.
    pub fn into_objects(self) -> Result<Vec<SimObject>, ConfigError> {
        let mut objects = Vec::with_capacity(self.len());
        for sc in &self.spacecraft {
            objects.push(SimObject::new(
                &sc.name,
                ObjectKind::Spacecraft(Spacecraft::from(sc)),
            ));
        }
        for (name, value) in &self.variables {
            objects.push(SimObject::new(name, ObjectKind::Variable(*value)));
        }
        for array in &self.arrays {
            ensure!(
                array.rows > 0 && array.cols > 0,
                InvalidConfigSnafu {
                    msg: format!("array `{}` must have at least one row and one column", array.name)
                }
            );
            let kind = if array.values.is_empty() {
                Array::zeros(array.rows, array.cols)
            } else {
                ensure!(
                    array.values.len() == array.rows * array.cols,
                    InvalidConfigSnafu {
                        msg: format!(
                            "array `{}` is {}x{} but {} values were provided",
                            array.name,
                            array.rows,
                            array.cols,
                            array.values.len()
                        )
                    }
                );
                Array::from_row_slice(array.rows, array.cols, &array.values)
            };
            objects.push(SimObject::new(&array.name, ObjectKind::Array(kind)));
        }
        for (name, value) in &self.strings {
            objects.push(SimObject::new(name, ObjectKind::String(value.clone())));
        }
        for dc in &self.differential_correctors {
            let mut solver = DifferentialCorrector::default();
            if let Some(max_iterations) = dc.max_iterations {
                solver.max_iterations = max_iterations;
            }
            objects.push(SimObject::new(
                &dc.name,
                ObjectKind::Solver(Box::new(solver) as Box<dyn Solver>),
            ));
        }
        for opt in &self.optimizers {
            let mut solver = GradientDescent::default();
            if let Some(max_iterations) = opt.max_iterations {
                solver.max_iterations = max_iterations;
            }
            if let Some(learning_rate) = opt.learning_rate {
                solver.learning_rate = learning_rate;
            }
            if let Some(tolerance) = opt.tolerance {
                solver.tolerance = tolerance;
            }
            if let Some(penalty_weight) = opt.penalty_weight {
                solver.penalty_weight = penalty_weight;
            }
            solver.use_callbacks = opt.use_callbacks;
            objects.push(SimObject::new(
                &opt.name,
                ObjectKind::Solver(Box::new(solver) as Box<dyn Solver>),
            ));
        }

        let mut names = BTreeSet::new();
        for obj in &objects {
            ensure!(
                names.insert(obj.name.clone()),
                InvalidConfigSnafu {
                    msg: format!("`{}` is defined more than once", obj.name)
                }
            );
        }
        for global in &self.globals {
            ensure!(
                names.contains(global),
                InvalidConfigSnafu {
                    msg: format!("global `{global}` is not a defined resource")
                }
            );
        }
        for obj in objects.iter_mut() {
            obj.is_global = self.globals.contains(&obj.name);
        }
        Ok(objects)
    }
}
