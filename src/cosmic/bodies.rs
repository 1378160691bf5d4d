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
use std::rc::Rc;

use crate::store::{ObjectKind, ObjectRef, SimObject};

/// Reserved name of the solar system catalogue in the resolver.
pub const SOLAR_SYSTEM_NAME: &str = "SolarSystem";

/// A natural body owned by the solar system catalogue.
#[derive(Clone, Debug, PartialEq)]
pub struct CelestialBody {
    pub name: String,
    /// Gravitational parameter in km^3/s^2
    pub mu_km3_s2: f64,
    pub equatorial_radius_km: f64,
}

impl CelestialBody {
    pub fn new(name: &str, mu_km3_s2: f64, equatorial_radius_km: f64) -> Self {
        Self {
            name: name.to_string(),
            mu_km3_s2,
            equatorial_radius_km,
        }
    }
}

/// The catalogue of celestial bodies, shared by reference with every command.
#[derive(Debug)]
pub struct SolarSystem {
    bodies: BTreeMap<String, ObjectRef>,
}

pub type SharedSolarSystem = Rc<RefCell<SolarSystem>>;

impl SolarSystem {
    /// An empty catalogue.
    pub fn empty() -> Self {
        Self {
            bodies: BTreeMap::new(),
        }
    }

    pub fn shared(self) -> SharedSolarSystem {
        Rc::new(RefCell::new(self))
    }

    /// Adds or replaces a body, returning the handle the resolver will hand out.
    pub fn add_body(&mut self, body: CelestialBody) -> ObjectRef {
        let name = body.name.clone();
        let obj = SimObject::new(&name, ObjectKind::CelestialBody(body)).shared();
        self.bodies.insert(name, obj.clone());
        obj
    }

    pub fn body(&self, name: &str) -> Option<ObjectRef> {
        self.bodies.get(name).cloned()
    }

    pub fn body_names(&self) -> Vec<String> {
        self.bodies.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl Default for SolarSystem {
    /// Sun, planets and the Moon with their IAU/DE gravitational parameters
    fn default() -> Self {
        let mut me = Self::empty();
        for (name, mu, radius) in [
            ("Sun", 132_712_440_041.939_4, 695_700.0),
            ("Mercury", 22_031.780_000, 2_439.7),
            ("Venus", 324_858.592_000, 6_051.8),
            ("Earth", 398_600.435_436, 6_378.136_3),
            ("Luna", 4_902.800_066, 1_737.4),
            ("Mars", 42_828.375_214, 3_396.19),
            ("Jupiter", 126_712_764.800_000, 71_492.0),
            ("Saturn", 37_940_585.200_000, 60_268.0),
            ("Uranus", 5_794_548.600_000, 25_559.0),
            ("Neptune", 6_836_527.100_580, 24_764.0),
            ("Pluto", 977.000_000, 1_188.3),
        ] {
            me.add_body(CelestialBody::new(name, mu, radius));
        }
        me
    }
}
