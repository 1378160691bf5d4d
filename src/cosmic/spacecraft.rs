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

use crate::linalg::{Vector3, Vector6};
use crate::time::Epoch;
use std::fmt;
use typed_builder::TypedBuilder;

/// Earth gravitational parameter used when a spacecraft does not specify one, in km^3/s^2.
pub const EARTH_GM_KM3_S2: f64 = 398_600.435_436;

/// A propellant tank attached to a spacecraft.
#[derive(Clone, Debug, PartialEq)]
pub struct FuelTank {
    pub name: String,
    pub fuel_mass_kg: f64,
}

impl FuelTank {
    pub fn new(name: &str, fuel_mass_kg: f64) -> Self {
        Self {
            name: name.to_string(),
            fuel_mass_kg,
        }
    }
}

/// The mutable state of a spacecraft as seen by the command sequence.
///
/// The Cartesian state is expressed in kilometers and kilometers per second
/// about a central body whose gravitational parameter is `mu_km3_s2`.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[builder(doc)]
pub struct Spacecraft {
    #[builder(default_code = "Epoch::from_gregorian_utc_at_noon(2000, 1, 1)")]
    pub epoch: Epoch,
    #[builder(default_code = "Vector6::new(7100.0, 0.0, 1300.0, 0.0, 7.35, 1.0)")]
    pub state: Vector6<f64>,
    #[builder(default = EARTH_GM_KM3_S2)]
    pub mu_km3_s2: f64,
    #[builder(default = 2.2)]
    pub cd: f64,
    #[builder(default = 15.0)]
    pub drag_area_m2: f64,
    #[builder(default = 1.8)]
    pub cr: f64,
    #[builder(default = 1.0)]
    pub srp_area_m2: f64,
    #[builder(default = 850.0)]
    pub dry_mass_kg: f64,
    #[builder(default)]
    pub tanks: Vec<FuelTank>,
}

impl Default for Spacecraft {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Spacecraft {
    /// Position vector in km
    pub fn radius(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(0).into_owned()
    }

    /// Velocity vector in km/s
    pub fn velocity(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(3).into_owned()
    }

    /// Sum of the fuel mass of all tanks, in kg
    pub fn fuel_mass_kg(&self) -> f64 {
        self.tanks.iter().map(|tank| tank.fuel_mass_kg).sum()
    }

    pub fn total_mass_kg(&self) -> f64 {
        self.dry_mass_kg + self.fuel_mass_kg()
    }

    /// Osculating Keplerian elements, or None if the orbit is degenerate (zero radius or rectilinear).
    pub fn keplerian(&self) -> Option<KeplerianElements> {
        KeplerianElements::from_cartesian(&self.state, self.mu_km3_s2)
    }
}

/// Osculating Keplerian elements, angles in degrees.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct KeplerianElements {
    pub sma_km: f64,
    pub ecc: f64,
    pub inc_deg: f64,
    pub raan_deg: f64,
    pub aop_deg: f64,
    pub ta_deg: f64,
}

impl KeplerianElements {
    const ECC_EPSILON: f64 = 1e-11;

    /// Converts a Cartesian state (km, km/s) into Keplerian elements.
    ///
    /// Circular orbits report an argument of periapsis of zero and measure the true anomaly
    /// from the ascending node. Equatorial orbits report a right ascension of zero.
    pub fn from_cartesian(state: &Vector6<f64>, mu_km3_s2: f64) -> Option<Self> {
        let r = state.fixed_rows::<3>(0).into_owned();
        let v = state.fixed_rows::<3>(3).into_owned();
        let rmag = r.norm();
        let hvec = r.cross(&v);
        let hmag = hvec.norm();
        if rmag < f64::EPSILON || hmag < f64::EPSILON || mu_km3_s2 <= 0.0 {
            return None;
        }

        let energy = 0.5 * v.norm_squared() - mu_km3_s2 / rmag;
        let evec = ((v.norm_squared() - mu_km3_s2 / rmag) * r - r.dot(&v) * v) / mu_km3_s2;
        let ecc = evec.norm();
        let sma_km = if energy.abs() < f64::EPSILON {
            f64::INFINITY
        } else {
            -mu_km3_s2 / (2.0 * energy)
        };

        let inc_deg = safe_acos(hvec[2] / hmag).to_degrees();
        let nvec = Vector3::new(-hvec[1], hvec[0], 0.0);
        let nmag = nvec.norm();

        let raan_deg = if nmag < f64::EPSILON {
            0.0
        } else {
            let raan = safe_acos(nvec[0] / nmag).to_degrees();
            if nvec[1] < 0.0 {
                360.0 - raan
            } else {
                raan
            }
        };

        let (aop_deg, ta_deg) = if ecc < Self::ECC_EPSILON {
            // Argument of latitude, or true longitude when equatorial
            let reference = if nmag < f64::EPSILON {
                Vector3::x()
            } else {
                nvec / nmag
            };
            let mut ta = safe_acos(reference.dot(&r) / rmag).to_degrees();
            let side = if nmag < f64::EPSILON { r[1] } else { r[2] };
            if side < 0.0 {
                ta = 360.0 - ta;
            }
            (0.0, ta)
        } else {
            let aop = if nmag < f64::EPSILON {
                let aop = evec[1].atan2(evec[0]).to_degrees();
                if aop < 0.0 {
                    aop + 360.0
                } else {
                    aop
                }
            } else {
                let aop = safe_acos(nvec.dot(&evec) / (nmag * ecc)).to_degrees();
                if evec[2] < 0.0 {
                    360.0 - aop
                } else {
                    aop
                }
            };
            let mut ta = safe_acos(evec.dot(&r) / (ecc * rmag)).to_degrees();
            if r.dot(&v) < 0.0 {
                ta = 360.0 - ta;
            }
            (aop, ta)
        };

        Some(Self {
            sma_km,
            ecc,
            inc_deg,
            raan_deg,
            aop_deg,
            ta_deg,
        })
    }
}

fn safe_acos(x: f64) -> f64 {
    x.clamp(-1.0, 1.0).acos()
}

impl fmt::Display for KeplerianElements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sma = {:.6} km\tecc = {:.6}\tinc = {:.6} deg\traan = {:.6} deg\taop = {:.6} deg\tta = {:.6} deg",
            self.sma_km, self.ecc, self.inc_deg, self.raan_deg, self.aop_deg, self.ta_deg
        )
    }
}

impl fmt::Display for Spacecraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\tposition = [{:.6}, {:.6}, {:.6}] km\tvelocity = [{:.6}, {:.6}, {:.6}] km/s\tmass = {:.3} kg",
            self.epoch,
            self.state[0],
            self.state[1],
            self.state[2],
            self.state[3],
            self.state[4],
            self.state[5],
            self.total_mass_kg()
        )
    }
}

/// A formation groups spacecraft by name; its members are owned by the object stores.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Formation {
    pub members: Vec<String>,
}

impl Formation {
    pub fn new(members: &[&str]) -> Self {
        Self {
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn rename_member(&mut self, old_name: &str, new_name: &str) {
        for member in self.members.iter_mut().filter(|m| *m == old_name) {
            *member = new_name.to_string();
        }
    }
}
