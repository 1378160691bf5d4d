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

use std::fmt::Write;

use crate::cosmic::KeplerianElements;
use crate::linalg::Vector6;
use crate::store::{ObjectKind, Scope};
use crate::time::Epoch;

const SEPARATOR: &str =
    "--------------------------------------------------------------------------------------";

/// Snapshot of one spacecraft taken after a command executed.
#[derive(Clone, Debug, PartialEq)]
pub struct SpacecraftSummary {
    pub name: String,
    pub epoch: Epoch,
    pub state: Vector6<f64>,
    /// None when the orbit is degenerate
    pub keplerian: Option<KeplerianElements>,
    pub cd: f64,
    pub drag_area_m2: f64,
    pub cr: f64,
    pub srp_area_m2: f64,
    pub dry_mass_kg: f64,
    pub tanks: Vec<String>,
    pub total_mass_kg: f64,
}

/// The spacecraft of the local store as they were right after the command executed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandSummary {
    pub type_name: String,
    pub spacecraft: Vec<SpacecraftSummary>,
}

impl CommandSummary {
    pub fn build(type_name: &str, scope: &Scope) -> Self {
        let mut spacecraft = Vec::new();
        if let Some(los) = scope.local() {
            for (name, obj) in los.borrow().iter() {
                if let ObjectKind::Spacecraft(sc) = &obj.borrow().kind {
                    spacecraft.push(SpacecraftSummary {
                        name: name.clone(),
                        epoch: sc.epoch,
                        state: sc.state,
                        keplerian: sc.keplerian(),
                        cd: sc.cd,
                        drag_area_m2: sc.drag_area_m2,
                        cr: sc.cr,
                        srp_area_m2: sc.srp_area_m2,
                        dry_mass_kg: sc.dry_mass_kg,
                        tanks: sc.tanks.iter().map(|tank| tank.name.clone()).collect(),
                        total_mass_kg: sc.total_mass_kg(),
                    });
                }
            }
        }
        Self {
            type_name: type_name.to_string(),
            spacecraft,
        }
    }

    /// Text of the summary, or a placeholder for a command that did not execute yet
    pub fn render(type_name: &str, summary: Option<&CommandSummary>) -> String {
        let mut data = format!("Command Summary: {type_name} Command\n");
        let Some(summary) = summary else {
            data.push_str("Execute the script to generate command summary data\n");
            return data;
        };
        if summary.spacecraft.is_empty() {
            data.push_str("No spacecraft in the local store\n");
            return data;
        }
        data.push_str(SEPARATOR);
        data.push('\n');
        for sc in &summary.spacecraft {
            // Writing to a String cannot fail
            let _ = sc.write_to(&mut data);
            data.push_str(SEPARATOR);
            data.push('\n');
        }
        data
    }
}

impl SpacecraftSummary {
    fn write_to(&self, data: &mut String) -> std::fmt::Result {
        writeln!(data, "  Spacecraft {}", self.name)?;
        writeln!(data, "     Epoch: {}", self.epoch)?;
        writeln!(data, "     TAI Modified Julian Epoch: {:.10}\n", self.epoch.to_mjd_tai_days())?;
        writeln!(data, "    Cartesian State:")?;
        for (label, value, unit) in [
            ("X ", self.state[0], "km"),
            ("Y ", self.state[1], "km"),
            ("Z ", self.state[2], "km"),
            ("VX", self.state[3], "km/s"),
            ("VY", self.state[4], "km/s"),
            ("VZ", self.state[5], "km/s"),
        ] {
            writeln!(data, "        {label} = {value:.9} {unit}")?;
        }
        match &self.keplerian {
            Some(kep) => {
                writeln!(data, "\n    Keplerian State:")?;
                writeln!(data, "        SMA  = {:.9} km", kep.sma_km)?;
                writeln!(data, "        ECC  = {:.9}", kep.ecc)?;
                writeln!(data, "        INC  = {:.9} deg", kep.inc_deg)?;
                writeln!(data, "        RAAN = {:.9} deg", kep.raan_deg)?;
                writeln!(data, "        AOP  = {:.9} deg", kep.aop_deg)?;
                writeln!(data, "        TA   = {:.9} deg", kep.ta_deg)?;
            }
            None => writeln!(data, "\n    Keplerian State: undefined for this orbit")?,
        }
        writeln!(data, "\n    Spacecraft properties:")?;
        writeln!(data, "        Cd = {}", self.cd)?;
        writeln!(data, "        Drag area = {} m^2", self.drag_area_m2)?;
        writeln!(data, "        Cr = {}", self.cr)?;
        writeln!(data, "        Reflective (SRP) area = {} m^2", self.srp_area_m2)?;
        writeln!(data, "        Dry mass = {} kg", self.dry_mass_kg)?;
        if !self.tanks.is_empty() {
            writeln!(data, "        Tanks:")?;
            for tank in &self.tanks {
                writeln!(data, "           {tank}")?;
            }
        }
        writeln!(data, "        Total mass = {} kg", self.total_mass_kg)
    }
}
