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

use core::fmt;
use enum_iterator::Sequence;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ParamError, ReadOnlySnafu, UndefinedSnafu};
use crate::cosmic::Spacecraft;
use crate::time::Epoch;

/// Spacecraft fields reachable from a script as `Sat.<field>`
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Sequence, Serialize, Deserialize)]
pub enum SpacecraftParameter {
    /// Cartesian X position (km)
    X,
    /// Cartesian Y position (km)
    Y,
    /// Cartesian Z position (km)
    Z,
    /// Cartesian X velocity (km/s)
    VX,
    /// Cartesian Y velocity (km/s)
    VY,
    /// Cartesian Z velocity (km/s)
    VZ,
    /// Epoch as a TAI modified Julian date (days)
    Epoch,
    /// Coefficient of drag
    Cd,
    /// Coefficient of reflectivity
    Cr,
    /// Drag area (m^2)
    DragArea,
    /// Solar radiation pressure area (m^2)
    SRPArea,
    /// Dry mass (kg)
    DryMass,
    /// Sum of the fuel in all tanks (kg)
    FuelMass,
    /// Dry mass plus fuel mass (kg)
    TotalMass,
    /// Semi major axis (km)
    SMA,
    /// Eccentricity (no unit)
    ECC,
    /// Inclination (deg)
    INC,
    /// Right ascension of the ascending node (deg)
    RAAN,
    /// Argument of periapsis (deg)
    AOP,
    /// True anomaly (deg)
    TA,
    /// Norm of the position vector (km)
    RMAG,
    /// Norm of the velocity vector (km/s)
    VMAG,
}

impl SpacecraftParameter {
    /// Whether a command may write this parameter
    pub const fn is_settable(&self) -> bool {
        matches!(
            self,
            Self::X
                | Self::Y
                | Self::Z
                | Self::VX
                | Self::VY
                | Self::VZ
                | Self::Epoch
                | Self::Cd
                | Self::Cr
                | Self::DragArea
                | Self::SRPArea
                | Self::DryMass
        )
    }

    pub const fn unit(&self) -> &'static str {
        match self {
            Self::X | Self::Y | Self::Z | Self::SMA | Self::RMAG => "km",
            Self::VX | Self::VY | Self::VZ | Self::VMAG => "km/s",
            Self::INC | Self::RAAN | Self::AOP | Self::TA => "deg",
            Self::DryMass | Self::FuelMass | Self::TotalMass => "kg",
            Self::DragArea | Self::SRPArea => "m^2",
            Self::Epoch => "days",
            Self::Cd | Self::Cr | Self::ECC => "",
        }
    }

    const fn state_index(&self) -> Option<usize> {
        match self {
            Self::X => Some(0),
            Self::Y => Some(1),
            Self::Z => Some(2),
            Self::VX => Some(3),
            Self::VY => Some(4),
            Self::VZ => Some(5),
            _ => None,
        }
    }

    /// Reads this parameter from the spacecraft
    pub fn value(&self, sc: &Spacecraft) -> Result<f64, ParamError> {
        let orbital = || {
            sc.keplerian().ok_or(ParamError::Undefined {
                param: self.to_string(),
                reason: "degenerate orbit".to_string(),
            })
        };
        Ok(match self {
            Self::Epoch => sc.epoch.to_mjd_tai_days(),
            Self::Cd => sc.cd,
            Self::Cr => sc.cr,
            Self::DragArea => sc.drag_area_m2,
            Self::SRPArea => sc.srp_area_m2,
            Self::DryMass => sc.dry_mass_kg,
            Self::FuelMass => sc.fuel_mass_kg(),
            Self::TotalMass => sc.total_mass_kg(),
            Self::SMA => orbital()?.sma_km,
            Self::ECC => orbital()?.ecc,
            Self::INC => orbital()?.inc_deg,
            Self::RAAN => orbital()?.raan_deg,
            Self::AOP => orbital()?.aop_deg,
            Self::TA => orbital()?.ta_deg,
            Self::RMAG => sc.radius().norm(),
            Self::VMAG => sc.velocity().norm(),
            Self::X | Self::Y | Self::Z | Self::VX | Self::VY | Self::VZ => {
                sc.state[self.state_index().unwrap_or_default()]
            }
        })
    }

    /// Writes this parameter into the spacecraft
    pub fn set_value(&self, sc: &mut Spacecraft, value: f64) -> Result<(), ParamError> {
        ensure_settable(self)?;
        if let Some(idx) = self.state_index() {
            sc.state[idx] = value;
            return Ok(());
        }
        match self {
            Self::Epoch => sc.epoch = Epoch::from_mjd_tai(value),
            Self::Cd => sc.cd = value,
            Self::Cr => sc.cr = value,
            Self::DragArea => sc.drag_area_m2 = value,
            Self::SRPArea => sc.srp_area_m2 = value,
            Self::DryMass => {
                if value < 0.0 {
                    return UndefinedSnafu {
                        param: self.to_string(),
                        reason: format!("negative mass {value}"),
                    }
                    .fail();
                }
                sc.dry_mass_kg = value
            }
            _ => {
                return ReadOnlySnafu {
                    param: self.to_string(),
                }
                .fail()
            }
        }
        Ok(())
    }
}

fn ensure_settable(param: &SpacecraftParameter) -> Result<(), ParamError> {
    if param.is_settable() {
        Ok(())
    } else {
        ReadOnlySnafu {
            param: param.to_string(),
        }
        .fail()
    }
}

impl FromStr for SpacecraftParameter {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "z" => Ok(Self::Z),
            "vx" => Ok(Self::VX),
            "vy" => Ok(Self::VY),
            "vz" => Ok(Self::VZ),
            "epoch" | "taimodjulian" => Ok(Self::Epoch),
            "cd" => Ok(Self::Cd),
            "cr" => Ok(Self::Cr),
            "dragarea" => Ok(Self::DragArea),
            "srparea" => Ok(Self::SRPArea),
            "drymass" => Ok(Self::DryMass),
            "fuelmass" => Ok(Self::FuelMass),
            "totalmass" => Ok(Self::TotalMass),
            "sma" => Ok(Self::SMA),
            "ecc" => Ok(Self::ECC),
            "inc" => Ok(Self::INC),
            "raan" => Ok(Self::RAAN),
            "aop" => Ok(Self::AOP),
            "ta" => Ok(Self::TA),
            "rmag" => Ok(Self::RMAG),
            "vmag" => Ok(Self::VMAG),
            _ => Err(ParamError::Parse {
                text: s.to_string(),
                reason: "unknown spacecraft parameter".to_string(),
            }),
        }
    }
}

impl fmt::Display for SpacecraftParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::X => "X",
            Self::Y => "Y",
            Self::Z => "Z",
            Self::VX => "VX",
            Self::VY => "VY",
            Self::VZ => "VZ",
            Self::Epoch => "Epoch",
            Self::Cd => "Cd",
            Self::Cr => "Cr",
            Self::DragArea => "DragArea",
            Self::SRPArea => "SRPArea",
            Self::DryMass => "DryMass",
            Self::FuelMass => "FuelMass",
            Self::TotalMass => "TotalMass",
            Self::SMA => "SMA",
            Self::ECC => "ECC",
            Self::INC => "INC",
            Self::RAAN => "RAAN",
            Self::AOP => "AOP",
            Self::TA => "TA",
            Self::RMAG => "RMAG",
            Self::VMAG => "VMAG",
        };
        write!(f, "{repr}")
    }
}
