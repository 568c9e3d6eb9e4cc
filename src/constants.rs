/*
Copyright 2024 The AERT Developers

This file is part of Anthropogenic Emissions Regridding Tool (AERT).

Anthropogenic Emissions Regridding Tool (AERT) is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

Anthropogenic Emissions Regridding Tool (AERT) is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with Anthropogenic Emissions Regridding Tool (AERT). If not, see https://www.gnu.org/licenses/.
*/

//! Module containing constants used by the tool.

use crate::Float;
use std::f64::consts::PI;

///WGS84 ellipsoid semi-major axis, used as the radius of
///the sphere on which cell areas are computed
pub const WGS84_A: Float = 6_378_137.0;

///Avogadro number (molecules per mole)
pub const AVOGADRO: Float = 6.022e23;

///Grams in kilogram
pub const KG_TO_G: Float = 1e3;

///Square centimetres in square metre
pub const M2_TO_CM2: Float = 1e4;

///Factor converting `kg m-2 s-1` into `molecules cm-2 s-1`
///when divided by the molecular weight (in `g mol-1`).
///
///`UNIT_FACTOR = N_A * (g/kg) / (cm2/m2)`
pub const UNIT_FACTOR: Float = AVOGADRO * KG_TO_G / M2_TO_CM2;

///First year of the time axis epoch. Month indices in
///inventory files are counted from January of this year.
pub const EPOCH_YEAR: i32 = 2000;

///Units of the numeric time coordinate in output files
pub const TIME_UNITS: &str = "days since 2000-01-01 00:00:00";

///Calendar of the numeric time coordinate in output files
pub const CALENDAR: &str = "noleap";

///Days elapsed before the first day of each month in the no-leap calendar
pub const NOLEAP_CUMULATIVE_DAYS: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

///Mass of a single spherical particle (in kg) with given
///density (`kg m-3`) and diameter (`m`).
///
///`m = rho * (pi / 6) * d^3`
pub fn mass_per_particle(density: Float, diameter: Float) -> Float {
    density * (PI / 6.0) * diameter.powi(3)
}

#[cfg(test)]
mod tests {
    use super::{mass_per_particle, UNIT_FACTOR};
    use crate::Float;
    use float_cmp::approx_eq;

    #[test]
    fn unit_factor() {
        assert!(approx_eq!(Float, UNIT_FACTOR, 6.022e22, epsilon = 1e8));
    }

    #[test]
    fn particle_mass() {
        // black carbon mode used for number tracers
        let factor = 12.0 / mass_per_particle(1700.0, 0.134e-6);

        assert!(approx_eq!(Float, factor / 5.60298303e18, 1.0, epsilon = 1e-5));
    }
}
