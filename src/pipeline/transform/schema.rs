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

//! Fixed layout of regridded and model-ready files.

use crate::constants::{CALENDAR, TIME_UNITS};
use crate::errors::StorageError;
use crate::pipeline::catalog::DataSource;
use crate::pipeline::field::ProcessingWindow;
use crate::pipeline::grid::GridDescriptor;
use crate::pipeline::storage::{Dataset, Values};
use crate::Float;
use ndarray::{Array1, Array3, Array4};

/// Data variable of single-variable files.
pub const MAIN_VARIABLE: &str = "emiss_anthro";

pub const MOLECULE_FLUX_UNITS: &str = "molecules/cm2/s";

pub const NUMBER_FLUX_UNITS: &str = "(particles/cm2/s)(molecules/mole)(g/kg)";

/// Centres of the synthetic injection layers in km.
pub const ALTITUDE: [Float; 8] = [0.025, 0.075, 0.125, 0.175, 0.225, 0.275, 0.325, 0.375];

/// Interfaces of the synthetic injection layers in km.
pub const ALTITUDE_INT: [Float; 9] = [0.0, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4];

/// Global title of every written file.
pub fn title(source: DataSource, original_resolution: &str) -> String {
    format!(
        "Anthropogenic emissions for {}_({}).",
        source.name(),
        original_resolution
    )
}

/// Builds a [`Dataset`] with the time, date and grid
/// coordinates filled in, ready for data variables.
pub struct OutputSchema {
    dataset: Dataset,
}

impl OutputSchema {
    /// `day` is the day of month anchoring every monthly step.
    pub fn new(
        title: &str,
        window: &ProcessingWindow,
        day: u32,
        grid: &GridDescriptor,
    ) -> Result<Self, StorageError> {
        let (times, dates) = window.time_axis(day);
        let (nlat, nlon) = grid.shape();

        let mut dataset = Dataset::new(title);
        dataset.add_unlimited_dimension("time", times.len());
        dataset.add_dimension("lat", nlat);
        dataset.add_dimension("lon", nlon);

        dataset
            .add_variable("time", &["time"], Values::Float(Array1::from(times).into_dyn()))?
            .put_attribute("units", TIME_UNITS)
            .put_attribute("calendar", CALENDAR);

        dataset
            .add_variable("lat", &["lat"], Values::Float(grid.lats.clone().into_dyn()))?
            .put_attribute("units", "degrees_north")
            .put_attribute("long_name", "Latitude");

        dataset
            .add_variable("lon", &["lon"], Values::Float(grid.lons.clone().into_dyn()))?
            .put_attribute("units", "degrees_east")
            .put_attribute("long_name", "Longitude");

        dataset
            .add_variable("date", &["time"], Values::Int(Array1::from(dates).into_dyn()))?
            .put_attribute("format", "YYYYMMDD")
            .put_attribute("long_name", "Date");

        Ok(OutputSchema { dataset })
    }

    /// Adds the synthetic vertical layers.
    pub fn with_altitude(mut self) -> Result<Self, StorageError> {
        self.dataset.add_dimension("altitude", ALTITUDE.len());
        self.dataset.add_dimension("altitude_int", ALTITUDE_INT.len());

        self.dataset
            .add_variable(
                "altitude",
                &["altitude"],
                Values::Float(Array1::from(ALTITUDE.to_vec()).into_dyn()),
            )?
            .put_attribute("units", "km")
            .put_attribute("long_name", "Altitude");

        self.dataset
            .add_variable(
                "altitude_int",
                &["altitude_int"],
                Values::Float(Array1::from(ALTITUDE_INT.to_vec()).into_dyn()),
            )?
            .put_attribute("units", "km")
            .put_attribute("long_name", "Altitude_int");

        Ok(self)
    }

    /// Adds a (time, lat, lon) data variable.
    pub fn add_field(
        &mut self,
        name: &str,
        values: Array3<Float>,
        units: &str,
    ) -> Result<&mut Self, StorageError> {
        self.dataset
            .add_variable(name, &["time", "lat", "lon"], Values::Float(values.into_dyn()))?
            .put_attribute("units", units);

        Ok(self)
    }

    /// Adds a (time, altitude, lat, lon) data variable.
    pub fn add_vertical_field(
        &mut self,
        name: &str,
        values: Array4<Float>,
        units: &str,
    ) -> Result<&mut Self, StorageError> {
        self.dataset
            .add_variable(
                name,
                &["time", "altitude", "lat", "lon"],
                Values::Float(values.into_dyn()),
            )?
            .put_attribute("units", units);

        Ok(self)
    }

    pub fn finish(self) -> Dataset {
        self.dataset
    }
}
