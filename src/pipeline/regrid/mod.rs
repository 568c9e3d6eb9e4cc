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

//! Regridding engine.
//!
//! Inventories store longitudes from the antimeridian eastwards
//! (-180 to 180) while the model grid starts at Greenwich (0 to 360).
//! Before weights are applied the field is cyclically rolled so that
//! its first column is the first non-negative longitude, and its
//! coordinates are replaced with the canonical ones of the source grid.
//!
//! Regridding is purely spatial, the time axis is never modified.

mod bisection;
pub mod weights;

pub use self::weights::ConservativeWeights;

use super::field::{GriddedField, ProcessingWindow};
use super::grid::GridDescriptor;
use crate::errors::SpeciesError;
use ndarray::{Array1, Axis};
use rayon::ThreadPool;

/// Shared, read-only state needed to regrid fields.
#[derive(Clone, Copy)]
pub struct Regridder<'a> {
    pub source: &'a GridDescriptor,
    pub target: &'a GridDescriptor,
    pub weights: &'a ConservativeWeights,
    pub pool: &'a ThreadPool,
}

impl<'a> Regridder<'a> {
    /// Regrids one field from the source to the target grid.
    ///
    /// Fails with [`SpeciesError::GridMismatch`] when weights were
    /// generated for a source grid of different shape than the field.
    pub fn regrid(&self, field: GriddedField) -> Result<GriddedField, SpeciesError> {
        if self.weights.source_shape() != field.spatial_shape() {
            return Err(SpeciesError::GridMismatch {
                expected: self.weights.source_shape(),
                found: field.spatial_shape(),
            });
        }

        if self.weights.target_shape() != self.target.shape() {
            return Err(SpeciesError::GridMismatch {
                expected: self.target.shape(),
                found: self.weights.target_shape(),
            });
        }

        let aligned = align_to_grid(roll_longitudes(field)?, self.source)?;
        let values = self.weights.apply_timesteps(&aligned.values, self.pool)?;

        Ok(GriddedField {
            lats: self.target.lats.clone(),
            lons: self.target.lons.clone(),
            values,
            ..aligned
        })
    }

    /// Regrids consecutive time chunks (eg. one per calendar year),
    /// joins them along time and keeps only the processing window.
    ///
    /// Chunks are pulled one by one, a native-grid chunk is
    /// dropped once regridded and before the next one is read.
    pub fn regrid_window<I>(
        &self,
        chunks: I,
        window: &ProcessingWindow,
    ) -> Result<GriddedField, SpeciesError>
    where
        I: IntoIterator<Item = Result<GriddedField, SpeciesError>>,
    {
        let regridded = chunks
            .into_iter()
            .map(|chunk| self.regrid(chunk?))
            .collect::<Result<Vec<GriddedField>, SpeciesError>>()?;

        GriddedField::concat_time(regridded)?.select_window(window)
    }
}

/// Cyclically rolls the longitude axis so that it starts with
/// the first non-negative longitude, then wraps negative
/// longitudes into `[0, 360)`.
///
/// The roll amount is the count of negative longitudes, which is
/// half of the columns for grids stored from -180 to 180.
pub fn roll_longitudes(field: GriddedField) -> Result<GriddedField, SpeciesError> {
    let nlon = field.lons.len();
    let shift = field.lons.iter().filter(|lon| **lon < 0.0).count();

    let order: Vec<usize> = (0..nlon).map(|j| (j + shift) % nlon).collect();

    let lons: Array1<_> = order
        .iter()
        .map(|&j| {
            let lon = field.lons[j];
            if lon < 0.0 {
                lon + 360.0
            } else {
                lon
            }
        })
        .collect();

    let increasing = lons.iter().zip(lons.iter().skip(1)).all(|(a, b)| b > a);
    let in_range = lons.iter().all(|lon| (0.0..360.0).contains(lon));

    if !increasing || !in_range {
        return Err(SpeciesError::BadLongitudes(field.species));
    }

    let values = field.values.select(Axis(2), &order);

    Ok(GriddedField {
        lons,
        values,
        ..field
    })
}

/// Assigns canonical coordinates of `grid` to the field,
/// flipping latitudes stored from north to south.
pub fn align_to_grid(
    mut field: GriddedField,
    grid: &GridDescriptor,
) -> Result<GriddedField, SpeciesError> {
    if field.spatial_shape() != grid.shape() {
        return Err(SpeciesError::GridMismatch {
            expected: grid.shape(),
            found: field.spatial_shape(),
        });
    }

    let nlat = field.lats.len();
    if nlat > 1 && field.lats[0] > field.lats[nlat - 1] {
        field.values.invert_axis(Axis(1));
    }

    field.lats = grid.lats.clone();
    field.lons = grid.lons.clone();

    Ok(field)
}
