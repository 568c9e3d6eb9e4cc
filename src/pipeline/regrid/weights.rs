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

//! First-order conservative regridding weights.
//!
//! The weight linking a target cell with a source cell is the
//! area of their intersection divided by the area of the target
//! cell. On rectilinear grids the intersection is separable, so
//! weights are products of an overlap fraction in sine of latitude
//! and an overlap fraction in longitude. Longitudes are periodic,
//! source cells are matched with target cells also after shifting
//! them by a full circle in both directions.
//!
//! Weights are stored as a sparse matrix in compressed rows
//! (one row per target cell) and persisted with `bincode`.

use super::bisection::overlapping_cells;
use crate::errors::{SpeciesError, WeightsError};
use crate::pipeline::grid::GridDescriptor;
use crate::Float;
use log::{debug, info};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Sparse linear operator mapping fields from source to target grid.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ConservativeWeights {
    source_shape: (usize, usize),
    target_shape: (usize, usize),
    row_offsets: Vec<usize>,
    columns: Vec<usize>,
    weights: Vec<Float>,
}

impl ConservativeWeights {
    /// Computes weights between two grids.
    pub fn generate(
        source: &GridDescriptor,
        target: &GridDescriptor,
    ) -> Result<Self, WeightsError> {
        debug!(
            "Computing conservative weights from {:?} to {:?}",
            source.shape(),
            target.shape()
        );

        let source_shape = source.shape();
        let target_shape = target.shape();

        let lat_overlaps = latitude_overlaps(source, target)?;
        let lon_overlaps = longitude_overlaps(source, target)?;

        let mut row_offsets = Vec::with_capacity(target_shape.0 * target_shape.1 + 1);
        let mut columns = vec![];
        let mut weights = vec![];

        row_offsets.push(0);

        for lat_row in &lat_overlaps {
            for lon_row in &lon_overlaps {
                for (k, lat_fraction) in lat_row {
                    for (l, lon_fraction) in lon_row {
                        columns.push(k * source_shape.1 + l);
                        weights.push(lat_fraction * lon_fraction);
                    }
                }

                row_offsets.push(columns.len());
            }
        }

        debug!("Computed {} non-zero weights", weights.len());

        Ok(ConservativeWeights {
            source_shape,
            target_shape,
            row_offsets,
            columns,
            weights,
        })
    }

    /// Computes weights and persists them at `path`,
    /// replacing any existing file.
    pub fn generate_and_save(
        source: &GridDescriptor,
        target: &GridDescriptor,
        path: &Path,
    ) -> Result<Self, WeightsError> {
        let weights = ConservativeWeights::generate(source, target)?;

        if path.exists() {
            info!(
                "Removing existing regridder weights {} to create new ones",
                path.display()
            );
            fs::remove_file(path)?;
        }

        weights.save(path)?;

        Ok(weights)
    }

    pub fn save(&self, path: &Path) -> Result<(), WeightsError> {
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self)?;

        Ok(())
    }

    /// Loads persisted weights, never regenerating them.
    pub fn load(path: &Path) -> Result<Self, WeightsError> {
        if !path.is_file() {
            return Err(WeightsError::NotFound(path.to_path_buf()));
        }

        let reader = BufReader::new(File::open(path)?);
        let weights: ConservativeWeights = bincode::deserialize_from(reader)?;

        weights.check_consistency()?;

        Ok(weights)
    }

    fn check_consistency(&self) -> Result<(), WeightsError> {
        let rows = self.target_shape.0 * self.target_shape.1;
        let cols = self.source_shape.0 * self.source_shape.1;

        if self.row_offsets.len() != rows + 1 {
            return Err(WeightsError::Corrupted(
                "Row count does not match target grid",
            ));
        }

        if self.row_offsets.windows(2).any(|w| w[1] < w[0])
            || self.row_offsets.last() != Some(&self.columns.len())
        {
            return Err(WeightsError::Corrupted("Row offsets are not monotonic"));
        }

        if self.columns.len() != self.weights.len() {
            return Err(WeightsError::Corrupted(
                "Column and weight counts differ",
            ));
        }

        if self.columns.iter().any(|c| *c >= cols) {
            return Err(WeightsError::Corrupted(
                "Column index exceeds source grid",
            ));
        }

        Ok(())
    }

    /// Shape (lat, lon) of the grid the weights were generated for.
    pub fn source_shape(&self) -> (usize, usize) {
        self.source_shape
    }

    pub fn target_shape(&self) -> (usize, usize) {
        self.target_shape
    }

    /// Applies weights to a single 2D field, in parallel over target cells.
    pub fn apply(
        &self,
        field: ArrayView2<Float>,
        pool: &ThreadPool,
    ) -> Result<Array2<Float>, SpeciesError> {
        let found = field.dim();

        if found != self.source_shape {
            return Err(SpeciesError::GridMismatch {
                expected: self.source_shape,
                found,
            });
        }

        let contiguous;
        let source: &[Float] = match field.as_slice() {
            Some(slice) => slice,
            None => {
                contiguous = field.iter().copied().collect::<Vec<Float>>();
                &contiguous
            }
        };

        let rows = self.target_shape.0 * self.target_shape.1;

        let values: Vec<Float> = pool.install(|| {
            (0..rows)
                .into_par_iter()
                .map(|row| {
                    let span = self.row_offsets[row]..self.row_offsets[row + 1];

                    self.columns[span.clone()]
                        .iter()
                        .zip(&self.weights[span])
                        .map(|(col, weight)| source[*col] * weight)
                        .sum::<Float>()
                })
                .collect()
        });

        Array2::from_shape_vec(self.target_shape, values).map_err(|e| {
            SpeciesError::Storage(crate::errors::StorageError::Shape(
                "regridded field".to_string(),
                e,
            ))
        })
    }

    /// Applies weights to every timestep of a (time, lat, lon) field.
    pub fn apply_timesteps(
        &self,
        values: &Array3<Float>,
        pool: &ThreadPool,
    ) -> Result<Array3<Float>, SpeciesError> {
        let (nt, nlat, nlon) = values.dim();

        if (nlat, nlon) != self.source_shape {
            return Err(SpeciesError::GridMismatch {
                expected: self.source_shape,
                found: (nlat, nlon),
            });
        }

        let mut regridded = Array3::zeros((nt, self.target_shape.0, self.target_shape.1));

        for (t, field) in values.axis_iter(Axis(0)).enumerate() {
            let slice = self.apply(field, pool)?;
            regridded.index_axis_mut(Axis(0), t).assign(&slice);
        }

        Ok(regridded)
    }
}

/// For each target row: source rows and the fraction
/// of target cell (in sine of latitude) they cover.
fn latitude_overlaps(
    source: &GridDescriptor,
    target: &GridDescriptor,
) -> Result<Vec<Vec<(usize, Float)>>, WeightsError> {
    let source_sin: Vec<Float> = source
        .lat_bounds()
        .iter()
        .map(|b| b.to_radians().sin())
        .collect();
    let target_sin: Vec<Float> = target
        .lat_bounds()
        .iter()
        .map(|b| b.to_radians().sin())
        .collect();

    target_sin
        .windows(2)
        .map(|cell| overlaps(&source_sin, cell[0], cell[1], 0.0))
        .collect()
}

/// For each target column: source columns and the fraction
/// of target cell (in longitude) they cover.
fn longitude_overlaps(
    source: &GridDescriptor,
    target: &GridDescriptor,
) -> Result<Vec<Vec<(usize, Float)>>, WeightsError> {
    let source_bounds = source.lon_bounds();
    let target_bounds = target.lon_bounds();

    target_bounds
        .windows(2)
        .map(|cell| {
            let mut row: Vec<(usize, Float)> = vec![];

            for shift in [-360.0, 0.0, 360.0] {
                for (l, fraction) in overlaps(&source_bounds, cell[0], cell[1], shift)? {
                    match row.iter_mut().find(|(col, _)| *col == l) {
                        Some((_, f)) => *f += fraction,
                        None => row.push((l, fraction)),
                    }
                }
            }

            Ok(row)
        })
        .collect()
}

/// Source cells overlapping the target interval `[lo, hi]`
/// when source bounds are shifted by `shift`.
fn overlaps(
    source_bounds: &[Float],
    lo: Float,
    hi: Float,
    shift: Float,
) -> Result<Vec<(usize, Float)>, WeightsError> {
    let width = hi - lo;

    if width <= 0.0 {
        return Ok(vec![]);
    }

    let cells = overlapping_cells(source_bounds, lo - shift, hi - shift)?;

    Ok(cells
        .filter_map(|k| {
            let overlap = (source_bounds[k + 1] + shift).min(hi) - (source_bounds[k] + shift).max(lo);

            if overlap > 0.0 {
                Some((k, overlap / width))
            } else {
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::ConservativeWeights;
    use crate::errors::{SpeciesError, WeightsError};
    use crate::pipeline::grid::GridDescriptor;
    use crate::Float;
    use float_cmp::approx_eq;
    use ndarray::Array2;
    use rayon::ThreadPoolBuilder;
    use std::fs;

    fn grids() -> (GridDescriptor, GridDescriptor) {
        (
            GridDescriptor::regular(10.0).unwrap(),
            GridDescriptor::regular(30.0).unwrap(),
        )
    }

    #[test]
    fn rows_are_partitions_of_unity() {
        let (source, target) = grids();
        let weights = ConservativeWeights::generate(&source, &target).unwrap();

        for row in weights.row_offsets.windows(2) {
            let sum: Float = weights.weights[row[0]..row[1]].iter().sum();
            assert!(approx_eq!(Float, sum, 1.0, epsilon = 1e-12));
        }
    }

    #[test]
    fn aligned_grids_average() {
        let (source, target) = grids();
        let weights = ConservativeWeights::generate(&source, &target).unwrap();
        let pool = ThreadPoolBuilder::new().num_threads(2).build().unwrap();

        // 10 degree cells aligned within 30 degree ones
        let field = Array2::from_shape_fn(source.shape(), |(_, j)| (j / 3) as Float);
        let regridded = weights.apply(field.view(), &pool).unwrap();

        assert_eq!(regridded.dim(), target.shape());
        for ((_, j), value) in regridded.indexed_iter() {
            assert!(approx_eq!(Float, *value, j as Float, epsilon = 1e-12));
        }
    }

    #[test]
    fn grid_mismatch() {
        let (source, target) = grids();
        let weights = ConservativeWeights::generate(&source, &target).unwrap();
        let pool = ThreadPoolBuilder::new().num_threads(1).build().unwrap();

        let field = Array2::zeros(target.shape());

        assert!(matches!(
            weights.apply(field.view(), &pool),
            Err(SpeciesError::GridMismatch {
                expected: (18, 36),
                found: (6, 12)
            })
        ));
    }

    #[test]
    fn persistence() {
        let (source, target) = grids();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");

        assert!(matches!(
            ConservativeWeights::load(&path),
            Err(WeightsError::NotFound(_))
        ));

        // regeneration replaces whatever is there
        fs::write(&path, b"not weights").unwrap();
        assert!(ConservativeWeights::load(&path).is_err());

        let generated = ConservativeWeights::generate_and_save(&source, &target, &path).unwrap();
        let loaded = ConservativeWeights::load(&path).unwrap();

        assert_eq!(generated, loaded);
        assert_eq!(loaded.source_shape(), (18, 36));
        assert_eq!(loaded.target_shape(), (6, 12));
    }
}
