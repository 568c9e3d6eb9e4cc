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

//! Rectilinear latitude-longitude grids.
//!
//! Grids are described only by their cell centres. Cell bounds
//! are inferred as mid-points between neighbouring centres,
//! with latitudes clamped at the poles and longitudes
//! treated as periodic.

use crate::constants::WGS84_A;
use crate::errors::ConfigError;
use crate::Float;
use ndarray::{Array1, Array2, ArrayView2};

/// Label of the only supported destination grid.
pub const TARGET_RESOLUTION: &str = "0.9x1.25";

/// Shape (lat, lon) of the destination grid.
pub const TARGET_SHAPE: (usize, usize) = (192, 288);

/// Cell-centre coordinates of a rectilinear grid.
#[derive(Clone, PartialEq, Debug)]
pub struct GridDescriptor {
    pub lats: Array1<Float>,
    pub lons: Array1<Float>,
}

impl GridDescriptor {
    /// Checked constructor. Latitudes must increase within
    /// `[-90, 90]`, longitudes must increase within `[0, 360)`.
    pub fn new(lats: Array1<Float>, lons: Array1<Float>) -> Result<Self, ConfigError> {
        if lats.len() < 2 || lons.len() < 2 {
            return Err(ConfigError::OutOfBounds(
                "Grid needs at least two cells in each direction",
            ));
        }

        if !is_increasing(&lats) || !is_increasing(&lons) {
            return Err(ConfigError::OutOfBounds(
                "Grid coordinates must be strictly increasing",
            ));
        }

        if lats.iter().any(|lat| !(-90.0..=90.0).contains(lat)) {
            return Err(ConfigError::OutOfBounds(
                "Grid latitudes must be within -90 and 90",
            ));
        }

        if lons.iter().any(|lon| !(0.0..360.0).contains(lon)) {
            return Err(ConfigError::OutOfBounds(
                "Grid longitudes must be within 0 and 360",
            ));
        }

        Ok(GridDescriptor { lats, lons })
    }

    /// Regular global grid with given spacing in degrees,
    /// as used by the inventories.
    pub fn regular(spacing: Float) -> Result<Self, ConfigError> {
        if !(spacing > 0.0 && spacing <= 90.0) {
            return Err(ConfigError::OutOfBounds("Grid spacing must be within 0 and 90"));
        }

        let nlat = (180.0 / spacing).round() as usize;
        let nlon = (360.0 / spacing).round() as usize;

        let lats = Array1::from_shape_fn(nlat, |i| -90.0 + spacing * (i as Float + 0.5));
        let lons = Array1::from_shape_fn(nlon, |j| spacing * (j as Float + 0.5));

        GridDescriptor::new(lats, lons)
    }

    /// The destination model grid: 192 latitudes from pole
    /// to pole and 288 longitudes from 0 every 1.25 degree.
    pub fn model_target() -> Self {
        let (nlat, nlon) = TARGET_SHAPE;

        GridDescriptor {
            lats: Array1::linspace(-90.0, 90.0, nlat),
            lons: Array1::from_shape_fn(nlon, |j| 1.25 * j as Float),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.lats.len(), self.lons.len())
    }

    /// Latitude cell bounds (in degrees), one more than cells.
    pub fn lat_bounds(&self) -> Vec<Float> {
        let mut bounds = mid_bounds(&self.lats);

        for b in &mut bounds {
            *b = b.clamp(-90.0, 90.0);
        }

        bounds
    }

    /// Longitude cell bounds (in degrees), one more than cells.
    ///
    /// Bounds are not wrapped so the first one can be
    /// negative and the last one can exceed 360.
    pub fn lon_bounds(&self) -> Vec<Float> {
        mid_bounds(&self.lons)
    }

    /// Areas of grid cells in square metres on a sphere.
    pub fn cell_areas(&self) -> Array2<Float> {
        let lat_bounds = self.lat_bounds();
        let lon_bounds = self.lon_bounds();

        Array2::from_shape_fn(self.shape(), |(i, j)| {
            let d_sin = lat_bounds[i + 1].to_radians().sin() - lat_bounds[i].to_radians().sin();
            let d_lon = (lon_bounds[j + 1] - lon_bounds[j]).to_radians();

            WGS84_A * WGS84_A * d_lon * d_sin
        })
    }

    /// Area-weighted sum of a flux field defined on this grid.
    pub fn integrate(&self, field: ArrayView2<Float>) -> Float {
        (&field * &self.cell_areas()).sum()
    }
}

fn is_increasing(values: &Array1<Float>) -> bool {
    values.windows(2).into_iter().all(|w| w[1] > w[0])
}

/// Mid-points between centres, extrapolated by half a cell at both ends.
fn mid_bounds(centres: &Array1<Float>) -> Vec<Float> {
    let n = centres.len();
    let mut bounds = Vec::with_capacity(n + 1);

    bounds.push(centres[0] - 0.5 * (centres[1] - centres[0]));

    for i in 1..n {
        bounds.push(0.5 * (centres[i - 1] + centres[i]));
    }

    bounds.push(centres[n - 1] + 0.5 * (centres[n - 1] - centres[n - 2]));

    bounds
}

#[cfg(test)]
mod tests {
    use super::{GridDescriptor, TARGET_SHAPE};
    use crate::constants::WGS84_A;
    use crate::Float;
    use float_cmp::approx_eq;
    use ndarray::{array, Array2};
    use std::f64::consts::PI;

    #[test]
    fn target_grid() {
        let grid = GridDescriptor::model_target();

        assert_eq!(grid.shape(), TARGET_SHAPE);
        assert!(approx_eq!(Float, grid.lats[1], -89.057594, epsilon = 1e-5));
        assert!(approx_eq!(Float, grid.lats[191], 90.0));
        assert!(approx_eq!(Float, grid.lons[287], 358.75));

        // the target grid passes the checked constructor too
        assert!(GridDescriptor::new(grid.lats.clone(), grid.lons.clone()).is_ok());
    }

    #[test]
    fn regular_grid() {
        let grid = GridDescriptor::regular(0.5).unwrap();

        assert_eq!(grid.shape(), (360, 720));
        assert!(approx_eq!(Float, grid.lats[0], -89.75));
        assert!(approx_eq!(Float, grid.lons[719], 359.75));

        let bounds = grid.lat_bounds();
        assert!(approx_eq!(Float, bounds[0], -90.0));
        assert!(approx_eq!(Float, bounds[360], 90.0));
    }

    #[test]
    fn areas_cover_sphere() {
        let sphere = 4.0 * PI * WGS84_A * WGS84_A;

        for grid in [GridDescriptor::model_target(), GridDescriptor::regular(5.0).unwrap()] {
            let total = grid.cell_areas().sum();
            assert!(approx_eq!(Float, total / sphere, 1.0, epsilon = 1e-12));
        }
    }

    #[test]
    fn integrate_uniform_field() {
        let grid = GridDescriptor::regular(30.0).unwrap();
        let field = Array2::from_elem(grid.shape(), 2.0);
        let sphere = 4.0 * PI * WGS84_A * WGS84_A;

        assert!(approx_eq!(Float, grid.integrate(field.view()) / sphere, 2.0, epsilon = 1e-12));
    }

    #[test]
    fn rejects_bad_coordinates() {
        assert!(GridDescriptor::new(array![10.0, 0.0], array![0.0, 10.0]).is_err());
        assert!(GridDescriptor::new(array![-95.0, 0.0], array![0.0, 10.0]).is_err());
        assert!(GridDescriptor::new(array![0.0, 10.0], array![-10.0, 10.0]).is_err());
        assert!(GridDescriptor::new(array![0.0], array![0.0, 10.0]).is_err());
        assert!(GridDescriptor::regular(0.0).is_err());
    }
}
