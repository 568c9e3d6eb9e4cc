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

//! [`Storage`] backed by NetCDF files in classic format.

use super::{Dataset, Storage, Values, Variable};
use crate::errors::StorageError;
use crate::Float;
use log::debug;
use ndarray::{ArrayD, Axis, IxDyn};
use std::fs;
use std::ops::Range;
use std::path::Path;

#[derive(Copy, Clone, Debug, Default)]
pub struct NetcdfStorage;

impl NetcdfStorage {
    fn open(path: &Path) -> Result<::netcdf::File, StorageError> {
        if !path.is_file() {
            return Err(StorageError::NotFound(path.to_path_buf()));
        }

        Ok(::netcdf::open(path)?)
    }
}

impl Storage for NetcdfStorage {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn variable_shape(&self, path: &Path, name: &str) -> Result<Vec<usize>, StorageError> {
        let file = NetcdfStorage::open(path)?;

        let var = file
            .variable(name)
            .ok_or_else(|| StorageError::MissingVariable(name.to_string(), path.to_path_buf()))?;

        Ok(var.dimensions().iter().map(|d| d.len()).collect())
    }

    fn read_variable(
        &self,
        path: &Path,
        name: &str,
        time: Option<Range<usize>>,
    ) -> Result<ArrayD<Float>, StorageError> {
        let file = NetcdfStorage::open(path)?;

        let var = file
            .variable(name)
            .ok_or_else(|| StorageError::MissingVariable(name.to_string(), path.to_path_buf()))?;

        let mut shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

        let values: Vec<Float> = match time {
            None => var.get_values::<Float, _>(..)?,
            Some(range) => {
                let available = shape.first().copied().unwrap_or(0);

                if range.end > available || range.start > range.end {
                    return Err(StorageError::TimeRange {
                        variable: name.to_string(),
                        requested: range,
                        available,
                    });
                }

                shape[0] = range.len();

                match shape.len() {
                    3 => var.get_values::<Float, _>((range, .., ..))?,
                    4 => var.get_values::<Float, _>((range, .., .., ..))?,
                    rank => return Err(StorageError::Rank(name.to_string(), rank)),
                }
            }
        };

        debug!("Read {} values of {} from {}", values.len(), name, path.display());

        ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|e| StorageError::Shape(name.to_string(), e))
    }

    fn write_dataset(&self, path: &Path, dataset: &Dataset) -> Result<(), StorageError> {
        if path.exists() {
            debug!("Removing existing file {}", path.display());
            fs::remove_file(path)?;
        }

        let mut file = ::netcdf::create_with(path, ::netcdf::Options::CLASSIC)?;

        file.add_attribute("title", dataset.title.as_str())?;

        for dim in &dataset.dimensions {
            if dim.unlimited {
                file.add_unlimited_dimension(&dim.name)?;
            } else {
                file.add_dimension(&dim.name, dim.len)?;
            }
        }

        for variable in &dataset.variables {
            let record = dataset.is_record_variable(variable);
            write_variable(&mut file, variable, record)?;
        }

        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), StorageError> {
        if path.exists() {
            fs::remove_file(path)?;
        }

        Ok(())
    }
}

/// Writes one variable. Record variables are written one
/// record at a time as the unlimited dimension grows with writes.
fn write_variable(
    file: &mut ::netcdf::FileMut,
    variable: &Variable,
    record: bool,
) -> Result<(), StorageError> {
    let dims: Vec<&str> = variable.dims.iter().map(String::as_str).collect();

    match &variable.values {
        Values::Float(values) => {
            let mut var = file.add_variable::<f32>(&variable.name, &dims)?;

            for (name, value) in &variable.attributes {
                var.put_attribute(name, value.as_str())?;
            }

            if !record {
                let data: Vec<f32> = values.iter().map(|v| *v as f32).collect();
                var.put_values(&data, ..)?;
                return Ok(());
            }

            for (t, slice) in values.axis_iter(Axis(0)).enumerate() {
                let data: Vec<f32> = slice.iter().map(|v| *v as f32).collect();

                match values.ndim() {
                    1 => var.put_value(data[0], [t])?,
                    2 => var.put_values(&data, (t, ..))?,
                    3 => var.put_values(&data, (t, .., ..))?,
                    4 => var.put_values(&data, (t, .., .., ..))?,
                    rank => return Err(StorageError::Rank(variable.name.clone(), rank)),
                }
            }
        }
        Values::Int(values) => {
            let mut var = file.add_variable::<i32>(&variable.name, &dims)?;

            for (name, value) in &variable.attributes {
                var.put_attribute(name, value.as_str())?;
            }

            if !record {
                let data: Vec<i32> = values.iter().copied().collect();
                var.put_values(&data, ..)?;
                return Ok(());
            }

            if values.ndim() != 1 {
                return Err(StorageError::Rank(variable.name.clone(), values.ndim()));
            }

            for (t, value) in values.iter().enumerate() {
                var.put_value(*value, [t])?;
            }
        }
    }

    Ok(())
}
