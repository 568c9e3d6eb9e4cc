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

//! Structured-file layer.
//!
//! All stages of the pipeline read and write files only through
//! the [`Storage`] trait. Files are written whole from an
//! in-memory [`Dataset`] and read one variable at a time,
//! optionally restricted to a range of leading (time) indices.

#[cfg(feature = "netcdf")]
mod netcdf;

#[cfg(feature = "netcdf")]
pub use self::netcdf::NetcdfStorage;

use crate::errors::StorageError;
use crate::Float;
use ndarray::{ArrayD, Axis, Slice};
use rustc_hash::FxHashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Data of a variable. Floating-point data is stored
/// as 4-byte floats, integer data as 4-byte integers.
#[derive(Clone, PartialEq, Debug)]
pub enum Values {
    Float(ArrayD<Float>),
    Int(ArrayD<i32>),
}

impl Values {
    pub fn shape(&self) -> &[usize] {
        match self {
            Values::Float(v) => v.shape(),
            Values::Int(v) => v.shape(),
        }
    }

    fn to_float(&self) -> ArrayD<Float> {
        match self {
            Values::Float(v) => v.clone(),
            Values::Int(v) => v.mapv(Float::from),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
    pub unlimited: bool,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Variable {
    pub name: String,
    pub dims: Vec<String>,
    pub attributes: Vec<(String, String)>,
    pub values: Values,
}

impl Variable {
    pub fn put_attribute(&mut self, name: &str, value: &str) -> &mut Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory model of one classic-format file.
#[derive(Clone, PartialEq, Debug)]
pub struct Dataset {
    pub title: String,
    pub dimensions: Vec<Dimension>,
    pub variables: Vec<Variable>,
}

impl Dataset {
    pub fn new(title: &str) -> Self {
        Dataset {
            title: title.to_string(),
            dimensions: vec![],
            variables: vec![],
        }
    }

    pub fn add_dimension(&mut self, name: &str, len: usize) {
        self.dimensions.push(Dimension {
            name: name.to_string(),
            len,
            unlimited: false,
        });
    }

    /// Adds a record dimension, its length is taken from
    /// the variables written along it.
    pub fn add_unlimited_dimension(&mut self, name: &str, len: usize) {
        self.dimensions.push(Dimension {
            name: name.to_string(),
            len,
            unlimited: true,
        });
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    /// Adds a variable checking its shape against declared dimensions.
    pub fn add_variable(
        &mut self,
        name: &str,
        dims: &[&str],
        values: Values,
    ) -> Result<&mut Variable, StorageError> {
        let expected: Option<Vec<usize>> = dims
            .iter()
            .map(|d| self.dimension(d).map(|dim| dim.len))
            .collect();

        if expected.as_deref() != Some(values.shape()) {
            return Err(StorageError::Shape(
                name.to_string(),
                ndarray::ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape),
            ));
        }

        self.variables.push(Variable {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            attributes: vec![],
            values,
        });

        let last = self.variables.len() - 1;
        Ok(&mut self.variables[last])
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.iter_mut().find(|v| v.name == name)
    }

    /// Returns `true` when the first dimension of variable is unlimited.
    pub fn is_record_variable(&self, variable: &Variable) -> bool {
        variable
            .dims
            .first()
            .and_then(|d| self.dimension(d))
            .map_or(false, |d| d.unlimited)
    }
}

/// Structured-file capability used by every pipeline stage.
pub trait Storage {
    fn exists(&self, path: &Path) -> bool;

    /// Shape of the variable without reading its data.
    fn variable_shape(&self, path: &Path, name: &str) -> Result<Vec<usize>, StorageError>;

    /// Reads the variable as floating-point values. When `time` is set
    /// only that range of the first dimension is read.
    fn read_variable(
        &self,
        path: &Path,
        name: &str,
        time: Option<Range<usize>>,
    ) -> Result<ArrayD<Float>, StorageError>;

    /// Writes the dataset, deleting any existing file at `path` first.
    fn write_dataset(&self, path: &Path, dataset: &Dataset) -> Result<(), StorageError>;

    fn remove(&self, path: &Path) -> Result<(), StorageError>;
}

/// Storage keeping datasets in memory, keyed by path.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<FxHashMap<PathBuf, Dataset>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    /// Copy of the dataset stored at `path`.
    pub fn dataset(&self, path: &Path) -> Option<Dataset> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    fn with_variable<T>(
        &self,
        path: &Path,
        name: &str,
        action: impl FnOnce(&Variable) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);

        let dataset = files
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))?;

        let variable = dataset
            .variable(name)
            .ok_or_else(|| StorageError::MissingVariable(name.to_string(), path.to_path_buf()))?;

        action(variable)
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    fn variable_shape(&self, path: &Path, name: &str) -> Result<Vec<usize>, StorageError> {
        self.with_variable(path, name, |v| Ok(v.values.shape().to_vec()))
    }

    fn read_variable(
        &self,
        path: &Path,
        name: &str,
        time: Option<Range<usize>>,
    ) -> Result<ArrayD<Float>, StorageError> {
        self.with_variable(path, name, |v| {
            let values = v.values.to_float();

            match time {
                None => Ok(values),
                Some(range) => {
                    let available = *values
                        .shape()
                        .first()
                        .ok_or_else(|| StorageError::Rank(name.to_string(), 0))?;

                    if range.end > available || range.start > range.end {
                        return Err(StorageError::TimeRange {
                            variable: name.to_string(),
                            requested: range,
                            available,
                        });
                    }

                    Ok(values
                        .slice_axis(Axis(0), Slice::from(range))
                        .to_owned())
                }
            }
        })
    }

    fn write_dataset(&self, path: &Path, dataset: &Dataset) -> Result<(), StorageError> {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);

        files.remove(path);
        files.insert(path.to_path_buf(), dataset.clone());

        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), StorageError> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Dataset, MemoryStorage, Storage, Values};
    use crate::errors::StorageError;
    use ndarray::{ArrayD, IxDyn};
    use std::path::Path;

    fn dataset(value: f64) -> Dataset {
        let mut ds = Dataset::new("test");
        ds.add_unlimited_dimension("time", 3);
        ds.add_dimension("lat", 2);
        ds.add_variable(
            "emiss",
            &["time", "lat"],
            Values::Float(ArrayD::from_shape_fn(IxDyn(&[3, 2]), |i| {
                value + (i[0] * 10 + i[1]) as f64
            })),
        )
        .unwrap()
        .put_attribute("units", "kg m-2 s-1");
        ds.add_variable(
            "date",
            &["time"],
            Values::Int(ArrayD::from_elem(IxDyn(&[3]), 20100101)),
        )
        .unwrap();
        ds
    }

    #[test]
    fn shape_is_checked() {
        let mut ds = Dataset::new("test");
        ds.add_dimension("lat", 2);

        let result = ds.add_variable("lat", &["lat"], Values::Float(ArrayD::zeros(IxDyn(&[3]))));
        assert!(result.is_err());

        let result = ds.add_variable("lon", &["lon"], Values::Float(ArrayD::zeros(IxDyn(&[2]))));
        assert!(result.is_err());
    }

    #[test]
    fn record_variables() {
        let ds = dataset(0.0);

        assert!(ds.is_record_variable(ds.variable("date").unwrap()));
        assert_eq!(ds.variable("emiss").unwrap().attribute("units"), Some("kg m-2 s-1"));
    }

    #[test]
    fn read_time_range() {
        let storage = MemoryStorage::new();
        let path = Path::new("a.nc");
        storage.write_dataset(path, &dataset(0.0)).unwrap();

        assert_eq!(storage.variable_shape(path, "emiss").unwrap(), vec![3, 2]);

        let values = storage.read_variable(path, "emiss", Some(1..3)).unwrap();
        assert_eq!(values.shape(), &[2, 2]);
        assert_eq!(values[[0, 1]], 11.0);

        let dates = storage.read_variable(path, "date", None).unwrap();
        assert_eq!(dates[[2]], 20100101.0);

        assert!(matches!(
            storage.read_variable(path, "emiss", Some(2..4)),
            Err(StorageError::TimeRange { available: 3, .. })
        ));
    }

    #[test]
    fn missing_files_and_variables() {
        let storage = MemoryStorage::new();
        let path = Path::new("a.nc");

        assert!(matches!(
            storage.read_variable(path, "emiss", None),
            Err(StorageError::NotFound(_))
        ));

        storage.write_dataset(path, &dataset(0.0)).unwrap();

        assert!(matches!(
            storage.read_variable(path, "sum", None),
            Err(StorageError::MissingVariable(_, _))
        ));
    }

    #[test]
    fn overwrite_and_remove() {
        let storage = MemoryStorage::new();
        let path = Path::new("a.nc");

        storage.write_dataset(path, &dataset(0.0)).unwrap();
        storage.write_dataset(path, &dataset(100.0)).unwrap();

        let values = storage.read_variable(path, "emiss", None).unwrap();
        assert_eq!(values[[0, 0]], 100.0);
        assert_eq!(storage.paths().len(), 1);

        storage.remove(path).unwrap();
        assert!(!storage.exists(path));
    }
}
