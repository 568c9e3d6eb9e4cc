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

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort the whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Error while reading config.yaml: {0}")]
    Config(#[from] ConfigError),

    #[error("Error while handling regridder weights: {0}")]
    Weights(#[from] WeightsError),

    #[error("Error while handling completion record: {0}")]
    Record(#[from] RecordError),

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cannot prepare output directory: {0}")]
    OutputDir(#[from] std::io::Error),

    #[error("Cannot set the memory limit of {0} MB")]
    MemoryLimit(usize),

    #[error("AERT was built without the netcdf feature, no file format is available")]
    NoStorageBackend,
}

/// Configuration errors, always raised before any data is touched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot open config.yaml: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize config.yaml: {0}")]
    CantDeserialize(#[from] serde_yaml::Error),

    #[error("Configuration component is out of bounds {0}")]
    OutOfBounds(&'static str),

    #[error("Version {found} is not available for {source_name}, expected one of {expected:?}")]
    InvalidVersion {
        source_name: &'static str,
        found: String,
        expected: &'static [&'static str],
    },

    #[error("Resolution {found} is not supported, expected {expected}")]
    InvalidResolution {
        found: String,
        expected: &'static str,
    },

    #[error("Unknown model species {0:?}")]
    UnknownSpecies(Vec<String>),

    #[error("Unknown species in {0} overrides: {1:?}")]
    UnknownOverride(&'static str, Vec<String>),
}

/// Errors fatal to a single species, the run continues with the remaining ones.
#[derive(Error, Debug)]
pub enum SpeciesError {
    #[error("Input file not found: {0}")]
    DataNotFound(PathBuf),

    #[error("Regridder weights expect source grid {expected:?} but field has {found:?}")]
    GridMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Field has {found} timesteps but the processing window has {expected}")]
    TimeAxisMismatch { expected: usize, found: usize },

    #[error("Processing window requests time index {requested} but {path} has only {available}")]
    WindowOutOfRange {
        requested: usize,
        available: usize,
        path: PathBuf,
    },

    #[error("Longitudes of {0} are not monotonic after the antimeridian roll")]
    BadLongitudes(String),

    #[error("Variable {0} has unexpected dimensions {1:?}")]
    UnexpectedShape(String, Vec<usize>),

    #[error("{0} is not a requestable model tracer")]
    UnknownTracer(String),

    #[error("{0} requires {1} which failed or was not written")]
    MissingPrerequisite(String, String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors of the structured-file layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Variable {0} not found in {1}")]
    MissingVariable(String, PathBuf),

    #[error("Cannot shape variable {0}: {1}")]
    Shape(String, #[source] ndarray::ShapeError),

    #[error("Time range {requested:?} of variable {variable} exceeds its length {available}")]
    TimeRange {
        variable: String,
        requested: std::ops::Range<usize>,
        available: usize,
    },

    #[error("Variable {0} of rank {1} cannot be read by time range")]
    Rank(String, usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),
}

/// Errors of the regridder weights persistence.
#[derive(Error, Debug)]
pub enum WeightsError {
    #[error("Regridder weights file {0} does not exist, set regridder.regenerate to create it")]
    NotFound(PathBuf),

    #[error("Cannot access regridder weights file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot (de)serialize regridder weights: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Regridder weights are inconsistent: {0}")]
    Corrupted(&'static str),

    #[error("Cannot find overlapping grid cells: {0}")]
    Search(#[from] SearchError),
}

/// Errors of searching within cell bounds.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchError {
    #[error("Bounds array has less than two elements")]
    EmptyArray,

    #[error("Searched value is outside of the bounds")]
    OutOfBounds,
}

/// Errors of the completion record.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Cannot access completion record: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot read or write completion record: {0}")]
    Csv(#[from] csv::Error),
}
