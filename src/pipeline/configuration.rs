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

//! Module responsible for parsing and checking the configuration file.
//!
//! The configuration file uses [YAML](https://en.wikipedia.org/wiki/YAML)
//! and `serde` to enforce strong typing and automatic type checking.
//!
//! The structures and their fields in this module directly correspond to
//! the fields inside `config.yaml` so you can check this documentation
//! for more details how to set the config file.
//!
//! Every check is done before any data is read, so a misconfigured
//! run fails immediately.

use super::catalog::{DataSource, DownloadMethod, InputLayout};
use super::field::{ProcessingWindow, YearMonth};
use super::grid::TARGET_RESOLUTION;
use crate::errors::ConfigError;
use crate::Float;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Range of months to process.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct Window {
    pub start_year: i32,

    /// _(Optional)_ Defaults to `1`.
    #[serde(default = "Window::default_start_month")]
    pub start_month: u32,

    pub end_year: i32,

    /// _(Optional)_ Defaults to `12`.
    #[serde(default = "Window::default_end_month")]
    pub end_month: u32,
}

impl Window {
    fn default_start_month() -> u32 {
        1
    }

    fn default_end_month() -> u32 {
        12
    }

    /// Checked processing window, the end must be after the start.
    pub fn processing_window(&self) -> Result<ProcessingWindow, ConfigError> {
        ProcessingWindow::new(
            YearMonth::new(self.start_year, self.start_month),
            YearMonth::new(self.end_year, self.end_month),
        )
    }
}

/// Directories and files used by the run.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct Paths {
    /// Root directory of raw inventory files.
    pub input: PathBuf,

    /// Directory of intermediate regridded files.
    pub regridded: PathBuf,

    /// Directory of model-ready files and the completion record.
    pub output: PathBuf,

    /// File of persisted regridder weights.
    pub weights: PathBuf,
}

/// _(Optional)_ Regridder settings.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Deserialize)]
pub struct Regridder {
    /// _(Optional)_ Generate weights and replace the weights file
    /// before regridding. Otherwise the weights file must exist.
    ///
    /// Weights generation for the CAMS-GLOB-ANT grid takes
    /// a while, it is enough to do it once per data source.
    ///
    /// Defaults to `false`.
    #[serde(default)]
    pub regenerate: bool,
}

/// _(Optional)_ Fields with information about
/// resources available for the run.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Resources {
    /// _(Optional)_ Thread count used for applying regridder weights.
    ///
    /// Cannot be less than `1`. Defaults to `1`.
    #[serde(default = "Resources::default_threads")]
    pub threads: u16,

    /// _(Optional)_ Heap memory limit in MB.
    /// Useful for enabling meaningful Out-of-memory error messages.
    ///
    /// Cannot be less than `128`. Defaults to whole addressable-space
    /// (`2^32` or `2^64` bytes).
    ///
    /// CAMS-GLOB-ANT fields on the native grid take several GB for
    /// a single year. If the process gets killed for no apparent reason
    /// try setting the memory limit lower than your available system memory
    /// and check if OOM error occurs.
    #[serde(default = "Resources::default_memory")]
    pub memory: usize,
}

impl Resources {
    fn default_threads() -> u16 {
        1
    }

    fn default_memory() -> usize {
        usize::MAX / (1024 * 1024)
    }

    /// Checks if thread count and memory limit are
    /// above limits.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.threads < 1 {
            return Err(ConfigError::OutOfBounds(
                "Available threads cannot be less than 1",
            ));
        }

        if self.memory < 128 {
            return Err(ConfigError::OutOfBounds(
                "Available memory cannot be less than 128 MB",
            ));
        }

        Ok(())
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: Resources::default_threads(),
            memory: Resources::default_memory(),
        }
    }
}

/// Main config structure representing the fields in
/// configuration file.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Config {
    /// `CAMS-GLOB-ANT` or `CEDS`.
    pub source: DataSource,

    /// _(Optional)_ Inventory version.
    ///
    /// Defaults to `v5.3` for CAMS-GLOB-ANT and `v2021-04-21` for CEDS.
    #[serde(default)]
    pub version: Option<String>,

    /// _(Optional)_ Resolution of the inventory grid,
    /// must be the native one of the source.
    #[serde(default)]
    pub original_resolution: Option<String>,

    /// _(Optional)_ Only `0.9x1.25` is supported.
    #[serde(default = "Config::default_target_resolution")]
    pub target_resolution: String,

    pub window: Window,

    /// _(Optional)_ `globus` for the CEDS sectoral archive covering
    /// 2000-2019, `wget` for CEDS yearly files available from 1950.
    /// Ignored for CAMS-GLOB-ANT.
    ///
    /// Defaults to `globus`.
    #[serde(default)]
    pub download_method: DownloadMethod,

    /// _(Optional)_ Model tracers to process. Defaults to all tracers.
    #[serde(default)]
    pub species: Option<Vec<String>>,

    /// _(Optional)_ Creation date `YYYYMMDD` put in file names.
    ///
    /// Defaults to today. Set it explicitly when resuming
    /// a run started on another day.
    #[serde(default)]
    pub cdate: Option<String>,

    pub paths: Paths,

    #[serde(default)]
    pub regridder: Regridder,

    /// _(Optional)_ Molecular weights replacing the built-in ones,
    /// keyed by model tracer or composite sub-species.
    #[serde(default)]
    pub molecular_weights: FxHashMap<String, Float>,

    /// _(Optional)_ Scale factors replacing the built-in ones,
    /// keyed by model tracer.
    #[serde(default)]
    pub scale_factors: FxHashMap<String, Float>,

    /// _(Optional)_ Skip species already present in the completion
    /// record for the same window and creation date.
    ///
    /// Defaults to `false`.
    #[serde(default)]
    pub resume: bool,

    #[serde(default)]
    pub resources: Resources,
}

impl Config {
    /// Config structure constructor, responsible for
    /// deserializing configuration and checking it.
    pub fn new_from_file(file_path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read(file_path)?;
        Config::new_from_slice(data.as_slice())
    }

    pub fn new_from_slice(data: &[u8]) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_slice(data)?;

        config.check_bounds()?;
        config.resources.check_bounds()?;

        Ok(config)
    }

    fn default_target_resolution() -> String {
        TARGET_RESOLUTION.to_string()
    }

    pub fn version(&self) -> &str {
        self.version
            .as_deref()
            .unwrap_or_else(|| self.source.default_version())
    }

    pub fn original_resolution(&self) -> &str {
        self.original_resolution
            .as_deref()
            .unwrap_or_else(|| self.source.native_resolution())
    }

    /// Layout of raw inventory files.
    pub fn layout(&self) -> InputLayout {
        InputLayout::new(self.source, self.download_method)
    }

    /// Creation date, today when not set.
    pub fn cdate(&self) -> String {
        match &self.cdate {
            Some(cdate) => cdate.clone(),
            None => chrono::Local::now().format("%Y%m%d").to_string(),
        }
    }

    /// Checks data source settings and the processing window.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if !self.source.versions().contains(&self.version()) {
            return Err(ConfigError::InvalidVersion {
                source_name: self.source.name(),
                found: self.version().to_string(),
                expected: self.source.versions(),
            });
        }

        if self.original_resolution() != self.source.native_resolution() {
            return Err(ConfigError::InvalidResolution {
                found: self.original_resolution().to_string(),
                expected: self.source.native_resolution(),
            });
        }

        if self.target_resolution != TARGET_RESOLUTION {
            return Err(ConfigError::InvalidResolution {
                found: self.target_resolution.clone(),
                expected: TARGET_RESOLUTION,
            });
        }

        self.window
            .processing_window()?
            .check_years(self.layout().first_year(), self.layout().last_year())?;

        if let Some(cdate) = &self.cdate {
            if cdate.len() != 8 || !cdate.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::OutOfBounds(
                    "Creation date must be in YYYYMMDD format",
                ));
            }
        }

        Ok(())
    }
}
