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

//! Deterministic file names of inventory, intermediate and output files.
//!
//! Files are never discovered by listing directories,
//! every stage looks its inputs up by name.

use super::catalog::{CedsFile, DataSource, InputLayout, InventorySpecies};
use super::field::ProcessingWindow;
use super::grid::TARGET_RESOLUTION;
use std::path::{Path, PathBuf};

/// Time step label used in file names.
const TIMESTEP: &str = "monthly";

/// Version label used in CEDS archive names.
const CEDS_RELEASE: &str = "CEDS-2021-04-21";

/// Time span covered by CEDS gridded files.
const CEDS_SPAN: &str = "200001-201912";

/// Builder of all file names used within one run.
#[derive(Clone, Debug)]
pub struct FileNaming {
    pub source: DataSource,
    pub layout: InputLayout,
    pub version: String,
    pub window: ProcessingWindow,
    pub cdate: String,
    pub input_dir: PathBuf,
    pub regridded_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl FileNaming {
    /// `{start}{day}_{end}{day}` part shared by intermediate and output names.
    fn window_stamp(&self) -> String {
        let day = self.source.day_anchor();

        format!(
            "{}{:02}_{}{:02}",
            self.window.start, day, self.window.end, day
        )
    }

    /// Yearly CAMS file holding all sectors of one species.
    pub fn cams_yearly_input(&self, species: &InventorySpecies, year: i32) -> PathBuf {
        self.input_dir.join(year.to_string()).join(format!(
            "{}_Glb_{}_anthro_{}_{}_{}_{}.nc",
            DataSource::CamsGlobAnt.name(),
            DataSource::CamsGlobAnt.native_resolution(),
            species.cams_name,
            self.version,
            TIMESTEP,
            year
        ))
    }

    /// Multi-year CEDS sectoral file of one species.
    pub fn ceds_archive_input(&self, species: &InventorySpecies) -> PathBuf {
        let name = species.ceds_name;

        match species.ceds_file {
            CedsFile::Bulk => self.input_dir.join(name).join("individual_files").join(format!(
                "{}-em-anthro_input4MIPs_emissions_CMIP_{}_gn_{}.nc",
                name, CEDS_RELEASE, CEDS_SPAN
            )),
            CedsFile::Voc { dir } => self
                .input_dir
                .join("VOC-speciated")
                .join(dir)
                .join("individual_files")
                .join(format!(
                    "{}-em-speciated-VOC-anthro_input4MIPs_emissions_CMIP_{}-supplemental-data_gn_{}.nc",
                    name, CEDS_RELEASE, CEDS_SPAN
                )),
        }
    }

    /// One of the two CEDS files in the directory of `year`,
    /// `file_year` is either the previous year or `year` itself.
    pub fn ceds_yearly_input(&self, species: &InventorySpecies, year: i32, file_year: i32) -> PathBuf {
        self.input_dir.join(year.to_string()).join(format!(
            "{}_Glb_{}_anthro_{}__{}_{}.nc",
            DataSource::Ceds.name(),
            DataSource::Ceds.native_resolution(),
            species.ceds_name,
            TIMESTEP,
            file_year
        ))
    }

    /// Regridded inventory field, optionally for a single sector.
    pub fn regridded(&self, key: &str, sector: Option<&str>) -> PathBuf {
        let species = match sector {
            Some(sector) => format!("{}_{}", key, sector),
            None => key.to_string(),
        };

        self.regridded_dir.join(format!(
            "{}_{}_anthro_{}_{}_{}_{}_{}_c{}.nc",
            self.source.name(),
            self.source.native_resolution(),
            species,
            self.version,
            TIMESTEP,
            self.window_stamp(),
            TARGET_RESOLUTION,
            self.cdate
        ))
    }

    /// Model-ready file of a tracer, `tag` distinguishes
    /// sector category files (eg. `ene` gives `anthro-ene`).
    pub fn output(&self, tracer: &str, tag: Option<&str>) -> PathBuf {
        let kind = match tag {
            Some(tag) => format!("anthro-{}", tag),
            None => "anthro".to_string(),
        };

        self.output_dir.join(format!(
            "{}{}_{}_{}_{}_{}_c{}.nc",
            self.source.name(),
            self.version,
            tracer,
            kind,
            self.window_stamp(),
            TARGET_RESOLUTION,
            self.cdate
        ))
    }

    pub fn completion_record(&self) -> PathBuf {
        completion_record_path(&self.output_dir)
    }
}

/// Variable name of a species in CEDS archive files.
pub fn ceds_variable(species: &InventorySpecies) -> String {
    match species.ceds_file {
        CedsFile::Bulk => format!("{}_em_anthro", species.ceds_name),
        CedsFile::Voc { .. } => format!(
            "{}_em_speciated_VOC_anthro",
            species.ceds_name.replace('-', "_")
        ),
    }
}

pub fn completion_record_path(output_dir: &Path) -> PathBuf {
    output_dir.join("aert_completion.csv")
}
