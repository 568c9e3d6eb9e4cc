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

//! Table of completed processing units.
//!
//! A row is appended only after all files of the unit were written,
//! so a unit interrupted mid-write is never recorded and is
//! processed again when the run is resumed.

use super::field::ProcessingWindow;
use crate::errors::RecordError;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Regrid,
    Transform,
}

/// One row of the record.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct CompletedUnit {
    pub stage: Stage,
    pub species: String,
    pub window: String,
    pub cdate: String,
    pub files: usize,
}

impl CompletedUnit {
    pub fn new(
        stage: Stage,
        species: &str,
        window: &ProcessingWindow,
        cdate: &str,
        files: usize,
    ) -> Self {
        CompletedUnit {
            stage,
            species: species.to_string(),
            window: window_label(window),
            cdate: cdate.to_string(),
            files,
        }
    }
}

fn window_label(window: &ProcessingWindow) -> String {
    format!("{}-{}", window.start, window.end)
}

/// Completion record stored as CSV file.
#[derive(Clone, Debug)]
pub struct CompletionRecord {
    path: PathBuf,
    units: Vec<CompletedUnit>,
}

impl CompletionRecord {
    /// Reads the record, a missing file gives an empty record.
    pub fn load(path: &Path) -> Result<Self, RecordError> {
        let mut units = vec![];

        if path.is_file() {
            let mut reader = csv::Reader::from_path(path)?;

            for unit in reader.deserialize() {
                units.push(unit?);
            }
        }

        Ok(CompletionRecord {
            path: path.to_path_buf(),
            units,
        })
    }

    /// Checks if the unit was completed for the same window and creation date.
    pub fn contains(
        &self,
        stage: Stage,
        species: &str,
        window: &ProcessingWindow,
        cdate: &str,
    ) -> bool {
        let window = window_label(window);

        self.units.iter().any(|u| {
            u.stage == stage && u.species == species && u.window == window && u.cdate == cdate
        })
    }

    /// Appends the unit to the file and to the record.
    pub fn append(&mut self, unit: CompletedUnit) -> Result<(), RecordError> {
        let new_file = !self.path.is_file();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(new_file)
            .from_writer(file);

        writer.serialize(&unit)?;
        writer.flush()?;

        self.units.push(unit);

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{CompletedUnit, CompletionRecord, Stage};
    use crate::pipeline::field::{ProcessingWindow, YearMonth};

    fn window() -> ProcessingWindow {
        ProcessingWindow::new(YearMonth::new(2010, 1), YearMonth::new(2010, 12)).unwrap()
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let record = CompletionRecord::load(&dir.path().join("record.csv")).unwrap();

        assert_eq!(record.len(), 0);
        assert!(!record.contains(Stage::Regrid, "co", &window(), "20240101"));
    }

    #[test]
    fn append_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.csv");

        let mut record = CompletionRecord::load(&path).unwrap();
        record
            .append(CompletedUnit::new(Stage::Regrid, "co", &window(), "20240101", 1))
            .unwrap();
        record
            .append(CompletedUnit::new(Stage::Transform, "CO", &window(), "20240101", 3))
            .unwrap();

        let reloaded = CompletionRecord::load(&path).unwrap();

        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains(Stage::Regrid, "co", &window(), "20240101"));
        assert!(reloaded.contains(Stage::Transform, "CO", &window(), "20240101"));
        assert!(!reloaded.contains(Stage::Transform, "co", &window(), "20240101"));
        assert!(!reloaded.contains(Stage::Regrid, "co", &window(), "20240102"));

        let other =
            ProcessingWindow::new(YearMonth::new(2010, 1), YearMonth::new(2010, 6)).unwrap();
        assert!(!reloaded.contains(Stage::Regrid, "co", &other, "20240101"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("stage,species,window,cdate,files"));
        assert!(content.contains("transform,CO,201001-201012,20240101,3"));
    }
}
